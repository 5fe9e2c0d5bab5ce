//! Built-in matcher functions
//!
//! Pure string predicates callable from matcher expressions, either as plain
//! calls (`keyMatch(r.obj, p.obj)`) or in receiver form
//! (`r.obj.keyMatch(p.obj)`). They are collected into a [`FunctionMap`] that
//! each enforcer owns, so different enforcers can carry different custom
//! functions side by side.

use crate::cel::error::{CelError, Result};
use dashmap::DashMap;
use glob::{MatchOptions, Pattern};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;

/// Two-argument string predicate usable from a matcher
pub type MatcherFn = Arc<dyn Fn(&str, &str) -> Result<bool> + Send + Sync>;

static KEY_MATCH2_NAMED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r":[^/]+").expect("static keyMatch2 pattern")
});

static KEY_MATCH3_NAMED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\{[^/]+?\}").expect("static keyMatch3 pattern")
});

/// Compiled regular expressions keyed by pattern text
///
/// Owned by one [`FunctionMap`]; the enforcer clears it whenever the policy
/// is reloaded or rows are removed.
#[derive(Debug, Default)]
pub struct PatternCache {
    patterns: DashMap<String, Regex>,
}

impl PatternCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn get_or_compile(&self, function: &str, pattern: &str) -> Result<Regex> {
        if let Some(re) = self.patterns.get(pattern) {
            return Ok(re.clone());
        }

        let re = compile_regex(function, pattern)?;
        self.patterns.insert(pattern.to_string(), re.clone());
        Ok(re)
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn clear(&self) {
        self.patterns.clear();
    }
}

fn compile_regex(function: &str, pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|e| CelError::function(function, e))
}

fn regex_in(cache: Option<&PatternCache>, function: &str, pattern: &str) -> Result<Regex> {
    match cache {
        Some(cache) => cache.get_or_compile(function, pattern),
        None => compile_regex(function, pattern),
    }
}

/// Exact match, or prefix match when `key2` ends in `*`
///
/// # Example
/// ```cel
/// keyMatch("/alice_data/resource1", "/alice_data/*")  // true
/// ```
pub fn key_match(key1: &str, key2: &str) -> Result<bool> {
    match key2.find('*') {
        None => Ok(key1 == key2),
        Some(i) => {
            let prefix = &key2[..i];
            if key1.len() > i {
                Ok(key1.starts_with(prefix))
            } else {
                Ok(key1 == prefix)
            }
        }
    }
}

/// Path template match with `*` and `:name` segments
///
/// # Example
/// ```cel
/// keyMatch2("/alice_data/resource1", "/alice_data/:resource")  // true
/// ```
pub fn key_match2(key1: &str, key2: &str) -> Result<bool> {
    key_match2_in(None, key1, key2)
}

fn key_match2_in(cache: Option<&PatternCache>, key1: &str, key2: &str) -> Result<bool> {
    let template = key2.replace("/*", "/.*");
    let template = KEY_MATCH2_NAMED.replace_all(&template, "[^/]+");
    regex_match_named(cache, "keyMatch2", key1, &format!("^{}$", template))
}

/// Path template match with `*` and `{name}` segments
///
/// # Example
/// ```cel
/// keyMatch3("/alice_data/resource1", "/alice_data/{resource}")  // true
/// ```
pub fn key_match3(key1: &str, key2: &str) -> Result<bool> {
    key_match3_in(None, key1, key2)
}

fn key_match3_in(cache: Option<&PatternCache>, key1: &str, key2: &str) -> Result<bool> {
    let template = key2.replace("/*", "/.*");
    let template = KEY_MATCH3_NAMED.replace_all(&template, "[^/]+");
    regex_match_named(cache, "keyMatch3", key1, &format!("^{}$", template))
}

/// Unanchored regular expression search
///
/// # Errors
/// Returns an error if `pattern` is not a valid regular expression
pub fn regex_match(key1: &str, pattern: &str) -> Result<bool> {
    regex_match_named(None, "regexMatch", key1, pattern)
}

fn regex_match_named(
    cache: Option<&PatternCache>,
    function: &str,
    key1: &str,
    pattern: &str,
) -> Result<bool> {
    Ok(regex_in(cache, function, pattern)?.is_match(key1))
}

/// IP address equality or CIDR containment
///
/// # Example
/// ```cel
/// ipMatch("192.168.2.123", "192.168.2.0/24")  // true
/// ipMatch("192.168.2.123", "192.168.2.123")   // true
/// ```
///
/// # Errors
/// Returns an error if either argument is not a valid address or CIDR block
pub fn ip_match(ip: &str, cidr_or_ip: &str) -> Result<bool> {
    let addr = parse_ip(ip)?;

    let Some((network, prefix)) = cidr_or_ip.split_once('/') else {
        return Ok(addr == parse_ip(cidr_or_ip)?);
    };

    let network = parse_ip(network)?;
    let prefix: u32 = prefix
        .trim()
        .parse()
        .map_err(|_| CelError::function("ipMatch", format!("invalid prefix length in '{}'", cidr_or_ip)))?;

    match (addr, network) {
        (IpAddr::V4(addr), IpAddr::V4(network)) => {
            if prefix > 32 {
                return Err(CelError::function("ipMatch", format!("prefix too long in '{}'", cidr_or_ip)));
            }
            let mask = u32::MAX.checked_shl(32 - prefix).unwrap_or(0);
            Ok(u32::from(addr) & mask == u32::from(network) & mask)
        }
        (IpAddr::V6(addr), IpAddr::V6(network)) => {
            if prefix > 128 {
                return Err(CelError::function("ipMatch", format!("prefix too long in '{}'", cidr_or_ip)));
            }
            let mask = u128::MAX.checked_shl(128 - prefix).unwrap_or(0);
            Ok(u128::from(addr) & mask == u128::from(network) & mask)
        }
        // Mixed address families never match
        _ => Ok(false),
    }
}

fn parse_ip(text: &str) -> Result<IpAddr> {
    text.trim()
        .parse()
        .map_err(|_| CelError::function("ipMatch", format!("invalid IP address '{}'", text)))
}

/// Shell glob match; `*`, `?` and `[...]` classes do not cross `/`
///
/// Supports `[abc]`, `[a-z]`, `[!abc]` and `\` escapes.
///
/// # Example
/// ```cel
/// globMatch("/foo/bar", "/foo/*")      // true
/// globMatch("/foo/bar/baz", "/foo/*")  // false
/// globMatch("/foo/a", "/foo/[!b]")     // true
/// ```
///
/// # Errors
/// Returns an error if `pattern` is malformed (unclosed class, trailing `\`)
pub fn glob_match(key1: &str, pattern: &str) -> Result<bool> {
    let pattern = Pattern::new(&unescape_glob(pattern)?)
        .map_err(|e| CelError::function("globMatch", e))?;

    let options = MatchOptions {
        case_sensitive: true,
        require_literal_separator: true,
        require_literal_leading_dot: false,
    };
    Ok(pattern.matches_with(key1, options))
}

/// Rewrite `\x` escapes into the bracket form the glob syntax understands
fn unescape_glob(pattern: &str) -> Result<String> {
    let mut out = String::with_capacity(pattern.len());
    let mut chars = pattern.chars();

    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some(meta @ ('*' | '?' | '[' | ']')) => {
                out.push('[');
                out.push(meta);
                out.push(']');
            }
            Some(literal) => out.push(literal),
            None => {
                return Err(CelError::function(
                    "globMatch",
                    format!("trailing escape in pattern '{}'", pattern),
                ))
            }
        }
    }
    Ok(out)
}

/// Named function namespace handed to every matcher evaluation
///
/// Clones share the same [`PatternCache`].
#[derive(Clone)]
pub struct FunctionMap {
    functions: HashMap<String, MatcherFn>,
    patterns: Arc<PatternCache>,
}

impl FunctionMap {
    /// Empty namespace without built-ins
    pub fn empty() -> Self {
        Self {
            functions: HashMap::new(),
            patterns: Arc::new(PatternCache::new()),
        }
    }

    /// Namespace pre-loaded with the built-in matcher functions
    pub fn with_builtins() -> Self {
        let mut map = Self::empty();
        map.add("keyMatch", key_match);
        map.add("ipMatch", ip_match);
        map.add("globMatch", glob_match);

        let patterns = Arc::clone(&map.patterns);
        map.add("keyMatch2", move |a: &str, b: &str| key_match2_in(Some(&patterns), a, b));
        let patterns = Arc::clone(&map.patterns);
        map.add("keyMatch3", move |a: &str, b: &str| key_match3_in(Some(&patterns), a, b));
        let patterns = Arc::clone(&map.patterns);
        map.add("regexMatch", move |a: &str, b: &str| {
            regex_match_named(Some(&patterns), "regexMatch", a, b)
        });
        map
    }

    /// Regular expressions compiled by this namespace's built-ins
    pub fn patterns(&self) -> &PatternCache {
        &self.patterns
    }

    /// Register (or replace) a function under `name`
    pub fn add<F>(&mut self, name: impl Into<String>, function: F)
    where
        F: Fn(&str, &str) -> Result<bool> + Send + Sync + 'static,
    {
        self.functions.insert(name.into(), Arc::new(function));
    }

    /// Look up a function by name
    pub fn get(&self, name: &str) -> Option<&MatcherFn> {
        self.functions.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &MatcherFn)> {
        self.functions.iter()
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}

impl Default for FunctionMap {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl fmt::Debug for FunctionMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.functions.keys().collect();
        names.sort();
        f.debug_struct("FunctionMap").field("functions", &names).finish()
    }
}
