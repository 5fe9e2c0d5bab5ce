//! Role graph type definitions

use std::sync::Arc;

use crate::cel::functions;

/// Node-equality predicate `(name, pattern) -> bool` used by role managers
///
/// Installed per relation to make role or resource groups pattern-based,
/// e.g. `keyMatch` so that `/book/1` is treated as a member of `/book/*`.
pub type MatchingFn = Arc<dyn Fn(&str, &str) -> bool + Send + Sync>;

/// Default depth bound for role reachability searches
pub const DEFAULT_MAX_HIERARCHY_LEVEL: usize = 10;

/// Wrap a built-in matcher function as a role-matching predicate
///
/// Matcher errors (e.g. an invalid regex) count as "no match".
pub fn matching_fn_from_builtin(name: &str) -> Option<MatchingFn> {
    let builtins = functions::FunctionMap::with_builtins();
    let builtin = Arc::clone(builtins.get(name)?);
    Some(Arc::new(move |a: &str, b: &str| builtin(a, b).unwrap_or(false)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_matching_fn() {
        let key_match = matching_fn_from_builtin("keyMatch").unwrap();
        assert!(key_match("/book/1", "/book/*"));
        assert!(!key_match("/pen/1", "/book/*"));

        let regex = matching_fn_from_builtin("regexMatch").unwrap();
        assert!(!regex("abc", "("));

        assert!(matching_fn_from_builtin("noSuchFunction").is_none());
    }
}
