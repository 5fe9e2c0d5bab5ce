//! INI-style model text parser
//!
//! ```text
//! [request_definition]
//! r = sub, obj, act
//!
//! [matchers]
//! m = r.sub == p.sub \
//!     && r.act == p.act
//! ```

use crate::error::{AuthzError, Result};

/// Map a section header to its short key
fn section_key(header: &str) -> Option<&'static str> {
    match header {
        "request_definition" => Some("r"),
        "policy_definition" => Some("p"),
        "role_definition" => Some("g"),
        "policy_effect" => Some("e"),
        "matchers" => Some("m"),
        _ => None,
    }
}

/// Parse model text into `(section, key, value)` definitions in file order
pub(crate) fn parse(text: &str) -> Result<Vec<(String, String, String)>> {
    let mut defs = Vec::new();
    let mut section: Option<&'static str> = None;
    let mut pending = String::new();

    for (lineno, raw) in text.lines().enumerate() {
        let line = raw.trim();

        if pending.is_empty() && (line.is_empty() || line.starts_with('#') || line.starts_with(';')) {
            continue;
        }

        if pending.is_empty() && line.starts_with('[') {
            let header = line
                .strip_prefix('[')
                .and_then(|l| l.strip_suffix(']'))
                .ok_or_else(|| invalid(lineno, "unterminated section header"))?;
            section = Some(
                section_key(header.trim())
                    .ok_or_else(|| invalid(lineno, &format!("unknown section [{}]", header)))?,
            );
            continue;
        }

        if let Some(continued) = line.strip_suffix('\\') {
            pending.push_str(continued.trim_end());
            pending.push(' ');
            continue;
        }

        pending.push_str(line);
        let definition = std::mem::take(&mut pending);

        let sec = section.ok_or_else(|| invalid(lineno, "definition outside of a section"))?;
        let (key, value) = definition
            .split_once('=')
            .ok_or_else(|| invalid(lineno, "expected 'key = value'"))?;
        let key = key.trim();
        if !key.starts_with(sec) {
            return Err(invalid(
                lineno,
                &format!("key '{}' does not belong to section '{}'", key, sec),
            ));
        }
        defs.push((sec.to_string(), key.to_string(), value.trim().to_string()));
    }

    if !pending.is_empty() {
        return Err(AuthzError::InvalidModel(
            "model text ends inside a continued line".to_string(),
        ));
    }

    Ok(defs)
}

fn invalid(lineno: usize, message: &str) -> AuthzError {
    AuthzError::InvalidModel(format!("line {}: {}", lineno + 1, message))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sections() {
        let text = r#"
# basic model
[request_definition]
r = sub, obj, act

[policy_definition]
p = sub, obj, act

[role_definition]
g = _, _
g2 = _, _, _

[policy_effect]
e = some(where (p.eft == allow))

[matchers]
m = g(r.sub, p.sub) && r.obj == p.obj
"#;
        let defs = parse(text).unwrap();
        let keys: Vec<(&str, &str)> = defs.iter().map(|(s, k, _)| (s.as_str(), k.as_str())).collect();
        assert_eq!(
            keys,
            vec![("r", "r"), ("p", "p"), ("g", "g"), ("g", "g2"), ("e", "e"), ("m", "m")]
        );
        assert_eq!(defs[4].2, "some(where (p.eft == allow))");
    }

    #[test]
    fn test_value_may_contain_equals() {
        let defs = parse("[matchers]\nm = r.sub == p.sub").unwrap();
        assert_eq!(defs[0].2, "r.sub == p.sub");
    }

    #[test]
    fn test_line_continuation() {
        let text = "[matchers]\nm = r.sub == p.sub \\\n    && r.act == p.act\n";
        let defs = parse(text).unwrap();
        assert_eq!(defs[0].2, "r.sub == p.sub && r.act == p.act");
    }

    #[test]
    fn test_errors() {
        assert!(parse("r = sub").is_err());
        assert!(parse("[unknown]\nx = 1").is_err());
        assert!(parse("[matchers]\nm r.sub").is_err());
        assert!(parse("[matchers]\nr = sub").is_err());
        assert!(parse("[matchers]\nm = a \\").is_err());
    }
}
