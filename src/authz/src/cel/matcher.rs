//! Matcher text rewriting
//!
//! Model text refers to request and policy fields with dotted names
//! (`r.sub`, `p.obj`, `r.obj.Owner`). CEL sees the flattened variables the
//! enforcer binds (`r_sub`, `p_obj`, `r_obj.Owner`), so the prefix dot is
//! rewritten before compilation. Attribute access after the first dot is left
//! alone and resolves as a CEL map field.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use crate::cel::context::Bindings;
use crate::cel::error::{CelError, Result};

static ASSERTION_PREFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b([rp][0-9]*)\.").expect("static assertion prefix pattern")
});

static EVAL_CALL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\beval\(([^),]*)\)").expect("static eval() pattern")
});

/// Rewrite `r.x` / `p.x` (and `r2.x`, ...) to `r_x` / `p_x`
pub fn escape_assertion(text: &str) -> String {
    ASSERTION_PREFIX.replace_all(text, "${1}_").into_owned()
}

/// Whether the matcher contains an `eval(...)` meta-call
pub fn has_eval(expr: &str) -> bool {
    EVAL_CALL.is_match(expr)
}

/// Policy field names referenced by `eval(...)` calls, in order
pub fn eval_rule_names(expr: &str) -> Vec<String> {
    EVAL_CALL
        .captures_iter(expr)
        .map(|c| c[1].trim().to_string())
        .collect()
}

/// Replace every `eval(field)` with the parenthesized, escaped rule text the
/// current policy row holds in `field`
///
/// # Errors
/// Returns an error if a referenced field is not bound to a string
pub fn expand_eval(expr: &str, bindings: &Bindings) -> Result<String> {
    let mut missing: Option<String> = None;

    let expanded = EVAL_CALL.replace_all(expr, |caps: &Captures| {
        let name = caps[1].trim();
        match bindings.get(name).and_then(|v| v.as_str()) {
            Some(rule) => format!("({})", escape_assertion(rule)),
            None => {
                missing.get_or_insert_with(|| name.to_string());
                String::new()
            }
        }
    });

    match missing {
        Some(name) => Err(CelError::UnknownEvalRule(name)),
        None => Ok(expanded.into_owned()),
    }
}
