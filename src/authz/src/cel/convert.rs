//! Value conversion between engine values and cel_interpreter types

use cel_interpreter::objects::{Key, Map, Value as CelValue};
use std::collections::HashMap;
use std::sync::Arc;

use crate::cel::error::{CelError, Result};
use crate::types::Value;

/// Outcome of a single matcher evaluation
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MatcherOutcome {
    /// Boolean matcher
    Bool(bool),
    /// Numeric matcher; zero means "did not match"
    Number(f64),
}

impl MatcherOutcome {
    /// Whether the row matched
    pub fn is_match(&self) -> bool {
        match self {
            MatcherOutcome::Bool(b) => *b,
            MatcherOutcome::Number(n) => *n != 0.0,
        }
    }
}

/// Convert an engine value to a cel_interpreter value
pub fn to_cel(value: &Value) -> CelValue {
    match value {
        Value::Bool(b) => CelValue::Bool(*b),
        Value::Int(i) => CelValue::Int(*i),
        Value::Float(f) => CelValue::Float(*f),
        Value::String(s) => CelValue::String(Arc::new(s.clone())),
        Value::Attributes(attrs) => {
            let map_data: HashMap<Key, CelValue> = attrs
                .iter()
                .map(|(k, v)| (Key::from(k.clone()), to_cel(v)))
                .collect();
            CelValue::Map(Map {
                map: Arc::new(map_data),
            })
        }
    }
}

/// Interpret a matcher result as boolean or number
///
/// # Errors
/// Returns an error if the expression produced any other kind of value
pub fn to_outcome(value: &CelValue) -> Result<MatcherOutcome> {
    match value {
        CelValue::Bool(b) => Ok(MatcherOutcome::Bool(*b)),
        CelValue::Int(i) => Ok(MatcherOutcome::Number(*i as f64)),
        CelValue::UInt(u) => Ok(MatcherOutcome::Number(*u as f64)),
        CelValue::Float(f) => Ok(MatcherOutcome::Number(*f)),
        other => Err(CelError::InvalidMatcherResult(format!("{:?}", other))),
    }
}

/// Extract a string argument passed to a matcher function
pub fn arg_as_str<'a>(function: &str, value: &'a CelValue) -> Result<&'a str> {
    match value {
        CelValue::String(s) => Ok(s.as_str()),
        other => Err(CelError::TypeConversionError(format!(
            "{} expects string arguments, got {:?}",
            function, other
        ))),
    }
}
