//! Core authorization types

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// Single request or policy value
///
/// Requests are usually plain strings (`alice`, `data1`, `read`), but ABAC
/// models pass attribute bags whose fields are read from the matcher with
/// dotted access (`r.obj.Owner`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// Boolean flag
    Bool(bool),
    /// Signed integer
    Int(i64),
    /// Floating point number
    Float(f64),
    /// Plain string (the common case)
    String(String),
    /// Keyed attribute bag
    Attributes(BTreeMap<String, Value>),
}

impl Value {
    /// Borrow the string payload, if this is a string value
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Look up an attribute on an attribute bag
    pub fn attribute(&self, name: &str) -> Option<&Value> {
        match self {
            Value::Attributes(attrs) => attrs.get(name),
            _ => None,
        }
    }

    /// Add an attribute, turning a non-bag value into an empty bag first
    pub fn with_attribute(self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        let mut attrs = match self {
            Value::Attributes(attrs) => attrs,
            _ => BTreeMap::new(),
        };
        attrs.insert(name.into(), value.into());
        Value::Attributes(attrs)
    }

    /// Empty attribute bag
    pub fn attributes() -> Self {
        Value::Attributes(BTreeMap::new())
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::String(s) => f.write_str(s),
            Value::Attributes(attrs) => {
                f.write_str("{")?;
                for (i, (k, v)) in attrs.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}: {}", k, v)?;
                }
                f.write_str("}")
            }
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<&String> for Value {
    fn from(s: &String) -> Self {
        Value::String(s.clone())
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<u32> for Value {
    fn from(i: u32) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<BTreeMap<String, Value>> for Value {
    fn from(attrs: BTreeMap<String, Value>) -> Self {
        Value::Attributes(attrs)
    }
}

impl From<HashMap<String, Value>> for Value {
    fn from(attrs: HashMap<String, Value>) -> Self {
        Value::Attributes(attrs.into_iter().collect())
    }
}

impl From<HashMap<String, String>> for Value {
    fn from(attrs: HashMap<String, String>) -> Self {
        Value::Attributes(
            attrs
                .into_iter()
                .map(|(k, v)| (k, Value::String(v)))
                .collect(),
        )
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        use serde_json::Value as JsonValue;

        match value {
            // No null in the closed value set; treat it as an empty string
            JsonValue::Null => Value::String(String::new()),
            JsonValue::Bool(b) => Value::Bool(b),
            JsonValue::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int(i)
                } else {
                    Value::Float(n.as_f64().unwrap_or_default())
                }
            }
            JsonValue::String(s) => Value::String(s),
            JsonValue::Array(items) => Value::Attributes(
                items
                    .into_iter()
                    .enumerate()
                    .map(|(i, v)| (i.to_string(), Value::from(v)))
                    .collect(),
            ),
            JsonValue::Object(obj) => Value::Attributes(
                obj.into_iter().map(|(k, v)| (k, Value::from(v))).collect(),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_value_from_str() {
        assert_eq!(Value::from("alice"), Value::String("alice".to_string()));
        assert_eq!(Value::from("alice").as_str(), Some("alice"));
    }

    #[test]
    fn test_attribute_builder() {
        let obj = Value::attributes()
            .with_attribute("Owner", "alice")
            .with_attribute("Age", 30);

        assert_eq!(obj.attribute("Owner"), Some(&Value::from("alice")));
        assert_eq!(obj.attribute("Age"), Some(&Value::Int(30)));
        assert!(obj.attribute("Missing").is_none());
    }

    #[test]
    fn test_value_from_json() {
        let value = Value::from(json!({"Owner": "alice", "Age": 25, "Score": 1.5}));

        assert_eq!(value.attribute("Owner"), Some(&Value::from("alice")));
        assert_eq!(value.attribute("Age"), Some(&Value::Int(25)));
        assert_eq!(value.attribute("Score"), Some(&Value::Float(1.5)));
    }

    #[test]
    fn test_display() {
        assert_eq!(Value::from("data1").to_string(), "data1");

        let obj = Value::attributes().with_attribute("Owner", "alice");
        assert_eq!(obj.to_string(), "{Owner: alice}");
    }

    #[test]
    fn test_untagged_deserialize() {
        let values: Vec<Value> = serde_json::from_str(r#"["alice", {"Owner": "bob"}, 3, true]"#).unwrap();

        assert_eq!(values[0], Value::from("alice"));
        assert_eq!(values[1].attribute("Owner"), Some(&Value::from("bob")));
        assert_eq!(values[2], Value::Int(3));
        assert_eq!(values[3], Value::Bool(true));
    }
}
