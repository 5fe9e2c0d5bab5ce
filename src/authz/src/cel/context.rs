//! Variable bindings for matcher evaluation

use std::collections::BTreeMap;

use crate::types::Value;

/// Flattened variables visible to a matcher (`r_sub`, `p_obj`, ...)
///
/// Tokens are stored already prefixed, exactly as the model lists them, so a
/// request token `r_sub` and a policy token `p_sub` can never collide.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Bindings {
    vars: BTreeMap<String, Value>,
}

impl Bindings {
    /// Create an empty binding set
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind request values positionally to the `r` tokens
    pub fn for_request(tokens: &[String], values: &[Value]) -> Self {
        let mut bindings = Self::new();
        for (token, value) in tokens.iter().zip(values.iter()) {
            bindings.vars.insert(token.clone(), value.clone());
        }
        bindings
    }

    /// Bind a policy rule positionally to the `p` tokens
    pub fn bind_rule(&mut self, tokens: &[String], rule: &[String]) {
        for (token, value) in tokens.iter().zip(rule.iter()) {
            self.vars.insert(token.clone(), Value::String(value.clone()));
        }
    }

    /// Bind every `p` token to the empty string (used when no rules exist)
    pub fn bind_empty_rule(&mut self, tokens: &[String]) {
        for token in tokens {
            self.vars.insert(token.clone(), Value::String(String::new()));
        }
    }

    /// Insert a single variable
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.vars.insert(name.into(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.vars.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.vars.iter()
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(prefix: &str, names: &[&str]) -> Vec<String> {
        names.iter().map(|n| format!("{}_{}", prefix, n)).collect()
    }

    #[test]
    fn test_request_bindings() {
        let values = vec![Value::from("alice"), Value::from("data1"), Value::from("read")];
        let bindings = Bindings::for_request(&tokens("r", &["sub", "obj", "act"]), &values);

        assert_eq!(bindings.len(), 3);
        assert_eq!(bindings.get("r_sub"), Some(&Value::from("alice")));
        assert_eq!(bindings.get("r_act"), Some(&Value::from("read")));
    }

    #[test]
    fn test_rule_bindings_overwrite_previous_rule() {
        let p_tokens = tokens("p", &["sub", "obj"]);
        let mut bindings = Bindings::new();

        bindings.bind_rule(&p_tokens, &["alice".to_string(), "data1".to_string()]);
        bindings.bind_rule(&p_tokens, &["bob".to_string(), "data2".to_string()]);

        assert_eq!(bindings.get("p_sub"), Some(&Value::from("bob")));
        assert_eq!(bindings.get("p_obj"), Some(&Value::from("data2")));
    }

    #[test]
    fn test_empty_rule_bindings() {
        let mut bindings = Bindings::new().with("r_sub", "alice");
        bindings.bind_empty_rule(&tokens("p", &["sub", "obj"]));

        assert_eq!(bindings.get("p_sub"), Some(&Value::from("")));
        assert_eq!(bindings.get("r_sub"), Some(&Value::from("alice")));
        assert!(!bindings.is_empty());
    }
}
