//! PERM model: request, policy, role, matcher and effect definitions
//!
//! A [`Model`] groups [`Assertion`]s by section (`r`, `p`, `g`, `m`, `e`).
//! Each section may hold several keyed assertions (`g`, `g2`, ...). Request
//! and policy assertions carry prefixed tokens (`r_sub`, `p_obj`) that become
//! matcher variable names; policy and role assertions also own their rows.

mod parser;

use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

use crate::cel::matcher::escape_assertion;
use crate::effect::EffectKind;
use crate::error::{AuthzError, Result};
use crate::roles::RoleLinkTable;

/// Sections every enforceable model must define
pub const REQUIRED_SECTIONS: [&str; 4] = ["r", "p", "e", "m"];

/// Single model definition, plus its rows for `p`/`g` assertions
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Assertion {
    /// Assertion key (`r`, `p`, `g2`, ...)
    pub key: String,

    /// Definition text; for `m`/`e` the escaped expression
    pub value: String,

    /// Token names (`p_sub`, `p_obj`, ... or `_` placeholders for roles)
    pub tokens: Vec<String>,

    /// Policy rows, in load order
    pub policy: Vec<Vec<String>>,
}

impl Assertion {
    /// Position of a token, if the assertion defines it
    pub fn token_index(&self, token: &str) -> Option<usize> {
        self.tokens.iter().position(|t| t == token)
    }

    /// Position of the explicit `eft` column
    pub fn eft_index(&self) -> Option<usize> {
        self.token_index(&format!("{}_eft", self.key))
    }

    /// Position of the explicit `priority` column
    pub fn priority_index(&self) -> Option<usize> {
        self.token_index(&format!("{}_priority", self.key))
    }

    fn has_rule(&self, rule: &[String]) -> bool {
        self.policy.iter().any(|r| r.as_slice() == rule)
    }

    fn sort_by_priority(&mut self) -> Result<()> {
        let Some(index) = self.priority_index() else {
            return Ok(());
        };

        let mut keyed = Vec::with_capacity(self.policy.len());
        for rule in self.policy.drain(..) {
            let priority = rule
                .get(index)
                .and_then(|p| p.trim().parse::<i64>().ok())
                .ok_or_else(|| {
                    AuthzError::InvalidModel(format!(
                        "policy rule {:?} has no numeric priority",
                        rule
                    ))
                })?;
            keyed.push((priority, rule));
        }

        // stable: equal priorities keep document order
        keyed.sort_by_key(|(priority, _)| *priority);
        self.policy = keyed.into_iter().map(|(_, rule)| rule).collect();
        Ok(())
    }
}

/// In-memory PERM model
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Model {
    sections: BTreeMap<String, BTreeMap<String, Assertion>>,
}

impl Model {
    /// Create an empty model
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a model from its INI-style text
    pub fn from_text(text: &str) -> Result<Self> {
        let mut model = Self::new();
        for (section, key, value) in parser::parse(text)? {
            model.add_def(&section, &key, &value);
        }
        Ok(model)
    }

    /// Read and parse a model file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_text(&text)
    }

    /// Register a definition; returns false for an empty value
    pub fn add_def(&mut self, section: &str, key: &str, value: &str) -> bool {
        let value = value.trim();
        if value.is_empty() {
            return false;
        }

        let mut assertion = Assertion {
            key: key.to_string(),
            value: value.to_string(),
            ..Default::default()
        };

        match section {
            "r" | "p" => {
                assertion.tokens = value
                    .split(',')
                    .map(|t| format!("{}_{}", key, t.trim()))
                    .collect();
            }
            "g" => {
                assertion.tokens = value.split(',').map(|t| t.trim().to_string()).collect();
            }
            _ => {
                assertion.value = escape_assertion(value);
            }
        }

        self.sections
            .entry(section.to_string())
            .or_default()
            .insert(key.to_string(), assertion);
        true
    }

    /// Check that every required section exists and the effect is known
    pub fn validate(&self) -> Result<()> {
        for section in REQUIRED_SECTIONS {
            if self.assertion(section, section).is_none() {
                return Err(AuthzError::InvalidModel(format!(
                    "missing required section '{}'",
                    section
                )));
            }
        }
        self.effect_kind()?;
        Ok(())
    }

    pub fn assertion(&self, section: &str, key: &str) -> Option<&Assertion> {
        self.sections.get(section).and_then(|s| s.get(key))
    }

    pub fn assertion_mut(&mut self, section: &str, key: &str) -> Option<&mut Assertion> {
        self.sections.get_mut(section).and_then(|s| s.get_mut(key))
    }

    /// Assertions of one section, ordered by key
    pub fn section(&self, section: &str) -> impl Iterator<Item = &Assertion> {
        self.sections.get(section).into_iter().flat_map(|s| s.values())
    }

    /// Escaped matcher expression of `m`
    pub fn matcher(&self) -> Result<&str> {
        self.assertion("m", "m")
            .map(|a| a.value.as_str())
            .ok_or_else(|| AuthzError::InvalidModel("missing matcher section 'm'".to_string()))
    }

    /// Effect-combination strategy named by `e`
    pub fn effect_kind(&self) -> Result<EffectKind> {
        self.assertion("e", "e")
            .ok_or_else(|| AuthzError::InvalidModel("missing effect section 'e'".to_string()))?
            .value
            .parse()
    }

    // ========================================================================
    // Policy rows
    // ========================================================================

    /// Append a rule; false if the assertion is unknown or the rule exists
    pub fn add_policy(&mut self, section: &str, ptype: &str, rule: Vec<String>) -> bool {
        match self.assertion_mut(section, ptype) {
            Some(assertion) if !assertion.has_rule(&rule) => {
                assertion.policy.push(rule);
                true
            }
            _ => false,
        }
    }

    /// Append several rules; nothing is added if any of them already exists
    pub fn add_policies(&mut self, section: &str, ptype: &str, rules: Vec<Vec<String>>) -> bool {
        let Some(assertion) = self.assertion_mut(section, ptype) else {
            return false;
        };
        if rules.iter().any(|r| assertion.has_rule(r)) {
            return false;
        }
        assertion.policy.extend(rules);
        true
    }

    /// Remove a rule; false if it was not present
    pub fn remove_policy(&mut self, section: &str, ptype: &str, rule: &[String]) -> bool {
        let Some(assertion) = self.assertion_mut(section, ptype) else {
            return false;
        };
        let before = assertion.policy.len();
        assertion.policy.retain(|r| r.as_slice() != rule);
        assertion.policy.len() != before
    }

    /// Remove every rule whose fields from `field_index` on equal
    /// `field_values` (an empty value matches anything); returns removed rows
    pub fn remove_filtered_policy(
        &mut self,
        section: &str,
        ptype: &str,
        field_index: usize,
        field_values: &[String],
    ) -> Vec<Vec<String>> {
        let Some(assertion) = self.assertion_mut(section, ptype) else {
            return Vec::new();
        };
        let (removed, kept) = std::mem::take(&mut assertion.policy)
            .into_iter()
            .partition(|rule| rule_matches(rule, field_index, field_values));
        assertion.policy = kept;
        removed
    }

    pub fn has_policy(&self, section: &str, ptype: &str, rule: &[String]) -> bool {
        self.assertion(section, ptype)
            .map_or(false, |a| a.has_rule(rule))
    }

    pub fn get_policy(&self, section: &str, ptype: &str) -> Vec<Vec<String>> {
        self.assertion(section, ptype)
            .map(|a| a.policy.clone())
            .unwrap_or_default()
    }

    pub fn get_filtered_policy(
        &self,
        section: &str,
        ptype: &str,
        field_index: usize,
        field_values: &[String],
    ) -> Vec<Vec<String>> {
        self.assertion(section, ptype)
            .map(|a| {
                a.policy
                    .iter()
                    .filter(|rule| rule_matches(rule, field_index, field_values))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Distinct values of one column
    pub fn get_values_for_field(&self, section: &str, ptype: &str, field_index: usize) -> Vec<String> {
        let mut values: Vec<String> = Vec::new();
        for assertion in self.assertion(section, ptype) {
            for rule in &assertion.policy {
                if let Some(value) = rule.get(field_index) {
                    if !values.contains(value) {
                        values.push(value.clone());
                    }
                }
            }
        }
        values
    }

    /// Drop every `p` and `g` row, keeping the definitions
    pub fn clear_policy(&mut self) {
        for section in ["p", "g"] {
            if let Some(assertions) = self.sections.get_mut(section) {
                for assertion in assertions.values_mut() {
                    assertion.policy.clear();
                }
            }
        }
    }

    /// Order `p` rows by their `priority` column, when the model has one
    pub fn sort_policies_by_priority(&mut self) -> Result<()> {
        if let Some(assertions) = self.sections.get_mut("p") {
            for assertion in assertions.values_mut() {
                assertion.sort_by_priority()?;
            }
        }
        Ok(())
    }

    // ========================================================================
    // Role links
    // ========================================================================

    /// Feed every `g*` row into the role manager registered for its key
    ///
    /// Managers are created on demand; existing links are kept, so callers
    /// rebuilding from scratch clear the table first.
    pub fn build_role_links(&self, table: &mut RoleLinkTable) -> Result<()> {
        for assertion in self.section("g") {
            let manager = table.manager_or_default(&assertion.key);
            let mut manager = manager.write();
            for rule in &assertion.policy {
                let (name1, name2, domain) = split_link(&assertion.key, rule)?;
                manager.add_link(name1, name2, domain);
            }
        }
        Ok(())
    }

    /// Apply added or removed `g*` rows to an already built table
    pub fn build_incremental_role_links(
        &self,
        table: &mut RoleLinkTable,
        op: PolicyOp,
        ptype: &str,
        rules: &[Vec<String>],
    ) -> Result<()> {
        if self.assertion("g", ptype).is_none() {
            return Ok(());
        }
        let manager = table.manager_or_default(ptype);
        let mut manager = manager.write();
        for rule in rules {
            let (name1, name2, domain) = split_link(ptype, rule)?;
            match op {
                PolicyOp::Add => manager.add_link(name1, name2, domain),
                PolicyOp::Remove => manager.delete_link(name1, name2, domain),
            }
        }
        Ok(())
    }

    /// Dump the model and rows at debug level
    pub fn log_model(&self) {
        for (section, assertions) in &self.sections {
            for assertion in assertions.values() {
                debug!(section = %section, key = %assertion.key, value = %assertion.value, "Model definition");
                for rule in &assertion.policy {
                    debug!(key = %assertion.key, rule = %rule.join(", "), "Policy rule");
                }
            }
        }
    }
}

/// Direction of an incremental policy change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyOp {
    Add,
    Remove,
}

fn rule_matches(rule: &[String], field_index: usize, field_values: &[String]) -> bool {
    field_values.iter().enumerate().all(|(i, value)| {
        value.is_empty() || rule.get(field_index + i).map_or(false, |v| v == value)
    })
}

fn split_link<'a>(key: &str, rule: &'a [String]) -> Result<(&'a str, &'a str, &'a str)> {
    match rule {
        [name1, name2] => Ok((name1, name2, "")),
        [name1, name2, domain, ..] => Ok((name1, name2, domain)),
        _ => Err(AuthzError::PolicyShape {
            key: key.to_string(),
            expected: 2,
            actual: rule.len(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASIC: &str = r#"
[request_definition]
r = sub, obj, act

[policy_definition]
p = sub, obj, act

[policy_effect]
e = some(where (p.eft == allow))

[matchers]
m = r.sub == p.sub && r.obj == p.obj && r.act == p.act
"#;

    fn rule(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn test_add_def_tokens() {
        let mut model = Model::new();
        assert!(model.add_def("r", "r", "sub, obj, act"));
        assert!(model.add_def("g", "g", "_, _, _"));
        assert!(!model.add_def("p", "p", "  "));

        assert_eq!(model.assertion("r", "r").unwrap().tokens, vec!["r_sub", "r_obj", "r_act"]);
        assert_eq!(model.assertion("g", "g").unwrap().tokens, vec!["_", "_", "_"]);
        assert!(model.assertion("p", "p").is_none());
    }

    #[test]
    fn test_matcher_is_escaped() {
        let model = Model::from_text(BASIC).unwrap();
        assert_eq!(
            model.matcher().unwrap(),
            "r_sub == p_sub && r_obj == p_obj && r_act == p_act"
        );
        assert_eq!(model.effect_kind().unwrap(), EffectKind::AllowOverride);
    }

    #[test]
    fn test_validate_missing_section() {
        let mut model = Model::new();
        model.add_def("r", "r", "sub, obj, act");
        model.add_def("p", "p", "sub, obj, act");
        model.add_def("m", "m", "r.sub == p.sub");

        assert!(matches!(model.validate(), Err(AuthzError::InvalidModel(_))));

        model.add_def("e", "e", "some(where (p.eft == allow))");
        assert!(model.validate().is_ok());
    }

    #[test]
    fn test_validate_unknown_effect() {
        let mut model = Model::from_text(BASIC).unwrap();
        model.add_def("e", "e", "max(p.eft)");
        assert!(matches!(model.validate(), Err(AuthzError::UnknownEffect(_))));
    }

    #[test]
    fn test_policy_operations() {
        let mut model = Model::from_text(BASIC).unwrap();

        assert!(model.add_policy("p", "p", rule(&["alice", "data1", "read"])));
        assert!(!model.add_policy("p", "p", rule(&["alice", "data1", "read"])));
        assert!(!model.add_policy("p", "p9", rule(&["alice", "data1", "read"])));
        assert!(model.has_policy("p", "p", &rule(&["alice", "data1", "read"])));

        assert!(model.add_policies("p", "p", vec![rule(&["bob", "data2", "write"]), rule(&["bob", "data1", "read"])]));
        assert!(!model.add_policies("p", "p", vec![rule(&["carol", "data2", "write"]), rule(&["bob", "data1", "read"])]));
        assert_eq!(model.get_policy("p", "p").len(), 3);

        assert!(model.remove_policy("p", "p", &rule(&["alice", "data1", "read"])));
        assert!(!model.remove_policy("p", "p", &rule(&["alice", "data1", "read"])));
        assert_eq!(model.get_policy("p", "p").len(), 2);
    }

    #[test]
    fn test_filtered_policy() {
        let mut model = Model::from_text(BASIC).unwrap();
        model.add_policy("p", "p", rule(&["alice", "data1", "read"]));
        model.add_policy("p", "p", rule(&["alice", "data2", "write"]));
        model.add_policy("p", "p", rule(&["bob", "data2", "write"]));

        let filtered = model.get_filtered_policy("p", "p", 0, &rule(&["alice"]));
        assert_eq!(filtered.len(), 2);

        let filtered = model.get_filtered_policy("p", "p", 1, &rule(&["data2", "write"]));
        assert_eq!(filtered.len(), 2);

        let filtered = model.get_filtered_policy("p", "p", 0, &rule(&["", "data1"]));
        assert_eq!(filtered, vec![rule(&["alice", "data1", "read"])]);

        let removed = model.remove_filtered_policy("p", "p", 0, &rule(&["alice"]));
        assert_eq!(removed.len(), 2);
        assert_eq!(model.get_policy("p", "p"), vec![rule(&["bob", "data2", "write"])]);

        assert_eq!(model.get_values_for_field("p", "p", 0), vec!["bob"]);
    }

    #[test]
    fn test_clear_policy_keeps_definitions() {
        let mut model = Model::from_text(BASIC).unwrap();
        model.add_def("g", "g", "_, _");
        model.add_policy("p", "p", rule(&["alice", "data1", "read"]));
        model.add_policy("g", "g", rule(&["alice", "admin"]));

        model.clear_policy();

        assert!(model.get_policy("p", "p").is_empty());
        assert!(model.get_policy("g", "g").is_empty());
        assert!(model.assertion("g", "g").is_some());
    }

    #[test]
    fn test_priority_sort_is_stable() {
        let mut model = Model::new();
        model.add_def("p", "p", "priority, sub, obj, act, eft");
        model.add_policy("p", "p", rule(&["10", "alice", "data1", "read", "deny"]));
        model.add_policy("p", "p", rule(&["1", "bob", "data1", "read", "allow"]));
        model.add_policy("p", "p", rule(&["10", "carol", "data1", "read", "allow"]));

        model.sort_policies_by_priority().unwrap();

        let subjects: Vec<String> = model.get_policy("p", "p").into_iter().map(|r| r[1].clone()).collect();
        assert_eq!(subjects, vec!["bob", "alice", "carol"]);
        assert_eq!(model.assertion("p", "p").unwrap().eft_index(), Some(4));
    }

    #[test]
    fn test_priority_sort_rejects_non_numeric() {
        let mut model = Model::new();
        model.add_def("p", "p", "priority, sub");
        model.add_policy("p", "p", rule(&["high", "alice"]));
        assert!(model.sort_policies_by_priority().is_err());
    }

    #[test]
    fn test_no_priority_column_keeps_order() {
        let mut model = Model::from_text(BASIC).unwrap();
        model.add_policy("p", "p", rule(&["b", "data1", "read"]));
        model.add_policy("p", "p", rule(&["a", "data1", "read"]));
        model.sort_policies_by_priority().unwrap();
        assert_eq!(model.get_policy("p", "p")[0][0], "b");
    }

    #[test]
    fn test_build_role_links() {
        let mut model = Model::from_text(BASIC).unwrap();
        model.add_def("g", "g", "_, _");
        model.add_def("g", "g2", "_, _, _");
        model.add_policy("g", "g", rule(&["alice", "admin"]));
        model.add_policy("g", "g2", rule(&["bob", "editor", "tenant1"]));

        let mut table = RoleLinkTable::new(10);
        model.build_role_links(&mut table).unwrap();

        let g = table.get("g").unwrap();
        assert!(g.read().has_link("alice", "admin", ""));
        let g2 = table.get("g2").unwrap();
        assert!(g2.read().has_link("bob", "editor", "tenant1"));
        assert!(!g2.read().has_link("bob", "editor", "tenant2"));
    }

    #[test]
    fn test_build_role_links_rejects_short_rows() {
        let mut model = Model::from_text(BASIC).unwrap();
        model.add_def("g", "g", "_, _");
        model.add_policy("g", "g", rule(&["alice"]));

        let mut table = RoleLinkTable::new(10);
        let result = model.build_role_links(&mut table);
        assert!(matches!(result, Err(AuthzError::PolicyShape { expected: 2, actual: 1, .. })));
    }

    #[test]
    fn test_incremental_role_links() {
        let mut model = Model::from_text(BASIC).unwrap();
        model.add_def("g", "g", "_, _");
        let mut table = RoleLinkTable::new(10);
        model.build_role_links(&mut table).unwrap();

        let rules = vec![rule(&["alice", "admin"])];
        model.build_incremental_role_links(&mut table, PolicyOp::Add, "g", &rules).unwrap();
        assert!(table.get("g").unwrap().read().has_link("alice", "admin", ""));

        model.build_incremental_role_links(&mut table, PolicyOp::Remove, "g", &rules).unwrap();
        assert!(!table.get("g").unwrap().read().has_link("alice", "admin", ""));
    }
}
