//! In-memory policy adapter

use async_trait::async_trait;

use super::{add_to_model, model_rows, section_of, Adapter, Filter};
use crate::error::Result;
use crate::model::Model;

/// Adapter keeping `(ptype, rule)` rows in a vector
#[derive(Debug, Clone, Default)]
pub struct MemoryAdapter {
    rules: Vec<(String, Vec<String>)>,
    filtered: bool,
}

impl MemoryAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed with rows, e.g. `("p", ["alice", "data1", "read"])`
    pub fn with_rules<I, S>(rules: I) -> Self
    where
        I: IntoIterator<Item = (S, Vec<S>)>,
        S: Into<String>,
    {
        Self {
            rules: rules
                .into_iter()
                .map(|(ptype, rule)| (ptype.into(), rule.into_iter().map(Into::into).collect()))
                .collect(),
            filtered: false,
        }
    }

    /// Stored rows, in insertion order
    pub fn rules(&self) -> &[(String, Vec<String>)] {
        &self.rules
    }
}

#[async_trait]
impl Adapter for MemoryAdapter {
    async fn load_policy(&mut self, model: &mut Model) -> Result<()> {
        for (ptype, rule) in &self.rules {
            add_to_model(model, ptype, rule.clone())?;
        }
        self.filtered = false;
        Ok(())
    }

    async fn load_filtered_policy(&mut self, model: &mut Model, filter: &Filter) -> Result<()> {
        for (ptype, rule) in &self.rules {
            if filter.accepts(ptype, rule) {
                add_to_model(model, ptype, rule.clone())?;
            }
        }
        self.filtered = true;
        Ok(())
    }

    async fn save_policy(&mut self, model: &Model) -> Result<()> {
        self.rules = model_rows(model);
        Ok(())
    }

    async fn add_policy(&mut self, _sec: &str, ptype: &str, rule: &[String]) -> Result<()> {
        section_of(ptype)?;
        if !self.rules.iter().any(|(t, r)| t == ptype && r.as_slice() == rule) {
            self.rules.push((ptype.to_string(), rule.to_vec()));
        }
        Ok(())
    }

    async fn remove_policy(&mut self, _sec: &str, ptype: &str, rule: &[String]) -> Result<()> {
        self.rules.retain(|(t, r)| !(t == ptype && r.as_slice() == rule));
        Ok(())
    }

    async fn remove_filtered_policy(
        &mut self,
        _sec: &str,
        ptype: &str,
        field_index: usize,
        field_values: &[String],
    ) -> Result<()> {
        self.rules.retain(|(t, r)| {
            let matches = t == ptype
                && field_values.iter().enumerate().all(|(i, v)| {
                    v.is_empty() || r.get(field_index + i).map_or(false, |x| x == v)
                });
            !matches
        });
        Ok(())
    }

    fn supports_filtering(&self) -> bool {
        true
    }

    fn is_filtered(&self) -> bool {
        self.filtered
    }
}
