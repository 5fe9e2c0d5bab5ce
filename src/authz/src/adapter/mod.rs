//! Policy persistence adapters
//!
//! An [`Adapter`] moves policy rows between a store and a [`Model`]. The
//! enforcer serializes adapter calls behind an async mutex, so methods take
//! `&mut self`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{AuthzError, Result};
use crate::model::Model;

pub mod file;
pub mod memory;

pub use file::FileAdapter;
pub use memory::MemoryAdapter;

/// Field filter for partial policy loads
///
/// `p` filters policy rows and `g` filters role rows, positionally from the
/// first value after the policy type. An empty string matches any value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filter {
    #[serde(default)]
    pub p: Vec<String>,
    #[serde(default)]
    pub g: Vec<String>,
}

impl Filter {
    pub fn new(p: Vec<String>, g: Vec<String>) -> Self {
        Self { p, g }
    }

    /// Whether a row of `ptype` passes the filter
    pub fn accepts(&self, ptype: &str, rule: &[String]) -> bool {
        let fields = if ptype.starts_with('p') { &self.p } else { &self.g };
        fields
            .iter()
            .enumerate()
            .all(|(i, f)| f.is_empty() || rule.get(i).map_or(false, |v| v == f))
    }
}

/// Policy storage backend
#[async_trait]
pub trait Adapter: Send + Sync {
    /// Load every policy row into `model`
    async fn load_policy(&mut self, model: &mut Model) -> Result<()>;

    /// Load only the rows accepted by `filter`
    ///
    /// Adapters that cannot filter keep this default, which fails without
    /// touching the model.
    async fn load_filtered_policy(&mut self, _model: &mut Model, _filter: &Filter) -> Result<()> {
        Err(AuthzError::UnsupportedOperation(
            "adapter does not support filtered policy loading".to_string(),
        ))
    }

    /// Replace the stored policy with the model's rows
    async fn save_policy(&mut self, model: &Model) -> Result<()>;

    async fn add_policy(&mut self, sec: &str, ptype: &str, rule: &[String]) -> Result<()>;

    async fn add_policies(&mut self, sec: &str, ptype: &str, rules: &[Vec<String>]) -> Result<()> {
        for rule in rules {
            self.add_policy(sec, ptype, rule).await?;
        }
        Ok(())
    }

    async fn remove_policy(&mut self, sec: &str, ptype: &str, rule: &[String]) -> Result<()>;

    async fn remove_policies(&mut self, sec: &str, ptype: &str, rules: &[Vec<String>]) -> Result<()> {
        for rule in rules {
            self.remove_policy(sec, ptype, rule).await?;
        }
        Ok(())
    }

    async fn remove_filtered_policy(
        &mut self,
        _sec: &str,
        _ptype: &str,
        _field_index: usize,
        _field_values: &[String],
    ) -> Result<()> {
        Err(AuthzError::UnsupportedOperation(
            "adapter does not support filtered policy removal".to_string(),
        ))
    }

    /// Whether `load_filtered_policy` is implemented
    fn supports_filtering(&self) -> bool {
        false
    }

    /// Whether the last load was filtered
    fn is_filtered(&self) -> bool {
        false
    }
}

/// Add one textual policy line (`p, alice, data1, read`) to `model`
///
/// Blank lines and `#` comments are skipped.
pub fn load_policy_line(line: &str, model: &mut Model) -> Result<()> {
    let Some((ptype, rule)) = parse_policy_line(line)? else {
        return Ok(());
    };
    add_to_model(model, &ptype, rule)
}

/// Split a policy line into its type and values
///
/// Values are comma separated and trimmed; a value wrapped in double quotes
/// may contain commas, with `""` standing for a literal quote.
pub fn parse_policy_line(line: &str) -> Result<Option<(String, Vec<String>)>> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }

    let mut fields = split_fields(line)?.into_iter();
    let ptype = fields.next().unwrap_or_default();
    let rule: Vec<String> = fields.collect();
    if ptype.is_empty() || rule.is_empty() {
        return Err(AuthzError::Adapter(format!("malformed policy line: {}", line)));
    }
    Ok(Some((ptype, rule)))
}

/// Render a row in the form `load_policy_line` reads back
pub fn format_policy_line(ptype: &str, rule: &[String]) -> String {
    let mut fields = Vec::with_capacity(rule.len() + 1);
    fields.push(ptype.to_string());
    for value in rule {
        if value.contains(',') || value.contains('"') {
            fields.push(format!("\"{}\"", value.replace('"', "\"\"")));
        } else {
            fields.push(value.clone());
        }
    }
    fields.join(", ")
}

/// Section a policy type belongs to (`p2` -> `p`, `g3` -> `g`)
pub fn section_of(ptype: &str) -> Result<&'static str> {
    match ptype.chars().next() {
        Some('p') => Ok("p"),
        Some('g') => Ok("g"),
        _ => Err(AuthzError::Adapter(format!("unknown policy type '{}'", ptype))),
    }
}

pub(crate) fn add_to_model(model: &mut Model, ptype: &str, rule: Vec<String>) -> Result<()> {
    let sec = section_of(ptype)?;
    if model.assertion(sec, ptype).is_none() {
        return Err(AuthzError::Adapter(format!(
            "policy type '{}' is not defined by the model",
            ptype
        )));
    }
    // duplicates in the store are ignored
    model.add_policy(sec, ptype, rule);
    Ok(())
}

/// Every `p*` and `g*` row of `model` as `(ptype, rule)` pairs
pub(crate) fn model_rows(model: &Model) -> Vec<(String, Vec<String>)> {
    ["p", "g"]
        .iter()
        .flat_map(|sec| model.section(sec))
        .flat_map(|a| a.policy.iter().map(move |rule| (a.key.clone(), rule.clone())))
        .collect()
}

fn split_fields(line: &str) -> Result<Vec<String>> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut chars = line.chars().peekable();
    let mut in_quotes = false;

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                current.push('"');
                chars.next();
            }
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => fields.push(std::mem::take(&mut current).trim().to_string()),
            _ => current.push(c),
        }
    }

    if in_quotes {
        return Err(AuthzError::Adapter(format!("unterminated quote in policy line: {}", line)));
    }
    fields.push(current.trim().to_string());
    Ok(fields)
}
