//! CSV-style policy file adapter
//!
//! ```text
//! p, alice, data1, read
//! p, bob, data2, write
//! g, alice, data2_admin
//! ```

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::debug;

use super::{add_to_model, format_policy_line, model_rows, parse_policy_line, Adapter, Filter};
use crate::error::Result;
use crate::model::Model;

/// Adapter backed by a policy file on disk
#[derive(Debug, Clone)]
pub struct FileAdapter {
    path: PathBuf,
    filtered: bool,
}

impl FileAdapter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            filtered: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_rows(&self) -> Result<Vec<(String, Vec<String>)>> {
        let text = tokio::fs::read_to_string(&self.path).await?;
        let mut rows = Vec::new();
        for line in text.lines() {
            if let Some(row) = parse_policy_line(line)? {
                rows.push(row);
            }
        }
        Ok(rows)
    }

    async fn write_rows(&self, rows: &[(String, Vec<String>)]) -> Result<()> {
        let mut text = String::new();
        for (ptype, rule) in rows {
            text.push_str(&format_policy_line(ptype, rule));
            text.push('\n');
        }
        tokio::fs::write(&self.path, text).await?;
        Ok(())
    }
}

#[async_trait]
impl Adapter for FileAdapter {
    async fn load_policy(&mut self, model: &mut Model) -> Result<()> {
        let rows = self.read_rows().await?;
        debug!(path = %self.path.display(), rows = rows.len(), "Loading policy file");
        for (ptype, rule) in rows {
            add_to_model(model, &ptype, rule)?;
        }
        self.filtered = false;
        Ok(())
    }

    async fn load_filtered_policy(&mut self, model: &mut Model, filter: &Filter) -> Result<()> {
        let rows = self.read_rows().await?;
        for (ptype, rule) in rows {
            if filter.accepts(&ptype, &rule) {
                add_to_model(model, &ptype, rule)?;
            }
        }
        self.filtered = true;
        Ok(())
    }

    async fn save_policy(&mut self, model: &Model) -> Result<()> {
        self.write_rows(&model_rows(model)).await
    }

    async fn add_policy(&mut self, _sec: &str, ptype: &str, rule: &[String]) -> Result<()> {
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(format!("{}\n", format_policy_line(ptype, rule)).as_bytes())
            .await?;
        file.flush().await?;
        Ok(())
    }

    async fn remove_policy(&mut self, _sec: &str, ptype: &str, rule: &[String]) -> Result<()> {
        let mut rows = self.read_rows().await?;
        rows.retain(|(t, r)| !(t == ptype && r.as_slice() == rule));
        self.write_rows(&rows).await
    }

    async fn remove_filtered_policy(
        &mut self,
        _sec: &str,
        ptype: &str,
        field_index: usize,
        field_values: &[String],
    ) -> Result<()> {
        let mut rows = self.read_rows().await?;
        rows.retain(|(t, r)| {
            let matches = t == ptype
                && field_values.iter().enumerate().all(|(i, v)| {
                    v.is_empty() || r.get(field_index + i).map_or(false, |x| x == v)
                });
            !matches
        });
        self.write_rows(&rows).await
    }

    fn supports_filtering(&self) -> bool {
        true
    }

    fn is_filtered(&self) -> bool {
        self.filtered
    }
}
