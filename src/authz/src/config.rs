//! Enforcer configuration

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{AuthzError, Result};
use crate::roles::DEFAULT_MAX_HIERARCHY_LEVEL;

/// Enforcer configuration
///
/// Every field has a default, so a partial TOML file is accepted:
///
/// ```toml
/// auto_save = false
/// max_hierarchy_level = 5
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct EnforcerConfig {
    /// Evaluate requests; when false `enforce` fails with `Disabled`
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Persist management API changes through the adapter
    #[serde(default = "default_true")]
    pub auto_save: bool,

    /// Rebuild role links on policy load and keep them in sync on grouping changes
    #[serde(default = "default_true")]
    pub auto_build_role_links: bool,

    /// Notify the watcher after policy changes
    #[serde(default = "default_true")]
    pub auto_notify_watcher: bool,

    /// Maximum hops followed by role reachability queries
    #[serde(default = "default_max_hierarchy_level")]
    pub max_hierarchy_level: usize,

    /// Emit one log record per decision
    #[serde(default = "default_true")]
    pub log_decisions: bool,

    /// Keep compiled matcher programs between calls
    #[serde(default = "default_true")]
    pub cache_matchers: bool,
}

fn default_true() -> bool {
    true
}

fn default_max_hierarchy_level() -> usize {
    DEFAULT_MAX_HIERARCHY_LEVEL
}

impl Default for EnforcerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            auto_save: true,
            auto_build_role_links: true,
            auto_notify_watcher: true,
            max_hierarchy_level: DEFAULT_MAX_HIERARCHY_LEVEL,
            log_decisions: true,
            cache_matchers: true,
        }
    }
}

impl EnforcerConfig {
    /// Parse configuration from TOML text
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: EnforcerConfig = toml::from_str(text)
            .map_err(|e| AuthzError::Config(format!("failed to parse enforcer config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            AuthzError::Config(format!(
                "failed to read config file {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        Self::from_toml_str(&contents)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_hierarchy_level == 0 {
            return Err(AuthzError::Config(
                "max_hierarchy_level must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
