//! Error types for the authorization engine

use crate::cel::CelError;
use thiserror::Error;

/// Authorization engine errors
#[derive(Debug, Error)]
pub enum AuthzError {
    /// Model is missing a required section or has a malformed definition
    #[error("Invalid model: {0}")]
    InvalidModel(String),

    /// Enforcer or adapter configuration problem
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// The `e` section names an effect combination this engine does not know
    #[error("Unsupported policy effect: {0}")]
    UnknownEffect(String),

    /// Request tuple length differs from the `r` definition
    #[error("Invalid request size: expected {expected} values, got {actual}")]
    RequestArity { expected: usize, actual: usize },

    /// Policy rule length differs from its assertion's definition
    #[error("Invalid policy size in '{key}': expected {expected} values, got {actual}")]
    PolicyShape {
        key: String,
        expected: usize,
        actual: usize,
    },

    /// Matcher evaluation error
    #[error("Policy evaluation failed: {0}")]
    Evaluation(#[from] CelError),

    /// Operation not supported by the configured adapter
    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    /// Attempt to persist a partially loaded policy
    #[error("Cannot save a filtered policy")]
    FilteredPolicy,

    /// `enforce` was called while enforcement is switched off
    #[error("Enforcer is disabled")]
    Disabled,

    /// Policy adapter failure
    #[error("Adapter error: {0}")]
    Adapter(String),

    /// Watcher notification failure
    #[error("Watcher error: {0}")]
    Watcher(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for authorization operations
pub type Result<T> = std::result::Result<T, AuthzError>;
