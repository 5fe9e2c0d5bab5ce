//! Error types for CEL operations

use thiserror::Error;

/// CEL operation errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CelError {
    #[error("CEL compilation failed: {0}")]
    CompilationError(String),

    #[error("CEL evaluation failed: {0}")]
    EvaluationError(String),

    #[error("Type conversion error: {0}")]
    TypeConversionError(String),

    #[error("Function '{function}' failed: {message}")]
    FunctionError { function: String, message: String },

    #[error("eval() refers to unknown policy field: {0}")]
    UnknownEvalRule(String),

    #[error("Matcher result should be a boolean or a number, got {0}")]
    InvalidMatcherResult(String),
}

impl CelError {
    pub(crate) fn function(function: &str, message: impl ToString) -> Self {
        CelError::FunctionError {
            function: function.to_string(),
            message: message.to_string(),
        }
    }
}

/// Result type for CEL operations
pub type Result<T> = std::result::Result<T, CelError>;
