//! Error types for the DMN library.

use thiserror::Error;

/// A hyperparameter combination the model cannot be built from.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("invalid config field `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl ConfigError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid { field, reason: reason.into() }
    }
}

/// Errors raised while building or running the model.
#[derive(Debug, Error)]
pub enum DmnError {
    /// Configuration rejected before graph construction
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A feature tensor disagrees with the declared shape contract
    #[error("shape mismatch for {what}: expected {expected}, got {got}")]
    ShapeMismatch { what: &'static str, expected: String, got: String },

    /// Teacher-forced decoding was requested on a batch without answers
    #[error("batch carries no answers; the training path needs target token ids")]
    MissingAnswers,
}

impl DmnError {
    pub(crate) fn shape(what: &'static str, expected: impl ToString, got: impl ToString) -> Self {
        Self::ShapeMismatch { what, expected: expected.to_string(), got: got.to_string() }
    }
}

/// Result type for DMN operations.
pub type Result<T> = std::result::Result<T, DmnError>;
