//! Engine error type

use tierline_core::{EnvironmentError, ReferentialError, ValidationError};

/// Everything an engine operation can fail with
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Referential(#[from] ReferentialError),

    #[error(transparent)]
    Environment(#[from] EnvironmentError),

    #[error("metric '{0}' not found")]
    MetricNotFound(String),

    #[error("schema dictionary not found")]
    DictionaryNotFound,
}

impl EngineError {
    /// Failures a caller may retry after fixing configuration or I/O
    pub fn is_environment(&self) -> bool {
        matches!(self, Self::Environment(_) | Self::DictionaryNotFound)
    }

    /// Remediation hint, if the error class has one
    pub fn hint(&self) -> Option<&str> {
        match self {
            Self::Environment(e) => Some(e.hint()),
            Self::DictionaryNotFound => Some("create the dictionary document or point [paths].dictionary at it"),
            _ => None,
        }
    }
}
