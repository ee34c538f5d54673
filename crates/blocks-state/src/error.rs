//! Error types for the state store.

use blocks_model::{ModelError, ValidationReport};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StateError {
    /// No record exists under the id. Callers usually treat this as a soft
    /// miss rather than a failure.
    #[error("component not found: {0}")]
    NotFound(String),

    #[error("component id already exists: {0}")]
    DuplicateId(String),

    #[error("validation failed: {0}")]
    ValidationFailed(ValidationReport),

    #[error("invalid snapshot: {0}")]
    InvalidSnapshot(String),

    #[error(transparent)]
    Model(#[from] ModelError),
}

impl StateError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// The rejected report, when this is a validation failure.
    pub fn report(&self) -> Option<&ValidationReport> {
        match self {
            Self::ValidationFailed(report) => Some(report),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, StateError>;

const _: () = {
    const fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<StateError>();
};
