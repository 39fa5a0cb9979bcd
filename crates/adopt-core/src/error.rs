//! Error Types

use thiserror::Error;

/// Result type alias for store operations
pub type Result<T> = std::result::Result<T, StoreError>;

/// Storage and domain errors
#[derive(Error, Debug)]
pub enum StoreError {
    /// Entity lookup failed
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Write conflicted with existing state
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Invalid domain data (bad amount, malformed reference)
    #[error("Invalid data: {0}")]
    Invalid(String),

    /// Backend failure (the managed database behind the trait)
    #[error("Storage backend error: {0}")]
    Backend(String),
}

impl StoreError {
    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Backend(_))
    }

    pub fn not_found(entity: &'static str, id: impl std::fmt::Display) -> Self {
        StoreError::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}
