//! Storage error types.

use thiserror::Error;

/// Storage-specific errors.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("store not found: {store_id}")]
    StoreNotFound { store_id: String },

    #[error("store already exists: {store_id}")]
    StoreAlreadyExists { store_id: String },

    /// No model with this id, or no model at all when reading the latest.
    #[error("model not found: {model_id}")]
    ModelNotFound { model_id: String },

    /// A read filter that cannot be evaluated (e.g. a malformed user).
    #[error("invalid filter: {message}")]
    InvalidFilter { message: String },

    /// A tuple, store id or type name that fails validation on write.
    #[error("invalid input: {message}")]
    InvalidInput { message: String },

    /// Continuation token could not be decoded.
    #[error("invalid continuation token")]
    InvalidContinuationToken,

    /// Backend query failure.
    #[error("database query error: {message}")]
    QueryError { message: String },
}

impl StorageError {
    /// Returns true for errors naming a missing store or model.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            StorageError::StoreNotFound { .. } | StorageError::ModelNotFound { .. }
        )
    }
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;
