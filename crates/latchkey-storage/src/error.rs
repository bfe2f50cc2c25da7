use thiserror::Error;

/// Storage-specific error types for the latchkey access-control system.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Database connection or query execution failed
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Entity not found in database
    #[error("Entity not found: {entity_type} with {field}={value}")]
    NotFound {
        entity_type: String,
        field: String,
        value: String,
    },

    /// Data validation failed
    #[error("Validation error: {0}")]
    Validation(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl From<latchkey_core::Error> for StorageError {
    fn from(e: latchkey_core::Error) -> Self {
        StorageError::Validation(e.to_string())
    }
}

impl From<StorageError> for latchkey_core::Error {
    fn from(e: StorageError) -> Self {
        latchkey_core::Error::Store(e.to_string())
    }
}

/// Specialized result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;
