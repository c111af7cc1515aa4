use chime_core::ChimeError;
use thiserror::Error;

/// Errors that can occur during reminder store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The requested reminder does not exist.
    #[error("reminder not found: {id}")]
    NotFound { id: String },

    /// A reminder with this id is already stored.
    #[error("reminder already exists: {id}")]
    Duplicate { id: String },

    /// A SQLite operation failed.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// The definition failed validation (e.g. empty day set).
    #[error(transparent)]
    Invalid(#[from] ChimeError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;
