use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChimeError {
    #[error("Configuration error: {0}")]
    Config(String),

    /// Rejected at creation time, never reaches the scheduler.
    #[error("Invalid reminder definition: {0}")]
    InvalidDefinition(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ChimeError {
    /// Short error code string for CLI output and status events.
    pub fn code(&self) -> &'static str {
        match self {
            ChimeError::Config(_) => "CONFIG_ERROR",
            ChimeError::InvalidDefinition(_) => "INVALID_DEFINITION",
            ChimeError::Serialization(_) => "SERIALIZATION_ERROR",
            ChimeError::Io(_) => "IO_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, ChimeError>;
