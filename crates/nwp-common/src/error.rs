//! Error types shared by the storage and queue layers.

use thiserror::Error;

/// Result type alias using NwpError.
pub type NwpResult<T> = Result<T, NwpError>;

/// Primary error type for infrastructure operations.
#[derive(Debug, Error)]
pub enum NwpError {
    // === Configuration Errors ===
    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    #[error("Invalid bounding box: {0}")]
    InvalidBbox(String),

    // === Data Errors ===
    #[error("Failed to read data: {0}")]
    DataReadError(String),

    #[error("Invalid grid: {0}")]
    InvalidGrid(String),

    // === Storage Errors ===
    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Object not found: {0}")]
    NotFound(String),

    // === Queue Errors ===
    #[error("Queue error: {0}")]
    QueueError(String),

    // === Infrastructure Errors ===
    #[error("Internal error: {0}")]
    InternalError(String),
}

impl NwpError {
    /// Whether retrying the same operation later could succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            NwpError::StorageError(_) | NwpError::QueueError(_) | NwpError::DataReadError(_)
        )
    }
}

impl From<std::io::Error> for NwpError {
    fn from(err: std::io::Error) -> Self {
        NwpError::InternalError(err.to_string())
    }
}

impl From<serde_json::Error> for NwpError {
    fn from(err: serde_json::Error) -> Self {
        NwpError::InternalError(format!("JSON error: {}", err))
    }
}
