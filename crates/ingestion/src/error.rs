//! Error types for the ingestion crate.

use thiserror::Error;

/// Errors that can occur while handling one notification.
#[derive(Error, Debug)]
pub enum IngestionError {
    #[error("MD5 checksum does not match for message {message_id}: expected {expected}, computed {computed}")]
    Integrity {
        message_id: String,
        expected: String,
        computed: String,
    },

    #[error("Malformed envelope: {0}")]
    MalformedEnvelope(String),

    #[error("Destination already exists: {0}")]
    AlreadyPublished(String),

    #[error("Failed to fetch source object: {0}")]
    Fetch(String),

    #[error("Failed to decode source payload: {0}")]
    Decode(String),

    #[error("Failed to subset dataset: {0}")]
    Subset(String),

    #[error("Failed to write Zarr data: {0}")]
    ZarrWrite(String),

    #[error("Failed to upload to storage: {0}")]
    StorageUpload(String),

    #[error("Storage error: {0}")]
    Storage(#[from] nwp_common::NwpError),

    #[error("Failed to read file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl IngestionError {
    /// Errors that mean the envelope itself cannot be trusted or read.
    pub fn is_envelope_error(&self) -> bool {
        matches!(
            self,
            IngestionError::Integrity { .. } | IngestionError::MalformedEnvelope(_)
        )
    }
}

impl From<netcdf_parser::NetCdfError> for IngestionError {
    fn from(err: netcdf_parser::NetCdfError) -> Self {
        IngestionError::Decode(err.to_string())
    }
}

/// Result type for ingestion operations.
pub type Result<T> = std::result::Result<T, IngestionError>;
