//! Error types for the protocol vocabulary.

use thiserror::Error;

/// Core error type.
#[derive(Debug, Error)]
pub enum Error {
    #[error("unknown verb: {0}")]
    UnknownVerb(String),

    #[error("unknown protocol error code: {0}")]
    UnknownErrorCode(String),

    #[error("invalid datestamp: {0}")]
    InvalidDatestamp(String),

    #[error("invalid set spec: {0}")]
    InvalidSetSpec(String),

    #[error("invalid metadata prefix: {0}")]
    InvalidMetadataPrefix(String),

    #[error("unknown deleted record policy: {0}")]
    UnknownDeletedRecords(String),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;
