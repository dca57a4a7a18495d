//! Error types for the container codec
//!
//! Header-level problems are reported directly by [`IoError`]; everything
//! found after a valid header is a [`DeserializationError`], which wraps the
//! structural [`TensorError`] when the decoded data violates an invariant of
//! the data model.

use tenmap_core::TensorError;
use thiserror::Error;

/// Failure while decoding the body of a container
#[derive(Error, Debug)]
pub enum DeserializationError {
    /// The decoded data violates a structural invariant
    #[error("invalid data: {0}")]
    Invalid(#[from] TensorError),

    /// The stream ended in the middle of a value
    #[error("unexpected end of data while reading {0}")]
    Truncated(String),

    /// A string is not valid UTF-8
    #[error("invalid UTF-8 string: {0}")]
    InvalidString(String),

    /// The data is well-formed at the byte level but inconsistent
    #[error("malformed container: {0}")]
    Malformed(String),

    /// The CRC32 trailer does not match the content
    #[error("checksum mismatch: stored {stored:#010x}, computed {computed:#010x}")]
    ChecksumMismatch { stored: u32, computed: u32 },
}

/// Top-level error type for the container codec
#[derive(Error, Debug)]
pub enum IoError {
    /// The container was written by a newer version of the format
    #[error("unsupported container version {found}, supported versions are 1 to {supported}")]
    UnsupportedVersion { found: u32, supported: u32 },

    /// The container header is invalid
    #[error("corrupt container header: {0}")]
    CorruptHeader(String),

    /// The container body could not be decoded
    #[error("failed to decode container: {0}")]
    Deserialization(#[from] DeserializationError),

    /// A codec method was called in the wrong state
    #[error("invalid codec state: {0}")]
    InvalidState(String),

    /// Underlying I/O failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for codec operations
pub type IoResult<T> = Result<T, IoError>;

impl From<TensorError> for IoError {
    fn from(error: TensorError) -> Self {
        IoError::Deserialization(DeserializationError::Invalid(error))
    }
}

impl IoError {
    /// Create a malformed container error
    pub fn malformed(msg: impl Into<String>) -> Self {
        IoError::Deserialization(DeserializationError::Malformed(msg.into()))
    }

    /// Create a truncated data error
    pub fn truncated(what: impl Into<String>) -> Self {
        IoError::Deserialization(DeserializationError::Truncated(what.into()))
    }

    /// Create a corrupt header error
    pub fn corrupt_header(msg: impl Into<String>) -> Self {
        IoError::CorruptHeader(msg.into())
    }

    /// The structural error behind this failure, if any
    pub fn tensor_error(&self) -> Option<&TensorError> {
        match self {
            IoError::Deserialization(DeserializationError::Invalid(error)) => Some(error),
            _ => None,
        }
    }
}
