//! Error types for FFV1 decoding

use thiserror::Error;

/// Result type alias for decoding operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for FFV1 decoding
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Malformed or inconsistent codec configuration (extradata).
    /// Fatal for the whole session; no frame can be decoded without it.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Structurally valid but unimplemented version or feature combination.
    /// Fatal for the affected call; never silently produces wrong pixels.
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// A read ran past the end of the compressed buffer (truncated stream)
    #[error("End of buffer")]
    EndOfBuffer,

    /// Invalid coder state, escape code, or bitstream structure
    #[error("Corrupt stream: {0}")]
    CorruptStream(String),

    /// A per-slice CRC check failed
    #[error("CRC mismatch in slice {slice}")]
    CrcMismatch { slice: usize },

    /// Invalid input supplied by the caller (dimensions, empty buffers)
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl Error {
    /// Create a configuration error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Error::Config(msg.into())
    }

    /// Create an unsupported-variant error
    pub fn unsupported<S: Into<String>>(msg: S) -> Self {
        Error::Unsupported(msg.into())
    }

    /// Create a corrupt-stream error
    pub fn corrupt<S: Into<String>>(msg: S) -> Self {
        Error::CorruptStream(msg.into())
    }

    /// Create an invalid-input error
    pub fn invalid_input<S: Into<String>>(msg: S) -> Self {
        Error::InvalidInput(msg.into())
    }

    /// Whether the error is fatal for the whole decode session, as opposed
    /// to being containable to a single slice.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Config(_) | Error::Unsupported(_) | Error::InvalidInput(_))
    }
}
