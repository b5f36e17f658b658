//! Error types for the numeric codec.

use thiserror::Error;

/// Result type for codec operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Codec error types.
#[derive(Debug, Error)]
pub enum Error {
    /// Codec parameters are out of range.
    #[error("invalid codec parameters: {0}")]
    InvalidParams(String),

    /// Column data cannot be encoded.
    #[error("encoding failed: {0}")]
    Encode(String),

    /// Payload bytes cannot be decoded.
    #[error("decoding failed: {0}")]
    Decode(String),

    /// Payload was produced by an unknown codec version.
    #[error("unsupported payload version {0}")]
    UnsupportedVersion(u16),
}
