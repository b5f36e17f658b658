//! Error types for container framing.

use thiserror::Error;

/// Result type for container operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Container error types. All of these are fatal to a smudge: the codec
/// never attempts to repair malformed input.
#[derive(Debug, Error)]
pub enum Error {
    /// Structural inconsistency: bad magic, truncation, length mismatch,
    /// or a role referring to a missing block.
    #[error("corrupt container: {message}")]
    Corrupt { message: String },

    /// Checksum of the recovered lossless blocks does not match the header.
    #[error("checksum mismatch: expected {expected:#018x}, got {actual:#018x}")]
    ChecksumMismatch { expected: u64, actual: u64 },

    /// Format version this build does not understand. Never auto-upgraded.
    #[error("unsupported container version {version}")]
    UnsupportedVersion { version: u16 },
}

impl Error {
    /// Create a corrupt-container error.
    pub fn corrupt(message: impl Into<String>) -> Self {
        Error::Corrupt {
            message: message.into(),
        }
    }

    /// Create a corrupt-container error with offset context.
    pub fn corrupt_at(message: impl Into<String>, offset: usize) -> Self {
        Error::Corrupt {
            message: format!("{} at offset {}", message.into(), offset),
        }
    }
}
