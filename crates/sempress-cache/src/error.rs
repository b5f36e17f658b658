//! Error types for cache storage.
//!
//! Every error here is non-fatal to the filter: the orchestrator treats a
//! failing cache like a miss and recomputes.

use thiserror::Error;

/// Result type for cache operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Cache error types.
#[derive(Debug, Error)]
pub enum Error {
    /// Underlying filesystem failure.
    #[error("cache I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Index file exists but cannot be parsed.
    #[error("cache index corrupt: {0}")]
    IndexCorrupt(String),
}
