//! Unified error type for the filter orchestrator.

use thiserror::Error;

/// Result type for filter operations.
pub type Result<T> = std::result::Result<T, FilterError>;

/// Everything that can fail a filter invocation.
///
/// Cache errors are deliberately absent: the orchestrator downgrades them to
/// misses and logs them, they never fail a clean or smudge.
#[derive(Debug, Error)]
pub enum FilterError {
    /// Table parsing or classification failure.
    #[error(transparent)]
    Core(#[from] sempress_core::Error),

    /// Numeric codec failure.
    #[error(transparent)]
    Codec(#[from] sempress_vq::Error),

    /// Container framing failure.
    #[error(transparent)]
    Container(#[from] sempress_container::Error),

    /// Configuration file is present but unusable.
    #[error("config error: {0}")]
    Config(String),

    /// Stdin/stdout or file I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
