//! Error types for table parsing and classification.

use thiserror::Error;

/// Result type alias for core table operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types.
#[derive(Debug, Error)]
pub enum Error {
    /// Input could not be parsed as a table.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Configuration references a column that does not exist,
    /// or assigns a role the column cannot carry.
    #[error("config error: {message}")]
    Config { message: String },

    /// Original and reconstructed tables disagree on shape.
    #[error("table shape mismatch: {expected}, got {actual}")]
    ShapeMismatch { expected: String, actual: String },

    /// A column was asked for numeric values it does not hold.
    #[error("column '{column}' is not numeric")]
    NotNumeric { column: String },
}

impl Error {
    /// Create a parse error.
    pub fn parse(message: impl Into<String>) -> Self {
        Error::Parse {
            message: message.into(),
        }
    }

    /// Create a parse error with row context.
    pub fn parse_at(message: impl Into<String>, row: usize) -> Self {
        Error::Parse {
            message: format!("{} at row {}", message.into(), row),
        }
    }

    /// Create a config error.
    pub fn config(message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
        }
    }
}
