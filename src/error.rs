//! Error types for threatwire.

use thiserror::Error;

/// Common error type for threatwire.
#[derive(Error, Debug)]
pub enum ThreatwireError {
    /// Database error.
    ///
    /// This is a generic database error that wraps errors from the storage
    /// backend. Errors from sqlx are automatically converted.
    #[error("database error: {0}")]
    Database(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Feed fetch or parse error.
    #[error("feed error: {0}")]
    Feed(String),

    /// Email transport error.
    #[error("email error: {0}")]
    Email(String),

    /// Validation error for user input.
    #[error("validation error: {0}")]
    Validation(String),

    /// Resource not found.
    #[error("{0} not found")]
    NotFound(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

// Conversion from sqlx errors
impl From<sqlx::Error> for ThreatwireError {
    fn from(e: sqlx::Error) -> Self {
        ThreatwireError::Database(e.to_string())
    }
}

/// Result type alias for threatwire operations.
pub type Result<T> = std::result::Result<T, ThreatwireError>;
