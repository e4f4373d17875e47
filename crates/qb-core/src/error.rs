//! Error types for querybench

use thiserror::Error;

/// Core error type for querybench operations
#[derive(Error, Debug)]
pub enum QbError {
    #[error("API error: {0}")]
    Api(String),

    #[error("SQL error {errno}: {message}")]
    Sql { errno: i64, message: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Cancelled")]
    Cancelled,

    #[error("{0}")]
    Other(String),
}

/// Result type alias for querybench operations
pub type Result<T> = std::result::Result<T, QbError>;
