//! Error types for the ride insights service.

use crate::handlers::database::types::DatabaseError;
use thiserror::Error;

/// Result type alias for ride insights operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for views, anomaly detection and the HTTP surface
#[derive(Debug, Error)]
pub enum Error {
    /// Store failure (connection, query, decoding)
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Required parameter missing
    #[error("Missing parameter: {0}")]
    MissingParameter(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// HTTPステータスコードへの変換
    pub fn status_code(&self) -> u16 {
        match self {
            Error::InvalidInput(_) | Error::MissingParameter(_) => 400,
            _ => 500,
        }
    }

    /// クライアントに返す短い分類名
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Database(_) => "database_error",
            Error::InvalidInput(_) => "invalid_input",
            Error::MissingParameter(_) => "missing_parameter",
            Error::Config(_) => "config_error",
            Error::Io(_) => "io_error",
            Error::Json(_) => "json_error",
        }
    }
}

impl From<config::ConfigError> for Error {
    fn from(err: config::ConfigError) -> Self {
        Error::Config(err.to_string())
    }
}
