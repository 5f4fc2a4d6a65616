//! Common error types for the joke services

use thiserror::Error;

/// Common result type for joke pipeline operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error taxonomy shared by every service
#[derive(Error, Debug)]
pub enum Error {
    /// A required field is missing or blank; nothing was published
    #[error("Validation error: {0}")]
    Validation(String),

    /// No live broker channel
    #[error("Broker unavailable: {0}")]
    BrokerUnavailable(String),

    /// Malformed payload or failed store write while consuming
    #[error("Processing error: {0}")]
    Processing(String),

    /// Store query or connection failure
    #[error("Store error: {0}")]
    Store(String),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error (wraps serde_json::Error)
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        Error::Store(err.to_string())
    }
}

impl From<mongodb::error::Error> for Error {
    fn from(err: mongodb::error::Error) -> Self {
        Error::Store(err.to_string())
    }
}

impl From<lapin::Error> for Error {
    fn from(err: lapin::Error) -> Self {
        Error::BrokerUnavailable(err.to_string())
    }
}
