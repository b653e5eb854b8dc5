//! Unified error handling for grok-monitor-core

use thiserror::Error;

/// Core error type for grok-monitor-core
#[derive(Error, Debug)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Unexpected HTTP status: {0}")]
    Status(u16),

    #[error("Unknown category: {0}")]
    UnknownCategory(String),

    #[error("Invalid rate limit snapshot: {0}")]
    InvalidSnapshot(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for grok-monitor-core
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create a transport error
    pub fn transport(msg: impl Into<String>) -> Self {
        Error::Transport(msg.into())
    }

    /// Create an unknown category error
    pub fn unknown_category(code: impl Into<String>) -> Self {
        Error::UnknownCategory(code.into())
    }

    /// Create an invalid snapshot error
    pub fn invalid_snapshot(msg: impl Into<String>) -> Self {
        Error::InvalidSnapshot(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Error::Internal(msg.into())
    }

    /// Whether this error came from the network rather than from local state
    pub fn is_network(&self) -> bool {
        matches!(self, Error::Http(_) | Error::Transport(_) | Error::Status(_))
    }
}
