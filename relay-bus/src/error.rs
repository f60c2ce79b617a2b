//! Error types for the relay bus

use thiserror::Error;

/// Relay bus error
#[derive(Debug, Error)]
pub enum Error {
    /// Connection error
    #[error("Connection error: {0}")]
    Connection(String),

    /// Publish rejected or failed
    #[error("Publish error: {0}")]
    Publish(String),

    /// Subscribe error
    #[error("Subscribe error: {0}")]
    Subscribe(String),

    /// Operation timed out (milliseconds)
    #[error("Timed out after {0}ms")]
    Timeout(u64),

    /// Operation cancelled by the caller
    #[error("Cancelled")]
    Cancelled,

    /// Event failed validation
    #[error("Invalid event: {0}")]
    InvalidEvent(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type
pub type Result<T> = std::result::Result<T, Error>;
