//! Bus error types

use thiserror::Error;

/// Result type for bus operations
pub type Result<T> = std::result::Result<T, BusError>;

/// Errors surfaced by a bus implementation
#[derive(Debug, Error)]
pub enum BusError {
    /// Stream does not exist
    #[error("stream '{0}' not found")]
    StreamNotFound(String),

    /// No stream captures the published subject
    #[error("no stream captures subject '{0}'")]
    NoStreamForSubject(String),

    /// Publish was rejected by the bus
    #[error("publish failed: {0}")]
    PublishFailed(String),

    /// Consumer has been unsubscribed
    #[error("consumer '{0}' is closed")]
    ConsumerClosed(String),

    /// Key-value bucket does not exist
    #[error("key-value bucket '{0}' not found")]
    BucketNotFound(String),

    /// Connection-level failure
    #[error("bus connection error: {0}")]
    Connection(String),
}

impl BusError {
    /// Create a PublishFailed error
    pub fn publish_failed(msg: impl Into<String>) -> Self {
        Self::PublishFailed(msg.into())
    }

    /// Create a Connection error
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }
}
