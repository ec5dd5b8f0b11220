//! Dispatcher error types

use thiserror::Error;

/// Result type for dispatcher operations
pub type Result<T> = std::result::Result<T, DispatcherError>;

/// Errors from parsing an inbound message envelope
#[derive(Debug, Error)]
pub enum MessageError {
    /// Envelope is not `{event, payload}` JSON
    #[error("invalid message envelope: {0}")]
    Envelope(#[from] serde_json::Error),

    /// Envelope carried no payload
    #[error("empty payload")]
    EmptyPayload,

    /// Payload bytes did not parse as a JSON object
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    /// Payload failed to decompress
    #[error("failed to decompress payload: {0}")]
    Decompress(String),
}

/// Errors crossing component boundaries inside the dispatcher
#[derive(Debug, Error)]
pub enum DispatcherError {
    /// Bus operation failed
    #[error(transparent)]
    Bus(#[from] gravity_bus::BusError),

    /// Rule compilation failed
    #[error(transparent)]
    Rule(#[from] gravity_rules::RuleError),

    /// Product schema failed to compile
    #[error(transparent)]
    Schema(#[from] gravity_schema::SchemaError),

    /// Product setting JSON was invalid
    #[error("invalid product setting: {0}")]
    Setting(#[from] serde_json::Error),

    /// Processor rejected a message because it is closed
    #[error("processor is closed")]
    ProcessorClosed,

    /// Output buffer rejected a message because it is closed
    #[error("output buffer is closed")]
    BufferClosed,
}
