//! Message envelopes and publish futures

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::oneshot;

use crate::error::{BusError, Result};

/// String headers carried on a message envelope
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Headers {
    entries: HashMap<String, String>,
}

impl Headers {
    /// Create empty headers
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a header value
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries.get(name).map(String::as_str)
    }

    /// Set a header value
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(name.into(), value.into());
    }

    /// Whether no headers are set
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over header name/value pairs
    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.entries.iter()
    }
}

/// Cumulative acknowledgement callback installed by the bus
#[async_trait]
pub trait MessageAck: Send + Sync {
    /// Acknowledge everything up to and including `sequence`
    async fn ack(&self, sequence: u64) -> Result<()>;
}

/// An inbound message leased from a pull consumer
///
/// Holds the subject, payload, headers, the stream sequence the message was
/// stored under, and the consumer's cumulative ack handle.
#[derive(Clone)]
pub struct BusMessage {
    pub subject: String,
    pub payload: Bytes,
    pub headers: Headers,
    pub stream_sequence: u64,
    acker: Arc<dyn MessageAck>,
}

impl BusMessage {
    /// Construct a message (called by bus implementations)
    pub fn new(
        subject: impl Into<String>,
        payload: Bytes,
        headers: Headers,
        stream_sequence: u64,
        acker: Arc<dyn MessageAck>,
    ) -> Self {
        Self {
            subject: subject.into(),
            payload,
            headers,
            stream_sequence,
            acker,
        }
    }

    /// Cumulatively acknowledge this message and everything before it
    pub async fn ack(&self) -> Result<()> {
        self.acker.ack(self.stream_sequence).await
    }
}

impl std::fmt::Debug for BusMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BusMessage")
            .field("subject", &self.subject)
            .field("payload_len", &self.payload.len())
            .field("stream_sequence", &self.stream_sequence)
            .finish()
    }
}

/// An outbound message handed to [`crate::Bus::publish`]
#[derive(Debug, Clone, Default)]
pub struct OutboundMessage {
    pub subject: String,
    pub payload: Bytes,
    pub headers: Headers,
}

impl OutboundMessage {
    /// Create an outbound message
    pub fn new(subject: impl Into<String>, payload: Bytes, headers: Headers) -> Self {
        Self {
            subject: subject.into(),
            payload,
            headers,
        }
    }
}

/// Resolution of an asynchronous publish
///
/// The future resolves with the stream sequence the message was stored
/// under, or the bus-side error. Dropping the sender half without resolving
/// surfaces as a connection error.
pub struct PublishFuture {
    rx: oneshot::Receiver<Result<u64>>,
}

impl PublishFuture {
    /// Create a pending future plus its resolver
    pub fn pending() -> (Self, oneshot::Sender<Result<u64>>) {
        let (tx, rx) = oneshot::channel();
        (Self { rx }, tx)
    }

    /// Create a future that is already resolved
    pub fn resolved(result: Result<u64>) -> Self {
        let (future, tx) = Self::pending();
        let _ = tx.send(result);
        future
    }

    /// Wait for the publish to complete
    pub async fn wait(self) -> Result<u64> {
        match self.rx.await {
            Ok(result) => result,
            Err(_) => Err(BusError::connection("publish dropped before resolution")),
        }
    }
}

impl std::fmt::Debug for PublishFuture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PublishFuture").finish_non_exhaustive()
    }
}
