//! Gravity - Bus
//!
//! The streaming-bus interface the dispatch pipeline is written against.
//!
//! # Overview
//!
//! The dispatcher consumes a JetStream-like bus: durable streams with
//! limits-based retention and a deduplication window, durable pull
//! consumers with cumulative acknowledgement, asynchronous publishes that
//! resolve through a future, and a key-value bucket with change
//! notifications for configuration.
//!
//! Production deployments plug a real bus client into the [`Bus`] trait;
//! the bundled [`memory`] implementation backs local pipelines and the
//! end-to-end tests with the same semantics (dedup, cumulative ack,
//! redelivery after resubscribe, KV watch).
//!
//! # Key Design
//!
//! - **Cumulative ack**: [`BusMessage::ack`] acknowledges the message and
//!   everything before it on the same consumer. Callers must preserve
//!   delivery order for this to be safe.
//! - **At-least-once**: unacknowledged messages are redelivered when a
//!   durable consumer resubscribes.
//! - **Dedup window**: a publish whose message ID was seen inside the
//!   stream's duplicate window is dropped by the bus and reported as a
//!   duplicate success.

mod error;
pub mod memory;
mod message;
mod stream;
mod subject;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

pub use error::{BusError, Result};
pub use message::{BusMessage, Headers, MessageAck, OutboundMessage, PublishFuture};
pub use stream::{AckPolicy, ConsumerConfig, Retention, StreamConfig};
pub use subject::subject_matches;

/// The JetStream-like interface the dispatcher consumes
#[async_trait]
pub trait Bus: Send + Sync {
    /// Create the stream if it does not exist yet
    ///
    /// An existing stream is left untouched; its configuration wins.
    async fn ensure_stream(&self, config: StreamConfig) -> Result<()>;

    /// Delete a stream
    async fn delete_stream(&self, name: &str) -> Result<()>;

    /// Publish a message asynchronously
    ///
    /// Returns immediately with a future that resolves once the bus has
    /// accepted (or rejected) the message. `msg_id` feeds the stream's
    /// deduplication window; pass an empty string to skip deduplication.
    async fn publish(&self, message: OutboundMessage, msg_id: &str) -> Result<PublishFuture>;

    /// Create or attach a durable pull consumer on a stream
    async fn pull_subscribe(
        &self,
        stream: &str,
        config: ConsumerConfig,
    ) -> Result<Box<dyn PullConsumer>>;

    /// Open (creating if necessary) a key-value bucket
    async fn key_value(&self, bucket: &str, description: &str) -> Result<Arc<dyn KvBucket>>;
}

/// A durable pull consumer
#[async_trait]
pub trait PullConsumer: Send + Sync {
    /// Fetch up to `max_messages`, waiting at most `max_wait`
    ///
    /// Returns an empty batch on timeout. Returns an error once the
    /// consumer has been unsubscribed.
    async fn fetch(&mut self, max_messages: usize, max_wait: Duration) -> Result<Vec<BusMessage>>;

    /// Detach from the stream; pending unacked messages will be redelivered
    /// to the next subscriber of the same durable name
    async fn unsubscribe(&mut self) -> Result<()>;
}

/// A key-value bucket with change notifications
#[async_trait]
pub trait KvBucket: Send + Sync {
    /// List all keys currently present
    async fn keys(&self) -> Result<Vec<String>>;

    /// Get the value of a key
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Put a value, notifying watchers
    async fn put(&self, key: &str, value: Vec<u8>) -> Result<()>;

    /// Delete a key, notifying watchers
    async fn delete(&self, key: &str) -> Result<()>;

    /// Watch for updates to any key in the bucket
    async fn watch(&self) -> Result<mpsc::UnboundedReceiver<KvEntry>>;
}

/// The operation a KV update carries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KvOperation {
    Put,
    Delete,
    Purge,
}

/// A single key-value update
#[derive(Debug, Clone)]
pub struct KvEntry {
    pub operation: KvOperation,
    pub key: String,
    pub value: Vec<u8>,
}
