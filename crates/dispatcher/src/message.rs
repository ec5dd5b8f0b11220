//! Pooled in-flight message envelope
//!
//! A [`Message`] carries one input-stream message through the whole
//! pipeline: the source envelope, the parsed `{event, payload}` body, the
//! matched rule, the built product event, and finally the outbound message
//! plus its publish future. Messages are leased from a [`MessagePool`] on
//! arrival and returned (zeroed) on terminal outcome; while in flight a
//! message has exactly one owner.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use bytes::Bytes;
use crossbeam::queue::ArrayQueue;
use serde::Deserialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use gravity_bus::{BusMessage, OutboundMessage, PublishFuture};
use gravity_rules::{JsonMap, Rule, RuleManager};
use gravity_schema::ProductEvent;

use crate::error::MessageError;

/// The parsed `{event, payload}` body of an input message
#[derive(Debug, Default)]
pub struct RawData {
    pub event: String,
    pub payload: JsonMap,
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(default)]
    event: String,
    #[serde(default)]
    payload: serde_json::Value,
}

/// One in-flight message
///
/// Fields fill progressively as the message moves through the pipeline;
/// [`Message::reset`] zeroes all of them when the pool takes the message
/// back.
#[derive(Default)]
pub struct Message {
    /// Idempotency ID: the input stream sequence, hex-encoded
    pub id: String,

    /// Event name resolved from the subscription (empty = unknown subject)
    pub event: String,

    /// Source envelope from the input stream
    pub source: Option<BusMessage>,

    /// Raw body bytes, decompressed if the envelope was compressed
    pub raw: Bytes,

    /// Parsed envelope body
    pub data: RawData,

    /// Rule-set snapshot taken when the message entered the product
    pub rules: Option<Arc<RuleManager>>,

    /// The matched rule; in-flight messages keep it across rule-set swaps
    pub rule: Option<Arc<Rule>>,

    /// The built product event
    pub product_event: Option<ProductEvent>,

    /// Serialized product event
    pub raw_product_event: Vec<u8>,

    /// Computed partition in [0, 256)
    pub partition: i32,

    /// Outbound message for the product stream
    pub output: Option<OutboundMessage>,

    /// Resolution of the in-flight publish
    pub publish: Option<PublishFuture>,

    /// Terminal no-publish marker; ignored messages still flow through the
    /// runner to keep the sequence contiguous, then ack without publishing
    pub ignore: bool,
}

impl Message {
    /// Parse `raw` as an `{event, payload}` envelope
    ///
    /// The payload may be an embedded JSON object, a string containing
    /// JSON, or a base64-encoded string of JSON bytes. An absent or empty
    /// payload is a parse failure.
    pub fn parse_raw(&mut self) -> Result<(), MessageError> {
        let envelope: Envelope = serde_json::from_slice(&self.raw)?;

        self.data.event = envelope.event;
        self.data.payload = match envelope.payload {
            serde_json::Value::Object(map) => map,
            serde_json::Value::String(s) if s.is_empty() => {
                return Err(MessageError::EmptyPayload);
            }
            serde_json::Value::String(s) => parse_payload_string(&s)?,
            serde_json::Value::Null => return Err(MessageError::EmptyPayload),
            other => {
                return Err(MessageError::InvalidPayload(format!(
                    "payload must be an object, got {other}"
                )));
            }
        };

        Ok(())
    }

    /// Zero every field for reuse
    pub fn reset(&mut self) {
        self.id.clear();
        self.event.clear();
        self.source = None;
        self.raw = Bytes::new();
        self.data.event.clear();
        self.data.payload.clear();
        self.rules = None;
        self.rule = None;
        self.product_event = None;
        self.raw_product_event.clear();
        self.partition = 0;
        self.output = None;
        self.publish = None;
        self.ignore = false;
    }

    /// Acknowledge the source envelope (cumulative)
    pub async fn ack(&self) -> gravity_bus::Result<()> {
        match &self.source {
            Some(source) => source.ack().await,
            None => Ok(()),
        }
    }
}

fn parse_payload_string(s: &str) -> Result<JsonMap, MessageError> {
    if let Ok(serde_json::Value::Object(map)) = serde_json::from_str(s) {
        return Ok(map);
    }

    // Payloads that crossed a JSON boundary twice arrive base64-encoded
    let bytes = BASE64
        .decode(s)
        .map_err(|_| MessageError::InvalidPayload("payload is neither JSON nor base64".into()))?;

    match serde_json::from_slice(&bytes) {
        Ok(serde_json::Value::Object(map)) => Ok(map),
        _ => Err(MessageError::InvalidPayload(
            "decoded payload is not a JSON object".into(),
        )),
    }
}

impl std::fmt::Debug for Message {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Message")
            .field("id", &self.id)
            .field("event", &self.event)
            .field("partition", &self.partition)
            .field("ignore", &self.ignore)
            .finish()
    }
}

/// Lock-free pool of reusable message envelopes
///
/// Pre-allocation is lazy: the pool starts empty and fills as messages
/// complete, capping at `capacity`. When the pool is exhausted, new
/// messages are allocated on demand.
pub struct MessagePool {
    queue: ArrayQueue<Box<Message>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl MessagePool {
    /// Create a pool holding up to `capacity` idle messages
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: ArrayQueue::new(capacity.max(1)),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Lease a message from the pool
    ///
    /// Pooled messages were zeroed when they were returned.
    #[inline]
    pub fn get(&self) -> Box<Message> {
        match self.queue.pop() {
            Some(msg) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                msg
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                Box::default()
            }
        }
    }

    /// Return a message to the pool
    ///
    /// The message is zeroed first; if the pool is full it is dropped.
    #[inline]
    pub fn put(&self, mut msg: Box<Message>) {
        msg.reset();
        let _ = self.queue.push(msg);
    }

    /// Idle messages currently pooled
    pub fn available(&self) -> usize {
        self.queue.len()
    }

    /// Pool hits since creation
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    /// Pool misses (fresh allocations) since creation
    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
#[path = "message_test.rs"]
mod message_test;
