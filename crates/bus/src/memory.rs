//! In-process bus implementation
//!
//! Backs local pipelines and the end-to-end tests with the same semantics
//! the dispatcher relies on from a production bus: streams capture
//! publishes by subject, a duplicate window drops republished message IDs,
//! durable consumers keep a cumulative ack floor, and unacknowledged
//! messages are redelivered when a durable consumer resubscribes.
//!
//! Size/age limits are accepted but not enforced; an in-process stream
//! lives for the duration of the process.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::{Notify, mpsc};

use crate::error::{BusError, Result};
use crate::message::{BusMessage, Headers, MessageAck, OutboundMessage, PublishFuture};
use crate::stream::{ConsumerConfig, StreamConfig};
use crate::subject::subject_matches;
use crate::{Bus, KvBucket, KvEntry, KvOperation, PullConsumer};

/// A message stored on an in-process stream
#[derive(Debug, Clone)]
pub struct StoredMessage {
    pub sequence: u64,
    pub subject: String,
    pub payload: Bytes,
    pub headers: Headers,
}

struct DurableState {
    config: ConsumerConfig,
    /// Highest cumulatively acknowledged sequence
    ack_floor: u64,
    /// Highest delivered sequence; reset to the ack floor on resubscribe
    delivered: u64,
}

struct StreamState {
    config: StreamConfig,
    messages: Vec<StoredMessage>,
    next_sequence: u64,
    /// Message ID → (publish time, stored sequence) for the dedup window
    dedup: HashMap<String, (Instant, u64)>,
    /// Insertion order of dedup entries; lets expiry pop from the front
    /// instead of scanning the whole map on every publish
    dedup_order: VecDeque<(Instant, String)>,
    consumers: HashMap<String, DurableState>,
    notify: Arc<Notify>,
}

impl StreamState {
    fn new(config: StreamConfig) -> Self {
        Self {
            config,
            messages: Vec::new(),
            next_sequence: 1,
            dedup: HashMap::new(),
            dedup_order: VecDeque::new(),
            consumers: HashMap::new(),
            notify: Arc::new(Notify::new()),
        }
    }

    fn prune_dedup(&mut self, now: Instant) {
        let window = self.config.duplicate_window;
        if window.is_zero() {
            self.dedup.clear();
            self.dedup_order.clear();
            return;
        }

        // A live map entry has exactly one queue entry: duplicates inside
        // the window never re-insert, and expired IDs leave the map here
        while let Some((at, _)) = self.dedup_order.front() {
            if now.duration_since(*at) < window {
                break;
            }
            if let Some((_, id)) = self.dedup_order.pop_front() {
                self.dedup.remove(&id);
            }
        }
    }
}

struct BucketState {
    entries: HashMap<String, Vec<u8>>,
    watchers: Vec<mpsc::UnboundedSender<KvEntry>>,
}

impl BucketState {
    fn broadcast(&mut self, entry: KvEntry) {
        self.watchers.retain(|tx| tx.send(entry.clone()).is_ok());
    }
}

#[derive(Default)]
struct BusState {
    streams: HashMap<String, StreamState>,
    buckets: HashMap<String, BucketState>,
}

struct Shared {
    state: Mutex<BusState>,
    fail_publishes: AtomicBool,
}

/// In-process [`Bus`] implementation
#[derive(Clone)]
pub struct MemoryBus {
    shared: Arc<Shared>,
}

impl Default for MemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBus {
    /// Create an empty in-process bus
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(BusState::default()),
                fail_publishes: AtomicBool::new(false),
            }),
        }
    }

    /// Make every subsequent publish fail until cleared
    ///
    /// Lets tests drive the dispatcher's retry and deactivation paths.
    pub fn set_publish_failures(&self, fail: bool) {
        self.shared.fail_publishes.store(fail, Ordering::SeqCst);
    }

    /// Whether a stream exists
    pub fn stream_exists(&self, name: &str) -> bool {
        self.shared.state.lock().streams.contains_key(name)
    }

    /// Number of messages stored on a stream
    pub fn stream_len(&self, name: &str) -> usize {
        self.shared
            .state
            .lock()
            .streams
            .get(name)
            .map(|s| s.messages.len())
            .unwrap_or(0)
    }

    /// Snapshot the messages stored on a stream
    pub fn stream_messages(&self, name: &str) -> Vec<StoredMessage> {
        self.shared
            .state
            .lock()
            .streams
            .get(name)
            .map(|s| s.messages.clone())
            .unwrap_or_default()
    }

    /// The cumulative ack floor of a durable consumer
    pub fn consumer_ack_floor(&self, stream: &str, durable: &str) -> Option<u64> {
        self.shared
            .state
            .lock()
            .streams
            .get(stream)?
            .consumers
            .get(durable)
            .map(|c| c.ack_floor)
    }
}

#[async_trait]
impl Bus for MemoryBus {
    async fn ensure_stream(&self, config: StreamConfig) -> Result<()> {
        let mut state = self.shared.state.lock();
        if state.streams.contains_key(&config.name) {
            return Ok(());
        }

        tracing::debug!(stream = %config.name, subjects = ?config.subjects, "creating stream");
        state
            .streams
            .insert(config.name.clone(), StreamState::new(config));
        Ok(())
    }

    async fn delete_stream(&self, name: &str) -> Result<()> {
        let mut state = self.shared.state.lock();
        match state.streams.remove(name) {
            Some(stream) => {
                // Wake blocked fetches so they observe the deletion
                stream.notify.notify_waiters();
                Ok(())
            }
            None => Err(BusError::StreamNotFound(name.to_string())),
        }
    }

    async fn publish(&self, message: OutboundMessage, msg_id: &str) -> Result<PublishFuture> {
        if self.shared.fail_publishes.load(Ordering::SeqCst) {
            return Err(BusError::publish_failed("injected publish failure"));
        }

        let mut state = self.shared.state.lock();

        let stream = state
            .streams
            .values_mut()
            .find(|s| {
                s.config
                    .subjects
                    .iter()
                    .any(|p| subject_matches(p, &message.subject))
            })
            .ok_or_else(|| BusError::NoStreamForSubject(message.subject.clone()))?;

        let now = Instant::now();
        stream.prune_dedup(now);

        if !msg_id.is_empty() {
            if let Some((_, sequence)) = stream.dedup.get(msg_id) {
                // Duplicate inside the window: dropped by the bus, reported
                // as a success pointing at the original sequence
                return Ok(PublishFuture::resolved(Ok(*sequence)));
            }
        }

        let sequence = stream.next_sequence;
        stream.next_sequence += 1;
        stream.messages.push(StoredMessage {
            sequence,
            subject: message.subject,
            payload: message.payload,
            headers: message.headers,
        });

        if !msg_id.is_empty() && !stream.config.duplicate_window.is_zero() {
            stream.dedup.insert(msg_id.to_string(), (now, sequence));
            stream.dedup_order.push_back((now, msg_id.to_string()));
        }

        stream.notify.notify_waiters();

        Ok(PublishFuture::resolved(Ok(sequence)))
    }

    async fn pull_subscribe(
        &self,
        stream: &str,
        config: ConsumerConfig,
    ) -> Result<Box<dyn PullConsumer>> {
        let mut state = self.shared.state.lock();
        let stream_state = state
            .streams
            .get_mut(stream)
            .ok_or_else(|| BusError::StreamNotFound(stream.to_string()))?;

        let durable = config.durable.clone();
        let notify = Arc::clone(&stream_state.notify);

        match stream_state.consumers.get_mut(&durable) {
            Some(existing) => {
                // Resubscribe: everything above the ack floor redelivers
                existing.delivered = existing.ack_floor;
            }
            None => {
                stream_state.consumers.insert(
                    durable.clone(),
                    DurableState {
                        config: config.clone(),
                        ack_floor: 0,
                        delivered: 0,
                    },
                );
            }
        }

        let acker = Arc::new(ConsumerAck {
            shared: Arc::clone(&self.shared),
            stream: stream.to_string(),
            durable: durable.clone(),
        });

        Ok(Box::new(MemoryConsumer {
            shared: Arc::clone(&self.shared),
            stream: stream.to_string(),
            durable,
            notify,
            acker,
            open: true,
        }))
    }

    async fn key_value(&self, bucket: &str, _description: &str) -> Result<Arc<dyn KvBucket>> {
        let mut state = self.shared.state.lock();
        state.buckets.entry(bucket.to_string()).or_insert_with(|| BucketState {
            entries: HashMap::new(),
            watchers: Vec::new(),
        });

        Ok(Arc::new(MemoryKv {
            shared: Arc::clone(&self.shared),
            bucket: bucket.to_string(),
        }))
    }
}

/// Cumulative ack handle shared by all messages of one consumer
struct ConsumerAck {
    shared: Arc<Shared>,
    stream: String,
    durable: String,
}

#[async_trait]
impl MessageAck for ConsumerAck {
    async fn ack(&self, sequence: u64) -> Result<()> {
        let mut state = self.shared.state.lock();
        let stream = state
            .streams
            .get_mut(&self.stream)
            .ok_or_else(|| BusError::StreamNotFound(self.stream.clone()))?;
        let consumer = stream
            .consumers
            .get_mut(&self.durable)
            .ok_or_else(|| BusError::ConsumerClosed(self.durable.clone()))?;

        consumer.ack_floor = consumer.ack_floor.max(sequence);
        Ok(())
    }
}

/// Pull consumer over an in-process stream
struct MemoryConsumer {
    shared: Arc<Shared>,
    stream: String,
    durable: String,
    notify: Arc<Notify>,
    acker: Arc<ConsumerAck>,
    open: bool,
}

impl MemoryConsumer {
    /// Collect deliverable messages under the state lock
    ///
    /// Returns `None` when the stream has been deleted.
    fn try_collect(&self, max_messages: usize) -> Option<Vec<BusMessage>> {
        let mut state = self.shared.state.lock();
        let stream = state.streams.get_mut(&self.stream)?;
        let consumer = stream.consumers.get_mut(&self.durable)?;

        // Honor the max-ack-pending bound
        let in_flight = (consumer.delivered - consumer.ack_floor) as usize;
        let allowed = if consumer.config.max_ack_pending > 0 {
            consumer.config.max_ack_pending.saturating_sub(in_flight)
        } else {
            usize::MAX
        };

        let limit = max_messages.min(allowed);
        let filter = consumer.config.filter_subject.clone();

        // Messages are stored in sequence order; skip the delivered prefix
        let start = stream
            .messages
            .partition_point(|m| m.sequence <= consumer.delivered);

        let mut batch = Vec::new();
        for message in &stream.messages[start..] {
            if batch.len() >= limit {
                break;
            }
            if !subject_matches(&filter, &message.subject) {
                continue;
            }

            consumer.delivered = message.sequence;
            batch.push(BusMessage::new(
                message.subject.clone(),
                message.payload.clone(),
                message.headers.clone(),
                message.sequence,
                Arc::clone(&self.acker) as Arc<dyn MessageAck>,
            ));
        }

        Some(batch)
    }
}

#[async_trait]
impl PullConsumer for MemoryConsumer {
    async fn fetch(
        &mut self,
        max_messages: usize,
        max_wait: std::time::Duration,
    ) -> Result<Vec<BusMessage>> {
        if !self.open {
            return Err(BusError::ConsumerClosed(self.durable.clone()));
        }

        let deadline = Instant::now() + max_wait;

        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            // Register before checking state so a publish between the check
            // and the await cannot be missed
            notified.as_mut().enable();

            match self.try_collect(max_messages) {
                None => return Err(BusError::StreamNotFound(self.stream.clone())),
                Some(batch) if !batch.is_empty() => return Ok(batch),
                Some(_) => {}
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(Vec::new());
            }

            tokio::select! {
                _ = &mut notified => {}
                _ = tokio::time::sleep(remaining) => return Ok(Vec::new()),
            }
        }
    }

    async fn unsubscribe(&mut self) -> Result<()> {
        self.open = false;
        Ok(())
    }
}

/// Key-value bucket over the in-process bus
struct MemoryKv {
    shared: Arc<Shared>,
    bucket: String,
}

impl MemoryKv {
    fn with_bucket<T>(&self, f: impl FnOnce(&mut BucketState) -> T) -> Result<T> {
        let mut state = self.shared.state.lock();
        let bucket = state
            .buckets
            .get_mut(&self.bucket)
            .ok_or_else(|| BusError::BucketNotFound(self.bucket.clone()))?;
        Ok(f(bucket))
    }
}

#[async_trait]
impl KvBucket for MemoryKv {
    async fn keys(&self) -> Result<Vec<String>> {
        self.with_bucket(|b| b.entries.keys().cloned().collect())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.with_bucket(|b| b.entries.get(key).cloned())
    }

    async fn put(&self, key: &str, value: Vec<u8>) -> Result<()> {
        self.with_bucket(|b| {
            b.entries.insert(key.to_string(), value.clone());
            b.broadcast(KvEntry {
                operation: KvOperation::Put,
                key: key.to_string(),
                value,
            });
        })
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.with_bucket(|b| {
            b.entries.remove(key);
            b.broadcast(KvEntry {
                operation: KvOperation::Delete,
                key: key.to_string(),
                value: Vec::new(),
            });
        })
    }

    async fn watch(&self) -> Result<mpsc::UnboundedReceiver<KvEntry>> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.with_bucket(|b| b.watchers.push(tx))?;
        Ok(rx)
    }
}

#[cfg(test)]
#[path = "memory_test.rs"]
mod memory_test;
