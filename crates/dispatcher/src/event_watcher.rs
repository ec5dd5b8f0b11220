//! Durable pull consumer on the domain input stream
//!
//! One watcher per product. It ensures the input stream exists, creates a
//! durable cumulative-ack consumer filtered to the domain's event subjects,
//! and runs a fetch loop that hands each message to the product together
//! with the event name its subject maps to. Subjects with no registered
//! event deliver an empty name, which the processor turns into
//! ignore-with-ack.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use gravity_bus::{AckPolicy, Bus, BusMessage, ConsumerConfig, StreamConfig};
use gravity_config::EventWatcherConfig;
use parking_lot::RwLock;
use tokio::task::JoinHandle;

use crate::error::Result;
use crate::{domain_event_subject, domain_stream};

/// Input stream duplicate window
const INPUT_DUPLICATE_WINDOW: Duration = Duration::from_secs(10 * 60);

/// Input stream size bound
const INPUT_MAX_BYTES: u64 = 8 * 1024 * 1024 * 1024;

/// Input stream age bound
const INPUT_MAX_AGE: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Receives `(event_name, message)` for every fetched message
pub type WatchCallback =
    Arc<dyn Fn(String, BusMessage) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// Watches the domain input stream for a product
pub struct EventWatcher {
    bus: Arc<dyn Bus>,
    domain: String,
    durable: String,
    config: EventWatcherConfig,

    /// Subject → registered event name
    events: Arc<RwLock<HashMap<String, String>>>,

    running: Arc<AtomicBool>,
    task: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

impl EventWatcher {
    /// Create a watcher for one durable consumer
    pub fn new(
        bus: Arc<dyn Bus>,
        domain: impl Into<String>,
        durable: impl Into<String>,
        config: EventWatcherConfig,
    ) -> Self {
        Self {
            bus,
            domain: domain.into(),
            durable: durable.into(),
            config,
            events: Arc::new(RwLock::new(HashMap::new())),
            running: Arc::new(AtomicBool::new(false)),
            task: tokio::sync::Mutex::new(None),
        }
    }

    /// Register an event name for delivery
    pub fn register_event(&self, name: &str) {
        let subject = domain_event_subject(&self.domain, name);
        tracing::info!(subject = %subject, "registered event");
        self.events.write().insert(subject, name.to_string());
    }

    /// Remove a registered event name
    pub fn unregister_event(&self, name: &str) {
        let subject = domain_event_subject(&self.domain, name);
        self.events.write().remove(&subject);
    }

    /// Remove all registered events
    pub fn purge_events(&self) {
        self.events.write().clear();
    }

    /// Registered event names
    pub fn events(&self) -> Vec<String> {
        self.events.read().values().cloned().collect()
    }

    /// Create the domain input stream if it does not exist
    ///
    /// Three replicas are attempted first; single-node deployments fall
    /// back to one.
    pub async fn ensure_stream(&self) -> Result<()> {
        let stream = domain_stream(&self.domain);
        let subject = domain_event_subject(&self.domain, "*");

        tracing::info!(stream = %stream, subject = %subject, "initializing event stream");

        let config = StreamConfig::new(stream, vec![subject])
            .with_description("Gravity domain event store")
            .with_duplicate_window(INPUT_DUPLICATE_WINDOW)
            .with_max_bytes(INPUT_MAX_BYTES)
            .with_max_age(INPUT_MAX_AGE)
            .with_compression(true)
            .with_deny_delete(true)
            .with_replicas(3);

        if self.bus.ensure_stream(config.clone()).await.is_err() {
            self.bus.ensure_stream(config.with_replicas(1)).await?;
        }

        Ok(())
    }

    /// Start the fetch loop
    ///
    /// A watcher that is already running is left alone. The callback runs
    /// inline in the loop, so its backpressure (a full processor queue)
    /// throttles fetching.
    pub async fn watch(&self, callback: WatchCallback) -> Result<()> {
        let mut task = self.task.lock().await;
        if task.is_some() {
            return Ok(());
        }

        self.ensure_stream().await?;

        let stream = domain_stream(&self.domain);
        let filter = domain_event_subject(&self.domain, ">");

        tracing::info!(
            stream = %stream,
            consumer = %self.durable,
            buffer_size = self.config.buffer_size,
            max_pending_count = self.config.max_pending_count,
            max_wait_ms = self.config.max_wait_ms,
            "start watching for events"
        );

        let consumer = self
            .bus
            .pull_subscribe(
                &stream,
                ConsumerConfig::new(&self.durable, filter)
                    .with_ack_policy(AckPolicy::All)
                    .with_max_ack_pending(self.config.max_pending_count),
            )
            .await?;

        self.running.store(true, Ordering::SeqCst);

        *task = Some(tokio::spawn(fetch_loop(
            consumer,
            Arc::clone(&self.events),
            Arc::clone(&self.running),
            self.config,
            self.durable.clone(),
            callback,
        )));

        Ok(())
    }

    /// Stop the fetch loop and wait for it to exit
    pub async fn stop(&self) -> Result<()> {
        self.running.store(false, Ordering::SeqCst);

        if let Some(task) = self.task.lock().await.take() {
            let _ = task.await;
        }

        Ok(())
    }
}

async fn fetch_loop(
    mut consumer: Box<dyn gravity_bus::PullConsumer>,
    events: Arc<RwLock<HashMap<String, String>>>,
    running: Arc<AtomicBool>,
    config: EventWatcherConfig,
    durable: String,
    callback: WatchCallback,
) {
    tracing::info!(durable = %durable, "waiting for events");

    while running.load(Ordering::SeqCst) {
        let batch = match consumer
            .fetch(config.max_pending_count, config.max_wait())
            .await
        {
            Ok(batch) => batch,
            Err(e) => {
                if !running.load(Ordering::SeqCst) {
                    break;
                }
                tracing::error!(durable = %durable, error = %e, "fetch failed");
                tokio::time::sleep(config.max_wait()).await;
                continue;
            }
        };

        if !batch.is_empty() {
            tracing::debug!(durable = %durable, count = batch.len(), "received messages");
        }

        for message in batch {
            // Unknown subjects flow through with an empty event name and
            // get ignored (with ack) downstream
            let event = events
                .read()
                .get(&message.subject)
                .cloned()
                .unwrap_or_default();

            callback(event, message).await;
        }
    }

    let _ = consumer.unsubscribe().await;
    tracing::info!(durable = %durable, "event watcher stopped");
}
