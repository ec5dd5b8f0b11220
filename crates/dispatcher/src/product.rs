//! Product lifecycle container
//!
//! A product owns one processor, one event watcher, one output buffer and
//! one rule manager. Settings changes deactivate the product, purge its
//! pipeline, swap the rule manager, and reactivate if enabled; in-flight
//! messages keep the rules they were matched against.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use bytes::Bytes;
use gravity_bus::{Bus, BusError, BusMessage, StreamConfig};
use gravity_config::{EventWatcherConfig, ProcessorConfig, ProductConfig};
use gravity_rules::{Rule, RuleConfig, RuleManager, ScriptRuntime};
use gravity_schema::Schema;
use parking_lot::RwLock;
use serde::Deserialize;

use crate::error::Result;
use crate::event_watcher::{EventWatcher, WatchCallback};
use crate::message::{Message, MessagePool};
use crate::output_buffer::{ChunkHandler, OutputBuffer, OutputBufferConfig};
use crate::processor::{OutputHandler, Processor};
use crate::{product_consumer, product_stream, product_subject};

/// Wait between publish retries
const RETRY_INTERVAL: Duration = Duration::from_secs(1);

/// Declarative product description, carried in the config K/V store
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProductSetting {
    #[serde(default)]
    pub name: String,

    #[serde(rename = "desc", default)]
    pub description: String,

    #[serde(default)]
    pub enabled: bool,

    /// Operator-supplied output stream name; empty means the default
    /// `GVT_<domain>_DP_<name>`
    #[serde(default)]
    pub stream: String,

    /// Product schema configuration
    #[serde(default)]
    pub schema: Option<serde_json::Value>,

    /// Rule name → rule configuration
    #[serde(default)]
    pub rules: HashMap<String, RuleConfig>,
}

impl ProductSetting {
    /// Parse a setting from its config-store JSON
    pub fn from_bytes(bytes: &[u8]) -> std::result::Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

/// Everything a product needs from its surroundings
pub struct ProductContext {
    pub domain: String,
    pub name: String,
    pub bus: Arc<dyn Bus>,
    pub publisher: Arc<dyn Bus>,
    pub pool: Arc<MessagePool>,
    pub script_runtime: Option<Arc<dyn ScriptRuntime>>,
    pub processor_config: ProcessorConfig,
    pub product_config: ProductConfig,
    pub watcher_config: EventWatcherConfig,
}

/// Processor plus output buffer; purged and rebuilt as a unit
struct Pipeline {
    processor: Processor,
    buffer: Arc<OutputBuffer>,
}

/// Lifecycle container for one data product
pub struct Product {
    pub id: String,
    domain: String,
    name: RwLock<String>,
    stream_override: RwLock<String>,

    enabled: Arc<AtomicBool>,
    is_running: Arc<AtomicBool>,

    schema: RwLock<Option<Arc<Schema>>>,
    rules: Arc<RwLock<Arc<RuleManager>>>,
    pipeline: Arc<RwLock<Arc<Pipeline>>>,

    /// Test override for the processor output; `None` routes to the buffer
    on_message: Arc<RwLock<Option<OutputHandler>>>,

    watcher: EventWatcher,
    publisher: Arc<dyn Bus>,
    pool: Arc<MessagePool>,
    script_runtime: Option<Arc<dyn ScriptRuntime>>,

    processor_config: ProcessorConfig,
    product_config: ProductConfig,
}

impl Product {
    /// Create an idle product; [`Product::apply_settings`] configures and
    /// activates it
    pub fn new(ctx: ProductContext) -> Self {
        let watcher = EventWatcher::new(
            Arc::clone(&ctx.bus),
            ctx.domain.clone(),
            product_consumer(&ctx.domain, &ctx.name),
            ctx.watcher_config,
        );

        let enabled = Arc::new(AtomicBool::new(false));
        let is_running = Arc::new(AtomicBool::new(false));
        let on_message = Arc::new(RwLock::new(None));

        let pipeline = build_pipeline(
            &ctx.domain,
            &ctx.name,
            ctx.processor_config,
            ctx.product_config,
            &ctx.publisher,
            &enabled,
            &is_running,
            &ctx.pool,
            &on_message,
        );

        Self {
            id: uuid::Uuid::new_v4().to_string(),
            domain: ctx.domain,
            name: RwLock::new(ctx.name),
            stream_override: RwLock::new(String::new()),
            enabled,
            is_running,
            schema: RwLock::new(None),
            rules: Arc::new(RwLock::new(Arc::new(RuleManager::new()))),
            pipeline: Arc::new(RwLock::new(pipeline)),
            on_message,
            watcher,
            publisher: ctx.publisher,
            pool: ctx.pool,
            script_runtime: ctx.script_runtime,
            processor_config: ctx.processor_config,
            product_config: ctx.product_config,
        }
    }

    /// Current product name
    pub fn name(&self) -> String {
        self.name.read().clone()
    }

    /// Whether the settings enable this product
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// Whether the product is actively consuming
    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::SeqCst)
    }

    /// The current rule manager reference
    pub fn rules(&self) -> Arc<RuleManager> {
        self.rules.read().clone()
    }

    /// The event watcher
    pub fn watcher(&self) -> &EventWatcher {
        &self.watcher
    }

    /// Override the processor output, bypassing the publish buffer
    ///
    /// Tests use this to observe processed messages directly.
    pub fn subscribe(&self, handler: OutputHandler) {
        *self.on_message.write() = Some(handler);
    }

    /// Apply a settings snapshot atomically
    ///
    /// Deactivates first, purges the pipeline, replaces configuration and
    /// rules, then activates again when the setting says enabled. An error
    /// (bad schema, bad rule) leaves the product deactivated with its
    /// previous configuration otherwise untouched; the caller logs and
    /// skips the update.
    pub async fn apply_settings(&self, setting: &ProductSetting) -> Result<()> {
        tracing::info!(
            product = %setting.name,
            enabled = setting.enabled,
            rule_count = setting.rules.len(),
            "applying product settings"
        );

        self.deactivate().await?;
        self.purge_tasks().await;

        *self.name.write() = setting.name.clone();
        *self.stream_override.write() = setting.stream.clone();
        self.enabled.store(setting.enabled, Ordering::SeqCst);

        if let Some(schema_config) = &setting.schema {
            *self.schema.write() = Some(Arc::new(Schema::from_config(schema_config)?));
        }

        self.apply_rules(&setting.rules)?;

        self.activate().await
    }

    /// Compile and install a fresh rule manager
    pub fn apply_rules(&self, rules: &HashMap<String, RuleConfig>) -> Result<()> {
        let target_schema = self.schema.read().clone();
        let mut manager = RuleManager::new();

        for (rule_name, config) in rules {
            let rule = Rule::compile(config, target_schema.clone(), self.script_runtime.clone())?;
            tracing::debug!(rule = %rule_name, event = %config.event, "compiled rule");
            manager.add_rule(rule);
        }

        let manager = Arc::new(manager);
        *self.rules.write() = Arc::clone(&manager);

        self.watcher.purge_events();
        for event in manager.get_events() {
            self.watcher.register_event(&event);
        }

        Ok(())
    }

    /// Start consuming, if enabled
    pub async fn activate(&self) -> Result<()> {
        if !self.enabled.load(Ordering::SeqCst) {
            return Ok(());
        }

        self.is_running.store(true, Ordering::SeqCst);
        tracing::info!(product = %self.name(), "activating product");

        self.ensure_output_stream().await?;

        // The callback owns handles to the message path only, so the
        // watcher never keeps the whole product alive
        let pool = Arc::clone(&self.pool);
        let rules = Arc::clone(&self.rules);
        let pipeline = Arc::clone(&self.pipeline);
        let name = self.name();

        let callback: WatchCallback = Arc::new(move |event, message| {
            let pool = Arc::clone(&pool);
            let rules = Arc::clone(&rules);
            let pipeline = Arc::clone(&pipeline);
            let name = name.clone();
            Box::pin(async move {
                handle_incoming(&pool, &rules, &pipeline, &name, event, message).await;
            })
        });

        self.watcher.watch(callback).await
    }

    /// Stop consuming; the output buffer's retry loop observes the cleared
    /// running flag and abandons its batch without ack
    pub async fn deactivate(&self) -> Result<()> {
        if self.is_running.swap(false, Ordering::SeqCst) {
            tracing::info!(product = %self.name(), "deactivating product");
        }

        self.watcher.stop().await
    }

    /// Drop buffered work and reinstall a fresh processor and buffer
    pub async fn purge_tasks(&self) {
        let old = self.pipeline.read().clone();
        old.buffer.close().await;
        old.processor.close().await;

        let fresh = build_pipeline(
            &self.domain,
            &self.name(),
            self.processor_config,
            self.product_config,
            &self.publisher,
            &self.enabled,
            &self.is_running,
            &self.pool,
            &self.on_message,
        );
        *self.pipeline.write() = fresh;
    }

    /// Create this product's output stream if missing
    ///
    /// Same retention parameters as the input stream, with the product's
    /// own dedup window; replicas fall back from three to one.
    pub async fn ensure_output_stream(&self) -> Result<()> {
        let name = self.name();
        let stream_override = self.stream_override.read().clone();

        ensure_product_stream(
            &self.publisher,
            &self.domain,
            &name,
            &stream_override,
            &self.product_config,
        )
        .await
    }

    /// Entry point for messages arriving off the input stream
    pub async fn handle_message(&self, event: String, source: BusMessage) {
        handle_incoming(
            &self.pool,
            &self.rules,
            &self.pipeline,
            &self.name(),
            event,
            source,
        )
        .await;
    }

    /// Entry point for raw envelopes that bypass the bus (tests, local
    /// ingest)
    pub async fn handle_raw_message(&self, event: impl Into<String>, raw: Bytes) {
        let mut msg = self.pool.get();
        msg.ignore = false;
        msg.event = event.into();
        msg.raw = raw;
        msg.rules = Some(self.rules());

        let pipeline = self.pipeline.read().clone();
        if let Err(e) = pipeline.processor.push(msg).await {
            tracing::warn!(product = %self.name(), error = %e, "dropping message");
        }
    }
}

/// Build a pooled message for one input-stream delivery and push it into
/// the pipeline
async fn handle_incoming(
    pool: &Arc<MessagePool>,
    rules: &RwLock<Arc<RuleManager>>,
    pipeline: &RwLock<Arc<Pipeline>>,
    product: &str,
    event: String,
    source: BusMessage,
) {
    let mut raw = source.payload.clone();

    if source.headers.get("Content-Encoding") == Some("s2") {
        match snap::raw::Decoder::new().decompress_vec(&source.payload) {
            Ok(decompressed) => raw = Bytes::from(decompressed),
            Err(e) => {
                // No ack: the bus redelivers after restart
                tracing::error!(product = %product, error = %e, "failed to decompress message");
                return;
            }
        }
    }

    let mut msg = pool.get();
    msg.ignore = event.is_empty();
    msg.event = event;
    msg.raw = raw;
    msg.source = Some(source);
    msg.rules = Some(rules.read().clone());

    let pipeline = pipeline.read().clone();
    if let Err(e) = pipeline.processor.push(msg).await {
        tracing::warn!(product = %product, error = %e, "dropping message");
    }
}

/// Assemble a processor → buffer pipeline wired to the publish handler
#[allow(clippy::too_many_arguments)]
fn build_pipeline(
    domain: &str,
    name: &str,
    processor_config: ProcessorConfig,
    product_config: ProductConfig,
    publisher: &Arc<dyn Bus>,
    enabled: &Arc<AtomicBool>,
    is_running: &Arc<AtomicBool>,
    pool: &Arc<MessagePool>,
    on_message: &Arc<RwLock<Option<OutputHandler>>>,
) -> Arc<Pipeline> {
    tracing::info!(
        product = %name,
        max_flush_interval_ms = product_config.max_flush_interval_ms,
        "initializing dispatcher buffer"
    );

    let chunk_handler: ChunkHandler = {
        let publisher = Arc::clone(publisher);
        let enabled = Arc::clone(enabled);
        let is_running = Arc::clone(is_running);
        let pool = Arc::clone(pool);
        let name = name.to_string();

        Arc::new(move |chunk| {
            let publisher = Arc::clone(&publisher);
            let enabled = Arc::clone(&enabled);
            let is_running = Arc::clone(&is_running);
            let pool = Arc::clone(&pool);
            let name = name.clone();
            Box::pin(dispatch_chunk(publisher, enabled, is_running, pool, name, chunk))
        })
    };

    let buffer = Arc::new(OutputBuffer::new(
        OutputBufferConfig {
            timeout: product_config.max_flush_interval(),
            ..OutputBufferConfig::default()
        },
        chunk_handler,
    ));

    let output: OutputHandler = {
        let buffer = Arc::clone(&buffer);
        let on_message = Arc::clone(on_message);

        Arc::new(move |msg| {
            let buffer = Arc::clone(&buffer);
            let override_handler = on_message.read().clone();
            Box::pin(async move {
                match override_handler {
                    Some(handler) => handler(msg).await,
                    None => {
                        if buffer.push(msg).await.is_err() {
                            tracing::debug!("output buffer closed, dropping message");
                        }
                    }
                }
            })
        })
    };

    let processor = Processor::new(domain, processor_config, output);

    Arc::new(Pipeline { processor, buffer })
}

/// Publish a whole batch, then cumulatively ack its tail
///
/// Publish failures retry forever at one-second intervals while the
/// product runs; deactivation abandons the batch without ack so the bus
/// redelivers it later. Only after every publish resolved is the last
/// message acked (covering the whole batch), and the messages return to
/// the pool.
async fn dispatch_chunk(
    publisher: Arc<dyn Bus>,
    enabled: Arc<AtomicBool>,
    is_running: Arc<AtomicBool>,
    pool: Arc<MessagePool>,
    product: String,
    mut chunk: Vec<Box<Message>>,
) {
    // Kick off every publish
    for msg in chunk.iter_mut() {
        if !is_running.load(Ordering::SeqCst) {
            return;
        }

        while let Err(e) = dispatch_one(&publisher, &enabled, msg).await {
            tracing::error!(product = %product, error = %e, "failed to dispatch");
            tokio::time::sleep(RETRY_INTERVAL).await;
            if !is_running.load(Ordering::SeqCst) {
                return;
            }
            tracing::info!(product = %product, "retrying publish");
        }
    }

    // Wait for the bus to accept each one, in order
    for msg in chunk.iter_mut() {
        while let Some(future) = msg.publish.take() {
            match future.wait().await {
                Ok(_) => break,
                Err(e) => {
                    tracing::error!(product = %product, error = %e, "publish rejected");
                    loop {
                        tokio::time::sleep(RETRY_INTERVAL).await;
                        if !is_running.load(Ordering::SeqCst) {
                            return;
                        }
                        tracing::info!(product = %product, "retrying publish");
                        match dispatch_one(&publisher, &enabled, msg).await {
                            Ok(()) => break,
                            Err(e) => {
                                tracing::error!(product = %product, error = %e, "failed to dispatch");
                            }
                        }
                    }
                }
            }
        }
    }

    // The batch tail is the cumulative-ack anchor
    if let Some(last) = chunk.iter().rev().find(|m| m.source.is_some()) {
        if let Err(e) = last.ack().await {
            tracing::error!(product = %product, error = %e, "failed to ack");
        }
    }

    tracing::debug!(product = %product, count = chunk.len(), "messages dispatched");

    for msg in chunk {
        pool.put(msg);
    }
}

/// Publish one message asynchronously, storing its future
///
/// Ignored messages and disabled products publish nothing; the message
/// still participates in the batch so the cumulative ack covers it.
async fn dispatch_one(
    publisher: &Arc<dyn Bus>,
    enabled: &Arc<AtomicBool>,
    msg: &mut Message,
) -> std::result::Result<(), BusError> {
    if msg.ignore || !enabled.load(Ordering::SeqCst) {
        return Ok(());
    }

    let Some(output) = msg.output.clone() else {
        return Ok(());
    };

    let future = publisher.publish(output, &msg.id).await?;
    msg.publish = Some(future);
    Ok(())
}

/// Create a product output stream if missing, with replica fallback
pub(crate) async fn ensure_product_stream(
    bus: &Arc<dyn Bus>,
    domain: &str,
    name: &str,
    stream_override: &str,
    config: &ProductConfig,
) -> Result<()> {
    let stream = if stream_override.is_empty() {
        product_stream(domain, name)
    } else {
        stream_override.to_string()
    };
    let subject = product_subject(domain, name);

    tracing::info!(
        product = %name,
        stream = %stream,
        subject = %subject,
        max_stream_bytes = config.max_stream_bytes,
        "checking product stream"
    );

    let stream_config = StreamConfig::new(stream, vec![subject])
        .with_description("Gravity product event store")
        .with_duplicate_window(config.duplicates())
        .with_max_bytes(config.max_stream_bytes)
        .with_max_age(config.max_stream_age())
        .with_compression(true)
        .with_replicas(3);

    if bus.ensure_stream(stream_config.clone()).await.is_err() {
        bus.ensure_stream(stream_config.with_replicas(1)).await?;
    }

    Ok(())
}

#[cfg(test)]
#[path = "product_test.rs"]
mod product_test;
