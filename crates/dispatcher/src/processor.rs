//! Per-product transformation pipeline
//!
//! The processor consumes raw messages, matches rules, parses payloads,
//! runs the rule transform, computes the partition, and builds the
//! outbound message. Work runs on the order-preserving runner so results
//! reach the output handler in input-stream order.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use gravity_config::ProcessorConfig;
use gravity_runner::{Runner, RunnerConfig};
use gravity_schema::{ProductEvent, Record, convert};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::error::{DispatcherError, Result};
use crate::message::Message;
use crate::partition::Partitioner;

/// Receives processed messages in submission order
pub type OutputHandler =
    Arc<dyn Fn(Box<Message>) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// Per-product transformation pipeline
pub struct Processor {
    runner: Arc<Runner<Box<Message>>>,
    forward: Mutex<Option<JoinHandle<()>>>,
}

impl Processor {
    /// Spawn the processor's worker pool
    ///
    /// `output` is invoked for every message, in submission order, once its
    /// transform completes. Ignored messages are delivered too, so the
    /// downstream acknowledgement sequence stays contiguous.
    pub fn new(domain: impl Into<String>, config: ProcessorConfig, output: OutputHandler) -> Self {
        let domain: Arc<str> = Arc::from(domain.into());
        let partitioner = Arc::new(Partitioner::new());

        tracing::info!(
            worker_count = config.worker_count,
            max_pending_count = config.max_pending_count,
            "initializing processor"
        );

        let (runner, mut results) = Runner::spawn(
            RunnerConfig {
                worker_count: config.worker_count,
                max_pending_count: config.max_pending_count,
            },
            move |_worker, msg: Box<Message>| process(&domain, &partitioner, msg),
        );

        let forward = tokio::spawn(async move {
            while let Some(msg) = results.recv().await {
                output(msg).await;
            }
        });

        Self {
            runner,
            forward: Mutex::new(Some(forward)),
        }
    }

    /// Enqueue a message; blocks while the pending queue is full
    pub async fn push(&self, msg: Box<Message>) -> Result<()> {
        self.runner
            .add_task(msg)
            .await
            .map_err(|_| DispatcherError::ProcessorClosed)
    }

    /// Drain in-flight work and stop the workers
    pub async fn close(&self) {
        self.runner.close().await;
        if let Some(forward) = self.forward.lock().await.take() {
            let _ = forward.await;
        }
    }
}

/// The per-message transform, run on a worker
fn process(domain: &str, partitioner: &Partitioner, mut msg: Box<Message>) -> Box<Message> {
    if msg.ignore {
        return msg;
    }

    if msg.rule.is_none() && !bind_rule(&mut msg) {
        msg.ignore = true;
        return msg;
    }

    if let Err(e) = msg.parse_raw() {
        tracing::error!(error = %e, event = %msg.event, "failed to parse message");
        msg.ignore = true;
        return msg;
    }

    let product_event = match build_product_event(&msg) {
        Ok(Some(pe)) => pe,
        Ok(None) => {
            // Transform suppressed the message
            msg.ignore = true;
            return msg;
        }
        Err(e) => {
            tracing::error!(error = %e, event = %msg.event, "failed to process payload");
            msg.ignore = true;
            return msg;
        }
    };

    let raw_product_event = match product_event.to_bytes() {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::error!(error = %e, "failed to serialize product event");
            msg.ignore = true;
            return msg;
        }
    };

    // Idempotency ID and headers come from the source envelope when the
    // message arrived off the stream
    let headers = match &msg.source {
        Some(source) => {
            msg.id = format!("{:x}", source.stream_sequence);
            source.headers.clone()
        }
        None => gravity_bus::Headers::new(),
    };

    msg.partition = partitioner.partition(&product_event.primary_key);

    let subject = format!(
        "$GVT.{domain}.DP.{table}.{partition}.EVENT.{event}",
        table = product_event.table,
        partition = msg.partition,
        event = product_event.event_name,
    );

    msg.output = Some(gravity_bus::OutboundMessage::new(
        subject,
        raw_product_event.clone().into(),
        headers,
    ));
    msg.raw_product_event = raw_product_event;
    msg.product_event = Some(product_event);

    msg
}

/// Resolve the matching rule from the message's rule-set snapshot
fn bind_rule(msg: &mut Message) -> bool {
    let Some(rules) = msg.rules.as_ref() else {
        return false;
    };

    let matched = rules.get_rules_by_event(&msg.event);
    let Some(rule) = matched.first() else {
        tracing::warn!(event = %msg.event, "ignoring event with no matching rule");
        return false;
    };

    msg.rule = Some(Arc::clone(rule));
    true
}

/// Transform the payload and assemble the product event
fn build_product_event(
    msg: &Message,
) -> std::result::Result<Option<ProductEvent>, gravity_rules::HandlerError> {
    let Some(rule) = msg.rule.as_ref() else {
        return Ok(None);
    };

    let results = rule.transform(None, &msg.data.payload)?;
    let Some(result) = results.first() else {
        return Ok(None);
    };

    if results.len() > 1 {
        tracing::debug!(
            outputs = results.len(),
            "transform fanned out, dispatching first output"
        );
    }

    let schema = rule.destination_schema().map(Arc::as_ref);
    let record = Record::from_fields(convert(schema, result));
    let primary_key = record.primary_key(&rule.primary_key);

    Ok(Some(ProductEvent {
        event_name: msg.data.event.clone(),
        method: rule.method,
        table: rule.product.clone(),
        primary_keys: rule.primary_key.clone(),
        primary_key,
        content: record.into_value(),
    }))
}

#[cfg(test)]
#[path = "processor_test.rs"]
mod processor_test;
