//! Gravity - Dispatcher
//!
//! The dispatch stage of the data-product event pipeline.
//!
//! # Architecture
//!
//! ```text
//! input stream ──→ EventWatcher ──→ Product.handle_message
//!                                        │ (pooled Message)
//!                                   Processor.push
//!                                        │
//!                                 SequentialRunner ──ordered──→ OutputBuffer
//!                                   (rule match,                    │
//!                                    transform,              dispatch + wait
//!                                    partition)                     │
//!                                                        publisher ──→ product stream
//!                                                             │
//!                                                cumulative ack ──→ input stream
//! ```
//!
//! # Key Design
//!
//! - **Per-product FIFO**: the runner releases transform results in
//!   submission order, so the buffer can acknowledge cumulatively.
//! - **At-least-once**: a batch acks only its last message, and only after
//!   every publish succeeded; deactivation mid-retry abandons the batch
//!   without ack and the bus redelivers.
//! - **Live reconfiguration**: settings changes swap a product's rule
//!   manager reference; in-flight messages keep their bound rules.
//! - **Pooled envelopes**: messages are leased from a pool on arrival and
//!   returned (zeroed) on terminal outcome.

mod config_store;
mod dispatcher;
mod error;
mod event_watcher;
mod message;
mod output_buffer;
mod partition;
mod processor;
mod product;
mod product_manager;

pub use config_store::{ConfigOp, ConfigStore};
pub use dispatcher::Dispatcher;
pub use error::{DispatcherError, MessageError, Result};
pub use event_watcher::{EventWatcher, WatchCallback};
pub use message::{Message, MessagePool, RawData};
pub use output_buffer::{OutputBuffer, OutputBufferConfig};
pub use partition::{PARTITION_COUNT, Partitioner};
pub use processor::{OutputHandler, Processor};
pub use product::{Product, ProductContext, ProductSetting};
pub use product_manager::ProductManager;

/// Input stream name for a domain
pub fn domain_stream(domain: &str) -> String {
    format!("GVT_{domain}")
}

/// Subject of one domain event
pub fn domain_event_subject(domain: &str, event: &str) -> String {
    format!("$GVT.{domain}.EVENT.{event}")
}

/// Output stream name for a product
pub fn product_stream(domain: &str, product: &str) -> String {
    format!("GVT_{domain}_DP_{product}")
}

/// Subject pattern of a product's output stream
pub fn product_subject(domain: &str, product: &str) -> String {
    format!("$GVT.{domain}.DP.{product}.*.EVENT.>")
}

/// Durable consumer name of a product on the domain input stream
pub fn product_consumer(domain: &str, product: &str) -> String {
    format!("GVT_{domain}_DP_{product}")
}
