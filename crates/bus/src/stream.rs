//! Stream and consumer configuration

use std::time::Duration;

/// Retention policy of a stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Retention {
    /// Messages age out by limits (size, age); consumers do not affect
    /// retention
    #[default]
    Limits,
    /// Messages are removed once every bound consumer has acknowledged them
    Interest,
}

/// Acknowledgement policy of a consumer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AckPolicy {
    /// Acknowledging a message acknowledges everything before it
    #[default]
    All,
    /// Every message must be acknowledged individually
    Explicit,
}

/// Declarative stream configuration
#[derive(Debug, Clone)]
pub struct StreamConfig {
    pub name: String,
    pub description: String,
    pub subjects: Vec<String>,
    pub retention: Retention,
    pub max_bytes: u64,
    pub max_age: Duration,
    pub duplicate_window: Duration,
    pub compression: bool,
    pub replicas: usize,
    pub deny_delete: bool,
}

impl StreamConfig {
    /// Create a stream configuration with the given name and subjects
    pub fn new(name: impl Into<String>, subjects: Vec<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            subjects,
            retention: Retention::Limits,
            max_bytes: 0,
            max_age: Duration::ZERO,
            duplicate_window: Duration::ZERO,
            compression: false,
            replicas: 1,
            deny_delete: false,
        }
    }

    /// Set the description
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Set the maximum stream size in bytes (0 = unlimited)
    #[must_use]
    pub fn with_max_bytes(mut self, max_bytes: u64) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    /// Set the maximum message age (zero = unlimited)
    #[must_use]
    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = max_age;
        self
    }

    /// Set the deduplication window
    #[must_use]
    pub fn with_duplicate_window(mut self, window: Duration) -> Self {
        self.duplicate_window = window;
        self
    }

    /// Enable payload compression on the stream
    #[must_use]
    pub fn with_compression(mut self, enabled: bool) -> Self {
        self.compression = enabled;
        self
    }

    /// Set the replica count
    #[must_use]
    pub fn with_replicas(mut self, replicas: usize) -> Self {
        self.replicas = replicas;
        self
    }

    /// Forbid message deletion
    #[must_use]
    pub fn with_deny_delete(mut self, deny: bool) -> Self {
        self.deny_delete = deny;
        self
    }
}

/// Durable pull-consumer configuration
#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    pub durable: String,
    pub filter_subject: String,
    pub ack_policy: AckPolicy,
    pub max_ack_pending: usize,
}

impl ConsumerConfig {
    /// Create a durable consumer configuration
    pub fn new(durable: impl Into<String>, filter_subject: impl Into<String>) -> Self {
        Self {
            durable: durable.into(),
            filter_subject: filter_subject.into(),
            ack_policy: AckPolicy::All,
            max_ack_pending: 0,
        }
    }

    /// Set the acknowledgement policy
    #[must_use]
    pub fn with_ack_policy(mut self, policy: AckPolicy) -> Self {
        self.ack_policy = policy;
        self
    }

    /// Bound the number of unacknowledged deliveries (0 = unbounded)
    #[must_use]
    pub fn with_max_ack_pending(mut self, max: usize) -> Self {
        self.max_ack_pending = max;
        self
    }
}
