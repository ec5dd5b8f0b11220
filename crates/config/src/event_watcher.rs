//! Input consumer settings

use std::time::Duration;

use serde::Deserialize;

/// Event watcher (input pull consumer) settings
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct EventWatcherConfig {
    /// Consumer-side pending byte budget
    /// Default: 128 MiB
    pub buffer_size: usize,

    /// Messages fetched per pull, and the consumer's max-ack-pending
    /// Default: 8192
    pub max_pending_count: usize,

    /// Fetch wait bound in milliseconds
    /// Default: 1000
    pub max_wait_ms: u64,
}

impl Default for EventWatcherConfig {
    fn default() -> Self {
        Self {
            buffer_size: 128 * 1024 * 1024,
            max_pending_count: 8192,
            max_wait_ms: 1000,
        }
    }
}

impl EventWatcherConfig {
    /// Fetch wait bound as a duration
    pub fn max_wait(&self) -> Duration {
        Duration::from_millis(self.max_wait_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EventWatcherConfig::default();
        assert_eq!(config.buffer_size, 128 * 1024 * 1024);
        assert_eq!(config.max_pending_count, 8192);
        assert_eq!(config.max_wait(), Duration::from_secs(1));
    }
}
