//! Output stream and flush settings

use std::time::Duration;

use serde::Deserialize;

/// Product output settings
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct ProductConfig {
    /// Output buffer flush interval in milliseconds
    /// Default: 100
    pub max_flush_interval_ms: u64,

    /// Maximum output stream size in bytes
    /// Default: 8 GiB
    pub max_stream_bytes: u64,

    /// Maximum output stream message age in seconds
    /// Default: 7 days
    pub max_stream_age_secs: u64,

    /// Output stream deduplication window in seconds
    /// Default: 5 minutes
    pub duplicates_secs: u64,
}

impl Default for ProductConfig {
    fn default() -> Self {
        Self {
            max_flush_interval_ms: 100,
            max_stream_bytes: 8 * 1024 * 1024 * 1024,
            max_stream_age_secs: 7 * 24 * 60 * 60,
            duplicates_secs: 5 * 60,
        }
    }
}

impl ProductConfig {
    /// Flush interval as a duration
    pub fn max_flush_interval(&self) -> Duration {
        Duration::from_millis(self.max_flush_interval_ms)
    }

    /// Stream age limit as a duration
    pub fn max_stream_age(&self) -> Duration {
        Duration::from_secs(self.max_stream_age_secs)
    }

    /// Dedup window as a duration
    pub fn duplicates(&self) -> Duration {
        Duration::from_secs(self.duplicates_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ProductConfig::default();
        assert_eq!(config.max_flush_interval(), Duration::from_millis(100));
        assert_eq!(config.max_stream_bytes, 8 * 1024 * 1024 * 1024);
        assert_eq!(config.max_stream_age(), Duration::from_secs(7 * 24 * 3600));
        assert_eq!(config.duplicates(), Duration::from_secs(300));
    }
}
