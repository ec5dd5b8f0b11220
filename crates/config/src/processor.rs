//! Per-product transform pipeline sizing

use serde::Deserialize;

/// Processor worker-pool settings
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct ProcessorConfig {
    /// Parallel transform workers per processor
    /// Default: 8
    pub worker_count: usize,

    /// Pending-task bound; submission blocks beyond it
    /// Default: 2048
    pub max_pending_count: usize,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            worker_count: 8,
            max_pending_count: 2048,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ProcessorConfig::default();
        assert_eq!(config.worker_count, 8);
        assert_eq!(config.max_pending_count, 2048);
    }
}
