//! Bus connection and domain settings

use serde::Deserialize;

/// Settings shared by every component talking to the bus
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GravityConfig {
    /// Logical namespace prefix for streams, subjects and KV buckets
    /// Default: "default"
    pub domain: String,

    /// Bus host
    /// Default: "0.0.0.0"
    pub host: String,

    /// Bus port
    /// Default: 32803
    pub port: u16,

    /// Access key for the bus connection (empty = none)
    pub access_key: String,

    /// Ping interval in seconds
    /// Default: 10
    pub ping_interval: u64,

    /// Outstanding pings before the connection is considered dead
    /// Default: 3
    pub max_pings_outstanding: u32,

    /// Reconnect attempts (-1 = unlimited)
    /// Default: -1
    pub max_reconnects: i32,
}

impl Default for GravityConfig {
    fn default() -> Self {
        Self {
            domain: "default".into(),
            host: "0.0.0.0".into(),
            port: 32803,
            access_key: String::new(),
            ping_interval: 10,
            max_pings_outstanding: 3,
            max_reconnects: -1,
        }
    }
}
