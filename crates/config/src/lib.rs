//! Gravity Configuration
//!
//! TOML-based configuration loading with sensible defaults.
//! Minimal config should just work - only specify what you need to change.
//!
//! # Parsing
//!
//! Use the `FromStr` trait to parse configuration:
//!
//! ```
//! use gravity_config::Config;
//! use std::str::FromStr;
//!
//! let config = Config::from_str("[gravity]\ndomain = \"default\"").unwrap();
//! assert_eq!(config.gravity.domain, "default");
//! ```
//!
//! # Example Minimal Config
//!
//! ```toml
//! [gravity]
//! domain = "default"
//!
//! events = ["dataCreated", "dataUpdated"]
//! ```
//!
//! Events can also come from the `GRAVITY_DISPATCHER_EVENTS` environment
//! variable (comma-separated) and the `--events` flag; all three sources
//! merge, deduplicated.

mod error;
mod event_watcher;
mod gravity;
mod logging;
mod processor;
mod product;

use std::fs;
use std::path::Path;
use std::str::FromStr;

use serde::Deserialize;

pub use error::{ConfigError, Result};
pub use event_watcher::EventWatcherConfig;
pub use gravity::GravityConfig;
pub use logging::LogConfig;
pub use processor::ProcessorConfig;
pub use product::ProductConfig;

/// Environment variable carrying a comma-separated event prefilter
pub const EVENTS_ENV: &str = "GRAVITY_DISPATCHER_EVENTS";

/// Main configuration structure
///
/// All sections are optional with sensible defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Bus connection and domain settings
    pub gravity: GravityConfig,

    /// Per-product transform pipeline sizing
    pub processor: ProcessorConfig,

    /// Output stream and flush settings
    pub product: ProductConfig,

    /// Input consumer settings
    pub event_watcher: EventWatcherConfig,

    /// Logging configuration
    pub log: LogConfig,

    /// Events to prefilter for watching
    pub events: Vec<String>,
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be read or contains invalid TOML.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|e| ConfigError::IoError {
            path: path.display().to_string(),
            source: e,
        })?;

        contents.parse()
    }

    /// Merge extra event names into the prefilter, skipping duplicates
    pub fn add_events<I, S>(&mut self, events: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for event in events {
            let event = event.into();
            if !event.is_empty() && !self.events.contains(&event) {
                self.events.push(event);
            }
        }
    }

    /// Merge events from the `GRAVITY_DISPATCHER_EVENTS` environment
    /// variable
    pub fn add_events_from_env(&mut self) {
        if let Ok(raw) = std::env::var(EVENTS_ENV) {
            self.add_events(raw.split(',').map(str::trim).filter(|s| !s.is_empty()));
        }
    }
}

impl FromStr for Config {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self> {
        Ok(toml::from_str(s)?)
    }
}
