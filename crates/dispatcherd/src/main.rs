//! Gravity dispatcher daemon
//!
//! # Usage
//!
//! ```bash
//! # Run with defaults
//! dispatcherd
//!
//! # Run with a config file and an event prefilter
//! dispatcherd --config configs/config.toml --events dataCreated,dataUpdated
//! ```
//!
//! The daemon consumes raw domain events, matches them against per-product
//! rules, and republishes normalized product events. Products are driven
//! entirely by the `PRODUCT` catalog of the domain's config K/V bucket.
//!
//! This build runs against the embedded in-process bus, which serves local
//! pipelines and development; a production bus client plugs into the same
//! `gravity_bus::Bus` seam.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use gravity_bus::memory::MemoryBus;
use gravity_config::Config;
use gravity_dispatcher::Dispatcher;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Gravity component to dispatch events
#[derive(Parser, Debug)]
#[command(name = "dispatcherd")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "configs/config.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    log_level: Option<String>,

    /// Events to watch, comma-separated; may be repeated
    #[arg(long, value_delimiter = ',')]
    events: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match Config::from_file(&cli.config) {
        Ok(config) => config,
        Err(gravity_config::ConfigError::IoError { .. }) => {
            eprintln!("no configuration file was loaded, using defaults");
            Config::default()
        }
        Err(e) => return Err(e.into()),
    };

    config.add_events(cli.events.clone());
    config.add_events_from_env();

    let level = cli.log_level.as_deref().unwrap_or(&config.log.level);
    init_logging(level)?;

    tracing::info!(
        domain = %config.gravity.domain,
        events = ?config.events,
        "starting gravity dispatcher"
    );

    let bus = Arc::new(MemoryBus::new());
    let dispatcher = Dispatcher::new(
        &config,
        Arc::clone(&bus) as Arc<dyn gravity_bus::Bus>,
        bus as Arc<dyn gravity_bus::Bus>,
        None,
    );

    dispatcher.init().await?;

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down");
    dispatcher.shutdown().await;

    Ok(())
}

/// Initialize the tracing subscriber for logging
fn init_logging(level: &str) -> Result<()> {
    let filter = EnvFilter::try_new(level)
        .or_else(|_| EnvFilter::try_new("info"))
        .map_err(|e| anyhow::anyhow!("invalid log level: {}", e))?;

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(false))
        .with(filter)
        .init();

    Ok(())
}
