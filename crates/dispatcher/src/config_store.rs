//! Reactive configuration store
//!
//! Watches one catalog of the domain's config K/V bucket. Existing keys
//! replay as Create events on init, then the watch loop streams puts and
//! deletes until the store is closed.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use gravity_bus::{Bus, KvOperation};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::Result;

/// The kind of configuration change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigOp {
    Create,
    Update,
    Delete,
}

impl std::fmt::Display for ConfigOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        };
        write!(f, "{s}")
    }
}

/// Receives `(op, key, value)` for every configuration change
pub type ConfigHandler =
    Arc<dyn Fn(ConfigOp, String, Vec<u8>) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// Watcher over one config catalog
pub struct ConfigStore {
    bus: Arc<dyn Bus>,
    domain: String,
    catalog: String,
    handler: ConfigHandler,
    cancel: CancellationToken,
    task: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

impl ConfigStore {
    /// Create a store watcher for `GRAVITY_<domain>_<catalog>`
    pub fn new(
        bus: Arc<dyn Bus>,
        domain: impl Into<String>,
        catalog: impl Into<String>,
        handler: ConfigHandler,
    ) -> Self {
        Self {
            bus,
            domain: domain.into(),
            catalog: catalog.into(),
            handler,
            cancel: CancellationToken::new(),
            task: tokio::sync::Mutex::new(None),
        }
    }

    /// The bucket this store watches
    pub fn bucket(&self) -> String {
        format!("GRAVITY_{}_{}", self.domain, self.catalog)
    }

    /// Replay existing keys, then start the watch loop
    pub async fn init(&self) -> Result<()> {
        let bucket = self.bucket();
        let kv = self.bus.key_value(&bucket, "Gravity config store").await?;

        for key in kv.keys().await? {
            if let Some(value) = kv.get(&key).await? {
                (self.handler)(ConfigOp::Create, key, value).await;
            }
        }

        let mut updates = kv.watch().await?;
        let handler = Arc::clone(&self.handler);
        let cancel = self.cancel.clone();

        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    entry = updates.recv() => {
                        let Some(entry) = entry else { break };
                        let op = match entry.operation {
                            KvOperation::Put => ConfigOp::Update,
                            KvOperation::Delete | KvOperation::Purge => ConfigOp::Delete,
                        };
                        handler(op, entry.key, entry.value).await;
                    }
                }
            }
        });

        *self.task.lock().await = Some(task);
        Ok(())
    }

    /// Stop the watch loop
    pub async fn close(&self) {
        self.cancel.cancel();
        if let Some(task) = self.task.lock().await.take() {
            let _ = task.await;
        }
    }
}
