//! Composition root
//!
//! Wires the consumer-side bus handle, the separate publisher connection,
//! the product manager and the config-store watcher together. Products
//! come and go purely in reaction to the `PRODUCT` catalog.

use std::sync::Arc;

use gravity_bus::Bus;
use gravity_config::Config;
use gravity_rules::ScriptRuntime;

use crate::config_store::{ConfigHandler, ConfigOp, ConfigStore};
use crate::error::Result;
use crate::product::ProductSetting;
use crate::product_manager::ProductManager;

/// The dispatch stage of the event pipeline
pub struct Dispatcher {
    product_manager: Arc<ProductManager>,
    config_store: ConfigStore,
}

impl Dispatcher {
    /// Assemble a dispatcher
    ///
    /// `bus` carries consumption and stream management; `publisher` is the
    /// dedicated publish connection shared by all products.
    pub fn new(
        config: &Config,
        bus: Arc<dyn Bus>,
        publisher: Arc<dyn Bus>,
        script_runtime: Option<Arc<dyn ScriptRuntime>>,
    ) -> Self {
        let product_manager = Arc::new(ProductManager::new(
            config,
            Arc::clone(&bus),
            publisher,
            script_runtime,
        ));

        let handler: ConfigHandler = {
            let manager = Arc::clone(&product_manager);
            Arc::new(move |op, name, value| {
                let manager = Arc::clone(&manager);
                Box::pin(async move {
                    settings_updated(&manager, op, name, value).await;
                })
            })
        };

        let config_store = ConfigStore::new(bus, config.gravity.domain.clone(), "PRODUCT", handler);

        Self {
            product_manager,
            config_store,
        }
    }

    /// Load existing product settings and start reacting to changes
    pub async fn init(&self) -> Result<()> {
        tracing::info!("initializing config store");
        self.config_store.init().await
    }

    /// The product registry
    pub fn product_manager(&self) -> &Arc<ProductManager> {
        &self.product_manager
    }

    /// Stop the config watcher and deactivate every product
    pub async fn shutdown(&self) {
        self.config_store.close().await;
        self.product_manager.shutdown().await;
    }
}

/// React to one config-store change
async fn settings_updated(manager: &ProductManager, op: ConfigOp, name: String, value: Vec<u8>) {
    tracing::info!(product = %name, op = %op, "syncing data product settings");

    if op == ConfigOp::Delete {
        tracing::info!(product = %name, "delete product");
        if let Err(e) = manager.delete_product(&name).await {
            tracing::error!(product = %name, error = %e, "failed to delete product");
        }
        return;
    }

    let setting = match ProductSetting::from_bytes(&value) {
        Ok(setting) => setting,
        Err(e) => {
            // Keep the existing product configuration
            tracing::error!(
                product = %name,
                op = %op,
                error = %e,
                raw = %String::from_utf8_lossy(&value),
                "failed to sync product setting"
            );
            return;
        }
    };

    if let Err(e) = manager.apply_settings(&name, &setting).await {
        tracing::error!(product = %name, error = %e, "failed to load data product settings");
    }
}
