//! Process-wide product registry

use std::collections::HashMap;
use std::sync::Arc;

use gravity_bus::Bus;
use gravity_config::Config;
use gravity_rules::ScriptRuntime;
use parking_lot::RwLock;

use crate::error::Result;
use crate::message::MessagePool;
use crate::product::{Product, ProductContext, ProductSetting, ensure_product_stream};
use crate::product_stream;

/// Idle message envelopes shared by every product
const MESSAGE_POOL_CAPACITY: usize = 8192;

/// Owns every product of the process and drives their lifecycle from
/// configuration updates
pub struct ProductManager {
    domain: String,
    bus: Arc<dyn Bus>,
    publisher: Arc<dyn Bus>,
    pool: Arc<MessagePool>,
    script_runtime: Option<Arc<dyn ScriptRuntime>>,
    config: Config,
    products: RwLock<HashMap<String, Arc<Product>>>,
}

impl ProductManager {
    /// Create an empty manager
    ///
    /// `bus` is the consumer-side connection; `publisher` is the separate
    /// connection products publish through.
    pub fn new(
        config: &Config,
        bus: Arc<dyn Bus>,
        publisher: Arc<dyn Bus>,
        script_runtime: Option<Arc<dyn ScriptRuntime>>,
    ) -> Self {
        Self {
            domain: config.gravity.domain.clone(),
            bus,
            publisher,
            pool: Arc::new(MessagePool::new(MESSAGE_POOL_CAPACITY)),
            script_runtime,
            config: config.clone(),
            products: RwLock::new(HashMap::new()),
        }
    }

    /// Register a fresh product, asserting its output stream first
    pub async fn create_product(
        &self,
        name: &str,
        stream_override: &str,
    ) -> Result<Arc<Product>> {
        ensure_product_stream(
            &self.publisher,
            &self.domain,
            name,
            stream_override,
            &self.config.product,
        )
        .await?;

        let product = Arc::new(Product::new(ProductContext {
            domain: self.domain.clone(),
            name: name.to_string(),
            bus: Arc::clone(&self.bus),
            publisher: Arc::clone(&self.publisher),
            pool: Arc::clone(&self.pool),
            script_runtime: self.script_runtime.clone(),
            processor_config: self.config.processor,
            product_config: self.config.product,
            watcher_config: self.config.event_watcher,
        }));

        self.products
            .write()
            .insert(name.to_string(), Arc::clone(&product));

        Ok(product)
    }

    /// Stop a product and best-effort delete its output stream
    pub async fn delete_product(&self, name: &str) -> Result<()> {
        let Some(product) = self.products.write().remove(name) else {
            return Ok(());
        };

        product.deactivate().await?;

        let stream = product_stream(&self.domain, name);
        if let Err(e) = self.bus.delete_stream(&stream).await {
            // A missing stream is not worth failing the delete over
            tracing::warn!(stream = %stream, error = %e, "failed to delete product stream");
        }

        Ok(())
    }

    /// Look up a product by name
    pub fn get_product(&self, name: &str) -> Option<Arc<Product>> {
        self.products.read().get(name).cloned()
    }

    /// Number of registered products
    pub fn len(&self) -> usize {
        self.products.read().len()
    }

    /// Whether no products are registered
    pub fn is_empty(&self) -> bool {
        self.products.read().is_empty()
    }

    /// Create or update a product from a settings snapshot
    pub async fn apply_settings(&self, name: &str, setting: &ProductSetting) -> Result<()> {
        match self.get_product(name) {
            Some(product) => {
                tracing::info!(product = %name, "update product");
                product.apply_settings(setting).await
            }
            None => {
                tracing::info!(product = %name, "create product");
                let product = self.create_product(name, &setting.stream).await?;
                product.apply_settings(setting).await
            }
        }
    }

    /// Deactivate every product (process shutdown)
    pub async fn shutdown(&self) {
        let products: Vec<_> = self.products.read().values().cloned().collect();
        for product in products {
            if let Err(e) = product.deactivate().await {
                tracing::error!(product = %product.name(), error = %e, "failed to deactivate");
            }
        }
    }
}
