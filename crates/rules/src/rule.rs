//! A compiled rule

use std::sync::Arc;

use gravity_schema::{Method, Schema};
use serde::Deserialize;

use crate::JsonMap;
use crate::error::{HandlerError, RuleError};
use crate::handler::{Handler, HandlerConfig, ScriptRuntime};

/// The declarative rule shape carried inside a product setting
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RuleConfig {
    #[serde(default)]
    pub description: String,

    /// Input event name this rule matches
    pub event: String,

    /// Output table name
    #[serde(alias = "dataProduct")]
    pub product: String,

    /// Change method, case-insensitive; defaults to insert
    #[serde(default)]
    pub method: String,

    /// Ordered field paths forming the primary key
    #[serde(rename = "primaryKey", default)]
    pub primary_key: Vec<String>,

    /// Source schema configuration
    #[serde(rename = "schema", default)]
    pub schema: Option<serde_json::Value>,

    /// Handler configuration; absent means pass-through
    #[serde(rename = "handler", default)]
    pub handler: Option<HandlerConfig>,
}

/// A rule compiled out of its configuration
///
/// Rules are immutable after compilation and shared behind `Arc`: the
/// processor binds a rule to a message once and the message keeps it even
/// if the product's rule set is replaced mid-flight.
pub struct Rule {
    pub id: String,
    pub event: String,
    pub product: String,
    pub method: Method,
    pub primary_key: Vec<String>,

    /// Schema the transform output conforms to
    source_schema: Option<Arc<Schema>>,

    /// Product-level schema, kept for rules that carry no schema of their
    /// own
    target_schema: Option<Arc<Schema>>,

    handler: Handler,
}

impl Rule {
    /// Compile a rule
    ///
    /// Parses the source schema, resolves the handler (defaulting to
    /// pass-through), and assigns a fresh unique ID.
    pub fn compile(
        config: &RuleConfig,
        target_schema: Option<Arc<Schema>>,
        runtime: Option<Arc<dyn ScriptRuntime>>,
    ) -> Result<Self, RuleError> {
        let source_schema = match &config.schema {
            Some(schema_config) => Some(Arc::new(Schema::from_config(schema_config)?)),
            None => None,
        };

        let handler = Handler::compile(config.handler.as_ref(), runtime)?;

        Ok(Self {
            id: uuid::Uuid::new_v4().to_string(),
            event: config.event.clone(),
            product: config.product.clone(),
            method: Method::parse(&config.method),
            primary_key: config.primary_key.clone(),
            source_schema,
            target_schema,
            handler,
        })
    }

    /// Transform a payload through this rule's handler
    ///
    /// An empty result suppresses the message. Multiple results fan out;
    /// the dispatcher currently publishes the first.
    pub fn transform(
        &self,
        env: Option<&JsonMap>,
        input: &JsonMap,
    ) -> Result<Vec<JsonMap>, HandlerError> {
        self.handler.run(env, input)
    }

    /// The schema the converted product-event content follows
    ///
    /// The rule's own schema wins; rules without one fall back to the
    /// product schema, and a rule with neither converts by inference.
    pub fn destination_schema(&self) -> Option<&Arc<Schema>> {
        self.source_schema.as_ref().or(self.target_schema.as_ref())
    }

    /// The compiled handler
    pub fn handler(&self) -> &Handler {
        &self.handler
    }
}

impl std::fmt::Debug for Rule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rule")
            .field("id", &self.id)
            .field("event", &self.event)
            .field("product", &self.product)
            .field("method", &self.method)
            .field("primary_key", &self.primary_key)
            .finish()
    }
}

#[cfg(test)]
#[path = "rule_test.rs"]
mod rule_test;
