//! Gravity - Rules
//!
//! Per-product rules: which input events a product consumes, how their
//! payloads transform, and which fields form the primary key.
//!
//! # Overview
//!
//! A product setting carries a map of rule configurations. Each rule is
//! compiled once into a [`Rule`]: its source schema is parsed, its handler
//! resolved (pass-through or script), and a fresh ID assigned. Compiled
//! rules are registered in a [`RuleManager`], indexed by ID and by event
//! name.
//!
//! Rule managers are not mutated concurrently: a settings change compiles a
//! whole new manager and the product swaps the reference, so in-flight
//! messages keep the rules they were matched against.
//!
//! # Script transforms
//!
//! Script execution is an external capability. The [`ScriptRuntime`] /
//! [`ScriptProgram`] traits form the seam; a rule whose handler is a script
//! leases a compiled program from a per-rule pool so concurrent transform
//! workers never contend on one interpreter instance. The script body
//! `return source` is recognized as the pass-through handler and needs no
//! runtime.

mod error;
mod handler;
mod manager;
mod rule;

pub use error::{HandlerError, RuleError};
pub use handler::{Handler, HandlerConfig, HandlerKind, ScriptProgram, ScriptRuntime};
pub use manager::RuleManager;
pub use rule::{Rule, RuleConfig};

/// A JSON object: the payload currency of rule transforms
pub type JsonMap = serde_json::Map<String, serde_json::Value>;
