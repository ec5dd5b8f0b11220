//! Gravity - Schema
//!
//! Typed value model and schema-driven conversion for product events.
//!
//! # Overview
//!
//! Incoming event payloads are semi-typed JSON objects. Product rules carry
//! a declarative schema describing the destination shape, and this crate
//! turns one into the other:
//!
//! ```text
//! JSON payload ──→ [convert against Schema] ──→ Vec<Field> (typed)
//!                                                    │
//!                                         Record / ProductEvent
//! ```
//!
//! # Key Design
//!
//! - **Immutable schemas**: a [`Schema`] is compiled once from its JSON
//!   configuration and never mutated afterwards.
//! - **Lossy-tolerant conversion**: a field that fails to convert is logged
//!   and skipped; conversion of a payload never fails as a whole.
//! - **Deterministic keys**: [`Record::primary_key`] derives the same bytes
//!   for the same content, which downstream partitioning depends on.
//!
//! # Example
//!
//! ```
//! use gravity_schema::{Schema, convert, Record};
//!
//! let schema = Schema::from_config(&serde_json::json!({
//!     "id": { "type": "int" },
//!     "name": { "type": "string" },
//! })).unwrap();
//!
//! let payload = serde_json::json!({ "id": 101, "name": "fred" });
//! let fields = convert(Some(&schema), payload.as_object().unwrap());
//! let record = Record::from_fields(fields);
//!
//! assert_eq!(record.primary_key(&["id".to_string()]), b"101");
//! ```

mod convert;
mod error;
mod product_event;
mod record;
mod schema;
mod value;

pub use convert::convert;
pub use error::{ConvertError, SchemaError};
pub use product_event::{Method, ProductEvent};
pub use record::Record;
pub use schema::{Definition, Schema};
pub use value::{Field, Value, ValueKind};
