//! Typed values carried by product events
//!
//! The value model mirrors the destination schema types: every field of a
//! converted payload is one of these variants. Values serialize with serde
//! (externally tagged) so a product event round-trips bytes exactly.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// The type of a schema field definition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Null,
    Int64,
    Uint64,
    Float64,
    Bool,
    String,
    Binary,
    Time,
    Array,
    Map,
}

impl ValueKind {
    /// Parse a kind from its schema-configuration type name
    ///
    /// Accepts both the short names used by product settings ("int",
    /// "uint", "float") and the explicit width names.
    pub fn from_type_name(name: &str) -> Option<Self> {
        match name {
            "null" => Some(Self::Null),
            "int" | "int64" => Some(Self::Int64),
            "uint" | "uint64" => Some(Self::Uint64),
            "float" | "float64" => Some(Self::Float64),
            "bool" | "boolean" => Some(Self::Bool),
            "string" => Some(Self::String),
            "binary" => Some(Self::Binary),
            "time" => Some(Self::Time),
            "array" => Some(Self::Array),
            "map" => Some(Self::Map),
            _ => None,
        }
    }

    /// Get the string name of this kind
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Int64 => "int64",
            Self::Uint64 => "uint64",
            Self::Float64 => "float64",
            Self::Bool => "bool",
            Self::String => "string",
            Self::Binary => "binary",
            Self::Time => "time",
            Self::Array => "array",
            Self::Map => "map",
        }
    }
}

impl std::fmt::Display for ValueKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A typed value inside a product event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Value {
    Null,
    Int64(i64),
    Uint64(u64),
    Float64(f64),
    Bool(bool),
    String(String),
    Binary(Vec<u8>),
    Time(DateTime<Utc>),
    Array(Vec<Value>),
    Map(Vec<Field>),
}

/// A named field of a map value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub value: Value,
}

impl Field {
    /// Create a new field
    pub fn new(name: impl Into<String>, value: Value) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}

impl Value {
    /// The kind of this value
    pub const fn kind(&self) -> ValueKind {
        match self {
            Self::Null => ValueKind::Null,
            Self::Int64(_) => ValueKind::Int64,
            Self::Uint64(_) => ValueKind::Uint64,
            Self::Float64(_) => ValueKind::Float64,
            Self::Bool(_) => ValueKind::Bool,
            Self::String(_) => ValueKind::String,
            Self::Binary(_) => ValueKind::Binary,
            Self::Time(_) => ValueKind::Time,
            Self::Array(_) => ValueKind::Array,
            Self::Map(_) => ValueKind::Map,
        }
    }

    /// Infer a value from an untyped JSON value
    ///
    /// Used when a rule carries no schema: types are taken from what the
    /// JSON parser produced. Integers that fit i64 become INT64; larger
    /// ones become UINT64; everything else maps to its obvious counterpart.
    pub fn infer(json: &serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(*b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Self::Int64(i)
                } else if let Some(u) = n.as_u64() {
                    Self::Uint64(u)
                } else {
                    Self::Float64(n.as_f64().unwrap_or(0.0))
                }
            }
            serde_json::Value::String(s) => Self::String(s.clone()),
            serde_json::Value::Array(items) => {
                Self::Array(items.iter().map(Self::infer).collect())
            }
            serde_json::Value::Object(map) => Self::Map(
                map.iter()
                    .map(|(k, v)| Field::new(k.clone(), Self::infer(v)))
                    .collect(),
            ),
        }
    }

    /// The string form of this value used for primary-key derivation
    ///
    /// Primary-key bytes are the `-`-joined string forms of the key fields,
    /// so this must stay stable across releases.
    pub fn key_string(&self) -> String {
        match self {
            Self::Null => String::new(),
            Self::Int64(i) => i.to_string(),
            Self::Uint64(u) => u.to_string(),
            Self::Float64(f) => f.to_string(),
            Self::Bool(b) => b.to_string(),
            Self::String(s) => s.clone(),
            Self::Binary(b) => b.iter().map(|x| format!("{x:02x}")).collect(),
            Self::Time(t) => t.to_rfc3339_opts(SecondsFormat::AutoSi, true),
            Self::Array(items) => items
                .iter()
                .map(Value::key_string)
                .collect::<Vec<_>>()
                .join(","),
            Self::Map(fields) => fields
                .iter()
                .map(|f| format!("{}={}", f.name, f.value.key_string()))
                .collect::<Vec<_>>()
                .join(","),
        }
    }
}

#[cfg(test)]
#[path = "value_test.rs"]
mod value_test;
