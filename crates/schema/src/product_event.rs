//! Product event: the normalized record emitted by the dispatch pipeline

use serde::{Deserialize, Serialize};

use crate::value::Value;

/// The change method a rule maps its event to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    #[default]
    Insert,
    Update,
    Delete,
    Truncate,
    None,
}

impl Method {
    /// Parse a method from its settings string, case-insensitively
    ///
    /// Unknown methods fall back to `Insert`, matching the zero-value
    /// behavior of existing deployments.
    pub fn parse(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "update" => Self::Update,
            "delete" => Self::Delete,
            "truncate" => Self::Truncate,
            "none" => Self::None,
            _ => Self::Insert,
        }
    }

    /// The uppercase wire name of this method
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Insert => "INSERT",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
            Self::Truncate => "TRUNCATE",
            Self::None => "NONE",
        }
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The serialized, typed record published to a product stream
///
/// `content` conforms to the destination schema; `primary_key` is derived
/// deterministically from `content` via the `primary_keys` paths (empty
/// when any key path is absent).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductEvent {
    pub event_name: String,
    pub method: Method,
    pub table: String,
    pub primary_keys: Vec<String>,
    pub primary_key: Vec<u8>,
    pub content: Value,
}

impl ProductEvent {
    /// Serialize into the wire bytes carried on the product stream
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Deserialize from wire bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

#[cfg(test)]
#[path = "product_event_test.rs"]
mod product_event_test;
