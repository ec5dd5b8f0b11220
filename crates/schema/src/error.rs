//! Schema and conversion error types

use thiserror::Error;

/// Errors from compiling a schema out of its JSON configuration
#[derive(Debug, Error)]
pub enum SchemaError {
    /// Schema configuration is not a JSON object
    #[error("schema configuration must be an object")]
    NotAnObject,

    /// Field definition is malformed
    #[error("invalid definition for field '{field}': {message}")]
    InvalidDefinition { field: String, message: String },

    /// Unrecognized type name in a field definition
    #[error("field '{field}' has unknown type '{type_name}'")]
    UnknownType { field: String, type_name: String },
}

impl SchemaError {
    /// Create an InvalidDefinition error
    pub fn invalid_definition(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidDefinition {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create an UnknownType error
    pub fn unknown_type(field: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self::UnknownType {
            field: field.into(),
            type_name: type_name.into(),
        }
    }
}

/// Errors from converting a single payload value
///
/// Conversion errors are never fatal for a payload: the converter logs the
/// failed field and continues with the rest.
#[derive(Debug, Error)]
pub enum ConvertError {
    /// Input value does not match the schema type
    #[error("expected {expected}, got {found}")]
    Mismatch {
        expected: &'static str,
        found: &'static str,
    },

    /// BINARY field carried invalid base64
    #[error("invalid base64 in binary field: {0}")]
    Base64(#[from] base64::DecodeError),

    /// TIME field carried an unparseable timestamp
    #[error("invalid timestamp: {0}")]
    Time(String),
}

impl ConvertError {
    /// Create a Mismatch error
    pub fn mismatch(expected: &'static str, found: &'static str) -> Self {
        Self::Mismatch { expected, found }
    }
}
