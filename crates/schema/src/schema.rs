//! Schema compilation
//!
//! Product settings and rules describe schemas as JSON objects:
//!
//! ```json
//! {
//!     "id":   { "type": "int" },
//!     "tags": { "type": "array", "subtype": "string" },
//!     "attrs": {
//!         "type": "map",
//!         "fields": { "city": { "type": "string" } }
//!     }
//! }
//! ```
//!
//! A [`Schema`] is compiled once from that shape and shared immutably
//! afterwards (rules hold it behind an `Arc`).

use std::collections::HashMap;

use crate::error::SchemaError;
use crate::value::ValueKind;

/// The definition of a single schema field
#[derive(Debug, Clone)]
pub struct Definition {
    /// Destination type of the field
    pub kind: ValueKind,

    /// Element type for ARRAY fields
    pub subtype: Option<ValueKind>,

    /// Nested schema for MAP fields
    pub nested: Option<Schema>,
}

/// An immutable mapping from field name to definition
#[derive(Debug, Clone, Default)]
pub struct Schema {
    fields: HashMap<String, Definition>,
}

impl Schema {
    /// Compile a schema from its JSON configuration
    ///
    /// # Errors
    ///
    /// Returns an error when the configuration is not an object, a field
    /// definition is malformed, or a type name is unrecognized. Compilation
    /// errors surface as configuration errors: the settings update that
    /// carried the schema is skipped.
    pub fn from_config(config: &serde_json::Value) -> Result<Self, SchemaError> {
        let map = config.as_object().ok_or(SchemaError::NotAnObject)?;

        let mut fields = HashMap::with_capacity(map.len());
        for (name, def) in map {
            fields.insert(name.clone(), Self::compile_definition(name, def)?);
        }

        Ok(Self { fields })
    }

    fn compile_definition(
        name: &str,
        def: &serde_json::Value,
    ) -> Result<Definition, SchemaError> {
        let obj = def
            .as_object()
            .ok_or_else(|| SchemaError::invalid_definition(name, "definition must be an object"))?;

        let type_name = obj
            .get("type")
            .and_then(|v| v.as_str())
            .ok_or_else(|| SchemaError::invalid_definition(name, "missing 'type'"))?;

        let kind = ValueKind::from_type_name(type_name)
            .ok_or_else(|| SchemaError::unknown_type(name, type_name))?;

        let subtype = match obj.get("subtype").and_then(|v| v.as_str()) {
            Some(s) => Some(
                ValueKind::from_type_name(s).ok_or_else(|| SchemaError::unknown_type(name, s))?,
            ),
            None => None,
        };

        let nested = match obj.get("fields") {
            Some(nested_config) => Some(Schema::from_config(nested_config)?),
            None => None,
        };

        Ok(Definition {
            kind,
            subtype,
            nested,
        })
    }

    /// Look up the definition of a field
    #[inline]
    pub fn get(&self, name: &str) -> Option<&Definition> {
        self.fields.get(name)
    }

    /// Iterate over all field definitions
    pub fn fields(&self) -> impl Iterator<Item = (&String, &Definition)> {
        self.fields.iter()
    }

    /// Number of fields in this schema
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether this schema has no fields
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

#[cfg(test)]
#[path = "schema_test.rs"]
mod schema_test;
