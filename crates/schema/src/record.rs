//! Typed record with path lookup and primary-key derivation

use crate::value::{Field, Value};

/// Separator between key-field string forms in the derived primary key
const KEY_SEPARATOR: &str = "-";

/// A typed record: the content of a product event
///
/// The root is always a map value. Field lookup supports dotted paths into
/// nested maps (`"address.city"`).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Record {
    fields: Vec<Field>,
}

impl Record {
    /// Create a record from converted fields
    pub fn from_fields(fields: Vec<Field>) -> Self {
        Self { fields }
    }

    /// Look up a value by dotted path
    pub fn get(&self, path: &str) -> Option<&Value> {
        let mut fields = &self.fields;
        let mut segments = path.split('.').peekable();

        while let Some(segment) = segments.next() {
            let field = fields.iter().find(|f| f.name == segment)?;

            if segments.peek().is_none() {
                return Some(&field.value);
            }

            match &field.value {
                Value::Map(nested) => fields = nested,
                _ => return None,
            }
        }

        None
    }

    /// Derive the primary-key bytes from the named key fields
    ///
    /// The key is the `-`-joined string forms of the key fields, in the
    /// order given. If any key path is absent (or no key fields are
    /// configured) the key is empty; an empty key is not an error, it just
    /// lands every such record in the same partition.
    pub fn primary_key(&self, keys: &[String]) -> Vec<u8> {
        if keys.is_empty() {
            return Vec::new();
        }

        let mut parts = Vec::with_capacity(keys.len());
        for key in keys {
            match self.get(key) {
                Some(value) => parts.push(value.key_string()),
                None => return Vec::new(),
            }
        }

        parts.join(KEY_SEPARATOR).into_bytes()
    }

    /// The fields of this record
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Consume the record into its root map value
    pub fn into_value(self) -> Value {
        Value::Map(self.fields)
    }
}

impl From<Record> for Value {
    fn from(record: Record) -> Self {
        record.into_value()
    }
}

#[cfg(test)]
#[path = "record_test.rs"]
mod record_test;
