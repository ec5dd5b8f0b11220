//! Schema-driven payload conversion
//!
//! Maps a semi-typed JSON object onto a typed field list. Individual field
//! failures are logged and skipped; the payload as a whole always converts.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, TimeZone, Utc};

use crate::error::ConvertError;
use crate::schema::{Definition, Schema};
use crate::value::{Field, Value, ValueKind};

/// Deletion-hint field preserved at the payload root
const REMOVED_FIELDS: &str = "$removedFields";

/// Convert a JSON payload into typed fields according to a schema
///
/// Rules:
/// - With no schema, types are inferred from the JSON runtime types.
/// - A root field named `$removedFields` holding a list of strings is
///   preserved as ARRAY(STRING) even though no schema mentions it. The
///   name is only special at the root; nested maps treat it as an
///   ordinary field of their own schema.
/// - Payload fields the schema does not know are logged and skipped.
/// - A field that fails conversion is logged and skipped.
pub fn convert(schema: Option<&Schema>, data: &serde_json::Map<String, serde_json::Value>) -> Vec<Field> {
    let Some(schema) = schema else {
        return infer_fields(data);
    };

    let mut fields = Vec::with_capacity(schema.len());

    for (name, value) in data {
        if name == REMOVED_FIELDS {
            if let Some(removed) = convert_removed_fields(value) {
                fields.push(Field::new(name.clone(), removed));
            }
            continue;
        }

        if let Some(field) = convert_known_field(schema, name, value) {
            fields.push(field);
        }
    }

    fields
}

/// Convert one nesting level without the root-only special cases
fn convert_fields(
    schema: Option<&Schema>,
    data: &serde_json::Map<String, serde_json::Value>,
) -> Vec<Field> {
    let Some(schema) = schema else {
        return infer_fields(data);
    };

    data.iter()
        .filter_map(|(name, value)| convert_known_field(schema, name, value))
        .collect()
}

fn infer_fields(data: &serde_json::Map<String, serde_json::Value>) -> Vec<Field> {
    data.iter()
        .map(|(name, value)| Field::new(name.clone(), Value::infer(value)))
        .collect()
}

fn convert_known_field(
    schema: &Schema,
    name: &str,
    value: &serde_json::Value,
) -> Option<Field> {
    let Some(def) = schema.get(name) else {
        tracing::debug!(field = %name, "payload field not in schema, skipping");
        return None;
    };

    match convert_value(def, value) {
        Ok(v) => Some(Field::new(name.to_string(), v)),
        Err(e) => {
            tracing::warn!(
                field = %name,
                kind = %def.kind,
                error = %e,
                "field conversion failed, skipping"
            );
            None
        }
    }
}

/// Carry the root `$removedFields` list downstream as ARRAY(STRING)
fn convert_removed_fields(value: &serde_json::Value) -> Option<Value> {
    let items = value.as_array()?;
    let mut names = Vec::with_capacity(items.len());
    for item in items {
        names.push(Value::String(item.as_str()?.to_string()));
    }
    Some(Value::Array(names))
}

fn convert_value(def: &Definition, value: &serde_json::Value) -> Result<Value, ConvertError> {
    match def.kind {
        ValueKind::Array => {
            let items = value
                .as_array()
                .ok_or_else(|| ConvertError::mismatch("array", json_type(value)))?;

            let subtype = def.subtype.unwrap_or(ValueKind::String);
            let mut elements = Vec::with_capacity(items.len());
            for item in items {
                match convert_scalar(subtype, item) {
                    Ok(v) => elements.push(v),
                    Err(e) => {
                        // Element failures drop the element, not the array
                        tracing::warn!(error = %e, "array element conversion failed, skipping");
                    }
                }
            }

            Ok(Value::Array(elements))
        }
        ValueKind::Map => {
            let map = value
                .as_object()
                .ok_or_else(|| ConvertError::mismatch("map", json_type(value)))?;

            Ok(Value::Map(convert_fields(def.nested.as_ref(), map)))
        }
        kind => convert_scalar(kind, value),
    }
}

fn convert_scalar(kind: ValueKind, value: &serde_json::Value) -> Result<Value, ConvertError> {
    match kind {
        ValueKind::Null => Ok(Value::Null),
        ValueKind::Int64 => value
            .as_i64()
            .map(Value::Int64)
            .ok_or_else(|| ConvertError::mismatch("int64", json_type(value))),
        ValueKind::Uint64 => value
            .as_u64()
            .map(Value::Uint64)
            .ok_or_else(|| ConvertError::mismatch("uint64", json_type(value))),
        ValueKind::Float64 => value
            .as_f64()
            .map(Value::Float64)
            .ok_or_else(|| ConvertError::mismatch("float64", json_type(value))),
        ValueKind::Bool => value
            .as_bool()
            .map(Value::Bool)
            .ok_or_else(|| ConvertError::mismatch("bool", json_type(value))),
        ValueKind::String => value
            .as_str()
            .map(|s| Value::String(s.to_string()))
            .ok_or_else(|| ConvertError::mismatch("string", json_type(value))),
        ValueKind::Binary => convert_binary(value),
        ValueKind::Time => convert_time(value),
        // Array/Map are handled before dispatching here
        ValueKind::Array | ValueKind::Map => {
            Err(ConvertError::mismatch("scalar", json_type(value)))
        }
    }
}

/// BINARY fields arrive base64-encoded when the payload came through JSON
fn convert_binary(value: &serde_json::Value) -> Result<Value, ConvertError> {
    match value {
        serde_json::Value::String(s) => Ok(Value::Binary(BASE64.decode(s)?)),
        serde_json::Value::Array(items) => {
            // Raw byte sequence: pass through
            let mut bytes = Vec::with_capacity(items.len());
            for item in items {
                let b = item
                    .as_u64()
                    .filter(|b| *b <= u8::MAX as u64)
                    .ok_or_else(|| ConvertError::mismatch("byte", json_type(item)))?;
                bytes.push(b as u8);
            }
            Ok(Value::Binary(bytes))
        }
        other => Err(ConvertError::mismatch("binary", json_type(other))),
    }
}

fn convert_time(value: &serde_json::Value) -> Result<Value, ConvertError> {
    match value {
        serde_json::Value::String(s) => DateTime::parse_from_rfc3339(s)
            .map(|t| Value::Time(t.with_timezone(&Utc)))
            .map_err(|e| ConvertError::Time(e.to_string())),
        serde_json::Value::Number(n) => {
            let secs = n
                .as_i64()
                .ok_or_else(|| ConvertError::Time("timestamp out of range".into()))?;
            match Utc.timestamp_opt(secs, 0) {
                chrono::LocalResult::Single(t) => Ok(Value::Time(t)),
                _ => Err(ConvertError::Time(format!("invalid unix timestamp {secs}"))),
            }
        }
        other => Err(ConvertError::mismatch("time", json_type(other))),
    }
}

const fn json_type(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

#[cfg(test)]
#[path = "convert_test.rs"]
mod convert_test;
