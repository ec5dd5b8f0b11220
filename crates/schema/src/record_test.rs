//! Tests for record path lookup and primary-key derivation

use crate::record::Record;
use crate::value::{Field, Value};

fn sample_record() -> Record {
    Record::from_fields(vec![
        Field::new("id", Value::Int64(101)),
        Field::new("name", Value::String("fred".into())),
        Field::new(
            "address",
            Value::Map(vec![Field::new("city", Value::String("Taipei".into()))]),
        ),
    ])
}

#[test]
fn test_get_top_level() {
    let record = sample_record();
    assert_eq!(record.get("id"), Some(&Value::Int64(101)));
    assert_eq!(record.get("name"), Some(&Value::String("fred".into())));
    assert_eq!(record.get("missing"), None);
}

#[test]
fn test_get_dotted_path() {
    let record = sample_record();
    assert_eq!(record.get("address.city"), Some(&Value::String("Taipei".into())));
    assert_eq!(record.get("address.zip"), None);
    assert_eq!(record.get("name.city"), None);
}

#[test]
fn test_primary_key_single_field() {
    let record = sample_record();
    assert_eq!(record.primary_key(&["id".to_string()]), b"101");
}

#[test]
fn test_primary_key_joined_fields() {
    let record = sample_record();
    let key = record.primary_key(&["id".to_string(), "name".to_string()]);
    assert_eq!(key, b"101-fred");
}

#[test]
fn test_primary_key_nested_path() {
    let record = sample_record();
    let key = record.primary_key(&["address.city".to_string()]);
    assert_eq!(key, b"Taipei");
}

#[test]
fn test_primary_key_missing_path_is_empty() {
    let record = sample_record();
    // One absent key field empties the whole key
    let key = record.primary_key(&["id".to_string(), "phone".to_string()]);
    assert!(key.is_empty());
}

#[test]
fn test_primary_key_no_fields_is_empty() {
    let record = sample_record();
    assert!(record.primary_key(&[]).is_empty());
}
