//! Tests for product-event serialization

use crate::product_event::{Method, ProductEvent};
use crate::value::{Field, Value};

#[test]
fn test_method_parse_case_insensitive() {
    assert_eq!(Method::parse("insert"), Method::Insert);
    assert_eq!(Method::parse("UPDATE"), Method::Update);
    assert_eq!(Method::parse("Delete"), Method::Delete);
    assert_eq!(Method::parse("truncate"), Method::Truncate);
    assert_eq!(Method::parse("none"), Method::None);
}

#[test]
fn test_method_unknown_defaults_to_insert() {
    assert_eq!(Method::parse("upsert"), Method::Insert);
    assert_eq!(Method::parse(""), Method::Insert);
}

#[test]
fn test_method_wire_name_is_uppercase() {
    assert_eq!(Method::Insert.as_str(), "INSERT");
    assert_eq!(Method::Truncate.as_str(), "TRUNCATE");
}

#[test]
fn test_product_event_roundtrip() {
    let event = ProductEvent {
        event_name: "dataCreated".into(),
        method: Method::Insert,
        table: "TestDataProduct".into(),
        primary_keys: vec!["id".into()],
        primary_key: b"101".to_vec(),
        content: Value::Map(vec![
            Field::new("id", Value::Int64(101)),
            Field::new("name", Value::String("fred".into())),
        ]),
    };

    let bytes = event.to_bytes().unwrap();
    let decoded = ProductEvent::from_bytes(&bytes).unwrap();
    assert_eq!(decoded, event);
}

#[test]
fn test_product_event_content_fields_survive() {
    let event = ProductEvent {
        event_name: "dataCreated".into(),
        method: Method::Update,
        table: "t".into(),
        primary_keys: vec![],
        primary_key: vec![],
        content: Value::Map(vec![Field::new("n", Value::Uint64(7))]),
    };

    let decoded = ProductEvent::from_bytes(&event.to_bytes().unwrap()).unwrap();
    let Value::Map(fields) = decoded.content else {
        panic!("expected map content");
    };
    assert_eq!(fields[0].name, "n");
    assert_eq!(fields[0].value, Value::Uint64(7));
}
