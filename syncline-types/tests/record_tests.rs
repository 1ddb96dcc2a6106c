use serde_json::json;
use syncline_types::Record;

// ── Construction ─────────────────────────────────────────────────

#[test]
fn from_value_accepts_objects() {
    let record = Record::from_value(json!({ "id": "r1" }));
    assert!(record.is_some());
}

#[test]
fn from_value_rejects_non_objects() {
    assert!(Record::from_value(json!("just a string")).is_none());
    assert!(Record::from_value(json!(42)).is_none());
    assert!(Record::from_value(json!(["a", "b"])).is_none());
    assert!(Record::from_value(json!(null)).is_none());
}

#[test]
fn new_record_is_empty() {
    let record = Record::new();
    assert!(record.as_map().is_empty());
    assert_eq!(record.id(), None);
}

// ── Identity and owner access ────────────────────────────────────

#[test]
fn id_reads_string_field() {
    let record = Record::from_value(json!({ "id": "c1", "name": "Acme" })).unwrap();
    assert_eq!(record.id(), Some("c1"));
}

#[test]
fn id_ignores_non_string_values() {
    let record = Record::from_value(json!({ "id": 17 })).unwrap();
    assert_eq!(record.id(), None);
}

#[test]
fn owner_reads_visibility_tag() {
    let record = Record::from_value(json!({ "id": "c1", "owner": "user-1" })).unwrap();
    assert_eq!(record.owner(), Some("user-1"));
}

#[test]
fn owner_missing_is_none() {
    let record = Record::from_value(json!({ "id": "c1" })).unwrap();
    assert_eq!(record.owner(), None);
}

// ── Field access ─────────────────────────────────────────────────

#[test]
fn set_and_get_arbitrary_fields() {
    let mut record = Record::new();
    record.set("id", json!("c1"));
    record.set("score", json!(0.87));

    assert_eq!(record.get("score"), Some(&json!(0.87)));
    assert_eq!(record.id(), Some("c1"));
}

#[test]
fn set_replaces_existing_value() {
    let mut record = Record::from_value(json!({ "name": "Acme" })).unwrap();
    record.set("name", json!("Acme GmbH"));
    assert_eq!(record.get("name"), Some(&json!("Acme GmbH")));
}

// ── Serde ────────────────────────────────────────────────────────

#[test]
fn record_is_transparent_json() {
    let record = Record::from_value(json!({ "id": "c1", "nested": { "a": [1, 2] } })).unwrap();
    let json = serde_json::to_value(&record).unwrap();
    assert_eq!(json, json!({ "id": "c1", "nested": { "a": [1, 2] } }));
}

#[test]
fn record_roundtrip_preserves_unknown_fields() {
    let source = json!({ "id": "c1", "anything": { "deep": true }, "n": 3 });
    let record = Record::from_value(source.clone()).unwrap();
    let text = serde_json::to_string(&record).unwrap();
    let parsed: Record = serde_json::from_str(&text).unwrap();
    assert_eq!(serde_json::to_value(&parsed).unwrap(), source);
}
