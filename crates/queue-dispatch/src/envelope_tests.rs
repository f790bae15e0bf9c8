//! Tests for message envelopes.

use super::*;
use serde_json::json;

fn raw(body: &str) -> RawMessage {
    RawMessage {
        message_id: "5fea7756-0ea4-451a-a703-a558b933e274".to_string(),
        receipt_handle: "MbZj6wDWli+JvwwJaBV+3dcjk2YW2vA3+STFFljT".to_string(),
        body: body.to_string(),
        attributes: HashMap::new(),
    }
}

#[test]
fn test_from_raw_copies_fields_and_decodes_body() {
    let payload = r#"{"orderId":42,"items":["a","b"]}"#;
    let envelope = MessageEnvelope::from_raw(raw(payload));

    assert_eq!(envelope.id, "5fea7756-0ea4-451a-a703-a558b933e274");
    assert_eq!(
        envelope.acknowledgment_token,
        "MbZj6wDWli+JvwwJaBV+3dcjk2YW2vA3+STFFljT"
    );
    assert_eq!(
        envelope.body,
        serde_json::from_str::<Value>(payload).unwrap()
    );
    assert!(!envelope.ready_for_acknowledgment);
    assert!(envelope.metadata.is_empty());
}

#[test]
fn test_non_json_body_is_kept_as_string() {
    let envelope = MessageEnvelope::from_raw(raw("plain text payload"));
    assert_eq!(envelope.body, json!("plain text payload"));
}

#[test]
fn test_mark_ready_and_metadata() {
    let mut envelope = MessageEnvelope::new("id-1", "token-1", json!({"a": 1}))
        .with_metadata("attempt", json!(1));

    envelope.mark_ready();
    envelope.insert_metadata("handler", json!("orders"));

    assert!(envelope.ready_for_acknowledgment);
    assert_eq!(envelope.metadata.get("attempt"), Some(&json!(1)));
    assert_eq!(envelope.metadata.get("handler"), Some(&json!("orders")));
}

#[test]
fn test_body_as_typed_value() {
    #[derive(Debug, serde::Deserialize, PartialEq)]
    struct Order {
        #[serde(rename = "orderId")]
        order_id: u64,
    }

    let envelope = MessageEnvelope::from_raw(raw(r#"{"orderId":42}"#));
    let order: Order = envelope.body_as().unwrap();

    assert_eq!(order, Order { order_id: 42 });
}
