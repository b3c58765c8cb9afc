use super::*;
use crate::error::QueueError;
use crate::test_utils::{make_message, something, Something};

#[test]
fn test_envelope_survives_encoding() {
    let msg = Message::new(&b"payload"[..])
        .with_id("id-1")
        .with_priority(Priority::Priority3)
        .with_option("k1", "v1")
        .with_option("trace", "abc");

    let decoded = Message::from_bytes(&msg.to_bytes()).unwrap();

    assert_eq!(decoded, msg);
    assert_eq!(decoded.priority(), Priority::Priority3);
    assert_eq!(decoded.options.get("k1").map(String::as_str), Some("v1"));
    assert_eq!(decoded.options.len(), 2);
}

#[test]
fn test_default_priority_is_zero() {
    assert_eq!(Message::new(Bytes::new()).priority(), Priority::Priority0);
}

#[test]
fn test_ensure_id_assigns_once() {
    let mut msg = Message::new(&b"x"[..]);
    let first = msg.ensure_id();
    assert!(!first.is_empty());
    assert_eq!(msg.ensure_id(), first);
}

#[test]
fn test_ensure_id_keeps_caller_id() {
    let mut msg = Message::new(&b"x"[..]).with_id("mine");
    assert_eq!(msg.ensure_id(), "mine");
}

#[test]
fn test_generated_id_carries_publish_time() {
    let before = Utc::now() - chrono::Duration::seconds(1);
    let id = new_message_id();
    let after = Utc::now() + chrono::Duration::seconds(1);

    let ts = timestamp_from_message_id(&id).unwrap();
    assert!(ts >= before && ts <= after, "{ts} not in [{before}, {after}]");
}

#[test]
fn test_generated_ids_are_unique() {
    assert_ne!(new_message_id(), new_message_id());
}

#[test]
fn test_timestamp_rejects_foreign_ids() {
    assert!(matches!(
        timestamp_from_message_id("not-a-uuid"),
        Err(QueueError::InvalidMessageId(_))
    ));
    let v4 = uuid::Uuid::new_v4().to_string();
    assert!(timestamp_from_message_id(&v4).is_err());
    assert!(Message::new(Bytes::new()).with_id(v4).published_at().is_none());
}

#[test]
fn test_delivery_from_wire_fills_meta() {
    let mut msg = make_message(&something()).with_option("k", "v");
    let id = msg.ensure_id();
    let wire = msg.to_bytes();

    let delivery = Delivery::from_wire(wire.clone()).unwrap();

    assert_eq!(delivery.meta.message_id, id);
    assert_eq!(delivery.meta.options.get("k").map(String::as_str), Some("v"));
    assert!(delivery.meta.published_at.is_some());
    assert_eq!(delivery.meta.src, wire);

    let mut got = Something::default();
    delivery.decode_into(&mut got).unwrap();
    assert_eq!(got, something());
}

#[test]
fn test_decode_into_replaces_destination() {
    let delivery = Delivery::from_wire(make_message(&something()).to_bytes()).unwrap();
    let mut got = Something {
        name: "stale".to_string(),
        age: 99,
    };
    delivery.decode_into(&mut got).unwrap();
    assert_eq!(got, something());
}

#[test]
fn test_from_wire_rejects_garbage() {
    let result = Delivery::from_wire(Bytes::from_static(&[0xff, 0xff, 0xff]));
    assert!(matches!(result, Err(QueueError::Decode(_))));
}

#[test]
fn test_any_body_helpers() {
    let body = to_body(&something()).unwrap();
    let got: Something = from_body(&body).unwrap();
    assert_eq!(got, something());
}

#[test]
fn test_from_body_checks_type() {
    let any = prost_types::Any {
        type_url: "type.googleapis.com/other.Thing".to_string(),
        value: vec![],
    };
    let body = prost::Message::encode_to_vec(&any);
    assert!(from_body::<Something>(&body).is_err());
}
