use super::consumer::{message_from_record, StateCell};
use super::*;
use crate::error::QueueError;
use crate::message::{Message, OPTION_KAFKA_OFFSET, OPTION_KAFKA_PARTITION};
use crate::queue::{Consumer, Publisher};

fn opts(dsn: &str) -> ConnectionOptions {
    ConnectionOptions::parse(dsn, TransportProfile::Log).unwrap()
}

#[test]
fn test_base_config_joins_hosts() {
    let config = build_base_config(&opts("log://host1:9092,host2:9092?broker_version=2.1.0"));
    assert_eq!(config.get("bootstrap.servers"), Some("host1:9092,host2:9092"));
    assert_eq!(config.get("broker.version.fallback"), Some("2.1.0"));
    assert_eq!(config.get("api.version.request"), Some("true"));
    assert_eq!(config.get("sasl.username"), None);
}

#[test]
fn test_base_config_old_broker_skips_version_request() {
    let config = build_base_config(&opts("kafka://k:9092?broker_version=0.9.0.1"));
    assert_eq!(config.get("broker.version.fallback"), Some("0.9.0.1"));
    assert_eq!(config.get("api.version.request"), Some("false"));
}

#[test]
fn test_base_config_with_credentials() {
    let config = build_base_config(&opts("kafka://user:secret@k:9092"));
    assert_eq!(config.get("security.protocol"), Some("SASL_PLAINTEXT"));
    assert_eq!(config.get("sasl.username"), Some("user"));
    assert_eq!(config.get("sasl.password"), Some("secret"));
}

#[test]
fn test_producer_config() {
    let config = build_producer_config(&opts("kafka://k:9092?writeTimeout=1500"));
    assert_eq!(config.get("acks"), Some("all"));
    assert_eq!(config.get("message.timeout.ms"), Some("1500"));

    let config = build_producer_config(&opts("kafka://k:9092"));
    assert_eq!(config.get("message.timeout.ms"), Some("5000"));
}

#[test]
fn test_consumer_config() {
    let config = build_consumer_config(&opts("kafka://k:9092"), "g1");
    assert_eq!(config.get("group.id"), Some("g1"));
    assert_eq!(config.get("enable.auto.commit"), Some("false"));
    assert_eq!(config.get("auto.offset.reset"), Some("earliest"));
}

#[test]
fn test_headers_need_0_11() {
    assert!(supports_headers(&opts("kafka://k:9092")));
    assert!(supports_headers(&opts("kafka://k:9092?broker_version=0.11.0.0")));
    assert!(!supports_headers(&opts("kafka://k:9092?broker_version=0.10.2.1")));
}

#[test]
fn test_state_only_moves_forward() {
    let state = StateCell::default();
    assert_eq!(state.get(), SubscriberState::Connecting);

    assert!(state.advance(SubscriberState::JoinedGroup));
    assert_eq!(state.get(), SubscriberState::JoinedGroup);

    assert!(state.advance(SubscriberState::Consuming));
    assert!(!state.advance(SubscriberState::JoinedGroup));
    assert_eq!(state.get(), SubscriberState::Consuming);
}

#[test]
fn test_record_with_envelope() {
    let sent = Message::new("hello").with_id("id-1").with_option("trace", "abc");

    let msg = message_from_record(&sent.to_bytes(), Some(&b"id-1"[..]), Vec::new(), 3, 42);

    assert_eq!(msg.message_id, "id-1");
    assert_eq!(msg.body, bytes::Bytes::from("hello"));
    assert_eq!(msg.options["trace"], "abc");
    assert_eq!(msg.options[OPTION_KAFKA_OFFSET], "42");
    assert_eq!(msg.options[OPTION_KAFKA_PARTITION], "3");
}

#[test]
fn test_foreign_record_falls_back_to_key_value_headers() {
    let headers = vec![("source".to_string(), "legacy".to_string())];

    let msg = message_from_record(b"plain text", Some(&b"order-7"[..]), headers, 0, 5);

    assert_eq!(msg.message_id, "order-7");
    assert_eq!(msg.body, bytes::Bytes::from("plain text"));
    assert_eq!(msg.options["source"], "legacy");
    assert_eq!(msg.options[OPTION_KAFKA_OFFSET], "5");
}

#[test]
fn test_envelope_with_mismatched_key_is_foreign() {
    let sent = Message::new("x").with_id("id-1");
    let payload = sent.to_bytes();

    let msg = message_from_record(&payload, Some(&b"other"[..]), Vec::new(), 0, 0);

    assert_eq!(msg.message_id, "other");
    assert_eq!(msg.body, payload);
}

#[tokio::test]
async fn test_open_rejects_unknown_option() {
    let err = KafkaDriver
        .open_publisher("kafka://k:9092?maxIdel=1")
        .await
        .err()
        .unwrap();
    assert!(err.is_configuration());
}

#[tokio::test]
async fn test_unicast_not_supported() {
    let producer = KafkaProducer::new(&opts("kafka://localhost:9092")).unwrap();
    let err = producer.enqueue("jobs", Message::new("x")).await.unwrap_err();
    assert!(err.is_not_supported());

    let consumer = KafkaConsumer::new(opts("kafka://localhost:9092")).unwrap();
    let err = consumer
        .dequeue_raw("jobs", "g1", Duration::from_secs(1))
        .await
        .unwrap_err();
    assert!(matches!(err, QueueError::NotSupported { transport: "kafka", operation: "dequeue" }));
}
