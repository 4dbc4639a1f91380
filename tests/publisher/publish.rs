use std::time::Duration;

use broker_bridge::broker::{BrokerCall, InMemoryBroker, OutboundMessage};
use broker_bridge::{PublishError, Publisher, PublisherOptions};
use serde_json::json;

use crate::support::HOSTS;

fn publisher(broker: &InMemoryBroker) -> Publisher<InMemoryBroker> {
    Publisher::new(broker.clone(), PublisherOptions::new().with_hosts(HOSTS))
}

fn sends(broker: &InMemoryBroker) -> usize {
    broker
        .calls()
        .iter()
        .filter(|call| matches!(call, BrokerCall::Send { .. } | BrokerCall::OpenProducer { .. }))
        .count()
}

#[test]
fn publish_to_existing_topic_returns_delivery_metadata() {
    let broker = InMemoryBroker::new().with_topic("orders", 1);
    let publisher = publisher(&broker);

    for (i, message) in ["first", r#"{"id":1}"#, ""].iter().enumerate() {
        let result = publisher.publish("orders", message, None).unwrap();
        assert_eq!(result.topic, "orders");
        assert_eq!(result.error, 0);
        assert_eq!(result.partition, 0);
        assert_eq!(result.offset, i as i64);
        assert!(result.is_success());
    }

    let stored = broker.records("orders");
    assert_eq!(stored.len(), 3);
    assert_eq!(stored[1].value, br#"{"id":1}"#.to_vec());
    assert_eq!(stored[1].key, None);
}

#[test]
fn delivery_result_serializes_to_action_mapping() {
    let broker = InMemoryBroker::new().with_topic("orders", 1);
    let result = publisher(&broker).publish("orders", "x", None).unwrap();

    assert_eq!(
        serde_json::to_value(&result).unwrap(),
        json!({ "topic": "orders", "partition": 0, "offset": 0, "error": 0 })
    );
}

#[test]
fn offsets_are_non_negative_across_partitions() {
    let broker = InMemoryBroker::new().with_topic("orders", 3);
    let publisher = publisher(&broker);

    for n in 0..9 {
        let result = publisher.publish("orders", &format!("m{n}"), None).unwrap();
        assert!(result.partition >= 0 && result.partition < 3);
        assert!(result.offset >= 0);
    }
    assert_eq!(broker.len("orders"), 9);
}

#[test]
fn missing_topic_fails_without_sending() {
    let broker = InMemoryBroker::new().with_topic("orders", 1);
    let err = publisher(&broker).publish("payments", "x", None).unwrap_err();

    match err {
        PublishError::TopicNotFound(topic) => assert_eq!(topic, "payments"),
        other => panic!("expected TopicNotFound, got {other:?}"),
    }
    assert_eq!(sends(&broker), 0);
    assert!(!broker.topics().contains("payments"), "topic must not be auto-created");
}

#[test]
fn oversized_message_fails_before_the_send_path() {
    let broker = InMemoryBroker::new().with_topic("orders", 1);
    let publisher = Publisher::new(
        broker.clone(),
        PublisherOptions::new()
            .with_hosts(HOSTS)
            .with_max_message_bytes(16),
    );

    let err = publisher.publish("orders", &"x".repeat(17), None).unwrap_err();
    assert!(matches!(err, PublishError::MessageTooLarge { size: 17, max: 16 }));
    assert_eq!(err.status_code(), 413);
    assert_eq!(sends(&broker), 0);
    assert!(broker.is_empty("orders"));

    // Exactly at the limit is fine
    publisher.publish("orders", &"x".repeat(16), None).unwrap();
}

#[test]
fn default_limit_is_ten_mebibytes() {
    let broker = InMemoryBroker::new().with_topic("orders", 1);
    let message = OutboundMessage::new("orders", vec![b'a'; 10 * 1024 * 1024 + 1]);

    let err = publisher(&broker).publish_message(message, None).unwrap_err();
    assert!(matches!(err, PublishError::MessageTooLarge { max: 10_485_760, .. }));
}

#[test]
fn keyed_binary_messages_keep_their_bytes() {
    let broker = InMemoryBroker::new().with_topic("orders", 4);
    let message = OutboundMessage::new("orders", vec![0xde, 0xad]).with_key("customer-7");

    let first = publisher(&broker).publish_message(message.clone(), None).unwrap();
    let second = publisher(&broker).publish_message(message, None).unwrap();

    // Same key, same partition
    assert_eq!(first.partition, second.partition);
    let stored = broker.records("orders");
    assert!(stored
        .iter()
        .all(|r| r.value == vec![0xde, 0xad] && r.key.as_deref() == Some(&b"customer-7"[..])));
}

#[test]
fn unacknowledged_send_times_out() {
    let broker = InMemoryBroker::new().with_topic("orders", 1);
    broker.set_ack_delay(Some(Duration::from_secs(1)));
    let publisher = Publisher::new(
        broker.clone(),
        PublisherOptions::new()
            .with_hosts(HOSTS)
            .with_ack_timeout(Duration::from_millis(10)),
    );

    let err = publisher.publish("orders", "x", None).unwrap_err();
    assert!(matches!(err, PublishError::DeliveryTimeout(_)));
    assert_eq!(err.status_code(), 504);
}

#[test]
fn unreachable_broker_is_reported_as_connection_error() {
    let broker = InMemoryBroker::new().with_topic("orders", 1);
    broker.set_reachable(false);

    let err = publisher(&broker).publish("orders", "x", None).unwrap_err();
    assert!(matches!(err, PublishError::Connection(_)));
    assert_eq!(err.status_code(), 502);
    assert_eq!(sends(&broker), 0);
}
