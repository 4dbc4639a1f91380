use std::time::Duration;

use broker_bridge::broker::{BrokerCall, InMemoryBroker};
use broker_bridge::config::{BridgeConfig, DEFAULT_CONSUMER_CLIENT_ID, DEFAULT_GROUP_ID};
use broker_bridge::{Backoff, Lifecycle, StopToken, SubscribeError, Subscriber};

use crate::support::{produce, subscriber_config, RecordingSink};

fn fast_backoff() -> Backoff {
    Backoff::default().with_initial(Duration::from_millis(1))
}

fn count(broker: &InMemoryBroker, predicate: impl Fn(&BrokerCall) -> bool) -> usize {
    broker.calls().iter().filter(|call| predicate(call)).count()
}

#[test]
fn missing_topics_stop_startup_before_subscribing() {
    let broker = InMemoryBroker::new().with_topic("a", 1);
    produce(&broker, "a", b"{}");
    let sink = RecordingSink::new();
    let mut subscriber =
        Subscriber::new(broker.clone(), &subscriber_config(["a", "b"]), sink.clone()).unwrap();

    let err = subscriber.setup().unwrap_err();
    match &err {
        SubscribeError::MissingTopics(missing) => assert_eq!(missing, &vec!["b".to_string()]),
        other => panic!("expected MissingTopics, got {other:?}"),
    }
    assert!(err.is_startup());
    assert_eq!(subscriber.lifecycle(), Lifecycle::Stopped);
    assert!(!subscriber.state().connected);

    assert_eq!(count(&broker, |c| matches!(c, BrokerCall::Subscribe { .. })), 0);
    assert_eq!(count(&broker, |c| matches!(c, BrokerCall::Poll { .. })), 0);
    assert_eq!(count(&broker, |c| matches!(c, BrokerCall::Close { .. })), 1);
    assert!(sink.attempts().is_empty());
    assert!(!broker.topics().contains("b"), "topic must not be auto-created");
}

#[test]
fn missing_topics_are_sorted_and_complete() {
    let broker = InMemoryBroker::new().with_topic("b", 1);
    let mut subscriber =
        Subscriber::new(broker, &subscriber_config(["z", "b", "a"]), RecordingSink::new()).unwrap();

    let err = subscriber.run(&StopToken::new()).unwrap_err();
    assert!(matches!(err, SubscribeError::MissingTopics(ref m) if m == &["a", "z"]));
    assert_eq!(
        err.to_string(),
        "The following topics do not exist: a, z"
    );
}

#[test]
fn lifecycle_moves_through_setup_and_run() {
    let broker = InMemoryBroker::new().with_topic("orders", 1);
    let mut subscriber =
        Subscriber::new(broker.clone(), &subscriber_config(["orders"]), RecordingSink::new())
            .unwrap();
    assert_eq!(subscriber.lifecycle(), Lifecycle::Configured);

    subscriber.setup().unwrap();
    assert_eq!(subscriber.lifecycle(), Lifecycle::Ready);
    assert!(subscriber.state().connected);

    let stop = StopToken::new();
    stop.stop();
    let stats = subscriber.run(&stop).unwrap();
    assert_eq!(stats.polls, 0);
    assert_eq!(subscriber.lifecycle(), Lifecycle::Stopped);
    assert!(!subscriber.state().connected);

    // Subscribe is issued once with the full topic set
    let subscribes: Vec<_> = broker
        .calls()
        .into_iter()
        .filter(|c| matches!(c, BrokerCall::Subscribe { .. }))
        .collect();
    assert_eq!(
        subscribes,
        vec![BrokerCall::Subscribe {
            group_id: "test-group".into(),
            topics: vec!["orders".into()],
        }]
    );
}

#[test]
fn transient_connection_failures_are_retried() {
    let broker = InMemoryBroker::new().with_topic("orders", 1);
    broker.fail_next_connections(2);
    let mut subscriber =
        Subscriber::new(broker.clone(), &subscriber_config(["orders"]), RecordingSink::new())
            .unwrap()
            .with_backoff(fast_backoff());

    subscriber.setup().unwrap();
    assert_eq!(count(&broker, |c| matches!(c, BrokerCall::OpenConsumer { .. })), 3);
}

#[test]
fn retries_are_bounded() {
    let broker = InMemoryBroker::new().with_topic("orders", 1);
    broker.set_reachable(false);
    let mut subscriber =
        Subscriber::new(broker.clone(), &subscriber_config(["orders"]), RecordingSink::new())
            .unwrap()
            .with_backoff(fast_backoff().with_max_attempts(3));

    let err = subscriber.setup().unwrap_err();
    assert!(matches!(err, SubscribeError::Connection(_)));
    assert_eq!(subscriber.lifecycle(), Lifecycle::Stopped);
    assert_eq!(count(&broker, |c| matches!(c, BrokerCall::OpenConsumer { .. })), 3);
}

#[test]
fn configuration_is_validated_before_connecting() {
    let broker = InMemoryBroker::new();
    let config = BridgeConfig::from_yaml_str("subscriber:\n  topics: [orders]\n").unwrap();

    let err = Subscriber::from_config(broker.clone(), &config, RecordingSink::new())
        .err()
        .expect("hosts are required");
    assert!(matches!(err, SubscribeError::Configuration(_)));

    let config = BridgeConfig::from_yaml_str("subscriber:\n  hosts: a:9092\n  topics: []\n").unwrap();
    let err = Subscriber::from_config(broker.clone(), &config, RecordingSink::new())
        .err()
        .expect("topics are required");
    assert!(matches!(err, SubscribeError::Configuration(_)));

    assert!(broker.calls().is_empty());
}

#[test]
fn yaml_config_drives_identity_and_hosts() {
    let broker = InMemoryBroker::new().with_topic("orders", 1);
    let yaml = "subscriber:\n  hosts: [\"b1:9092\", \"b2:9092\"]\n  topics: [orders]\n";
    let config = BridgeConfig::from_yaml_str(yaml).unwrap();

    let mut subscriber = Subscriber::from_config(broker.clone(), &config, RecordingSink::new()).unwrap();
    assert_eq!(subscriber.state().group_id, DEFAULT_GROUP_ID);
    assert_eq!(subscriber.state().client_id, DEFAULT_CONSUMER_CLIENT_ID);

    subscriber.setup().unwrap();
    assert_eq!(
        broker.calls()[0],
        BrokerCall::OpenConsumer {
            hosts: "b1:9092,b2:9092".into(),
            group_id: DEFAULT_GROUP_ID.into(),
        }
    );
}
