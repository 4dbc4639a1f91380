use std::time::{Duration, Instant};

use broker_bridge::broker::{BrokerCall, InMemoryBroker};
use broker_bridge::{StopToken, SubscribeError, Subscriber, SubscriberThread};

use crate::support::{produce, subscriber_config, wait_until, RecordingSink};

#[test]
fn stop_returns_promptly_with_stats() {
    let broker = InMemoryBroker::new().with_topic("orders", 1);
    produce(&broker, "orders", b"1");

    let sink = RecordingSink::new();
    let worker = SubscriberThread::spawn(
        Subscriber::new(broker.clone(), &subscriber_config(["orders"]), sink.clone()).unwrap(),
    );
    assert!(wait_until(Duration::from_secs(5), || sink.events().len() == 1));

    let started = Instant::now();
    let stats = worker.stop().unwrap();
    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(stats.dispatched, 1);
    assert_eq!(stats.committed, 1);
    assert!(matches!(broker.calls().last(), Some(BrokerCall::Close { .. })));
}

#[test]
fn nothing_is_processed_after_stop() {
    let broker = InMemoryBroker::new().with_topic("orders", 1);
    let sink = RecordingSink::new();
    let stop = StopToken::new();
    let worker = SubscriberThread::spawn_with_token(
        Subscriber::new(broker.clone(), &subscriber_config(["orders"]), sink.clone()).unwrap(),
        stop.clone(),
    );

    stop.stop();
    assert!(wait_until(Duration::from_secs(5), || worker.is_finished()));
    produce(&broker, "orders", b"late");

    worker.join().unwrap();
    assert!(sink.attempts().is_empty());
    assert!(broker.commits().is_empty());
}

#[test]
fn startup_failure_surfaces_through_the_handle() {
    let broker = InMemoryBroker::new().with_topic("a", 1);
    let worker = SubscriberThread::spawn(
        Subscriber::new(broker, &subscriber_config(["a", "b"]), RecordingSink::new()).unwrap(),
    );

    let err = worker.join().unwrap_err();
    assert!(matches!(err, SubscribeError::MissingTopics(ref m) if m == &["b"]));
}

#[test]
fn dispatch_failure_ends_the_thread() {
    let broker = InMemoryBroker::new().with_topic("orders", 1);
    produce(&broker, "orders", b"0");

    let worker = SubscriberThread::spawn(
        Subscriber::new(
            broker.clone(),
            &subscriber_config(["orders"]),
            RecordingSink::new().failing_at(0),
        )
        .unwrap(),
    );
    assert!(wait_until(Duration::from_secs(5), || worker.is_finished()));

    assert!(matches!(
        worker.stop(),
        Err(SubscribeError::Dispatch { offset: 0, .. })
    ));
    assert!(broker.commits().is_empty());
}

#[test]
fn dropping_the_handle_signals_stop() {
    let broker = InMemoryBroker::new().with_topic("orders", 1);
    let worker = SubscriberThread::spawn(
        Subscriber::new(broker.clone(), &subscriber_config(["orders"]), RecordingSink::new())
            .unwrap(),
    );
    let token = worker.stop_token().clone();
    drop(worker);

    assert!(token.is_stopped());
    assert!(wait_until(Duration::from_secs(5), || broker
        .calls()
        .iter()
        .any(|c| matches!(c, BrokerCall::Close { .. }))));
}
