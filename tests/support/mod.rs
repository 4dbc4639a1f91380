//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use broker_bridge::broker::{BrokerConnector, InMemoryBroker, OutboundMessage, Producer};
use broker_bridge::config::{BrokerEndpoint, ClientIdentity, OffsetReset, SubscriberConfig};
use broker_bridge::{DeliveryResult, DispatchError, DispatchSink, Event};

pub const HOSTS: &str = "broker:9092";
pub const GROUP: &str = "test-group";

pub fn endpoint() -> BrokerEndpoint {
    BrokerEndpoint::parse(HOSTS).expect("valid hosts")
}

/// Write a record straight to the broker, bypassing the publisher.
pub fn produce(broker: &InMemoryBroker, topic: &str, payload: &[u8]) -> DeliveryResult {
    broker
        .producer(&endpoint(), &ClientIdentity::producer("fixture"), usize::MAX)
        .expect("producer")
        .send(OutboundMessage::new(topic, payload.to_vec()), Duration::from_secs(1))
        .expect("send")
}

/// Subscriber config reading from the beginning with a short poll timeout.
pub fn subscriber_config<I, S>(topics: I) -> SubscriberConfig
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    SubscriberConfig::new(HOSTS, topics)
        .with_group_id(GROUP)
        .with_offset_reset(OffsetReset::Earliest)
        .with_poll_timeout(Duration::from_millis(20))
}

/// Sink that keeps every accepted event and can reject one offset.
#[derive(Clone, Default)]
pub struct RecordingSink {
    events: Arc<Mutex<Vec<Event>>>,
    attempts: Arc<Mutex<Vec<i64>>>,
    fail_at: Option<i64>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject the event with this offset.
    pub fn failing_at(mut self, offset: i64) -> Self {
        self.fail_at = Some(offset);
        self
    }

    /// Accepted events, in dispatch order.
    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    /// Offsets of every dispatch attempt, accepted or not.
    pub fn attempts(&self) -> Vec<i64> {
        self.attempts.lock().unwrap().clone()
    }
}

impl DispatchSink for RecordingSink {
    fn dispatch(&mut self, event: &Event) -> Result<(), DispatchError> {
        self.attempts.lock().unwrap().push(event.offset);
        if self.fail_at == Some(event.offset) {
            return Err(DispatchError::Rejected(format!("offset {}", event.offset)));
        }
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }
}

/// Poll `condition` until it holds or `timeout` passes.
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}
