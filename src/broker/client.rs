//! Broker client traits.
//!
//! The wire protocol, partition assignment and group coordination all live
//! behind these traits; the publisher and subscriber only ever talk to them.

use std::collections::BTreeSet;
use std::error::Error;
use std::time::Duration;

use thiserror::Error;

use super::record::{DeliveryResult, InboundRecord, OutboundMessage};
use crate::config::{BrokerEndpoint, ClientIdentity, OffsetReset};

/// Error reported by a broker client.
#[derive(Debug, Error)]
pub enum BrokerError {
    /// No broker in the endpoint could be reached.
    #[error("broker unreachable: {0}")]
    Unreachable(String),
    /// The broker did not answer within the allotted time.
    #[error("broker did not respond within {0:?}")]
    Timeout(Duration),
    /// The payload exceeds the configured maximum.
    #[error("message of {size} bytes exceeds the {max} byte limit")]
    MessageTooLarge { size: usize, max: usize },
    /// The broker refused the request.
    #[error("broker rejected request: {0}")]
    Rejected(String),
    /// The client was already closed.
    #[error("broker client is closed")]
    Closed,
    #[error("broker client error: {0}")]
    Other(#[source] Box<dyn Error + Send + Sync>),
}

impl BrokerError {
    /// Whether retrying the same request later could succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, BrokerError::Unreachable(_) | BrokerError::Timeout(_))
    }
}

/// Opens connections against a resolved endpoint.
///
/// Implementations:
/// - `InMemoryBroker` - in-process broker for tests and single-process use
/// - `KafkaConnector` - Apache Kafka via librdkafka (feature `kafka`)
pub trait BrokerConnector: Send + Sync {
    type Producer: Producer;
    type Consumer: Consumer;

    /// Fetch the names of all topics known to the cluster over a short-lived
    /// metadata connection. Must not trigger topic auto-creation.
    fn list_topics(
        &self,
        endpoint: &BrokerEndpoint,
        identity: &ClientIdentity,
        timeout: Duration,
    ) -> Result<BTreeSet<String>, BrokerError>;

    /// Open a producer that rejects payloads above `max_message_bytes`.
    fn producer(
        &self,
        endpoint: &BrokerEndpoint,
        identity: &ClientIdentity,
        max_message_bytes: usize,
    ) -> Result<Self::Producer, BrokerError>;

    /// Open a consumer connection for `identity.group_id` with auto-commit
    /// disabled. The consumer is not subscribed to anything yet.
    fn consumer(
        &self,
        endpoint: &BrokerEndpoint,
        identity: &ClientIdentity,
        offset_reset: OffsetReset,
    ) -> Result<Self::Consumer, BrokerError>;
}

/// Sends messages and waits for acknowledgment.
pub trait Producer {
    /// Send one message, blocking until the broker acknowledges it or the
    /// timeout elapses.
    fn send(&self, message: OutboundMessage, timeout: Duration)
        -> Result<DeliveryResult, BrokerError>;
}

/// A group consumer with explicit offset commits.
pub trait Consumer: Send {
    /// Fetch cluster topic names over this consumer's connection.
    fn list_topics(&self, timeout: Duration) -> Result<BTreeSet<String>, BrokerError>;

    /// Subscribe to the full topic set. Called once per consumer.
    fn subscribe(&mut self, topics: &BTreeSet<String>) -> Result<(), BrokerError>;

    /// Pull the next record, waiting at most `timeout`.
    fn poll(&mut self, timeout: Duration) -> Result<Option<InboundRecord>, BrokerError>;

    /// Commit the record's offset for the group (the next read resumes after it).
    fn commit(&mut self, record: &InboundRecord) -> Result<(), BrokerError>;

    /// Close the connection. Closing twice is a no-op.
    fn close(&mut self) -> Result<(), BrokerError>;
}
