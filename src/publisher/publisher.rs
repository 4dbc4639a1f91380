//! Publisher - one message, one topic, one acknowledged send per call.

use std::time::Duration;

use tracing::{debug, info, warn};

use super::error::PublishError;
use crate::broker::{BrokerConnector, DeliveryResult, OutboundMessage, Producer};
use crate::config::{
    resolve_hosts, resolve_or_default, BridgeConfig, BrokerEndpoint, ClientIdentity, Hosts,
    DEFAULT_PRODUCER_CLIENT_ID,
};

/// Static publisher settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublisherOptions {
    /// Fallback hosts when a call passes none.
    pub hosts: Option<Hosts>,
    pub client_id: Option<String>,
    /// Bound on waiting for the broker's acknowledgment.
    pub ack_timeout: Duration,
    /// Bound on the topic-existence probe.
    pub metadata_timeout: Duration,
    pub max_message_bytes: usize,
}

impl Default for PublisherOptions {
    fn default() -> Self {
        Self {
            hosts: None,
            client_id: None,
            ack_timeout: Duration::from_secs(10),
            metadata_timeout: Duration::from_secs(10),
            max_message_bytes: 10 * 1024 * 1024,
        }
    }
}

impl PublisherOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take hosts and client id from the static config file.
    pub fn from_config(config: &BridgeConfig) -> Self {
        Self {
            hosts: config.hosts.clone(),
            client_id: config.client_id.clone(),
            ..Self::default()
        }
    }

    pub fn with_hosts(mut self, hosts: impl Into<Hosts>) -> Self {
        self.hosts = Some(hosts.into());
        self
    }

    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    pub fn with_ack_timeout(mut self, timeout: Duration) -> Self {
        self.ack_timeout = timeout;
        self
    }

    pub fn with_metadata_timeout(mut self, timeout: Duration) -> Self {
        self.metadata_timeout = timeout;
        self
    }

    pub fn with_max_message_bytes(mut self, max: usize) -> Self {
        self.max_message_bytes = max;
        self
    }
}

/// Sends single messages to existing topics.
///
/// Holds no connection between calls: every call probes topic metadata,
/// opens a producer, sends, and waits for the acknowledgment. Calls are
/// independent and may run concurrently from many threads.
///
/// ## Example
///
/// ```
/// use broker_bridge::broker::InMemoryBroker;
/// use broker_bridge::publisher::{Publisher, PublisherOptions};
///
/// let broker = InMemoryBroker::new().with_topic("orders", 1);
/// let publisher = Publisher::new(broker, PublisherOptions::new().with_hosts("broker:9092"));
///
/// let result = publisher.publish("orders", r#"{"id":1}"#, None).unwrap();
/// assert_eq!(result.error, 0);
/// assert_eq!(result.offset, 0);
/// ```
pub struct Publisher<C> {
    connector: C,
    options: PublisherOptions,
}

impl<C: BrokerConnector> Publisher<C> {
    pub fn new(connector: C, options: PublisherOptions) -> Self {
        Self { connector, options }
    }

    pub fn options(&self) -> &PublisherOptions {
        &self.options
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    /// Resolve the endpoint for a call: argument first, then configured hosts.
    pub fn resolve_endpoint(&self, hosts: Option<&str>) -> Result<BrokerEndpoint, PublishError> {
        resolve_hosts(hosts, self.options.hosts.as_ref()).ok_or_else(|| {
            PublishError::Configuration(
                "no broker hosts: pass `hosts` or set `hosts` in config".into(),
            )
        })
    }

    pub fn identity(&self) -> ClientIdentity {
        ClientIdentity::producer(resolve_or_default(
            self.options.client_id.as_deref(),
            DEFAULT_PRODUCER_CLIENT_ID,
        ))
    }

    /// Publish a text message (sent as UTF-8 bytes, no key).
    pub fn publish(
        &self,
        topic: &str,
        message: &str,
        hosts: Option<&str>,
    ) -> Result<DeliveryResult, PublishError> {
        self.publish_message(OutboundMessage::text(topic, message), hosts)
    }

    /// Publish a prepared message, which may carry a key or binary payload.
    pub fn publish_message(
        &self,
        message: OutboundMessage,
        hosts: Option<&str>,
    ) -> Result<DeliveryResult, PublishError> {
        let endpoint = self.resolve_endpoint(hosts)?;
        let identity = self.identity();

        debug!(topic = %message.topic, hosts = %endpoint, "checking topic existence");
        let topics = self
            .connector
            .list_topics(&endpoint, &identity, self.options.metadata_timeout)
            .map_err(PublishError::from_metadata)?;
        if !topics.contains(&message.topic) {
            warn!(topic = %message.topic, hosts = %endpoint, "topic does not exist");
            return Err(PublishError::TopicNotFound(message.topic));
        }

        let size = message.payload.len();
        let max = self.options.max_message_bytes;
        if size > max {
            return Err(PublishError::MessageTooLarge { size, max });
        }

        let producer = self
            .connector
            .producer(&endpoint, &identity, max)
            .map_err(PublishError::from_send)?;
        let result = producer
            .send(message, self.options.ack_timeout)
            .map_err(PublishError::from_send)?;

        info!(
            topic = %result.topic,
            partition = result.partition,
            offset = result.offset,
            "message delivered"
        );
        Ok(result)
    }
}
