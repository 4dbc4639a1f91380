//! Apache Kafka connector backed by librdkafka.
//!
//! Requires the `kafka` feature. Producers are synchronous: delivery reports
//! arrive through a `ProducerContext` callback and `send` polls the producer
//! until its report shows up or the timeout elapses. Consumers run with
//! `enable.auto.commit=false`; offsets move only through `Consumer::commit`.

use std::collections::BTreeSet;
use std::sync::mpsc::{self, TryRecvError};
use std::time::{Duration, Instant};

use rdkafka::client::ClientContext;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{BaseConsumer, CommitMode, Consumer as _, DefaultConsumerContext};
use rdkafka::error::{KafkaError, RDKafkaErrorCode};
use rdkafka::message::Message;
use rdkafka::producer::{
    BaseProducer, BaseRecord, DeliveryResult as RdDeliveryResult, Producer as _, ProducerContext,
};
use rdkafka::{Offset, TopicPartitionList};
use tracing::{debug, warn};

use super::client::{BrokerConnector, BrokerError, Consumer, Producer};
use super::record::{DeliveryResult, InboundRecord, OutboundMessage};
use crate::config::{BrokerEndpoint, ClientIdentity, OffsetReset};

/// Interval between producer polls while waiting for a delivery report.
const DELIVERY_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Range librdkafka accepts for `message.max.bytes`.
const MESSAGE_MAX_BYTES_RANGE: (usize, usize) = (1_000, 1_000_000_000);

/// Outcome of one delivery: `(partition, offset)` or the broker error.
type DeliveryReport = Result<(i32, i64), KafkaError>;

/// Connector for a real Kafka cluster.
///
/// `extra` settings are applied verbatim to every client, which is where
/// TLS/SASL options belong.
#[derive(Debug, Clone, Default)]
pub struct KafkaConnector {
    extra: Vec<(String, String)>,
}

impl KafkaConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a raw librdkafka setting (e.g. `security.protocol`).
    pub fn with_setting(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.push((key.into(), value.into()));
        self
    }

    fn client_config(&self, endpoint: &BrokerEndpoint, identity: &ClientIdentity) -> ClientConfig {
        let mut config = ClientConfig::new();
        config
            .set("bootstrap.servers", endpoint.bootstrap_servers())
            .set("client.id", &identity.client_id);
        for (key, value) in &self.extra {
            config.set(key, value);
        }
        config
    }
}

fn map_error(err: KafkaError, timeout: Duration) -> BrokerError {
    match err.rdkafka_error_code() {
        Some(
            RDKafkaErrorCode::BrokerTransportFailure
            | RDKafkaErrorCode::AllBrokersDown
            | RDKafkaErrorCode::Resolve
            | RDKafkaErrorCode::NetworkException,
        ) => BrokerError::Unreachable(err.to_string()),
        Some(
            RDKafkaErrorCode::OperationTimedOut
            | RDKafkaErrorCode::MessageTimedOut
            | RDKafkaErrorCode::RequestTimedOut,
        ) => BrokerError::Timeout(timeout),
        Some(_) => BrokerError::Rejected(err.to_string()),
        None => BrokerError::Other(Box::new(err)),
    }
}

/// Map a `message.max.bytes` limit into the range librdkafka accepts.
///
/// Smaller limits are still enforced by `KafkaProducer::send` before the
/// record reaches librdkafka.
fn librdkafka_message_max(max_message_bytes: usize) -> usize {
    let (min, max) = MESSAGE_MAX_BYTES_RANGE;
    max_message_bytes.clamp(min, max)
}

/// Creating a client never touches the network, so a failure here is a
/// configuration problem rather than an unreachable broker.
fn creation_error(err: KafkaError) -> BrokerError {
    BrokerError::Rejected(format!("invalid client configuration: {err}"))
}

fn map_send_error(err: KafkaError, size: usize, max: usize, timeout: Duration) -> BrokerError {
    match err.rdkafka_error_code() {
        Some(RDKafkaErrorCode::MessageSizeTooLarge) => BrokerError::MessageTooLarge { size, max },
        _ => map_error(err, timeout),
    }
}

fn topic_names<C: rdkafka::consumer::ConsumerContext>(
    consumer: &BaseConsumer<C>,
    timeout: Duration,
) -> Result<BTreeSet<String>, BrokerError> {
    // No topic filter: listing all topics never triggers auto-creation.
    let metadata = consumer
        .fetch_metadata(None, timeout)
        .map_err(|e| map_error(e, timeout))?;
    Ok(metadata
        .topics()
        .iter()
        .map(|topic| topic.name().to_string())
        .collect())
}

impl BrokerConnector for KafkaConnector {
    type Producer = KafkaProducer;
    type Consumer = KafkaConsumer;

    fn list_topics(
        &self,
        endpoint: &BrokerEndpoint,
        identity: &ClientIdentity,
        timeout: Duration,
    ) -> Result<BTreeSet<String>, BrokerError> {
        let probe: BaseConsumer = self
            .client_config(endpoint, identity)
            .create()
            .map_err(creation_error)?;
        topic_names(&probe, timeout)
    }

    fn producer(
        &self,
        endpoint: &BrokerEndpoint,
        identity: &ClientIdentity,
        max_message_bytes: usize,
    ) -> Result<KafkaProducer, BrokerError> {
        let inner: BaseProducer<DeliveryContext> = self
            .client_config(endpoint, identity)
            .set(
                "message.max.bytes",
                librdkafka_message_max(max_message_bytes).to_string(),
            )
            .create_with_context(DeliveryContext)
            .map_err(creation_error)?;
        Ok(KafkaProducer {
            inner,
            max_message_bytes,
        })
    }

    fn consumer(
        &self,
        endpoint: &BrokerEndpoint,
        identity: &ClientIdentity,
        offset_reset: OffsetReset,
    ) -> Result<KafkaConsumer, BrokerError> {
        let group_id = identity
            .group_id
            .as_deref()
            .ok_or_else(|| BrokerError::Rejected("consumer requires a group id".into()))?;
        let inner: BaseConsumer = self
            .client_config(endpoint, identity)
            .set("group.id", group_id)
            .set("enable.auto.commit", "false")
            .set("enable.auto.offset.store", "false")
            .set("auto.offset.reset", offset_reset.as_str())
            .create()
            .map_err(creation_error)?;
        Ok(KafkaConsumer { inner: Some(inner) })
    }
}

/// Routes each delivery report to the channel carried as its opaque.
pub struct DeliveryContext;

impl ClientContext for DeliveryContext {}

impl ProducerContext for DeliveryContext {
    type DeliveryOpaque = Box<mpsc::Sender<DeliveryReport>>;

    fn delivery(&self, result: &RdDeliveryResult<'_>, reply: Self::DeliveryOpaque) {
        let report = match result {
            Ok(message) => Ok((message.partition(), message.offset())),
            Err((err, _)) => Err(err.clone()),
        };
        // The sender only drops its receiver after giving up on the send.
        let _ = reply.send(report);
    }
}

pub struct KafkaProducer {
    inner: BaseProducer<DeliveryContext>,
    max_message_bytes: usize,
}

impl Producer for KafkaProducer {
    fn send(
        &self,
        message: OutboundMessage,
        timeout: Duration,
    ) -> Result<DeliveryResult, BrokerError> {
        let size = message.payload.len();
        let max = self.max_message_bytes;
        if size > max {
            return Err(BrokerError::MessageTooLarge { size, max });
        }
        let (reply, report) = mpsc::channel();

        let mut record = BaseRecord::<Vec<u8>, Vec<u8>, _>::with_opaque_to(
            &message.topic,
            Box::new(reply),
        )
        .payload(&message.payload);
        if let Some(key) = &message.key {
            record = record.key(key);
        }

        self.inner
            .send(record)
            .map_err(|(err, _)| map_send_error(err, size, max, timeout))?;

        let deadline = Instant::now() + timeout;
        loop {
            self.inner.poll(DELIVERY_POLL_INTERVAL);
            match report.try_recv() {
                Ok(Ok((partition, offset))) => {
                    return Ok(DeliveryResult::acknowledged(&message.topic, partition, offset))
                }
                Ok(Err(err)) => return Err(map_send_error(err, size, max, timeout)),
                Err(TryRecvError::Disconnected) => return Err(BrokerError::Closed),
                Err(TryRecvError::Empty) => {}
            }

            if Instant::now() >= deadline {
                return Err(BrokerError::Timeout(timeout));
            }
        }
    }
}

impl Drop for KafkaProducer {
    fn drop(&mut self) {
        if let Err(err) = self.inner.flush(Duration::from_secs(1)) {
            warn!(error = %err, "failed to flush producer on drop");
        }
    }
}

pub struct KafkaConsumer {
    inner: Option<BaseConsumer<DefaultConsumerContext>>,
}

impl KafkaConsumer {
    fn inner(&self) -> Result<&BaseConsumer<DefaultConsumerContext>, BrokerError> {
        self.inner.as_ref().ok_or(BrokerError::Closed)
    }
}

impl Consumer for KafkaConsumer {
    fn list_topics(&self, timeout: Duration) -> Result<BTreeSet<String>, BrokerError> {
        topic_names(self.inner()?, timeout)
    }

    fn subscribe(&mut self, topics: &BTreeSet<String>) -> Result<(), BrokerError> {
        let names: Vec<&str> = topics.iter().map(String::as_str).collect();
        self.inner()?
            .subscribe(&names)
            .map_err(|e| BrokerError::Rejected(e.to_string()))
    }

    fn poll(&mut self, timeout: Duration) -> Result<Option<InboundRecord>, BrokerError> {
        match self.inner()?.poll(timeout) {
            None => Ok(None),
            Some(Err(err)) => Err(map_error(err, timeout)),
            Some(Ok(message)) => Ok(Some(InboundRecord {
                topic: message.topic().to_string(),
                partition: message.partition(),
                offset: message.offset(),
                key: message.key().map(<[u8]>::to_vec),
                value: message.payload().map(<[u8]>::to_vec).unwrap_or_default(),
            })),
        }
    }

    fn commit(&mut self, record: &InboundRecord) -> Result<(), BrokerError> {
        let mut offsets = TopicPartitionList::new();
        offsets
            .add_partition_offset(&record.topic, record.partition, Offset::Offset(record.offset + 1))
            .map_err(|e| BrokerError::Rejected(e.to_string()))?;
        self.inner()?
            .commit(&offsets, CommitMode::Sync)
            .map_err(|e| map_error(e, Duration::ZERO))
    }

    fn close(&mut self) -> Result<(), BrokerError> {
        if let Some(consumer) = self.inner.take() {
            debug!("closing kafka consumer");
            consumer.unsubscribe();
        }
        Ok(())
    }
}
