//! Subscriber - pull, decode, dispatch, then commit.

use std::collections::BTreeSet;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use super::backoff::Backoff;
use super::error::SubscribeError;
use super::stop::StopToken;
use crate::broker::{BrokerConnector, Consumer, InboundRecord};
use crate::config::{
    resolve_or_default, BridgeConfig, BrokerEndpoint, ClientIdentity, OffsetReset,
    SubscriberConfig, DEFAULT_CONSUMER_CLIENT_ID, DEFAULT_GROUP_ID,
};
use crate::sink::{DispatchSink, Event};

/// Where a subscriber is in its life.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    /// Validated, nothing opened yet.
    Configured,
    /// Opening the consumer connection.
    Connecting,
    /// Checking that every requested topic exists.
    Verifying,
    /// Subscribed, not polling yet.
    Ready,
    Running,
    /// Consumer closed. Terminal.
    Stopped,
}

/// What a subscriber listens to and as whom.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionState {
    pub topics: BTreeSet<String>,
    pub group_id: String,
    pub client_id: String,
    /// True while a consumer connection is open.
    pub connected: bool,
}

/// Statistics from a subscriber run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SubscriberStats {
    pub polls: usize,
    pub dispatched: usize,
    pub committed: usize,
}

/// A long-running listener with at-least-once delivery.
///
/// Each record is decoded into an [`Event`] and handed to the sink. The
/// record's offset is committed only after the sink accepted it; if the sink
/// fails, the loop halts and the record is redelivered to the group later.
///
/// ## Example
///
/// ```
/// use broker_bridge::broker::{BrokerConnector, InMemoryBroker, OutboundMessage, Producer};
/// use broker_bridge::config::{BrokerEndpoint, ClientIdentity, OffsetReset, SubscriberConfig};
/// use broker_bridge::sink::ChannelSink;
/// use broker_bridge::subscriber::Subscriber;
/// use std::time::Duration;
///
/// let broker = InMemoryBroker::new().with_topic("orders", 1);
/// let endpoint = BrokerEndpoint::parse("broker:9092").unwrap();
/// let producer = broker
///     .producer(&endpoint, &ClientIdentity::producer("p"), 1024)
///     .unwrap();
/// producer
///     .send(OutboundMessage::text("orders", r#"{"id":1}"#), Duration::from_secs(1))
///     .unwrap();
///
/// let config = SubscriberConfig::new("broker:9092", ["orders"])
///     .with_offset_reset(OffsetReset::Earliest);
/// let (sink, events) = ChannelSink::channel();
/// let mut subscriber = Subscriber::new(broker, &config, sink).unwrap();
///
/// subscriber.setup().unwrap();
/// let record = subscriber.poll_once().unwrap().unwrap();
/// subscriber.process(record).unwrap();
///
/// assert_eq!(events.recv().unwrap().message["id"], 1);
/// ```
pub struct Subscriber<C: BrokerConnector, S> {
    connector: C,
    endpoint: BrokerEndpoint,
    identity: ClientIdentity,
    offset_reset: OffsetReset,
    poll_timeout: Duration,
    metadata_timeout: Duration,
    backoff: Backoff,
    state: SubscriptionState,
    lifecycle: Lifecycle,
    consumer: Option<C::Consumer>,
    sink: S,
    stats: SubscriberStats,
}

impl<C: BrokerConnector, S: DispatchSink> Subscriber<C, S> {
    /// Validate the configuration and apply identity defaults.
    ///
    /// Fails with `SubscribeError::Configuration` when hosts are missing or
    /// no topic is listed. Opens no connection.
    pub fn new(connector: C, config: &SubscriberConfig, sink: S) -> Result<Self, SubscribeError> {
        let endpoint = config
            .hosts
            .as_ref()
            .and_then(|hosts| hosts.to_endpoint())
            .ok_or_else(|| SubscribeError::Configuration("no broker hosts configured".into()))?;

        let topics: BTreeSet<String> = config
            .topics
            .iter()
            .map(|topic| topic.trim())
            .filter(|topic| !topic.is_empty())
            .map(str::to_string)
            .collect();
        if topics.is_empty() {
            return Err(SubscribeError::Configuration(
                "at least one topic is required".into(),
            ));
        }

        let group_id = resolve_or_default(config.group_id.as_deref(), DEFAULT_GROUP_ID);
        let client_id = resolve_or_default(config.client_id.as_deref(), DEFAULT_CONSUMER_CLIENT_ID);

        Ok(Self {
            connector,
            endpoint,
            identity: ClientIdentity::consumer(client_id.clone(), group_id.clone()),
            offset_reset: config.offset_reset,
            poll_timeout: config.poll_timeout(),
            metadata_timeout: config.metadata_timeout(),
            backoff: Backoff::default(),
            state: SubscriptionState {
                topics,
                group_id,
                client_id,
                connected: false,
            },
            lifecycle: Lifecycle::Configured,
            consumer: None,
            sink,
            stats: SubscriberStats::default(),
        })
    }

    /// Build from the `subscriber` section of the static config file.
    pub fn from_config(connector: C, config: &BridgeConfig, sink: S) -> Result<Self, SubscribeError> {
        let section = config.subscriber.as_ref().ok_or_else(|| {
            SubscribeError::Configuration("missing `subscriber` section".into())
        })?;
        Self::new(connector, section, sink)
    }

    /// Replace the startup retry policy.
    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    pub fn state(&self) -> &SubscriptionState {
        &self.state
    }

    pub fn endpoint(&self) -> &BrokerEndpoint {
        &self.endpoint
    }

    pub fn stats(&self) -> &SubscriberStats {
        &self.stats
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Connect, verify that every topic exists, then subscribe.
    ///
    /// When topics are missing the consumer is closed and the subscriber
    /// stops without ever subscribing.
    pub fn setup(&mut self) -> Result<(), SubscribeError> {
        if self.lifecycle != Lifecycle::Configured {
            return Err(SubscribeError::InvalidState {
                operation: "set up",
                state: self.lifecycle,
            });
        }

        self.lifecycle = Lifecycle::Connecting;
        info!(
            hosts = %self.endpoint,
            group_id = %self.state.group_id,
            client_id = %self.state.client_id,
            "connecting subscriber"
        );
        let opened = self.backoff.retry(|| {
            self.connector
                .consumer(&self.endpoint, &self.identity, self.offset_reset)
        });
        let mut consumer = match opened {
            Ok(consumer) => consumer,
            Err(err) => {
                error!(hosts = %self.endpoint, error = %err, "subscriber could not connect");
                self.lifecycle = Lifecycle::Stopped;
                return Err(SubscribeError::Connection(err));
            }
        };
        self.state.connected = true;

        self.lifecycle = Lifecycle::Verifying;
        let subscribed = self
            .verify_topics(&consumer)
            .and_then(|()| {
                consumer
                    .subscribe(&self.state.topics)
                    .map_err(SubscribeError::Connection)
            });
        if let Err(err) = subscribed {
            error!(group_id = %self.state.group_id, error = %err, "subscriber setup failed");
            if let Err(close_err) = consumer.close() {
                warn!(error = %close_err, "failed to close consumer");
            }
            self.state.connected = false;
            self.lifecycle = Lifecycle::Stopped;
            return Err(err);
        }

        self.consumer = Some(consumer);
        self.lifecycle = Lifecycle::Ready;
        info!(
            topics = ?self.state.topics,
            group_id = %self.state.group_id,
            "subscriber ready"
        );
        Ok(())
    }

    fn verify_topics(&self, consumer: &C::Consumer) -> Result<(), SubscribeError> {
        let existing = consumer
            .list_topics(self.metadata_timeout)
            .map_err(SubscribeError::Connection)?;
        let missing: Vec<String> = self.state.topics.difference(&existing).cloned().collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(SubscribeError::MissingTopics(missing))
        }
    }

    /// Poll until the token is stopped or a record fails.
    ///
    /// Runs `setup` first when the subscriber is still `Configured`. The
    /// consumer is closed before returning, whatever the outcome.
    pub fn run(&mut self, stop: &StopToken) -> Result<SubscriberStats, SubscribeError> {
        if self.lifecycle == Lifecycle::Configured {
            self.setup()?;
        }
        if self.lifecycle != Lifecycle::Ready {
            return Err(SubscribeError::InvalidState {
                operation: "run",
                state: self.lifecycle,
            });
        }

        self.lifecycle = Lifecycle::Running;
        let result = self.poll_loop(stop);
        self.shutdown();

        if let Err(err) = &result {
            error!(group_id = %self.state.group_id, error = %err, "subscriber halted");
        }
        result.map(|()| self.stats.clone())
    }

    fn poll_loop(&mut self, stop: &StopToken) -> Result<(), SubscribeError> {
        while !stop.is_stopped() {
            let Some(record) = self.poll_once()? else {
                continue;
            };
            // Stop was requested mid-poll; leave the record uncommitted.
            if stop.is_stopped() {
                break;
            }
            self.process(record)?;
        }
        Ok(())
    }

    /// Pull at most one record, waiting up to the poll timeout.
    pub fn poll_once(&mut self) -> Result<Option<InboundRecord>, SubscribeError> {
        let timeout = self.poll_timeout;
        let consumer = self.open_consumer("poll")?;
        let polled = consumer.poll(timeout).map_err(SubscribeError::Poll);
        self.stats.polls += 1;
        polled
    }

    /// Decode one record, dispatch it, and commit its offset on success.
    pub fn process(&mut self, record: InboundRecord) -> Result<(), SubscribeError> {
        let event = Event::from_record(&record);
        let Some(consumer) = self.consumer.as_mut() else {
            return Err(SubscribeError::InvalidState {
                operation: "process a record",
                state: self.lifecycle,
            });
        };

        debug!(
            topic = %record.topic,
            partition = record.partition,
            offset = record.offset,
            "dispatching event"
        );
        if let Err(source) = self.sink.dispatch(&event) {
            error!(
                topic = %record.topic,
                partition = record.partition,
                offset = record.offset,
                error = %source,
                "dispatch failed, offset not committed"
            );
            return Err(SubscribeError::Dispatch {
                topic: record.topic,
                partition: record.partition,
                offset: record.offset,
                source,
            });
        }
        self.stats.dispatched += 1;

        if let Err(source) = consumer.commit(&record) {
            error!(
                topic = %record.topic,
                partition = record.partition,
                offset = record.offset,
                error = %source,
                "commit failed"
            );
            return Err(SubscribeError::Commit {
                topic: record.topic,
                partition: record.partition,
                offset: record.offset,
                source,
            });
        }
        self.stats.committed += 1;
        Ok(())
    }

    fn open_consumer(&mut self, operation: &'static str) -> Result<&mut C::Consumer, SubscribeError> {
        let state = self.lifecycle;
        self.consumer
            .as_mut()
            .ok_or(SubscribeError::InvalidState { operation, state })
    }

    /// Close the consumer and move to `Stopped`. Safe to call repeatedly.
    pub fn shutdown(&mut self) {
        self.close_consumer();
        self.lifecycle = Lifecycle::Stopped;
    }
}

impl<C: BrokerConnector, S> Subscriber<C, S> {
    fn close_consumer(&mut self) {
        if let Some(mut consumer) = self.consumer.take() {
            if let Err(err) = consumer.close() {
                warn!(group_id = %self.state.group_id, error = %err, "failed to close consumer");
            }
            info!(group_id = %self.state.group_id, "subscriber stopped");
        }
        self.state.connected = false;
    }
}

impl<C: BrokerConnector, S> Drop for Subscriber<C, S> {
    fn drop(&mut self) {
        self.close_consumer();
    }
}
