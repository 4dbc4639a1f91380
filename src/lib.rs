//! At-least-once bridge between a call-style action interface and a
//! publish/subscribe broker.
//!
//! - [`Publisher`] sends one message to one existing topic per call and
//!   returns the delivery metadata.
//! - [`Subscriber`] consumes topics under a consumer group, hands each record
//!   to a [`DispatchSink`] as an [`Event`], and commits only after the sink
//!   accepted it.
//!
//! Broker access goes through the traits in [`broker`]. `InMemoryBroker` is
//! always available; `KafkaConnector` needs the `kafka` feature.

pub mod broker;
pub mod config;
pub mod decode;
#[cfg(feature = "http")]
pub mod http;
pub mod publisher;
pub mod sink;
pub mod subscriber;
pub mod telemetry;

pub use broker::{
    BrokerConnector, BrokerError, DeliveryResult, InMemoryBroker, InboundRecord, OutboundMessage,
};
#[cfg(feature = "kafka")]
pub use broker::KafkaConnector;
pub use config::{BridgeConfig, BrokerEndpoint, ConfigError, Hosts, SubscriberConfig};
pub use publisher::{PublishError, Publisher, PublisherOptions};
#[cfg(feature = "emitter")]
pub use sink::EmitterSink;
pub use sink::{ChannelSink, DispatchError, DispatchSink, Event, JsonLinesSink};
pub use subscriber::{
    Backoff, Lifecycle, StopToken, SubscribeError, Subscriber, SubscriberStats, SubscriberThread,
};

// Re-export the EventEmitter from the event_emitter_rs crate
#[cfg(feature = "emitter")]
pub use event_emitter_rs::EventEmitter;
