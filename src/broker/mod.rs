//! Broker - client abstractions the bridge delegates all delivery semantics to.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────┐      ┌───────────────────────────┐
//! │        Publisher          │      │        Subscriber         │
//! │  list_topics → send       │      │  consumer → list_topics   │
//! │                           │      │  → subscribe → poll/commit│
//! └─────────────┬─────────────┘      └─────────────┬─────────────┘
//!               │                                  │
//!               ▼                                  ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │        BrokerConnector + Producer + Consumer traits          │
//! └─────────────────────────────────────────────────────────────┘
//!          │                                   │
//!          ▼                                   ▼
//! ┌─────────────────┐                 ┌─────────────────────┐
//! │ InMemoryBroker  │                 │   KafkaConnector    │
//! │   (included)    │                 │  (feature `kafka`)  │
//! └─────────────────┘                 └─────────────────────┘
//! ```

mod client;
mod in_memory;
#[cfg(feature = "kafka")]
mod kafka;
mod record;

pub use client::{BrokerConnector, BrokerError, Consumer, Producer};
pub use in_memory::{BrokerCall, InMemoryBroker, InMemoryConsumer, InMemoryProducer};
#[cfg(feature = "kafka")]
pub use kafka::{DeliveryContext, KafkaConnector, KafkaConsumer, KafkaProducer};
pub use record::{DeliveryResult, InboundRecord, OutboundMessage};
