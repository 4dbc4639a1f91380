//! Publisher - the call-style publish action.
//!
//! ```text
//! publish(topic, message, hosts?)
//!   ├─ resolve hosts (argument > config)      → Configuration
//!   ├─ probe topic metadata                   → Connection / TopicNotFound
//!   ├─ check payload size                     → MessageTooLarge
//!   └─ send, wait for ack (bounded)           → DeliveryTimeout / Broker
//!                                             → DeliveryResult {topic, partition, offset, error: 0}
//! ```

mod error;
#[allow(clippy::module_inception)]
mod publisher;

pub use error::PublishError;
pub use publisher::{Publisher, PublisherOptions};
