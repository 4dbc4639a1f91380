//! Error types for the publish action.

use std::time::Duration;

use thiserror::Error;

use crate::broker::BrokerError;

/// Error returned by `Publisher::publish`.
#[derive(Debug, Error)]
pub enum PublishError {
    /// A required setting is missing. Raised before any I/O.
    #[error("configuration error: {0}")]
    Configuration(String),
    /// The topic does not exist on the cluster.
    #[error("{0} does not exist")]
    TopicNotFound(String),
    /// The broker could not be reached.
    #[error("connection error: {0}")]
    Connection(#[source] BrokerError),
    /// No acknowledgment within the configured bound.
    #[error("delivery not acknowledged within {0:?}")]
    DeliveryTimeout(Duration),
    /// The payload exceeds the maximum message size.
    #[error("message of {size} bytes exceeds the {max} byte limit")]
    MessageTooLarge { size: usize, max: usize },
    /// The broker refused the message.
    #[error("broker error: {0}")]
    Broker(#[source] BrokerError),
}

impl PublishError {
    /// Map an error from the metadata probe. A probe that times out never
    /// reached the send path, so it counts as a connection failure.
    pub(crate) fn from_metadata(err: BrokerError) -> Self {
        match err {
            BrokerError::Unreachable(_) | BrokerError::Timeout(_) | BrokerError::Closed => {
                PublishError::Connection(err)
            }
            other => PublishError::Broker(other),
        }
    }

    /// Map an error from opening a producer or sending through it.
    pub(crate) fn from_send(err: BrokerError) -> Self {
        match err {
            BrokerError::Unreachable(_) => PublishError::Connection(err),
            BrokerError::Timeout(timeout) => PublishError::DeliveryTimeout(timeout),
            BrokerError::MessageTooLarge { size, max } => {
                PublishError::MessageTooLarge { size, max }
            }
            other => PublishError::Broker(other),
        }
    }

    /// Map this error to an HTTP-style status code.
    pub fn status_code(&self) -> u16 {
        match self {
            PublishError::Configuration(_) => 400,
            PublishError::TopicNotFound(_) => 404,
            PublishError::MessageTooLarge { .. } => 413,
            PublishError::Connection(_) => 502,
            PublishError::Broker(_) => 502,
            PublishError::DeliveryTimeout(_) => 504,
        }
    }
}
