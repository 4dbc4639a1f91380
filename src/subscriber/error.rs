//! Error types for the subscriber.

use thiserror::Error;

use super::Lifecycle;
use crate::broker::BrokerError;
use crate::sink::DispatchError;

/// Error raised while configuring, starting or running a subscriber.
#[derive(Debug, Error)]
pub enum SubscribeError {
    /// Missing hosts or topics. Raised before any connection is opened.
    #[error("configuration error: {0}")]
    Configuration(String),
    /// Requested topics absent from the cluster, sorted.
    #[error("The following topics do not exist: {}", .0.join(", "))]
    MissingTopics(Vec<String>),
    /// The broker could not be reached during startup.
    #[error("connection error: {0}")]
    Connection(#[source] BrokerError),
    /// The sink rejected an event; its offset was not committed.
    #[error("dispatch failed for {topic}[{partition}]@{offset}: {source}")]
    Dispatch {
        topic: String,
        partition: i32,
        offset: i64,
        #[source]
        source: DispatchError,
    },
    #[error("poll failed: {0}")]
    Poll(#[source] BrokerError),
    #[error("commit failed for {topic}[{partition}]@{offset}: {source}")]
    Commit {
        topic: String,
        partition: i32,
        offset: i64,
        #[source]
        source: BrokerError,
    },
    /// The operation is not allowed in the current lifecycle state.
    #[error("cannot {operation} while {state:?}")]
    InvalidState {
        operation: &'static str,
        state: Lifecycle,
    },
    #[error("subscriber thread panicked")]
    Panicked,
}

impl SubscribeError {
    /// Whether the failure happened before the subscriber started polling.
    pub fn is_startup(&self) -> bool {
        matches!(
            self,
            SubscribeError::Configuration(_)
                | SubscribeError::MissingTopics(_)
                | SubscribeError::Connection(_)
        )
    }
}
