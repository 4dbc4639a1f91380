//! Threaded subscriber for background consumption.
//!
//! This module runs a `Subscriber` on its own thread and hands back a handle
//! that can stop it and collect its statistics.

use std::thread::{self, JoinHandle};

use super::error::SubscribeError;
use super::stop::StopToken;
use super::subscriber::{Subscriber, SubscriberStats};
use crate::broker::BrokerConnector;
use crate::sink::DispatchSink;

/// A background thread running a subscriber's setup and poll loop.
///
/// ## Example
///
/// ```
/// use broker_bridge::broker::InMemoryBroker;
/// use broker_bridge::config::SubscriberConfig;
/// use broker_bridge::sink::ChannelSink;
/// use broker_bridge::subscriber::{Subscriber, SubscriberThread};
///
/// let broker = InMemoryBroker::new().with_topic("orders", 1);
/// let config = SubscriberConfig::new("broker:9092", ["orders"]);
/// let (sink, _events) = ChannelSink::channel();
///
/// let worker = SubscriberThread::spawn(Subscriber::new(broker, &config, sink).unwrap());
///
/// // ... publish to "orders" ...
///
/// let stats = worker.stop().unwrap();
/// println!("Committed {} records", stats.committed);
/// ```
pub struct SubscriberThread {
    stop: StopToken,
    handle: Option<JoinHandle<Result<SubscriberStats, SubscribeError>>>,
}

impl SubscriberThread {
    /// Spawn a thread that sets up the subscriber and runs it until stopped.
    pub fn spawn<C, S>(subscriber: Subscriber<C, S>) -> Self
    where
        C: BrokerConnector + 'static,
        S: DispatchSink + 'static,
    {
        Self::spawn_with_token(subscriber, StopToken::new())
    }

    /// Spawn with a caller-provided stop token, e.g. one shared with a
    /// signal handler.
    pub fn spawn_with_token<C, S>(mut subscriber: Subscriber<C, S>, stop: StopToken) -> Self
    where
        C: BrokerConnector + 'static,
        S: DispatchSink + 'static,
    {
        let token = stop.clone();
        let handle = thread::spawn(move || subscriber.run(&token));

        Self {
            stop,
            handle: Some(handle),
        }
    }

    /// Signal the subscriber to stop and wait for it to finish.
    /// Returns the run statistics, or the error that ended the run.
    pub fn stop(mut self) -> Result<SubscriberStats, SubscribeError> {
        self.stop.stop();
        self.join_inner()
    }

    /// Wait for the subscriber to end on its own (startup or dispatch failure).
    pub fn join(mut self) -> Result<SubscriberStats, SubscribeError> {
        self.join_inner()
    }

    /// Signal the subscriber to stop without waiting.
    pub fn signal_stop(&self) {
        self.stop.stop();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, JoinHandle::is_finished)
    }

    pub fn stop_token(&self) -> &StopToken {
        &self.stop
    }

    fn join_inner(&mut self) -> Result<SubscriberStats, SubscribeError> {
        match self.handle.take() {
            Some(handle) => handle.join().unwrap_or(Err(SubscribeError::Panicked)),
            None => Ok(SubscriberStats::default()),
        }
    }
}

impl Drop for SubscriberThread {
    fn drop(&mut self) {
        self.stop.stop();
        // Don't join on drop - the loop exits within one poll timeout
    }
}
