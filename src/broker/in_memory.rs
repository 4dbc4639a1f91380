//! In-memory broker for testing and single-process scenarios.
//!
//! This module provides a thread-safe broker that implements the full
//! `BrokerConnector` surface, useful for:
//! - Unit and integration testing without a running cluster
//! - Single-process deployments and demos
//! - Simulating outages, slow acknowledgments and size limits

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use super::client::{BrokerConnector, BrokerError, Consumer, Producer};
use super::record::{DeliveryResult, InboundRecord, OutboundMessage};
use crate::config::{BrokerEndpoint, ClientIdentity, OffsetReset};

/// A request observed by the in-memory broker, in arrival order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BrokerCall {
    ListTopics { hosts: String, client_id: String },
    OpenProducer { hosts: String, client_id: String },
    Send { topic: String },
    OpenConsumer { hosts: String, group_id: String },
    Subscribe { group_id: String, topics: Vec<String> },
    Poll { group_id: String },
    /// `offset` is the committed record's offset; the group resumes at `offset + 1`.
    Commit { group_id: String, topic: String, partition: i32, offset: i64 },
    Close { group_id: String },
}

#[derive(Clone, Debug)]
struct StoredRecord {
    key: Option<Vec<u8>>,
    value: Vec<u8>,
}

/// (group, topic, partition)
type GroupPartition = (String, String, i32);

struct BrokerState {
    /// Topic name to per-partition logs.
    topics: BTreeMap<String, Vec<Vec<StoredRecord>>>,
    /// Next offset to read, per group partition.
    committed: HashMap<GroupPartition, i64>,
    round_robin: HashMap<String, usize>,
    reachable: bool,
    failing_connections: usize,
    ack_delay: Option<Duration>,
}

impl BrokerState {
    fn new() -> Self {
        Self {
            topics: BTreeMap::new(),
            committed: HashMap::new(),
            round_robin: HashMap::new(),
            reachable: true,
            failing_connections: 0,
            ack_delay: None,
        }
    }

    fn topic_names(&self) -> BTreeSet<String> {
        self.topics.keys().cloned().collect()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// In-memory broker.
///
/// Features:
/// - Thread-safe (handles are shared across threads via `Clone`)
/// - Partitioned, append-only topic logs
/// - Per-group committed offsets that survive consumer restarts
/// - A call log for asserting what the bridge asked the broker to do
///
/// ## Example
///
/// ```
/// use broker_bridge::broker::{BrokerConnector, InMemoryBroker, OutboundMessage, Producer};
/// use broker_bridge::config::{BrokerEndpoint, ClientIdentity};
/// use std::time::Duration;
///
/// let broker = InMemoryBroker::new().with_topic("orders", 1);
/// let endpoint = BrokerEndpoint::parse("broker:9092").unwrap();
/// let identity = ClientIdentity::producer("example");
///
/// let producer = broker.producer(&endpoint, &identity, 1024).unwrap();
/// let result = producer
///     .send(OutboundMessage::text("orders", "hello"), Duration::from_secs(1))
///     .unwrap();
///
/// assert_eq!(result.offset, 0);
/// assert_eq!(broker.len("orders"), 1);
/// ```
#[derive(Clone)]
pub struct InMemoryBroker {
    state: Arc<Mutex<BrokerState>>,
    calls: Arc<Mutex<Vec<BrokerCall>>>,
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryBroker {
    /// Create an empty, reachable broker.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(BrokerState::new())),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Builder form of `create_topic`.
    pub fn with_topic(self, name: &str, partitions: usize) -> Self {
        self.create_topic(name, partitions);
        self
    }

    /// Create a topic. Existing topics are left untouched.
    pub fn create_topic(&self, name: &str, partitions: usize) {
        lock(&self.state)
            .topics
            .entry(name.to_string())
            .or_insert_with(|| vec![Vec::new(); partitions.max(1)]);
    }

    /// Toggle whether any connection can be made.
    pub fn set_reachable(&self, reachable: bool) {
        lock(&self.state).reachable = reachable;
    }

    /// Make the next `count` connection attempts fail as unreachable.
    pub fn fail_next_connections(&self, count: usize) {
        lock(&self.state).failing_connections = count;
    }

    /// Delay every acknowledgment. Sends whose timeout is shorter fail.
    pub fn set_ack_delay(&self, delay: Option<Duration>) {
        lock(&self.state).ack_delay = delay;
    }

    /// Names of all topics.
    pub fn topics(&self) -> BTreeSet<String> {
        lock(&self.state).topic_names()
    }

    /// All records in a topic, partition by partition.
    pub fn records(&self, topic: &str) -> Vec<InboundRecord> {
        let state = lock(&self.state);
        let Some(partitions) = state.topics.get(topic) else {
            return Vec::new();
        };
        partitions
            .iter()
            .enumerate()
            .flat_map(|(partition, log)| {
                log.iter().enumerate().map(move |(offset, stored)| InboundRecord {
                    topic: topic.to_string(),
                    partition: partition as i32,
                    offset: offset as i64,
                    key: stored.key.clone(),
                    value: stored.value.clone(),
                })
            })
            .collect()
    }

    /// Number of records in a topic across partitions.
    pub fn len(&self, topic: &str) -> usize {
        lock(&self.state)
            .topics
            .get(topic)
            .map(|partitions| partitions.iter().map(Vec::len).sum())
            .unwrap_or(0)
    }

    /// Check if a topic holds no records.
    pub fn is_empty(&self, topic: &str) -> bool {
        self.len(topic) == 0
    }

    /// The position a group resumes from, if it ever committed on this partition.
    pub fn committed_offset(&self, group_id: &str, topic: &str, partition: i32) -> Option<i64> {
        lock(&self.state)
            .committed
            .get(&(group_id.to_string(), topic.to_string(), partition))
            .copied()
    }

    /// Every request received so far.
    pub fn calls(&self) -> Vec<BrokerCall> {
        lock(&self.calls).clone()
    }

    /// Only the commit requests.
    pub fn commits(&self) -> Vec<BrokerCall> {
        lock(&self.calls)
            .iter()
            .filter(|call| matches!(call, BrokerCall::Commit { .. }))
            .cloned()
            .collect()
    }

    /// Forget recorded calls (useful between test phases).
    pub fn clear_calls(&self) {
        lock(&self.calls).clear();
    }

    fn record(&self, call: BrokerCall) {
        lock(&self.calls).push(call);
    }

    fn connect(&self, endpoint: &BrokerEndpoint) -> Result<MutexGuard<'_, BrokerState>, BrokerError> {
        let mut state = lock(&self.state);
        if state.failing_connections > 0 {
            state.failing_connections -= 1;
            return Err(BrokerError::Unreachable(endpoint.to_string()));
        }
        if !state.reachable {
            return Err(BrokerError::Unreachable(endpoint.to_string()));
        }
        Ok(state)
    }
}

impl BrokerConnector for InMemoryBroker {
    type Producer = InMemoryProducer;
    type Consumer = InMemoryConsumer;

    fn list_topics(
        &self,
        endpoint: &BrokerEndpoint,
        identity: &ClientIdentity,
        _timeout: Duration,
    ) -> Result<BTreeSet<String>, BrokerError> {
        self.record(BrokerCall::ListTopics {
            hosts: endpoint.to_string(),
            client_id: identity.client_id.clone(),
        });
        Ok(self.connect(endpoint)?.topic_names())
    }

    fn producer(
        &self,
        endpoint: &BrokerEndpoint,
        identity: &ClientIdentity,
        max_message_bytes: usize,
    ) -> Result<InMemoryProducer, BrokerError> {
        self.record(BrokerCall::OpenProducer {
            hosts: endpoint.to_string(),
            client_id: identity.client_id.clone(),
        });
        drop(self.connect(endpoint)?);
        Ok(InMemoryProducer {
            broker: self.clone(),
            max_message_bytes,
        })
    }

    fn consumer(
        &self,
        endpoint: &BrokerEndpoint,
        identity: &ClientIdentity,
        offset_reset: OffsetReset,
    ) -> Result<InMemoryConsumer, BrokerError> {
        let group_id = identity.group_id.clone().unwrap_or_default();
        self.record(BrokerCall::OpenConsumer {
            hosts: endpoint.to_string(),
            group_id: group_id.clone(),
        });
        drop(self.connect(endpoint)?);
        Ok(InMemoryConsumer {
            broker: self.clone(),
            group_id,
            offset_reset,
            topics: None,
            positions: HashMap::new(),
            cursor: 0,
            closed: false,
        })
    }
}

/// Producer handle returned by `InMemoryBroker::producer`.
pub struct InMemoryProducer {
    broker: InMemoryBroker,
    max_message_bytes: usize,
}

impl InMemoryProducer {
    fn pick_partition(state: &mut BrokerState, message: &OutboundMessage, partitions: usize) -> usize {
        match &message.key {
            Some(key) => {
                let hash = key
                    .iter()
                    .fold(0u32, |h, b| h.wrapping_mul(31).wrapping_add(u32::from(*b)));
                hash as usize % partitions
            }
            None => {
                let next = state.round_robin.entry(message.topic.clone()).or_insert(0);
                let partition = *next % partitions;
                *next = next.wrapping_add(1);
                partition
            }
        }
    }
}

impl Producer for InMemoryProducer {
    fn send(
        &self,
        message: OutboundMessage,
        timeout: Duration,
    ) -> Result<DeliveryResult, BrokerError> {
        self.broker.record(BrokerCall::Send {
            topic: message.topic.clone(),
        });

        if message.payload.len() > self.max_message_bytes {
            return Err(BrokerError::MessageTooLarge {
                size: message.payload.len(),
                max: self.max_message_bytes,
            });
        }

        let ack_delay = lock(&self.broker.state).ack_delay;
        if let Some(delay) = ack_delay {
            if delay > timeout {
                std::thread::sleep(timeout);
                return Err(BrokerError::Timeout(timeout));
            }
            std::thread::sleep(delay);
        }

        let mut state = lock(&self.broker.state);
        if !state.reachable {
            return Err(BrokerError::Unreachable("in-memory broker".into()));
        }
        let partitions = match state.topics.get(&message.topic) {
            Some(partitions) => partitions.len(),
            None => {
                return Err(BrokerError::Rejected(format!(
                    "unknown topic or partition: {}",
                    message.topic
                )))
            }
        };
        let partition = Self::pick_partition(&mut state, &message, partitions);

        let OutboundMessage {
            topic,
            payload,
            key,
        } = message;
        let log = state
            .topics
            .get_mut(&topic)
            .and_then(|partitions| partitions.get_mut(partition))
            .ok_or_else(|| BrokerError::Rejected(format!("unknown partition {}", partition)))?;
        let offset = log.len() as i64;
        log.push(StoredRecord { key, value: payload });

        Ok(DeliveryResult::acknowledged(topic, partition as i32, offset))
    }
}

/// Consumer handle returned by `InMemoryBroker::consumer`.
///
/// Fetch positions are local to the handle; only `commit` moves the group's
/// stored offset, so a fresh consumer in the same group resumes after the
/// last committed record. Positions of partitions that exist at `subscribe`
/// are fixed there, so `latest` does not skip records produced before the
/// first poll.
pub struct InMemoryConsumer {
    broker: InMemoryBroker,
    group_id: String,
    offset_reset: OffsetReset,
    topics: Option<BTreeSet<String>>,
    positions: HashMap<(String, i32), i64>,
    /// Partition slot the next scan starts from.
    cursor: usize,
    closed: bool,
}

/// Where a group starts reading a partition it has no position for.
fn start_position(
    state: &BrokerState,
    group_id: &str,
    topic: &str,
    partition: i32,
    reset: OffsetReset,
) -> i64 {
    if let Some(committed) = state
        .committed
        .get(&(group_id.to_string(), topic.to_string(), partition))
    {
        return *committed;
    }
    match reset {
        OffsetReset::Earliest => 0,
        OffsetReset::Latest => state
            .topics
            .get(topic)
            .and_then(|partitions| partitions.get(partition as usize))
            .map_or(0, |log| log.len() as i64),
    }
}

impl InMemoryConsumer {
    fn ensure_open(&self) -> Result<(), BrokerError> {
        if self.closed {
            Err(BrokerError::Closed)
        } else {
            Ok(())
        }
    }

    fn next_record(&mut self) -> Result<Option<InboundRecord>, BrokerError> {
        let Some(topics) = &self.topics else {
            return Err(BrokerError::Rejected("poll before subscribe".into()));
        };
        let state = lock(&self.broker.state);
        if !state.reachable {
            return Err(BrokerError::Unreachable("in-memory broker".into()));
        }

        let slots: Vec<(&String, i32)> = topics
            .iter()
            .flat_map(|topic| {
                let count = state.topics.get(topic).map_or(0, Vec::len);
                (0..count).map(move |partition| (topic, partition as i32))
            })
            .collect();
        if slots.is_empty() {
            return Ok(None);
        }

        // Start where the previous successful scan left off
        let start = self.cursor % slots.len();
        for step in 0..slots.len() {
            let index = (start + step) % slots.len();
            let (topic, partition) = slots[index];
            let position = *self
                .positions
                .entry((topic.clone(), partition))
                .or_insert_with(|| {
                    start_position(&state, &self.group_id, topic, partition, self.offset_reset)
                });

            let stored = state
                .topics
                .get(topic)
                .and_then(|partitions| partitions.get(partition as usize))
                .and_then(|log| log.get(position as usize));
            if let Some(stored) = stored {
                self.positions.insert((topic.clone(), partition), position + 1);
                self.cursor = index + 1;
                return Ok(Some(InboundRecord {
                    topic: topic.clone(),
                    partition,
                    offset: position,
                    key: stored.key.clone(),
                    value: stored.value.clone(),
                }));
            }
        }

        Ok(None)
    }
}

impl Consumer for InMemoryConsumer {
    fn list_topics(&self, _timeout: Duration) -> Result<BTreeSet<String>, BrokerError> {
        self.ensure_open()?;
        let state = lock(&self.broker.state);
        if !state.reachable {
            return Err(BrokerError::Unreachable("in-memory broker".into()));
        }
        Ok(state.topic_names())
    }

    fn subscribe(&mut self, topics: &BTreeSet<String>) -> Result<(), BrokerError> {
        self.ensure_open()?;
        if self.topics.is_some() {
            return Err(BrokerError::Rejected("consumer is already subscribed".into()));
        }
        self.broker.record(BrokerCall::Subscribe {
            group_id: self.group_id.clone(),
            topics: topics.iter().cloned().collect(),
        });

        let state = lock(&self.broker.state);
        for topic in topics {
            let count = state.topics.get(topic).map_or(0, Vec::len);
            for partition in 0..count as i32 {
                let position =
                    start_position(&state, &self.group_id, topic, partition, self.offset_reset);
                self.positions.insert((topic.clone(), partition), position);
            }
        }
        drop(state);

        self.topics = Some(topics.clone());
        Ok(())
    }

    fn poll(&mut self, timeout: Duration) -> Result<Option<InboundRecord>, BrokerError> {
        self.ensure_open()?;
        self.broker.record(BrokerCall::Poll {
            group_id: self.group_id.clone(),
        });

        let deadline = Instant::now() + timeout;
        loop {
            if let Some(record) = self.next_record()? {
                return Ok(Some(record));
            }

            if Instant::now() >= deadline {
                return Ok(None);
            }

            // Small sleep to avoid busy-waiting
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    fn commit(&mut self, record: &InboundRecord) -> Result<(), BrokerError> {
        self.ensure_open()?;
        {
            let mut state = lock(&self.broker.state);
            if !state.reachable {
                return Err(BrokerError::Unreachable("in-memory broker".into()));
            }
            state.committed.insert(
                (self.group_id.clone(), record.topic.clone(), record.partition),
                record.offset + 1,
            );
        }
        self.broker.record(BrokerCall::Commit {
            group_id: self.group_id.clone(),
            topic: record.topic.clone(),
            partition: record.partition,
            offset: record.offset,
        });
        Ok(())
    }

    fn close(&mut self) -> Result<(), BrokerError> {
        if !self.closed {
            self.closed = true;
            self.broker.record(BrokerCall::Close {
                group_id: self.group_id.clone(),
            });
        }
        Ok(())
    }
}
