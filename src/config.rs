//! Configuration - broker endpoints, client identities, and the static config file.
//!
//! Resolution follows a fixed precedence: call argument, then static
//! configuration, then (for identities only) a built-in default. Hosts have no
//! default; a missing endpoint is always a configuration error raised before
//! any connection is opened.
//!
//! ## Config file
//!
//! ```yaml
//! hosts: "broker-1:9092,broker-2:9092"
//! client_id: my-producer
//! subscriber:
//!   hosts: ["broker-1:9092"]
//!   topics: [orders, payments]
//!   group_id: my-group
//! ```

use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Client id used by the publisher when none is configured.
pub const DEFAULT_PRODUCER_CLIENT_ID: &str = "st2-kafka-producer";
/// Consumer group used by the subscriber when none is configured.
pub const DEFAULT_GROUP_ID: &str = "st2gcpgroup";
/// Client id used by the subscriber when none is configured.
pub const DEFAULT_CONSUMER_CLIENT_ID: &str = "st2gcpclient";

/// Error loading or parsing a configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Parse(#[from] serde_yaml::Error),
}

/// Broker hosts as written in configuration: a comma-separated string or a list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Hosts {
    List(Vec<String>),
    Csv(String),
}

impl Hosts {
    /// Normalize into an endpoint. Returns `None` when no usable host is listed.
    pub fn to_endpoint(&self) -> Option<BrokerEndpoint> {
        match self {
            Hosts::List(hosts) => BrokerEndpoint::from_hosts(hosts),
            Hosts::Csv(csv) => BrokerEndpoint::parse(csv),
        }
    }
}

impl From<&str> for Hosts {
    fn from(csv: &str) -> Self {
        Hosts::Csv(csv.to_string())
    }
}

/// An ordered, non-empty set of `host:port` strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BrokerEndpoint {
    hosts: Vec<String>,
}

impl BrokerEndpoint {
    /// Parse a comma-separated host list.
    pub fn parse(csv: &str) -> Option<Self> {
        Self::from_hosts(csv.split(','))
    }

    /// Build from individual host entries. Entries are trimmed, blanks are
    /// dropped and duplicates keep their first position.
    pub fn from_hosts<I, S>(hosts: I) -> Option<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut seen = BTreeSet::new();
        let hosts: Vec<String> = hosts
            .into_iter()
            .map(|h| h.as_ref().trim().to_string())
            .filter(|h| !h.is_empty() && seen.insert(h.clone()))
            .collect();

        if hosts.is_empty() {
            None
        } else {
            Some(Self { hosts })
        }
    }

    pub fn hosts(&self) -> &[String] {
        &self.hosts
    }

    /// The `bootstrap.servers` form of this endpoint.
    pub fn bootstrap_servers(&self) -> String {
        self.hosts.join(",")
    }
}

impl fmt::Display for BrokerEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.bootstrap_servers())
    }
}

/// Resolve broker hosts: the call argument wins, then the configured value.
///
/// Blank values on either side count as absent.
pub fn resolve_hosts(argument: Option<&str>, configured: Option<&Hosts>) -> Option<BrokerEndpoint> {
    argument
        .and_then(BrokerEndpoint::parse)
        .or_else(|| configured.and_then(Hosts::to_endpoint))
}

/// Pick the configured value unless it is missing or blank.
pub fn resolve_or_default(configured: Option<&str>, default: &str) -> String {
    match configured.map(str::trim) {
        Some(value) if !value.is_empty() => value.to_string(),
        _ => default.to_string(),
    }
}

/// Identity a client presents to the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIdentity {
    pub client_id: String,
    /// Consumer group; only set for subscribers.
    pub group_id: Option<String>,
}

impl ClientIdentity {
    pub fn producer(client_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            group_id: None,
        }
    }

    pub fn consumer(client_id: impl Into<String>, group_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            group_id: Some(group_id.into()),
        }
    }
}

/// Where a consumer group starts reading when it has no committed offset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OffsetReset {
    Earliest,
    #[default]
    Latest,
}

impl OffsetReset {
    pub fn as_str(&self) -> &'static str {
        match self {
            OffsetReset::Earliest => "earliest",
            OffsetReset::Latest => "latest",
        }
    }
}

/// Static subscriber settings.
///
/// Everything is optional at the serde level so that missing hosts or topics
/// surface as a typed configuration error from `Subscriber::new` rather than
/// as a parse failure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriberConfig {
    #[serde(default)]
    pub hosts: Option<Hosts>,
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default)]
    pub group_id: Option<String>,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub offset_reset: OffsetReset,
    #[serde(default)]
    pub poll_timeout_ms: Option<u64>,
    #[serde(default)]
    pub metadata_timeout_ms: Option<u64>,
}

impl SubscriberConfig {
    pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_millis(500);
    pub const DEFAULT_METADATA_TIMEOUT: Duration = Duration::from_secs(10);

    pub fn new<I, S>(hosts: impl Into<Hosts>, topics: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            hosts: Some(hosts.into()),
            topics: topics.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    pub fn with_group_id(mut self, group_id: impl Into<String>) -> Self {
        self.group_id = Some(group_id.into());
        self
    }

    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    pub fn with_offset_reset(mut self, reset: OffsetReset) -> Self {
        self.offset_reset = reset;
        self
    }

    pub fn with_poll_timeout(mut self, timeout: Duration) -> Self {
        self.poll_timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    pub fn with_metadata_timeout(mut self, timeout: Duration) -> Self {
        self.metadata_timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    pub fn poll_timeout(&self) -> Duration {
        self.poll_timeout_ms
            .map(Duration::from_millis)
            .unwrap_or(Self::DEFAULT_POLL_TIMEOUT)
    }

    pub fn metadata_timeout(&self) -> Duration {
        self.metadata_timeout_ms
            .map(Duration::from_millis)
            .unwrap_or(Self::DEFAULT_METADATA_TIMEOUT)
    }
}

/// The whole static configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Publisher fallback hosts.
    #[serde(default)]
    pub hosts: Option<Hosts>,
    /// Publisher client id.
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub subscriber: Option<SubscriberConfig>,
}

impl BridgeConfig {
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&raw)
    }
}
