//! Shared domain types: offsets, brokers, topic/partition keys.

use std::fmt;

use crate::constants::{OFFSET_EARLIEST, OFFSET_LATEST};

/// A Kafka message offset within a partition.
///
/// Offsets are 64-bit signed integers. Kafka reserves negative values for
/// special semantics:
/// - `-1`: "latest offset" in ListOffsets requests, "no committed offset"
///   in offset storage.
/// - `-2`: "earliest available offset".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Offset(pub i64);

impl Offset {
    /// Special offset meaning "earliest available message".
    pub const EARLIEST: Self = Offset(OFFSET_EARLIEST);

    /// Special offset meaning "latest offset" (end of log).
    pub const LATEST: Self = Offset(OFFSET_LATEST);

    #[inline]
    pub const fn new(value: i64) -> Self {
        Offset(value)
    }

    #[inline]
    pub const fn value(self) -> i64 {
        self.0
    }

    /// Check if this is a valid (non-negative) offset.
    #[inline]
    pub const fn is_valid(self) -> bool {
        self.0 >= 0
    }
}

impl From<i64> for Offset {
    fn from(value: i64) -> Self {
        Offset(value)
    }
}

impl From<Offset> for i64 {
    fn from(offset: Offset) -> Self {
        offset.0
    }
}

impl fmt::Display for Offset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Where to start reading a partition that has no committed offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OffsetPolicy {
    /// Start from the beginning of the log.
    #[default]
    Earliest,
    /// Start from the end of the log; only new messages are seen.
    Latest,
}

impl OffsetPolicy {
    /// The wire sentinel the broker interprets during fetch and
    /// list-offsets requests.
    pub const fn sentinel(self) -> i64 {
        match self {
            OffsetPolicy::Earliest => OFFSET_EARLIEST,
            OffsetPolicy::Latest => OFFSET_LATEST,
        }
    }
}

/// One Kafka broker as reported by cluster metadata.
///
/// Identity is the cluster-assigned `node_id`; host and port may change
/// across metadata refreshes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Broker {
    pub node_id: i32,
    pub host: String,
    pub port: i32,
}

impl Broker {
    pub fn addr(&self) -> BrokerAddr {
        BrokerAddr {
            host: self.host.clone(),
            port: self.port,
        }
    }
}

impl fmt::Display for Broker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{} (node {})", self.host, self.port, self.node_id)
    }
}

/// A broker network address, the key connections are pooled under.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BrokerAddr {
    pub host: String,
    pub port: i32,
}

impl BrokerAddr {
    pub fn new(host: impl Into<String>, port: i32) -> Self {
        BrokerAddr {
            host: host.into(),
            port,
        }
    }

    /// Parse a `host:port` seed string.
    pub fn parse(s: &str) -> Option<Self> {
        let (host, port) = s.rsplit_once(':')?;
        if host.is_empty() {
            return None;
        }
        let port = port.parse::<i32>().ok()?;
        Some(BrokerAddr::new(host, port))
    }
}

impl fmt::Display for BrokerAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// A `(topic, partition)` pair, the unit of assignment and offset
/// bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TopicPartition {
    pub topic: String,
    pub partition: i32,
}

impl TopicPartition {
    pub fn new(topic: impl Into<String>, partition: i32) -> Self {
        TopicPartition {
            topic: topic.into(),
            partition,
        }
    }
}

impl fmt::Display for TopicPartition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.topic, self.partition)
    }
}
