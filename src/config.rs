//! Client, group, and fetch configuration.
//!
//! Configuration is split by concern: [`ClientConfig`] covers everything a
//! bare cluster client needs (seeds, identity, timeouts), [`GroupConfig`]
//! the consumer-group membership knobs, and [`FetchConfig`] the shape of
//! fetch requests. Each carries validated defaults; `validate()` rejects
//! configurations that would only fail later and further from the cause.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;

use crate::constants::{
    DEFAULT_CLIENT_ID, DEFAULT_CONNECT_TIMEOUT_SECS, DEFAULT_FETCH_MAX_BYTES,
    DEFAULT_FETCH_MAX_WAIT_MS, DEFAULT_FETCH_MIN_BYTES, DEFAULT_HEARTBEAT_GRACE_SECS,
    DEFAULT_MAX_MESSAGE_SIZE, DEFAULT_OFFSET_COMMIT_INTERVAL_SECS, DEFAULT_RETRY_BUDGET,
    DEFAULT_SESSION_TIMEOUT_SECS, DEFAULT_SOCKET_TIMEOUT_SECS,
};
use crate::error::{Error, Result};
use crate::types::{BrokerAddr, OffsetPolicy};

/// Hook that upgrades a freshly dialed socket before any protocol traffic.
///
/// SSL and SASL handshakes live behind this seam; the client itself only
/// ever sees an authenticated stream. The default is [`NoAuth`].
#[async_trait]
pub trait Authenticate: Send + Sync {
    async fn authenticate(&self, stream: &mut TcpStream) -> Result<()>;
}

/// Default authenticator: plaintext, nothing to do.
pub struct NoAuth;

#[async_trait]
impl Authenticate for NoAuth {
    async fn authenticate(&self, _stream: &mut TcpStream) -> Result<()> {
        Ok(())
    }
}

/// Connection-level configuration shared by every broker session.
#[derive(Clone)]
pub struct ClientConfig {
    /// Bootstrap list of `host:port` brokers used to seed metadata.
    pub seed_brokers: Vec<BrokerAddr>,
    /// Identifier sent in every request envelope.
    pub client_id: String,
    /// Bound on establishing a TCP session.
    pub connect_timeout: Duration,
    /// Bound on each socket read/write.
    pub socket_timeout: Duration,
    /// Upper bound accepted for a single response frame.
    pub max_message_size: usize,
    /// Ceiling on consecutive transport/topology retries before giving up.
    pub retry_budget: usize,
    /// Transport security hook, run once per dialed connection.
    pub authenticator: Arc<dyn Authenticate>,
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("seed_brokers", &self.seed_brokers)
            .field("client_id", &self.client_id)
            .field("connect_timeout", &self.connect_timeout)
            .field("socket_timeout", &self.socket_timeout)
            .field("max_message_size", &self.max_message_size)
            .field("retry_budget", &self.retry_budget)
            .finish_non_exhaustive()
    }
}

impl ClientConfig {
    /// Build a configuration from `host:port` seed strings.
    pub fn new<S: AsRef<str>>(seeds: impl IntoIterator<Item = S>) -> Result<Self> {
        let mut seed_brokers = Vec::new();
        for seed in seeds {
            let seed = seed.as_ref();
            let addr = BrokerAddr::parse(seed)
                .ok_or_else(|| Error::Config(format!("invalid seed broker {seed:?}")))?;
            seed_brokers.push(addr);
        }
        let config = ClientConfig {
            seed_brokers,
            client_id: DEFAULT_CLIENT_ID.to_string(),
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            socket_timeout: Duration::from_secs(DEFAULT_SOCKET_TIMEOUT_SECS),
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            retry_budget: DEFAULT_RETRY_BUDGET,
            authenticator: Arc::new(NoAuth),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = client_id.into();
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_socket_timeout(mut self, timeout: Duration) -> Self {
        self.socket_timeout = timeout;
        self
    }

    pub fn with_retry_budget(mut self, budget: usize) -> Self {
        self.retry_budget = budget;
        self
    }

    pub fn with_authenticator(mut self, authenticator: Arc<dyn Authenticate>) -> Self {
        self.authenticator = authenticator;
        self
    }

    /// Reject configurations that cannot work.
    pub fn validate(&self) -> Result<()> {
        if self.seed_brokers.is_empty() {
            return Err(Error::Config("seed_brokers must not be empty".into()));
        }
        if self.connect_timeout.is_zero() || self.socket_timeout.is_zero() {
            return Err(Error::Config("timeouts must be non-zero".into()));
        }
        if self.max_message_size == 0 {
            return Err(Error::Config("max_message_size must be non-zero".into()));
        }
        Ok(())
    }
}

/// Consumer-group membership configuration.
#[derive(Debug, Clone)]
pub struct GroupConfig {
    /// Consumer group name.
    pub group_id: String,
    /// Heartbeat deadline enforced by the coordinator.
    pub session_timeout: Duration,
    /// Headroom before the session deadline at which a heartbeat is
    /// considered due.
    pub heartbeat_grace: Duration,
    /// Minimum interval between automatic offset commits.
    pub offset_commit_interval: Duration,
}

impl GroupConfig {
    pub fn new(group_id: impl Into<String>) -> Self {
        GroupConfig {
            group_id: group_id.into(),
            session_timeout: Duration::from_secs(DEFAULT_SESSION_TIMEOUT_SECS),
            heartbeat_grace: Duration::from_secs(DEFAULT_HEARTBEAT_GRACE_SECS),
            offset_commit_interval: Duration::from_secs(DEFAULT_OFFSET_COMMIT_INTERVAL_SECS),
        }
    }

    pub fn with_session_timeout(mut self, timeout: Duration) -> Self {
        self.session_timeout = timeout;
        self
    }

    pub fn with_offset_commit_interval(mut self, interval: Duration) -> Self {
        self.offset_commit_interval = interval;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.group_id.is_empty() {
            return Err(Error::Config("group_id must not be empty".into()));
        }
        if self.session_timeout.is_zero() {
            return Err(Error::Config("session_timeout must be non-zero".into()));
        }
        if self.heartbeat_grace >= self.session_timeout {
            return Err(Error::Config(
                "heartbeat_grace must be shorter than session_timeout".into(),
            ));
        }
        Ok(())
    }

    /// Session timeout in milliseconds as the wire protocol carries it.
    pub fn session_timeout_ms(&self) -> i32 {
        self.session_timeout.as_millis() as i32
    }
}

/// Shape of fetch requests.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Minimum bytes the broker accumulates before answering.
    pub min_bytes: i32,
    /// Per-partition byte budget.
    pub max_bytes: i32,
    /// Longest the broker may block waiting for `min_bytes`.
    pub max_wait_time: Duration,
    /// Opt-in automatic reset when a fetch offset falls outside the log.
    /// `None` surfaces `OffsetOutOfRange` to the caller unchanged.
    pub auto_reset: Option<OffsetPolicy>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        FetchConfig {
            min_bytes: DEFAULT_FETCH_MIN_BYTES,
            max_bytes: DEFAULT_FETCH_MAX_BYTES,
            max_wait_time: Duration::from_millis(DEFAULT_FETCH_MAX_WAIT_MS as u64),
            auto_reset: None,
        }
    }
}

impl FetchConfig {
    pub fn with_min_bytes(mut self, min_bytes: i32) -> Self {
        self.min_bytes = min_bytes;
        self
    }

    pub fn with_max_bytes(mut self, max_bytes: i32) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    pub fn with_max_wait_time(mut self, max_wait: Duration) -> Self {
        self.max_wait_time = max_wait;
        self
    }

    pub fn with_auto_reset(mut self, policy: OffsetPolicy) -> Self {
        self.auto_reset = Some(policy);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.min_bytes < 0 {
            return Err(Error::Config("min_bytes must not be negative".into()));
        }
        if self.max_bytes <= 0 {
            return Err(Error::Config("max_bytes must be positive".into()));
        }
        Ok(())
    }

    pub fn max_wait_ms(&self) -> i32 {
        self.max_wait_time.as_millis() as i32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_config_defaults() {
        let config = ClientConfig::new(["localhost:9092"]).unwrap();
        assert_eq!(config.client_id, DEFAULT_CLIENT_ID);
        assert_eq!(config.seed_brokers.len(), 1);
        assert_eq!(config.seed_brokers[0].port, 9092);
    }

    #[test]
    fn test_client_config_rejects_empty_seeds() {
        let seeds: [&str; 0] = [];
        assert!(ClientConfig::new(seeds).is_err());
    }

    #[test]
    fn test_client_config_rejects_bad_seed() {
        assert!(ClientConfig::new(["nonsense"]).is_err());
    }

    #[test]
    fn test_group_config_grace_must_fit() {
        let config = GroupConfig::new("g")
            .with_session_timeout(Duration::from_secs(1));
        // Default grace of 2s exceeds the 1s session timeout.
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_group_config_defaults_valid() {
        assert!(GroupConfig::new("g").validate().is_ok());
        assert_eq!(GroupConfig::new("g").session_timeout_ms(), 30_000);
    }

    #[test]
    fn test_fetch_config_validation() {
        assert!(FetchConfig::default().validate().is_ok());
        assert!(FetchConfig::default().with_max_bytes(0).validate().is_err());
        assert!(FetchConfig::default().with_min_bytes(-1).validate().is_err());
    }
}
