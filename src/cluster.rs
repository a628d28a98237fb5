//! Cluster topology: brokers, partition leaders, and group coordinators.
//!
//! The cluster keeps a best-effort cache seeded from the bootstrap list
//! and refreshed reactively: any `NotLeaderForPartition` or
//! `UnknownTopicOrPartition` seen by a caller should invalidate the
//! relevant entry and re-resolve, which triggers a fresh metadata
//! request here.
//!
//! Metadata requests rotate over every known broker, falling back to the
//! seed list, until one answers. Concurrent cache misses are deduplicated
//! behind a single refresh lock so N callers produce one wire request.

use std::collections::HashMap;
use std::sync::Mutex as SyncMutex;

use backon::Retryable;

use crate::config::ClientConfig;
use crate::error::{Error, KafkaCode, Result};
use crate::network::{BrokerPool, PooledConnection};
use crate::protocol::request::{GroupCoordinatorRequest, ListOffsetsRequest, MetadataRequest};
use crate::protocol::response::{
    parse_group_coordinator_response, parse_list_offsets_response, parse_metadata_response,
    MetadataResponse,
};
use crate::protocol::ApiKey;
use crate::parser::parse_frame;
use crate::retry;
use crate::types::{Broker, BrokerAddr, OffsetPolicy, TopicPartition};

#[derive(Default)]
struct Topology {
    /// node_id -> broker
    brokers: HashMap<i32, Broker>,
    /// (topic, partition) -> leader node_id
    leaders: HashMap<TopicPartition, i32>,
    /// topic -> sorted partition ids
    partitions: HashMap<String, Vec<i32>>,
    /// group_id -> coordinator
    coordinators: HashMap<String, Broker>,
}

/// Shared view of the cluster: connection pool plus topology cache.
pub struct Cluster {
    config: ClientConfig,
    pool: BrokerPool,
    topology: SyncMutex<Topology>,
    /// Serialises metadata fetches so concurrent cache misses collapse
    /// into one wire request.
    refresh_lock: tokio::sync::Mutex<()>,
}

impl Cluster {
    pub fn new(config: ClientConfig) -> Result<Self> {
        config.validate()?;
        Ok(Cluster {
            pool: BrokerPool::new(config.clone()),
            config,
            topology: SyncMutex::new(Topology::default()),
            refresh_lock: tokio::sync::Mutex::new(()),
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// The pooled connection for a broker.
    pub fn connection_for(&self, broker: &Broker) -> PooledConnection {
        self.pool.get(&broker.addr())
    }

    /// Close every pooled connection and drop all cached topology.
    pub async fn disconnect(&self) {
        self.pool.disconnect_all().await;
        let mut topology = self.topology.lock().expect("topology lock poisoned");
        *topology = Topology::default();
    }

    // ========================================================================
    // Leaders & partitions
    // ========================================================================

    /// Resolve the current leader for a partition, refreshing metadata on
    /// a cache miss.
    ///
    /// Fails with `LeaderNotAvailable` when the cluster reports the
    /// partition leaderless (node `-1`), and `UnknownTopicOrPartition`
    /// when the topic or partition does not exist after a refresh.
    pub async fn get_leader(&self, topic: &str, partition: i32) -> Result<Broker> {
        if let Some(leader) = self.cached_leader(topic, partition) {
            return Ok(leader);
        }

        // Miss: either the topic is unknown or the leader entry was
        // invalidated. Refresh behind the lock, double-checking so N
        // concurrent misses produce one metadata request.
        {
            let _guard = self.refresh_lock.lock().await;
            if self.cached_leader(topic, partition).is_none() {
                self.fetch_metadata(&[topic.to_string()]).await?;
            }
        }

        let tp = TopicPartition::new(topic, partition);
        let topology = self.topology.lock().expect("topology lock poisoned");
        let Some(partitions) = topology.partitions.get(topic) else {
            return Err(Error::Kafka(KafkaCode::UnknownTopicOrPartition));
        };
        if !partitions.contains(&partition) {
            return Err(Error::Kafka(KafkaCode::UnknownTopicOrPartition));
        }
        let Some(node_id) = topology.leaders.get(&tp) else {
            return Err(Error::Kafka(KafkaCode::LeaderNotAvailable));
        };
        topology
            .brokers
            .get(node_id)
            .cloned()
            .ok_or(Error::Kafka(KafkaCode::LeaderNotAvailable))
    }

    fn cached_leader(&self, topic: &str, partition: i32) -> Option<Broker> {
        let topology = self.topology.lock().expect("topology lock poisoned");
        let node_id = topology
            .leaders
            .get(&TopicPartition::new(topic, partition))?;
        topology.brokers.get(node_id).cloned()
    }

    /// Drop the cached leader for one partition. The next `get_leader`
    /// fetches fresh metadata.
    pub fn invalidate_leader(&self, topic: &str, partition: i32) {
        let mut topology = self.topology.lock().expect("topology lock poisoned");
        topology
            .leaders
            .remove(&TopicPartition::new(topic, partition));
        tracing::debug!(topic, partition, "invalidated cached leader");
    }

    /// The partition ids of a topic, sorted ascending.
    pub async fn partitions_for(&self, topic: &str) -> Result<Vec<i32>> {
        self.ensure_topic_metadata(topic).await?;
        let topology = self.topology.lock().expect("topology lock poisoned");
        topology
            .partitions
            .get(topic)
            .cloned()
            .ok_or(Error::Kafka(KafkaCode::UnknownTopicOrPartition))
    }

    /// Topics currently present in the cache.
    pub fn topics(&self) -> Vec<String> {
        let topology = self.topology.lock().expect("topology lock poisoned");
        let mut topics: Vec<String> = topology.partitions.keys().cloned().collect();
        topics.sort();
        topics
    }

    /// Fetch metadata for a topic only if it is not already cached.
    async fn ensure_topic_metadata(&self, topic: &str) -> Result<()> {
        if self.topic_is_cached(topic) {
            return Ok(());
        }

        let _guard = self.refresh_lock.lock().await;
        // A concurrent caller may have refreshed while we waited.
        if self.topic_is_cached(topic) {
            return Ok(());
        }
        self.fetch_metadata(&[topic.to_string()]).await
    }

    fn topic_is_cached(&self, topic: &str) -> bool {
        let topology = self.topology.lock().expect("topology lock poisoned");
        topology.partitions.contains_key(topic)
    }

    /// Force a metadata refresh for the given topics (all topics when
    /// empty).
    pub async fn refresh_metadata(&self, topics: &[String]) -> Result<()> {
        let _guard = self.refresh_lock.lock().await;
        self.fetch_metadata(topics).await
    }

    async fn fetch_metadata(&self, topics: &[String]) -> Result<()> {
        let request = MetadataRequest::new(topics.to_vec());

        let response = (|| self.request_any_broker(ApiKey::Metadata, 0, &request))
            .retry(retry::metadata_policy(self.config.retry_budget))
            .when(|e: &Error| e.is_transport() || matches!(e, Error::NoBrokerAvailable))
            .notify(|err, dur| {
                tracing::warn!(error = %err, backoff = ?dur, "metadata request failed; retrying");
            })
            .await?;

        let metadata = parse_frame(response, parse_metadata_response)?;
        self.apply_metadata(metadata);
        Ok(())
    }

    fn apply_metadata(&self, metadata: MetadataResponse) {
        let mut topology = self.topology.lock().expect("topology lock poisoned");

        for broker in metadata.brokers {
            topology.brokers.insert(
                broker.node_id,
                Broker {
                    node_id: broker.node_id,
                    host: broker.host,
                    port: broker.port,
                },
            );
        }

        for topic in metadata.topics {
            if topic.error != KafkaCode::None && topic.error != KafkaCode::LeaderNotAvailable {
                tracing::warn!(topic = %topic.name, error = ?topic.error, "topic metadata error");
                continue;
            }

            let mut partition_ids = Vec::with_capacity(topic.partitions.len());
            for partition in topic.partitions {
                partition_ids.push(partition.partition);
                let tp = TopicPartition::new(topic.name.clone(), partition.partition);
                if partition.leader >= 0 {
                    topology.leaders.insert(tp, partition.leader);
                } else {
                    // Election in flight; leave the entry absent so the
                    // next lookup retries.
                    topology.leaders.remove(&tp);
                }
            }
            partition_ids.sort_unstable();
            topology.partitions.insert(topic.name, partition_ids);
        }

        tracing::debug!(
            brokers = topology.brokers.len(),
            topics = topology.partitions.len(),
            "applied cluster metadata"
        );
    }

    /// Issue a request to the first broker that answers, rotating over
    /// cached brokers and then the seed list.
    async fn request_any_broker<B: crate::encode::ToByte>(
        &self,
        api_key: ApiKey,
        api_version: i16,
        body: &B,
    ) -> Result<bytes::Bytes> {
        for addr in self.candidate_addrs() {
            let connection = self.pool.get(&addr);
            let mut connection = connection.lock().await;
            match connection.request(api_key, api_version, body).await {
                Ok(response) => return Ok(response),
                Err(e) => {
                    tracing::warn!(broker = %addr, error = %e, "broker did not answer");
                }
            }
        }
        Err(Error::NoBrokerAvailable)
    }

    fn candidate_addrs(&self) -> Vec<BrokerAddr> {
        let mut addrs: Vec<BrokerAddr> = {
            let topology = self.topology.lock().expect("topology lock poisoned");
            topology.brokers.values().map(Broker::addr).collect()
        };
        addrs.sort_by(|a, b| (&a.host, a.port).cmp(&(&b.host, b.port)));
        for seed in &self.config.seed_brokers {
            if !addrs.contains(seed) {
                addrs.push(seed.clone());
            }
        }
        addrs
    }

    // ========================================================================
    // Group coordinator
    // ========================================================================

    /// Locate the coordinator for a consumer group, caching the answer.
    pub async fn get_group_coordinator(&self, group_id: &str) -> Result<Broker> {
        if let Some(coordinator) = self.cached_coordinator(group_id) {
            return Ok(coordinator);
        }

        let request = GroupCoordinatorRequest {
            group_id: group_id.to_string(),
        };

        let coordinator = (|| async {
            let frame = self
                .request_any_broker(ApiKey::GroupCoordinator, 0, &request)
                .await?;
            let response = parse_frame(frame, parse_group_coordinator_response)?;
            if response.error != KafkaCode::None {
                return Err(Error::Kafka(response.error));
            }
            Ok(Broker {
                node_id: response.coordinator_id,
                host: response.coordinator_host,
                port: response.coordinator_port,
            })
        })
        .retry(retry::coordinator_policy(self.config.retry_budget))
        .when(|e: &Error| match e {
            Error::Kafka(code) => code.is_topology_error(),
            other => other.is_transport() || matches!(other, Error::NoBrokerAvailable),
        })
        .notify(|err, dur| {
            tracing::warn!(error = %err, backoff = ?dur, "coordinator lookup failed; retrying");
        })
        .await
        .map_err(|e| match e {
            Error::NoBrokerAvailable => Error::NoCoordinator(group_id.to_string()),
            other => other,
        })?;

        tracing::debug!(group_id, coordinator = %coordinator, "located group coordinator");

        let mut topology = self.topology.lock().expect("topology lock poisoned");
        topology
            .coordinators
            .insert(group_id.to_string(), coordinator.clone());
        Ok(coordinator)
    }

    fn cached_coordinator(&self, group_id: &str) -> Option<Broker> {
        let topology = self.topology.lock().expect("topology lock poisoned");
        topology.coordinators.get(group_id).cloned()
    }

    /// Drop the cached coordinator for a group, forcing a fresh lookup.
    pub fn invalidate_coordinator(&self, group_id: &str) {
        let mut topology = self.topology.lock().expect("topology lock poisoned");
        topology.coordinators.remove(group_id);
        tracing::debug!(group_id, "invalidated cached coordinator");
    }

    // ========================================================================
    // Offsets
    // ========================================================================

    /// Translate an offset policy into a concrete offset by asking the
    /// partition leader.
    pub async fn resolve_offset(
        &self,
        topic: &str,
        partition: i32,
        policy: OffsetPolicy,
    ) -> Result<i64> {
        let leader = self.get_leader(topic, partition).await?;
        let request = ListOffsetsRequest::single(topic, partition, policy.sentinel());

        let connection = self.connection_for(&leader);
        let frame = {
            let mut connection = connection.lock().await;
            connection.request(ApiKey::ListOffsets, 0, &request).await?
        };

        let response = parse_frame(frame, parse_list_offsets_response)?;
        let entry = response
            .topics
            .iter()
            .find(|t| t.name == topic)
            .and_then(|t| t.partitions.iter().find(|p| p.partition == partition))
            .ok_or(Error::Kafka(KafkaCode::UnknownTopicOrPartition))?;

        if entry.error != KafkaCode::None {
            if entry.error.is_topology_error() {
                self.invalidate_leader(topic, partition);
            }
            return Err(Error::Kafka(entry.error));
        }

        entry
            .offsets
            .first()
            .copied()
            .ok_or(Error::Kafka(KafkaCode::Unknown))
    }

    /// The high watermark of a partition: the offset one past the last
    /// fully replicated message.
    pub async fn fetch_watermark(&self, topic: &str, partition: i32) -> Result<i64> {
        self.resolve_offset(topic, partition, OffsetPolicy::Latest)
            .await
    }
}

impl std::fmt::Debug for Cluster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let topology = self.topology.lock().expect("topology lock poisoned");
        f.debug_struct("Cluster")
            .field("brokers", &topology.brokers.len())
            .field("topics", &topology.partitions.len())
            .field("coordinators", &topology.coordinators.len())
            .finish()
    }
}
