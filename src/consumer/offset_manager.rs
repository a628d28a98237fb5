//! Offset bookkeeping and commits.
//!
//! Per owned partition the manager tracks:
//!
//! - `committed`: the last offset known durable in the group's offset
//!   store (the coordinator's `__consumer_offsets`).
//! - `processed`: the last offset whose payload the caller finished
//!   handling.
//!
//! The next fetch offset is derived (`processed + 1`), falling back to
//! the coordinator's committed offset and finally to the subscription's
//! default policy resolved through ListOffsets. Commits send only dirty
//! partitions (`processed > committed`) and carry the current
//! `(generation_id, member_id)` so evicted members are fenced.

use std::collections::HashMap;

use tokio::time::Instant;

use crate::cluster::Cluster;
use crate::constants::OFFSET_UNKNOWN;
use crate::error::{Error, KafkaCode, Result};
use crate::parser::parse_frame;
use crate::protocol::request::{
    OffsetCommitPartition, OffsetCommitRequest, OffsetCommitTopic, OffsetFetchRequest,
};
use crate::protocol::response::{parse_offset_commit_response, parse_offset_fetch_response};
use crate::protocol::ApiKey;
use crate::types::{OffsetPolicy, TopicPartition};

use super::group::ConsumerGroup;

/// Next-offset and commit bookkeeping for the partitions this consumer
/// owns.
pub struct OffsetManager {
    /// Per-topic policy used when a partition has no committed offset.
    default_offsets: HashMap<String, OffsetPolicy>,
    processed: HashMap<TopicPartition, i64>,
    committed: HashMap<TopicPartition, i64>,
    /// Default-policy resolutions, pinned so an idle `:latest` partition
    /// does not chase the log end between fetches.
    resolved: HashMap<TopicPartition, i64>,
    commit_interval: std::time::Duration,
    last_commit: Option<Instant>,
}

impl OffsetManager {
    pub fn new(commit_interval: std::time::Duration) -> Self {
        OffsetManager {
            default_offsets: HashMap::new(),
            processed: HashMap::new(),
            committed: HashMap::new(),
            resolved: HashMap::new(),
            commit_interval,
            last_commit: None,
        }
    }

    /// Record the default offset policy for a topic.
    pub fn set_default_offset(&mut self, topic: &str, policy: OffsetPolicy) {
        self.default_offsets.insert(topic.to_string(), policy);
    }

    pub fn default_offset_for(&self, topic: &str) -> OffsetPolicy {
        self.default_offsets.get(topic).copied().unwrap_or_default()
    }

    /// Mark an offset as fully handled by the caller. Replays of the
    /// same offset are harmless.
    pub fn mark_as_processed(&mut self, topic: &str, partition: i32, offset: i64) {
        self.processed
            .insert(TopicPartition::new(topic, partition), offset);
    }

    pub fn last_processed(&self, topic: &str, partition: i32) -> Option<i64> {
        self.processed
            .get(&TopicPartition::new(topic, partition))
            .copied()
    }

    /// Position the next fetch explicitly, bypassing committed state.
    /// Used by the opt-in `OffsetOutOfRange` auto-reset.
    pub fn seek(&mut self, topic: &str, partition: i32, next_offset: i64) {
        self.processed
            .insert(TopicPartition::new(topic, partition), next_offset - 1);
    }

    /// The offset the next fetch for this partition should start at.
    ///
    /// Resolution order: locally processed state, then the coordinator's
    /// committed offset, then the topic's default policy translated to a
    /// concrete offset by the partition leader.
    pub async fn next_offset_for(
        &mut self,
        group: &ConsumerGroup,
        cluster: &Cluster,
        topic: &str,
        partition: i32,
    ) -> Result<i64> {
        let tp = TopicPartition::new(topic, partition);

        if let Some(processed) = self.processed.get(&tp) {
            return Ok(processed + 1);
        }
        if let Some(committed) = self.committed.get(&tp) {
            return Ok(committed + 1);
        }
        if let Some(resolved) = self.resolved.get(&tp) {
            return Ok(*resolved);
        }

        let committed = self.fetch_committed_offset(group, topic, partition).await?;
        if committed != OFFSET_UNKNOWN {
            self.committed.insert(tp, committed);
            return Ok(committed + 1);
        }

        // Nothing committed for this group: resolve the default policy
        // against the log itself, once. The pinned value holds until a
        // message is actually processed.
        let policy = self.default_offset_for(topic);
        let offset = cluster.resolve_offset(topic, partition, policy).await?;
        tracing::debug!(
            topic,
            partition,
            ?policy,
            offset,
            "no committed offset; starting from default"
        );
        self.resolved.insert(tp, offset);
        Ok(offset)
    }

    async fn fetch_committed_offset(
        &self,
        group: &ConsumerGroup,
        topic: &str,
        partition: i32,
    ) -> Result<i64> {
        let request = OffsetFetchRequest::single(group.group_id(), topic, partition);
        let frame = group
            .coordinator_request(ApiKey::OffsetFetch, 1, &request)
            .await?;
        let response = parse_frame(frame, parse_offset_fetch_response)?;

        let entry = response
            .topics
            .iter()
            .find(|t| t.name == topic)
            .and_then(|t| t.partitions.iter().find(|p| p.partition == partition))
            .ok_or(Error::Kafka(KafkaCode::UnknownTopicOrPartition))?;

        if entry.error != KafkaCode::None {
            return Err(Error::Kafka(entry.error));
        }
        Ok(entry.offset)
    }

    // ========================================================================
    // Commits
    // ========================================================================

    /// Commit every partition whose processed offset is ahead of its
    /// committed offset. Sends nothing when there is nothing to commit.
    ///
    /// Returns the number of partitions committed. A rebalance-class
    /// rejection surfaces as an error so the consumer re-joins.
    pub async fn commit_offsets(&mut self, group: &ConsumerGroup) -> Result<usize> {
        let dirty = self.dirty_offsets();
        if dirty.is_empty() {
            return Ok(0);
        }

        let mut topics: HashMap<String, Vec<OffsetCommitPartition>> = HashMap::new();
        for (tp, offset) in &dirty {
            topics
                .entry(tp.topic.clone())
                .or_default()
                .push(OffsetCommitPartition {
                    partition: tp.partition,
                    offset: *offset,
                    metadata: None,
                });
        }

        let request = OffsetCommitRequest {
            group_id: group.group_id().to_string(),
            generation_id: group.generation_id(),
            member_id: group.member_id().to_string(),
            topics: topics
                .into_iter()
                .map(|(name, partitions)| OffsetCommitTopic { name, partitions })
                .collect(),
        };

        let frame = group
            .coordinator_request(ApiKey::OffsetCommit, 2, &request)
            .await?;
        let response = parse_frame(frame, parse_offset_commit_response)?;

        for topic in &response.topics {
            for partition in &topic.partitions {
                if partition.error != KafkaCode::None {
                    tracing::warn!(
                        topic = %topic.name,
                        partition = partition.partition,
                        error = ?partition.error,
                        "offset commit rejected"
                    );
                    return Err(Error::Kafka(partition.error));
                }
            }
        }

        for (tp, offset) in &dirty {
            self.committed.insert(tp.clone(), *offset);
        }
        self.last_commit = Some(Instant::now());

        tracing::debug!(partitions = dirty.len(), "committed offsets");
        Ok(dirty.len())
    }

    /// Commit, rate-limited to once per commit interval.
    pub async fn commit_offsets_if_necessary(&mut self, group: &ConsumerGroup) -> Result<usize> {
        let due = match self.last_commit {
            Some(at) => at.elapsed() >= self.commit_interval,
            None => true,
        };
        if !due {
            return Ok(0);
        }
        self.commit_offsets(group).await
    }

    fn dirty_offsets(&self) -> Vec<(TopicPartition, i64)> {
        let mut dirty: Vec<(TopicPartition, i64)> = self
            .processed
            .iter()
            .filter(|(tp, processed)| match self.committed.get(tp) {
                Some(committed) => *processed > committed,
                None => true,
            })
            .map(|(tp, processed)| (tp.clone(), *processed))
            .collect();
        dirty.sort();
        dirty
    }

    /// Drop bookkeeping for partitions outside the new assignment.
    /// Called on every rebalance.
    pub fn clear_offsets_excluding(&mut self, assigned: &HashMap<String, Vec<i32>>) {
        let keep = |tp: &TopicPartition| {
            assigned
                .get(&tp.topic)
                .is_some_and(|partitions| partitions.contains(&tp.partition))
        };
        self.processed.retain(|tp, _| keep(tp));
        self.committed.retain(|tp, _| keep(tp));
        self.resolved.retain(|tp, _| keep(tp));
    }

    #[cfg(test)]
    fn committed_offset(&self, topic: &str, partition: i32) -> Option<i64> {
        self.committed
            .get(&TopicPartition::new(topic, partition))
            .copied()
    }
}
