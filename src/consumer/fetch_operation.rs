//! One fetch round: bucket partitions by leader, fetch each broker in
//! parallel, decode and flatten the results.
//!
//! Results keep a stable order: buckets in dispatch order (first
//! appearance of each leader), partitions as requested within a bucket,
//! and messages by ascending offset within a partition. Callers rely on
//! per-partition offset order only.

use bytes::Bytes;
use futures::future::join_all;

use crate::cluster::Cluster;
use crate::config::FetchConfig;
use crate::error::{Error, KafkaCode, Result};
use crate::parser::parse_frame;
use crate::protocol::messages::decode_message_set;
use crate::protocol::request::{FetchPartition, FetchRequest, FetchTopic};
use crate::protocol::response::parse_fetch_response;
use crate::protocol::ApiKey;
use crate::types::Broker;

/// One message as delivered to the application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedMessage {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub key: Option<Bytes>,
    pub value: Option<Bytes>,
}

/// The outcome for one requested partition.
///
/// A non-`None` error means the messages were skipped server-side; the
/// caller decides whether to refresh metadata or surface it.
#[derive(Debug, Clone)]
pub struct PartitionBatch {
    pub topic: String,
    pub partition: i32,
    pub error: KafkaCode,
    /// Greatest offset visible to consumers at fetch time.
    pub high_watermark: i64,
    pub messages: Vec<FetchedMessage>,
}

#[derive(Debug, Clone)]
struct FetchTuple {
    topic: String,
    partition: i32,
    offset: i64,
}

/// A single fetch round over any number of partitions.
pub struct FetchOperation<'a> {
    cluster: &'a Cluster,
    config: &'a FetchConfig,
    tuples: Vec<FetchTuple>,
}

impl<'a> FetchOperation<'a> {
    pub fn new(cluster: &'a Cluster, config: &'a FetchConfig) -> Self {
        FetchOperation {
            cluster,
            config,
            tuples: Vec::new(),
        }
    }

    /// Add a partition to the round, reading from `offset`.
    pub fn fetch_from(&mut self, topic: &str, partition: i32, offset: i64) {
        self.tuples.push(FetchTuple {
            topic: topic.to_string(),
            partition,
            offset,
        });
    }

    pub fn is_empty(&self) -> bool {
        self.tuples.is_empty()
    }

    /// Execute the round: at most one wire request per involved broker,
    /// all issued concurrently.
    ///
    /// Transport failures and corrupt messages fail the whole round;
    /// per-partition protocol errors are reported in the returned
    /// batches, with stale-leader codes additionally invalidating the
    /// topology cache.
    pub async fn execute(mut self) -> Result<Vec<PartitionBatch>> {
        // Bucket tuples by leader, keeping dispatch order deterministic
        // (order of first appearance).
        let tuples = std::mem::take(&mut self.tuples);
        let mut buckets: Vec<(Broker, Vec<FetchTuple>)> = Vec::new();
        for tuple in tuples {
            let leader = self.cluster.get_leader(&tuple.topic, tuple.partition).await?;
            match buckets.iter_mut().find(|(b, _)| b.node_id == leader.node_id) {
                Some((_, bucket)) => bucket.push(tuple),
                None => buckets.push((leader, vec![tuple])),
            }
        }

        let futures = buckets
            .iter()
            .map(|(broker, tuples)| self.fetch_from_broker(broker, tuples));
        let results = join_all(futures).await;

        let mut batches = Vec::new();
        for result in results {
            batches.extend(result?);
        }
        Ok(batches)
    }

    async fn fetch_from_broker(
        &self,
        broker: &Broker,
        tuples: &[FetchTuple],
    ) -> Result<Vec<PartitionBatch>> {
        let request = self.build_request(tuples);

        tracing::trace!(
            broker = %broker,
            partitions = tuples.len(),
            "dispatching fetch"
        );

        let connection = self.cluster.connection_for(broker);
        let frame = {
            let mut connection = connection.lock().await;
            connection.request(ApiKey::Fetch, 0, &request).await?
        };
        let response = parse_frame(frame, parse_fetch_response)?;

        // Flatten in the order the tuples were requested.
        let mut batches = Vec::with_capacity(tuples.len());
        for tuple in tuples {
            let partition = response
                .topics
                .iter()
                .find(|t| t.name == tuple.topic)
                .and_then(|t| {
                    t.partitions
                        .iter()
                        .find(|p| p.partition == tuple.partition)
                })
                .ok_or(Error::Kafka(KafkaCode::UnknownTopicOrPartition))?;

            if partition.error != KafkaCode::None {
                if matches!(
                    partition.error,
                    KafkaCode::NotLeaderForPartition | KafkaCode::UnknownTopicOrPartition
                ) {
                    self.cluster.invalidate_leader(&tuple.topic, tuple.partition);
                }
                batches.push(PartitionBatch {
                    topic: tuple.topic.clone(),
                    partition: tuple.partition,
                    error: partition.error,
                    high_watermark: partition.high_watermark,
                    messages: Vec::new(),
                });
                continue;
            }

            let messages = decode_message_set(&partition.message_set)?
                .into_iter()
                // A byte-budgeted fetch can replay entries below the
                // requested offset; never hand those back.
                .filter(|m| m.offset >= tuple.offset)
                .map(|m| FetchedMessage {
                    topic: tuple.topic.clone(),
                    partition: tuple.partition,
                    offset: m.offset,
                    key: m.key,
                    value: m.value,
                })
                .collect();

            batches.push(PartitionBatch {
                topic: tuple.topic.clone(),
                partition: tuple.partition,
                error: KafkaCode::None,
                high_watermark: partition.high_watermark,
                messages,
            });
        }
        Ok(batches)
    }

    fn build_request(&self, tuples: &[FetchTuple]) -> FetchRequest {
        let mut topics: Vec<FetchTopic> = Vec::new();
        for tuple in tuples {
            let partition = FetchPartition {
                partition: tuple.partition,
                fetch_offset: tuple.offset,
                max_bytes: self.config.max_bytes,
            };
            match topics.iter_mut().find(|t| t.name == tuple.topic) {
                Some(topic) => topic.partitions.push(partition),
                None => topics.push(FetchTopic {
                    name: tuple.topic.clone(),
                    partitions: vec![partition],
                }),
            }
        }

        FetchRequest {
            max_wait_ms: self.config.max_wait_ms(),
            min_bytes: self.config.min_bytes,
            topics,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClientConfig;

    fn fixtures() -> (Cluster, FetchConfig) {
        let cluster = Cluster::new(ClientConfig::new(["localhost:9092"]).unwrap()).unwrap();
        (cluster, FetchConfig::default())
    }

    #[test]
    fn test_build_request_groups_partitions_by_topic() {
        let (cluster, config) = fixtures();
        let mut operation = FetchOperation::new(&cluster, &config);
        operation.fetch_from("a", 0, 10);
        operation.fetch_from("b", 0, 20);
        operation.fetch_from("a", 1, 30);

        let request = operation.build_request(&operation.tuples);
        assert_eq!(request.topics.len(), 2);
        let a = request.topics.iter().find(|t| t.name == "a").unwrap();
        assert_eq!(a.partitions.len(), 2);
        assert_eq!(a.partitions[0].fetch_offset, 10);
        assert_eq!(a.partitions[1].fetch_offset, 30);
    }

    #[test]
    fn test_request_carries_fetch_shape() {
        let (cluster, _) = fixtures();
        let config = FetchConfig::default()
            .with_min_bytes(1024)
            .with_max_bytes(4096)
            .with_max_wait_time(std::time::Duration::from_millis(250));
        let mut operation = FetchOperation::new(&cluster, &config);
        operation.fetch_from("t", 0, 0);

        let request = operation.build_request(&operation.tuples);
        assert_eq!(request.min_bytes, 1024);
        assert_eq!(request.max_wait_ms, 250);
        assert_eq!(request.topics[0].partitions[0].max_bytes, 4096);
    }

    #[test]
    fn test_empty_operation() {
        let (cluster, config) = fixtures();
        let operation = FetchOperation::new(&cluster, &config);
        assert!(operation.is_empty());
    }
}
