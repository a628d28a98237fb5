//! The consumer: subscription, group membership, and the
//! fetch/process/commit/heartbeat loop.
//!
//! The consumer is single-threaded and cooperative: one task drives it
//! and owns all group and offset state, so none of it is locked. The
//! only internal parallelism is the per-broker fan-out inside a fetch
//! round. Applications wanting parallelism run one consumer per task
//! under the same `group_id` and let the group protocol split the
//! partitions.

pub mod assignor;
pub mod fetch_operation;
pub mod group;
pub mod offset_manager;

pub use fetch_operation::{FetchOperation, FetchedMessage, PartitionBatch};
pub use group::{ConsumerGroup, GroupState};
pub use offset_manager::OffsetManager;

use std::sync::Arc;

use tokio::sync::watch;

use crate::cluster::Cluster;
use crate::config::{FetchConfig, GroupConfig};
use crate::error::{Error, KafkaCode, Result};
use crate::instrumentation::{Event, Instrumentation, NoopInstrumentation};
use crate::types::{OffsetPolicy, TopicPartition};

/// Cooperative stop signal for [`Consumer::each_message`].
///
/// Cheap to clone and safe to trigger from any task or signal handler;
/// the consumer notices it between messages and between fetches.
#[derive(Clone)]
pub struct StopHandle(Arc<watch::Sender<bool>>);

impl StopHandle {
    pub fn stop(&self) {
        let _ = self.0.send(true);
    }
}

/// A consumer-group member: orchestrates joining, fetching, offset
/// bookkeeping, and heartbeats.
pub struct Consumer {
    cluster: Arc<Cluster>,
    group: ConsumerGroup,
    offsets: OffsetManager,
    fetch_config: FetchConfig,
    instrumentation: Arc<dyn Instrumentation>,
    stop_tx: Arc<watch::Sender<bool>>,
    stop_rx: watch::Receiver<bool>,
}

impl Consumer {
    pub fn new(
        cluster: Arc<Cluster>,
        group_config: GroupConfig,
        fetch_config: FetchConfig,
    ) -> Result<Self> {
        fetch_config.validate()?;
        let offsets = OffsetManager::new(group_config.offset_commit_interval);
        let group = ConsumerGroup::new(cluster.clone(), group_config)?;
        let (stop_tx, stop_rx) = watch::channel(false);

        Ok(Consumer {
            cluster,
            group,
            offsets,
            fetch_config,
            instrumentation: Arc::new(NoopInstrumentation),
            stop_tx: Arc::new(stop_tx),
            stop_rx,
        })
    }

    /// Replace the no-op instrumentation sink.
    pub fn with_instrumentation(mut self, sink: Arc<dyn Instrumentation>) -> Self {
        self.instrumentation = sink;
        self
    }

    /// Subscribe to a topic, recording where to start when the group has
    /// no committed offset for a partition.
    pub fn subscribe(&mut self, topic: &str, default_offset: OffsetPolicy) {
        self.group.subscribe(topic);
        self.offsets.set_default_offset(topic, default_offset);
    }

    /// A handle that stops [`Self::each_message`] from outside.
    pub fn stop_handle(&self) -> StopHandle {
        StopHandle(self.stop_tx.clone())
    }

    fn stopped(&self) -> bool {
        *self.stop_rx.borrow()
    }

    /// The partitions assigned to this member for the current
    /// generation.
    pub fn assigned_partitions(&self) -> &std::collections::HashMap<String, Vec<i32>> {
        self.group.assigned_partitions()
    }

    /// Join the group if this member is not currently in one.
    async fn ensure_member(&mut self) -> Result<()> {
        if self.group.is_member() {
            return Ok(());
        }

        self.group.join().await?;
        // Drop bookkeeping for partitions that moved elsewhere.
        self.offsets
            .clear_offsets_excluding(self.group.assigned_partitions());

        self.instrumentation.on_event(Event::JoinedGroup {
            group_id: self.group.group_id(),
            generation_id: self.group.generation_id(),
            member_id: self.group.member_id(),
            is_leader: self.group.is_leader(),
        });
        Ok(())
    }

    /// Fetch one batch across every assigned partition.
    ///
    /// Joins the group first when necessary and heartbeats when due.
    /// Messages are returned in per-partition offset order; marking them
    /// processed is the caller's job (or use [`Self::each_message`]).
    pub async fn fetch_batch(&mut self) -> Result<Vec<FetchedMessage>> {
        self.ensure_member().await?;

        if let Some(result) = self.group.heartbeat_if_due().await? {
            self.instrumentation.on_event(Event::Heartbeat {
                group_id: self.group.group_id(),
                result,
            });
        }

        let mut operation = FetchOperation::new(&self.cluster, &self.fetch_config);
        let mut assigned: Vec<(&String, &Vec<i32>)> =
            self.group.assigned_partitions().iter().collect();
        assigned.sort();

        // Resolve offsets before the operation borrows start.
        let mut tuples = Vec::new();
        for (topic, partitions) in assigned {
            for partition in partitions {
                tuples.push((topic.clone(), *partition));
            }
        }
        for (topic, partition) in &tuples {
            let offset = self
                .offsets
                .next_offset_for(&self.group, &self.cluster, topic, *partition)
                .await?;
            operation.fetch_from(topic, *partition, offset);
        }

        if operation.is_empty() {
            return Ok(Vec::new());
        }

        let batches = operation.execute().await?;
        let mut messages = Vec::new();
        for batch in batches {
            match batch.error {
                KafkaCode::None => messages.extend(batch.messages),
                code if code.is_topology_error() => {
                    // The fetch already invalidated the leader; the next
                    // round re-resolves it from fresh metadata.
                    tracing::warn!(
                        topic = %batch.topic,
                        partition = batch.partition,
                        error = ?code,
                        "stale topology on fetch; skipping partition this round"
                    );
                }
                KafkaCode::OffsetOutOfRange => {
                    self.handle_offset_out_of_range(&batch).await?;
                }
                code => return Err(Error::Kafka(code)),
            }
        }

        self.instrumentation.on_event(Event::FetchBatch {
            message_count: messages.len(),
        });
        Ok(messages)
    }

    /// Apply the opt-in auto-reset, or surface the error unchanged.
    async fn handle_offset_out_of_range(&mut self, batch: &PartitionBatch) -> Result<()> {
        let Some(policy) = self.fetch_config.auto_reset else {
            return Err(Error::Kafka(KafkaCode::OffsetOutOfRange));
        };
        let offset = self
            .cluster
            .resolve_offset(&batch.topic, batch.partition, policy)
            .await?;
        tracing::warn!(
            topic = %batch.topic,
            partition = batch.partition,
            ?policy,
            offset,
            "offset out of range; auto-resetting"
        );
        self.offsets.seek(&batch.topic, batch.partition, offset);
        Ok(())
    }

    /// Record that the application finished handling a message.
    pub fn mark_as_processed(&mut self, message: &FetchedMessage) {
        self.offsets
            .mark_as_processed(&message.topic, message.partition, message.offset);
    }

    /// Commit processed offsets now, regardless of the commit interval.
    pub async fn commit_offsets(&mut self) -> Result<()> {
        let committed = self.offsets.commit_offsets(&self.group).await?;
        if committed > 0 {
            self.instrumentation.on_event(Event::OffsetsCommitted {
                partition_count: committed,
            });
        }
        Ok(())
    }

    /// Run the fetch/process/commit/heartbeat loop until stopped.
    ///
    /// For every message, in order: the handler runs, a heartbeat is
    /// sent if due, and only then is the message marked processed. A
    /// crash replays at most the messages since the last commit.
    /// Handler errors are fatal and propagate out unchanged.
    pub async fn each_message<F>(&mut self, mut handler: F) -> Result<()>
    where
        F: FnMut(&FetchedMessage) -> Result<()>,
    {
        while !self.stopped() {
            match self.fetch_batch().await {
                Ok(messages) => {
                    let mut rebalanced = false;
                    for message in &messages {
                        if self.stopped() {
                            break;
                        }
                        handler(message)?;

                        match self.group.heartbeat_if_due().await {
                            Ok(_) => {}
                            Err(Error::Kafka(code)) if code.is_rebalance_error() => {
                                // Membership is gone; the message stays
                                // unmarked and is redelivered after the
                                // rejoin.
                                self.on_membership_lost(code);
                                rebalanced = true;
                                break;
                            }
                            Err(e) if e.is_transport() => {
                                tracing::warn!(error = %e, "heartbeat failed; will retry");
                            }
                            Err(e) => return Err(e),
                        }

                        self.mark_as_processed(message);
                        self.instrumentation.on_event(Event::Message {
                            partition: &TopicPartition::new(
                                message.topic.clone(),
                                message.partition,
                            ),
                            offset: message.offset,
                        });
                    }

                    if rebalanced {
                        continue;
                    }

                    match self.offsets.commit_offsets_if_necessary(&self.group).await {
                        Ok(committed) => {
                            if committed > 0 {
                                self.instrumentation.on_event(Event::OffsetsCommitted {
                                    partition_count: committed,
                                });
                            }
                        }
                        Err(Error::Kafka(code)) if code.is_rebalance_error() => {
                            self.on_membership_lost(code);
                        }
                        Err(Error::Kafka(code)) if code.is_topology_error() => {
                            self.note_topology_error(code);
                            tracing::warn!(error = ?code, "offset commit failed; will retry");
                        }
                        Err(e) if e.is_transport() => {
                            tracing::warn!(error = %e, "offset commit failed; will retry");
                        }
                        Err(e) => return Err(e),
                    }
                }
                Err(e) if e.is_transport() => {
                    // The next round re-dials and rediscovers leaders.
                    tracing::warn!(error = %e, "fetch failed; retrying");
                }
                Err(Error::Kafka(code)) if code.is_rebalance_error() => {
                    self.on_membership_lost(code);
                }
                Err(Error::Kafka(code)) if code.is_topology_error() => {
                    self.note_topology_error(code);
                    tracing::warn!(error = ?code, "topology error; refreshing on next round");
                }
                Err(e) => {
                    // Fatal: try to park cleanly, then surface.
                    let _ = self.shutdown().await;
                    return Err(e);
                }
            }
        }

        self.shutdown().await
    }

    /// Coordinator-class topology errors invalidate the coordinator
    /// cache; leader-class ones are handled at the fetch layer.
    fn note_topology_error(&mut self, code: KafkaCode) {
        if matches!(
            code,
            KafkaCode::NotCoordinatorForGroup | KafkaCode::GroupCoordinatorNotAvailable
        ) {
            self.cluster.invalidate_coordinator(self.group.group_id());
        }
    }

    fn on_membership_lost(&mut self, code: KafkaCode) {
        tracing::info!(
            group_id = %self.group.group_id(),
            error = ?code,
            "group membership lost; rejoining"
        );
        self.group.membership_lost(code);
        self.instrumentation.on_event(Event::LeftGroup {
            group_id: self.group.group_id(),
        });
    }

    /// Commit outstanding offsets, then leave the group. Idempotent.
    pub async fn shutdown(&mut self) -> Result<()> {
        if !self.group.is_member() {
            return Ok(());
        }

        if let Err(e) = self.commit_offsets().await {
            tracing::warn!(error = %e, "final offset commit failed during shutdown");
        }
        self.group.leave().await;
        self.instrumentation.on_event(Event::LeftGroup {
            group_id: self.group.group_id(),
        });
        Ok(())
    }
}

impl std::fmt::Debug for Consumer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Consumer")
            .field("group", &self.group)
            .field("stopped", &self.stopped())
            .finish()
    }
}
