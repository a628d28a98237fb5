//! Instrumentation hooks.
//!
//! The consumer reports lifecycle events through a single sink trait so
//! embedding applications can feed their own metrics pipeline without the
//! client depending on any particular one. The default sink drops
//! everything.

use crate::error::KafkaCode;
use crate::types::TopicPartition;

/// A consumer lifecycle event.
///
/// Borrowed payloads keep the hot path allocation-free; sinks that need
/// to retain data must copy it.
#[derive(Debug, Clone, Copy)]
pub enum Event<'a> {
    /// The member completed join + sync and entered the group.
    JoinedGroup {
        group_id: &'a str,
        generation_id: i32,
        member_id: &'a str,
        is_leader: bool,
    },
    /// The member left the group or had its membership invalidated.
    LeftGroup { group_id: &'a str },
    /// A heartbeat round-trip completed.
    Heartbeat { group_id: &'a str, result: KafkaCode },
    /// A fetch returned this many messages across all partitions.
    FetchBatch { message_count: usize },
    /// One message is about to be handed to the application.
    Message {
        partition: &'a TopicPartition,
        offset: i64,
    },
    /// Offsets were committed for this many partitions.
    OffsetsCommitted { partition_count: usize },
}

/// Sink for [`Event`]s.
pub trait Instrumentation: Send + Sync {
    fn on_event(&self, event: Event<'_>);
}

/// The default sink: ignores every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopInstrumentation;

impl Instrumentation for NoopInstrumentation {
    fn on_event(&self, _event: Event<'_>) {}
}
