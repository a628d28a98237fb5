//! Offset-related request encoding (ListOffsets, OffsetCommit, OffsetFetch).

use bytes::BufMut;

use crate::constants::{OFFSET_RETENTION_DEFAULT, REPLICA_ID_CONSUMER};
use crate::encode::{encode_array, ToByte};
use crate::error::Result;

// ============================================================================
// ListOffsets
// ============================================================================

/// ListOffsets request (api_key 2, v0).
///
/// The v0 timestamp field only has two meaningful values for clients:
/// the earliest (-2) and latest (-1) sentinels.
#[derive(Debug, Clone)]
pub struct ListOffsetsRequest {
    pub topics: Vec<ListOffsetsTopic>,
}

#[derive(Debug, Clone)]
pub struct ListOffsetsTopic {
    pub name: String,
    pub partitions: Vec<ListOffsetsPartition>,
}

#[derive(Debug, Clone)]
pub struct ListOffsetsPartition {
    pub partition: i32,
    /// Earliest/latest sentinel (or a wall-clock time in ms).
    pub timestamp: i64,
    /// How many offsets the broker may return; clients ask for one.
    pub max_offsets: i32,
}

impl ListOffsetsRequest {
    /// Ask for a single offset on one partition.
    pub fn single(topic: impl Into<String>, partition: i32, timestamp: i64) -> Self {
        ListOffsetsRequest {
            topics: vec![ListOffsetsTopic {
                name: topic.into(),
                partitions: vec![ListOffsetsPartition {
                    partition,
                    timestamp,
                    max_offsets: 1,
                }],
            }],
        }
    }
}

impl ToByte for ListOffsetsRequest {
    fn encode<W: BufMut>(&self, buffer: &mut W) -> Result<()> {
        REPLICA_ID_CONSUMER.encode(buffer)?;
        encode_array(buffer, &self.topics)
    }
}

impl ToByte for ListOffsetsTopic {
    fn encode<W: BufMut>(&self, buffer: &mut W) -> Result<()> {
        self.name.encode(buffer)?;
        encode_array(buffer, &self.partitions)
    }
}

impl ToByte for ListOffsetsPartition {
    fn encode<W: BufMut>(&self, buffer: &mut W) -> Result<()> {
        self.partition.encode(buffer)?;
        self.timestamp.encode(buffer)?;
        self.max_offsets.encode(buffer)
    }
}

// ============================================================================
// OffsetCommit
// ============================================================================

/// OffsetCommit request (api_key 8, v2).
///
/// v2 is the newest version a 0.9 broker accepts; it binds the commit to
/// the member's `(generation_id, member_id)` so commits from evicted
/// members are fenced.
#[derive(Debug, Clone)]
pub struct OffsetCommitRequest {
    pub group_id: String,
    pub generation_id: i32,
    pub member_id: String,
    pub topics: Vec<OffsetCommitTopic>,
}

#[derive(Debug, Clone)]
pub struct OffsetCommitTopic {
    pub name: String,
    pub partitions: Vec<OffsetCommitPartition>,
}

#[derive(Debug, Clone)]
pub struct OffsetCommitPartition {
    pub partition: i32,
    pub offset: i64,
    pub metadata: Option<String>,
}

impl ToByte for OffsetCommitRequest {
    fn encode<W: BufMut>(&self, buffer: &mut W) -> Result<()> {
        self.group_id.encode(buffer)?;
        self.generation_id.encode(buffer)?;
        self.member_id.encode(buffer)?;
        OFFSET_RETENTION_DEFAULT.encode(buffer)?;
        encode_array(buffer, &self.topics)
    }
}

impl ToByte for OffsetCommitTopic {
    fn encode<W: BufMut>(&self, buffer: &mut W) -> Result<()> {
        self.name.encode(buffer)?;
        encode_array(buffer, &self.partitions)
    }
}

impl ToByte for OffsetCommitPartition {
    fn encode<W: BufMut>(&self, buffer: &mut W) -> Result<()> {
        self.partition.encode(buffer)?;
        self.offset.encode(buffer)?;
        self.metadata.as_deref().encode(buffer)
    }
}

// ============================================================================
// OffsetFetch
// ============================================================================

/// OffsetFetch request (api_key 9, v1).
///
/// v1 reads offsets from the broker-side `__consumer_offsets` store
/// rather than ZooKeeper.
#[derive(Debug, Clone)]
pub struct OffsetFetchRequest {
    pub group_id: String,
    pub topics: Vec<OffsetFetchTopic>,
}

#[derive(Debug, Clone)]
pub struct OffsetFetchTopic {
    pub name: String,
    pub partitions: Vec<i32>,
}

impl OffsetFetchRequest {
    /// Ask for one partition's committed offset.
    pub fn single(group_id: impl Into<String>, topic: impl Into<String>, partition: i32) -> Self {
        OffsetFetchRequest {
            group_id: group_id.into(),
            topics: vec![OffsetFetchTopic {
                name: topic.into(),
                partitions: vec![partition],
            }],
        }
    }
}

impl ToByte for OffsetFetchRequest {
    fn encode<W: BufMut>(&self, buffer: &mut W) -> Result<()> {
        self.group_id.encode(buffer)?;
        encode_array(buffer, &self.topics)
    }
}

impl ToByte for OffsetFetchTopic {
    fn encode<W: BufMut>(&self, buffer: &mut W) -> Result<()> {
        self.name.encode(buffer)?;
        encode_array(buffer, &self.partitions)
    }
}
