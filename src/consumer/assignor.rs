//! Partition assignment and the embedded consumer-protocol blobs.
//!
//! JoinGroup and SyncGroup carry opaque byte blobs whose layout is fixed
//! by convention rather than by the wire protocol proper:
//!
//! ```text
//! member metadata:   version: i16 | topics: [string] | user_data: bytes
//! member assignment: version: i16 | topics: [(string, [i32])] | user_data: bytes
//! ```
//!
//! The assignment scheme is round-robin: partitions of all subscribed
//! topics in canonical `(topic, partition)` order are dealt to members
//! sorted by member id, partition *i* going to member `i % n`. The scheme
//! is deterministic for a fixed member set and makes no compatibility
//! promise to other clients' assignors.

use std::collections::{BTreeMap, HashMap};

use bytes::{BufMut, Bytes};
use nom::{
    number::complete::{be_i16, be_i32},
    IResult,
};
use nombytes::NomBytes;

use crate::constants::CONSUMER_PROTOCOL_VERSION;
use crate::encode::{encode_array, ToByte};
use crate::error::Result;
use crate::parser::{
    bytes_to_string, parse_array, parse_frame, parse_nullable_bytes, parse_string,
};

// ============================================================================
// Member metadata (subscription)
// ============================================================================

/// The subscription a member advertises in JoinGroup.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MemberMetadata {
    pub topics: Vec<String>,
    pub user_data: Option<Bytes>,
}

impl MemberMetadata {
    pub fn new(topics: Vec<String>) -> Self {
        MemberMetadata {
            topics,
            user_data: None,
        }
    }

    /// Encode into the blob carried inside a JoinGroup protocol entry.
    pub fn to_bytes(&self) -> Result<Bytes> {
        let mut buf = Vec::new();
        CONSUMER_PROTOCOL_VERSION.encode(&mut buf)?;
        encode_array(&mut buf, &self.topics)?;
        self.user_data.encode(&mut buf)?;
        Ok(Bytes::from(buf))
    }

    pub fn from_bytes(data: Bytes) -> Result<Self> {
        parse_frame(data, parse_member_metadata)
    }
}

fn parse_member_metadata(s: NomBytes) -> IResult<NomBytes, MemberMetadata> {
    let (s, _version) = be_i16(s)?;
    let (s, topics) = parse_array(|input| {
        let (input, topic) = parse_string(input)?;
        Ok((input, bytes_to_string(&topic)?))
    })(s)?;
    let (s, user_data) = parse_nullable_bytes(s)?;

    Ok((s, MemberMetadata { topics, user_data }))
}

// ============================================================================
// Member assignment
// ============================================================================

/// The per-member partition assignment distributed via SyncGroup.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MemberAssignment {
    /// Topic -> partition ids, kept in the encoded order.
    pub topics: Vec<(String, Vec<i32>)>,
    pub user_data: Option<Bytes>,
}

impl MemberAssignment {
    pub fn to_bytes(&self) -> Result<Bytes> {
        let mut buf = Vec::new();
        CONSUMER_PROTOCOL_VERSION.encode(&mut buf)?;
        encode_as_topic_array(&mut buf, &self.topics)?;
        self.user_data.encode(&mut buf)?;
        Ok(Bytes::from(buf))
    }

    /// Decode a SyncGroup assignment blob. An empty blob means the
    /// coordinator assigned nothing, which is a valid (empty) assignment.
    pub fn from_bytes(data: Bytes) -> Result<Self> {
        if data.is_empty() {
            return Ok(MemberAssignment::default());
        }
        parse_frame(data, parse_member_assignment)
    }

    /// The assignment as a `topic -> partitions` map.
    pub fn to_map(&self) -> HashMap<String, Vec<i32>> {
        self.topics
            .iter()
            .map(|(topic, partitions)| (topic.clone(), partitions.clone()))
            .collect()
    }

    pub fn partition_count(&self) -> usize {
        self.topics.iter().map(|(_, p)| p.len()).sum()
    }
}

fn encode_as_topic_array<W: BufMut>(buffer: &mut W, topics: &[(String, Vec<i32>)]) -> Result<()> {
    buffer.put_i32(topics.len() as i32);
    for (topic, partitions) in topics {
        topic.encode(buffer)?;
        encode_array(buffer, partitions)?;
    }
    Ok(())
}

fn parse_member_assignment(s: NomBytes) -> IResult<NomBytes, MemberAssignment> {
    let (s, _version) = be_i16(s)?;
    let (s, topics) = parse_array(parse_assignment_topic)(s)?;
    let (s, user_data) = parse_nullable_bytes(s)?;

    Ok((s, MemberAssignment { topics, user_data }))
}

fn parse_assignment_topic(s: NomBytes) -> IResult<NomBytes, (String, Vec<i32>)> {
    let (s, topic) = parse_string(s)?;
    let (s, partitions) = parse_array(be_i32)(s)?;
    Ok((s, (bytes_to_string(&topic)?, partitions)))
}

// ============================================================================
// Round-robin assignment
// ============================================================================

/// Compute the assignment for one generation.
///
/// `partitions_by_topic` must cover the union of every member's
/// subscription. Every member receives an entry, possibly empty.
pub fn assign_round_robin(
    member_ids: &[String],
    partitions_by_topic: &BTreeMap<String, Vec<i32>>,
) -> HashMap<String, MemberAssignment> {
    let mut sorted_members: Vec<&String> = member_ids.iter().collect();
    sorted_members.sort();
    sorted_members.dedup();

    let mut assignments: HashMap<String, BTreeMap<String, Vec<i32>>> = sorted_members
        .iter()
        .map(|id| ((*id).clone(), BTreeMap::new()))
        .collect();

    if sorted_members.is_empty() {
        return HashMap::new();
    }

    let mut index = 0usize;
    for (topic, partitions) in partitions_by_topic {
        let mut partitions = partitions.clone();
        partitions.sort_unstable();
        for partition in partitions {
            let member = sorted_members[index % sorted_members.len()];
            assignments
                .get_mut(member.as_str())
                .expect("member pre-seeded")
                .entry(topic.clone())
                .or_default()
                .push(partition);
            index += 1;
        }
    }

    assignments
        .into_iter()
        .map(|(member, topics)| {
            (
                member,
                MemberAssignment {
                    topics: topics.into_iter().collect(),
                    user_data: None,
                },
            )
        })
        .collect()
}
