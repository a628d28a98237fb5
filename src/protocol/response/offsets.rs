//! Offset-related response parsing (ListOffsets, OffsetCommit, OffsetFetch).

use nom::{
    number::complete::{be_i16, be_i32, be_i64},
    IResult,
};
use nombytes::NomBytes;

use crate::error::{kafka_code_from_wire, KafkaCode};
use crate::parser::{
    bytes_to_string, bytes_to_string_opt, parse_array, parse_nullable_string, parse_string,
};

// ============================================================================
// ListOffsets
// ============================================================================

/// ListOffsets response (v0). Each partition carries an *array* of
/// offsets; with `max_offsets = 1` it holds at most the one answer.
#[derive(Debug, Clone)]
pub struct ListOffsetsResponse {
    pub topics: Vec<ListOffsetsTopicResponse>,
}

#[derive(Debug, Clone)]
pub struct ListOffsetsTopicResponse {
    pub name: String,
    pub partitions: Vec<ListOffsetsPartitionResponse>,
}

#[derive(Debug, Clone)]
pub struct ListOffsetsPartitionResponse {
    pub partition: i32,
    pub error: KafkaCode,
    pub offsets: Vec<i64>,
}

pub fn parse_list_offsets_response(s: NomBytes) -> IResult<NomBytes, ListOffsetsResponse> {
    let (s, topics) = parse_array(parse_list_offsets_topic)(s)?;
    Ok((s, ListOffsetsResponse { topics }))
}

fn parse_list_offsets_topic(s: NomBytes) -> IResult<NomBytes, ListOffsetsTopicResponse> {
    let (s, name) = parse_string(s)?;
    let (s, partitions) = parse_array(parse_list_offsets_partition)(s)?;

    Ok((
        s,
        ListOffsetsTopicResponse {
            name: bytes_to_string(&name)?,
            partitions,
        },
    ))
}

fn parse_list_offsets_partition(s: NomBytes) -> IResult<NomBytes, ListOffsetsPartitionResponse> {
    let (s, partition) = be_i32(s)?;
    let (s, error_code) = be_i16(s)?;
    let (s, offsets) = parse_array(be_i64)(s)?;

    Ok((
        s,
        ListOffsetsPartitionResponse {
            partition,
            error: kafka_code_from_wire(error_code),
            offsets,
        },
    ))
}

// ============================================================================
// OffsetCommit
// ============================================================================

/// OffsetCommit response (v2).
#[derive(Debug, Clone)]
pub struct OffsetCommitResponse {
    pub topics: Vec<OffsetCommitTopicResponse>,
}

#[derive(Debug, Clone)]
pub struct OffsetCommitTopicResponse {
    pub name: String,
    pub partitions: Vec<OffsetCommitPartitionResponse>,
}

#[derive(Debug, Clone)]
pub struct OffsetCommitPartitionResponse {
    pub partition: i32,
    pub error: KafkaCode,
}

pub fn parse_offset_commit_response(s: NomBytes) -> IResult<NomBytes, OffsetCommitResponse> {
    let (s, topics) = parse_array(parse_offset_commit_topic)(s)?;
    Ok((s, OffsetCommitResponse { topics }))
}

fn parse_offset_commit_topic(s: NomBytes) -> IResult<NomBytes, OffsetCommitTopicResponse> {
    let (s, name) = parse_string(s)?;
    let (s, partitions) = parse_array(parse_offset_commit_partition)(s)?;

    Ok((
        s,
        OffsetCommitTopicResponse {
            name: bytes_to_string(&name)?,
            partitions,
        },
    ))
}

fn parse_offset_commit_partition(
    s: NomBytes,
) -> IResult<NomBytes, OffsetCommitPartitionResponse> {
    let (s, partition) = be_i32(s)?;
    let (s, error_code) = be_i16(s)?;

    Ok((
        s,
        OffsetCommitPartitionResponse {
            partition,
            error: kafka_code_from_wire(error_code),
        },
    ))
}

// ============================================================================
// OffsetFetch
// ============================================================================

/// OffsetFetch response (v1). An offset of -1 with no error means the
/// group has never committed for that partition.
#[derive(Debug, Clone)]
pub struct OffsetFetchResponse {
    pub topics: Vec<OffsetFetchTopicResponse>,
}

#[derive(Debug, Clone)]
pub struct OffsetFetchTopicResponse {
    pub name: String,
    pub partitions: Vec<OffsetFetchPartitionResponse>,
}

#[derive(Debug, Clone)]
pub struct OffsetFetchPartitionResponse {
    pub partition: i32,
    pub offset: i64,
    pub metadata: Option<String>,
    pub error: KafkaCode,
}

pub fn parse_offset_fetch_response(s: NomBytes) -> IResult<NomBytes, OffsetFetchResponse> {
    let (s, topics) = parse_array(parse_offset_fetch_topic)(s)?;
    Ok((s, OffsetFetchResponse { topics }))
}

fn parse_offset_fetch_topic(s: NomBytes) -> IResult<NomBytes, OffsetFetchTopicResponse> {
    let (s, name) = parse_string(s)?;
    let (s, partitions) = parse_array(parse_offset_fetch_partition)(s)?;

    Ok((
        s,
        OffsetFetchTopicResponse {
            name: bytes_to_string(&name)?,
            partitions,
        },
    ))
}

fn parse_offset_fetch_partition(s: NomBytes) -> IResult<NomBytes, OffsetFetchPartitionResponse> {
    let (s, partition) = be_i32(s)?;
    let (s, offset) = be_i64(s)?;
    let (s, metadata) = parse_nullable_string(s)?;
    let (s, error_code) = be_i16(s)?;

    Ok((
        s,
        OffsetFetchPartitionResponse {
            partition,
            offset,
            metadata: bytes_to_string_opt(metadata)?,
            error: kafka_code_from_wire(error_code),
        },
    ))
}
