//! Fetch response parsing.

use nom::{
    number::complete::{be_i16, be_i32, be_i64},
    IResult,
};
use nombytes::NomBytes;

use crate::error::{kafka_code_from_wire, KafkaCode};
use crate::parser::{bytes_to_string, parse_array, parse_bytes, parse_string};

use bytes::Bytes;

/// Fetch response (v0).
///
/// The message-set payload is kept as raw bytes here; decoding (and CRC
/// verification) happens in [`crate::protocol::messages`], after the
/// per-partition error code has been inspected.
#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub topics: Vec<FetchTopicResponse>,
}

#[derive(Debug, Clone)]
pub struct FetchTopicResponse {
    pub name: String,
    pub partitions: Vec<FetchPartitionResponse>,
}

#[derive(Debug, Clone)]
pub struct FetchPartitionResponse {
    pub partition: i32,
    pub error: KafkaCode,
    /// Greatest offset fully replicated to the in-sync set.
    pub high_watermark: i64,
    /// Raw message-set bytes, possibly ending in a truncated message.
    pub message_set: Bytes,
}

pub fn parse_fetch_response(s: NomBytes) -> IResult<NomBytes, FetchResponse> {
    let (s, topics) = parse_array(parse_fetch_topic)(s)?;
    Ok((s, FetchResponse { topics }))
}

fn parse_fetch_topic(s: NomBytes) -> IResult<NomBytes, FetchTopicResponse> {
    let (s, name) = parse_string(s)?;
    let (s, partitions) = parse_array(parse_fetch_partition)(s)?;

    Ok((
        s,
        FetchTopicResponse {
            name: bytes_to_string(&name)?,
            partitions,
        },
    ))
}

fn parse_fetch_partition(s: NomBytes) -> IResult<NomBytes, FetchPartitionResponse> {
    let (s, partition) = be_i32(s)?;
    let (s, error_code) = be_i16(s)?;
    let (s, high_watermark) = be_i64(s)?;
    let (s, message_set) = parse_bytes(s)?;

    Ok((
        s,
        FetchPartitionResponse {
            partition,
            error: kafka_code_from_wire(error_code),
            high_watermark,
            message_set,
        },
    ))
}
