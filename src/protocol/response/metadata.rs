//! Metadata response parsing.

use nom::{
    number::complete::{be_i16, be_i32},
    IResult,
};
use nombytes::NomBytes;

use crate::error::{kafka_code_from_wire, KafkaCode};
use crate::parser::{bytes_to_string, parse_array, parse_string};

/// Metadata response (v0).
#[derive(Debug, Clone)]
pub struct MetadataResponse {
    pub brokers: Vec<BrokerMetadata>,
    pub topics: Vec<TopicMetadata>,
}

#[derive(Debug, Clone)]
pub struct BrokerMetadata {
    pub node_id: i32,
    pub host: String,
    pub port: i32,
}

#[derive(Debug, Clone)]
pub struct TopicMetadata {
    pub error: KafkaCode,
    pub name: String,
    pub partitions: Vec<PartitionMetadata>,
}

#[derive(Debug, Clone)]
pub struct PartitionMetadata {
    pub error: KafkaCode,
    pub partition: i32,
    /// Node id of the leader, or -1 while an election is in flight.
    pub leader: i32,
    pub replicas: Vec<i32>,
    pub isr: Vec<i32>,
}

pub fn parse_metadata_response(s: NomBytes) -> IResult<NomBytes, MetadataResponse> {
    let (s, brokers) = parse_array(parse_broker)(s)?;
    let (s, topics) = parse_array(parse_topic)(s)?;
    Ok((s, MetadataResponse { brokers, topics }))
}

fn parse_broker(s: NomBytes) -> IResult<NomBytes, BrokerMetadata> {
    let (s, node_id) = be_i32(s)?;
    let (s, host) = parse_string(s)?;
    let (s, port) = be_i32(s)?;

    Ok((
        s,
        BrokerMetadata {
            node_id,
            host: bytes_to_string(&host)?,
            port,
        },
    ))
}

fn parse_topic(s: NomBytes) -> IResult<NomBytes, TopicMetadata> {
    let (s, error_code) = be_i16(s)?;
    let (s, name) = parse_string(s)?;
    let (s, partitions) = parse_array(parse_partition)(s)?;

    Ok((
        s,
        TopicMetadata {
            error: kafka_code_from_wire(error_code),
            name: bytes_to_string(&name)?,
            partitions,
        },
    ))
}

fn parse_partition(s: NomBytes) -> IResult<NomBytes, PartitionMetadata> {
    let (s, error_code) = be_i16(s)?;
    let (s, partition) = be_i32(s)?;
    let (s, leader) = be_i32(s)?;
    let (s, replicas) = parse_array(be_i32)(s)?;
    let (s, isr) = parse_array(be_i32)(s)?;

    Ok((
        s,
        PartitionMetadata {
            error: kafka_code_from_wire(error_code),
            partition,
            leader,
            replicas,
            isr,
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn build_string(s: &str, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&(s.len() as i16).to_be_bytes());
        buf.extend_from_slice(s.as_bytes());
    }

    #[test]
    fn test_parse_metadata_response() {
        let mut data = Vec::new();
        // brokers: 1 entry
        data.extend_from_slice(&1i32.to_be_bytes());
        data.extend_from_slice(&7i32.to_be_bytes());
        build_string("kafka1", &mut data);
        data.extend_from_slice(&9092i32.to_be_bytes());
        // topics: 1 entry, no error
        data.extend_from_slice(&1i32.to_be_bytes());
        data.extend_from_slice(&0i16.to_be_bytes());
        build_string("events", &mut data);
        // partitions: 1 entry, leader 7, replicas [7], isr [7]
        data.extend_from_slice(&1i32.to_be_bytes());
        data.extend_from_slice(&0i16.to_be_bytes());
        data.extend_from_slice(&0i32.to_be_bytes());
        data.extend_from_slice(&7i32.to_be_bytes());
        data.extend_from_slice(&1i32.to_be_bytes());
        data.extend_from_slice(&7i32.to_be_bytes());
        data.extend_from_slice(&1i32.to_be_bytes());
        data.extend_from_slice(&7i32.to_be_bytes());

        let (_, response) =
            parse_metadata_response(NomBytes::new(Bytes::from(data))).unwrap();

        assert_eq!(response.brokers.len(), 1);
        assert_eq!(response.brokers[0].node_id, 7);
        assert_eq!(response.brokers[0].host, "kafka1");
        assert_eq!(response.brokers[0].port, 9092);

        assert_eq!(response.topics.len(), 1);
        let topic = &response.topics[0];
        assert_eq!(topic.error, KafkaCode::None);
        assert_eq!(topic.name, "events");
        assert_eq!(topic.partitions.len(), 1);
        assert_eq!(topic.partitions[0].leader, 7);
        assert_eq!(topic.partitions[0].replicas, vec![7]);
        assert_eq!(topic.partitions[0].isr, vec![7]);
    }

    #[test]
    fn test_parse_leaderless_partition() {
        let mut data = Vec::new();
        data.extend_from_slice(&0i32.to_be_bytes()); // no brokers
        data.extend_from_slice(&1i32.to_be_bytes());
        data.extend_from_slice(&0i16.to_be_bytes());
        build_string("t", &mut data);
        data.extend_from_slice(&1i32.to_be_bytes());
        // partition error LeaderNotAvailable, leader -1
        data.extend_from_slice(&5i16.to_be_bytes());
        data.extend_from_slice(&0i32.to_be_bytes());
        data.extend_from_slice(&(-1i32).to_be_bytes());
        data.extend_from_slice(&0i32.to_be_bytes());
        data.extend_from_slice(&0i32.to_be_bytes());

        let (_, response) =
            parse_metadata_response(NomBytes::new(Bytes::from(data))).unwrap();
        let partition = &response.topics[0].partitions[0];
        assert_eq!(partition.error, KafkaCode::LeaderNotAvailable);
        assert_eq!(partition.leader, -1);
    }
}
