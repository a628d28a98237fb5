//! Fetch request encoding.

use bytes::BufMut;

use crate::constants::REPLICA_ID_CONSUMER;
use crate::encode::{encode_array, ToByte};
use crate::error::Result;

/// Fetch request (api_key 1, v0).
///
/// Topics are grouped per broker by the caller; every partition named
/// here must be led by the broker the request is sent to.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub max_wait_ms: i32,
    pub min_bytes: i32,
    pub topics: Vec<FetchTopic>,
}

#[derive(Debug, Clone)]
pub struct FetchTopic {
    pub name: String,
    pub partitions: Vec<FetchPartition>,
}

#[derive(Debug, Clone)]
pub struct FetchPartition {
    pub partition: i32,
    pub fetch_offset: i64,
    pub max_bytes: i32,
}

impl ToByte for FetchRequest {
    fn encode<W: BufMut>(&self, buffer: &mut W) -> Result<()> {
        REPLICA_ID_CONSUMER.encode(buffer)?;
        self.max_wait_ms.encode(buffer)?;
        self.min_bytes.encode(buffer)?;
        encode_array(buffer, &self.topics)
    }
}

impl ToByte for FetchTopic {
    fn encode<W: BufMut>(&self, buffer: &mut W) -> Result<()> {
        self.name.encode(buffer)?;
        encode_array(buffer, &self.partitions)
    }
}

impl ToByte for FetchPartition {
    fn encode<W: BufMut>(&self, buffer: &mut W) -> Result<()> {
        self.partition.encode(buffer)?;
        self.fetch_offset.encode(buffer)?;
        self.max_bytes.encode(buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_layout() {
        let request = FetchRequest {
            max_wait_ms: 500,
            min_bytes: 1,
            topics: vec![FetchTopic {
                name: "t".into(),
                partitions: vec![FetchPartition {
                    partition: 0,
                    fetch_offset: 42,
                    max_bytes: 1024,
                }],
            }],
        };

        let mut buf = Vec::new();
        request.encode(&mut buf).unwrap();

        // replica_id = -1 for consumers
        assert_eq!(&buf[0..4], &(-1i32).to_be_bytes());
        assert_eq!(&buf[4..8], &500i32.to_be_bytes());
        assert_eq!(&buf[8..12], &1i32.to_be_bytes());
        // topics array count
        assert_eq!(&buf[12..16], &1i32.to_be_bytes());
        // topic name
        assert_eq!(&buf[16..18], &1i16.to_be_bytes());
        assert_eq!(buf[18], b't');
        // partition entry: index, offset, max_bytes
        assert_eq!(&buf[19..23], &1i32.to_be_bytes());
        assert_eq!(&buf[23..27], &0i32.to_be_bytes());
        assert_eq!(&buf[27..35], &42i64.to_be_bytes());
        assert_eq!(&buf[35..39], &1024i32.to_be_bytes());
    }
}
