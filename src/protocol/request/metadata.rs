//! Metadata request encoding.

use bytes::BufMut;

use crate::encode::{encode_array, ToByte};
use crate::error::Result;

/// Metadata request (api_key 3, v0).
///
/// An empty topic list asks for every topic the cluster knows.
#[derive(Debug, Clone, Default)]
pub struct MetadataRequest {
    pub topics: Vec<String>,
}

impl MetadataRequest {
    pub fn new(topics: Vec<String>) -> Self {
        MetadataRequest { topics }
    }

    /// Request metadata for all topics.
    pub fn all() -> Self {
        MetadataRequest { topics: vec![] }
    }
}

impl ToByte for MetadataRequest {
    fn encode<W: BufMut>(&self, buffer: &mut W) -> Result<()> {
        encode_array(buffer, &self.topics)
    }
}
