//! Kafka wire protocol: request envelopes, response headers, and the
//! per-API request/response codecs.
//!
//! The protocol is not self-describing: for every API the encoder and the
//! decoder must agree statically on the layout. The module is organized
//! as mirrored halves: [`request`] holds the encoding side
//! ([`crate::encode::ToByte`] impls) and [`response`] the parsing side
//! (nom functions), grouped by API area the same way on both sides.
//!
//! All APIs are spoken at their Kafka 0.9 versions: v0 bodies, except
//! OffsetCommit (v2) and OffsetFetch (v1), which are the broker-backed
//! offset-storage variants.

pub mod messages;
pub mod request;
pub mod response;

use bytes::BufMut;
use nom::{number::complete::be_i32, IResult};
use nombytes::NomBytes;

use crate::encode::ToByte;
use crate::error::Result;

/// API keys for the Kafka protocol operations this client issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i16)]
pub enum ApiKey {
    Fetch = 1,
    ListOffsets = 2,
    Metadata = 3,
    OffsetCommit = 8,
    OffsetFetch = 9,
    GroupCoordinator = 10,
    JoinGroup = 11,
    Heartbeat = 12,
    LeaveGroup = 13,
    SyncGroup = 14,
}

impl ApiKey {
    /// Returns a static string name for this API key.
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            ApiKey::Fetch => "Fetch",
            ApiKey::ListOffsets => "ListOffsets",
            ApiKey::Metadata => "Metadata",
            ApiKey::OffsetCommit => "OffsetCommit",
            ApiKey::OffsetFetch => "OffsetFetch",
            ApiKey::GroupCoordinator => "GroupCoordinator",
            ApiKey::JoinGroup => "JoinGroup",
            ApiKey::Heartbeat => "Heartbeat",
            ApiKey::LeaveGroup => "LeaveGroup",
            ApiKey::SyncGroup => "SyncGroup",
        }
    }
}

impl From<ApiKey> for i16 {
    fn from(key: ApiKey) -> Self {
        key as i16
    }
}

/// Request header preceding every request body.
#[derive(Debug, Clone)]
pub struct HeaderRequest<'a> {
    /// The API key of this request.
    pub api_key: ApiKey,
    /// The API version of this request.
    pub api_version: i16,
    /// The correlation ID of this request.
    pub correlation_id: i32,
    /// The client ID string.
    pub client_id: &'a str,
}

impl<'a> ToByte for HeaderRequest<'a> {
    fn encode<W: BufMut>(&self, buffer: &mut W) -> Result<()> {
        (self.api_key as i16).encode(buffer)?;
        self.api_version.encode(buffer)?;
        self.correlation_id.encode(buffer)?;
        self.client_id.encode(buffer)?;
        Ok(())
    }
}

/// A request framed for the wire: size prefix, header, body.
pub struct Request {
    correlation_id: i32,
    header: Vec<u8>,
    body: Vec<u8>,
}

impl Request {
    /// Assemble a request from its header fields and body.
    pub fn new<T: ToByte>(
        api_key: ApiKey,
        api_version: i16,
        correlation_id: i32,
        client_id: &str,
        body: &T,
    ) -> Result<Self> {
        let mut header = Vec::new();
        HeaderRequest {
            api_key,
            api_version,
            correlation_id,
            client_id,
        }
        .encode(&mut header)?;

        let mut body_buf = Vec::new();
        body.encode(&mut body_buf)?;

        Ok(Request {
            correlation_id,
            header,
            body: body_buf,
        })
    }

    pub fn correlation_id(&self) -> i32 {
        self.correlation_id
    }

    /// Encode the request to a buffer with the size prefix.
    pub fn encode_with_size(&self) -> Result<Vec<u8>> {
        let total_size = (self.header.len() + self.body.len()) as i32;
        let mut result = Vec::with_capacity(4 + total_size as usize);
        total_size.encode(&mut result)?;
        result.extend_from_slice(&self.header);
        result.extend_from_slice(&self.body);
        Ok(result)
    }
}

/// Response header: every response frame begins with the correlation ID
/// of the request it answers.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct HeaderResponse {
    pub correlation_id: i32,
}

pub fn parse_header_response(s: NomBytes) -> IResult<NomBytes, HeaderResponse> {
    let (s, correlation_id) = be_i32(s)?;
    Ok((s, HeaderResponse { correlation_id }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[test]
    fn test_api_key_values() {
        assert_eq!(ApiKey::Fetch as i16, 1);
        assert_eq!(ApiKey::ListOffsets as i16, 2);
        assert_eq!(ApiKey::Metadata as i16, 3);
        assert_eq!(ApiKey::OffsetCommit as i16, 8);
        assert_eq!(ApiKey::OffsetFetch as i16, 9);
        assert_eq!(ApiKey::GroupCoordinator as i16, 10);
        assert_eq!(ApiKey::JoinGroup as i16, 11);
        assert_eq!(ApiKey::Heartbeat as i16, 12);
        assert_eq!(ApiKey::LeaveGroup as i16, 13);
        assert_eq!(ApiKey::SyncGroup as i16, 14);
    }

    #[test]
    fn test_header_request_encode() {
        let header = HeaderRequest {
            api_key: ApiKey::Metadata,
            api_version: 0,
            correlation_id: 42,
            client_id: "cli",
        };
        let mut buf = Vec::new();
        header.encode(&mut buf).unwrap();

        assert_eq!(
            buf,
            vec![
                0x00, 0x03, // api_key = 3
                0x00, 0x00, // api_version = 0
                0x00, 0x00, 0x00, 0x2A, // correlation_id = 42
                0x00, 0x03, b'c', b'l', b'i', // client_id
            ]
        );
    }

    #[test]
    fn test_request_encode_with_size() {
        // Heartbeat body: group_id + generation_id + member_id
        struct Body;
        impl ToByte for Body {
            fn encode<W: BufMut>(&self, buffer: &mut W) -> Result<()> {
                "g".encode(buffer)?;
                1i32.encode(buffer)?;
                "m".encode(buffer)
            }
        }

        let request = Request::new(ApiKey::Heartbeat, 0, 7, "c", &Body).unwrap();
        let framed = request.encode_with_size().unwrap();

        let size = i32::from_be_bytes(framed[0..4].try_into().unwrap());
        assert_eq!(size as usize, framed.len() - 4);
        // api_key follows immediately after the size prefix
        assert_eq!(&framed[4..6], &[0x00, 0x0C]);
    }

    #[test]
    fn test_parse_header_response() {
        let data = Bytes::from(vec![0x00, 0x00, 0x00, 0x2A, 0xFF]);
        let (rest, header) = parse_header_response(NomBytes::new(data)).unwrap();
        assert_eq!(header.correlation_id, 42);
        assert_eq!(rest.into_bytes(), Bytes::from(vec![0xFF]));
    }
}
