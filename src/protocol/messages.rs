//! Message format v0 and message sets.
//!
//! A message set is the raw payload of a fetch response partition:
//!
//! ```text
//! offset: i64 | message_size: i32 | message
//! ```
//!
//! repeated back to back, where each message is
//!
//! ```text
//! crc: i32 | magic: i8 = 0 | attributes: i8 | key: bytes | value: bytes
//! ```
//!
//! The CRC is a plain CRC-32 (IEEE) over everything after the crc field.
//! The broker truncates the final entry when the client's byte budget runs
//! out mid-message; decoders drop that partial tail rather than erroring.

use bytes::{BufMut, Bytes};

use crate::constants::{
    MESSAGE_CODEC_MASK, MESSAGE_HEADER_SIZE, MESSAGE_MAGIC_V0, MESSAGE_SET_ENTRY_OVERHEAD,
};
use crate::encode::ToByte;
use crate::error::{Error, Result};

// CRC-32 (IEEE 802.3) table, the polynomial Kafka's v0 messages use.
// Built at compile time to avoid a dependency for one checksum.
const CRC32_TABLE: [u32; 256] = {
    let mut table = [0u32; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = i as u32;
        let mut j = 0;
        while j < 8 {
            if crc & 1 != 0 {
                crc = (crc >> 1) ^ 0xEDB8_8320;
            } else {
                crc >>= 1;
            }
            j += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
};

/// Compute the CRC-32 (IEEE) checksum of `data`.
pub fn crc32(data: &[u8]) -> u32 {
    let mut crc = !0u32;
    for &byte in data {
        let index = ((crc ^ byte as u32) & 0xFF) as usize;
        crc = (crc >> 8) ^ CRC32_TABLE[index];
    }
    !crc
}

/// One message as carried inside a message set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Absolute offset within the partition.
    pub offset: i64,
    /// Optional message key; null on the wire is `None`.
    pub key: Option<Bytes>,
    /// Optional message payload; null on the wire is `None`.
    pub value: Option<Bytes>,
}

impl Message {
    /// Encode just the message body (crc through value), without the
    /// message-set entry prefix.
    fn encode_body<W: BufMut>(&self, buffer: &mut W) -> Result<()> {
        let mut inner = Vec::new();
        MESSAGE_MAGIC_V0.encode(&mut inner)?;
        0i8.encode(&mut inner)?; // attributes: no compression
        self.key.encode(&mut inner)?;
        self.value.encode(&mut inner)?;

        (crc32(&inner) as i32).encode(buffer)?;
        buffer.put_slice(&inner);
        Ok(())
    }
}

impl ToByte for Message {
    /// Encode one message-set entry: offset, size, message.
    fn encode<W: BufMut>(&self, buffer: &mut W) -> Result<()> {
        let mut body = Vec::new();
        self.encode_body(&mut body)?;

        self.offset.encode(buffer)?;
        (body.len() as i32).encode(buffer)?;
        buffer.put_slice(&body);
        Ok(())
    }
}

/// Encode a sequence of messages as a message set.
///
/// Message sets have no count prefix; their extent is the enclosing
/// size field.
pub fn encode_message_set<W: BufMut>(messages: &[Message], buffer: &mut W) -> Result<()> {
    for message in messages {
        message.encode(buffer)?;
    }
    Ok(())
}

/// Decode a message set, verifying each message's CRC.
///
/// A truncated trailing entry is discarded silently. Corrupt CRCs and
/// compressed payloads are errors; the caller must not advance its
/// offset past them.
pub fn decode_message_set(data: &Bytes) -> Result<Vec<Message>> {
    let mut messages = Vec::new();
    let mut pos = 0usize;

    while data.len() - pos >= MESSAGE_SET_ENTRY_OVERHEAD {
        let offset = i64::from_be_bytes(data[pos..pos + 8].try_into().expect("8 bytes"));
        let size = i32::from_be_bytes(data[pos + 8..pos + 12].try_into().expect("4 bytes"));
        pos += MESSAGE_SET_ENTRY_OVERHEAD;

        if size < MESSAGE_HEADER_SIZE as i32 {
            return Err(Error::Kafka(crate::error::KafkaCode::InvalidMessageSize));
        }
        let size = size as usize;

        if data.len() - pos < size {
            // Partial trailing message truncated by the fetch byte budget.
            break;
        }

        let body = data.slice(pos..pos + size);
        pos += size;

        messages.push(decode_message(offset, &body)?);
    }

    Ok(messages)
}

fn decode_message(offset: i64, body: &Bytes) -> Result<Message> {
    let expected = u32::from_be_bytes(body[0..4].try_into().expect("4 bytes"));
    let computed = crc32(&body[4..]);
    if expected != computed {
        return Err(Error::CorruptMessage { expected, computed });
    }

    let magic = body[4] as i8;
    if magic != MESSAGE_MAGIC_V0 {
        return Err(Error::ParsingError(body.clone()));
    }

    let attributes = body[5] as i8;
    let codec = attributes & MESSAGE_CODEC_MASK;
    if codec != 0 {
        return Err(Error::UnsupportedCompression(codec));
    }

    let mut pos = MESSAGE_HEADER_SIZE;
    let key = take_nullable_bytes(body, &mut pos)?;
    let value = take_nullable_bytes(body, &mut pos)?;

    Ok(Message { offset, key, value })
}

fn take_nullable_bytes(body: &Bytes, pos: &mut usize) -> Result<Option<Bytes>> {
    if body.len() - *pos < 4 {
        return Err(Error::UnexpectedEof);
    }
    let len = i32::from_be_bytes(body[*pos..*pos + 4].try_into().expect("4 bytes"));
    *pos += 4;

    if len == -1 {
        return Ok(None);
    }
    if len < 0 {
        return Err(Error::ParsingError(body.clone()));
    }
    let len = len as usize;
    if body.len() - *pos < len {
        return Err(Error::UnexpectedEof);
    }
    let out = body.slice(*pos..*pos + len);
    *pos += len;
    Ok(Some(out))
}
