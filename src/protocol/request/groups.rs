//! Consumer group-related request encoding.
//!
//! - GroupCoordinator (api_key 10)
//! - JoinGroup (api_key 11)
//! - Heartbeat (api_key 12)
//! - LeaveGroup (api_key 13)
//! - SyncGroup (api_key 14)

use bytes::{BufMut, Bytes};

use crate::encode::{encode_array, ToByte};
use crate::error::Result;

// ============================================================================
// GroupCoordinator
// ============================================================================

/// GroupCoordinator request (v0): locate the broker coordinating a group.
#[derive(Debug, Clone)]
pub struct GroupCoordinatorRequest {
    pub group_id: String,
}

impl ToByte for GroupCoordinatorRequest {
    fn encode<W: BufMut>(&self, buffer: &mut W) -> Result<()> {
        self.group_id.encode(buffer)
    }
}

// ============================================================================
// JoinGroup
// ============================================================================

/// JoinGroup request (v0).
///
/// `member_id` is empty on a first join; the coordinator assigns one in
/// the response. Protocol metadata blobs are opaque at this layer;
/// see `consumer::assignor` for their contents.
#[derive(Debug, Clone)]
pub struct JoinGroupRequest {
    pub group_id: String,
    pub session_timeout_ms: i32,
    pub member_id: String,
    pub protocol_type: String,
    pub protocols: Vec<JoinGroupProtocol>,
}

#[derive(Debug, Clone)]
pub struct JoinGroupProtocol {
    pub name: String,
    pub metadata: Bytes,
}

impl ToByte for JoinGroupRequest {
    fn encode<W: BufMut>(&self, buffer: &mut W) -> Result<()> {
        self.group_id.encode(buffer)?;
        self.session_timeout_ms.encode(buffer)?;
        self.member_id.encode(buffer)?;
        self.protocol_type.encode(buffer)?;
        encode_array(buffer, &self.protocols)
    }
}

impl ToByte for JoinGroupProtocol {
    fn encode<W: BufMut>(&self, buffer: &mut W) -> Result<()> {
        self.name.encode(buffer)?;
        self.metadata.encode(buffer)
    }
}

// ============================================================================
// Heartbeat
// ============================================================================

/// Heartbeat request (v0).
#[derive(Debug, Clone)]
pub struct HeartbeatRequest {
    pub group_id: String,
    pub generation_id: i32,
    pub member_id: String,
}

impl ToByte for HeartbeatRequest {
    fn encode<W: BufMut>(&self, buffer: &mut W) -> Result<()> {
        self.group_id.encode(buffer)?;
        self.generation_id.encode(buffer)?;
        self.member_id.encode(buffer)
    }
}

// ============================================================================
// LeaveGroup
// ============================================================================

/// LeaveGroup request (v0).
#[derive(Debug, Clone)]
pub struct LeaveGroupRequest {
    pub group_id: String,
    pub member_id: String,
}

impl ToByte for LeaveGroupRequest {
    fn encode<W: BufMut>(&self, buffer: &mut W) -> Result<()> {
        self.group_id.encode(buffer)?;
        self.member_id.encode(buffer)
    }
}

// ============================================================================
// SyncGroup
// ============================================================================

/// SyncGroup request (v0).
///
/// The elected leader fills `assignments` with every member's encoded
/// assignment; followers send an empty array and receive theirs in the
/// response.
#[derive(Debug, Clone)]
pub struct SyncGroupRequest {
    pub group_id: String,
    pub generation_id: i32,
    pub member_id: String,
    pub assignments: Vec<SyncGroupAssignment>,
}

#[derive(Debug, Clone)]
pub struct SyncGroupAssignment {
    pub member_id: String,
    pub assignment: Bytes,
}

impl ToByte for SyncGroupRequest {
    fn encode<W: BufMut>(&self, buffer: &mut W) -> Result<()> {
        self.group_id.encode(buffer)?;
        self.generation_id.encode(buffer)?;
        self.member_id.encode(buffer)?;
        encode_array(buffer, &self.assignments)
    }
}

impl ToByte for SyncGroupAssignment {
    fn encode<W: BufMut>(&self, buffer: &mut W) -> Result<()> {
        self.member_id.encode(buffer)?;
        self.assignment.encode(buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_coordinator_encode() {
        let mut buf = Vec::new();
        GroupCoordinatorRequest {
            group_id: "grp".into(),
        }
        .encode(&mut buf)
        .unwrap();
        assert_eq!(buf, vec![0, 3, b'g', b'r', b'p']);
    }

    #[test]
    fn test_join_group_first_join_has_empty_member_id() {
        let request = JoinGroupRequest {
            group_id: "g".into(),
            session_timeout_ms: 30_000,
            member_id: String::new(),
            protocol_type: "consumer".into(),
            protocols: vec![JoinGroupProtocol {
                name: "standard".into(),
                metadata: Bytes::from_static(b"\x00\x00"),
            }],
        };

        let mut buf = Vec::new();
        request.encode(&mut buf).unwrap();

        // group_id "g", session timeout
        assert_eq!(&buf[3..7], &30_000i32.to_be_bytes());
        // empty member_id: zero-length string
        assert_eq!(&buf[7..9], &0i16.to_be_bytes());
        // protocol_type "consumer"
        assert_eq!(&buf[9..11], &8i16.to_be_bytes());
        assert_eq!(&buf[11..19], b"consumer");
    }

    #[test]
    fn test_heartbeat_encode() {
        let mut buf = Vec::new();
        HeartbeatRequest {
            group_id: "g".into(),
            generation_id: 3,
            member_id: "m".into(),
        }
        .encode(&mut buf)
        .unwrap();

        assert_eq!(
            buf,
            vec![0, 1, b'g', 0, 0, 0, 3, 0, 1, b'm'],
        );
    }

    #[test]
    fn test_sync_group_follower_sends_no_assignments() {
        let request = SyncGroupRequest {
            group_id: "g".into(),
            generation_id: 1,
            member_id: "m".into(),
            assignments: vec![],
        };

        let mut buf = Vec::new();
        request.encode(&mut buf).unwrap();
        // Tail is the empty assignments array.
        assert_eq!(&buf[buf.len() - 4..], &0i32.to_be_bytes());
    }

    #[test]
    fn test_sync_group_leader_sends_assignments() {
        let request = SyncGroupRequest {
            group_id: "g".into(),
            generation_id: 1,
            member_id: "leader".into(),
            assignments: vec![SyncGroupAssignment {
                member_id: "other".into(),
                assignment: Bytes::from_static(b"\x00\x00\x00\x01"),
            }],
        };

        let mut buf = Vec::new();
        request.encode(&mut buf).unwrap();
        // assignment blob is a BYTES field: i32 length then payload
        assert_eq!(&buf[buf.len() - 8..buf.len() - 4], &4i32.to_be_bytes());
    }
}
