//! Consumer group-related response parsing.
//!
//! - GroupCoordinator (api_key 10)
//! - JoinGroup (api_key 11)
//! - Heartbeat (api_key 12)
//! - LeaveGroup (api_key 13)
//! - SyncGroup (api_key 14)

use bytes::Bytes;
use nom::{
    number::complete::{be_i16, be_i32},
    IResult,
};
use nombytes::NomBytes;

use crate::error::{kafka_code_from_wire, KafkaCode};
use crate::parser::{bytes_to_string, parse_array, parse_bytes, parse_string};

// ============================================================================
// GroupCoordinator
// ============================================================================

/// GroupCoordinator response (v0).
#[derive(Debug, Clone)]
pub struct GroupCoordinatorResponse {
    pub error: KafkaCode,
    pub coordinator_id: i32,
    pub coordinator_host: String,
    pub coordinator_port: i32,
}

pub fn parse_group_coordinator_response(
    s: NomBytes,
) -> IResult<NomBytes, GroupCoordinatorResponse> {
    let (s, error_code) = be_i16(s)?;
    let (s, coordinator_id) = be_i32(s)?;
    let (s, host) = parse_string(s)?;
    let (s, coordinator_port) = be_i32(s)?;

    Ok((
        s,
        GroupCoordinatorResponse {
            error: kafka_code_from_wire(error_code),
            coordinator_id,
            coordinator_host: bytes_to_string(&host)?,
            coordinator_port,
        },
    ))
}

// ============================================================================
// JoinGroup
// ============================================================================

/// JoinGroup response (v0).
///
/// When `leader_id == member_id` this member was elected leader and
/// `members` lists the whole group with each member's subscription
/// metadata; otherwise `members` is empty.
#[derive(Debug, Clone)]
pub struct JoinGroupResponse {
    pub error: KafkaCode,
    pub generation_id: i32,
    pub protocol_name: String,
    pub leader_id: String,
    pub member_id: String,
    pub members: Vec<JoinGroupMember>,
}

#[derive(Debug, Clone)]
pub struct JoinGroupMember {
    pub member_id: String,
    pub metadata: Bytes,
}

impl JoinGroupResponse {
    pub fn is_leader(&self) -> bool {
        self.leader_id == self.member_id
    }
}

pub fn parse_join_group_response(s: NomBytes) -> IResult<NomBytes, JoinGroupResponse> {
    let (s, error_code) = be_i16(s)?;
    let (s, generation_id) = be_i32(s)?;
    let (s, protocol_name) = parse_string(s)?;
    let (s, leader_id) = parse_string(s)?;
    let (s, member_id) = parse_string(s)?;
    let (s, members) = parse_array(parse_join_group_member)(s)?;

    Ok((
        s,
        JoinGroupResponse {
            error: kafka_code_from_wire(error_code),
            generation_id,
            protocol_name: bytes_to_string(&protocol_name)?,
            leader_id: bytes_to_string(&leader_id)?,
            member_id: bytes_to_string(&member_id)?,
            members,
        },
    ))
}

fn parse_join_group_member(s: NomBytes) -> IResult<NomBytes, JoinGroupMember> {
    let (s, member_id) = parse_string(s)?;
    let (s, metadata) = parse_bytes(s)?;

    Ok((
        s,
        JoinGroupMember {
            member_id: bytes_to_string(&member_id)?,
            metadata,
        },
    ))
}

// ============================================================================
// Heartbeat
// ============================================================================

/// Heartbeat response (v0).
#[derive(Debug, Clone)]
pub struct HeartbeatResponse {
    pub error: KafkaCode,
}

pub fn parse_heartbeat_response(s: NomBytes) -> IResult<NomBytes, HeartbeatResponse> {
    let (s, error_code) = be_i16(s)?;
    Ok((
        s,
        HeartbeatResponse {
            error: kafka_code_from_wire(error_code),
        },
    ))
}

// ============================================================================
// LeaveGroup
// ============================================================================

/// LeaveGroup response (v0).
#[derive(Debug, Clone)]
pub struct LeaveGroupResponse {
    pub error: KafkaCode,
}

pub fn parse_leave_group_response(s: NomBytes) -> IResult<NomBytes, LeaveGroupResponse> {
    let (s, error_code) = be_i16(s)?;
    Ok((
        s,
        LeaveGroupResponse {
            error: kafka_code_from_wire(error_code),
        },
    ))
}

// ============================================================================
// SyncGroup
// ============================================================================

/// SyncGroup response (v0). The assignment blob is this member's encoded
/// `MemberAssignment`; empty when the coordinator assigned nothing.
#[derive(Debug, Clone)]
pub struct SyncGroupResponse {
    pub error: KafkaCode,
    pub assignment: Bytes,
}

pub fn parse_sync_group_response(s: NomBytes) -> IResult<NomBytes, SyncGroupResponse> {
    let (s, error_code) = be_i16(s)?;
    let (s, assignment) = parse_bytes(s)?;

    Ok((
        s,
        SyncGroupResponse {
            error: kafka_code_from_wire(error_code),
            assignment,
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_string(s: &str, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&(s.len() as i16).to_be_bytes());
        buf.extend_from_slice(s.as_bytes());
    }

    #[test]
    fn test_parse_group_coordinator_response() {
        let mut data = Vec::new();
        data.extend_from_slice(&0i16.to_be_bytes());
        data.extend_from_slice(&3i32.to_be_bytes());
        build_string("kafka3", &mut data);
        data.extend_from_slice(&9092i32.to_be_bytes());

        let (_, response) =
            parse_group_coordinator_response(NomBytes::new(Bytes::from(data))).unwrap();
        assert_eq!(response.error, KafkaCode::None);
        assert_eq!(response.coordinator_id, 3);
        assert_eq!(response.coordinator_host, "kafka3");
        assert_eq!(response.coordinator_port, 9092);
    }

    #[test]
    fn test_parse_join_group_response_as_leader() {
        let mut data = Vec::new();
        data.extend_from_slice(&0i16.to_be_bytes());
        data.extend_from_slice(&7i32.to_be_bytes());
        build_string("standard", &mut data);
        build_string("member-1", &mut data); // leader
        build_string("member-1", &mut data); // self
        // two members with metadata blobs
        data.extend_from_slice(&2i32.to_be_bytes());
        build_string("member-1", &mut data);
        data.extend_from_slice(&2i32.to_be_bytes());
        data.extend_from_slice(b"\x00\x00");
        build_string("member-2", &mut data);
        data.extend_from_slice(&2i32.to_be_bytes());
        data.extend_from_slice(b"\x00\x00");

        let (_, response) =
            parse_join_group_response(NomBytes::new(Bytes::from(data))).unwrap();
        assert_eq!(response.generation_id, 7);
        assert!(response.is_leader());
        assert_eq!(response.members.len(), 2);
        assert_eq!(response.members[1].member_id, "member-2");
    }

    #[test]
    fn test_parse_join_group_response_as_follower() {
        let mut data = Vec::new();
        data.extend_from_slice(&0i16.to_be_bytes());
        data.extend_from_slice(&7i32.to_be_bytes());
        build_string("standard", &mut data);
        build_string("member-1", &mut data); // leader
        build_string("member-2", &mut data); // self
        data.extend_from_slice(&0i32.to_be_bytes()); // no member list

        let (_, response) =
            parse_join_group_response(NomBytes::new(Bytes::from(data))).unwrap();
        assert!(!response.is_leader());
        assert!(response.members.is_empty());
    }

    #[test]
    fn test_parse_heartbeat_rebalance_in_progress() {
        let data = 27i16.to_be_bytes();
        let (_, response) =
            parse_heartbeat_response(NomBytes::new(Bytes::from(data.to_vec()))).unwrap();
        assert_eq!(response.error, KafkaCode::RebalanceInProgress);
    }

    #[test]
    fn test_parse_sync_group_response() {
        let mut data = Vec::new();
        data.extend_from_slice(&0i16.to_be_bytes());
        data.extend_from_slice(&3i32.to_be_bytes());
        data.extend_from_slice(b"\x01\x02\x03");

        let (_, response) =
            parse_sync_group_response(NomBytes::new(Bytes::from(data))).unwrap();
        assert_eq!(response.error, KafkaCode::None);
        assert_eq!(response.assignment.as_ref(), b"\x01\x02\x03");
    }
}
