//! Consumer group membership.
//!
//! The group moves through three states:
//!
//! ```text
//! UNJOINED --join--> JOINED --sync--> STABLE --rebalance--> UNJOINED
//!                                          \--leave/error--> UNJOINED
//! ```
//!
//! A member is in the group only while holding a valid
//! `(member_id, generation_id)` pair; any `IllegalGeneration`,
//! `UnknownMemberId`, or `RebalanceInProgress` response invalidates it
//! and sends the state machine back to UNJOINED.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use bytes::Bytes;
use tokio::time::Instant;

use crate::cluster::Cluster;
use crate::config::GroupConfig;
use crate::constants::{ASSIGNMENT_PROTOCOL_NAME, CONSUMER_PROTOCOL_TYPE};
use crate::encode::ToByte;
use crate::error::{Error, KafkaCode, Result};
use crate::parser::parse_frame;
use crate::protocol::request::{
    HeartbeatRequest, JoinGroupProtocol, JoinGroupRequest, LeaveGroupRequest, SyncGroupAssignment,
    SyncGroupRequest,
};
use crate::protocol::response::{
    parse_heartbeat_response, parse_join_group_response, parse_leave_group_response,
    parse_sync_group_response, JoinGroupResponse,
};
use crate::protocol::ApiKey;
use crate::retry;

use super::assignor::{assign_round_robin, MemberAssignment, MemberMetadata};

/// Membership state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GroupState {
    /// Not a member; `join` must run before any group-bound request.
    #[default]
    Unjoined,
    /// JoinGroup accepted, SyncGroup outstanding.
    Joined,
    /// Holding a valid assignment for the current generation.
    Stable,
}

/// One member's view of a consumer group.
pub struct ConsumerGroup {
    cluster: Arc<Cluster>,
    config: GroupConfig,
    state: GroupState,
    /// Broker-assigned id; empty until the first join completes.
    member_id: String,
    generation_id: i32,
    is_leader: bool,
    /// Subscribed topics, in subscription order.
    topics: Vec<String>,
    /// The most recent SyncGroup result.
    assignment: HashMap<String, Vec<i32>>,
    last_heartbeat: Option<Instant>,
}

impl ConsumerGroup {
    pub fn new(cluster: Arc<Cluster>, config: GroupConfig) -> Result<Self> {
        config.validate()?;
        Ok(ConsumerGroup {
            cluster,
            config,
            state: GroupState::Unjoined,
            member_id: String::new(),
            generation_id: -1,
            is_leader: false,
            topics: Vec::new(),
            assignment: HashMap::new(),
            last_heartbeat: None,
        })
    }

    pub fn group_id(&self) -> &str {
        &self.config.group_id
    }

    pub fn member_id(&self) -> &str {
        &self.member_id
    }

    pub fn generation_id(&self) -> i32 {
        self.generation_id
    }

    pub fn is_leader(&self) -> bool {
        self.is_leader
    }

    pub fn is_member(&self) -> bool {
        self.state == GroupState::Stable
    }

    pub fn state(&self) -> GroupState {
        self.state
    }

    /// Record a topic in the subscription set. Takes effect at the next
    /// join.
    pub fn subscribe(&mut self, topic: &str) {
        if !self.topics.iter().any(|t| t == topic) {
            self.topics.push(topic.to_string());
        }
    }

    pub fn subscribed_topics(&self) -> &[String] {
        &self.topics
    }

    /// The partitions assigned to this member for the current generation.
    pub fn assigned_partitions(&self) -> &HashMap<String, Vec<i32>> {
        &self.assignment
    }

    // ========================================================================
    // Join / Sync
    // ========================================================================

    /// Join the group and obtain an assignment, retrying with backoff
    /// until the membership is STABLE or the retry budget runs out.
    pub async fn join(&mut self) -> Result<()> {
        if self.topics.is_empty() {
            return Err(Error::Config(
                "cannot join a group with no subscribed topics".into(),
            ));
        }

        use backon::BackoffBuilder;
        let mut backoff = retry::join_policy(self.cluster.config().retry_budget).build();

        loop {
            let error = match self.join_and_sync().await {
                Ok(()) => return Ok(()),
                Err(e) => e,
            };
            if !self.join_error_is_retriable(&error) {
                return Err(error);
            }
            match backoff.next() {
                Some(delay) => {
                    tracing::warn!(
                        group_id = %self.config.group_id,
                        error = %error,
                        backoff = ?delay,
                        "join attempt failed; retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                None => {
                    tracing::error!(
                        group_id = %self.config.group_id,
                        error = %error,
                        "join retry budget exhausted"
                    );
                    return Err(error);
                }
            }
        }
    }

    /// Classify a join failure, adjusting local state so the retry can
    /// succeed: stale coordinators are dropped, a rejected member id is
    /// cleared.
    fn join_error_is_retriable(&mut self, error: &Error) -> bool {
        match error {
            Error::Kafka(code) => {
                match code {
                    KafkaCode::UnknownMemberId => self.member_id.clear(),
                    KafkaCode::GroupCoordinatorNotAvailable
                    | KafkaCode::NotCoordinatorForGroup => {
                        self.cluster.invalidate_coordinator(&self.config.group_id);
                    }
                    _ => {}
                }
                code.is_rebalance_error() || code.is_topology_error()
            }
            Error::NoCoordinator(_) => true,
            e if e.is_transport() => {
                self.cluster.invalidate_coordinator(&self.config.group_id);
                true
            }
            _ => false,
        }
    }

    /// One join + sync sequence.
    async fn join_and_sync(&mut self) -> Result<()> {
        let join = self.send_join_group().await?;

        self.member_id = join.member_id.clone();
        self.generation_id = join.generation_id;
        self.is_leader = join.is_leader();
        self.state = GroupState::Joined;

        tracing::debug!(
            group_id = %self.config.group_id,
            member_id = %self.member_id,
            generation_id = self.generation_id,
            is_leader = self.is_leader,
            protocol = %join.protocol_name,
            "joined group"
        );

        let assignments = if self.is_leader {
            self.compute_assignments(&join).await?
        } else {
            Vec::new()
        };

        let assignment = self.send_sync_group(assignments).await?;
        self.assignment = assignment.to_map();
        self.state = GroupState::Stable;
        self.last_heartbeat = Some(Instant::now());

        tracing::info!(
            group_id = %self.config.group_id,
            member_id = %self.member_id,
            generation_id = self.generation_id,
            partitions = assignment.partition_count(),
            "group membership stable"
        );

        Ok(())
    }

    async fn send_join_group(&mut self) -> Result<JoinGroupResponse> {
        let metadata = MemberMetadata::new(self.topics.clone()).to_bytes()?;
        let request = JoinGroupRequest {
            group_id: self.config.group_id.clone(),
            session_timeout_ms: self.config.session_timeout_ms(),
            member_id: self.member_id.clone(),
            protocol_type: CONSUMER_PROTOCOL_TYPE.to_string(),
            protocols: vec![JoinGroupProtocol {
                name: ASSIGNMENT_PROTOCOL_NAME.to_string(),
                metadata,
            }],
        };

        let frame = self.coordinator_request(ApiKey::JoinGroup, 0, &request).await?;
        let response = parse_frame(frame, parse_join_group_response)?;
        if response.error != KafkaCode::None {
            return Err(Error::Kafka(response.error));
        }
        Ok(response)
    }

    /// Leader only: decode every member's subscription and deal out
    /// partitions.
    async fn compute_assignments(
        &mut self,
        join: &JoinGroupResponse,
    ) -> Result<Vec<SyncGroupAssignment>> {
        let mut subscribed_topics: BTreeMap<String, Vec<i32>> = BTreeMap::new();
        let mut member_ids = Vec::with_capacity(join.members.len());

        for member in &join.members {
            member_ids.push(member.member_id.clone());
            let metadata = MemberMetadata::from_bytes(member.metadata.clone())?;
            for topic in metadata.topics {
                subscribed_topics.entry(topic).or_default();
            }
        }

        for (topic, partitions) in subscribed_topics.iter_mut() {
            *partitions = self.cluster.partitions_for(topic).await?;
        }

        let assignments = assign_round_robin(&member_ids, &subscribed_topics);

        tracing::debug!(
            group_id = %self.config.group_id,
            members = member_ids.len(),
            topics = subscribed_topics.len(),
            "computed round-robin assignment as leader"
        );

        assignments
            .into_iter()
            .map(|(member_id, assignment)| {
                Ok(SyncGroupAssignment {
                    member_id,
                    assignment: assignment.to_bytes()?,
                })
            })
            .collect()
    }

    async fn send_sync_group(
        &mut self,
        assignments: Vec<SyncGroupAssignment>,
    ) -> Result<MemberAssignment> {
        let request = SyncGroupRequest {
            group_id: self.config.group_id.clone(),
            generation_id: self.generation_id,
            member_id: self.member_id.clone(),
            assignments,
        };

        let frame = self.coordinator_request(ApiKey::SyncGroup, 0, &request).await?;
        let response = parse_frame(frame, parse_sync_group_response)?;
        if response.error != KafkaCode::None {
            return Err(Error::Kafka(response.error));
        }
        MemberAssignment::from_bytes(response.assignment)
    }

    // ========================================================================
    // Heartbeat
    // ========================================================================

    /// Send one heartbeat and apply its verdict to the state machine.
    pub async fn heartbeat(&mut self) -> Result<KafkaCode> {
        if !self.is_member() {
            return Err(Error::NotGroupMember);
        }

        let request = HeartbeatRequest {
            group_id: self.config.group_id.clone(),
            generation_id: self.generation_id,
            member_id: self.member_id.clone(),
        };

        let frame = self.coordinator_request(ApiKey::Heartbeat, 0, &request).await?;
        let response = parse_frame(frame, parse_heartbeat_response)?;

        match response.error {
            KafkaCode::None => {
                self.last_heartbeat = Some(Instant::now());
                Ok(KafkaCode::None)
            }
            code => {
                tracing::warn!(
                    group_id = %self.config.group_id,
                    error = ?code,
                    "heartbeat rejected"
                );
                self.membership_lost(code);
                Err(Error::Kafka(code))
            }
        }
    }

    /// Heartbeat only when the gap since the last successful one
    /// approaches the session timeout. Returns `None` when nothing was
    /// sent.
    pub async fn heartbeat_if_due(&mut self) -> Result<Option<KafkaCode>> {
        if !self.heartbeat_due() {
            return Ok(None);
        }
        self.heartbeat().await.map(Some)
    }

    fn heartbeat_due(&self) -> bool {
        let deadline = self
            .config
            .session_timeout
            .saturating_sub(self.config.heartbeat_grace);
        match self.last_heartbeat {
            Some(at) => at.elapsed() >= deadline,
            None => true,
        }
    }

    /// React to a rebalance-class error seen anywhere (heartbeat, commit,
    /// sync): drop to UNJOINED, and forget the member id when the
    /// coordinator no longer recognises it.
    pub fn membership_lost(&mut self, code: KafkaCode) {
        match code {
            KafkaCode::IllegalGeneration | KafkaCode::UnknownMemberId => {
                self.member_id.clear();
                self.generation_id = -1;
            }
            KafkaCode::GroupCoordinatorNotAvailable | KafkaCode::NotCoordinatorForGroup => {
                self.cluster.invalidate_coordinator(&self.config.group_id);
            }
            _ => {}
        }
        self.state = GroupState::Unjoined;
        self.is_leader = false;
        self.assignment.clear();
    }

    // ========================================================================
    // Leave
    // ========================================================================

    /// Leave the group on a best-effort basis. Errors are swallowed;
    /// local state is always cleared.
    pub async fn leave(&mut self) {
        if !self.member_id.is_empty() {
            let request = LeaveGroupRequest {
                group_id: self.config.group_id.clone(),
                member_id: self.member_id.clone(),
            };

            match self.coordinator_request(ApiKey::LeaveGroup, 0, &request).await {
                Ok(frame) => match parse_frame(frame, parse_leave_group_response) {
                    Ok(response) if response.error != KafkaCode::None => {
                        tracing::debug!(
                            group_id = %self.config.group_id,
                            error = ?response.error,
                            "leave group rejected"
                        );
                    }
                    Ok(_) => {}
                    Err(e) => {
                        tracing::debug!(group_id = %self.config.group_id, error = %e, "leave group response unreadable");
                    }
                },
                Err(e) => {
                    tracing::debug!(group_id = %self.config.group_id, error = %e, "leave group failed");
                }
            }
        }

        self.member_id.clear();
        self.generation_id = -1;
        self.is_leader = false;
        self.state = GroupState::Unjoined;
        self.assignment.clear();
        self.last_heartbeat = None;
    }

    // ========================================================================
    // Coordinator plumbing
    // ========================================================================

    /// Send a request to the group's coordinator, returning the raw
    /// response body.
    pub(crate) async fn coordinator_request<B: ToByte>(
        &self,
        api_key: ApiKey,
        api_version: i16,
        body: &B,
    ) -> Result<Bytes> {
        let coordinator = self
            .cluster
            .get_group_coordinator(&self.config.group_id)
            .await?;
        let connection = self.cluster.connection_for(&coordinator);
        let mut connection = connection.lock().await;
        connection.request(api_key, api_version, body).await
    }
}

impl std::fmt::Debug for ConsumerGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsumerGroup")
            .field("group_id", &self.config.group_id)
            .field("state", &self.state)
            .field("member_id", &self.member_id)
            .field("generation_id", &self.generation_id)
            .field("is_leader", &self.is_leader)
            .finish()
    }
}
