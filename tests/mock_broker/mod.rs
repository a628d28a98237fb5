#![allow(dead_code)] // each test binary uses a different slice of the fixture

//! A scriptable in-memory Kafka 0.9 broker for integration tests.
//!
//! Brokers share one [`ClusterState`], so a test can run several
//! listeners that agree on topology. That is enough to exercise leader
//! failover, rebalances, and offset storage against real sockets.
//!
//! The group coordination here is deliberately simplified: every
//! JoinGroup forms a fresh membership of the joiner plus any scripted
//! ghost members, with the joiner elected leader. That is sufficient to
//! drive a real client through join/sync/heartbeat transitions without
//! coordinating multiple live consumers inside a test.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

use gregor::consumer::assignor::MemberMetadata;
use gregor::prelude::protocol::messages::{encode_message_set, Message};

/// One partition's log and leadership.
pub struct PartitionData {
    pub leader: i32,
    /// First offset still held in the log; earlier ones were evicted.
    pub log_start: i64,
    pub messages: Vec<(Option<Vec<u8>>, Vec<u8>)>,
}

impl PartitionData {
    pub fn new(leader: i32) -> Self {
        PartitionData {
            leader,
            log_start: 0,
            messages: Vec::new(),
        }
    }

    fn high_watermark(&self) -> i64 {
        self.messages.len() as i64
    }
}

/// Topology, logs, offsets, and scripting knobs shared by all brokers.
#[derive(Default)]
pub struct ClusterState {
    /// node_id -> (host, port); filled in as brokers spawn.
    pub brokers: HashMap<i32, (String, i32)>,
    pub topics: HashMap<String, HashMap<i32, PartitionData>>,
    /// (group, topic, partition) -> committed offset.
    pub committed: HashMap<(String, String, i32), i64>,
    /// Node that answers GroupCoordinator requests.
    pub coordinator_node: i32,

    pub generation: i32,
    next_member: u32,
    /// member -> assignment blob stored by the leader's SyncGroup.
    pub assignments: HashMap<String, Vec<u8>>,

    /// Scripted error codes popped on each heartbeat; empty means 0.
    pub heartbeat_errors: VecDeque<i16>,
    /// Scripted error codes popped on each offset commit; empty means 0.
    pub commit_errors: VecDeque<i16>,
    /// Ghost members included in every join: (member_id, subscribed topics).
    pub ghost_members: Vec<(String, Vec<String>)>,
    /// Count of Metadata requests served, for dedup assertions.
    pub metadata_requests: usize,
    /// Count of Fetch requests served.
    pub fetch_requests: usize,
    /// Count of OffsetCommit requests served.
    pub commit_requests: usize,
    /// Count of JoinGroup requests served.
    pub join_requests: usize,
    /// Count of SyncGroup requests served.
    pub sync_requests: usize,
}

impl ClusterState {
    pub fn new() -> Arc<Mutex<ClusterState>> {
        Arc::new(Mutex::new(ClusterState::default()))
    }

    /// Create a topic with `partitions` partitions all led by `leader`.
    pub fn create_topic(&mut self, name: &str, partitions: i32, leader: i32) {
        let topic = self.topics.entry(name.to_string()).or_default();
        for partition in 0..partitions {
            topic.insert(partition, PartitionData::new(leader));
        }
    }

    pub fn produce(&mut self, topic: &str, partition: i32, value: &[u8]) {
        self.topics
            .get_mut(topic)
            .expect("unknown topic")
            .get_mut(&partition)
            .expect("unknown partition")
            .messages
            .push((None, value.to_vec()));
    }

    pub fn committed_offset(&self, group: &str, topic: &str, partition: i32) -> Option<i64> {
        self.committed
            .get(&(group.to_string(), topic.to_string(), partition))
            .copied()
    }

    pub fn set_leader(&mut self, topic: &str, partition: i32, leader: i32) {
        self.topics
            .get_mut(topic)
            .expect("unknown topic")
            .get_mut(&partition)
            .expect("unknown partition")
            .leader = leader;
    }
}

/// A listening broker bound to an ephemeral local port.
pub struct MockBroker {
    pub node_id: i32,
    pub port: i32,
    handle: JoinHandle<()>,
}

impl MockBroker {
    pub async fn spawn(node_id: i32, state: Arc<Mutex<ClusterState>>) -> MockBroker {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let port = listener.local_addr().expect("local addr").port() as i32;
        state
            .lock()
            .unwrap()
            .brokers
            .insert(node_id, ("127.0.0.1".to_string(), port));

        let accept_state = state.clone();
        let handle = tokio::spawn(async move {
            loop {
                let Ok((socket, _)) = listener.accept().await else {
                    break;
                };
                let conn_state = accept_state.clone();
                tokio::spawn(async move {
                    let _ = serve_connection(node_id, conn_state, socket).await;
                });
            }
        });

        MockBroker {
            node_id,
            port,
            handle,
        }
    }

    pub fn addr(&self) -> String {
        format!("127.0.0.1:{}", self.port)
    }
}

impl Drop for MockBroker {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn serve_connection(
    node_id: i32,
    state: Arc<Mutex<ClusterState>>,
    mut socket: TcpStream,
) -> std::io::Result<()> {
    loop {
        let mut size_buf = [0u8; 4];
        if socket.read_exact(&mut size_buf).await.is_err() {
            return Ok(());
        }
        let size = i32::from_be_bytes(size_buf) as usize;
        let mut frame = vec![0u8; size];
        socket.read_exact(&mut frame).await?;

        let mut reader = Reader::new(&frame);
        let api_key = reader.i16();
        let _api_version = reader.i16();
        let correlation_id = reader.i32();
        let _client_id = reader.string();

        let body = {
            let mut state = state.lock().unwrap();
            match api_key {
                1 => handle_fetch(node_id, &mut state, &mut reader),
                2 => handle_list_offsets(&mut state, &mut reader),
                3 => handle_metadata(&mut state, &mut reader),
                8 => handle_offset_commit(&mut state, &mut reader),
                9 => handle_offset_fetch(&mut state, &mut reader),
                10 => handle_group_coordinator(&mut state, &mut reader),
                11 => handle_join_group(&mut state, &mut reader),
                12 => handle_heartbeat(&mut state, &mut reader),
                13 => handle_leave_group(&mut state, &mut reader),
                14 => handle_sync_group(&mut state, &mut reader),
                other => panic!("mock broker got unexpected api_key {other}"),
            }
        };

        let mut response = Vec::with_capacity(8 + body.len());
        response.extend_from_slice(&((body.len() + 4) as i32).to_be_bytes());
        response.extend_from_slice(&correlation_id.to_be_bytes());
        response.extend_from_slice(&body);
        socket.write_all(&response).await?;
    }
}

// ============================================================================
// Handlers
// ============================================================================

fn handle_metadata(state: &mut ClusterState, reader: &mut Reader) -> Vec<u8> {
    state.metadata_requests += 1;

    let count = reader.i32();
    let mut requested = Vec::new();
    for _ in 0..count {
        requested.push(reader.string());
    }
    if requested.is_empty() {
        requested = state.topics.keys().cloned().collect();
        requested.sort();
    }

    let mut w = Writer::new();
    let mut broker_ids: Vec<&i32> = state.brokers.keys().collect();
    broker_ids.sort();
    w.i32(broker_ids.len() as i32);
    for id in broker_ids {
        let (host, port) = &state.brokers[id];
        w.i32(*id);
        w.string(host);
        w.i32(*port);
    }

    w.i32(requested.len() as i32);
    for topic in requested {
        match state.topics.get(&topic) {
            Some(partitions) => {
                w.i16(0);
                w.string(&topic);
                let mut ids: Vec<&i32> = partitions.keys().collect();
                ids.sort();
                w.i32(ids.len() as i32);
                for id in ids {
                    let leader = partitions[id].leader;
                    w.i16(0);
                    w.i32(*id);
                    w.i32(leader);
                    w.i32(1);
                    w.i32(leader); // replicas
                    w.i32(1);
                    w.i32(leader); // isr
                }
            }
            None => {
                w.i16(3); // UnknownTopicOrPartition
                w.string(&topic);
                w.i32(0);
            }
        }
    }
    w.finish()
}

fn handle_group_coordinator(state: &mut ClusterState, reader: &mut Reader) -> Vec<u8> {
    let _group_id = reader.string();
    let (host, port) = state.brokers[&state.coordinator_node].clone();

    let mut w = Writer::new();
    w.i16(0);
    w.i32(state.coordinator_node);
    w.string(&host);
    w.i32(port);
    w.finish()
}

fn handle_join_group(state: &mut ClusterState, reader: &mut Reader) -> Vec<u8> {
    state.join_requests += 1;

    let _group_id = reader.string();
    let _session_timeout = reader.i32();
    let mut member_id = reader.string();
    let _protocol_type = reader.string();
    let protocol_count = reader.i32();
    let mut metadata = Vec::new();
    let mut protocol_name = String::new();
    for _ in 0..protocol_count {
        protocol_name = reader.string();
        metadata = reader.bytes();
    }

    if member_id.is_empty() {
        state.next_member += 1;
        member_id = format!("member-{}", state.next_member);
    }
    state.generation += 1;
    state.assignments.clear();

    // Membership = joiner + scripted ghosts; joiner leads.
    let mut members = vec![(member_id.clone(), metadata)];
    for (ghost_id, topics) in &state.ghost_members {
        let ghost_metadata = MemberMetadata::new(topics.clone())
            .to_bytes()
            .expect("encode ghost metadata");
        members.push((ghost_id.clone(), ghost_metadata.to_vec()));
    }

    let mut w = Writer::new();
    w.i16(0);
    w.i32(state.generation);
    w.string(&protocol_name);
    w.string(&member_id); // leader
    w.string(&member_id); // self
    w.i32(members.len() as i32);
    for (id, meta) in members {
        w.string(&id);
        w.bytes(&meta);
    }
    w.finish()
}

fn handle_sync_group(state: &mut ClusterState, reader: &mut Reader) -> Vec<u8> {
    state.sync_requests += 1;

    let _group_id = reader.string();
    let _generation = reader.i32();
    let member_id = reader.string();
    let count = reader.i32();
    for _ in 0..count {
        let member = reader.string();
        let assignment = reader.bytes();
        state.assignments.insert(member, assignment);
    }

    let assignment = state
        .assignments
        .get(&member_id)
        .cloned()
        .unwrap_or_default();

    let mut w = Writer::new();
    w.i16(0);
    w.bytes(&assignment);
    w.finish()
}

fn handle_heartbeat(state: &mut ClusterState, reader: &mut Reader) -> Vec<u8> {
    let _group_id = reader.string();
    let _generation = reader.i32();
    let _member_id = reader.string();

    let error = state.heartbeat_errors.pop_front().unwrap_or(0);
    let mut w = Writer::new();
    w.i16(error);
    w.finish()
}

fn handle_leave_group(_state: &mut ClusterState, reader: &mut Reader) -> Vec<u8> {
    let _group_id = reader.string();
    let _member_id = reader.string();

    let mut w = Writer::new();
    w.i16(0);
    w.finish()
}

fn handle_offset_commit(state: &mut ClusterState, reader: &mut Reader) -> Vec<u8> {
    state.commit_requests += 1;

    let group_id = reader.string();
    let _generation = reader.i32();
    let _member_id = reader.string();
    let _retention = reader.i64();

    let error = state.commit_errors.pop_front().unwrap_or(0);

    let topic_count = reader.i32();
    let mut w = Writer::new();
    w.i32(topic_count);
    for _ in 0..topic_count {
        let topic = reader.string();
        let partition_count = reader.i32();
        w.string(&topic);
        w.i32(partition_count);
        for _ in 0..partition_count {
            let partition = reader.i32();
            let offset = reader.i64();
            let _metadata = reader.nullable_string();
            if error == 0 {
                state
                    .committed
                    .insert((group_id.clone(), topic.clone(), partition), offset);
            }
            w.i32(partition);
            w.i16(error);
        }
    }
    w.finish()
}

fn handle_offset_fetch(state: &mut ClusterState, reader: &mut Reader) -> Vec<u8> {
    let group_id = reader.string();
    let topic_count = reader.i32();

    let mut w = Writer::new();
    w.i32(topic_count);
    for _ in 0..topic_count {
        let topic = reader.string();
        let partition_count = reader.i32();
        w.string(&topic);
        w.i32(partition_count);
        for _ in 0..partition_count {
            let partition = reader.i32();
            let offset = state
                .committed
                .get(&(group_id.clone(), topic.clone(), partition))
                .copied()
                .unwrap_or(-1);
            w.i32(partition);
            w.i64(offset);
            w.i16(-1); // null metadata
            w.i16(0);
        }
    }
    w.finish()
}

fn handle_list_offsets(state: &mut ClusterState, reader: &mut Reader) -> Vec<u8> {
    let _replica_id = reader.i32();
    let topic_count = reader.i32();

    let mut w = Writer::new();
    w.i32(topic_count);
    for _ in 0..topic_count {
        let topic = reader.string();
        let partition_count = reader.i32();
        w.string(&topic);
        w.i32(partition_count);
        for _ in 0..partition_count {
            let partition = reader.i32();
            let timestamp = reader.i64();
            let _max_offsets = reader.i32();

            match state.topics.get(&topic).and_then(|t| t.get(&partition)) {
                Some(data) => {
                    let offset = if timestamp == -2 {
                        data.log_start
                    } else {
                        data.high_watermark()
                    };
                    w.i32(partition);
                    w.i16(0);
                    w.i32(1);
                    w.i64(offset);
                }
                None => {
                    w.i32(partition);
                    w.i16(3); // UnknownTopicOrPartition
                    w.i32(0);
                }
            }
        }
    }
    w.finish()
}

fn handle_fetch(node_id: i32, state: &mut ClusterState, reader: &mut Reader) -> Vec<u8> {
    state.fetch_requests += 1;

    let _replica_id = reader.i32();
    let _max_wait = reader.i32();
    let _min_bytes = reader.i32();
    let topic_count = reader.i32();

    let mut w = Writer::new();
    w.i32(topic_count);
    for _ in 0..topic_count {
        let topic = reader.string();
        let partition_count = reader.i32();
        w.string(&topic);
        w.i32(partition_count);
        for _ in 0..partition_count {
            let partition = reader.i32();
            let fetch_offset = reader.i64();
            let max_bytes = reader.i32();

            let Some(data) = state.topics.get(&topic).and_then(|t| t.get(&partition)) else {
                w.i32(partition);
                w.i16(3); // UnknownTopicOrPartition
                w.i64(-1);
                w.i32(0);
                continue;
            };

            if data.leader != node_id {
                w.i32(partition);
                w.i16(6); // NotLeaderForPartition
                w.i64(-1);
                w.i32(0);
                continue;
            }

            if fetch_offset < data.log_start {
                w.i32(partition);
                w.i16(1); // OffsetOutOfRange
                w.i64(data.high_watermark());
                w.i32(0);
                continue;
            }

            // Past the log end: an empty set with the current watermark.
            let high_watermark = data.high_watermark();

            let messages: Vec<Message> = data
                .messages
                .iter()
                .enumerate()
                .skip(fetch_offset.max(0) as usize)
                .map(|(offset, (key, value))| Message {
                    offset: offset as i64,
                    key: key.as_ref().map(|k| Bytes::from(k.clone())),
                    value: Some(Bytes::from(value.clone())),
                })
                .collect();

            let mut set = Vec::new();
            encode_message_set(&messages, &mut set).expect("encode message set");
            // Apply the client's byte budget, truncating mid-message the
            // way a real broker does.
            set.truncate(max_bytes.max(0) as usize);

            w.i32(partition);
            w.i16(0);
            w.i64(high_watermark);
            w.i32(set.len() as i32);
            w.raw(&set);
        }
    }
    w.finish()
}

// ============================================================================
// Byte cursor helpers
// ============================================================================

pub struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Reader { buf, pos: 0 }
    }

    pub fn i16(&mut self) -> i16 {
        let v = i16::from_be_bytes(self.buf[self.pos..self.pos + 2].try_into().unwrap());
        self.pos += 2;
        v
    }

    pub fn i32(&mut self) -> i32 {
        let v = i32::from_be_bytes(self.buf[self.pos..self.pos + 4].try_into().unwrap());
        self.pos += 4;
        v
    }

    pub fn i64(&mut self) -> i64 {
        let v = i64::from_be_bytes(self.buf[self.pos..self.pos + 8].try_into().unwrap());
        self.pos += 8;
        v
    }

    pub fn string(&mut self) -> String {
        let len = self.i16();
        if len < 0 {
            return String::new();
        }
        let end = self.pos + len as usize;
        let s = String::from_utf8(self.buf[self.pos..end].to_vec()).unwrap();
        self.pos = end;
        s
    }

    pub fn nullable_string(&mut self) -> Option<String> {
        let len = self.i16();
        if len < 0 {
            return None;
        }
        let end = self.pos + len as usize;
        let s = String::from_utf8(self.buf[self.pos..end].to_vec()).unwrap();
        self.pos = end;
        Some(s)
    }

    pub fn bytes(&mut self) -> Vec<u8> {
        let len = self.i32();
        if len < 0 {
            return Vec::new();
        }
        let end = self.pos + len as usize;
        let b = self.buf[self.pos..end].to_vec();
        self.pos = end;
        b
    }
}

pub struct Writer(Vec<u8>);

impl Writer {
    pub fn new() -> Self {
        Writer(Vec::new())
    }

    pub fn i16(&mut self, v: i16) {
        self.0.extend_from_slice(&v.to_be_bytes());
    }

    pub fn i32(&mut self, v: i32) {
        self.0.extend_from_slice(&v.to_be_bytes());
    }

    pub fn i64(&mut self, v: i64) {
        self.0.extend_from_slice(&v.to_be_bytes());
    }

    pub fn string(&mut self, s: &str) {
        self.i16(s.len() as i16);
        self.0.extend_from_slice(s.as_bytes());
    }

    pub fn bytes(&mut self, b: &[u8]) {
        self.i32(b.len() as i32);
        self.0.extend_from_slice(b);
    }

    pub fn raw(&mut self, b: &[u8]) {
        self.0.extend_from_slice(b);
    }

    pub fn finish(self) -> Vec<u8> {
        self.0
    }
}
