//! Crate & protocol level errors.
//!
//! Two layers:
//!
//! - [`Error`]: everything that can go wrong on this side of the wire:
//!   transport failures, framing violations, parse errors, and exhausted
//!   retry budgets.
//! - [`KafkaCode`]: the `int16` error codes a 0.9-era broker embeds in its
//!   responses, surfaced through [`Error::Kafka`].
//!
//! The classifier methods on [`KafkaCode`] drive the client's retry and
//! rebalance behavior: topology errors invalidate caches and retry,
//! rebalance errors reset group membership, everything else surfaces to
//! the caller.

use bytes::Bytes;
use num_derive::FromPrimitive;
use std::{io, result};
use thiserror::Error as ThisError;

pub type Result<T> = result::Result<T, Error>;

/// Client-side errors.
#[derive(Clone, Debug, ThisError)]
pub enum Error {
    /// An error in the network. The connection is closed and re-dialed on
    /// the next request.
    #[error("IO error: {0:?}")]
    Io(io::ErrorKind),

    /// The peer closed the stream, or a frame ended before its declared
    /// size was consumed.
    #[error("Unexpected EOF while reading from broker")]
    UnexpectedEof,

    /// Could not parse the data.
    #[error("Parsing error: invalid data ({} bytes)", .0.len())]
    ParsingError(Bytes),

    /// A fetched message failed its CRC check.
    #[error("Corrupt message: CRC mismatch (expected {expected:#010x}, computed {computed:#010x})")]
    CorruptMessage { expected: u32, computed: u32 },

    /// A message carried a compression codec this client does not decode.
    #[error("Unsupported compression codec: {0}")]
    UnsupportedCompression(i8),

    /// No seed or cached broker answered a metadata request.
    #[error("No broker available after exhausting seed list")]
    NoBrokerAvailable,

    /// The group coordinator could not be located.
    #[error("No coordinator available for group {0:?}")]
    NoCoordinator(String),

    /// A group operation was attempted without a live membership.
    #[error("Not a member of the consumer group")]
    NotGroupMember,

    /// The broker answered with a protocol-level error code.
    #[error("Broker error: {0:?}")]
    Kafka(KafkaCode),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl PartialEq for Error {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Error::Io(a), Error::Io(b)) => a == b,
            (Error::UnexpectedEof, Error::UnexpectedEof) => true,
            (Error::ParsingError(a), Error::ParsingError(b)) => a == b,
            (
                Error::CorruptMessage {
                    expected: a,
                    computed: b,
                },
                Error::CorruptMessage {
                    expected: c,
                    computed: d,
                },
            ) => a == c && b == d,
            (Error::UnsupportedCompression(a), Error::UnsupportedCompression(b)) => a == b,
            (Error::NoBrokerAvailable, Error::NoBrokerAvailable) => true,
            (Error::NoCoordinator(a), Error::NoCoordinator(b)) => a == b,
            (Error::NotGroupMember, Error::NotGroupMember) => true,
            (Error::Kafka(a), Error::Kafka(b)) => a == b,
            (Error::Config(a), Error::Config(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Error {}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            Error::UnexpectedEof
        } else {
            Error::Io(e.kind())
        }
    }
}

impl From<KafkaCode> for Error {
    fn from(code: KafkaCode) -> Self {
        Error::Kafka(code)
    }
}

impl Error {
    /// Transport errors are retried by re-dialing; they never carry
    /// protocol state.
    pub fn is_transport(&self) -> bool {
        matches!(self, Error::Io(_) | Error::UnexpectedEof)
    }

    /// True when the error means group membership was lost and the
    /// consumer must re-join before continuing.
    pub fn requires_rejoin(&self) -> bool {
        match self {
            Error::Kafka(code) => code.is_rebalance_error(),
            Error::NotGroupMember => true,
            _ => false,
        }
    }
}

/// Various errors reported by a remote Kafka server.
/// See also [Kafka Errors](http://kafka.apache.org/protocol.html)
#[derive(Debug, Copy, Clone, PartialEq, Eq, FromPrimitive, Default)]
pub enum KafkaCode {
    /// An unexpected server error
    Unknown = -1,
    #[default]
    None = 0,
    /// The requested offset is outside the range of offsets
    /// maintained by the server for the given topic/partition
    OffsetOutOfRange = 1,
    /// This indicates that a message contents does not match its CRC
    CorruptMessage = 2,
    /// This request is for a topic or partition that does not exist
    /// on this broker.
    UnknownTopicOrPartition = 3,
    /// The message has a negative size
    InvalidMessageSize = 4,
    /// This error is thrown if we are in the middle of a leadership
    /// election and there is currently no leader for this partition
    /// and hence it is unavailable for writes.
    LeaderNotAvailable = 5,
    /// This error is thrown if the client attempts to send messages
    /// to a replica that is not the leader for some partition. It
    /// indicates that the clients metadata is out of date.
    NotLeaderForPartition = 6,
    /// This error is thrown if the request exceeds the user-specified
    /// time limit in the request.
    RequestTimedOut = 7,
    /// This is not a client facing error and is used mostly by tools
    /// when a broker is not alive.
    BrokerNotAvailable = 8,
    /// If replica is expected on a broker, but is not (this can be
    /// safely ignored).
    ReplicaNotAvailable = 9,
    /// The server has a configurable maximum message size to avoid
    /// unbounded memory allocation. This error is thrown if the
    /// client attempt to produce a message larger than this maximum.
    MessageSizeTooLarge = 10,
    /// Internal error code for broker-to-broker communication.
    StaleControllerEpoch = 11,
    /// If you specify a string larger than configured maximum for
    /// offset metadata
    OffsetMetadataTooLarge = 12,
    /// The server disconnected before a response was received.
    NetworkException = 13,
    /// The broker returns this error code for an offset fetch request
    /// if it is still loading offsets (after a leader change for that
    /// offsets topic partition), or in response to group membership
    /// requests (such as heartbeats) when group metadata is being
    /// loaded by the coordinator.
    GroupLoadInProgress = 14,
    /// The broker returns this error code for group coordinator
    /// requests, offset commits, and most group management requests
    /// if the offsets topic has not yet been created, or if the group
    /// coordinator is not active.
    GroupCoordinatorNotAvailable = 15,
    /// The broker returns this error code if it receives an offset
    /// fetch or commit request for a group that it is not a
    /// coordinator for.
    NotCoordinatorForGroup = 16,
    /// For a request which attempts to access an invalid topic
    /// (e.g. one which has an illegal name), or if an attempt is made
    /// to write to an internal topic (such as the consumer offsets
    /// topic).
    InvalidTopic = 17,
    /// If a message batch in a produce request exceeds the maximum
    /// configured segment size.
    RecordListTooLarge = 18,
    /// Returned from a produce request when the number of in-sync
    /// replicas is lower than the configured minimum and requiredAcks is
    /// -1.
    NotEnoughReplicas = 19,
    /// Returned from a produce request when the message was written
    /// to the log, but with fewer in-sync replicas than required.
    NotEnoughReplicasAfterAppend = 20,
    /// Returned from a produce request if the requested requiredAcks is
    /// invalid (anything other than -1, 1, or 0).
    InvalidRequiredAcks = 21,
    /// Returned from group membership requests (such as heartbeats) when
    /// the generation id provided in the request is not the current
    /// generation.
    IllegalGeneration = 22,
    /// Returned in join group when the member provides a protocol type or
    /// set of protocols which is not compatible with the current group.
    InconsistentGroupProtocol = 23,
    /// Returned in join group when the groupId is empty or null.
    InvalidGroupId = 24,
    /// Returned from group requests (offset commits/fetches, heartbeats,
    /// etc) when the memberId is not in the current generation.
    UnknownMemberId = 25,
    /// Return in join group when the requested session timeout is outside
    /// of the allowed range on the broker
    InvalidSessionTimeout = 26,
    /// Returned in heartbeat requests when the coordinator has begun
    /// rebalancing the group. This indicates to the client that it
    /// should rejoin the group.
    RebalanceInProgress = 27,
    /// This error indicates that an offset commit was rejected because of
    /// oversize metadata.
    InvalidCommitOffsetSize = 28,
    /// Returned by the broker when the client is not authorized to access
    /// the requested topic.
    TopicAuthorizationFailed = 29,
    /// Returned by the broker when the client is not authorized to access
    /// a particular groupId.
    GroupAuthorizationFailed = 30,
    /// Returned by the broker when the client is not authorized to use an
    /// inter-broker or administrative API.
    ClusterAuthorizationFailed = 31,
    /// The timestamp of the message is out of acceptable range.
    InvalidTimestamp = 32,
    /// The broker does not support the requested SASL mechanism.
    UnsupportedSaslMechanism = 33,
    /// Request is not valid given the current SASL state.
    IllegalSaslState = 34,
    /// The version of API is not supported.
    UnsupportedVersion = 35,
    /// Topic with this name already exists.
    TopicAlreadyExists = 36,
}

impl KafkaCode {
    /// Errors that invalidate the member's `(member_id, generation_id)`
    /// pair. The consumer must re-run the join/sync sequence.
    pub fn is_rebalance_error(self) -> bool {
        matches!(
            self,
            KafkaCode::RebalanceInProgress
                | KafkaCode::IllegalGeneration
                | KafkaCode::UnknownMemberId
        )
    }

    /// Errors caused by a stale topology or coordinator cache. The cache
    /// entry is invalidated and the operation retried with backoff.
    pub fn is_topology_error(self) -> bool {
        matches!(
            self,
            KafkaCode::LeaderNotAvailable
                | KafkaCode::NotLeaderForPartition
                | KafkaCode::UnknownTopicOrPartition
                | KafkaCode::GroupCoordinatorNotAvailable
                | KafkaCode::NotCoordinatorForGroup
                | KafkaCode::GroupLoadInProgress
        )
    }

    /// True for codes that a retry (possibly after a cache refresh) can
    /// reasonably clear.
    pub fn is_retriable(self) -> bool {
        self.is_topology_error()
            || matches!(
                self,
                KafkaCode::RequestTimedOut | KafkaCode::NetworkException
            )
    }
}

/// Translate a wire error code, treating unknown values as
/// [`KafkaCode::Unknown`].
pub fn kafka_code_from_wire(code: i16) -> KafkaCode {
    use num_traits::FromPrimitive;
    KafkaCode::from_i16(code).unwrap_or(KafkaCode::Unknown)
}

/// Turn a non-zero wire error code into an `Err`, passing zero through.
pub fn check_kafka_code(code: i16) -> Result<()> {
    match kafka_code_from_wire(code) {
        KafkaCode::None => Ok(()),
        other => Err(Error::Kafka(other)),
    }
}
