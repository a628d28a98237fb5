//! Centralized protocol and configuration constants.
//!
//! This module consolidates the magic numbers used throughout the client:
//! wire protocol limits, offset sentinels, and the defaults behind
//! [`crate::config`].

// =============================================================================
// Protocol Constants (Kafka Wire Protocol)
// =============================================================================

/// Maximum allowed array size in Kafka protocol parsing.
///
/// This prevents memory exhaustion from malformed responses that claim
/// to have billions of elements. 100,000 is generous but bounded.
pub const MAX_PROTOCOL_ARRAY_SIZE: i32 = 100_000;

/// Overhead of one message-set entry before the message body:
/// offset (8 bytes) + message_size (4 bytes).
pub const MESSAGE_SET_ENTRY_OVERHEAD: usize = 12;

/// Fixed prefix of a v0 message: crc (4) + magic (1) + attributes (1).
pub const MESSAGE_HEADER_SIZE: usize = 6;

/// Magic byte for message format v0, the only format 0.9 brokers speak.
pub const MESSAGE_MAGIC_V0: i8 = 0;

/// Mask selecting the compression codec bits of the message attributes.
pub const MESSAGE_CODEC_MASK: i8 = 0x07;

/// The replica id clients send in fetch and list-offsets requests.
pub const REPLICA_ID_CONSUMER: i32 = -1;

/// Sentinel timestamp meaning "earliest available offset" in ListOffsets.
pub const OFFSET_EARLIEST: i64 = -2;

/// Sentinel timestamp meaning "latest offset" (log end) in ListOffsets.
pub const OFFSET_LATEST: i64 = -1;

/// Committed-offset value returned by OffsetFetch when the group has
/// never committed for the partition.
pub const OFFSET_UNKNOWN: i64 = -1;

/// Offset retention sentinel in OffsetCommit v2: use the broker default.
pub const OFFSET_RETENTION_DEFAULT: i64 = -1;

/// Version tag of the embedded consumer-protocol metadata and assignment
/// blobs carried inside JoinGroup and SyncGroup.
pub const CONSUMER_PROTOCOL_VERSION: i16 = 0;

/// Protocol type every consumer advertises in JoinGroup.
pub const CONSUMER_PROTOCOL_TYPE: &str = "consumer";

/// The single assignment strategy this client advertises.
pub const ASSIGNMENT_PROTOCOL_NAME: &str = "standard";

// =============================================================================
// Network Constants
// =============================================================================

/// Default maximum response size (100 MB).
///
/// Prevents memory exhaustion from malformed size prefixes.
/// Can be overridden via `ClientConfig::max_message_size`.
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 100 * 1024 * 1024;

/// Default connect timeout in seconds.
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Default per-read/write socket timeout in seconds.
pub const DEFAULT_SOCKET_TIMEOUT_SECS: u64 = 30;

/// Default client id sent in every request envelope.
pub const DEFAULT_CLIENT_ID: &str = "gregor";

// =============================================================================
// Consumer Constants
// =============================================================================

/// Default group session timeout in seconds.
pub const DEFAULT_SESSION_TIMEOUT_SECS: u64 = 30;

/// Headroom subtracted from the session timeout when deciding whether a
/// heartbeat is due, so a slow message handler cannot push the member past
/// its deadline.
pub const DEFAULT_HEARTBEAT_GRACE_SECS: u64 = 2;

/// Default minimum interval between automatic offset commits, in seconds.
pub const DEFAULT_OFFSET_COMMIT_INTERVAL_SECS: u64 = 10;

/// Default minimum bytes a fetch waits for before the broker responds.
pub const DEFAULT_FETCH_MIN_BYTES: i32 = 1;

/// Default per-partition byte budget for a fetch.
pub const DEFAULT_FETCH_MAX_BYTES: i32 = 1024 * 1024;

/// Default maximum time in milliseconds the broker may block a fetch.
pub const DEFAULT_FETCH_MAX_WAIT_MS: i32 = 5_000;

/// Default ceiling on consecutive transport/topology retries before an
/// operation is reported as fatal.
pub const DEFAULT_RETRY_BUDGET: usize = 5;
