//! Request body encoding for outgoing Kafka protocol messages.
//!
//! Each struct here is the body of one request; the envelope (size,
//! header) is added by [`crate::protocol::Request`]. This is the reverse
//! of what a broker-side implementation does (parsing requests).

mod fetch;
mod groups;
mod metadata;
mod offsets;

pub use fetch::*;
pub use groups::*;
pub use metadata::*;
pub use offsets::*;
