//! Response body parsing for incoming Kafka protocol messages.
//!
//! Each function here parses the body of one response; the frame and the
//! correlation-id header have already been consumed by the connection.
//! This is the reverse of what a broker-side implementation does
//! (encoding responses).

mod fetch;
mod groups;
mod metadata;
mod offsets;

pub use fetch::*;
pub use groups::*;
pub use metadata::*;
pub use offsets::*;
