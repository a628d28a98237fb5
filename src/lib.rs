//! # Gregor
//! Rust-native client for Kafka 0.9-era clusters.
//!
//! This crate speaks the binary wire protocol directly, without any
//! librdkafka FFI, and provides the machinery a consumer needs: broker discovery
//! and leader routing, a self-framed request/response codec multiplexed
//! by correlation IDs, the consumer-group join/sync/heartbeat protocol,
//! and at-least-once offset management against the group coordinator.
//!
//! # Goals
//! - Pure Rust all the way down to the socket
//! - Leverage best in class libraries such as [Tokio](https://tokio.rs/), [Nom](https://docs.rs/nom/latest/nom/)
//! - Cooperative consumer groups compatible with 0.9 group coordination
//!
//! ## Consuming from a group
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use gregor::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> gregor::error::Result<()> {
//!     let config = ClientConfig::new(["localhost:9092"])?;
//!     let cluster = Arc::new(Cluster::new(config)?);
//!
//!     let mut consumer = Consumer::new(
//!         cluster,
//!         GroupConfig::new("my-group"),
//!         FetchConfig::default(),
//!     )?;
//!     consumer.subscribe("my-topic", OffsetPolicy::Earliest);
//!
//!     consumer
//!         .each_message(|message| {
//!             println!("{}/{}@{}", message.topic, message.partition, message.offset);
//!             Ok(())
//!         })
//!         .await
//! }
//! ```
//!
//! The consumer is single-threaded and cooperative; run one per task in
//! the same group to spread partitions across tasks. Producers, SASL and
//! SSL handshakes are out of scope; transport security plugs in via
//! [`config::Authenticate`].
//!
//! ## Resources
//! - [Kafka Protocol Spec](https://kafka.apache.org/protocol.html)
//! - [Confluence Docs](https://cwiki.apache.org/confluence/display/KAFKA/A+Guide+To+The+Kafka+Protocol)

#![forbid(unsafe_code)]

pub mod cluster;
pub mod config;
pub mod constants;
pub mod consumer;
mod encode;
pub mod error;
pub mod instrumentation;
pub mod network;
mod parser;
pub mod protocol;
pub mod retry;
pub mod telemetry;
pub mod types;

pub mod prelude {
    //! Main exports for consuming applications.

    pub use crate::cluster::Cluster;
    pub use crate::config::{Authenticate, ClientConfig, FetchConfig, GroupConfig, NoAuth};
    pub use crate::consumer::{
        Consumer, ConsumerGroup, FetchOperation, FetchedMessage, GroupState, OffsetManager,
        PartitionBatch, StopHandle,
    };
    pub use crate::error::{Error, KafkaCode, Result};
    pub use crate::instrumentation::{Event, Instrumentation, NoopInstrumentation};
    pub use crate::network::{BrokerConnection, BrokerPool};
    pub use crate::types::{Broker, BrokerAddr, Offset, OffsetPolicy, TopicPartition};

    pub use bytes;

    pub mod encode {
        pub use crate::encode::*;
    }

    pub mod protocol {
        pub use crate::protocol::*;
    }
}
