//! Broker networking: one connection per broker, pooled by address.

mod connection;
mod pool;

pub use connection::BrokerConnection;
pub use pool::{BrokerPool, PooledConnection};
