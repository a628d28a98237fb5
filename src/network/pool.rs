//! Connection pooling.
//!
//! The pool maps broker addresses to connections, created lazily. Each
//! connection sits behind its own async lock: callers take turns, which
//! is the serialisation [`BrokerConnection`] requires. The pool itself
//! uses a short-lived sync lock around the map only.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as SyncMutex};

use tokio::sync::Mutex;

use crate::config::ClientConfig;
use crate::types::BrokerAddr;

use super::BrokerConnection;

/// Shared handle to one pooled connection.
pub type PooledConnection = Arc<Mutex<BrokerConnection>>;

/// Lazily populated `(host, port) -> Connection` cache.
pub struct BrokerPool {
    config: ClientConfig,
    connections: SyncMutex<HashMap<BrokerAddr, PooledConnection>>,
}

impl BrokerPool {
    pub fn new(config: ClientConfig) -> Self {
        BrokerPool {
            config,
            connections: SyncMutex::new(HashMap::new()),
        }
    }

    /// Get (or create) the connection for a broker address.
    pub fn get(&self, addr: &BrokerAddr) -> PooledConnection {
        let mut connections = self.connections.lock().expect("pool lock poisoned");
        connections
            .entry(addr.clone())
            .or_insert_with(|| {
                tracing::debug!(broker = %addr, "pooling new connection");
                Arc::new(Mutex::new(BrokerConnection::new(
                    addr.clone(),
                    self.config.clone(),
                )))
            })
            .clone()
    }

    /// Drop a broker's pooled connection, closing its socket.
    pub async fn remove(&self, addr: &BrokerAddr) {
        let removed = {
            let mut connections = self.connections.lock().expect("pool lock poisoned");
            connections.remove(addr)
        };
        if let Some(connection) = removed {
            connection.lock().await.close();
        }
    }

    /// Close every pooled connection and forget them all.
    pub async fn disconnect_all(&self) {
        let drained: Vec<PooledConnection> = {
            let mut connections = self.connections.lock().expect("pool lock poisoned");
            connections.drain().map(|(_, conn)| conn).collect()
        };
        for connection in drained {
            connection.lock().await.close();
        }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.connections.lock().expect("pool lock poisoned").len()
    }
}

impl std::fmt::Debug for BrokerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = self
            .connections
            .lock()
            .map(|map| map.len())
            .unwrap_or_default();
        f.debug_struct("BrokerPool")
            .field("connections", &count)
            .finish()
    }
}
