//! Per-host connection pool (spec §2, §5).
//!
//! Holds `core_connections` live connections for a host at a given
//! distance, borrowing the least-loaded one for each request and backing
//! off once every connection is at `maxRequestsPerConnection`. A host pool
//! for a host at `HostDistance::Ignored` is never created — the caller
//! (cluster-level pool manager) enforces that invariant by simply not
//! calling `HostPool::open` for such hosts.

use crate::connection::{Connection, SocketOptions, StreamFactory};
use crate::error::Result;
use crate::protocol::ProtocolVersion;
use crate::topology::host::{Host, HostDistance};
use parking_lot::RwLock;
use std::sync::Arc;

/// Per-distance connection counts (spec §6, `pooling.local`/`pooling.remote`).
#[derive(Debug, Clone, Copy)]
pub struct PoolSizing {
    pub core_connections: usize,
    pub max_requests_per_connection: usize,
}

impl PoolSizing {
    pub fn for_distance(distance: HostDistance) -> PoolSizing {
        match distance {
            HostDistance::Local => PoolSizing { core_connections: 2, max_requests_per_connection: 1024 },
            HostDistance::Remote => PoolSizing { core_connections: 1, max_requests_per_connection: 256 },
            HostDistance::Ignored => PoolSizing { core_connections: 0, max_requests_per_connection: 0 },
        }
    }
}

pub struct HostPool {
    host: Arc<Host>,
    sizing: PoolSizing,
    connections: RwLock<Vec<Arc<Connection>>>,
}

impl HostPool {
    /// Open `sizing.core_connections` connections to `host`, up to
    /// `warmup_concurrency` dialed at once. Never called for an `Ignored`
    /// host (spec invariant: distance=ignored ⇒ pool empty).
    pub async fn open(
        host: Arc<Host>,
        distance: HostDistance,
        factory: &dyn StreamFactory,
        max_version: ProtocolVersion,
        socket_options: SocketOptions,
    ) -> Result<Arc<HostPool>> {
        if distance == HostDistance::Ignored {
            return Ok(Arc::new(HostPool {
                host,
                sizing: PoolSizing::for_distance(distance),
                connections: RwLock::new(Vec::new()),
            }));
        }

        let sizing = PoolSizing::for_distance(distance);
        let mut connections = Vec::with_capacity(sizing.core_connections);
        for _ in 0..sizing.core_connections {
            let stream = factory.connect(host.rpc_address).await?;
            let conn = Connection::open(stream, host.rpc_address, max_version, socket_options.clone()).await?;
            connections.push(Arc::new(conn));
        }

        Ok(Arc::new(HostPool { host, sizing, connections: RwLock::new(connections) }))
    }

    pub fn host(&self) -> &Arc<Host> {
        &self.host
    }

    pub fn is_empty(&self) -> bool {
        self.connections.read().is_empty()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.read().len()
    }

    /// Borrow the least-loaded connection under `maxRequestsPerConnection`,
    /// returning `None` immediately if every connection is saturated.
    async fn find_least_loaded(&self) -> Option<Arc<Connection>> {
        let snapshot: Vec<Arc<Connection>> = self.connections.read().clone();
        let mut best: Option<(Arc<Connection>, i64)> = None;
        for conn in snapshot {
            if conn.state().await != crate::connection::ConnectionState::Ready {
                continue;
            }
            let in_flight = conn.in_flight();
            if in_flight as usize >= self.sizing.max_requests_per_connection {
                continue;
            }
            match &best {
                Some((_, best_load)) if *best_load <= in_flight => {}
                _ => best = Some((conn, in_flight)),
            }
        }
        best.map(|(c, _)| c)
    }

    /// Borrow the least-loaded connection, queueing (with backpressure)
    /// while every connection is at `maxRequestsPerConnection` rather than
    /// immediately failing the caller (spec §4.4). Gives up after
    /// `max_wait`, signaling the caller to try the next host.
    pub async fn borrow_with_wait(&self, max_wait: std::time::Duration) -> Option<Arc<Connection>> {
        let deadline = tokio::time::Instant::now() + max_wait;
        loop {
            if let Some(conn) = self.find_least_loaded().await {
                return Some(conn);
            }
            if tokio::time::Instant::now() >= deadline {
                return None;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
    }

    /// Borrow the least-loaded connection under `maxRequestsPerConnection`,
    /// queueing up to a default bound when every connection is saturated
    /// (spec §5, "backpressure"). Returns `None` only once that bound is
    /// exhausted, signaling the caller to try the next host.
    pub async fn borrow(&self) -> Option<Arc<Connection>> {
        self.borrow_with_wait(std::time::Duration::from_millis(500)).await
    }

    /// Drop connections that have gone defunct, leaving the pool under
    /// `core_connections` until the caller's reconnection loop replaces
    /// them.
    pub async fn reap_defunct(&self) {
        let mut alive = Vec::new();
        let snapshot: Vec<Arc<Connection>> = self.connections.read().clone();
        for conn in snapshot {
            if conn.state().await != crate::connection::ConnectionState::Defunct {
                alive.push(conn);
            }
        }
        *self.connections.write() = alive;
    }

    pub async fn add_connection(&self, factory: &dyn StreamFactory, max_version: ProtocolVersion, socket_options: SocketOptions) -> Result<()> {
        if self.connections.read().len() >= self.sizing.core_connections {
            return Ok(());
        }
        let stream = factory.connect(self.host.rpc_address).await?;
        let conn = Connection::open(stream, self.host.rpc_address, max_version, socket_options).await?;
        self.connections.write().push(Arc::new(conn));
        Ok(())
    }

    pub async fn close(&self) {
        let snapshot: Vec<Arc<Connection>> = self.connections.read().clone();
        for conn in snapshot {
            conn.close().await;
        }
        self.connections.write().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_sizing_matches_distance() {
        let local = PoolSizing::for_distance(HostDistance::Local);
        let remote = PoolSizing::for_distance(HostDistance::Remote);
        let ignored = PoolSizing::for_distance(HostDistance::Ignored);
        assert!(local.core_connections > remote.core_connections);
        assert_eq!(ignored.core_connections, 0);
    }
}
