//! Host bookkeeping (spec §2, §6).

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU32, Ordering};
use std::sync::Arc;

/// How a host relates to the client for pooling purposes (spec §2).
/// `Ignored` hosts never get a connection pool — enforced at the pool layer,
/// not here, but the invariant is "distance=ignored ⇒ pool empty".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HostDistance {
    Local,
    Remote,
    Ignored,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HostStatus {
    Up,
    Down,
    Unknown,
}

/// One coordinator-eligible node as known from `system.local`/`system.peers`
/// and topology/status events (spec §2, §4.10).
#[derive(Debug)]
pub struct Host {
    pub rpc_address: SocketAddr,
    pub datacenter: String,
    pub rack: String,
    pub tokens: Vec<String>,
    pub release_version: String,
    pub host_id: uuid::Uuid,
    status: AtomicBool, // true = up
    reconnection_attempts: AtomicU32,
    last_status_change: AtomicI64,
}

impl Host {
    pub fn new(
        rpc_address: SocketAddr,
        datacenter: String,
        rack: String,
        tokens: Vec<String>,
        release_version: String,
        host_id: uuid::Uuid,
    ) -> Arc<Host> {
        Arc::new(Host {
            rpc_address,
            datacenter,
            rack,
            tokens,
            release_version,
            host_id,
            status: AtomicBool::new(true),
            reconnection_attempts: AtomicU32::new(0),
            last_status_change: AtomicI64::new(0),
        })
    }

    pub fn status(&self) -> HostStatus {
        if self.status.load(Ordering::Acquire) {
            HostStatus::Up
        } else {
            HostStatus::Down
        }
    }

    pub fn is_up(&self) -> bool {
        self.status.load(Ordering::Acquire)
    }

    pub fn mark_up(&self) {
        self.status.store(true, Ordering::Release);
        self.reconnection_attempts.store(0, Ordering::Release);
    }

    pub fn mark_down(&self) {
        self.status.store(false, Ordering::Release);
    }

    pub fn reconnection_attempts(&self) -> u32 {
        self.reconnection_attempts.load(Ordering::Acquire)
    }

    pub fn bump_reconnection_attempt(&self) -> u32 {
        self.reconnection_attempts.fetch_add(1, Ordering::AcqRel) + 1
    }
}

impl PartialEq for Host {
    fn eq(&self, other: &Self) -> bool {
        self.rpc_address == other.rpc_address
    }
}
impl Eq for Host {}

impl std::hash::Hash for Host {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.rpc_address.hash(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_host_starts_up() {
        let h = Host::new(
            "10.0.0.1:9042".parse().unwrap(),
            "dc1".into(),
            "rack1".into(),
            vec![],
            "4.0".into(),
            uuid::Uuid::new_v4(),
        );
        assert_eq!(h.status(), HostStatus::Up);
    }

    #[test]
    fn mark_down_then_up_resets_reconnection_attempts() {
        let h = Host::new(
            "10.0.0.1:9042".parse().unwrap(),
            "dc1".into(),
            "rack1".into(),
            vec![],
            "4.0".into(),
            uuid::Uuid::new_v4(),
        );
        h.mark_down();
        h.bump_reconnection_attempt();
        h.bump_reconnection_attempt();
        assert_eq!(h.reconnection_attempts(), 2);
        h.mark_up();
        assert_eq!(h.reconnection_attempts(), 0);
        assert_eq!(h.status(), HostStatus::Up);
    }
}
