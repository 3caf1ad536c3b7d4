//! Prepared-statement cache (spec §4.7).
//!
//! Keyed by a fingerprint of `(keyspace, cql)` so the same statement text
//! prepared against two keyspaces gets distinct entries. An LRU eviction
//! bound (`maxPrepared`) keeps memory proportional to the application's
//! actual statement variety rather than growing without bound across a
//! long-lived client.

use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::Mutex as AsyncMutex;

pub type Fingerprint = (Option<String>, String);

#[derive(Debug, Clone)]
pub struct PreparedEntry {
    pub id: Vec<u8>,
    pub result_metadata_id: Option<Vec<u8>>,
    pub column_count: usize,
}

/// Tracks, per fingerprint, which hosts already have the statement
/// prepared and a lock preventing two concurrent PREPARE calls for the
/// same fingerprint on the same host (spec §4.7: "at most one in-flight
/// prepare per fingerprint per host").
struct FingerprintState {
    entry: Option<PreparedEntry>,
    prepared_hosts: std::collections::HashSet<SocketAddr>,
    prepare_lock: Arc<AsyncMutex<()>>,
}

pub struct PreparedRegistry {
    max_prepared: usize,
    states: DashMap<Fingerprint, FingerprintState>,
    lru: Mutex<VecDeque<Fingerprint>>,
}

impl PreparedRegistry {
    pub fn new(max_prepared: usize) -> Arc<PreparedRegistry> {
        Arc::new(PreparedRegistry {
            max_prepared,
            states: DashMap::new(),
            lru: Mutex::new(VecDeque::new()),
        })
    }

    pub fn fingerprint(keyspace: Option<&str>, cql: &str) -> Fingerprint {
        (keyspace.map(str::to_string), cql.to_string())
    }

    /// Lock guarding PREPARE for this fingerprint on `host`. Callers should
    /// check `is_prepared_on` after acquiring it in case another task
    /// finished preparing while this one waited.
    pub fn prepare_lock(&self, fp: &Fingerprint) -> Arc<AsyncMutex<()>> {
        Arc::clone(
            &self
                .states
                .entry(fp.clone())
                .or_insert_with(|| FingerprintState {
                    entry: None,
                    prepared_hosts: std::collections::HashSet::new(),
                    prepare_lock: Arc::new(AsyncMutex::new(())),
                })
                .prepare_lock,
        )
    }

    pub fn is_prepared_on(&self, fp: &Fingerprint, host: SocketAddr) -> bool {
        self.states
            .get(fp)
            .map(|s| s.prepared_hosts.contains(&host))
            .unwrap_or(false)
    }

    pub fn get(&self, fp: &Fingerprint) -> Option<PreparedEntry> {
        let entry = self.states.get(fp).and_then(|s| s.entry.clone())?;
        self.touch(fp);
        Some(entry)
    }

    /// Record a successful PREPARE on `host`, evicting the least recently
    /// used fingerprint if this insert exceeds `max_prepared`.
    pub fn record(&self, fp: Fingerprint, host: SocketAddr, entry: PreparedEntry) {
        {
            let mut state = self
                .states
                .entry(fp.clone())
                .or_insert_with(|| FingerprintState {
                    entry: None,
                    prepared_hosts: std::collections::HashSet::new(),
                    prepare_lock: Arc::new(AsyncMutex::new(())),
                });
            state.entry = Some(entry);
            state.prepared_hosts.insert(host);
        }
        self.touch(&fp);
        self.evict_if_needed();
    }

    fn touch(&self, fp: &Fingerprint) {
        let mut lru = self.lru.lock();
        lru.retain(|f| f != fp);
        lru.push_back(fp.clone());
    }

    fn evict_if_needed(&self) {
        let mut lru = self.lru.lock();
        while lru.len() > self.max_prepared {
            if let Some(oldest) = lru.pop_front() {
                self.states.remove(&oldest);
            } else {
                break;
            }
        }
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// All fingerprints prepared anywhere, for `rePrepareOnUp`-style
    /// background re-priming of a reconnected host.
    pub fn all_fingerprints(&self) -> Vec<Fingerprint> {
        self.states.iter().map(|e| e.key().clone()).collect()
    }

    pub fn forget_host(&self, host: SocketAddr) {
        for mut entry in self.states.iter_mut() {
            entry.prepared_hosts.remove(&host);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_and_get_round_trips() {
        let registry = PreparedRegistry::new(10);
        let fp = PreparedRegistry::fingerprint(Some("ks"), "SELECT * FROM t");
        let host: SocketAddr = "10.0.0.1:9042".parse().unwrap();
        registry.record(fp.clone(), host, PreparedEntry { id: vec![1, 2], result_metadata_id: None, column_count: 1 });
        assert!(registry.is_prepared_on(&fp, host));
        assert_eq!(registry.get(&fp).unwrap().id, vec![1, 2]);
    }

    #[test]
    fn lru_eviction_drops_oldest_fingerprint_first() {
        let registry = PreparedRegistry::new(2);
        let host: SocketAddr = "10.0.0.1:9042".parse().unwrap();
        for i in 0..3 {
            let fp = PreparedRegistry::fingerprint(None, &format!("SELECT {i}"));
            registry.record(fp, host, PreparedEntry { id: vec![i as u8], result_metadata_id: None, column_count: 0 });
        }
        assert_eq!(registry.len(), 2);
        let first = PreparedRegistry::fingerprint(None, "SELECT 0");
        assert!(registry.get(&first).is_none());
    }

    #[test]
    fn getting_a_fingerprint_protects_it_from_eviction() {
        let registry = PreparedRegistry::new(2);
        let host: SocketAddr = "10.0.0.1:9042".parse().unwrap();
        let fp0 = PreparedRegistry::fingerprint(None, "SELECT 0");
        let fp1 = PreparedRegistry::fingerprint(None, "SELECT 1");
        let fp2 = PreparedRegistry::fingerprint(None, "SELECT 2");
        registry.record(fp0.clone(), host, PreparedEntry { id: vec![0], result_metadata_id: None, column_count: 0 });
        registry.record(fp1, host, PreparedEntry { id: vec![1], result_metadata_id: None, column_count: 0 });
        registry.get(&fp0); // bump fp0 to most-recently-used
        registry.record(fp2, host, PreparedEntry { id: vec![2], result_metadata_id: None, column_count: 0 });
        assert!(registry.get(&fp0).is_some());
    }
}
