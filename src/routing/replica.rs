//! Replica-set resolution from a token and a keyspace's replication
//! strategy (spec §3, "token-aware routing").
//!
//! `SimpleStrategy` walks the ring clockwise for `replication_factor`
//! distinct hosts. `NetworkTopologyStrategy` does the same per datacenter.
//! Both assume `tokens` is pre-sorted ascending — the caller (topology
//! metadata cache) maintains that invariant.

use crate::routing::tokenizer::{compare_tokens, Token};
use crate::topology::host::Host;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub enum ReplicationStrategy {
    Simple { replication_factor: usize },
    NetworkTopology { factors: HashMap<String, usize> },
}

/// `ring` maps each host's primary token to the host; `token` is the key
/// being routed. Returns hosts in ring order starting just after `token`.
pub fn replicas_for_token(
    ring: &[(Token, Arc<Host>)],
    token: &Token,
    strategy: &ReplicationStrategy,
) -> Vec<Arc<Host>> {
    if ring.is_empty() {
        return Vec::new();
    }

    let start = ring
        .iter()
        .position(|(t, _)| compare_tokens(t, token) != std::cmp::Ordering::Less)
        .unwrap_or(0);

    match strategy {
        ReplicationStrategy::Simple { replication_factor } => {
            let mut out = Vec::with_capacity(*replication_factor);
            let mut seen = std::collections::HashSet::new();
            for i in 0..ring.len() {
                if out.len() >= *replication_factor {
                    break;
                }
                let (_, host) = &ring[(start + i) % ring.len()];
                if seen.insert(Arc::as_ptr(host)) {
                    out.push(Arc::clone(host));
                }
            }
            out
        }
        ReplicationStrategy::NetworkTopology { factors } => {
            let mut per_dc_count: HashMap<String, usize> = HashMap::new();
            let mut out = Vec::new();
            let mut seen = std::collections::HashSet::new();
            let total_needed: usize = factors.values().sum();

            for i in 0..ring.len() {
                if out.len() >= total_needed {
                    break;
                }
                let (_, host) = &ring[(start + i) % ring.len()];
                if !seen.insert(Arc::as_ptr(host)) {
                    continue;
                }
                let want = factors.get(&host.datacenter).copied().unwrap_or(0);
                let have = per_dc_count.entry(host.datacenter.clone()).or_insert(0);
                if *have < want {
                    *have += 1;
                    out.push(Arc::clone(host));
                } else {
                    seen.remove(&Arc::as_ptr(host));
                }
            }
            out
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::tokenizer::Token;

    fn make_host(addr: &str, dc: &str) -> Arc<Host> {
        Host::new(
            addr.parse().unwrap(),
            dc.to_string(),
            "rack1".into(),
            vec![],
            "4.0".into(),
            uuid::Uuid::new_v4(),
        )
    }

    #[test]
    fn simple_strategy_returns_rf_distinct_hosts_clockwise() {
        let h1 = make_host("10.0.0.1:9042", "dc1");
        let h2 = make_host("10.0.0.2:9042", "dc1");
        let h3 = make_host("10.0.0.3:9042", "dc1");
        let ring = vec![
            (Token::Murmur3(-100), h1.clone()),
            (Token::Murmur3(0), h2.clone()),
            (Token::Murmur3(100), h3.clone()),
        ];
        let replicas = replicas_for_token(
            &ring,
            &Token::Murmur3(-50),
            &ReplicationStrategy::Simple { replication_factor: 2 },
        );
        assert_eq!(replicas.len(), 2);
        assert_eq!(replicas[0].rpc_address, h2.rpc_address);
        assert_eq!(replicas[1].rpc_address, h3.rpc_address);
    }

    #[test]
    fn network_topology_strategy_respects_per_dc_factors() {
        let h1 = make_host("10.0.0.1:9042", "dc1");
        let h2 = make_host("10.0.0.2:9042", "dc2");
        let h3 = make_host("10.0.0.3:9042", "dc1");
        let ring = vec![
            (Token::Murmur3(-100), h1.clone()),
            (Token::Murmur3(0), h2.clone()),
            (Token::Murmur3(100), h3.clone()),
        ];
        let mut factors = HashMap::new();
        factors.insert("dc1".to_string(), 1);
        factors.insert("dc2".to_string(), 1);
        let replicas = replicas_for_token(
            &ring,
            &Token::Murmur3(-200),
            &ReplicationStrategy::NetworkTopology { factors },
        );
        assert_eq!(replicas.len(), 2);
    }
}
