//! Concurrency-capped initial pool warmup (spec §2, "eager connect").
//!
//! Dials every known host's pool up front rather than lazily on first use,
//! bounding how many hosts are dialed at once so a large cluster doesn't
//! open hundreds of sockets in the same instant.

use crate::connection::{SocketOptions, StreamFactory};
use crate::pool::host_pool::HostPool;
use crate::protocol::ProtocolVersion;
use crate::topology::host::{Host, HostDistance};
use std::sync::Arc;
use tokio::sync::Semaphore;

pub struct WarmupResult {
    pub opened: Vec<Arc<HostPool>>,
    pub failed: Vec<(Arc<Host>, String)>,
}

/// Open pools for every `(host, distance)` pair concurrently, capped at
/// `max_concurrency` in-flight dials at a time.
pub async fn warmup(
    hosts: Vec<(Arc<Host>, HostDistance)>,
    factory: Arc<dyn StreamFactory>,
    max_version: ProtocolVersion,
    socket_options: SocketOptions,
    max_concurrency: usize,
) -> WarmupResult {
    let semaphore = Arc::new(Semaphore::new(max_concurrency.max(1)));
    let mut tasks = Vec::with_capacity(hosts.len());

    for (host, distance) in hosts {
        let semaphore = Arc::clone(&semaphore);
        let factory = Arc::clone(&factory);
        let socket_options = socket_options.clone();
        tasks.push(tokio::spawn(async move {
            let _permit = semaphore.acquire_owned().await.expect("semaphore never closed");
            let result = HostPool::open(Arc::clone(&host), distance, factory.as_ref(), max_version, socket_options).await;
            (host, result)
        }));
    }

    let mut opened = Vec::new();
    let mut failed = Vec::new();
    for task in tasks {
        match task.await {
            Ok((host, Ok(pool))) => opened.push((host, pool)),
            Ok((host, Err(e))) => failed.push((host, e.to_string())),
            Err(join_err) => {
                tracing::error!(%join_err, "warmup task panicked");
            }
        }
    }

    WarmupResult {
        opened: opened.into_iter().map(|(_, p)| p).collect(),
        failed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::TcpStreamFactory;

    #[tokio::test]
    async fn warmup_reports_failures_for_unreachable_hosts() {
        let host = Host::new(
            "127.0.0.1:1".parse().unwrap(), // port 0 reserved; unlikely to accept
            "dc1".into(),
            "r1".into(),
            vec![],
            "4.0".into(),
            uuid::Uuid::new_v4(),
        );
        let result = warmup(
            vec![(host, HostDistance::Local)],
            Arc::new(TcpStreamFactory::default()),
            ProtocolVersion::V4,
            SocketOptions::default(),
            4,
        )
        .await;
        assert!(result.opened.is_empty());
        assert_eq!(result.failed.len(), 1);
    }
}
