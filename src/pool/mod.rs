//! Per-host and cluster-wide connection pooling (spec §2, §5).

pub mod host_pool;
pub mod warmup;

pub use host_pool::{HostPool, PoolSizing};
pub use warmup::{warmup, WarmupResult};
