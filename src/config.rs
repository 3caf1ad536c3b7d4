//! Cluster configuration (spec §6), serde-derived so an embedding
//! application can load it from its own config file/env layer; this crate
//! itself never touches the filesystem.

use crate::connection::SocketOptions as ConnSocketOptions;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SocketOptions {
    #[serde(with = "duration_millis")]
    pub connect_timeout: Duration,
    #[serde(with = "duration_millis")]
    pub read_timeout: Duration,
    pub tcp_nodelay: bool,
    pub defunct_read_timeout_threshold: usize,
}

impl Default for SocketOptions {
    fn default() -> Self {
        SocketOptions {
            connect_timeout: Duration::from_millis(5000),
            read_timeout: Duration::from_millis(12_000),
            tcp_nodelay: true,
            defunct_read_timeout_threshold: 64,
        }
    }
}

impl From<&SocketOptions> for ConnSocketOptions {
    fn from(s: &SocketOptions) -> Self {
        ConnSocketOptions {
            connect_timeout: s.connect_timeout,
            read_timeout: s.read_timeout,
            defunct_read_timeout_threshold: s.defunct_read_timeout_threshold,
            coalescing_threshold: 8000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolingOptions {
    pub core_connections_local: usize,
    pub core_connections_remote: usize,
    pub max_requests_per_connection_local: usize,
    pub max_requests_per_connection_remote: usize,
    pub warmup_concurrency: usize,
    /// Eagerly open `core_connections` to every known host at connect time.
    /// When `false`, pools are opened lazily the first time a host is
    /// routed to (spec §6, `pooling.warmup`).
    pub warmup: bool,
}

impl Default for PoolingOptions {
    fn default() -> Self {
        PoolingOptions {
            core_connections_local: 2,
            core_connections_remote: 1,
            max_requests_per_connection_local: 1024,
            max_requests_per_connection_remote: 256,
            warmup_concurrency: 32,
            warmup: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtocolOptions {
    pub max_version: u8,
    pub compression: Option<String>,
}

impl Default for ProtocolOptions {
    fn default() -> Self {
        ProtocolOptions { max_version: crate::protocol::ProtocolVersion::MAX.0, compression: None }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryOptions {
    pub default_consistency: crate::protocol::Consistency,
    pub default_page_size: i32,
    pub prepare_on_all_hosts: bool,
    pub re_prepare_on_up: bool,
    pub max_prepared_statements: usize,
}

impl Default for QueryOptions {
    fn default() -> Self {
        QueryOptions {
            default_consistency: crate::protocol::Consistency::LocalOne,
            default_page_size: 5000,
            prepare_on_all_hosts: true,
            re_prepare_on_up: true,
            max_prepared_statements: 500,
        }
    }
}

/// The reconnection schedule applied to a host pool after it goes down
/// (spec §6, `policies.reconnection`); see [`crate::policy::ReconnectionPolicy`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum ReconnectionPolicyConfig {
    Constant {
        #[serde(with = "duration_millis")]
        delay: Duration,
    },
    Exponential {
        #[serde(with = "duration_millis")]
        base_delay: Duration,
        #[serde(with = "duration_millis")]
        max_delay: Duration,
        jitter: bool,
    },
}

impl Default for ReconnectionPolicyConfig {
    fn default() -> Self {
        ReconnectionPolicyConfig::Exponential {
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(10_000),
            jitter: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PoliciesOptions {
    pub reconnection: ReconnectionPolicyConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    pub contact_points: Vec<SocketAddr>,
    pub local_datacenter: Option<String>,
    pub used_hosts_per_remote_dc: usize,
    pub socket_options: SocketOptions,
    pub pooling_options: PoolingOptions,
    pub protocol_options: ProtocolOptions,
    pub query_options: QueryOptions,
    pub policies: PoliciesOptions,
    #[serde(with = "duration_millis")]
    pub control_connection_timeout: Duration,
    pub max_schema_agreement_wait_seconds: u64,
    /// Interval between heartbeat/pool-supervisor sweeps: reaping defunct
    /// connections, driving reconnection schedules, lazily opening pools
    /// for hosts discovered but not yet warmed up (spec §6, `heartBeatInterval`).
    #[serde(with = "duration_millis")]
    pub heart_beat_interval: Duration,
    /// How long to wait after a `SCHEMA_CHANGE` event before refreshing
    /// schema metadata, debouncing a burst of changes into one refresh
    /// (spec §6, `refreshSchemaDelay`).
    #[serde(with = "duration_millis")]
    pub refresh_schema_delay: Duration,
    /// Whether `SCHEMA_CHANGE` push events drive schema metadata refresh at
    /// all (spec §6, `isMetadataSyncEnabled`).
    pub is_metadata_sync_enabled: bool,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        ClusterConfig {
            contact_points: Vec::new(),
            local_datacenter: None,
            used_hosts_per_remote_dc: 0,
            socket_options: SocketOptions::default(),
            pooling_options: PoolingOptions::default(),
            protocol_options: ProtocolOptions::default(),
            query_options: QueryOptions::default(),
            policies: PoliciesOptions::default(),
            control_connection_timeout: Duration::from_millis(10_000),
            max_schema_agreement_wait_seconds: 10,
            heart_beat_interval: Duration::from_millis(30_000),
            refresh_schema_delay: Duration::from_millis(1_000),
            is_metadata_sync_enabled: true,
        }
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let millis = u64::deserialize(d)?;
        Ok(Duration::from_millis(millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_no_contact_points() {
        let config = ClusterConfig::default();
        assert!(config.contact_points.is_empty());
        assert_eq!(config.query_options.max_prepared_statements, 500);
    }

    #[test]
    fn socket_options_converts_into_connection_layer_type() {
        let config = SocketOptions::default();
        let conn_opts: ConnSocketOptions = (&config).into();
        assert_eq!(conn_opts.read_timeout, config.read_timeout);
    }
}
