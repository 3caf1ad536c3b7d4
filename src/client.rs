//! The driver façade: connect, execute, batch, shut down (spec §1, §4).

use crate::config::{ClusterConfig, ReconnectionPolicyConfig};
use crate::connection::{Connection, StreamFactory, TcpStreamFactory};
use crate::error::{DriverError, Result};
use crate::policy::{
    ConstantReconnectionPolicy, DcAwareRoundRobinPolicy, ExponentialReconnectionPolicy,
    LoadBalancingPolicy, ReconnectionPolicy, ReconnectionSchedule, RoutingInfo, TokenAwarePolicy,
};
use crate::pool::{warmup, HostPool};
use crate::prepared::{PreparedEntry, PreparedRegistry};
use crate::profile::{ExecutionProfile, ProfileRegistry};
use crate::protocol::messages::{self, QueryParams, QueryResult, ServerEvent};
use crate::protocol::{FrameFlags, OpCode, ProtocolVersion};
use crate::request::{BatchItem, BatchRequest, RequestHandler, Statement, UnpreparedRecovery};
use crate::routing::Token;
use crate::topology::control_link::parse_text_map;
use crate::topology::host::{Host, HostDistance};
use crate::topology::metadata::{KeyspaceMetadata, SchemaMetadata};
use crate::topology::{ControlLink, DiscoveryResult};
use dashmap::DashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub struct QueryResponse {
    pub result: QueryResult,
}

/// The driver entry point. Cheap to clone (everything inside is already
/// `Arc`-wrapped); a single instance is meant to be shared across an
/// application's lifetime rather than opened per-request.
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

/// Per-host reconnection bookkeeping, driven by the pool supervisor
/// (spec §2, §4.9: a host's reconnection schedule resets on every
/// transition to `Up`).
struct ReconnectState {
    schedule: Box<dyn ReconnectionSchedule>,
    next_attempt: tokio::time::Instant,
}

struct ClientInner {
    config: ClusterConfig,
    stream_factory: Arc<dyn StreamFactory>,
    pools: Arc<DashMap<SocketAddr, Arc<HostPool>>>,
    hosts: DashMap<SocketAddr, Arc<Host>>,
    schema: Arc<SchemaMetadata>,
    load_balancing_policy: Arc<dyn LoadBalancingPolicy>,
    prepared: Arc<PreparedRegistry>,
    profiles: parking_lot::RwLock<ProfileRegistry>,
    reconnection_policy: Arc<dyn ReconnectionPolicy>,
    reconnect_states: DashMap<SocketAddr, parking_lot::Mutex<ReconnectState>>,
    schema_debounce: parking_lot::Mutex<Option<tokio::task::JoinHandle<()>>>,
    shut_down: AtomicBool,
}

impl Client {
    /// Connect to the cluster: open a control connection to discover real
    /// topology (spec §2), then warm up request pools against the
    /// discovered hosts up to `pooling_options.warmup_concurrency` at a
    /// time. Falls back to treating the configured contact points
    /// themselves as the only known hosts if no control connection could
    /// be established (e.g. every contact point is unreachable) — the
    /// warmup pass below still has to succeed against at least one of
    /// them.
    pub async fn connect(config: ClusterConfig) -> Result<Client> {
        if config.contact_points.is_empty() {
            return Err(DriverError::ConfigError("no contact points configured".into()));
        }

        let stream_factory: Arc<dyn StreamFactory> =
            Arc::new(TcpStreamFactory { tcp_nodelay: config.socket_options.tcp_nodelay });
        let max_version = ProtocolVersion(config.protocol_options.max_version);
        let socket_options = crate::connection::SocketOptions::from(&config.socket_options);

        let control = dial_control_connection(&config.contact_points, stream_factory.as_ref(), max_version).await;

        let seed_hosts: Vec<Arc<Host>> = match &control {
            Some((_, _, discovery)) if !discovery.hosts.is_empty() => discovery.hosts.clone(),
            _ => config
                .contact_points
                .iter()
                .map(|addr| Host::new(*addr, String::new(), String::new(), vec![], String::new(), uuid::Uuid::new_v4()))
                .collect(),
        };

        let local_dc = config
            .local_datacenter
            .clone()
            .unwrap_or_else(|| seed_hosts.first().map(|h| h.datacenter.clone()).unwrap_or_default());
        let dc_policy = DcAwareRoundRobinPolicy::new(local_dc, config.used_hosts_per_remote_dc);

        let warmup_targets: Vec<(Arc<Host>, HostDistance)> = if config.pooling_options.warmup {
            seed_hosts
                .iter()
                .map(|h| (Arc::clone(h), dc_policy.distance(h)))
                .filter(|(_, d)| *d != HostDistance::Ignored)
                .collect()
        } else {
            // Lazy-connect mode (spec §6, `pooling.warmup=false`): only the
            // first host is warmed eagerly so `connect()` can still report
            // NoHostAvailable against a fully unreachable cluster; the rest
            // are opened on demand by the pool supervisor.
            seed_hosts
                .first()
                .map(|h| (Arc::clone(h), dc_policy.distance(h)))
                .into_iter()
                .collect()
        };

        let warmup_result = warmup(
            warmup_targets,
            Arc::clone(&stream_factory),
            max_version,
            socket_options,
            config.pooling_options.warmup_concurrency,
        )
        .await;

        if warmup_result.opened.is_empty() {
            return Err(DriverError::NoHostAvailable {
                inner: warmup_result
                    .failed
                    .into_iter()
                    .map(|(h, e)| (h.rpc_address, Box::new(DriverError::ConnectionError(e))))
                    .collect(),
            });
        }

        let pools = Arc::new(DashMap::new());
        for pool in warmup_result.opened {
            pools.insert(pool.host().rpc_address, pool);
        }

        let hosts: DashMap<SocketAddr, Arc<Host>> =
            seed_hosts.iter().map(|h| (h.rpc_address, Arc::clone(h))).collect();

        let schema = Arc::new(SchemaMetadata::new());
        let token_aware: Arc<dyn LoadBalancingPolicy> = Arc::new(TokenAwarePolicy::new(dc_policy, Arc::clone(&schema)));
        token_aware.set_ring(build_ring(&seed_hosts));

        let default_profile = ExecutionProfile {
            consistency: Some(config.query_options.default_consistency),
            page_size: Some(config.query_options.default_page_size),
            load_balancing_policy: Some(Arc::clone(&token_aware)),
            ..Default::default()
        };

        let reconnection_policy = build_reconnection_policy(&config.policies.reconnection);

        let client = Client {
            inner: Arc::new(ClientInner {
                prepared: PreparedRegistry::new(config.query_options.max_prepared_statements),
                profiles: parking_lot::RwLock::new(ProfileRegistry::new(default_profile)),
                hosts,
                schema,
                load_balancing_policy: token_aware,
                pools,
                stream_factory,
                reconnection_policy,
                reconnect_states: DashMap::new(),
                schema_debounce: parking_lot::Mutex::new(None),
                config,
                shut_down: AtomicBool::new(false),
            }),
        };

        if let Some((control_link, conn, _)) = control {
            client.spawn_control_event_loop(control_link, conn);
        }
        client.spawn_pool_supervisor();

        Ok(client)
    }

    pub fn register_profile(&self, name: impl Into<String>, profile: ExecutionProfile) {
        self.inner.profiles.write().register(name, profile);
    }

    fn hosts(&self) -> Vec<Arc<Host>> {
        self.inner.hosts.iter().map(|e| Arc::clone(e.value())).collect()
    }

    fn check_not_shut_down(&self) -> Result<()> {
        if self.inner.shut_down.load(Ordering::Acquire) {
            Err(DriverError::Shutdown)
        } else {
            Ok(())
        }
    }

    pub async fn execute(&self, statement: Statement, profile_name: Option<&str>) -> Result<QueryResponse> {
        self.execute_with_profile(statement, None, profile_name).await
    }

    pub async fn execute_with_profile(
        &self,
        statement: Statement,
        per_call: Option<&ExecutionProfile>,
        profile_name: Option<&str>,
    ) -> Result<QueryResponse> {
        self.check_not_shut_down()?;
        let options = self.inner.profiles.read().resolve(per_call, profile_name);
        let handler = RequestHandler::new(Arc::clone(&self.inner.pools), options.clone());

        let routing_hint = statement.routing().clone();
        let mut unprepared_recovery: Option<UnpreparedRecovery> = None;
        let (opcode, body) = match &statement {
            Statement::SimpleQuery { cql, values, named_values, .. } => {
                let params = QueryParams {
                    consistency: options.consistency,
                    values: values.clone(),
                    named_values: named_values.clone(),
                    serial_consistency: options.serial_consistency,
                    page_size: options.page_size,
                    ..Default::default()
                };
                (OpCode::Query, messages::encode_query(cql, &params))
            }
            Statement::Prepared { fingerprint_cql, keyspace, values, .. } => {
                let fp = PreparedRegistry::fingerprint(keyspace.as_deref(), fingerprint_cql);
                let entry = self.ensure_prepared(&fp, fingerprint_cql, keyspace.as_deref()).await?;
                let params = QueryParams {
                    consistency: options.consistency,
                    values: values.clone(),
                    serial_consistency: options.serial_consistency,
                    page_size: options.page_size,
                    ..Default::default()
                };
                unprepared_recovery = Some(UnpreparedRecovery {
                    fingerprint: fp,
                    cql: fingerprint_cql.clone(),
                    keyspace: keyspace.clone(),
                    prepared: Arc::clone(&self.inner.prepared),
                    params: params.clone(),
                });
                (OpCode::Execute, messages::encode_execute(&entry.id, &params))
            }
        };

        let routing = RoutingInfo { token: routing_hint.token, keyspace: routing_hint.keyspace };
        let frame = handler
            .execute_with_unprepared_recovery(opcode, body, &self.hosts(), routing, unprepared_recovery)
            .await?;
        if frame.header.opcode == OpCode::Error {
            return Err(messages::decode_error(&frame.body)?);
        }
        let (result, _extras) = messages::decode_result(&frame.body)?;
        Ok(QueryResponse { result })
    }

    /// Resolve every prepared member against the registry (spec §4.9,
    /// "getPreparedMultiple") before encoding the wire batch, so a caller
    /// can add a prepared statement by CQL text the same way it would a
    /// single prepared `Statement`, without preparing it up front.
    pub async fn execute_batch(&self, batch: BatchRequest, profile_name: Option<&str>) -> Result<()> {
        self.check_not_shut_down()?;
        let mut options = self.inner.profiles.read().resolve(None, profile_name);
        options.is_idempotent = options.is_idempotent && batch.is_idempotent();
        let handler = RequestHandler::new(Arc::clone(&self.inner.pools), options.clone());

        let mut entries = Vec::with_capacity(batch.statements.len());
        for stmt in &batch.statements {
            match &stmt.item {
                BatchItem::Query { cql, values } => {
                    entries.push(messages::BatchEntry::Query { cql: cql.clone(), values: values.clone() });
                }
                BatchItem::Prepared { cql, keyspace, values } => {
                    let fp = PreparedRegistry::fingerprint(keyspace.as_deref(), cql);
                    let entry = self.ensure_prepared(&fp, cql, keyspace.as_deref()).await?;
                    entries.push(messages::BatchEntry::Prepared { id: entry.id, values: values.clone() });
                }
            }
        }

        let body = messages::encode_batch(batch.batch_type, &entries, options.consistency, options.serial_consistency, None);

        let routing = RoutingInfo { token: batch.routing.token.clone(), keyspace: batch.routing.keyspace.clone() };
        let frame = handler.execute(OpCode::Batch, body, &self.hosts(), routing).await?;
        if frame.header.opcode == OpCode::Error {
            return Err(messages::decode_error(&frame.body)?);
        }
        Ok(())
    }

    /// PREPARE on the primary host, then (if `prepareOnAllHosts`, the
    /// default) best-effort fan out to every other known host so a later
    /// request routed elsewhere doesn't pay an UNPREPARED round trip
    /// (spec §4.7, §6).
    async fn ensure_prepared(&self, fp: &crate::prepared::Fingerprint, cql: &str, keyspace: Option<&str>) -> Result<PreparedEntry> {
        if let Some(entry) = self.inner.prepared.get(fp) {
            return Ok(entry);
        }

        let lock = self.inner.prepared.prepare_lock(fp);
        let _guard = lock.lock().await;
        if let Some(entry) = self.inner.prepared.get(fp) {
            return Ok(entry);
        }

        let hosts = self.hosts();
        let primary = hosts.first().ok_or_else(|| DriverError::NoHostAvailable { inner: Default::default() })?;
        let entry = prepare_on_host(&self.inner, primary, fp, cql, keyspace).await?;

        if self.inner.config.query_options.prepare_on_all_hosts {
            for host in hosts.iter().skip(1) {
                if let Err(e) = prepare_on_host(&self.inner, host, fp, cql, keyspace).await {
                    tracing::warn!(addr = %host.rpc_address, %e, "prepareOnAllHosts fan-out failed");
                }
            }
        }

        Ok(entry)
    }

    /// Reacts to the control connection's push events: host up/down,
    /// topology changes, and debounced schema refresh (spec §2, §4.10).
    fn spawn_control_event_loop(&self, control_link: Arc<ControlLink>, conn: Arc<Connection>) {
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            let mut events = control_link.subscribe();
            loop {
                let event = match events.recv().await {
                    Ok(e) => e,
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => return,
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                };
                match event {
                    ServerEvent::StatusChange { change, addr } => match change.as_str() {
                        "UP" => {
                            if let Some(host) = inner.hosts.get(&addr).map(|h| Arc::clone(h.value())) {
                                host.mark_up();
                                inner.reconnect_states.remove(&addr);
                                if inner.config.query_options.re_prepare_on_up {
                                    let inner = Arc::clone(&inner);
                                    tokio::spawn(async move { re_prepare_on_host(&inner, &host).await });
                                }
                            }
                        }
                        "DOWN" => {
                            if let Some(host) = inner.hosts.get(&addr).map(|h| Arc::clone(h.value())) {
                                host.mark_down();
                            }
                            inner.prepared.forget_host(addr);
                        }
                        _ => {}
                    },
                    ServerEvent::TopologyChange { change, addr } => match change.as_str() {
                        "NEW_NODE" => {
                            let host = Host::new(addr, String::new(), String::new(), vec![], String::new(), uuid::Uuid::new_v4());
                            inner.hosts.insert(addr, host);
                            refresh_ring(&inner);
                        }
                        "REMOVED_NODE" => {
                            inner.hosts.remove(&addr);
                            inner.pools.remove(&addr);
                            inner.reconnect_states.remove(&addr);
                            refresh_ring(&inner);
                        }
                        _ => {}
                    },
                    ServerEvent::SchemaChange { .. } => {
                        if !inner.config.is_metadata_sync_enabled {
                            continue;
                        }
                        // Debounce: a burst of schema events within the
                        // window collapses into exactly one refresh by
                        // aborting whatever refresh was previously queued
                        // and restarting the delay.
                        let mut guard = inner.schema_debounce.lock();
                        if let Some(handle) = guard.take() {
                            handle.abort();
                        }
                        let inner_for_refresh = Arc::clone(&inner);
                        let conn = Arc::clone(&conn);
                        let delay = inner.config.refresh_schema_delay;
                        *guard = Some(tokio::spawn(async move {
                            tokio::time::sleep(delay).await;
                            if let Err(e) = refresh_schema(&inner_for_refresh, &conn).await {
                                tracing::warn!(%e, "schema refresh failed");
                            }
                        }));
                    }
                }
            }
        });
    }

    /// Periodic sweep driving the parts of the pool lifecycle that aren't
    /// triggered by a push event: reaping defunct connections, attempting
    /// reconnection on the configured schedule once a pool goes empty, and
    /// lazily opening pools for hosts discovered but never warmed up
    /// (spec §6, `heartBeatInterval`, `pooling.warmup=false`).
    fn spawn_pool_supervisor(&self) {
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(inner.config.heart_beat_interval).await;
                if inner.shut_down.load(Ordering::Acquire) {
                    return;
                }

                let max_version = ProtocolVersion(inner.config.protocol_options.max_version);
                let socket_options = crate::connection::SocketOptions::from(&inner.config.socket_options);
                let hosts: Vec<Arc<Host>> = inner.hosts.iter().map(|e| Arc::clone(e.value())).collect();

                for host in hosts {
                    let addr = host.rpc_address;
                    match inner.pools.get(&addr).map(|p| Arc::clone(p.value())) {
                        Some(pool) => {
                            pool.reap_defunct().await;
                            if !pool.is_empty() {
                                continue;
                            }
                            host.mark_down();
                            if !due_for_reconnect(&inner, addr) {
                                continue;
                            }
                            match pool.add_connection(inner.stream_factory.as_ref(), max_version, socket_options.clone()).await {
                                Ok(()) if !pool.is_empty() => {
                                    host.mark_up();
                                    inner.reconnect_states.remove(&addr);
                                    if inner.config.query_options.re_prepare_on_up {
                                        re_prepare_on_host(&inner, &host).await;
                                    }
                                }
                                _ => bump_reconnect_schedule(&inner, addr),
                            }
                        }
                        None => {
                            let distance = inner.load_balancing_policy.distance(&host);
                            if distance == HostDistance::Ignored {
                                continue;
                            }
                            if let Ok(new_pool) =
                                HostPool::open(Arc::clone(&host), distance, inner.stream_factory.as_ref(), max_version, socket_options.clone()).await
                            {
                                if !new_pool.is_empty() {
                                    inner.pools.insert(addr, new_pool);
                                }
                            }
                        }
                    }
                }
            }
        });
    }

    /// Close every pool and refuse further requests (spec §1, "Non-goals"
    /// excludes synchronous teardown hooks, but an explicit async shutdown
    /// is part of the ambient lifecycle every driver needs).
    pub async fn shutdown(&self) {
        self.inner.shut_down.store(true, Ordering::Release);
        let pools: Vec<Arc<HostPool>> = self.inner.pools.iter().map(|e| Arc::clone(e.value())).collect();
        for pool in pools {
            pool.close().await;
        }
    }

    pub fn connected_host_count(&self) -> usize {
        self.inner.pools.len()
    }
}

async fn dial_control_connection(
    contact_points: &[SocketAddr],
    factory: &dyn StreamFactory,
    max_version: ProtocolVersion,
) -> Option<(Arc<ControlLink>, Arc<Connection>, DiscoveryResult)> {
    for addr in contact_points {
        let Ok(stream) = factory.connect(*addr).await else { continue };
        let control_link = ControlLink::new();
        if let Ok((conn, discovery)) = control_link.establish(*addr, stream, max_version).await {
            return Some((control_link, conn, discovery));
        }
    }
    None
}

fn build_reconnection_policy(cfg: &ReconnectionPolicyConfig) -> Arc<dyn ReconnectionPolicy> {
    match cfg {
        ReconnectionPolicyConfig::Constant { delay } => Arc::new(ConstantReconnectionPolicy::new(*delay)),
        ReconnectionPolicyConfig::Exponential { base_delay, max_delay, jitter } => {
            if *jitter {
                Arc::new(ExponentialReconnectionPolicy::with_jitter(*base_delay, *max_delay))
            } else {
                Arc::new(ExponentialReconnectionPolicy::new(*base_delay, *max_delay))
            }
        }
    }
}

/// Parse each host's token strings into a sorted Murmur3 ring (spec §3,
/// token-aware routing needs a ring to place a routing token against).
fn build_ring(hosts: &[Arc<Host>]) -> Vec<(Token, Arc<Host>)> {
    let mut ring: Vec<(Token, Arc<Host>)> = hosts
        .iter()
        .flat_map(|h| {
            h.tokens
                .iter()
                .filter_map(|t| t.parse::<i64>().ok())
                .map(move |t| (Token::Murmur3(t), Arc::clone(h)))
        })
        .collect();
    ring.sort_by(|a, b| crate::routing::tokenizer::compare_tokens(&a.0, &b.0));
    ring
}

fn refresh_ring(inner: &Arc<ClientInner>) {
    let hosts: Vec<Arc<Host>> = inner.hosts.iter().map(|e| Arc::clone(e.value())).collect();
    inner.load_balancing_policy.set_ring(build_ring(&hosts));
}

/// Re-query `system_schema.keyspaces` and replace the cached replication
/// metadata wholesale (spec §4.10: schema refresh is a full re-sync, not
/// an incremental patch).
async fn refresh_schema(inner: &Arc<ClientInner>, conn: &Connection) -> Result<()> {
    let params = QueryParams { consistency: crate::protocol::Consistency::One, ..Default::default() };
    let body = messages::encode_query("SELECT keyspace_name, replication FROM system_schema.keyspaces", &params);
    let frame = conn.send(OpCode::Query, FrameFlags::default(), body).await?;
    if frame.header.opcode == OpCode::Error {
        return Err(messages::decode_error(&frame.body)?);
    }
    let (result, _) = messages::decode_result(&frame.body)?;
    if let QueryResult::Rows(rows) = result {
        let ks_idx = rows.metadata.columns.iter().position(|c| c.name == "keyspace_name");
        let rep_idx = rows.metadata.columns.iter().position(|c| c.name == "replication");
        for row in rows.rows {
            let name = ks_idx.and_then(|i| row.get(i).cloned().flatten()).and_then(|b| String::from_utf8(b).ok());
            let replication = rep_idx.and_then(|i| row.get(i).cloned().flatten()).map(|b| parse_text_map(&b)).unwrap_or_default();
            if let Some(name) = name {
                inner.schema.set_keyspace(KeyspaceMetadata { name, replication, tables: Default::default() });
            }
        }
    }
    Ok(())
}

fn due_for_reconnect(inner: &Arc<ClientInner>, addr: SocketAddr) -> bool {
    let now = tokio::time::Instant::now();
    let state = inner
        .reconnect_states
        .entry(addr)
        .or_insert_with(|| parking_lot::Mutex::new(ReconnectState { schedule: inner.reconnection_policy.new_schedule(), next_attempt: now }));
    let due = now >= state.lock().next_attempt;
    due
}

fn bump_reconnect_schedule(inner: &Arc<ClientInner>, addr: SocketAddr) {
    let now = tokio::time::Instant::now();
    let state = inner
        .reconnect_states
        .entry(addr)
        .or_insert_with(|| parking_lot::Mutex::new(ReconnectState { schedule: inner.reconnection_policy.new_schedule(), next_attempt: now }));
    let mut guard = state.lock();
    let delay = guard.schedule.next_delay();
    guard.next_attempt = now + delay;
}

/// Best-effort re-PREPARE of every known fingerprint not yet prepared on
/// `host`, run after a down→up transition (spec §6, `rePrepareOnUp`).
async fn re_prepare_on_host(inner: &Arc<ClientInner>, host: &Arc<Host>) {
    for fp in inner.prepared.all_fingerprints() {
        if inner.prepared.is_prepared_on(&fp, host.rpc_address) {
            continue;
        }
        let (keyspace, cql) = fp.clone();
        if let Err(e) = prepare_on_host(inner, host, &fp, &cql, keyspace.as_deref()).await {
            tracing::warn!(addr = %host.rpc_address, %e, "rePrepareOnUp failed");
        }
    }
}

async fn prepare_on_host(
    inner: &Arc<ClientInner>,
    host: &Arc<Host>,
    fp: &crate::prepared::Fingerprint,
    cql: &str,
    keyspace: Option<&str>,
) -> Result<PreparedEntry> {
    let pool = inner
        .pools
        .get(&host.rpc_address)
        .map(|p| Arc::clone(p.value()))
        .ok_or_else(|| DriverError::ConnectionError("no pool for host".into()))?;
    let conn = pool.borrow().await.ok_or_else(|| DriverError::Overloaded("host pool saturated".into()))?;

    let body = messages::encode_prepare(cql, keyspace);
    let frame = conn.send(OpCode::Prepare, FrameFlags::default(), body).await?;
    if frame.header.opcode == OpCode::Error {
        return Err(messages::decode_error(&frame.body)?);
    }
    let (result, _) = messages::decode_result(&frame.body)?;
    match result {
        QueryResult::Prepared(p) => {
            let entry = PreparedEntry {
                id: p.id.clone(),
                result_metadata_id: p.result_metadata_id,
                column_count: p.result_metadata.columns.len(),
            };
            inner.prepared.record(fp.clone(), host.rpc_address, entry.clone());
            Ok(entry)
        }
        _ => Err(DriverError::ProtocolError("PREPARE did not return a Prepared result".into())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn connect_rejects_empty_contact_points() {
        let config = ClusterConfig { contact_points: vec![], ..Default::default() };
        let result = Client::connect(config).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn connect_surfaces_no_host_available_for_unreachable_contact_point() {
        // Port 1 is reserved and refuses connections, so this exercises the
        // aggregate NoHostAvailable path without depending on a live
        // coordinator; shutdown's interaction with execute() is covered by
        // check_not_shut_down and the request handler's own unit tests.
        let config = ClusterConfig { contact_points: vec!["127.0.0.1:1".parse().unwrap()], ..Default::default() };
        let result = Client::connect(config).await;
        assert!(matches!(result, Err(DriverError::NoHostAvailable { .. })));
    }
}
