//! The per-request state machine (spec §4.9):
//!
//! ```text
//! Initial -> Planning -> Sending -> AwaitingResponse -> Completed
//!                                        |        \
//!                                        |         -> SpeculativelyExecuting
//!                                        v
//!                                     Retrying -> Sending (next host) -> ...
//!                                        \
//!                                         -> Failed
//! ```
//!
//! A "lane" below is one (host, send, maybe-retry-same) chain; speculative
//! execution runs several lanes concurrently against different hosts and
//! the first to complete successfully wins. Lanes that lose the race are
//! left to finish on their own rather than cancelled — the coordinator's
//! send already happened server-side, so cancelling client-side wouldn't
//! undo it.

use crate::connection::Connection;
use crate::error::{DriverError, Result};
use crate::policy::{RetryDecision, RoutingInfo};
use crate::pool::HostPool;
use crate::prepared::{Fingerprint, PreparedEntry, PreparedRegistry};
use crate::protocol::messages::QueryResult;
use crate::protocol::{Frame, FrameFlags, OpCode};
use crate::request::options::ExecutionOptions;
use crate::topology::host::Host;
use dashmap::DashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Carries what's needed to transparently re-prepare and retry exactly once
/// when a coordinator reports `UNPREPARED` (spec §4.9 state 5). This bypasses
/// the retry policy entirely — an UNPREPARED response isn't a judgment call
/// about the cluster's health, it just means this particular coordinator
/// evicted (or never had) the statement.
#[derive(Clone)]
pub struct UnpreparedRecovery {
    pub fingerprint: Fingerprint,
    pub cql: String,
    pub keyspace: Option<String>,
    pub prepared: Arc<PreparedRegistry>,
    pub params: crate::protocol::messages::QueryParams,
}

async fn reprepare_and_retry(conn: &Connection, recovery: &UnpreparedRecovery) -> Result<Vec<u8>> {
    let prepare_body = crate::protocol::messages::encode_prepare(&recovery.cql, recovery.keyspace.as_deref());
    let frame = conn.send(OpCode::Prepare, FrameFlags::default(), prepare_body).await?;
    if frame.header.opcode == OpCode::Error {
        return Err(crate::protocol::messages::decode_error(&frame.body)?);
    }
    let (result, _) = crate::protocol::messages::decode_result(&frame.body)?;
    match result {
        QueryResult::Prepared(p) => {
            let entry = PreparedEntry {
                id: p.id.clone(),
                result_metadata_id: p.result_metadata_id,
                column_count: p.result_metadata.columns.len(),
            };
            recovery.prepared.record(recovery.fingerprint.clone(), conn.peer(), entry.clone());
            Ok(crate::protocol::messages::encode_execute(&entry.id, &recovery.params))
        }
        _ => Err(DriverError::ProtocolError("PREPARE did not return a Prepared result".into())),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerState {
    Initial,
    Planning,
    Sending,
    AwaitingResponse,
    Retrying,
    SpeculativelyExecuting,
    Completed,
    Failed,
}

pub struct RequestHandler {
    pools: Arc<DashMap<SocketAddr, Arc<HostPool>>>,
    options: ExecutionOptions,
    state: Arc<parking_lot::Mutex<HandlerState>>,
}

const MAX_RETRY_SAME_HOST: u32 = 3;

impl RequestHandler {
    pub fn new(pools: Arc<DashMap<SocketAddr, Arc<HostPool>>>, options: ExecutionOptions) -> RequestHandler {
        RequestHandler {
            pools,
            options,
            state: Arc::new(parking_lot::Mutex::new(HandlerState::Initial)),
        }
    }

    pub fn state(&self) -> HandlerState {
        *self.state.lock()
    }

    fn set_state(&self, s: HandlerState) {
        *self.state.lock() = s;
    }

    pub async fn execute(
        &self,
        opcode: OpCode,
        body: Vec<u8>,
        hosts: &[Arc<Host>],
        routing: RoutingInfo,
    ) -> Result<Frame> {
        self.execute_with_unprepared_recovery(opcode, body, hosts, routing, None).await
    }

    pub async fn execute_with_unprepared_recovery(
        &self,
        opcode: OpCode,
        body: Vec<u8>,
        hosts: &[Arc<Host>],
        routing: RoutingInfo,
        unprepared: Option<UnpreparedRecovery>,
    ) -> Result<Frame> {
        self.set_state(HandlerState::Planning);
        let plan = self.options.load_balancing_policy.plan(hosts, &routing);
        if plan.is_empty() {
            self.set_state(HandlerState::Failed);
            return Err(DriverError::NoHostAvailable { inner: Default::default() });
        }

        let (tx, mut rx) = mpsc::unbounded_channel::<(SocketAddr, Result<Frame>)>();
        let completed = Arc::new(AtomicBool::new(false));
        let body = Arc::new(body);
        let unprepared = unprepared.map(Arc::new);

        self.set_state(HandlerState::Sending);
        let first = Arc::clone(&plan[0]);
        self.spawn_lane(Arc::clone(&first), opcode, Arc::clone(&body), tx.clone(), Arc::clone(&completed), unprepared.clone());

        let spec_plan = if self.options.is_idempotent {
            Some(self.options.speculative_execution_policy.new_plan())
        } else {
            None
        };

        let remaining_hosts = plan[1..].to_vec();
        let tx_for_spec = tx.clone();
        let body_for_spec = Arc::clone(&body);
        let completed_for_spec = Arc::clone(&completed);
        let pools_for_spec = Arc::clone(&self.pools);
        let retry_policy_for_spec = Arc::clone(&self.options.retry_policy);
        let is_idempotent = self.options.is_idempotent;
        let unprepared_for_spec = unprepared.clone();

        if let Some(mut spec_plan) = spec_plan {
            tokio::spawn(async move {
                let mut running = 1usize;
                for host in remaining_hosts {
                    let Some(delay) = spec_plan.next_execution(running) else { break };
                    tokio::time::sleep(delay).await;
                    if completed_for_spec.load(Ordering::Acquire) {
                        return;
                    }
                    running += 1;
                    spawn_lane_standalone(
                        host,
                        opcode,
                        Arc::clone(&body_for_spec),
                        tx_for_spec.clone(),
                        Arc::clone(&completed_for_spec),
                        Arc::clone(&pools_for_spec),
                        Arc::clone(&retry_policy_for_spec),
                        is_idempotent,
                        unprepared_for_spec.clone(),
                    );
                }
            });
        }
        drop(tx);

        self.set_state(HandlerState::AwaitingResponse);
        let mut last_err: Option<DriverError> = None;
        while let Some((_host, result)) = rx.recv().await {
            match result {
                Ok(frame) if frame.header.opcode != OpCode::Error => {
                    completed.store(true, Ordering::Release);
                    self.set_state(HandlerState::Completed);
                    return Ok(frame);
                }
                Ok(error_frame) => {
                    last_err = crate::protocol::messages::decode_error(&error_frame.body).ok();
                }
                Err(e) => last_err = Some(e),
            }
        }

        self.set_state(HandlerState::Failed);
        Err(last_err.unwrap_or(DriverError::NoHostAvailable { inner: Default::default() }))
    }

    fn spawn_lane(
        &self,
        host: Arc<Host>,
        opcode: OpCode,
        body: Arc<Vec<u8>>,
        tx: mpsc::UnboundedSender<(SocketAddr, Result<Frame>)>,
        completed: Arc<AtomicBool>,
        unprepared: Option<Arc<UnpreparedRecovery>>,
    ) {
        spawn_lane_standalone(
            host,
            opcode,
            body,
            tx,
            completed,
            Arc::clone(&self.pools),
            Arc::clone(&self.options.retry_policy),
            self.options.is_idempotent,
            unprepared,
        );
    }
}

fn spawn_lane_standalone(
    host: Arc<Host>,
    opcode: OpCode,
    body: Arc<Vec<u8>>,
    tx: mpsc::UnboundedSender<(SocketAddr, Result<Frame>)>,
    completed: Arc<AtomicBool>,
    pools: Arc<DashMap<SocketAddr, Arc<HostPool>>>,
    retry_policy: Arc<dyn crate::policy::RetryPolicy>,
    is_idempotent: bool,
    unprepared: Option<Arc<UnpreparedRecovery>>,
) {
    tokio::spawn(async move {
        let addr = host.rpc_address;
        let mut retry_count = 0u32;
        let mut body = body;
        let mut unprepared_retried = false;
        loop {
            if completed.load(Ordering::Acquire) {
                return;
            }
            let Some(pool) = pools.get(&addr).map(|p| Arc::clone(p.value())) else {
                let _ = tx.send((addr, Err(DriverError::ConnectionError("no pool for host".into()))));
                return;
            };
            let Some(conn) = pool.borrow().await else {
                let _ = tx.send((addr, Err(DriverError::Overloaded("host pool saturated".into()))));
                return;
            };

            let send_result = conn.send(opcode, FrameFlags::default(), (*body).clone()).await;
            match &send_result {
                Ok(frame) if frame.header.opcode == OpCode::Error => {
                    if let Ok(err) = crate::protocol::messages::decode_error(&frame.body) {
                        if let (DriverError::Unprepared(_), Some(recovery), false) =
                            (&err, &unprepared, unprepared_retried)
                        {
                            unprepared_retried = true;
                            match reprepare_and_retry(&conn, recovery).await {
                                Ok(new_body) => {
                                    body = Arc::new(new_body);
                                    continue;
                                }
                                Err(e) => {
                                    let _ = tx.send((addr, Err(e)));
                                    return;
                                }
                            }
                        }
                        if retry_decision_requests_same_host(&retry_policy, &err, retry_count, is_idempotent) && retry_count < MAX_RETRY_SAME_HOST {
                            retry_count += 1;
                            continue;
                        }
                    }
                }
                Err(e) => {
                    let decision = retry_policy.on_request_error(e, is_idempotent, retry_count);
                    if decision == RetryDecision::RetrySame && retry_count < MAX_RETRY_SAME_HOST {
                        retry_count += 1;
                        continue;
                    }
                }
                _ => {}
            }

            let _ = tx.send((addr, send_result));
            return;
        }
    });
}

fn retry_decision_requests_same_host(
    policy: &Arc<dyn crate::policy::RetryPolicy>,
    err: &DriverError,
    retry_count: u32,
    _is_idempotent: bool,
) -> bool {
    let decision = match err {
        DriverError::ReadTimeout { consistency, received, required, data_present } => {
            policy.on_read_timeout(*consistency, *received, *required, *data_present, retry_count)
        }
        DriverError::WriteTimeout { consistency, received, required, write_type } => {
            policy.on_write_timeout(*consistency, *received, *required, *write_type, retry_count)
        }
        DriverError::Unavailable { consistency, required, alive } => {
            policy.on_unavailable(*consistency, *required, *alive, retry_count)
        }
        _ => return false,
    };
    decision == RetryDecision::RetrySame
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::{DefaultRetryPolicy, NoSpeculativeExecutionPolicy, RoundRobinPolicy};
    use std::time::Duration;

    fn make_options() -> ExecutionOptions {
        ExecutionOptions {
            consistency: crate::protocol::Consistency::One,
            serial_consistency: None,
            page_size: None,
            timeout: Duration::from_secs(5),
            is_idempotent: false,
            load_balancing_policy: Arc::new(RoundRobinPolicy::default()),
            retry_policy: Arc::new(DefaultRetryPolicy),
            speculative_execution_policy: Arc::new(NoSpeculativeExecutionPolicy),
        }
    }

    #[tokio::test]
    async fn execute_fails_fast_with_empty_host_list() {
        let handler = RequestHandler::new(Arc::new(DashMap::new()), make_options());
        let result = handler.execute(OpCode::Query, vec![], &[], RoutingInfo::default()).await;
        assert!(result.is_err());
        assert_eq!(handler.state(), HandlerState::Failed);
    }

    #[tokio::test]
    async fn execute_fails_when_no_pool_registered_for_planned_host() {
        let host = Host::new("10.0.0.1:9042".parse().unwrap(), "dc1".into(), "r1".into(), vec![], "4.0".into(), uuid::Uuid::new_v4());
        let handler = RequestHandler::new(Arc::new(DashMap::new()), make_options());
        let result = handler.execute(OpCode::Query, vec![], &[host], RoutingInfo::default()).await;
        assert!(result.is_err());
    }
}
