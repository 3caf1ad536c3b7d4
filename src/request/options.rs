//! Execution options merged from a request, a profile, and cluster
//! defaults (spec §4.5 resolution order: per-call → named profile →
//! default profile → built-in default).

use crate::policy::{LoadBalancingPolicy, RetryPolicy, SpeculativeExecutionPolicy};
use crate::protocol::Consistency;
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone)]
pub struct ExecutionOptions {
    pub consistency: Consistency,
    pub serial_consistency: Option<Consistency>,
    pub page_size: Option<i32>,
    pub timeout: Duration,
    pub is_idempotent: bool,
    pub load_balancing_policy: Arc<dyn LoadBalancingPolicy>,
    pub retry_policy: Arc<dyn RetryPolicy>,
    pub speculative_execution_policy: Arc<dyn SpeculativeExecutionPolicy>,
}

impl std::fmt::Debug for ExecutionOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionOptions")
            .field("consistency", &self.consistency)
            .field("serial_consistency", &self.serial_consistency)
            .field("page_size", &self.page_size)
            .field("timeout", &self.timeout)
            .field("is_idempotent", &self.is_idempotent)
            .finish_non_exhaustive()
    }
}
