//! Execution profiles (spec §4.5): named bundles of the same knobs as
//! [`crate::request::ExecutionOptions`], resolved per-call → named profile
//! → default profile → built-in default.

use crate::policy::{
    DefaultRetryPolicy, LoadBalancingPolicy, NoSpeculativeExecutionPolicy, RetryPolicy,
    RoundRobinPolicy, SpeculativeExecutionPolicy, TokenAwarePolicy,
};
use crate::protocol::Consistency;
use crate::request::ExecutionOptions;
use crate::topology::metadata::SchemaMetadata;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Any field left `None` falls through to the next profile in the
/// resolution chain.
#[derive(Clone, Default)]
pub struct ExecutionProfile {
    pub consistency: Option<Consistency>,
    pub serial_consistency: Option<Consistency>,
    pub page_size: Option<i32>,
    pub timeout: Option<Duration>,
    pub is_idempotent: Option<bool>,
    pub load_balancing_policy: Option<Arc<dyn LoadBalancingPolicy>>,
    pub retry_policy: Option<Arc<dyn RetryPolicy>>,
    pub speculative_execution_policy: Option<Arc<dyn SpeculativeExecutionPolicy>>,
}

impl ExecutionProfile {
    fn merge(&self, fallback: &ExecutionProfile) -> ExecutionProfile {
        ExecutionProfile {
            consistency: self.consistency.or(fallback.consistency),
            serial_consistency: self.serial_consistency.or(fallback.serial_consistency),
            page_size: self.page_size.or(fallback.page_size),
            timeout: self.timeout.or(fallback.timeout),
            is_idempotent: self.is_idempotent.or(fallback.is_idempotent),
            load_balancing_policy: self.load_balancing_policy.clone().or_else(|| fallback.load_balancing_policy.clone()),
            retry_policy: self.retry_policy.clone().or_else(|| fallback.retry_policy.clone()),
            speculative_execution_policy: self
                .speculative_execution_policy
                .clone()
                .or_else(|| fallback.speculative_execution_policy.clone()),
        }
    }

    fn built_in_default() -> ExecutionProfile {
        ExecutionProfile {
            consistency: Some(Consistency::LocalOne),
            serial_consistency: None,
            page_size: Some(5000),
            timeout: Some(Duration::from_millis(12_000)),
            is_idempotent: Some(false),
            // No topology/schema is available at this static fallback (the
            // real DC-aware+token-aware default is built once hosts are
            // known, in `Client::connect`); wrap plain round-robin so the
            // policy is at least structurally token-aware (spec §4.10).
            load_balancing_policy: Some(Arc::new(TokenAwarePolicy::new(
                RoundRobinPolicy::default(),
                Arc::new(SchemaMetadata::new()),
            ))),
            retry_policy: Some(Arc::new(DefaultRetryPolicy)),
            speculative_execution_policy: Some(Arc::new(NoSpeculativeExecutionPolicy)),
        }
    }

    fn into_options(self) -> ExecutionOptions {
        ExecutionOptions {
            consistency: self.consistency.unwrap(),
            serial_consistency: self.serial_consistency,
            page_size: self.page_size,
            timeout: self.timeout.unwrap(),
            is_idempotent: self.is_idempotent.unwrap(),
            load_balancing_policy: self.load_balancing_policy.unwrap(),
            retry_policy: self.retry_policy.unwrap(),
            speculative_execution_policy: self.speculative_execution_policy.unwrap(),
        }
    }
}

/// Holds the default profile plus any named profiles registered at client
/// construction, and resolves a per-call override against them.
pub struct ProfileRegistry {
    default_profile: ExecutionProfile,
    named: HashMap<String, ExecutionProfile>,
}

impl ProfileRegistry {
    pub fn new(default_profile: ExecutionProfile) -> ProfileRegistry {
        ProfileRegistry { default_profile, named: HashMap::new() }
    }

    pub fn register(&mut self, name: impl Into<String>, profile: ExecutionProfile) {
        self.named.insert(name.into(), profile);
    }

    /// Resolve `per_call` against `profile_name` (if given), the default
    /// profile, and the built-in default, in that order (spec §4.5).
    pub fn resolve(&self, per_call: Option<&ExecutionProfile>, profile_name: Option<&str>) -> ExecutionOptions {
        let named = profile_name.and_then(|n| self.named.get(n)).cloned().unwrap_or_default();
        let mut resolved = ExecutionProfile::default();
        if let Some(p) = per_call {
            resolved = resolved.merge(p);
        }
        resolved = resolved.merge(&named);
        resolved = resolved.merge(&self.default_profile);
        resolved = resolved.merge(&ExecutionProfile::built_in_default());
        resolved.into_options()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn per_call_override_wins_over_named_and_default() {
        let mut registry = ProfileRegistry::new(ExecutionProfile { consistency: Some(Consistency::One), ..Default::default() });
        registry.register("analytics", ExecutionProfile { consistency: Some(Consistency::All), ..Default::default() });

        let per_call = ExecutionProfile { consistency: Some(Consistency::Quorum), ..Default::default() };
        let resolved = registry.resolve(Some(&per_call), Some("analytics"));
        assert_eq!(resolved.consistency, Consistency::Quorum);
    }

    #[test]
    fn named_profile_wins_over_client_default() {
        let mut registry = ProfileRegistry::new(ExecutionProfile { consistency: Some(Consistency::One), ..Default::default() });
        registry.register("analytics", ExecutionProfile { consistency: Some(Consistency::All), ..Default::default() });

        let resolved = registry.resolve(None, Some("analytics"));
        assert_eq!(resolved.consistency, Consistency::All);
    }

    #[test]
    fn falls_back_to_built_in_default_when_nothing_else_set() {
        let registry = ProfileRegistry::new(ExecutionProfile::default());
        let resolved = registry.resolve(None, None);
        assert_eq!(resolved.consistency, Consistency::LocalOne);
    }
}
