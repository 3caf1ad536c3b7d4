//! Pluggable policies: load balancing, retry, speculative execution, and
//! reconnection (spec §2, §4.9, §7).

pub mod load_balancing;
pub mod reconnection;
pub mod retry;
pub mod speculative;

pub use load_balancing::{DcAwareRoundRobinPolicy, LoadBalancingPolicy, RoundRobinPolicy, RoutingInfo, TokenAwarePolicy};
pub use reconnection::{ConstantReconnectionPolicy, ExponentialReconnectionPolicy, ReconnectionPolicy, ReconnectionSchedule};
pub use retry::{DefaultRetryPolicy, FallthroughRetryPolicy, RetryDecision, RetryPolicy};
pub use speculative::{ConstantSpeculativeExecutionPolicy, NoSpeculativeExecutionPolicy, SpeculativeExecutionPolicy};
