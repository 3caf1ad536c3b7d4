//! Retry policies (spec §4.9, §7).
//!
//! A policy is consulted once per server-reported error category and
//! returns a [`RetryDecision`]; the request handler never retries a
//! non-retryable error (spec §7 classification) regardless of policy.

use crate::error::{DriverError, WriteType};
use crate::protocol::Consistency;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry on the same host.
    RetrySame,
    /// Retry on the next host in the plan.
    RetryNextHost,
    /// Give up and surface the error.
    Rethrow,
    /// Return whatever partial result is already available (only
    /// meaningful for a read timeout with `data_present`).
    Ignore,
}

/// How many times a single logical request has already been retried,
/// passed to every policy method so it can refuse unbounded retries.
pub type RetryCount = u32;

pub trait RetryPolicy: Send + Sync {
    fn on_read_timeout(
        &self,
        consistency: Consistency,
        received: i32,
        required: i32,
        data_present: bool,
        retry_count: RetryCount,
    ) -> RetryDecision;

    fn on_write_timeout(
        &self,
        consistency: Consistency,
        received: i32,
        required: i32,
        write_type: WriteType,
        retry_count: RetryCount,
    ) -> RetryDecision;

    fn on_unavailable(
        &self,
        consistency: Consistency,
        required: i32,
        alive: i32,
        retry_count: RetryCount,
    ) -> RetryDecision;

    /// Consulted for connection-level errors (spec §7: "always consulted
    /// for errors indicating the request never reached the coordinator").
    fn on_request_error(&self, error: &DriverError, is_idempotent: bool, retry_count: RetryCount) -> RetryDecision;
}

/// The driver's built-in default: retry once on the next host for
/// unavailable/request errors, retry a read timeout in place if data was
/// already present, never retry a write timeout (per spec §7: writes are
/// only safely retried when the caller has marked the statement
/// idempotent).
#[derive(Debug, Default)]
pub struct DefaultRetryPolicy;

impl RetryPolicy for DefaultRetryPolicy {
    fn on_read_timeout(
        &self,
        _consistency: Consistency,
        received: i32,
        required: i32,
        data_present: bool,
        retry_count: RetryCount,
    ) -> RetryDecision {
        if retry_count > 0 {
            return RetryDecision::Rethrow;
        }
        if received >= required && !data_present {
            RetryDecision::RetrySame
        } else {
            RetryDecision::Rethrow
        }
    }

    fn on_write_timeout(
        &self,
        _consistency: Consistency,
        _received: i32,
        _required: i32,
        write_type: WriteType,
        retry_count: RetryCount,
    ) -> RetryDecision {
        if retry_count > 0 {
            return RetryDecision::Rethrow;
        }
        match write_type {
            WriteType::BatchLog => RetryDecision::RetrySame,
            _ => RetryDecision::Rethrow,
        }
    }

    fn on_unavailable(
        &self,
        _consistency: Consistency,
        _required: i32,
        _alive: i32,
        retry_count: RetryCount,
    ) -> RetryDecision {
        if retry_count == 0 {
            RetryDecision::RetryNextHost
        } else {
            RetryDecision::Rethrow
        }
    }

    fn on_request_error(&self, _error: &DriverError, _is_idempotent: bool, retry_count: RetryCount) -> RetryDecision {
        if retry_count == 0 {
            RetryDecision::RetryNextHost
        } else {
            RetryDecision::Rethrow
        }
    }
}

/// Never retries anything; useful for callers who want to see every error
/// as soon as it happens.
#[derive(Debug, Default)]
pub struct FallthroughRetryPolicy;

impl RetryPolicy for FallthroughRetryPolicy {
    fn on_read_timeout(&self, _: Consistency, _: i32, _: i32, _: bool, _: RetryCount) -> RetryDecision {
        RetryDecision::Rethrow
    }
    fn on_write_timeout(&self, _: Consistency, _: i32, _: i32, _: WriteType, _: RetryCount) -> RetryDecision {
        RetryDecision::Rethrow
    }
    fn on_unavailable(&self, _: Consistency, _: i32, _: i32, _: RetryCount) -> RetryDecision {
        RetryDecision::Rethrow
    }
    fn on_request_error(&self, _: &DriverError, _: bool, _: RetryCount) -> RetryDecision {
        RetryDecision::Rethrow
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_retries_read_timeout_once_when_data_present_is_false_but_enough_responded() {
        let p = DefaultRetryPolicy;
        let decision = p.on_read_timeout(Consistency::Quorum, 2, 2, false, 0);
        assert_eq!(decision, RetryDecision::RetrySame);
    }

    #[test]
    fn default_policy_never_retries_a_second_time() {
        let p = DefaultRetryPolicy;
        let decision = p.on_read_timeout(Consistency::Quorum, 2, 2, false, 1);
        assert_eq!(decision, RetryDecision::Rethrow);
    }

    #[test]
    fn default_policy_only_retries_batch_log_write_timeout() {
        let p = DefaultRetryPolicy;
        assert_eq!(
            p.on_write_timeout(Consistency::Quorum, 1, 2, WriteType::Simple, 0),
            RetryDecision::Rethrow
        );
        assert_eq!(
            p.on_write_timeout(Consistency::Quorum, 1, 2, WriteType::BatchLog, 0),
            RetryDecision::RetrySame
        );
    }

    #[test]
    fn fallthrough_policy_never_retries() {
        let p = FallthroughRetryPolicy;
        assert_eq!(
            p.on_unavailable(Consistency::One, 1, 0, 0),
            RetryDecision::Rethrow
        );
    }
}
