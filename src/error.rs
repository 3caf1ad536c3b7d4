//! Error taxonomy for the request execution pipeline.
//!
//! Mirrors the teacher's `DbError` in spirit (a single `thiserror` enum with
//! `#[from]` conversions consumed through one `Result` alias) but scoped to
//! the taxonomy spec'd for this driver: transport, timeout, availability,
//! query and execution errors, plus the `NoHostAvailable` aggregate.

use std::collections::HashMap;
use std::net::SocketAddr;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, DriverError>;

/// A server-reported error code, carried on the wire as defined in spec §6.
/// Canonical definition lives in [`crate::protocol::ServerErrorCode`]; this
/// module only consumes it to build a [`DriverError`] from an `ERROR` frame.
pub use crate::protocol::ServerErrorCode;

/// The consistency level a write was attempted at, as reported on a
/// `WRITE_TIMEOUT`/`WRITE_FAILURE` response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteType {
    Simple,
    Batch,
    UnloggedBatch,
    Counter,
    BatchLog,
    Cas,
    View,
    Cdc,
}

#[derive(Error, Debug, Clone)]
pub enum DriverError {
    /// The socket underlying a connection closed or errored.
    #[error("connection error: {0}")]
    ConnectionError(String),

    /// A frame could not be decoded, or the negotiated protocol version was
    /// rejected by the peer.
    #[error("protocol error: {0}")]
    ProtocolError(String),

    /// The client gave up waiting for a response on one host (per-host
    /// `readTimeout`). Does not imply the request never executed.
    #[error("operation timed out after {0:?}")]
    OperationTimedOut(std::time::Duration),

    /// Server-reported `READ_TIMEOUT`.
    #[error("read timeout: {received}/{required} replicas responded, data_present={data_present}")]
    ReadTimeout {
        consistency: crate::protocol::Consistency,
        received: i32,
        required: i32,
        data_present: bool,
    },

    /// Server-reported `WRITE_TIMEOUT`.
    #[error("write timeout: {received}/{required} replicas acknowledged ({write_type:?})")]
    WriteTimeout {
        consistency: crate::protocol::Consistency,
        received: i32,
        required: i32,
        write_type: WriteType,
    },

    /// Server-reported `READ_FAILURE` / `WRITE_FAILURE`.
    #[error("request failure: {num_failures} replicas reported failure")]
    RequestFailure { num_failures: i32 },

    /// Server-reported `UNAVAILABLE`: not enough live replicas to satisfy
    /// the requested consistency at coordination time.
    #[error("unavailable: need {required}, have {alive}")]
    Unavailable {
        consistency: crate::protocol::Consistency,
        required: i32,
        alive: i32,
    },

    #[error("overloaded: {0}")]
    Overloaded(String),

    #[error("coordinator is bootstrapping")]
    IsBootstrapping,

    #[error("syntax error: {0}")]
    Syntax(String),

    #[error("invalid query: {0}")]
    Invalid(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("bad credentials: {0}")]
    BadCredentials(String),

    #[error("config error: {0}")]
    ConfigError(String),

    #[error("already exists: keyspace={keyspace}, table={table:?}")]
    AlreadyExists { keyspace: String, table: Option<String> },

    #[error("function failure: {0}")]
    FunctionFailure(String),

    #[error("truncate error: {0}")]
    TruncateError(String),

    /// Statement was not prepared on the coordinator the request landed on.
    /// The request handler handles this transparently (spec §4.9 state 5);
    /// this variant only surfaces if re-preparation itself fails.
    #[error("unprepared statement: id={0:?}")]
    Unprepared(Vec<u8>),

    /// The load-balancing policy's plan was exhausted without a usable host.
    #[error("no host was available: {inner:?}")]
    NoHostAvailable {
        inner: HashMap<SocketAddr, Box<DriverError>>,
    },

    /// A parameter/argument validation failure at the API boundary.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("driver is shut down")]
    Shutdown,

    #[error("internal driver error: {0}")]
    Internal(String),
}

impl From<std::io::Error> for DriverError {
    fn from(e: std::io::Error) -> Self {
        DriverError::ConnectionError(e.to_string())
    }
}

impl DriverError {
    /// Server errors that the retry policy is always consulted for,
    /// regardless of a request's idempotence (spec §7).
    pub fn is_server_retryable_regardless_of_idempotence(&self) -> bool {
        matches!(
            self,
            DriverError::Unavailable { .. }
                | DriverError::ReadTimeout { .. }
                | DriverError::WriteTimeout { .. }
                | DriverError::RequestFailure { .. }
                | DriverError::Overloaded(_)
                | DriverError::IsBootstrapping
        )
    }

    /// Errors that are never retried, regardless of idempotence or policy
    /// (spec §7, "Query" category).
    pub fn is_non_retryable(&self) -> bool {
        matches!(
            self,
            DriverError::Syntax(_)
                | DriverError::Invalid(_)
                | DriverError::Unauthorized(_)
                | DriverError::BadCredentials(_)
                | DriverError::ConfigError(_)
                | DriverError::AlreadyExists { .. }
                | DriverError::FunctionFailure(_)
                | DriverError::InvalidArgument(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_retryable_errors_are_never_server_retryable() {
        let e = DriverError::Syntax("bad token".into());
        assert!(e.is_non_retryable());
        assert!(!e.is_server_retryable_regardless_of_idempotence());
    }

    #[test]
    fn unavailable_is_retryable_regardless_of_idempotence() {
        let e = DriverError::Unavailable {
            consistency: crate::protocol::Consistency::Quorum,
            required: 2,
            alive: 1,
        };
        assert!(e.is_server_retryable_regardless_of_idempotence());
    }
}
