//! Request planning and execution: the FSM driving one logical
//! query/execute/batch to completion (spec §4.9).

pub mod batch;
pub mod handler;
pub mod options;
pub mod statement;

pub use batch::{BatchItem, BatchRequest, BatchStatement};
pub use handler::{HandlerState, RequestHandler, UnpreparedRecovery};
pub use options::ExecutionOptions;
pub use statement::{RoutingHint, Statement};
