//! Batch composition at the API boundary (spec §4.8). Keeps prepared members
//! at the fingerprint level (`cql`/`keyspace`, like [`crate::request::Statement::Prepared`])
//! rather than a raw statement id, since the caller building a batch
//! shouldn't need to have already called `prepare` itself — `Client::execute_batch`
//! resolves each one against the prepared registry (spec §4.9 "getPreparedMultiple")
//! before encoding the wire-level [`crate::protocol::messages::BatchEntry`].

use crate::protocol::messages::BatchType;
use crate::protocol::Value;
use crate::request::statement::RoutingHint;

#[derive(Debug, Clone)]
pub enum BatchItem {
    Query { cql: String, values: Vec<Value> },
    Prepared { cql: String, keyspace: Option<String>, values: Vec<Value> },
}

#[derive(Debug, Clone)]
pub struct BatchStatement {
    pub item: BatchItem,
    pub is_idempotent: bool,
}

#[derive(Debug, Clone, Default)]
pub struct BatchRequest {
    pub batch_type: BatchType,
    pub statements: Vec<BatchStatement>,
    pub routing: RoutingHint,
}

impl Default for BatchType {
    fn default() -> Self {
        BatchType::Logged
    }
}

impl BatchRequest {
    pub fn new(batch_type: BatchType) -> BatchRequest {
        BatchRequest { batch_type, statements: Vec::new(), routing: RoutingHint::default() }
    }

    pub fn add_query(&mut self, cql: impl Into<String>, values: Vec<Value>, is_idempotent: bool) {
        self.statements.push(BatchStatement {
            item: BatchItem::Query { cql: cql.into(), values },
            is_idempotent,
        });
    }

    pub fn add_prepared(
        &mut self,
        cql: impl Into<String>,
        keyspace: Option<String>,
        values: Vec<Value>,
        is_idempotent: bool,
    ) {
        self.statements.push(BatchStatement {
            item: BatchItem::Prepared { cql: cql.into(), keyspace, values },
            is_idempotent,
        });
    }

    /// A batch is only safe to retry client-side if every statement in it
    /// is (spec §7, batches inherit the strictest member's idempotence).
    pub fn is_idempotent(&self) -> bool {
        self.statements.iter().all(|s| s.is_idempotent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_idempotence_is_the_conjunction_of_members() {
        let mut batch = BatchRequest::new(BatchType::Unlogged);
        batch.add_query("INSERT INTO t(k,v) VALUES (1,1)", vec![], true);
        batch.add_query("UPDATE t SET v = v + 1 WHERE k=1", vec![], false);
        assert!(!batch.is_idempotent());
    }

    #[test]
    fn all_idempotent_members_make_batch_idempotent() {
        let mut batch = BatchRequest::new(BatchType::Logged);
        batch.add_query("INSERT INTO t(k,v) VALUES (1,1)", vec![], true);
        batch.add_prepared("SELECT 1", None, vec![], true);
        assert!(batch.is_idempotent());
    }
}
