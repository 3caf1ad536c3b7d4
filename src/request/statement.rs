//! The statement shapes a caller can submit (spec §4.6, §4.7). CQL parsing
//! itself is out of scope (spec §1) — `SimpleQuery` just carries the
//! literal string the caller wrote.

use crate::protocol::Value;
use crate::routing::Token;

#[derive(Debug, Clone, Default)]
pub struct RoutingHint {
    pub token: Option<Token>,
    pub keyspace: Option<String>,
}

#[derive(Debug, Clone)]
pub enum Statement {
    SimpleQuery {
        cql: String,
        values: Vec<Value>,
        named_values: Option<std::collections::HashMap<String, Value>>,
        routing: RoutingHint,
    },
    Prepared {
        fingerprint_cql: String,
        keyspace: Option<String>,
        values: Vec<Value>,
        routing: RoutingHint,
    },
}

impl Statement {
    pub fn simple(cql: impl Into<String>) -> Statement {
        Statement::SimpleQuery { cql: cql.into(), values: Vec::new(), named_values: None, routing: RoutingHint::default() }
    }

    pub fn with_values(cql: impl Into<String>, values: Vec<Value>) -> Statement {
        Statement::SimpleQuery { cql: cql.into(), values, named_values: None, routing: RoutingHint::default() }
    }

    pub fn prepared(cql: impl Into<String>, keyspace: Option<String>, values: Vec<Value>) -> Statement {
        Statement::Prepared { fingerprint_cql: cql.into(), keyspace, values, routing: RoutingHint::default() }
    }

    /// Attach a routing token/keyspace hint so token-aware load balancing
    /// can place this request without parsing CQL (spec §4.5).
    pub fn with_routing(mut self, routing: RoutingHint) -> Statement {
        match &mut self {
            Statement::SimpleQuery { routing: r, .. } => *r = routing,
            Statement::Prepared { routing: r, .. } => *r = routing,
        }
        self
    }

    pub fn routing(&self) -> &RoutingHint {
        match self {
            Statement::SimpleQuery { routing, .. } => routing,
            Statement::Prepared { routing, .. } => routing,
        }
    }
}
