//! Schema metadata cache fed by the control connection (spec §2, §4.10).
//!
//! Kept intentionally shallow: enough shape to drive prepared-statement
//! keyspace resolution and schema-agreement checks, not a full schema
//! object model (CQL DDL parsing is out of scope, spec §1).

use dashmap::DashMap;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct TableMetadata {
    pub name: String,
    pub columns: Vec<String>,
    pub partition_key: Vec<String>,
    pub clustering_key: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct KeyspaceMetadata {
    pub name: String,
    pub replication: std::collections::HashMap<String, String>,
    pub tables: std::collections::HashMap<String, TableMetadata>,
}

/// Keyspace/table/UDT cache, refreshed wholesale on `SCHEMA_CHANGE` events
/// after the debounce window (`refreshSchemaDelay`, spec §6) elapses.
#[derive(Default)]
pub struct SchemaMetadata {
    keyspaces: DashMap<String, Arc<KeyspaceMetadata>>,
}

impl SchemaMetadata {
    pub fn new() -> Self {
        SchemaMetadata::default()
    }

    pub fn keyspace(&self, name: &str) -> Option<Arc<KeyspaceMetadata>> {
        self.keyspaces.get(name).map(|r| Arc::clone(r.value()))
    }

    pub fn set_keyspace(&self, ks: KeyspaceMetadata) {
        self.keyspaces.insert(ks.name.clone(), Arc::new(ks));
    }

    pub fn drop_keyspace(&self, name: &str) {
        self.keyspaces.remove(name);
    }

    pub fn table(&self, keyspace: &str, table: &str) -> Option<TableMetadata> {
        self.keyspace(keyspace).and_then(|ks| ks.tables.get(table).cloned())
    }

    pub fn keyspace_count(&self) -> usize {
        self.keyspaces.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_and_fetch_keyspace_roundtrips() {
        let meta = SchemaMetadata::new();
        meta.set_keyspace(KeyspaceMetadata {
            name: "ks1".into(),
            ..Default::default()
        });
        assert!(meta.keyspace("ks1").is_some());
        assert_eq!(meta.keyspace_count(), 1);
        meta.drop_keyspace("ks1");
        assert!(meta.keyspace("ks1").is_none());
    }
}
