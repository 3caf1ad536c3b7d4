//! Cluster topology and schema metadata (spec §2, §4.10).

pub mod control_link;
pub mod host;
pub mod metadata;

pub use control_link::{ControlLink, DiscoveryResult};
pub use host::{Host, HostDistance, HostStatus};
pub use metadata::{KeyspaceMetadata, SchemaMetadata, TableMetadata};
