//! Prepared-statement caching and per-host tracking (spec §4.7).

pub mod registry;

pub use registry::{Fingerprint, PreparedEntry, PreparedRegistry};
