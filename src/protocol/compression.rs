//! Frame body compression, negotiated via STARTUP options (spec §4.1).
//!
//! The core ships the negotiation and framing contract; actual LZ4/Snappy
//! codecs are supplied by whatever the embedding application links in
//! (geospatial/date-range value codecs follow the same "registry" pattern
//! per spec §1's out-of-scope list). `None` is always available.

use crate::error::{DriverError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompressionKind {
    None,
    Lz4,
    Snappy,
}

impl CompressionKind {
    pub fn name(self) -> Option<&'static str> {
        match self {
            CompressionKind::None => None,
            CompressionKind::Lz4 => Some("lz4"),
            CompressionKind::Snappy => Some("snappy"),
        }
    }
}

/// A pluggable body compressor, consulted by the connection after the
/// STARTUP/SUPPORTED exchange has settled on an algorithm name.
pub trait BodyCompressor: Send + Sync {
    fn kind(&self) -> CompressionKind;
    fn compress(&self, body: &[u8]) -> Result<Vec<u8>>;
    fn decompress(&self, body: &[u8]) -> Result<Vec<u8>>;
}

/// The no-op compressor used when STARTUP negotiation doesn't pick an
/// algorithm, or none is registered.
pub struct NoopCompressor;

impl BodyCompressor for NoopCompressor {
    fn kind(&self) -> CompressionKind {
        CompressionKind::None
    }

    fn compress(&self, body: &[u8]) -> Result<Vec<u8>> {
        Ok(body.to_vec())
    }

    fn decompress(&self, body: &[u8]) -> Result<Vec<u8>> {
        Ok(body.to_vec())
    }
}

/// Selects a registered compressor by the name advertised in `SUPPORTED`,
/// falling back to `None` when nothing matches.
pub fn negotiate<'a>(
    requested: Option<&str>,
    registry: &'a [&'a dyn BodyCompressor],
) -> &'a dyn BodyCompressor {
    static NOOP: NoopCompressor = NoopCompressor;
    match requested {
        None => &NOOP,
        Some(name) => registry
            .iter()
            .copied()
            .find(|c| c.kind().name() == Some(name))
            .unwrap_or(&NOOP),
    }
}

pub fn require_registered(kind: CompressionKind, registry: &[&dyn BodyCompressor]) -> Result<()> {
    if kind == CompressionKind::None {
        return Ok(());
    }
    if registry.iter().any(|c| c.kind() == kind) {
        Ok(())
    } else {
        Err(DriverError::ConfigError(format!(
            "no compressor registered for {kind:?}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negotiate_falls_back_to_none_when_unmatched() {
        let c = negotiate(Some("zstd"), &[]);
        assert_eq!(c.kind(), CompressionKind::None);
    }

    #[test]
    fn negotiate_with_no_request_is_none() {
        let c = negotiate(None, &[]);
        assert_eq!(c.kind(), CompressionKind::None);
    }
}
