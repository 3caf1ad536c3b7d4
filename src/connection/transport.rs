//! The byte-stream abstraction a `Connection` is built over.
//!
//! Transport security negotiation is explicitly out of scope for the core
//! (spec §1): the core only consumes a [`StreamFactory`] that may hand back
//! a plain TCP socket or one already wrapped in TLS by the embedding
//! application. This mirrors the teacher's `networking::transport` split
//! between `TcpTransport`/`QuicTransport` and the connection that rides on
//! top of either.

use crate::error::Result;
use async_trait::async_trait;
use std::net::SocketAddr;
use tokio::io::{AsyncRead, AsyncWrite};

/// Anything that looks like a duplex byte stream: a plain `TcpStream`, a
/// `tokio_rustls`-wrapped stream, or a mock pipe in tests.
pub trait ByteStream: AsyncRead + AsyncWrite + Unpin + Send + 'static {}
impl<T: AsyncRead + AsyncWrite + Unpin + Send + 'static> ByteStream for T {}

/// Opens a byte stream to a host. The default implementation dials plain
/// TCP; an embedder wanting TLS supplies its own `StreamFactory`.
#[async_trait]
pub trait StreamFactory: Send + Sync {
    async fn connect(&self, addr: SocketAddr) -> Result<Box<dyn ByteStreamBox>>;
}

/// Object-safe wrapper so `StreamFactory::connect` can return a trait object.
pub trait ByteStreamBox: AsyncRead + AsyncWrite + Unpin + Send {}
impl<T: AsyncRead + AsyncWrite + Unpin + Send> ByteStreamBox for T {}

/// Plain TCP stream factory with `TCP_NODELAY` set per
/// `socketOptions.tcpNoDelay` (spec §6, default `true`).
pub struct TcpStreamFactory {
    pub tcp_nodelay: bool,
}

impl Default for TcpStreamFactory {
    fn default() -> Self {
        TcpStreamFactory { tcp_nodelay: true }
    }
}

#[async_trait]
impl StreamFactory for TcpStreamFactory {
    async fn connect(&self, addr: SocketAddr) -> Result<Box<dyn ByteStreamBox>> {
        let stream = tokio::net::TcpStream::connect(addr).await?;
        stream.set_nodelay(self.tcp_nodelay)?;
        Ok(Box::new(stream))
    }
}
