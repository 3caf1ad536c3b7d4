//! Single-connection layer: stream ids, transport, and the per-connection
//! state machine (spec §3, §4.2, §4.3).

pub mod connection;
pub mod stream_id;
pub mod transport;

pub use connection::{Connection, ConnectionState, SocketOptions};
pub use stream_id::StreamIdStack;
pub use transport::{ByteStream, ByteStreamBox, StreamFactory, TcpStreamFactory};
