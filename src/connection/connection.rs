//! Per-connection state machine (spec §3, §4.3).
//!
//! Transitions: opening → ready → defunct. A connection owns one
//! bidirectional byte stream, a [`StreamIdStack`], and a map from stream id
//! to the pending callback awaiting that response. Frames are written in
//! the order `send()` is called; responses may arrive in any order and are
//! correlated by stream id (spec §5, "Ordering guarantees").

use crate::connection::stream_id::StreamIdStack;
use crate::connection::transport::ByteStream;
use crate::error::{DriverError, Result};
use crate::protocol::frame::{Frame, FrameFlags};
use crate::protocol::messages::ServerEvent;
use crate::protocol::primitives::write_string_map;
use crate::protocol::{OpCode, ProtocolVersion};
use bytes::BytesMut;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{split, AsyncReadExt, AsyncWriteExt};
use tokio::sync::{broadcast, mpsc, oneshot, RwLock};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Opening,
    Ready,
    Defunct,
}

/// Tunables that drive timeout and defunct-detection behavior
/// (`socketOptions` in spec §6).
#[derive(Debug, Clone)]
pub struct SocketOptions {
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    pub defunct_read_timeout_threshold: usize,
    pub coalescing_threshold: usize,
}

impl Default for SocketOptions {
    fn default() -> Self {
        SocketOptions {
            connect_timeout: Duration::from_millis(5000),
            read_timeout: Duration::from_millis(12_000),
            defunct_read_timeout_threshold: 64,
            coalescing_threshold: 8000,
        }
    }
}

type PendingMap = DashMap<i16, oneshot::Sender<Result<Frame>>>;

/// A single connection to a host: one stream-id space, one pending-callback
/// map, one negotiated protocol version.
pub struct Connection {
    peer: std::net::SocketAddr,
    version: ProtocolVersion,
    stream_ids: Arc<StreamIdStack>,
    pending: Arc<PendingMap>,
    write_tx: mpsc::UnboundedSender<BytesMut>,
    state: Arc<RwLock<ConnectionState>>,
    socket_options: SocketOptions,
    /// Ids whose request timed out client-side but whose response has not
    /// yet arrived (or been given up on via a defunct transition). Spec
    /// §4.3: "the id is not immediately returned".
    orphaned_timeouts: Arc<AtomicUsize>,
    logged_keyspace: Arc<RwLock<Option<String>>>,
}

impl Connection {
    /// Perform STARTUP negotiation over an already-opened stream, retrying
    /// with a lower protocol version on `PROTOCOL_ERROR` but never below v1
    /// (spec §4.3).
    pub async fn open<S: ByteStream>(
        stream: S,
        peer: std::net::SocketAddr,
        max_version: ProtocolVersion,
        socket_options: SocketOptions,
    ) -> Result<Connection> {
        Connection::open_with_event_sink(stream, peer, max_version, socket_options, None).await
    }

    /// Like [`Connection::open`], but forwards decoded `EVENT` frames to
    /// `event_sink` instead of letting them fall through to the unmatched
    /// stream-id path (spec §4.10: the control connection's `REGISTER` has
    /// no request/response correlation for pushed events).
    pub async fn open_with_event_sink<S: ByteStream>(
        stream: S,
        peer: std::net::SocketAddr,
        max_version: ProtocolVersion,
        socket_options: SocketOptions,
        event_sink: Option<broadcast::Sender<ServerEvent>>,
    ) -> Result<Connection> {
        let (read_half, write_half) = split(stream);
        let pending: Arc<PendingMap> = Arc::new(DashMap::new());
        let (write_tx, write_rx) = mpsc::unbounded_channel::<BytesMut>();
        let state = Arc::new(RwLock::new(ConnectionState::Opening));
        let orphaned_timeouts = Arc::new(AtomicUsize::new(0));

        spawn_writer(write_half, write_rx);
        let stream_ids = Arc::new(StreamIdStack::new(max_version.max_streams(), Duration::from_secs(10)));
        spawn_reader(
            read_half,
            Arc::clone(&pending),
            Arc::clone(&state),
            Arc::clone(&stream_ids),
            event_sink,
        );

        let mut conn = Connection {
            peer,
            version: max_version,
            stream_ids,
            pending,
            write_tx,
            state,
            socket_options,
            orphaned_timeouts,
            logged_keyspace: Arc::new(RwLock::new(None)),
        };

        conn.negotiate_version(max_version).await?;
        *conn.state.write().await = ConnectionState::Ready;
        Ok(conn)
    }

    async fn negotiate_version(&mut self, mut version: ProtocolVersion) -> Result<()> {
        loop {
            self.version = version;
            let mut options = HashMap::new();
            options.insert("CQL_VERSION".to_string(), "3.0.0".to_string());

            let mut body = BytesMut::new();
            write_string_map(&mut body, &options);

            match self.send_raw(OpCode::Startup, FrameFlags::default(), body.to_vec()).await {
                Ok(frame) if frame.header.opcode == OpCode::Ready => return Ok(()),
                Ok(frame) if frame.header.opcode == OpCode::Authenticate => return Ok(()),
                Ok(frame) => {
                    return Err(DriverError::ProtocolError(format!(
                        "unexpected STARTUP response opcode {:?}",
                        frame.header.opcode
                    )))
                }
                Err(DriverError::ProtocolError(_)) => match version.downgrade() {
                    Some(lower) => {
                        tracing::warn!(peer = %self.peer, from = ?version, to = ?lower, "downgrading protocol version after PROTOCOL_ERROR");
                        version = lower;
                        continue;
                    }
                    None => {
                        return Err(DriverError::ProtocolError(
                            "protocol negotiation failed even at v1".into(),
                        ))
                    }
                },
                Err(e) => return Err(e),
            }
        }
    }

    pub fn peer(&self) -> std::net::SocketAddr {
        self.peer
    }

    pub fn protocol_version(&self) -> ProtocolVersion {
        self.version
    }

    pub async fn state(&self) -> ConnectionState {
        *self.state.read().await
    }

    pub fn in_flight(&self) -> i64 {
        self.stream_ids.in_flight()
    }

    pub async fn logged_keyspace(&self) -> Option<String> {
        self.logged_keyspace.read().await.clone()
    }

    pub async fn set_logged_keyspace(&self, ks: String) {
        *self.logged_keyspace.write().await = Some(ks);
    }

    /// Write a frame and await its response, applying the per-request read
    /// timeout (spec §4.3). On timeout the stream id is *not* reclaimed —
    /// the server may still answer — and the orphan counter is bumped; past
    /// `defunctReadTimeoutThreshold` the connection is marked defunct.
    pub async fn send(&self, opcode: OpCode, flags: FrameFlags, body: Vec<u8>) -> Result<Frame> {
        if self.state().await == ConnectionState::Defunct {
            return Err(DriverError::ConnectionError("connection is defunct".into()));
        }
        match tokio::time::timeout(
            self.socket_options.read_timeout,
            self.send_raw(opcode, flags, body),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => {
                let orphaned = self.orphaned_timeouts.fetch_add(1, Ordering::SeqCst) + 1;
                if orphaned > self.socket_options.defunct_read_timeout_threshold {
                    self.mark_defunct(DriverError::ConnectionError(
                        "defunct_read_timeout_threshold exceeded".into(),
                    ))
                    .await;
                }
                Err(DriverError::OperationTimedOut(self.socket_options.read_timeout))
            }
        }
    }

    /// Write a frame and await its response with no client-side timeout
    /// (used only for the STARTUP handshake, which has its own
    /// `connect_timeout` applied by the caller).
    async fn send_raw(&self, opcode: OpCode, flags: FrameFlags, body: Vec<u8>) -> Result<Frame> {
        let stream_id = self
            .stream_ids
            .pop()
            .ok_or_else(|| DriverError::ConnectionError("stream ids exhausted".into()))? as i16;

        let (tx, rx) = oneshot::channel();
        self.pending.insert(stream_id, tx);

        let frame = Frame::request(self.version, stream_id, opcode, flags, body);
        let mut buf = BytesMut::new();
        frame.encode(&mut buf);

        if self.write_tx.send(buf).is_err() {
            self.pending.remove(&stream_id);
            self.stream_ids.push(stream_id as u16);
            return Err(DriverError::ConnectionError("writer task gone".into()));
        }

        match rx.await {
            Ok(result) => {
                self.stream_ids.push(stream_id as u16);
                result
            }
            Err(_) => {
                // Reader dropped the sender (connection torn down) without
                // ever resolving it.
                Err(DriverError::ConnectionError("connection closed while awaiting response".into()))
            }
        }
    }

    /// Mark the connection defunct: all pending callbacks complete with
    /// `ConnectionError`, matching spec §4.3.
    pub async fn mark_defunct(&self, reason: DriverError) {
        let mut state = self.state.write().await;
        if *state == ConnectionState::Defunct {
            return;
        }
        *state = ConnectionState::Defunct;
        drop(state);

        tracing::warn!(peer = %self.peer, %reason, "connection marked defunct");
        let ids: Vec<i16> = self.pending.iter().map(|e| *e.key()).collect();
        for id in ids {
            if let Some((_, tx)) = self.pending.remove(&id) {
                let _ = tx.send(Err(reason.clone()));
            }
        }
    }

    pub async fn close(&self) {
        self.mark_defunct(DriverError::ConnectionError("closed".into())).await;
    }
}

fn spawn_writer<W: tokio::io::AsyncWrite + Unpin + Send + 'static>(
    mut write_half: W,
    mut rx: mpsc::UnboundedReceiver<BytesMut>,
) {
    tokio::spawn(async move {
        while let Some(buf) = rx.recv().await {
            if write_half.write_all(&buf).await.is_err() {
                break;
            }
        }
    });
}

fn spawn_reader<R: tokio::io::AsyncRead + Unpin + Send + 'static>(
    mut read_half: R,
    pending: Arc<PendingMap>,
    state: Arc<RwLock<ConnectionState>>,
    stream_ids: Arc<StreamIdStack>,
    event_sink: Option<broadcast::Sender<ServerEvent>>,
) {
    tokio::spawn(async move {
        let mut buf = BytesMut::with_capacity(64 * 1024);
        loop {
            match Frame::try_decode(&mut buf) {
                Ok(Some(frame)) => {
                    if frame.header.opcode == OpCode::Event {
                        if let Some(sink) = &event_sink {
                            if let Ok(event) = crate::protocol::messages::decode_event(&frame.body) {
                                let _ = sink.send(event);
                            }
                        }
                        continue;
                    }
                    let stream_id = frame.header.stream_id;
                    if let Some((_, tx)) = pending.remove(&stream_id) {
                        let _ = tx.send(Ok(frame));
                    } else {
                        // Response to an id we already gave up on client-side
                        // (spec §4.3): the id itself stays withheld from the
                        // pool until this late arrival reclaims it here.
                        stream_ids.push(stream_id as u16);
                    }
                    continue;
                }
                Ok(None) => {}
                Err(e) => {
                    let mut s = state.write().await;
                    *s = ConnectionState::Defunct;
                    drop(s);
                    let ids: Vec<i16> = pending.iter().map(|entry| *entry.key()).collect();
                    for id in ids {
                        if let Some((_, tx)) = pending.remove(&id) {
                            let _ = tx.send(Err(e.clone()));
                        }
                    }
                    return;
                }
            }

            let mut chunk = [0u8; 16 * 1024];
            match read_half.read(&mut chunk).await {
                Ok(0) | Err(_) => {
                    let mut s = state.write().await;
                    *s = ConnectionState::Defunct;
                    drop(s);
                    let ids: Vec<i16> = pending.iter().map(|entry| *entry.key()).collect();
                    for id in ids {
                        if let Some((_, tx)) = pending.remove(&id) {
                            let _ = tx.send(Err(DriverError::ConnectionError(
                                "transport closed".into(),
                            )));
                        }
                    }
                    return;
                }
                Ok(n) => buf.extend_from_slice(&chunk[..n]),
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::primitives::{read_string_map, write_string_map as _};

    /// Drives one side of a `tokio::io::duplex` pair as a fake coordinator:
    /// answers every STARTUP with READY, then echoes an empty RESULT for
    /// anything else, on whatever stream id the request used.
    async fn serve_fake_coordinator(mut server: tokio::io::DuplexStream, version: ProtocolVersion) {
        let mut buf = BytesMut::with_capacity(4096);
        loop {
            match Frame::try_decode(&mut buf) {
                Ok(Some(frame)) => {
                    let opcode = match frame.header.opcode {
                        OpCode::Startup => OpCode::Ready,
                        _ => OpCode::Result,
                    };
                    let mut response = Frame::request(
                        version,
                        frame.header.stream_id,
                        opcode,
                        FrameFlags::default(),
                        vec![],
                    );
                    response.header.is_response = true;
                    let mut out = BytesMut::new();
                    response.encode(&mut out);
                    if server.write_all(&out).await.is_err() {
                        return;
                    }
                    continue;
                }
                Ok(None) => {}
                Err(_) => return,
            }
            let mut chunk = [0u8; 4096];
            match server.read(&mut chunk).await {
                Ok(0) | Err(_) => return,
                Ok(n) => buf.extend_from_slice(&chunk[..n]),
            }
        }
    }

    #[tokio::test]
    async fn open_negotiates_and_reaches_ready() {
        let (client, server) = tokio::io::duplex(8192);
        tokio::spawn(serve_fake_coordinator(server, ProtocolVersion::V4));

        let conn = Connection::open(
            client,
            "127.0.0.1:9042".parse().unwrap(),
            ProtocolVersion::V4,
            SocketOptions::default(),
        )
        .await
        .unwrap();

        assert_eq!(conn.state().await, ConnectionState::Ready);
    }

    #[tokio::test]
    async fn send_round_trips_a_query() {
        let (client, server) = tokio::io::duplex(8192);
        tokio::spawn(serve_fake_coordinator(server, ProtocolVersion::V4));

        let conn = Connection::open(
            client,
            "127.0.0.1:9042".parse().unwrap(),
            ProtocolVersion::V4,
            SocketOptions::default(),
        )
        .await
        .unwrap();

        let resp = conn.send(OpCode::Query, FrameFlags::default(), vec![]).await.unwrap();
        assert_eq!(resp.header.opcode, OpCode::Result);
        assert_eq!(conn.in_flight(), 0); // id was reclaimed after the response
    }

    #[tokio::test]
    async fn closed_transport_defuncts_pending_requests() {
        let (client, server) = tokio::io::duplex(8192);
        // Answer STARTUP, then drop the server end before replying to QUERY.
        tokio::spawn(async move {
            let mut server = server;
            let mut buf = BytesMut::with_capacity(4096);
            let frame = loop {
                let mut chunk = [0u8; 4096];
                let n = server.read(&mut chunk).await.unwrap();
                buf.extend_from_slice(&chunk[..n]);
                if let Some(f) = Frame::try_decode(&mut buf).unwrap() {
                    break f;
                }
            };
            let mut response = Frame::request(
                ProtocolVersion::V4,
                frame.header.stream_id,
                OpCode::Ready,
                FrameFlags::default(),
                vec![],
            );
            response.header.is_response = true;
            let mut out = BytesMut::new();
            response.encode(&mut out);
            server.write_all(&out).await.unwrap();
            drop(server);
        });

        let conn = Connection::open(
            client,
            "127.0.0.1:9042".parse().unwrap(),
            ProtocolVersion::V4,
            SocketOptions::default(),
        )
        .await
        .unwrap();

        let result = conn.send(OpCode::Query, FrameFlags::default(), vec![]).await;
        assert!(result.is_err());
        assert_eq!(conn.state().await, ConnectionState::Defunct);
    }

    #[test]
    fn string_map_helper_is_reachable_from_negotiation_path() {
        let mut buf = BytesMut::new();
        let mut m = HashMap::new();
        m.insert("CQL_VERSION".to_string(), "3.0.0".to_string());
        write_string_map(&mut buf, &m);
        assert_eq!(read_string_map(&mut buf).unwrap(), m);
    }
}
