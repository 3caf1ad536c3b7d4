// End-to-end coverage for the client façade against a minimal fake
// coordinator: accepts a TCP connection, answers STARTUP with READY and
// every QUERY/EXECUTE/PREPARE with a canned RESULT, exercising the full
// connect -> pool -> request handler -> decode path without a real cluster.

use bytes::BytesMut;
use ringql::client::Client;
use ringql::config::ClusterConfig;
use ringql::protocol::messages::QueryResult;
use ringql::protocol::primitives::{write_bytes_opt, write_int, write_string};
use ringql::protocol::{Frame, FrameFlags, OpCode, ProtocolVersion};
use ringql::request::Statement;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

const RESULT_KIND_VOID: i32 = 0x0001;
const RESULT_KIND_PREPARED: i32 = 0x0004;
const RESULT_KIND_ROWS: i32 = 0x0002;

async fn serve_one_connection(mut socket: TcpStream) {
    let mut buf = BytesMut::with_capacity(8192);
    loop {
        let frame = loop {
            if let Some(frame) = Frame::try_decode(&mut buf).unwrap() {
                break frame;
            }
            let mut chunk = [0u8; 4096];
            match socket.read(&mut chunk).await {
                Ok(0) | Err(_) => return,
                Ok(n) => buf.extend_from_slice(&chunk[..n]),
            }
        };

        let (opcode, body) = match frame.header.opcode {
            OpCode::Startup => (OpCode::Ready, Vec::new()),
            OpCode::Prepare => {
                let mut b = BytesMut::new();
                write_int(&mut b, RESULT_KIND_PREPARED);
                write_bytes_opt(&mut b, Some(b"prepared-id-1"));
                write_bytes_opt(&mut b, None); // no result_metadata_id
                write_int(&mut b, 0); // metadata flags
                write_int(&mut b, 0); // metadata column count
                write_int(&mut b, 0); // result_metadata flags
                write_int(&mut b, 0); // result_metadata column count
                (OpCode::Result, b.to_vec())
            }
            OpCode::Execute => {
                let mut b = BytesMut::new();
                write_int(&mut b, RESULT_KIND_ROWS);
                write_int(&mut b, 0); // flags: no global spec, no paging
                write_int(&mut b, 0); // column count
                write_int(&mut b, 0); // row count
                (OpCode::Result, b.to_vec())
            }
            OpCode::Query => {
                let mut b = BytesMut::new();
                write_int(&mut b, RESULT_KIND_VOID);
                (OpCode::Result, b.to_vec())
            }
            _ => {
                let mut b = BytesMut::new();
                write_int(&mut b, 0); // ServerError
                write_string(&mut b, "unexpected opcode in fake coordinator");
                (OpCode::Error, b.to_vec())
            }
        };

        let mut response = Frame::request(ProtocolVersion::V4, frame.header.stream_id, opcode, FrameFlags::default(), body);
        response.header.is_response = true;
        let mut out = BytesMut::new();
        response.encode(&mut out);
        if socket.write_all(&out).await.is_err() {
            return;
        }
    }
}

async fn spawn_fake_coordinator() -> std::net::SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        loop {
            let Ok((socket, _)) = listener.accept().await else { return };
            tokio::spawn(serve_one_connection(socket));
        }
    });
    addr
}

#[tokio::test]
async fn connect_and_execute_simple_query_round_trips_to_void() {
    let addr = spawn_fake_coordinator().await;
    let config = ClusterConfig { contact_points: vec![addr], ..Default::default() };

    let client = Client::connect(config).await.unwrap();
    assert_eq!(client.connected_host_count(), 1);

    let response = client.execute(Statement::simple("SELECT * FROM t"), None).await.unwrap();
    assert!(matches!(response.result, QueryResult::Void));
}

#[tokio::test]
async fn execute_prepared_statement_prepares_then_executes() {
    let addr = spawn_fake_coordinator().await;
    let config = ClusterConfig { contact_points: vec![addr], ..Default::default() };

    let client = Client::connect(config).await.unwrap();
    let statement = Statement::prepared("SELECT * FROM t WHERE k = ?", None, vec![]);
    let response = client.execute(statement, None).await.unwrap();
    assert!(matches!(response.result, QueryResult::Rows(_)));
}

#[tokio::test]
async fn shutdown_rejects_subsequent_execute_calls() {
    let addr = spawn_fake_coordinator().await;
    let config = ClusterConfig { contact_points: vec![addr], ..Default::default() };

    let client = Client::connect(config).await.unwrap();
    client.shutdown().await;

    let result = client.execute(Statement::simple("SELECT 1"), None).await;
    assert!(result.is_err());
}
