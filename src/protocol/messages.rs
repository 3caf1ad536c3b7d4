//! Request/response bodies built on the wire primitives (spec §4.1, §6).
//!
//! Every `encode_*` function returns the body only; framing (opcode, stream
//! id, flags) is the connection's job. CQL itself — grammar, result-set
//! value decoding into typed columns — stays out of scope (spec §1); `Rows`
//! here exposes only the column-metadata and raw-bytes shape the pipeline
//! needs to hand back to a caller-supplied row decoder.

use crate::error::{DriverError, Result};
use crate::protocol::primitives::{
    read_byte, read_bytes_opt, read_int, read_long_string, read_short, read_string,
    read_string_list, read_string_multimap, read_uuid, write_byte, write_bytes_opt, write_int,
    write_long_string, write_short, write_string, write_string_list, write_string_map,
    write_value, Value,
};
use crate::protocol::{Consistency, ServerErrorCode};
use bytes::BytesMut;
use std::collections::HashMap;
use uuid::Uuid;

/// `QUERY`/`EXECUTE` flag bits (spec §4.1, the per-request options block).
mod query_flag_bits {
    pub const VALUES: u8 = 0x01;
    pub const SKIP_METADATA: u8 = 0x02;
    pub const PAGE_SIZE: u8 = 0x04;
    pub const PAGING_STATE: u8 = 0x08;
    pub const SERIAL_CONSISTENCY: u8 = 0x10;
    pub const DEFAULT_TIMESTAMP: u8 = 0x20;
    pub const NAMED_VALUES: u8 = 0x40;
    pub const WITH_KEYSPACE: u8 = 0x80;
}

/// The bound-parameters + paging options shared by `QUERY` and `EXECUTE`
/// (spec §4.1, §4.6, §4.7).
#[derive(Debug, Clone, Default)]
pub struct QueryParams {
    pub consistency: Consistency,
    pub values: Vec<Value>,
    pub named_values: Option<HashMap<String, Value>>,
    pub skip_metadata: bool,
    pub page_size: Option<i32>,
    pub paging_state: Option<Vec<u8>>,
    pub serial_consistency: Option<Consistency>,
    pub default_timestamp: Option<i64>,
    pub keyspace: Option<String>,
}

pub fn encode_query_params(buf: &mut BytesMut, p: &QueryParams) {
    crate::protocol::primitives::write_consistency(buf, p.consistency);

    let mut flags = 0u8;
    if !p.values.is_empty() || p.named_values.is_some() {
        flags |= query_flag_bits::VALUES;
    }
    if p.named_values.is_some() {
        flags |= query_flag_bits::NAMED_VALUES;
    }
    if p.skip_metadata {
        flags |= query_flag_bits::SKIP_METADATA;
    }
    if p.page_size.is_some() {
        flags |= query_flag_bits::PAGE_SIZE;
    }
    if p.paging_state.is_some() {
        flags |= query_flag_bits::PAGING_STATE;
    }
    if p.serial_consistency.is_some() {
        flags |= query_flag_bits::SERIAL_CONSISTENCY;
    }
    if p.default_timestamp.is_some() {
        flags |= query_flag_bits::DEFAULT_TIMESTAMP;
    }
    if p.keyspace.is_some() {
        flags |= query_flag_bits::WITH_KEYSPACE;
    }
    write_byte(buf, flags);

    if let Some(named) = &p.named_values {
        write_short(buf, named.len() as u16);
        for (name, v) in named {
            write_string(buf, name);
            write_value(buf, v);
        }
    } else if !p.values.is_empty() {
        write_short(buf, p.values.len() as u16);
        for v in &p.values {
            write_value(buf, v);
        }
    }

    if let Some(size) = p.page_size {
        write_int(buf, size);
    }
    if let Some(state) = &p.paging_state {
        write_bytes_opt(buf, Some(state));
    }
    if let Some(sc) = p.serial_consistency {
        crate::protocol::primitives::write_consistency(buf, sc);
    }
    if let Some(ts) = p.default_timestamp {
        crate::protocol::primitives::write_long(buf, ts);
    }
    if let Some(ks) = &p.keyspace {
        write_string(buf, ks);
    }
}

pub fn encode_startup(options: &HashMap<String, String>) -> Vec<u8> {
    let mut buf = BytesMut::new();
    write_string_map(&mut buf, options);
    buf.to_vec()
}

pub fn encode_options() -> Vec<u8> {
    Vec::new()
}

#[derive(Debug, Clone)]
pub struct Supported {
    pub options: HashMap<String, Vec<String>>,
}

pub fn decode_supported(body: &[u8]) -> Result<Supported> {
    let mut buf = BytesMut::from(body);
    Ok(Supported {
        options: read_string_multimap(&mut buf)?,
    })
}

pub fn encode_query(cql: &str, params: &QueryParams) -> Vec<u8> {
    let mut buf = BytesMut::new();
    write_long_string(&mut buf, cql);
    encode_query_params(&mut buf, params);
    buf.to_vec()
}

pub fn encode_prepare(cql: &str, keyspace: Option<&str>) -> Vec<u8> {
    let mut buf = BytesMut::new();
    write_long_string(&mut buf, cql);
    let mut flags = 0u8;
    if keyspace.is_some() {
        flags |= query_flag_bits::WITH_KEYSPACE;
    }
    write_byte(&mut buf, flags);
    if let Some(ks) = keyspace {
        write_string(&mut buf, ks);
    }
    buf.to_vec()
}

pub fn encode_execute(prepared_id: &[u8], params: &QueryParams) -> Vec<u8> {
    let mut buf = BytesMut::new();
    write_bytes_opt(&mut buf, Some(prepared_id));
    encode_query_params(&mut buf, params);
    buf.to_vec()
}

/// `BATCH` statement kinds (spec §4.8): a plain query string with values, or
/// a reference to a previously prepared statement id.
#[derive(Debug, Clone)]
pub enum BatchEntry {
    Query { cql: String, values: Vec<Value> },
    Prepared { id: Vec<u8>, values: Vec<Value> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum BatchType {
    Logged = 0,
    Unlogged = 1,
    Counter = 2,
}

pub fn encode_batch(
    batch_type: BatchType,
    entries: &[BatchEntry],
    consistency: Consistency,
    serial_consistency: Option<Consistency>,
    default_timestamp: Option<i64>,
) -> Vec<u8> {
    let mut buf = BytesMut::new();
    write_byte(&mut buf, batch_type as u8);
    write_short(&mut buf, entries.len() as u16);
    for entry in entries {
        match entry {
            BatchEntry::Query { cql, values } => {
                write_byte(&mut buf, 0);
                write_long_string(&mut buf, cql);
                write_short(&mut buf, values.len() as u16);
                for v in values {
                    write_value(&mut buf, v);
                }
            }
            BatchEntry::Prepared { id, values } => {
                write_byte(&mut buf, 1);
                write_bytes_opt(&mut buf, Some(id));
                write_short(&mut buf, values.len() as u16);
                for v in values {
                    write_value(&mut buf, v);
                }
            }
        }
    }
    crate::protocol::primitives::write_consistency(&mut buf, consistency);

    let mut flags = 0u8;
    if serial_consistency.is_some() {
        flags |= query_flag_bits::SERIAL_CONSISTENCY;
    }
    if default_timestamp.is_some() {
        flags |= query_flag_bits::DEFAULT_TIMESTAMP;
    }
    write_byte(&mut buf, flags);
    if let Some(sc) = serial_consistency {
        crate::protocol::primitives::write_consistency(&mut buf, sc);
    }
    if let Some(ts) = default_timestamp {
        crate::protocol::primitives::write_long(&mut buf, ts);
    }
    buf.to_vec()
}

/// `REGISTER`: subscribe the connection to server push events (spec §4.10).
pub fn encode_register(event_types: &[String]) -> Vec<u8> {
    let mut buf = BytesMut::new();
    write_string_list(&mut buf, event_types);
    buf.to_vec()
}

#[derive(Debug, Clone)]
pub enum ServerEvent {
    TopologyChange { change: String, addr: std::net::SocketAddr },
    StatusChange { change: String, addr: std::net::SocketAddr },
    SchemaChange { change: String, target: String, keyspace: String, name: Option<String> },
}

pub fn decode_event(body: &[u8]) -> Result<ServerEvent> {
    let mut buf = BytesMut::from(body);
    let kind = read_string(&mut buf)?;
    match kind.as_str() {
        "TOPOLOGY_CHANGE" => {
            let change = read_string(&mut buf)?;
            let addr = crate::protocol::primitives::read_inet(&mut buf)?;
            Ok(ServerEvent::TopologyChange { change, addr })
        }
        "STATUS_CHANGE" => {
            let change = read_string(&mut buf)?;
            let addr = crate::protocol::primitives::read_inet(&mut buf)?;
            Ok(ServerEvent::StatusChange { change, addr })
        }
        "SCHEMA_CHANGE" => {
            let change = read_string(&mut buf)?;
            let target = read_string(&mut buf)?;
            let keyspace = read_string(&mut buf)?;
            let name = match target.as_str() {
                "KEYSPACE" => None,
                _ => Some(read_string(&mut buf)?),
            };
            Ok(ServerEvent::SchemaChange { change, target, keyspace, name })
        }
        other => Err(DriverError::ProtocolError(format!("unknown event type {other}"))),
    }
}

/// Column metadata as carried in a `RESULT(Rows)` or `RESULT(Prepared)`
/// body (spec §4.6). Column values are left as raw bytes per spec §1's
/// "typed value decoding is out of scope" boundary.
#[derive(Debug, Clone)]
pub struct ColumnSpec {
    pub keyspace: String,
    pub table: String,
    pub name: String,
    pub type_id: i16,
    pub type_name: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct RowsMetadata {
    pub columns: Vec<ColumnSpec>,
    pub paging_state: Option<Vec<u8>>,
    pub pk_indices: Vec<u16>,
}

#[derive(Debug, Clone)]
pub struct Rows {
    pub metadata: RowsMetadata,
    pub rows: Vec<Vec<Option<Vec<u8>>>>,
}

#[derive(Debug, Clone)]
pub struct Prepared {
    pub id: Vec<u8>,
    pub result_metadata_id: Option<Vec<u8>>,
    pub metadata: RowsMetadata,
    pub result_metadata: RowsMetadata,
}

#[derive(Debug, Clone)]
pub struct SchemaChangeResult {
    pub change: String,
    pub target: String,
    pub keyspace: String,
    pub name: Option<String>,
}

#[derive(Debug, Clone)]
pub enum QueryResult {
    Void,
    Rows(Rows),
    SetKeyspace(String),
    Prepared(Prepared),
    SchemaChange(SchemaChangeResult),
}

/// Extra RESULT payload attached by `FrameFlags` (spec §4.1): the query's
/// trace id, server warnings, and an opaque custom-payload echo.
#[derive(Debug, Clone, Default)]
pub struct ResultExtras {
    pub tracing_id: Option<Uuid>,
    pub warnings: Vec<String>,
    pub custom_payload: Option<HashMap<String, Vec<u8>>>,
}

const RESULT_KIND_VOID: i32 = 0x0001;
const RESULT_KIND_ROWS: i32 = 0x0002;
const RESULT_KIND_SET_KEYSPACE: i32 = 0x0003;
const RESULT_KIND_PREPARED: i32 = 0x0004;
const RESULT_KIND_SCHEMA_CHANGE: i32 = 0x0005;

const ROWS_FLAG_GLOBAL_TABLES_SPEC: i32 = 0x0001;
const ROWS_FLAG_HAS_MORE_PAGES: i32 = 0x0002;
const ROWS_FLAG_NO_METADATA: i32 = 0x0004;

fn decode_rows_metadata(buf: &mut BytesMut) -> Result<RowsMetadata> {
    let flags = read_int(buf)?;
    let column_count = read_int(buf)?;

    let mut metadata = RowsMetadata::default();

    if flags & ROWS_FLAG_HAS_MORE_PAGES != 0 {
        metadata.paging_state = read_bytes_opt(buf)?;
    }

    if flags & ROWS_FLAG_NO_METADATA != 0 {
        return Ok(metadata);
    }

    let global_spec = if flags & ROWS_FLAG_GLOBAL_TABLES_SPEC != 0 {
        Some((read_string(buf)?, read_string(buf)?))
    } else {
        None
    };

    for _ in 0..column_count {
        let (keyspace, table) = if let Some((ks, tbl)) = &global_spec {
            (ks.clone(), tbl.clone())
        } else {
            (read_string(buf)?, read_string(buf)?)
        };
        let name = read_string(buf)?;
        let type_id = read_short(buf)? as i16;
        // Collection/UDT inner types are variable-shaped; the core treats
        // the whole type descriptor as opaque bytes left for a higher-level
        // decoder, consuming only the leading type id here.
        metadata.columns.push(ColumnSpec {
            keyspace,
            table,
            name,
            type_id,
            type_name: None,
        });
    }

    Ok(metadata)
}

pub fn decode_result(body: &[u8]) -> Result<(QueryResult, ResultExtras)> {
    let mut buf = BytesMut::from(body);
    let kind = read_int(&mut buf)?;
    let result = match kind {
        RESULT_KIND_VOID => QueryResult::Void,
        RESULT_KIND_SET_KEYSPACE => QueryResult::SetKeyspace(read_string(&mut buf)?),
        RESULT_KIND_ROWS => {
            let metadata = decode_rows_metadata(&mut buf)?;
            let row_count = read_int(&mut buf)?;
            let mut rows = Vec::with_capacity(row_count.max(0) as usize);
            for _ in 0..row_count {
                let mut row = Vec::with_capacity(metadata.columns.len());
                for _ in 0..metadata.columns.len() {
                    row.push(read_bytes_opt(&mut buf)?);
                }
                rows.push(row);
            }
            QueryResult::Rows(Rows { metadata, rows })
        }
        RESULT_KIND_PREPARED => {
            let id = read_bytes_opt(&mut buf)?.unwrap_or_default();
            let result_metadata_id = read_bytes_opt(&mut buf)?;
            let metadata = decode_rows_metadata(&mut buf)?;
            let result_metadata = decode_rows_metadata(&mut buf)?;
            QueryResult::Prepared(Prepared { id, result_metadata_id, metadata, result_metadata })
        }
        RESULT_KIND_SCHEMA_CHANGE => {
            let change = read_string(&mut buf)?;
            let target = read_string(&mut buf)?;
            let keyspace = read_string(&mut buf)?;
            let name = match target.as_str() {
                "KEYSPACE" => None,
                _ => Some(read_string(&mut buf)?),
            };
            QueryResult::SchemaChange(SchemaChangeResult { change, target, keyspace, name })
        }
        other => return Err(DriverError::ProtocolError(format!("unknown RESULT kind {other}"))),
    };
    Ok((result, ResultExtras::default()))
}

/// Parse the extra per-frame payload sections (spec §4.1) into
/// [`ResultExtras`], given the flags from the frame header. Must be called
/// on the tail of the body after the opcode-specific payload has been
/// consumed, since tracing id / warnings / custom payload are appended
/// after the RESULT (or any response) body in encounter order:
/// tracing, custom payload, warnings.
pub fn decode_result_extras(
    buf: &mut BytesMut,
    flags: crate::protocol::FrameFlags,
) -> Result<ResultExtras> {
    let mut extras = ResultExtras::default();
    if flags.tracing {
        extras.tracing_id = Some(read_uuid(buf)?);
    }
    if flags.custom_payload {
        let n = read_short(buf)? as usize;
        let mut map = HashMap::with_capacity(n);
        for _ in 0..n {
            let k = read_string(buf)?;
            let v = read_bytes_opt(buf)?.unwrap_or_default();
            map.insert(k, v);
        }
        extras.custom_payload = Some(map);
    }
    if flags.warning {
        extras.warnings = read_string_list(buf)?;
    }
    Ok(extras)
}

/// `ERROR` response body (spec §6): a code, a message, and code-specific
/// extra fields.
pub fn decode_error(body: &[u8]) -> Result<DriverError> {
    let mut buf = BytesMut::from(body);
    let code = read_int(&mut buf)?;
    let message = read_string(&mut buf)?;
    let code = ServerErrorCode::from_i32(code)
        .ok_or_else(|| DriverError::ProtocolError(format!("unknown server error code {code:#x}")))?;

    Ok(match code {
        ServerErrorCode::ServerError => DriverError::Internal(message),
        ServerErrorCode::ProtocolError => DriverError::ProtocolError(message),
        ServerErrorCode::BadCredentials => DriverError::BadCredentials(message),
        ServerErrorCode::Unavailable => {
            let consistency = crate::protocol::primitives::read_consistency(&mut buf)?;
            let required = read_int(&mut buf)?;
            let alive = read_int(&mut buf)?;
            DriverError::Unavailable { consistency, required, alive }
        }
        ServerErrorCode::Overloaded => DriverError::Overloaded(message),
        ServerErrorCode::IsBootstrapping => DriverError::IsBootstrapping,
        ServerErrorCode::TruncateError => DriverError::TruncateError(message),
        ServerErrorCode::WriteTimeout => {
            let consistency = crate::protocol::primitives::read_consistency(&mut buf)?;
            let received = read_int(&mut buf)?;
            let required = read_int(&mut buf)?;
            let write_type = match read_string(&mut buf)?.as_str() {
                "SIMPLE" => crate::error::WriteType::Simple,
                "BATCH" => crate::error::WriteType::Batch,
                "UNLOGGED_BATCH" => crate::error::WriteType::UnloggedBatch,
                "COUNTER" => crate::error::WriteType::Counter,
                "BATCH_LOG" => crate::error::WriteType::BatchLog,
                "CAS" => crate::error::WriteType::Cas,
                "VIEW" => crate::error::WriteType::View,
                "CDC" => crate::error::WriteType::Cdc,
                other => return Err(DriverError::ProtocolError(format!("unknown write type {other}"))),
            };
            DriverError::WriteTimeout { consistency, received, required, write_type }
        }
        ServerErrorCode::ReadTimeout => {
            let consistency = crate::protocol::primitives::read_consistency(&mut buf)?;
            let received = read_int(&mut buf)?;
            let required = read_int(&mut buf)?;
            let data_present = read_byte(&mut buf)? != 0;
            DriverError::ReadTimeout { consistency, received, required, data_present }
        }
        ServerErrorCode::ReadFailure | ServerErrorCode::WriteFailure => {
            let _consistency = crate::protocol::primitives::read_consistency(&mut buf)?;
            let _received = read_int(&mut buf)?;
            let _required = read_int(&mut buf)?;
            let num_failures = read_int(&mut buf)?;
            DriverError::RequestFailure { num_failures }
        }
        ServerErrorCode::FunctionFailure => DriverError::FunctionFailure(message),
        ServerErrorCode::SyntaxError => DriverError::Syntax(message),
        ServerErrorCode::Unauthorized => DriverError::Unauthorized(message),
        ServerErrorCode::Invalid => DriverError::Invalid(message),
        ServerErrorCode::ConfigError => DriverError::ConfigError(message),
        ServerErrorCode::AlreadyExists => {
            let keyspace = read_string(&mut buf)?;
            let table = read_string(&mut buf)?;
            let table = if table.is_empty() { None } else { Some(table) };
            DriverError::AlreadyExists { keyspace, table }
        }
        ServerErrorCode::Unprepared => {
            let id = read_bytes_opt(&mut buf)?.unwrap_or_default();
            DriverError::Unprepared(id)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_round_trips_into_cql_and_values() {
        let params = QueryParams {
            consistency: Consistency::Quorum,
            values: vec![Value::Bytes(vec![1, 2]), Value::Null],
            page_size: Some(100),
            ..Default::default()
        };
        let body = encode_query("SELECT * FROM t WHERE k=?", &params);
        let mut buf = BytesMut::from(&body[..]);
        assert_eq!(read_long_string(&mut buf).unwrap(), "SELECT * FROM t WHERE k=?");
        assert_eq!(
            crate::protocol::primitives::read_consistency(&mut buf).unwrap(),
            Consistency::Quorum
        );
        let flags = read_byte(&mut buf).unwrap();
        assert_ne!(flags & query_flag_bits::VALUES, 0);
        assert_ne!(flags & query_flag_bits::PAGE_SIZE, 0);
    }

    #[test]
    fn decode_result_void() {
        let mut buf = BytesMut::new();
        write_int(&mut buf, RESULT_KIND_VOID);
        let (result, _) = decode_result(&buf).unwrap();
        assert!(matches!(result, QueryResult::Void));
    }

    #[test]
    fn decode_result_set_keyspace() {
        let mut buf = BytesMut::new();
        write_int(&mut buf, RESULT_KIND_SET_KEYSPACE);
        write_string(&mut buf, "my_ks");
        let (result, _) = decode_result(&buf).unwrap();
        match result {
            QueryResult::SetKeyspace(ks) => assert_eq!(ks, "my_ks"),
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn decode_rows_with_global_table_spec() {
        let mut buf = BytesMut::new();
        write_int(&mut buf, RESULT_KIND_ROWS);
        write_int(&mut buf, ROWS_FLAG_GLOBAL_TABLES_SPEC); // flags
        write_int(&mut buf, 1); // column count
        write_string(&mut buf, "ks");
        write_string(&mut buf, "tbl");
        write_string(&mut buf, "col_a");
        write_short(&mut buf, 0x000D); // varchar
        write_int(&mut buf, 1); // row count
        write_bytes_opt(&mut buf, Some(b"hello"));

        let (result, _) = decode_result(&buf).unwrap();
        match result {
            QueryResult::Rows(rows) => {
                assert_eq!(rows.metadata.columns.len(), 1);
                assert_eq!(rows.metadata.columns[0].name, "col_a");
                assert_eq!(rows.rows.len(), 1);
                assert_eq!(rows.rows[0][0], Some(b"hello".to_vec()));
            }
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn decode_error_unavailable() {
        let mut buf = BytesMut::new();
        write_int(&mut buf, ServerErrorCode::Unavailable as i32);
        write_string(&mut buf, "not enough replicas");
        crate::protocol::primitives::write_consistency(&mut buf, Consistency::Quorum);
        write_int(&mut buf, 3);
        write_int(&mut buf, 1);

        let err = decode_error(&buf).unwrap();
        match err {
            DriverError::Unavailable { required, alive, .. } => {
                assert_eq!(required, 3);
                assert_eq!(alive, 1);
            }
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn decode_event_schema_change_table() {
        let mut buf = BytesMut::new();
        write_string(&mut buf, "SCHEMA_CHANGE");
        write_string(&mut buf, "UPDATED");
        write_string(&mut buf, "TABLE");
        write_string(&mut buf, "my_ks");
        write_string(&mut buf, "my_table");

        match decode_event(&buf).unwrap() {
            ServerEvent::SchemaChange { keyspace, name, .. } => {
                assert_eq!(keyspace, "my_ks");
                assert_eq!(name, Some("my_table".to_string()));
            }
            _ => panic!("wrong variant"),
        }
    }
}
