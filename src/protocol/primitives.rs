//! Wire primitives shared by every request/response body (spec §4.1):
//! `[byte]`, `[short]`, `[int]`, `[long]`, `[string]`, `[long string]`,
//! `[bytes]`, `[value]`, `[string map]`, `[string multimap]`,
//! `[string list]`, `[uuid]`, `[inet]`, and `[option]`.

use crate::error::{DriverError, Result};
use bytes::{Buf, BufMut, BytesMut};
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use uuid::Uuid;

/// A bound parameter value. `-1` length on the wire means `Null`, `-2` means
/// `Unset` (spec §4.1).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Null,
    Unset,
    Bytes(Vec<u8>),
}

fn need(buf: &BytesMut, n: usize, what: &str) -> Result<()> {
    if buf.len() < n {
        return Err(DriverError::ProtocolError(format!(
            "truncated frame reading {what}: need {n} bytes, have {}",
            buf.len()
        )));
    }
    Ok(())
}

pub fn write_byte(buf: &mut BytesMut, v: u8) {
    buf.put_u8(v);
}

pub fn read_byte(buf: &mut BytesMut) -> Result<u8> {
    need(buf, 1, "[byte]")?;
    Ok(buf.get_u8())
}

pub fn write_short(buf: &mut BytesMut, v: u16) {
    buf.put_u16(v);
}

pub fn read_short(buf: &mut BytesMut) -> Result<u16> {
    need(buf, 2, "[short]")?;
    Ok(buf.get_u16())
}

pub fn write_int(buf: &mut BytesMut, v: i32) {
    buf.put_i32(v);
}

pub fn read_int(buf: &mut BytesMut) -> Result<i32> {
    need(buf, 4, "[int]")?;
    Ok(buf.get_i32())
}

pub fn write_long(buf: &mut BytesMut, v: i64) {
    buf.put_i64(v);
}

pub fn read_long(buf: &mut BytesMut) -> Result<i64> {
    need(buf, 8, "[long]")?;
    Ok(buf.get_i64())
}

pub fn write_string(buf: &mut BytesMut, s: &str) {
    write_short(buf, s.len() as u16);
    buf.put_slice(s.as_bytes());
}

pub fn read_string(buf: &mut BytesMut) -> Result<String> {
    let len = read_short(buf)? as usize;
    need(buf, len, "[string]")?;
    let bytes = buf.split_to(len);
    String::from_utf8(bytes.to_vec())
        .map_err(|e| DriverError::ProtocolError(format!("invalid utf8 in [string]: {e}")))
}

pub fn write_long_string(buf: &mut BytesMut, s: &str) {
    write_int(buf, s.len() as i32);
    buf.put_slice(s.as_bytes());
}

pub fn read_long_string(buf: &mut BytesMut) -> Result<String> {
    let len = read_int(buf)?;
    if len < 0 {
        return Err(DriverError::ProtocolError("negative [long string] length".into()));
    }
    need(buf, len as usize, "[long string]")?;
    let bytes = buf.split_to(len as usize);
    String::from_utf8(bytes.to_vec())
        .map_err(|e| DriverError::ProtocolError(format!("invalid utf8 in [long string]: {e}")))
}

/// `[bytes]`: an `[int]` length followed by that many bytes, with `-1`
/// meaning null.
pub fn write_bytes_opt(buf: &mut BytesMut, v: Option<&[u8]>) {
    match v {
        None => write_int(buf, -1),
        Some(b) => {
            write_int(buf, b.len() as i32);
            buf.put_slice(b);
        }
    }
}

pub fn read_bytes_opt(buf: &mut BytesMut) -> Result<Option<Vec<u8>>> {
    let len = read_int(buf)?;
    if len < 0 {
        return Ok(None);
    }
    need(buf, len as usize, "[bytes]")?;
    Ok(Some(buf.split_to(len as usize).to_vec()))
}

/// `[value]`: like `[bytes]` but `-2` additionally means "unset" (spec
/// §4.1), used for bound parameters that should not override a prior value
/// in e.g. LWT conditions.
pub fn write_value(buf: &mut BytesMut, v: &Value) {
    match v {
        Value::Null => write_int(buf, -1),
        Value::Unset => write_int(buf, -2),
        Value::Bytes(b) => {
            write_int(buf, b.len() as i32);
            buf.put_slice(b);
        }
    }
}

pub fn read_value(buf: &mut BytesMut) -> Result<Value> {
    let len = read_int(buf)?;
    match len {
        -1 => Ok(Value::Null),
        -2 => Ok(Value::Unset),
        n if n >= 0 => {
            need(buf, n as usize, "[value]")?;
            Ok(Value::Bytes(buf.split_to(n as usize).to_vec()))
        }
        n => Err(DriverError::ProtocolError(format!("invalid [value] length {n}"))),
    }
}

pub fn write_string_list(buf: &mut BytesMut, items: &[String]) {
    write_short(buf, items.len() as u16);
    for item in items {
        write_string(buf, item);
    }
}

pub fn read_string_list(buf: &mut BytesMut) -> Result<Vec<String>> {
    let n = read_short(buf)? as usize;
    let mut out = Vec::with_capacity(n);
    for _ in 0..n {
        out.push(read_string(buf)?);
    }
    Ok(out)
}

pub fn write_string_map(buf: &mut BytesMut, map: &HashMap<String, String>) {
    write_short(buf, map.len() as u16);
    for (k, v) in map {
        write_string(buf, k);
        write_string(buf, v);
    }
}

pub fn read_string_map(buf: &mut BytesMut) -> Result<HashMap<String, String>> {
    let n = read_short(buf)? as usize;
    let mut out = HashMap::with_capacity(n);
    for _ in 0..n {
        let k = read_string(buf)?;
        let v = read_string(buf)?;
        out.insert(k, v);
    }
    Ok(out)
}

pub fn write_string_multimap(buf: &mut BytesMut, map: &HashMap<String, Vec<String>>) {
    write_short(buf, map.len() as u16);
    for (k, v) in map {
        write_string(buf, k);
        write_string_list(buf, v);
    }
}

pub fn read_string_multimap(buf: &mut BytesMut) -> Result<HashMap<String, Vec<String>>> {
    let n = read_short(buf)? as usize;
    let mut out = HashMap::with_capacity(n);
    for _ in 0..n {
        let k = read_string(buf)?;
        let v = read_string_list(buf)?;
        out.insert(k, v);
    }
    Ok(out)
}

pub fn write_consistency(buf: &mut BytesMut, c: crate::protocol::Consistency) {
    write_short(buf, c as u16);
}

pub fn read_consistency(buf: &mut BytesMut) -> Result<crate::protocol::Consistency> {
    let v = read_short(buf)?;
    crate::protocol::Consistency::from_u16(v)
        .ok_or_else(|| DriverError::ProtocolError(format!("unknown consistency level {v}")))
}

pub fn write_uuid(buf: &mut BytesMut, u: &Uuid) {
    buf.put_slice(u.as_bytes());
}

pub fn read_uuid(buf: &mut BytesMut) -> Result<Uuid> {
    need(buf, 16, "[uuid]")?;
    let bytes = buf.split_to(16);
    let mut arr = [0u8; 16];
    arr.copy_from_slice(&bytes);
    Ok(Uuid::from_bytes(arr))
}

/// `[inet]`: a `[byte]` address length (4 or 16) followed by the address
/// bytes and an `[int]` port.
pub fn write_inet(buf: &mut BytesMut, addr: SocketAddr) {
    match addr.ip() {
        IpAddr::V4(v4) => {
            write_byte(buf, 4);
            buf.put_slice(&v4.octets());
        }
        IpAddr::V6(v6) => {
            write_byte(buf, 16);
            buf.put_slice(&v6.octets());
        }
    }
    write_int(buf, addr.port() as i32);
}

pub fn read_inet(buf: &mut BytesMut) -> Result<SocketAddr> {
    let len = read_byte(buf)?;
    let ip = match len {
        4 => {
            need(buf, 4, "[inet] v4 address")?;
            let b = buf.split_to(4);
            IpAddr::V4(Ipv4Addr::new(b[0], b[1], b[2], b[3]))
        }
        16 => {
            need(buf, 16, "[inet] v6 address")?;
            let b = buf.split_to(16);
            let mut arr = [0u8; 16];
            arr.copy_from_slice(&b);
            IpAddr::V6(Ipv6Addr::from(arr))
        }
        n => return Err(DriverError::ProtocolError(format!("invalid [inet] address length {n}"))),
    };
    let port = read_int(buf)? as u16;
    Ok(SocketAddr::new(ip, port))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_round_trips() {
        let mut buf = BytesMut::new();
        write_string(&mut buf, "SELECT * FROM t");
        let s = read_string(&mut buf).unwrap();
        assert_eq!(s, "SELECT * FROM t");
        assert!(buf.is_empty());
    }

    #[test]
    fn value_distinguishes_null_unset_and_bytes() {
        let mut buf = BytesMut::new();
        write_value(&mut buf, &Value::Null);
        write_value(&mut buf, &Value::Unset);
        write_value(&mut buf, &Value::Bytes(vec![1, 2, 3]));

        assert_eq!(read_value(&mut buf).unwrap(), Value::Null);
        assert_eq!(read_value(&mut buf).unwrap(), Value::Unset);
        assert_eq!(read_value(&mut buf).unwrap(), Value::Bytes(vec![1, 2, 3]));
    }

    #[test]
    fn inet_round_trips_v4_and_v6() {
        let mut buf = BytesMut::new();
        let v4: SocketAddr = "10.0.0.1:9042".parse().unwrap();
        let v6: SocketAddr = "[::1]:9042".parse().unwrap();
        write_inet(&mut buf, v4);
        write_inet(&mut buf, v6);
        assert_eq!(read_inet(&mut buf).unwrap(), v4);
        assert_eq!(read_inet(&mut buf).unwrap(), v6);
    }

    #[test]
    fn truncated_buffer_is_a_protocol_error_not_a_panic() {
        let mut buf = BytesMut::new();
        write_short(&mut buf, 10); // claims 10 bytes follow but supplies none
        assert!(read_string(&mut buf).is_err());
    }

    #[test]
    fn string_map_round_trips() {
        let mut buf = BytesMut::new();
        let mut map = HashMap::new();
        map.insert("CQL_VERSION".to_string(), "3.0.0".to_string());
        write_string_map(&mut buf, &map);
        assert_eq!(read_string_map(&mut buf).unwrap(), map);
    }
}
