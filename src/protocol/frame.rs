//! Frame header encode/decode (spec §4.1).
//!
//! ```text
//! +---------+---------+-------------------+--------+-------------+---------+
//! | version | flags   | stream id (1|2 B) | opcode | body length | body    |
//! | 1 byte  | 1 byte  |                   | 1 byte | 4 bytes     | N bytes |
//! +---------+---------+-------------------+--------+-------------+---------+
//! ```
//!
//! Response frames set the high bit of `version`; this module strips/sets it
//! on encode/decode so callers always see the plain version number.

use crate::error::{DriverError, Result};
use crate::protocol::{OpCode, ProtocolVersion};
use bytes::{Buf, BufMut, BytesMut};

const RESPONSE_BIT: u8 = 0x80;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameFlags {
    pub compression: bool,
    pub tracing: bool,
    pub custom_payload: bool,
    pub warning: bool,
}

impl FrameFlags {
    fn encode(self) -> u8 {
        let mut b = 0u8;
        if self.compression {
            b |= 0x01;
        }
        if self.tracing {
            b |= 0x02;
        }
        if self.custom_payload {
            b |= 0x04;
        }
        if self.warning {
            b |= 0x08;
        }
        b
    }

    fn decode(b: u8) -> FrameFlags {
        FrameFlags {
            compression: b & 0x01 != 0,
            tracing: b & 0x02 != 0,
            custom_payload: b & 0x04 != 0,
            warning: b & 0x08 != 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameHeader {
    pub version: ProtocolVersion,
    pub is_response: bool,
    pub flags: FrameFlags,
    pub stream_id: i16,
    pub opcode: OpCode,
    pub body_len: u32,
}

impl FrameHeader {
    /// Size of the fixed header portion in bytes (stream id width is
    /// version-dependent).
    fn fixed_len(version: ProtocolVersion) -> usize {
        // version(1) + flags(1) + stream_id(1|2) + opcode(1) + length(4)
        3 + version.stream_id_width() + 4
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub header: FrameHeader,
    pub body: Vec<u8>,
}

impl Frame {
    pub fn request(
        version: ProtocolVersion,
        stream_id: i16,
        opcode: OpCode,
        flags: FrameFlags,
        body: Vec<u8>,
    ) -> Frame {
        Frame {
            header: FrameHeader {
                version,
                is_response: false,
                flags,
                stream_id,
                opcode,
                body_len: body.len() as u32,
            },
            body,
        }
    }

    /// Encode the full frame (header + body) into `out`.
    pub fn encode(&self, out: &mut BytesMut) {
        let version_byte = self.header.version.0 | if self.header.is_response { RESPONSE_BIT } else { 0 };
        out.put_u8(version_byte);
        out.put_u8(self.header.flags.encode());

        if self.header.version.stream_id_width() == 1 {
            out.put_i8(self.header.stream_id as i8);
        } else {
            out.put_i16(self.header.stream_id);
        }

        out.put_u8(self.header.opcode as u8);
        out.put_u32(self.body.len() as u32);
        out.put_slice(&self.body);
    }

    /// Decode a header from the front of `buf` without consuming `buf`,
    /// returning `None` if fewer than the minimum header bytes are
    /// available yet (the caller should read more and retry — this makes
    /// the codec usable as a streaming frame decoder over a `TcpStream`).
    pub fn peek_header(buf: &[u8]) -> Result<Option<FrameHeader>> {
        // We don't know the stream-id width until we decode the version
        // byte, but the version is always byte 0.
        if buf.is_empty() {
            return Ok(None);
        }
        let raw_version = buf[0];
        let is_response = raw_version & RESPONSE_BIT != 0;
        let version = ProtocolVersion(raw_version & !RESPONSE_BIT);
        let fixed_len = FrameHeader::fixed_len(version);
        if buf.len() < fixed_len {
            return Ok(None);
        }

        let mut cursor = &buf[1..];
        let flags = FrameFlags::decode(cursor.get_u8());

        let stream_id = if version.stream_id_width() == 1 {
            cursor.get_i8() as i16
        } else {
            cursor.get_i16()
        };

        let opcode_byte = cursor.get_u8();
        let opcode = OpCode::from_u8(opcode_byte)
            .ok_or_else(|| DriverError::ProtocolError(format!("unknown opcode {opcode_byte:#x}")))?;

        let body_len = cursor.get_u32();

        Ok(Some(FrameHeader {
            version,
            is_response,
            flags,
            stream_id,
            opcode,
            body_len,
        }))
    }

    /// Decode a complete frame from the front of `buf`, consuming exactly
    /// `header + body_len` bytes on success. Returns `None` if the body is
    /// not fully buffered yet.
    pub fn try_decode(buf: &mut BytesMut) -> Result<Option<Frame>> {
        let header = match Self::peek_header(buf)? {
            Some(h) => h,
            None => return Ok(None),
        };
        let fixed_len = FrameHeader::fixed_len(header.version);
        let total = fixed_len + header.body_len as usize;
        if buf.len() < total {
            return Ok(None);
        }

        buf.advance(fixed_len);
        let body = buf.split_to(header.body_len as usize).to_vec();
        Ok(Some(Frame { header, body }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_decode_round_trips_v4_two_byte_stream_id() {
        let frame = Frame::request(
            ProtocolVersion::V4,
            257,
            OpCode::Query,
            FrameFlags::default(),
            b"SELECT 1".to_vec(),
        );
        let mut buf = BytesMut::new();
        frame.encode(&mut buf);

        let decoded = Frame::try_decode(&mut buf).unwrap().unwrap();
        assert_eq!(decoded.header.stream_id, 257);
        assert_eq!(decoded.header.opcode, OpCode::Query);
        assert_eq!(decoded.body, b"SELECT 1");
        assert!(buf.is_empty());
    }

    #[test]
    fn encode_decode_round_trips_v2_one_byte_stream_id() {
        let frame = Frame::request(
            ProtocolVersion::V2,
            42,
            OpCode::Options,
            FrameFlags::default(),
            vec![],
        );
        let mut buf = BytesMut::new();
        frame.encode(&mut buf);
        let decoded = Frame::try_decode(&mut buf).unwrap().unwrap();
        assert_eq!(decoded.header.stream_id, 42);
    }

    #[test]
    fn partial_body_yields_none_not_error() {
        let frame = Frame::request(
            ProtocolVersion::V4,
            1,
            OpCode::Query,
            FrameFlags::default(),
            b"0123456789".to_vec(),
        );
        let mut buf = BytesMut::new();
        frame.encode(&mut buf);
        buf.truncate(buf.len() - 3); // chop off the tail of the body

        assert!(Frame::try_decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn malformed_opcode_is_a_protocol_error() {
        let mut buf = BytesMut::new();
        buf.put_u8(ProtocolVersion::V4.0);
        buf.put_u8(0);
        buf.put_i16(1);
        buf.put_u8(0xFE); // not a valid opcode
        buf.put_u32(0);

        assert!(Frame::try_decode(&mut buf).is_err());
    }

    #[test]
    fn response_bit_round_trips() {
        let mut frame = Frame::request(
            ProtocolVersion::V4,
            5,
            OpCode::Result,
            FrameFlags::default(),
            vec![],
        );
        frame.header.is_response = true;
        let mut buf = BytesMut::new();
        frame.encode(&mut buf);
        let decoded = Frame::try_decode(&mut buf).unwrap().unwrap();
        assert!(decoded.header.is_response);
        assert_eq!(decoded.header.version, ProtocolVersion::V4);
    }
}
