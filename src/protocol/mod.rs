//! Wire protocol for the native binary framed protocol (spec §4.1, §6).
//!
//! ```text
//! +---------+---------+------+----------+------------+---------+
//! | version | flags   | stream id       | opcode | body length | body
//! | 1 byte  | 1 byte  | 2 or 4 bytes    | 1 byte | 4 bytes     | N bytes
//! +---------+---------+------+----------+------------+---------+
//! ```
//!
//! Stream ids are 1 byte wide for v1/v2 and 2 bytes wide for v3+; this crate
//! targets v3+ exclusively for stream-id width but negotiates down to v1 for
//! the handshake byte layout itself (spec §4.3).

pub mod compression;
pub mod frame;
pub mod messages;
pub mod primitives;

pub use compression::CompressionKind;
pub use frame::{Frame, FrameFlags, FrameHeader};
pub use primitives::Value;

use serde::{Deserialize, Serialize};

/// A protocol version, carrying the feature flags computed once at STARTUP
/// (spec §9, "Protocol version per connection").
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ProtocolVersion(pub u8);

impl ProtocolVersion {
    pub const V1: ProtocolVersion = ProtocolVersion(1);
    pub const V2: ProtocolVersion = ProtocolVersion(2);
    pub const V3: ProtocolVersion = ProtocolVersion(3);
    pub const V4: ProtocolVersion = ProtocolVersion(4);
    pub const V5: ProtocolVersion = ProtocolVersion(5);

    pub const MIN: ProtocolVersion = ProtocolVersion::V1;
    pub const MAX: ProtocolVersion = ProtocolVersion::V5;

    /// Width, in bytes, of the stream id field for this version (spec §4.2).
    pub fn stream_id_width(self) -> usize {
        if self.0 < 3 {
            1
        } else {
            2
        }
    }

    /// Maximum number of concurrent streams a connection on this version
    /// supports (spec §4.2, §5: 128 for v1/v2, 32768 for v3+).
    pub fn max_streams(self) -> usize {
        if self.0 < 3 {
            128
        } else {
            32_768
        }
    }

    /// Maximum in-flight requests before the pool applies backpressure
    /// (spec §5: v1/v2 128, v3+ 2048).
    pub fn max_requests_per_connection(self) -> usize {
        if self.0 < 3 {
            128
        } else {
            2048
        }
    }

    /// One version below this one, saturating at `V1` (spec §4.3: "never
    /// below v1").
    pub fn downgrade(self) -> Option<ProtocolVersion> {
        if self.0 <= ProtocolVersion::MIN.0 {
            None
        } else {
            Some(ProtocolVersion(self.0 - 1))
        }
    }

    pub fn supports_per_request_keyspace(self) -> bool {
        self.0 >= 5
    }

    pub fn supports_keyspace_in_prepared_metadata(self) -> bool {
        self.0 >= 5
    }

    pub fn supports_continuous_paging(self) -> bool {
        self.0 >= 5
    }
}

impl Default for ProtocolVersion {
    fn default() -> Self {
        ProtocolVersion::MAX
    }
}

/// Wire opcodes (spec §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum OpCode {
    Error = 0x00,
    Startup = 0x01,
    Ready = 0x02,
    Authenticate = 0x03,
    Options = 0x05,
    Supported = 0x06,
    Query = 0x07,
    Result = 0x08,
    Prepare = 0x09,
    Execute = 0x0A,
    Register = 0x0B,
    Event = 0x0C,
    Batch = 0x0D,
    AuthChallenge = 0x0E,
    AuthResponse = 0x0F,
    AuthSuccess = 0x10,
}

impl OpCode {
    pub fn from_u8(b: u8) -> Option<OpCode> {
        use OpCode::*;
        Some(match b {
            0x00 => Error,
            0x01 => Startup,
            0x02 => Ready,
            0x03 => Authenticate,
            0x05 => Options,
            0x06 => Supported,
            0x07 => Query,
            0x08 => Result,
            0x09 => Prepare,
            0x0A => Execute,
            0x0B => Register,
            0x0C => Event,
            0x0D => Batch,
            0x0E => AuthChallenge,
            0x0F => AuthResponse,
            0x10 => AuthSuccess,
            _ => return None,
        })
    }
}

/// Consistency levels, encoded as `[consistency]` (a `[short]`) on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u16)]
pub enum Consistency {
    Any = 0x0000,
    One = 0x0001,
    Two = 0x0002,
    Three = 0x0003,
    Quorum = 0x0004,
    All = 0x0005,
    LocalQuorum = 0x0006,
    EachQuorum = 0x0007,
    Serial = 0x0008,
    LocalSerial = 0x0009,
    LocalOne = 0x000A,
}

impl Default for Consistency {
    fn default() -> Self {
        Consistency::One
    }
}

impl Consistency {
    pub fn from_u16(v: u16) -> Option<Consistency> {
        use Consistency::*;
        Some(match v {
            0x0000 => Any,
            0x0001 => One,
            0x0002 => Two,
            0x0003 => Three,
            0x0004 => Quorum,
            0x0005 => All,
            0x0006 => LocalQuorum,
            0x0007 => EachQuorum,
            0x0008 => Serial,
            0x0009 => LocalSerial,
            0x000A => LocalOne,
            _ => return None,
        })
    }
}

/// Server error codes as carried on an `ERROR` response body (spec §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ServerErrorCode {
    ServerError = 0x0000,
    ProtocolError = 0x000A,
    BadCredentials = 0x0100,
    Unavailable = 0x1000,
    Overloaded = 0x1001,
    IsBootstrapping = 0x1002,
    TruncateError = 0x1003,
    WriteTimeout = 0x1100,
    ReadTimeout = 0x1200,
    ReadFailure = 0x1300,
    FunctionFailure = 0x1400,
    WriteFailure = 0x1500,
    SyntaxError = 0x2000,
    Unauthorized = 0x2100,
    Invalid = 0x2200,
    ConfigError = 0x2300,
    AlreadyExists = 0x2400,
    Unprepared = 0x2500,
}

impl ServerErrorCode {
    pub fn from_i32(v: i32) -> Option<ServerErrorCode> {
        use ServerErrorCode::*;
        Some(match v {
            0x0000 => ServerError,
            0x000A => ProtocolError,
            0x0100 => BadCredentials,
            0x1000 => Unavailable,
            0x1001 => Overloaded,
            0x1002 => IsBootstrapping,
            0x1003 => TruncateError,
            0x1100 => WriteTimeout,
            0x1200 => ReadTimeout,
            0x1300 => ReadFailure,
            0x1400 => FunctionFailure,
            0x1500 => WriteFailure,
            0x2000 => SyntaxError,
            0x2100 => Unauthorized,
            0x2200 => Invalid,
            0x2300 => ConfigError,
            0x2400 => AlreadyExists,
            0x2500 => Unprepared,
            _ => return None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_id_width_matches_protocol_version() {
        assert_eq!(ProtocolVersion::V1.stream_id_width(), 1);
        assert_eq!(ProtocolVersion::V2.stream_id_width(), 1);
        assert_eq!(ProtocolVersion::V3.stream_id_width(), 2);
        assert_eq!(ProtocolVersion::V5.stream_id_width(), 2);
    }

    #[test]
    fn max_streams_matches_spec_bounds() {
        assert_eq!(ProtocolVersion::V2.max_streams(), 128);
        assert_eq!(ProtocolVersion::V4.max_streams(), 32_768);
    }

    #[test]
    fn downgrade_never_goes_below_v1() {
        assert_eq!(ProtocolVersion::V1.downgrade(), None);
        assert_eq!(ProtocolVersion::V2.downgrade(), Some(ProtocolVersion::V1));
    }

    #[test]
    fn opcode_round_trips_through_u8() {
        assert_eq!(OpCode::from_u8(0x07), Some(OpCode::Query));
        assert_eq!(OpCode::from_u8(0xFF), None);
    }
}
