//! RFC 6455 wire format constants and helpers.
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-------+-+-------------+-------------------------------+
//! |F|R|R|R| opcode|M| Payload len |    Extended payload length    |
//! |I|S|S|S|  (4)  |A|     (7)     |             (16/64)           |
//! |N|V|V|V|       |S|             |   (if payload len==126/127)   |
//! | |1|2|3|       |K|             |                               |
//! +-+-+-+-+-------+-+-------------+ - - - - - - - - - - - - - - - +
//! |     Extended payload length continued, if payload len == 127  |
//! + - - - - - - - - - - - - - - - +-------------------------------+
//! |                               | Masking-key, if MASK set to 1 |
//! +-------------------------------+-------------------------------+
//! | Masking-key (continued)       |          Payload Data         |
//! +-------------------------------- - - - - - - - - - - - - - - - +
//! ```
//!
//! All multi-byte integers are Big Endian.

/// Largest possible frame header: 2 + 8 (extended length) + 4 (mask key).
pub const MAX_HEADER_SIZE: usize = 14;

/// Maximum payload of a control frame (close, ping, pong).
pub const MAX_CONTROL_PAYLOAD: usize = 125;

/// Default maximum size of one reassembled message (64 MiB).
pub const DEFAULT_MAX_MESSAGE_SIZE: u64 = 0x3FF_FFFF;

/// Bit masks for the first two header bytes.
pub mod bits {
    /// Final fragment flag (byte 1).
    pub const FIN: u8 = 0x80;
    /// Reserved bit 1 (byte 1).
    pub const RSV1: u8 = 0x40;
    /// Reserved bit 2 (byte 1).
    pub const RSV2: u8 = 0x20;
    /// Reserved bit 3 (byte 1).
    pub const RSV3: u8 = 0x10;
    /// Opcode nibble (byte 1).
    pub const OPCODE: u8 = 0x0F;
    /// Mask flag (byte 2).
    pub const MASK: u8 = 0x80;
    /// Length field (byte 2).
    pub const LENGTH: u8 = 0x7F;

    /// Length field value announcing a 2-byte extended length.
    pub const LENGTH_16: u8 = 126;
    /// Length field value announcing an 8-byte extended length.
    pub const LENGTH_64: u8 = 127;
}

/// Close status codes.
pub mod close_code {
    /// Normal closure.
    pub const NORMAL_CLOSURE: u16 = 1000;
    /// Endpoint going away.
    pub const GOING_AWAY: u16 = 1001;
    /// Protocol error.
    pub const PROTOCOL_ERROR: u16 = 1002;
    /// Unacceptable data type.
    pub const UNACCEPTABLE: u16 = 1003;
    /// Abnormal closure; never sent on the wire.
    pub const ABNORMAL: u16 = 1006;
    /// Payload inconsistent with message type (e.g. bad UTF-8).
    pub const ENCODING_ERROR: u16 = 1007;
    /// Policy violation.
    pub const POLICY_VIOLATION: u16 = 1008;
    /// Message too big.
    pub const TOO_LARGE: u16 = 1009;
    /// Expected extension not negotiated.
    pub const EXTENSION_ERROR: u16 = 1010;
    /// Unexpected condition on the server.
    pub const UNEXPECTED_CONDITION: u16 = 1011;

    /// Code used when a close frame carries no status.
    pub const DEFAULT: u16 = NORMAL_CLOSURE;

    /// Lower bound of the private-use band.
    pub const MIN_PRIVATE: u16 = 3000;
    /// Upper bound (inclusive) of the private-use band.
    pub const MAX_PRIVATE: u16 = 4999;

    /// Codes this engine recognizes in an incoming close frame.
    pub const STANDARD: [u16; 9] = [
        NORMAL_CLOSURE,
        GOING_AWAY,
        PROTOCOL_ERROR,
        UNACCEPTABLE,
        ENCODING_ERROR,
        POLICY_VIOLATION,
        TOO_LARGE,
        EXTENSION_ERROR,
        UNEXPECTED_CONDITION,
    ];

    /// Whether `code` is one of the standard codes.
    #[inline]
    pub fn is_standard(code: u16) -> bool {
        STANDARD.contains(&code)
    }

    /// Whether `code` lies in the private-use band.
    #[inline]
    pub fn is_private(code: u16) -> bool {
        (MIN_PRIVATE..=MAX_PRIVATE).contains(&code)
    }
}

/// Frame opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Opcode {
    /// Continuation of a fragmented message.
    Continuation = 0x0,
    /// UTF-8 text message.
    Text = 0x1,
    /// Binary message.
    Binary = 0x2,
    /// Close control frame.
    Close = 0x8,
    /// Ping control frame.
    Ping = 0x9,
    /// Pong control frame.
    Pong = 0xA,
}

impl Opcode {
    /// Decode the low nibble of the first header byte.
    ///
    /// Returns `None` for reserved opcodes.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x0 => Some(Opcode::Continuation),
            0x1 => Some(Opcode::Text),
            0x2 => Some(Opcode::Binary),
            0x8 => Some(Opcode::Close),
            0x9 => Some(Opcode::Ping),
            0xA => Some(Opcode::Pong),
            _ => None,
        }
    }

    /// Close, ping and pong.
    #[inline]
    pub fn is_control(self) -> bool {
        matches!(self, Opcode::Close | Opcode::Ping | Opcode::Pong)
    }

    /// Opcodes that start a new message.
    #[inline]
    pub fn is_opening(self) -> bool {
        matches!(self, Opcode::Text | Opcode::Binary)
    }
}

/// XOR `payload` with the 4-byte mask key, in place.
///
/// The same call masks and unmasks. Byte `i` uses `key[i % 4]`.
#[inline]
pub fn apply_mask(payload: &mut [u8], key: [u8; 4]) {
    for (i, byte) in payload.iter_mut().enumerate() {
        *byte ^= key[i % 4];
    }
}
