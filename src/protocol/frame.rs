//! Frame record and the outbound frame encoder.
//!
//! A [`Frame`] is one wire-level unit. The decoder fills a single reusable
//! slot per connection; the encoder turns an application send into one final,
//! masked [`OutboundFrame`].
//!
//! # Example
//!
//! ```
//! use bytes::Bytes;
//! use tcp_websocket::protocol::{Frame, Opcode};
//!
//! let frame = Frame::new(Opcode::Text, Bytes::from_static(b"hi"));
//! let out = frame.encode([1, 2, 3, 4]);
//!
//! assert_eq!(&out.header[..], &[0x81, 0x82, 1, 2, 3, 4]);
//! assert_eq!(&out.payload[..], &[b'h' ^ 1, b'i' ^ 2]);
//! ```

use bytes::{BufMut, Bytes, BytesMut};

use super::wire_format::{apply_mask, bits, Opcode, MAX_CONTROL_PAYLOAD, MAX_HEADER_SIZE};
use crate::error::Result;
use crate::writer::OutboundFrame;

/// One WebSocket frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// FIN bit.
    pub fin: bool,
    /// RSV1 bit.
    pub rsv1: bool,
    /// RSV2 bit.
    pub rsv2: bool,
    /// RSV3 bit.
    pub rsv3: bool,
    /// Frame opcode.
    pub opcode: Opcode,
    /// MASK bit.
    pub masked: bool,
    /// Declared payload length.
    pub length: u64,
    /// Width of the extended length field: 0, 2 or 8.
    pub length_bytes: usize,
    /// Masking key, if the frame was masked.
    pub mask_key: Option<[u8; 4]>,
    /// Payload, unmasked.
    pub payload: Bytes,
}

impl Default for Frame {
    fn default() -> Self {
        Self {
            fin: false,
            rsv1: false,
            rsv2: false,
            rsv3: false,
            opcode: Opcode::Continuation,
            masked: false,
            length: 0,
            length_bytes: 0,
            mask_key: None,
            payload: Bytes::new(),
        }
    }
}

impl Frame {
    /// Create a final, unmasked frame carrying `payload`.
    pub fn new(opcode: Opcode, payload: Bytes) -> Self {
        Self {
            fin: true,
            opcode,
            length: payload.len() as u64,
            payload,
            ..Self::default()
        }
    }

    /// Create a close frame: 2-byte big-endian `code` followed by `reason`.
    pub fn close(code: u16, reason: &str) -> Self {
        let mut payload = BytesMut::with_capacity(2 + reason.len());
        payload.put_u16(code);
        payload.put_slice(reason.as_bytes());
        Self::new(Opcode::Close, payload.freeze())
    }

    /// First header byte: FIN, RSV bits and opcode.
    #[inline]
    pub fn first_byte(&self) -> u8 {
        let mut byte = self.opcode as u8;
        if self.fin {
            byte |= bits::FIN;
        }
        if self.rsv1 {
            byte |= bits::RSV1;
        }
        if self.rsv2 {
            byte |= bits::RSV2;
        }
        if self.rsv3 {
            byte |= bits::RSV3;
        }
        byte
    }

    /// Whether this is a close, ping or pong frame.
    #[inline]
    pub fn is_control(&self) -> bool {
        self.opcode.is_control()
    }

    /// Encode as a masked client frame using `mask_key`.
    ///
    /// The header holds the two fixed bytes, the extended length (if any) and
    /// the mask key; the payload is masked by absolute offset.
    pub fn encode(&self, mask_key: [u8; 4]) -> OutboundFrame {
        let len = self.payload.len();
        let mut header = BytesMut::with_capacity(MAX_HEADER_SIZE);

        header.put_u8(self.first_byte());
        if len <= MAX_CONTROL_PAYLOAD {
            header.put_u8(bits::MASK | len as u8);
        } else if len <= u16::MAX as usize {
            header.put_u8(bits::MASK | bits::LENGTH_16);
            header.put_u16(len as u16);
        } else {
            header.put_u8(bits::MASK | bits::LENGTH_64);
            header.put_u64(len as u64);
        }
        header.put_slice(&mask_key);

        let mut payload = BytesMut::from(&self.payload[..]);
        apply_mask(&mut payload, mask_key);

        OutboundFrame::new(header.freeze(), payload.freeze())
    }
}

/// Fresh mask key from the OS random source.
pub fn generate_mask_key() -> Result<[u8; 4]> {
    let mut key = [0u8; 4];
    getrandom::getrandom(&mut key)?;
    Ok(key)
}

/// Build a final, masked frame with a fresh random mask key.
pub fn build_frame(opcode: Opcode, payload: Bytes) -> Result<OutboundFrame> {
    Ok(Frame::new(opcode, payload).encode(generate_mask_key()?))
}

/// Build a masked close frame carrying `code` and `reason`.
pub fn build_close_frame(code: u16, reason: &str) -> Result<OutboundFrame> {
    Ok(Frame::close(code, reason).encode(generate_mask_key()?))
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: [u8; 4] = [0x37, 0xfa, 0x21, 0x3d];

    fn unmask(out: &OutboundFrame) -> Vec<u8> {
        let header = &out.header;
        let key = [
            header[header.len() - 4],
            header[header.len() - 3],
            header[header.len() - 2],
            header[header.len() - 1],
        ];
        let mut payload = out.payload.to_vec();
        apply_mask(&mut payload, key);
        payload
    }

    #[test]
    fn test_mask_round_trip() {
        let frame = Frame::new(Opcode::Text, Bytes::from_static(b"hello world!"));
        let out = frame.encode(KEY);

        assert_ne!(&out.payload[..], b"hello world!");
        assert_eq!(unmask(&out), b"hello world!");
    }

    #[test]
    fn test_header_small_payload() {
        let out = Frame::new(Opcode::Binary, Bytes::from(vec![0u8; 125])).encode(KEY);
        assert_eq!(out.header.len(), 6);
        assert_eq!(out.header[0], 0x82);
        assert_eq!(out.header[1], 0x80 | 125);
        assert_eq!(&out.header[2..6], &KEY);
    }

    #[test]
    fn test_header_16_bit_length() {
        let out = Frame::new(Opcode::Binary, Bytes::from(vec![0u8; 126])).encode(KEY);
        assert_eq!(out.header.len(), 8);
        assert_eq!(out.header[1], 0x80 | 126);
        assert_eq!(&out.header[2..4], &126u16.to_be_bytes());

        let out = Frame::new(Opcode::Binary, Bytes::from(vec![0u8; 65535])).encode(KEY);
        assert_eq!(out.header[1], 0x80 | 126);
        assert_eq!(&out.header[2..4], &[0xff, 0xff]);
    }

    #[test]
    fn test_header_64_bit_length() {
        let out = Frame::new(Opcode::Binary, Bytes::from(vec![0u8; 65536])).encode(KEY);
        assert_eq!(out.header.len(), 14);
        assert_eq!(out.header[1], 0x80 | 127);
        assert_eq!(&out.header[2..10], &65536u64.to_be_bytes());
        assert_eq!(out.payload.len(), 65536);
    }

    #[test]
    fn test_close_frame_prefixes_code() {
        let frame = Frame::close(1000, "bye");
        assert_eq!(&frame.payload[..], &[0x03, 0xe8, b'b', b'y', b'e']);
        assert_eq!(frame.length, 5);

        let out = frame.encode(KEY);
        assert_eq!(out.header[0], 0x88);
        assert_eq!(out.header[1], 0x80 | 5);
        assert_eq!(unmask(&out), &[0x03, 0xe8, b'b', b'y', b'e']);
    }

    #[test]
    fn test_first_byte_flags() {
        let mut frame = Frame::new(Opcode::Ping, Bytes::new());
        assert_eq!(frame.first_byte(), 0x89);
        frame.fin = false;
        frame.rsv1 = true;
        frame.rsv3 = true;
        assert_eq!(frame.first_byte(), 0x40 | 0x10 | 0x09);
    }

    #[test]
    fn test_build_frame_uses_random_mask() {
        let out = build_frame(Opcode::Text, Bytes::from_static(b"abc")).unwrap();
        assert_eq!(out.header.len(), 6);
        assert_eq!(unmask(&out), b"abc");
    }
}
