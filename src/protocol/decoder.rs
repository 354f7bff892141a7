//! Inbound frame decoder.
//!
//! A staged state machine over a [`ByteQueue`]:
//! - `Opcode`: 1 byte (FIN, RSV bits, opcode)
//! - `Length`: 1 byte (MASK bit, 7-bit length)
//! - `ExtendedLength`: 2 or 8 bytes, only for length 126/127
//! - `MaskKey`: 4 bytes, only if masked
//! - `Payload`: `length` bytes, then back to `Opcode`
//!
//! When a stage cannot read its bytes the decoder stays on that stage and
//! resumes there on the next call; consumed bytes are never re-read.
//!
//! # Example
//!
//! ```
//! use bytes::Bytes;
//! use tcp_websocket::protocol::{FrameDecoder, Opcode};
//!
//! let mut decoder = FrameDecoder::new();
//!
//! decoder.put(Bytes::from_static(&[0x81, 0x02, b'h']));
//! assert!(decoder.next_frame(None).unwrap().is_none());
//!
//! decoder.put(Bytes::from_static(b"i"));
//! let frame = decoder.next_frame(None).unwrap().unwrap();
//! assert_eq!(frame.opcode, Opcode::Text);
//! assert_eq!(&frame.payload[..], b"hi");
//! ```

use bytes::{Bytes, BytesMut};

use super::byte_queue::ByteQueue;
use super::frame::Frame;
use super::wire_format::{apply_mask, bits, Opcode, DEFAULT_MAX_MESSAGE_SIZE, MAX_CONTROL_PAYLOAD};
use crate::error::{Result, WebSocketError};

/// Decode stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    /// Waiting for the FIN/RSV/opcode byte.
    Opcode,
    /// Waiting for the MASK/length byte.
    Length,
    /// Waiting for the 2- or 8-byte extended length.
    ExtendedLength,
    /// Waiting for the 4-byte mask key.
    MaskKey,
    /// Waiting for the payload.
    Payload,
    /// Terminal; input is discarded.
    Closed,
}

/// Turns queued bytes into frames, one at a time.
#[derive(Debug)]
pub struct FrameDecoder {
    /// Buffered inbound bytes.
    queue: ByteQueue,
    /// Current stage.
    stage: Stage,
    /// The frame being decoded (single slot, reset per frame).
    frame: Frame,
    /// Upper bound on message length, summed across fragments.
    max_message_size: u64,
    /// Reject unmasked frames.
    require_masking: bool,
}

impl FrameDecoder {
    /// Create a decoder with the default message size limit.
    pub fn new() -> Self {
        Self::with_limits(DEFAULT_MAX_MESSAGE_SIZE, false)
    }

    /// Create a decoder with a custom message size limit and masking policy.
    pub fn with_limits(max_message_size: u64, require_masking: bool) -> Self {
        Self {
            queue: ByteQueue::new(),
            stage: Stage::Opcode,
            frame: Frame::default(),
            max_message_size,
            require_masking,
        }
    }

    /// Queue inbound bytes. Ignored once the decoder is closed.
    pub fn put(&mut self, chunk: Bytes) {
        if self.stage != Stage::Closed {
            self.queue.put(chunk);
        }
    }

    /// Decode the next complete frame.
    ///
    /// `open_message` is the length of the message currently being
    /// reassembled, if any; it drives the fragmentation and size checks.
    ///
    /// Returns `Ok(None)` when more bytes are needed. Any error leaves the
    /// decoder closed.
    pub fn next_frame(&mut self, open_message: Option<u64>) -> Result<Option<Frame>> {
        let result = self.decode(open_message);
        if result.is_err() {
            self.close();
        }
        result
    }

    fn decode(&mut self, open_message: Option<u64>) -> Result<Option<Frame>> {
        loop {
            match self.stage {
                Stage::Opcode => {
                    let Some(buf) = self.queue.read(1) else {
                        return Ok(None);
                    };
                    self.parse_opcode(buf[0], open_message.is_some())?;
                }
                Stage::Length => {
                    let Some(buf) = self.queue.read(1) else {
                        return Ok(None);
                    };
                    self.parse_length(buf[0], open_message)?;
                }
                Stage::ExtendedLength => {
                    let Some(buf) = self.queue.read(self.frame.length_bytes) else {
                        return Ok(None);
                    };
                    self.parse_extended_length(&buf, open_message)?;
                }
                Stage::MaskKey => {
                    let Some(buf) = self.queue.read(4) else {
                        return Ok(None);
                    };
                    self.frame.mask_key = Some([buf[0], buf[1], buf[2], buf[3]]);
                    self.stage = Stage::Payload;
                }
                Stage::Payload => {
                    let length = usize::try_from(self.frame.length).map_err(|_| {
                        WebSocketError::SizeLimit(format!(
                            "Frame length {} does not fit in memory",
                            self.frame.length
                        ))
                    })?;
                    let Some(buf) = self.queue.read(length) else {
                        return Ok(None);
                    };

                    self.frame.payload = match self.frame.mask_key {
                        Some(key) => {
                            let mut payload = BytesMut::from(&buf[..]);
                            apply_mask(&mut payload, key);
                            payload.freeze()
                        }
                        None => buf,
                    };
                    self.stage = Stage::Opcode;
                    return Ok(Some(std::mem::take(&mut self.frame)));
                }
                Stage::Closed => return Ok(None),
            }
        }
    }

    fn parse_opcode(&mut self, octet: u8, in_message: bool) -> Result<()> {
        let raw = octet & bits::OPCODE;
        let opcode = Opcode::from_u8(raw).ok_or_else(|| {
            WebSocketError::Protocol(format!("Unrecognized frame opcode: {}", raw))
        })?;

        self.frame = Frame {
            fin: octet & bits::FIN != 0,
            rsv1: octet & bits::RSV1 != 0,
            rsv2: octet & bits::RSV2 != 0,
            rsv3: octet & bits::RSV3 != 0,
            opcode,
            ..Frame::default()
        };
        self.stage = Stage::Length;

        if opcode.is_control() && !self.frame.fin {
            return Err(WebSocketError::Protocol(format!(
                "Received fragmented control frame: opcode = {}",
                raw
            )));
        }

        if in_message && opcode.is_opening() {
            return Err(WebSocketError::Protocol(
                "Received new data frame but previous continuous frame is unfinished".to_string(),
            ));
        }

        Ok(())
    }

    fn parse_length(&mut self, octet: u8, open_message: Option<u64>) -> Result<()> {
        self.frame.masked = octet & bits::MASK != 0;
        let length = octet & bits::LENGTH;

        if length <= MAX_CONTROL_PAYLOAD as u8 {
            self.frame.length = u64::from(length);
            self.stage = self.after_length();
            self.check_size(open_message)?;
        } else {
            self.frame.length_bytes = if length == bits::LENGTH_16 { 2 } else { 8 };
            self.stage = Stage::ExtendedLength;
        }

        if self.require_masking && !self.frame.masked {
            return Err(WebSocketError::Unacceptable(
                "Received unmasked frame but masking is required".to_string(),
            ));
        }

        Ok(())
    }

    fn parse_extended_length(&mut self, buf: &[u8], open_message: Option<u64>) -> Result<()> {
        self.frame.length = match buf.len() {
            2 => u64::from(u16::from_be_bytes([buf[0], buf[1]])),
            _ => u64::from_be_bytes([
                buf[0], buf[1], buf[2], buf[3], buf[4], buf[5], buf[6], buf[7],
            ]),
        };
        self.stage = self.after_length();

        if self.frame.is_control() && self.frame.length > MAX_CONTROL_PAYLOAD as u64 {
            return Err(WebSocketError::Protocol(format!(
                "Received control frame having too long payload: {}",
                self.frame.length
            )));
        }

        self.check_size(open_message)
    }

    #[inline]
    fn after_length(&self) -> Stage {
        if self.frame.masked {
            Stage::MaskKey
        } else {
            Stage::Payload
        }
    }

    fn check_size(&self, open_message: Option<u64>) -> Result<()> {
        let total = open_message
            .unwrap_or(0)
            .saturating_add(self.frame.length);
        if total > self.max_message_size {
            return Err(WebSocketError::SizeLimit(format!(
                "WebSocket frame length too large: {} exceeds maximum {}",
                total, self.max_message_size
            )));
        }
        Ok(())
    }

    /// Enter the terminal stage and discard everything buffered.
    pub fn close(&mut self) {
        self.stage = Stage::Closed;
        self.queue.clear();
        self.frame = Frame::default();
    }

    /// Whether the decoder has been closed.
    #[inline]
    pub fn is_closed(&self) -> bool {
        self.stage == Stage::Closed
    }

    /// Number of buffered, undecoded bytes.
    #[inline]
    pub fn buffered(&self) -> usize {
        self.queue.len()
    }

    /// Current stage name, for debugging.
    #[cfg(test)]
    fn stage_name(&self) -> &'static str {
        match self.stage {
            Stage::Opcode => "Opcode",
            Stage::Length => "Length",
            Stage::ExtendedLength => "ExtendedLength",
            Stage::MaskKey => "MaskKey",
            Stage::Payload => "Payload",
            Stage::Closed => "Closed",
        }
    }
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}
