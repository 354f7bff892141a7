//! Message reassembly across continuation frames.
//!
//! Text and binary frames open a [`Message`]; continuation frames extend it;
//! the first data frame with FIN set completes it. Control frames never pass
//! through here.

use bytes::{Bytes, BytesMut};

use super::frame::Frame;
use super::wire_format::Opcode;
use crate::error::{Result, WebSocketError};
use crate::event::MessageData;

/// A logical message, possibly built from several frames.
#[derive(Debug, Clone)]
pub struct Message {
    /// Opcode of the opening frame (text or binary).
    pub opcode: Opcode,
    /// RSV1 of the opening frame.
    pub rsv1: bool,
    /// RSV2 of the opening frame.
    pub rsv2: bool,
    /// RSV3 of the opening frame.
    pub rsv3: bool,
    chunks: Vec<Bytes>,
    length: u64,
    data: Option<Bytes>,
}

impl Message {
    fn open(frame: &Frame) -> Self {
        Self {
            opcode: frame.opcode,
            rsv1: frame.rsv1,
            rsv2: frame.rsv2,
            rsv3: frame.rsv3,
            chunks: Vec::new(),
            length: 0,
            data: None,
        }
    }

    fn push(&mut self, payload: Bytes) {
        self.length += payload.len() as u64;
        if !payload.is_empty() {
            self.chunks.push(payload);
        }
    }

    /// Total payload length so far.
    #[inline]
    pub fn length(&self) -> u64 {
        self.length
    }

    /// Number of fragments received.
    #[inline]
    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Contiguous payload, concatenated on first call.
    pub fn data(&mut self) -> Bytes {
        if let Some(data) = &self.data {
            return data.clone();
        }
        let data = match self.chunks.len() {
            0 => Bytes::new(),
            1 => self.chunks[0].clone(),
            _ => {
                let mut buf = BytesMut::with_capacity(self.length as usize);
                for chunk in &self.chunks {
                    buf.extend_from_slice(chunk);
                }
                buf.freeze()
            }
        };
        self.chunks.clear();
        self.data = Some(data.clone());
        data
    }

    /// Convert to application data, validating UTF-8 for text messages.
    pub fn into_data(mut self) -> Result<MessageData> {
        let data = self.data();
        match self.opcode {
            Opcode::Text => match std::str::from_utf8(&data) {
                Ok(text) => Ok(MessageData::Text(text.to_owned())),
                Err(_) => Err(WebSocketError::Encoding(
                    "Could not decode a text frame as UTF-8".to_string(),
                )),
            },
            _ => Ok(MessageData::Binary(data)),
        }
    }
}

/// Single-slot reassembler for data frames.
#[derive(Debug, Default)]
pub struct MessageAssembler {
    current: Option<Message>,
}

impl MessageAssembler {
    /// Create an empty assembler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Length of the message being assembled, if one is open.
    #[inline]
    pub fn open_length(&self) -> Option<u64> {
        self.current.as_ref().map(Message::length)
    }

    /// Whether a message is in progress.
    #[inline]
    pub fn is_open(&self) -> bool {
        self.current.is_some()
    }

    /// Feed a continuation, text or binary frame.
    ///
    /// Returns the completed message when `frame` is the final fragment.
    pub fn push(&mut self, frame: Frame) -> Result<Option<Message>> {
        match frame.opcode {
            Opcode::Continuation => {
                let Some(message) = self.current.as_mut() else {
                    return Err(WebSocketError::Protocol(
                        "Received unexpected continuation frame".to_string(),
                    ));
                };
                message.push(frame.payload);
            }
            Opcode::Text | Opcode::Binary => {
                let mut message = Message::open(&frame);
                message.push(frame.payload);
                self.current = Some(message);
            }
            other => {
                return Err(WebSocketError::Protocol(format!(
                    "Control frame {:?} cannot be part of a message",
                    other
                )));
            }
        }

        if frame.fin {
            return Ok(self.current.take());
        }
        Ok(None)
    }

    /// Drop any partially assembled message.
    pub fn clear(&mut self) {
        self.current = None;
    }
}
