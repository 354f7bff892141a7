//! Connection events and ready state.
//!
//! Every observable outcome of a connection is one [`Event`]. The runtime
//! broadcasts them to all subscribers in the order the connection produced
//! them.

use std::sync::Arc;

use bytes::Bytes;
use serde::Serialize;

use crate::error::WebSocketError;
use crate::http::HandshakeInfo;

/// Connection lifecycle stage. Only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadyState {
    /// Handshake not yet complete.
    Connecting = 0,
    /// Handshake complete; frames flow.
    Open = 1,
    /// Close frame sent, waiting for the peer's.
    Closing = 2,
    /// Terminal.
    Closed = 3,
}

/// Payload of a completed message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageData {
    /// Text message, already validated as UTF-8.
    Text(String),
    /// Binary message.
    Binary(Bytes),
}

impl MessageData {
    /// Raw bytes of the message.
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            MessageData::Text(text) => text.as_bytes(),
            MessageData::Binary(data) => data,
        }
    }

    /// Text content, if this is a text message.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            MessageData::Text(text) => Some(text),
            MessageData::Binary(_) => None,
        }
    }
}

/// Final status of a connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CloseEvent {
    /// Close status code.
    pub code: u16,
    /// Close reason (may be empty).
    pub reason: String,
}

impl CloseEvent {
    /// Create a close event.
    pub fn new(code: u16, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }
}

/// Something that happened on a connection.
#[derive(Debug, Clone)]
pub enum Event {
    /// Handshake accepted.
    Open(HandshakeInfo),
    /// A complete data message.
    Message(MessageData),
    /// Ping received (a pong has already been queued).
    Ping(Bytes),
    /// Pong received.
    Pong(Bytes),
    /// Connection closed. Emitted exactly once.
    Close(CloseEvent),
    /// Connection failed; always followed by `Close`.
    Error(Arc<WebSocketError>),
}

impl Event {
    /// Short name of the event kind.
    pub fn name(&self) -> &'static str {
        match self {
            Event::Open(_) => "open",
            Event::Message(_) => "message",
            Event::Ping(_) => "ping",
            Event::Pong(_) => "pong",
            Event::Close(_) => "close",
            Event::Error(_) => "error",
        }
    }

    /// Whether this is the terminal close event.
    #[inline]
    pub fn is_close(&self) -> bool {
        matches!(self, Event::Close(_))
    }
}
