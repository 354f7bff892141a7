//! Error types for tcp-websocket.

use std::sync::Arc;

use thiserror::Error;

use crate::protocol::close_code;

/// Reason the handshake response could not be parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ParseErrorKind {
    /// Response line did not match `HTTP/x.y NNN reason`.
    #[error("invalid status line")]
    InvalidStatusLine,
    /// A bare carriage return inside a header line.
    #[error("LF expected")]
    LfExpected,
    /// `Content-Length` was not a decimal integer.
    #[error("invalid content-length")]
    InvalidContentLength,
    /// Two `Content-Length` headers with different values.
    #[error("duplicate content-length with different values")]
    DuplicateContentLengthMismatch,
}

/// Main error type for all WebSocket operations.
///
/// Cloneable so the same failure can be both returned to the caller and
/// broadcast as an error event.
#[derive(Debug, Clone, Error)]
pub enum WebSocketError {
    /// I/O error on the underlying byte stream.
    #[error("I/O error: {0}")]
    Io(#[source] Arc<std::io::Error>),

    /// The OS random source could not produce a key or mask.
    #[error("random source unavailable: {0}")]
    Entropy(getrandom::Error),

    /// The upgrade response was not valid HTTP/1.x.
    #[error("Handshake parse error: {0}")]
    HandshakeParse(ParseErrorKind),

    /// The server answered, but did not accept the upgrade.
    #[error("Handshake rejected: {0}")]
    HandshakeRejected(String),

    /// Frame-level protocol violation (bad opcode, illegal fragmentation, ...).
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Header budget or message size limit exceeded.
    #[error("Size limit exceeded: {0}")]
    SizeLimit(String),

    /// Text payload or close reason is not valid UTF-8.
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// Data the client is configured to refuse (e.g. unmasked frames).
    #[error("Unacceptable data: {0}")]
    Unacceptable(String),

    /// Caller passed an argument that is not valid in the current state.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Connection is closing or closed.
    #[error("Connection closed")]
    ConnectionClosed,
}

impl WebSocketError {
    /// Close code reported when this error fails the connection.
    pub fn close_code(&self) -> u16 {
        match self {
            WebSocketError::Protocol(_) => close_code::PROTOCOL_ERROR,
            WebSocketError::SizeLimit(_) => close_code::TOO_LARGE,
            WebSocketError::Encoding(_) => close_code::ENCODING_ERROR,
            WebSocketError::Unacceptable(_) => close_code::UNACCEPTABLE,
            WebSocketError::InvalidArgument(_) => close_code::UNEXPECTED_CONDITION,
            WebSocketError::Io(_)
            | WebSocketError::Entropy(_)
            | WebSocketError::HandshakeParse(_)
            | WebSocketError::HandshakeRejected(_)
            | WebSocketError::ConnectionClosed => close_code::ABNORMAL,
        }
    }

    /// Human-readable detail without the kind prefix, used as a close reason.
    pub fn message(&self) -> String {
        match self {
            WebSocketError::HandshakeRejected(msg)
            | WebSocketError::Protocol(msg)
            | WebSocketError::SizeLimit(msg)
            | WebSocketError::Encoding(msg)
            | WebSocketError::Unacceptable(msg)
            | WebSocketError::InvalidArgument(msg) => msg.clone(),
            WebSocketError::HandshakeParse(kind) => kind.to_string(),
            other => other.to_string(),
        }
    }
}

impl From<std::io::Error> for WebSocketError {
    fn from(err: std::io::Error) -> Self {
        WebSocketError::Io(Arc::new(err))
    }
}

impl From<getrandom::Error> for WebSocketError {
    fn from(err: getrandom::Error) -> Self {
        WebSocketError::Entropy(err)
    }
}

impl From<ParseErrorKind> for WebSocketError {
    fn from(kind: ParseErrorKind) -> Self {
        WebSocketError::HandshakeParse(kind)
    }
}

/// Result type alias using WebSocketError.
pub type Result<T> = std::result::Result<T, WebSocketError>;
