//! HTTP/1.1 upgrade handshake.
//!
//! Just enough HTTP to open a WebSocket: build the `GET` upgrade request,
//! parse the response head, and verify the server's answer.

mod parser;
mod request;

pub use parser::{HandshakeInfo, HandshakeParser, Parsed, DEFAULT_MAX_HEADER_SIZE};
pub use request::{compute_accept_key, generate_key, UpgradeRequest, WS_GUID, WS_VERSION};
