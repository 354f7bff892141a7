//! Upgrade request construction and response validation.

use base64::Engine;
use bytes::Bytes;
use sha1::{Digest, Sha1};

use super::parser::HandshakeInfo;
use crate::error::{Result, WebSocketError};

/// GUID appended to the client key before hashing (RFC 6455 §1.3).
pub const WS_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Protocol version sent in `Sec-WebSocket-Version`.
pub const WS_VERSION: &str = "13";

/// Header names the request always sets itself.
const RESERVED_HEADERS: [&str; 6] = [
    "host",
    "upgrade",
    "connection",
    "sec-websocket-version",
    "sec-websocket-key",
    "sec-websocket-protocol",
];

/// Compute the `Sec-WebSocket-Accept` value expected for `client_key`.
pub fn compute_accept_key(client_key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(client_key.as_bytes());
    hasher.update(WS_GUID.as_bytes());
    base64::engine::general_purpose::STANDARD.encode(hasher.finalize())
}

/// Generate a random `Sec-WebSocket-Key`: 16 random bytes, base64 encoded.
pub fn generate_key() -> Result<String> {
    let mut key = [0u8; 16];
    getrandom::getrandom(&mut key)?;
    Ok(base64::engine::general_purpose::STANDARD.encode(key))
}

/// The client's opening handshake.
#[derive(Debug, Clone)]
pub struct UpgradeRequest {
    path: String,
    host: String,
    headers: Vec<(String, String)>,
    protocols: Vec<String>,
    key: String,
}

impl UpgradeRequest {
    /// Create a request for `path` on `host` with a fresh random key.
    pub fn new(path: impl Into<String>, host: impl Into<String>) -> Result<Self> {
        Ok(Self::with_key(path, host, generate_key()?))
    }

    /// Create a request with an explicit key.
    pub fn with_key(
        path: impl Into<String>,
        host: impl Into<String>,
        key: impl Into<String>,
    ) -> Self {
        Self {
            path: path.into(),
            host: host.into(),
            headers: Vec::new(),
            protocols: Vec::new(),
            key: key.into(),
        }
    }

    /// Add caller headers. Names that collide with the handshake's own
    /// headers are dropped.
    pub fn headers(mut self, headers: &[(String, String)]) -> Self {
        for (name, value) in headers {
            let lower = name.to_ascii_lowercase();
            if RESERVED_HEADERS.contains(&lower.as_str()) {
                tracing::debug!("Dropping reserved handshake header: {}", name);
                continue;
            }
            self.headers.push((name.clone(), value.clone()));
        }
        self
    }

    /// Offer subprotocols, in preference order.
    pub fn protocols(mut self, protocols: &[String]) -> Self {
        self.protocols = protocols.to_vec();
        self
    }

    /// The `Sec-WebSocket-Key` sent with this request.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Subprotocols offered by this request.
    pub fn offered_protocols(&self) -> &[String] {
        &self.protocols
    }

    /// Serialize to wire bytes. The request has no body.
    pub fn to_bytes(&self) -> Bytes {
        let mut request = format!("GET {} HTTP/1.1\r\n", self.path);

        for (name, value) in &self.headers {
            request.push_str(&format!("{}: {}\r\n", name, value));
        }

        request.push_str(&format!(
            "Host: {}\r\n\
             Upgrade: websocket\r\n\
             Connection: Upgrade\r\n\
             Sec-WebSocket-Version: {}\r\n\
             Sec-WebSocket-Key: {}\r\n",
            self.host, WS_VERSION, self.key
        ));

        if !self.protocols.is_empty() {
            request.push_str(&format!(
                "Sec-WebSocket-Protocol: {}\r\n",
                self.protocols.join(", ")
            ));
        }

        request.push_str("\r\n");
        Bytes::from(request)
    }

    /// Check the server's response against this request.
    ///
    /// Returns the subprotocol the server selected, if any.
    ///
    /// # Errors
    ///
    /// `HandshakeRejected` when the status is not 101, the upgrade was not
    /// confirmed, the accept key is missing or wrong, or the server picked a
    /// subprotocol that was never offered.
    pub fn validate_response(&self, info: &HandshakeInfo) -> Result<Option<String>> {
        if info.status_code != 101 {
            return Err(WebSocketError::HandshakeRejected(format!(
                "Unexpected response code: {} {}",
                info.status_code, info.status_message
            )));
        }

        if !info.upgrade {
            return Err(WebSocketError::HandshakeRejected(
                "Server did not confirm the protocol upgrade".to_string(),
            ));
        }

        let accept = info.header("sec-websocket-accept").ok_or_else(|| {
            WebSocketError::HandshakeRejected("Missing Sec-WebSocket-Accept header".to_string())
        })?;
        let expected = compute_accept_key(&self.key);
        if accept != expected {
            return Err(WebSocketError::HandshakeRejected(format!(
                "Invalid Sec-WebSocket-Accept: expected {}, got {}",
                expected, accept
            )));
        }

        match info.header("sec-websocket-protocol") {
            None | Some("") => Ok(None),
            Some(selected) => {
                if self.protocols.iter().any(|p| p == selected) {
                    Ok(Some(selected.to_string()))
                } else {
                    Err(WebSocketError::HandshakeRejected(format!(
                        "Server selected a subprotocol that was not offered: {}",
                        selected
                    )))
                }
            }
        }
    }
}
