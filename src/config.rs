//! Connection configuration and URL parsing.

use crate::error::{Result, WebSocketError};
use crate::http::DEFAULT_MAX_HEADER_SIZE;
use crate::protocol::DEFAULT_MAX_MESSAGE_SIZE;

/// Per-connection settings.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Extra request headers, sent in order before the handshake's own.
    pub headers: Vec<(String, String)>,
    /// Offered subprotocols, in preference order.
    pub protocols: Vec<String>,
    /// Budget for the response status line and headers.
    pub max_header_size: usize,
    /// Largest accepted message, summed across fragments.
    pub max_message_size: u64,
    /// Reject unmasked inbound frames.
    pub require_masking: bool,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            headers: Vec::new(),
            protocols: Vec::new(),
            max_header_size: DEFAULT_MAX_HEADER_SIZE,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            require_masking: false,
        }
    }
}

impl ConnectionConfig {
    /// Check the configuration before connecting.
    pub fn validate(&self) -> Result<()> {
        validate_protocols(&self.protocols)
    }
}

/// Separator characters excluded from an HTTP token.
const SEPARATORS: &[u8] = b"()<>@,;:\\\"/[]?={} \t";

fn is_token(value: &str) -> bool {
    !value.is_empty()
        && value
            .bytes()
            .all(|b| (0x21..0x7f).contains(&b) && !SEPARATORS.contains(&b))
}

/// Check offered subprotocols: non-empty tokens, unique ignoring case.
pub fn validate_protocols(protocols: &[String]) -> Result<()> {
    for (i, protocol) in protocols.iter().enumerate() {
        if !is_token(protocol) {
            return Err(WebSocketError::InvalidArgument(format!(
                "Invalid subprotocol: {:?}",
                protocol
            )));
        }
        if protocols[..i]
            .iter()
            .any(|p| p.eq_ignore_ascii_case(protocol))
        {
            return Err(WebSocketError::InvalidArgument(format!(
                "Duplicate subprotocol: {}",
                protocol
            )));
        }
    }
    Ok(())
}

/// Parsed WebSocket URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WsUrl {
    /// Host name or IP address (without IPv6 brackets).
    pub host: String,
    /// Port number (default: 80 for ws, 443 for wss).
    pub port: u16,
    /// Request path including any query (default: "/").
    pub path: String,
    /// Whether TLS is required (wss://).
    pub tls: bool,
}

impl WsUrl {
    /// Parse a `ws://` or `wss://` URL. `http://` and `https://` are
    /// accepted as aliases.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for an unknown scheme, a fragment, an empty host or
    /// a bad port.
    pub fn parse(url: &str) -> Result<Self> {
        let invalid = |msg: &str| WebSocketError::InvalidArgument(format!("{}: {}", msg, url));

        let (scheme, rest) = url
            .split_once("://")
            .ok_or_else(|| invalid("missing scheme"))?;

        let tls = match scheme.to_ascii_lowercase().as_str() {
            "ws" | "http" => false,
            "wss" | "https" => true,
            _ => return Err(invalid("unsupported scheme")),
        };

        if rest.contains('#') {
            return Err(invalid("fragments are not allowed in WebSocket URLs"));
        }

        let default_port = if tls { 443 } else { 80 };

        let split = rest.find(['/', '?']).unwrap_or(rest.len());
        let (host_port, path) = rest.split_at(split);
        let path = if path.is_empty() {
            "/".to_string()
        } else if path.starts_with('?') {
            format!("/{}", path)
        } else {
            path.to_string()
        };

        let (host, port) = if let Some(bracketed) = host_port.strip_prefix('[') {
            // IPv6: [::1]:8080
            let (host, after) = bracketed
                .split_once(']')
                .ok_or_else(|| invalid("unterminated IPv6 address"))?;
            let port = match after.strip_prefix(':') {
                Some(port) => port.parse().map_err(|_| invalid("invalid port"))?,
                None if after.is_empty() => default_port,
                None => return Err(invalid("invalid host")),
            };
            (host.to_string(), port)
        } else if let Some((host, port)) = host_port.rsplit_once(':') {
            let port = port.parse().map_err(|_| invalid("invalid port"))?;
            (host.to_string(), port)
        } else {
            (host_port.to_string(), default_port)
        };

        if host.is_empty() {
            return Err(invalid("empty host"));
        }

        Ok(Self {
            host,
            port,
            path,
            tls,
        })
    }

    /// Value for the `Host` header; the port is omitted when it is the
    /// scheme default.
    pub fn host_header(&self) -> String {
        let default_port = if self.tls { 443 } else { 80 };
        let host = if self.host.contains(':') {
            format!("[{}]", self.host)
        } else {
            self.host.clone()
        };
        if self.port == default_port {
            host
        } else {
            format!("{}:{}", host, self.port)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = ConnectionConfig::default();
        assert_eq!(config.max_header_size, 80 * 1024);
        assert_eq!(config.max_message_size, 0x3FF_FFFF);
        assert!(!config.require_masking);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_protocols() {
        assert!(validate_protocols(&["chat".into(), "v2.json".into()]).is_ok());
        assert!(validate_protocols(&["".into()]).is_err());
        assert!(validate_protocols(&["has space".into()]).is_err());
        assert!(validate_protocols(&["a,b".into()]).is_err());
        assert!(validate_protocols(&["Chat".into(), "chat".into()]).is_err());
    }

    #[test]
    fn test_ws_url_parse() {
        let url = WsUrl::parse("ws://example.com/chat").unwrap();
        assert_eq!(url.host, "example.com");
        assert_eq!(url.port, 80);
        assert_eq!(url.path, "/chat");
        assert!(!url.tls);

        let url = WsUrl::parse("wss://example.com:8443/ws?token=1").unwrap();
        assert_eq!(url.port, 8443);
        assert_eq!(url.path, "/ws?token=1");
        assert!(url.tls);

        let url = WsUrl::parse("ws://localhost").unwrap();
        assert_eq!(url.path, "/");

        let url = WsUrl::parse("ws://localhost?x=1").unwrap();
        assert_eq!(url.host, "localhost");
        assert_eq!(url.path, "/?x=1");
    }

    #[test]
    fn test_ws_url_http_aliases() {
        assert!(!WsUrl::parse("http://example.com").unwrap().tls);
        let url = WsUrl::parse("https://example.com").unwrap();
        assert!(url.tls);
        assert_eq!(url.port, 443);
    }

    #[test]
    fn test_ws_url_ipv6() {
        let url = WsUrl::parse("ws://[::1]:9001/").unwrap();
        assert_eq!(url.host, "::1");
        assert_eq!(url.port, 9001);
        assert_eq!(url.host_header(), "[::1]:9001");
    }

    #[test]
    fn test_ws_url_rejects() {
        for bad in [
            "ftp://example.com",
            "example.com",
            "ws://example.com/#frag",
            "ws:///path",
            "ws://example.com:notaport/",
            "ws://[::1/",
        ] {
            assert!(
                matches!(WsUrl::parse(bad), Err(WebSocketError::InvalidArgument(_))),
                "{}",
                bad
            );
        }
    }

    #[test]
    fn test_host_header() {
        assert_eq!(
            WsUrl::parse("ws://example.com/").unwrap().host_header(),
            "example.com"
        );
        assert_eq!(
            WsUrl::parse("ws://example.com:8080/").unwrap().host_header(),
            "example.com:8080"
        );
        assert_eq!(
            WsUrl::parse("wss://example.com:443/").unwrap().host_header(),
            "example.com"
        );
    }
}
