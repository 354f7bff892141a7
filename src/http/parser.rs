//! Minimal HTTP/1.1 response parser for the upgrade handshake.
//!
//! Only the status line and headers are parsed; the body (if any) is never
//! read because a successful upgrade hands the stream straight to the frame
//! decoder. States only move forward:
//!
//! ```text
//! ResponseLine ──► Header ──► Done
//! ```
//!
//! # Example
//!
//! ```
//! use tcp_websocket::http::HandshakeParser;
//!
//! let response = b"HTTP/1.1 101 Switching Protocols\r\n\
//!                  Upgrade: websocket\r\n\
//!                  Connection: Upgrade\r\n\r\n\x81\x00";
//!
//! let mut parser = HandshakeParser::new();
//! let parsed = parser.execute(response).unwrap();
//! let info = parsed.info.unwrap();
//!
//! assert_eq!(info.status_code, 101);
//! assert!(info.upgrade);
//! assert_eq!(parsed.consumed, response.len() - 2);
//! ```

use std::collections::HashMap;

use serde::Serialize;

use crate::error::{ParseErrorKind, Result, WebSocketError};

/// Default cumulative budget for the status line and headers (80 KiB).
pub const DEFAULT_MAX_HEADER_SIZE: usize = 80 * 1024;

/// Parsed handshake response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HandshakeInfo {
    /// HTTP major version.
    pub version_major: u8,
    /// HTTP minor version.
    pub version_minor: u8,
    /// Status code.
    pub status_code: u16,
    /// Reason phrase.
    pub status_message: String,
    /// Headers by lower-cased name; the last occurrence wins.
    pub headers: HashMap<String, String>,
    /// Every header in arrival order, names lower-cased, duplicates kept.
    pub raw_headers: Vec<(String, String)>,
    /// Upgrade confirmed (101 + `Upgrade` + `Connection: upgrade`).
    pub upgrade: bool,
    /// Connection may be reused for another request.
    pub should_keep_alive: bool,
    /// Declared or implied body length.
    pub content_length: Option<u64>,
    /// `Transfer-Encoding: chunked` in effect.
    pub chunked: bool,
}

impl HandshakeInfo {
    /// Look up a header value by name (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }
}

/// Outcome of one [`HandshakeParser::execute`] call.
#[derive(Debug, Clone)]
pub struct Parsed {
    /// Bytes of the input chunk consumed by the parser.
    pub consumed: usize,
    /// The response, once the terminating empty line has been seen.
    pub info: Option<HandshakeInfo>,
}

/// Parser state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    ResponseLine,
    Header,
    Done,
}

/// Incremental parser for the handshake response head.
#[derive(Debug)]
pub struct HandshakeParser {
    state: State,
    info: HandshakeInfo,
    /// Partial line carried over between chunks.
    line: Vec<u8>,
    /// Accumulated, lower-cased `Connection` values.
    connection: String,
    /// Body length implied by the status code or declared by a header.
    body_bytes: Option<u64>,
    header_size: usize,
    max_header_size: usize,
}

impl HandshakeParser {
    /// Create a parser with the default header budget.
    pub fn new() -> Self {
        Self::with_max_header_size(DEFAULT_MAX_HEADER_SIZE)
    }

    /// Create a parser with a custom header budget.
    pub fn with_max_header_size(max_header_size: usize) -> Self {
        Self {
            state: State::ResponseLine,
            info: HandshakeInfo::default(),
            line: Vec::new(),
            connection: String::new(),
            body_bytes: None,
            header_size: 0,
            max_header_size,
        }
    }

    /// Whether the header block has been fully parsed.
    #[inline]
    pub fn is_done(&self) -> bool {
        self.state == State::Done
    }

    /// Feed the next chunk of the response.
    ///
    /// Consumes bytes up to and including the empty line that ends the
    /// headers; anything after it is left for the caller. Partial lines are
    /// buffered internally, so a chunk without a line feed is consumed whole.
    ///
    /// # Errors
    ///
    /// - `HandshakeParse` for a malformed status line, a stray carriage
    ///   return, or conflicting `Content-Length` headers
    /// - `SizeLimit` once the cumulative header bytes exceed the budget
    pub fn execute(&mut self, chunk: &[u8]) -> Result<Parsed> {
        let mut offset = 0;
        let mut info = None;

        while offset < chunk.len() && self.state != State::Done {
            let Some(line) = self.consume_line(chunk, &mut offset) else {
                break;
            };
            match self.state {
                State::ResponseLine => self.response_line(&line)?,
                State::Header if line.is_empty() => info = Some(self.finish()?),
                State::Header => self.parse_header(&line)?,
                State::Done => {}
            }
        }

        self.header_size += offset;
        if self.header_size > self.max_header_size {
            return Err(WebSocketError::SizeLimit(format!(
                "max header size exceeded: {} > {}",
                self.header_size, self.max_header_size
            )));
        }

        Ok(Parsed {
            consumed: offset,
            info,
        })
    }

    /// Pull the next complete line out of `chunk`, stripping `\r\n`.
    fn consume_line(&mut self, chunk: &[u8], offset: &mut usize) -> Option<String> {
        let rest = &chunk[*offset..];
        match rest.iter().position(|&b| b == b'\n') {
            Some(pos) => {
                self.line.extend_from_slice(&rest[..pos]);
                *offset += pos + 1;
                let mut raw = std::mem::take(&mut self.line);
                if raw.last() == Some(&b'\r') {
                    raw.pop();
                }
                // Header bytes are treated as Latin-1.
                Some(raw.iter().map(|&b| b as char).collect())
            }
            None => {
                self.line.extend_from_slice(rest);
                *offset = chunk.len();
                None
            }
        }
    }

    fn response_line(&mut self, line: &str) -> Result<()> {
        // Tolerate blank lines ahead of the status line.
        if line.is_empty() {
            return Ok(());
        }

        let rest = line
            .strip_prefix("HTTP/")
            .ok_or(ParseErrorKind::InvalidStatusLine)?;
        let b = rest.as_bytes();
        let well_formed = b.len() >= 7
            && b[0].is_ascii_digit()
            && b[1] == b'.'
            && b[2].is_ascii_digit()
            && b[3] == b' '
            && b[4..7].iter().all(u8::is_ascii_digit);
        if !well_formed {
            return Err(ParseErrorKind::InvalidStatusLine.into());
        }

        self.info.version_major = b[0] - b'0';
        self.info.version_minor = b[2] - b'0';
        self.info.status_code = rest[4..7]
            .parse()
            .map_err(|_| ParseErrorKind::InvalidStatusLine)?;
        let reason = &rest[7..];
        self.info.status_message = reason.strip_prefix(' ').unwrap_or(reason).to_string();

        let status = self.info.status_code;
        if status / 100 == 1 || status == 204 || status == 304 {
            self.body_bytes = Some(0);
        }

        self.state = State::Header;
        Ok(())
    }

    fn parse_header(&mut self, line: &str) -> Result<()> {
        if line.contains('\r') {
            return Err(ParseErrorKind::LfExpected.into());
        }

        let is_ws = |c: char| c == ' ' || c == '\t';

        if line.starts_with(is_ws) {
            // Obsolete line folding: extend the previous value.
            let value = line.trim_matches(is_ws);
            if value.is_empty() {
                return Ok(());
            }
            if let Some((_, last)) = self.info.raw_headers.last_mut() {
                if !last.is_empty() {
                    last.push(' ');
                }
                last.push_str(value);
            }
            return Ok(());
        }

        if let Some((key, value)) = line.split_once(':') {
            if !key.is_empty() && !key.contains(is_ws) {
                self.info
                    .raw_headers
                    .push((key.to_ascii_lowercase(), value.trim_matches(is_ws).to_string()));
                return Ok(());
            }
        }

        tracing::debug!("Skipping malformed header line: {:?}", line);
        Ok(())
    }

    /// Derive the header map and flags once the header block is complete.
    fn finish(&mut self) -> Result<HandshakeInfo> {
        let mut has_content_length = false;
        let mut has_upgrade = false;
        let mut chunked = false;

        for (key, value) in &self.info.raw_headers {
            self.info.headers.insert(key.clone(), value.clone());

            match key.as_str() {
                "transfer-encoding" => chunked = value.eq_ignore_ascii_case("chunked"),
                "content-length" => {
                    let length: u64 = value
                        .trim()
                        .parse()
                        .map_err(|_| ParseErrorKind::InvalidContentLength)?;
                    if has_content_length {
                        if Some(length) != self.body_bytes {
                            return Err(ParseErrorKind::DuplicateContentLengthMismatch.into());
                        }
                    } else {
                        has_content_length = true;
                        self.body_bytes = Some(length);
                    }
                }
                "connection" => self.connection.push_str(&value.to_ascii_lowercase()),
                "upgrade" => has_upgrade = true,
                _ => {}
            }
        }

        if chunked && has_content_length {
            self.body_bytes = None;
        }

        self.info.upgrade =
            has_upgrade && self.connection.contains("upgrade") && self.info.status_code == 101;

        if chunked && self.info.upgrade {
            chunked = false;
        }

        self.info.chunked = chunked;
        self.info.content_length = self.body_bytes;
        self.info.should_keep_alive = self.should_keep_alive();
        self.state = State::Done;

        Ok(std::mem::take(&mut self.info))
    }

    fn should_keep_alive(&self) -> bool {
        let version = (self.info.version_major, self.info.version_minor);
        let persistent = if version >= (1, 1) {
            !self.connection.contains("close")
        } else {
            self.connection.contains("keep-alive")
        };
        persistent && (self.body_bytes.is_some() || self.info.chunked)
    }
}

impl Default for HandshakeParser {
    fn default() -> Self {
        Self::new()
    }
}
