//! Sans-io connection state machine.
//!
//! A [`Connection`] never touches a socket. The runtime feeds it inbound
//! bytes and application calls; it answers with [`Event`]s and encoded
//! [`OutboundFrame`]s, drained with [`Connection::poll_event`] and
//! [`Connection::poll_transmit`].
//!
//! # Lifecycle
//!
//! ```text
//! Connecting ──(101 + accept)──► Open ──(close sent)──► Closing ──► Closed
//!      │                          │                                  ▲
//!      └──────────(fail / close / peer close / eof)──────────────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use tcp_websocket::config::{ConnectionConfig, WsUrl};
//! use tcp_websocket::{Connection, Event, ReadyState};
//!
//! let url = WsUrl::parse("ws://example.com/chat").unwrap();
//! let mut conn = Connection::new(&url, ConnectionConfig::default()).unwrap();
//! conn.on_connected();
//!
//! // The upgrade request is the first thing to write.
//! let request = conn.poll_transmit().unwrap();
//! assert!(request.header.starts_with(b"GET /chat HTTP/1.1\r\n"));
//! assert_eq!(conn.ready_state(), ReadyState::Connecting);
//!
//! // Closing before the handshake completes needs no wire traffic.
//! conn.close(1000, "").unwrap();
//! assert!(matches!(conn.poll_event(), Some(Event::Close(_))));
//! assert!(conn.poll_transmit().is_none());
//! ```

use std::collections::VecDeque;
use std::sync::Arc;

use bytes::Bytes;

use crate::config::{ConnectionConfig, WsUrl};
use crate::error::{Result, WebSocketError};
use crate::event::{CloseEvent, Event, ReadyState};
use crate::http::{HandshakeParser, UpgradeRequest};
use crate::protocol::{
    build_frame, close_code, generate_mask_key, parse_close_payload, Frame, FrameDecoder,
    MessageAssembler, Opcode, MAX_CONTROL_PAYLOAD,
};
use crate::writer::OutboundFrame;

/// Longest close reason that fits a control frame next to the status code.
pub const MAX_CLOSE_REASON: usize = MAX_CONTROL_PAYLOAD - 2;

/// One client WebSocket connection.
#[derive(Debug)]
pub struct Connection {
    request: UpgradeRequest,
    ready_state: ReadyState,
    parser: HandshakeParser,
    decoder: FrameDecoder,
    assembler: MessageAssembler,
    protocol: Option<String>,
    request_sent: bool,
    events: VecDeque<Event>,
    transmit: VecDeque<OutboundFrame>,
}

impl Connection {
    /// Create a connection to `url` with a fresh random handshake key.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` if the configured subprotocols are malformed, or
    /// `Entropy` if no key could be generated.
    pub fn new(url: &WsUrl, config: ConnectionConfig) -> Result<Self> {
        config.validate()?;
        let request = UpgradeRequest::new(url.path.clone(), url.host_header())?;
        Ok(Self::with_request(request, &config))
    }

    /// Create a connection around a prepared upgrade request.
    ///
    /// The configured headers and subprotocols are applied to `request`.
    pub fn with_request(request: UpgradeRequest, config: &ConnectionConfig) -> Self {
        let request = request
            .headers(&config.headers)
            .protocols(&config.protocols);
        Self {
            request,
            ready_state: ReadyState::Connecting,
            parser: HandshakeParser::with_max_header_size(config.max_header_size),
            decoder: FrameDecoder::with_limits(config.max_message_size, config.require_masking),
            assembler: MessageAssembler::new(),
            protocol: None,
            request_sent: false,
            events: VecDeque::new(),
            transmit: VecDeque::new(),
        }
    }

    /// Current ready state.
    #[inline]
    pub fn ready_state(&self) -> ReadyState {
        self.ready_state
    }

    /// Whether the connection has reached its terminal state.
    #[inline]
    pub fn is_closed(&self) -> bool {
        self.ready_state == ReadyState::Closed
    }

    /// The `Sec-WebSocket-Key` sent in the upgrade request.
    pub fn key(&self) -> &str {
        self.request.key()
    }

    /// Subprotocol selected by the server, once open.
    pub fn protocol(&self) -> Option<&str> {
        self.protocol.as_deref()
    }

    /// Next pending event, in the order produced.
    pub fn poll_event(&mut self) -> Option<Event> {
        self.events.pop_front()
    }

    /// Next frame to write to the socket, in send order.
    pub fn poll_transmit(&mut self) -> Option<OutboundFrame> {
        self.transmit.pop_front()
    }

    /// The transport is connected: queue the upgrade request.
    pub fn on_connected(&mut self) {
        if self.ready_state != ReadyState::Connecting || self.request_sent {
            return;
        }
        self.request_sent = true;
        tracing::debug!("Sending upgrade request");
        self.transmit
            .push_back(OutboundFrame::raw(self.request.to_bytes()));
    }

    /// Feed bytes read from the socket.
    ///
    /// While connecting these are handshake response bytes; anything left
    /// over after the header block goes straight to the frame decoder.
    ///
    /// # Errors
    ///
    /// Returns the error that failed the connection. The matching error and
    /// close events have already been queued by then.
    pub fn on_data(&mut self, data: Bytes) -> Result<()> {
        match self.ready_state {
            ReadyState::Connecting => self.on_handshake_data(data),
            ReadyState::Open | ReadyState::Closing => {
                self.decoder.put(data);
                self.process_frames()
            }
            ReadyState::Closed => Ok(()),
        }
    }

    /// The peer closed the transport.
    ///
    /// Without a completed close handshake this is an abnormal closure.
    pub fn on_eof(&mut self) {
        if self.ready_state == ReadyState::Closed {
            return;
        }
        tracing::debug!("Transport closed in state {:?}", self.ready_state);
        self.reset_input();
        self.ready_state = ReadyState::Closed;
        self.events
            .push_back(Event::Close(CloseEvent::new(close_code::ABNORMAL, "")));
    }

    /// Send a text message.
    pub fn send_text(&mut self, text: &str) -> Result<()> {
        self.send_frame(Opcode::Text, Bytes::copy_from_slice(text.as_bytes()))
    }

    /// Send a binary message.
    pub fn send_binary(&mut self, data: Bytes) -> Result<()> {
        self.send_frame(Opcode::Binary, data)
    }

    /// Send a ping. The payload is limited to 125 bytes.
    pub fn ping(&mut self, data: Bytes) -> Result<()> {
        check_control_payload(&data)?;
        self.send_frame(Opcode::Ping, data)
    }

    /// Send an unsolicited pong. The payload is limited to 125 bytes.
    pub fn pong(&mut self, data: Bytes) -> Result<()> {
        check_control_payload(&data)?;
        self.send_frame(Opcode::Pong, data)
    }

    /// Start the closing handshake.
    ///
    /// `code` must be 1000 or in 3000..=4999 and `reason` at most 123 bytes.
    /// Before the handshake completes the connection closes immediately
    /// without touching the wire; once closing or closed this is a no-op.
    pub fn close(&mut self, code: u16, reason: &str) -> Result<()> {
        if code != close_code::NORMAL_CLOSURE && !close_code::is_private(code) {
            return Err(WebSocketError::InvalidArgument(format!(
                "Close code must be 1000 or between 3000 and 4999, got {}",
                code
            )));
        }
        if reason.len() > MAX_CLOSE_REASON {
            return Err(WebSocketError::InvalidArgument(format!(
                "Close reason must not exceed {} bytes",
                MAX_CLOSE_REASON
            )));
        }

        match self.ready_state {
            ReadyState::Connecting => {
                tracing::debug!("Closed before handshake completed");
                self.reset_input();
                self.ready_state = ReadyState::Closed;
                self.events
                    .push_back(Event::Close(CloseEvent::new(code, reason)));
            }
            ReadyState::Open => {
                tracing::debug!("Sending close frame: {} {:?}", code, reason);
                let frame = Frame::close(code, reason).encode(generate_mask_key()?);
                self.ready_state = ReadyState::Closing;
                self.transmit.push_back(frame);
            }
            ReadyState::Closing | ReadyState::Closed => {}
        }
        Ok(())
    }

    /// Fail the connection with `error`.
    ///
    /// Queues a close frame if the connection was open, then an error event
    /// followed by the close event. Does nothing once closing or closed.
    pub fn fail(&mut self, error: WebSocketError) {
        if self.ready_state > ReadyState::Open {
            return;
        }
        tracing::warn!("Failing connection: {}", error);
        let code = error.close_code();
        let reason = truncate_reason(error.message());
        self.shutdown(code, &reason, Some(error));
    }

    fn on_handshake_data(&mut self, data: Bytes) -> Result<()> {
        let parsed = match self.parser.execute(&data) {
            Ok(parsed) => parsed,
            Err(e) => return Err(self.fail_with(e)),
        };

        let Some(info) = parsed.info else {
            return Ok(());
        };

        match self.request.validate_response(&info) {
            Ok(protocol) => self.protocol = protocol,
            Err(e) => return Err(self.fail_with(e)),
        }

        tracing::debug!(
            "Handshake complete: status {}, protocol {:?}",
            info.status_code,
            self.protocol
        );
        self.ready_state = ReadyState::Open;
        self.events.push_back(Event::Open(info));

        let rest = data.slice(parsed.consumed..);
        if rest.is_empty() {
            return Ok(());
        }
        self.decoder.put(rest);
        self.process_frames()
    }

    /// Decode and dispatch every complete frame currently buffered.
    fn process_frames(&mut self) -> Result<()> {
        while !self.is_closed() {
            let frame = match self.decoder.next_frame(self.assembler.open_length()) {
                Ok(Some(frame)) => frame,
                Ok(None) => return Ok(()),
                Err(e) => return Err(self.fail_with(e)),
            };
            if let Err(e) = self.handle_frame(frame) {
                return Err(self.fail_with(e));
            }
        }
        Ok(())
    }

    fn handle_frame(&mut self, frame: Frame) -> Result<()> {
        match frame.opcode {
            Opcode::Continuation | Opcode::Text | Opcode::Binary => {
                if let Some(message) = self.assembler.push(frame)? {
                    let data = message.into_data()?;
                    tracing::debug!("Dispatching message ({} bytes)", data.as_bytes().len());
                    self.events.push_back(Event::Message(data));
                }
            }
            Opcode::Close => {
                let event = parse_close_payload(&frame.payload);
                tracing::debug!("Received close frame: {} {:?}", event.code, event.reason);
                self.shutdown(event.code, &event.reason, None);
            }
            Opcode::Ping => {
                self.transmit
                    .push_back(build_frame(Opcode::Pong, frame.payload.clone())?);
                self.events.push_back(Event::Ping(frame.payload));
            }
            Opcode::Pong => {
                self.events.push_back(Event::Pong(frame.payload));
            }
        }
        Ok(())
    }

    fn send_frame(&mut self, opcode: Opcode, payload: Bytes) -> Result<()> {
        match self.ready_state {
            ReadyState::Connecting => Err(WebSocketError::InvalidArgument(
                "Connection is still connecting".to_string(),
            )),
            ReadyState::Open => {
                self.transmit.push_back(build_frame(opcode, payload)?);
                Ok(())
            }
            ReadyState::Closing | ReadyState::Closed => Err(WebSocketError::ConnectionClosed),
        }
    }

    /// Fail and hand the error back for the caller.
    fn fail_with(&mut self, error: WebSocketError) -> WebSocketError {
        self.fail(error.clone());
        error
    }

    /// Terminal sequence shared by peer close and failure.
    fn shutdown(&mut self, code: u16, reason: &str, error: Option<WebSocketError>) {
        self.reset_input();

        let send_close = self.ready_state == ReadyState::Open;
        self.ready_state = ReadyState::Closing;

        // 1006 means the wire is unusable; it is never sent.
        if send_close && code != close_code::ABNORMAL {
            match generate_mask_key() {
                Ok(key) => self.transmit.push_back(Frame::close(code, reason).encode(key)),
                Err(e) => tracing::error!("Could not mask close frame: {}", e),
            }
        }

        self.ready_state = ReadyState::Closed;

        if let Some(error) = error {
            self.events.push_back(Event::Error(Arc::new(error)));
        }
        self.events
            .push_back(Event::Close(CloseEvent::new(code, reason)));
    }

    fn reset_input(&mut self) {
        self.decoder.close();
        self.assembler.clear();
    }
}

fn check_control_payload(data: &[u8]) -> Result<()> {
    if data.len() > MAX_CONTROL_PAYLOAD {
        return Err(WebSocketError::InvalidArgument(format!(
            "Control frame payload must not exceed {} bytes",
            MAX_CONTROL_PAYLOAD
        )));
    }
    Ok(())
}

/// Cut `reason` to fit a close frame, on a character boundary.
fn truncate_reason(mut reason: String) -> String {
    if reason.len() > MAX_CLOSE_REASON {
        let mut end = MAX_CLOSE_REASON;
        while !reason.is_char_boundary(end) {
            end -= 1;
        }
        reason.truncate(end);
    }
    reason
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::MessageData;
    use crate::http::compute_accept_key;
    use crate::protocol::apply_mask;

    const KEY: &str = "dGhlIHNhbXBsZSBub25jZQ==";

    fn connection(config: ConnectionConfig) -> Connection {
        let request = UpgradeRequest::with_key("/", "example.com", KEY);
        let mut conn = Connection::with_request(request, &config);
        conn.on_connected();
        conn
    }

    fn response(extra: &str) -> Bytes {
        Bytes::from(format!(
            "HTTP/1.1 101 Switching Protocols\r\n\
             Upgrade: websocket\r\n\
             Connection: Upgrade\r\n\
             Sec-WebSocket-Accept: {}\r\n\
             {}\r\n",
            compute_accept_key(KEY),
            extra
        ))
    }

    /// An open connection with the request already drained.
    fn open() -> Connection {
        let mut conn = connection(ConnectionConfig::default());
        conn.poll_transmit().unwrap();
        conn.on_data(response("")).unwrap();
        assert!(matches!(conn.poll_event(), Some(Event::Open(_))));
        conn
    }

    /// Unmasked server frame.
    fn server_frame(first: u8, payload: &[u8]) -> Bytes {
        assert!(payload.len() <= 125);
        let mut out = vec![first, payload.len() as u8];
        out.extend_from_slice(payload);
        Bytes::from(out)
    }

    fn events(conn: &mut Connection) -> Vec<Event> {
        std::iter::from_fn(|| conn.poll_event()).collect()
    }

    /// Opcode and unmasked payload of a client frame.
    fn decode_client(frame: &OutboundFrame) -> (u8, Vec<u8>) {
        let header = &frame.header;
        assert_ne!(header[1] & 0x80, 0, "client frames are masked");
        let key = [
            header[header.len() - 4],
            header[header.len() - 3],
            header[header.len() - 2],
            header[header.len() - 1],
        ];
        let mut payload = frame.payload.to_vec();
        apply_mask(&mut payload, key);
        (header[0], payload)
    }

    #[test]
    fn test_request_queued_once() {
        let mut conn = connection(ConnectionConfig::default());
        let request = conn.poll_transmit().unwrap();
        let text = String::from_utf8(request.to_vec()).unwrap();
        assert!(text.starts_with("GET / HTTP/1.1\r\n"));
        assert!(text.contains(&format!("Sec-WebSocket-Key: {}\r\n", KEY)));

        conn.on_connected();
        assert!(conn.poll_transmit().is_none());
    }

    #[test]
    fn test_handshake_opens() {
        let mut conn = connection(ConnectionConfig::default());
        conn.on_data(response("")).unwrap();

        assert_eq!(conn.ready_state(), ReadyState::Open);
        match conn.poll_event() {
            Some(Event::Open(info)) => {
                assert_eq!(info.status_code, 101);
                assert!(info.upgrade);
            }
            other => panic!("expected open, got {:?}", other),
        }
    }

    #[test]
    fn test_handshake_split_byte_by_byte() {
        let mut conn = connection(ConnectionConfig::default());
        let bytes = response("");
        for i in 0..bytes.len() {
            conn.on_data(bytes.slice(i..i + 1)).unwrap();
        }
        assert_eq!(conn.ready_state(), ReadyState::Open);
    }

    #[test]
    fn test_leftover_handshake_bytes_decoded() {
        let mut conn = connection(ConnectionConfig::default());
        let mut bytes = response("").to_vec();
        bytes.extend_from_slice(&server_frame(0x81, b"early"));
        conn.on_data(Bytes::from(bytes)).unwrap();

        let events = events(&mut conn);
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], Event::Open(_)));
        match &events[1] {
            Event::Message(MessageData::Text(text)) => assert_eq!(text, "early"),
            other => panic!("expected message, got {:?}", other),
        }
    }

    #[test]
    fn test_handshake_without_upgrade_rejected() {
        let mut conn = connection(ConnectionConfig::default());
        conn.poll_transmit().unwrap();
        let err = conn
            .on_data(Bytes::from_static(
                b"HTTP/1.1 101 Switching Protocols\r\nUpgrade: websocket\r\n\r\n",
            ))
            .unwrap_err();
        assert!(matches!(err, WebSocketError::HandshakeRejected(_)));

        assert_eq!(conn.ready_state(), ReadyState::Closed);
        let events = events(&mut conn);
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], Event::Error(_)));
        match &events[1] {
            Event::Close(close) => assert_eq!(close.code, 1006),
            other => panic!("expected close, got {:?}", other),
        }
        assert!(conn.poll_transmit().is_none());
    }

    #[test]
    fn test_handshake_bad_accept_rejected() {
        let mut conn = connection(ConnectionConfig::default());
        let err = conn
            .on_data(Bytes::from_static(
                b"HTTP/1.1 101 Switching Protocols\r\nUpgrade: websocket\r\nConnection: Upgrade\r\nSec-WebSocket-Accept: bogus\r\n\r\n",
            ))
            .unwrap_err();
        assert!(matches!(err, WebSocketError::HandshakeRejected(_)));
        assert!(conn.is_closed());
    }

    #[test]
    fn test_handshake_parse_error() {
        let mut conn = connection(ConnectionConfig::default());
        let err = conn
            .on_data(Bytes::from_static(b"SSH-2.0-OpenSSH\r\n"))
            .unwrap_err();
        assert!(matches!(err, WebSocketError::HandshakeParse(_)));
        assert!(conn.is_closed());
    }

    #[test]
    fn test_handshake_header_budget() {
        let config = ConnectionConfig {
            max_header_size: 64,
            ..ConnectionConfig::default()
        };
        let mut conn = connection(config);
        let err = conn.on_data(response("X-Padding: aaaaaaaaaaaaaaaa\r\n")).unwrap_err();
        assert!(matches!(err, WebSocketError::SizeLimit(_)));
        assert!(conn.is_closed());
    }

    #[test]
    fn test_selected_protocol() {
        let config = ConnectionConfig {
            protocols: vec!["chat".to_string()],
            ..ConnectionConfig::default()
        };
        let mut conn = connection(config);
        conn.on_data(response("Sec-WebSocket-Protocol: chat\r\n"))
            .unwrap();
        assert_eq!(conn.protocol(), Some("chat"));
    }

    #[test]
    fn test_unoffered_protocol_rejected() {
        let mut conn = connection(ConnectionConfig::default());
        let err = conn
            .on_data(response("Sec-WebSocket-Protocol: chat\r\n"))
            .unwrap_err();
        assert!(matches!(err, WebSocketError::HandshakeRejected(_)));
    }

    #[test]
    fn test_fragmented_message() {
        let mut conn = open();
        conn.on_data(server_frame(0x01, b"hel")).unwrap();
        conn.on_data(server_frame(0x00, b"lo ")).unwrap();
        assert!(conn.poll_event().is_none());
        conn.on_data(server_frame(0x80, b"world")).unwrap();

        match conn.poll_event() {
            Some(Event::Message(MessageData::Text(text))) => assert_eq!(text, "hello world"),
            other => panic!("expected message, got {:?}", other),
        }
    }

    #[test]
    fn test_control_frame_between_fragments() {
        let mut conn = open();
        conn.on_data(server_frame(0x02, b"ab")).unwrap();
        conn.on_data(server_frame(0x89, b"hb")).unwrap();
        conn.on_data(server_frame(0x80, b"cd")).unwrap();

        let events = events(&mut conn);
        assert!(matches!(&events[0], Event::Ping(p) if &p[..] == b"hb"));
        assert!(
            matches!(&events[1], Event::Message(MessageData::Binary(b)) if &b[..] == b"abcd")
        );
    }

    #[test]
    fn test_ping_auto_pong() {
        let mut conn = open();
        conn.on_data(server_frame(0x89, b"are you there")).unwrap();

        let pong = conn.poll_transmit().unwrap();
        let (first, payload) = decode_client(&pong);
        assert_eq!(first, 0x8A);
        assert_eq!(payload, b"are you there");
        assert!(matches!(conn.poll_event(), Some(Event::Ping(_))));
        assert_eq!(conn.ready_state(), ReadyState::Open);
    }

    #[test]
    fn test_pong_event() {
        let mut conn = open();
        conn.on_data(server_frame(0x8A, b"x")).unwrap();
        assert!(matches!(conn.poll_event(), Some(Event::Pong(p)) if &p[..] == b"x"));
        assert!(conn.poll_transmit().is_none());
    }

    #[test]
    fn test_unknown_opcode_fails() {
        let mut conn = open();
        let err = conn.on_data(server_frame(0x83, b"x")).unwrap_err();
        assert!(matches!(err, WebSocketError::Protocol(_)));

        let events = events(&mut conn);
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], Event::Error(_)));
        match &events[1] {
            Event::Close(close) => {
                assert_eq!(close.code, 1002);
                assert_eq!(close.reason, "Unrecognized frame opcode: 3");
            }
            other => panic!("expected close, got {:?}", other),
        }

        let close = conn.poll_transmit().unwrap();
        let (first, payload) = decode_client(&close);
        assert_eq!(first, 0x88);
        assert_eq!(&payload[..2], &1002u16.to_be_bytes());
    }

    #[test]
    fn test_invalid_utf8_fails_with_1007() {
        let mut conn = open();
        let err = conn.on_data(server_frame(0x81, &[0xff])).unwrap_err();
        assert!(matches!(err, WebSocketError::Encoding(_)));
        let events = events(&mut conn);
        assert!(matches!(&events[1], Event::Close(c) if c.code == 1007));
    }

    #[test]
    fn test_message_size_limit() {
        let config = ConnectionConfig {
            max_message_size: 4,
            ..ConnectionConfig::default()
        };
        let mut conn = connection(config);
        conn.on_data(response("")).unwrap();
        conn.on_data(server_frame(0x02, b"abc")).unwrap();
        let err = conn.on_data(server_frame(0x80, b"de")).unwrap_err();
        assert!(matches!(err, WebSocketError::SizeLimit(_)));
        assert!(conn.is_closed());
    }

    #[test]
    fn test_require_masking() {
        let config = ConnectionConfig {
            require_masking: true,
            ..ConnectionConfig::default()
        };
        let mut conn = connection(config);
        conn.on_data(response("")).unwrap();
        let err = conn.on_data(server_frame(0x81, b"x")).unwrap_err();
        assert!(matches!(err, WebSocketError::Unacceptable(_)));
        let events = events(&mut conn);
        assert!(matches!(events.last(), Some(Event::Close(c)) if c.code == 1003));
    }

    #[test]
    fn test_peer_close_echoed() {
        let mut conn = open();
        conn.on_data(server_frame(0x88, &[0x03, 0xe8, b'b', b'y', b'e']))
            .unwrap();

        assert_eq!(conn.ready_state(), ReadyState::Closed);
        match conn.poll_event() {
            Some(Event::Close(close)) => {
                assert_eq!(close.code, 1000);
                assert_eq!(close.reason, "bye");
            }
            other => panic!("expected close, got {:?}", other),
        }

        let echo = conn.poll_transmit().unwrap();
        let (first, payload) = decode_client(&echo);
        assert_eq!(first, 0x88);
        assert_eq!(payload, [0x03, 0xe8, b'b', b'y', b'e']);
    }

    #[test]
    fn test_empty_peer_close() {
        let mut conn = open();
        conn.on_data(server_frame(0x88, b"")).unwrap();
        assert!(matches!(conn.poll_event(), Some(Event::Close(c)) if c.code == 1000 && c.reason.is_empty()));
    }

    #[test]
    fn test_client_initiated_close() {
        let mut conn = open();
        conn.close(1000, "done").unwrap();
        assert_eq!(conn.ready_state(), ReadyState::Closing);

        let frame = conn.poll_transmit().unwrap();
        let (first, payload) = decode_client(&frame);
        assert_eq!(first, 0x88);
        assert_eq!(&payload[2..], b"done");

        // Sends are refused while closing.
        assert!(matches!(
            conn.send_text("late"),
            Err(WebSocketError::ConnectionClosed)
        ));
        // A second close is a no-op.
        conn.close(1000, "").unwrap();
        assert!(conn.poll_transmit().is_none());

        conn.on_data(server_frame(0x88, &[0x03, 0xe8])).unwrap();
        assert_eq!(conn.ready_state(), ReadyState::Closed);
        assert!(matches!(conn.poll_event(), Some(Event::Close(c)) if c.code == 1000));
        // No echo once we initiated.
        assert!(conn.poll_transmit().is_none());
    }

    #[test]
    fn test_messages_still_delivered_while_closing() {
        let mut conn = open();
        conn.close(3001, "").unwrap();
        conn.on_data(server_frame(0x81, b"in flight")).unwrap();
        assert!(matches!(conn.poll_event(), Some(Event::Message(_))));
    }

    #[test]
    fn test_close_validation() {
        let mut conn = open();
        assert!(matches!(
            conn.close(1001, ""),
            Err(WebSocketError::InvalidArgument(_))
        ));
        assert!(matches!(
            conn.close(5000, ""),
            Err(WebSocketError::InvalidArgument(_))
        ));
        let long = "x".repeat(124);
        assert!(matches!(
            conn.close(1000, &long),
            Err(WebSocketError::InvalidArgument(_))
        ));
        assert_eq!(conn.ready_state(), ReadyState::Open);
        assert!(conn.close(4999, &"x".repeat(123)).is_ok());
    }

    #[test]
    fn test_close_while_connecting() {
        let mut conn = connection(ConnectionConfig::default());
        conn.poll_transmit().unwrap();
        conn.close(3000, "never mind").unwrap();

        assert!(conn.is_closed());
        assert!(matches!(conn.poll_event(), Some(Event::Close(c)) if c.code == 3000 && c.reason == "never mind"));
        assert!(conn.poll_transmit().is_none());

        // Late handshake bytes are ignored.
        conn.on_data(response("")).unwrap();
        assert!(conn.poll_event().is_none());
    }

    #[test]
    fn test_send_states() {
        let mut conn = connection(ConnectionConfig::default());
        assert!(matches!(
            conn.send_text("early"),
            Err(WebSocketError::InvalidArgument(_))
        ));

        conn.poll_transmit().unwrap();
        conn.on_data(response("")).unwrap();

        conn.send_text("hello").unwrap();
        let (first, payload) = decode_client(&conn.poll_transmit().unwrap());
        assert_eq!(first, 0x81);
        assert_eq!(payload, b"hello");

        conn.send_binary(Bytes::from_static(&[1, 2, 3])).unwrap();
        let (first, payload) = decode_client(&conn.poll_transmit().unwrap());
        assert_eq!(first, 0x82);
        assert_eq!(payload, [1, 2, 3]);

        conn.ping(Bytes::from_static(b"p")).unwrap();
        assert_eq!(decode_client(&conn.poll_transmit().unwrap()).0, 0x89);
        conn.pong(Bytes::from_static(b"p")).unwrap();
        assert_eq!(decode_client(&conn.poll_transmit().unwrap()).0, 0x8A);
    }

    #[test]
    fn test_control_payload_limit() {
        let mut conn = open();
        let big = Bytes::from(vec![0u8; 126]);
        assert!(matches!(
            conn.ping(big.clone()),
            Err(WebSocketError::InvalidArgument(_))
        ));
        assert!(matches!(
            conn.pong(big),
            Err(WebSocketError::InvalidArgument(_))
        ));
        assert!(conn.ping(Bytes::from(vec![0u8; 125])).is_ok());
    }

    #[test]
    fn test_fail_is_noop_once_closing() {
        let mut conn = open();
        conn.close(1000, "").unwrap();
        conn.poll_transmit().unwrap();
        conn.fail(WebSocketError::Protocol("late".into()));
        assert!(conn.poll_event().is_none());
        assert!(conn.poll_transmit().is_none());
        assert_eq!(conn.ready_state(), ReadyState::Closing);
    }

    #[test]
    fn test_io_failure_sends_nothing() {
        let mut conn = open();
        conn.fail(WebSocketError::from(std::io::Error::new(
            std::io::ErrorKind::ConnectionReset,
            "reset",
        )));
        assert!(conn.poll_transmit().is_none());
        let events = events(&mut conn);
        assert!(matches!(events[0], Event::Error(_)));
        assert!(matches!(&events[1], Event::Close(c) if c.code == 1006));
    }

    #[test]
    fn test_eof_is_abnormal() {
        let mut conn = open();
        conn.on_eof();
        assert!(conn.is_closed());
        let events = events(&mut conn);
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], Event::Close(c) if c.code == 1006 && c.reason.is_empty()));

        // Only one close event, ever.
        conn.on_eof();
        conn.fail(WebSocketError::Protocol("x".into()));
        assert!(conn.poll_event().is_none());
    }

    #[test]
    fn test_input_discarded_after_close() {
        let mut conn = open();
        let mut bytes = server_frame(0x88, b"").to_vec();
        bytes.extend_from_slice(&server_frame(0x81, b"after"));
        conn.on_data(Bytes::from(bytes)).unwrap();

        let events = events(&mut conn);
        assert_eq!(events.len(), 1);
        assert!(events[0].is_close());
    }

    #[test]
    fn test_truncate_reason() {
        assert_eq!(truncate_reason("short".to_string()), "short");
        let long = "é".repeat(100);
        let cut = truncate_reason(long);
        assert!(cut.len() <= MAX_CLOSE_REASON);
        assert_eq!(cut.len(), 122);
    }
}
