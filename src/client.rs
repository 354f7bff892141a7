//! Client builder and runtime loop.
//!
//! The [`ClientBuilder`] provides a fluent API for configuring the connection.
//! The [`Client`] manages the lifecycle:
//! 1. Dial TCP (or take a caller-supplied stream)
//! 2. Spawn the writer task and the driver task
//! 3. Send the upgrade request and wait for the handshake
//! 4. Feed socket bytes and application commands to the [`Connection`]
//! 5. Broadcast events to every subscriber
//!
//! # Example
//!
//! ```ignore
//! use tcp_websocket::{Client, Event};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut client = Client::builder()
//!         .protocol("chat")
//!         .connect("ws://127.0.0.1:9001/")
//!         .await?;
//!
//!     client.send_text("hello").await?;
//!
//!     while let Some(event) = client.next_event().await {
//!         match event {
//!             Event::Message(data) => println!("{:?}", data),
//!             Event::Close(_) => break,
//!             _ => {}
//!         }
//!     }
//!     Ok(())
//! }
//! ```

use std::time::Duration;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::config::{ConnectionConfig, WsUrl};
use crate::connection::Connection;
use crate::error::{Result, WebSocketError};
use crate::event::{Event, ReadyState};
use crate::http::HandshakeInfo;
use crate::protocol::close_code;
use crate::transport::{self, Stream};
use crate::writer::{spawn_writer_task, WriterConfig, WriterHandle};

/// Default capacity of the event broadcast channel.
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Default capacity of the command channel.
pub const DEFAULT_COMMAND_CAPACITY: usize = 64;

/// Default time to wait for the peer's close frame after sending ours.
pub const DEFAULT_CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Socket read size.
const READ_BUFFER_SIZE: usize = 64 * 1024;

/// Builder for configuring and opening a WebSocket client.
pub struct ClientBuilder {
    config: ConnectionConfig,
    writer_config: WriterConfig,
    event_capacity: usize,
    close_timeout: Duration,
}

impl ClientBuilder {
    /// Create a new client builder.
    pub fn new() -> Self {
        Self {
            config: ConnectionConfig::default(),
            writer_config: WriterConfig::default(),
            event_capacity: DEFAULT_EVENT_CAPACITY,
            close_timeout: DEFAULT_CLOSE_TIMEOUT,
        }
    }

    /// Add a header to the upgrade request.
    ///
    /// Headers the handshake sets itself (`Host`, `Upgrade`, `Connection`,
    /// `Sec-WebSocket-*`) are ignored.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.headers.push((name.into(), value.into()));
        self
    }

    /// Offer a subprotocol.
    pub fn protocol(mut self, protocol: impl Into<String>) -> Self {
        self.config.protocols.push(protocol.into());
        self
    }

    /// Offer several subprotocols, in preference order.
    pub fn protocols<I, S>(mut self, protocols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config
            .protocols
            .extend(protocols.into_iter().map(Into::into));
        self
    }

    /// Set the handshake response header budget.
    ///
    /// Default: 80 KiB
    pub fn max_header_size(mut self, limit: usize) -> Self {
        self.config.max_header_size = limit;
        self
    }

    /// Set the largest accepted message, summed across fragments.
    ///
    /// Default: 0x3FFFFFF bytes
    pub fn max_message_size(mut self, limit: u64) -> Self {
        self.config.max_message_size = limit;
        self
    }

    /// Reject unmasked frames from the server.
    ///
    /// Default: false
    pub fn require_masking(mut self, required: bool) -> Self {
        self.config.require_masking = required;
        self
    }

    /// Set the writer channel capacity (at least 1).
    ///
    /// Default: 1024
    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.writer_config.channel_capacity = capacity.max(1);
        self
    }

    /// Set the event broadcast capacity (at least 1). Slow subscribers that
    /// fall further behind than this skip events.
    ///
    /// Default: 256
    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity.max(1);
        self
    }

    /// Set how long to wait for the server's close frame after sending ours.
    ///
    /// Default: 5 seconds
    pub fn close_timeout(mut self, timeout: Duration) -> Self {
        self.close_timeout = timeout;
        self
    }

    /// Dial `url` over plain TCP and complete the handshake.
    ///
    /// `wss://` URLs need a TLS stream; use [`connect_stream`](Self::connect_stream).
    pub async fn connect(self, url: &str) -> Result<Client> {
        let ws_url = WsUrl::parse(url)?;
        if ws_url.tls {
            return Err(WebSocketError::InvalidArgument(
                "wss:// requires a TLS stream; use connect_stream".to_string(),
            ));
        }
        self.config.validate()?;
        let stream = transport::connect(&ws_url.host, ws_url.port).await?;
        self.start(stream, &ws_url).await
    }

    /// Complete the handshake over an already connected stream.
    ///
    /// `url` supplies the request path and `Host` header.
    pub async fn connect_stream<S: Stream>(self, stream: S, url: &str) -> Result<Client> {
        let ws_url = WsUrl::parse(url)?;
        self.start(stream, &ws_url).await
    }

    async fn start<S: Stream>(self, stream: S, url: &WsUrl) -> Result<Client> {
        let connection = Connection::new(url, self.config)?;
        Client::start(
            connection,
            stream,
            self.writer_config,
            self.event_capacity,
            self.close_timeout,
        )
        .await
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Application request to the driver.
enum Command {
    Text(String, oneshot::Sender<Result<()>>),
    Binary(Bytes, oneshot::Sender<Result<()>>),
    Ping(Bytes, oneshot::Sender<Result<()>>),
    Pong(Bytes, oneshot::Sender<Result<()>>),
    Close(u16, String, oneshot::Sender<Result<()>>),
}

/// An open WebSocket client.
///
/// Dropping the client starts a normal close.
pub struct Client {
    /// Command channel into the driver.
    commands: mpsc::Sender<Command>,
    /// Receiver created before the driver started, so it sees every event.
    events: broadcast::Receiver<Event>,
    /// Ready state published by the driver.
    state: watch::Receiver<ReadyState>,
    /// Handshake response.
    handshake: HandshakeInfo,
    /// Negotiated subprotocol.
    protocol: Option<String>,
    /// Driver task handle.
    driver: JoinHandle<()>,
}

impl Client {
    /// Create a new client builder.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Spawn the tasks and wait for the handshake to finish.
    async fn start<S: Stream>(
        connection: Connection,
        stream: S,
        writer_config: WriterConfig,
        event_capacity: usize,
        close_timeout: Duration,
    ) -> Result<Self> {
        let (reader, write_half) = tokio::io::split(stream);
        let (writer, writer_task) = spawn_writer_task(write_half, writer_config);

        let (events_tx, events_rx) = broadcast::channel(event_capacity);
        let (commands_tx, commands_rx) = mpsc::channel(DEFAULT_COMMAND_CAPACITY);
        let (state_tx, state_rx) = watch::channel(ReadyState::Connecting);
        let (open_tx, open_rx) = oneshot::channel();

        let driver = Driver {
            connection,
            reader,
            writer: Some(writer),
            writer_task,
            commands: commands_rx,
            events: events_tx,
            state: state_tx,
            open: Some(open_tx),
            close_timeout,
            close_deadline: None,
        };
        let driver = tokio::spawn(driver.run());

        let (handshake, protocol) = match open_rx.await {
            Ok(Ok(opened)) => opened,
            Ok(Err(e)) => return Err(e),
            Err(_) => return Err(WebSocketError::ConnectionClosed),
        };

        Ok(Client {
            commands: commands_tx,
            events: events_rx,
            state: state_rx,
            handshake,
            protocol,
            driver,
        })
    }

    /// Send a text message.
    pub async fn send_text(&self, text: impl Into<String>) -> Result<()> {
        let text = text.into();
        self.request(|reply| Command::Text(text, reply)).await
    }

    /// Send a binary message.
    pub async fn send_binary(&self, data: impl Into<Bytes>) -> Result<()> {
        let data = data.into();
        self.request(|reply| Command::Binary(data, reply)).await
    }

    /// Send a ping (payload at most 125 bytes).
    pub async fn ping(&self, data: impl Into<Bytes>) -> Result<()> {
        let data = data.into();
        self.request(|reply| Command::Ping(data, reply)).await
    }

    /// Send an unsolicited pong (payload at most 125 bytes).
    pub async fn pong(&self, data: impl Into<Bytes>) -> Result<()> {
        let data = data.into();
        self.request(|reply| Command::Pong(data, reply)).await
    }

    /// Start the closing handshake.
    ///
    /// `code` must be 1000 or in 3000..=4999; `reason` at most 123 bytes.
    /// The close event arrives once the server answers.
    pub async fn close(&self, code: u16, reason: impl Into<String>) -> Result<()> {
        let reason = reason.into();
        match self
            .request(|reply| Command::Close(code, reason, reply))
            .await
        {
            // Already gone: nothing left to close.
            Err(WebSocketError::ConnectionClosed) => Ok(()),
            other => other,
        }
    }

    async fn request(&self, build: impl FnOnce(oneshot::Sender<Result<()>>) -> Command) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(build(tx))
            .await
            .map_err(|_| WebSocketError::ConnectionClosed)?;
        rx.await.map_err(|_| WebSocketError::ConnectionClosed)?
    }

    /// Next event for this client, starting with `Open`.
    ///
    /// Returns `None` after the close event once the driver has stopped.
    pub async fn next_event(&mut self) -> Option<Event> {
        loop {
            match self.events.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!("Event receiver lagged, skipped {} events", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Subscribe to events produced from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.events.resubscribe()
    }

    /// Current ready state.
    pub fn ready_state(&self) -> ReadyState {
        *self.state.borrow()
    }

    /// The server's handshake response.
    pub fn handshake(&self) -> &HandshakeInfo {
        &self.handshake
    }

    /// Subprotocol selected by the server, if any.
    pub fn protocol(&self) -> Option<&str> {
        self.protocol.as_deref()
    }

    /// Wait until the connection is closed and all frames are flushed.
    pub async fn wait_for_close(mut self) -> Result<()> {
        let _ = self.state.wait_for(|s| *s == ReadyState::Closed).await;
        if let Err(e) = (&mut self.driver).await {
            tracing::error!("Driver task failed: {}", e);
        }
        Ok(())
    }
}

type Opened = (HandshakeInfo, Option<String>);

/// Task that owns the connection.
struct Driver<R> {
    connection: Connection,
    reader: R,
    writer: Option<WriterHandle>,
    writer_task: JoinHandle<Result<()>>,
    commands: mpsc::Receiver<Command>,
    events: broadcast::Sender<Event>,
    state: watch::Sender<ReadyState>,
    /// Resolved once, when the handshake succeeds or the connection dies.
    open: Option<oneshot::Sender<Result<Opened>>>,
    close_timeout: Duration,
    close_deadline: Option<Instant>,
}

impl<R: AsyncRead + Unpin> Driver<R> {
    async fn run(mut self) {
        self.connection.on_connected();
        self.flush().await;

        let mut buf = BytesMut::with_capacity(READ_BUFFER_SIZE);
        let mut commands_open = true;

        while !self.connection.is_closed() {
            buf.reserve(READ_BUFFER_SIZE);
            let deadline = self.close_deadline;

            tokio::select! {
                read = self.reader.read_buf(&mut buf) => match read {
                    Ok(0) => self.connection.on_eof(),
                    Ok(_) => {
                        if let Err(e) = self.connection.on_data(buf.split().freeze()) {
                            tracing::debug!("Connection failed on input: {}", e);
                        }
                    }
                    Err(e) => {
                        tracing::error!("Read error: {}", e);
                        self.connection.fail(e.into());
                    }
                },
                command = self.commands.recv(), if commands_open => match command {
                    Some(command) => self.execute(command),
                    None => {
                        commands_open = false;
                        tracing::debug!("Client dropped, closing");
                        let _ = self.connection.close(close_code::NORMAL_CLOSURE, "");
                    }
                },
                _ = tokio::time::sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    tracing::warn!("Timed out waiting for the server's close frame");
                    self.connection.on_eof();
                }
            }

            self.flush().await;
        }

        // Dropping the last handle lets the writer drain and shut down.
        if let Some(writer) = self.writer.take() {
            tracing::debug!("Draining {} pending frames", writer.pending_count());
        }
        match (&mut self.writer_task).await {
            Ok(Err(e)) => tracing::debug!("Writer finished with error: {}", e),
            Err(e) => tracing::error!("Writer task failed: {}", e),
            Ok(Ok(())) => {}
        }
        tracing::debug!("Driver stopped");
    }

    fn execute(&mut self, command: Command) {
        match command {
            Command::Text(text, reply) => {
                let _ = reply.send(self.connection.send_text(&text));
            }
            Command::Binary(data, reply) => {
                let _ = reply.send(self.connection.send_binary(data));
            }
            Command::Ping(data, reply) => {
                let _ = reply.send(self.connection.ping(data));
            }
            Command::Pong(data, reply) => {
                let _ = reply.send(self.connection.pong(data));
            }
            Command::Close(code, reason, reply) => {
                let _ = reply.send(self.connection.close(code, &reason));
            }
        }
    }

    /// Hand queued frames to the writer, publish state, dispatch events.
    async fn flush(&mut self) {
        while let Some(frame) = self.connection.poll_transmit() {
            let Some(writer) = &self.writer else { break };
            if let Err(e) = writer.send(frame).await {
                tracing::error!("Writer unavailable: {}", e);
                self.connection.fail(e);
            }
        }

        let state = self.connection.ready_state();
        if state == ReadyState::Closing && self.close_deadline.is_none() {
            self.close_deadline = Some(Instant::now() + self.close_timeout);
        }
        self.state.send_replace(state);

        while let Some(event) = self.connection.poll_event() {
            self.resolve_open(&event);
            tracing::debug!("Dispatching {} event", event.name());
            // Err only means nobody is listening.
            let _ = self.events.send(event);
        }
    }

    fn resolve_open(&mut self, event: &Event) {
        let result = match event {
            Event::Open(info) => Ok((info.clone(), self.connection.protocol().map(String::from))),
            Event::Error(error) => Err((**error).clone()),
            Event::Close(_) => Err(WebSocketError::ConnectionClosed),
            _ => return,
        };
        if let Some(open) = self.open.take() {
            let _ = open.send(result);
        }
    }
}
