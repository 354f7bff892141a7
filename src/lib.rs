//! # tcp-websocket
//!
//! WebSocket (RFC 6455) client protocol engine running directly over a TCP
//! byte stream.
//!
//! The crate does its own HTTP/1.1 upgrade handshake and frame processing
//! instead of delegating to an HTTP or WebSocket library.
//!
//! ## Architecture
//!
//! - **Engine** ([`Connection`]): sans-io state machine. Bytes in, events and
//!   encoded frames out.
//! - **Runtime** ([`Client`]): a tokio driver task owns the connection, a
//!   writer task batches outbound frames, and events are broadcast to every
//!   subscriber.
//!
//! ## Example
//!
//! ```ignore
//! use tcp_websocket::{Client, Event, MessageData};
//!
//! #[tokio::main]
//! async fn main() -> tcp_websocket::error::Result<()> {
//!     let mut client = Client::builder().connect("ws://127.0.0.1:9001/").await?;
//!     client.send_text("hello").await?;
//!
//!     while let Some(event) = client.next_event().await {
//!         if let Event::Message(MessageData::Text(text)) = event {
//!             println!("{}", text);
//!             client.close(1000, "done").await?;
//!         }
//!     }
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod event;
pub mod http;
pub mod protocol;
pub mod transport;
pub mod writer;

mod client;
mod connection;

pub use client::{Client, ClientBuilder};
pub use config::{ConnectionConfig, WsUrl};
pub use connection::Connection;
pub use error::WebSocketError;
pub use event::{CloseEvent, Event, MessageData, ReadyState};
pub use http::HandshakeInfo;
