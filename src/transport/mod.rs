//! Transport module - the byte stream under the protocol engine.
//!
//! The engine only needs an ordered, reliable byte stream. Plain TCP is
//! dialed here; any other `AsyncRead + AsyncWrite` stream (TLS, an in-memory
//! duplex) can be handed to the client directly.

mod tcp;

pub use tcp::{connect, Stream};
