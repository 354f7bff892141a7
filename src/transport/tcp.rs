//! Plain TCP transport.
//!
//! # Example
//!
//! ```ignore
//! use tcp_websocket::transport::connect;
//!
//! let stream = connect("example.com", 80).await?;
//! ```

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

use crate::error::Result;

/// Any byte stream the client can run over.
pub trait Stream: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

impl<T> Stream for T where T: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

/// Dial `host:port` over TCP.
///
/// Nagle's algorithm is disabled since frames are already batched by the
/// writer task.
pub async fn connect(host: &str, port: u16) -> Result<TcpStream> {
    let stream = TcpStream::connect((host, port)).await?;
    stream.set_nodelay(true)?;
    tracing::debug!(
        "Connected to {}:{} from {:?}",
        host,
        port,
        stream.local_addr().ok()
    );
    Ok(stream)
}
