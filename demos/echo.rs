//! Echo client demo.
//!
//! Connects to a WebSocket echo server, sends a few messages, prints what
//! comes back and closes.
//!
//! ```text
//! cargo run --example echo -- ws://127.0.0.1:9001/
//! ```

use std::time::Duration;

use tcp_websocket::{Client, Event, MessageData};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let url = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "ws://127.0.0.1:9001/".to_string());

    let mut client = Client::builder()
        .header("User-Agent", "tcp-websocket-echo")
        .close_timeout(Duration::from_secs(2))
        .connect(&url)
        .await?;

    println!("connected to {} (protocol: {:?})", url, client.protocol());

    client.send_text("hello").await?;
    client.send_binary(vec![0xde, 0xad, 0xbe, 0xef]).await?;
    client.ping("are you there?").await?;

    let mut received = 0;
    while let Some(event) = client.next_event().await {
        match event {
            Event::Open(info) => println!("open: {} {}", info.status_code, info.status_message),
            Event::Message(MessageData::Text(text)) => {
                println!("text: {}", text);
                received += 1;
            }
            Event::Message(MessageData::Binary(data)) => {
                println!("binary: {:02x?}", &data[..]);
                received += 1;
            }
            Event::Pong(data) => println!("pong: {:?}", data),
            Event::Ping(data) => println!("ping: {:?}", data),
            Event::Error(error) => eprintln!("error: {}", error),
            Event::Close(close) => {
                println!("closed: {} {:?}", close.code, close.reason);
                break;
            }
        }

        if received == 2 {
            client.close(1000, "done").await?;
            received += 1;
        }
    }

    Ok(())
}
