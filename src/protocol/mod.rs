//! Protocol module - RFC 6455 framing.
//!
//! This module implements the frame layer of the connection:
//! - Chunked byte queue for exact-size reads
//! - Staged frame decoder
//! - Message reassembly across continuation frames
//! - Masked frame encoder
//! - Close payload interpretation

mod byte_queue;
mod close;
mod decoder;
mod frame;
mod message;
mod wire_format;

pub use byte_queue::ByteQueue;
pub use close::parse_close_payload;
pub use decoder::FrameDecoder;
pub use frame::{build_close_frame, build_frame, generate_mask_key, Frame};
pub use message::{Message, MessageAssembler};
pub use wire_format::{
    apply_mask, bits, close_code, Opcode, DEFAULT_MAX_MESSAGE_SIZE, MAX_CONTROL_PAYLOAD,
    MAX_HEADER_SIZE,
};
