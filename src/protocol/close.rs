//! Close frame payload interpretation.
//!
//! A close payload is empty, or a 2-byte big-endian status code optionally
//! followed by a UTF-8 reason. Codes are coerced to protocol error when the
//! peer sends something this engine does not recognize.
//!
//! A one-byte payload is treated as malformed and reported as 1002, not as
//! an absent code (which would report the 1000 default).

use super::wire_format::{close_code, MAX_CONTROL_PAYLOAD};
use crate::event::CloseEvent;

/// Interpret an incoming close payload.
///
/// - empty: default code, empty reason
/// - a code outside the private-use band that is not a standard code becomes
///   `PROTOCOL_ERROR`
/// - a payload over 125 bytes, a lone status byte, or a reason that is not
///   UTF-8 becomes `PROTOCOL_ERROR` regardless of the band
pub fn parse_close_payload(payload: &[u8]) -> CloseEvent {
    if payload.is_empty() {
        return CloseEvent::new(close_code::DEFAULT, "");
    }

    if payload.len() < 2 {
        return CloseEvent::new(close_code::PROTOCOL_ERROR, "");
    }

    let mut code = u16::from_be_bytes([payload[0], payload[1]]);
    let reason = if payload.len() > 2 {
        std::str::from_utf8(&payload[2..]).ok()
    } else {
        Some("")
    };

    if !close_code::is_private(code) && !close_code::is_standard(code) {
        code = close_code::PROTOCOL_ERROR;
    }

    if payload.len() > MAX_CONTROL_PAYLOAD || reason.is_none() {
        code = close_code::PROTOCOL_ERROR;
    }

    CloseEvent::new(code, reason.unwrap_or(""))
}
