//! Byte payloads at the host boundary.
//!
//! Bytes travel as standard padded base64 (RFC 4648) in both directions.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use core_bridge::BridgeError;

pub fn encode(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

pub fn decode(field: &str, encoded: &str) -> Result<Vec<u8>, BridgeError> {
    STANDARD
        .decode(encoded)
        .map_err(|e| BridgeError::InvalidPayload(format!("{} is not valid base64: {}", field, e)))
}
