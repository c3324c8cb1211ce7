//! Small stateless helpers shared across the handshake and connection
//! engine: the RFC 6455 accept-value derivation, nonce generation, and a
//! monotonic millisecond clock for heartbeat bookkeeping.

use base64::prelude::*;
use sha1::{Digest, Sha1};
use std::sync::OnceLock;
use std::time::Instant;

const WEBSOCKET_MAGIC: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// `base64(sha1(key + magic))`, per RFC 6455 §1.3.
pub fn accept_value(key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(key.as_bytes());
    hasher.update(WEBSOCKET_MAGIC.as_bytes());
    BASE64_STANDARD.encode(hasher.finalize())
}

/// A fresh `Sec-WebSocket-Key`: 16 random bytes, base64-encoded.
pub fn generate_websocket_key() -> String {
    let nonce: [u8; 16] = rand::random();
    BASE64_STANDARD.encode(nonce)
}

fn process_start() -> Instant {
    static START: OnceLock<Instant> = OnceLock::new();
    *START.get_or_init(Instant::now)
}

/// Milliseconds since this process started the connection engine. Only
/// ever used for relative comparisons (heartbeat cadence), never wall time.
pub fn monotonic_ms() -> u64 {
    process_start().elapsed().as_millis() as u64
}
