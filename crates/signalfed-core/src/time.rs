//! Monotonic timestamp helpers used for ping payloads.

use std::time::{SystemTime, UNIX_EPOCH};

/// Current time as nanoseconds since the Unix epoch, ASCII-decimal encoded.
///
/// Ping frames carry this as their payload so a peer's pong can be matched
/// back to an approximate round-trip time for diagnostics; the federation
/// client itself only cares that *a* pong arrived, not the value.
pub fn now_nanos() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos()
}

pub fn now_nanos_ascii() -> String {
    now_nanos().to_string()
}
