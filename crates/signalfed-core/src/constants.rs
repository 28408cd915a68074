//! Protocol-wide constants shared across transports.

/// Signaling protocol version advertised in `hello` messages.
pub const PROTOCOL_VERSION: &str = "2.0";

/// Feature token a peer must advertise in `welcome` for federation to proceed.
pub const FEATURE_FEDERATION: &str = "federation";

/// WebSocket subprotocol negotiated on connect.
pub const WS_SUBPROTOCOL: &str = "signalfed";

/// Maximum size, in bytes, of a single inbound frame before it is treated
/// as a fatal read error. Shared by every component that reads frames off
/// a signaling transport.
pub const MAX_FRAME_SIZE: usize = 256 * 1024;
