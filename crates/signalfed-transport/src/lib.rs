//! Outbound WebSocket transport used by the federation client to dial a
//! peer signaling server.

pub mod error;
pub mod traits;
pub mod websocket;

pub use error::{Result, TransportError};
pub use traits::{TlsPolicy, TransportEvent, TransportReceiver, TransportSender, UpgradeResponse};
pub use websocket::{connect, WebSocketReceiver, WebSocketSender, FEATURE_HEADER};
