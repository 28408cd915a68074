//! Transport abstraction the federation client programs against.
//!
//! Keeping the handshake/proxy code behind these traits (rather than calling
//! `tokio-tungstenite` directly) is what lets the federation crate's tests
//! run against an in-memory mock peer instead of a real socket.

use crate::error::Result;
use async_trait::async_trait;

/// How strictly to verify the peer's TLS certificate on a `wss://` dial.
///
/// Defaults to [`TlsPolicy::Verified`]. Federation between cluster peers
/// using self-signed certificates needs [`TlsPolicy::InsecureSkipVerify`],
/// but that must be an explicit opt-in from configuration, never the
/// unconditional default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TlsPolicy {
    #[default]
    Verified,
    InsecureSkipVerify,
}

/// Events surfaced by a connected transport's read side.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// A text frame was received and decoded as UTF-8.
    Text(String),
    /// A pong control frame was received, carrying back whatever payload
    /// the last ping sent.
    Pong(Vec<u8>),
    /// The peer closed the connection, or the socket errored.
    Disconnected { reason: Option<String> },
}

/// Send half of a connected transport. Implementations must serialize
/// concurrent sends internally (the federation client calls this from
/// multiple async contexts under its own write mutex, but a transport
/// should not assume that discipline is the only caller).
#[async_trait]
pub trait TransportSender: Send + Sync {
    async fn send_text(&self, data: String) -> Result<()>;
    async fn send_ping(&self, payload: Vec<u8>) -> Result<()>;
    fn is_connected(&self) -> bool;
    async fn close(&self) -> Result<()>;
}

/// Receive half of a connected transport. Not `Sync`: only the owning read
/// loop ever calls `recv`.
#[async_trait]
pub trait TransportReceiver: Send {
    async fn recv(&mut self) -> Option<TransportEvent>;
}

/// Headers observed on the transport handshake response, used to check
/// feature advertisement before the signaling handshake even starts.
#[derive(Debug, Clone, Default)]
pub struct UpgradeResponse {
    features: Vec<String>,
}

impl UpgradeResponse {
    pub fn from_feature_header(value: Option<&str>) -> Self {
        let features = value
            .map(|v| v.split(',').map(|s| s.trim().to_string()).collect())
            .unwrap_or_default();
        Self { features }
    }

    pub fn has_feature(&self, feature: &str) -> bool {
        self.features.iter().any(|f| f == feature)
    }
}
