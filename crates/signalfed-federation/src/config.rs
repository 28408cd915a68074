//! Configuration and input types for creating a [`crate::FederationClient`].

use std::time::Duration;

pub use signalfed_transport::TlsPolicy;

/// Maximum number of hello retries on correlation-id mismatch before the
/// handshake gives up. Unbounded in the original design; bounded here so a
/// misbehaving peer cannot trap the state machine forever (see design notes).
pub const MAX_HELLO_RETRIES: u32 = 3;

/// How often the write/keepalive loop emits a ping.
pub const DEFAULT_PING_PERIOD: Duration = Duration::from_secs(10);

/// How long the read loop will wait for *any* frame (including a pong)
/// before treating the connection as dead.
pub const DEFAULT_PONG_TIMEOUT: Duration = Duration::from_secs(30);

/// Maximum time a single outbound frame (hello, room join, proxied message,
/// or ping) may take to hand off to the transport before it's treated as a
/// write failure.
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// `{signalingUrl, nextcloudUrl, token, remoteRoomId?}` from the client's
/// join payload.
#[derive(Debug, Clone)]
pub struct FederationDescriptor {
    /// Peer signaling server URL; `http(s)` is upgraded to `ws(s)` when
    /// resolving the dial target.
    pub signaling_url: String,
    /// Base URL passed as the `auth.url` hello field.
    pub nextcloud_url: String,
    /// Bearer token presented in the hello's `auth.params.token`.
    pub token: String,
    /// Room id on the *remote* server, if it differs from the local room id.
    pub remote_room_id: Option<String>,
}

impl FederationDescriptor {
    /// Upgrade `http(s)://` to `ws(s)://` for the transport dial, per §4.1
    /// step 1. Leaves an already-`ws(s)://` URL untouched.
    pub fn dial_url(&self) -> String {
        if let Some(rest) = self.signaling_url.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = self.signaling_url.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            self.signaling_url.clone()
        }
    }
}

/// Handshake/keepalive tuning. Defaults match [`DEFAULT_PING_PERIOD`] and
/// [`DEFAULT_PONG_TIMEOUT`].
#[derive(Debug, Clone)]
pub struct FederationTuning {
    pub ping_period: Duration,
    pub pong_timeout: Duration,
    pub write_timeout: Duration,
    pub tls_policy: TlsPolicy,
}

impl Default for FederationTuning {
    fn default() -> Self {
        Self {
            ping_period: DEFAULT_PING_PERIOD,
            pong_timeout: DEFAULT_PONG_TIMEOUT,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            tls_policy: TlsPolicy::default(),
        }
    }
}

/// The local client's original room-join request, as parsed by the hub
/// before it hands off to [`crate::FederationClient::create`]. `original_id`
/// is echoed back to the client on the final join ack.
#[derive(Debug, Clone)]
pub struct FederationJoinRequest {
    pub original_id: Option<String>,
    pub room_id: String,
    pub room_session_id: Option<String>,
    pub federation: FederationDescriptor,
}

impl FederationJoinRequest {
    /// The room id to request from the *remote* server: `remoteRoomId` if
    /// set, otherwise the local `roomId`.
    pub fn remote_room_id(&self) -> &str {
        self.federation
            .remote_room_id
            .as_deref()
            .unwrap_or(&self.room_id)
    }
}
