//! The narrow interface the federation client needs from the primary
//! session that owns it. The hub that actually implements [`PrimarySession`]
//! (room membership, authentication, MCU routing) is out of scope here --
//! this crate only defines the seam and a stub used by tests and the
//! standalone server binary.

use async_trait::async_trait;
use parking_lot::Mutex;
use signalfed_core::ServerMessage;
use std::fmt;
use std::sync::Arc;

/// A session identifier. Deliberately not `String` so a local id and a
/// remote-issued id can never be compared without going through `.as_str()`
/// at the call site -- the whole point of identity rewriting is that these
/// two spaces never leak into each other.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for SessionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// The local client's own signaling session. Implemented by the signaling
/// hub; the federation crate only ever sees this trait object.
#[async_trait]
pub trait PrimarySession: Send + Sync {
    /// Deliver a message to the client as though it arrived from a local
    /// peer. Used both for relayed remote traffic and for synthetic error
    /// messages the federation client manufactures on failure.
    async fn send_message(&self, message: ServerMessage);

    /// The session id this client is addressed by locally. Used as the
    /// rewrite target for inbound messages and as the rewrite trigger for
    /// outbound ones.
    fn public_id(&self) -> SessionId;
}

/// In-memory [`PrimarySession`] used by tests and the demo server binary:
/// records every message it receives instead of forwarding to a real
/// client socket.
pub struct RecordingSession {
    public_id: SessionId,
    received: Mutex<Vec<ServerMessage>>,
}

impl RecordingSession {
    pub fn new(public_id: SessionId) -> Arc<Self> {
        Arc::new(Self {
            public_id,
            received: Mutex::new(Vec::new()),
        })
    }

    pub fn drain(&self) -> Vec<ServerMessage> {
        std::mem::take(&mut self.received.lock())
    }

    pub fn received_count(&self) -> usize {
        self.received.lock().len()
    }
}

#[async_trait]
impl PrimarySession for RecordingSession {
    async fn send_message(&self, message: ServerMessage) {
        self.received.lock().push(message);
    }

    fn public_id(&self) -> SessionId {
        self.public_id.clone()
    }
}
