//! Signaling message envelopes.
//!
//! Every frame on the wire is a JSON object carrying an `id` correlation
//! token, a `type` discriminator, and exactly one payload field named after
//! the type. [`ClientMessage`] is what a session emits; [`ServerMessage`] is
//! what it receives.

use serde::{Deserialize, Serialize};

/// Who a `message` payload is addressed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecipientType {
    Session,
    User,
    Room,
}

/// Recipient (or sender) of a proxied `message` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipient {
    #[serde(rename = "type")]
    pub kind: RecipientType,
    #[serde(rename = "sessionId", skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(rename = "userId", skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

impl Recipient {
    pub fn session(session_id: impl Into<String>) -> Self {
        Self {
            kind: RecipientType::Session,
            session_id: Some(session_id.into()),
            user_id: None,
        }
    }
}

/// `{type: "federation", url, params: {token}}` -- the auth block of a hello.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HelloAuth {
    #[serde(rename = "type")]
    pub kind: String,
    pub url: String,
    pub params: HelloAuthParams,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HelloAuthParams {
    pub token: String,
}

impl HelloAuth {
    pub fn federation(url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            kind: "federation".to_string(),
            url: url.into(),
            params: HelloAuthParams { token: token.into() },
        }
    }
}

/// Outbound `hello` payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HelloPayload {
    pub version: String,
    pub auth: HelloAuth,
}

/// Inbound `welcome` payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WelcomePayload {
    #[serde(default)]
    pub features: Vec<String>,
}

impl WelcomePayload {
    pub fn has_feature(&self, feature: &str) -> bool {
        self.features.iter().any(|f| f == feature)
    }
}

/// Inbound `hello` response payload -- the peer's assigned identity for
/// this tunnel. Stored verbatim as `remote_hello` once handshake completes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HelloResultPayload {
    #[serde(rename = "sessionId")]
    pub session_id: String,
    #[serde(rename = "userId", default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

/// `room` payload, used both for outbound join requests and inbound acks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomPayload {
    #[serde(rename = "roomId")]
    pub room_id: String,
    #[serde(rename = "sessionId", default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

/// `error` payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub code: String,
    pub message: String,
}

/// `message` payload -- the only type subject to identity rewriting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessagePayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recipient: Option<Recipient>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sender: Option<Recipient>,
    pub data: serde_json::Value,
}

/// A frame this side emits, addressed to the remote peer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(flatten)]
    pub kind: ClientMessageKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientMessageKind {
    Hello { hello: HelloPayload },
    Room { room: RoomPayload },
    Message { message: MessagePayload },
}

impl ClientMessage {
    pub fn hello(id: impl Into<String>, auth: HelloAuth) -> Self {
        Self {
            id: Some(id.into()),
            kind: ClientMessageKind::Hello {
                hello: HelloPayload {
                    version: crate::constants::PROTOCOL_VERSION.to_string(),
                    auth,
                },
            },
        }
    }

    pub fn join_room(
        id: Option<String>,
        room_id: impl Into<String>,
        session_id: Option<String>,
    ) -> Self {
        Self {
            id,
            kind: ClientMessageKind::Room {
                room: RoomPayload {
                    room_id: room_id.into(),
                    session_id,
                },
            },
        }
    }

    pub fn message(recipient: Recipient, data: serde_json::Value) -> Self {
        Self {
            id: None,
            kind: ClientMessageKind::Message {
                message: MessagePayload {
                    recipient: Some(recipient),
                    sender: None,
                    data,
                },
            },
        }
    }
}

/// A frame received from the remote peer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(flatten)]
    pub kind: ServerMessageKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerMessageKind {
    Welcome { welcome: WelcomePayload },
    Hello { hello: HelloResultPayload },
    Error { error: ErrorPayload },
    Room { room: RoomPayload },
    Message { message: MessagePayload },
    Event { event: serde_json::Value },
    Control { control: serde_json::Value },
    Update { update: serde_json::Value },
}

impl ServerMessage {
    pub fn error(id: Option<String>, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            id,
            kind: ServerMessageKind::Error {
                error: ErrorPayload {
                    code: code.into(),
                    message: message.into(),
                },
            },
        }
    }

    /// The type discriminator as it appears on the wire, for logging.
    pub fn type_name(&self) -> &'static str {
        match &self.kind {
            ServerMessageKind::Welcome { .. } => "welcome",
            ServerMessageKind::Hello { .. } => "hello",
            ServerMessageKind::Error { .. } => "error",
            ServerMessageKind::Room { .. } => "room",
            ServerMessageKind::Message { .. } => "message",
            ServerMessageKind::Event { .. } => "event",
            ServerMessageKind::Control { .. } => "control",
            ServerMessageKind::Update { .. } => "update",
        }
    }

    /// Mutable access to the `message` payload's recipient, if this is a
    /// `message` frame. Used by the proxy to rewrite addressing in place.
    pub fn message_recipient_mut(&mut self) -> Option<&mut Recipient> {
        match &mut self.kind {
            ServerMessageKind::Message { message } => message.recipient.as_mut(),
            _ => None,
        }
    }
}

impl ClientMessage {
    /// Mutable access to the `message` payload's recipient, if this is a
    /// `message` frame. Used by the proxy to rewrite addressing in place.
    pub fn message_recipient_mut(&mut self) -> Option<&mut Recipient> {
        match &mut self.kind {
            ClientMessageKind::Message { message } => message.recipient.as_mut(),
            _ => None,
        }
    }
}
