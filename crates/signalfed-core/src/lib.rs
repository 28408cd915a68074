//! Wire protocol types shared by every signaling transport in the fabric.
//!
//! A session (local or federated) exchanges JSON text frames shaped like
//! [`ClientMessage`] and [`ServerMessage`]. This crate owns only the wire
//! shapes and their codec -- it has no notion of sessions, rooms, or
//! transports.

pub mod codec;
pub mod constants;
pub mod error;
pub mod message;
pub mod time;

pub use constants::{
    FEATURE_FEDERATION, MAX_FRAME_SIZE, PROTOCOL_VERSION, WS_SUBPROTOCOL,
};
pub use error::{Error, Result};
pub use message::{
    ClientMessage, ClientMessageKind, ErrorPayload, HelloAuth, HelloAuthParams, HelloPayload,
    HelloResultPayload, MessagePayload, Recipient, RecipientType, RoomPayload, ServerMessage,
    ServerMessageKind, WelcomePayload,
};
