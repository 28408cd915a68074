//! Federation error taxonomy, mirroring the propagation policy in the
//! design: construction errors are returned synchronously, everything past
//! that point either tears down the client or comes back as a send error.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FederationError {
    /// Dial or TLS setup failed before any signaling frame was exchanged.
    #[error("failed to connect to federation peer: {0}")]
    ConnectionFailed(String),

    /// The peer's transport upgrade response did not advertise the
    /// `federation` feature.
    #[error("peer does not support federation")]
    FederationNotSupported,

    /// The join request handed to `create` was missing required fields.
    #[error("malformed join request: {0}")]
    MalformedJoinRequest(String),

    /// The remote returned a fatal `error` frame during the handshake.
    #[error("federation handshake failed: {code}: {message}")]
    HandshakeFailed { code: String, message: String },

    /// The hello/response correlation id mismatched more than
    /// `MAX_HELLO_RETRIES` times in a row.
    #[error("handshake retries exhausted waiting for hello response")]
    HandshakeRetriesExhausted,

    /// A read or write on the transport failed, or a frame exceeded the
    /// shared size limit.
    #[error("transport error: {0}")]
    Transport(#[from] signalfed_transport::TransportError),

    /// A frame could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(#[from] signalfed_core::Error),

    /// Sent after `Close()`; distinguished from other transport errors so
    /// callers don't log it at error level.
    #[error("federation client is not connected")]
    NotConnected,

    /// A send was attempted after a close frame had already gone out.
    #[error("close frame already sent")]
    CloseSent,
}

pub type Result<T> = std::result::Result<T, FederationError>;

impl FederationError {
    /// The wire error code this failure should be reported to the primary
    /// session under, per the error-handling design (`federation_error` for
    /// anything not already a typed signaling error).
    pub fn wire_code(&self) -> &str {
        match self {
            FederationError::HandshakeFailed { code, .. } => code,
            FederationError::FederationNotSupported => "federation_unsupported",
            _ => "federation_error",
        }
    }
}
