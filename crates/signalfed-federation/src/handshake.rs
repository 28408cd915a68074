//! The Welcome -> Hello -> Room handshake run once per tunnel before any
//! message proxying begins.

use std::time::Duration;

use rand::Rng;
use signalfed_core::{ClientMessage, HelloAuth, HelloResultPayload, RoomPayload, ServerMessageKind, WelcomePayload};
use signalfed_transport::{TransportEvent, TransportReceiver, TransportSender, UpgradeResponse};
use tracing::{debug, warn};

use crate::config::{FederationJoinRequest, MAX_HELLO_RETRIES};
use crate::error::{FederationError, Result};

/// Send a single frame with the write deadline enforced the same way the
/// established tunnel enforces it for proxied traffic.
pub async fn send_with_deadline(sender: &dyn TransportSender, encoded: String, write_timeout: Duration) -> Result<()> {
    match tokio::time::timeout(write_timeout, sender.send_text(encoded)).await {
        Ok(result) => result.map_err(FederationError::from),
        Err(_) => Err(FederationError::ConnectionFailed("write deadline exceeded".to_string())),
    }
}

/// Generate a correlation id for an outbound frame. Not cryptographically
/// significant -- only needs to be unique enough to match a response.
pub fn generate_correlation_id() -> String {
    let mut rng = rand::thread_rng();
    let bytes: [u8; 8] = rng.gen();
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// What the handshake produced: the identity the remote assigned this
/// tunnel, and the room ack it returned.
#[derive(Debug, Clone)]
pub struct HandshakeOutcome {
    pub remote_hello: HelloResultPayload,
    pub room: RoomPayload,
    pub room_ack_id: Option<String>,
}

/// Confirm the transport upgrade advertised federation support before
/// spending a round trip on a hello that's bound to be rejected.
pub fn check_federation_supported(upgrade: &UpgradeResponse) -> Result<()> {
    if upgrade.has_feature(signalfed_core::FEATURE_FEDERATION) {
        Ok(())
    } else {
        Err(FederationError::FederationNotSupported)
    }
}

/// Run the handshake to completion over an already-connected transport.
///
/// Retries the hello up to [`MAX_HELLO_RETRIES`] times when a received frame's
/// correlation id doesn't match the outstanding hello -- tolerating a peer
/// that interleaves unrelated frames before it answers -- then gives up.
pub async fn run(
    sender: &dyn TransportSender,
    receiver: &mut dyn TransportReceiver,
    join: &FederationJoinRequest,
    write_timeout: Duration,
) -> Result<HandshakeOutcome> {
    let auth = HelloAuth::federation(join.federation.nextcloud_url.clone(), join.federation.token.clone());

    let mut pending = match await_welcome(receiver).await? {
        PreHello::Validated => None,
        PreHello::Unsolicited(message) => Some(message),
    };

    let mut attempt = 0;
    let remote_hello = loop {
        attempt += 1;
        let hello_id = generate_correlation_id();
        let hello = ClientMessage::hello(hello_id.clone(), auth.clone());
        send_client_message(sender, &hello, write_timeout).await?;

        match await_matching_hello(receiver, &hello_id, pending.take()).await? {
            Some(result) => break result,
            None if attempt >= MAX_HELLO_RETRIES => {
                return Err(FederationError::HandshakeRetriesExhausted);
            }
            None => {
                warn!(attempt, "federation hello correlation mismatch, retrying");
                continue;
            }
        }
    };

    let room_id = join.remote_room_id().to_string();
    let room_request = ClientMessage::join_room(join.original_id.clone(), room_id, join.room_session_id.clone());
    send_client_message(sender, &room_request, write_timeout).await?;

    let (room_ack_id, room) = await_room_ack(receiver).await?;

    Ok(HandshakeOutcome { remote_hello, room, room_ack_id })
}

async fn send_client_message(sender: &dyn TransportSender, message: &ClientMessage, write_timeout: Duration) -> Result<()> {
    let encoded = signalfed_core::codec::encode_client(message)?;
    send_with_deadline(sender, encoded, write_timeout).await
}

/// Outcome of waiting for the peer's `welcome`: either it arrived and
/// advertised federation support, or the peer is a legacy one that jumps
/// straight to `WaitHelloResponse` without sending one, in which case the
/// frame it sent instead is carried forward into the hello wait.
enum PreHello {
    Validated,
    Unsolicited(signalfed_core::ServerMessage),
}

/// Wait for the peer's `welcome` and confirm it advertises federation
/// support before a hello is ever sent, per the `WaitWelcome` state. A
/// legacy peer that sends something other than a welcome unprompted is
/// tolerated: that frame is handed back so it can be replayed into
/// `await_matching_hello` instead of being dropped.
async fn await_welcome(receiver: &mut dyn TransportReceiver) -> Result<PreHello> {
    loop {
        let event = receiver
            .recv()
            .await
            .ok_or(FederationError::ConnectionFailed("transport closed during handshake".to_string()))?;
        let text = match event {
            TransportEvent::Text(text) => text,
            TransportEvent::Pong(_) => continue,
            TransportEvent::Disconnected { reason } => {
                return Err(FederationError::ConnectionFailed(
                    reason.unwrap_or_else(|| "peer disconnected during handshake".to_string()),
                ));
            }
        };

        let message = signalfed_core::codec::decode_server(&text)?;
        match message.kind {
            ServerMessageKind::Welcome { welcome } => {
                return validate_welcome(welcome).map(|()| PreHello::Validated);
            }
            ServerMessageKind::Error { error } => {
                return Err(FederationError::HandshakeFailed {
                    code: error.code,
                    message: error.message,
                });
            }
            _ => {
                debug!("federation handshake: peer skipped welcome, treating as legacy");
                return Ok(PreHello::Unsolicited(message));
            }
        }
    }
}

fn validate_welcome(welcome: WelcomePayload) -> Result<()> {
    if welcome.has_feature(signalfed_core::FEATURE_FEDERATION) {
        debug!("federation handshake: received welcome");
        Ok(())
    } else {
        Err(FederationError::FederationNotSupported)
    }
}

/// Wait for a matching `hello` response, skipping over a leading `welcome`
/// (the peer may resend it) until either a matching `hello` or a fatal
/// `error` arrives. `pending`, if given, is a frame already read off the
/// wire (by [`await_welcome`]'s legacy-peer path) that is checked before
/// any new frame is pulled from `receiver`.
async fn await_matching_hello(
    receiver: &mut dyn TransportReceiver,
    expected_id: &str,
    pending: Option<signalfed_core::ServerMessage>,
) -> Result<Option<HelloResultPayload>> {
    let mut pending = pending;
    loop {
        let message = match pending.take() {
            Some(message) => message,
            None => {
                let event = receiver.recv().await.ok_or(FederationError::ConnectionFailed(
                    "transport closed during handshake".to_string(),
                ))?;
                let text = match event {
                    TransportEvent::Text(text) => text,
                    TransportEvent::Pong(_) => continue,
                    TransportEvent::Disconnected { reason } => {
                        return Err(FederationError::ConnectionFailed(
                            reason.unwrap_or_else(|| "peer disconnected during handshake".to_string()),
                        ));
                    }
                };
                signalfed_core::codec::decode_server(&text)?
            }
        };

        match message.kind {
            ServerMessageKind::Welcome { .. } => {
                debug!("federation handshake: received welcome");
                continue;
            }
            ServerMessageKind::Error { error } => {
                return Err(FederationError::HandshakeFailed {
                    code: error.code,
                    message: error.message,
                });
            }
            ServerMessageKind::Hello { hello } => {
                if message.id.as_deref() == Some(expected_id) {
                    return Ok(Some(hello));
                }
                return Ok(None);
            }
            other => {
                debug!(frame = ?other, "federation handshake: unexpected frame while waiting for hello ack, resending hello");
                return Ok(None);
            }
        }
    }
}

async fn await_room_ack(receiver: &mut dyn TransportReceiver) -> Result<(Option<String>, RoomPayload)> {
    loop {
        let event = receiver
            .recv()
            .await
            .ok_or(FederationError::ConnectionFailed("transport closed during handshake".to_string()))?;
        let text = match event {
            TransportEvent::Text(text) => text,
            TransportEvent::Pong(_) => continue,
            TransportEvent::Disconnected { reason } => {
                return Err(FederationError::ConnectionFailed(
                    reason.unwrap_or_else(|| "peer disconnected during handshake".to_string()),
                ));
            }
        };

        let message = signalfed_core::codec::decode_server(&text)?;
        match message.kind {
            ServerMessageKind::Error { error } => {
                return Err(FederationError::HandshakeFailed {
                    code: error.code,
                    message: error.message,
                });
            }
            ServerMessageKind::Room { room } => return Ok((message.id, room)),
            other => {
                debug!(frame = ?other, "federation handshake: ignoring unexpected frame before room ack");
                continue;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn correlation_ids_are_sixteen_hex_chars_and_distinct() {
        let a = generate_correlation_id();
        let b = generate_correlation_id();
        assert_eq!(a.len(), 16);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }
}
