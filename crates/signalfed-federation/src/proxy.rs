//! Identity rewriting for proxied `message` frames.
//!
//! The remote peer only ever knows this tunnel by the session id it handed
//! out in its `hello` response (`remote_hello.session_id`). The local hub
//! only knows the client by its own public session id. Every `message`
//! frame that crosses the tunnel has its `sender`/`recipient` rewritten so
//! neither side's id space leaks into the other.

use signalfed_core::{ClientMessage, Recipient, RecipientType, ServerMessage};
use signalfed_session::SessionId;

/// Rewrite a message inbound from the remote peer before handing it to the
/// primary session: the remote's notion of "this session" (its own assigned
/// id for the tunnel) becomes the local public id, so the client sees a
/// normal peer message addressed to itself.
pub fn rewrite_inbound(mut message: ServerMessage, local_id: &SessionId, remote_id: &str) -> ServerMessage {
    if let Some(recipient) = message.message_recipient_mut() {
        rewrite_recipient(recipient, remote_id, local_id.as_str());
    }
    message
}

/// Rewrite a message outbound to the remote peer before it leaves the
/// tunnel: the local session's public id, if it appears as the sender, is
/// replaced with the id the remote assigned this tunnel.
pub fn rewrite_outbound(mut message: ClientMessage, local_id: &SessionId, remote_id: &str) -> ClientMessage {
    if let Some(recipient) = message.message_recipient_mut() {
        rewrite_recipient(recipient, local_id.as_str(), remote_id);
    }
    message
}

/// Replace `from` with `to` wherever a session-typed recipient's id matches,
/// leaving `user`/`room` recipients and non-matching session ids untouched.
fn rewrite_recipient(recipient: &mut Recipient, from: &str, to: &str) {
    if recipient.kind != RecipientType::Session {
        return;
    }
    if recipient.session_id.as_deref() == Some(from) {
        recipient.session_id = Some(to.to_string());
    }
}

/// Whether an inbound message's sender is this same tunnel echoed back,
/// which should be suppressed rather than redelivered to the primary
/// session (self-send suppression).
pub fn is_self_echo(message: &ServerMessage, remote_id: &str) -> bool {
    match &message.kind {
        signalfed_core::ServerMessageKind::Message { message } => message
            .sender
            .as_ref()
            .is_some_and(|s| s.kind == RecipientType::Session && s.session_id.as_deref() == Some(remote_id)),
        _ => false,
    }
}
