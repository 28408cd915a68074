//! The federation client itself: owns the tunnel from first dial through
//! Established through to teardown.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use signalfed_core::{HelloResultPayload, RoomPayload, ServerMessage, ServerMessageKind};
use signalfed_session::{PrimarySession, SessionId};
use signalfed_transport::{self as transport, TransportEvent, TransportReceiver, TransportSender};
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;
use tokio::time::{interval, timeout};
use tracing::{debug, error, info, warn};

use crate::config::{FederationJoinRequest, FederationTuning};
use crate::error::{FederationError, Result};
use crate::handshake;
use crate::proxy;

/// An established tunnel to a remote signaling server on behalf of one
/// local session.
///
/// `remote_hello` is published once, by the task that runs the handshake,
/// and read by every subsequent proxy operation -- an
/// [`ArcSwapOption`] gives every reader a lock-free snapshot instead of
/// contending on a mutex for the life of the tunnel.
pub struct FederationClient {
    local_id: SessionId,
    sender: Arc<dyn TransportSender>,
    remote_hello: Arc<ArcSwapOption<HelloResultPayload>>,
    room: ArcSwapOption<RoomPayload>,
    closed: Arc<AtomicBool>,
    close_sent: AtomicBool,
    write_timeout: std::time::Duration,
    tasks: AsyncMutex<Vec<JoinHandle<()>>>,
}

impl FederationClient {
    /// Dial the peer, run the handshake to Established, and spawn the read
    /// and write/keepalive loops. Returns once the tunnel is ready to
    /// proxy messages; handshake failures are returned synchronously and no
    /// background tasks are left running.
    pub async fn create(
        join: FederationJoinRequest,
        local_session: Arc<dyn PrimarySession>,
        tuning: FederationTuning,
    ) -> Result<Arc<Self>> {
        let dial_url = join.federation.dial_url();
        let (sender, receiver, upgrade) = transport::connect(&dial_url, tuning.tls_policy)
            .await
            .map_err(FederationError::from)?;
        Self::create_with_transport(sender, receiver, upgrade, join, local_session, tuning).await
    }

    /// Run the handshake and spawn the read/write loops over an
    /// already-connected transport. Split out from [`Self::create`] so
    /// tests can drive the state machine against an in-memory transport
    /// instead of a real socket.
    pub async fn create_with_transport<S, R>(
        sender: S,
        mut receiver: R,
        upgrade: transport::UpgradeResponse,
        join: FederationJoinRequest,
        local_session: Arc<dyn PrimarySession>,
        tuning: FederationTuning,
    ) -> Result<Arc<Self>>
    where
        S: TransportSender + 'static,
        R: TransportReceiver + 'static,
    {
        let local_id = local_session.public_id();
        handshake::check_federation_supported(&upgrade)?;

        let outcome = handshake::run(&sender, &mut receiver, &join, tuning.write_timeout).await?;
        info!(
            remote_session_id = %outcome.remote_hello.session_id,
            room_id = %outcome.room.room_id,
            "federation handshake established"
        );
        local_session
            .send_message(ServerMessage {
                id: outcome.room_ack_id.clone(),
                kind: ServerMessageKind::Room { room: outcome.room.clone() },
            })
            .await;

        let sender: Arc<dyn TransportSender> = Arc::new(sender);
        let remote_hello = Arc::new(ArcSwapOption::from_pointee(outcome.remote_hello));
        let closed = Arc::new(AtomicBool::new(false));

        let client = Arc::new(Self {
            local_id,
            sender: sender.clone(),
            remote_hello: remote_hello.clone(),
            room: ArcSwapOption::from_pointee(outcome.room),
            closed: closed.clone(),
            close_sent: AtomicBool::new(false),
            write_timeout: tuning.write_timeout,
            tasks: AsyncMutex::new(Vec::new()),
        });

        let read_task = tokio::spawn(read_loop(
            receiver,
            sender.clone(),
            remote_hello.clone(),
            local_session,
            client.local_id.clone(),
            closed.clone(),
            tuning.pong_timeout,
        ));
        let write_task = tokio::spawn(keepalive_loop(
            sender,
            closed.clone(),
            tuning.ping_period,
            tuning.write_timeout,
        ));

        client.tasks.lock().await.extend([read_task, write_task]);

        Ok(client)
    }

    pub fn local_id(&self) -> &SessionId {
        &self.local_id
    }

    pub fn room(&self) -> Option<RoomPayload> {
        self.room.load_full().map(|r| (*r).clone())
    }

    fn remote_session_id(&self) -> Option<String> {
        self.remote_hello.load_full().map(|h| h.session_id.clone())
    }

    /// Proxy a message from the local session out to the remote peer,
    /// rewriting the local public id to the remote-assigned tunnel id.
    pub async fn send_message(&self, message: signalfed_core::ClientMessage) -> Result<()> {
        if self.close_sent.load(Ordering::Acquire) {
            return Err(FederationError::CloseSent);
        }
        if self.closed.load(Ordering::Acquire) {
            return Err(FederationError::NotConnected);
        }
        let remote_id = self
            .remote_session_id()
            .ok_or(FederationError::NotConnected)?;
        let rewritten = proxy::rewrite_outbound(message, &self.local_id, &remote_id);
        let encoded = signalfed_core::codec::encode_client(&rewritten)?;
        let result = handshake::send_with_deadline(self.sender.as_ref(), encoded, self.write_timeout).await;
        if let Err(ref e) = result {
            warn!(error = %e, "federation send failed, closing tunnel");
            self.closed.store(true, Ordering::Release);
            if !self.close_sent.swap(true, Ordering::AcqRel) {
                let _ = self.sender.close().await;
            }
        }
        result
    }

    /// Tear the tunnel down idempotently: a second call is a no-op, not an
    /// error, so callers don't need to track whether they already closed.
    pub async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::Release);
        if self.close_sent.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let _ = self.sender.close().await;
        let mut tasks = self.tasks.lock().await;
        for task in tasks.drain(..) {
            task.abort();
        }
        Ok(())
    }

    /// Tear the tunnel down and report `error` to the local session as a
    /// synthetic signaling error, so the client sees why its federated
    /// peer vanished instead of silence.
    pub async fn close_with_error(&self, local_session: &dyn PrimarySession, error: &FederationError) {
        warn!(error = %error, "closing federation client after error");
        local_session
            .send_message(signalfed_core::ServerMessage::error(None, error.wire_code(), error.to_string()))
            .await;
        let _ = self.close().await;
    }
}

/// Reads frames off the transport, rewrites identities, and proxies
/// `message` frames to the primary session until the peer disconnects,
/// the pong deadline lapses, or `close()` is called.
async fn read_loop(
    mut receiver: impl TransportReceiver + 'static,
    sender: Arc<dyn TransportSender>,
    remote_hello: Arc<ArcSwapOption<HelloResultPayload>>,
    local_session: Arc<dyn PrimarySession>,
    local_id: SessionId,
    closed: Arc<AtomicBool>,
    pong_timeout: std::time::Duration,
) {
    loop {
        if closed.load(Ordering::Acquire) {
            return;
        }
        let event = match timeout(pong_timeout, receiver.recv()).await {
            Ok(Some(event)) => event,
            Ok(None) => {
                debug!("federation transport closed its event channel");
                break;
            }
            Err(_) => {
                warn!("federation tunnel timed out waiting for a frame");
                break;
            }
        };

        match event {
            TransportEvent::Text(text) => {
                let message = match signalfed_core::codec::decode_server(&text) {
                    Ok(message) => message,
                    Err(e @ signalfed_core::Error::FrameTooLarge { .. }) => {
                        error!(error = %e, "federation peer sent an oversized frame, closing tunnel");
                        break;
                    }
                    Err(e) => {
                        warn!(error = %e, "dropping malformed federation frame");
                        continue;
                    }
                };
                handle_server_message(message, &remote_hello, &local_session, &local_id).await;
            }
            TransportEvent::Pong(_) => {
                debug!("federation tunnel received pong");
            }
            TransportEvent::Disconnected { reason } => {
                info!(?reason, "federation tunnel disconnected");
                break;
            }
        }
    }
    closed.store(true, Ordering::Release);
    let _ = sender.close().await;
}

async fn handle_server_message(
    message: signalfed_core::ServerMessage,
    remote_hello: &ArcSwapOption<HelloResultPayload>,
    local_session: &Arc<dyn PrimarySession>,
    local_id: &SessionId,
) {
    let remote_id = match remote_hello.load_full() {
        Some(hello) => hello.session_id.clone(),
        None => return,
    };

    match &message.kind {
        ServerMessageKind::Message { .. } => {
            if proxy::is_self_echo(&message, &remote_id) {
                debug!("suppressing self-echoed federation message");
                return;
            }
            let rewritten = proxy::rewrite_inbound(message, local_id, &remote_id);
            local_session.send_message(rewritten).await;
        }
        ServerMessageKind::Event { .. }
        | ServerMessageKind::Control { .. }
        | ServerMessageKind::Update { .. }
        | ServerMessageKind::Room { .. } => {
            local_session.send_message(message).await;
        }
        ServerMessageKind::Error { error } => {
            error!(code = %error.code, message = %error.message, "federation peer reported an error");
            local_session.send_message(message).await;
        }
        ServerMessageKind::Welcome { .. } | ServerMessageKind::Hello { .. } => {
            debug!(frame = message.type_name(), "ignoring post-handshake control frame");
        }
    }
}

/// Periodically pings the peer so a dead connection is detected well
/// before the primary session notices its calls have gone silent.
async fn keepalive_loop(
    sender: Arc<dyn TransportSender>,
    closed: Arc<AtomicBool>,
    ping_period: std::time::Duration,
    write_timeout: std::time::Duration,
) {
    let mut ticker = interval(ping_period);
    ticker.tick().await; // first tick fires immediately; skip it
    loop {
        ticker.tick().await;
        if closed.load(Ordering::Acquire) {
            return;
        }
        let payload = signalfed_core::time::now_nanos_ascii().into_bytes();
        let sent = timeout(write_timeout, sender.send_ping(payload)).await;
        if !matches!(sent, Ok(Ok(()))) {
            warn!("federation keepalive ping failed or timed out");
            closed.store(true, Ordering::Release);
            return;
        }
    }
}
