//! End-to-end coverage of the federation client driven against an
//! in-memory mock transport: no real socket, no DNS, no TLS.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use signalfed_core::{
    ClientMessage, ClientMessageKind, Recipient, RoomPayload, ServerMessage, ServerMessageKind,
};
use signalfed_federation::{
    FederationClient, FederationDescriptor, FederationError, FederationJoinRequest, FederationTuning,
};
use signalfed_session::{PrimarySession, RecordingSession, SessionId};
use signalfed_transport::{TransportError, TransportEvent, TransportReceiver, TransportSender, UpgradeResponse};
use tokio::sync::mpsc;

/// Send half of the mock transport: forwards every outgoing frame onto a
/// channel the test harness reads from, playing the role of "the network".
struct MockSender {
    outbound: mpsc::UnboundedSender<String>,
    connected: std::sync::atomic::AtomicBool,
}

#[async_trait]
impl TransportSender for MockSender {
    async fn send_text(&self, data: String) -> signalfed_transport::Result<()> {
        self.outbound
            .send(data)
            .map_err(|_| TransportError::SendFailed("peer gone".to_string()))
    }

    async fn send_ping(&self, _payload: Vec<u8>) -> signalfed_transport::Result<()> {
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(std::sync::atomic::Ordering::Acquire)
    }

    async fn close(&self) -> signalfed_transport::Result<()> {
        self.connected.store(false, std::sync::atomic::Ordering::Release);
        Ok(())
    }
}

/// Receive half: the test harness pushes [`TransportEvent`]s onto this to
/// simulate frames arriving from the peer.
struct MockReceiver {
    inbound: mpsc::UnboundedReceiver<TransportEvent>,
}

#[async_trait]
impl TransportReceiver for MockReceiver {
    async fn recv(&mut self) -> Option<TransportEvent> {
        self.inbound.recv().await
    }
}

/// One end of the mock wire, handed to [`FederationClient::create_with_transport`].
fn mock_transport() -> (MockSender, MockReceiver, mpsc::UnboundedReceiver<String>, mpsc::UnboundedSender<TransportEvent>) {
    let (out_tx, out_rx) = mpsc::unbounded_channel();
    let (in_tx, in_rx) = mpsc::unbounded_channel();
    let sender = MockSender {
        outbound: out_tx,
        connected: std::sync::atomic::AtomicBool::new(true),
    };
    let receiver = MockReceiver { inbound: in_rx };
    (sender, receiver, out_rx, in_tx)
}

fn join_request() -> FederationJoinRequest {
    FederationJoinRequest {
        original_id: Some("join-1".to_string()),
        room_id: "test-room".to_string(),
        room_session_id: Some("local-room-sess".to_string()),
        federation: FederationDescriptor {
            signaling_url: "wss://peer.example/signaling".to_string(),
            nextcloud_url: "https://nc.example".to_string(),
            token: "valid-token".to_string(),
            remote_room_id: None,
        },
    }
}

fn supported_upgrade() -> UpgradeResponse {
    UpgradeResponse::from_feature_header(Some("federation"))
}

fn unsupported_upgrade() -> UpgradeResponse {
    UpgradeResponse::from_feature_header(Some("mcu"))
}

async fn recv_client_message(out_rx: &mut mpsc::UnboundedReceiver<String>) -> ClientMessage {
    let text = out_rx.recv().await.expect("expected an outbound frame");
    signalfed_core::codec::decode_client(&text).expect("outbound frame should decode")
}

/// Drive the mock peer through a successful Welcome/Hello/Room exchange,
/// answering whatever the client under test sends.
async fn play_happy_path_peer(
    out_rx: &mut mpsc::UnboundedReceiver<String>,
    in_tx: &mpsc::UnboundedSender<TransportEvent>,
    remote_session_id: &str,
    room_id: &str,
) {
    let welcome = ServerMessage {
        id: None,
        kind: ServerMessageKind::Welcome {
            welcome: signalfed_core::WelcomePayload {
                features: vec!["federation".to_string()],
            },
        },
    };
    send_server_message(in_tx, welcome);

    let hello = recv_client_message(out_rx).await;
    let hello_id = hello.id.clone().expect("hello carries a correlation id");
    assert!(matches!(hello.kind, ClientMessageKind::Hello { .. }));

    let hello_ack = ServerMessage {
        id: Some(hello_id),
        kind: ServerMessageKind::Hello {
            hello: signalfed_core::HelloResultPayload {
                session_id: remote_session_id.to_string(),
                user_id: None,
            },
        },
    };
    send_server_message(in_tx, hello_ack);

    let room_request = recv_client_message(out_rx).await;
    assert!(matches!(room_request.kind, ClientMessageKind::Room { .. }));

    let room_ack = ServerMessage {
        id: room_request.id,
        kind: ServerMessageKind::Room {
            room: RoomPayload {
                room_id: room_id.to_string(),
                session_id: Some(remote_session_id.to_string()),
            },
        },
    };
    send_server_message(in_tx, room_ack);
}

fn send_server_message(in_tx: &mpsc::UnboundedSender<TransportEvent>, message: ServerMessage) {
    let encoded = signalfed_core::codec::encode_server(&message).unwrap();
    in_tx.send(TransportEvent::Text(encoded)).unwrap();
}

fn tuning() -> FederationTuning {
    FederationTuning {
        ping_period: Duration::from_secs(30),
        pong_timeout: Duration::from_secs(30),
        ..Default::default()
    }
}

#[tokio::test]
async fn invalid_token_surfaces_as_handshake_failed() {
    let (sender, receiver, mut out_rx, in_tx) = mock_transport();
    let session = RecordingSession::new(SessionId::new("local-1"));

    let create = tokio::spawn(async move {
        FederationClient::create_with_transport(
            sender,
            receiver,
            supported_upgrade(),
            join_request(),
            session as Arc<dyn PrimarySession>,
            tuning(),
        )
        .await
    });

    let welcome = ServerMessage {
        id: None,
        kind: ServerMessageKind::Welcome {
            welcome: signalfed_core::WelcomePayload {
                features: vec!["federation".to_string()],
            },
        },
    };
    send_server_message(&in_tx, welcome);

    let hello = recv_client_message(&mut out_rx).await;
    let error = ServerMessage {
        id: hello.id,
        kind: ServerMessageKind::Error {
            error: signalfed_core::ErrorPayload {
                code: "invalid_token".to_string(),
                message: "token rejected".to_string(),
            },
        },
    };
    send_server_message(&in_tx, error);

    let result = create.await.unwrap();
    match result {
        Err(FederationError::HandshakeFailed { code, .. }) => assert_eq!(code, "invalid_token"),
        Ok(_) => panic!("expected handshake failure, got Ok"),
        Err(other) => panic!("expected HandshakeFailed, got {other:?}"),
    }
}

#[tokio::test]
async fn peer_without_federation_feature_is_rejected_before_any_frame_is_sent() {
    let (sender, receiver, mut out_rx, _in_tx) = mock_transport();
    let session = RecordingSession::new(SessionId::new("local-1"));

    let result = FederationClient::create_with_transport(
        sender,
        receiver,
        unsupported_upgrade(),
        join_request(),
        session as Arc<dyn PrimarySession>,
        tuning(),
    )
    .await;

    assert!(matches!(result, Err(FederationError::FederationNotSupported)));
    assert!(out_rx.try_recv().is_err(), "no hello should have been sent");
}

#[tokio::test]
async fn happy_path_join_establishes_the_tunnel() {
    let (sender, receiver, mut out_rx, in_tx) = mock_transport();
    let session = RecordingSession::new(SessionId::new("local-1"));
    let session_for_assertions = session.clone();

    let create = tokio::spawn(async move {
        FederationClient::create_with_transport(
            sender,
            receiver,
            supported_upgrade(),
            join_request(),
            session as Arc<dyn PrimarySession>,
            tuning(),
        )
        .await
    });

    play_happy_path_peer(&mut out_rx, &in_tx, "remote-sess-1", "test-room").await;

    let client = create.await.unwrap().expect("handshake should succeed");
    assert_eq!(client.room().unwrap().room_id, "test-room");
    assert_eq!(client.local_id().as_str(), "local-1");

    let room_ack = wait_for_delivery(&session_for_assertions).await;
    assert_eq!(room_ack.id.as_deref(), Some("join-1"));
    match room_ack.kind {
        ServerMessageKind::Room { room } => assert_eq!(room.room_id, "test-room"),
        other => panic!("expected the room ack to reach the primary session, got {other:?}"),
    }
}

#[tokio::test]
async fn outbound_message_is_addressed_to_the_remote_assigned_session() {
    let (sender, receiver, mut out_rx, in_tx) = mock_transport();
    let session = RecordingSession::new(SessionId::new("local-1"));

    let create = tokio::spawn(async move {
        FederationClient::create_with_transport(
            sender,
            receiver,
            supported_upgrade(),
            join_request(),
            session as Arc<dyn PrimarySession>,
            tuning(),
        )
        .await
    });

    play_happy_path_peer(&mut out_rx, &in_tx, "remote-sess-1", "test-room").await;
    let client = create.await.unwrap().unwrap();

    client
        .send_message(ClientMessage::message(
            Recipient::session("local-1"),
            serde_json::json!({"type": "offer"}),
        ))
        .await
        .unwrap();

    let proxied = recv_client_message(&mut out_rx).await;
    match proxied.kind {
        ClientMessageKind::Message { message } => {
            assert_eq!(message.recipient.unwrap().session_id.as_deref(), Some("remote-sess-1"));
        }
        _ => panic!("expected a message frame"),
    }
}

#[tokio::test]
async fn inbound_message_is_rewritten_to_the_local_public_id() {
    let (sender, receiver, mut out_rx, in_tx) = mock_transport();
    let session = RecordingSession::new(SessionId::new("local-1"));
    let session_for_assertions = session.clone();

    let create = tokio::spawn(async move {
        FederationClient::create_with_transport(
            sender,
            receiver,
            supported_upgrade(),
            join_request(),
            session as Arc<dyn PrimarySession>,
            tuning(),
        )
        .await
    });

    play_happy_path_peer(&mut out_rx, &in_tx, "remote-sess-1", "test-room").await;
    let _client = create.await.unwrap().unwrap();
    session_for_assertions.drain(); // discard the join's room ack

    let inbound = ServerMessage {
        id: None,
        kind: ServerMessageKind::Message {
            message: signalfed_core::MessagePayload {
                recipient: Some(Recipient::session("remote-sess-1")),
                sender: Some(Recipient::session("peer-at-remote")),
                data: serde_json::json!({"type": "answer"}),
            },
        },
    };
    send_server_message(&in_tx, inbound);

    let delivered = wait_for_delivery(&session_for_assertions).await;
    match delivered.kind {
        ServerMessageKind::Message { message } => {
            assert_eq!(message.recipient.unwrap().session_id.as_deref(), Some("local-1"));
        }
        other => panic!("expected a message frame, got {other:?}"),
    }
}

#[tokio::test]
async fn self_echoed_message_is_suppressed() {
    let (sender, receiver, mut out_rx, in_tx) = mock_transport();
    let session = RecordingSession::new(SessionId::new("local-1"));
    let session_for_assertions = session.clone();

    let create = tokio::spawn(async move {
        FederationClient::create_with_transport(
            sender,
            receiver,
            supported_upgrade(),
            join_request(),
            session as Arc<dyn PrimarySession>,
            tuning(),
        )
        .await
    });

    play_happy_path_peer(&mut out_rx, &in_tx, "remote-sess-1", "test-room").await;
    let _client = create.await.unwrap().unwrap();
    session_for_assertions.drain(); // discard the join's room ack

    let echoed = ServerMessage {
        id: None,
        kind: ServerMessageKind::Message {
            message: signalfed_core::MessagePayload {
                recipient: Some(Recipient::session("local-1")),
                sender: Some(Recipient::session("remote-sess-1")),
                data: serde_json::json!({"type": "offer"}),
            },
        },
    };
    send_server_message(&in_tx, echoed);

    // give the read loop a chance to process and (wrongly) deliver it
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(session_for_assertions.received_count(), 0);
}

#[tokio::test]
async fn call_state_events_are_forwarded_unchanged() {
    let (sender, receiver, mut out_rx, in_tx) = mock_transport();
    let session = RecordingSession::new(SessionId::new("local-1"));
    let session_for_assertions = session.clone();

    let create = tokio::spawn(async move {
        FederationClient::create_with_transport(
            sender,
            receiver,
            supported_upgrade(),
            join_request(),
            session as Arc<dyn PrimarySession>,
            tuning(),
        )
        .await
    });

    play_happy_path_peer(&mut out_rx, &in_tx, "remote-sess-1", "test-room").await;
    let _client = create.await.unwrap().unwrap();
    session_for_assertions.drain(); // discard the join's room ack

    let event = ServerMessage {
        id: None,
        kind: ServerMessageKind::Event {
            event: serde_json::json!({"target": "participants", "type": "update"}),
        },
    };
    send_server_message(&in_tx, event);

    let delivered = wait_for_delivery(&session_for_assertions).await;
    assert_eq!(delivered.type_name(), "event");
}

#[tokio::test]
async fn close_is_idempotent() {
    let (sender, receiver, mut out_rx, in_tx) = mock_transport();
    let session = RecordingSession::new(SessionId::new("local-1"));

    let create = tokio::spawn(async move {
        FederationClient::create_with_transport(
            sender,
            receiver,
            supported_upgrade(),
            join_request(),
            session as Arc<dyn PrimarySession>,
            tuning(),
        )
        .await
    });

    play_happy_path_peer(&mut out_rx, &in_tx, "remote-sess-1", "test-room").await;
    let client = create.await.unwrap().unwrap();

    client.close().await.unwrap();
    client.close().await.unwrap();

    let err = client
        .send_message(ClientMessage::message(
            Recipient::session("local-1"),
            serde_json::json!({}),
        ))
        .await
        .unwrap_err();
    assert!(matches!(err, FederationError::CloseSent));
}

async fn wait_for_delivery(session: &RecordingSession) -> ServerMessage {
    for _ in 0..50 {
        let mut received = session.drain();
        if let Some(message) = received.pop() {
            return message;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("primary session never received the expected message");
}
