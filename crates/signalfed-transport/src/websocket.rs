//! WebSocket transport implementation for outbound federation dials.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::{
    connect_async_tls_with_config,
    tungstenite::{
        handshake::client::generate_key,
        http::Request,
        protocol::Message as WsMessage,
    },
    Connector,
};
use tracing::{debug, error, warn};

use crate::error::{Result, TransportError};
use crate::traits::{TlsPolicy, TransportEvent, TransportReceiver, TransportSender, UpgradeResponse};
use signalfed_core::constants::WS_SUBPROTOCOL;

/// Header a signaling peer advertises its capability set under.
pub const FEATURE_HEADER: &str = "X-Spreed-Signaling-Features";

const CHANNEL_BUFFER_SIZE: usize = 256;

pub struct WebSocketSender {
    tx: mpsc::Sender<WsMessage>,
    connected: Arc<AtomicBool>,
}

#[async_trait]
impl TransportSender for WebSocketSender {
    async fn send_text(&self, data: String) -> Result<()> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }
        self.tx
            .send(WsMessage::Text(data))
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }

    async fn send_ping(&self, payload: Vec<u8>) -> Result<()> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }
        self.tx
            .send(WsMessage::Ping(payload))
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    async fn close(&self) -> Result<()> {
        let _ = self.tx.send(WsMessage::Close(None)).await;
        self.connected.store(false, Ordering::Release);
        Ok(())
    }
}

pub struct WebSocketReceiver {
    rx: mpsc::Receiver<TransportEvent>,
}

#[async_trait]
impl TransportReceiver for WebSocketReceiver {
    async fn recv(&mut self) -> Option<TransportEvent> {
        self.rx.recv().await
    }
}

/// Dial `url` as a WebSocket client, returning the split sender/receiver
/// plus the parsed upgrade response so the caller can check feature
/// advertisement before starting the signaling handshake.
pub async fn connect(
    url: &str,
    tls_policy: TlsPolicy,
) -> Result<(WebSocketSender, WebSocketReceiver, UpgradeResponse)> {
    let parsed = url::Url::parse(url).map_err(|e| TransportError::InvalidUrl(e.to_string()))?;
    let host = parsed
        .host_str()
        .ok_or_else(|| TransportError::InvalidUrl("missing host in url".to_string()))?;
    let host_header = match parsed.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    };

    let request = Request::builder()
        .method("GET")
        .uri(url)
        .header("Host", &host_header)
        .header("Upgrade", "websocket")
        .header("Connection", "Upgrade")
        .header("Sec-WebSocket-Key", generate_key())
        .header("Sec-WebSocket-Version", "13")
        .header("Sec-WebSocket-Protocol", WS_SUBPROTOCOL)
        .body(())
        .map_err(|e| TransportError::InvalidUrl(e.to_string()))?;

    let connector = match tls_policy {
        TlsPolicy::Verified => None,
        TlsPolicy::InsecureSkipVerify => {
            let tls = native_tls::TlsConnector::builder()
                .danger_accept_invalid_certs(true)
                .danger_accept_invalid_hostnames(true)
                .build()
                .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;
            Some(Connector::NativeTls(tls))
        }
    };

    let (ws_stream, response) = connect_async_tls_with_config(request, None, false, connector)
        .await
        .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;

    let upgrade = UpgradeResponse::from_feature_header(
        response
            .headers()
            .get(FEATURE_HEADER)
            .and_then(|v| v.to_str().ok()),
    );

    let (write, read) = ws_stream.split();

    let (send_tx, mut send_rx) = mpsc::channel::<WsMessage>(CHANNEL_BUFFER_SIZE);
    let (event_tx, event_rx) = mpsc::channel::<TransportEvent>(CHANNEL_BUFFER_SIZE);

    let connected = Arc::new(AtomicBool::new(true));
    let connected_writer = connected.clone();
    let connected_reader = connected.clone();

    tokio::spawn(async move {
        let mut write = write;
        while let Some(msg) = send_rx.recv().await {
            if let Err(e) = write.send(msg).await {
                error!("federation transport write error: {}", e);
                break;
            }
        }
        connected_writer.store(false, Ordering::Release);
    });

    tokio::spawn(async move {
        let mut read = read;
        while let Some(result) = read.next().await {
            match result {
                Ok(WsMessage::Text(text)) => {
                    if event_tx.send(TransportEvent::Text(text)).await.is_err() {
                        break;
                    }
                }
                Ok(WsMessage::Binary(data)) => {
                    warn!("federation transport: ignoring unexpected binary frame");
                    let _ = data;
                }
                Ok(WsMessage::Pong(payload)) => {
                    if event_tx.send(TransportEvent::Pong(payload)).await.is_err() {
                        break;
                    }
                }
                Ok(WsMessage::Ping(_)) => {
                    // tungstenite answers pings automatically.
                    debug!("federation transport: received ping from peer");
                }
                Ok(WsMessage::Close(frame)) => {
                    let reason = frame.map(|f| f.reason.to_string());
                    let _ = event_tx.send(TransportEvent::Disconnected { reason }).await;
                    break;
                }
                Ok(WsMessage::Frame(_)) => {}
                Err(e) => {
                    let _ = event_tx
                        .send(TransportEvent::Disconnected {
                            reason: Some(e.to_string()),
                        })
                        .await;
                    break;
                }
            }
        }
        connected_reader.store(false, Ordering::Release);
    });

    let sender = WebSocketSender {
        tx: send_tx,
        connected,
    };
    let receiver = WebSocketReceiver { rx: event_rx };

    Ok((sender, receiver, upgrade))
}
