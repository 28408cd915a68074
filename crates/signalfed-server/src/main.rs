//! Standalone harness for the federation client.
//!
//! Dials a single peer signaling server, runs the join handshake, and keeps
//! the tunnel open until interrupted -- useful for manually exercising a
//! peer's federation endpoint without a full signaling hub attached.

mod health;

use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use signalfed_federation::{
    FederationClient, FederationDescriptor, FederationJoinRequest, FederationTuning, TlsPolicy,
};
use signalfed_session::{RecordingSession, SessionId};
use tracing_subscriber::EnvFilter;

use health::{start_health_server, HealthState};

#[derive(Parser)]
#[command(name = "signalfed-server")]
#[command(about = "Federation client harness")]
#[command(version)]
struct Cli {
    /// Peer signaling server URL (ws(s):// or http(s)://).
    #[arg(long)]
    signaling_url: String,

    /// Base URL presented in the hello auth block.
    #[arg(long)]
    nextcloud_url: String,

    /// Bearer token presented in the hello auth block.
    #[arg(long)]
    token: String,

    /// Room id to join on the peer.
    #[arg(long)]
    room_id: String,

    /// Room id on the remote server, if different from `room-id`.
    #[arg(long)]
    remote_room_id: Option<String>,

    /// Local session id this tunnel is proxying for.
    #[arg(long, default_value = "signalfed-harness")]
    local_session_id: String,

    /// Accept self-signed / invalid peer certificates.
    #[arg(long)]
    insecure_tls: bool,

    /// Health check listen address.
    #[arg(long, default_value = "0.0.0.0:8080")]
    health_addr: SocketAddr,

    /// Enable verbose logging.
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug,signalfed=trace")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let health_state = Arc::new(HealthState::new());
    tokio::spawn(start_health_server(cli.health_addr, health_state.clone()));

    let session = RecordingSession::new(SessionId::new(cli.local_session_id.clone()));

    let join = FederationJoinRequest {
        original_id: None,
        room_id: cli.room_id.clone(),
        room_session_id: None,
        federation: FederationDescriptor {
            signaling_url: cli.signaling_url.clone(),
            nextcloud_url: cli.nextcloud_url.clone(),
            token: cli.token.clone(),
            remote_room_id: cli.remote_room_id.clone(),
        },
    };

    let tuning = FederationTuning {
        tls_policy: if cli.insecure_tls {
            TlsPolicy::InsecureSkipVerify
        } else {
            TlsPolicy::Verified
        },
        ..Default::default()
    };

    tracing::info!(url = %cli.signaling_url, room = %cli.room_id, "dialing federation peer");
    let client = FederationClient::create(join, session.clone(), tuning)
        .await
        .context("federation handshake failed")?;
    health_state.ready.store(true, Ordering::Relaxed);
    tracing::info!(
        remote_session_id = ?client.room().map(|r| r.session_id).unwrap_or_default(),
        "federation tunnel established"
    );

    tokio::signal::ctrl_c().await.context("failed to listen for ctrl-c")?;
    tracing::info!("shutting down federation tunnel");
    health_state.ready.store(false, Ordering::Relaxed);
    client.close().await.ok();

    Ok(())
}
