//! Health check HTTP server for liveness and readiness probes.
//!
//! Exposes:
//! - `GET /healthz` -- liveness: 200 if the process is running
//! - `GET /readyz`  -- readiness: 200 once the federation tunnel is Established

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared health state, flipped to ready once [`signalfed_federation::FederationClient::create`]
/// returns and back during shutdown.
pub struct HealthState {
    pub ready: AtomicBool,
}

impl HealthState {
    pub fn new() -> Self {
        Self {
            ready: AtomicBool::new(false),
        }
    }
}

impl Default for HealthState {
    fn default() -> Self {
        Self::new()
    }
}

pub async fn start_health_server(addr: std::net::SocketAddr, state: Arc<HealthState>) {
    let app = Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .with_state(state);

    match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => {
            tracing::info!("health: http://{}/healthz", addr);
            if let Err(e) = axum::serve(listener, app).await {
                tracing::error!("health server error: {}", e);
            }
        }
        Err(e) => {
            tracing::error!("failed to bind health server on {}: {}", addr, e);
        }
    }
}

async fn healthz() -> (StatusCode, &'static str) {
    (StatusCode::OK, "ok\n")
}

async fn readyz(State(state): State<Arc<HealthState>>) -> (StatusCode, &'static str) {
    if state.ready.load(Ordering::Relaxed) {
        (StatusCode::OK, "ready\n")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "not ready\n")
    }
}
