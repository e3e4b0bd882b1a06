//! Router wiring and server bootstrap with graceful shutdown.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::routing::{any, get};
use axum::Router;
use tokio::net::TcpListener;
use tracing::{info, warn};

use taskview_stream::ConnectionRegistry;
use taskview_supervisor::Supervisor;

use crate::attach::handle_ws;
use crate::endpoints::{API_START_ENDPOINT, HEALTH_ENDPOINT, VIEWER_ENDPOINT, WS_ENDPOINT};
use crate::state::{GatewayConfig, ServerState};
use crate::submit::handle_start_task;
use crate::viewer::handle_viewer;

pub fn build_router(state: Arc<ServerState>) -> Router {
    // Submission is registered for every method so the handler can order
    // its checks: authentication first, then the POST-only policy.
    Router::new()
        .route(API_START_ENDPOINT, any(handle_start_task))
        .route(VIEWER_ENDPOINT, get(handle_viewer))
        .route(WS_ENDPOINT, get(handle_ws))
        .route(HEALTH_ENDPOINT, get(handle_health))
        .with_state(state)
}

async fn handle_health() -> &'static str {
    "OK"
}

/// Binds the gateway, serves until SIGINT/SIGTERM, then notifies every
/// attached viewer and purges all tracked task directories.
pub async fn run_server(config: GatewayConfig, supervisor: Arc<Supervisor>) -> Result<()> {
    let registry = Arc::new(ConnectionRegistry::new());
    let state = Arc::new(ServerState::new(
        config,
        supervisor.clone(),
        registry.clone(),
    ));

    let listener = TcpListener::bind(&state.config.bind)
        .await
        .with_context(|| format!("failed to bind on {}", state.config.bind))?;
    let local_addr = listener
        .local_addr()
        .context("failed to resolve bound address")?;
    info!(addr = %local_addr, "taskview gateway listening");

    let app = build_router(state);
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("server exited unexpectedly")?;

    info!("shutting down");
    registry.broadcast_shutdown("Server is shutting down").await;
    supervisor.cleanup_all();
    Ok(())
}

async fn shutdown_signal() {
    let interrupt = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(error) => {
                warn!(error = %error, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };
    tokio::select! {
        _ = interrupt => {}
        _ = terminate => {}
    }
}
