//! `GET /ws`: upgrades an authenticated viewer onto one task's live output.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, Query, State};
use axum::http::header::ORIGIN;
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use futures_util::StreamExt;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use taskview_core::Audience;
use taskview_stream::{
    monitor_task, tail_file, Frame, FrameSink, MonitorTimings, OutputStream, WsSink,
};
use taskview_supervisor::{read_pid_file, TaskSnapshot};

use crate::error::ApiError;
use crate::preflight::{authorize, enforce_rate_limit, resolve_task_id, AuthQuery};
use crate::state::ServerState;

const PING_PERIOD: Duration = Duration::from_secs(30);
const READ_TIMEOUT: Duration = Duration::from_secs(60);

pub(crate) async fn handle_ws(
    State(state): State<Arc<ServerState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    Query(query): Query<AuthQuery>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    if let Err(error) = enforce_rate_limit(&state, peer) {
        return error.into_response();
    }
    let claims = match authorize(&state, &query, Audience::Viewer) {
        Ok(claims) => claims,
        Err(error) => {
            info!(peer = %peer, error = %error.message, "attach auth failed");
            return error.into_response();
        }
    };
    let task_id = match resolve_task_id(&query, &claims) {
        Ok(task_id) => task_id,
        Err(error) => return error.into_response(),
    };
    let task = match state.supervisor.get(&task_id) {
        Ok(task) => task,
        Err(error) => {
            info!(task_id = %task_id, "attach to unknown task");
            return ApiError::not_found(format!("Task not found: {error}")).into_response();
        }
    };
    if let Err(error) = check_origin(&state, &headers) {
        return error.into_response();
    }

    info!(task_id = %task_id, peer = %peer, "viewer attaching");
    ws.on_upgrade(move |socket| run_attach(state, task, socket))
}

fn check_origin(state: &ServerState, headers: &HeaderMap) -> Result<(), ApiError> {
    let allowed = &state.config.allowed_origins;
    if allowed.is_empty() {
        return Ok(());
    }
    let origin = headers
        .get(ORIGIN)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();
    if allowed.iter().any(|entry| entry == origin) {
        Ok(())
    } else {
        Err(ApiError::forbidden("Origin not allowed"))
    }
}

/// Runs one attached viewer: the connected notice, both tailers, the timeout
/// engine, and the read/ping pump, all scoped to one cancellation token.
async fn run_attach(state: Arc<ServerState>, task: TaskSnapshot, socket: WebSocket) {
    let (writer, mut reader) = socket.split();
    let sink: Arc<dyn FrameSink> = Arc::new(WsSink::new(writer));
    let registry_id = state.registry.add(sink.clone());
    let cancel = CancellationToken::new();

    let connected = match read_pid_file(&task.output_dir.join("pid")) {
        Some(pid) => Frame::system("WebSocket connected. Process started", Some(pid)),
        None => Frame::system(
            "WebSocket connected. Waiting for process to start...",
            None,
        ),
    };
    if sink.send(&connected).await.is_err() {
        state.registry.remove(registry_id);
        return;
    }

    tokio::spawn(tail_file(
        cancel.clone(),
        sink.clone(),
        task.output_dir.join("stdout"),
        OutputStream::Stdout,
    ));
    tokio::spawn(tail_file(
        cancel.clone(),
        sink.clone(),
        task.output_dir.join("stderr"),
        OutputStream::Stderr,
    ));
    tokio::spawn(monitor_task(
        cancel.clone(),
        sink.clone(),
        state.supervisor.clone(),
        task.id,
        task.output_dir.clone(),
        task.max_execution_time,
        MonitorTimings::default(),
    ));

    // Read pump and ping ticker. Any inbound frame (pongs included) pushes
    // the read deadline out.
    let mut ping = tokio::time::interval_at(Instant::now() + PING_PERIOD, PING_PERIOD);
    let mut read_deadline = Instant::now() + READ_TIMEOUT;
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ping.tick() => {
                if sink.send_ping().await.is_err() {
                    break;
                }
            }
            inbound = reader.next() => {
                match inbound {
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(_)) => {
                        read_deadline = Instant::now() + READ_TIMEOUT;
                    }
                }
            }
            _ = tokio::time::sleep_until(read_deadline) => {
                debug!(task_id = %task.id, "viewer read deadline elapsed");
                break;
            }
        }
    }

    cancel.cancel();
    sink.close().await;
    state.registry.remove(registry_id);
    debug!(task_id = %task.id, "viewer detached");
}
