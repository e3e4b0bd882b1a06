//! `POST /api/start`: authenticated, body-bound task submission.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::{ConnectInfo, Query, State};
use axum::http::{HeaderMap, Method};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{info, warn};

use taskview_core::{canonical_json, issue_viewer_token, sha1_hex, Audience};

use crate::endpoints::{MAX_JSON_SIZE, VIEWER_ENDPOINT, VIEWER_TOKEN_TTL_SECS};
use crate::error::ApiError;
use crate::preflight::{authorize, derive_base, enforce_rate_limit, AuthQuery};
use crate::state::ServerState;

#[derive(Debug, Deserialize)]
struct StartTaskRequest {
    #[serde(default)]
    task_name: String,
    #[serde(default)]
    parameters: Map<String, Value>,
}

#[derive(Debug, Serialize)]
struct StartTaskResponse {
    task_id: String,
    viewer_url: String,
}

pub(crate) async fn handle_start_task(
    State(state): State<Arc<ServerState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    Query(query): Query<AuthQuery>,
    method: Method,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    match start_task(&state, peer, &query, method, &headers, &body) {
        Ok(response) => response,
        Err(error) => error.into_response(),
    }
}

fn start_task(
    state: &ServerState,
    peer: SocketAddr,
    query: &AuthQuery,
    method: Method,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<Response, ApiError> {
    enforce_rate_limit(state, peer)?;
    let claims = authorize(state, query, Audience::Api)?;

    if method != Method::POST {
        return Err(ApiError::method_not_allowed());
    }
    if body.len() > MAX_JSON_SIZE {
        return Err(ApiError::payload_too_large(format!(
            "request body exceeds {MAX_JSON_SIZE} bytes"
        )));
    }

    // The token binds to the canonical form of the payload, so formatting
    // and key order never matter.
    let canonical = canonical_json(body)
        .map_err(|_| ApiError::bad_request("Invalid request format"))?;
    let body_hash = sha1_hex(canonical.as_bytes());
    let bound_hash = claims.body_sha1.as_deref().unwrap_or_default();
    if bound_hash.is_empty() || bound_hash != body_hash {
        warn!(peer = %peer, "submission body does not match token digest");
        return Err(ApiError::unauthorized("request body does not match token"));
    }

    let request: StartTaskRequest = serde_json::from_str(&canonical)
        .map_err(|_| ApiError::bad_request("Invalid request format"))?;
    if request.task_name.is_empty() {
        return Err(ApiError::bad_request("task_name is required"));
    }

    let task_id = state
        .supervisor
        .launch(&request.task_name, &request.parameters)
        .map_err(|error| {
            if error.is_rejection() {
                ApiError::bad_request(error.to_string())
            } else {
                warn!(task_name = %request.task_name, error = %error, "launch failed");
                ApiError::internal(format!("Failed to start task: {error}"))
            }
        })?;
    info!(task_id = %task_id, task_name = %request.task_name, peer = %peer, "task accepted");

    let viewer_token = issue_viewer_token(
        &task_id,
        &state.config.secret,
        Duration::from_secs(VIEWER_TOKEN_TTL_SECS),
    );
    let (scheme, host) = derive_base(headers, &state.config.bind);
    let viewer_url =
        format!("{scheme}://{host}{VIEWER_ENDPOINT}?task_id={task_id}&token={viewer_token}");

    Ok(Json(StartTaskResponse {
        task_id: task_id.to_string(),
        viewer_url,
    })
    .into_response())
}
