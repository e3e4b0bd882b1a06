//! `GET /viewer`: the HTML shell a browser loads to watch one task.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{ConnectInfo, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use tracing::{info, warn};

use taskview_core::Audience;

use crate::endpoints::WS_ENDPOINT;
use crate::html::{error_page, load_viewer_template};
use crate::preflight::{authorize, derive_base, enforce_rate_limit, resolve_task_id, AuthQuery};
use crate::state::ServerState;

pub(crate) async fn handle_viewer(
    State(state): State<Arc<ServerState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    Query(query): Query<AuthQuery>,
    headers: HeaderMap,
) -> Response {
    if let Err(error) = enforce_rate_limit(&state, peer) {
        return error.into_response();
    }

    let html_dir = &state.config.html_dir;
    let claims = match authorize(&state, &query, Audience::Viewer) {
        Ok(claims) => claims,
        Err(error) => {
            info!(peer = %peer, error = %error.message, "viewer auth failed");
            return error_page(html_dir, StatusCode::UNAUTHORIZED);
        }
    };
    let task_id = match resolve_task_id(&query, &claims) {
        Ok(task_id) => task_id,
        Err(_) => return error_page(html_dir, StatusCode::BAD_REQUEST),
    };
    if state.supervisor.get(&task_id).is_err() {
        info!(task_id = %task_id, "viewer requested an unknown task");
        return error_page(html_dir, StatusCode::NOT_FOUND);
    }

    // The attach channel reuses the viewer token from the query string.
    let Some(token) = query.token.as_deref().filter(|token| !token.is_empty()) else {
        return error_page(html_dir, StatusCode::BAD_REQUEST);
    };

    let (scheme, host) = derive_base(&headers, &state.config.bind);
    let ws_scheme = if scheme == "https" { "wss" } else { "ws" };
    let ws_url = format!("{ws_scheme}://{host}{WS_ENDPOINT}?task_id={task_id}&token={token}");

    let template = match load_viewer_template(html_dir) {
        Ok(template) => template,
        Err(error) => {
            warn!(error = %error, "viewer template unavailable");
            return error_page(html_dir, StatusCode::INTERNAL_SERVER_ERROR);
        }
    };
    let page = template
        .replace("{{.TaskID}}", &task_id)
        .replace("{{.WebSocketURL}}", &ws_url);

    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/html; charset=utf-8")],
        page,
    )
        .into_response()
}
