//! Shared request preflight: rate limiting, token extraction, and base-URL
//! derivation.

use std::net::SocketAddr;

use axum::http::header::HOST;
use axum::http::HeaderMap;
use serde::Deserialize;

use taskview_core::{current_unix_timestamp_ms, verify_token, Audience, TokenClaims};

use crate::error::ApiError;
use crate::state::ServerState;

/// Query parameters shared by the authenticated endpoints.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct AuthQuery {
    pub(crate) task_id: Option<String>,
    pub(crate) token: Option<String>,
}

pub(crate) fn enforce_rate_limit(
    state: &ServerState,
    peer: SocketAddr,
) -> Result<(), ApiError> {
    let client = peer.ip().to_string();
    if state
        .rate_limiter
        .allow(&client, current_unix_timestamp_ms())
    {
        Ok(())
    } else {
        Err(ApiError::too_many_requests())
    }
}

/// Verifies the `?token=` query parameter against the expected audience.
pub(crate) fn authorize(
    state: &ServerState,
    query: &AuthQuery,
    audience: Audience,
) -> Result<TokenClaims, ApiError> {
    let token = query
        .token
        .as_deref()
        .filter(|token| !token.is_empty())
        .ok_or_else(|| ApiError::unauthorized("missing token parameter"))?;
    verify_token(token, &state.config.secret, Some(audience))
        .map_err(|error| ApiError::unauthorized(error))
}

/// The task a request addresses: the explicit query parameter wins, the
/// token's claim is the fallback.
pub(crate) fn resolve_task_id(
    query: &AuthQuery,
    claims: &TokenClaims,
) -> Result<String, ApiError> {
    query
        .task_id
        .clone()
        .filter(|task_id| !task_id.is_empty())
        .or_else(|| claims.task_id.clone())
        .ok_or_else(|| ApiError::bad_request("task_id is required"))
}

/// Scheme and authority for externally visible URLs. TLS terminates in
/// front of the service, so the forwarded proto header decides the scheme.
pub(crate) fn derive_base(headers: &HeaderMap, fallback_host: &str) -> (String, String) {
    let scheme = headers
        .get("x-forwarded-proto")
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
        .unwrap_or("http")
        .to_string();
    let host = headers
        .get(HOST)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
        .unwrap_or(fallback_host)
        .to_string();
    (scheme, host)
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    #[test]
    fn unit_derive_base_prefers_forwarded_proto_and_host_header() {
        let mut headers = HeaderMap::new();
        headers.insert(HOST, HeaderValue::from_static("tasks.example.com"));
        headers.insert("x-forwarded-proto", HeaderValue::from_static("https"));
        let (scheme, host) = derive_base(&headers, "127.0.0.1:8080");
        assert_eq!(scheme, "https");
        assert_eq!(host, "tasks.example.com");
    }

    #[test]
    fn unit_derive_base_falls_back_to_plain_http_and_bind_address() {
        let (scheme, host) = derive_base(&HeaderMap::new(), "127.0.0.1:8080");
        assert_eq!(scheme, "http");
        assert_eq!(host, "127.0.0.1:8080");
    }

    #[test]
    fn unit_resolve_task_id_prefers_query_over_claim() {
        let claims = TokenClaims {
            task_id: Some("from-claim".to_string()),
            ..TokenClaims::default()
        };
        let query = AuthQuery {
            task_id: Some("from-query".to_string()),
            token: None,
        };
        assert_eq!(
            resolve_task_id(&query, &claims).expect("resolved"),
            "from-query"
        );

        let query = AuthQuery::default();
        assert_eq!(
            resolve_task_id(&query, &claims).expect("resolved"),
            "from-claim"
        );

        let error = resolve_task_id(&AuthQuery::default(), &TokenClaims::default())
            .expect_err("nothing to resolve");
        assert_eq!(error.message, "task_id is required");
    }
}
