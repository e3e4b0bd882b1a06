//! Route path and policy constants for the gateway surface.

pub(crate) const API_START_ENDPOINT: &str = "/api/start";
pub(crate) const VIEWER_ENDPOINT: &str = "/viewer";
pub(crate) const WS_ENDPOINT: &str = "/ws";
pub(crate) const HEALTH_ENDPOINT: &str = "/health";

/// Upper bound on a submission body. Larger payloads are refused before any
/// parsing happens.
pub(crate) const MAX_JSON_SIZE: usize = 1024 * 1024;

/// Viewer tokens minted for accepted submissions live this long.
pub(crate) const VIEWER_TOKEN_TTL_SECS: u64 = 24 * 60 * 60;
