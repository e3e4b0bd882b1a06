use std::path::PathBuf;
use std::sync::Arc;

use taskview_stream::ConnectionRegistry;
use taskview_supervisor::Supervisor;

use crate::ratelimit::RateLimiter;

/// Resolved gateway settings, assembled by the binary from config and flags.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Bind address, e.g. `0.0.0.0:8080`.
    pub bind: String,
    /// Shared secret for the token authority.
    pub secret: String,
    /// Directory holding `viewer.html` and the `<status>.html` error pages.
    pub html_dir: PathBuf,
    /// Exact-match origin allow-list for attaches; empty allows any origin.
    pub allowed_origins: Vec<String>,
    /// Accepted requests per client per minute; `0` disables limiting.
    pub rate_limit_rpm: u64,
}

/// Shared state behind every handler.
pub struct ServerState {
    pub config: GatewayConfig,
    pub supervisor: Arc<Supervisor>,
    pub registry: Arc<ConnectionRegistry>,
    pub(crate) rate_limiter: RateLimiter,
}

impl ServerState {
    pub fn new(
        config: GatewayConfig,
        supervisor: Arc<Supervisor>,
        registry: Arc<ConnectionRegistry>,
    ) -> Self {
        let rate_limiter = RateLimiter::new(config.rate_limit_rpm);
        Self {
            config,
            supervisor,
            registry,
            rate_limiter,
        }
    }
}
