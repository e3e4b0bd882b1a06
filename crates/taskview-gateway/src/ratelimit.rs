//! Per-client fixed-window rate limiting for the public endpoints.

use std::collections::BTreeMap;
use std::sync::Mutex;

const WINDOW_MS: u64 = 60_000;

#[derive(Debug, Default, Clone)]
struct RateBucket {
    window_started_unix_ms: u64,
    accepted_requests: u64,
}

/// Counts accepted requests per client in one-minute windows. A limit of
/// zero disables the limiter entirely.
#[derive(Debug)]
pub(crate) struct RateLimiter {
    max_per_minute: u64,
    buckets: Mutex<BTreeMap<String, RateBucket>>,
}

impl RateLimiter {
    pub(crate) fn new(max_per_minute: u64) -> Self {
        Self {
            max_per_minute,
            buckets: Mutex::new(BTreeMap::new()),
        }
    }

    /// Whether `client` may proceed at `now_unix_ms`.
    pub(crate) fn allow(&self, client: &str, now_unix_ms: u64) -> bool {
        if self.max_per_minute == 0 {
            return true;
        }
        let Ok(mut buckets) = self.buckets.lock() else {
            return true;
        };

        // Drop buckets idle long enough that their window cannot matter.
        buckets.retain(|_, bucket| {
            now_unix_ms.saturating_sub(bucket.window_started_unix_ms) < WINDOW_MS.saturating_mul(3)
        });

        let bucket = buckets.entry(client.to_string()).or_default();
        if bucket.window_started_unix_ms == 0
            || now_unix_ms.saturating_sub(bucket.window_started_unix_ms) >= WINDOW_MS
        {
            bucket.window_started_unix_ms = now_unix_ms;
            bucket.accepted_requests = 0;
        }
        if bucket.accepted_requests >= self.max_per_minute {
            return false;
        }
        bucket.accepted_requests = bucket.accepted_requests.saturating_add(1);
        true
    }
}
