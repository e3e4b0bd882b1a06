//! The set of currently attached viewer sinks, used by the shutdown
//! broadcaster.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::{info, warn};

use crate::frame::Frame;
use crate::sink::FrameSink;

const BROADCAST_WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// Tracks every attached sink so a shutting-down server can deliver one
/// final notice and close them. Tasks without an attached viewer are not
/// represented here; their directories are purged by a separate pass over
/// the supervisor's list.
#[derive(Default)]
pub struct ConnectionRegistry {
    sinks: Mutex<HashMap<u64, Arc<dyn FrameSink>>>,
    next_id: AtomicU64,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a sink, returning the handle to remove it with.
    pub fn add(&self, sink: Arc<dyn FrameSink>) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut sinks) = self.sinks.lock() {
            sinks.insert(id, sink);
            info!(total = sinks.len(), "viewer connection added");
        }
        id
    }

    pub fn remove(&self, id: u64) {
        if let Ok(mut sinks) = self.sinks.lock() {
            sinks.remove(&id);
            info!(total = sinks.len(), "viewer connection removed");
        }
    }

    pub fn count(&self) -> usize {
        self.sinks.lock().map(|sinks| sinks.len()).unwrap_or(0)
    }

    /// Delivers a terminal system notice to every attached sink and closes
    /// them. Writes are bounded so one stalled peer cannot hold up the rest.
    pub async fn broadcast_shutdown(&self, message: &str) {
        let sinks: Vec<Arc<dyn FrameSink>> = match self.sinks.lock() {
            Ok(mut sinks) => sinks.drain().map(|(_, sink)| sink).collect(),
            Err(_) => Vec::new(),
        };
        info!(count = sinks.len(), "broadcasting shutdown notice");

        let frame = Frame::system(message, None);
        for sink in sinks {
            let delivery = tokio::time::timeout(BROADCAST_WRITE_TIMEOUT, async {
                let _ = sink.send(&frame).await;
                sink.close().await;
            })
            .await;
            if delivery.is_err() {
                warn!("shutdown notice timed out for one viewer");
            }
        }
    }
}
