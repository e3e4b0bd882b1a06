//! The serialized write end of one viewer channel.

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::SplitSink;
use futures_util::SinkExt;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::debug;

use crate::frame::Frame;

/// The peer is gone; no further writes will be attempted.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("viewer sink closed")]
pub struct SinkClosed;

/// Write half of an attached viewer. Every producer (tailers, the timeout
/// engine, the ping ticker, the shutdown broadcaster) goes through one of
/// these, so frames never interleave mid-write.
#[async_trait]
pub trait FrameSink: Send + Sync {
    async fn send(&self, frame: &Frame) -> Result<(), SinkClosed>;
    async fn send_ping(&self) -> Result<(), SinkClosed>;
    async fn close(&self);
}

/// [`FrameSink`] over the write half of an upgraded websocket.
pub struct WsSink {
    writer: Mutex<SplitSink<WebSocket, Message>>,
}

impl WsSink {
    pub fn new(writer: SplitSink<WebSocket, Message>) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }
}

#[async_trait]
impl FrameSink for WsSink {
    async fn send(&self, frame: &Frame) -> Result<(), SinkClosed> {
        let text = match serde_json::to_string(frame) {
            Ok(text) => text,
            Err(error) => {
                debug!(error = %error, "dropping unserializable frame");
                return Ok(());
            }
        };
        let mut writer = self.writer.lock().await;
        writer
            .send(Message::Text(text.into()))
            .await
            .map_err(|_| SinkClosed)
    }

    async fn send_ping(&self) -> Result<(), SinkClosed> {
        let mut writer = self.writer.lock().await;
        writer
            .send(Message::Ping(Vec::new().into()))
            .await
            .map_err(|_| SinkClosed)
    }

    async fn close(&self) {
        let mut writer = self.writer.lock().await;
        let _ = writer.send(Message::Close(None)).await;
        let _ = writer.close().await;
    }
}
