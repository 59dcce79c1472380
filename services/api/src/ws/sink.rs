use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, stream::SplitSink};
use poker_core::{ClientSink, SinkError};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;

/// The write half of a client WebSocket, shared between the connection's own
/// task and session broadcasts.
pub struct WsSink {
    inner: Mutex<SplitSink<WebSocket, Message>>,
    closed: AtomicBool,
}

impl WsSink {
    pub fn new(inner: SplitSink<WebSocket, Message>) -> Self {
        Self {
            inner: Mutex::new(inner),
            closed: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl ClientSink for WsSink {
    async fn send_text(&self, text: String) -> Result<(), SinkError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(SinkError::Closed);
        }
        self.inner
            .lock()
            .await
            .send(Message::Text(text.into()))
            .await
            .map_err(|e| SinkError::Transport(e.to_string()))
    }

    async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let _ = self.inner.lock().await.close().await;
    }
}
