use async_trait::async_trait;
use std::fmt;
use uuid::Uuid;

/// Identifies one live client connection within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Failure to deliver a message to a client.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("connection is closed")]
    Closed,
    #[error("transport error: {0}")]
    Transport(String),
}

/// The outbound half of a client's duplex channel.
///
/// Sessions only ever talk to clients through this trait, which keeps the
/// engine independent of the transport that carries the frames.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ClientSink: Send + Sync {
    /// Writes one text frame to the client.
    async fn send_text(&self, text: String) -> Result<(), SinkError>;

    /// Releases the underlying connection. Further sends should fail.
    async fn close(&self);
}
