use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::types::audio::EncodedChunk;
use crate::types::config::SessionConfig;
use crate::types::events::SessionEvent;

pub mod gemini;

pub use gemini::GeminiDial;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("failed to connect: {0}")]
    Connect(String),

    #[error("failed to send on live session: {0}")]
    Send(String),

    #[error("session is not connected")]
    NotConnected,
}

/// One live bidirectional connection to the speech model. Exactly one exists
/// at a time; the session manager owns it exclusively.
#[async_trait]
pub trait LiveSession: Send + Sync {
    /// Forwards one encoded microphone chunk to the model.
    async fn send_audio(&mut self, chunk: EncodedChunk) -> Result<(), TransportError>;

    /// Subscribes to the session's message/error/close events.
    fn events(&self) -> broadcast::Receiver<SessionEvent>;

    /// Closes the connection. Close failures are reported but callers treat
    /// teardown as best-effort.
    async fn close(&mut self) -> Result<(), TransportError>;
}

/// Opens live sessions. The seam that lets tests drive the session manager
/// with a fake transport.
#[async_trait]
pub trait Dial: Send + Sync {
    async fn dial(&self, config: &SessionConfig) -> Result<Box<dyn LiveSession>, TransportError>;
}
