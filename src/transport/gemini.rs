//! WebSocket client for the Gemini Live `BidiGenerateContent` endpoint.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use secrecy::ExposeSecret;
use tokio::sync::{broadcast, mpsc};
use tokio_tungstenite::tungstenite::Message;

use crate::transport::{Dial, LiveSession, TransportError};
use crate::types::audio::EncodedChunk;
use crate::types::config::SessionConfig;
use crate::types::events::{ClientMessage, ServerMessage, SessionEvent};

const GEMINI_LIVE_URL: &str = "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent";
const EVENT_CAPACITY: usize = 1024;

/// Dials real Gemini Live sessions over WebSocket.
pub struct GeminiDial;

#[async_trait]
impl Dial for GeminiDial {
    async fn dial(&self, config: &SessionConfig) -> Result<Box<dyn LiveSession>, TransportError> {
        let session = GeminiSession::connect(config).await?;
        Ok(Box::new(session))
    }
}

/// A connected session: a send task draining an mpsc channel into the socket
/// and a recv task broadcasting parsed server events.
pub struct GeminiSession {
    c_tx: Option<mpsc::Sender<ClientMessage>>,
    s_tx: broadcast::Sender<SessionEvent>,
    send_handle: tokio::task::JoinHandle<()>,
    recv_handle: tokio::task::JoinHandle<()>,
}

impl GeminiSession {
    async fn connect(config: &SessionConfig) -> Result<Self, TransportError> {
        let url = format!(
            "{GEMINI_LIVE_URL}?key={}",
            config.api_key().expose_secret()
        );
        let (ws_stream, _) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        tracing::info!(model = config.model(), "connected to Gemini Live");

        let (mut write, mut read) = ws_stream.split();
        let (c_tx, mut c_rx) = mpsc::channel::<ClientMessage>(EVENT_CAPACITY);
        let (s_tx, _) = broadcast::channel(EVENT_CAPACITY);

        let send_handle = tokio::spawn(async move {
            while let Some(message) = c_rx.recv().await {
                match serde_json::to_string(&message) {
                    Ok(text) => {
                        if let Err(e) = write.send(Message::Text(text)).await {
                            tracing::error!("failed to send message: {}", e);
                            break;
                        }
                    }
                    Err(e) => {
                        tracing::error!("failed to serialize message: {}", e);
                    }
                }
            }
            // Sender side gone: say goodbye to the server.
            if let Err(e) = write.send(Message::Close(None)).await {
                tracing::debug!("close frame not delivered: {}", e);
            }
        });

        let events = s_tx.clone();
        let recv_handle = tokio::spawn(async move {
            while let Some(message) = read.next().await {
                let message = match message {
                    Err(e) => {
                        let _ = events.send(SessionEvent::TransportError(e.to_string()));
                        break;
                    }
                    Ok(message) => message,
                };
                match message {
                    // Gemini Live delivers JSON in both text and binary frames.
                    Message::Text(text) => Self::dispatch(&events, text.as_bytes()),
                    Message::Binary(bin) => Self::dispatch(&events, &bin),
                    Message::Close(frame) => {
                        let reason = frame
                            .map(|f| f.reason.to_string())
                            .unwrap_or_else(|| "connection closed".to_string());
                        tracing::info!("live session closed: {}", reason);
                        let _ = events.send(SessionEvent::Closed { reason });
                        break;
                    }
                    _ => {}
                }
            }
        });

        let session = Self {
            c_tx: Some(c_tx),
            s_tx,
            send_handle,
            recv_handle,
        };
        session
            .send(ClientMessage::setup(
                config.model(),
                config.voice(),
                config.persona(),
            ))
            .await?;
        Ok(session)
    }

    fn dispatch(events: &broadcast::Sender<SessionEvent>, payload: &[u8]) {
        match serde_json::from_slice::<ServerMessage>(payload) {
            Ok(message) => {
                if events.send(SessionEvent::Message(message)).is_err() {
                    tracing::debug!("no subscribers for server event");
                }
            }
            Err(e) => {
                tracing::error!("failed to deserialize server message: {}", e);
            }
        }
    }

    async fn send(&self, message: ClientMessage) -> Result<(), TransportError> {
        match self.c_tx {
            Some(ref tx) => tx
                .send(message)
                .await
                .map_err(|_| TransportError::Send("send channel closed".to_string())),
            None => Err(TransportError::NotConnected),
        }
    }
}

#[async_trait]
impl LiveSession for GeminiSession {
    async fn send_audio(&mut self, chunk: EncodedChunk) -> Result<(), TransportError> {
        self.send(ClientMessage::realtime_input(chunk)).await
    }

    fn events(&self) -> broadcast::Receiver<SessionEvent> {
        self.s_tx.subscribe()
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        // Dropping the sender ends the send task, which emits a close frame;
        // the recv task ends when the server answers or the socket dies.
        self.c_tx.take();
        (&mut self.send_handle)
            .await
            .map_err(|e| TransportError::Send(format!("send task failed: {e}")))
    }
}

impl Drop for GeminiSession {
    fn drop(&mut self) {
        // The send task ends on its own once c_tx drops; the recv task would
        // otherwise linger until the server hangs up.
        self.recv_handle.abort();
    }
}
