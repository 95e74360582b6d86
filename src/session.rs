//! Session lifecycle manager: owns the single live session, serializes
//! init/reset/close through one command loop, and translates inbound session
//! events into the notifications the UI renders.

use tokio::sync::{broadcast, mpsc};

use crate::transport::Dial;
use crate::transport::LiveSession;
use crate::types::audio::{Base64EncodedAudioBytes, EncodedChunk};
use crate::types::config::SessionConfig;
use crate::types::events::{ServerMessage, SessionEvent};

/// Requests accepted by the manager's run loop. Funneling everything through
/// one mpsc channel is what serializes concurrent init/reset callers.
#[derive(Debug)]
pub enum Command {
    InitSession,
    SendAudioChunk(EncodedChunk),
    ResetSession,
    Close,
}

/// Everything the core emits for the UI/host to render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    Status(String),
    Error(String),
    Audio(Base64EncodedAudioBytes),
    Interrupted,
}

/// Lifecycle of the single live session. `Closed` doubles as the error
/// state; recovery from it is an explicit reset, never automatic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Opening,
    Open,
    Closing,
    Closed,
}

pub struct SessionManager<D: Dial> {
    dial: D,
    config: SessionConfig,
    state: SessionState,
    session: Option<Box<dyn LiveSession>>,
    events: Option<broadcast::Receiver<SessionEvent>>,
    notify_tx: mpsc::Sender<Notification>,
}

impl<D: Dial> SessionManager<D> {
    pub fn new(dial: D, config: SessionConfig, notify_tx: mpsc::Sender<Notification>) -> Self {
        Self {
            dial,
            config,
            state: SessionState::Uninitialized,
            session: None,
            events: None,
            notify_tx,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Drives the manager until `Command::Close` arrives or the command
    /// channel is dropped.
    pub async fn run(mut self, mut commands: mpsc::Receiver<Command>) {
        loop {
            if let Some(mut events) = self.events.take() {
                tokio::select! {
                    command = commands.recv() => {
                        self.events = Some(events);
                        let command = match command {
                            Some(command) => command,
                            None => Command::Close,
                        };
                        if !self.handle_command(command).await {
                            break;
                        }
                    }
                    event = events.recv() => {
                        self.events = Some(events);
                        self.handle_session_event(event).await;
                    }
                }
            } else {
                let command = match commands.recv().await {
                    Some(command) => command,
                    None => Command::Close,
                };
                if !self.handle_command(command).await {
                    break;
                }
            }
        }
    }

    /// Returns false once the terminal close has been processed.
    async fn handle_command(&mut self, command: Command) -> bool {
        match command {
            Command::InitSession => self.init_session().await,
            Command::SendAudioChunk(chunk) => self.send_audio_chunk(chunk).await,
            Command::ResetSession => self.reset_session().await,
            Command::Close => {
                self.close().await;
                return false;
            }
        }
        true
    }

    /// Opens a session with the current config. A second init while a session
    /// is opening or open supersedes it: the prior session is closed first,
    /// so exactly one session is ever live.
    async fn init_session(&mut self) {
        if self.session.is_some() {
            self.close_current().await;
        }
        self.state = SessionState::Opening;
        match self.dial.dial(&self.config).await {
            Ok(session) => {
                self.events = Some(session.events());
                self.session = Some(session);
                // Still Opening; Open comes with the server's setup ack.
            }
            Err(e) => {
                self.state = SessionState::Closed;
                self.notify(Notification::Error(e.to_string())).await;
            }
        }
    }

    /// Forwards a chunk to the live session. A chunk arriving with no open
    /// session is dropped silently: capture races teardown by design.
    async fn send_audio_chunk(&mut self, chunk: EncodedChunk) {
        if self.state != SessionState::Open {
            tracing::debug!("dropping audio chunk: session not open");
            return;
        }
        let Some(session) = self.session.as_mut() else {
            tracing::debug!("dropping audio chunk: no live session");
            return;
        };
        if let Err(e) = session.send_audio(chunk).await {
            self.state = SessionState::Closed;
            self.session = None;
            self.events = None;
            self.notify(Notification::Error(e.to_string())).await;
        }
    }

    /// Closes any existing session (best-effort) and opens a fresh one with
    /// the current config. The only path that replaces an active session.
    async fn reset_session(&mut self) {
        self.close_current().await;
        self.init_session().await;
    }

    /// Terminal teardown.
    async fn close(&mut self) {
        self.close_current().await;
        self.state = SessionState::Closed;
        self.notify(Notification::Status("Session closed.".to_string()))
            .await;
    }

    async fn close_current(&mut self) {
        if let Some(mut session) = self.session.take() {
            self.state = SessionState::Closing;
            if let Err(e) = session.close().await {
                tracing::warn!("failed to close live session: {}", e);
            }
        }
        self.events = None;
    }

    async fn handle_session_event(
        &mut self,
        event: Result<SessionEvent, broadcast::error::RecvError>,
    ) {
        match event {
            Ok(event) => {
                for notification in self.apply(event) {
                    self.notify(notification).await;
                }
            }
            Err(broadcast::error::RecvError::Lagged(n)) => {
                tracing::warn!("session event stream lagged by {} messages", n);
            }
            Err(broadcast::error::RecvError::Closed) => {
                self.session = None;
                self.events = None;
                if self.state != SessionState::Closed {
                    self.state = SessionState::Closed;
                    self.notify(Notification::Status(
                        "Session closed: event stream ended".to_string(),
                    ))
                    .await;
                }
            }
        }
    }

    /// The state machine proper: one inbound event in, the notifications it
    /// produces out. Audio and interruption may co-occur in one message and
    /// both fire.
    fn apply(&mut self, event: SessionEvent) -> Vec<Notification> {
        match event {
            SessionEvent::Message(message) => self.apply_message(&message),
            SessionEvent::TransportError(cause) => {
                self.state = SessionState::Closed;
                self.session = None;
                self.events = None;
                vec![Notification::Error(cause)]
            }
            SessionEvent::Closed { reason } => {
                self.state = SessionState::Closed;
                self.session = None;
                self.events = None;
                vec![Notification::Status(format!("Session closed: {reason}"))]
            }
        }
    }

    fn apply_message(&mut self, message: &ServerMessage) -> Vec<Notification> {
        if message.setup_complete.is_some() {
            if self.state == SessionState::Opening {
                self.state = SessionState::Open;
                return vec![Notification::Status(
                    "Session opened. Start recording.".to_string(),
                )];
            }
            tracing::debug!("setup ack in state {:?} ignored", self.state);
            return Vec::new();
        }

        let mut notifications = Vec::new();
        if let Some(content) = &message.server_content {
            if let Some(audio) = content.inline_audio() {
                notifications.push(Notification::Audio(audio.to_string()));
            }
            if content.is_interrupted() {
                notifications.push(Notification::Interrupted);
            }
        }
        notifications
    }

    async fn notify(&self, notification: Notification) {
        if self.notify_tx.send(notification).await.is_err() {
            tracing::warn!("notification receiver dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{Dial, LiveSession, TransportError};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex};
    use tokio::sync::broadcast;

    struct FakeSession {
        events_tx: broadcast::Sender<SessionEvent>,
        sent: Arc<Mutex<Vec<EncodedChunk>>>,
        closed: Arc<AtomicBool>,
    }

    #[async_trait]
    impl LiveSession for FakeSession {
        async fn send_audio(&mut self, chunk: EncodedChunk) -> Result<(), TransportError> {
            self.sent.lock().unwrap().push(chunk);
            Ok(())
        }

        fn events(&self) -> broadcast::Receiver<SessionEvent> {
            self.events_tx.subscribe()
        }

        async fn close(&mut self) -> Result<(), TransportError> {
            self.closed.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    /// Hands out FakeSessions and remembers each one's side channels so the
    /// test can push events and inspect what was sent or closed.
    #[derive(Clone, Default)]
    struct FakeDial {
        dialed: Arc<Mutex<Vec<DialedSession>>>,
    }

    #[derive(Clone)]
    struct DialedSession {
        model: String,
        events_tx: broadcast::Sender<SessionEvent>,
        sent: Arc<Mutex<Vec<EncodedChunk>>>,
        closed: Arc<AtomicBool>,
    }

    #[async_trait]
    impl Dial for FakeDial {
        async fn dial(
            &self,
            config: &SessionConfig,
        ) -> Result<Box<dyn LiveSession>, TransportError> {
            let (events_tx, _) = broadcast::channel(16);
            let record = DialedSession {
                model: config.model().to_string(),
                events_tx: events_tx.clone(),
                sent: Arc::new(Mutex::new(Vec::new())),
                closed: Arc::new(AtomicBool::new(false)),
            };
            self.dialed.lock().unwrap().push(record.clone());
            Ok(Box::new(FakeSession {
                events_tx,
                sent: record.sent,
                closed: record.closed,
            }))
        }
    }

    impl FakeDial {
        fn dial_count(&self) -> usize {
            self.dialed.lock().unwrap().len()
        }

        fn session(&self, index: usize) -> DialedSession {
            self.dialed.lock().unwrap()[index].clone()
        }
    }

    /// Dialer that always fails, for the transport-error-at-open path.
    struct RefusingDial;

    #[async_trait]
    impl Dial for RefusingDial {
        async fn dial(
            &self,
            _config: &SessionConfig,
        ) -> Result<Box<dyn LiveSession>, TransportError> {
            Err(TransportError::Connect("connection refused".to_string()))
        }
    }

    fn test_config() -> SessionConfig {
        SessionConfig::new("test-key").build()
    }

    fn manager<D: Dial>(dial: D) -> (SessionManager<D>, mpsc::Receiver<Notification>) {
        let (notify_tx, notify_rx) = mpsc::channel(64);
        (SessionManager::new(dial, test_config(), notify_tx), notify_rx)
    }

    fn setup_complete() -> SessionEvent {
        SessionEvent::Message(ServerMessage {
            setup_complete: Some(Default::default()),
            server_content: None,
        })
    }

    fn audio_message(data: &str, interrupted: bool) -> SessionEvent {
        let text = format!(
            r#"{{"serverContent": {{"modelTurn": {{"parts": [{{"inlineData": {{"mimeType": "audio/pcm;rate=24000", "data": "{data}"}}}}]}}, "interrupted": {interrupted}}}}}"#
        );
        SessionEvent::Message(serde_json::from_str(&text).unwrap())
    }

    #[tokio::test]
    async fn init_opens_on_setup_ack() {
        let dial = FakeDial::default();
        let (mut manager, _notify_rx) = manager(dial.clone());

        manager.init_session().await;
        assert_eq!(manager.state(), SessionState::Opening);

        let notifications = manager.apply(setup_complete());
        assert_eq!(manager.state(), SessionState::Open);
        assert_eq!(
            notifications,
            vec![Notification::Status(
                "Session opened. Start recording.".to_string()
            )]
        );
        assert_eq!(dial.session(0).model, "gemini-2.5-flash-preview-native-audio-dialog");
    }

    #[tokio::test]
    async fn audio_and_interruption_both_dispatch_from_one_message() {
        let (mut manager, _notify_rx) = manager(FakeDial::default());
        manager.init_session().await;
        manager.apply(setup_complete());

        let notifications = manager.apply(audio_message("UklGRg==", true));
        assert_eq!(
            notifications,
            vec![
                Notification::Audio("UklGRg==".to_string()),
                Notification::Interrupted,
            ]
        );
    }

    #[tokio::test]
    async fn dial_failure_lands_in_closed_with_error() {
        let (mut manager, mut notify_rx) = manager(RefusingDial);
        manager.init_session().await;

        assert_eq!(manager.state(), SessionState::Closed);
        match notify_rx.try_recv().unwrap() {
            Notification::Error(cause) => assert!(cause.contains("connection refused")),
            other => panic!("expected error notification, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn transport_error_mid_session_closes_without_retry() {
        let dial = FakeDial::default();
        let (mut manager, _notify_rx) = manager(dial.clone());
        manager.init_session().await;
        manager.apply(setup_complete());

        let notifications =
            manager.apply(SessionEvent::TransportError("stream reset".to_string()));
        assert_eq!(manager.state(), SessionState::Closed);
        assert_eq!(
            notifications,
            vec![Notification::Error("stream reset".to_string())]
        );
        // No automatic redial.
        assert_eq!(dial.dial_count(), 1);
    }

    #[tokio::test]
    async fn late_chunk_is_dropped_not_transmitted() {
        let dial = FakeDial::default();
        let (mut manager, _notify_rx) = manager(dial.clone());
        manager.init_session().await;
        manager.apply(setup_complete());
        manager.close().await;

        let chunk = EncodedChunk {
            data: "AAAA".to_string(),
            mime_type: "audio/pcm;rate=16000".to_string(),
        };
        manager.send_audio_chunk(chunk).await;
        assert!(dial.session(0).sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn chunk_sent_while_open_reaches_the_session() {
        let dial = FakeDial::default();
        let (mut manager, _notify_rx) = manager(dial.clone());
        manager.init_session().await;
        manager.apply(setup_complete());

        let chunk = EncodedChunk {
            data: "AAAA".to_string(),
            mime_type: "audio/pcm;rate=16000".to_string(),
        };
        manager.send_audio_chunk(chunk.clone()).await;
        assert_eq!(dial.session(0).sent.lock().unwrap().as_slice(), &[chunk]);
    }

    #[tokio::test]
    async fn second_init_supersedes_the_first_session() {
        let dial = FakeDial::default();
        let (mut manager, _notify_rx) = manager(dial.clone());
        manager.init_session().await;
        manager.apply(setup_complete());
        assert_eq!(manager.state(), SessionState::Open);

        manager.init_session().await;
        assert_eq!(dial.dial_count(), 2);
        assert!(dial.session(0).closed.load(Ordering::SeqCst));
        assert!(!dial.session(1).closed.load(Ordering::SeqCst));
        assert_eq!(manager.state(), SessionState::Opening);
    }

    #[tokio::test]
    async fn reset_reopens_with_unchanged_config() {
        let dial = FakeDial::default();
        let (mut manager, _notify_rx) = manager(dial.clone());
        manager.init_session().await;
        manager.apply(setup_complete());

        manager.reset_session().await;
        assert_eq!(dial.dial_count(), 2);
        assert!(dial.session(0).closed.load(Ordering::SeqCst));
        assert_eq!(dial.session(1).model, dial.session(0).model);

        let notifications = manager.apply(setup_complete());
        assert_eq!(manager.state(), SessionState::Open);
        assert_eq!(notifications.len(), 1);
    }

    #[tokio::test]
    async fn remote_close_reports_the_reason() {
        let (mut manager, _notify_rx) = manager(FakeDial::default());
        manager.init_session().await;
        manager.apply(setup_complete());

        let notifications = manager.apply(SessionEvent::Closed {
            reason: "server going away".to_string(),
        });
        assert_eq!(manager.state(), SessionState::Closed);
        assert_eq!(
            notifications,
            vec![Notification::Status(
                "Session closed: server going away".to_string()
            )]
        );
    }

    #[tokio::test]
    async fn run_loop_serializes_commands_and_forwards_events() {
        let dial = FakeDial::default();
        let (notify_tx, mut notify_rx) = mpsc::channel(64);
        let manager = SessionManager::new(dial.clone(), test_config(), notify_tx);

        let (command_tx, command_rx) = mpsc::channel(16);
        let handle = tokio::spawn(manager.run(command_rx));

        command_tx.send(Command::InitSession).await.unwrap();
        // Burst of inits converges to one live session.
        command_tx.send(Command::InitSession).await.unwrap();

        // Wait until both dials happened, then ack the live session.
        tokio::time::timeout(std::time::Duration::from_secs(1), async {
            while dial.dial_count() < 2 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
        assert!(dial.session(0).closed.load(Ordering::SeqCst));

        dial.session(1)
            .events_tx
            .send(setup_complete())
            .unwrap();
        let opened = notify_rx.recv().await.unwrap();
        assert_eq!(
            opened,
            Notification::Status("Session opened. Start recording.".to_string())
        );

        command_tx.send(Command::Close).await.unwrap();
        let closed = notify_rx.recv().await.unwrap();
        assert_eq!(closed, Notification::Status("Session closed.".to_string()));
        handle.await.unwrap();
    }
}
