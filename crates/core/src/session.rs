//! One user's voice interaction on a pair of glasses.
//!
//! A session toggles between idle and listening. While listening, microphone
//! frames stream into the [`AgentConnection`] and a background task waits for
//! the agent's reply; the reply (or an error) is shown on the display and the
//! session drops back to idle on its own.

use crate::{
    connection::AgentConnection,
    display::{
        AUDIO_ERROR_TEXT, DisplayRequest, LISTENING_TEXT, NO_RESPONSE_TEXT, READY_TEXT,
        START_FAILED_TEXT, STREAMING_FAILED_TEXT,
    },
    error::AgentError,
};
use async_trait::async_trait;
use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicU64, Ordering},
};
use tokio::sync::{Mutex, watch};
use tracing::{Instrument, Span, debug, error, info, info_span};

/// Events delivered by the glasses host platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostEvent {
    Start,
    Stop,
    Pause,
    Resume,
    Tap,
    ButtonPress { button_id: String, long_press: bool },
    Transcription { text: String, is_final: bool },
    AudioError(String),
}

/// What a session needs from the glasses host platform.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GlassesHost: Send + Sync {
    async fn show_text(&self, request: DisplayRequest) -> anyhow::Result<()>;
    async fn start_microphone(&self) -> anyhow::Result<()>;
    async fn stop_microphone(&self) -> anyhow::Result<()>;
}

struct SessionInner {
    id: String,
    host: Arc<dyn GlassesHost>,
    agent: AgentConnection,
    listening: AtomicBool,
    processing_response: AtomicBool,
    /// Incremented on every start; a reply wait only acts on its own turn.
    turn: AtomicU64,
    /// Serializes start/stop transitions.
    transition: Mutex<()>,
    /// Flips to `true` once on cleanup; a closed session never listens again.
    closed: watch::Sender<bool>,
    span: Span,
}

#[derive(Clone)]
pub struct VoiceSession {
    inner: Arc<SessionInner>,
}

impl VoiceSession {
    pub fn new(id: impl Into<String>, host: Arc<dyn GlassesHost>, agent: AgentConnection) -> Self {
        let id = id.into();
        let span = info_span!("voice_session", session_id = %id);
        let (closed, _) = watch::channel(false);
        Self {
            inner: Arc::new(SessionInner {
                id,
                host,
                agent,
                listening: AtomicBool::new(false),
                processing_response: AtomicBool::new(false),
                turn: AtomicU64::new(0),
                transition: Mutex::new(()),
                closed,
                span,
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn agent(&self) -> &AgentConnection {
        &self.inner.agent
    }

    pub fn is_listening(&self) -> bool {
        self.inner.listening.load(Ordering::SeqCst)
    }

    pub fn is_processing_response(&self) -> bool {
        self.inner.processing_response.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        *self.inner.closed.borrow()
    }

    /// Resolves once the session has been cleaned up, whether by its own
    /// host, by a replacement registered under the same id, or by shutdown.
    pub async fn closed(&self) {
        let mut closed = self.inner.closed.subscribe();
        let _ = closed.wait_for(|closed| *closed).await;
    }

    /// Whether both handles refer to the same session instance.
    pub fn ptr_eq(&self, other: &VoiceSession) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Shows the welcome screen.
    pub async fn initialize(&self) {
        async {
            info!("Initializing voice agent session");
            self.display(READY_TEXT).await;
        }
        .instrument(self.inner.span.clone())
        .await
    }

    pub async fn handle_event(&self, event: HostEvent) {
        async {
            if self.is_closed() {
                debug!(?event, "Ignoring event for closed session");
                return;
            }
            match event {
                HostEvent::Start => info!("App started on glasses"),
                HostEvent::Stop => {
                    info!("App stopped on glasses");
                    self.cleanup().await;
                }
                HostEvent::Pause => {
                    info!("App paused");
                    self.stop_listening().await;
                }
                HostEvent::Resume => info!("App resumed"),
                HostEvent::Tap => {
                    info!("Tap detected - toggling voice input");
                    self.toggle().await;
                }
                HostEvent::ButtonPress {
                    button_id,
                    long_press: false,
                } => {
                    info!(%button_id, "Button pressed - toggling voice input");
                    self.toggle().await;
                }
                HostEvent::ButtonPress {
                    button_id,
                    long_press: true,
                } => info!(%button_id, "Long button press ignored"),
                HostEvent::Transcription { text, is_final } => {
                    debug!(%text, is_final, "Host transcription");
                }
                HostEvent::AudioError(message) => {
                    error!(%message, "Audio error");
                    self.display(AUDIO_ERROR_TEXT).await;
                }
            }
        }
        .instrument(self.inner.span.clone())
        .await
    }

    /// Forwards one microphone frame while listening; ignored otherwise.
    pub async fn handle_audio(&self, frame: &[u8]) {
        if !self.is_listening() {
            return;
        }
        if let Err(e) = self.inner.agent.send_audio(frame).await {
            error!(session_id = %self.inner.id, error = %e, "Error handling audio data");
            let _guard = self.inner.transition.lock().await;
            if self.is_listening() {
                self.display(STREAMING_FAILED_TEXT).await;
                self.finish_locked(true).await;
            }
        }
    }

    pub async fn toggle(&self) {
        let _guard = self.inner.transition.lock().await;
        if self.is_listening() {
            self.finish_locked(true).await;
        } else {
            self.start_locked().await;
        }
    }

    pub async fn start_listening(&self) {
        let _guard = self.inner.transition.lock().await;
        self.start_locked().await;
    }

    /// Stops the microphone, closes the agent connection and shows the ready screen.
    pub async fn stop_listening(&self) {
        let _guard = self.inner.transition.lock().await;
        self.finish_locked(true).await;
    }

    /// Full teardown for a session that is going away. Idempotent.
    pub async fn cleanup(&self) {
        let _guard = self.inner.transition.lock().await;
        self.inner.closed.send_replace(true);
        self.finish_locked(false).await;
        self.inner.agent.disconnect().await;
        info!(session_id = %self.inner.id, "Session cleanup completed");
    }

    async fn start_locked(&self) {
        if self.is_closed() {
            debug!("Session closed; not starting voice input");
            return;
        }
        if self.is_listening() {
            debug!("Already listening");
            return;
        }
        info!("Starting voice input");
        let turn = self.inner.turn.fetch_add(1, Ordering::SeqCst) + 1;
        self.inner.processing_response.store(false, Ordering::SeqCst);

        match self.open_turn().await {
            Ok(()) => {
                self.spawn_reply_wait(turn);
                info!("Voice input started");
            }
            Err(e) => {
                error!(error = %e, "Error starting voice input");
                self.display(START_FAILED_TEXT).await;
                self.inner.listening.store(false, Ordering::SeqCst);
                if let Err(e) = self.inner.host.stop_microphone().await {
                    debug!(error = %e, "Microphone was not running");
                }
                self.inner.agent.disconnect().await;
            }
        }
    }

    async fn open_turn(&self) -> anyhow::Result<()> {
        self.inner.agent.connect().await?;
        self.inner.listening.store(true, Ordering::SeqCst);
        self.display(LISTENING_TEXT).await;
        self.inner.host.start_microphone().await?;
        Ok(())
    }

    /// Leaves the listening state. Only teardown skips the ready screen.
    async fn finish_locked(&self, show_ready: bool) {
        info!("Stopping voice input");
        self.inner.listening.store(false, Ordering::SeqCst);
        if let Err(e) = self.inner.host.stop_microphone().await {
            error!(error = %e, "Error stopping microphone");
        }
        self.inner.agent.disconnect().await;
        if show_ready {
            self.display(READY_TEXT).await;
        }
        info!("Voice input stopped");
    }

    fn spawn_reply_wait(&self, turn: u64) {
        if self.inner.processing_response.swap(true, Ordering::SeqCst) {
            debug!("Already waiting for a response");
            return;
        }
        info!("Waiting for voice agent response...");
        let reply = self.inner.agent.get_text_response();
        let session = self.clone();
        tokio::spawn(
            async move {
                let outcome = reply.await;
                session.finish_turn(turn, outcome).await;
            }
            .instrument(self.inner.span.clone()),
        );
    }

    async fn finish_turn(&self, turn: u64, outcome: Result<String, AgentError>) {
        {
            let _guard = self.inner.transition.lock().await;
            let current = self.is_listening() && self.inner.turn.load(Ordering::SeqCst) == turn;
            match outcome {
                Ok(text) if current => {
                    info!("Response received, displaying on glasses");
                    self.display(&text).await;
                    self.finish_locked(true).await;
                }
                Err(e) if current => {
                    error!(error = %e, "Error waiting for response");
                    self.display(NO_RESPONSE_TEXT).await;
                    self.finish_locked(true).await;
                }
                _ => debug!(turn, "Listening turn ended before the response wait finished"),
            }
        }
        if self.inner.turn.load(Ordering::SeqCst) == turn {
            self.inner.processing_response.store(false, Ordering::SeqCst);
        }
    }

    async fn display(&self, text: &str) {
        if let Err(e) = self.inner.host.show_text(DisplayRequest::text(text)).await {
            error!(error = %e, "Error displaying text");
        }
    }
}
