//! The connection to the remote voice agent: lifecycle, reconnection policy
//! and dispatch of inbound protocol messages.

use crate::{
    error::AgentError,
    link::{AgentCredentials, Connector, Link, LinkEvent, LinkEvents, LinkSink},
    protocol::{InboundMessage, OutboundMessage},
    reply::{ReplyFuture, ReplyWaiter},
};
use futures::{FutureExt, StreamExt, future::BoxFuture};
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 3;
pub const DEFAULT_RECONNECT_STEP: Duration = Duration::from_millis(1000);
pub const DEFAULT_REPLY_TIMEOUT: Duration = Duration::from_secs(30);

/// Tunables for one [`AgentConnection`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectionOptions {
    /// Automatic reconnects allowed after an unexpected close.
    pub max_reconnect_attempts: u32,
    /// Attempt `n` is scheduled `n * reconnect_step` after the close.
    pub reconnect_step: Duration,
    pub reply_timeout: Duration,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            max_reconnect_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
            reconnect_step: DEFAULT_RECONNECT_STEP,
            reply_timeout: DEFAULT_REPLY_TIMEOUT,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

type SharedSink = Arc<tokio::sync::Mutex<Box<dyn LinkSink>>>;

struct LinkState {
    state: ConnectionState,
    /// Bumped by every installed link and every explicit disconnect. Readers,
    /// reconnect timers and in-flight connects compare against it to find
    /// out whether they are stale.
    generation: u64,
    reconnect_attempts: u32,
    retries_exhausted: bool,
    partial_text: Vec<String>,
    sink: Option<SharedSink>,
    reader: Option<JoinHandle<()>>,
    reconnect: Option<JoinHandle<()>>,
}

struct Inner {
    connector: Arc<dyn Connector>,
    credentials: AgentCredentials,
    options: ConnectionOptions,
    link: Mutex<LinkState>,
    reply: ReplyWaiter,
}

impl Inner {
    fn link(&self) -> MutexGuard<'_, LinkState> {
        self.link.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Owns one socket connection to the voice agent service.
///
/// Cloning is cheap and yields a handle to the same connection.
#[derive(Clone)]
pub struct AgentConnection {
    inner: Arc<Inner>,
}

impl AgentConnection {
    pub fn new(
        connector: Arc<dyn Connector>,
        credentials: AgentCredentials,
        options: ConnectionOptions,
    ) -> Self {
        let reply = ReplyWaiter::new(options.reply_timeout);
        Self {
            inner: Arc::new(Inner {
                connector,
                credentials,
                options,
                link: Mutex::new(LinkState {
                    state: ConnectionState::Disconnected,
                    generation: 0,
                    reconnect_attempts: 0,
                    retries_exhausted: false,
                    partial_text: Vec::new(),
                    sink: None,
                    reader: None,
                    reconnect: None,
                }),
                reply,
            }),
        }
    }

    /// Opens the link unless already connected.
    ///
    /// A failed open triggers the reconnection policy in addition to
    /// returning the error.
    pub async fn connect(&self) -> Result<(), AgentError> {
        self.clone().establish().await
    }

    fn establish(self) -> BoxFuture<'static, Result<(), AgentError>> {
        async move {
            let generation = {
                let mut link = self.inner.link();
                if link.state == ConnectionState::Connected {
                    info!("Already connected to voice agent");
                    return Ok(());
                }
                link.state = ConnectionState::Connecting;
                link.generation
            };

            if let Err(e) = self.inner.credentials.validate() {
                warn!(error = %e, "Connecting to voice agent without complete credentials");
            }
            info!("Connecting to voice agent...");

            match self.inner.connector.open(&self.inner.credentials).await {
                Ok(link) => self.install(generation, link).await,
                Err(e) => {
                    error!(error = %e, "Failed to open voice agent connection");
                    let current = {
                        let mut link = self.inner.link();
                        let current = link.generation == generation;
                        if current {
                            link.state = ConnectionState::Disconnected;
                        }
                        current
                    };
                    if current {
                        self.schedule_reconnect(generation);
                    }
                    Err(e)
                }
            }
        }
        .boxed()
    }

    async fn install(&self, generation: u64, link: Link) -> Result<(), AgentError> {
        let Link { mut sink, events } = link;
        {
            let mut state = self.inner.link();
            if state.generation == generation && state.state != ConnectionState::Connected {
                state.generation += 1;
                state.state = ConnectionState::Connected;
                state.reconnect_attempts = 0;
                state.retries_exhausted = false;
                state.sink = Some(Arc::new(tokio::sync::Mutex::new(sink)));
                state.reader = Some(self.spawn_reader(state.generation, events));
                info!("Connected to voice agent");
                return Ok(());
            }
        }

        // Disconnected (or connected elsewhere) while this open was in flight.
        sink.close().await;
        if self.is_active() {
            Ok(())
        } else {
            Err(AgentError::ConnectionClosed)
        }
    }

    fn spawn_reader(&self, generation: u64, mut events: LinkEvents) -> JoinHandle<()> {
        let connection = self.clone();
        tokio::spawn(async move {
            let mut reason = None;
            while let Some(event) = events.next().await {
                match event {
                    LinkEvent::Text(text) => connection.dispatch(&text).await,
                    LinkEvent::Closed { reason: closed } => {
                        reason = closed;
                        break;
                    }
                }
            }
            connection.on_link_closed(generation, reason);
        })
    }

    fn on_link_closed(&self, generation: u64, reason: Option<String>) {
        {
            let mut link = self.inner.link();
            if link.generation != generation {
                return;
            }
            link.state = ConnectionState::Disconnected;
            link.sink = None;
            link.reader = None;
        }
        info!(reason = reason.as_deref().unwrap_or("none"), "Voice agent connection closed");
        self.schedule_reconnect(generation);
    }

    fn schedule_reconnect(&self, generation: u64) {
        let mut link = self.inner.link();
        if link.generation != generation {
            return;
        }

        let max = self.inner.options.max_reconnect_attempts;
        if link.reconnect_attempts >= max {
            link.retries_exhausted = true;
            error!(max_attempts = max, "Max reconnection attempts reached");
            return;
        }

        link.reconnect_attempts += 1;
        let attempt = link.reconnect_attempts;
        let delay = self.inner.options.reconnect_step * attempt;
        info!(
            attempt,
            max_attempts = max,
            delay_ms = delay.as_millis() as u64,
            "Attempting to reconnect to voice agent"
        );

        if let Some(previous) = link.reconnect.take() {
            previous.abort();
        }
        let connection = self.clone();
        link.reconnect = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            {
                let mut link = connection.inner.link();
                if link.generation != generation {
                    return;
                }
                // Our own handle; dropping it detaches this task.
                link.reconnect = None;
            }
            if let Err(e) = connection.establish().await {
                warn!(attempt, error = %e, "Reconnect attempt failed");
            }
        }));
    }

    /// Closes the link and suppresses any pending or future automatic
    /// reconnect. A pending reply fails with [`AgentError::ConnectionClosed`].
    /// Idempotent.
    pub async fn disconnect(&self) {
        let (sink, reader, reconnect) = {
            let mut link = self.inner.link();
            link.generation += 1;
            link.state = ConnectionState::Disconnected;
            link.reconnect_attempts = 0;
            link.retries_exhausted = false;
            link.partial_text.clear();
            (link.sink.take(), link.reader.take(), link.reconnect.take())
        };

        if let Some(reader) = reader {
            reader.abort();
        }
        if let Some(reconnect) = reconnect {
            reconnect.abort();
        }
        self.inner.reply.cancel();

        if let Some(sink) = sink {
            sink.lock().await.close().await;
            info!("Disconnected from voice agent");
        }
    }

    fn connected_sink(&self) -> Result<SharedSink, AgentError> {
        let link = self.inner.link();
        match (&link.state, &link.sink) {
            (ConnectionState::Connected, Some(sink)) => Ok(Arc::clone(sink)),
            _ => Err(AgentError::NotConnected),
        }
    }

    /// Sends one chunk of microphone audio.
    pub async fn send_audio(&self, chunk: &[u8]) -> Result<(), AgentError> {
        let sink = self.connected_sink()?;
        let payload = OutboundMessage::audio_chunk(chunk).to_json()?;
        if let Err(e) = sink.lock().await.send_text(payload).await {
            error!(error = %e, "Error sending audio");
            return Err(e);
        }
        debug!(bytes = chunk.len(), "Sent audio chunk");
        Ok(())
    }

    /// Waits for the agent's next complete reply.
    ///
    /// The reply slot is claimed when this is called, not when the returned
    /// future is first polled, so a reply arriving in between is not lost.
    /// Concurrent callers share one pending reply and one deadline.
    pub fn get_text_response(
        &self,
    ) -> impl Future<Output = Result<String, AgentError>> + Send + 'static {
        let reply = self.reply_future();
        async move {
            let outcome = reply.await;
            match &outcome {
                Ok(text) => info!(response = %text, "Text response received"),
                Err(e) => error!(error = %e, "Error getting text response"),
            }
            outcome
        }
    }

    /// The pending reply future, created if none is outstanding.
    pub fn reply_future(&self) -> ReplyFuture {
        self.inner.reply.wait()
    }

    pub fn is_active(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.link().state
    }

    pub fn reconnect_attempts(&self) -> u32 {
        self.inner.link().reconnect_attempts
    }

    /// True once the reconnection budget is spent. Only an explicit
    /// [`connect`](Self::connect) tries again.
    pub fn retries_exhausted(&self) -> bool {
        self.inner.link().retries_exhausted
    }

    pub fn is_awaiting_reply(&self) -> bool {
        self.inner.reply.is_pending()
    }

    /// Interim text accumulated since the last interruption.
    pub fn partial_text(&self) -> Vec<String> {
        self.inner.link().partial_text.clone()
    }

    fn push_partial(&self, text: String) {
        self.inner.link().partial_text.push(text);
    }

    /// Handles one inbound protocol message. Malformed input is logged and dropped.
    pub async fn dispatch(&self, raw: &str) {
        let message = match InboundMessage::parse(raw) {
            Ok(message) => message,
            Err(e) => {
                error!(error = %e, "Dropping malformed voice agent message");
                return;
            }
        };
        debug!(kind = message.kind(), "Received voice agent message");

        match message {
            InboundMessage::ConversationInitiationMetadata {
                conversation_initiation_metadata_event,
            } => {
                let conversation_id =
                    conversation_initiation_metadata_event.and_then(|e| e.conversation_id);
                info!(?conversation_id, "Conversation initiated");
            }
            InboundMessage::Audio { audio_event } => {
                if let Some(text) = audio_event.and_then(|e| e.text).filter(|t| !t.is_empty()) {
                    debug!(text = %text, "Text received");
                    self.push_partial(text);
                }
            }
            InboundMessage::Transcript { transcript } => {
                if let Some(text) = transcript.filter(|t| !t.is_empty()) {
                    info!(transcript = %text, "Transcript");
                    self.push_partial(text);
                }
            }
            InboundMessage::AgentResponse { text } => match text.filter(|t| !t.is_empty()) {
                Some(text) => {
                    info!(response = %text, "Agent response");
                    if !self.inner.reply.fulfill(text) {
                        debug!("No caller waiting for a reply; response discarded");
                    }
                }
                None => debug!("Agent response without text ignored"),
            },
            InboundMessage::Interruption => {
                info!("User interrupted");
                self.inner.link().partial_text.clear();
            }
            InboundMessage::Ping { ping_event } => {
                self.send_pong(ping_event.and_then(|p| p.event_id)).await;
            }
            InboundMessage::Error { message } => {
                error!(
                    detail = message.as_deref().unwrap_or(raw),
                    "Voice agent reported an error"
                );
            }
            InboundMessage::Unrecognized => debug!(raw, "Unhandled voice agent message type"),
        }
    }

    async fn send_pong(&self, event_id: Option<u64>) {
        let Ok(sink) = self.connected_sink() else {
            return;
        };
        let payload = match OutboundMessage::pong(event_id).to_json() {
            Ok(payload) => payload,
            Err(e) => {
                error!(error = %e, "Failed to encode pong");
                return;
            }
        };
        if let Err(e) = sink.lock().await.send_text(payload).await {
            warn!(error = %e, "Failed to send pong");
        }
    }
}
