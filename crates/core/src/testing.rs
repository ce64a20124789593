//! In-memory stand-ins for the agent transport and the glasses host.

use crate::display::DisplayRequest;
use crate::error::AgentError;
use crate::link::{AgentCredentials, Connector, Link, LinkEvent, LinkSink};
use crate::session::GlassesHost;
use async_trait::async_trait;
use futures::StreamExt;
use std::sync::{
    Arc, Mutex,
    atomic::{AtomicBool, AtomicUsize, Ordering},
};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tokio_stream::wrappers::UnboundedReceiverStream;

/// The far end of one in-memory link, driven by the test.
#[derive(Clone)]
pub(crate) struct MemoryRemote {
    to_agent: mpsc::UnboundedSender<LinkEvent>,
    sent: Arc<Mutex<Vec<String>>>,
    closed: Arc<AtomicBool>,
}

impl MemoryRemote {
    pub(crate) fn push(&self, json: &str) {
        let _ = self.to_agent.send(LinkEvent::Text(json.to_string()));
    }

    /// Simulates the service dropping the connection.
    pub(crate) fn drop_link(&self) {
        let _ = self.to_agent.send(LinkEvent::Closed {
            reason: Some("remote hung up".to_string()),
        });
    }

    /// Frames the connection sent to the service.
    pub(crate) fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }

    /// Whether the connection closed this link from its side.
    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

struct MemorySink {
    sent: Arc<Mutex<Vec<String>>>,
    closed: Arc<AtomicBool>,
}

#[async_trait]
impl LinkSink for MemorySink {
    async fn send_text(&mut self, text: String) -> Result<(), AgentError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(AgentError::Connection("link closed".to_string()));
        }
        self.sent.lock().unwrap().push(text);
        Ok(())
    }

    async fn close(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

#[derive(Default)]
pub(crate) struct MemoryConnector {
    failing: AtomicBool,
    attempts: Mutex<Vec<Instant>>,
    remotes: Mutex<Vec<MemoryRemote>>,
    gate: Mutex<Option<oneshot::Receiver<()>>>,
}

impl MemoryConnector {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Makes subsequent `open` calls fail.
    pub(crate) fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// When each `open` was attempted, successful or not.
    pub(crate) fn attempts(&self) -> Vec<Instant> {
        self.attempts.lock().unwrap().clone()
    }

    /// Holds the next `open` until the returned sender fires.
    pub(crate) fn hold_next_open(&self) -> oneshot::Sender<()> {
        let (release, gate) = oneshot::channel();
        *self.gate.lock().unwrap() = Some(gate);
        release
    }

    pub(crate) fn remotes(&self) -> Vec<MemoryRemote> {
        self.remotes.lock().unwrap().clone()
    }

    pub(crate) fn last_remote(&self) -> MemoryRemote {
        self.remotes().pop().expect("no link was opened")
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn open(&self, _credentials: &AgentCredentials) -> Result<Link, AgentError> {
        self.attempts.lock().unwrap().push(Instant::now());
        let gate = self.gate.lock().unwrap().take();
        if let Some(gate) = gate {
            let _ = gate.await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(AgentError::Connection("connection refused".to_string()));
        }

        let (to_agent, from_remote) = mpsc::unbounded_channel();
        let sent = Arc::new(Mutex::new(Vec::new()));
        let closed = Arc::new(AtomicBool::new(false));
        self.remotes.lock().unwrap().push(MemoryRemote {
            to_agent,
            sent: Arc::clone(&sent),
            closed: Arc::clone(&closed),
        });

        Ok(Link {
            sink: Box::new(MemorySink { sent, closed }),
            events: UnboundedReceiverStream::new(from_remote).boxed(),
        })
    }
}

/// Records what the session asked the glasses to do.
#[derive(Default)]
pub(crate) struct RecordingHost {
    displays: Mutex<Vec<DisplayRequest>>,
    microphone_on: AtomicBool,
    microphone_starts: AtomicUsize,
    fail_microphone: AtomicBool,
}

impl RecordingHost {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn texts(&self) -> Vec<String> {
        self.displays
            .lock()
            .unwrap()
            .iter()
            .map(|d| d.text.clone())
            .collect()
    }

    pub(crate) fn last_text(&self) -> Option<String> {
        self.texts().pop()
    }

    pub(crate) fn microphone_on(&self) -> bool {
        self.microphone_on.load(Ordering::SeqCst)
    }

    pub(crate) fn microphone_starts(&self) -> usize {
        self.microphone_starts.load(Ordering::SeqCst)
    }

    pub(crate) fn set_microphone_failing(&self, failing: bool) {
        self.fail_microphone.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl GlassesHost for RecordingHost {
    async fn show_text(&self, request: DisplayRequest) -> anyhow::Result<()> {
        self.displays.lock().unwrap().push(request);
        Ok(())
    }

    async fn start_microphone(&self) -> anyhow::Result<()> {
        if self.fail_microphone.load(Ordering::SeqCst) {
            anyhow::bail!("microphone unavailable");
        }
        self.microphone_starts.fetch_add(1, Ordering::SeqCst);
        self.microphone_on.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn stop_microphone(&self) -> anyhow::Result<()> {
        self.microphone_on.store(false, Ordering::SeqCst);
        Ok(())
    }
}

/// Lets spawned tasks run until `condition` holds, panicking after a while.
pub(crate) async fn settle(mut condition: impl FnMut() -> bool) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    panic!("condition not reached");
}
