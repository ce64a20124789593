//! The narrow transport seam between [`AgentConnection`](crate::connection::AgentConnection)
//! and a concrete socket implementation.
//!
//! The connection only needs to open a link, push text frames into it and
//! observe inbound frames and closure, so anything that can provide those
//! three capabilities (a real websocket, an in-memory channel pair) can back it.

use crate::error::AgentError;
use async_trait::async_trait;
use futures::stream::BoxStream;

/// Credentials used to authenticate against the voice agent service.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AgentCredentials {
    pub api_key: Option<String>,
    pub agent_id: Option<String>,
}

impl AgentCredentials {
    pub fn new(api_key: Option<String>, agent_id: Option<String>) -> Self {
        Self { api_key, agent_id }
    }

    /// Reports which credential is missing, if any.
    pub fn validate(&self) -> Result<(), AgentError> {
        let missing: Vec<&str> = [
            ("api key", self.api_key.as_deref()),
            ("agent id", self.agent_id.as_deref()),
        ]
        .into_iter()
        .filter(|(_, value)| value.is_none_or(str::is_empty))
        .map(|(name, _)| name)
        .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(AgentError::Configuration(missing.join(", ")))
        }
    }
}

/// Something that happened on the inbound half of a link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// A complete text frame.
    Text(String),
    /// The remote end closed the link or the transport failed.
    Closed { reason: Option<String> },
}

/// Inbound events in arrival order. The stream ending is treated as a close.
pub type LinkEvents = BoxStream<'static, LinkEvent>;

/// The outbound half of an open link.
#[async_trait]
pub trait LinkSink: Send {
    async fn send_text(&mut self, text: String) -> Result<(), AgentError>;

    /// Closes the link. Errors are irrelevant at this point and are swallowed.
    async fn close(&mut self);
}

/// An open link, split into its two halves.
pub struct Link {
    pub sink: Box<dyn LinkSink>,
    pub events: LinkEvents,
}

/// Opens links to the voice agent service.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn open(&self, credentials: &AgentCredentials) -> Result<Link, AgentError>;
}
