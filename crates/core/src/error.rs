use std::time::Duration;

/// Failures surfaced by the agent connection and its reply coordination.
///
/// The type is `Clone` because a single reply outcome is shared by every
/// caller awaiting the same pending reply.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AgentError {
    /// API key or agent id missing. Logged, never fatal on its own.
    #[error("Voice agent credentials not configured: {0}")]
    Configuration(String),
    #[error("Voice agent connection failed: {0}")]
    Connection(String),
    #[error("Not connected to voice agent")]
    NotConnected,
    #[error("No agent response within {}s", .0.as_secs())]
    ResponseTimeout(Duration),
    /// The connection was closed while a reply was still pending.
    #[error("Voice agent connection closed before a reply arrived")]
    ConnectionClosed,
    #[error("Malformed agent message: {0}")]
    Parse(String),
    #[error("Failed to encode agent message: {0}")]
    Encode(String),
}
