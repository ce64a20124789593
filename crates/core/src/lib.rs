//! Core of the glasses voice bridge: the connection to the remote voice
//! agent, single-reply coordination, the per-glasses session state machine
//! and the registry of live sessions. Nothing in here knows about concrete
//! sockets; transports plug in through [`link::Connector`] and the glasses
//! through [`session::GlassesHost`].

pub mod connection;
pub mod display;
pub mod error;
pub mod link;
pub mod protocol;
pub mod registry;
pub mod reply;
pub mod session;

#[cfg(test)]
pub(crate) mod testing;

pub use connection::{AgentConnection, ConnectionOptions, ConnectionState};
pub use error::AgentError;
pub use link::AgentCredentials;
pub use registry::SessionRegistry;
pub use session::{GlassesHost, HostEvent, VoiceSession};
