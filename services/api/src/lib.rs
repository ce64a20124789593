//! G1 Voice API Library Crate
//!
//! The web service side of the glasses voice bridge: configuration, the
//! host platform WebSocket endpoint, the ElevenLabs transport and routing.
//! The `api` binary is a thin wrapper around this library.

pub mod config;
pub mod host;
pub mod provider;
pub mod router;
pub mod state;
