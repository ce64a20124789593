//! Glasses host platform connections.
//!
//! - `protocol`: the JSON message format exchanged with the host platform.
//! - `session`: the connection lifecycle, from `init` handshake to release.

pub mod protocol;
pub mod session;

pub use session::ws_handler;
