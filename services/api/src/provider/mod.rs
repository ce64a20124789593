//! Concrete transports for the voice agent link.

pub mod elevenlabs;

pub use elevenlabs::ElevenLabsConnector;
