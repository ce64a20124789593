//! JSON messages exchanged with the remote conversational voice agent.

use crate::error::AgentError;
use base64::Engine;
use serde::{Deserialize, Serialize};

/// Messages sent from this service to the voice agent.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum OutboundMessage {
    /// A chunk of microphone audio, base64 encoded.
    AudioChunk { user_audio_chunk: String },
    /// Keepalive answer to an agent `ping`.
    Pong(Pong),
}

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename = "pong")]
pub struct Pong {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_id: Option<u64>,
}

impl OutboundMessage {
    pub fn audio_chunk(chunk: &[u8]) -> Self {
        Self::AudioChunk {
            user_audio_chunk: base64::engine::general_purpose::STANDARD.encode(chunk),
        }
    }

    pub fn pong(event_id: Option<u64>) -> Self {
        Self::Pong(Pong { event_id })
    }

    pub fn to_json(&self) -> Result<String, AgentError> {
        serde_json::to_string(self).map_err(|e| AgentError::Encode(e.to_string()))
    }
}

/// Messages received from the voice agent, discriminated by their `type` field.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundMessage {
    ConversationInitiationMetadata {
        conversation_initiation_metadata_event: Option<InitiationEvent>,
    },
    /// Synthesized speech; may carry the text being spoken.
    Audio { audio_event: Option<AudioEvent> },
    Transcript { transcript: Option<String> },
    /// The authoritative, complete agent reply.
    AgentResponse { text: Option<String> },
    Interruption,
    Ping { ping_event: Option<PingEvent> },
    Error { message: Option<String> },
    #[serde(other)]
    Unrecognized,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct InitiationEvent {
    pub conversation_id: Option<String>,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct AudioEvent {
    pub text: Option<String>,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct PingEvent {
    pub event_id: Option<u64>,
}

impl InboundMessage {
    pub fn parse(raw: &str) -> Result<Self, AgentError> {
        serde_json::from_str(raw).map_err(|e| AgentError::Parse(e.to_string()))
    }

    /// The wire name of the message kind, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ConversationInitiationMetadata { .. } => "conversation_initiation_metadata",
            Self::Audio { .. } => "audio",
            Self::Transcript { .. } => "transcript",
            Self::AgentResponse { .. } => "agent_response",
            Self::Interruption => "interruption",
            Self::Ping { .. } => "ping",
            Self::Error { .. } => "error",
            Self::Unrecognized => "unrecognized",
        }
    }
}
