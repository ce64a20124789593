//! Defines the WebSocket message protocol between the glasses host platform and this app.

use g1_voice_core::{
    HostEvent,
    display::{Alignment, DisplayRequest, FontSize},
};
use serde::{Deserialize, Serialize};

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PressType {
    Short,
    Long,
}

/// Messages sent from the host platform to the app.
#[derive(Deserialize, Debug, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HostMessage {
    /// Opens a session for one pair of glasses. This must be the first message.
    Init {
        session_id: String,
        package_name: String,
        api_key: Option<String>,
    },
    Start,
    /// Ends the session.
    Stop,
    Pause,
    Resume,
    Tap,
    ButtonPress {
        button_id: String,
        press_type: PressType,
    },
    Transcription {
        text: String,
        #[serde(default)]
        is_final: bool,
    },
    AudioError { message: String },
}

impl HostMessage {
    /// The session event carried by this message, if it is one.
    pub fn into_event(self) -> Option<HostEvent> {
        match self {
            HostMessage::Init { .. } => None,
            HostMessage::Start => Some(HostEvent::Start),
            HostMessage::Stop => Some(HostEvent::Stop),
            HostMessage::Pause => Some(HostEvent::Pause),
            HostMessage::Resume => Some(HostEvent::Resume),
            HostMessage::Tap => Some(HostEvent::Tap),
            HostMessage::ButtonPress {
                button_id,
                press_type,
            } => Some(HostEvent::ButtonPress {
                button_id,
                long_press: press_type == PressType::Long,
            }),
            HostMessage::Transcription { text, is_final } => {
                Some(HostEvent::Transcription { text, is_final })
            }
            HostMessage::AudioError { message } => Some(HostEvent::AudioError(message)),
        }
    }
}

/// Messages sent from the app to the host platform.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AppMessage {
    /// Confirms the session is registered.
    Initialized {
        session_id: String,
        package_name: String,
    },
    DisplayText {
        text: String,
        duration_ms: u64,
        font_size: FontSize,
        alignment: Alignment,
    },
    Microphone { enabled: bool },
    /// Reports a fatal error to the host.
    Error { message: String },
}

impl From<DisplayRequest> for AppMessage {
    fn from(request: DisplayRequest) -> Self {
        AppMessage::DisplayText {
            text: request.text,
            duration_ms: request.duration_ms,
            font_size: request.font_size,
            alignment: request.alignment,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_init() {
        let msg: HostMessage = serde_json::from_str(
            r#"{"type":"init","session_id":"glasses-1","package_name":"com.example.voiceagent"}"#,
        )
        .unwrap();
        assert_eq!(
            msg,
            HostMessage::Init {
                session_id: "glasses-1".into(),
                package_name: "com.example.voiceagent".into(),
                api_key: None,
            }
        );
        assert_eq!(msg.into_event(), None);
    }

    #[test]
    fn test_button_press_maps_press_type() {
        let msg: HostMessage = serde_json::from_str(
            r#"{"type":"button_press","button_id":"main","press_type":"long"}"#,
        )
        .unwrap();
        assert_eq!(
            msg.into_event(),
            Some(HostEvent::ButtonPress {
                button_id: "main".into(),
                long_press: true,
            })
        );
    }

    #[test]
    fn test_transcription_defaults_to_interim() {
        let msg: HostMessage =
            serde_json::from_str(r#"{"type":"transcription","text":"hello"}"#).unwrap();
        assert_eq!(
            msg.into_event(),
            Some(HostEvent::Transcription {
                text: "hello".into(),
                is_final: false,
            })
        );
    }

    #[test]
    fn test_unknown_type_is_rejected() {
        assert!(serde_json::from_str::<HostMessage>(r#"{"type":"wave"}"#).is_err());
    }

    #[test]
    fn test_display_text_wire_format() {
        let msg = AppMessage::from(DisplayRequest::text("Listening..."));
        assert_eq!(
            serde_json::to_value(&msg).unwrap(),
            json!({
                "type": "display_text",
                "text": "Listening...",
                "duration_ms": 5000,
                "font_size": "medium",
                "alignment": "center"
            })
        );
        assert_eq!(
            serde_json::to_value(AppMessage::Microphone { enabled: true }).unwrap(),
            json!({"type": "microphone", "enabled": true})
        );
    }
}
