//! What the session asks the glasses to draw.

use serde::Serialize;

pub const READY_TEXT: &str = "Voice Agent Ready\nTap to start";
pub const LISTENING_TEXT: &str = "Listening...\n\nSpeak now";
pub const START_FAILED_TEXT: &str = "Error\nCannot start mic";
pub const STREAMING_FAILED_TEXT: &str = "Error\nStreaming failed";
pub const NO_RESPONSE_TEXT: &str = "Error\nNo response";
pub const AUDIO_ERROR_TEXT: &str = "Audio Error\nTry again";

pub const DEFAULT_DISPLAY_MS: u64 = 5000;

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum FontSize {
    Small,
    #[default]
    Medium,
    Large,
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Alignment {
    Left,
    #[default]
    Center,
    Right,
}

/// A text layout request for the glasses display.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct DisplayRequest {
    pub text: String,
    pub duration_ms: u64,
    pub font_size: FontSize,
    pub alignment: Alignment,
}

impl DisplayRequest {
    /// Centered medium text shown for five seconds.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            duration_ms: DEFAULT_DISPLAY_MS,
            font_size: FontSize::default(),
            alignment: Alignment::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_display_request_defaults_and_wire_format() {
        let request = DisplayRequest::text("Hello");
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({
                "text": "Hello",
                "duration_ms": 5000,
                "font_size": "medium",
                "alignment": "center"
            })
        );
    }
}
