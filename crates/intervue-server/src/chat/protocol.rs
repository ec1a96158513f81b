//! Chat wire frames.
//!
//! Inbound frames are JSON objects tagged by `type`. Anything that is not a
//! JSON object is taken as the text of a user message.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Message, Sender};

/// Kind of an outbound frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameKind {
    /// Interviewer turn or hint.
    AiMessage,
    /// Echo of the candidate's turn.
    UserMessage,
    /// Something went wrong with the last frame.
    Error,
    /// Out-of-band event, e.g. feedback ready.
    Notification,
}

/// Frame sent to the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundFrame {
    /// Frame kind.
    #[serde(rename = "type")]
    pub kind: FrameKind,
    /// Text.
    pub content: String,
    /// Stored message this frame carries, if any.
    pub message_id: Option<Uuid>,
    /// When the frame (or its message) was created.
    pub timestamp: DateTime<Utc>,
}

impl OutboundFrame {
    fn new(kind: FrameKind, content: impl Into<String>, message_id: Option<Uuid>) -> Self {
        Self {
            kind,
            content: content.into(),
            message_id,
            timestamp: Utc::now(),
        }
    }

    /// Frame for a stored message.
    #[must_use]
    pub fn from_message(message: &Message) -> Self {
        let kind = match message.sender {
            Sender::User => FrameKind::UserMessage,
            Sender::Ai => FrameKind::AiMessage,
        };
        Self {
            kind,
            content: message.content.clone(),
            message_id: Some(message.id),
            timestamp: message.created_at,
        }
    }

    /// Interviewer text that is not stored.
    #[must_use]
    pub fn ephemeral_ai(content: impl Into<String>) -> Self {
        Self::new(FrameKind::AiMessage, content, None)
    }

    /// Error frame.
    #[must_use]
    pub fn error(content: impl Into<String>) -> Self {
        Self::new(FrameKind::Error, content, None)
    }

    /// Notification frame.
    #[must_use]
    pub fn notification(content: impl Into<String>) -> Self {
        Self::new(FrameKind::Notification, content, None)
    }

    /// Serializes the frame to JSON text.
    #[must_use]
    pub fn to_json(&self) -> String {
        // Serializing plain strings, ids and timestamps cannot fail.
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Command a client can send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Ask for a hint.
    Hint,
    /// Resend the latest interviewer message.
    Repeat,
}

/// A decoded inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// Candidate text, already trimmed and non-empty.
    UserMessage(String),
    /// A command.
    Command(Command),
    /// A frame that cannot be acted on; the text is sent back as an error.
    Invalid(String),
}

const EMPTY_CONTENT: &str = "Message content cannot be empty";

/// Decodes one inbound text frame.
#[must_use]
pub fn parse_inbound(text: &str) -> Inbound {
    let Ok(serde_json::Value::Object(frame)) = serde_json::from_str::<serde_json::Value>(text)
    else {
        return user_message(text);
    };

    match frame.get("type").and_then(serde_json::Value::as_str) {
        Some("user_message") => {
            user_message(frame.get("content").and_then(serde_json::Value::as_str).unwrap_or(""))
        }
        Some("command") => {
            match frame.get("action").and_then(serde_json::Value::as_str) {
                Some(action) if action.eq_ignore_ascii_case("hint") => Inbound::Command(Command::Hint),
                Some(action) if action.eq_ignore_ascii_case("repeat") => {
                    Inbound::Command(Command::Repeat)
                }
                Some(action) => Inbound::Invalid(format!("Unknown command: {action}")),
                None => Inbound::Invalid("Command frame is missing an action".to_string()),
            }
        }
        Some(other) => Inbound::Invalid(format!("Unknown message type: {other}")),
        None => Inbound::Invalid("Message type is missing".to_string()),
    }
}

fn user_message(text: &str) -> Inbound {
    let text = text.trim();
    if text.is_empty() {
        Inbound::Invalid(EMPTY_CONTENT.to_string())
    } else {
        Inbound::UserMessage(text.to_string())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn fixed_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_parse_user_message() {
        assert_eq!(
            parse_inbound(r#"{"type":"user_message","content":"  I would use a hash map "}"#),
            Inbound::UserMessage("I would use a hash map".to_string())
        );
    }

    #[test]
    fn test_plain_text_is_user_message() {
        assert_eq!(
            parse_inbound("not json at all"),
            Inbound::UserMessage("not json at all".to_string())
        );
        assert_eq!(parse_inbound("42"), Inbound::UserMessage("42".to_string()));
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(
            parse_inbound(r#"{"type":"command","action":"hint"}"#),
            Inbound::Command(Command::Hint)
        );
        assert_eq!(
            parse_inbound(r#"{"type":"command","action":"REPEAT"}"#),
            Inbound::Command(Command::Repeat)
        );
    }

    #[test]
    fn test_invalid_frames() {
        assert_eq!(
            parse_inbound(r#"{"type":"command","action":"dance"}"#),
            Inbound::Invalid("Unknown command: dance".to_string())
        );
        assert_eq!(
            parse_inbound(r#"{"type":"typing"}"#),
            Inbound::Invalid("Unknown message type: typing".to_string())
        );
        assert_eq!(
            parse_inbound(r#"{"type":"user_message","content":"   "}"#),
            Inbound::Invalid(EMPTY_CONTENT.to_string())
        );
        assert_eq!(parse_inbound("   "), Inbound::Invalid(EMPTY_CONTENT.to_string()));
        assert!(matches!(parse_inbound(r#"{"content":"hi"}"#), Inbound::Invalid(_)));
    }

    #[test]
    fn test_error_frame_wire_format() {
        let frame = OutboundFrame {
            timestamp: fixed_time(),
            ..OutboundFrame::error("Unknown command: dance")
        };
        insta::assert_snapshot!(
            frame.to_json(),
            @r#"{"type":"error","content":"Unknown command: dance","message_id":null,"timestamp":"2026-01-01T00:00:00Z"}"#
        );
    }

    #[test]
    fn test_message_frame_carries_id_and_creation_time() {
        let mut message = Message::new(Uuid::nil(), Sender::Ai, "Tell me about arrays.");
        message.id = Uuid::nil();
        message.created_at = fixed_time();

        let frame = OutboundFrame::from_message(&message);
        insta::assert_snapshot!(
            frame.to_json(),
            @r#"{"type":"ai_message","content":"Tell me about arrays.","message_id":"00000000-0000-0000-0000-000000000000","timestamp":"2026-01-01T00:00:00Z"}"#
        );
    }

    #[test]
    fn test_frames_round_trip() {
        let frame = OutboundFrame::notification("Feedback ready");
        let back: OutboundFrame = serde_json::from_str(&frame.to_json()).unwrap();
        assert_eq!(back, frame);
    }
}
