//! Wire frames for the live room channel.

use parley_chats::ChatMessage;
use serde::{Deserialize, Serialize};

/// Close codes sent when the server ends a live connection.
pub mod close_code {
    pub const NORMAL: u16 = 1000;
    /// Idle timeout or server going away.
    pub const GOING_AWAY: u16 = 1001;
    pub const INVALID_PAYLOAD: u16 = 1007;
    /// The connection could not keep up with its room.
    pub const SLOW_CONSUMER: u16 = 1008;
    pub const UNAUTHENTICATED: u16 = 4401;
    pub const FORBIDDEN: u16 = 4403;
    /// A newer connection for the same identity joined the room.
    pub const SUPERSEDED: u16 = 4409;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CloseReason {
    pub code: u16,
    pub reason: &'static str,
}

impl CloseReason {
    pub const fn new(code: u16, reason: &'static str) -> Self {
        Self { code, reason }
    }

    pub const fn normal() -> Self {
        Self::new(close_code::NORMAL, "closing")
    }

    pub const fn idle() -> Self {
        Self::new(close_code::GOING_AWAY, "idle timeout")
    }

    pub const fn going_away() -> Self {
        Self::new(close_code::GOING_AWAY, "server going away")
    }

    pub const fn invalid_payload() -> Self {
        Self::new(close_code::INVALID_PAYLOAD, "invalid payload")
    }

    pub const fn slow_consumer() -> Self {
        Self::new(close_code::SLOW_CONSUMER, "slow consumer")
    }

    pub const fn session_expired() -> Self {
        Self::new(close_code::UNAUTHENTICATED, "session expired")
    }

    pub const fn forbidden() -> Self {
        Self::new(close_code::FORBIDDEN, "not a participant")
    }

    pub const fn superseded() -> Self {
        Self::new(close_code::SUPERSEDED, "superseded by a newer connection")
    }
}

/// What a client sends: `{"content": "..."}` as a text or binary frame.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct InboundFrame {
    pub content: String,
}

impl InboundFrame {
    pub fn decode(payload: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(payload)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MessageFrame {
    pub id: String,
    pub seq: i64,
    pub room_id: String,
    pub sender: String,
    pub content: String,
    pub created_at: String,
}

impl From<&ChatMessage> for MessageFrame {
    fn from(message: &ChatMessage) -> Self {
        Self {
            id: message.public_id.clone(),
            seq: message.seq,
            room_id: message.room_id.clone(),
            sender: message.sender_id.clone(),
            content: message.content.clone(),
            created_at: message.created_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum OutboundFrame {
    Message(MessageFrame),
    Error { error: String },
}

impl OutboundFrame {
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            error: message.into(),
        }
    }

    pub fn to_text(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn inbound_frames_require_content() {
        assert_eq!(
            InboundFrame::decode(br#"{"content":"hi"}"#).unwrap().content,
            "hi"
        );
        assert!(InboundFrame::decode(b"hi").is_err());
        assert!(InboundFrame::decode(br#"{"text":"hi"}"#).is_err());
        assert!(InboundFrame::decode(br#"{"content":5}"#).is_err());
    }

    #[test]
    fn message_frames_carry_all_fields() {
        let message = ChatMessage {
            seq: 7,
            public_id: "m1".into(),
            room_id: "r1".into(),
            sender_id: "u1".into(),
            content: "hi".into(),
            created_at: Utc::now(),
        };

        let text = OutboundFrame::Message(MessageFrame::from(&message))
            .to_text()
            .unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();

        assert_eq!(value["id"], "m1");
        assert_eq!(value["seq"], 7);
        assert_eq!(value["room_id"], "r1");
        assert_eq!(value["sender"], "u1");
        assert_eq!(value["content"], "hi");
        assert!(value["created_at"].is_string());
    }

    #[test]
    fn error_frames_have_a_single_field() {
        let text = OutboundFrame::error("nope").to_text().unwrap();
        assert_eq!(text, r#"{"error":"nope"}"#);
    }
}
