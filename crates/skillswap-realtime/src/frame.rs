//! Wire frame types.
//!
//! Every message on the persistent connection is one JSON frame:
//! `{"type": ..., "data": ..., "user_id"?, "room_id"?, "time"}`.
//! Outbound frames are stamped with the sender's `user_id` and an
//! RFC 3339 timestamp before serialization.

use chrono::Utc;
use serde::{Deserialize, Serialize};

// Outbound event types.
pub const EVENT_JOIN_CONVERSATION: &str = "join_conversation";
pub const EVENT_LEAVE_CONVERSATION: &str = "leave_conversation";
pub const EVENT_JOIN_POST: &str = "join_post";
pub const EVENT_LEAVE_POST: &str = "leave_post";
pub const EVENT_TYPING_START: &str = "typing_start";
pub const EVENT_TYPING_STOP: &str = "typing_stop";
pub const EVENT_PING: &str = "ping";

// Inbound event types.
pub const EVENT_PONG: &str = "pong";
pub const EVENT_SYSTEM: &str = "system";
pub const EVENT_NEW_MESSAGE: &str = "new_message";
pub const EVENT_NEW_COMMENT: &str = "new_comment";
pub const EVENT_NEW_NOTIFICATION: &str = "new_notification";
pub const EVENT_USER_TYPING: &str = "user_typing";
pub const EVENT_CONNECTION_ESTABLISHED: &str = "connection_established";

/// One JSON-encoded message unit exchanged over the connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Frame {
    /// Event type (e.g. "join_conversation", "new_message", "ping").
    #[serde(rename = "type")]
    pub kind: String,
    /// Event payload.
    #[serde(default)]
    pub data: serde_json::Value,
    /// Sender user id. Present on outbound frames.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<i64>,
    /// Room scope, when the event targets a conversation or post room.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub room_id: Option<String>,
    /// RFC 3339 timestamp, stamped by the sender.
    pub time: String,
}

impl Frame {
    /// System frames (ping/pong/system) are consumed by the connection
    /// layer and never forwarded to application callbacks.
    pub fn is_system(&self) -> bool {
        matches!(self.kind.as_str(), EVENT_PING | EVENT_PONG | EVENT_SYSTEM)
    }
}

/// An application-authored frame before stamping.
///
/// Callers provide the event type, payload, and optionally a room scope;
/// the connection layer fills in `user_id` and `time` on send.
#[derive(Debug, Clone)]
pub struct FrameDraft {
    pub kind: String,
    pub data: serde_json::Value,
    pub room_id: Option<String>,
}

impl FrameDraft {
    pub fn new(kind: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            kind: kind.into(),
            data,
            room_id: None,
        }
    }

    pub fn with_room(mut self, room_id: impl Into<String>) -> Self {
        self.room_id = Some(room_id.into());
        self
    }

    /// Stamp the draft with the connection's user id and the current time.
    pub fn stamp(self, user_id: i64) -> Frame {
        Frame {
            kind: self.kind,
            data: self.data,
            user_id: Some(user_id),
            room_id: self.room_id,
            time: Utc::now().to_rfc3339(),
        }
    }
}

/// Build a stamped keep-alive ping frame.
pub fn ping_frame(user_id: i64) -> Frame {
    FrameDraft::new(EVENT_PING, serde_json::json!({})).stamp(user_id)
}

/// Build a stamped pong reply frame.
pub fn pong_frame(user_id: i64) -> Frame {
    FrameDraft::new(EVENT_PONG, serde_json::json!({})).stamp(user_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_stamped_frame_shape() {
        let frame = FrameDraft::new(
            EVENT_JOIN_CONVERSATION,
            json!({"conversation_id": "42"}),
        )
        .stamp(7);

        let value = serde_json::to_value(&frame).unwrap();
        assert_eq!(value["type"], "join_conversation");
        assert_eq!(value["data"]["conversation_id"], "42");
        assert_eq!(value["user_id"], 7);
        assert!(value["time"].is_string());
        // room_id is omitted entirely when absent.
        assert!(!value.as_object().unwrap().contains_key("room_id"));
        // The timestamp round-trips as RFC 3339.
        let time = value["time"].as_str().unwrap();
        assert!(chrono::DateTime::parse_from_rfc3339(time).is_ok());
    }

    #[test]
    fn test_room_scoped_frame() {
        let frame = FrameDraft::new(EVENT_TYPING_START, json!({"conversation_id": "3"}))
            .with_room("3")
            .stamp(1);
        let value = serde_json::to_value(&frame).unwrap();
        assert_eq!(value["room_id"], "3");
    }

    #[test]
    fn test_inbound_parse_without_user_id() {
        let frame: Frame = serde_json::from_str(
            r#"{"type":"new_message","data":{"content":"hi"},"time":"2025-01-01T00:00:00Z"}"#,
        )
        .unwrap();
        assert_eq!(frame.kind, EVENT_NEW_MESSAGE);
        assert!(frame.user_id.is_none());
        assert!(!frame.is_system());
    }

    #[test]
    fn test_system_frame_classification() {
        for kind in [EVENT_PING, EVENT_PONG, EVENT_SYSTEM] {
            let frame: Frame = serde_json::from_value(json!({
                "type": kind,
                "data": {},
                "time": "2025-01-01T00:00:00Z"
            }))
            .unwrap();
            assert!(frame.is_system(), "'{kind}' should be a system frame");
        }

        let frame: Frame = serde_json::from_value(json!({
            "type": "new_comment",
            "data": {},
            "time": "2025-01-01T00:00:00Z"
        }))
        .unwrap();
        assert!(!frame.is_system());
    }

    #[test]
    fn test_malformed_frame_is_an_error() {
        assert!(serde_json::from_str::<Frame>("{not json").is_err());
        // A frame missing its type is rejected, not defaulted.
        assert!(serde_json::from_str::<Frame>(r#"{"data":{},"time":"t"}"#).is_err());
    }
}
