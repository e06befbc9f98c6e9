use serde::{Deserialize, Serialize};

use crate::chat::ChatMessage;

/// Frames sent from client to server on the duplex transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    /// Publish a chat message to the joined room
    Message { content: String },
    /// Transient typing indicator, not persisted
    Typing,
}

/// Room-scoped frames sent from server to client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RoomFrame {
    Message {
        #[serde(flatten)]
        message: ChatMessage,
    },
    Typing {
        room_id: String,
        author: String,
    },
    Presence {
        room_id: String,
        member: String,
        action: PresenceAction,
        members: usize,
    },
    RoomUpdate {
        room_id: String,
        members: usize,
        #[serde(skip_serializing_if = "Option::is_none")]
        manga_id: Option<String>,
        /// History replayed on join, chronological order
        recent_messages: Vec<ChatMessage>,
        total_messages: usize,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresenceAction {
    Joined,
    Left,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_are_tagged_by_type() {
        let frame = RoomFrame::Presence {
            room_id: "r1".into(),
            member: "alice".into(),
            action: PresenceAction::Joined,
            members: 3,
        };
        let json = serde_json::to_value(&frame).unwrap();
        assert_eq!(json["type"], "presence");
        assert_eq!(json["action"], "joined");
    }

    #[test]
    fn message_frame_flattens_chat_message() {
        let frame = RoomFrame::Message {
            message: ChatMessage::new("r1", "bob", "hi"),
        };
        let json = serde_json::to_value(&frame).unwrap();
        assert_eq!(json["type"], "message");
        assert_eq!(json["content"], "hi");
        assert_eq!(json["room_id"], "r1");
    }

    #[test]
    fn client_frame_parses() {
        let frame: ClientFrame =
            serde_json::from_str(r#"{"type":"message","content":"hello"}"#).unwrap();
        assert!(matches!(frame, ClientFrame::Message { content } if content == "hello"));
    }
}
