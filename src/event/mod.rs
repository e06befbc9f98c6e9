use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kind of domain event carried by a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventType {
    /// A reader advanced to a new chapter
    ChapterProgress,
    /// A reader submitted a rating for a series
    RatingSubmitted,
    /// Operator-initiated announcement to everyone
    SystemBroadcast,
    /// A chat message published inside a room
    ChatMessage,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::ChapterProgress => "chapter-progress",
            EventType::RatingSubmitted => "rating-submitted",
            EventType::SystemBroadcast => "system-broadcast",
            EventType::ChatMessage => "chat-message",
        }
    }
}

/// Canonical notification payload broadcast to subscribers.
///
/// The event is transport-agnostic; each transport serializes it to its own
/// wire form (UDP datagram, TCP line, WebSocket text frame). Immutable once
/// constructed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationEvent {
    #[serde(rename = "type")]
    pub event_type: EventType,
    /// Human-readable summary, e.g. "alice read Chapter 5 of Example Manga"
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manga_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chapter_number: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rating: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub room_id: Option<String>,
    #[serde(default = "Utc::now")]
    pub occurred_at: DateTime<Utc>,
}

impl NotificationEvent {
    pub fn chapter_progress(
        user_id: impl Into<String>,
        manga_id: impl Into<String>,
        chapter_number: u32,
        message: impl Into<String>,
    ) -> Self {
        Self {
            event_type: EventType::ChapterProgress,
            message: message.into(),
            user_id: Some(user_id.into()),
            manga_id: Some(manga_id.into()),
            chapter_number: Some(chapter_number),
            rating: None,
            room_id: None,
            occurred_at: Utc::now(),
        }
    }

    pub fn rating_submitted(
        user_id: impl Into<String>,
        manga_id: impl Into<String>,
        rating: f32,
        message: impl Into<String>,
    ) -> Self {
        Self {
            event_type: EventType::RatingSubmitted,
            message: message.into(),
            user_id: Some(user_id.into()),
            manga_id: Some(manga_id.into()),
            chapter_number: None,
            rating: Some(rating),
            room_id: None,
            occurred_at: Utc::now(),
        }
    }

    pub fn system_broadcast(message: impl Into<String>) -> Self {
        Self {
            event_type: EventType::SystemBroadcast,
            message: message.into(),
            user_id: None,
            manga_id: None,
            chapter_number: None,
            rating: None,
            room_id: None,
            occurred_at: Utc::now(),
        }
    }

    pub fn chat_message(
        room_id: impl Into<String>,
        user_id: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            event_type: EventType::ChatMessage,
            message: message.into(),
            user_id: Some(user_id.into()),
            manga_id: None,
            chapter_number: None,
            rating: None,
            room_id: Some(room_id.into()),
            occurred_at: Utc::now(),
        }
    }
}

/// Who a duplex subscriber is, without an auth layer behind it.
///
/// The surrounding application authenticates; by the time a handle reaches
/// this subsystem the identity is either a known user id or a generated
/// guest id. Never an untyped lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Identity {
    Authenticated { user_id: String },
    Anonymous { guest_id: Uuid },
}

impl Identity {
    pub fn anonymous() -> Self {
        Identity::Anonymous {
            guest_id: Uuid::new_v4(),
        }
    }

    /// Display name used in chat presence frames and chat history.
    pub fn display_name(&self) -> String {
        match self {
            Identity::Authenticated { user_id } => user_id.clone(),
            Identity::Anonymous { guest_id } => format!("guest-{}", &guest_id.to_string()[..8]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_type_serializes_kebab_case() {
        let event = NotificationEvent::chapter_progress("alice", "manga-1", 5, "alice read ch 5");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "chapter-progress");
        assert_eq!(json["chapter_number"], 5);
        assert!(json.get("rating").is_none());
    }

    #[test]
    fn system_broadcast_omits_domain_fields() {
        let event = NotificationEvent::system_broadcast("maintenance at noon");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "system-broadcast");
        assert!(json.get("user_id").is_none());
        assert!(json.get("manga_id").is_none());
    }

    #[test]
    fn anonymous_identity_gets_guest_display_name() {
        let id = Identity::anonymous();
        assert!(id.display_name().starts_with("guest-"));
    }
}
