//! Chat message model and the persistence collaborator consumed by the
//! duplex transport. The hub never owns message lifecycle; it only reads
//! recent history on join and hands published messages to the store.

mod store;

pub use store::{MemoryMessageStore, MessageStore, StoreError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One persisted chat message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: Uuid,
    pub room_id: String,
    /// Display name of the author (user id or guest tag)
    pub author: String,
    pub content: String,
    pub sent_at: DateTime<Utc>,
}

impl ChatMessage {
    pub fn new(
        room_id: impl Into<String>,
        author: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            room_id: room_id.into(),
            author: author.into(),
            content: content.into(),
            sent_at: Utc::now(),
        }
    }
}
