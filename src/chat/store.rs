use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::RwLock;

use super::ChatMessage;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Store backend unavailable: {0}")]
    Unavailable(String),
}

/// External persistence collaborator for chat history.
///
/// The production deployment backs this with the application's database; the
/// hub only depends on the trait. `get_recent` returns messages in
/// chronological order along with the room's total message count.
#[async_trait]
pub trait MessageStore: Send + Sync {
    async fn save(&self, message: &ChatMessage) -> Result<(), StoreError>;

    async fn get_recent(
        &self,
        room_id: &str,
        limit: usize,
        offset: usize,
    ) -> Result<(Vec<ChatMessage>, usize), StoreError>;
}

/// In-memory message store, used standalone and in tests.
pub struct MemoryMessageStore {
    rooms: RwLock<HashMap<String, Vec<ChatMessage>>>,
}

impl MemoryMessageStore {
    pub fn new() -> Self {
        Self {
            rooms: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for MemoryMessageStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MessageStore for MemoryMessageStore {
    async fn save(&self, message: &ChatMessage) -> Result<(), StoreError> {
        let mut rooms = self.rooms.write().await;
        rooms
            .entry(message.room_id.clone())
            .or_default()
            .push(message.clone());
        Ok(())
    }

    async fn get_recent(
        &self,
        room_id: &str,
        limit: usize,
        offset: usize,
    ) -> Result<(Vec<ChatMessage>, usize), StoreError> {
        let rooms = self.rooms.read().await;
        let messages = match rooms.get(room_id) {
            Some(m) => m,
            None => return Ok((Vec::new(), 0)),
        };

        let total = messages.len();
        // Offset counts back from the newest message
        let end = total.saturating_sub(offset);
        let start = end.saturating_sub(limit);
        Ok((messages[start..end].to_vec(), total))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn get_recent_returns_newest_window() {
        let store = MemoryMessageStore::new();
        for i in 0..10 {
            store
                .save(&ChatMessage::new("room-1", "alice", format!("msg {i}")))
                .await
                .unwrap();
        }

        let (messages, total) = store.get_recent("room-1", 3, 0).await.unwrap();
        assert_eq!(total, 10);
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0].content, "msg 7");
        assert_eq!(messages[2].content, "msg 9");
    }

    #[tokio::test]
    async fn offset_pages_backwards() {
        let store = MemoryMessageStore::new();
        for i in 0..5 {
            store
                .save(&ChatMessage::new("room-1", "bob", format!("msg {i}")))
                .await
                .unwrap();
        }

        let (messages, total) = store.get_recent("room-1", 2, 2).await.unwrap();
        assert_eq!(total, 5);
        assert_eq!(messages[0].content, "msg 1");
        assert_eq!(messages[1].content, "msg 2");
    }

    #[tokio::test]
    async fn unknown_room_is_empty() {
        let store = MemoryMessageStore::new();
        let (messages, total) = store.get_recent("nope", 10, 0).await.unwrap();
        assert!(messages.is_empty());
        assert_eq!(total, 0);
    }
}
