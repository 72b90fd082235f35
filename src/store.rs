use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::ChatError;
use crate::protocol::ChatMessage;

/// The authoritative message store. Assigns ids and timestamps so the
/// sender never invents either; messages are append-only.
#[async_trait]
pub trait MessageStore: Send + Sync {
    async fn append(
        &self,
        booking_id: &str,
        sender: &str,
        receiver: &str,
        content: &str,
    ) -> Result<ChatMessage, ChatError>;

    /// Full conversation history for a booking, in append order.
    async fn history(&self, booking_id: &str) -> Result<Vec<ChatMessage>, ChatError>;
}

#[derive(Clone, Default)]
pub struct InMemoryStore {
    messages: Arc<RwLock<HashMap<String, Vec<ChatMessage>>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MessageStore for InMemoryStore {
    async fn append(
        &self,
        booking_id: &str,
        sender: &str,
        receiver: &str,
        content: &str,
    ) -> Result<ChatMessage, ChatError> {
        let message = ChatMessage {
            id: Uuid::new_v4().to_string(),
            booking_id: booking_id.to_string(),
            sender: sender.to_string(),
            receiver: receiver.to_string(),
            content: content.to_string(),
            timestamp: Utc::now(),
        };
        let mut messages = self.messages.write().await;
        messages
            .entry(booking_id.to_string())
            .or_default()
            .push(message.clone());
        Ok(message)
    }

    async fn history(&self, booking_id: &str) -> Result<Vec<ChatMessage>, ChatError> {
        let messages = self.messages.read().await;
        Ok(messages.get(booking_id).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn append_assigns_unique_ids() {
        let store = InMemoryStore::new();
        let a = store.append("b1", "u1", "u2", "hi").await.unwrap();
        let b = store.append("b1", "u2", "u1", "hey").await.unwrap();
        assert_ne!(a.id, b.id);
    }

    #[tokio::test]
    async fn history_preserves_append_order_per_booking() {
        let store = InMemoryStore::new();
        store.append("b1", "u1", "u2", "one").await.unwrap();
        store.append("b2", "u3", "u4", "elsewhere").await.unwrap();
        store.append("b1", "u2", "u1", "two").await.unwrap();

        let history = store.history("b1").await.unwrap();
        let contents: Vec<&str> = history.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["one", "two"]);

        assert!(store.history("missing").await.unwrap().is_empty());
    }
}
