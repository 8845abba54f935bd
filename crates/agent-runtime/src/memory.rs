//! Conversation memory
//!
//! The runner consults a [`MemoryProvider`] once, before the first step, to
//! seed history. It never reads or writes memory mid-run.

use agent_core::Result;
use agent_llm::Message;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Source of stored conversation history
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MemoryProvider: Send + Sync {
    /// Stored messages of a conversation, oldest first
    ///
    /// With a `limit`, only the most recent `limit` messages are returned.
    async fn get_messages(&self, conversation_id: &str, limit: Option<usize>) -> Result<Vec<Message>>;
}

/// In-process [`MemoryProvider`]
#[derive(Debug, Default)]
pub struct InMemoryStore {
    conversations: RwLock<HashMap<String, Vec<Message>>>,
}

impl InMemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Append messages to a conversation
    pub async fn append(&self, conversation_id: &str, messages: impl IntoIterator<Item = Message>) {
        self.conversations
            .write()
            .await
            .entry(conversation_id.to_string())
            .or_default()
            .extend(messages);
    }

    /// Drop a conversation
    pub async fn clear(&self, conversation_id: &str) {
        self.conversations.write().await.remove(conversation_id);
    }
}

#[async_trait]
impl MemoryProvider for InMemoryStore {
    async fn get_messages(&self, conversation_id: &str, limit: Option<usize>) -> Result<Vec<Message>> {
        let conversations = self.conversations.read().await;
        let Some(messages) = conversations.get(conversation_id) else {
            return Ok(Vec::new());
        };

        let skip = limit.map_or(0, |limit| messages.len().saturating_sub(limit));
        Ok(messages[skip..].to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_limit_keeps_most_recent() {
        let store = InMemoryStore::new();
        store
            .append(
                "c-1",
                [
                    Message::user("first"),
                    Message::assistant("second"),
                    Message::user("third"),
                ],
            )
            .await;

        let all = store.get_messages("c-1", None).await.unwrap();
        assert_eq!(all.len(), 3);

        let recent = store.get_messages("c-1", Some(2)).await.unwrap();
        assert_eq!(recent[0].text().as_deref(), Some("second"));
        assert_eq!(recent[1].text().as_deref(), Some("third"));

        let oversized = store.get_messages("c-1", Some(10)).await.unwrap();
        assert_eq!(oversized.len(), 3);
    }

    #[tokio::test]
    async fn test_unknown_conversation_is_empty() {
        let store = InMemoryStore::new();
        assert!(store.get_messages("missing", Some(5)).await.unwrap().is_empty());

        store.append("c-1", [Message::user("hi")]).await;
        store.clear("c-1").await;
        assert!(store.get_messages("c-1", None).await.unwrap().is_empty());
    }
}
