//! Conversation storage backends
//!
//! The default store is in-memory and lost on restart; the trait leaves
//! room for a database-backed implementation.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::error::AgentResult;
use super::message::ConversationSession;

/// Trait for conversation storage backends
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Save a conversation session
    async fn save(&self, session: &ConversationSession) -> AgentResult<()>;

    /// Load a conversation session by ID
    async fn load(&self, session_id: &str) -> AgentResult<Option<ConversationSession>>;

    /// Get or create a session
    async fn get_or_create(&self, session_id: &str) -> AgentResult<ConversationSession> {
        if let Some(session) = self.load(session_id).await? {
            Ok(session)
        } else {
            let session = ConversationSession::new(session_id.to_string());
            self.save(&session).await?;
            Ok(session)
        }
    }
}

/// In-memory conversation store
pub struct InMemoryStore {
    sessions: RwLock<HashMap<String, ConversationSession>>,
    max_messages: usize,
}

impl InMemoryStore {
    /// Create a new store, retaining at most `max_messages` per session
    pub fn new(max_messages: usize) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            max_messages,
        }
    }
}

#[async_trait]
impl ConversationStore for InMemoryStore {
    async fn save(&self, session: &ConversationSession) -> AgentResult<()> {
        let mut stored = session.clone();
        if stored.messages.len() > self.max_messages {
            let excess = stored.messages.len() - self.max_messages;
            stored.messages.drain(..excess);
        }
        self.sessions
            .write()
            .await
            .insert(stored.session_id.clone(), stored);
        Ok(())
    }

    async fn load(&self, session_id: &str) -> AgentResult<Option<ConversationSession>> {
        Ok(self.sessions.read().await.get(session_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::message::Message;

    #[tokio::test]
    async fn test_get_or_create_round_trip() {
        let store = InMemoryStore::new(100);

        let mut session = store.get_or_create("s1").await.unwrap();
        assert!(session.messages.is_empty());

        session.add_message(Message::user("hello"));
        store.save(&session).await.unwrap();

        let loaded = store.load("s1").await.unwrap().unwrap();
        assert_eq!(loaded.message_count(), 1);
        assert_eq!(loaded.messages[0].content, "hello");
    }

    #[tokio::test]
    async fn test_load_missing_session() {
        let store = InMemoryStore::new(100);
        assert!(store.load("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_save_trims_oldest_messages() {
        let store = InMemoryStore::new(3);
        let mut session = ConversationSession::new("s1".to_string());
        for i in 0..5 {
            session.add_message(Message::user(format!("m{}", i)));
        }
        store.save(&session).await.unwrap();

        let loaded = store.load("s1").await.unwrap().unwrap();
        assert_eq!(loaded.message_count(), 3);
        assert_eq!(loaded.messages[0].content, "m2");
    }
}
