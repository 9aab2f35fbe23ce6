//! Message persistence hook
//!
//! The relay itself stores nothing. Once a relay completes, the gateway hands
//! the assistant's full reply to a [`MessageStore`].

use std::collections::HashMap;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::{message::MessageRole, Result};

/// A message ready to be persisted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredMessage {
    pub chat_id: String,
    pub role: MessageRole,
    pub content: String,
    pub name: Option<String>,
}

/// Message-store collaborator
#[async_trait::async_trait]
pub trait MessageStore: Send + Sync {
    async fn save(&self, message: StoredMessage) -> Result<()>;
}

/// Process-local store keyed by chat id
#[derive(Debug, Default)]
pub struct InMemoryMessageStore {
    chats: Mutex<HashMap<String, Vec<StoredMessage>>>,
}

impl InMemoryMessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages saved for `chat_id`, oldest first
    pub fn messages(&self, chat_id: &str) -> Vec<StoredMessage> {
        self.chats
            .lock()
            .map(|chats| chats.get(chat_id).cloned().unwrap_or_default())
            .unwrap_or_default()
    }
}

#[async_trait::async_trait]
impl MessageStore for InMemoryMessageStore {
    async fn save(&self, message: StoredMessage) -> Result<()> {
        let mut chats = self
            .chats
            .lock()
            .map_err(|_| crate::Error::Config("message store lock poisoned".to_string()))?;
        chats
            .entry(message.chat_id.clone())
            .or_default()
            .push(message);
        Ok(())
    }
}
