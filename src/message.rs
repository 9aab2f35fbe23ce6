//! Conversation messages sent upstream

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Longest sender name the provider accepts
pub const MAX_NAME_CHARS: usize = 100;

/// Role of a message sender
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// System message (sets behavior)
    System,
    /// User message
    User,
    /// Assistant message
    Assistant,
}

/// A chat message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Role of the message sender
    pub role: MessageRole,

    /// Content of the message
    pub content: String,

    /// Optional sender name, forwarded verbatim upstream
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Message {
    /// Create a new message
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Message {
            role,
            content: content.into(),
            name: None,
        }
    }

    /// Create a system message
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(MessageRole::System, content)
    }

    /// Create a user message
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageRole::User, content)
    }

    /// Create an assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(MessageRole::Assistant, content)
    }

    /// Attach a sender name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Check the content and name rules the provider enforces.
    pub fn validate(&self) -> Result<()> {
        if self.content.is_empty() {
            return Err(Error::Validation(format!(
                "{:?} message content must not be empty",
                self.role
            )));
        }

        if let Some(name) = &self.name {
            let len = name.chars().count();
            if len == 0 || len > MAX_NAME_CHARS {
                return Err(Error::Validation(format!(
                    "message name must be 1..={} characters, got {}",
                    MAX_NAME_CHARS, len
                )));
            }
        }

        Ok(())
    }
}
