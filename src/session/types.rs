//! Session types for the AI gateway
//!
//! This module defines the conversation value types shared by the gateway,
//! the provider adapters and the session store.

use serde::{Deserialize, Serialize};
use std::time::Instant;

/// The role of a message sender in a conversation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System prompts and instructions
    System,
    /// Messages from the user
    User,
    /// Messages from the AI assistant
    Assistant,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::System => write!(f, "system"),
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

/// A single message in a conversation.
///
/// Immutable value; the order of messages in a list is the conversation order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ChatMessage {
    /// The role of the message sender
    pub role: Role,
    /// The text content of the message
    pub content: String,
}

impl ChatMessage {
    /// Create a message with an explicit role.
    pub fn new(role: Role, content: &str) -> Self {
        Self {
            role,
            content: content.to_string(),
        }
    }

    /// Create a new user message.
    ///
    /// # Example
    /// ```
    /// use dst_ai_gateway::session::{ChatMessage, Role};
    ///
    /// let msg = ChatMessage::user("Is the Caves shard up?");
    /// assert_eq!(msg.role, Role::User);
    /// ```
    pub fn user(content: &str) -> Self {
        Self::new(Role::User, content)
    }

    /// Create a new assistant message.
    pub fn assistant(content: &str) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Create a new system message.
    pub fn system(content: &str) -> Self {
        Self::new(Role::System, content)
    }
}

/// Per-conversation message history.
///
/// Owned by the [`SessionStore`](super::SessionStore); callers only ever see
/// snapshots.
#[derive(Debug, Clone)]
pub struct ChatSession {
    /// Conversation identifier (e.g. "group:123:user:456")
    pub id: String,
    /// Ordered history, oldest first
    pub messages: Vec<ChatMessage>,
    /// Last time the session was read or written
    pub last_active: Instant,
}

impl ChatSession {
    /// Create a new empty session.
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            messages: Vec::new(),
            last_active: Instant::now(),
        }
    }

    /// Mark the session as used now.
    pub fn touch(&mut self) {
        self.last_active = Instant::now();
    }

    /// Number of messages in the history.
    pub fn message_count(&self) -> usize {
        self.messages.len()
    }

    /// Check if this session has no history.
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Drop the oldest messages so that at most `max_rounds * 2` remain.
    /// `max_rounds == 0` disables trimming.
    pub(crate) fn trim_to_rounds(&mut self, max_rounds: usize) {
        if max_rounds == 0 {
            return;
        }
        let max_messages = max_rounds * 2;
        if self.messages.len() > max_messages {
            let excess = self.messages.len() - max_messages;
            self.messages.drain(..excess);
        }
    }
}
