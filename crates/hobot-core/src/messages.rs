//! Conversation message types shared by the session store, agent loop, and
//! LLM providers.

use serde::{Deserialize, Serialize};

/// Who produced a message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Instructions and injected context.
    System,
    /// Hospital staff input (or synthetic tool-result turns).
    User,
    /// Model output.
    Assistant,
}

impl Role {
    /// Wire name used in provider payloads and session logs.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// A single conversation message.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Message author.
    pub role: Role,
    /// Message text.
    pub content: String,
    /// ISO 8601 timestamp (UTC). Empty for transient prompt-only messages.
    #[serde(default)]
    pub timestamp: String,
}

impl ChatMessage {
    /// Create a message stamped with the current UTC time.
    #[must_use]
    pub fn now(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// Create an unstamped message (prompt assembly only, never persisted).
    #[must_use]
    pub fn transient(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: String::new(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
