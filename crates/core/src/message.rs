//! Message types and the subscription tier.
//!
//! Two message shapes flow through the pipeline:
//! - [`ChatMessage`]: what is sent to the generator (user/assistant/system).
//! - [`HistoryMessage`]: the persisted wire format for a session's history
//!   blob: an ordered JSON array of `{role, content}` objects.

use serde::{Deserialize, Serialize};

/// The role of a message sender in a generator conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    /// The end user
    User,
    /// The AI assistant
    Assistant,
    /// System instructions
    System,
}

/// A single message in the list sent to the generator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }
}

/// Role of a persisted history entry. Only completed exchanges are stored,
/// so system messages never appear in the blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HistoryRole {
    User,
    Assistant,
}

/// One entry in the per-session history blob.
///
/// This is the storage wire format: the blob under a session key is an
/// ordered JSON array of these, oldest first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryMessage {
    pub role: HistoryRole,
    pub content: String,
}

impl HistoryMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: HistoryRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: HistoryRole::Assistant,
            content: content.into(),
        }
    }
}

impl From<&HistoryMessage> for ChatMessage {
    fn from(msg: &HistoryMessage) -> Self {
        match msg.role {
            HistoryRole::User => ChatMessage::user(msg.content.clone()),
            HistoryRole::Assistant => ChatMessage::assistant(msg.content.clone()),
        }
    }
}

/// Subscription tier of the requesting user. Selects the tier-specific
/// instruction appended to the base system prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Starter,
    Pro,
    ProPlus,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Starter => "starter",
            Self::Pro => "pro",
            Self::ProPlus => "pro_plus",
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
