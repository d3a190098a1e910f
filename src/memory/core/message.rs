//! Conversation message model.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Role of a conversation message.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// User input.
    User,
    /// Assistant response.
    Assistant,
    /// System instruction.
    System,
    /// Tool output.
    Tool,
}

impl Role {
    /// Stable string form for storage.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
            Self::Tool => "tool",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "user" => Ok(Self::User),
            "assistant" => Ok(Self::Assistant),
            "system" => Ok(Self::System),
            "tool" => Ok(Self::Tool),
            _ => Err(value.to_string()),
        }
    }
}

/// A stored conversation message.
///
/// `sequence_index` is assigned by the message store and is the only source
/// of truth for chronology.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Author role.
    pub role: Role,
    /// Text payload.
    pub content: String,
    /// Position in the thread, strictly increasing.
    pub sequence_index: u64,
}

impl Message {
    /// Build a message at a known position.
    #[must_use]
    pub fn new(role: Role, content: impl Into<String>, sequence_index: u64) -> Self {
        Self {
            role,
            content: content.into(),
            sequence_index,
        }
    }

    /// Content length in characters.
    #[must_use]
    pub fn char_len(&self) -> usize {
        self.content.chars().count()
    }
}

/// A message that has not been assigned a position yet.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct NewMessage {
    /// Author role.
    pub role: Role,
    /// Text payload.
    pub content: String,
}

impl NewMessage {
    /// Build a user message.
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    /// Build an assistant message.
    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }

    /// Build a message with an explicit role.
    #[must_use]
    pub fn with_role(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// A message paired with its importance score for one pipeline run.
#[derive(Clone, Debug, PartialEq)]
pub struct ScoredMessage {
    /// The scored message.
    pub message: Message,
    /// Importance score; higher is more important.
    pub score: f64,
    /// Copy of `message.sequence_index` for cheap ordering.
    pub sequence_index: u64,
}

impl ScoredMessage {
    /// Wrap a message with a score.
    #[must_use]
    pub const fn new(message: Message, score: f64) -> Self {
        let sequence_index = message.sequence_index;
        Self {
            message,
            score,
            sequence_index,
        }
    }
}
