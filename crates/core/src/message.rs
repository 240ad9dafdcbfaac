//! Conversation log types.
//!
//! The pipeline persists the user message before planning and the mentor
//! reply before returning it — losing a sent message is treated as worse
//! than added latency.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a conversation (session).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationId(pub String);

impl ConversationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl Default for ConversationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConversationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Who authored a stored message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    /// The end user
    User,
    /// The mentor reply produced by the pipeline
    Mentor,
}

impl std::fmt::Display for Sender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Mentor => write!(f, "mentor"),
        }
    }
}

/// A single persisted message in a conversation log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredMessage {
    /// Unique message ID
    pub id: String,

    /// The conversation this message belongs to
    pub conversation_id: ConversationId,

    /// Who sent it
    pub sender: Sender,

    /// The text content
    pub content: String,

    /// Timestamp
    pub created_at: DateTime<Utc>,
}

impl StoredMessage {
    /// Create a new message with a fresh ID and the current timestamp.
    pub fn new(
        conversation_id: &ConversationId,
        sender: Sender,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            conversation_id: conversation_id.clone(),
            sender,
            content: content.into(),
            created_at: Utc::now(),
        }
    }
}

/// One user/mentor exchange, used for recent-turn context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub user: String,
    pub mentor: String,
}

/// Pair a chronological message log into user/mentor turns, oldest first.
///
/// A user message with no mentor reply yet (the message currently being
/// processed) is dropped rather than paired with the wrong reply.
pub fn pair_turns(messages: &[StoredMessage]) -> Vec<Turn> {
    let mut turns = Vec::new();
    let mut pending_user: Option<&StoredMessage> = None;

    for msg in messages {
        match msg.sender {
            Sender::User => pending_user = Some(msg),
            Sender::Mentor => {
                if let Some(user) = pending_user.take() {
                    turns.push(Turn {
                        user: user.content.clone(),
                        mentor: msg.content.clone(),
                    });
                }
            }
        }
    }

    turns
}
