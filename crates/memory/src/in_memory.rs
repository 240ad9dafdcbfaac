//! In-memory store — useful for testing and ephemeral sessions.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;

use verdant_core::error::MemoryError;
use verdant_core::memory::{
    push_bounded, MemoryStore, ProfileUpdate, Severity, Struggle, UserMemory,
    EVALUATION_HISTORY_CAP,
};
use verdant_core::message::{ConversationId, Sender, StoredMessage};
use verdant_core::EvaluationRecord;

/// An in-memory store backed by hash maps.
/// Useful for tests and sessions where persistence isn't needed.
pub struct InMemoryStore {
    users: RwLock<HashMap<String, UserMemory>>,
    conversations: RwLock<HashMap<String, Vec<StoredMessage>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            users: RwLock::new(HashMap::new()),
            conversations: RwLock::new(HashMap::new()),
        }
    }

    /// Run `mutate` against the user's document, creating it on first access.
    async fn with_user<F>(&self, user_id: &str, mutate: F) -> Result<(), MemoryError>
    where
        F: FnOnce(&mut UserMemory),
    {
        let mut users = self.users.write().await;
        let memory = users
            .entry(user_id.to_string())
            .or_insert_with(|| UserMemory::new(user_id));
        mutate(memory);
        memory.updated_at = Utc::now();
        Ok(())
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MemoryStore for InMemoryStore {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn read_user_memory(&self, user_id: &str) -> Result<UserMemory, MemoryError> {
        let mut users = self.users.write().await;
        let memory = users
            .entry(user_id.to_string())
            .or_insert_with(|| UserMemory::new(user_id));
        Ok(memory.clone())
    }

    async fn merge_profile(
        &self,
        user_id: &str,
        update: ProfileUpdate,
    ) -> Result<(), MemoryError> {
        self.with_user(user_id, |memory| update.apply(&mut memory.profile))
            .await
    }

    async fn upsert_struggle(
        &self,
        user_id: &str,
        topic: &str,
        severity: Severity,
    ) -> Result<(), MemoryError> {
        self.with_user(user_id, |memory| {
            upsert_struggle_entry(&mut memory.struggles, topic, severity)
        })
        .await
    }

    async fn push_evaluation(
        &self,
        user_id: &str,
        record: EvaluationRecord,
    ) -> Result<(), MemoryError> {
        self.with_user(user_id, |memory| {
            push_bounded(
                &mut memory.progress.evaluation_history,
                record,
                EVALUATION_HISTORY_CAP,
            )
        })
        .await
    }

    async fn record_session(&self, user_id: &str, at: DateTime<Utc>) -> Result<(), MemoryError> {
        self.with_user(user_id, |memory| memory.progress.effort.record_session(at))
            .await
    }

    async fn set_context_summary(
        &self,
        user_id: &str,
        summary: &str,
    ) -> Result<(), MemoryError> {
        self.with_user(user_id, |memory| {
            memory.context_summary = Some(summary.to_string())
        })
        .await
    }

    async fn append_message(
        &self,
        conversation_id: &ConversationId,
        sender: Sender,
        content: &str,
    ) -> Result<StoredMessage, MemoryError> {
        let message = StoredMessage::new(conversation_id, sender, content);
        let mut conversations = self.conversations.write().await;
        conversations
            .entry(conversation_id.0.clone())
            .or_default()
            .push(message.clone());
        Ok(message)
    }

    async fn read_recent_messages(
        &self,
        conversation_id: &ConversationId,
        n: usize,
    ) -> Result<Vec<StoredMessage>, MemoryError> {
        let conversations = self.conversations.read().await;
        let log = conversations
            .get(&conversation_id.0)
            .map(|v| v.as_slice())
            .unwrap_or_default();
        let start = log.len().saturating_sub(n);
        Ok(log[start..].to_vec())
    }
}

/// Record or bump a struggle topic, matching case-insensitively.
pub(crate) fn upsert_struggle_entry(
    struggles: &mut Vec<Struggle>,
    topic: &str,
    severity: Severity,
) {
    let now = Utc::now();
    match struggles
        .iter_mut()
        .find(|s| s.topic.eq_ignore_ascii_case(topic))
    {
        Some(existing) => {
            existing.count += 1;
            existing.severity = severity;
            existing.last_seen = now;
        }
        None => struggles.push(Struggle {
            topic: topic.to_string(),
            severity,
            count: 1,
            last_seen: now,
        }),
    }
}
