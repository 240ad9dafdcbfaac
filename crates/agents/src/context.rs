//! Context assembly — the per-request user snapshot.
//!
//! `assemble` is read-only and does not call the language-model gateway.
//! The optional stored context summary is refreshed separately, off the
//! reply path; when it is absent or stale, prompts fall back to a raw
//! concatenation of memory fields.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use verdant_core::error::MemoryError;
use verdant_core::memory::{EffortMetrics, MemoryStore, Struggle, UserProfile, RECENT_TURNS};
use verdant_core::message::{pair_turns, ConversationId, Turn};
use verdant_core::provider::{CompletionRequest, Provider};
use verdant_core::EvaluationRecord;

use crate::complete_bounded;

/// Ephemeral view of a user, composed from the memory store for the
/// duration of one request. Never persisted as a unit.
#[derive(Debug, Clone)]
pub struct UserContext {
    pub user_id: String,
    pub profile: UserProfile,
    pub struggles: Vec<Struggle>,
    /// Newest-last, already bounded by the store.
    pub evaluation_history: Vec<EvaluationRecord>,
    pub effort: EffortMetrics,
    /// Last few user/mentor exchanges, oldest first.
    pub recent_turns: Vec<Turn>,
    pub context_summary: Option<String>,
}

impl UserContext {
    /// The newest committed evaluation, if any.
    pub fn latest_evaluation(&self) -> Option<&EvaluationRecord> {
        self.evaluation_history.last()
    }

    /// The newest committed clarity score, or the neutral default.
    pub fn previous_clarity(&self) -> u8 {
        self.latest_evaluation()
            .map(|r| r.clarity_score)
            .unwrap_or(verdant_core::DEFAULT_CLARITY)
    }

    /// The stored gateway summary, or a raw concatenation of fields when
    /// none exists yet.
    pub fn summary_text(&self) -> String {
        if let Some(summary) = &self.context_summary {
            if !summary.trim().is_empty() {
                return summary.clone();
            }
        }
        self.raw_summary()
    }

    /// Deterministic fallback summary built from memory fields.
    fn raw_summary(&self) -> String {
        let mut parts = Vec::new();
        parts.push(format!("Stage: {}", self.profile.stage));
        if !self.profile.interests.is_empty() {
            parts.push(format!("Interests: {}", self.profile.interests.join(", ")));
        }
        if !self.profile.goals.is_empty() {
            parts.push(format!("Goals: {}", self.profile.goals.join(", ")));
        }
        if !self.struggles.is_empty() {
            let topics: Vec<String> = self
                .struggles
                .iter()
                .map(|s| format!("{} ({}x, {})", s.topic, s.count, s.severity))
                .collect();
            parts.push(format!("Struggles: {}", topics.join(", ")));
        }
        parts.push(format!(
            "Sessions: {}",
            self.effort.total_sessions
        ));
        parts.join(". ")
    }
}

/// Builds `UserContext` snapshots and maintains the stored summary.
pub struct ContextAssembler {
    store: Arc<dyn MemoryStore>,
    provider: Arc<dyn Provider>,
    timeout: Duration,
}

impl ContextAssembler {
    pub fn new(
        store: Arc<dyn MemoryStore>,
        provider: Arc<dyn Provider>,
        timeout: Duration,
    ) -> Self {
        Self {
            store,
            provider,
            timeout,
        }
    }

    /// Assemble a context snapshot. Read-only; a store failure propagates —
    /// retry policy belongs to the caller's transport layer.
    pub async fn assemble(
        &self,
        user_id: &str,
        conversation_id: &ConversationId,
    ) -> Result<UserContext, MemoryError> {
        let memory = self.store.read_user_memory(user_id).await?;
        let messages = self
            .store
            .read_recent_messages(conversation_id, RECENT_TURNS * 2)
            .await?;

        let mut recent_turns = pair_turns(&messages);
        if recent_turns.len() > RECENT_TURNS {
            recent_turns.drain(..recent_turns.len() - RECENT_TURNS);
        }

        debug!(
            user_id,
            turns = recent_turns.len(),
            evaluations = memory.progress.evaluation_history.len(),
            "Context assembled"
        );

        Ok(UserContext {
            user_id: user_id.to_string(),
            profile: memory.profile,
            struggles: memory.struggles,
            evaluation_history: memory.progress.evaluation_history,
            effort: memory.progress.effort,
            recent_turns,
            context_summary: memory.context_summary,
        })
    }

    /// Regenerate the stored context summary via the gateway.
    ///
    /// Runs as background work. On gateway failure the stored summary is
    /// left untouched and the raw-concatenation fallback keeps serving.
    pub async fn refresh_summary(&self, user_id: &str) -> Result<(), MemoryError> {
        let memory = self.store.read_user_memory(user_id).await?;
        let context = UserContext {
            user_id: user_id.to_string(),
            profile: memory.profile,
            struggles: memory.struggles,
            evaluation_history: memory.progress.evaluation_history,
            effort: memory.progress.effort,
            recent_turns: Vec::new(),
            context_summary: None,
        };

        let prompt = format!(
            "Based on this learner's profile and history, write a brief 2-3 sentence \
             summary that captures who they are and where they are in their journey.\n\n\
             {}\n\n\
             Write a warm, person-focused summary (not a list). Start with their stage \
             of growth.",
            context.raw_summary()
        );

        match complete_bounded(&self.provider, self.timeout, CompletionRequest::text(prompt))
            .await
        {
            Ok(response) if !response.text.trim().is_empty() => {
                self.store
                    .set_context_summary(user_id, response.text.trim())
                    .await
            }
            Ok(_) => Ok(()),
            Err(e) => {
                warn!(user_id, error = %e, "Summary refresh failed, keeping raw fallback");
                Ok(())
            }
        }
    }
}
