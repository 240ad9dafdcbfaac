//! User memory schema and the `MemoryStore` contract.
//!
//! `UserMemory` is the single mutable shared resource in the system. All
//! writes are targeted field merges or bounded-array pushes, never
//! whole-document replacement, so concurrent writers touching different
//! fields of the same document do not clobber each other.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::MemoryError;
use crate::evaluation::EvaluationRecord;
use crate::message::{ConversationId, Sender, StoredMessage};

/// Evaluation history keeps the most recent entries only (oldest dropped first).
pub const EVALUATION_HISTORY_CAP: usize = 20;

/// Session dates keep the most recent entries only (oldest dropped first).
pub const SESSION_DATES_CAP: usize = 100;

/// How many recent user/mentor turns the context assembler pulls.
pub const RECENT_TURNS: usize = 5;

/// Growth stage of a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    #[default]
    Seedling,
    Growing,
    Branching,
    Flourishing,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Seedling => write!(f, "seedling"),
            Self::Growing => write!(f, "growing"),
            Self::Branching => write!(f, "branching"),
            Self::Flourishing => write!(f, "flourishing"),
        }
    }
}

/// How quickly the user absorbs new material.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LearningPace {
    Slow,
    #[default]
    Moderate,
    Fast,
}

impl std::fmt::Display for LearningPace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Slow => write!(f, "slow"),
            Self::Moderate => write!(f, "moderate"),
            Self::Fast => write!(f, "fast"),
        }
    }
}

/// Direction the user's confidence is moving.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceTrend {
    Declining,
    #[default]
    Stable,
    Growing,
}

/// Severity of a struggle topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[default]
    Mild,
    Moderate,
    Significant,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Mild => write!(f, "mild"),
            Self::Moderate => write!(f, "moderate"),
            Self::Significant => write!(f, "significant"),
        }
    }
}

/// Level of a derived learner trait (perseverance, frustration tolerance).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TraitLevel {
    Low,
    #[default]
    Moderate,
    High,
}

/// User profile within memory.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(default)]
    pub interests: Vec<String>,

    #[serde(default)]
    pub goals: Vec<String>,

    #[serde(default)]
    pub stage: Stage,

    #[serde(default)]
    pub learning_pace: LearningPace,

    #[serde(default)]
    pub confidence_trend: ConfidenceTrend,

    /// Derived over time from evaluation patterns.
    #[serde(default)]
    pub perseverance: TraitLevel,

    /// Derived over time from evaluation patterns.
    #[serde(default)]
    pub frustration_tolerance: TraitLevel,
}

/// Record of a topic the user struggles with.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Struggle {
    pub topic: String,
    pub severity: Severity,
    pub count: u32,
    pub last_seen: DateTime<Utc>,
}

/// Raw activity metrics. Effort reflects activity, not understanding —
/// the insight deriver keeps the two strictly apart.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EffortMetrics {
    #[serde(default)]
    pub total_sessions: u32,

    /// Most recent session timestamps, bounded to [`SESSION_DATES_CAP`].
    #[serde(default)]
    pub session_dates: Vec<DateTime<Utc>>,

    /// Consecutive-day streak.
    #[serde(default)]
    pub consistency_streak: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_session: Option<DateTime<Utc>>,
}

impl EffortMetrics {
    /// Apply one session occurrence: bump the total, maintain the
    /// consecutive-day streak, and push the date (bounded).
    pub fn record_session(&mut self, at: DateTime<Utc>) {
        self.consistency_streak = match self.last_session {
            Some(last) => {
                let days = at
                    .date_naive()
                    .signed_duration_since(last.date_naive())
                    .num_days();
                if days == 0 {
                    // Same day — streak unchanged
                    self.consistency_streak.max(1)
                } else if days == 1 {
                    self.consistency_streak + 1
                } else {
                    1
                }
            }
            None => 1,
        };
        self.last_session = Some(at);
        self.total_sessions += 1;
        push_bounded(&mut self.session_dates, at, SESSION_DATES_CAP);
    }

    /// How many recorded sessions fall at or after `cutoff`.
    pub fn sessions_since(&self, cutoff: DateTime<Utc>) -> usize {
        self.session_dates.iter().filter(|d| **d >= cutoff).count()
    }
}

/// User progress tracking.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserProgress {
    #[serde(default)]
    pub effort: EffortMetrics,

    /// Newest-last, bounded to [`EVALUATION_HISTORY_CAP`].
    #[serde(default)]
    pub evaluation_history: Vec<EvaluationRecord>,

    /// Reference to the user's active roadmap, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_roadmap: Option<String>,
}

/// Complete user memory document — one per user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserMemory {
    pub user_id: String,

    #[serde(default)]
    pub profile: UserProfile,

    #[serde(default)]
    pub struggles: Vec<Struggle>,

    #[serde(default)]
    pub progress: UserProgress,

    /// Gateway-generated summary used for prompt compression. Absent until
    /// the first background refresh; callers fall back to raw field concat.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_summary: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserMemory {
    /// A fresh, empty document for a new user.
    pub fn new(user_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            user_id: user_id.into(),
            profile: UserProfile::default(),
            struggles: Vec::new(),
            progress: UserProgress::default(),
            context_summary: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// The most recently committed clarity score, or the neutral default
    /// for users with no history yet.
    pub fn previous_clarity(&self) -> u8 {
        self.progress
            .evaluation_history
            .last()
            .map(|r| r.clarity_score)
            .unwrap_or(crate::evaluation::DEFAULT_CLARITY)
    }
}

/// A partial profile update. `None` fields are left untouched (merge
/// semantics — never a whole-document overwrite).
#[derive(Debug, Clone, Default)]
pub struct ProfileUpdate {
    pub interests: Option<Vec<String>>,
    pub goals: Option<Vec<String>>,
    pub stage: Option<Stage>,
    pub learning_pace: Option<LearningPace>,
    pub confidence_trend: Option<ConfidenceTrend>,
    pub perseverance: Option<TraitLevel>,
    pub frustration_tolerance: Option<TraitLevel>,
}

impl ProfileUpdate {
    pub fn is_empty(&self) -> bool {
        self.interests.is_none()
            && self.goals.is_none()
            && self.stage.is_none()
            && self.learning_pace.is_none()
            && self.confidence_trend.is_none()
            && self.perseverance.is_none()
            && self.frustration_tolerance.is_none()
    }

    /// Merge the non-`None` fields into `profile`.
    pub fn apply(&self, profile: &mut UserProfile) {
        if let Some(interests) = &self.interests {
            profile.interests = interests.clone();
        }
        if let Some(goals) = &self.goals {
            profile.goals = goals.clone();
        }
        if let Some(stage) = self.stage {
            profile.stage = stage;
        }
        if let Some(pace) = self.learning_pace {
            profile.learning_pace = pace;
        }
        if let Some(trend) = self.confidence_trend {
            profile.confidence_trend = trend;
        }
        if let Some(level) = self.perseverance {
            profile.perseverance = level;
        }
        if let Some(level) = self.frustration_tolerance {
            profile.frustration_tolerance = level;
        }
    }
}

/// Append `value` and drop the oldest entries beyond `cap` (FIFO eviction).
pub fn push_bounded<T>(items: &mut Vec<T>, value: T, cap: usize) {
    items.push(value);
    if items.len() > cap {
        let excess = items.len() - cap;
        items.drain(..excess);
    }
}

/// The keyed-document store holding per-user memory and conversation logs.
///
/// Implementations: SQLite, in-memory (for testing). All writes are
/// idempotent-safe at the field level.
#[async_trait]
pub trait MemoryStore: Send + Sync {
    /// The backend name (e.g., "sqlite", "in_memory").
    fn name(&self) -> &str;

    /// Read a user's memory document, creating an empty one on first access.
    async fn read_user_memory(&self, user_id: &str) -> Result<UserMemory, MemoryError>;

    /// Merge the non-`None` fields of `update` into the profile.
    async fn merge_profile(
        &self,
        user_id: &str,
        update: ProfileUpdate,
    ) -> Result<(), MemoryError>;

    /// Record or bump a struggle topic (case-insensitive topic match).
    async fn upsert_struggle(
        &self,
        user_id: &str,
        topic: &str,
        severity: Severity,
    ) -> Result<(), MemoryError>;

    /// Bounded push onto `evaluation_history` ([`EVALUATION_HISTORY_CAP`]).
    async fn push_evaluation(
        &self,
        user_id: &str,
        record: EvaluationRecord,
    ) -> Result<(), MemoryError>;

    /// Count one session: bump totals, maintain the streak, bounded push
    /// onto `session_dates` ([`SESSION_DATES_CAP`]).
    async fn record_session(&self, user_id: &str, at: DateTime<Utc>) -> Result<(), MemoryError>;

    /// Store the gateway-generated context summary.
    async fn set_context_summary(&self, user_id: &str, summary: &str)
        -> Result<(), MemoryError>;

    /// Append a message to a conversation log. Returns the stored message.
    async fn append_message(
        &self,
        conversation_id: &ConversationId,
        sender: Sender,
        content: &str,
    ) -> Result<StoredMessage, MemoryError>;

    /// The last `n` messages of a conversation, oldest first.
    async fn read_recent_messages(
        &self,
        conversation_id: &ConversationId,
        n: usize,
    ) -> Result<Vec<StoredMessage>, MemoryError>;
}
