//! SQLite store.
//!
//! One row per user in `user_memory`, with each mergeable field in its own
//! JSON column (`profile`, `struggles`, `progress`) so that writers touching
//! different fields never overwrite each other. Field mutations are
//! read-modify-write on a single column inside a transaction.
//! Conversation logs live in an append-only `messages` table.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use tracing::{debug, info};
use uuid::Uuid;

use verdant_core::error::MemoryError;
use verdant_core::memory::{
    push_bounded, MemoryStore, ProfileUpdate, Severity, Struggle, UserMemory, UserProfile,
    UserProgress, EVALUATION_HISTORY_CAP,
};
use verdant_core::message::{ConversationId, Sender, StoredMessage};
use verdant_core::EvaluationRecord;

use crate::in_memory::upsert_struggle_entry;

/// A persistent SQLite memory store.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (or create) the database at `path`.
    ///
    /// Pass `":memory:"` for an in-process ephemeral database (tests).
    pub async fn new(path: &str) -> Result<Self, MemoryError> {
        let options = SqliteConnectOptions::from_str(path)
            .map_err(|e| MemoryError::Storage(format!("Invalid SQLite path: {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        // A ":memory:" database exists per connection, so the pool must not
        // hand out more than one.
        let max_connections = if path.contains(":memory:") { 1 } else { 4 };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .map_err(|e| MemoryError::Unavailable(format!("Failed to open SQLite: {e}")))?;

        let store = Self { pool };
        store.run_migrations().await?;
        info!("SQLite memory store initialized at {path}");
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<(), MemoryError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS user_memory (
                user_id         TEXT PRIMARY KEY,
                profile         TEXT NOT NULL,
                struggles       TEXT NOT NULL DEFAULT '[]',
                progress        TEXT NOT NULL,
                context_summary TEXT,
                created_at      TEXT NOT NULL,
                updated_at      TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| MemoryError::MigrationFailed(format!("user_memory table: {e}")))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS messages (
                id              TEXT PRIMARY KEY,
                conversation_id TEXT NOT NULL,
                sender          TEXT NOT NULL,
                content         TEXT NOT NULL,
                created_at      TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| MemoryError::MigrationFailed(format!("messages table: {e}")))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_messages_conversation
             ON messages(conversation_id, created_at)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| MemoryError::MigrationFailed(format!("messages index: {e}")))?;

        debug!("SQLite migrations complete");
        Ok(())
    }

    /// Insert the empty document for `user_id` if it doesn't exist yet.
    async fn ensure_user<'e, E>(executor: E, user_id: &str) -> Result<(), MemoryError>
    where
        E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
    {
        let empty = UserMemory::new(user_id);
        sqlx::query(
            r#"
            INSERT OR IGNORE INTO user_memory
                (user_id, profile, struggles, progress, context_summary, created_at, updated_at)
            VALUES (?, ?, '[]', ?, NULL, ?, ?)
            "#,
        )
        .bind(user_id)
        .bind(to_json(&empty.profile)?)
        .bind(to_json(&empty.progress)?)
        .bind(empty.created_at.to_rfc3339())
        .bind(empty.updated_at.to_rfc3339())
        .execute(executor)
        .await
        .map_err(|e| MemoryError::Storage(format!("ensure user: {e}")))?;
        Ok(())
    }

    /// Read-modify-write a single JSON column inside a transaction.
    async fn mutate_column<T, F>(
        &self,
        user_id: &str,
        column: &'static str,
        mutate: F,
    ) -> Result<(), MemoryError>
    where
        T: serde::de::DeserializeOwned + serde::Serialize,
        F: FnOnce(&mut T),
    {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| MemoryError::Unavailable(format!("begin transaction: {e}")))?;

        Self::ensure_user(&mut *tx, user_id).await?;

        let query = format!("SELECT {column} FROM user_memory WHERE user_id = ?");
        let row = sqlx::query(&query)
            .bind(user_id)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| MemoryError::QueryFailed(format!("{column} read: {e}")))?;
        let json: String = row
            .try_get(0)
            .map_err(|e| MemoryError::QueryFailed(format!("{column} column: {e}")))?;

        let mut value: T = from_json(&json)?;
        mutate(&mut value);

        let update = format!("UPDATE user_memory SET {column} = ?, updated_at = ? WHERE user_id = ?");
        sqlx::query(&update)
            .bind(to_json(&value)?)
            .bind(Utc::now().to_rfc3339())
            .bind(user_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| MemoryError::Storage(format!("{column} write: {e}")))?;

        tx.commit()
            .await
            .map_err(|e| MemoryError::Storage(format!("commit: {e}")))?;
        Ok(())
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, MemoryError> {
    serde_json::to_string(value).map_err(|e| MemoryError::Storage(format!("serialize: {e}")))
}

fn from_json<T: serde::de::DeserializeOwned>(json: &str) -> Result<T, MemoryError> {
    serde_json::from_str(json).map_err(|e| MemoryError::QueryFailed(format!("deserialize: {e}")))
}

fn parse_timestamp(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

#[async_trait]
impl MemoryStore for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn read_user_memory(&self, user_id: &str) -> Result<UserMemory, MemoryError> {
        Self::ensure_user(&self.pool, user_id).await?;

        let row = sqlx::query(
            "SELECT profile, struggles, progress, context_summary, created_at, updated_at
             FROM user_memory WHERE user_id = ?",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| MemoryError::QueryFailed(format!("user_memory read: {e}")))?;

        let profile: UserProfile = from_json(
            &row.try_get::<String, _>("profile")
                .map_err(|e| MemoryError::QueryFailed(format!("profile column: {e}")))?,
        )?;
        let struggles: Vec<Struggle> = from_json(
            &row.try_get::<String, _>("struggles")
                .map_err(|e| MemoryError::QueryFailed(format!("struggles column: {e}")))?,
        )?;
        let progress: UserProgress = from_json(
            &row.try_get::<String, _>("progress")
                .map_err(|e| MemoryError::QueryFailed(format!("progress column: {e}")))?,
        )?;
        let context_summary: Option<String> = row
            .try_get("context_summary")
            .map_err(|e| MemoryError::QueryFailed(format!("context_summary column: {e}")))?;
        let created_at: String = row
            .try_get("created_at")
            .map_err(|e| MemoryError::QueryFailed(format!("created_at column: {e}")))?;
        let updated_at: String = row
            .try_get("updated_at")
            .map_err(|e| MemoryError::QueryFailed(format!("updated_at column: {e}")))?;

        Ok(UserMemory {
            user_id: user_id.to_string(),
            profile,
            struggles,
            progress,
            context_summary,
            created_at: parse_timestamp(&created_at),
            updated_at: parse_timestamp(&updated_at),
        })
    }

    async fn merge_profile(
        &self,
        user_id: &str,
        update: ProfileUpdate,
    ) -> Result<(), MemoryError> {
        self.mutate_column::<UserProfile, _>(user_id, "profile", |profile| {
            update.apply(profile)
        })
        .await
    }

    async fn upsert_struggle(
        &self,
        user_id: &str,
        topic: &str,
        severity: Severity,
    ) -> Result<(), MemoryError> {
        self.mutate_column::<Vec<Struggle>, _>(user_id, "struggles", |struggles| {
            upsert_struggle_entry(struggles, topic, severity)
        })
        .await
    }

    async fn push_evaluation(
        &self,
        user_id: &str,
        record: EvaluationRecord,
    ) -> Result<(), MemoryError> {
        self.mutate_column::<UserProgress, _>(user_id, "progress", |progress| {
            push_bounded(
                &mut progress.evaluation_history,
                record,
                EVALUATION_HISTORY_CAP,
            )
        })
        .await
    }

    async fn record_session(&self, user_id: &str, at: DateTime<Utc>) -> Result<(), MemoryError> {
        self.mutate_column::<UserProgress, _>(user_id, "progress", |progress| {
            progress.effort.record_session(at)
        })
        .await
    }

    async fn set_context_summary(
        &self,
        user_id: &str,
        summary: &str,
    ) -> Result<(), MemoryError> {
        Self::ensure_user(&self.pool, user_id).await?;
        sqlx::query(
            "UPDATE user_memory SET context_summary = ?, updated_at = ? WHERE user_id = ?",
        )
        .bind(summary)
        .bind(Utc::now().to_rfc3339())
        .bind(user_id)
        .execute(&self.pool)
        .await
        .map_err(|e| MemoryError::Storage(format!("context_summary write: {e}")))?;
        Ok(())
    }

    async fn append_message(
        &self,
        conversation_id: &ConversationId,
        sender: Sender,
        content: &str,
    ) -> Result<StoredMessage, MemoryError> {
        let message = StoredMessage {
            id: Uuid::new_v4().to_string(),
            conversation_id: conversation_id.clone(),
            sender,
            content: content.to_string(),
            created_at: Utc::now(),
        };

        sqlx::query(
            "INSERT INTO messages (id, conversation_id, sender, content, created_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&message.id)
        .bind(&conversation_id.0)
        .bind(sender.to_string())
        .bind(content)
        .bind(message.created_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| MemoryError::Storage(format!("message insert: {e}")))?;

        Ok(message)
    }

    async fn read_recent_messages(
        &self,
        conversation_id: &ConversationId,
        n: usize,
    ) -> Result<Vec<StoredMessage>, MemoryError> {
        let rows = sqlx::query(
            "SELECT id, sender, content, created_at FROM messages
             WHERE conversation_id = ?
             ORDER BY created_at DESC, rowid DESC
             LIMIT ?",
        )
        .bind(&conversation_id.0)
        .bind(n as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| MemoryError::QueryFailed(format!("messages read: {e}")))?;

        let mut messages = Vec::with_capacity(rows.len());
        for row in rows {
            let sender_str: String = row
                .try_get("sender")
                .map_err(|e| MemoryError::QueryFailed(format!("sender column: {e}")))?;
            let sender = match sender_str.as_str() {
                "user" => Sender::User,
                _ => Sender::Mentor,
            };
            let created_at: String = row
                .try_get("created_at")
                .map_err(|e| MemoryError::QueryFailed(format!("created_at column: {e}")))?;

            messages.push(StoredMessage {
                id: row
                    .try_get("id")
                    .map_err(|e| MemoryError::QueryFailed(format!("id column: {e}")))?,
                conversation_id: conversation_id.clone(),
                sender,
                content: row
                    .try_get("content")
                    .map_err(|e| MemoryError::QueryFailed(format!("content column: {e}")))?,
                created_at: parse_timestamp(&created_at),
            });
        }

        // Chronological order
        messages.reverse();
        Ok(messages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use verdant_core::evaluation::ConfusionTrend;
    use verdant_core::memory::{LearningPace, SESSION_DATES_CAP};

    async fn store() -> SqliteStore {
        SqliteStore::new(":memory:").await.unwrap()
    }

    fn record(clarity: u8) -> EvaluationRecord {
        EvaluationRecord {
            clarity_score: clarity,
            understanding_delta: 0,
            confusion_trend: ConfusionTrend::Stable,
            struggle_detected: None,
            struggle_severity: None,
            reasoning: String::new(),
            recorded_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn first_read_creates_empty_document() {
        let store = store().await;
        let memory = store.read_user_memory("user-1").await.unwrap();
        assert_eq!(memory.user_id, "user-1");
        assert!(memory.progress.evaluation_history.is_empty());
        assert!(memory.context_summary.is_none());
    }

    #[tokio::test]
    async fn profile_merge_persists() {
        let store = store().await;
        store
            .merge_profile(
                "user-1",
                ProfileUpdate {
                    goals: Some(vec!["understand async".into()]),
                    learning_pace: Some(LearningPace::Fast),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let memory = store.read_user_memory("user-1").await.unwrap();
        assert_eq!(memory.profile.goals, vec!["understand async".to_string()]);
        assert_eq!(memory.profile.learning_pace, LearningPace::Fast);
    }

    #[tokio::test]
    async fn merges_do_not_clobber_other_fields() {
        let store = store().await;
        store
            .upsert_struggle("user-1", "borrow checker", Severity::Significant)
            .await
            .unwrap();
        store
            .merge_profile(
                "user-1",
                ProfileUpdate {
                    interests: Some(vec!["compilers".into()]),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        store.push_evaluation("user-1", record(55)).await.unwrap();

        let memory = store.read_user_memory("user-1").await.unwrap();
        assert_eq!(memory.struggles.len(), 1);
        assert_eq!(memory.profile.interests, vec!["compilers".to_string()]);
        assert_eq!(memory.progress.evaluation_history.len(), 1);
    }

    #[tokio::test]
    async fn evaluation_history_bounded_fifo() {
        let store = store().await;
        for i in 0..(EVALUATION_HISTORY_CAP + 3) {
            store
                .push_evaluation("user-1", record(i as u8))
                .await
                .unwrap();
        }

        let memory = store.read_user_memory("user-1").await.unwrap();
        let history = &memory.progress.evaluation_history;
        assert_eq!(history.len(), EVALUATION_HISTORY_CAP);
        assert_eq!(history[0].clarity_score, 3);
    }

    #[tokio::test]
    async fn session_dates_bounded() {
        let store = store().await;
        let start = Utc::now() - chrono::Duration::days(300);
        for i in 0..(SESSION_DATES_CAP + 2) {
            store
                .record_session("user-1", start + chrono::Duration::hours(i as i64))
                .await
                .unwrap();
        }

        let memory = store.read_user_memory("user-1").await.unwrap();
        assert_eq!(
            memory.progress.effort.session_dates.len(),
            SESSION_DATES_CAP
        );
        assert_eq!(
            memory.progress.effort.total_sessions,
            (SESSION_DATES_CAP + 2) as u32
        );
    }

    #[tokio::test]
    async fn message_log_roundtrip() {
        let store = store().await;
        let conv = ConversationId::from("conv-1");

        store
            .append_message(&conv, Sender::User, "How do traits work?")
            .await
            .unwrap();
        store
            .append_message(&conv, Sender::Mentor, "A trait describes behavior...")
            .await
            .unwrap();

        let messages = store.read_recent_messages(&conv, 10).await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].sender, Sender::User);
        assert_eq!(messages[1].sender, Sender::Mentor);
    }

    #[tokio::test]
    async fn context_summary_set_and_read() {
        let store = store().await;
        store
            .set_context_summary("user-1", "A curious learner early in their journey.")
            .await
            .unwrap();
        let memory = store.read_user_memory("user-1").await.unwrap();
        assert_eq!(
            memory.context_summary.as_deref(),
            Some("A curious learner early in their journey.")
        );
    }
}
