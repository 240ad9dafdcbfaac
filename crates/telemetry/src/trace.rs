//! Trace entry data model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Correlates all trace entries produced while handling one request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(pub String);

impl RequestId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One recorded agent action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceEntry {
    /// Unique identifier for this entry.
    pub trace_id: String,

    /// The request this entry belongs to.
    pub request_id: RequestId,

    /// Which agent acted (e.g. "planner", "evaluator", "orchestrator").
    pub agent: String,

    /// What it did (e.g. "strategy_ready", "failsafe_override").
    pub action: String,

    /// Free-form structured details.
    pub details: serde_json::Value,

    /// When the action happened.
    pub timestamp: DateTime<Utc>,
}

impl TraceEntry {
    pub fn new(
        request_id: &RequestId,
        agent: impl Into<String>,
        action: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        Self {
            trace_id: Uuid::new_v4().to_string(),
            request_id: request_id.clone(),
            agent: agent.into(),
            action: action.into(),
            details,
            timestamp: Utc::now(),
        }
    }
}
