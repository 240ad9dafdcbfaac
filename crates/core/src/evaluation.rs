//! Committed evaluation records.
//!
//! One record is produced per interaction by the evaluator's model call,
//! mutated in place by the deterministic fail-safe, then appended to the
//! user's bounded evaluation history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::memory::Severity;

/// Clarity assumed for a user with no evaluation history yet.
pub const DEFAULT_CLARITY: u8 = 50;

/// Directional classification of clarity over recent turns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfusionTrend {
    Improving,
    #[default]
    Stable,
    Worsening,
}

impl std::fmt::Display for ConfusionTrend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Improving => write!(f, "improving"),
            Self::Stable => write!(f, "stable"),
            Self::Worsening => write!(f, "worsening"),
        }
    }
}

/// One committed evaluation of a user/mentor exchange.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationRecord {
    /// 0–100 estimate of the user's current understanding.
    pub clarity_score: u8,

    /// Change in understanding this turn (typically -10 to +10).
    pub understanding_delta: i8,

    /// Direction clarity is moving across recent turns.
    pub confusion_trend: ConfusionTrend,

    /// Topic needing attention, if one was detected.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub struggle_detected: Option<String>,

    /// Severity of the detected struggle.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub struggle_severity: Option<Severity>,

    /// Evaluator reasoning; carries a "[FAILSAFE]" tag when the
    /// deterministic rules overrode model output.
    pub reasoning: String,

    /// When this record was committed.
    pub recorded_at: DateTime<Utc>,
}

impl EvaluationRecord {
    /// The default evaluation substituted when the gateway fails or returns
    /// unparseable output: no change relative to the previous clarity.
    pub fn unavailable(previous_clarity: u8) -> Self {
        Self {
            clarity_score: previous_clarity,
            understanding_delta: 0,
            confusion_trend: ConfusionTrend::Stable,
            struggle_detected: None,
            struggle_severity: None,
            reasoning: "evaluation unavailable".into(),
            recorded_at: Utc::now(),
        }
    }
}
