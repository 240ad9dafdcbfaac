//! Interaction evaluator and the truthful-evaluation fail-safe.
//!
//! The evaluator asks the gateway for genuine-understanding signals, then
//! runs deterministic rules the model is not permitted to contradict: when
//! the user has *explicitly* said they are confused, the committed record
//! can never claim improvement. This is what keeps "truthful progress, not
//! flattery" an invariant instead of a hope.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, warn};

use verdant_core::memory::{LearningPace, Severity, TraitLevel, UserMemory};
use verdant_core::provider::{parse_structured, CompletionRequest, Provider};
use verdant_core::{ConfusionTrend, EvaluationRecord, ProfileUpdate};

use crate::complete_bounded;
use crate::context::UserContext;

/// Markers of explicit user confusion, substring-matched on the lowercased
/// message. Fixed list including common contraction variants; broader NLP
/// detection is deliberately out of scope.
pub const CONFUSION_MARKERS: &[&str] = &[
    "don't understand",
    "dont understand",
    "do not understand",
    "i'm confused",
    "im confused",
    "i am confused",
    "doesn't make sense",
    "doesnt make sense",
    "does not make sense",
    "makes no sense",
    "what do you mean",
    "lost",
];

/// Struggle topic assigned when the fail-safe fires without the model
/// naming one.
const GENERAL_DIFFICULTY: &str = "general difficulty";

/// Tag appended to `reasoning` whenever the fail-safe overrode model output.
const FAILSAFE_TAG: &str = "[FAILSAFE]";

/// Whether the message contains an explicit-confusion marker.
pub fn contains_confusion_marker(message: &str) -> bool {
    let lowered = message.to_lowercase();
    CONFUSION_MARKERS.iter().any(|m| lowered.contains(m))
}

/// Evaluator-recommended learning pace change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaceAdjustment {
    SlowDown,
    SpeedUp,
    Maintain,
}

impl PaceAdjustment {
    /// The profile pace this adjustment maps to, if any.
    pub fn to_pace(self) -> Option<LearningPace> {
        match self {
            Self::SlowDown => Some(LearningPace::Slow),
            Self::SpeedUp => Some(LearningPace::Fast),
            Self::Maintain => None,
        }
    }
}

/// Everything the evaluator learned from one exchange: the record to commit
/// plus profile follow-ups applied by the background worker.
#[derive(Debug, Clone)]
pub struct EvaluationOutcome {
    pub record: EvaluationRecord,
    pub pace_adjustment: Option<PaceAdjustment>,
    pub new_interest: Option<String>,
}

/// Raw model output shape. Out-of-range numbers are clamped, missing
/// fields default — an invalid shape means "use the default evaluation".
#[derive(Debug, Deserialize)]
struct EvaluatorOutput {
    clarity_score: i64,
    #[serde(default)]
    understanding_delta: i64,
    #[serde(default)]
    confusion_trend: ConfusionTrend,
    #[serde(default)]
    struggle_detected: Option<String>,
    #[serde(default)]
    struggle_severity: Option<Severity>,
    #[serde(default)]
    reasoning: Option<String>,
    #[serde(default)]
    pace_adjustment: Option<PaceAdjustment>,
    #[serde(default)]
    new_interest_detected: Option<String>,
}

/// The interaction evaluator agent.
pub struct InteractionEvaluator {
    provider: Arc<dyn Provider>,
    timeout: Duration,
}

impl InteractionEvaluator {
    pub fn new(provider: Arc<dyn Provider>, timeout: Duration) -> Self {
        Self { provider, timeout }
    }

    /// Evaluate one exchange. The returned record has already been through
    /// the fail-safe; gateway failure substitutes the default (no-change)
    /// evaluation before the fail-safe runs.
    pub async fn evaluate(
        &self,
        message: &str,
        response: &str,
        context: &UserContext,
    ) -> EvaluationOutcome {
        let previous_clarity = context.previous_clarity();
        let prompt = Self::build_prompt(message, response, context, previous_clarity);

        let (record, pace_adjustment, new_interest) = match complete_bounded(
            &self.provider,
            self.timeout,
            CompletionRequest::structured(prompt),
        )
        .await
        {
            Ok(gateway_response) => {
                match parse_structured::<EvaluatorOutput>(&gateway_response.text) {
                    Ok(output) => {
                        debug!(clarity = output.clarity_score, "Evaluation received");
                        (
                            EvaluationRecord {
                                clarity_score: output.clarity_score.clamp(0, 100) as u8,
                                understanding_delta: output
                                    .understanding_delta
                                    .clamp(i8::MIN as i64, i8::MAX as i64)
                                    as i8,
                                confusion_trend: output.confusion_trend,
                                struggle_detected: output
                                    .struggle_detected
                                    .filter(|s| !s.trim().is_empty()),
                                struggle_severity: output.struggle_severity,
                                reasoning: output.reasoning.unwrap_or_default(),
                                recorded_at: chrono::Utc::now(),
                            },
                            output.pace_adjustment,
                            output.new_interest_detected,
                        )
                    }
                    Err(e) => {
                        warn!(error = %e, "Evaluator returned unparseable output, using default evaluation");
                        (EvaluationRecord::unavailable(previous_clarity), None, None)
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, "Evaluator gateway call failed, using default evaluation");
                (EvaluationRecord::unavailable(previous_clarity), None, None)
            }
        };

        EvaluationOutcome {
            record: apply_failsafe(record, message, previous_clarity),
            pace_adjustment,
            new_interest,
        }
    }

    fn build_prompt(
        message: &str,
        response: &str,
        context: &UserContext,
        previous_clarity: u8,
    ) -> String {
        // Keep the prompt bounded even for very long mentor replies
        let response_excerpt: String = response.chars().take(500).collect();
        let struggles: Vec<&str> = context
            .struggles
            .iter()
            .take(3)
            .map(|s| s.topic.as_str())
            .collect();

        format!(
            "Analyze this mentor-student interaction for learning quality insights.\n\n\
             STUDENT MESSAGE: \"{message}\"\n\
             MENTOR RESPONSE: \"{response_excerpt}\"\n\n\
             STUDENT CONTEXT:\n\
             - Stage: {stage}\n\
             - Learning pace: {pace}\n\
             - Known struggles: {struggles:?}\n\
             - Previous clarity score: {previous_clarity}\n\n\
             IMPORTANT: Evaluate UNDERSTANDING QUALITY, not activity or effort.\n\
             - clarity_score: how well the student understands the material (0-100)\n\
             - confusion_trend: is confusion improving, stable, or worsening?\n\
             - understanding_delta: change in understanding (-10 to +10)\n\n\
             Momentum comes from clarity improvement, not session count. Be a strict \
             judge of learning quality. Do not inflate clarity_score.\n\n\
             OUTPUT AS JSON:\n\
             {{\n\
                 \"clarity_score\": 0-100,\n\
                 \"confusion_trend\": \"improving\" or \"stable\" or \"worsening\",\n\
                 \"understanding_delta\": -10 to 10,\n\
                 \"struggle_detected\": null or \"topic that needs attention\",\n\
                 \"struggle_severity\": null or \"mild\" or \"moderate\" or \"significant\",\n\
                 \"reasoning\": \"one sentence\",\n\
                 \"pace_adjustment\": null or \"slow_down\" or \"speed_up\" or \"maintain\",\n\
                 \"new_interest_detected\": null or \"new interest mentioned\"\n\
             }}\n\n\
             RESPOND ONLY WITH VALID JSON.",
            message = message,
            response_excerpt = response_excerpt,
            stage = context.profile.stage,
            pace = context.profile.learning_pace,
            struggles = struggles,
            previous_clarity = previous_clarity,
        )
    }
}

/// The deterministic fail-safe. Pure function, no I/O.
///
/// When the triggering message contains an explicit-confusion marker, the
/// committed record must satisfy, regardless of model output:
/// clarity ≤ previous, delta ≤ 0, trend ≠ improving, struggle ≠ none.
pub fn apply_failsafe(
    mut record: EvaluationRecord,
    message: &str,
    previous_clarity: u8,
) -> EvaluationRecord {
    if !contains_confusion_marker(message) {
        return record;
    }

    record.clarity_score = record.clarity_score.min(previous_clarity);
    record.understanding_delta = record.understanding_delta.min(0);
    if record.confusion_trend == ConfusionTrend::Improving {
        record.confusion_trend = ConfusionTrend::Worsening;
    }
    if record.struggle_detected.is_none() {
        record.struggle_detected = Some(GENERAL_DIFFICULTY.into());
    }
    if record.struggle_severity.is_none() {
        record.struggle_severity = Some(Severity::Mild);
    }

    if !record.reasoning.contains(FAILSAFE_TAG) {
        if !record.reasoning.is_empty() {
            record.reasoning.push(' ');
        }
        record.reasoning.push_str(FAILSAFE_TAG);
        record
            .reasoning
            .push_str(" explicit confusion marker in user message; model output overridden");
    }

    record
}

/// Recompute long-term learner traits from evaluation patterns.
///
/// Returns `None` until enough history exists. High effort despite low
/// clarity reads as perseverance; continuing after repeated worsening
/// trends reads as frustration tolerance.
pub fn derive_traits(memory: &UserMemory) -> Option<ProfileUpdate> {
    let history = &memory.progress.evaluation_history;
    if history.len() < 5 {
        return None;
    }

    let effort = &memory.progress.effort;
    let recent = &history[history.len().saturating_sub(10)..];
    let avg_clarity =
        recent.iter().map(|r| r.clarity_score as u32).sum::<u32>() / recent.len() as u32;
    let total_sessions = memory.progress.effort.total_sessions;

    let perseverance = if total_sessions > 10 && avg_clarity < 40 {
        TraitLevel::High
    } else if total_sessions > 5 {
        TraitLevel::Moderate
    } else {
        TraitLevel::Low
    };

    let worsening = history
        .iter()
        .filter(|r| r.confusion_trend == ConfusionTrend::Worsening)
        .count() as u32;
    let frustration_tolerance = if worsening > 3 && effort.total_sessions > worsening * 2 {
        TraitLevel::High
    } else {
        TraitLevel::Moderate
    };

    Some(ProfileUpdate {
        perseverance: Some(perseverance),
        frustration_tolerance: Some(frustration_tolerance),
        ..Default::default()
    })
}
