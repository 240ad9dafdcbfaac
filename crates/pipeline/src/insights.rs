//! Insight derivation — display-ready summaries computed from stored state.
//!
//! Pure read-only functions. Momentum is classified from understanding
//! quality (clarity and its trend), deliberately ignoring raw session count
//! as a primary signal: rewarding activity over comprehension is exactly
//! what the product refuses to do. Effort is reported separately and
//! labeled as activity, and insight text stays factual — honesty over
//! motivation.

use chrono::{Duration, Utc};
use serde::Serialize;

use verdant_core::memory::{EffortMetrics, UserMemory};
use verdant_core::{ConfusionTrend, EvaluationRecord};

/// How many of the newest evaluations feed the momentum classification.
const MOMENTUM_WINDOW: usize = 5;

/// Momentum classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MomentumState {
    Starting,
    Building,
    Steady,
    Accelerating,
}

/// Metrics backing a momentum classification.
#[derive(Debug, Clone, Serialize)]
pub struct MomentumMetrics {
    /// Average clarity over the momentum window.
    pub clarity_score: u8,
    pub understanding_trend: ConfusionTrend,
    pub understanding_delta: i8,
    pub evaluation_count: usize,
}

/// A derived, read-only characterization of the user's trajectory.
#[derive(Debug, Clone, Serialize)]
pub struct Momentum {
    pub state: MomentumState,
    pub insight: String,
    pub metrics: MomentumMetrics,
}

/// Activity metrics, shown apart from momentum.
#[derive(Debug, Clone, Serialize)]
pub struct EffortSummary {
    pub sessions_this_week: usize,
    pub total_sessions: u32,
    pub consistency_streak: u32,
    pub persistence_label: &'static str,
    pub note: &'static str,
}

/// Kind of an observed signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalKind {
    Struggle,
    Progress,
    Pattern,
}

/// An observation, not encouragement.
#[derive(Debug, Clone, Serialize)]
pub struct Signal {
    pub observation: String,
    pub kind: SignalKind,
}

/// Everything the dashboard needs for one user.
#[derive(Debug, Clone, Serialize)]
pub struct InsightSummary {
    pub momentum: Momentum,
    pub effort: EffortSummary,
    pub signals: Vec<Signal>,
}

/// Derive the full insight summary. Never mutates the store.
pub fn derive_insights(memory: &UserMemory) -> InsightSummary {
    InsightSummary {
        momentum: derive_momentum(
            &memory.progress.effort,
            &memory.progress.evaluation_history,
        ),
        effort: derive_effort(&memory.progress.effort),
        signals: derive_signals(memory),
    }
}

/// Classify momentum from evaluator output, not session counts.
pub fn derive_momentum(effort: &EffortMetrics, history: &[EvaluationRecord]) -> Momentum {
    if history.is_empty() {
        return Momentum {
            state: MomentumState::Starting,
            insight: "Ready to begin. Start a session to build momentum.".into(),
            metrics: MomentumMetrics {
                clarity_score: 0,
                understanding_trend: ConfusionTrend::Stable,
                understanding_delta: 0,
                evaluation_count: 0,
            },
        };
    }

    let recent = &history[history.len().saturating_sub(MOMENTUM_WINDOW)..];
    let avg_clarity =
        (recent.iter().map(|r| r.clarity_score as u32).sum::<u32>() / recent.len() as u32) as u8;
    let latest = recent.last().expect("recent is non-empty");
    let trend = latest.confusion_trend;
    let delta = latest.understanding_delta;

    let state = if avg_clarity >= 70 && trend == ConfusionTrend::Improving {
        MomentumState::Accelerating
    } else if avg_clarity >= 50 && trend != ConfusionTrend::Worsening {
        MomentumState::Steady
    } else {
        MomentumState::Building
    };

    Momentum {
        state,
        insight: truthful_insight(state, avg_clarity, trend, delta, effort),
        metrics: MomentumMetrics {
            clarity_score: avg_clarity,
            understanding_trend: trend,
            understanding_delta: delta,
            evaluation_count: history.len(),
        },
    }
}

/// Honest, non-exaggerated insight text. High effort with low clarity is
/// named for what it is, never congratulated.
fn truthful_insight(
    state: MomentumState,
    clarity: u8,
    trend: ConfusionTrend,
    delta: i8,
    effort: &EffortMetrics,
) -> String {
    let sessions = effort.total_sessions;

    if sessions > 5 && clarity < 40 {
        return format!(
            "High effort with {sessions} sessions, but clarity remains challenging at \
             {clarity}%. Consider revisiting fundamentals or trying a different approach."
        );
    }

    if sessions > 5 && clarity >= 70 {
        return format!(
            "Strong understanding ({clarity}% clarity) across {sessions} sessions. \
             Effort is translating into comprehension."
        );
    }

    if sessions <= 3 && clarity >= 60 {
        return format!(
            "Efficient learning: {clarity}% clarity with only {sessions} sessions. \
             Quality over quantity."
        );
    }

    if trend == ConfusionTrend::Improving && delta > 0 {
        return format!("Clarity improving (+{delta} points). The concepts are becoming clearer.");
    }

    if trend == ConfusionTrend::Worsening {
        return format!(
            "Understanding appears to be declining. Current clarity: {clarity}%. \
             This is normal; consider slowing down."
        );
    }

    if state == MomentumState::Building {
        return format!("Building understanding: {clarity}% clarity. Progress is gradual but present.");
    }

    format!("Steady progress at {clarity}% clarity. Understanding is {trend}.")
}

/// Activity metrics for separate display — never conflated with momentum.
pub fn derive_effort(effort: &EffortMetrics) -> EffortSummary {
    let week_ago = Utc::now() - Duration::days(7);
    EffortSummary {
        sessions_this_week: effort.sessions_since(week_ago),
        total_sessions: effort.total_sessions,
        consistency_streak: effort.consistency_streak,
        persistence_label: persistence_label(effort),
        note: "Effort reflects activity, not understanding.",
    }
}

fn persistence_label(effort: &EffortMetrics) -> &'static str {
    if effort.consistency_streak >= 7 {
        "Highly consistent"
    } else if effort.consistency_streak >= 3 {
        "Building consistency"
    } else if effort.total_sessions >= 10 {
        "Active"
    } else if effort.total_sessions >= 3 {
        "Getting started"
    } else {
        "New"
    }
}

/// Observed patterns over struggles and activity — at most five, deduplicated.
pub fn derive_signals(memory: &UserMemory) -> Vec<Signal> {
    let mut signals = Vec::new();
    let now = Utc::now();

    let mut struggles: Vec<_> = memory.struggles.iter().collect();
    struggles.sort_by(|a, b| b.last_seen.cmp(&a.last_seen));

    for struggle in struggles.iter().take(3) {
        if struggle.count >= 3 {
            signals.push(Signal {
                observation: format!(
                    "Recurring difficulty with {} ({} occurrences)",
                    struggle.topic, struggle.count
                ),
                kind: SignalKind::Struggle,
            });
        } else if struggle.count == 1 && now - struggle.last_seen <= Duration::days(7) {
            signals.push(Signal {
                observation: format!("First time exploring {}", struggle.topic),
                kind: SignalKind::Pattern,
            });
        }
    }

    let total = memory.progress.effort.total_sessions;
    if total > 0 && total % 5 == 0 {
        signals.push(Signal {
            observation: format!("Reached {total} total sessions"),
            kind: SignalKind::Progress,
        });
    }

    let week_ago = now - Duration::days(7);
    let recent_sessions: Vec<_> = memory
        .progress
        .effort
        .session_dates
        .iter()
        .filter(|d| **d >= week_ago)
        .collect();
    if recent_sessions.len() >= 3 {
        let unique_days: std::collections::HashSet<_> =
            recent_sessions.iter().map(|d| d.date_naive()).collect();
        if unique_days.len() >= 3 {
            signals.push(Signal {
                observation: "Consistent engagement over the past week".into(),
                kind: SignalKind::Progress,
            });
        }
    }

    // Deduplicate and cap
    let mut seen = std::collections::HashSet::new();
    signals.retain(|s| seen.insert(s.observation.clone()));
    signals.truncate(5);
    signals
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use verdant_core::memory::{Severity, Struggle};

    fn record(clarity: u8, delta: i8, trend: ConfusionTrend) -> EvaluationRecord {
        EvaluationRecord {
            clarity_score: clarity,
            understanding_delta: delta,
            confusion_trend: trend,
            struggle_detected: None,
            struggle_severity: None,
            reasoning: String::new(),
            recorded_at: Utc::now(),
        }
    }

    fn effort_with_sessions(total: u32) -> EffortMetrics {
        EffortMetrics {
            total_sessions: total,
            ..Default::default()
        }
    }

    #[test]
    fn no_history_is_starting() {
        let momentum = derive_momentum(&EffortMetrics::default(), &[]);
        assert_eq!(momentum.state, MomentumState::Starting);
        assert_eq!(momentum.metrics.evaluation_count, 0);
    }

    #[test]
    fn high_clarity_improving_is_accelerating() {
        let history = vec![
            record(72, 5, ConfusionTrend::Improving),
            record(78, 6, ConfusionTrend::Improving),
        ];
        let momentum = derive_momentum(&effort_with_sessions(4), &history);
        assert_eq!(momentum.state, MomentumState::Accelerating);
    }

    #[test]
    fn mid_clarity_not_worsening_is_steady() {
        let history = vec![record(55, 2, ConfusionTrend::Stable)];
        let momentum = derive_momentum(&effort_with_sessions(4), &history);
        assert_eq!(momentum.state, MomentumState::Steady);
    }

    #[test]
    fn high_clarity_but_worsening_is_not_accelerating() {
        let history = vec![record(75, -3, ConfusionTrend::Worsening)];
        let momentum = derive_momentum(&effort_with_sessions(4), &history);
        assert_ne!(momentum.state, MomentumState::Accelerating);
        assert_ne!(momentum.state, MomentumState::Steady);
    }

    #[test]
    fn momentum_honesty_many_sessions_low_clarity() {
        // 12 sessions of effort must not dress up 30% clarity as progress
        let history = vec![
            record(30, 0, ConfusionTrend::Stable),
            record(30, 0, ConfusionTrend::Stable),
            record(30, 0, ConfusionTrend::Stable),
        ];
        let momentum = derive_momentum(&effort_with_sessions(12), &history);

        assert_ne!(momentum.state, MomentumState::Accelerating);
        assert_ne!(momentum.state, MomentumState::Steady);
        assert_eq!(momentum.state, MomentumState::Building);

        assert!(momentum.insight.contains("clarity remains challenging"));
        for praise in ["great", "excellent", "amazing", "congrat", "well done"] {
            assert!(
                !momentum.insight.to_lowercase().contains(praise),
                "insight must not praise: {}",
                momentum.insight
            );
        }
    }

    #[test]
    fn momentum_uses_recent_window_only() {
        let mut history = vec![record(10, -5, ConfusionTrend::Worsening); 10];
        history.extend((0..5).map(|_| record(80, 5, ConfusionTrend::Improving)));
        let momentum = derive_momentum(&effort_with_sessions(4), &history);
        assert_eq!(momentum.metrics.clarity_score, 80);
        assert_eq!(momentum.state, MomentumState::Accelerating);
    }

    #[test]
    fn worsening_trend_named_honestly() {
        let history = vec![record(45, -4, ConfusionTrend::Worsening)];
        let momentum = derive_momentum(&effort_with_sessions(4), &history);
        assert!(momentum.insight.contains("declining"));
    }

    #[test]
    fn effort_labels() {
        let mut effort = EffortMetrics {
            consistency_streak: 8,
            ..Default::default()
        };
        assert_eq!(persistence_label(&effort), "Highly consistent");

        effort.consistency_streak = 4;
        assert_eq!(persistence_label(&effort), "Building consistency");

        effort.consistency_streak = 0;
        effort.total_sessions = 12;
        assert_eq!(persistence_label(&effort), "Active");

        effort.total_sessions = 1;
        assert_eq!(persistence_label(&effort), "New");
    }

    #[test]
    fn effort_counts_week_sessions() {
        let mut effort = EffortMetrics::default();
        effort.session_dates.push(Utc::now() - Duration::days(20));
        effort.session_dates.push(Utc::now() - Duration::days(2));
        effort.session_dates.push(Utc::now() - Duration::days(1));

        let summary = derive_effort(&effort);
        assert_eq!(summary.sessions_this_week, 2);
        assert!(summary.note.contains("not understanding"));
    }

    #[test]
    fn recurring_struggle_signal() {
        let mut memory = UserMemory::new("user-1");
        memory.struggles.push(Struggle {
            topic: "lifetimes".into(),
            severity: Severity::Moderate,
            count: 4,
            last_seen: Utc::now(),
        });

        let signals = derive_signals(&memory);
        assert!(signals
            .iter()
            .any(|s| s.kind == SignalKind::Struggle && s.observation.contains("lifetimes")));
    }

    #[test]
    fn milestone_signal_every_five_sessions() {
        let mut memory = UserMemory::new("user-1");
        memory.progress.effort.total_sessions = 10;
        let signals = derive_signals(&memory);
        assert!(signals
            .iter()
            .any(|s| s.observation.contains("10 total sessions")));
    }

    #[test]
    fn signals_capped_at_five() {
        let mut memory = UserMemory::new("user-1");
        for i in 0..6 {
            memory.struggles.push(Struggle {
                topic: format!("topic {i}"),
                severity: Severity::Mild,
                count: 5,
                last_seen: Utc::now(),
            });
        }
        memory.progress.effort.total_sessions = 5;
        for _ in 0..4 {
            memory.progress.effort.session_dates.push(Utc::now());
        }

        assert!(derive_signals(&memory).len() <= 5);
    }
}
