//! Strategy planner — decides the guidance approach for one turn.
//!
//! Outputs structured decisions only, never user-facing prose. Bias hints
//! derived from the newest evaluation go into the prompt as instructions;
//! the planner trusts the model to honor them but always has the default
//! strategy ready when the gateway fails or returns junk.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, warn};

use verdant_core::provider::{parse_structured, CompletionRequest, Provider};
use verdant_core::{ConfusionTrend, Pacing, Strategy, StrategyKind, Tone, Verbosity};

use crate::complete_bounded;
use crate::context::UserContext;

/// Profile facts the planner noticed in the message (dedupe-appended to
/// memory by the orchestrator).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MemoryUpdate {
    #[serde(default)]
    pub new_interest: Option<String>,

    #[serde(default)]
    pub new_goal: Option<String>,
}

impl MemoryUpdate {
    pub fn is_empty(&self) -> bool {
        self.new_interest.is_none() && self.new_goal.is_none()
    }
}

/// The planner's full decision for one turn.
#[derive(Debug, Clone, Default)]
pub struct Plan {
    pub strategy: Strategy,
    pub memory_update: MemoryUpdate,
}

/// Raw model output shape; missing fields fall back to defaults.
#[derive(Debug, Deserialize)]
struct PlannerOutput {
    #[serde(default)]
    strategy: StrategyKind,
    #[serde(default)]
    tone: Tone,
    #[serde(default)]
    verbosity: Verbosity,
    #[serde(default)]
    pacing: Pacing,
    #[serde(default)]
    should_ask_question: bool,
    #[serde(default)]
    memory_update: MemoryUpdate,
}

/// The strategy planner agent.
pub struct StrategyPlanner {
    provider: Arc<dyn Provider>,
    timeout: Duration,
}

impl StrategyPlanner {
    pub fn new(provider: Arc<dyn Provider>, timeout: Duration) -> Self {
        Self { provider, timeout }
    }

    /// Plan the response strategy. Infallible by contract: any gateway
    /// failure or unparseable output degrades to the default strategy and
    /// the pipeline continues.
    pub async fn plan(&self, context: &UserContext, message: &str) -> Plan {
        let prompt = Self::build_prompt(context, message);

        match complete_bounded(
            &self.provider,
            self.timeout,
            CompletionRequest::structured(prompt),
        )
        .await
        {
            Ok(response) => match parse_structured::<PlannerOutput>(&response.text) {
                Ok(output) => {
                    debug!(strategy = %output.strategy, verbosity = %output.verbosity, "Strategy planned");
                    Plan {
                        strategy: Strategy {
                            strategy: output.strategy,
                            tone: output.tone,
                            verbosity: output.verbosity,
                            pacing: output.pacing,
                            should_ask_question: output.should_ask_question,
                        },
                        memory_update: output.memory_update,
                    }
                }
                Err(e) => {
                    warn!(error = %e, "Planner returned unparseable output, using default strategy");
                    Plan::default()
                }
            },
            Err(e) => {
                warn!(error = %e, "Planner gateway call failed, using default strategy");
                Plan::default()
            }
        }
    }

    /// Deterministic bias hints derived from the newest evaluation. These
    /// go into the prompt as instructions, not as post-hoc overrides.
    fn bias_hints(context: &UserContext) -> Vec<String> {
        let mut hints = Vec::new();
        let Some(latest) = context.latest_evaluation() else {
            return hints;
        };

        if latest.clarity_score < 40 {
            hints.push(format!(
                "Clarity is low ({}): bias toward pacing=slow and strategy=support.",
                latest.clarity_score
            ));
        } else if latest.clarity_score >= 70 {
            hints.push(format!(
                "Clarity is high ({}): bias toward strategy=challenge.",
                latest.clarity_score
            ));
        }

        if latest.confusion_trend == ConfusionTrend::Worsening {
            hints.push(
                "Confusion is worsening: use tone=supportive regardless of other considerations."
                    .into(),
            );
        }

        hints
    }

    fn build_prompt(context: &UserContext, message: &str) -> String {
        let struggles: Vec<&str> = context
            .struggles
            .iter()
            .take(3)
            .map(|s| s.topic.as_str())
            .collect();
        let recent: Vec<String> = context
            .recent_turns
            .iter()
            .map(|t| format!("Student: {}\nMentor: {}", t.user, t.mentor))
            .collect();

        let hints = Self::bias_hints(context);
        let hints_block = if hints.is_empty() {
            String::new()
        } else {
            format!("\nGUIDANCE:\n- {}\n", hints.join("\n- "))
        };

        format!(
            "You are the planning agent for an AI mentor. Analyze this context and \
             decide the guidance strategy. You do NOT generate the response — only a \
             JSON decision.\n\n\
             USER CONTEXT:\n\
             - Summary: {summary}\n\
             - Learning pace: {pace}\n\
             - Known struggles: {struggles:?}\n\
             - Previous clarity score: {clarity}\n\
             - Recent exchanges:\n{recent}\n\
             {hints}\n\
             CURRENT MESSAGE: \"{message}\"\n\n\
             OUTPUT A JSON OBJECT with this structure:\n\
             {{\n\
                 \"strategy\": \"encourage|teach|challenge|reflect|support|celebrate\",\n\
                 \"tone\": \"warm|gentle|direct|curious|affirming|supportive\",\n\
                 \"verbosity\": \"brief|normal|detailed\",\n\
                 \"pacing\": \"slow|normal|fast\",\n\
                 \"should_ask_question\": true or false,\n\
                 \"memory_update\": {{\n\
                     \"new_interest\": null or \"string\",\n\
                     \"new_goal\": null or \"string\"\n\
                 }}\n\
             }}\n\n\
             RESPOND ONLY WITH VALID JSON, NO OTHER TEXT.",
            summary = context.summary_text(),
            pace = context.profile.learning_pace,
            struggles = struggles,
            clarity = context.previous_clarity(),
            recent = recent.join("\n"),
            hints = hints_block,
            message = message,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use verdant_core::error::ProviderError;
    use verdant_core::memory::{EffortMetrics, UserProfile};
    use verdant_core::provider::CompletionResponse;
    use verdant_core::EvaluationRecord;

    struct StubProvider {
        reply: Option<String>,
    }

    #[async_trait]
    impl Provider for StubProvider {
        fn name(&self) -> &str {
            "stub"
        }

        async fn complete(
            &self,
            _request: CompletionRequest,
        ) -> Result<CompletionResponse, ProviderError> {
            match &self.reply {
                Some(text) => Ok(CompletionResponse {
                    text: text.clone(),
                    model: "stub-model".into(),
                    usage: None,
                }),
                None => Err(ProviderError::Timeout("stub".into())),
            }
        }
    }

    fn context_with_clarity(clarity: Option<u8>, trend: ConfusionTrend) -> UserContext {
        let mut history = Vec::new();
        if let Some(score) = clarity {
            history.push(EvaluationRecord {
                clarity_score: score,
                understanding_delta: 0,
                confusion_trend: trend,
                struggle_detected: None,
                struggle_severity: None,
                reasoning: String::new(),
                recorded_at: Utc::now(),
            });
        }
        UserContext {
            user_id: "user-1".into(),
            profile: UserProfile::default(),
            struggles: Vec::new(),
            evaluation_history: history,
            effort: EffortMetrics::default(),
            recent_turns: Vec::new(),
            context_summary: None,
        }
    }

    fn planner(reply: Option<&str>) -> StrategyPlanner {
        StrategyPlanner::new(
            Arc::new(StubProvider {
                reply: reply.map(String::from),
            }),
            Duration::from_secs(5),
        )
    }

    #[tokio::test]
    async fn parses_model_strategy() {
        let planner = planner(Some(
            r#"{"strategy": "teach", "tone": "direct", "verbosity": "detailed",
                "pacing": "fast", "should_ask_question": true,
                "memory_update": {"new_interest": "graphs", "new_goal": null}}"#,
        ));
        let plan = planner
            .plan(&context_with_clarity(None, ConfusionTrend::Stable), "Tell me about graphs")
            .await;

        assert_eq!(plan.strategy.strategy, StrategyKind::Teach);
        assert_eq!(plan.strategy.verbosity, Verbosity::Detailed);
        assert!(plan.strategy.should_ask_question);
        assert_eq!(plan.memory_update.new_interest.as_deref(), Some("graphs"));
    }

    #[tokio::test]
    async fn gateway_failure_degrades_to_default() {
        let planner = planner(None);
        let plan = planner
            .plan(&context_with_clarity(None, ConfusionTrend::Stable), "hello")
            .await;
        assert_eq!(plan.strategy, Strategy::default());
        assert!(plan.memory_update.is_empty());
    }

    #[tokio::test]
    async fn prose_output_degrades_to_default() {
        let planner = planner(Some("I think we should be supportive here."));
        let plan = planner
            .plan(&context_with_clarity(Some(50), ConfusionTrend::Stable), "hello")
            .await;
        assert_eq!(plan.strategy, Strategy::default());
    }

    #[test]
    fn low_clarity_biases_toward_support() {
        let ctx = context_with_clarity(Some(30), ConfusionTrend::Stable);
        let hints = StrategyPlanner::bias_hints(&ctx);
        assert_eq!(hints.len(), 1);
        assert!(hints[0].contains("pacing=slow"));
        assert!(hints[0].contains("strategy=support"));
    }

    #[test]
    fn high_clarity_biases_toward_challenge() {
        let ctx = context_with_clarity(Some(85), ConfusionTrend::Stable);
        let hints = StrategyPlanner::bias_hints(&ctx);
        assert!(hints[0].contains("strategy=challenge"));
    }

    #[test]
    fn worsening_trend_forces_supportive_tone_hint() {
        let ctx = context_with_clarity(Some(55), ConfusionTrend::Worsening);
        let hints = StrategyPlanner::bias_hints(&ctx);
        assert!(hints.iter().any(|h| h.contains("tone=supportive")));
    }

    #[test]
    fn no_history_no_hints() {
        let ctx = context_with_clarity(None, ConfusionTrend::Stable);
        assert!(StrategyPlanner::bias_hints(&ctx).is_empty());
    }

    #[test]
    fn hints_land_in_prompt() {
        let ctx = context_with_clarity(Some(20), ConfusionTrend::Worsening);
        let prompt = StrategyPlanner::build_prompt(&ctx, "I give up");
        assert!(prompt.contains("pacing=slow"));
        assert!(prompt.contains("tone=supportive"));
        assert!(prompt.contains("I give up"));
    }
}
