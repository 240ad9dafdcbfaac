//! The pipeline orchestrator.
//!
//! One explicit, constructed component holding its collaborators — memory
//! store, gateway provider, the four agents, trace store, background
//! worker — passed in by dependency injection.
//!
//! Per request the phases are strictly sequential through the reply:
//! `received → context_ready → strategy_ready → response_ready`, with
//! `evaluating → settled` running detached afterwards. Store failures on
//! the two required writes are fatal to the request; gateway failures
//! anywhere degrade gracefully inside the agents.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use verdant_agents::{
    ContextAssembler, InteractionEvaluator, MemoryUpdate, ResponseGenerator, StrategyPlanner,
    UserContext,
};
use verdant_core::error::Error;
use verdant_core::memory::MemoryStore;
use verdant_core::message::{ConversationId, Sender};
use verdant_core::{Provider, UserMemory};
use verdant_telemetry::{RequestId, TraceStore};

use crate::worker::{BackgroundWorker, Job};

/// Queue depth for detached background work.
const WORKER_QUEUE_CAPACITY: usize = 64;

/// Coordinates the agents to process user messages.
pub struct Orchestrator {
    store: Arc<dyn MemoryStore>,
    assembler: Arc<ContextAssembler>,
    planner: StrategyPlanner,
    generator: ResponseGenerator,
    worker: BackgroundWorker,
    traces: Arc<TraceStore>,
}

impl Orchestrator {
    /// Wire up the full pipeline. `gateway_timeout` bounds every
    /// language-model call made by any stage.
    pub fn new(
        store: Arc<dyn MemoryStore>,
        provider: Arc<dyn Provider>,
        traces: Arc<TraceStore>,
        gateway_timeout: Duration,
    ) -> Self {
        let assembler = Arc::new(ContextAssembler::new(
            store.clone(),
            provider.clone(),
            gateway_timeout,
        ));
        let planner = StrategyPlanner::new(provider.clone(), gateway_timeout);
        let generator = ResponseGenerator::new(provider.clone(), gateway_timeout);
        let evaluator = Arc::new(InteractionEvaluator::new(provider, gateway_timeout));
        let worker = BackgroundWorker::spawn(
            store.clone(),
            evaluator,
            assembler.clone(),
            traces.clone(),
            WORKER_QUEUE_CAPACITY,
        );

        Self {
            store,
            assembler,
            planner,
            generator,
            worker,
            traces,
        }
    }

    /// Process one user message and return the mentor reply.
    ///
    /// Returns before the evaluation write is observable: step 6 is
    /// dispatched to the background worker and never awaited here.
    pub async fn handle(
        &self,
        user_id: &str,
        conversation_id: &ConversationId,
        message: &str,
    ) -> Result<String, Error> {
        let request_id = RequestId::new();
        self.traces.record(
            &request_id,
            "orchestrator",
            "received",
            serde_json::json!({ "conversation_id": conversation_id.0 }),
        );

        // 1. Persist the user message. Durable write — losing a sent
        //    message is worse than added latency.
        self.store
            .append_message(conversation_id, Sender::User, message)
            .await?;

        // 2. Assemble context. Store unavailability is fatal here.
        let context = self.assembler.assemble(user_id, conversation_id).await?;
        self.traces.record(
            &request_id,
            "context_assembler",
            "context_ready",
            serde_json::json!({
                "evaluations": context.evaluation_history.len(),
                "turns": context.recent_turns.len(),
            }),
        );

        // 3. Plan. Degrades to the default strategy internally.
        let plan = self.planner.plan(&context, message).await;
        self.traces.record(
            &request_id,
            "planner",
            "strategy_ready",
            serde_json::json!({
                "strategy": plan.strategy.strategy.to_string(),
                "verbosity": plan.strategy.verbosity.to_string(),
            }),
        );

        // Fold planner-noticed profile facts into memory. Best-effort: a
        // failed merge must not cost the user their reply.
        self.apply_memory_update(user_id, &context, &plan.memory_update)
            .await;

        // 4. Generate. Degrades to the fallback reply internally.
        let reply = self
            .generator
            .generate(&context, message, &plan.strategy)
            .await;
        self.traces.record(
            &request_id,
            "generator",
            "response_ready",
            serde_json::json!({ "lines": reply.lines().count() }),
        );

        // 5. Persist the mentor reply. Fatal on failure — the caller must
        //    not see a reply that was never recorded.
        self.store
            .append_message(conversation_id, Sender::Mentor, &reply)
            .await?;

        // 6. Detach evaluation. Not awaited; survives client disconnect.
        let enqueued = self.worker.enqueue(Job::EvaluateInteraction {
            user_id: user_id.to_string(),
            message: message.to_string(),
            response: reply.clone(),
            context,
            request_id: request_id.clone(),
        });
        self.traces.record(
            &request_id,
            "orchestrator",
            if enqueued { "evaluating" } else { "evaluation_dropped" },
            serde_json::json!({}),
        );

        info!(user_id, conversation_id = %conversation_id, "Reply delivered");
        Ok(reply)
    }

    /// Dedupe-append planner-detected interests and goals.
    async fn apply_memory_update(
        &self,
        user_id: &str,
        context: &UserContext,
        update: &MemoryUpdate,
    ) {
        if update.is_empty() {
            return;
        }

        let mut profile_update = verdant_core::ProfileUpdate::default();

        if let Some(interest) = &update.new_interest {
            let known = context
                .profile
                .interests
                .iter()
                .any(|i| i.eq_ignore_ascii_case(interest));
            if !known {
                let mut interests = context.profile.interests.clone();
                interests.push(interest.clone());
                profile_update.interests = Some(interests);
            }
        }

        if let Some(goal) = &update.new_goal {
            let known = context
                .profile
                .goals
                .iter()
                .any(|g| g.eq_ignore_ascii_case(goal));
            if !known {
                let mut goals = context.profile.goals.clone();
                goals.push(goal.clone());
                profile_update.goals = Some(goals);
            }
        }

        if !profile_update.is_empty() {
            if let Err(e) = self.store.merge_profile(user_id, profile_update).await {
                warn!(user_id, error = %e, "Failed to merge planner memory update");
            }
        }
    }

    /// Read-only memory snapshot for the API layer.
    pub async fn memory_snapshot(&self, user_id: &str) -> Result<UserMemory, Error> {
        Ok(self.store.read_user_memory(user_id).await?)
    }

    /// Close the background queue and drain queued work.
    pub async fn shutdown(self) {
        self.worker.shutdown().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use verdant_core::error::ProviderError;
    use verdant_core::provider::{CompletionRequest, CompletionResponse};
    use verdant_memory::InMemoryStore;

    /// Answers planner calls with a fixed strategy, generator calls with a
    /// fixed reply, evaluator calls with a fixed evaluation.
    struct ScriptedGateway;

    #[async_trait]
    impl Provider for ScriptedGateway {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn complete(
            &self,
            request: CompletionRequest,
        ) -> Result<CompletionResponse, ProviderError> {
            let text = if request.prompt.contains("mentor-student") {
                r#"{"clarity_score": 58, "understanding_delta": 3,
                    "confusion_trend": "stable", "reasoning": "fine"}"#
                    .to_string()
            } else if request.expect_structured {
                r#"{"strategy": "teach", "tone": "warm", "verbosity": "normal",
                    "pacing": "normal", "should_ask_question": false,
                    "memory_update": {"new_interest": "ownership", "new_goal": null}}"#
                    .to_string()
            } else {
                "Here is a short explanation.".to_string()
            };
            Ok(CompletionResponse {
                text,
                model: "scripted-model".into(),
                usage: None,
            })
        }
    }

    fn orchestrator(store: Arc<InMemoryStore>) -> Orchestrator {
        Orchestrator::new(
            store,
            Arc::new(ScriptedGateway),
            Arc::new(TraceStore::default()),
            Duration::from_secs(5),
        )
    }

    #[tokio::test]
    async fn reply_returned_and_messages_persisted_in_order() {
        let store = Arc::new(InMemoryStore::new());
        let orch = orchestrator(store.clone());
        let conv = ConversationId::new();

        let reply = orch.handle("user-1", &conv, "What is ownership?").await.unwrap();
        assert_eq!(reply, "Here is a short explanation.");

        let messages = store.read_recent_messages(&conv, 10).await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].sender, Sender::User);
        assert_eq!(messages[0].content, "What is ownership?");
        assert_eq!(messages[1].sender, Sender::Mentor);
    }

    #[tokio::test]
    async fn planner_interest_appended_once() {
        let store = Arc::new(InMemoryStore::new());
        let orch = orchestrator(store.clone());
        let conv = ConversationId::new();

        orch.handle("user-1", &conv, "first").await.unwrap();
        orch.handle("user-1", &conv, "second").await.unwrap();

        let memory = store.read_user_memory("user-1").await.unwrap();
        let count = memory
            .profile
            .interests
            .iter()
            .filter(|i| i.as_str() == "ownership")
            .count();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn evaluation_lands_after_reply() {
        let store = Arc::new(InMemoryStore::new());
        let orch = orchestrator(store.clone());
        let conv = ConversationId::new();

        orch.handle("user-1", &conv, "A question").await.unwrap();

        // The worker runs detached; give it a moment to settle.
        let mut committed = false;
        for _ in 0..50 {
            tokio::time::sleep(Duration::from_millis(10)).await;
            let memory = store.read_user_memory("user-1").await.unwrap();
            if !memory.progress.evaluation_history.is_empty() {
                committed = true;
                break;
            }
        }
        assert!(committed, "evaluation never committed");

        let memory = store.read_user_memory("user-1").await.unwrap();
        assert_eq!(memory.progress.evaluation_history[0].clarity_score, 58);
        assert_eq!(memory.progress.effort.total_sessions, 1);
    }

    #[tokio::test]
    async fn shutdown_drains_queued_evaluation() {
        let store = Arc::new(InMemoryStore::new());
        let orch = orchestrator(store.clone());
        let conv = ConversationId::new();

        orch.handle("user-1", &conv, "A question").await.unwrap();
        orch.shutdown().await;

        let memory = store.read_user_memory("user-1").await.unwrap();
        assert_eq!(memory.progress.evaluation_history.len(), 1);
    }
}
