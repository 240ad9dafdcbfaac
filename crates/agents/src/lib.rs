//! The Verdant mentoring agents.
//!
//! Four agents cooperate on every user message:
//!
//! 1. **Context Assembler** — builds the per-request `UserContext` snapshot
//!    from the memory store (read-only)
//! 2. **Strategy Planner** — picks a structured `Strategy` for the turn
//!    (never emits user-facing text)
//! 3. **Response Generator** — produces the mentor reply under strategy
//!    constraints (always returns *something*)
//! 4. **Interaction Evaluator** — scores the exchange for genuine
//!    understanding, with a deterministic fail-safe that model output is
//!    not permitted to contradict
//!
//! Every gateway call is bounded by a timeout and has a deterministic
//! fallback; the pipeline keeps flowing through any gateway outage.

pub mod context;
pub mod evaluator;
pub mod generator;
pub mod planner;

pub use context::{ContextAssembler, UserContext};
pub use evaluator::{
    apply_failsafe, contains_confusion_marker, derive_traits, EvaluationOutcome,
    InteractionEvaluator, PaceAdjustment, CONFUSION_MARKERS,
};
pub use generator::{ResponseGenerator, FALLBACK_REPLY};
pub use planner::{MemoryUpdate, Plan, StrategyPlanner};

use std::sync::Arc;
use std::time::Duration;

use verdant_core::error::ProviderError;
use verdant_core::provider::{CompletionRequest, CompletionResponse, Provider};

/// Run a gateway call under the stage's timeout. A timed-out call is
/// indistinguishable from a failed one for every caller.
pub(crate) async fn complete_bounded(
    provider: &Arc<dyn Provider>,
    timeout: Duration,
    request: CompletionRequest,
) -> Result<CompletionResponse, ProviderError> {
    match tokio::time::timeout(timeout, provider.complete(request)).await {
        Ok(result) => result,
        Err(_) => Err(ProviderError::Timeout(format!(
            "gateway call exceeded {}s",
            timeout.as_secs()
        ))),
    }
}
