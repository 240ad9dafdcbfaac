//! Bounded background worker.
//!
//! Evaluation, summary refresh, and trait recalculation run here, off the
//! reply path. The queue is a bounded mpsc channel consumed by one spawned
//! task: enqueueing never blocks the request handler (a full queue drops
//! the job with a warning — the reply was already delivered), job failures
//! are logged and swallowed, and `shutdown` drains what was queued.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use verdant_agents::{
    contains_confusion_marker, derive_traits, ContextAssembler, InteractionEvaluator,
    UserContext,
};
use verdant_core::memory::{MemoryStore, Severity};
use verdant_core::ProfileUpdate;
use verdant_telemetry::{RequestId, TraceStore};

/// How often (in committed evaluations) the stored context summary is
/// regenerated via the gateway.
const SUMMARY_REFRESH_EVERY: usize = 5;

/// A unit of detached work.
#[derive(Debug)]
pub enum Job {
    /// Evaluate one user/mentor exchange and fold the result into memory.
    EvaluateInteraction {
        user_id: String,
        message: String,
        response: String,
        context: UserContext,
        request_id: RequestId,
    },
    /// Regenerate the stored context summary.
    RefreshSummary { user_id: String },
    /// Recompute long-term learner traits from evaluation history.
    RecalculateTraits { user_id: String },
}

/// Handle to the background worker task.
pub struct BackgroundWorker {
    tx: mpsc::Sender<Job>,
    handle: JoinHandle<()>,
}

impl BackgroundWorker {
    /// Spawn the worker with a queue bounded at `capacity`.
    pub fn spawn(
        store: Arc<dyn MemoryStore>,
        evaluator: Arc<InteractionEvaluator>,
        assembler: Arc<ContextAssembler>,
        traces: Arc<TraceStore>,
        capacity: usize,
    ) -> Self {
        let (tx, mut rx) = mpsc::channel::<Job>(capacity.max(1));

        let handle = tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                run_job(job, &store, &evaluator, &assembler, &traces).await;
            }
            debug!("Background worker queue closed, worker exiting");
        });

        Self { tx, handle }
    }

    /// Enqueue a job without blocking. Returns `false` when the job was
    /// dropped (queue full or worker gone).
    pub fn enqueue(&self, job: Job) -> bool {
        match self.tx.try_send(job) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(job)) => {
                warn!(?job, "Background queue full, dropping job");
                false
            }
            Err(mpsc::error::TrySendError::Closed(job)) => {
                warn!(?job, "Background worker gone, dropping job");
                false
            }
        }
    }

    /// Close the queue and wait for queued jobs to drain.
    pub async fn shutdown(self) {
        drop(self.tx);
        if let Err(e) = self.handle.await {
            warn!(error = %e, "Background worker did not shut down cleanly");
        }
        info!("Background worker drained");
    }
}

/// Run one job. Never returns an error — failures here must not affect the
/// already-returned reply, so everything is logged and swallowed.
async fn run_job(
    job: Job,
    store: &Arc<dyn MemoryStore>,
    evaluator: &Arc<InteractionEvaluator>,
    assembler: &Arc<ContextAssembler>,
    traces: &Arc<TraceStore>,
) {
    match job {
        Job::EvaluateInteraction {
            user_id,
            message,
            response,
            context,
            request_id,
        } => {
            evaluate_interaction(
                &user_id, &message, &response, context, &request_id, store, evaluator,
                assembler, traces,
            )
            .await;
        }
        Job::RefreshSummary { user_id } => {
            if let Err(e) = assembler.refresh_summary(&user_id).await {
                warn!(user_id, error = %e, "Summary refresh failed");
            }
        }
        Job::RecalculateTraits { user_id } => {
            recalculate_traits(&user_id, store).await;
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn evaluate_interaction(
    user_id: &str,
    message: &str,
    response: &str,
    context: UserContext,
    request_id: &RequestId,
    store: &Arc<dyn MemoryStore>,
    evaluator: &Arc<InteractionEvaluator>,
    assembler: &Arc<ContextAssembler>,
    traces: &Arc<TraceStore>,
) {
    let outcome = evaluator.evaluate(message, response, &context).await;
    let record = outcome.record.clone();

    if contains_confusion_marker(message) {
        traces.record(
            request_id,
            "evaluator",
            "failsafe_override",
            serde_json::json!({
                "clarity_score": record.clarity_score,
                "confusion_trend": record.confusion_trend.to_string(),
            }),
        );
    }

    if let Err(e) = store.push_evaluation(user_id, record.clone()).await {
        warn!(user_id, error = %e, "Failed to commit evaluation");
        return;
    }

    if let Some(topic) = &record.struggle_detected {
        let severity = record.struggle_severity.unwrap_or(Severity::Mild);
        if let Err(e) = store.upsert_struggle(user_id, topic, severity).await {
            warn!(user_id, error = %e, "Failed to record struggle");
        }
    }

    if let Some(pace) = outcome.pace_adjustment.and_then(|p| p.to_pace()) {
        let update = ProfileUpdate {
            learning_pace: Some(pace),
            ..Default::default()
        };
        if let Err(e) = store.merge_profile(user_id, update).await {
            warn!(user_id, error = %e, "Failed to adjust learning pace");
        }
    }

    if let Some(interest) = &outcome.new_interest {
        append_interest(user_id, interest, store).await;
    }

    if let Err(e) = store.record_session(user_id, Utc::now()).await {
        warn!(user_id, error = %e, "Failed to record session");
    }

    // Periodic follow-ups driven by history length
    match store.read_user_memory(user_id).await {
        Ok(memory) => {
            let history_len = memory.progress.evaluation_history.len();
            if let Some(update) = derive_traits(&memory) {
                if let Err(e) = store.merge_profile(user_id, update).await {
                    warn!(user_id, error = %e, "Failed to update learner traits");
                }
            }
            if history_len % SUMMARY_REFRESH_EVERY == 0 {
                if let Err(e) = assembler.refresh_summary(user_id).await {
                    warn!(user_id, error = %e, "Summary refresh failed");
                }
            }
        }
        Err(e) => warn!(user_id, error = %e, "Failed to re-read memory for follow-ups"),
    }

    traces.record(
        request_id,
        "evaluator",
        "settled",
        serde_json::json!({ "clarity_score": record.clarity_score }),
    );
    debug!(user_id, clarity = record.clarity_score, "Evaluation settled");
}

async fn append_interest(user_id: &str, interest: &str, store: &Arc<dyn MemoryStore>) {
    match store.read_user_memory(user_id).await {
        Ok(memory) => {
            let mut interests = memory.profile.interests;
            if !interests.iter().any(|i| i.eq_ignore_ascii_case(interest)) {
                interests.push(interest.to_string());
                let update = ProfileUpdate {
                    interests: Some(interests),
                    ..Default::default()
                };
                if let Err(e) = store.merge_profile(user_id, update).await {
                    warn!(user_id, error = %e, "Failed to append interest");
                }
            }
        }
        Err(e) => warn!(user_id, error = %e, "Failed to read memory for interest append"),
    }
}

async fn recalculate_traits(user_id: &str, store: &Arc<dyn MemoryStore>) {
    match store.read_user_memory(user_id).await {
        Ok(memory) => {
            if let Some(update) = derive_traits(&memory) {
                if let Err(e) = store.merge_profile(user_id, update).await {
                    warn!(user_id, error = %e, "Failed to update learner traits");
                }
            }
        }
        Err(e) => warn!(user_id, error = %e, "Failed to read memory for trait recalculation"),
    }
}
