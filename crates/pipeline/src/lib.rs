//! Pipeline orchestration for Verdant.
//!
//! The orchestrator walks each request through a strict sequence —
//! persist user message, assemble context, plan, generate, persist reply —
//! and returns the reply **before** evaluation runs. Evaluation and other
//! slow work goes through a bounded background worker that is never awaited
//! by the request handler and survives client disconnects.

pub mod insights;
pub mod orchestrator;
pub mod worker;

pub use insights::{
    derive_effort, derive_insights, derive_momentum, derive_signals, EffortSummary,
    InsightSummary, Momentum, MomentumMetrics, MomentumState, Signal, SignalKind,
};
pub use orchestrator::Orchestrator;
pub use worker::{BackgroundWorker, Job};
