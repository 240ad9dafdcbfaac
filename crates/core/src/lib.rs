//! # Verdant Core
//!
//! Domain types, traits, and error definitions for the Verdant mentoring
//! backend. This crate has **zero framework dependencies** — it defines the
//! domain model that all other crates implement against.
//!
//! ## Design Philosophy
//!
//! Every collaborator boundary is defined as a trait here. Implementations
//! live in their respective crates. This enables:
//! - Swapping implementations via configuration
//! - Easy testing with mock/stub implementations
//! - Clean dependency graph (all crates depend inward on core)

pub mod error;
pub mod evaluation;
pub mod memory;
pub mod message;
pub mod provider;
pub mod strategy;

// Re-export key types at crate root for ergonomics
pub use error::{Error, MemoryError, ProviderError, Result};
pub use evaluation::{ConfusionTrend, EvaluationRecord, DEFAULT_CLARITY};
pub use memory::{
    push_bounded, ConfidenceTrend, EffortMetrics, LearningPace, MemoryStore, ProfileUpdate,
    Severity, Stage, Struggle, TraitLevel, UserMemory, UserProfile, UserProgress,
    EVALUATION_HISTORY_CAP, RECENT_TURNS, SESSION_DATES_CAP,
};
pub use message::{pair_turns, ConversationId, Sender, StoredMessage, Turn};
pub use provider::{
    parse_structured, strip_code_fences, CompletionRequest, CompletionResponse, Provider, Usage,
};
pub use strategy::{Pacing, Strategy, StrategyKind, Tone, Verbosity};
