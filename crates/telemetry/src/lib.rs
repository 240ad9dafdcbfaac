//! Agent activity tracing for the Verdant pipeline.
//!
//! Every pipeline stage records what it did as an append-only trace entry,
//! consumed by a polling viewer endpoint. Traces are purely observational —
//! they are not authoritative state, recording is fire-and-forget, and the
//! bounded buffer silently drops the oldest entries under load.

pub mod store;
pub mod trace;

pub use store::TraceStore;
pub use trace::{RequestId, TraceEntry};
