//! Memory store implementations for Verdant.
//!
//! Both backends implement `verdant_core::MemoryStore` with field-level
//! merge semantics: every write touches a single field or performs a
//! bounded-array push, never a whole-document overwrite.

pub mod in_memory;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use in_memory::InMemoryStore;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;
