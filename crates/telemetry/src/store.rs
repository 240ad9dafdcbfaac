//! Thread-safe bounded trace store.
//!
//! A ring buffer behind a `RwLock` (non-async, held briefly). Recording
//! never fails and never blocks pipeline progress; when the buffer is full
//! the oldest entries are dropped.

use std::collections::VecDeque;
use std::sync::RwLock;

use crate::trace::{RequestId, TraceEntry};

/// Bounded in-process trace store.
pub struct TraceStore {
    entries: RwLock<VecDeque<TraceEntry>>,
    capacity: usize,
    enabled: bool,
}

impl TraceStore {
    /// Create a store keeping at most `capacity` entries.
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: RwLock::new(VecDeque::with_capacity(capacity.min(1024))),
            capacity: capacity.max(1),
            enabled: true,
        }
    }

    /// A store that records nothing (telemetry disabled by config).
    pub fn disabled() -> Self {
        Self {
            entries: RwLock::new(VecDeque::new()),
            capacity: 1,
            enabled: false,
        }
    }

    /// Record one agent action. Fire-and-forget: never returns an error
    /// into pipeline code.
    pub fn record(
        &self,
        request_id: &RequestId,
        agent: &str,
        action: &str,
        details: serde_json::Value,
    ) {
        if !self.enabled {
            return;
        }
        let entry = TraceEntry::new(request_id, agent, action, details);
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        if entries.len() >= self.capacity {
            entries.pop_front();
        }
        entries.push_back(entry);
    }

    /// The most recent `limit` entries, newest first.
    pub fn recent(&self, limit: usize) -> Vec<TraceEntry> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries.iter().rev().take(limit).cloned().collect()
    }

    /// Total entries currently held.
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for TraceStore {
    fn default() -> Self {
        Self::new(256)
    }
}
