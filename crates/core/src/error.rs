//! Error types for the Verdant domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.

use thiserror::Error;

/// The top-level error type for all Verdant operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Memory store errors ---
    #[error("Memory error: {0}")]
    Memory(#[from] MemoryError),

    // --- Language-model gateway errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

/// Memory store failures.
///
/// Unavailability during a required write (persisting the user message or
/// the mentor reply) is fatal to the current request and surfaced to the
/// caller as retryable. Background writes log and swallow these.
#[derive(Debug, Clone, Error)]
pub enum MemoryError {
    #[error("Memory store unavailable: {0}")]
    Unavailable(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),
}

/// Language-model gateway failures.
///
/// Every pipeline stage that calls the gateway recovers locally with a
/// deterministic default (default strategy, fallback reply, unchanged
/// evaluation) — these errors never reach the end user.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    Api { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Malformed structured output: {0}")]
    MalformedOutput(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),
}

impl ProviderError {
    /// Whether a retry could plausibly succeed (rate limits, 5xx, network).
    pub fn is_transient(&self) -> bool {
        match self {
            Self::RateLimited { .. } | Self::Timeout(_) | Self::Network(_) => true,
            Self::Api { status_code, .. } => *status_code >= 500,
            Self::MalformedOutput(_) | Self::NotConfigured(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_error_displays_correctly() {
        let err = Error::Memory(MemoryError::Unavailable("connection refused".into()));
        assert!(err.to_string().contains("connection refused"));
    }

    #[test]
    fn provider_error_displays_correctly() {
        let err = Error::Provider(ProviderError::Api {
            status_code: 429,
            message: "Too many requests".into(),
        });
        assert!(err.to_string().contains("429"));
        assert!(err.to_string().contains("Too many requests"));
    }

    #[test]
    fn transient_classification() {
        assert!(ProviderError::Timeout("10s".into()).is_transient());
        assert!(ProviderError::Api { status_code: 503, message: "overloaded".into() }.is_transient());
        assert!(!ProviderError::Api { status_code: 400, message: "bad request".into() }.is_transient());
        assert!(!ProviderError::MalformedOutput("not json".into()).is_transient());
    }
}
