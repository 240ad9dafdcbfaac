//! Transparent retry wrapper for transient provider failures.
//!
//! Retries rate limits, timeouts, network errors, and 5xx responses with
//! exponential backoff plus jitter-free doubling. Malformed output and
//! client errors are returned immediately — retrying those cannot help,
//! and each pipeline stage has its own deterministic fallback for them.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use verdant_core::error::ProviderError;
use verdant_core::provider::{CompletionRequest, CompletionResponse, Provider};

const INITIAL_BACKOFF: Duration = Duration::from_millis(500);

/// A provider that retries its inner provider on transient failures.
pub struct RetryingProvider {
    inner: Arc<dyn Provider>,
    retries: u32,
}

impl RetryingProvider {
    /// Wrap `inner`, retrying transient failures up to `retries` times
    /// (so at most `retries + 1` attempts total).
    pub fn new(inner: Arc<dyn Provider>, retries: u32) -> Self {
        Self { inner, retries }
    }
}

#[async_trait]
impl Provider for RetryingProvider {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn complete(
        &self,
        request: CompletionRequest,
    ) -> std::result::Result<CompletionResponse, ProviderError> {
        let mut backoff = INITIAL_BACKOFF;

        for attempt in 0..=self.retries {
            match self.inner.complete(request.clone()).await {
                Ok(response) => return Ok(response),
                Err(e) if e.is_transient() && attempt < self.retries => {
                    let delay = match &e {
                        ProviderError::RateLimited { retry_after_secs } => {
                            Duration::from_secs(*retry_after_secs).max(backoff)
                        }
                        _ => backoff,
                    };
                    warn!(
                        provider = %self.inner.name(),
                        attempt = attempt + 1,
                        error = %e,
                        delay_ms = delay.as_millis() as u64,
                        "Transient provider failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    backoff *= 2;
                }
                Err(e) => return Err(e),
            }
        }

        unreachable!("retry loop always returns")
    }

    async fn health_check(&self) -> std::result::Result<bool, ProviderError> {
        self.inner.health_check().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Fails with the given error `failures` times, then succeeds.
    struct FlakyProvider {
        failures: u32,
        calls: AtomicU32,
        error: ProviderError,
    }

    impl FlakyProvider {
        fn new(failures: u32, error: ProviderError) -> Self {
            Self {
                failures,
                calls: AtomicU32::new(0),
                error,
            }
        }
    }

    #[async_trait]
    impl Provider for FlakyProvider {
        fn name(&self) -> &str {
            "flaky"
        }

        async fn complete(
            &self,
            _request: CompletionRequest,
        ) -> std::result::Result<CompletionResponse, ProviderError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                Err(self.error.clone())
            } else {
                Ok(CompletionResponse {
                    text: "ok".into(),
                    model: "flaky-model".into(),
                    usage: None,
                })
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn retries_transient_failures() {
        let inner = Arc::new(FlakyProvider::new(2, ProviderError::Network("reset".into())));
        let provider = RetryingProvider::new(inner.clone(), 3);

        let response = provider
            .complete(CompletionRequest::text("hi"))
            .await
            .unwrap();
        assert_eq!(response.text, "ok");
        assert_eq!(inner.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_retry_budget() {
        let inner = Arc::new(FlakyProvider::new(10, ProviderError::Timeout("20s".into())));
        let provider = RetryingProvider::new(inner.clone(), 2);

        let err = provider
            .complete(CompletionRequest::text("hi"))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Timeout(_)));
        assert_eq!(inner.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn malformed_output_not_retried() {
        let inner = Arc::new(FlakyProvider::new(
            10,
            ProviderError::MalformedOutput("not json".into()),
        ));
        let provider = RetryingProvider::new(inner.clone(), 3);

        let err = provider
            .complete(CompletionRequest::structured("{}"))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::MalformedOutput(_)));
        assert_eq!(inner.calls.load(Ordering::SeqCst), 1);
    }
}
