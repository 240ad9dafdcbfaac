//! Language-model gateway clients for Verdant.
//!
//! All providers implement the `verdant_core::Provider` trait. Retries for
//! transient failures live here, in the gateway-client collaborator — the
//! pipeline itself never retries, which keeps the fail-safe reasoning
//! deterministic.

pub mod gemini;
pub mod retry;

pub use gemini::GeminiProvider;
pub use retry::RetryingProvider;

use std::sync::Arc;

use verdant_config::ProviderConfig;
use verdant_core::error::ProviderError;
use verdant_core::Provider;

/// Build the configured provider, wrapped in the retry layer.
pub fn build_from_config(config: &ProviderConfig) -> Result<Arc<dyn Provider>, ProviderError> {
    let inner: Arc<dyn Provider> = match config.kind.as_str() {
        "gemini" => {
            let api_key = config.api_key.clone().ok_or_else(|| {
                ProviderError::NotConfigured(
                    "No API key configured — set VERDANT_API_KEY or GEMINI_API_KEY".into(),
                )
            })?;
            let mut provider =
                GeminiProvider::new(api_key, &config.model, config.timeout_secs);
            if let Some(base_url) = &config.base_url {
                provider = provider.with_base_url(base_url);
            }
            Arc::new(provider)
        }
        other => {
            return Err(ProviderError::NotConfigured(format!(
                "Unknown provider kind '{other}'"
            )));
        }
    };

    Ok(Arc::new(RetryingProvider::new(inner, config.retries)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_requires_api_key() {
        let config = ProviderConfig::default();
        let err = build_from_config(&config).err().unwrap();
        assert!(matches!(err, ProviderError::NotConfigured(_)));
    }

    #[test]
    fn build_rejects_unknown_kind() {
        let config = ProviderConfig {
            api_key: Some("key".into()),
            kind: "delphi".into(),
            ..Default::default()
        };
        let err = build_from_config(&config).err().unwrap();
        assert!(matches!(err, ProviderError::NotConfigured(_)));
    }

    #[test]
    fn build_gemini_succeeds_with_key() {
        let config = ProviderConfig {
            api_key: Some("key".into()),
            ..Default::default()
        };
        let provider = build_from_config(&config).unwrap();
        assert_eq!(provider.name(), "gemini");
    }
}
