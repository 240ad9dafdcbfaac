//! Provider trait — the abstraction over the language-model gateway.
//!
//! A Provider knows how to send a prompt to an LLM and get text back. The
//! gateway must be treated as unreliable (timeouts, malformed JSON, partial
//! output) — every caller has a defined deterministic fallback.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;

/// A single completion request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRequest {
    /// The full prompt text.
    pub prompt: String,

    /// Whether the caller expects machine-parseable JSON rather than prose.
    #[serde(default)]
    pub expect_structured: bool,

    /// Temperature (0.0 = deterministic, 1.0 = creative).
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum tokens to generate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

fn default_temperature() -> f32 {
    0.7
}

impl CompletionRequest {
    /// A prose request (mentor replies, summaries).
    pub fn text(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            expect_structured: false,
            temperature: default_temperature(),
            max_tokens: None,
        }
    }

    /// A structured-output request (planner, evaluator). Lower temperature
    /// keeps the JSON shape stable.
    pub fn structured(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            expect_structured: true,
            temperature: 0.2,
            max_tokens: None,
        }
    }
}

/// A complete response from a provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionResponse {
    /// The generated text.
    pub text: String,

    /// Which model actually responded.
    pub model: String,

    /// Token usage statistics, when the provider reports them.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

/// Token usage information.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// The core Provider trait.
///
/// Every LLM backend implements this. Pipeline stages call `complete()`
/// without knowing which provider is configured. Timeouts are applied by
/// the caller (each stage bounds its own gateway call).
#[async_trait]
pub trait Provider: Send + Sync {
    /// A human-readable name for this provider (e.g., "gemini").
    fn name(&self) -> &str;

    /// Send a request and get a complete response.
    async fn complete(
        &self,
        request: CompletionRequest,
    ) -> std::result::Result<CompletionResponse, ProviderError>;

    /// Health check — can we reach the provider?
    async fn health_check(&self) -> std::result::Result<bool, ProviderError> {
        Ok(true)
    }
}

/// Strip the Markdown code fences models like to wrap around JSON output.
pub fn strip_code_fences(text: &str) -> &str {
    let mut t = text.trim();
    if let Some(rest) = t.strip_prefix("```json") {
        t = rest;
    } else if let Some(rest) = t.strip_prefix("```") {
        t = rest;
    }
    if let Some(rest) = t.strip_suffix("```") {
        t = rest;
    }
    t.trim()
}

/// Parse structured model output into `T`, tolerating code fences.
///
/// Callers treat a `MalformedOutput` the same as any gateway failure and
/// substitute their deterministic default.
pub fn parse_structured<T: serde::de::DeserializeOwned>(
    text: &str,
) -> std::result::Result<T, ProviderError> {
    serde_json::from_str(strip_code_fences(text))
        .map_err(|e| ProviderError::MalformedOutput(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn structured_request_lowers_temperature() {
        let req = CompletionRequest::structured("{}");
        assert!(req.expect_structured);
        assert!(req.temperature < 0.5);

        let req = CompletionRequest::text("hello");
        assert!(!req.expect_structured);
    }

    #[test]
    fn strips_json_fences() {
        let fenced = "```json\n{\"a\": 1}\n```";
        assert_eq!(strip_code_fences(fenced), "{\"a\": 1}");
    }

    #[test]
    fn strips_bare_fences() {
        let fenced = "```\n{\"a\": 1}\n```";
        assert_eq!(strip_code_fences(fenced), "{\"a\": 1}");
    }

    #[test]
    fn leaves_unfenced_text_alone() {
        assert_eq!(strip_code_fences("  {\"a\": 1} "), "{\"a\": 1}");
    }

    #[test]
    fn parse_structured_roundtrip() {
        #[derive(serde::Deserialize)]
        struct Out {
            score: u8,
        }
        let out: Out = parse_structured("```json\n{\"score\": 42}\n```").unwrap();
        assert_eq!(out.score, 42);
    }

    #[test]
    fn parse_structured_rejects_prose() {
        #[derive(serde::Deserialize, Debug)]
        struct Out {
            #[allow(dead_code)]
            score: u8,
        }
        let err = parse_structured::<Out>("I think the score is about 42.").unwrap_err();
        assert!(matches!(err, ProviderError::MalformedOutput(_)));
    }
}
