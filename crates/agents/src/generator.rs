//! Response generator — the only agent that produces user-facing text.
//!
//! Strategy constraints are embedded in the prompt as hard instructions and
//! then *enforced* at this boundary: the verbosity line cap is applied to
//! whatever the gateway returns. On gateway failure the user still gets a
//! warm fallback reply — user-facing failure is worse than a generic answer.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use verdant_core::provider::{CompletionRequest, Provider};
use verdant_core::{Pacing, Strategy};

use crate::complete_bounded;
use crate::context::UserContext;

/// Returned when the gateway is unreachable or errors out.
pub const FALLBACK_REPLY: &str = "I'm with you. Tell me more about what's on your mind.";

/// The response generator agent.
pub struct ResponseGenerator {
    provider: Arc<dyn Provider>,
    timeout: Duration,
}

impl ResponseGenerator {
    pub fn new(provider: Arc<dyn Provider>, timeout: Duration) -> Self {
        Self { provider, timeout }
    }

    /// Generate the mentor reply. Infallible by contract: the caller always
    /// receives a non-empty string.
    pub async fn generate(
        &self,
        context: &UserContext,
        message: &str,
        strategy: &Strategy,
    ) -> String {
        let max_lines = strategy.verbosity.max_lines();
        let prompt = Self::build_prompt(context, message, strategy, max_lines);

        match complete_bounded(&self.provider, self.timeout, CompletionRequest::text(prompt))
            .await
        {
            Ok(response) => {
                let reply = enforce_line_limit(&response.text, max_lines);
                if reply.is_empty() {
                    warn!("Generator returned empty text, using fallback reply");
                    FALLBACK_REPLY.to_string()
                } else {
                    debug!(lines = reply.lines().count(), max_lines, "Reply generated");
                    reply
                }
            }
            Err(e) => {
                warn!(error = %e, "Generator gateway call failed, using fallback reply");
                FALLBACK_REPLY.to_string()
            }
        }
    }

    fn build_prompt(
        context: &UserContext,
        message: &str,
        strategy: &Strategy,
        max_lines: usize,
    ) -> String {
        let recent: Vec<String> = context
            .recent_turns
            .iter()
            .map(|t| format!("Student: {}\nMentor: {}", t.user, t.mentor))
            .collect();

        let pace_rule = if strategy.pacing == Pacing::Slow {
            "\n7. Pacing is slow: use simpler language and smaller steps."
        } else {
            ""
        };
        let question_rule = if strategy.should_ask_question {
            "Ask at most one thoughtful question."
        } else {
            "Do not ask a question this turn."
        };

        format!(
            "You are a wise, gentle mentor. Respond warmly but CONCISELY.\n\n\
             CONTEXT:\n{summary}\n\n\
             RECENT EXCHANGES:\n{recent}\n\n\
             MESSAGE: \"{message}\"\n\n\
             PLANNER CONTROLS:\n\
             - Approach: {approach}\n\
             - Tone: {tone}\n\
             - Pacing: {pacing}\n\n\
             STRICT RULES:\n\
             1. Point-to-point explanations. One sentence per point.\n\
             2. Paragraphs allowed ONLY for emotional reassurance.\n\
             3. AT MOST {max_lines} LINES total.\n\
             4. Stop once clarity is achieved. Do not over-explain.\n\
             5. No filler phrasing, no repetition.\n\
             6. {question_rule}{pace_rule}\n\n\
             Respond now (max {max_lines} lines):",
            summary = context.summary_text(),
            recent = recent.join("\n"),
            message = message,
            approach = strategy.strategy,
            tone = strategy.tone,
            pacing = strategy.pacing,
            max_lines = max_lines,
            question_rule = question_rule,
            pace_rule = pace_rule,
        )
    }
}

/// Enforce the verbosity line cap on gateway output.
///
/// Replies within the cap pass through untouched; over-long replies keep
/// their first `max_lines` non-empty lines.
pub fn enforce_line_limit(text: &str, max_lines: usize) -> String {
    let trimmed = text.trim();
    let content_lines: Vec<&str> = trimmed.lines().filter(|l| !l.trim().is_empty()).collect();
    if content_lines.len() <= max_lines {
        trimmed.to_string()
    } else {
        content_lines[..max_lines].join("\n")
    }
}
