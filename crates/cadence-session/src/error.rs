//! Error types for cadence-session

use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

/// Result type alias using cadence-session Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while streaming from a generation backend
#[derive(Error, Debug)]
pub enum Error {
    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Server-sent events error
    #[error("SSE error: {0}")]
    Sse(String),

    /// Backend returned an error response
    #[error("API error: {message} (type: {error_type})")]
    Api { error_type: String, message: String },

    /// Invalid or missing API key
    #[error("Invalid or missing API key")]
    InvalidApiKey,

    /// No backend endpoint configured
    #[error("Session is not configured")]
    NotConfigured,

    /// Unexpected response format
    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),

    /// Stream was aborted
    #[error("Request aborted")]
    Aborted,
}

fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns.iter().filter_map(|p| Regex::new(p).ok()).collect()
}

/// Patterns indicating the request exhausted the model's context/token budget.
static TOKEN_LIMIT_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile(&[
        r"(?i)context.?length.?exceed",
        r"(?i)maximum.?context.?length",
        r"(?i)context.?window.?(exceed|full|limit)",
        r"(?i)too.?many.?tokens",
        r"(?i)prompt.?is.?too.?long",
        r"(?i)prompt.?too.?long",
        r"(?i)input.?too.?long",
        r"(?i)token.?limit.?(exceed|reach)",
        r"(?i)request.?too.?large",
        r"(?i)context_length_exceeded",
        r"(?i)exceeds?.+token.?limit",
        r"\b413\b",
    ])
});

/// Patterns indicating the backend refused the content outright.
static GUARDRAIL_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile(&[
        r"(?i)guardrail",
        r"(?i)content.?(filter|policy)",
        r"(?i)safety.?(system|filter|violation)",
        r"(?i)refus(ed|al)",
        r"(?i)flagged.?(as|by)",
        r"(?i)prohibited.?content",
        r"(?i)blocked.?by.?(policy|moderation)",
    ])
});

/// Patterns indicating the model or its assets are not available right now.
static UNAVAILABLE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile(&[
        r"(?i)model.?not.?found",
        r"(?i)no.?such.?model",
        r"(?i)model.?(is.?)?unavailable",
        r"(?i)assets?.?(are.?)?(unavailable|not.?ready)",
        r"(?i)model.?(is.?)?(currently.?)?loading",
        r"(?i)model.?not.?installed",
        r"(?i)model.?has.?been.?deprecated",
    ])
});

impl Error {
    /// Create an API error from type and message
    pub fn api(error_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Api {
            error_type: error_type.into(),
            message: message.into(),
        }
    }

    fn matches_any(&self, patterns: &[Regex]) -> bool {
        let text = self.to_string();
        patterns.iter().any(|re| re.is_match(&text))
    }

    /// Check if this error indicates context/token budget exhaustion
    pub fn is_token_limit(&self) -> bool {
        self.matches_any(&TOKEN_LIMIT_PATTERNS)
    }

    /// Check if this error indicates a safety/guardrail refusal
    pub fn is_guardrail(&self) -> bool {
        self.matches_any(&GUARDRAIL_PATTERNS)
    }

    /// Check if this error indicates the model or its assets are unavailable
    pub fn is_model_unavailable(&self) -> bool {
        self.matches_any(&UNAVAILABLE_PATTERNS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // --- token limit classification ---

    #[test]
    fn test_token_limit_context_length() {
        assert!(Error::api("invalid_request_error", "context length exceeded").is_token_limit());
        assert!(
            Error::api(
                "invalid_request_error",
                "This model's maximum context length is 128000 tokens"
            )
            .is_token_limit()
        );
    }

    #[test]
    fn test_token_limit_prompt_too_long() {
        assert!(Error::api("invalid_request_error", "prompt is too long").is_token_limit());
        assert!(Error::Sse("Prompt too long for this model".into()).is_token_limit());
    }

    #[test]
    fn test_token_limit_window_and_request_size() {
        assert!(Error::api("error", "context window exceeded").is_token_limit());
        assert!(Error::api("error", "request too large").is_token_limit());
        assert!(Error::api("error", "too many tokens in the request").is_token_limit());
    }

    #[test]
    fn test_token_limit_http_413() {
        assert!(Error::Sse("HTTP 413 Payload Too Large".into()).is_token_limit());
    }

    #[test]
    fn test_not_token_limit() {
        assert!(!Error::api("authentication_error", "invalid API key").is_token_limit());
        assert!(!Error::Aborted.is_token_limit());
        assert!(!Error::api("error", "rate limit exceeded").is_token_limit());
    }

    // --- guardrail classification ---

    #[test]
    fn test_guardrail_phrasings() {
        assert!(Error::api("policy", "guardrail violation detected").is_guardrail());
        assert!(Error::api("policy", "blocked by moderation").is_guardrail());
        assert!(Error::api("policy", "content filter triggered").is_guardrail());
        assert!(Error::api("policy", "the model refused to answer").is_guardrail());
        assert!(Error::Sse("response flagged as unsafe by safety system".into()).is_guardrail());
    }

    #[test]
    fn test_not_guardrail() {
        assert!(!Error::api("error", "connection reset").is_guardrail());
        assert!(!Error::api("error", "context length exceeded").is_guardrail());
    }

    // --- availability classification ---

    #[test]
    fn test_model_unavailable_phrasings() {
        assert!(Error::api("error", "model not found: coach-large").is_model_unavailable());
        assert!(Error::api("error", "model is unavailable").is_model_unavailable());
        assert!(Error::api("error", "model assets are not ready").is_model_unavailable());
        assert!(Error::Sse("model is currently loading".into()).is_model_unavailable());
        assert!(Error::api("error", "no such model").is_model_unavailable());
    }

    #[test]
    fn test_not_model_unavailable() {
        assert!(!Error::api("error", "internal server error").is_model_unavailable());
        assert!(!Error::InvalidApiKey.is_model_unavailable());
    }
}
