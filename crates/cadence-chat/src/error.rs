//! Chat-level error taxonomy and the partial-preservation policy.
//!
//! Backend errors are classified into these kinds at exactly one boundary
//! (where the session's stream is consumed); no other component invents
//! kinds. Raw backend error text is never displayed and never logged — only
//! a fingerprint, so failures can be correlated without leaking model output
//! into logs.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Why a response cycle failed.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ErrorKind {
    /// No session could be constructed
    #[error("session is not configured")]
    SessionNotConfigured,

    /// The model or its assets are unavailable right now
    #[error("model is unavailable")]
    ModelUnavailable {
        /// Backend-provided reason; internal use only, never displayed
        #[serde(skip)]
        reason: String,
    },

    /// Generation failed mid-stream
    #[error("generation failed")]
    GenerationFailed {
        /// Original backend message; internal use only, never displayed
        #[serde(skip)]
        underlying: String,
    },

    /// The request exhausted the model's context/token budget
    #[error("token limit exceeded")]
    TokenLimitExceeded,

    /// The backend refused the content
    #[error("guardrail violation")]
    GuardrailViolation,

    /// Generation completed without usable content
    #[error("empty or invalid response")]
    InvalidResponse,
}

impl ErrorKind {
    /// Map a backend error into a kind. This is the single classification
    /// boundary for the whole pipeline.
    pub fn classify(error: &cadence_session::Error) -> Self {
        use cadence_session::Error as SessionError;
        match error {
            SessionError::NotConfigured | SessionError::InvalidApiKey => {
                Self::SessionNotConfigured
            }
            e if e.is_token_limit() => Self::TokenLimitExceeded,
            e if e.is_guardrail() => Self::GuardrailViolation,
            e if e.is_model_unavailable() => Self::ModelUnavailable {
                reason: e.to_string(),
            },
            e => Self::GenerationFailed {
                underlying: e.to_string(),
            },
        }
    }

    /// Whether partial text the user has already seen survives this failure
    /// as the assistant message, annotated inline. Everything else discards
    /// the partial text and falls back to a generic message.
    pub fn preserves_partial_text(&self) -> bool {
        matches!(
            self,
            Self::GenerationFailed { .. } | Self::TokenLimitExceeded
        )
    }

    /// Stable tag for structured logging
    pub fn tag(&self) -> &'static str {
        match self {
            Self::SessionNotConfigured => "session_not_configured",
            Self::ModelUnavailable { .. } => "model_unavailable",
            Self::GenerationFailed { .. } => "generation_failed",
            Self::TokenLimitExceeded => "token_limit_exceeded",
            Self::GuardrailViolation => "guardrail_violation",
            Self::InvalidResponse => "invalid_response",
        }
    }

    /// Redacted fingerprint of backend text, safe for logs
    pub fn fingerprint(text: &str) -> String {
        let digest = Sha256::digest(text.as_bytes());
        digest
            .iter()
            .take(6)
            .map(|b| format!("{:02x}", b))
            .collect()
    }

    /// Fingerprint of the retained backend text, if this kind carries any
    pub fn internal_fingerprint(&self) -> Option<String> {
        match self {
            Self::GenerationFailed { underlying } => Some(Self::fingerprint(underlying)),
            Self::ModelUnavailable { reason } => Some(Self::fingerprint(reason)),
            _ => None,
        }
    }
}
