//! Injected LLM capability.
//!
//! The core never talks HTTP; embedders hand it an implementation of
//! [`LlmClient`]. Errors are mapped into the closed [`LlmError`] taxonomy so
//! retry policy can be decided without knowing the provider. Key material
//! must never appear in errors or logs.

use async_trait::async_trait;
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// A single completion request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub model: String,
    pub system: String,
    pub user: String,
    pub max_tokens: u32,
    pub stop_sequences: Vec<String>,
    pub temperature: f32,
}

impl CompletionRequest {
    /// Request with the crate's defaults for deterministic extraction work.
    #[must_use]
    pub fn new(model: impl Into<String>, system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            system: system.into(),
            user: user.into(),
            max_tokens: 4096,
            stop_sequences: Vec::new(),
            temperature: 0.0,
        }
    }

    #[must_use]
    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    #[must_use]
    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    #[must_use]
    pub fn stop_sequences(mut self, stop_sequences: Vec<String>) -> Self {
        self.stop_sequences = stop_sequences;
        self
    }
}

/// Token accounting reported by the provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// A completed LLM response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionResponse {
    pub text: String,
    pub usage: TokenUsage,
    pub stop_reason: Option<String>,
}

/// Provider-agnostic error taxonomy for LLM calls.
#[derive(Debug, Clone, Error, Diagnostic)]
pub enum LlmError {
    /// Credentials rejected. Not retryable.
    #[error("authentication rejected by provider")]
    #[diagnostic(
        code(bookloom::llm::auth),
        help("Check the credentials configured on the injected client.")
    )]
    Auth,

    /// Provider throttled the request.
    #[error("rate limited by provider")]
    #[diagnostic(code(bookloom::llm::rate_limited))]
    RateLimited {
        /// Provider-supplied Retry-After, when present.
        retry_after: Option<Duration>,
    },

    /// The call exceeded its deadline.
    #[error("LLM call timed out after {elapsed:?}")]
    #[diagnostic(code(bookloom::llm::timeout))]
    Timeout { elapsed: Duration },

    /// Transport-level failure.
    #[error("network error: {0}")]
    #[diagnostic(code(bookloom::llm::network))]
    Network(String),

    /// The provider rejected the request as malformed. Not retryable.
    #[error("bad request: {0}")]
    #[diagnostic(code(bookloom::llm::bad_request))]
    BadRequest(String),

    /// Provider-side failure.
    #[error("server error: {0}")]
    #[diagnostic(code(bookloom::llm::server))]
    Server(String),
}

impl LlmError {
    /// Whether the retry layer may attempt the call again.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LlmError::RateLimited { .. }
                | LlmError::Timeout { .. }
                | LlmError::Network(_)
                | LlmError::Server(_)
        )
    }
}

/// The injected completion capability.
///
/// Implementations are expected to be cheap to clone (or `Arc`-wrapped) and
/// safe to share across Tokio tasks; the pipeline issues at most two calls
/// concurrently.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Issue one completion request.
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError>;

    /// Lightweight credential/endpoint check.
    async fn validate(&self) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryability_matches_taxonomy() {
        assert!(LlmError::Timeout {
            elapsed: Duration::from_secs(90)
        }
        .is_retryable());
        assert!(LlmError::RateLimited { retry_after: None }.is_retryable());
        assert!(LlmError::Network("reset".into()).is_retryable());
        assert!(LlmError::Server("500".into()).is_retryable());
        assert!(!LlmError::Auth.is_retryable());
        assert!(!LlmError::BadRequest("schema".into()).is_retryable());
    }
}
