//! Timeout, retry, and cancellation wrapper around the injected client.
//!
//! Every LLM call the pipeline makes goes through [`LlmRunner::complete`]:
//! cancellation is checked immediately before the call, the call is bounded
//! by a deadline, and retryable failures are re-attempted with exponential
//! backoff plus jitter. Rate limits honour the provider's `Retry-After`
//! when present and wait 30 seconds otherwise.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tracing::{debug, warn};

use super::client::{CompletionRequest, CompletionResponse, LlmClient, LlmError, TokenUsage};
use crate::progress::CancelToken;

/// Deadline class for a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallDeadline {
    /// 30 s — the single reconnaissance structure-analysis call.
    Reconnaissance,
    /// 90 s — the default for detection and review calls.
    Standard,
    /// 180 s — reflow and optimisation calls over large chunks.
    Extended,
}

impl CallDeadline {
    #[must_use]
    pub fn duration(&self) -> Duration {
        match self {
            CallDeadline::Reconnaissance => Duration::from_secs(30),
            CallDeadline::Standard => Duration::from_secs(90),
            CallDeadline::Extended => Duration::from_secs(180),
        }
    }
}

/// Backoff parameters for retryable failures.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    /// Wait applied to a rate limit without a `Retry-After` hint.
    pub rate_limit_fallback: Duration,
    pub max_jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_secs(2),
            rate_limit_fallback: Duration::from_secs(30),
            max_jitter: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry `attempt` (1-based) of a non-rate-limit failure.
    fn backoff(&self, attempt: u32) -> Duration {
        let exp = self.base_delay.saturating_mul(1u32 << (attempt - 1).min(8));
        exp + self.jitter()
    }

    fn jitter(&self) -> Duration {
        let max = self.max_jitter.as_millis() as u64;
        if max == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::rng().random_range(0..max))
    }
}

/// Result of one runner call: text plus accounting the caller hands to the
/// orchestrator for aggregation.
#[derive(Debug, Clone)]
pub struct LlmReply {
    pub text: String,
    pub usage: TokenUsage,
}

/// Errors surfaced from the runner; cancellation is distinct from provider
/// failure so callers can abort the step instead of falling back.
#[derive(Debug, Clone, thiserror::Error)]
pub enum LlmCallError {
    #[error("cancelled before the LLM call was issued")]
    Cancelled,
    #[error(transparent)]
    Llm(#[from] LlmError),
}

/// Bundles the injected client with deadline, retry, and cancellation
/// handling so services can issue calls with one line.
#[derive(Clone)]
pub struct LlmRunner {
    client: Arc<dyn LlmClient>,
    policy: RetryPolicy,
    cancel: CancelToken,
    model: String,
}

impl LlmRunner {
    #[must_use]
    pub fn new(client: Arc<dyn LlmClient>, model: impl Into<String>, cancel: CancelToken) -> Self {
        Self {
            client,
            policy: RetryPolicy::default(),
            cancel,
            model: model.into(),
        }
    }

    #[must_use]
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Model identifier stamped onto every request.
    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Build a request against the configured model.
    #[must_use]
    pub fn request(&self, system: impl Into<String>, user: impl Into<String>) -> CompletionRequest {
        CompletionRequest::new(self.model.clone(), system, user)
    }

    /// Issue a completion, retrying retryable failures within the policy.
    ///
    /// # Errors
    ///
    /// [`LlmCallError::Cancelled`] when the cancel token fired before an
    /// attempt; [`LlmCallError::Llm`] with the last provider error once
    /// retries are exhausted or the error is not retryable.
    pub async fn complete(
        &self,
        request: CompletionRequest,
        deadline: CallDeadline,
    ) -> Result<LlmReply, LlmCallError> {
        let limit = deadline.duration();
        let mut attempt: u32 = 0;
        loop {
            if self.cancel.is_cancelled() {
                return Err(LlmCallError::Cancelled);
            }

            match self.attempt(request.clone(), limit).await {
                Ok(response) => {
                    debug!(
                        model = %request.model,
                        input_tokens = response.usage.input_tokens,
                        output_tokens = response.usage.output_tokens,
                        "llm call completed"
                    );
                    return Ok(LlmReply {
                        text: response.text,
                        usage: response.usage,
                    });
                }
                Err(err) if err.is_retryable() && attempt < self.policy.max_retries => {
                    attempt += 1;
                    let wait = match &err {
                        LlmError::RateLimited { retry_after } => retry_after
                            .unwrap_or(self.policy.rate_limit_fallback)
                            + self.policy.jitter(),
                        _ => self.policy.backoff(attempt),
                    };
                    warn!(attempt, wait_ms = wait.as_millis() as u64, error = %err, "retrying llm call");
                    tokio::time::sleep(wait).await;
                }
                Err(err) => return Err(LlmCallError::Llm(err)),
            }
        }
    }

    async fn attempt(
        &self,
        request: CompletionRequest,
        limit: Duration,
    ) -> Result<CompletionResponse, LlmError> {
        match tokio::time::timeout(limit, self.client.complete(request)).await {
            Ok(result) => result,
            Err(_) => Err(LlmError::Timeout { elapsed: limit }),
        }
    }
}

impl std::fmt::Debug for LlmRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmRunner")
            .field("model", &self.model)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}
