//! Error taxonomy for the cleaning pipeline.
//!
//! Only configuration problems abort a run. Everything else is captured at
//! the step boundary, recorded on the step entry, and the pipeline moves on;
//! cancellation returns a partial result rather than an error.

use miette::Diagnostic;
use thiserror::Error;

use crate::llm::LlmError;
use crate::prompts::PromptError;

/// Fatal errors returned from the pipeline entry point.
#[derive(Debug, Error, Diagnostic)]
pub enum PipelineError {
    /// A configuration option is invalid or inconsistent.
    #[error("invalid configuration: {message}")]
    #[diagnostic(
        code(bookloom::config::invalid),
        help("Check the option bag passed to the pipeline.")
    )]
    InvalidConfig { message: String },

    /// The legacy (non-evolved) cleaning path is not part of this crate.
    #[error("use_evolved_pipeline = false routes to a legacy path this crate does not provide")]
    #[diagnostic(
        code(bookloom::config::legacy_path),
        help("Enable use_evolved_pipeline or route legacy documents elsewhere.")
    )]
    LegacyPathUnsupported,

    /// A required prompt template is missing from the injected store.
    #[error(transparent)]
    #[diagnostic(transparent)]
    Prompt(#[from] PromptError),
}

/// Why a single step failed. Recorded on the step entry; never propagated.
#[derive(Debug, Error, Diagnostic)]
pub enum StepError {
    /// The LLM call failed after retries.
    #[error(transparent)]
    #[diagnostic(code(bookloom::step::llm))]
    Llm(#[from] LlmError),

    /// LLM output could not be parsed even after repair attempts.
    #[error("unparsable model output: {context}")]
    #[diagnostic(code(bookloom::step::parse))]
    Parse { context: String },

    /// A proposed boundary was rejected by the defense system.
    #[error("boundary rejected: {reason}")]
    #[diagnostic(code(bookloom::step::boundary_rejected))]
    BoundaryRejected { reason: String },

    /// An invariant was violated inside a deterministic transform.
    #[error("processing invariant violated: {message}")]
    #[diagnostic(code(bookloom::step::processing))]
    Processing { message: String },

    /// The run was cancelled while this step was active.
    #[error("cancelled")]
    #[diagnostic(code(bookloom::step::cancelled))]
    Cancelled,
}

impl StepError {
    /// True for the user-cancellation variant.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, StepError::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancelled_is_distinguishable() {
        assert!(StepError::Cancelled.is_cancelled());
        assert!(
            !StepError::Processing {
                message: "x".into()
            }
            .is_cancelled()
        );
    }
}
