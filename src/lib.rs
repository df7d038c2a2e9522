//! # Bookloom: Evolved Cleaning Pipeline
//!
//! Bookloom turns noisy text of book-length documents — typically OCR
//! markdown — into a clean, structured, LLM-ready artifact. The engine is
//! a deterministic, phased pipeline with a three-layer defense system
//! around every structural removal, so scaffolding (front and back
//! matter, tables of contents, indexes, auxiliary lists, citations,
//! footnotes, page furniture, OCR artefacts) is stripped without ever
//! risking catastrophic content loss.
//!
//! ## Core Concepts
//!
//! - **Pipeline**: sixteen strictly ordered steps over a shared run
//!   context ([`pipeline::EvolvedCleaningPipeline`])
//! - **Defense system**: quantitative validation, qualitative content
//!   verification, and a heuristic fallback gate every removal
//!   ([`defense`])
//! - **Capabilities**: the LLM client, prompt store, clock, and progress
//!   sink are injected; the core is a pure function of document, config,
//!   and capabilities
//! - **Confidence honesty**: only real measurements are aggregated; a
//!   skipped or failed step contributes nothing
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use bookloom::config::{CleaningConfig, Preset};
//! use bookloom::pipeline::{EvolvedCleaningPipeline, PipelineCapabilities};
//! use bookloom::prompts::StaticPromptStore;
//! # async fn example(llm: Arc<dyn bookloom::llm::LlmClient>) -> Result<(), Box<dyn std::error::Error>> {
//!
//! let config = CleaningConfig::preset(Preset::Default);
//! let caps = PipelineCapabilities::new(llm, Arc::new(StaticPromptStore::builtin()));
//!
//! let result = EvolvedCleaningPipeline::new(config)
//!     .run("raw OCR text of the book…", caps)
//!     .await?;
//!
//! println!("confidence {:.2}", result.overall_confidence);
//! println!("{}", result.cleaned_content);
//! # Ok(())
//! # }
//! ```
//!
//! ## Module Guide
//!
//! - [`pipeline`] - Orchestrator, step state machine, confidence tracking
//! - [`defense`] - The three-layer removal gate
//! - [`recon`] - Phase 0 structure analysis and boundary detection
//! - [`cleaning`] - Deterministic cleaning passes and shielding
//! - [`reflow`] - Paragraph reflow and length optimisation
//! - [`llm`] - Injected LLM client seam, retries, lenient JSON parsing
//! - [`prompts`] - Closed template set and the built-in store
//! - [`types`] - Result envelope and shared value types

pub mod assemble;
pub mod cleaning;
pub mod config;
pub mod context;
pub mod defense;
pub mod document;
pub mod error;
pub mod llm;
pub mod metadata;
pub mod patterns;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod recon;
pub mod reflow;
pub mod review;
pub mod telemetry;
pub mod textutil;
pub mod types;

pub use config::CleaningConfig;
pub use error::PipelineError;
pub use pipeline::{EvolvedCleaningPipeline, PipelineCapabilities};
pub use types::PipelineResult;

/// Run the evolved cleaning pipeline over `document_text`.
///
/// Convenience wrapper over [`EvolvedCleaningPipeline::run`].
///
/// # Errors
///
/// [`PipelineError`] for configuration problems; everything else is
/// reported on the result.
pub async fn run(
    document_text: &str,
    config: CleaningConfig,
    caps: PipelineCapabilities,
) -> Result<PipelineResult, PipelineError> {
    EvolvedCleaningPipeline::new(config).run(document_text, caps).await
}
