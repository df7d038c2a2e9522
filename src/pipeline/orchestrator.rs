//! The evolved cleaning pipeline orchestrator.
//!
//! Sixteen strictly ordered steps over one [`PipelineContext`]. Every
//! structural removal goes through the defense system; every step failure
//! is captured on the step record and the run continues; cancellation
//! stops the run and returns the partial result with everything completed
//! so far. Configuration problems are the only way `run` returns an error.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, instrument, warn};

use crate::assemble::Assembler;
use crate::cleaning::characters::CharacterCleaner;
use crate::cleaning::pages::PageCleaner;
use crate::cleaning::references;
use crate::config::{ChapterMarkerStyle, CleaningConfig};
use crate::context::PipelineContext;
use crate::defense::{BoundaryProposal, DefenseSystem, GateMode, SectionKind};
use crate::document::Document;
use crate::error::{PipelineError, StepError};
use crate::llm::{LlmClient, LlmRunner};
use crate::metadata::MetadataExtractor;
use crate::progress::{CancelToken, Clock, MonotonicClock, NoopProgress, ProgressSink};
use crate::prompts::{PromptError, PromptName, PromptStore};
use crate::recon::{BoundaryDetectionService, ReconnaissanceService};
use crate::reflow::{Optimizer, ReflowService, REFLOW_WORD_TOLERANCE};
use crate::review::FinalReviewer;
use crate::textutil::relative_delta;
use crate::types::{
    Advisory, AdvisoryRule, FinalReview, PipelineResult, RemovalKind, RemovalRecord, RemovalScope,
    ValidationMethod,
};

use super::steps::{PipelineStep, StepRecord, StepStatus};

/// Injected capabilities for one run.
#[derive(Clone)]
pub struct PipelineCapabilities {
    pub llm: Arc<dyn LlmClient>,
    pub prompts: Arc<dyn PromptStore>,
    pub clock: Arc<dyn Clock>,
    pub progress: Arc<dyn ProgressSink>,
    pub cancel: CancelToken,
}

impl PipelineCapabilities {
    /// Capabilities with a wall clock, silent progress, and a fresh cancel
    /// token.
    #[must_use]
    pub fn new(llm: Arc<dyn LlmClient>, prompts: Arc<dyn PromptStore>) -> Self {
        Self {
            llm,
            prompts,
            clock: Arc::new(MonotonicClock::start()),
            progress: Arc::new(NoopProgress),
            cancel: CancelToken::new(),
        }
    }

    #[must_use]
    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = progress;
        self
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }
}

/// What one step execution reports back to the loop.
struct StepOutcome {
    confidence: f64,
}

/// The orchestrator.
pub struct EvolvedCleaningPipeline {
    config: CleaningConfig,
    reflow: ReflowService,
    retry_policy: Option<crate::llm::RetryPolicy>,
}

impl EvolvedCleaningPipeline {
    #[must_use]
    pub fn new(config: CleaningConfig) -> Self {
        Self {
            config,
            reflow: ReflowService::new(),
            retry_policy: None,
        }
    }

    /// Override the reflow chunking (tests drive small documents).
    #[must_use]
    pub fn with_reflow_service(mut self, reflow: ReflowService) -> Self {
        self.reflow = reflow;
        self
    }

    /// Override the LLM retry policy (embedders with their own retry
    /// layer, and tests that must not wait out real backoff).
    #[must_use]
    pub fn with_retry_policy(mut self, policy: crate::llm::RetryPolicy) -> Self {
        self.retry_policy = Some(policy);
        self
    }

    /// Run the full pipeline over `document_text`.
    ///
    /// # Errors
    ///
    /// [`PipelineError`] for configuration problems only: the legacy-path
    /// flag, an out-of-range option, or a missing prompt template. All
    /// step-level failures are recorded on the result instead.
    #[instrument(skip_all, fields(run_id))]
    pub async fn run(
        &self,
        document_text: &str,
        caps: PipelineCapabilities,
    ) -> Result<PipelineResult, PipelineError> {
        self.validate_config(&caps)?;

        let run_id = crate::telemetry::new_run_id();
        tracing::Span::current().record("run_id", run_id.as_str());
        let started_at = chrono::Utc::now();

        let document = Document::new(document_text);
        let mut ctx = PipelineContext::new(&document);
        let mut runner =
            LlmRunner::new(caps.llm.clone(), self.config.model.clone(), caps.cancel.clone());
        if let Some(policy) = &self.retry_policy {
            runner = runner.with_policy(policy.clone());
        }
        let original_words = ctx.word_count();
        let mut final_review: Option<FinalReview> = None;
        let mut cancelled = false;

        info!(
            lines = document.line_count(),
            words = original_words,
            preset = ?self.config.preset,
            "pipeline run started"
        );

        for step in PipelineStep::ALL {
            let mut record = StepRecord::pending(step);
            record.words_before = ctx.word_count();

            if caps.cancel.is_cancelled() {
                record.status = StepStatus::Cancelled;
                ctx.step_records.push(record);
                cancelled = true;
                break;
            }
            if !self.step_enabled(step) {
                record.status = StepStatus::Skipped;
                record.words_after = record.words_before;
                caps.progress.on_step_complete(step, &record.status);
                ctx.step_records.push(record);
                self.emit_progress(&caps, step);
                continue;
            }

            record.status = StepStatus::Running;
            caps.progress.on_step_start(step, step.phase());
            let step_started = caps.clock.elapsed();
            let snapshot = ctx.working_lines().to_vec();

            let outcome = self
                .execute_step(step, &document, &mut ctx, &runner, &caps, &mut final_review)
                .await;
            record.duration_ms =
                duration_ms(caps.clock.elapsed().saturating_sub(step_started));
            record.words_after = ctx.word_count();

            match outcome {
                Ok(outcome) => {
                    if let Some(reason) =
                        self.word_invariant_violation(step, record.words_before, record.words_after)
                    {
                        warn!(step = %step, %reason, "step rolled back");
                        ctx.replace_working_lines(snapshot);
                        record.words_after = record.words_before;
                        record.status = StepStatus::Failed { reason };
                    } else {
                        self.post_step_advisories(step, &mut ctx, record.words_before);
                        ctx.confidence.record(step, outcome.confidence);
                        record.status = StepStatus::Completed {
                            confidence: outcome.confidence,
                            word_delta: record.words_before.saturating_sub(record.words_after),
                        };
                    }
                }
                Err(err) if err.is_cancelled() => {
                    ctx.replace_working_lines(snapshot);
                    record.words_after = record.words_before;
                    record.status = StepStatus::Cancelled;
                    cancelled = true;
                }
                Err(err) => {
                    warn!(step = %step, error = %err, "step failed; pipeline continues");
                    ctx.replace_working_lines(snapshot);
                    record.words_after = record.words_before;
                    record.status = StepStatus::Failed {
                        reason: err.to_string(),
                    };
                }
            }

            caps.progress.on_step_complete(step, &record.status);
            let stop = matches!(record.status, StepStatus::Cancelled);
            ctx.step_records.push(record);
            self.emit_progress(&caps, step);
            if stop {
                break;
            }
        }

        // Steps never reached stay pending in the record, exactly as the
        // partial-result contract promises.
        for step in PipelineStep::ALL {
            if !ctx.step_records.iter().any(|r| r.step == step) {
                ctx.step_records.push(StepRecord::pending(step));
            }
        }

        let duration_ms = duration_ms(caps.clock.elapsed());
        info!(
            cancelled,
            duration_ms,
            llm_calls = ctx.usage.llm_calls,
            confidence = ctx.confidence.overall(),
            "pipeline run finished"
        );

        Ok(PipelineResult {
            run_id,
            cleaned_content: ctx.working_text(),
            metadata: ctx.metadata.clone().unwrap_or_default(),
            structure_hints: ctx.hints.clone(),
            boundary_result: ctx.boundary.clone(),
            removal_records: ctx.removal_records.clone(),
            phase_confidences: ctx.confidence.phase_means(),
            overall_confidence: ctx.confidence.overall(),
            final_review: final_review.unwrap_or_default(),
            advisories: ctx.advisories.clone(),
            step_records: ctx.step_records.clone(),
            usage: ctx.usage,
            duration_ms,
            cancelled,
            started_at,
        })
    }

    fn validate_config(&self, caps: &PipelineCapabilities) -> Result<(), PipelineError> {
        if !self.config.use_evolved_pipeline {
            return Err(PipelineError::LegacyPathUnsupported);
        }
        if !(0.0..=1.0).contains(&self.config.confidence_threshold) {
            return Err(PipelineError::InvalidConfig {
                message: format!(
                    "confidence_threshold {} outside [0, 1]",
                    self.config.confidence_threshold
                ),
            });
        }
        for name in PromptName::ALL {
            if !caps.prompts.has(name) {
                return Err(PipelineError::Prompt(PromptError::MissingTemplate {
                    name: name.as_str(),
                }));
            }
        }
        Ok(())
    }

    fn step_enabled(&self, step: PipelineStep) -> bool {
        match step {
            PipelineStep::AuxiliaryLists => self.config.remove_auxiliary_lists,
            PipelineStep::Citations => self.config.remove_citations,
            PipelineStep::FootnotesEndnotes => self.config.remove_footnotes_endnotes,
            PipelineStep::Optimize => self.config.optimize_enabled(),
            _ => true,
        }
    }

    async fn execute_step(
        &self,
        step: PipelineStep,
        document: &Document,
        ctx: &mut PipelineContext,
        runner: &LlmRunner,
        caps: &PipelineCapabilities,
        final_review: &mut Option<FinalReview>,
    ) -> Result<StepOutcome, StepError> {
        match step {
            PipelineStep::Reconnaissance => {
                self.run_reconnaissance(document, ctx, runner, caps).await
            }
            PipelineStep::MetadataExtraction => self.run_metadata(document, ctx, runner).await,
            PipelineStep::PageNumbers => self.run_page_numbers(ctx),
            PipelineStep::HeadersFooters => self.run_headers_footers(ctx),
            PipelineStep::FrontMatter => self.run_front_matter(document, ctx),
            PipelineStep::TableOfContents => {
                self.run_heuristic_section(ctx, SectionKind::TableOfContents)
            }
            PipelineStep::BackMatter => self.run_back_matter(document, ctx),
            PipelineStep::Index => self.run_heuristic_section(ctx, SectionKind::Index),
            PipelineStep::AuxiliaryLists => self.run_auxiliary_lists(ctx),
            PipelineStep::Citations => self.run_citations(ctx),
            PipelineStep::FootnotesEndnotes => self.run_footnotes(ctx),
            PipelineStep::Reflow => self.run_reflow(ctx, runner, caps).await,
            PipelineStep::CharacterCleaning => self.run_character_cleaning(ctx),
            PipelineStep::Optimize => self.run_optimize(ctx, runner, caps).await,
            PipelineStep::Assembly => self.run_assembly(ctx),
            PipelineStep::FinalReview => {
                self.run_final_review(ctx, original_word_count(document), runner, caps, final_review)
                    .await
            }
        }
    }

    // ── Phase 0 ────────────────────────────────────────────────────────

    async fn run_reconnaissance(
        &self,
        document: &Document,
        ctx: &mut PipelineContext,
        runner: &LlmRunner,
        caps: &PipelineCapabilities,
    ) -> Result<StepOutcome, StepError> {
        let recon = ReconnaissanceService::new();
        let outcome = recon
            .analyze(document, &self.config, runner, caps.prompts.as_ref())
            .await?;
        ctx.usage.absorb(outcome.usage);
        ctx.advisories.extend(outcome.advisories);
        let confidence = outcome.hints.overall_confidence;
        ctx.hints = Some(outcome.hints);

        let boundaries = BoundaryDetectionService::new();
        let (result, usage) = boundaries
            .detect(document, runner, caps.prompts.as_ref())
            .await?;
        ctx.usage.absorb(usage);
        ctx.boundary = Some(result);

        Ok(StepOutcome { confidence })
    }

    // ── Phase 1 ────────────────────────────────────────────────────────

    async fn run_metadata(
        &self,
        document: &Document,
        ctx: &mut PipelineContext,
        runner: &LlmRunner,
    ) -> Result<StepOutcome, StepError> {
        let front_end = ctx
            .boundary
            .as_ref()
            .and_then(|b| b.front_matter_end_line);
        let outcome = MetadataExtractor::new()
            .extract(document, front_end, runner)
            .await?;
        ctx.usage.absorb(outcome.usage);
        let confidence = if outcome.used_ai { 0.85 } else { 0.40 };
        ctx.metadata = Some(outcome.metadata);
        Ok(StepOutcome { confidence })
    }

    // ── Phase 2 ────────────────────────────────────────────────────────

    fn run_page_numbers(&self, ctx: &mut PipelineContext) -> Result<StepOutcome, StepError> {
        let hints = ctx
            .hints
            .as_ref()
            .map(|h| h.pattern_hints.clone())
            .unwrap_or_default();
        let before_words = ctx.word_count();
        let outcome = PageCleaner::new().remove_page_numbers(ctx.working_lines(), &hints);
        let matches = outcome.matches;
        ctx.replace_working_lines(outcome.lines);
        if matches > 0 {
            ctx.push_removal(RemovalRecord {
                step: PipelineStep::PageNumbers.number(),
                kind: RemovalKind::PageNumbers,
                scope: RemovalScope::Patterns { matches },
                word_delta: before_words.saturating_sub(ctx.word_count()),
                validation_method: ValidationMethod::CodeOnly,
                justification: "page-number-only lines".into(),
                confidence: 0.95,
            });
        }
        Ok(StepOutcome { confidence: 0.95 })
    }

    fn run_headers_footers(&self, ctx: &mut PipelineContext) -> Result<StepOutcome, StepError> {
        let hints = ctx
            .hints
            .as_ref()
            .map(|h| h.pattern_hints.clone())
            .unwrap_or_default();
        let before_words = ctx.word_count();
        let outcome = PageCleaner::new().remove_headers_footers(ctx.working_lines(), &hints);
        let matches = outcome.matches;
        ctx.replace_working_lines(outcome.lines);
        if matches > 0 {
            ctx.push_removal(RemovalRecord {
                step: PipelineStep::HeadersFooters.number(),
                kind: RemovalKind::HeadersFooters,
                scope: RemovalScope::Patterns { matches },
                word_delta: before_words.saturating_sub(ctx.word_count()),
                validation_method: ValidationMethod::CodeOnly,
                justification: "running headers/footers repeated across pages".into(),
                confidence: 0.90,
            });
        }
        Ok(StepOutcome { confidence: 0.90 })
    }

    // ── Phase 3: structural removals ───────────────────────────────────

    fn run_front_matter(
        &self,
        document: &Document,
        ctx: &mut PipelineContext,
    ) -> Result<StepOutcome, StepError> {
        let Some(boundary) = ctx.boundary.clone() else {
            return Ok(StepOutcome { confidence: 0.40 });
        };
        let Some(end_line) = boundary.front_matter_end_line else {
            return Ok(StepOutcome {
                confidence: boundary.front_matter_confidence.max(0.30),
            });
        };
        let end_line = remap_line(document, ctx.working_lines(), end_line);
        let proposal = BoundaryProposal {
            kind: SectionKind::FrontMatter,
            start_line: 0,
            end_line,
            confidence: boundary.front_matter_confidence,
            evidence: boundary.front_evidence.clone(),
        };
        self.gated_removal(ctx, PipelineStep::FrontMatter, proposal, GateMode::AllOf)
    }

    fn run_back_matter(
        &self,
        document: &Document,
        ctx: &mut PipelineContext,
    ) -> Result<StepOutcome, StepError> {
        let Some(boundary) = ctx.boundary.clone() else {
            return Ok(StepOutcome { confidence: 0.40 });
        };
        let Some(start_line) = boundary.back_matter_start_line else {
            return Ok(StepOutcome {
                confidence: boundary.back_matter_confidence.max(0.30),
            });
        };
        let start_line = remap_line(document, ctx.working_lines(), start_line);
        let end_line = ctx.line_count().saturating_sub(1);
        let proposal = BoundaryProposal {
            kind: SectionKind::BackMatter,
            start_line,
            end_line,
            confidence: boundary.back_matter_confidence,
            evidence: boundary.back_evidence.clone(),
        };
        self.gated_removal(ctx, PipelineStep::BackMatter, proposal, GateMode::AllOf)
    }

    /// TOC and index have no dedicated detector in Phase 0; the heuristic
    /// scan is the detection and the defense system still gates it.
    fn run_heuristic_section(
        &self,
        ctx: &mut PipelineContext,
        kind: SectionKind,
    ) -> Result<StepOutcome, StepError> {
        let detector = crate::defense::HeuristicBoundaryDetector::new();
        let Some(candidate) = detector.detect(kind, ctx.working_lines()) else {
            return Ok(StepOutcome { confidence: 0.40 });
        };
        let proposal = BoundaryProposal {
            kind,
            start_line: candidate.start_line,
            end_line: candidate.end_line,
            confidence: candidate.weight,
            evidence: vec![candidate.pattern.to_string()],
        };
        self.gated_removal(ctx, step_for_kind(kind), proposal, GateMode::AllOf)
    }

    /// Run one proposal through the defense system and apply the removal
    /// when approved.
    fn gated_removal(
        &self,
        ctx: &mut PipelineContext,
        step: PipelineStep,
        proposal: BoundaryProposal,
        mode: GateMode,
    ) -> Result<StepOutcome, StepError> {
        let defense = DefenseSystem::new();
        let hints = ctx.hints.clone();
        let outcome = defense.evaluate(&proposal, ctx.working_lines(), hints.as_ref(), mode);

        if outcome.approved {
            let (start, end) = outcome.range.expect("approved outcome carries a range");
            let word_delta = ctx.remove_line_range(start, end);
            ctx.push_removal(RemovalRecord {
                step: step.number(),
                kind: proposal.kind.removal_kind(),
                scope: RemovalScope::Lines { start, end },
                word_delta,
                validation_method: outcome.method.unwrap_or(ValidationMethod::PhaseC),
                justification: outcome.explanation,
                confidence: outcome.confidence,
            });
            Ok(StepOutcome {
                confidence: outcome.confidence,
            })
        } else {
            ctx.push_advisory(Advisory {
                rule: AdvisoryRule::BoundaryWithoutRemoval,
                step: step.number(),
                message: format!(
                    "{} was detected but nothing was removed: {}",
                    proposal.kind, outcome.explanation
                ),
            });
            Ok(StepOutcome {
                confidence: outcome.phase_b.confidence,
            })
        }
    }

    // ── Phase 4: reference cleaning ────────────────────────────────────

    fn run_auxiliary_lists(&self, ctx: &mut PipelineContext) -> Result<StepOutcome, StepError> {
        let proposals = references::detect_auxiliary_lists(ctx.working_lines());
        if proposals.is_empty() {
            return Ok(StepOutcome { confidence: 0.80 });
        }
        let defense = DefenseSystem::new();
        let hints = ctx.hints.clone();
        let mut confidences: Vec<f64> = Vec::new();
        let mut rejected = 0usize;

        // Apply from the last section backwards so earlier removals do not
        // shift the later ranges.
        for proposal in proposals.iter().rev() {
            let outcome =
                defense.evaluate(proposal, ctx.working_lines(), hints.as_ref(), GateMode::AnyOf);
            if outcome.approved {
                let (start, end) = outcome.range.expect("approved outcome carries a range");
                let word_delta = ctx.remove_line_range(start, end);
                ctx.push_removal(RemovalRecord {
                    step: PipelineStep::AuxiliaryLists.number(),
                    kind: RemovalKind::AuxList,
                    scope: RemovalScope::Lines { start, end },
                    word_delta,
                    validation_method: outcome.method.unwrap_or(ValidationMethod::PhaseA),
                    justification: outcome.explanation,
                    confidence: outcome.confidence,
                });
                confidences.push(outcome.confidence);
            } else {
                rejected += 1;
            }
        }
        if rejected > 0 {
            ctx.push_advisory(Advisory {
                rule: AdvisoryRule::ReferencesRejected,
                step: PipelineStep::AuxiliaryLists.number(),
                message: format!(
                    "{rejected} auxiliary list section(s) detected but rejected by validation"
                ),
            });
        }
        let confidence = if confidences.is_empty() {
            0.50
        } else {
            confidences.iter().sum::<f64>() / confidences.len() as f64
        };
        Ok(StepOutcome { confidence })
    }

    fn run_citations(&self, ctx: &mut PipelineContext) -> Result<StepOutcome, StepError> {
        let before_words = ctx.word_count();
        let outcome = references::remove_citations(
            &ctx.working_text(),
            self.config.preserve_code_blocks,
        );
        let matches = outcome.matches;
        ctx.replace_working_text(outcome.text);
        if matches > 0 {
            ctx.push_removal(RemovalRecord {
                step: PipelineStep::Citations.number(),
                kind: RemovalKind::Citations,
                scope: RemovalScope::Patterns { matches },
                word_delta: before_words.saturating_sub(ctx.word_count()),
                validation_method: ValidationMethod::CodeOnly,
                justification: "inline citations in recognised styles".into(),
                confidence: 0.90,
            });
        }
        Ok(StepOutcome { confidence: 0.90 })
    }

    fn run_footnotes(&self, ctx: &mut PipelineContext) -> Result<StepOutcome, StepError> {
        let before_words = ctx.word_count();
        let markers = references::remove_footnote_markers(
            &ctx.working_text(),
            self.config.preserve_code_blocks,
        );
        let marker_matches = markers.matches;
        ctx.replace_working_text(markers.text);

        let proposals = references::detect_notes_sections(ctx.working_lines());
        let defense = DefenseSystem::new();
        let hints = ctx.hints.clone();
        let mut rejected = 0usize;
        for proposal in proposals.iter().rev() {
            let outcome =
                defense.evaluate(proposal, ctx.working_lines(), hints.as_ref(), GateMode::AllOf);
            if outcome.approved {
                let (start, end) = outcome.range.expect("approved outcome carries a range");
                let word_delta = ctx.remove_line_range(start, end);
                ctx.push_removal(RemovalRecord {
                    step: PipelineStep::FootnotesEndnotes.number(),
                    kind: RemovalKind::Footnotes,
                    scope: RemovalScope::Lines { start, end },
                    word_delta,
                    validation_method: outcome.method.unwrap_or(ValidationMethod::PhaseB),
                    justification: outcome.explanation,
                    confidence: outcome.confidence,
                });
            } else {
                rejected += 1;
            }
        }
        if rejected > 0 {
            ctx.push_advisory(Advisory {
                rule: AdvisoryRule::ReferencesRejected,
                step: PipelineStep::FootnotesEndnotes.number(),
                message: format!(
                    "{rejected} notes section(s) detected but rejected by validation"
                ),
            });
        }

        if marker_matches > 0 {
            ctx.push_removal(RemovalRecord {
                step: PipelineStep::FootnotesEndnotes.number(),
                kind: RemovalKind::Footnotes,
                scope: RemovalScope::Patterns {
                    matches: marker_matches,
                },
                word_delta: before_words.saturating_sub(ctx.word_count()),
                validation_method: ValidationMethod::CodeOnly,
                justification: "footnote markers in body text".into(),
                confidence: 0.85,
            });
        }
        Ok(StepOutcome { confidence: 0.85 })
    }

    // ── Phase 6: reflow & optimise ─────────────────────────────────────

    async fn run_reflow(
        &self,
        ctx: &mut PipelineContext,
        runner: &LlmRunner,
        caps: &PipelineCapabilities,
    ) -> Result<StepOutcome, StepError> {
        let flags = ctx.content_flags();
        let outcome = self
            .reflow
            .reflow(
                &ctx.working_text(),
                flags,
                self.config.preserve_code_blocks,
                runner,
                caps.prompts.as_ref(),
            )
            .await?;
        ctx.usage.absorb(outcome.usage);
        let confidence = if outcome.used_ai { 0.85 } else { 0.70 };
        ctx.replace_working_text(outcome.text);
        Ok(StepOutcome { confidence })
    }

    async fn run_optimize(
        &self,
        ctx: &mut PipelineContext,
        runner: &LlmRunner,
        caps: &PipelineCapabilities,
    ) -> Result<StepOutcome, StepError> {
        let outcome = Optimizer::new()
            .optimize(
                &ctx.working_text(),
                self.config.max_paragraph_words,
                self.config.preserve_code_blocks,
                runner,
                caps.prompts.as_ref(),
            )
            .await?;
        ctx.usage.absorb(outcome.usage);
        let confidence = if outcome.used_ai { 0.85 } else { 0.70 };
        ctx.replace_working_text(outcome.text);
        Ok(StepOutcome { confidence })
    }

    // ── Phase 5: character cleaning ────────────────────────────────────

    fn run_character_cleaning(&self, ctx: &mut PipelineContext) -> Result<StepOutcome, StepError> {
        let flags = if self.config.respect_content_flags {
            ctx.content_flags()
        } else {
            Default::default()
        };
        let cleaner = CharacterCleaner::new(
            flags,
            self.config.preserve_code_blocks,
            self.config.preserve_math_symbols,
        );
        let before_words = ctx.word_count();
        let outcome = cleaner.clean(&ctx.working_text());
        let total = outcome.counts.total();
        ctx.replace_working_text(outcome.text);
        if total > 0 {
            ctx.push_removal(RemovalRecord {
                step: PipelineStep::CharacterCleaning.number(),
                kind: RemovalKind::Special,
                scope: RemovalScope::Patterns { matches: total },
                word_delta: before_words.saturating_sub(ctx.word_count()),
                validation_method: ValidationMethod::CodeOnly,
                justification: "character normalisation substeps".into(),
                confidence: 0.95,
            });
        }
        Ok(StepOutcome { confidence: 0.95 })
    }

    // ── Phase 7: assembly ──────────────────────────────────────────────

    fn run_assembly(&self, ctx: &mut PipelineContext) -> Result<StepOutcome, StepError> {
        let metadata = ctx.metadata.clone().unwrap_or_default();
        let hints = ctx.hints.clone();
        let outcome = Assembler::new().assemble(
            &ctx.working_text(),
            &metadata,
            hints.as_ref(),
            &self.config,
        );
        if self.config.chapter_marker_style != ChapterMarkerStyle::None
            && outcome.chapters_marked == 0
        {
            ctx.push_advisory(Advisory {
                rule: AdvisoryRule::MarkersWithoutChapters,
                step: PipelineStep::Assembly.number(),
                message: "chapter markers configured but no chapters were detected".into(),
            });
        }
        ctx.replace_working_text(outcome.text);
        Ok(StepOutcome { confidence: 0.95 })
    }

    // ── Phase 8: final review ──────────────────────────────────────────

    async fn run_final_review(
        &self,
        ctx: &mut PipelineContext,
        original_words: usize,
        runner: &LlmRunner,
        caps: &PipelineCapabilities,
        final_review: &mut Option<FinalReview>,
    ) -> Result<StepOutcome, StepError> {
        let document_type = ctx
            .hints
            .as_ref()
            .map(|h| h.document_type)
            .unwrap_or_default();
        let anomalies = ctx
            .advisories
            .iter()
            .filter(|a| {
                matches!(
                    a.rule,
                    AdvisoryRule::LargeRemoval | AdvisoryRule::ContentGrew
                )
            })
            .count();
        let outcome = FinalReviewer::new()
            .review(
                &ctx.working_text(),
                original_words,
                document_type,
                anomalies,
                runner,
                caps.prompts.as_ref(),
            )
            .await?;
        ctx.usage.absorb(outcome.usage);
        let confidence = outcome.review.score;
        *final_review = Some(outcome.review);
        Ok(StepOutcome { confidence })
    }

    // ── Post-step bookkeeping ──────────────────────────────────────────

    /// Removal steps must never grow the word count; reflow and optimise
    /// must stay within the ±0.5% tolerance or be rolled back.
    fn word_invariant_violation(
        &self,
        step: PipelineStep,
        before: usize,
        after: usize,
    ) -> Option<String> {
        match step {
            PipelineStep::Assembly => None,
            PipelineStep::Reflow | PipelineStep::Optimize => {
                (relative_delta(before, after) > REFLOW_WORD_TOLERANCE).then(|| {
                    format!(
                        "word count moved from {before} to {after}, past the ±0.5% tolerance"
                    )
                })
            }
            _ => (after > before).then(|| {
                format!("word count grew from {before} to {after} in a removal step")
            }),
        }
    }

    fn post_step_advisories(
        &self,
        step: PipelineStep,
        ctx: &mut PipelineContext,
        words_before: usize,
    ) {
        let words_after = ctx.word_count();
        if words_before > 0 && words_after * 2 < words_before {
            ctx.push_advisory(Advisory {
                rule: AdvisoryRule::LargeRemoval,
                step: step.number(),
                message: format!(
                    "step removed more than half of the content ({words_before} -> {words_after} words)"
                ),
            });
        }
        if words_after > words_before && step != PipelineStep::Assembly {
            ctx.push_advisory(Advisory {
                rule: AdvisoryRule::ContentGrew,
                step: step.number(),
                message: format!(
                    "working text grew across the step ({words_before} -> {words_after} words)"
                ),
            });
        }
    }

    fn emit_progress(&self, caps: &PipelineCapabilities, step: PipelineStep) {
        let percent = f64::from(step.number()) / PipelineStep::ALL.len() as f64 * 100.0;
        caps.progress.on_progress(percent, caps.clock.elapsed());
    }
}

fn step_for_kind(kind: SectionKind) -> PipelineStep {
    match kind {
        SectionKind::FrontMatter => PipelineStep::FrontMatter,
        SectionKind::TableOfContents => PipelineStep::TableOfContents,
        SectionKind::BackMatter => PipelineStep::BackMatter,
        SectionKind::Index => PipelineStep::Index,
        SectionKind::AuxiliaryList => PipelineStep::AuxiliaryLists,
        SectionKind::FootnoteSection => PipelineStep::FootnotesEndnotes,
    }
}

fn original_word_count(document: &Document) -> usize {
    crate::textutil::word_count_lines(document.lines())
}

/// Map a line index detected on the original document onto the current
/// working text. Exact content match near the proportional position wins;
/// otherwise the proportional position is used.
fn remap_line(document: &Document, working: &[String], original_idx: usize) -> usize {
    if working.is_empty() {
        return 0;
    }
    let last = working.len() - 1;
    let Some(original_line) = document.line(original_idx) else {
        return last;
    };
    let proportional = if document.line_count() == 0 {
        0
    } else {
        (original_idx * working.len() / document.line_count()).min(last)
    };
    if original_line.trim().is_empty() {
        return proportional;
    }
    // Search outwards from the proportional guess.
    let radius = 200usize;
    let lo = proportional.saturating_sub(radius);
    let hi = (proportional + radius).min(last);
    working[lo..=hi]
        .iter()
        .position(|l| l == original_line)
        .map(|offset| lo + offset)
        .unwrap_or(proportional)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remap_prefers_exact_content_match() {
        let document = Document::new("a\nb\nc\nd\ne");
        // "b" was removed from the working text.
        let working: Vec<String> = ["a", "c", "d", "e"].iter().map(|s| s.to_string()).collect();
        assert_eq!(remap_line(&document, &working, 2), 1);
        assert_eq!(remap_line(&document, &working, 4), 3);
    }

    #[test]
    fn remap_falls_back_to_proportional() {
        let document = Document::new("x\ny\nz");
        let working: Vec<String> = ["p", "q", "r"].iter().map(|s| s.to_string()).collect();
        assert_eq!(remap_line(&document, &working, 1), 1);
    }

    #[test]
    fn kind_to_step_mapping_is_total() {
        for kind in [
            SectionKind::FrontMatter,
            SectionKind::TableOfContents,
            SectionKind::BackMatter,
            SectionKind::Index,
            SectionKind::AuxiliaryList,
            SectionKind::FootnoteSection,
        ] {
            let step = step_for_kind(kind);
            assert!(PipelineStep::ALL.contains(&step));
        }
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
