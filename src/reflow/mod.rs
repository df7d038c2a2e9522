//! Phase 6: paragraph reflow and length optimisation.
//!
//! Reflow repairs paragraphs broken by pagination. Verse is detected up
//! front and shielded from the model entirely; the rest goes through the
//! LLM in overlapping chunks, each guarded by a word-count verifier. A
//! chunk whose reflowed word count drifts more than ±0.5% is discarded in
//! favour of the deterministic rejoin, so the step can never lose content.
//!
//! Optimisation splits paragraphs longer than the configured maximum at
//! topical boundaries, under a ±1% per-paragraph word invariant; on any
//! doubt the paragraph is left untouched.

pub mod chunking;
pub mod paragraphs;

use tracing::{debug, warn};

use crate::cleaning::shield::Shield;
use crate::error::StepError;
use crate::llm::{CallDeadline, LlmCallError, LlmRunner};
use crate::prompts::{PromptName, PromptStore};
use crate::textutil::{relative_delta, word_count};
use crate::types::{ContentFlags, UsageTotals};

use chunking::{CHUNK_OVERLAP_LINES, CHUNK_TARGET_LINES, merge_chunks, split_chunks};
use paragraphs::{Block, deterministic_rejoin, is_poetry_block, join_blocks, split_blocks};

/// Reflow tolerance: ±0.5% of the chunk's input word count.
pub const REFLOW_WORD_TOLERANCE: f64 = 0.005;
/// Optimisation tolerance: ±1% of the paragraph's word count.
pub const OPTIMIZE_WORD_TOLERANCE: f64 = 0.01;

// ── Reflow ─────────────────────────────────────────────────────────────

/// Outcome of the reflow step.
#[derive(Debug, Clone)]
pub struct ReflowOutcome {
    pub text: String,
    pub used_ai: bool,
    /// Chunks that failed verification and fell back to the deterministic
    /// rejoin.
    pub fallback_chunks: usize,
    pub poetry_blocks: usize,
    pub usage: UsageTotals,
}

/// Chunked LLM reflow with verse shielding and word-count verification.
#[derive(Debug, Clone)]
pub struct ReflowService {
    chunk_target: usize,
    chunk_overlap: usize,
}

impl Default for ReflowService {
    fn default() -> Self {
        Self {
            chunk_target: CHUNK_TARGET_LINES,
            chunk_overlap: CHUNK_OVERLAP_LINES,
        }
    }
}

impl ReflowService {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Smaller chunks for tests.
    #[must_use]
    pub fn with_chunking(mut self, target: usize, overlap: usize) -> Self {
        self.chunk_target = target.max(1);
        self.chunk_overlap = overlap.min(target.saturating_sub(1));
        self
    }

    /// Reflow the working text.
    ///
    /// # Errors
    ///
    /// Only [`StepError::Cancelled`].
    pub async fn reflow(
        &self,
        text: &str,
        flags: ContentFlags,
        preserve_code: bool,
        runner: &LlmRunner,
        prompts: &dyn PromptStore,
    ) -> Result<ReflowOutcome, StepError> {
        let mut usage = UsageTotals::default();
        let mut shield = Shield::new();
        let masked = shield.extract_blocks(text, preserve_code, true);

        // Verse never reaches the model; each poem becomes one opaque token.
        let mut poetry_blocks = 0usize;
        let blocks: Vec<Block> = split_blocks(&masked)
            .into_iter()
            .map(|block| {
                if is_poetry_block(&block) {
                    poetry_blocks += 1;
                    Block {
                        lines: vec![shield.shield_span("POEM", block.text())],
                    }
                } else {
                    block
                }
            })
            .collect();
        let masked = join_blocks(&blocks);
        let input_words = word_count(&masked);

        // A document flagged as poetry overall skips the model entirely.
        if flags.poetry {
            debug!(poetry_blocks, "poetry document; deterministic reflow only");
            let rejoined = deterministic_rejoin(&masked);
            return Ok(ReflowOutcome {
                text: shield.restore(&rejoined),
                used_ai: false,
                fallback_chunks: 0,
                poetry_blocks,
                usage,
            });
        }

        let lines: Vec<String> = masked.split('\n').map(str::to_string).collect();
        let chunks = split_chunks(&lines, self.chunk_target, self.chunk_overlap);
        let mut outputs: Vec<String> = Vec::with_capacity(chunks.len());
        let mut fallback_chunks = 0usize;
        let mut used_ai = false;

        for chunk in &chunks {
            match self
                .reflow_chunk(&chunk.text, runner, prompts, &mut usage)
                .await
            {
                Ok(Some(reflowed)) => {
                    used_ai = true;
                    outputs.push(reflowed);
                }
                Ok(None) => {
                    fallback_chunks += 1;
                    outputs.push(deterministic_rejoin(&chunk.text));
                }
                Err(err) if err.is_cancelled() => return Err(StepError::Cancelled),
                Err(err) => {
                    warn!(error = %err, "reflow chunk degraded to deterministic rejoin");
                    fallback_chunks += 1;
                    outputs.push(deterministic_rejoin(&chunk.text));
                }
            }
        }

        let mut merged = merge_chunks(&outputs, self.chunk_overlap);
        // Whole-step guard: any residual drift from seam merging rolls the
        // step back to the deterministic path.
        if relative_delta(input_words, word_count(&merged)) > REFLOW_WORD_TOLERANCE {
            warn!("reflow output drifted past tolerance; rolled back to deterministic rejoin");
            merged = deterministic_rejoin(&masked);
            used_ai = false;
        }

        Ok(ReflowOutcome {
            text: shield.restore(&merged),
            used_ai,
            fallback_chunks,
            poetry_blocks,
            usage,
        })
    }

    /// One chunk through the model; `Ok(None)` means verification failed.
    async fn reflow_chunk(
        &self,
        chunk: &str,
        runner: &LlmRunner,
        prompts: &dyn PromptStore,
        usage: &mut UsageTotals,
    ) -> Result<Option<String>, StepError> {
        let mut variables = rustc_hash::FxHashMap::default();
        variables.insert("chunk".to_string(), chunk.to_string());
        let prompt = prompts
            .render(PromptName::ParagraphReflowV1, &variables)
            .map_err(|e| StepError::Processing {
                message: e.to_string(),
            })?;

        let reply = runner
            .complete(
                runner
                    .request("You reflow paginated text without changing any words.", prompt)
                    .max_tokens(8192),
                CallDeadline::Extended,
            )
            .await
            .map_err(|e| match e {
                LlmCallError::Cancelled => StepError::Cancelled,
                LlmCallError::Llm(err) => StepError::Llm(err),
            })?;
        usage.record_call(reply.usage.input_tokens, reply.usage.output_tokens);

        let input_words = word_count(chunk);
        let output_words = word_count(&reply.text);
        if relative_delta(input_words, output_words) <= REFLOW_WORD_TOLERANCE {
            Ok(Some(reply.text))
        } else {
            debug!(
                input_words,
                output_words, "reflow chunk failed word-count verification"
            );
            Ok(None)
        }
    }
}

// ── Optimise ───────────────────────────────────────────────────────────

/// Outcome of the paragraph-length optimisation step.
#[derive(Debug, Clone)]
pub struct OptimizeOutcome {
    pub text: String,
    pub split_paragraphs: usize,
    pub used_ai: bool,
    pub usage: UsageTotals,
}

/// Splits over-long paragraphs at topical boundaries.
#[derive(Debug, Clone, Copy, Default)]
pub struct Optimizer;

impl Optimizer {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Split paragraphs longer than `max_words`.
    ///
    /// # Errors
    ///
    /// Only [`StepError::Cancelled`].
    pub async fn optimize(
        &self,
        text: &str,
        max_words: usize,
        preserve_code: bool,
        runner: &LlmRunner,
        prompts: &dyn PromptStore,
    ) -> Result<OptimizeOutcome, StepError> {
        let mut usage = UsageTotals::default();
        if max_words == 0 {
            return Ok(OptimizeOutcome {
                text: text.to_string(),
                split_paragraphs: 0,
                used_ai: false,
                usage,
            });
        }

        let mut shield = Shield::new();
        let masked = shield.extract_blocks(text, preserve_code, true);
        let blocks = split_blocks(&masked);
        let mut out_blocks: Vec<String> = Vec::with_capacity(blocks.len());
        let mut split_paragraphs = 0usize;
        let mut used_ai = false;

        for block in &blocks {
            let words = block.word_count();
            if words <= max_words || is_poetry_block(block) {
                out_blocks.push(block.text());
                continue;
            }
            match self
                .split_paragraph(&block.text(), words, max_words, runner, prompts, &mut usage)
                .await
            {
                Ok(Some(split)) => {
                    used_ai = true;
                    split_paragraphs += 1;
                    out_blocks.push(split);
                }
                Ok(None) => out_blocks.push(block.text()),
                Err(err) if err.is_cancelled() => return Err(StepError::Cancelled),
                Err(err) => {
                    warn!(error = %err, "paragraph optimisation left paragraph untouched");
                    out_blocks.push(block.text());
                }
            }
        }

        Ok(OptimizeOutcome {
            text: shield.restore(&out_blocks.join("\n\n")),
            split_paragraphs,
            used_ai,
            usage,
        })
    }

    async fn split_paragraph(
        &self,
        paragraph: &str,
        words: usize,
        max_words: usize,
        runner: &LlmRunner,
        prompts: &dyn PromptStore,
        usage: &mut UsageTotals,
    ) -> Result<Option<String>, StepError> {
        let mut variables = rustc_hash::FxHashMap::default();
        variables.insert("paragraph".to_string(), paragraph.to_string());
        variables.insert("word_count".to_string(), words.to_string());
        variables.insert("max_words".to_string(), max_words.to_string());
        let prompt = prompts
            .render(PromptName::ParagraphOptimizationV1, &variables)
            .map_err(|e| StepError::Processing {
                message: e.to_string(),
            })?;

        let reply = runner
            .complete(
                runner
                    .request(
                        "You split long paragraphs at topical boundaries without changing any words.",
                        prompt,
                    )
                    .max_tokens(4096),
                CallDeadline::Extended,
            )
            .await
            .map_err(|e| match e {
                LlmCallError::Cancelled => StepError::Cancelled,
                LlmCallError::Llm(err) => StepError::Llm(err),
            })?;
        usage.record_call(reply.usage.input_tokens, reply.usage.output_tokens);

        let output_words = word_count(&reply.text);
        let within_tolerance = relative_delta(words, output_words) <= OPTIMIZE_WORD_TOLERANCE;
        let actually_split = split_blocks(&reply.text).len() > 1;
        Ok((within_tolerance && actually_split).then(|| reply.text.trim().to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tolerances_are_the_specified_constants() {
        assert_eq!(REFLOW_WORD_TOLERANCE, 0.005);
        assert_eq!(OPTIMIZE_WORD_TOLERANCE, 0.01);
    }
}
