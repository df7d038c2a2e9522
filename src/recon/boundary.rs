//! Front/back-matter boundary detection.
//!
//! Two LLM calls — one over a numbered head excerpt, one over a numbered
//! tail excerpt — run in parallel. A boundary whose call fails or whose
//! confidence lands under 0.60 falls back independently to the
//! deterministic heuristic detector, marking `fallback_used` and clearing
//! `used_ai` for the run when no boundary came from the model.

use serde_json::Value;
use tracing::warn;

use crate::defense::HeuristicBoundaryDetector;
use crate::document::Document;
use crate::error::StepError;
use crate::llm::json_repair::{clamp_confidence, parse_lenient, value_as_f64, value_as_usize};
use crate::llm::{CallDeadline, LlmCallError, LlmReply, LlmRunner};
use crate::prompts::{PromptName, PromptStore};
use crate::types::{BoundaryResult, UsageTotals};

/// Excerpt budget per boundary call, matching the region-sample budget.
const EXCERPT_CHAR_BUDGET: usize = 3000;

/// Minimum model confidence; below it the heuristic takes over.
pub const BOUNDARY_CONFIDENCE_THRESHOLD: f64 = 0.60;

/// One side's detection before merging.
#[derive(Debug, Clone)]
struct SideResult {
    line: Option<usize>,
    confidence: f64,
    evidence: Vec<String>,
    used_ai: bool,
    fallback_used: bool,
}

/// LLM boundary detection with per-side heuristic fallback.
#[derive(Debug, Default)]
pub struct BoundaryDetectionService {
    heuristic: HeuristicBoundaryDetector,
}

impl BoundaryDetectionService {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Detect both boundaries, issuing the two LLM calls in parallel.
    ///
    /// # Errors
    ///
    /// Only [`StepError::Cancelled`]; provider failures fall back.
    pub async fn detect(
        &self,
        document: &Document,
        runner: &LlmRunner,
        prompts: &dyn PromptStore,
    ) -> Result<(BoundaryResult, UsageTotals), StepError> {
        let mut usage = UsageTotals::default();
        let line_count = document.line_count();

        let front_call = self.ask_side(document, runner, prompts, Side::Front);
        let back_call = self.ask_side(document, runner, prompts, Side::Back);
        let (front_raw, back_raw) = futures_util::join!(front_call, back_call);

        let front = self.resolve_side(document, Side::Front, front_raw, &mut usage)?;
        let back = self.resolve_side(document, Side::Back, back_raw, &mut usage)?;

        let mut result = BoundaryResult {
            front_matter_end_line: front.line,
            back_matter_start_line: back.line,
            front_matter_confidence: front.confidence,
            back_matter_confidence: back.confidence,
            front_evidence: front.evidence,
            back_evidence: back.evidence,
            used_ai: front.used_ai || back.used_ai,
            fallback_used: front.fallback_used || back.fallback_used,
        };

        // Invariant: when both boundaries exist, front < back. Drop the
        // weaker side on conflict rather than guessing.
        if let (Some(f), Some(b)) = (result.front_matter_end_line, result.back_matter_start_line) {
            if f >= b {
                if result.front_matter_confidence >= result.back_matter_confidence {
                    result.back_matter_start_line = None;
                } else {
                    result.front_matter_end_line = None;
                }
            }
        }
        if let Some(f) = result.front_matter_end_line {
            if f >= line_count {
                result.front_matter_end_line = Some(line_count.saturating_sub(1));
            }
        }
        if let Some(b) = result.back_matter_start_line {
            if b >= line_count {
                result.back_matter_start_line = None;
            }
        }

        Ok((result, usage))
    }

    async fn ask_side(
        &self,
        document: &Document,
        runner: &LlmRunner,
        prompts: &dyn PromptStore,
        side: Side,
    ) -> Result<LlmReply, SideError> {
        let (name, excerpt) = match side {
            Side::Front => (
                PromptName::FrontMatterBoundaryV1,
                super::sampling::head_excerpt(document, EXCERPT_CHAR_BUDGET),
            ),
            Side::Back => (
                PromptName::BackMatterBoundaryV1,
                super::sampling::tail_excerpt(document, EXCERPT_CHAR_BUDGET),
            ),
        };

        let mut variables = rustc_hash::FxHashMap::default();
        variables.insert("line_count".to_string(), document.line_count().to_string());
        variables.insert("excerpt".to_string(), excerpt);
        let prompt = prompts
            .render(name, &variables)
            .map_err(|e| SideError::Degraded(e.to_string()))?;

        runner
            .complete(
                runner
                    .request(
                        "You locate structural boundaries in documents. Respond only with JSON.",
                        prompt,
                    )
                    .max_tokens(1024),
                CallDeadline::Standard,
            )
            .await
            .map_err(|e| match e {
                LlmCallError::Cancelled => SideError::Cancelled,
                LlmCallError::Llm(err) => SideError::Degraded(err.to_string()),
            })
    }

    fn resolve_side(
        &self,
        document: &Document,
        side: Side,
        raw: Result<LlmReply, SideError>,
        usage: &mut UsageTotals,
    ) -> Result<SideResult, StepError> {
        let parsed = match raw {
            Ok(reply) => {
                usage.record_call(reply.usage.input_tokens, reply.usage.output_tokens);
                parse_boundary(&reply.text, side)
            }
            Err(SideError::Cancelled) => return Err(StepError::Cancelled),
            Err(SideError::Degraded(reason)) => {
                warn!(side = side.label(), %reason, "boundary call degraded");
                None
            }
        };

        match parsed {
            Some((line, confidence, evidence))
                if confidence >= BOUNDARY_CONFIDENCE_THRESHOLD =>
            {
                Ok(SideResult {
                    line,
                    confidence,
                    evidence,
                    used_ai: true,
                    fallback_used: false,
                })
            }
            other => {
                if let Some((_, confidence, _)) = other {
                    warn!(
                        side = side.label(),
                        confidence, "boundary confidence under threshold; using heuristic"
                    );
                }
                Ok(self.heuristic_side(document, side))
            }
        }
    }

    fn heuristic_side(&self, document: &Document, side: Side) -> SideResult {
        let lines = document.lines();
        let candidate = match side {
            Side::Front => self.heuristic.front_matter_end(lines),
            Side::Back => self.heuristic.back_matter_start(lines),
        };
        match candidate {
            Some(c) => SideResult {
                line: Some(match side {
                    Side::Front => c.end_line,
                    Side::Back => c.start_line,
                }),
                confidence: c.weight,
                evidence: vec![format!("heuristic: {}", c.pattern)],
                used_ai: false,
                fallback_used: true,
            },
            None => SideResult {
                line: None,
                confidence: crate::recon::FALLBACK_CONFIDENCE_FLOOR,
                evidence: Vec::new(),
                used_ai: false,
                fallback_used: true,
            },
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Side {
    Front,
    Back,
}

impl Side {
    fn label(&self) -> &'static str {
        match self {
            Side::Front => "front",
            Side::Back => "back",
        }
    }
}

#[derive(Debug)]
enum SideError {
    Cancelled,
    Degraded(String),
}

/// Parse one boundary response into `(line, confidence, evidence)`.
fn parse_boundary(text: &str, side: Side) -> Option<(Option<usize>, f64, Vec<String>)> {
    let value = parse_lenient(text)?;
    let key = match side {
        Side::Front => "frontMatterEndLine",
        Side::Back => "backMatterStartLine",
    };
    let line = match value.get(key) {
        None => return None,
        Some(Value::Null) => None,
        Some(v) => Some(value_as_usize(v)?),
    };
    let confidence = value
        .get("confidence")
        .and_then(value_as_f64)
        .map(clamp_confidence)
        .unwrap_or(0.0);
    let evidence = value
        .get("evidence")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    Some((line, confidence, evidence))
}
