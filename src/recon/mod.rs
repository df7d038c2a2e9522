//! Phase 0: LLM-driven document-structure reconnaissance.
//!
//! One bounded LLM call over a three-region sample yields
//! [`StructureHints`]; any failure (provider error, timeout, unparsable
//! JSON) degrades to a deterministic heuristic with a 0.30 confidence
//! floor. The phase never fails a run; only cancellation escapes.

pub mod boundary;
pub mod sampling;

pub use boundary::BoundaryDetectionService;

use serde_json::Value;
use tracing::{debug, warn};

use crate::config::CleaningConfig;
use crate::document::Document;
use crate::error::StepError;
use crate::llm::json_repair::{clamp_confidence, parse_lenient, value_as_f64, value_as_usize};
use crate::llm::{CallDeadline, LlmCallError, LlmRunner};
use crate::patterns::CHAPTER_INDICATOR;
use crate::prompts::{PromptName, PromptStore};
use crate::types::{
    Advisory, AdvisoryRule, ChapterHint, ContentFlags, DocumentType, PatternHints, StructureHints,
    UsageTotals,
};

/// Confidence assigned when the heuristic fallback produced the hints.
pub const FALLBACK_CONFIDENCE_FLOOR: f64 = 0.30;

/// What reconnaissance hands back to the orchestrator.
#[derive(Debug, Clone)]
pub struct ReconnaissanceOutcome {
    pub hints: StructureHints,
    pub usage: UsageTotals,
    pub advisories: Vec<Advisory>,
}

/// LLM-driven structure analysis with heuristic fallback.
#[derive(Debug, Default)]
pub struct ReconnaissanceService;

impl ReconnaissanceService {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Analyse the document's structure.
    ///
    /// # Errors
    ///
    /// Only [`StepError::Cancelled`]; every other failure falls back to the
    /// heuristic path.
    pub async fn analyze(
        &self,
        document: &Document,
        config: &CleaningConfig,
        runner: &LlmRunner,
        prompts: &dyn PromptStore,
    ) -> Result<ReconnaissanceOutcome, StepError> {
        let mut usage = UsageTotals::default();
        let sample = sampling::region_sample(document);

        let mut variables = rustc_hash::FxHashMap::default();
        variables.insert("line_count".to_string(), document.line_count().to_string());
        variables.insert("head_sample".to_string(), sample.head);
        variables.insert("mid_sample".to_string(), sample.mid);
        variables.insert("tail_sample".to_string(), sample.tail);

        let hints = match self
            .ask_model(&variables, runner, prompts, &mut usage)
            .await
        {
            Ok(hints) => hints,
            Err(StepError::Cancelled) => return Err(StepError::Cancelled),
            Err(err) => {
                warn!(error = %err, "structure analysis degraded to heuristic fallback");
                heuristic_hints(document)
            }
        };

        let mut advisories = Vec::new();
        if let Some(expected) = config.expected_document_type {
            if hints.used_ai && expected != hints.document_type {
                advisories.push(Advisory {
                    rule: AdvisoryRule::ContentTypeMismatch,
                    step: 1,
                    message: format!(
                        "detected content type {} does not match selected {expected}",
                        hints.document_type
                    ),
                });
            }
        }

        Ok(ReconnaissanceOutcome {
            hints,
            usage,
            advisories,
        })
    }

    async fn ask_model(
        &self,
        variables: &rustc_hash::FxHashMap<String, String>,
        runner: &LlmRunner,
        prompts: &dyn PromptStore,
        usage: &mut UsageTotals,
    ) -> Result<StructureHints, StepError> {
        let prompt = prompts
            .render(PromptName::StructureAnalysisV1, variables)
            .map_err(|e| StepError::Processing {
                message: e.to_string(),
            })?;

        let reply = runner
            .complete(
                runner
                    .request(
                        "You are a precise document-structure analyst. Respond only with JSON.",
                        prompt,
                    )
                    .max_tokens(2048),
                CallDeadline::Reconnaissance,
            )
            .await
            .map_err(|e| match e {
                LlmCallError::Cancelled => StepError::Cancelled,
                LlmCallError::Llm(err) => StepError::Llm(err),
            })?;
        usage.record_call(reply.usage.input_tokens, reply.usage.output_tokens);

        let value = parse_lenient(&reply.text).ok_or_else(|| StepError::Parse {
            context: "structure analysis response".into(),
        })?;
        Ok(parse_structure_hints(&value))
    }
}

/// Map the model's JSON into [`StructureHints`], coercing and clamping.
fn parse_structure_hints(value: &Value) -> StructureHints {
    let document_type = value
        .get("documentType")
        .and_then(Value::as_str)
        .map(parse_document_type)
        .unwrap_or_default();

    let chapters: Vec<ChapterHint> = value
        .get("chapters")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| {
                    let name = item.get("name")?.as_str()?.trim().to_string();
                    let start_line = item.get("startLine").and_then(value_as_usize)?;
                    let confidence = item
                        .get("confidence")
                        .and_then(value_as_f64)
                        .map(clamp_confidence)
                        .unwrap_or(0.5);
                    Some(ChapterHint {
                        name,
                        start_line,
                        confidence,
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    let content_flags = value
        .get("contentFlags")
        .map(parse_content_flags)
        .unwrap_or_default();

    let pattern_hints = value
        .get("patternHints")
        .map(|hints| PatternHints {
            page_number_regex: hints
                .get("pageNumberRegex")
                .and_then(Value::as_str)
                .map(str::to_string),
            header_patterns: string_list(hints.get("headerPatterns")),
            footer_patterns: string_list(hints.get("footerPatterns")),
        })
        .unwrap_or_default();

    let overall_confidence = value
        .get("overallConfidence")
        .and_then(value_as_f64)
        .map(clamp_confidence)
        .unwrap_or(FALLBACK_CONFIDENCE_FLOOR)
        .max(FALLBACK_CONFIDENCE_FLOOR);

    debug!(
        %document_type,
        chapters = chapters.len(),
        confidence = overall_confidence,
        "structure analysis parsed"
    );

    StructureHints {
        document_type,
        chapters,
        content_flags,
        pattern_hints,
        overall_confidence,
        used_ai: true,
    }
}

fn parse_document_type(raw: &str) -> DocumentType {
    match raw.trim().to_lowercase().replace(['-', ' '], "_").as_str() {
        "fiction" => DocumentType::Fiction,
        "non_fiction" | "nonfiction" => DocumentType::NonFiction,
        "academic" => DocumentType::Academic,
        "technical" => DocumentType::Technical,
        "poetry" => DocumentType::Poetry,
        _ => DocumentType::Unknown,
    }
}

fn parse_content_flags(value: &Value) -> ContentFlags {
    let flag = |key: &str| value.get(key).and_then(Value::as_bool).unwrap_or(false);
    ContentFlags {
        poetry: flag("poetry"),
        dialogue: flag("dialogue"),
        code: flag("code"),
        tables: flag("tables"),
        math: flag("math"),
        academic: flag("academic"),
        footnotes: flag("footnotes"),
    }
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Deterministic fallback: chapter headings by regex, flags by shape.
#[must_use]
pub fn heuristic_hints(document: &Document) -> StructureHints {
    let mut chapters = Vec::new();
    for (idx, line) in document.lines().iter().enumerate() {
        if CHAPTER_INDICATOR.is_match(line) {
            chapters.push(ChapterHint {
                name: line.trim().trim_start_matches('#').trim().to_string(),
                start_line: idx,
                confidence: 0.5,
            });
        }
    }

    let has_fences = document.lines().iter().any(|l| l.trim_start().starts_with("```"));
    let table_lines = document
        .lines()
        .iter()
        .filter(|l| {
            let t = l.trim();
            t.starts_with('|') && t.ends_with('|') && t.len() > 2
        })
        .count();

    StructureHints {
        document_type: DocumentType::Unknown,
        chapters,
        content_flags: ContentFlags {
            code: has_fences,
            tables: table_lines >= 3,
            ..Default::default()
        },
        pattern_hints: PatternHints::default(),
        overall_confidence: FALLBACK_CONFIDENCE_FLOOR,
        used_ai: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_full_response() {
        let value = json!({
            "documentType": "fiction",
            "chapters": [
                {"name": "Chapter One", "startLine": "14", "confidence": "0.9"},
                {"name": 7, "startLine": 20}
            ],
            "contentFlags": {"poetry": true, "code": false},
            "patternHints": {"pageNumberRegex": "^\\d+$", "headerPatterns": ["THE BOOK"]},
            "overallConfidence": "1.4"
        });
        let hints = parse_structure_hints(&value);
        assert_eq!(hints.document_type, DocumentType::Fiction);
        // The malformed second chapter entry is dropped, not invented.
        assert_eq!(hints.chapters.len(), 1);
        assert_eq!(hints.chapters[0].start_line, 14);
        assert!(hints.content_flags.poetry);
        assert_eq!(hints.overall_confidence, 1.0);
        assert!(hints.used_ai);
    }

    #[test]
    fn confidence_never_drops_below_floor() {
        let hints = parse_structure_hints(&json!({"overallConfidence": 0.1}));
        assert_eq!(hints.overall_confidence, FALLBACK_CONFIDENCE_FLOOR);
    }

    #[test]
    fn heuristic_fallback_finds_chapters() {
        let document = Document::new(
            "Title Page\nCopyright 2020\n\nChapter 1\ntext here\n\nChapter 2\nmore text",
        );
        let hints = heuristic_hints(&document);
        assert_eq!(hints.chapters.len(), 2);
        assert_eq!(hints.chapters[0].start_line, 3);
        assert!(!hints.used_ai);
        assert_eq!(hints.overall_confidence, FALLBACK_CONFIDENCE_FLOOR);
    }
}
