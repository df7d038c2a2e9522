//! Shared value types flowing through the cleaning pipeline.
//!
//! Everything here is a plain serde-friendly value type: analysis results
//! from reconnaissance, boundary decisions, removal bookkeeping, and the
//! final result envelope returned to embedders.

use chrono::{DateTime, Utc};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

// ── Document analysis ──────────────────────────────────────────────────

/// Broad classification of the document produced by reconnaissance.
///
/// Drives content-type-aware behaviour downstream: reduction expectations
/// in the final review and reflow caution for poetry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    Fiction,
    NonFiction,
    Academic,
    Technical,
    Poetry,
    #[default]
    Unknown,
}

impl DocumentType {
    /// Expected word-count reduction band for a clean run, as fractions.
    #[must_use]
    pub fn expected_reduction(&self) -> (f64, f64) {
        match self {
            DocumentType::Fiction => (0.10, 0.25),
            DocumentType::NonFiction => (0.15, 0.35),
            DocumentType::Academic => (0.30, 0.50),
            DocumentType::Technical => (0.10, 0.20),
            DocumentType::Poetry => (0.0, 0.10),
            DocumentType::Unknown => (0.05, 0.50),
        }
    }
}

impl std::fmt::Display for DocumentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DocumentType::Fiction => write!(f, "fiction"),
            DocumentType::NonFiction => write!(f, "non_fiction"),
            DocumentType::Academic => write!(f, "academic"),
            DocumentType::Technical => write!(f, "technical"),
            DocumentType::Poetry => write!(f, "poetry"),
            DocumentType::Unknown => write!(f, "unknown"),
        }
    }
}

/// Content characteristics detected during reconnaissance or metadata
/// extraction. Flags constrain later transformations: poetry preserves
/// line breaks, code and math shield characters from repair passes.
#[allow(clippy::struct_excessive_bools)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct ContentFlags {
    pub poetry: bool,
    pub dialogue: bool,
    pub code: bool,
    pub tables: bool,
    pub math: bool,
    pub academic: bool,
    pub footnotes: bool,
}

impl ContentFlags {
    /// True when any flag requiring shielding behaviour is set.
    #[must_use]
    pub fn needs_shielding(&self) -> bool {
        self.code || self.tables || self.math
    }
}

/// A chapter heading detected during reconnaissance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChapterHint {
    pub name: String,
    /// 0-based line index into the document at detection time.
    pub start_line: usize,
    pub confidence: f64,
}

/// Regex hints surfaced by the structure analysis for page furniture.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatternHints {
    pub page_number_regex: Option<String>,
    pub header_patterns: Vec<String>,
    pub footer_patterns: Vec<String>,
}

/// Document-structure analysis produced by Phase 0.
///
/// `overall_confidence` is clamped to `[0, 1]` and never drops below the
/// 0.30 heuristic-fallback floor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructureHints {
    pub document_type: DocumentType,
    pub chapters: Vec<ChapterHint>,
    pub content_flags: ContentFlags,
    pub pattern_hints: PatternHints,
    pub overall_confidence: f64,
    /// Whether the hints came from the LLM or the heuristic fallback.
    pub used_ai: bool,
}

impl Default for StructureHints {
    fn default() -> Self {
        Self {
            document_type: DocumentType::Unknown,
            chapters: Vec::new(),
            content_flags: ContentFlags::default(),
            pattern_hints: PatternHints::default(),
            overall_confidence: crate::recon::FALLBACK_CONFIDENCE_FLOOR,
            used_ai: false,
        }
    }
}

// ── Boundary detection ─────────────────────────────────────────────────

/// Front/back-matter boundary decision produced by Phase 0.
///
/// If both lines are set, `front_matter_end_line < back_matter_start_line`;
/// both are within `[0, line_count]`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoundaryResult {
    /// Last line (0-based, inclusive) of front matter, if any was detected.
    pub front_matter_end_line: Option<usize>,
    /// First line (0-based, inclusive) of back matter, if any was detected.
    pub back_matter_start_line: Option<usize>,
    pub front_matter_confidence: f64,
    pub back_matter_confidence: f64,
    pub front_evidence: Vec<String>,
    pub back_evidence: Vec<String>,
    /// True when at least one boundary came from the LLM.
    pub used_ai: bool,
    /// True when at least one boundary fell back to the heuristic detector.
    pub fallback_used: bool,
}

// ── Metadata ───────────────────────────────────────────────────────────

/// Bibliographic metadata extracted from the front-matter window.
///
/// String fields are trimmed; missing fields stay `None`. Dates are kept
/// as ISO-8601 strings where they could be recognised.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Metadata {
    pub title: Option<String>,
    pub subtitle: Option<String>,
    pub author: Option<String>,
    pub publisher: Option<String>,
    pub publish_date: Option<String>,
    pub isbn: Option<String>,
    pub language: Option<String>,
    pub genre: Option<String>,
    pub series: Option<String>,
    pub edition: Option<String>,
    pub content_flags: ContentFlags,
}

impl Metadata {
    /// Title for display, falling back to a placeholder when extraction
    /// found nothing.
    #[must_use]
    pub fn display_title(&self) -> &str {
        self.title.as_deref().unwrap_or("Untitled Document")
    }
}

// ── Removal bookkeeping ────────────────────────────────────────────────

/// What category of scaffolding a removal targeted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemovalKind {
    FrontMatter,
    BackMatter,
    Toc,
    Index,
    AuxList,
    Citations,
    Footnotes,
    PageNumbers,
    HeadersFooters,
    Special,
}

impl std::fmt::Display for RemovalKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            RemovalKind::FrontMatter => "front_matter",
            RemovalKind::BackMatter => "back_matter",
            RemovalKind::Toc => "toc",
            RemovalKind::Index => "index",
            RemovalKind::AuxList => "aux_list",
            RemovalKind::Citations => "citations",
            RemovalKind::Footnotes => "footnotes",
            RemovalKind::PageNumbers => "page_numbers",
            RemovalKind::HeadersFooters => "headers_footers",
            RemovalKind::Special => "special",
        };
        write!(f, "{label}")
    }
}

/// Which layer of the defense system authorised a removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationMethod {
    /// Quantitative boundary validation (Phase A).
    PhaseA,
    /// Qualitative content verification (Phase B).
    PhaseB,
    /// Heuristic fallback detection (Phase C).
    PhaseC,
    /// Pure pattern transform, no boundary proposal involved.
    CodeOnly,
}

/// Extent of a removal: either a line range or a pattern match count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "scope")]
pub enum RemovalScope {
    /// Inclusive 0-based range within the step's input working text.
    Lines { start: usize, end: usize },
    /// Number of pattern matches replaced or deleted.
    Patterns { matches: usize },
}

/// One applied removal, appended per step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemovalRecord {
    pub step: u8,
    pub kind: RemovalKind,
    #[serde(flatten)]
    pub scope: RemovalScope,
    /// Words removed by this step; never negative.
    pub word_delta: usize,
    pub validation_method: ValidationMethod,
    pub justification: String,
    pub confidence: f64,
}

// ── Confidence tracking ────────────────────────────────────────────────

/// One real confidence measurement for an executed step.
///
/// Entries are only ever appended for steps that actually completed; gaps
/// are never filled with synthetic values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceEntry {
    pub step: u8,
    pub phase: String,
    pub value: f64,
}

// ── Advisories ─────────────────────────────────────────────────────────

/// The five non-blocking post-step advisory rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdvisoryRule {
    /// Boundary detection identified a section but no content was removed.
    BoundaryWithoutRemoval,
    /// Reference detection found patterns but validation rejected removal.
    ReferencesRejected,
    /// Chapter marker style configured but no chapters detected.
    MarkersWithoutChapters,
    /// A single step removed more than half of the content.
    LargeRemoval,
    /// Working-text length increased across a non-assembly step.
    ContentGrew,
    /// Detected content type disagreed with the user's selection.
    ContentTypeMismatch,
}

/// Informational advisory attached to the result; never aborts the run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Advisory {
    pub rule: AdvisoryRule,
    pub step: u8,
    pub message: String,
}

// ── Usage & review ─────────────────────────────────────────────────────

/// Running LLM usage totals, incremented only by the orchestrator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageTotals {
    pub llm_calls: u32,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl UsageTotals {
    pub fn absorb(&mut self, other: UsageTotals) {
        self.llm_calls += other.llm_calls;
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
    }

    pub fn record_call(&mut self, input_tokens: u64, output_tokens: u64) {
        self.llm_calls += 1;
        self.input_tokens += input_tokens;
        self.output_tokens += output_tokens;
    }
}

/// Quality rating emitted by the final review.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewRating {
    Excellent,
    Good,
    Acceptable,
    NeedsReview,
    Poor,
}

impl ReviewRating {
    /// Maps a numeric score to the rating ladder.
    #[must_use]
    pub fn from_score(score: f64) -> Self {
        if score >= 0.90 {
            ReviewRating::Excellent
        } else if score >= 0.75 {
            ReviewRating::Good
        } else if score >= 0.60 {
            ReviewRating::Acceptable
        } else if score >= 0.40 {
            ReviewRating::NeedsReview
        } else {
            ReviewRating::Poor
        }
    }
}

/// Outcome of the Phase 8 quality assessment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalReview {
    pub rating: ReviewRating,
    pub score: f64,
    pub issues: Vec<String>,
    pub summary: String,
    /// False when the heuristic fallback produced this review.
    pub used_ai: bool,
}

impl Default for FinalReview {
    fn default() -> Self {
        Self {
            rating: ReviewRating::NeedsReview,
            score: 0.0,
            issues: Vec::new(),
            summary: String::new(),
            used_ai: false,
        }
    }
}

// ── Result envelope ────────────────────────────────────────────────────

/// Everything a pipeline run hands back to the embedder.
///
/// JSON-friendly by construction; `overall_confidence` is the honest mean
/// of the recorded real confidence entries, and `cancelled` marks partial
/// results returned after a user cancellation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineResult {
    pub run_id: String,
    pub cleaned_content: String,
    pub metadata: Metadata,
    pub structure_hints: Option<StructureHints>,
    pub boundary_result: Option<BoundaryResult>,
    pub removal_records: Vec<RemovalRecord>,
    pub phase_confidences: FxHashMap<String, f64>,
    pub overall_confidence: f64,
    pub final_review: FinalReview,
    pub advisories: Vec<Advisory>,
    pub step_records: Vec<crate::pipeline::StepRecord>,
    pub usage: UsageTotals,
    pub duration_ms: u64,
    pub cancelled: bool,
    pub started_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rating_ladder_boundaries() {
        assert_eq!(ReviewRating::from_score(0.95), ReviewRating::Excellent);
        assert_eq!(ReviewRating::from_score(0.80), ReviewRating::Good);
        assert_eq!(ReviewRating::from_score(0.60), ReviewRating::Acceptable);
        assert_eq!(ReviewRating::from_score(0.45), ReviewRating::NeedsReview);
        assert_eq!(ReviewRating::from_score(0.10), ReviewRating::Poor);
    }

    #[test]
    fn usage_totals_absorb() {
        let mut total = UsageTotals::default();
        total.record_call(100, 50);
        total.absorb(UsageTotals {
            llm_calls: 2,
            input_tokens: 30,
            output_tokens: 20,
        });
        assert_eq!(total.llm_calls, 3);
        assert_eq!(total.input_tokens, 130);
        assert_eq!(total.output_tokens, 70);
    }

    #[test]
    fn removal_scope_serializes_tagged() {
        let record = RemovalRecord {
            step: 5,
            kind: RemovalKind::FrontMatter,
            scope: RemovalScope::Lines { start: 0, end: 12 },
            word_delta: 80,
            validation_method: ValidationMethod::PhaseA,
            justification: "front matter markers".into(),
            confidence: 0.8,
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["scope"], "lines");
        assert_eq!(json["start"], 0);
        assert_eq!(json["kind"], "front_matter");
    }
}
