//! Prompt template capability.
//!
//! The pipeline renders prompts by name from an injected [`PromptStore`].
//! The name set is closed: eight templates, each versioned. A missing
//! template is a fatal configuration error, surfaced before any step runs.
//!
//! [`StaticPromptStore`] ships working defaults for all eight names so the
//! core is usable without embedder-provided templates. The store is
//! insert-only and immutable after construction.

use miette::Diagnostic;
use rustc_hash::FxHashMap;
use thiserror::Error;

// ── Names ──────────────────────────────────────────────────────────────

/// The closed set of prompt templates the pipeline renders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PromptName {
    StructureAnalysisV1,
    ContentTypeDetectionV1,
    PatternDetectionV1,
    FrontMatterBoundaryV1,
    BackMatterBoundaryV1,
    ParagraphReflowV1,
    ParagraphOptimizationV1,
    FinalReviewV1,
}

impl PromptName {
    /// All template names, used to verify a store up front.
    pub const ALL: [PromptName; 8] = [
        PromptName::StructureAnalysisV1,
        PromptName::ContentTypeDetectionV1,
        PromptName::PatternDetectionV1,
        PromptName::FrontMatterBoundaryV1,
        PromptName::BackMatterBoundaryV1,
        PromptName::ParagraphReflowV1,
        PromptName::ParagraphOptimizationV1,
        PromptName::FinalReviewV1,
    ];

    /// Stable string identifier (store key, log label).
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            PromptName::StructureAnalysisV1 => "structureAnalysis_v1",
            PromptName::ContentTypeDetectionV1 => "contentTypeDetection_v1",
            PromptName::PatternDetectionV1 => "patternDetection_v1",
            PromptName::FrontMatterBoundaryV1 => "frontMatterBoundary_v1",
            PromptName::BackMatterBoundaryV1 => "backMatterBoundary_v1",
            PromptName::ParagraphReflowV1 => "paragraphReflow_v1",
            PromptName::ParagraphOptimizationV1 => "paragraphOptimization_v1",
            PromptName::FinalReviewV1 => "finalReview_v1",
        }
    }
}

impl std::fmt::Display for PromptName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ── Errors ─────────────────────────────────────────────────────────────

/// Prompt store failures; all fatal configuration errors.
#[derive(Debug, Error, Diagnostic)]
pub enum PromptError {
    #[error("missing prompt template: {name}")]
    #[diagnostic(
        code(bookloom::prompts::missing_template),
        help("Register every template in PromptName::ALL before running the pipeline.")
    )]
    MissingTemplate { name: &'static str },

    #[error("template {name} references unbound variable {{{{{variable}}}}}")]
    #[diagnostic(code(bookloom::prompts::unbound_variable))]
    UnboundVariable { name: &'static str, variable: String },
}

// ── Store trait ────────────────────────────────────────────────────────

/// The injected template capability.
pub trait PromptStore: Send + Sync {
    /// Render `name` with `{{variable}}` substitution.
    ///
    /// # Errors
    ///
    /// [`PromptError::MissingTemplate`] when the name is not registered;
    /// [`PromptError::UnboundVariable`] when the template references a
    /// variable absent from `variables`.
    fn render(
        &self,
        name: PromptName,
        variables: &FxHashMap<String, String>,
    ) -> Result<String, PromptError>;

    /// Whether a template is registered; used by the up-front config check.
    fn has(&self, name: PromptName) -> bool;
}

// ── Static store ───────────────────────────────────────────────────────

/// In-memory store preloaded with the built-in templates.
pub struct StaticPromptStore {
    templates: FxHashMap<&'static str, String>,
}

impl StaticPromptStore {
    /// Store with the built-in defaults for all eight names.
    #[must_use]
    pub fn builtin() -> Self {
        let mut templates = FxHashMap::default();
        for name in PromptName::ALL {
            templates.insert(name.as_str(), builtin_template(name).to_string());
        }
        Self { templates }
    }

    /// Empty store for embedders supplying every template themselves.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            templates: FxHashMap::default(),
        }
    }

    /// Register or replace a template at construction time.
    #[must_use]
    pub fn with_template(mut self, name: PromptName, body: impl Into<String>) -> Self {
        self.templates.insert(name.as_str(), body.into());
        self
    }
}

impl PromptStore for StaticPromptStore {
    fn render(
        &self,
        name: PromptName,
        variables: &FxHashMap<String, String>,
    ) -> Result<String, PromptError> {
        let template = self
            .templates
            .get(name.as_str())
            .ok_or(PromptError::MissingTemplate {
                name: name.as_str(),
            })?;
        substitute(template, name, variables)
    }

    fn has(&self, name: PromptName) -> bool {
        self.templates.contains_key(name.as_str())
    }
}

fn substitute(
    template: &str,
    name: PromptName,
    variables: &FxHashMap<String, String>,
) -> Result<String, PromptError> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find("}}") else {
            out.push_str(&rest[start..]);
            rest = "";
            break;
        };
        let key = after[..end].trim();
        match variables.get(key) {
            Some(value) => out.push_str(value),
            None => {
                return Err(PromptError::UnboundVariable {
                    name: name.as_str(),
                    variable: key.to_string(),
                });
            }
        }
        rest = &after[end + 2..];
    }
    out.push_str(rest);
    Ok(out)
}

// ── Built-in templates ─────────────────────────────────────────────────

fn builtin_template(name: PromptName) -> &'static str {
    match name {
        PromptName::StructureAnalysisV1 => STRUCTURE_ANALYSIS_V1,
        PromptName::ContentTypeDetectionV1 => CONTENT_TYPE_DETECTION_V1,
        PromptName::PatternDetectionV1 => PATTERN_DETECTION_V1,
        PromptName::FrontMatterBoundaryV1 => FRONT_MATTER_BOUNDARY_V1,
        PromptName::BackMatterBoundaryV1 => BACK_MATTER_BOUNDARY_V1,
        PromptName::ParagraphReflowV1 => PARAGRAPH_REFLOW_V1,
        PromptName::ParagraphOptimizationV1 => PARAGRAPH_OPTIMIZATION_V1,
        PromptName::FinalReviewV1 => FINAL_REVIEW_V1,
    }
}

const STRUCTURE_ANALYSIS_V1: &str = "\
You analyse the structure of book-length documents recovered from OCR.
Given three samples (head, middle, tail) of a {{line_count}}-line document,
identify the document type, chapter headings, content characteristics, and
any page-furniture patterns.

HEAD SAMPLE:
{{head_sample}}

MIDDLE SAMPLE:
{{mid_sample}}

TAIL SAMPLE:
{{tail_sample}}

Respond with a single JSON object and nothing else:
{
  \"documentType\": \"fiction|non_fiction|academic|technical|poetry|unknown\",
  \"chapters\": [{\"name\": \"...\", \"startLine\": 0, \"confidence\": 0.0}],
  \"contentFlags\": {\"poetry\": false, \"dialogue\": false, \"code\": false,
                    \"tables\": false, \"math\": false, \"academic\": false,
                    \"footnotes\": false},
  \"patternHints\": {\"pageNumberRegex\": null, \"headerPatterns\": [],
                    \"footerPatterns\": []},
  \"overallConfidence\": 0.0
}";

const CONTENT_TYPE_DETECTION_V1: &str = "\
Classify the dominant content type of the following document sample as one
of: fiction, non_fiction, academic, technical, poetry, unknown.

SAMPLE:
{{sample}}

Respond with a single JSON object: {\"documentType\": \"...\", \"confidence\": 0.0}";

const PATTERN_DETECTION_V1: &str = "\
The following lines come from a paginated document. Identify recurring page
headers, footers, and the page-number format, if any.

LINES:
{{sample}}

Respond with a single JSON object:
{\"pageNumberRegex\": null, \"headerPatterns\": [], \"footerPatterns\": [],
 \"confidence\": 0.0}";

const FRONT_MATTER_BOUNDARY_V1: &str = "\
The numbered lines below are the opening of a {{line_count}}-line document.
Find the last line of front matter (title page, copyright, dedication,
epigraph, table of contents) before the main narrative begins.

{{excerpt}}

Respond with a single JSON object and nothing else:
{\"frontMatterEndLine\": <0-based line number or null>,
 \"confidence\": 0.0,
 \"evidence\": [\"...\"]}";

const BACK_MATTER_BOUNDARY_V1: &str = "\
The numbered lines below are the closing portion of a {{line_count}}-line
document. Line numbers are 0-based indices into the full document. Find the
first line of back matter (notes, appendix, glossary, bibliography, index)
after the main narrative ends.

{{excerpt}}

Respond with a single JSON object and nothing else:
{\"backMatterStartLine\": <0-based line number or null>,
 \"confidence\": 0.0,
 \"evidence\": [\"...\"]}";

const PARAGRAPH_REFLOW_V1: &str = "\
The text below was recovered from a paginated scan; paragraphs are broken by
arbitrary line breaks left over from the page layout. Rejoin the broken
paragraphs. Do not add, remove, or reorder any words. Keep blank lines
between paragraphs. Keep verse, lists, and headings exactly as they are.

TEXT:
{{chunk}}

Respond with the reflowed text only, no commentary.";

const PARAGRAPH_OPTIMIZATION_V1: &str = "\
The paragraph below is too long ({{word_count}} words; target at most
{{max_words}}). Split it into smaller paragraphs at topical boundaries by
inserting blank lines. Do not add, remove, or reorder any words.

PARAGRAPH:
{{paragraph}}

Respond with the split paragraph text only, no commentary.";

const FINAL_REVIEW_V1: &str = "\
You assess the quality of a cleaned document. The original had
{{original_words}} words; the cleaned version has {{cleaned_words}} words
({{reduction_percent}}% reduction). Document type: {{document_type}}.

CLEANED SAMPLES (head, middle, tail):
{{head_sample}}

{{mid_sample}}

{{tail_sample}}

Respond with a single JSON object and nothing else:
{\"rating\": \"excellent|good|acceptable|needs_review|poor\",
 \"score\": 0.0,
 \"issues\": [\"...\"],
 \"summary\": \"...\"}";

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> FxHashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn builtin_store_has_all_names() {
        let store = StaticPromptStore::builtin();
        for name in PromptName::ALL {
            assert!(store.has(name), "missing {name}");
        }
    }

    #[test]
    fn renders_with_substitution() {
        let store = StaticPromptStore::empty()
            .with_template(PromptName::FinalReviewV1, "score {{score}} for {{title}}");
        let rendered = store
            .render(
                PromptName::FinalReviewV1,
                &vars(&[("score", "0.9"), ("title", "Dune")]),
            )
            .unwrap();
        assert_eq!(rendered, "score 0.9 for Dune");
    }

    #[test]
    fn missing_template_is_an_error() {
        let store = StaticPromptStore::empty();
        let err = store
            .render(PromptName::ParagraphReflowV1, &FxHashMap::default())
            .unwrap_err();
        assert!(matches!(err, PromptError::MissingTemplate { .. }));
    }

    #[test]
    fn unbound_variable_is_an_error() {
        let store =
            StaticPromptStore::empty().with_template(PromptName::FinalReviewV1, "{{missing}}");
        let err = store
            .render(PromptName::FinalReviewV1, &FxHashMap::default())
            .unwrap_err();
        assert!(matches!(err, PromptError::UnboundVariable { .. }));
    }
}
