//! Phase 1: bibliographic metadata extraction.
//!
//! One LLM call over the front-matter window returns a fixed JSON schema;
//! missing fields stay null. Dates are normalised to ISO-8601 where a
//! format could be recognised; everything else is kept as extracted, only
//! trimmed. On any failure the step degrades to a heuristic title guess so
//! the assembler always has something to work with.

use chrono::NaiveDate;
use serde_json::Value;
use tracing::warn;

use crate::document::Document;
use crate::error::StepError;
use crate::llm::json_repair::parse_lenient;
use crate::llm::{CallDeadline, LlmCallError, LlmRunner};
use crate::types::{ContentFlags, Metadata, UsageTotals};

/// Window used when reconnaissance produced no front-matter boundary.
const DEFAULT_WINDOW_LINES: usize = 80;

/// Metadata extraction service.
#[derive(Debug, Default)]
pub struct MetadataExtractor;

/// Extraction result plus usage accounting.
#[derive(Debug, Clone)]
pub struct MetadataOutcome {
    pub metadata: Metadata,
    pub usage: UsageTotals,
    pub used_ai: bool,
}

impl MetadataExtractor {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Extract metadata from the document's front-matter window.
    ///
    /// # Errors
    ///
    /// Only [`StepError::Cancelled`].
    pub async fn extract(
        &self,
        document: &Document,
        front_matter_end: Option<usize>,
        runner: &LlmRunner,
    ) -> Result<MetadataOutcome, StepError> {
        let mut usage = UsageTotals::default();
        let end = front_matter_end
            .unwrap_or(DEFAULT_WINDOW_LINES)
            .min(document.line_count().saturating_sub(1));
        let window = document.slice_text(0, end);
        if window.trim().is_empty() {
            return Ok(MetadataOutcome {
                metadata: Metadata::default(),
                usage,
                used_ai: false,
            });
        }

        let user = format!(
            "Extract bibliographic metadata from this book front matter. Use null \
             for anything not present.\n\nFRONT MATTER:\n{window}\n\n\
             Respond with a single JSON object and nothing else:\n\
             {{\"title\": null, \"subtitle\": null, \"author\": null, \"publisher\": null,\n \
             \"publishDate\": null, \"isbn\": null, \"language\": null, \"genre\": null,\n \
             \"series\": null, \"edition\": null,\n \
             \"contentFlags\": {{\"poetry\": false, \"dialogue\": false, \"code\": false,\n                   \
             \"tables\": false, \"math\": false, \"academic\": false,\n                   \
             \"footnotes\": false}}}}"
        );

        let reply = runner
            .complete(
                runner
                    .request(
                        "You extract bibliographic metadata. Respond only with JSON.",
                        user,
                    )
                    .max_tokens(1024),
                CallDeadline::Standard,
            )
            .await;

        match reply {
            Ok(reply) => {
                usage.record_call(reply.usage.input_tokens, reply.usage.output_tokens);
                match parse_lenient(&reply.text) {
                    Some(value) => Ok(MetadataOutcome {
                        metadata: parse_metadata(&value),
                        usage,
                        used_ai: true,
                    }),
                    None => {
                        warn!("metadata response unparsable; using heuristic title");
                        Ok(MetadataOutcome {
                            metadata: heuristic_metadata(document, end),
                            usage,
                            used_ai: false,
                        })
                    }
                }
            }
            Err(LlmCallError::Cancelled) => Err(StepError::Cancelled),
            Err(LlmCallError::Llm(err)) => {
                warn!(error = %err, "metadata call failed; using heuristic title");
                Ok(MetadataOutcome {
                    metadata: heuristic_metadata(document, end),
                    usage,
                    used_ai: false,
                })
            }
        }
    }
}

fn parse_metadata(value: &Value) -> Metadata {
    let field = |key: &str| {
        value
            .get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };
    let content_flags = value
        .get("contentFlags")
        .map(|flags| {
            let flag = |key: &str| flags.get(key).and_then(Value::as_bool).unwrap_or(false);
            ContentFlags {
                poetry: flag("poetry"),
                dialogue: flag("dialogue"),
                code: flag("code"),
                tables: flag("tables"),
                math: flag("math"),
                academic: flag("academic"),
                footnotes: flag("footnotes"),
            }
        })
        .unwrap_or_default();

    Metadata {
        title: field("title"),
        subtitle: field("subtitle"),
        author: field("author"),
        publisher: field("publisher"),
        publish_date: field("publishDate").map(|d| normalize_date(&d)),
        isbn: field("isbn"),
        language: field("language"),
        genre: field("genre"),
        series: field("series"),
        edition: field("edition"),
        content_flags,
    }
}

/// Best-effort ISO-8601 normalisation; unrecognised formats pass through
/// trimmed.
fn normalize_date(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.len() == 4 && trimmed.chars().all(|c| c.is_ascii_digit()) {
        return trimmed.to_string();
    }
    for format in ["%Y-%m-%d", "%B %d, %Y", "%d %B %Y", "%m/%d/%Y", "%d/%m/%Y"] {
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, format) {
            return date.format("%Y-%m-%d").to_string();
        }
    }
    trimmed.to_string()
}

/// Fallback: the first plausible title line in the window.
fn heuristic_metadata(document: &Document, window_end: usize) -> Metadata {
    let title = document.lines()[..=window_end.min(document.line_count().saturating_sub(1))]
        .iter()
        .map(|l| l.trim())
        .find(|l| {
            !l.is_empty()
                && l.len() > 2
                && !l.to_lowercase().contains("copyright")
                && !l.starts_with("```")
        })
        .map(|l| l.trim_start_matches('#').trim().to_string());
    Metadata {
        title,
        ..Default::default()
    }
}
