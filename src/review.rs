//! Phase 8: final quality review.
//!
//! One LLM call over head/mid/tail samples of the cleaned text produces a
//! rating and score; the reduction achieved is judged against the
//! content-type expectation band. When the call fails, a deterministic
//! heuristic scores the run instead: base 0.7, penalised for over- and
//! under-reduction and for detected anomalies, clamped to [0, 1].

use serde_json::Value;
use tracing::warn;

use crate::document::Document;
use crate::error::StepError;
use crate::llm::json_repair::{clamp_confidence, parse_lenient, value_as_f64};
use crate::llm::{CallDeadline, LlmCallError, LlmRunner};
use crate::prompts::{PromptName, PromptStore};
use crate::recon::sampling::region_sample;
use crate::types::{DocumentType, FinalReview, ReviewRating, UsageTotals};

/// Heuristic fallback base score.
const HEURISTIC_BASE_SCORE: f64 = 0.70;
/// Penalty when more than half the content was removed.
const OVER_REDUCTION_PENALTY: f64 = 0.10;
/// Penalty when almost nothing was removed.
const UNDER_REDUCTION_PENALTY: f64 = 0.05;
/// Penalty when structural anomalies were recorded during the run.
const ANOMALY_PENALTY: f64 = 0.10;

/// Review result plus usage accounting.
#[derive(Debug, Clone)]
pub struct ReviewOutcome {
    pub review: FinalReview,
    pub usage: UsageTotals,
}

/// Content-type-aware quality reviewer.
#[derive(Debug, Clone, Copy, Default)]
pub struct FinalReviewer;

impl FinalReviewer {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Assess the cleaned text against the original word count.
    ///
    /// # Errors
    ///
    /// Only [`StepError::Cancelled`].
    pub async fn review(
        &self,
        cleaned_text: &str,
        original_words: usize,
        document_type: DocumentType,
        anomaly_count: usize,
        runner: &LlmRunner,
        prompts: &dyn PromptStore,
    ) -> Result<ReviewOutcome, StepError> {
        let mut usage = UsageTotals::default();
        let cleaned_words = crate::textutil::word_count(cleaned_text);
        let reduction = if original_words == 0 {
            0.0
        } else {
            1.0 - cleaned_words as f64 / original_words as f64
        };

        let review = match self
            .ask_model(
                cleaned_text,
                original_words,
                cleaned_words,
                reduction,
                document_type,
                runner,
                prompts,
                &mut usage,
            )
            .await
        {
            Ok(review) => review,
            Err(StepError::Cancelled) => return Err(StepError::Cancelled),
            Err(err) => {
                warn!(error = %err, "final review degraded to heuristic scoring");
                heuristic_review(reduction, document_type, anomaly_count)
            }
        };

        Ok(ReviewOutcome { review, usage })
    }

    #[allow(clippy::too_many_arguments)]
    async fn ask_model(
        &self,
        cleaned_text: &str,
        original_words: usize,
        cleaned_words: usize,
        reduction: f64,
        document_type: DocumentType,
        runner: &LlmRunner,
        prompts: &dyn PromptStore,
        usage: &mut UsageTotals,
    ) -> Result<FinalReview, StepError> {
        let sample = region_sample(&Document::new(cleaned_text));
        let mut variables = rustc_hash::FxHashMap::default();
        variables.insert("original_words".to_string(), original_words.to_string());
        variables.insert("cleaned_words".to_string(), cleaned_words.to_string());
        variables.insert(
            "reduction_percent".to_string(),
            format!("{:.1}", reduction * 100.0),
        );
        variables.insert("document_type".to_string(), document_type.to_string());
        variables.insert("head_sample".to_string(), sample.head);
        variables.insert("mid_sample".to_string(), sample.mid);
        variables.insert("tail_sample".to_string(), sample.tail);

        let prompt = prompts
            .render(PromptName::FinalReviewV1, &variables)
            .map_err(|e| StepError::Processing {
                message: e.to_string(),
            })?;
        let reply = runner
            .complete(
                runner
                    .request("You assess cleaned documents. Respond only with JSON.", prompt)
                    .max_tokens(1024),
                CallDeadline::Standard,
            )
            .await
            .map_err(|e| match e {
                LlmCallError::Cancelled => StepError::Cancelled,
                LlmCallError::Llm(err) => StepError::Llm(err),
            })?;
        usage.record_call(reply.usage.input_tokens, reply.usage.output_tokens);

        let value = parse_lenient(&reply.text).ok_or_else(|| StepError::Parse {
            context: "final review response".into(),
        })?;
        Ok(parse_review(&value, reduction, document_type))
    }
}

fn parse_review(value: &Value, reduction: f64, document_type: DocumentType) -> FinalReview {
    let score = value
        .get("score")
        .and_then(value_as_f64)
        .map(clamp_confidence)
        .unwrap_or(0.5);
    let rating = value
        .get("rating")
        .and_then(Value::as_str)
        .and_then(parse_rating)
        .unwrap_or_else(|| ReviewRating::from_score(score));
    let mut issues: Vec<String> = value
        .get("issues")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    let summary = value
        .get("summary")
        .and_then(Value::as_str)
        .unwrap_or("")
        .trim()
        .to_string();

    if let Some(issue) = reduction_issue(reduction, document_type) {
        issues.push(issue);
    }

    FinalReview {
        rating,
        score,
        issues,
        summary,
        used_ai: true,
    }
}

fn parse_rating(raw: &str) -> Option<ReviewRating> {
    match raw.trim().to_lowercase().replace([' ', '-'], "_").as_str() {
        "excellent" => Some(ReviewRating::Excellent),
        "good" => Some(ReviewRating::Good),
        "acceptable" => Some(ReviewRating::Acceptable),
        "needs_review" | "needsreview" => Some(ReviewRating::NeedsReview),
        "poor" => Some(ReviewRating::Poor),
        _ => None,
    }
}

/// Issue text when the reduction fell outside the expected band.
fn reduction_issue(reduction: f64, document_type: DocumentType) -> Option<String> {
    let (low, high) = document_type.expected_reduction();
    if reduction < low {
        Some(format!(
            "reduction {:.1}% below the {:.0}%-{:.0}% expected for {document_type}",
            reduction * 100.0,
            low * 100.0,
            high * 100.0,
        ))
    } else if reduction > high {
        Some(format!(
            "reduction {:.1}% above the {:.0}%-{:.0}% expected for {document_type}",
            reduction * 100.0,
            low * 100.0,
            high * 100.0,
        ))
    } else {
        None
    }
}

/// Deterministic fallback scoring.
#[must_use]
pub fn heuristic_review(
    reduction: f64,
    document_type: DocumentType,
    anomaly_count: usize,
) -> FinalReview {
    let mut score = HEURISTIC_BASE_SCORE;
    let mut issues = Vec::new();
    if reduction > 0.50 {
        score -= OVER_REDUCTION_PENALTY;
        issues.push(format!(
            "more than half the content was removed ({:.1}%)",
            reduction * 100.0
        ));
    }
    if reduction < 0.05 {
        score -= UNDER_REDUCTION_PENALTY;
        issues.push(format!(
            "very little content was removed ({:.1}%)",
            reduction * 100.0
        ));
    }
    if anomaly_count > 0 {
        score -= ANOMALY_PENALTY;
        issues.push(format!(
            "{anomaly_count} structural anomaly warning(s) recorded during the run"
        ));
    }
    if let Some(issue) = reduction_issue(reduction, document_type) {
        issues.push(issue);
    }
    let score = score.clamp(0.0, 1.0);

    FinalReview {
        rating: ReviewRating::from_score(score),
        score,
        issues,
        summary: format!(
            "Heuristic review: {:.1}% reduction for a {document_type} document.",
            reduction * 100.0
        ),
        used_ai: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn heuristic_base_score_with_penalties() {
        let clean = heuristic_review(0.20, DocumentType::Fiction, 0);
        assert_eq!(clean.score, 0.70);
        assert_eq!(clean.rating, ReviewRating::Acceptable);

        let over = heuristic_review(0.60, DocumentType::Fiction, 0);
        assert!((over.score - 0.60).abs() < 1e-9);

        let under = heuristic_review(0.01, DocumentType::Fiction, 2);
        assert!((under.score - 0.55).abs() < 1e-9);
        assert!(!under.used_ai);
    }

    #[test]
    fn parse_review_maps_rating_and_band_issue() {
        let value = json!({
            "rating": "good",
            "score": "0.82",
            "issues": ["hyphenation residue"],
            "summary": "Clean overall."
        });
        // Academic text reduced only 5% is under the 30% floor.
        let review = parse_review(&value, 0.05, DocumentType::Academic);
        assert_eq!(review.rating, ReviewRating::Good);
        assert_eq!(review.score, 0.82);
        assert_eq!(review.issues.len(), 2);
        assert!(review.used_ai);
    }

    #[test]
    fn missing_rating_derives_from_score() {
        let review = parse_review(&json!({"score": 0.92}), 0.15, DocumentType::Fiction);
        assert_eq!(review.rating, ReviewRating::Excellent);
    }
}
