//! End-to-end pipeline runs against the scripted mock client.

mod common;

use std::sync::Arc;

use bookloom::config::{CleaningConfig, Preset};
use bookloom::pipeline::{
    EvolvedCleaningPipeline, PipelineCapabilities, PipelineStep, StepStatus,
};
use bookloom::progress::{CancelToken, ProgressSink};
use bookloom::prompts::StaticPromptStore;
use bookloom::reflow::ReflowService;
use bookloom::types::{AdvisoryRule, RemovalKind};
use bookloom::PipelineError;

use common::{caps_with, narrative_lines, plain_structure_json, MockLlm};

/// A small but structurally complete book: front matter, contents,
/// chapters with citations and markers, and a notes/bibliography tail.
fn sample_book() -> String {
    let mut lines: Vec<String> = vec![
        "THE LONG ROAD".into(),
        "A Novel of the Valley".into(),
        "Copyright \u{A9} 1998 by A. Writer".into(),
        "All rights reserved".into(),
        "ISBN 978-0-12-345678-9".into(),
        "Published by Example House".into(),
        "First edition".into(),
        "For my family".into(),
        "CONTENTS".into(),
        "The Road ......... 3".into(),
        "The River ........ 120".into(),
        "The Sea .......... 240".into(),
    ];
    lines.push("Chapter 1".into());
    for i in 0..120 {
        lines.push(format!(
            "The caravan pressed on through the valley as evening fell over mile {i}, \
             and nobody spoke of the storm."
        ));
        if i == 40 {
            lines.push("See (Smith, 2020) at https://doi.org/10.1234/abc.5678 for details.".into());
        }
        if i == 60 {
            lines.push("The treaty\u{B9} was signed before the thaw.".into());
        }
        if i % 30 == 7 {
            lines.push(format!("{}", i));
        }
    }
    lines.push("Chapter 2".into());
    for i in 0..120 {
        lines.push(format!(
            "Morning light crossed the river while the ferry waited at landing {i}, \
             heavy with grain and rumor."
        ));
    }
    lines.push("NOTES".into());
    for i in 1..=14 {
        lines.push(format!("{i}. A note about sources and the archive."));
    }
    lines.push("BIBLIOGRAPHY".into());
    for i in 0..10 {
        lines.push(format!("Author {i}. A cited work. Example House."));
    }
    lines.join("\n")
}

fn scripted_for_sample(front_end: usize, back_start: usize) -> MockLlm {
    MockLlm::new()
        .on(
            "MIDDLE SAMPLE",
            format!(
                r#"{{"documentType": "fiction",
                    "chapters": [
                        {{"name": "Chapter 1", "startLine": {}, "confidence": 0.9}},
                        {{"name": "Chapter 2", "startLine": {}, "confidence": 0.9}}
                    ],
                    "contentFlags": {{"poetry": false, "dialogue": false, "code": false,
                                     "tables": false, "math": false, "academic": false,
                                     "footnotes": true}},
                    "patternHints": {{"pageNumberRegex": null, "headerPatterns": [],
                                     "footerPatterns": []}},
                    "overallConfidence": 0.88}}"#,
                front_end + 1,
                front_end + 130,
            ),
        )
        .on(
            "last line of front matter",
            format!(r#"{{"frontMatterEndLine": {front_end}, "confidence": 0.85, "evidence": ["copyright page", "contents"]}}"#),
        )
        .on(
            "first line of back matter",
            format!(r#"{{"backMatterStartLine": {back_start}, "confidence": 0.9, "evidence": ["NOTES heading"]}}"#),
        )
        .on(
            "bibliographic metadata",
            r#"{"title": "The Long Road", "subtitle": "A Novel of the Valley",
                "author": "A. Writer", "publisher": "Example House",
                "publishDate": "1998", "isbn": "978-0-12-345678-9",
                "language": "en", "genre": "fiction", "series": null, "edition": "First",
                "contentFlags": {"poetry": false, "dialogue": false, "code": false,
                                 "tables": false, "math": false, "academic": false,
                                 "footnotes": true}}"#,
        )
        // Deliberately unusable reflow/optimise output: the word-count
        // verifier rejects it and the deterministic paths take over.
        .on("Rejoin the broken paragraphs", "too short")
        .on("topical boundaries", "too short")
        .on(
            "CLEANED SAMPLES",
            r#"{"rating": "good", "score": 0.84, "issues": [], "summary": "Clean narrative."}"#,
        )
}

#[tokio::test]
async fn full_run_cleans_scaffolding_and_keeps_narrative() {
    let text = sample_book();
    let total_lines = text.split('\n').count();
    let back_start = text
        .split('\n')
        .position(|l| l == "NOTES")
        .expect("sample has a NOTES heading");
    assert!(back_start * 2 > total_lines, "back matter sits in the tail");

    let llm = Arc::new(scripted_for_sample(11, back_start));
    let config = CleaningConfig::preset(Preset::Default);
    let result = EvolvedCleaningPipeline::new(config)
        .run(&text, caps_with(llm.clone()))
        .await
        .expect("run succeeds");

    assert!(!result.cancelled);

    // Metadata block and title heading from assembly.
    assert!(result.cleaned_content.starts_with("---\ntitle: The Long Road\n"));
    assert!(result.cleaned_content.contains("# The Long Road"));
    assert!(result.cleaned_content.trim_end().ends_with("--- THE END ---"));

    // Front and back matter scaffolding is gone; the narrative is not.
    assert!(!result.cleaned_content.contains("All rights reserved"));
    assert!(!result.cleaned_content.contains("A note about sources"));
    assert!(!result.cleaned_content.contains("BIBLIOGRAPHY"));
    assert!(result.cleaned_content.contains("nobody spoke of the storm"));
    assert!(result.cleaned_content.contains("heavy with grain and rumor"));

    // Citation removed, DOI preserved verbatim, footnote marker gone.
    assert!(!result.cleaned_content.contains("(Smith, 2020)"));
    assert!(result.cleaned_content.contains("10.1234/abc.5678"));
    assert!(!result.cleaned_content.contains('\u{B9}'));

    // Removal records carry the structural deletions.
    let kinds: Vec<RemovalKind> = result.removal_records.iter().map(|r| r.kind).collect();
    assert!(kinds.contains(&RemovalKind::FrontMatter));
    assert!(kinds.contains(&RemovalKind::BackMatter));
    assert!(kinds.contains(&RemovalKind::Citations));
    assert!(kinds.contains(&RemovalKind::PageNumbers));

    // Usage totals reflect the scripted calls.
    assert!(result.usage.llm_calls >= 5);
    assert!(result.usage.input_tokens > 0);

    // Confidence honesty: the overall value is exactly the mean of the
    // completed steps' confidences.
    let completed: Vec<f64> = result
        .step_records
        .iter()
        .filter_map(|r| match &r.status {
            StepStatus::Completed { confidence, .. } => Some(*confidence),
            _ => None,
        })
        .collect();
    let mean = completed.iter().sum::<f64>() / completed.len() as f64;
    assert!((result.overall_confidence - mean).abs() < 1e-9);
    assert_eq!(result.final_review.score, 0.84);
}

#[tokio::test]
async fn back_matter_false_positive_is_preserved() {
    // 415 narrative lines; the model confidently claims back matter
    // starts at line 4.
    let text = narrative_lines(415);
    let llm = Arc::new(
        MockLlm::new()
            .on("MIDDLE SAMPLE", plain_structure_json())
            .on(
                "last line of front matter",
                r#"{"frontMatterEndLine": null, "confidence": 0.9, "evidence": []}"#,
            )
            .on(
                "first line of back matter",
                r#"{"backMatterStartLine": 4, "confidence": 0.80, "evidence": ["guess"]}"#,
            )
            .on("bibliographic metadata", r#"{"title": "Untitled"}"#)
            .on("Rejoin the broken paragraphs", "too short")
            .on("topical boundaries", "too short")
            .on(
                "CLEANED SAMPLES",
                r#"{"rating": "acceptable", "score": 0.7, "issues": [], "summary": "ok"}"#,
            ),
    );

    let result = EvolvedCleaningPipeline::new(CleaningConfig::preset(Preset::Default))
        .run(&text, caps_with(llm))
        .await
        .expect("run succeeds");

    // No back-matter lines were removed.
    assert!(!result
        .removal_records
        .iter()
        .any(|r| r.kind == RemovalKind::BackMatter));
    // Every narrative line survived.
    for i in [0usize, 4, 207, 414] {
        assert!(result
            .cleaned_content
            .contains(&format!("over mile {i}.")));
    }
    // Advisory (1): a boundary was identified but nothing removed.
    assert!(result
        .advisories
        .iter()
        .any(|a| a.rule == AdvisoryRule::BoundaryWithoutRemoval
            && a.step == PipelineStep::BackMatter.number()));
    // The back-matter step itself completed rather than failing.
    let back = result
        .step_records
        .iter()
        .find(|r| r.step == PipelineStep::BackMatter)
        .unwrap();
    assert!(matches!(back.status, StepStatus::Completed { .. }));
}

/// Progress sink that cancels the run as soon as a given step finishes.
struct CancelAfter {
    after: PipelineStep,
    token: CancelToken,
}

impl ProgressSink for CancelAfter {
    fn on_step_complete(&self, step: PipelineStep, _status: &StepStatus) {
        if step == self.after {
            self.token.cancel();
        }
    }
}

#[tokio::test]
async fn cancellation_returns_partial_result() {
    let text = narrative_lines(200);
    let llm = Arc::new(
        MockLlm::new()
            .on("MIDDLE SAMPLE", plain_structure_json())
            .on(
                "last line of front matter",
                r#"{"frontMatterEndLine": null, "confidence": 0.9, "evidence": []}"#,
            )
            .on(
                "first line of back matter",
                r#"{"backMatterStartLine": null, "confidence": 0.9, "evidence": []}"#,
            )
            .on("bibliographic metadata", r#"{"title": "Untitled"}"#),
    );

    let token = CancelToken::new();
    let caps = caps_with(llm)
        .with_cancel(token.clone())
        .with_progress(Arc::new(CancelAfter {
            after: PipelineStep::Index,
            token: token.clone(),
        }));

    let result = EvolvedCleaningPipeline::new(CleaningConfig::preset(Preset::Default))
        .run(&text, caps)
        .await
        .expect("cancellation still yields a result");

    assert!(result.cancelled);

    let status_of = |step: PipelineStep| {
        result
            .step_records
            .iter()
            .find(|r| r.step == step)
            .map(|r| r.status.clone())
            .unwrap()
    };
    // Steps 1..=8 ran to completion.
    for step in &PipelineStep::ALL[..8] {
        assert!(
            matches!(status_of(*step), StepStatus::Completed { .. }),
            "{step} should be completed"
        );
    }
    // Step 9 is the cancelled one; everything later stays pending.
    assert_eq!(status_of(PipelineStep::AuxiliaryLists), StepStatus::Cancelled);
    for step in &PipelineStep::ALL[9..] {
        assert_eq!(status_of(*step), StepStatus::Pending, "{step} should be pending");
    }
    // No assembly output on a cancelled run.
    assert!(!result.cleaned_content.contains("--- THE END ---"));
    assert!(!result.cleaned_content.starts_with("---\n"));
}

#[tokio::test]
async fn legacy_path_is_a_configuration_error() {
    let llm = Arc::new(MockLlm::new());
    let config = CleaningConfig::preset(Preset::Default).use_evolved_pipeline(false);
    let err = EvolvedCleaningPipeline::new(config)
        .run("text", caps_with(llm))
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::LegacyPathUnsupported));
}

#[tokio::test]
async fn missing_prompt_template_fails_fast() {
    let llm: Arc<MockLlm> = Arc::new(MockLlm::new());
    let caps = PipelineCapabilities::new(llm, Arc::new(StaticPromptStore::empty()));
    let err = EvolvedCleaningPipeline::new(CleaningConfig::preset(Preset::Default))
        .run("text", caps)
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::Prompt(_)));
}

#[tokio::test]
async fn llm_blackout_degrades_to_heuristics_without_failing() {
    // Every call errors; reconnaissance, boundaries, metadata, reflow,
    // and review all fall back. The retry policy is shortened so the
    // test does not wait out real backoff.
    let mut text = String::from("MY BOOK\nCopyright \u{A9} 2001 Example House\n\nChapter 1\n");
    text.push_str(&narrative_lines(40));
    let llm = Arc::new(MockLlm::new());

    let fast_retries = bookloom::llm::RetryPolicy {
        max_retries: 1,
        base_delay: std::time::Duration::from_millis(1),
        rate_limit_fallback: std::time::Duration::from_millis(1),
        max_jitter: std::time::Duration::from_millis(1),
    };
    let result = EvolvedCleaningPipeline::new(CleaningConfig::preset(Preset::Default))
        .with_retry_policy(fast_retries)
        .run(&text, caps_with(llm))
        .await
        .expect("degraded run still completes");

    assert!(!result.cancelled);
    let hints = result.structure_hints.expect("heuristic hints present");
    assert!(!hints.used_ai);
    assert!((hints.overall_confidence - 0.30).abs() < 1e-9);
    assert!(!result.final_review.used_ai);
    // The reconnaissance step completed via fallback, never failed.
    let recon = result
        .step_records
        .iter()
        .find(|r| r.step == PipelineStep::Reconnaissance)
        .unwrap();
    assert!(matches!(recon.status, StepStatus::Completed { .. }));
}

#[tokio::test]
async fn optimize_disabled_by_zero_max_words() {
    let text = narrative_lines(30);
    let llm = Arc::new(
        MockLlm::new()
            .on("MIDDLE SAMPLE", plain_structure_json())
            .on(
                "last line of front matter",
                r#"{"frontMatterEndLine": null, "confidence": 0.9, "evidence": []}"#,
            )
            .on(
                "first line of back matter",
                r#"{"backMatterStartLine": null, "confidence": 0.9, "evidence": []}"#,
            )
            .on("bibliographic metadata", r#"{"title": "Untitled"}"#)
            .on("Rejoin the broken paragraphs", "too short")
            .on(
                "CLEANED SAMPLES",
                r#"{"rating": "good", "score": 0.8, "issues": [], "summary": "ok"}"#,
            ),
    );
    let config = CleaningConfig::preset(Preset::Default).max_paragraph_words(0);
    let result = EvolvedCleaningPipeline::new(config)
        .run(&text, caps_with(llm))
        .await
        .unwrap();
    let optimize = result
        .step_records
        .iter()
        .find(|r| r.step == PipelineStep::Optimize)
        .unwrap();
    assert_eq!(optimize.status, StepStatus::Skipped);
}

#[tokio::test]
async fn reflow_chunking_override_is_available() {
    // The chunking override exists for large-document tests.
    let pipeline = EvolvedCleaningPipeline::new(CleaningConfig::preset(Preset::Default))
        .with_reflow_service(ReflowService::new().with_chunking(100, 10));
    let llm = Arc::new(
        MockLlm::new()
            .on("MIDDLE SAMPLE", plain_structure_json())
            .on(
                "last line of front matter",
                r#"{"frontMatterEndLine": null, "confidence": 0.9, "evidence": []}"#,
            )
            .on(
                "first line of back matter",
                r#"{"backMatterStartLine": null, "confidence": 0.9, "evidence": []}"#,
            )
            .on("bibliographic metadata", r#"{"title": "Untitled"}"#)
            .on("Rejoin the broken paragraphs", "too short")
            .on("topical boundaries", "too short")
            .on(
                "CLEANED SAMPLES",
                r#"{"rating": "good", "score": 0.8, "issues": [], "summary": "ok"}"#,
            ),
    );
    let result = pipeline
        .run(&narrative_lines(250), caps_with(llm))
        .await
        .unwrap();
    assert!(!result.cancelled);
}
