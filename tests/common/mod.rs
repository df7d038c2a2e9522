#![allow(dead_code)]

//! Shared fixtures for the integration suite: a scripted mock LLM client
//! and document builders.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;

use bookloom::llm::{CompletionRequest, CompletionResponse, LlmClient, LlmError, TokenUsage};
use bookloom::pipeline::PipelineCapabilities;
use bookloom::prompts::StaticPromptStore;

/// One scripted rule: when the user prompt contains `needle`, answer with
/// `response`.
struct Rule {
    needle: &'static str,
    response: String,
}

/// Scripted LLM client. Rules are checked in registration order; a prompt
/// matching no rule gets a network error, which exercises the heuristic
/// fallbacks.
#[derive(Default)]
pub struct MockLlm {
    rules: Vec<Rule>,
    calls: AtomicU32,
}

impl MockLlm {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer prompts containing `needle` with `response`.
    #[must_use]
    pub fn on(mut self, needle: &'static str, response: impl Into<String>) -> Self {
        self.rules.push(Rule {
            needle,
            response: response.into(),
        });
        self
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LlmClient for MockLlm {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        for rule in &self.rules {
            if request.user.contains(rule.needle) || request.system.contains(rule.needle) {
                return Ok(CompletionResponse {
                    text: rule.response.clone(),
                    usage: TokenUsage {
                        input_tokens: 100,
                        output_tokens: 50,
                    },
                    stop_reason: Some("end_turn".into()),
                });
            }
        }
        Err(LlmError::Network("no scripted response".into()))
    }

    async fn validate(&self) -> bool {
        true
    }
}

/// Capabilities wired to the given mock and the built-in prompt store.
pub fn caps_with(llm: Arc<MockLlm>) -> PipelineCapabilities {
    PipelineCapabilities::new(llm, Arc::new(StaticPromptStore::builtin()))
}

/// A document of `n` plain narrative lines with varied sentence shapes.
pub fn narrative_lines(n: usize) -> String {
    (0..n)
        .map(|i| {
            format!(
                "The caravan pressed on through the valley as evening fell over mile {i}."
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Structure-analysis JSON with no chapters and full defaults.
pub fn plain_structure_json() -> &'static str {
    r#"{"documentType": "fiction", "chapters": [],
        "contentFlags": {"poetry": false, "dialogue": false, "code": false,
                         "tables": false, "math": false, "academic": false,
                         "footnotes": false},
        "patternHints": {"pageNumberRegex": null, "headerPatterns": [], "footerPatterns": []},
        "overallConfidence": 0.85}"#
}
