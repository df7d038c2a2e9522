//! Mutable run state owned by the orchestrator.
//!
//! The [`PipelineContext`] carries the working text between steps along
//! with everything a run accumulates: analysis results, removal records,
//! advisories, confidence measurements, and usage totals. Components never
//! hold the context; they receive the slices they need and hand back
//! replacement text, keeping the move-on-step discipline.

use crate::document::Document;
use crate::pipeline::{ConfidenceTracker, StepRecord};
use crate::textutil::word_count_lines;
use crate::types::{
    Advisory, BoundaryResult, ContentFlags, Metadata, RemovalRecord, StructureHints, UsageTotals,
};

/// Per-run mutable state.
#[derive(Debug)]
pub struct PipelineContext {
    working: Vec<String>,
    pub hints: Option<StructureHints>,
    pub boundary: Option<BoundaryResult>,
    pub metadata: Option<Metadata>,
    pub removal_records: Vec<RemovalRecord>,
    pub advisories: Vec<Advisory>,
    pub usage: UsageTotals,
    pub confidence: ConfidenceTracker,
    pub step_records: Vec<StepRecord>,
}

impl PipelineContext {
    /// Seed the context from the immutable source document.
    #[must_use]
    pub fn new(document: &Document) -> Self {
        Self {
            working: document.to_working_lines(),
            hints: None,
            boundary: None,
            metadata: None,
            removal_records: Vec::new(),
            advisories: Vec::new(),
            usage: UsageTotals::default(),
            confidence: ConfidenceTracker::new(),
            step_records: Vec::new(),
        }
    }

    /// Current working lines.
    #[must_use]
    pub fn working_lines(&self) -> &[String] {
        &self.working
    }

    /// Current working text joined with newlines.
    #[must_use]
    pub fn working_text(&self) -> String {
        self.working.join("\n")
    }

    #[must_use]
    pub fn line_count(&self) -> usize {
        self.working.len()
    }

    /// Word count of the current working text.
    #[must_use]
    pub fn word_count(&self) -> usize {
        word_count_lines(&self.working)
    }

    /// Replace the working text wholesale (reflow, character cleaning,
    /// assembly).
    pub fn replace_working_text(&mut self, text: String) {
        self.working = if text.is_empty() {
            Vec::new()
        } else {
            text.split('\n').map(|l| l.to_string()).collect()
        };
    }

    /// Replace the working lines directly.
    pub fn replace_working_lines(&mut self, lines: Vec<String>) {
        self.working = lines;
    }

    /// Delete an inclusive line range, returning the removed word count.
    ///
    /// Indices refer to the current working text; the caller records the
    /// range in a removal record before subsequent steps shift lines.
    pub fn remove_line_range(&mut self, start: usize, end: usize) -> usize {
        if start > end || start >= self.working.len() {
            return 0;
        }
        let end = end.min(self.working.len() - 1);
        let removed: Vec<String> = self.working.drain(start..=end).collect();
        // A blank line left at the seam keeps paragraphs from merging.
        if start > 0
            && start < self.working.len()
            && !self.working[start - 1].trim().is_empty()
            && !self.working[start].trim().is_empty()
        {
            self.working.insert(start, String::new());
        }
        word_count_lines(&removed)
    }

    /// Effective content flags: reconnaissance merged with metadata.
    #[must_use]
    pub fn content_flags(&self) -> ContentFlags {
        let recon = self
            .hints
            .as_ref()
            .map(|h| h.content_flags)
            .unwrap_or_default();
        let meta = self
            .metadata
            .as_ref()
            .map(|m| m.content_flags)
            .unwrap_or_default();
        ContentFlags {
            poetry: recon.poetry || meta.poetry,
            dialogue: recon.dialogue || meta.dialogue,
            code: recon.code || meta.code,
            tables: recon.tables || meta.tables,
            math: recon.math || meta.math,
            academic: recon.academic || meta.academic,
            footnotes: recon.footnotes || meta.footnotes,
        }
    }

    pub fn push_advisory(&mut self, advisory: Advisory) {
        self.advisories.push(advisory);
    }

    pub fn push_removal(&mut self, record: RemovalRecord) {
        self.removal_records.push(record);
    }
}
