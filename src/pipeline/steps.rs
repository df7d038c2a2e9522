//! Step and phase identities plus the per-step state machine.
//!
//! The pipeline is 16 strictly ordered steps grouped into phases. Each
//! step's lifecycle is `Pending → Running → {Completed | Skipped | Failed |
//! Cancelled}`; only `Completed` contributes to confidence aggregation.

use serde::{Deserialize, Serialize};

/// Processing phases, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelinePhase {
    Reconnaissance,
    Metadata,
    PageCleanup,
    StructuralRemoval,
    ReferenceCleaning,
    Reflow,
    CharacterCleaning,
    Assembly,
    Review,
}

impl PipelinePhase {
    /// Stable label used as the phase-confidence map key.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            PipelinePhase::Reconnaissance => "reconnaissance",
            PipelinePhase::Metadata => "metadata",
            PipelinePhase::PageCleanup => "page_cleanup",
            PipelinePhase::StructuralRemoval => "structural_removal",
            PipelinePhase::ReferenceCleaning => "reference_cleaning",
            PipelinePhase::Reflow => "reflow",
            PipelinePhase::CharacterCleaning => "character_cleaning",
            PipelinePhase::Assembly => "assembly",
            PipelinePhase::Review => "review",
        }
    }
}

impl std::fmt::Display for PipelinePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// The sixteen pipeline steps in execution order.
///
/// Reference cleaning runs citations before footnotes, and reflow runs
/// before character cleaning, so pattern detection always sees text whose
/// punctuation and spacing have not yet been rewritten.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStep {
    Reconnaissance,
    MetadataExtraction,
    PageNumbers,
    HeadersFooters,
    FrontMatter,
    TableOfContents,
    BackMatter,
    Index,
    AuxiliaryLists,
    Citations,
    FootnotesEndnotes,
    Reflow,
    CharacterCleaning,
    Optimize,
    Assembly,
    FinalReview,
}

impl PipelineStep {
    /// All steps, in execution order.
    pub const ALL: [PipelineStep; 16] = [
        PipelineStep::Reconnaissance,
        PipelineStep::MetadataExtraction,
        PipelineStep::PageNumbers,
        PipelineStep::HeadersFooters,
        PipelineStep::FrontMatter,
        PipelineStep::TableOfContents,
        PipelineStep::BackMatter,
        PipelineStep::Index,
        PipelineStep::AuxiliaryLists,
        PipelineStep::Citations,
        PipelineStep::FootnotesEndnotes,
        PipelineStep::Reflow,
        PipelineStep::CharacterCleaning,
        PipelineStep::Optimize,
        PipelineStep::Assembly,
        PipelineStep::FinalReview,
    ];

    /// 1-based step number, stable across configurations.
    #[must_use]
    pub fn number(&self) -> u8 {
        PipelineStep::ALL
            .iter()
            .position(|s| s == self)
            .map(|i| i as u8 + 1)
            .unwrap_or(0)
    }

    /// The phase this step belongs to.
    #[must_use]
    pub fn phase(&self) -> PipelinePhase {
        match self {
            PipelineStep::Reconnaissance => PipelinePhase::Reconnaissance,
            PipelineStep::MetadataExtraction => PipelinePhase::Metadata,
            PipelineStep::PageNumbers | PipelineStep::HeadersFooters => PipelinePhase::PageCleanup,
            PipelineStep::FrontMatter
            | PipelineStep::TableOfContents
            | PipelineStep::BackMatter
            | PipelineStep::Index => PipelinePhase::StructuralRemoval,
            PipelineStep::AuxiliaryLists
            | PipelineStep::Citations
            | PipelineStep::FootnotesEndnotes => PipelinePhase::ReferenceCleaning,
            PipelineStep::Reflow | PipelineStep::Optimize => PipelinePhase::Reflow,
            PipelineStep::CharacterCleaning => PipelinePhase::CharacterCleaning,
            PipelineStep::Assembly => PipelinePhase::Assembly,
            PipelineStep::FinalReview => PipelinePhase::Review,
        }
    }

    /// Display label for logs and progress events.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            PipelineStep::Reconnaissance => "reconnaissance",
            PipelineStep::MetadataExtraction => "metadata_extraction",
            PipelineStep::PageNumbers => "page_numbers",
            PipelineStep::HeadersFooters => "headers_footers",
            PipelineStep::FrontMatter => "front_matter",
            PipelineStep::TableOfContents => "table_of_contents",
            PipelineStep::BackMatter => "back_matter",
            PipelineStep::Index => "index",
            PipelineStep::AuxiliaryLists => "auxiliary_lists",
            PipelineStep::Citations => "citations",
            PipelineStep::FootnotesEndnotes => "footnotes_endnotes",
            PipelineStep::Reflow => "reflow",
            PipelineStep::CharacterCleaning => "character_cleaning",
            PipelineStep::Optimize => "optimize",
            PipelineStep::Assembly => "assembly",
            PipelineStep::FinalReview => "final_review",
        }
    }
}

impl std::fmt::Display for PipelineStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Terminal and transient states of one step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum StepStatus {
    Pending,
    Running,
    Completed {
        confidence: f64,
        /// Words removed by the step (0 for word-preserving steps).
        word_delta: usize,
    },
    Skipped,
    Failed {
        reason: String,
    },
    Cancelled,
}

impl StepStatus {
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, StepStatus::Pending | StepStatus::Running)
    }

    #[must_use]
    pub fn is_completed(&self) -> bool {
        matches!(self, StepStatus::Completed { .. })
    }
}

/// Execution record for one step, carried into the result envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    pub step: PipelineStep,
    pub number: u8,
    pub phase: PipelinePhase,
    pub status: StepStatus,
    pub duration_ms: u64,
    pub words_before: usize,
    pub words_after: usize,
}

impl StepRecord {
    /// Fresh pending record for a step.
    #[must_use]
    pub fn pending(step: PipelineStep) -> Self {
        Self {
            step,
            number: step.number(),
            phase: step.phase(),
            status: StepStatus::Pending,
            duration_ms: 0,
            words_before: 0,
            words_after: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn steps_are_numbered_in_order() {
        assert_eq!(PipelineStep::Reconnaissance.number(), 1);
        assert_eq!(PipelineStep::AuxiliaryLists.number(), 9);
        assert_eq!(PipelineStep::Citations.number(), 10);
        assert_eq!(PipelineStep::FootnotesEndnotes.number(), 11);
        assert_eq!(PipelineStep::Reflow.number(), 12);
        assert_eq!(PipelineStep::CharacterCleaning.number(), 13);
        assert_eq!(PipelineStep::Optimize.number(), 14);
        assert_eq!(PipelineStep::FinalReview.number(), 16);
    }

    #[test]
    fn citation_ordering_invariant() {
        let order = |s: PipelineStep| s.number();
        assert!(order(PipelineStep::Citations) < order(PipelineStep::FootnotesEndnotes));
        assert!(order(PipelineStep::FootnotesEndnotes) < order(PipelineStep::Reflow));
        assert!(order(PipelineStep::Reflow) < order(PipelineStep::CharacterCleaning));
    }

    #[test]
    fn status_terminality() {
        assert!(!StepStatus::Pending.is_terminal());
        assert!(!StepStatus::Running.is_terminal());
        assert!(StepStatus::Skipped.is_terminal());
        assert!(
            StepStatus::Completed {
                confidence: 0.9,
                word_delta: 0
            }
            .is_completed()
        );
    }
}
