//! Three-layer defense system around structural removals.
//!
//! Every proposed line-range removal passes through the layers in order:
//!
//! 1. **Phase A** — [`BoundaryValidator`]: quantitative position, size, and
//!    confidence gates per section kind.
//! 2. **Phase B** — [`ContentVerifier`]: qualitative check that the region
//!    actually reads like the claimed section, with multilingual markers
//!    and chapter-indicator rejection.
//! 3. **Phase C** — [`HeuristicBoundaryDetector`]: deterministic weighted
//!    pattern scan used when A/B disagree with the detection.
//!
//! Removal proceeds when the gate passes (A ∧ B for structural sections,
//! A ∨ B for auxiliary lists) or when Phase C produces a candidate with
//! weight ≥ 0.6. Otherwise nothing is removed; the conservative default is
//! always preservation.

pub mod heuristic;
pub mod validator;
pub mod verifier;

pub use heuristic::{HeuristicBoundaryDetector, HeuristicCandidate};
pub use validator::{BoundaryCheck, BoundaryValidator, RejectionReason};
pub use verifier::{ContentVerdict, ContentVerifier};

use serde::{Deserialize, Serialize};

use crate::types::{RemovalKind, StructureHints, ValidationMethod};

/// Minimum Phase C weight that may authorise a removal.
pub const HEURISTIC_REMOVAL_THRESHOLD: f64 = 0.6;

// ── Section kinds & rules ──────────────────────────────────────────────

/// Section kinds protected by the defense system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionKind {
    FrontMatter,
    TableOfContents,
    BackMatter,
    Index,
    AuxiliaryList,
    FootnoteSection,
}

impl SectionKind {
    /// The removal category recorded when this section is deleted.
    #[must_use]
    pub fn removal_kind(&self) -> RemovalKind {
        match self {
            SectionKind::FrontMatter => RemovalKind::FrontMatter,
            SectionKind::TableOfContents => RemovalKind::Toc,
            SectionKind::BackMatter => RemovalKind::BackMatter,
            SectionKind::Index => RemovalKind::Index,
            SectionKind::AuxiliaryList => RemovalKind::AuxList,
            SectionKind::FootnoteSection => RemovalKind::Footnotes,
        }
    }

    /// Quantitative constraints for this kind.
    #[must_use]
    pub fn rules(&self) -> SectionRules {
        match self {
            SectionKind::FrontMatter => SectionRules {
                position: PositionRule::EndAtMostPercent(40.0),
                max_removal_percent: Some(40.0),
                min_confidence: 0.60,
                min_lines: 3,
            },
            SectionKind::TableOfContents => SectionRules {
                position: PositionRule::EndAtMostPercent(35.0),
                max_removal_percent: Some(20.0),
                min_confidence: 0.60,
                min_lines: 5,
            },
            SectionKind::BackMatter => SectionRules {
                position: PositionRule::StartAtLeastPercent(50.0),
                max_removal_percent: Some(45.0),
                min_confidence: 0.70,
                min_lines: 5,
            },
            SectionKind::Index => SectionRules {
                position: PositionRule::StartAtLeastPercent(60.0),
                max_removal_percent: Some(25.0),
                min_confidence: 0.65,
                min_lines: 10,
            },
            SectionKind::AuxiliaryList => SectionRules {
                position: PositionRule::EndAtMostPercent(40.0),
                max_removal_percent: Some(15.0),
                min_confidence: 0.65,
                min_lines: 3,
            },
            SectionKind::FootnoteSection => SectionRules {
                position: PositionRule::StartWithinPercent {
                    min: 5.0,
                    max: 95.0,
                },
                max_removal_percent: None,
                min_confidence: 0.70,
                min_lines: 4,
            },
        }
    }

    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            SectionKind::FrontMatter => "front matter",
            SectionKind::TableOfContents => "table of contents",
            SectionKind::BackMatter => "back matter",
            SectionKind::Index => "index",
            SectionKind::AuxiliaryList => "auxiliary list",
            SectionKind::FootnoteSection => "footnote section",
        }
    }
}

impl std::fmt::Display for SectionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Positional constraint expressed in percent of document lines.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PositionRule {
    /// The section's end line must be within the first N percent.
    EndAtMostPercent(f64),
    /// The section's start line must be past the first N percent.
    StartAtLeastPercent(f64),
    /// The section's start line must be inside the window.
    StartWithinPercent { min: f64, max: f64 },
}

/// Quantitative gate parameters for one section kind.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SectionRules {
    pub position: PositionRule,
    /// Largest share of the document the removal may cover, in percent.
    pub max_removal_percent: Option<f64>,
    pub min_confidence: f64,
    pub min_lines: usize,
}

// ── Proposal & outcome ─────────────────────────────────────────────────

/// A removal candidate produced by detection (LLM or heuristic).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundaryProposal {
    pub kind: SectionKind,
    /// Inclusive 0-based start within the current working text.
    pub start_line: usize,
    /// Inclusive 0-based end within the current working text.
    pub end_line: usize,
    pub confidence: f64,
    pub evidence: Vec<String>,
}

/// Gate combination mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateMode {
    /// Phase A and Phase B must both pass (structural sections).
    AllOf,
    /// Either phase suffices (auxiliary lists).
    AnyOf,
}

/// Full decision record for one proposal.
#[derive(Debug, Clone)]
pub struct DefenseOutcome {
    pub approved: bool,
    /// Which layer authorised the removal, when approved.
    pub method: Option<ValidationMethod>,
    /// Confidence to record for the step.
    pub confidence: f64,
    /// Range to remove; Phase C may substitute its own boundary.
    pub range: Option<(usize, usize)>,
    pub phase_a: BoundaryCheck,
    pub phase_b: ContentVerdict,
    pub phase_c: Option<HeuristicCandidate>,
    pub explanation: String,
}

// ── Defense system ─────────────────────────────────────────────────────

/// Facade running the three layers in order over a proposal.
#[derive(Debug, Default)]
pub struct DefenseSystem {
    validator: BoundaryValidator,
    verifier: ContentVerifier,
    heuristic: HeuristicBoundaryDetector,
}

impl DefenseSystem {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Evaluate a proposal against the working text.
    ///
    /// `lines` is the step's input working text; `hints` supplies chapter
    /// positions for the consistency check.
    pub fn evaluate(
        &self,
        proposal: &BoundaryProposal,
        lines: &[String],
        hints: Option<&StructureHints>,
        mode: GateMode,
    ) -> DefenseOutcome {
        let phase_a = self.validator.validate(proposal, lines.len(), hints);
        let phase_b = self.verifier.verify(proposal, lines);

        let a_ok = phase_a.is_valid();
        let b_ok = phase_b.passed;
        let gate_ok = match mode {
            GateMode::AllOf => a_ok && b_ok,
            GateMode::AnyOf => a_ok || b_ok,
        };

        if gate_ok {
            let (method, confidence) = if b_ok {
                (ValidationMethod::PhaseB, phase_b.confidence)
            } else {
                (ValidationMethod::PhaseA, proposal.confidence)
            };
            return DefenseOutcome {
                approved: true,
                method: Some(method),
                confidence,
                range: Some((proposal.start_line, proposal.end_line)),
                explanation: format!(
                    "{} removal approved ({})",
                    proposal.kind,
                    if a_ok && b_ok {
                        "position and content verified"
                    } else if a_ok {
                        "position verified"
                    } else {
                        "content verified"
                    }
                ),
                phase_a,
                phase_b,
                phase_c: None,
            };
        }

        // A/B disagreed with the detection; fall back to the deterministic
        // scan under the same positional constraints.
        let phase_c = self.heuristic.detect(proposal.kind, lines);
        if let Some(candidate) = &phase_c {
            let span = candidate.end_line.saturating_sub(candidate.start_line) + 1;
            if candidate.weight >= HEURISTIC_REMOVAL_THRESHOLD
                && span >= proposal.kind.rules().min_lines
            {
                let range = (candidate.start_line, candidate.end_line);
                return DefenseOutcome {
                    approved: true,
                    method: Some(ValidationMethod::PhaseC),
                    confidence: candidate.weight,
                    range: Some(range),
                    explanation: format!(
                        "{} removal approved by heuristic pattern {} (weight {:.2})",
                        proposal.kind, candidate.pattern, candidate.weight
                    ),
                    phase_a,
                    phase_b,
                    phase_c,
                };
            }
        }

        let explanation = format!(
            "{} removal rejected: {}; heuristic fallback {}",
            proposal.kind,
            phase_a.describe_with(&phase_b),
            match &phase_c {
                Some(c) => format!("found only weight {:.2} (< {HEURISTIC_REMOVAL_THRESHOLD})", c.weight),
                None => "found no candidate".to_string(),
            }
        );
        DefenseOutcome {
            approved: false,
            method: None,
            confidence: 0.0,
            range: None,
            phase_a,
            phase_b,
            phase_c,
            explanation,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numbered_lines(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("narrative line {i} of the story")).collect()
    }

    #[test]
    fn early_back_matter_is_rejected_and_preserved() {
        // 415 lines, detection claims back matter starts at line 4.
        let lines = numbered_lines(415);
        let proposal = BoundaryProposal {
            kind: SectionKind::BackMatter,
            start_line: 4,
            end_line: 414,
            confidence: 0.80,
            evidence: vec![],
        };
        let outcome =
            DefenseSystem::new().evaluate(&proposal, &lines, None, GateMode::AllOf);
        assert!(!outcome.approved);
        assert!(matches!(
            outcome.phase_a,
            BoundaryCheck::Invalid {
                reason: RejectionReason::PositionTooEarly,
                ..
            }
        ));
        assert!(outcome.range.is_none());
    }

    #[test]
    fn heuristic_rescues_rejected_back_matter() {
        let mut lines = numbered_lines(400);
        lines[380] = "## NOTES".to_string();
        for line in lines.iter_mut().skip(381) {
            *line = "1. A note about something".to_string();
        }
        // The detection got the start line wrong (too early) so A fails,
        // but the heuristic finds the heading in the allowed window.
        let proposal = BoundaryProposal {
            kind: SectionKind::BackMatter,
            start_line: 10,
            end_line: 399,
            confidence: 0.9,
            evidence: vec![],
        };
        let outcome =
            DefenseSystem::new().evaluate(&proposal, &lines, None, GateMode::AllOf);
        assert!(outcome.approved);
        assert_eq!(outcome.method, Some(crate::types::ValidationMethod::PhaseC));
        assert_eq!(outcome.range, Some((380, 399)));
    }

    #[test]
    fn aux_list_gate_is_any_of() {
        // A valid position but no recognisable list content: A alone
        // passes under AnyOf.
        let mut lines = numbered_lines(100);
        lines[2] = "List of Figures".to_string();
        lines[3] = "Figure 1 ... 10".to_string();
        lines[4] = "Figure 2 ... 22".to_string();
        let proposal = BoundaryProposal {
            kind: SectionKind::AuxiliaryList,
            start_line: 2,
            end_line: 4,
            confidence: 0.8,
            evidence: vec![],
        };
        let outcome =
            DefenseSystem::new().evaluate(&proposal, &lines, None, GateMode::AnyOf);
        assert!(outcome.approved);
    }
}
