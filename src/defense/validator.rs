//! Phase A: quantitative boundary validation.
//!
//! Pure arithmetic over a proposal: position in the document, removal
//! size, section length, and detection confidence, each constrained per
//! section kind. Rejections carry an enumerated reason plus a suggestion
//! the orchestrator can surface in diagnostics.

use serde::{Deserialize, Serialize};

use super::{BoundaryProposal, PositionRule, SectionKind};
use crate::types::StructureHints;

/// Why Phase A rejected a proposal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionReason {
    PositionTooEarly,
    PositionTooLate,
    InvalidRange,
    OutOfBounds,
    ExcessiveRemoval,
    SectionTooSmall,
    LowConfidence,
    InconsistentWithHints,
}

impl std::fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            RejectionReason::PositionTooEarly => "position too early",
            RejectionReason::PositionTooLate => "position too late",
            RejectionReason::InvalidRange => "invalid range",
            RejectionReason::OutOfBounds => "out of bounds",
            RejectionReason::ExcessiveRemoval => "excessive removal",
            RejectionReason::SectionTooSmall => "section too small",
            RejectionReason::LowConfidence => "low confidence",
            RejectionReason::InconsistentWithHints => "inconsistent with hints",
        };
        write!(f, "{label}")
    }
}

/// Phase A verdict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BoundaryCheck {
    Valid {
        reason: String,
    },
    Invalid {
        reason: RejectionReason,
        explanation: String,
        suggestion: Option<String>,
    },
}

impl BoundaryCheck {
    #[must_use]
    pub fn is_valid(&self) -> bool {
        matches!(self, BoundaryCheck::Valid { .. })
    }

    /// Short description joining this verdict with the Phase B one for a
    /// rejection explanation.
    #[must_use]
    pub fn describe_with(&self, verdict: &super::ContentVerdict) -> String {
        let a = match self {
            BoundaryCheck::Valid { .. } => "position ok".to_string(),
            BoundaryCheck::Invalid { reason, .. } => format!("{reason}"),
        };
        let b = if verdict.passed {
            "content ok".to_string()
        } else {
            verdict
                .rejection
                .clone()
                .unwrap_or_else(|| "content markers missing".to_string())
        };
        format!("{a}; {b}")
    }
}

/// Quantitative gate over a proposed boundary.
#[derive(Debug, Clone, Copy, Default)]
pub struct BoundaryValidator;

impl BoundaryValidator {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Validate a proposal against the section rules and document shape.
    pub fn validate(
        &self,
        proposal: &BoundaryProposal,
        line_count: usize,
        hints: Option<&StructureHints>,
    ) -> BoundaryCheck {
        let rules = proposal.kind.rules();

        if line_count == 0 || proposal.start_line > proposal.end_line {
            return invalid(
                RejectionReason::InvalidRange,
                format!(
                    "range {}..={} is inverted or the document is empty",
                    proposal.start_line, proposal.end_line
                ),
                None,
            );
        }
        if proposal.end_line >= line_count {
            return invalid(
                RejectionReason::OutOfBounds,
                format!(
                    "end line {} exceeds document of {line_count} lines",
                    proposal.end_line
                ),
                Some("re-run detection against the current working text".into()),
            );
        }

        let pct = |line: usize| 100.0 * line as f64 / line_count as f64;
        match rules.position {
            PositionRule::EndAtMostPercent(max) => {
                if pct(proposal.end_line) > max {
                    return invalid(
                        RejectionReason::PositionTooLate,
                        format!(
                            "{} cannot end at line {} ({:.0}% of document; limit {max:.0}%)",
                            proposal.kind,
                            proposal.end_line,
                            pct(proposal.end_line)
                        ),
                        Some(format!(
                            "expected the section to end within the first {max:.0}% of the document"
                        )),
                    );
                }
            }
            PositionRule::StartAtLeastPercent(min) => {
                if pct(proposal.start_line) < min {
                    return invalid(
                        RejectionReason::PositionTooEarly,
                        format!(
                            "{} cannot start at line {} ({:.0}% of document; must be past {min:.0}%)",
                            proposal.kind,
                            proposal.start_line,
                            pct(proposal.start_line)
                        ),
                        Some(format!(
                            "expected the section to start after {:.0} lines",
                            min / 100.0 * line_count as f64
                        )),
                    );
                }
            }
            PositionRule::StartWithinPercent { min, max } => {
                let p = pct(proposal.start_line);
                if p < min {
                    return invalid(
                        RejectionReason::PositionTooEarly,
                        format!(
                            "{} start at {:.0}% is before the {min:.0}% floor",
                            proposal.kind, p
                        ),
                        None,
                    );
                }
                if p > max {
                    return invalid(
                        RejectionReason::PositionTooLate,
                        format!(
                            "{} start at {:.0}% is past the {max:.0}% ceiling",
                            proposal.kind, p
                        ),
                        None,
                    );
                }
            }
        }

        let section_lines = proposal.end_line - proposal.start_line + 1;
        if section_lines < rules.min_lines {
            return invalid(
                RejectionReason::SectionTooSmall,
                format!(
                    "{} spans {section_lines} lines; minimum is {}",
                    proposal.kind, rules.min_lines
                ),
                Some("a real section of this kind is longer; likely a stray heading".into()),
            );
        }

        if let Some(max_pct) = rules.max_removal_percent {
            let removal_pct = 100.0 * section_lines as f64 / line_count as f64;
            if removal_pct > max_pct {
                return invalid(
                    RejectionReason::ExcessiveRemoval,
                    format!(
                        "{} removal would delete {removal_pct:.0}% of the document (limit {max_pct:.0}%)",
                        proposal.kind
                    ),
                    Some("narrow the boundary before retrying".into()),
                );
            }
        }

        if proposal.confidence < rules.min_confidence {
            return invalid(
                RejectionReason::LowConfidence,
                format!(
                    "detection confidence {:.2} below the {:.2} floor for {}",
                    proposal.confidence, rules.min_confidence, proposal.kind
                ),
                None,
            );
        }

        if let Some(hints) = hints {
            if let Some(conflict) = self.hint_conflict(proposal, hints) {
                return invalid(RejectionReason::InconsistentWithHints, conflict, None);
            }
        }

        BoundaryCheck::Valid {
            reason: format!(
                "{} boundary within position, size, and confidence limits",
                proposal.kind
            ),
        }
    }

    /// A front-matter region that swallows a confidently detected chapter
    /// start contradicts reconnaissance.
    fn hint_conflict(
        &self,
        proposal: &BoundaryProposal,
        hints: &StructureHints,
    ) -> Option<String> {
        if !matches!(
            proposal.kind,
            SectionKind::FrontMatter | SectionKind::TableOfContents
        ) {
            return None;
        }
        hints
            .chapters
            .iter()
            .filter(|c| c.confidence >= 0.7)
            .find(|c| c.start_line <= proposal.end_line)
            .map(|c| {
                format!(
                    "proposed {} region contains detected chapter {:?} at line {}",
                    proposal.kind, c.name, c.start_line
                )
            })
    }
}

fn invalid(
    reason: RejectionReason,
    explanation: String,
    suggestion: Option<String>,
) -> BoundaryCheck {
    BoundaryCheck::Invalid {
        reason,
        explanation,
        suggestion,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ChapterHint;

    fn proposal(kind: SectionKind, start: usize, end: usize, confidence: f64) -> BoundaryProposal {
        BoundaryProposal {
            kind,
            start_line: start,
            end_line: end,
            confidence,
            evidence: vec![],
        }
    }

    fn reason(check: &BoundaryCheck) -> Option<RejectionReason> {
        match check {
            BoundaryCheck::Valid { .. } => None,
            BoundaryCheck::Invalid { reason, .. } => Some(*reason),
        }
    }

    #[test]
    fn front_matter_within_limits_is_valid() {
        let v = BoundaryValidator::new();
        let check = v.validate(&proposal(SectionKind::FrontMatter, 0, 30, 0.8), 400, None);
        assert!(check.is_valid());
    }

    #[test]
    fn front_matter_position_too_late() {
        let v = BoundaryValidator::new();
        let check = v.validate(&proposal(SectionKind::FrontMatter, 0, 200, 0.9), 400, None);
        assert_eq!(reason(&check), Some(RejectionReason::PositionTooLate));
    }

    #[test]
    fn back_matter_position_too_early() {
        let v = BoundaryValidator::new();
        let check = v.validate(&proposal(SectionKind::BackMatter, 4, 414, 0.80), 415, None);
        assert_eq!(reason(&check), Some(RejectionReason::PositionTooEarly));
    }

    #[test]
    fn back_matter_confidence_floor_is_070() {
        let v = BoundaryValidator::new();
        let check = v.validate(&proposal(SectionKind::BackMatter, 300, 390, 0.65), 400, None);
        assert_eq!(reason(&check), Some(RejectionReason::LowConfidence));
        let check = v.validate(&proposal(SectionKind::BackMatter, 300, 390, 0.70), 400, None);
        assert!(check.is_valid());
    }

    #[test]
    fn toc_excessive_removal() {
        let v = BoundaryValidator::new();
        // 120 of 400 lines is 30%, above the 20% TOC ceiling.
        let check = v.validate(
            &proposal(SectionKind::TableOfContents, 10, 129, 0.9),
            400,
            None,
        );
        assert_eq!(reason(&check), Some(RejectionReason::ExcessiveRemoval));
    }

    #[test]
    fn index_too_small() {
        let v = BoundaryValidator::new();
        let check = v.validate(&proposal(SectionKind::Index, 380, 385, 0.9), 400, None);
        assert_eq!(reason(&check), Some(RejectionReason::SectionTooSmall));
    }

    #[test]
    fn inverted_range_and_out_of_bounds() {
        let v = BoundaryValidator::new();
        let check = v.validate(&proposal(SectionKind::FrontMatter, 10, 5, 0.9), 400, None);
        assert_eq!(reason(&check), Some(RejectionReason::InvalidRange));
        let check = v.validate(&proposal(SectionKind::FrontMatter, 0, 400, 0.9), 400, None);
        assert_eq!(reason(&check), Some(RejectionReason::OutOfBounds));
    }

    #[test]
    fn footnote_window() {
        let v = BoundaryValidator::new();
        let check = v.validate(&proposal(SectionKind::FootnoteSection, 2, 10, 0.9), 400, None);
        assert_eq!(reason(&check), Some(RejectionReason::PositionTooEarly));
        let check = v.validate(
            &proposal(SectionKind::FootnoteSection, 390, 399, 0.9),
            400,
            None,
        );
        assert_eq!(reason(&check), Some(RejectionReason::PositionTooLate));
        let check = v.validate(
            &proposal(SectionKind::FootnoteSection, 200, 210, 0.9),
            400,
            None,
        );
        assert!(check.is_valid());
    }

    #[test]
    fn chapter_hint_conflict() {
        let v = BoundaryValidator::new();
        let hints = StructureHints {
            chapters: vec![ChapterHint {
                name: "Chapter One".into(),
                start_line: 20,
                confidence: 0.9,
            }],
            ..Default::default()
        };
        let check = v.validate(
            &proposal(SectionKind::FrontMatter, 0, 40, 0.9),
            400,
            Some(&hints),
        );
        assert_eq!(reason(&check), Some(RejectionReason::InconsistentWithHints));
    }
}
