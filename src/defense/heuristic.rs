//! Phase C: deterministic heuristic boundary detection.
//!
//! Position-constrained weighted pattern scan, used both as the fallback
//! layer of the defense system and as the boundary source when the LLM is
//! unavailable. The scan window per section kind matches the Phase A
//! positional constraints, so a heuristic candidate can never propose a
//! removal Phase A would reject on position.
//!
//! Weak signals (footer repetition, page-number sequences) score below the
//! 0.6 removal threshold; they are recorded for diagnostics but never
//! trigger a removal.

use regex::Regex;
use std::sync::LazyLock;

use super::{PositionRule, SectionKind};
use crate::patterns::{CHAPTER_INDICATOR, PAGE_NUMBER_LINE};
use crate::textutil::normalize_for_repetition;

/// A heuristic boundary candidate with its pattern weight.
#[derive(Debug, Clone, PartialEq)]
pub struct HeuristicCandidate {
    pub start_line: usize,
    pub end_line: usize,
    pub weight: f64,
    pub pattern: &'static str,
}

/// Deterministic boundary scanner.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicBoundaryDetector;

static MD_NOTES: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^#{1,3}\s*(?:NOTES|ENDNOTES)\s*$").expect("md notes regex")
});
static BARE_NOTES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(?:NOTES|ENDNOTES)\s*$").expect("bare notes regex"));
static BIBLIOGRAPHY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:#{1,3}\s*)?(?:BIBLIOGRAPHY|REFERENCES|WORKS\s+CITED)\s*$")
        .expect("bibliography regex")
});
static APPENDIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:#{1,3}\s*)?APPENDIX(?:\s+[A-Z0-9]+)?\s*$").expect("appendix regex")
});
static GLOSSARY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:#{1,3}\s*)?GLOSSARY\s*$").expect("glossary regex"));
static INDEX_HEADING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:#{1,3}\s*)?INDEX\s*$").expect("index heading regex"));
static INDEX_ENTRY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-zÀ-ÿ][^,]{0,60},\s*\d{1,4}").expect("index entry regex")
});
static FRONT_SIGNAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)copyright|©|all rights reserved|isbn|published by|first edition|dedicat|acknowledg|derechos reservados|tous droits",
    )
    .expect("front signal regex")
});
static CONTENTS_HEADING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^\s*(?:#{1,3}\s*)?(?:table of contents|contents|índice|contenido|table des matières|sommaire|inhaltsverzeichnis|inhalt|sumário)\s*$",
    )
    .expect("contents heading regex")
});
static TOC_ENTRY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:\.{3,}\s*\d{1,4}\s*$|\s\d{1,4}\s*$)").expect("toc entry regex")
});
static AUX_HEADING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^\s*(?:#{1,3}\s*)?(?:list of (?:figures|illustrations|plates|maps|charts|diagrams|tables|exhibits|code samples|equations|abbreviations|acronyms|symbols)|lista de \w+|liste des \w+|\w*verzeichnis)\s*$",
    )
    .expect("aux heading regex")
});

impl HeuristicBoundaryDetector {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Scan for a boundary of `kind` within its positional window.
    ///
    /// Returns the strongest candidate, or `None` when nothing matched.
    pub fn detect(&self, kind: SectionKind, lines: &[String]) -> Option<HeuristicCandidate> {
        if lines.is_empty() {
            return None;
        }
        let n = lines.len();
        let (window_start, window_end) = scan_window(kind, n);

        match kind {
            SectionKind::BackMatter => self.scan_back_matter(lines, window_start, window_end),
            SectionKind::Index => self.scan_index(lines, window_start, window_end),
            SectionKind::FootnoteSection => self.scan_notes_section(lines, window_start, window_end),
            SectionKind::FrontMatter => self.scan_front_matter(lines, window_end),
            SectionKind::TableOfContents => self.scan_toc(lines, window_end),
            SectionKind::AuxiliaryList => self.scan_aux_list(lines, window_end),
        }
    }

    /// Fallback front-matter boundary for the reconnaissance phase.
    pub fn front_matter_end(&self, lines: &[String]) -> Option<HeuristicCandidate> {
        self.detect(SectionKind::FrontMatter, lines)
    }

    /// Fallback back-matter boundary for the reconnaissance phase.
    pub fn back_matter_start(&self, lines: &[String]) -> Option<HeuristicCandidate> {
        self.detect(SectionKind::BackMatter, lines)
    }

    fn scan_back_matter(
        &self,
        lines: &[String],
        start: usize,
        end: usize,
    ) -> Option<HeuristicCandidate> {
        let mut best: Option<HeuristicCandidate> = None;
        for idx in start..=end {
            let line = lines[idx].trim();
            let hit: Option<(f64, &'static str)> = if MD_NOTES.is_match(line) {
                Some((1.00, "markdown NOTES heading"))
            } else if BIBLIOGRAPHY.is_match(line) {
                Some((0.90, "bibliography heading"))
            } else if BARE_NOTES.is_match(line) {
                Some((0.85, "bare NOTES heading"))
            } else if APPENDIX.is_match(line) {
                Some((0.85, "appendix heading"))
            } else if INDEX_HEADING.is_match(line) && self.has_index_entries(lines, idx) {
                Some((0.85, "index with alphabetised entries"))
            } else if GLOSSARY.is_match(line) {
                Some((0.80, "glossary heading"))
            } else {
                None
            };
            if let Some((weight, pattern)) = hit {
                let candidate = HeuristicCandidate {
                    start_line: idx,
                    end_line: lines.len() - 1,
                    weight,
                    pattern,
                };
                // Earliest strongest candidate wins: prefer higher weight,
                // then the earlier line so the whole tail is captured.
                let better = best
                    .as_ref()
                    .map(|b| weight > b.weight)
                    .unwrap_or(true);
                if better {
                    best = Some(candidate);
                }
            }
        }
        best.or_else(|| self.weak_tail_signal(lines, start, end))
    }

    fn scan_index(&self, lines: &[String], start: usize, end: usize) -> Option<HeuristicCandidate> {
        (start..=end)
            .find(|&idx| {
                INDEX_HEADING.is_match(lines[idx].trim()) && self.has_index_entries(lines, idx)
            })
            .map(|idx| HeuristicCandidate {
                start_line: idx,
                end_line: lines.len() - 1,
                weight: 0.85,
                pattern: "index with alphabetised entries",
            })
    }

    fn scan_notes_section(
        &self,
        lines: &[String],
        start: usize,
        end: usize,
    ) -> Option<HeuristicCandidate> {
        for idx in start..=end {
            let line = lines[idx].trim();
            let weight = if MD_NOTES.is_match(line) {
                1.00
            } else if BARE_NOTES.is_match(line) {
                0.85
            } else {
                continue;
            };
            // Section extends over the run of numbered entries that follows.
            let mut last = idx;
            for (offset, follow) in lines[idx + 1..].iter().enumerate() {
                let trimmed = follow.trim();
                if trimmed.is_empty()
                    || trimmed.starts_with(|c: char| c.is_ascii_digit())
                {
                    last = idx + 1 + offset;
                } else {
                    break;
                }
            }
            if last > idx {
                return Some(HeuristicCandidate {
                    start_line: idx,
                    end_line: last,
                    weight,
                    pattern: "notes heading with numbered entries",
                });
            }
        }
        None
    }

    fn scan_front_matter(&self, lines: &[String], window_end: usize) -> Option<HeuristicCandidate> {
        // The strongest signal is the first chapter heading: front matter
        // ends on the line before it.
        if let Some(idx) = (0..=window_end).find(|&i| CHAPTER_INDICATOR.is_match(&lines[i])) {
            if idx >= 1 {
                return Some(HeuristicCandidate {
                    start_line: 0,
                    end_line: idx - 1,
                    weight: 0.85,
                    pattern: "first chapter heading",
                });
            }
            return None;
        }
        // Otherwise, the last front-matter keyword line inside the window.
        (0..=window_end)
            .rev()
            .find(|&i| FRONT_SIGNAL.is_match(&lines[i]))
            .map(|idx| HeuristicCandidate {
                start_line: 0,
                end_line: idx,
                weight: 0.70,
                pattern: "front-matter keywords",
            })
    }

    fn scan_toc(&self, lines: &[String], window_end: usize) -> Option<HeuristicCandidate> {
        let heading = (0..=window_end).find(|&i| CONTENTS_HEADING.is_match(&lines[i]))?;
        let mut last = heading;
        for idx in heading + 1..lines.len() {
            let line = lines[idx].trim();
            if line.is_empty() || TOC_ENTRY.is_match(line) {
                if TOC_ENTRY.is_match(line) {
                    last = idx;
                }
            } else {
                break;
            }
        }
        (last > heading).then_some(HeuristicCandidate {
            start_line: heading,
            end_line: last,
            weight: 0.85,
            pattern: "contents heading with entries",
        })
    }

    fn scan_aux_list(&self, lines: &[String], window_end: usize) -> Option<HeuristicCandidate> {
        let heading = (0..=window_end).find(|&i| AUX_HEADING.is_match(&lines[i]))?;
        let mut last = heading;
        for idx in heading + 1..lines.len() {
            let line = lines[idx].trim();
            if line.is_empty() {
                continue;
            }
            if TOC_ENTRY.is_match(line) || line.len() < 80 && line.contains(|c: char| c.is_ascii_digit()) {
                last = idx;
            } else {
                break;
            }
        }
        (last > heading).then_some(HeuristicCandidate {
            start_line: heading,
            end_line: last,
            weight: 0.80,
            pattern: "auxiliary list heading with entries",
        })
    }

    /// Alphabetised entries in the lines after an INDEX heading.
    fn has_index_entries(&self, lines: &[String], heading: usize) -> bool {
        lines[heading + 1..]
            .iter()
            .take(20)
            .filter(|l| INDEX_ENTRY.is_match(l.trim()))
            .count()
            >= 3
    }

    /// Weak signals: repeated footer text or page-number sequences. Always
    /// below the removal threshold.
    fn weak_tail_signal(
        &self,
        lines: &[String],
        start: usize,
        end: usize,
    ) -> Option<HeuristicCandidate> {
        let window = &lines[start..=end];
        let page_lines: Vec<usize> = window
            .iter()
            .enumerate()
            .filter(|(_, l)| PAGE_NUMBER_LINE.is_match(l))
            .map(|(i, _)| start + i)
            .collect();
        if page_lines.len() >= 3 {
            return Some(HeuristicCandidate {
                start_line: page_lines[0],
                end_line: lines.len() - 1,
                weight: 0.45,
                pattern: "page-number sequence",
            });
        }
        let mut counts: rustc_hash::FxHashMap<String, (usize, usize)> =
            rustc_hash::FxHashMap::default();
        for (i, line) in window.iter().enumerate() {
            let key = normalize_for_repetition(line);
            if key.len() >= 4 {
                let entry = counts.entry(key).or_insert((0, start + i));
                entry.0 += 1;
            }
        }
        counts
            .into_values()
            .filter(|(count, _)| *count >= 3)
            .map(|(_, first)| HeuristicCandidate {
                start_line: first,
                end_line: lines.len() - 1,
                weight: 0.40,
                pattern: "footer repetition",
            })
            .next()
    }
}

/// Scan window per kind, mirroring the Phase A positional constraints.
fn scan_window(kind: SectionKind, line_count: usize) -> (usize, usize) {
    let last = line_count - 1;
    let at_pct = |p: f64| ((p / 100.0) * line_count as f64).floor() as usize;
    match kind.rules().position {
        PositionRule::EndAtMostPercent(max) => (0, at_pct(max).min(last)),
        PositionRule::StartAtLeastPercent(min) => (at_pct(min).min(last), last),
        PositionRule::StartWithinPercent { min, max } => {
            (at_pct(min).min(last), at_pct(max).min(last))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn narrative(n: usize) -> Vec<String> {
        (0..n)
            .map(|i| format!("plain narrative sentence number {i} continues here"))
            .collect()
    }

    #[test]
    fn clean_tail_yields_no_candidate() {
        // 415 narrative lines: the scan starts at 50% (line 207) and finds
        // nothing above the removal threshold.
        let lines = narrative(415);
        let candidate = HeuristicBoundaryDetector::new().detect(SectionKind::BackMatter, &lines);
        assert!(candidate.is_none() || candidate.unwrap().weight < 0.6);
    }

    #[test]
    fn markdown_notes_heading_scores_full_weight() {
        let mut lines = narrative(200);
        lines[150] = "## NOTES".to_string();
        let candidate = HeuristicBoundaryDetector::new()
            .detect(SectionKind::BackMatter, &lines)
            .unwrap();
        assert_eq!(candidate.weight, 1.00);
        assert_eq!(candidate.start_line, 150);
        assert_eq!(candidate.end_line, 199);
    }

    #[test]
    fn heading_outside_window_is_ignored() {
        let mut lines = narrative(200);
        lines[20] = "## NOTES".to_string();
        let candidate = HeuristicBoundaryDetector::new().detect(SectionKind::BackMatter, &lines);
        assert!(candidate.is_none());
    }

    #[test]
    fn bibliography_outscores_glossary() {
        let mut lines = narrative(200);
        lines[120] = "GLOSSARY".to_string();
        lines[160] = "BIBLIOGRAPHY".to_string();
        let candidate = HeuristicBoundaryDetector::new()
            .detect(SectionKind::BackMatter, &lines)
            .unwrap();
        assert_eq!(candidate.weight, 0.90);
        assert_eq!(candidate.start_line, 160);
    }

    #[test]
    fn front_matter_ends_before_first_chapter() {
        let mut lines = narrative(100);
        lines[0] = "MY BOOK".to_string();
        lines[1] = "Copyright © 2001".to_string();
        lines[8] = "Chapter 1".to_string();
        let candidate = HeuristicBoundaryDetector::new()
            .detect(SectionKind::FrontMatter, &lines)
            .unwrap();
        assert_eq!(candidate.start_line, 0);
        assert_eq!(candidate.end_line, 7);
        assert_eq!(candidate.weight, 0.85);
    }

    #[test]
    fn toc_scan_spans_entries() {
        let mut lines = narrative(100);
        lines[5] = "CONTENTS".to_string();
        lines[6] = "The Road ....... 3".to_string();
        lines[7] = "The River ...... 27".to_string();
        lines[8] = "The Sea ........ 55".to_string();
        let candidate = HeuristicBoundaryDetector::new()
            .detect(SectionKind::TableOfContents, &lines)
            .unwrap();
        assert_eq!((candidate.start_line, candidate.end_line), (5, 8));
    }

    #[test]
    fn page_number_sequence_is_weak() {
        let mut lines = narrative(100);
        lines[80] = "214".to_string();
        lines[85] = "215".to_string();
        lines[90] = "216".to_string();
        let candidate = HeuristicBoundaryDetector::new()
            .detect(SectionKind::BackMatter, &lines)
            .unwrap();
        assert!(candidate.weight < 0.6);
    }
}
