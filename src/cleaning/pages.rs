//! Phase 2: page furniture removal.
//!
//! Two deterministic passes. Page numbers are single-line pattern matches
//! (bare digits, Roman numerals, `Page N`, `- N -`, `— N —`, plus any
//! pattern hint from reconnaissance). Headers and footers are detected by
//! repetition: the same normalised line recurring across at least three
//! well-separated positions is page furniture, never a one-off match.

use regex::Regex;
use rustc_hash::FxHashMap;
use tracing::debug;

use crate::patterns::PAGE_NUMBER_LINE;
use crate::textutil::{ends_sentence, normalize_for_repetition, word_count};
use crate::types::PatternHints;

/// Minimum recurrences before a normalised line counts as a header/footer.
const REPETITION_THRESHOLD: usize = 3;
/// Minimum mean distance between recurrences, in lines. Close repeats are
/// prose (dialogue beats, refrains), not page furniture.
const MIN_MEAN_GAP: f64 = 15.0;
/// Headers and footers are short.
const MAX_FURNITURE_WORDS: usize = 8;

/// Result of one page-cleanup pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageCleanOutcome {
    pub lines: Vec<String>,
    pub matches: usize,
}

/// Deterministic page-furniture cleaner.
#[derive(Debug, Default)]
pub struct PageCleaner;

impl PageCleaner {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Delete page-number-only lines.
    #[must_use]
    pub fn remove_page_numbers(
        &self,
        lines: &[String],
        hints: &PatternHints,
    ) -> PageCleanOutcome {
        let custom = hints
            .page_number_regex
            .as_deref()
            .and_then(|raw| Regex::new(raw).ok());

        let mut kept = Vec::with_capacity(lines.len());
        let mut matches = 0usize;
        for line in lines {
            let is_page_number = PAGE_NUMBER_LINE.is_match(line)
                || custom.as_ref().is_some_and(|re| {
                    let trimmed = line.trim();
                    !trimmed.is_empty() && re.is_match(trimmed)
                });
            if is_page_number {
                matches += 1;
            } else {
                kept.push(line.clone());
            }
        }
        debug!(matches, "page number lines removed");
        PageCleanOutcome {
            lines: kept,
            matches,
        }
    }

    /// Delete repeated running headers and footers.
    #[must_use]
    pub fn remove_headers_footers(
        &self,
        lines: &[String],
        hints: &PatternHints,
    ) -> PageCleanOutcome {
        let hinted: Vec<Regex> = hints
            .header_patterns
            .iter()
            .chain(hints.footer_patterns.iter())
            .filter_map(|raw| Regex::new(raw).ok())
            .collect();

        let mut positions: FxHashMap<String, Vec<usize>> = FxHashMap::default();
        for (idx, line) in lines.iter().enumerate() {
            if is_furniture_candidate(line) {
                positions
                    .entry(normalize_for_repetition(line))
                    .or_default()
                    .push(idx);
            }
        }

        let repeated: Vec<&String> = positions
            .iter()
            .filter(|(key, occurrences)| {
                key.len() >= 4
                    && occurrences.len() >= REPETITION_THRESHOLD
                    && mean_gap(occurrences) >= MIN_MEAN_GAP
            })
            .map(|(key, _)| key)
            .collect();

        let mut kept = Vec::with_capacity(lines.len());
        let mut matches = 0usize;
        for line in lines {
            let key = normalize_for_repetition(line);
            let is_repeat = repeated.iter().any(|r| **r == key);
            let is_hinted = hinted.iter().any(|re| re.is_match(line.trim()))
                && is_furniture_candidate(line);
            if is_repeat || is_hinted {
                matches += 1;
            } else {
                kept.push(line.clone());
            }
        }
        debug!(matches, "header/footer lines removed");
        PageCleanOutcome {
            lines: kept,
            matches,
        }
    }
}

/// Short, unpunctuated lines are furniture candidates; prose is not.
fn is_furniture_candidate(line: &str) -> bool {
    let trimmed = line.trim();
    !trimmed.is_empty()
        && trimmed.len() <= 60
        && word_count(trimmed) <= MAX_FURNITURE_WORDS
        && !ends_sentence(trimmed)
}

fn mean_gap(occurrences: &[usize]) -> f64 {
    if occurrences.len() < 2 {
        return 0.0;
    }
    let total: usize = occurrences
        .windows(2)
        .map(|pair| pair[1] - pair[0])
        .sum();
    total as f64 / (occurrences.len() - 1) as f64
}
