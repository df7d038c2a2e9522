//! Small text measurement helpers shared across the pipeline.

use unicode_segmentation::UnicodeSegmentation;

/// Unicode-aware word count over arbitrary text.
#[must_use]
pub fn word_count(text: &str) -> usize {
    text.unicode_words().count()
}

/// Word count of a slice of lines.
#[must_use]
pub fn word_count_lines(lines: &[String]) -> usize {
    lines.iter().map(|l| word_count(l)).sum()
}

/// True for lines that are empty or whitespace-only.
#[must_use]
pub fn is_blank(line: &str) -> bool {
    line.trim().is_empty()
}

/// True when the line ends in sentence-final punctuation, allowing a
/// trailing closing quote or bracket.
#[must_use]
pub fn ends_sentence(line: &str) -> bool {
    let trimmed = line.trim_end();
    let mut chars = trimmed.chars().rev();
    let mut last = chars.next();
    // Skip one closing quote/bracket so `...end."` still counts.
    if matches!(last, Some('"' | '\u{201D}' | '\u{2019}' | '\'' | ')' | ']' | '»')) {
        last = chars.next();
    }
    matches!(last, Some('.' | '!' | '?' | ':' | ';' | '\u{2026}'))
}

/// Canonical form of a line for repetition detection: lowercased, digits
/// collapsed, whitespace squeezed. Running headers differing only in page
/// number normalise to the same key.
#[must_use]
pub fn normalize_for_repetition(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut last_space = true;
    let mut last_digit = false;
    for ch in line.trim().chars() {
        if ch.is_ascii_digit() {
            if !last_digit {
                out.push('#');
            }
            last_digit = true;
            last_space = false;
        } else if ch.is_whitespace() {
            if !last_space {
                out.push(' ');
            }
            last_space = true;
            last_digit = false;
        } else {
            for lower in ch.to_lowercase() {
                out.push(lower);
            }
            last_space = false;
            last_digit = false;
        }
    }
    out
}

/// Relative difference between two word counts, as a fraction of `before`.
#[must_use]
pub fn relative_delta(before: usize, after: usize) -> f64 {
    if before == 0 {
        return if after == 0 { 0.0 } else { f64::INFINITY };
    }
    (after as f64 - before as f64).abs() / before as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_unicode_words() {
        assert_eq!(word_count("the quick brown fox"), 4);
        assert_eq!(word_count("café au lait"), 3);
        assert_eq!(word_count(""), 0);
    }

    #[test]
    fn sentence_endings() {
        assert!(ends_sentence("It was over."));
        assert!(ends_sentence("\u{201C}Done!\u{201D}"));
        assert!(!ends_sentence("and then the"));
        assert!(!ends_sentence(""));
    }

    #[test]
    fn repetition_keys_collapse_page_numbers() {
        assert_eq!(
            normalize_for_repetition("THE GREAT WAR   12"),
            normalize_for_repetition("The Great War 144"),
        );
        assert_ne!(
            normalize_for_repetition("Chapter One"),
            normalize_for_repetition("Chapter Two"),
        );
    }

    #[test]
    fn relative_delta_handles_zero() {
        assert_eq!(relative_delta(0, 0), 0.0);
        assert_eq!(relative_delta(100, 99), 0.01);
    }
}
