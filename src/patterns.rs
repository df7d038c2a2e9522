//! Shared regex library for scaffolding detection.
//!
//! Everything position-independent lives here: page-number line shapes,
//! chapter indicators (multilingual), citation styles, DOI and decimal
//! shapes, and footnote markers. Compiled once via `LazyLock`; modules that
//! need position-aware scanning (the heuristic boundary detector) build on
//! these.

use regex::Regex;
use std::sync::LazyLock;

// ── Page furniture ─────────────────────────────────────────────────────

/// Lines that are nothing but a page number, in any of the default shapes:
/// bare digits, Roman numerals, `Page N`, `- N -`, `— N —`.
pub static PAGE_NUMBER_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?xi)^\s*(?:
            \d{1,4}
          | [ivxlcdm]{1,7}
          | page\s+\d{1,4}
          | -\s*\d{1,4}\s*-
          | \x{2014}\s*\d{1,4}\s*\x{2014}
          | \x{2013}\s*\d{1,4}\s*\x{2013}
        )\s*$",
    )
    .expect("page number regex")
});

/// A run of digits for sequence detection across candidate page numbers.
pub static DIGITS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d{1,4}").expect("digits regex"));

// ── Chapter indicators ─────────────────────────────────────────────────

/// Chapter/part headings in EN, ES, FR, DE, PT, plus prologue/epilogue and
/// dotted section numbers. Any match inside a proposed removal region
/// forces the content verifier to reject it.
pub static CHAPTER_INDICATOR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?xi)^\s*(?:\#{1,3}\s*)?(?:
            (?:chapter|chapitre|cap\x{ED}tulo|capitulo|kapitel)\s+(?:\d+|[ivxlcdm]+|[a-z\x{E0}-\x{FF}]+)
          | (?:part|parte|partie|teil)\s+(?:\d+|[ivxlcdm]+|one|two|three|un|deux|uno|dos|eins|zwei|um|dois)
          | (?:prologue|pr\x{F3}logo|prolog|epilogue|ep\x{ED}logo|epilog)\b
          | section\s+\d+\.\d+
        )",
    )
    .expect("chapter indicator regex")
});

/// Markdown or upper-case heading shape used when matching chapter names
/// detected by reconnaissance back to working-text lines.
pub static HEADING_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*(?:#{1,6}\s+\S|[A-Z][A-Z0-9 ,.'\x{2019}:-]{3,}\s*$)")
        .expect("heading line regex")
});

// ── Protected shapes ───────────────────────────────────────────────────

/// DOI substrings; must survive citation removal byte-for-byte.
pub static DOI: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"10\.\d{4,}/\S+").expect("doi regex"));

/// Decimal numerals (`3.14`); shielded during citation removal.
pub static DECIMAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+\.\d+").expect("decimal regex"));

// ── Citations ──────────────────────────────────────────────────────────

/// Author-year parentheticals: APA, Harvard, Chicago author-date, CSE
/// name-year. `(Smith, 2020)`, `(Smith & Jones, 2019, p. 44)`,
/// `(Smith et al. 2021)`.
pub static CITATION_AUTHOR_YEAR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?x)\(\s*
            \p{Lu}[\w'\x{2019}\-]+                              # lead author
            (?:\s*(?:,|&|and|y|et|und|e)\s+\p{Lu}[\w'\x{2019}\-]+)*  # co-authors
            (?:\s+et\s+al\.?)?
            ,?\s+\d{4}[a-z]?                                    # year
            (?:\s*[,;]\s*(?:pp?\.?|p\x{E1}gs?\.?|S\.)\s*\d+(?:\s*[-\x{2013}]\s*\d+)?)?  # pages
            (?:\s*;\s*[^()]{0,80})?                             # second source
        \s*\)",
    )
    .expect("author-year citation regex")
});

/// MLA author-page parentheticals: `(Smith 23)`, `(Smith 23-45)`.
pub static CITATION_AUTHOR_PAGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?x)\(\s*\p{Lu}[\w'\x{2019}\-]+\s+\d{1,4}(?:\s*[-\x{2013}]\s*\d{1,4})?\s*\)")
        .expect("author-page citation regex")
});

/// Numeric brackets: IEEE and Vancouver. `[1]`, `[2, 5]`, `[3-7]`.
pub static CITATION_NUMERIC: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[\d{1,3}(?:\s*[,\x{2013}\-]\s*\d{1,3})*\]").expect("numeric citation regex")
});

// ── Footnote markers ───────────────────────────────────────────────────

/// Unicode superscript digit runs (`¹`, `²³`).
pub static SUPERSCRIPT_RUN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[\x{00B9}\x{00B2}\x{00B3}\x{2070}\x{2074}-\x{2079}]+")
        .expect("superscript regex")
});

/// Reference-symbol markers attached to a word (`word*`, `word†`).
pub static SYMBOL_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[\*\x{2020}\x{2021}\x{00A7}]+").expect("symbol marker regex")
});

/// Notes-section headings, markdown or bare, localised.
pub static NOTES_HEADING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?xi)^\s*(?:\#{1,3}\s*)?(?:
            notes|endnotes|notas|notes\s+de\s+fin|anmerkungen|fu\x{DF}noten
        )\s*$",
    )
    .expect("notes heading regex")
});

/// Chapter-local notes headings (`Notes to Chapter 3`).
pub static CHAPTER_NOTES_HEADING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(?:#{1,3}\s*)?notes\s+(?:to|for|on)\s+chapter\s+\d+\s*$")
        .expect("chapter notes heading regex")
});

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_number_shapes() {
        for line in ["42", "  xiv  ", "Page 12", "- 7 -", "\u{2014} 9 \u{2014}"] {
            assert!(PAGE_NUMBER_LINE.is_match(line), "should match: {line:?}");
        }
        for line in ["42 men marched", "chapter 1", "-- 7 --"] {
            assert!(!PAGE_NUMBER_LINE.is_match(line), "should not match: {line:?}");
        }
    }

    #[test]
    fn chapter_indicators_multilingual() {
        for line in [
            "Chapter 12",
            "## Chapter One",
            "Cap\u{ED}tulo 3",
            "Chapitre IV",
            "Kapitel 7",
            "PART TWO",
            "Prologue",
            "EP\u{CD}LOGO",
            "Section 2.3",
        ] {
            assert!(CHAPTER_INDICATOR.is_match(line), "should match: {line:?}");
        }
        assert!(!CHAPTER_INDICATOR.is_match("The chapter ended quietly."));
        assert!(!CHAPTER_INDICATOR.is_match("NOTES"));
    }

    #[test]
    fn citation_shapes() {
        assert!(CITATION_AUTHOR_YEAR.is_match("(Smith, 2020)"));
        assert!(CITATION_AUTHOR_YEAR.is_match("(Smith & Jones, 2019, p. 44)"));
        assert!(CITATION_AUTHOR_YEAR.is_match("(Garc\u{ED}a et al. 2021)"));
        assert!(CITATION_AUTHOR_PAGE.is_match("(Smith 23-45)"));
        assert!(CITATION_NUMERIC.is_match("[1]"));
        assert!(CITATION_NUMERIC.is_match("[3, 5-7]"));
        assert!(!CITATION_AUTHOR_YEAR.is_match("(see below)"));
    }

    #[test]
    fn doi_and_decimal() {
        assert!(DOI.is_match("10.1234/abc.5678"));
        assert!(!DOI.is_match("10.12/short"));
        assert!(DECIMAL.is_match("3.14"));
    }

    #[test]
    fn notes_headings() {
        assert!(NOTES_HEADING.is_match("NOTES"));
        assert!(NOTES_HEADING.is_match("## Endnotes"));
        assert!(NOTES_HEADING.is_match("Anmerkungen"));
        assert!(CHAPTER_NOTES_HEADING.is_match("Notes to Chapter 3"));
        assert!(!NOTES_HEADING.is_match("Notes on method"));
    }
}
