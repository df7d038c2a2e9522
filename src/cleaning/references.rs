//! Phase 4: reference cleaning.
//!
//! Three concerns, each its own step: auxiliary list sections (thirteen
//! canonical types with multilingual headers), inline citations in the
//! major styles, and footnote/endnote apparatus. Section removals are
//! proposed here and gated by the defense system in the orchestrator;
//! the pattern transforms are pure.
//!
//! Citation removal shields DOIs, decimal numerals, code blocks, and
//! tables behind placeholders first, then repairs the orphans it leaves:
//! empty parentheses go, doubled spaces collapse, and dangling commas or
//! semicolons before line ends are trimmed.

use regex::Regex;
use std::sync::LazyLock;

use super::shield::Shield;
use crate::defense::{BoundaryProposal, SectionKind};
use crate::patterns::{
    CHAPTER_NOTES_HEADING, CITATION_AUTHOR_PAGE, CITATION_AUTHOR_YEAR, CITATION_NUMERIC, DECIMAL,
    DOI, NOTES_HEADING, SUPERSCRIPT_RUN,
};

// ── Auxiliary lists ────────────────────────────────────────────────────

/// Headers of the thirteen canonical auxiliary list types, with ES, FR,
/// DE, and PT forms.
static AUX_LIST_HEADING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?xi)^\s*(?:\#{1,3}\s*)?(?:
            list\s+of\s+(?:figures|illustrations|plates|maps|charts|diagrams|tables|exhibits|code\s+samples|equations|abbreviations|acronyms|symbols)
          | lista\s+de\s+(?:figuras|ilustraciones|l\x{E1}minas|mapas|gr\x{E1}ficos|diagramas|tablas|tabelas|ecuaciones|abreviaturas|siglas|s\x{ED}mbolos|abrevia\x{E7}\x{F5}es|equa\x{E7}\x{F5}es)
          | liste\s+des\s+(?:figures|illustrations|planches|cartes|graphiques|diagrammes|tableaux|\x{E9}quations|abr\x{E9}viations|acronymes|symboles)
          | (?:abbildungs|tabellen|karten|abk\x{FC}rzungs|symbol|formel)verzeichnis
        )\s*$",
    )
    .expect("aux list heading regex")
});

static LIST_ENTRY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(?:figure|fig\.|illustration|plate|map|chart|diagram|table|exhibit|equation|listing|figura|l\x{E1}mina|mapa|tabla|tabela|tableau|carte|planche|abbildung|tabelle|karte)\s*\d")
        .expect("list entry regex")
});

static PAGE_TAIL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:\.{2,}\s*)?\d{1,4}\s*$").expect("page tail regex"));

/// Find auxiliary-list sections: a recognised heading followed by its run
/// of entries. Returned proposals still have to clear the defense gate.
#[must_use]
pub fn detect_auxiliary_lists(lines: &[String]) -> Vec<BoundaryProposal> {
    if lines.is_empty() {
        return Vec::new();
    }
    let mut proposals = Vec::new();
    let window_end = (lines.len() * 2) / 5; // matches the 40% position rule
    let mut idx = 0;
    while idx <= window_end.min(lines.len() - 1) {
        if !AUX_LIST_HEADING.is_match(&lines[idx]) {
            idx += 1;
            continue;
        }
        let mut last = idx;
        for (offset, line) in lines[idx + 1..].iter().enumerate() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            if LIST_ENTRY.is_match(trimmed) || PAGE_TAIL.is_match(trimmed) {
                last = idx + 1 + offset;
            } else {
                break;
            }
        }
        if last > idx {
            proposals.push(BoundaryProposal {
                kind: SectionKind::AuxiliaryList,
                start_line: idx,
                end_line: last,
                confidence: 0.80,
                evidence: vec![lines[idx].trim().to_string()],
            });
        }
        idx = last + 1;
    }
    proposals
}

// ── Citations ──────────────────────────────────────────────────────────

/// Result of the inline citation pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CitationCleanOutcome {
    pub text: String,
    pub matches: usize,
}

/// Remove inline citations (APA, MLA, Chicago, IEEE, Harvard, Vancouver,
/// CSE) with shielding and orphan repair.
#[must_use]
pub fn remove_citations(text: &str, preserve_code: bool) -> CitationCleanOutcome {
    let mut shield = Shield::new();
    let mut work = shield.extract_blocks(text, preserve_code, true);
    work = shield.extract_pattern(&work, &DOI, "DOI");
    work = shield.extract_pattern(&work, &DECIMAL, "DEC");

    let mut matches = 0usize;
    for pattern in [
        &*CITATION_AUTHOR_YEAR,
        &*CITATION_AUTHOR_PAGE,
        &*CITATION_NUMERIC,
    ] {
        matches += pattern.find_iter(&work).count();
        work = pattern.replace_all(&work, "").into_owned();
    }

    let repaired = repair_orphans(&work);
    CitationCleanOutcome {
        text: shield.restore(&repaired),
        matches,
    }
}

static EMPTY_PARENS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\(\s*\)").expect("empty parens regex"));
static SPACE_BEFORE_PUNCT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r" +([,.;:!?])").expect("space before punct regex"));
static TRAILING_SEPARATOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[,;]+\s*$").expect("trailing separator regex"));

/// Orphan repair after citation removal.
fn repair_orphans(text: &str) -> String {
    text.split('\n')
        .map(|line| {
            let line = EMPTY_PARENS.replace_all(line, "");
            let mut out = String::with_capacity(line.len());
            let mut in_spaces = false;
            for ch in line.chars() {
                if ch == ' ' {
                    if !in_spaces {
                        out.push(' ');
                    }
                    in_spaces = true;
                } else {
                    in_spaces = false;
                    out.push(ch);
                }
            }
            let out = SPACE_BEFORE_PUNCT.replace_all(&out, "$1");
            TRAILING_SEPARATOR.replace_all(&out, "").trim_end().to_string()
        })
        .collect::<Vec<_>>()
        .join("\n")
}

// ── Footnotes & endnotes ───────────────────────────────────────────────

/// Result of the footnote-marker pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkerCleanOutcome {
    pub text: String,
    pub matches: usize,
}

static BRACKET_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[\d{1,2}\]").expect("bracket marker regex"));

/// Remove footnote markers from body text.
///
/// A marker needs alphabetic context: at least two letters directly on one
/// side. `word¹` is a footnote; `x²` and `10³` are mathematics and stay.
#[must_use]
pub fn remove_footnote_markers(text: &str, preserve_code: bool) -> MarkerCleanOutcome {
    let mut shield = Shield::new();
    let work = shield.extract_blocks(text, preserve_code, true);

    let mut matches = 0usize;
    let work = remove_contextual(&work, &SUPERSCRIPT_RUN, &mut matches);
    let work = remove_contextual(&work, &BRACKET_MARKER, &mut matches);
    let work = remove_symbol_markers(&work, &mut matches);

    MarkerCleanOutcome {
        text: shield.restore(&work),
        matches,
    }
}

/// Delete matches of `pattern` that have footnote context (≥2 letters on
/// at least one side).
fn remove_contextual(text: &str, pattern: &Regex, matches: &mut usize) -> String {
    let mut out = String::with_capacity(text.len());
    let mut cursor = 0;
    for m in pattern.find_iter(text) {
        let before = &text[..m.start()];
        let after = &text[m.end()..];
        if has_letter_context(before, after) {
            out.push_str(&text[cursor..m.start()]);
            cursor = m.end();
            *matches += 1;
        }
    }
    out.push_str(&text[cursor..]);
    out
}

fn has_letter_context(before: &str, after: &str) -> bool {
    // Markers ride on the word before them, often past its closing
    // punctuation (`war.¹`), so one punctuation character is skipped.
    let mut rev = before.chars().rev().peekable();
    if rev
        .peek()
        .is_some_and(|c| matches!(c, '.' | ',' | ';' | ':' | '!' | '?' | '"' | '\''))
    {
        rev.next();
    }
    let letters_before = rev.take_while(|c| c.is_alphabetic()).count();
    let letters_after = after.chars().take_while(|c| c.is_alphabetic()).count();
    letters_before >= 2 || letters_after >= 2
}

/// Reference symbols (`*`, `†`, `‡`, `§`) attached to a word and followed
/// by a break. Markdown emphasis pairs and `**bold**` runs stay: a single
/// asterisk opening a word, or closing an open emphasis span, is never a
/// marker.
fn remove_symbol_markers(text: &str, matches: &mut usize) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut emphasis_open = false;
    let mut i = 0;
    while i < chars.len() {
        let ch = chars[i];
        if ch == '\n' {
            emphasis_open = false;
            out.push(ch);
            i += 1;
            continue;
        }
        if matches!(ch, '*' | '\u{2020}' | '\u{2021}' | '\u{A7}') {
            let mut end = i;
            while end < chars.len() && chars[end] == ch {
                end += 1;
            }
            let run_len = end - i;
            let letters_before = chars[..i]
                .iter()
                .rev()
                .take_while(|c| c.is_alphabetic())
                .count();
            let break_after = end >= chars.len()
                || chars[end].is_whitespace()
                || matches!(chars[end], '.' | ',' | ';' | ':' | ')' | ']');
            let next_is_word = end < chars.len() && chars[end].is_alphanumeric();

            if ch == '*' && run_len == 1 {
                if emphasis_open {
                    out.push('*');
                    emphasis_open = false;
                    i = end;
                    continue;
                }
                if next_is_word {
                    out.push('*');
                    emphasis_open = true;
                    i = end;
                    continue;
                }
            }
            if run_len == 1 && letters_before >= 2 && break_after {
                *matches += 1;
                i = end;
                continue;
            }
            for _ in 0..run_len {
                out.push(ch);
            }
            i = end;
            continue;
        }
        out.push(ch);
        i += 1;
    }
    out
}

static NUMBERED_NOTE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*\d{1,3}\.\s+\S").expect("numbered note regex"));

/// Find delimited notes sections (document-level `NOTES` or chapter-local
/// `Notes to Chapter N`). Proposals are gated by the defense system.
#[must_use]
pub fn detect_notes_sections(lines: &[String]) -> Vec<BoundaryProposal> {
    let mut proposals = Vec::new();
    let mut idx = 0;
    while idx < lines.len() {
        let line = lines[idx].trim();
        let is_heading = NOTES_HEADING.is_match(line) || CHAPTER_NOTES_HEADING.is_match(line);
        if !is_heading {
            idx += 1;
            continue;
        }
        let mut last = idx;
        for (offset, follow) in lines[idx + 1..].iter().enumerate() {
            let trimmed = follow.trim();
            if trimmed.is_empty() || NUMBERED_NOTE.is_match(trimmed) {
                if NUMBERED_NOTE.is_match(trimmed) {
                    last = idx + 1 + offset;
                }
            } else {
                break;
            }
        }
        if last > idx {
            proposals.push(BoundaryProposal {
                kind: SectionKind::FootnoteSection,
                start_line: idx,
                end_line: last,
                confidence: 0.85,
                evidence: vec![line.to_string()],
            });
            idx = last + 1;
        } else {
            idx += 1;
        }
    }
    proposals
}
