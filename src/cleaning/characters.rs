//! Phase 5: nine-substep character normalisation.
//!
//! Ordered, pure sub-steps: mojibake repair, ligature expansion, invisible
//! characters, OCR digit fixes, dash normalisation, decorative dash lines,
//! quote normalisation, markdown cleanup, and empty-residue cleanup. The
//! whole phase runs with code blocks and tables shielded behind opaque
//! placeholders, so shielded bytes come back untouched; when content flags
//! mark math, inline `$...$` runs are shielded too.
//!
//! Applying the phase twice yields the same output as applying it once.

use regex::Regex;
use std::sync::LazyLock;

use super::shield::Shield;
use crate::types::ContentFlags;

/// The published UTF-8-read-as-Windows-1252 confusion table. Entries with
/// a shared prefix are ordered longest first so three-character sequences
/// win over the bare `â€` remnant.
const MOJIBAKE: &[(&str, &str)] = &[
    // U+2014 family (three characters, `â€` + cp1252 of the third byte)
    ("\u{E2}\u{20AC}\u{201D}", "\u{2014}"), // em dash
    ("\u{E2}\u{20AC}\u{201C}", "\u{2013}"), // en dash
    ("\u{E2}\u{20AC}\u{153}", "\u{201C}"),  // left double quote
    ("\u{E2}\u{20AC}\u{9D}", "\u{201D}"),   // right double quote
    ("\u{E2}\u{20AC}\u{2DC}", "\u{2018}"),  // left single quote
    ("\u{E2}\u{20AC}\u{2122}", "\u{2019}"), // right single quote
    ("\u{E2}\u{20AC}\u{A6}", "\u{2026}"),   // ellipsis
    ("\u{E2}\u{20AC}\u{A2}", "\u{2022}"),   // bullet
    ("\u{E2}\u{20AC}\u{B0}", "\u{2030}"),   // per mille
    ("\u{E2}\u{20AC}\u{A1}", "\u{2021}"),   // double dagger
    ("\u{E2}\u{20AC}\u{A0}", "\u{2020}"),   // dagger
    ("\u{E2}\u{201A}\u{AC}", "\u{20AC}"),   // euro sign
    ("\u{E2}\u{201E}\u{A2}", "\u{2122}"),   // trade mark
    // Bare remnant after the control byte was lost in transit
    ("\u{E2}\u{20AC}", "\u{201D}"),
    // Ã-prefixed Latin-1 letters
    ("\u{C3}\u{A9}", "\u{E9}"),  // é
    ("\u{C3}\u{A8}", "\u{E8}"),  // è
    ("\u{C3}\u{AA}", "\u{EA}"),  // ê
    ("\u{C3}\u{AB}", "\u{EB}"),  // ë
    ("\u{C3}\u{A1}", "\u{E1}"),  // á
    ("\u{C3}\u{A0}", "\u{E0}"),  // à
    ("\u{C3}\u{A2}", "\u{E2}"),  // â
    ("\u{C3}\u{A4}", "\u{E4}"),  // ä
    ("\u{C3}\u{A3}", "\u{E3}"),  // ã
    ("\u{C3}\u{A5}", "\u{E5}"),  // å
    ("\u{C3}\u{AD}", "\u{ED}"),  // í
    ("\u{C3}\u{AC}", "\u{EC}"),  // ì
    ("\u{C3}\u{AE}", "\u{EE}"),  // î
    ("\u{C3}\u{AF}", "\u{EF}"),  // ï
    ("\u{C3}\u{B3}", "\u{F3}"),  // ó
    ("\u{C3}\u{B2}", "\u{F2}"),  // ò
    ("\u{C3}\u{B4}", "\u{F4}"),  // ô
    ("\u{C3}\u{B6}", "\u{F6}"),  // ö
    ("\u{C3}\u{B5}", "\u{F5}"),  // õ
    ("\u{C3}\u{B8}", "\u{F8}"),  // ø
    ("\u{C3}\u{BA}", "\u{FA}"),  // ú
    ("\u{C3}\u{B9}", "\u{F9}"),  // ù
    ("\u{C3}\u{BB}", "\u{FB}"),  // û
    ("\u{C3}\u{BC}", "\u{FC}"),  // ü
    ("\u{C3}\u{B1}", "\u{F1}"),  // ñ
    ("\u{C3}\u{A7}", "\u{E7}"),  // ç
    ("\u{C3}\u{A6}", "\u{E6}"),  // æ
    ("\u{C3}\u{178}", "\u{DF}"), // ß
    ("\u{C3}\u{2030}", "\u{C9}"), // É
    ("\u{C3}\u{2021}", "\u{C7}"), // Ç
    ("\u{C3}\u{2013}", "\u{D6}"), // Ö
    ("\u{C3}\u{153}", "\u{DC}"),  // Ü
    ("\u{C3}\u{201E}", "\u{C4}"), // Ä
    ("\u{C3}\u{2026}", "\u{C5}"), // Å
    ("\u{C3}\u{2020}", "\u{C6}"), // Æ
    ("\u{C3}\u{2014}", "\u{D7}"), // multiplication sign
    ("\u{C3}\u{B7}", "\u{F7}"),   // division sign
    // Â-prefixed symbols (stray C2 lead byte)
    ("\u{C2}\u{AB}", "\u{AB}"),
    ("\u{C2}\u{BB}", "\u{BB}"),
    ("\u{C2}\u{B0}", "\u{B0}"),
    ("\u{C2}\u{A9}", "\u{A9}"),
    ("\u{C2}\u{AE}", "\u{AE}"),
    ("\u{C2}\u{B7}", "\u{B7}"),
    ("\u{C2}\u{BF}", "\u{BF}"),
    ("\u{C2}\u{A1}", "\u{A1}"),
    ("\u{C2}\u{A0}", " "), // nbsp remnant becomes a plain space
];

/// The twelve typographic ligatures expanded to letter sequences.
const LIGATURES: &[(&str, &str)] = &[
    ("\u{FB01}", "fi"),
    ("\u{FB02}", "fl"),
    ("\u{FB00}", "ff"),
    ("\u{FB03}", "ffi"),
    ("\u{FB04}", "ffl"),
    ("\u{DF}", "ss"),
    ("\u{152}", "OE"),
    ("\u{153}", "oe"),
    ("\u{C6}", "AE"),
    ("\u{E6}", "ae"),
    ("\u{132}", "IJ"),
    ("\u{133}", "ij"),
];

static TRIPLE_EMPHASIS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\*{3}([^*\n]+)\*{3}").expect("triple star regex"));
static TRIPLE_UNDERSCORE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"_{3}([^_\n]+)_{3}").expect("triple underscore regex"));
static EMPTY_BRACKETS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\(\s*\)|\[\s*\]").expect("empty brackets regex"));
static INLINE_MATH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$[^$\n]+\$").expect("inline math regex"));

/// Per-substep replacement counts for telemetry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SubstepCounts {
    pub mojibake: usize,
    pub ligatures: usize,
    pub invisibles: usize,
    pub ocr_fixes: usize,
    pub dashes: usize,
    pub decorative_lines: usize,
    pub quotes: usize,
    pub markdown: usize,
    pub residue: usize,
}

impl SubstepCounts {
    #[must_use]
    pub fn total(&self) -> usize {
        self.mojibake
            + self.ligatures
            + self.invisibles
            + self.ocr_fixes
            + self.dashes
            + self.decorative_lines
            + self.quotes
            + self.markdown
            + self.residue
    }
}

/// Outcome of the whole phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CharacterCleanOutcome {
    pub text: String,
    pub counts: SubstepCounts,
}

/// The nine-substep cleaner.
#[derive(Debug, Clone, Copy)]
pub struct CharacterCleaner {
    flags: ContentFlags,
    preserve_code: bool,
    preserve_math: bool,
}

impl CharacterCleaner {
    #[must_use]
    pub fn new(flags: ContentFlags, preserve_code: bool, preserve_math: bool) -> Self {
        Self {
            flags,
            preserve_code,
            preserve_math,
        }
    }

    /// Run all nine sub-steps in order, with shielding around the phase.
    #[must_use]
    pub fn clean(&self, text: &str) -> CharacterCleanOutcome {
        let mut counts = SubstepCounts::default();
        let mut shield = Shield::new();

        let mut work = shield.extract_blocks(text, self.preserve_code, true);
        if self.preserve_math && self.flags.math {
            work = shield.extract_pattern(&work, &INLINE_MATH, "MATH");
        }

        work = fix_mojibake(&work, &mut counts.mojibake);
        work = expand_ligatures(&work, &mut counts.ligatures);
        work = strip_invisibles(&work, &mut counts.invisibles);
        if !(self.flags.math && self.preserve_math) {
            work = fix_ocr_digits(&work, &mut counts.ocr_fixes);
        }
        work = normalize_dashes(&work, &mut counts.dashes);
        work = remove_decorative_dash_lines(&work, &mut counts.decorative_lines);
        work = normalize_quotes(&work, &mut counts.quotes);
        work = collapse_emphasis(&work, &mut counts.markdown);
        work = clean_residue(&work, &mut counts.residue);

        CharacterCleanOutcome {
            text: shield.restore(&work),
            counts,
        }
    }
}

// ── Sub-step 1: mojibake ───────────────────────────────────────────────

fn fix_mojibake(text: &str, count: &mut usize) -> String {
    replace_table(text, MOJIBAKE, count)
}

// ── Sub-step 2: ligatures ──────────────────────────────────────────────

fn expand_ligatures(text: &str, count: &mut usize) -> String {
    replace_table(text, LIGATURES, count)
}

fn replace_table(text: &str, table: &[(&str, &str)], count: &mut usize) -> String {
    let mut out = text.to_string();
    for (from, to) in table {
        let hits = out.matches(from).count();
        if hits > 0 {
            *count += hits;
            out = out.replace(from, to);
        }
    }
    out
}

// ── Sub-step 3: invisible characters ───────────────────────────────────

fn strip_invisibles(text: &str, count: &mut usize) -> String {
    let mut out = String::with_capacity(text.len());
    let chars: Vec<char> = text.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let ch = chars[i];
        match ch {
            '\u{200B}' | '\u{200C}' | '\u{200D}' => {
                *count += 1;
            }
            '\u{FEFF}' => {
                // Only the byte-order mark at the start of the text goes.
                if i == 0 {
                    *count += 1;
                } else {
                    out.push(ch);
                }
            }
            '\u{AD}' => {
                *count += 1;
                // A soft hyphen at a line break marks layout hyphenation:
                // drop the break too so the word halves rejoin.
                if chars.get(i + 1) == Some(&'\n')
                    && chars
                        .get(i + 2)
                        .is_some_and(|c| c.is_lowercase())
                {
                    i += 1;
                }
            }
            '-' => {
                // A hard hyphen before a line break bridging a compound:
                // keep the hyphen, join the lines.
                if chars.get(i + 1) == Some(&'\n')
                    && chars
                        .get(i + 2)
                        .is_some_and(|c| c.is_lowercase())
                    && i > 0
                    && chars[i - 1].is_alphabetic()
                {
                    out.push('-');
                    *count += 1;
                    i += 1;
                } else {
                    out.push('-');
                }
            }
            _ => out.push(ch),
        }
        i += 1;
    }
    out
}

// ── Sub-step 4: OCR digit fixes ────────────────────────────────────────

fn fix_ocr_digits(text: &str, count: &mut usize) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let digitish = |c: char| c.is_ascii_digit() || c == ',' || c == '.';
    for i in 0..chars.len() {
        let ch = chars[i];
        let repaired = match ch {
            'O' => Some('0'),
            'l' => Some('1'),
            'S' => Some('5'),
            _ => None,
        };
        match repaired {
            Some(fixed)
                if i > 0
                    && i + 1 < chars.len()
                    && digitish(chars[i - 1])
                    && digitish(chars[i + 1]) =>
            {
                out.push(fixed);
                *count += 1;
            }
            _ => out.push(ch),
        }
    }
    out
}

// ── Sub-step 5: dash normalisation ─────────────────────────────────────

fn normalize_dashes(text: &str, count: &mut usize) -> String {
    text.split('\n')
        .map(|line| {
            // Markdown horizontal rules stay untouched.
            let trimmed = line.trim();
            if trimmed.len() >= 3 && trimmed.chars().all(|c| c == '-') {
                return line.to_string();
            }
            let mut out = String::with_capacity(line.len());
            let mut run = 0usize;
            for ch in line.chars() {
                if ch == '-' {
                    run += 1;
                    continue;
                }
                flush_dash_run(&mut out, run, count);
                run = 0;
                out.push(ch);
            }
            flush_dash_run(&mut out, run, count);
            out
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn flush_dash_run(out: &mut String, run: usize, count: &mut usize) {
    match run {
        0 => {}
        2 => {
            out.push('\u{2014}');
            *count += 1;
        }
        n => {
            for _ in 0..n {
                out.push('-');
            }
        }
    }
}

// ── Sub-step 6: decorative dash lines ──────────────────────────────────

fn remove_decorative_dash_lines(text: &str, count: &mut usize) -> String {
    let kept: Vec<&str> = text
        .split('\n')
        .filter(|line| {
            let residue: String = line
                .chars()
                .filter(|c| !matches!(c, '\u{2014}' | '\u{2013}') && !c.is_whitespace())
                .collect();
            let has_dashes = line.contains('\u{2014}') || line.contains('\u{2013}');
            let decorative = has_dashes && residue.is_empty();
            if decorative {
                *count += 1;
            }
            !decorative
        })
        .collect();
    kept.join("\n")
}

// ── Sub-step 7: quote normalisation ────────────────────────────────────

fn normalize_quotes(text: &str, count: &mut usize) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '\u{201C}' | '\u{201D}' | '\u{201E}' | '\u{AB}' | '\u{BB}' => {
                out.push('"');
                *count += 1;
            }
            '\u{2018}' | '\u{2019}' | '\u{201A}' => {
                out.push('\'');
                *count += 1;
            }
            _ => out.push(ch),
        }
    }
    out
}

// ── Sub-step 8: markdown cleanup ───────────────────────────────────────

fn collapse_emphasis(text: &str, count: &mut usize) -> String {
    let mut hits = TRIPLE_EMPHASIS.find_iter(text).count();
    let out = TRIPLE_EMPHASIS.replace_all(text, "$1");
    hits += TRIPLE_UNDERSCORE.find_iter(&out).count();
    let out = TRIPLE_UNDERSCORE.replace_all(&out, "$1").into_owned();
    *count += hits;
    out
}

// ── Sub-step 9: empty residue ──────────────────────────────────────────

fn clean_residue(text: &str, count: &mut usize) -> String {
    text.split('\n')
        .map(|line| {
            let mut work = line.replace('\t', "    ");
            if work != line {
                *count += 1;
            }
            // Nested cases like `(( ))` expose a fresh empty pair once the
            // inner one goes, so run to a fixpoint.
            loop {
                let cleaned = EMPTY_BRACKETS.replace_all(&work, "");
                if cleaned == work {
                    break;
                }
                *count += 1;
                work = cleaned.into_owned();
            }
            let collapsed = collapse_interior_spaces(&work);
            if collapsed != work {
                *count += 1;
            }
            let trimmed = collapsed.trim_end();
            trimmed.to_string()
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Collapse runs of spaces after the first non-space character, keeping
/// leading indentation intact.
fn collapse_interior_spaces(line: &str) -> String {
    let indent_end = line
        .char_indices()
        .find(|(_, c)| !c.is_whitespace())
        .map(|(i, _)| i)
        .unwrap_or(line.len());
    let (indent, body) = line.split_at(indent_end);
    let mut out = String::with_capacity(line.len());
    out.push_str(indent);
    let mut in_spaces = false;
    for ch in body.chars() {
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
    out
}
