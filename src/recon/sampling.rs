//! Sample construction for reconnaissance prompts.
//!
//! The structure analysis sees three regions (head, middle, tail) capped at
//! 3000 characters each; the boundary calls see numbered excerpts whose
//! line numbers are absolute 0-based indices into the document, so the
//! model can answer with usable line numbers directly.

use crate::document::Document;

/// Character budget per sample region.
pub const SAMPLE_CHAR_BUDGET: usize = 3000;

/// Three-region sample of a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionSample {
    pub head: String,
    pub mid: String,
    pub tail: String,
}

/// Build head/mid/tail samples within the character budget.
#[must_use]
pub fn region_sample(document: &Document) -> RegionSample {
    let lines = document.lines();
    let n = lines.len();
    if n == 0 {
        return RegionSample {
            head: String::new(),
            mid: String::new(),
            tail: String::new(),
        };
    }
    let head = take_chars(lines.iter(), SAMPLE_CHAR_BUDGET);
    let mid_start = n / 2;
    let mid = take_chars(lines[mid_start..].iter(), SAMPLE_CHAR_BUDGET);
    let tail = take_chars_rev(lines, SAMPLE_CHAR_BUDGET);
    RegionSample { head, mid, tail }
}

/// Numbered excerpt of the document head for the front-matter boundary
/// call. Numbers are absolute 0-based line indices.
#[must_use]
pub fn head_excerpt(document: &Document, budget: usize) -> String {
    let mut out = String::new();
    for (idx, line) in document.lines().iter().enumerate() {
        let entry = format!("{idx}: {line}\n");
        if out.len() + entry.len() > budget {
            break;
        }
        out.push_str(&entry);
    }
    out
}

/// Numbered excerpt of the document tail for the back-matter boundary
/// call, also with absolute 0-based indices.
#[must_use]
pub fn tail_excerpt(document: &Document, budget: usize) -> String {
    let lines = document.lines();
    let mut picked: Vec<String> = Vec::new();
    let mut used = 0usize;
    for (idx, line) in lines.iter().enumerate().rev() {
        let entry = format!("{idx}: {line}\n");
        if used + entry.len() > budget {
            break;
        }
        used += entry.len();
        picked.push(entry);
    }
    picked.reverse();
    picked.concat()
}

fn take_chars<'a, I: Iterator<Item = &'a String>>(lines: I, budget: usize) -> String {
    let mut out = String::new();
    for line in lines {
        if out.len() + line.len() + 1 > budget {
            break;
        }
        out.push_str(line);
        out.push('\n');
    }
    out
}

fn take_chars_rev(lines: &[String], budget: usize) -> String {
    let mut picked: Vec<&String> = Vec::new();
    let mut used = 0usize;
    for line in lines.iter().rev() {
        if used + line.len() + 1 > budget {
            break;
        }
        used += line.len() + 1;
        picked.push(line);
    }
    picked.reverse();
    let mut out = String::new();
    for line in picked {
        out.push_str(line);
        out.push('\n');
    }
    out
}
