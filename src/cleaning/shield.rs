//! Placeholder shielding for protected substrings.
//!
//! Transformations that rewrite prose must not touch code blocks, tables,
//! DOIs, or decimal numerals. A [`Shield`] swaps protected spans for opaque
//! tokens (`⟦CODEBLK_0⟧`, `⟦DOI_3⟧`, …) before a transform and restores
//! them verbatim afterwards, so protected bytes survive untouched no matter
//! what the transform does around them.

use regex::Regex;

/// Opening bracket of shield tokens (U+27E6).
const OPEN: char = '\u{27E6}';
/// Closing bracket of shield tokens (U+27E7).
const CLOSE: char = '\u{27E7}';

/// Collects protected spans and restores them after transformation.
#[derive(Debug, Default)]
pub struct Shield {
    slots: Vec<(String, String)>,
}

impl Shield {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of shielded spans so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Extract fenced code blocks and markdown tables into placeholders.
    ///
    /// A code block spans from a ``` fence line to the closing fence
    /// (inclusive); an unterminated fence runs to the end of input. A table
    /// is a run of two or more `|`-delimited lines.
    #[must_use]
    pub fn extract_blocks(&mut self, text: &str, code: bool, tables: bool) -> String {
        let lines: Vec<&str> = text.split('\n').collect();
        let mut out: Vec<String> = Vec::with_capacity(lines.len());
        let mut i = 0;
        while i < lines.len() {
            let line = lines[i];
            if code && line.trim_start().starts_with("```") {
                let mut end = i + 1;
                while end < lines.len() && !lines[end].trim_start().starts_with("```") {
                    end += 1;
                }
                let end = end.min(lines.len() - 1);
                let block = lines[i..=end].join("\n");
                out.push(self.stash("CODEBLK", block));
                i = end + 1;
                continue;
            }
            if tables && is_table_line(line) && i + 1 < lines.len() && is_table_line(lines[i + 1])
            {
                let mut end = i + 1;
                while end < lines.len() && is_table_line(lines[end]) {
                    end += 1;
                }
                let block = lines[i..end].join("\n");
                out.push(self.stash("TABLE", block));
                i = end;
                continue;
            }
            out.push(line.to_string());
            i += 1;
        }
        out.join("\n")
    }

    /// Extract every match of `pattern` into placeholders tagged `tag`.
    #[must_use]
    pub fn extract_pattern(&mut self, text: &str, pattern: &Regex, tag: &str) -> String {
        let mut out = String::with_capacity(text.len());
        let mut cursor = 0;
        for m in pattern.find_iter(text) {
            out.push_str(&text[cursor..m.start()]);
            out.push_str(&self.stash(tag, m.as_str().to_string()));
            cursor = m.end();
        }
        out.push_str(&text[cursor..]);
        out
    }

    /// Shield an arbitrary span directly, returning its placeholder token.
    #[must_use]
    pub fn shield_span(&mut self, tag: &str, original: String) -> String {
        self.stash(tag, original)
    }

    /// Substitute every placeholder back with its original bytes.
    #[must_use]
    pub fn restore(&self, text: &str) -> String {
        let mut out = text.to_string();
        // Later slots may nest inside earlier restored content; reverse
        // order keeps every token resolvable in one pass.
        for (token, original) in self.slots.iter().rev() {
            out = out.replace(token, original);
        }
        out
    }

    fn stash(&mut self, tag: &str, original: String) -> String {
        let token = format!("{OPEN}{tag}_{}{CLOSE}", self.slots.len());
        self.slots.push((token.clone(), original));
        token
    }
}

fn is_table_line(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.len() > 2 && trimmed.starts_with('|') && trimmed.ends_with('|')
}
