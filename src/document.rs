//! Immutable source document handed to the pipeline.
//!
//! A [`Document`] is the read-only view of the original text: an ordered
//! sequence of lines plus aggregate counts. Lines are 0-indexed internally;
//! anything surfaced to embedders (removal records, boundary evidence) uses
//! 1-indexed line numbers.

/// Immutable source text as an ordered sequence of lines.
///
/// A line is a maximal `\n`-free substring of the input. The document is
/// never mutated during a pipeline run; every step works on the mutable
/// working copy owned by the run context instead.
///
/// # Examples
///
/// ```rust
/// use bookloom::document::Document;
///
/// let doc = Document::new("first line\nsecond line\n");
/// assert_eq!(doc.line_count(), 2);
/// assert_eq!(doc.line(1), Some("second line"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    lines: Vec<String>,
    char_count: usize,
}

impl Document {
    /// Split raw text into its line sequence.
    ///
    /// A single trailing newline does not produce an empty final line;
    /// interior blank lines are preserved because they carry paragraph
    /// structure.
    pub fn new(text: &str) -> Self {
        let char_count = text.chars().count();
        let trimmed = text.strip_suffix('\n').unwrap_or(text);
        let lines = if trimmed.is_empty() {
            Vec::new()
        } else {
            trimmed.split('\n').map(|l| l.to_string()).collect()
        };
        Self { lines, char_count }
    }

    /// Total number of lines.
    #[must_use]
    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    /// Total number of characters in the original text, newlines included.
    #[must_use]
    pub fn char_count(&self) -> usize {
        self.char_count
    }

    /// All lines, in order.
    #[must_use]
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// A single line by 0-based index.
    #[must_use]
    pub fn line(&self, index: usize) -> Option<&str> {
        self.lines.get(index).map(String::as_str)
    }

    /// Owned copy of the line sequence, used to seed the working text.
    #[must_use]
    pub fn to_working_lines(&self) -> Vec<String> {
        self.lines.clone()
    }

    /// Joins an inclusive line range back into text.
    ///
    /// Out-of-range indices are clamped; an inverted range yields an empty
    /// string.
    #[must_use]
    pub fn slice_text(&self, start: usize, end: usize) -> String {
        if self.lines.is_empty() || start > end {
            return String::new();
        }
        let end = end.min(self.lines.len().saturating_sub(1));
        self.lines[start..=end].join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_newlines() {
        let doc = Document::new("a\nb\nc");
        assert_eq!(doc.line_count(), 3);
        assert_eq!(doc.line(0), Some("a"));
        assert_eq!(doc.line(2), Some("c"));
    }

    #[test]
    fn trailing_newline_does_not_add_a_line() {
        let doc = Document::new("a\nb\n");
        assert_eq!(doc.line_count(), 2);
    }

    #[test]
    fn interior_blank_lines_survive() {
        let doc = Document::new("a\n\nb");
        assert_eq!(doc.line_count(), 3);
        assert_eq!(doc.line(1), Some(""));
    }

    #[test]
    fn empty_input_is_empty_document() {
        let doc = Document::new("");
        assert_eq!(doc.line_count(), 0);
        assert_eq!(doc.char_count(), 0);
    }

    #[test]
    fn slice_clamps_out_of_range() {
        let doc = Document::new("a\nb\nc");
        assert_eq!(doc.slice_text(1, 99), "b\nc");
        assert_eq!(doc.slice_text(2, 1), "");
    }
}
