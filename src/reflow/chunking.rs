//! Line chunking for LLM reflow, with overlap-aware merging.
//!
//! Large documents are reflowed in chunks of ~2500 lines with a 60-line
//! overlap so paragraphs spanning a chunk seam are seen whole by at least
//! one call. Merging deduplicates the seam by fuzzy suffix–prefix
//! alignment over normalised lines.

/// Target chunk height in lines.
pub const CHUNK_TARGET_LINES: usize = 2500;
/// Lines shared between consecutive chunks.
pub const CHUNK_OVERLAP_LINES: usize = 60;

/// One chunk of the working text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Index of the chunk's first line in the full text.
    pub start_line: usize,
    pub text: String,
}

/// Split lines into overlapping chunks.
#[must_use]
pub fn split_chunks(lines: &[String], target: usize, overlap: usize) -> Vec<Chunk> {
    if lines.is_empty() {
        return Vec::new();
    }
    if lines.len() <= target {
        return vec![Chunk {
            start_line: 0,
            text: lines.join("\n"),
        }];
    }
    let step = target.saturating_sub(overlap).max(1);
    let mut chunks = Vec::new();
    let mut start = 0usize;
    while start < lines.len() {
        let end = (start + target).min(lines.len());
        chunks.push(Chunk {
            start_line: start,
            text: lines[start..end].join("\n"),
        });
        if end == lines.len() {
            break;
        }
        start += step;
    }
    chunks
}

/// Merge reflowed chunk outputs, deduplicating the overlap seams.
#[must_use]
pub fn merge_chunks(outputs: &[String], overlap: usize) -> String {
    let mut merged: Vec<String> = Vec::new();
    for output in outputs {
        let lines: Vec<String> = output.split('\n').map(str::to_string).collect();
        if merged.is_empty() {
            merged = lines;
            continue;
        }
        let skip = seam_overlap(&merged, &lines, overlap * 2);
        merged.extend(lines.into_iter().skip(skip));
    }
    merged.join("\n")
}

/// Longest k such that the last k meaningful lines of `left` equal the
/// first k of `right` under normalisation.
fn seam_overlap(left: &[String], right: &[String], max_k: usize) -> usize {
    let max_k = max_k.min(left.len()).min(right.len());
    for k in (1..=max_k).rev() {
        let left_tail = &left[left.len() - k..];
        let right_head = &right[..k];
        let matched = left_tail
            .iter()
            .zip(right_head.iter())
            .all(|(a, b)| lines_match(a, b));
        if matched && left_tail.iter().any(|l| !l.trim().is_empty()) {
            return k;
        }
    }
    0
}

/// Whitespace-insensitive comparison; reflow may rewrap but not rewrite.
fn lines_match(a: &str, b: &str) -> bool {
    let norm = |s: &str| s.split_whitespace().collect::<Vec<_>>().join(" ");
    norm(a) == norm(b)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("line number {i}")).collect()
    }

    #[test]
    fn small_input_is_one_chunk() {
        let input = lines(100);
        let chunks = split_chunks(&input, 2500, 60);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].start_line, 0);
    }

    #[test]
    fn chunks_overlap_by_the_configured_amount() {
        let input = lines(500);
        let chunks = split_chunks(&input, 200, 50);
        assert!(chunks.len() >= 3);
        assert_eq!(chunks[1].start_line, 150);
        // The first chunk's tail equals the second chunk's head.
        let first: Vec<&str> = chunks[0].text.split('\n').collect();
        let second: Vec<&str> = chunks[1].text.split('\n').collect();
        assert_eq!(&first[150..], &second[..50]);
    }

    #[test]
    fn merge_deduplicates_seams() {
        let input = lines(500);
        let chunks = split_chunks(&input, 200, 50);
        let outputs: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let merged = merge_chunks(&outputs, 50);
        assert_eq!(merged, input.join("\n"));
    }

    #[test]
    fn merge_tolerates_whitespace_drift() {
        let left = "alpha one\nbeta  two".to_string();
        let right = "beta two\ngamma three".to_string();
        let merged = merge_chunks(&[left, right], 10);
        assert_eq!(merged, "alpha one\nbeta  two\ngamma three");
    }

    #[test]
    fn disjoint_outputs_concatenate() {
        let merged = merge_chunks(&["a\nb".to_string(), "c\nd".to_string()], 10);
        assert_eq!(merged, "a\nb\nc\nd");
    }
}
