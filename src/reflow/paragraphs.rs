//! Paragraph model, poetry heuristic, and deterministic rejoining.
//!
//! A paragraph is a maximal run of non-blank lines separated by blank
//! lines. Pagination breaks paragraphs mid-sentence; the deterministic
//! rejoin repairs exactly those breaks: a line with no sentence-final
//! punctuation followed by a line starting lowercase. Verse is left alone.

use crate::textutil::{ends_sentence, is_blank, word_count};

/// Share of lines that must lack sentence-final punctuation for a block
/// to read as verse.
const POETRY_UNPUNCTUATED_SHARE: f64 = 0.60;
/// Mean words per line below which short lines look like verse.
const POETRY_MEAN_WORDS: f64 = 12.0;
/// Minimum block height for the verse heuristic.
const POETRY_MIN_LINES: usize = 3;

/// One paragraph block: a run of non-blank lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub lines: Vec<String>,
}

impl Block {
    #[must_use]
    pub fn text(&self) -> String {
        self.lines.join("\n")
    }

    #[must_use]
    pub fn word_count(&self) -> usize {
        self.lines.iter().map(|l| word_count(l)).sum()
    }
}

/// Split text into paragraph blocks, dropping the blank separators.
#[must_use]
pub fn split_blocks(text: &str) -> Vec<Block> {
    let mut blocks = Vec::new();
    let mut current: Vec<String> = Vec::new();
    for line in text.split('\n') {
        if is_blank(line) {
            if !current.is_empty() {
                blocks.push(Block {
                    lines: std::mem::take(&mut current),
                });
            }
        } else {
            current.push(line.to_string());
        }
    }
    if !current.is_empty() {
        blocks.push(Block { lines: current });
    }
    blocks
}

/// Rebuild text from blocks with single blank-line separators.
#[must_use]
pub fn join_blocks(blocks: &[Block]) -> String {
    blocks
        .iter()
        .map(Block::text)
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Verse heuristic: at least three lines, short on average, mostly
/// without sentence-final punctuation.
#[must_use]
pub fn is_poetry_block(block: &Block) -> bool {
    if block.lines.len() < POETRY_MIN_LINES {
        return false;
    }
    let mean_words = block.word_count() as f64 / block.lines.len() as f64;
    if mean_words >= POETRY_MEAN_WORDS {
        return false;
    }
    let unpunctuated = block
        .lines
        .iter()
        .filter(|l| !ends_sentence(l))
        .count() as f64;
    unpunctuated / block.lines.len() as f64 > POETRY_UNPUNCTUATED_SHARE
}

/// Join pagination-broken lines inside one block.
///
/// A join happens when the line lacks sentence-final punctuation and the
/// next line starts lowercase. A trailing hyphen joins without a space so
/// compounds stay intact.
#[must_use]
pub fn rejoin_block(block: &Block) -> Block {
    let mut lines: Vec<String> = Vec::with_capacity(block.lines.len());
    for line in &block.lines {
        let joinable = lines.last().is_some_and(|prev: &String| {
            !ends_sentence(prev)
                && line
                    .trim_start()
                    .chars()
                    .next()
                    .is_some_and(|c| c.is_lowercase())
        });
        if joinable {
            let prev = lines.last_mut().expect("joinable implies a previous line");
            let trimmed_prev = prev.trim_end();
            if trimmed_prev.ends_with('-') {
                let joined = format!("{}{}", trimmed_prev, line.trim_start());
                *prev = joined;
            } else {
                let joined = format!("{} {}", trimmed_prev, line.trim_start());
                *prev = joined;
            }
        } else {
            lines.push(line.clone());
        }
    }
    Block { lines }
}

/// Deterministic reflow over whole text: rejoin every non-verse block.
#[must_use]
pub fn deterministic_rejoin(text: &str) -> String {
    let blocks: Vec<Block> = split_blocks(text)
        .into_iter()
        .map(|block| {
            if is_poetry_block(&block) {
                block
            } else {
                rejoin_block(&block)
            }
        })
        .collect();
    join_blocks(&blocks)
}
