//! Phase 7: deterministic assembly of the final artifact.
//!
//! Prepends the metadata block in the configured format, a title heading,
//! chapter markers on the line preceding each detected heading, and an end
//! marker. Everything here is pure string construction; chapter positions
//! come from matching reconnaissance hints against the current working
//! text because earlier removals shifted the original line numbers.

use serde_json::json;
use tracing::debug;

use crate::config::{ChapterMarkerStyle, CleaningConfig, EndMarkerStyle, MetadataFormat};
use crate::textutil::normalize_for_repetition;
use crate::types::{Metadata, StructureHints};

/// Result of assembly, with the insertion count for line-budget checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssemblyOutcome {
    pub text: String,
    pub chapters_marked: usize,
    pub inserted_lines: usize,
}

/// Deterministic final assembler.
#[derive(Debug, Clone, Copy, Default)]
pub struct Assembler;

impl Assembler {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Build the final artifact from the cleaned working text.
    #[must_use]
    pub fn assemble(
        &self,
        text: &str,
        metadata: &Metadata,
        hints: Option<&StructureHints>,
        config: &CleaningConfig,
    ) -> AssemblyOutcome {
        let mut inserted_lines = 0usize;

        let (body, chapters_marked) = match (config.chapter_marker_style, hints) {
            (ChapterMarkerStyle::None, _) | (_, None) => (text.to_string(), 0),
            (style, Some(hints)) => {
                let (body, marked, added) = insert_chapter_markers(text, hints, style);
                inserted_lines += added;
                (body, marked)
            }
        };

        let mut out = String::new();
        let header = metadata_block(metadata, config.metadata_format);
        inserted_lines += header.lines().count() + 1;
        out.push_str(&header);
        out.push('\n');

        if config.metadata_format != MetadataFormat::Markdown {
            out.push_str(&format!("# {}\n\n", metadata.display_title()));
            inserted_lines += 2;
        }

        out.push_str(body.trim_end());

        if let Some(marker) = end_marker(config.end_marker_style) {
            out.push_str("\n\n");
            out.push_str(marker);
            inserted_lines += 2;
        }
        out.push('\n');

        debug!(chapters_marked, inserted_lines, "assembly complete");
        AssemblyOutcome {
            text: out,
            chapters_marked,
            inserted_lines,
        }
    }
}

fn metadata_block(metadata: &Metadata, format: MetadataFormat) -> String {
    match format {
        MetadataFormat::Yaml => {
            let mut out = String::from("---\n");
            let mut field = |key: &str, value: &Option<String>| {
                if let Some(value) = value {
                    out.push_str(&format!("{key}: {}\n", yaml_scalar(value)));
                }
            };
            field("title", &metadata.title);
            field("subtitle", &metadata.subtitle);
            field("author", &metadata.author);
            field("publisher", &metadata.publisher);
            field("publish_date", &metadata.publish_date);
            field("isbn", &metadata.isbn);
            field("language", &metadata.language);
            field("genre", &metadata.genre);
            field("series", &metadata.series);
            field("edition", &metadata.edition);
            out.push_str("---\n");
            out
        }
        MetadataFormat::Json => {
            let value = json!({
                "title": metadata.title,
                "subtitle": metadata.subtitle,
                "author": metadata.author,
                "publisher": metadata.publisher,
                "publish_date": metadata.publish_date,
                "isbn": metadata.isbn,
                "language": metadata.language,
                "genre": metadata.genre,
                "series": metadata.series,
                "edition": metadata.edition,
            });
            let rendered = serde_json::to_string_pretty(&value)
                .unwrap_or_else(|_| "{}".to_string());
            format!("```json\n{rendered}\n```\n")
        }
        MetadataFormat::Markdown => {
            let mut out = format!("# {}\n", metadata.display_title());
            if let Some(subtitle) = &metadata.subtitle {
                out.push_str(&format!("## {subtitle}\n"));
            }
            out.push('\n');
            let mut field = |label: &str, value: &Option<String>| {
                if let Some(value) = value {
                    out.push_str(&format!("**{label}:** {value}  \n"));
                }
            };
            field("Author", &metadata.author);
            field("Publisher", &metadata.publisher);
            field("Published", &metadata.publish_date);
            field("ISBN", &metadata.isbn);
            field("Language", &metadata.language);
            field("Genre", &metadata.genre);
            field("Series", &metadata.series);
            field("Edition", &metadata.edition);
            out
        }
    }
}

fn yaml_scalar(value: &str) -> String {
    if value
        .chars()
        .all(|c| c.is_alphanumeric() || matches!(c, ' ' | '-' | '.' | '\''))
    {
        value.to_string()
    } else {
        format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
    }
}

/// Insert one marker line directly before each matched chapter heading.
fn insert_chapter_markers(
    text: &str,
    hints: &StructureHints,
    style: ChapterMarkerStyle,
) -> (String, usize, usize) {
    let lines: Vec<&str> = text.split('\n').collect();
    let mut marker_before: Vec<Option<String>> = vec![None; lines.len()];
    let mut marked = 0usize;

    for chapter in &hints.chapters {
        let needle = normalize_for_repetition(&chapter.name);
        if needle.len() < 3 {
            continue;
        }
        let found = lines.iter().position(|line| {
            let key = normalize_for_repetition(line.trim_start_matches('#').trim());
            !key.is_empty() && (key == needle || key.contains(&needle) || needle.contains(&key))
        });
        if let Some(idx) = found {
            if marker_before[idx].is_none() {
                marker_before[idx] = Some(marker_line(style, &chapter.name));
                marked += 1;
            }
        }
    }

    let mut out: Vec<String> = Vec::with_capacity(lines.len() + marked);
    for (idx, line) in lines.iter().enumerate() {
        if let Some(marker) = marker_before[idx].take() {
            out.push(marker);
        }
        out.push((*line).to_string());
    }
    (out.join("\n"), marked, marked)
}

fn marker_line(style: ChapterMarkerStyle, name: &str) -> String {
    match style {
        ChapterMarkerStyle::None => String::new(),
        ChapterMarkerStyle::HtmlComment => format!("<!-- CHAPTER: {name} -->"),
        ChapterMarkerStyle::MarkdownH1 => format!("# {name}"),
        ChapterMarkerStyle::MarkdownH2 => format!("## {name}"),
        ChapterMarkerStyle::TokenStyle => format!("<|chapter|> {name}"),
    }
}

fn end_marker(style: EndMarkerStyle) -> Option<&'static str> {
    match style {
        EndMarkerStyle::None => None,
        EndMarkerStyle::Minimal => Some("* * *"),
        EndMarkerStyle::Simple => Some("THE END"),
        EndMarkerStyle::Standard => Some("--- THE END ---"),
        EndMarkerStyle::HtmlComment => Some("<!-- END OF BOOK -->"),
        EndMarkerStyle::Token => Some("<|endofbook|>"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Preset;
    use crate::types::ChapterHint;

    fn metadata() -> Metadata {
        Metadata {
            title: Some("The Long Road".into()),
            author: Some("A. Writer".into()),
            publish_date: Some("1998".into()),
            ..Default::default()
        }
    }

    fn hints_with_chapter(name: &str) -> StructureHints {
        StructureHints {
            chapters: vec![ChapterHint {
                name: name.into(),
                start_line: 0,
                confidence: 0.9,
            }],
            ..Default::default()
        }
    }

    #[test]
    fn yaml_block_and_title_heading() {
        let config = CleaningConfig::preset(Preset::Default);
        let outcome = Assembler::new().assemble("body text", &metadata(), None, &config);
        assert!(outcome.text.starts_with("---\ntitle: The Long Road\n"));
        assert!(outcome.text.contains("\n# The Long Road\n"));
        assert!(outcome.text.contains("body text"));
        assert!(outcome.text.trim_end().ends_with("--- THE END ---"));
    }

    #[test]
    fn marker_goes_on_preceding_line() {
        let config = CleaningConfig::preset(Preset::Default)
            .chapter_marker_style(ChapterMarkerStyle::HtmlComment);
        let text = "intro\nChapter One\nstory text";
        let outcome = Assembler::new().assemble(
            text,
            &metadata(),
            Some(&hints_with_chapter("Chapter One")),
            &config,
        );
        let lines: Vec<&str> = outcome.text.split('\n').collect();
        let heading = lines.iter().position(|l| *l == "Chapter One").unwrap();
        assert_eq!(lines[heading - 1], "<!-- CHAPTER: Chapter One -->");
        assert_eq!(outcome.chapters_marked, 1);
    }

    #[test]
    fn json_metadata_is_fenced() {
        let config =
            CleaningConfig::preset(Preset::Default).metadata_format(MetadataFormat::Json);
        let outcome = Assembler::new().assemble("body", &metadata(), None, &config);
        assert!(outcome.text.starts_with("```json\n{"));
        assert!(outcome.text.contains("\"title\": \"The Long Road\""));
    }

    #[test]
    fn markdown_metadata_has_no_duplicate_heading() {
        let config =
            CleaningConfig::preset(Preset::Default).metadata_format(MetadataFormat::Markdown);
        let outcome = Assembler::new().assemble("body", &metadata(), None, &config);
        assert_eq!(outcome.text.matches("# The Long Road").count(), 1);
        assert!(outcome.text.contains("**Author:** A. Writer"));
    }

    #[test]
    fn token_preset_markers() {
        let config = CleaningConfig::preset(Preset::Training);
        let text = "Chapter One\nstory";
        let outcome = Assembler::new().assemble(
            text,
            &metadata(),
            Some(&hints_with_chapter("Chapter One")),
            &config,
        );
        assert!(outcome.text.contains("<|chapter|> Chapter One\nChapter One"));
        assert!(outcome.text.trim_end().ends_with("<|endofbook|>"));
    }

    #[test]
    fn insertion_count_bounds_line_growth() {
        let config = CleaningConfig::preset(Preset::Default);
        let text = "one\ntwo\nthree";
        let outcome = Assembler::new().assemble(text, &metadata(), None, &config);
        let grown = outcome.text.trim_end().lines().count();
        assert!(grown <= 3 + outcome.inserted_lines);
    }
}
