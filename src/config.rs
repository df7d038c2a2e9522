//! Pipeline configuration: presets, toggles, and output styling.
//!
//! [`CleaningConfig`] is a plain value bag with builder-style setters. A
//! [`Preset`] materialises a coherent option block; individual setters then
//! override single options. Environment overrides (model name, extended
//! timeouts) are resolved once at construction via `dotenvy`, mirroring how
//! the runtime config in the workflow runner resolves its database name.

use serde::{Deserialize, Serialize};

/// Named option blocks for common cleaning profiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Preset {
    /// Balanced cleaning for general reading corpora.
    #[default]
    Default,
    /// Aggressive cleaning tuned for LLM training data.
    Training,
    /// Light-touch cleanup: character repair and page furniture only.
    Minimal,
    /// Preserves citations and scholarly apparatus.
    Scholarly,
}

/// How the assembler renders the metadata block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetadataFormat {
    #[default]
    Yaml,
    Json,
    Markdown,
}

/// Marker style inserted before detected chapter headings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChapterMarkerStyle {
    #[default]
    None,
    HtmlComment,
    MarkdownH1,
    MarkdownH2,
    TokenStyle,
}

/// Marker appended after the last content line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndMarkerStyle {
    None,
    Minimal,
    Simple,
    #[default]
    Standard,
    HtmlComment,
    Token,
}

/// Recognised-option bag controlling a pipeline run.
///
/// Constructed from a preset and refined with `#[must_use]` setters:
///
/// ```rust
/// use bookloom::config::{CleaningConfig, Preset, MetadataFormat};
///
/// let config = CleaningConfig::preset(Preset::Training)
///     .remove_citations(true)
///     .metadata_format(MetadataFormat::Json);
/// assert_eq!(config.max_paragraph_words, 200);
/// ```
#[allow(clippy::struct_excessive_bools)]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleaningConfig {
    pub preset: Preset,
    /// Enables step 9 (auxiliary list removal).
    pub remove_auxiliary_lists: bool,
    /// Enables step 10 (inline citation removal).
    pub remove_citations: bool,
    /// Enables step 11 (footnote/endnote removal).
    pub remove_footnotes_endnotes: bool,
    /// Paragraphs longer than this get split in step 14; 0 disables it.
    pub max_paragraph_words: usize,
    pub metadata_format: MetadataFormat,
    pub chapter_marker_style: ChapterMarkerStyle,
    pub end_marker_style: EndMarkerStyle,
    /// Threshold used by the advisory rules; default 0.75.
    pub confidence_threshold: f64,
    pub respect_content_flags: bool,
    pub preserve_code_blocks: bool,
    pub preserve_math_symbols: bool,
    /// Routes to the evolved pipeline; the legacy path is unsupported here.
    pub use_evolved_pipeline: bool,
    /// Model identifier forwarded to the injected LLM client.
    pub model: String,
    /// Content type selected by the user, if any; checked against the
    /// reconnaissance result as an alignment advisory.
    pub expected_document_type: Option<crate::types::DocumentType>,
}

impl Default for CleaningConfig {
    fn default() -> Self {
        Self::preset(Preset::Default)
    }
}

impl CleaningConfig {
    /// Builds the option block for a preset.
    #[must_use]
    pub fn preset(preset: Preset) -> Self {
        let base = Self {
            preset,
            remove_auxiliary_lists: true,
            remove_citations: true,
            remove_footnotes_endnotes: true,
            max_paragraph_words: 250,
            metadata_format: MetadataFormat::default(),
            chapter_marker_style: ChapterMarkerStyle::default(),
            end_marker_style: EndMarkerStyle::default(),
            confidence_threshold: 0.75,
            respect_content_flags: true,
            preserve_code_blocks: true,
            preserve_math_symbols: true,
            use_evolved_pipeline: true,
            model: resolve_model(),
            expected_document_type: None,
        };
        match preset {
            Preset::Default => base,
            Preset::Training => Self {
                max_paragraph_words: 200,
                chapter_marker_style: ChapterMarkerStyle::TokenStyle,
                end_marker_style: EndMarkerStyle::Token,
                ..base
            },
            Preset::Minimal => Self {
                remove_auxiliary_lists: false,
                remove_citations: false,
                remove_footnotes_endnotes: false,
                max_paragraph_words: 0,
                end_marker_style: EndMarkerStyle::None,
                ..base
            },
            Preset::Scholarly => Self {
                remove_citations: false,
                remove_footnotes_endnotes: false,
                max_paragraph_words: 300,
                ..base
            },
        }
    }

    #[must_use]
    pub fn remove_auxiliary_lists(mut self, enabled: bool) -> Self {
        self.remove_auxiliary_lists = enabled;
        self
    }

    #[must_use]
    pub fn remove_citations(mut self, enabled: bool) -> Self {
        self.remove_citations = enabled;
        self
    }

    #[must_use]
    pub fn remove_footnotes_endnotes(mut self, enabled: bool) -> Self {
        self.remove_footnotes_endnotes = enabled;
        self
    }

    /// Set the paragraph-split threshold; 0 disables the optimise step.
    #[must_use]
    pub fn max_paragraph_words(mut self, words: usize) -> Self {
        self.max_paragraph_words = words;
        self
    }

    #[must_use]
    pub fn metadata_format(mut self, format: MetadataFormat) -> Self {
        self.metadata_format = format;
        self
    }

    #[must_use]
    pub fn chapter_marker_style(mut self, style: ChapterMarkerStyle) -> Self {
        self.chapter_marker_style = style;
        self
    }

    #[must_use]
    pub fn end_marker_style(mut self, style: EndMarkerStyle) -> Self {
        self.end_marker_style = style;
        self
    }

    /// Set the advisory confidence threshold.
    ///
    /// # Panics (debug only)
    ///
    /// Debug-asserts that `threshold` is in \[0.0, 1.0\].
    #[must_use]
    pub fn confidence_threshold(mut self, threshold: f64) -> Self {
        debug_assert!(
            (0.0..=1.0).contains(&threshold),
            "confidence_threshold must be in [0.0, 1.0], got {threshold}",
        );
        self.confidence_threshold = threshold;
        self
    }

    #[must_use]
    pub fn respect_content_flags(mut self, enabled: bool) -> Self {
        self.respect_content_flags = enabled;
        self
    }

    #[must_use]
    pub fn preserve_code_blocks(mut self, enabled: bool) -> Self {
        self.preserve_code_blocks = enabled;
        self
    }

    #[must_use]
    pub fn preserve_math_symbols(mut self, enabled: bool) -> Self {
        self.preserve_math_symbols = enabled;
        self
    }

    #[must_use]
    pub fn use_evolved_pipeline(mut self, enabled: bool) -> Self {
        self.use_evolved_pipeline = enabled;
        self
    }

    #[must_use]
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    #[must_use]
    pub fn expected_document_type(mut self, kind: crate::types::DocumentType) -> Self {
        self.expected_document_type = Some(kind);
        self
    }

    /// True when step 14 (paragraph optimisation) should run.
    #[must_use]
    pub fn optimize_enabled(&self) -> bool {
        self.max_paragraph_words > 0
    }
}

fn resolve_model() -> String {
    dotenvy::dotenv().ok();
    std::env::var("BOOKLOOM_MODEL").unwrap_or_else(|_| "default-cleaning-model".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets_materialise_blocks() {
        let training = CleaningConfig::preset(Preset::Training);
        assert_eq!(training.max_paragraph_words, 200);
        assert_eq!(training.end_marker_style, EndMarkerStyle::Token);

        let minimal = CleaningConfig::preset(Preset::Minimal);
        assert!(!minimal.remove_citations);
        assert!(!minimal.optimize_enabled());

        let scholarly = CleaningConfig::preset(Preset::Scholarly);
        assert!(!scholarly.remove_citations);
        assert!(scholarly.remove_auxiliary_lists);
        assert_eq!(scholarly.max_paragraph_words, 300);
    }

    #[test]
    fn setters_override_preset() {
        let config = CleaningConfig::preset(Preset::Minimal).remove_citations(true);
        assert!(config.remove_citations);
        assert_eq!(config.preset, Preset::Minimal);
    }
}
