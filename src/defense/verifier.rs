//! Phase B: qualitative content verification.
//!
//! Checks that a proposed region actually reads like the claimed section
//! kind. Marker vocabularies cover EN, ES, FR, DE, and PT. A chapter
//! indicator anywhere inside the region forces rejection; for front matter
//! the entire `[0, end]` span is scanned, not just the boundary line.
//! Table-of-contents entry lines (dot leaders, trailing page numbers) are
//! not treated as chapter headings.

use regex::Regex;
use std::sync::LazyLock;

use super::{BoundaryProposal, SectionKind};
use crate::patterns::CHAPTER_INDICATOR;

/// Phase B verdict for one region.
#[derive(Debug, Clone, PartialEq)]
pub struct ContentVerdict {
    pub passed: bool,
    /// Ladder value: 0.95 all markers, 0.85 for ≥3, 0.75 for 2, 0.65 for
    /// 1, 0.40 for none.
    pub confidence: f64,
    /// Labels of the marker groups found.
    pub markers: Vec<&'static str>,
    /// Populated when a chapter indicator forced rejection.
    pub rejection: Option<String>,
}

/// Qualitative verifier over proposed removal regions.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContentVerifier;

static DOT_LEADER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\.{3,}\s*\d{1,4}\s*$").expect("dot leader regex"));
static TRAILING_PAGE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s\d{1,4}\s*$").expect("trailing page regex"));
static NUMBERED_ENTRY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*\d{1,3}\.\s+\S").expect("numbered entry regex"));
static INDEX_ENTRY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-zÀ-ÿ][^,]{0,60},\s*\d{1,4}(?:\s*[,\-–]\s*\d{1,4})*\s*$")
        .expect("index entry regex")
});
static SINGLE_LETTER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*[A-Z]\s*$").expect("single letter regex"));
static AUX_ENTRY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^\s*(?:figure|fig\.|illustration|plate|map|chart|diagram|table|exhibit|equation|figura|mapa|tabla|tableau|carte|abbildung|tabelle|tabela)\s*\d",
    )
    .expect("aux entry regex")
});

const CONTENTS_HEADINGS: &[&str] = &[
    "table of contents",
    "contents",
    "contenido",
    "índice",
    "indice",
    "table des matières",
    "sommaire",
    "inhaltsverzeichnis",
    "inhalt",
    "sumário",
    "sumario",
];

const COPYRIGHT_MARKERS: &[&str] = &[
    "copyright",
    "©",
    "all rights reserved",
    "derechos reservados",
    "tous droits réservés",
    "alle rechte vorbehalten",
    "direitos reservados",
];

const PUBLISHER_MARKERS: &[&str] = &[
    "published by",
    "first edition",
    "printing",
    "editorial",
    "primera edición",
    "éditions",
    "première édition",
    "verlag",
    "erste auflage",
    "editora",
    "primeira edição",
];

const DEDICATION_MARKERS: &[&str] = &[
    "dedication",
    "dedicated to",
    "dedicatoria",
    "dédicace",
    "widmung",
    "dedicatória",
];

const ACKNOWLEDGMENT_MARKERS: &[&str] = &[
    "acknowledgments",
    "acknowledgements",
    "agradecimientos",
    "remerciements",
    "danksagung",
    "agradecimentos",
];

const NOTES_MARKERS: &[&str] = &[
    "endnotes",
    "notes",
    "notas",
    "anmerkungen",
    "notes de fin",
];

const APPENDIX_MARKERS: &[&str] = &[
    "appendix",
    "apéndice",
    "apendice",
    "annexe",
    "anhang",
    "apêndice",
];

const GLOSSARY_MARKERS: &[&str] = &[
    "glossary",
    "glosario",
    "glossaire",
    "glossar",
    "glossário",
];

const BIBLIOGRAPHY_MARKERS: &[&str] = &[
    "bibliography",
    "references",
    "works cited",
    "bibliografía",
    "bibliografia",
    "referencias",
    "bibliographie",
    "références",
    "literaturverzeichnis",
    "quellen",
    "referências",
];

const INDEX_MARKERS: &[&str] = &["index", "índice", "indice", "register"];

const AUX_LIST_HEADINGS: &[&str] = &[
    "list of figures",
    "list of illustrations",
    "list of plates",
    "list of maps",
    "list of charts",
    "list of diagrams",
    "list of tables",
    "list of exhibits",
    "list of code samples",
    "list of equations",
    "list of abbreviations",
    "list of acronyms",
    "list of symbols",
    "lista de figuras",
    "lista de ilustraciones",
    "lista de mapas",
    "lista de tablas",
    "lista de abreviaturas",
    "lista de símbolos",
    "liste des figures",
    "liste des illustrations",
    "liste des cartes",
    "liste des tableaux",
    "liste des abréviations",
    "abbildungsverzeichnis",
    "tabellenverzeichnis",
    "kartenverzeichnis",
    "abkürzungsverzeichnis",
    "symbolverzeichnis",
    "lista de abreviações",
    "lista de tabelas",
];

impl ContentVerifier {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Verify a proposal's region against its claimed kind.
    pub fn verify(&self, proposal: &BoundaryProposal, lines: &[String]) -> ContentVerdict {
        if lines.is_empty() || proposal.start_line >= lines.len() {
            return ContentVerdict {
                passed: false,
                confidence: 0.40,
                markers: Vec::new(),
                rejection: Some("region outside working text".into()),
            };
        }
        let end = proposal.end_line.min(lines.len() - 1);
        // Front matter is always verified from the top of the document.
        let start = match proposal.kind {
            SectionKind::FrontMatter => 0,
            _ => proposal.start_line,
        };
        let region = &lines[start..=end];

        if let Some(line) = region.iter().find(|l| is_chapter_heading(l)) {
            return ContentVerdict {
                passed: false,
                confidence: 0.40,
                markers: Vec::new(),
                rejection: Some(format!(
                    "region contains a chapter heading: {:?}",
                    line.trim()
                )),
            };
        }

        let groups = self.marker_groups(proposal.kind, region);
        let expected = groups.len();
        let markers: Vec<&'static str> = groups
            .into_iter()
            .filter_map(|(label, found)| found.then_some(label))
            .collect();

        let confidence = match markers.len() {
            n if n == expected && expected > 0 => 0.95,
            n if n >= 3 => 0.85,
            2 => 0.75,
            1 => 0.65,
            _ => 0.40,
        };

        ContentVerdict {
            passed: !markers.is_empty(),
            confidence,
            markers,
            rejection: None,
        }
    }

    fn marker_groups(
        &self,
        kind: SectionKind,
        region: &[String],
    ) -> Vec<(&'static str, bool)> {
        let any = |needles: &[&str]| {
            region
                .iter()
                .any(|line| contains_any(&line.to_lowercase(), needles))
        };
        let count_re = |re: &Regex, min: usize| region.iter().filter(|l| re.is_match(l)).count() >= min;

        match kind {
            SectionKind::FrontMatter => vec![
                ("copyright", any(COPYRIGHT_MARKERS)),
                ("publisher", any(PUBLISHER_MARKERS)),
                ("isbn", any(&["isbn"])),
                ("dedication", any(DEDICATION_MARKERS)),
                ("acknowledgments", any(ACKNOWLEDGMENT_MARKERS)),
                ("contents heading", any(CONTENTS_HEADINGS)),
            ],
            SectionKind::TableOfContents => vec![
                ("contents heading", any(CONTENTS_HEADINGS)),
                ("dot leaders", count_re(&DOT_LEADER, 2)),
                ("page-numbered entries", count_re(&TRAILING_PAGE, 3)),
            ],
            SectionKind::BackMatter => vec![
                ("notes", any(NOTES_MARKERS)),
                ("appendix", any(APPENDIX_MARKERS)),
                ("glossary", any(GLOSSARY_MARKERS)),
                ("bibliography", any(BIBLIOGRAPHY_MARKERS)),
                ("index", any(INDEX_MARKERS)),
                ("numbered notes", count_re(&NUMBERED_ENTRY, 3)),
            ],
            SectionKind::Index => vec![
                ("index heading", any(INDEX_MARKERS)),
                ("alphabetised entries", count_re(&INDEX_ENTRY, 5)),
                ("letter headings", count_re(&SINGLE_LETTER, 2)),
            ],
            SectionKind::AuxiliaryList => vec![
                ("list heading", any(AUX_LIST_HEADINGS)),
                ("list entries", count_re(&AUX_ENTRY, 2)),
                ("page-numbered entries", count_re(&TRAILING_PAGE, 2)),
            ],
            SectionKind::FootnoteSection => vec![
                ("notes heading", any(NOTES_MARKERS)),
                ("numbered entries", count_re(&NUMBERED_ENTRY, 3)),
            ],
        }
    }
}

/// A chapter indicator line, unless it reads like a TOC entry (dot leader
/// or trailing page number).
fn is_chapter_heading(line: &str) -> bool {
    CHAPTER_INDICATOR.is_match(line)
        && !DOT_LEADER.is_match(line)
        && !TRAILING_PAGE.is_match(line)
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(n))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn proposal(kind: SectionKind, start: usize, end: usize) -> BoundaryProposal {
        BoundaryProposal {
            kind,
            start_line: start,
            end_line: end,
            confidence: 0.8,
            evidence: vec![],
        }
    }

    fn lines(texts: &[&str]) -> Vec<String> {
        texts.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn front_matter_with_three_markers() {
        let lines = lines(&[
            "THE GREAT WAR",
            "Copyright © 1998 by A. Author",
            "All rights reserved",
            "ISBN 0-123-45678-9",
            "Published by Example House",
            "",
            "The story begins here.",
        ]);
        let verdict = ContentVerifier::new().verify(
            &proposal(SectionKind::FrontMatter, 0, 5),
            &lines,
        );
        assert!(verdict.passed);
        assert!(verdict.confidence >= 0.85);
        assert!(verdict.markers.contains(&"copyright"));
    }

    #[test]
    fn chapter_heading_inside_front_matter_rejects() {
        let lines = lines(&[
            "Copyright © 1998",
            "Chapter 1",
            "It was a dark night.",
            "more text",
        ]);
        // The chapter heading at line 1 is inside the proposed region even
        // though the boundary itself is later.
        let verdict = ContentVerifier::new().verify(
            &proposal(SectionKind::FrontMatter, 0, 3),
            &lines,
        );
        assert!(!verdict.passed);
        assert!(verdict.rejection.is_some());
    }

    #[test]
    fn toc_entries_are_not_chapter_headings() {
        let lines = lines(&[
            "CONTENTS",
            "Chapter 1. The Road ......... 3",
            "Chapter 2. The River ........ 27",
            "Chapter 3. The Sea .......... 55",
        ]);
        let verdict = ContentVerifier::new().verify(
            &proposal(SectionKind::TableOfContents, 0, 3),
            &lines,
        );
        assert!(verdict.passed);
        assert!(verdict.confidence >= 0.85);
    }

    #[test]
    fn back_matter_markers_multilingual() {
        let lines = lines(&[
            "BIBLIOGRAFÍA",
            "1. Primer libro citado",
            "2. Segundo libro citado",
            "3. Tercer libro citado",
        ]);
        let verdict = ContentVerifier::new().verify(
            &proposal(SectionKind::BackMatter, 0, 3),
            &lines,
        );
        assert!(verdict.passed);
        assert_eq!(verdict.confidence, 0.75);
    }

    #[test]
    fn no_markers_fails_with_floor_confidence() {
        let lines = lines(&["just a narrative line", "and another one"]);
        let verdict = ContentVerifier::new().verify(
            &proposal(SectionKind::BackMatter, 0, 1),
            &lines,
        );
        assert!(!verdict.passed);
        assert_eq!(verdict.confidence, 0.40);
    }

    #[test]
    fn index_shape() {
        let mut entries = vec!["INDEX".to_string(), "A".to_string()];
        for (word, page) in [
            ("apple", 12),
            ("anchor", 30),
            ("beacon", 44),
            ("candle", 61),
            ("derrick", 73),
        ] {
            entries.push(format!("{word}, {page}"));
        }
        entries.push("B".to_string());
        let verdict = ContentVerifier::new().verify(
            &proposal(SectionKind::Index, 0, entries.len() - 1),
            &entries,
        );
        assert!(verdict.passed);
        assert_eq!(verdict.confidence, 0.95);
    }
}
