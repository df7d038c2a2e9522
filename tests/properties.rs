//! Property-based coverage for the deterministic transforms.

use proptest::prelude::*;

use bookloom::cleaning::characters::CharacterCleaner;
use bookloom::cleaning::references::{remove_citations, remove_footnote_markers};
use bookloom::defense::{BoundaryProposal, BoundaryValidator, SectionKind};
use bookloom::reflow::paragraphs::deterministic_rejoin;
use bookloom::textutil::word_count;
use bookloom::types::ContentFlags;

fn cleaner() -> CharacterCleaner {
    CharacterCleaner::new(ContentFlags::default(), true, true)
}

/// Lines of printable text with the artefacts the cleaner targets mixed
/// in: mojibake pairs, ligatures, doubled dashes, curly quotes, tabs.
fn noisy_text() -> impl Strategy<Value = String> {
    let artefact = prop_oneof![
        Just("Caf\u{C3}\u{A9}".to_string()),
        Just("\u{FB01}sh and \u{FB02}our".to_string()),
        Just("wait--no".to_string()),
        Just("\u{201C}quoted\u{201D} and \u{2018}single\u{2019}".to_string()),
        Just("left ( ) right".to_string()),
        Just("tab\there".to_string()),
        "[a-zA-Z ,.]{0,60}",
    ];
    proptest::collection::vec(artefact, 1..12).prop_map(|lines| lines.join("\n"))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn character_cleaning_is_idempotent(text in noisy_text()) {
        let once = cleaner().clean(&text).text;
        let twice = cleaner().clean(&once).text;
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn character_cleaning_never_adds_words(text in noisy_text()) {
        let before = word_count(&text);
        let after = word_count(&cleaner().clean(&text).text);
        prop_assert!(after <= before);
    }

    #[test]
    fn citation_removal_preserves_dois_and_decimals(
        prefix in "[a-z ]{0,20}",
        a in 1u32..9999,
        b in 1u32..9999,
    ) {
        let doi = format!("10.{a:04}/ref.{b}");
        let decimal = format!("{a}.{b}");
        let text = format!("{prefix} value {decimal} cited (Smith, 2020) at https://doi.org/{doi} end.");
        let cleaned = remove_citations(&text, true).text;
        prop_assert!(cleaned.contains(&doi), "DOI lost from {cleaned:?}");
        prop_assert!(cleaned.contains(&decimal), "decimal lost from {cleaned:?}");
        prop_assert!(!cleaned.contains("(Smith, 2020)"));
    }

    #[test]
    fn citation_removal_never_adds_words(text in "[a-zA-Z ,.()\\[\\]0-9]{0,200}") {
        let before = word_count(&text);
        let after = word_count(&remove_citations(&text, true).text);
        prop_assert!(after <= before);
    }

    #[test]
    fn marker_removal_never_adds_words(text in "[a-zA-Z \u{B9}\u{B2}\u{B3}*,.]{0,200}") {
        let before = word_count(&text);
        let after = word_count(&remove_footnote_markers(&text, true).text);
        prop_assert!(after <= before);
    }

    #[test]
    fn deterministic_rejoin_preserves_words_exactly(
        lines in proptest::collection::vec("[a-z ]{1,40}", 1..20),
    ) {
        let text = lines.join("\n");
        let before = word_count(&text);
        let after = word_count(&deterministic_rejoin(&text));
        prop_assert_eq!(before, after);
    }

    #[test]
    fn validator_never_accepts_inverted_or_oversized_ranges(
        start in 0usize..500,
        end in 0usize..500,
        confidence in 0.0f64..1.0,
        line_count in 1usize..500,
    ) {
        let proposal = BoundaryProposal {
            kind: SectionKind::BackMatter,
            start_line: start,
            end_line: end,
            confidence,
            evidence: vec![],
        };
        let check = BoundaryValidator::new().validate(&proposal, line_count, None);
        if check.is_valid() {
            prop_assert!(start <= end);
            prop_assert!(end < line_count);
            prop_assert!(confidence >= 0.70);
            prop_assert!(start * 2 >= line_count);
        }
    }
}
