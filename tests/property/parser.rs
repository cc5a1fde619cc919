//! Property-based tests for numbered suggestion parsing

use proptest::prelude::*;
use tabmind::suggestions::{parse_numbered_line, parse_numbered_lines, MAX_SUGGESTIONS};

proptest! {
    #[test]
    fn never_more_than_three(text in "(.{0,40}\n){0,12}") {
        let parsed = parse_numbered_lines(&text);
        prop_assert!(parsed.len() <= MAX_SUGGESTIONS);
        for item in &parsed {
            prop_assert!(!item.is_empty());
            prop_assert_eq!(item.trim(), item.as_str());
        }
    }

    #[test]
    fn numbered_items_are_extracted_in_order(
        items in prop::collection::vec("[a-z]{1,10}( [a-z]{1,10}){0,4}\\?", 0..8),
        preamble in "[A-Z][a-z ]{0,30}:",
    ) {
        let mut text = format!("{}\n", preamble);
        for (i, item) in items.iter().enumerate() {
            text.push_str(&format!("{}. {}\n", i + 1, item));
        }

        let expected: Vec<String> = items.iter().take(MAX_SUGGESTIONS).cloned().collect();
        prop_assert_eq!(parse_numbered_lines(&text), expected);
    }

    #[test]
    fn lines_without_ordinal_are_ignored(line in "[a-zA-Z ,!?]{0,60}") {
        prop_assert_eq!(parse_numbered_line(&line), None);
    }

    #[test]
    fn decimals_are_not_markers(whole in 0u32..1000, frac in 1u32..1000, rest in "[a-z ]{0,20}") {
        let line = format!("{}.{} {}", whole, frac, rest);
        prop_assert_eq!(parse_numbered_line(&line), None);
    }
}
