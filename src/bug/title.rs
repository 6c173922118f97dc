//! Extraction of the tracking bug from a pull request title.

use crate::types::BugId;

const KEYWORD: &str = "bug";

/// Parses the first bug reference found in a pull request title.
///
/// # Parsing Rules
///
/// - The keyword `bug` is case-insensitive
/// - The keyword must be at a word boundary (not preceded by alphanumeric chars)
/// - Spaces, tabs, `#` and `:` may separate the keyword from the number
/// - The number must be followed by a non-alphanumeric character or end of text
/// - If multiple references are present, the first valid one wins
///
/// # Examples
///
/// ```
/// use autolander::bug::parse_bug_id;
/// use autolander::types::BugId;
///
/// assert_eq!(parse_bug_id("Bug 1234 - fix the thing"), Some(BugId(1234)));
/// assert_eq!(parse_bug_id("BUG #7: typo"), Some(BugId(7)));
/// assert_eq!(parse_bug_id("some invalid title"), None);
/// // Not a bug keyword (preceded by alphanumeric):
/// assert_eq!(parse_bug_id("debug 12 logging"), None);
/// ```
pub fn parse_bug_id(title: &str) -> Option<BugId> {
    let mut search_pos = 0;

    while search_pos < title.len() {
        let rest = title.get(search_pos..)?;
        let offset = find_keyword(rest)?;
        let abs_pos = search_pos + offset;

        let valid_boundary = abs_pos == 0
            || title[..abs_pos]
                .chars()
                .next_back()
                .is_some_and(|c| !c.is_alphanumeric());

        if valid_boundary && let Some(id) = parse_number_after(&title[abs_pos + KEYWORD.len()..]) {
            return Some(id);
        }

        search_pos = abs_pos + KEYWORD.len();
    }

    None
}

/// Finds the byte offset of the next case-insensitive occurrence of the keyword.
fn find_keyword(text: &str) -> Option<usize> {
    text.char_indices().find_map(|(i, _)| {
        text.get(i..i + KEYWORD.len())
            .filter(|candidate| candidate.eq_ignore_ascii_case(KEYWORD))
            .map(|_| i)
    })
}

fn parse_number_after(text: &str) -> Option<BugId> {
    let trimmed = text.trim_start_matches([' ', '\t', '#', ':']);
    let digits_end = trimmed
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(trimmed.len());

    if digits_end == 0 {
        return None;
    }

    if trimmed[digits_end..]
        .chars()
        .next()
        .is_some_and(|c| c.is_alphanumeric())
    {
        return None;
    }

    trimmed[..digits_end].parse().ok().map(BugId)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn parses_conventional_title() {
        assert_eq!(
            parse_bug_id("Bug 1128346 - Add autolander support"),
            Some(BugId(1128346))
        );
    }

    #[test]
    fn keyword_is_case_insensitive() {
        assert_eq!(parse_bug_id("bug 5 - x"), Some(BugId(5)));
        assert_eq!(parse_bug_id("bUg 5 - x"), Some(BugId(5)));
    }

    #[test]
    fn reference_may_appear_mid_title() {
        assert_eq!(parse_bug_id("Revert (Bug 42) change"), Some(BugId(42)));
    }

    #[test]
    fn keyword_without_number_is_skipped() {
        assert_eq!(parse_bug_id("bug fix for Bug 9"), Some(BugId(9)));
    }

    #[test]
    fn rejects_titles_without_reference() {
        assert_eq!(parse_bug_id("some invalid title"), None);
        assert_eq!(parse_bug_id(""), None);
        assert_eq!(parse_bug_id("Bug"), None);
        assert_eq!(parse_bug_id("Bug - 12"), None);
    }

    #[test]
    fn rejects_number_glued_to_letters() {
        assert_eq!(parse_bug_id("Bug 12abc"), None);
        assert_eq!(parse_bug_id("bugs 12"), None);
    }

    #[test]
    fn rejects_overflowing_number() {
        assert_eq!(parse_bug_id("Bug 99999999999999999999999"), None);
    }

    #[test]
    fn handles_multibyte_text() {
        assert_eq!(parse_bug_id("ñandú Bug 3 – émoji 🐛"), Some(BugId(3)));
        assert_eq!(parse_bug_id("🐛🐛🐛"), None);
    }

    proptest! {
        #[test]
        fn conventional_titles_roundtrip(n: u64, summary in "[a-zA-Z ]{0,40}") {
            let title = format!("Bug {} - {}", n, summary);
            prop_assert_eq!(parse_bug_id(&title), Some(BugId(n)));
        }

        #[test]
        fn never_panics(title in "\\PC{0,80}") {
            let _ = parse_bug_id(&title);
        }
    }
}
