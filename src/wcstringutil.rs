//! Helper functions for working with wide strings.

use crate::wchar::prelude::*;

/// Joins strings with a separator.
pub fn join_strings<S: AsRef<wstr>>(strs: &[S], sep: char) -> WString {
    if strs.is_empty() {
        return WString::new();
    }
    let capacity = strs.iter().fold(0, |acc, s| acc + s.as_ref().len()) + strs.len() - 1;
    let mut result = WString::with_capacity(capacity);
    for (i, s) in strs.iter().enumerate() {
        if i > 0 {
            result.push(sep);
        }
        result.push_utfstr(s.as_ref());
    }
    result
}

/// Trim any of the given characters (whitespace by default) from both ends of the input.
pub fn trim(input: WString, any_of: Option<&wstr>) -> WString {
    let any_of = any_of.unwrap_or(L!("\t\x0B \r\n"));
    let mut result = input;
    let Some(suffix) = result.chars().rposition(|c| !any_of.contains(c)) else {
        return WString::new();
    };
    result.truncate(suffix + 1);

    let prefix = result
        .chars()
        .position(|c| !any_of.contains(c))
        .expect("Should have one non-trimmed character");
    result.split_off(prefix)
}

/// Return the number of escaping backslashes before a character.
/// `idx` may be "one past the end."
pub fn count_preceding_backslashes(text: &wstr, idx: usize) -> usize {
    assert!(idx <= text.len(), "Out of bounds");
    text.as_char_slice()[..idx]
        .iter()
        .rev()
        .take_while(|&&c| c == '\\')
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_strings() {
        let strs = [L!("a"), L!("b"), L!("c")];
        assert_eq!(join_strings(&strs, ' '), "a b c");
        assert_eq!(join_strings(&[] as &[&wstr], ' '), "");
    }

    #[test]
    fn test_trim() {
        assert_eq!(trim(L!("  ab c  ").to_owned(), None), "ab c");
        assert_eq!(trim(L!("   ").to_owned(), None), "");
        assert_eq!(trim(L!("xabx").to_owned(), Some(L!("x"))), "ab");
    }

    #[test]
    fn test_count_preceding_backslashes() {
        assert_eq!(count_preceding_backslashes(L!("a\\\\b"), 3), 2);
        assert_eq!(count_preceding_backslashes(L!("a\\\\b"), 1), 0);
    }
}
