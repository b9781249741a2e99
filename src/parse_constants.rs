//! Error records produced during expansion.

use crate::wchar::prelude::*;

/// Placeholder source offset for errors whose position is unknown.
pub const SOURCE_LOCATION_UNKNOWN: usize = usize::MAX;

/// Error code classification.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum ParseErrorCode {
    #[default]
    none,

    /// A syntax error: bad slice index, mismatched brackets, an empty variable name.
    syntax,
    /// An error produced while running or locating a command substitution.
    cmdsubst,
    /// Unclassified error types, e.g. exceeding the expansion limit.
    generic,
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ParseError {
    /// Text of the error.
    pub text: WString,
    /// Code for the error.
    pub code: ParseErrorCode,
    /// Offset and length of the token in the source code that triggered this error.
    pub source_start: usize,
    pub source_length: usize,
}

impl ParseError {
    /// Return a string describing the error, suitable for presentation to the user. If
    /// `is_interactive` is true, the offending line with a caret is printed as well.
    pub fn describe(&self, src: &wstr, is_interactive: bool) -> WString {
        self.describe_with_prefix(src, L!(""), is_interactive, false)
    }

    /// Return a string describing the error, suitable for presentation to the user, with the
    /// given prefix. If `skip_caret` is false, the offending line with a caret is printed as
    /// well.
    pub fn describe_with_prefix(
        &self,
        src: &wstr,
        prefix: &wstr,
        is_interactive: bool,
        skip_caret: bool,
    ) -> WString {
        let _ = is_interactive;
        let mut result = prefix.to_owned();
        result.push_utfstr(&self.text);
        if skip_caret || self.source_start >= src.len() {
            return result;
        }

        // Locate the beginning of this line of source, and append the line itself.
        let line_start = src.as_char_slice()[..self.source_start]
            .iter()
            .rposition(|&c| c == '\n')
            .map(|p| p + 1)
            .unwrap_or(0);
        let line_end = src.as_char_slice()[self.source_start..]
            .iter()
            .position(|&c| c == '\n')
            .map(|p| p + self.source_start)
            .unwrap_or(src.len());

        result.push('\n');
        result.push_utfstr(&src[line_start..line_end]);
        result.push('\n');
        for _ in line_start..self.source_start {
            result.push(' ');
        }
        result.push('^');
        result
    }
}

pub type ParseErrorList = Vec<ParseError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe_points_at_source() {
        let mut error = ParseError::default();
        error.code = ParseErrorCode::syntax;
        error.text = L!("Invalid index value").to_owned();
        error.source_start = 4;
        let description = error.describe(L!("$foo[x]"), false);
        assert_eq!(description, "Invalid index value\n$foo[x]\n    ^");
    }
}
