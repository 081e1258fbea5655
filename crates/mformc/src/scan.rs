//! Character-level primitives shared by the comment stripper and the linter.
//!
//! Both walk a line as a `Vec<char>` through the same states; quotes never
//! span lines, block comments do.

use crate::language::{DROP_MARKER, RAW_MARKER};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    Normal,
    InString(char),
    InBlockComment,
}

const URL_SCHEMES: &[&str] = &["http://", "https://", "ftp://", "ftps://"];

pub fn is_raw_line(text: &str) -> bool {
    text.trim_start().starts_with(RAW_MARKER)
}

pub fn is_dropped_line(text: &str) -> bool {
    text.trim_start().starts_with(DROP_MARKER)
}

/// Length in chars of a scheme-prefixed URL starting at `i`, or 0.
///
/// The URL runs until whitespace, a quote or a bracketing character so that a
/// URL inside `[...]` does not swallow the closer.
pub fn url_len(chars: &[char], i: usize) -> usize {
    if i > 0 && chars[i - 1].is_ascii_alphanumeric() {
        return 0;
    }
    let scheme_len = URL_SCHEMES.iter().find_map(|scheme| {
        let n = scheme.chars().count();
        let matches = chars.len() >= i + n
            && chars[i..i + n]
                .iter()
                .zip(scheme.chars())
                .all(|(a, b)| a.to_ascii_lowercase() == b);
        matches.then_some(n)
    });
    let Some(scheme_len) = scheme_len else {
        return 0;
    };
    let mut end = i + scheme_len;
    while end < chars.len() && !ends_url(chars[end]) {
        end += 1;
    }
    end - i
}

fn ends_url(c: char) -> bool {
    c.is_whitespace() || matches!(c, '"' | '\'' | '[' | ']' | '(' | ')' | '{' | '}' | '<' | '>')
}

pub fn starts_with_at(chars: &[char], i: usize, pat: &str) -> bool {
    let mut idx = i;
    for c in pat.chars() {
        if chars.get(idx) != Some(&c) {
            return false;
        }
        idx += 1;
    }
    true
}

/// `/*` directly after `*` (as in `*/*`) is literal text, not a comment opener.
pub fn opens_block_comment(chars: &[char], i: usize) -> bool {
    starts_with_at(chars, i, "/*") && !(i > 0 && chars[i - 1] == '*')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chars(s: &str) -> Vec<char> {
        s.chars().collect()
    }

    #[test]
    fn url_len_stops_at_brackets_and_whitespace() {
        let c = chars("[get(https://example.com/x)] tail");
        assert_eq!(url_len(&c, 5), "https://example.com/x".len());
        let c = chars("see ftp://host/file now");
        assert_eq!(url_len(&c, 4), "ftp://host/file".len());
    }

    #[test]
    fn url_len_requires_scheme_at_word_start() {
        let c = chars("xhttp://nope");
        assert_eq!(url_len(&c, 1), 0);
        let c = chars("HTTPS://Example.com");
        assert_eq!(url_len(&c, 0), c.len());
    }

    #[test]
    fn star_slash_star_is_not_an_opener() {
        let c = chars("a*/*b");
        assert!(!opens_block_comment(&c, 2));
        let c = chars("a /* b");
        assert!(opens_block_comment(&c, 2));
    }
}
