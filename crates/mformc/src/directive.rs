//! Line-initial directive recognition shared by every stage.

/// Returns the argument text of `<sigil><name> ...` at the start of `text`.
///
/// Leading whitespace is ignored, the name matches case-insensitively and must
/// be followed by whitespace, `(`, `{` or the end of the line, so `#desc` never
/// matches `#description`. The returned argument is trimmed.
pub fn directive_arg<'a>(text: &'a str, sigil: char, name: &str) -> Option<&'a str> {
    let rest = text.trim_start().strip_prefix(sigil)?;
    let head = rest.get(..name.len())?;
    if !head.eq_ignore_ascii_case(name) {
        return None;
    }
    let tail = &rest[name.len()..];
    match tail.chars().next() {
        None => Some(""),
        Some(c) if c.is_whitespace() || c == '(' || c == '{' => Some(tail.trim()),
        Some(_) => None,
    }
}

/// Case-insensitive `strip_prefix` for ASCII keywords.
pub fn strip_prefix_ci<'a>(text: &'a str, prefix: &str) -> Option<&'a str> {
    let head = text.get(..prefix.len())?;
    if head.eq_ignore_ascii_case(prefix) {
        Some(&text[prefix.len()..])
    } else {
        None
    }
}

/// Removes one pair of matching surrounding quotes, if present.
pub fn unquote(raw: &str) -> &str {
    let raw = raw.trim();
    for q in ['"', '\''] {
        if raw.len() >= 2 && raw.starts_with(q) && raw.ends_with(q) {
            return &raw[1..raw.len() - 1];
        }
    }
    raw
}

pub fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Splits `a, b` at the first comma that is not nested in parentheses.
pub fn split_top_level_comma(text: &str) -> Option<(&str, &str)> {
    let mut depth = 0i32;
    for (idx, c) in text.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => depth -= 1,
            ',' if depth == 0 => return Some((&text[..idx], &text[idx + 1..])),
            _ => {}
        }
    }
    None
}
