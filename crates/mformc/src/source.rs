use serde::Serialize;

use crate::diagnostics::Location;

/// One physical line of source, tagged with where it came from.
///
/// Stages rewrite `text` in place; `file` and `line` always point at the
/// originating source so diagnostics survive expansion and splitting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceLine {
    pub text: String,
    pub file: String,
    pub line: u32,
}

impl SourceLine {
    pub fn new(text: impl Into<String>, file: impl Into<String>, line: u32) -> Self {
        Self {
            text: text.into(),
            file: file.into(),
            line,
        }
    }

    /// Same provenance, different text.
    pub fn with_text(&self, text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            file: self.file.clone(),
            line: self.line,
        }
    }

    pub fn location(&self) -> Location {
        Location {
            file: self.file.clone(),
            line: self.line,
            col: None,
        }
    }
}

/// Splits `src` into numbered lines attributed to `file`.
pub fn split_source(src: &str, file: &str) -> Vec<SourceLine> {
    src.lines()
        .enumerate()
        .map(|(idx, text)| SourceLine::new(text, file, (idx + 1) as u32))
        .collect()
}

pub fn join_text(lines: &[SourceLine]) -> String {
    lines
        .iter()
        .map(|l| l.text.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Header {
    pub name: String,
    pub value: String,
}

impl Header {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_source_numbers_from_one_and_handles_crlf() {
        let lines = split_source("a\r\nb\nc", "main.mush");
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], SourceLine::new("a", "main.mush", 1));
        assert_eq!(lines[2].line, 3);
        assert_eq!(join_text(&lines), "a\nb\nc");
    }
}
