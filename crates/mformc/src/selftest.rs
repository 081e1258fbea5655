//! `@test "NAME" { BODY } expect { EXPECTED }` blocks.
//!
//! Each block becomes one `think` line that evaluates both sides when the
//! code is loaded and prints a PASS or FAIL banner. Braces inside either side
//! nest; multi-line sides are joined the way continuation lines are.

use crate::context::CompilationContext;
use crate::diagnostics::Stage;
use crate::directive::strip_prefix_ci;
use crate::source::SourceLine;

#[derive(Debug, Clone, PartialEq, Eq)]
struct TestBlock {
    name: String,
    body: String,
    expected: String,
    /// Index of the line holding the closing `}` of the expectation.
    last: usize,
}

impl TestBlock {
    fn render(&self) -> String {
        let name = &self.name;
        format!(
            "think [setq(0, {})][setq(1, {})][ifelse(strmatch(%q0, %q1), ansi(gh, PASS: {name}), ansi(rh, FAIL: {name}: Expected '%q1' but got '%q0'))]",
            self.body, self.expected
        )
    }
}

/// Replaces every `@test` block with its generated check. The result keeps
/// the provenance of the block's first line.
pub fn expand_tests(lines: &[SourceLine], ctx: &mut CompilationContext) -> Vec<SourceLine> {
    let mut out = Vec::with_capacity(lines.len());
    let mut i = 0;
    while i < lines.len() {
        let line = &lines[i];
        if !opens_test(&line.text) {
            out.push(line.clone());
            i += 1;
            continue;
        }
        match parse_test_block(lines, i) {
            Some(block) => {
                tracing::debug!(name = %block.name, file = %line.file, line = line.line, "generated @test check");
                out.push(line.with_text(block.render()));
                i = block.last + 1;
            }
            None => {
                ctx.warn(
                    "MF-TPL-0008",
                    Stage::Template,
                    "malformed @test block; line kept as text",
                    line.location(),
                );
                out.push(line.clone());
                i += 1;
            }
        }
    }
    out
}

fn opens_test(text: &str) -> bool {
    strip_prefix_ci(text.trim_start(), "@test").is_some_and(|rest| rest.starts_with(char::is_whitespace))
}

fn parse_test_block(lines: &[SourceLine], at: usize) -> Option<TestBlock> {
    let text = &lines[at].text;
    let rest = strip_prefix_ci(text.trim_start(), "@test")?.trim_start();
    let rest = rest.strip_prefix('"')?;
    let (name, after) = rest.split_once('"')?;
    if name.trim().is_empty() {
        return None;
    }

    let mut cur = Cursor {
        lines,
        line: at,
        col: text.len() - after.len(),
    };
    cur.skip_ws();
    cur.eat("{")?;
    let body = cur.balanced()?;
    cur.skip_ws();
    cur.eat("expect")?;
    cur.skip_ws();
    cur.eat("{")?;
    let expected = cur.balanced()?;
    if !cur.rest_of_line().trim().is_empty() {
        return None;
    }
    Some(TestBlock {
        name: name.to_string(),
        body: join_part(&body),
        expected: join_part(&expected),
        last: cur.line,
    })
}

fn join_part(part: &str) -> String {
    part.lines().map(str::trim).collect()
}

/// Reads across line boundaries; the boundary itself reads as `\n`.
struct Cursor<'a> {
    lines: &'a [SourceLine],
    line: usize,
    /// Byte offset into the current line.
    col: usize,
}

impl Cursor<'_> {
    fn rest_of_line(&self) -> &str {
        &self.lines[self.line].text[self.col..]
    }

    fn peek(&self) -> Option<char> {
        match self.rest_of_line().chars().next() {
            Some(c) => Some(c),
            None if self.line + 1 < self.lines.len() => Some('\n'),
            None => None,
        }
    }

    fn bump(&mut self) {
        match self.rest_of_line().chars().next() {
            Some(c) => self.col += c.len_utf8(),
            None => {
                self.line += 1;
                self.col = 0;
            }
        }
    }

    fn skip_ws(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.bump();
        }
    }

    fn eat(&mut self, tok: &str) -> Option<()> {
        if !self.rest_of_line().starts_with(tok) {
            return None;
        }
        self.col += tok.len();
        Some(())
    }

    /// Text up to the `}` matching an already consumed `{`.
    fn balanced(&mut self) -> Option<String> {
        let mut depth = 1usize;
        let mut buf = String::new();
        loop {
            let c = self.peek()?;
            self.bump();
            match c {
                '\\' => {
                    buf.push(c);
                    if let Some(next) = self.peek() {
                        buf.push(next);
                        self.bump();
                    }
                    continue;
                }
                '{' => depth += 1,
                '}' => {
                    depth -= 1;
                    if depth == 0 {
                        return Some(buf);
                    }
                }
                _ => {}
            }
            buf.push(c);
        }
    }
}
