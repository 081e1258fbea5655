//! Comment stripping, continuation joining, macro substitution and
//! safe-splitting of oversized attribute assignments.

use crate::context::CompilationContext;
use crate::defines;
use crate::diagnostics::Stage;
use crate::directive::strip_prefix_ci;
use crate::language::limits;
use crate::scan::{
    is_dropped_line, is_raw_line, opens_block_comment, starts_with_at, url_len, ScanState,
};
use crate::source::SourceLine;

pub fn compress(ctx: &mut CompilationContext, safe_limit: usize) {
    let lines = ctx.take_lines();
    let joined = join_lines(strip_comments(&lines));
    let expanded = defines::apply_defines(joined, ctx.defines());
    let mut out = Vec::with_capacity(expanded.len());
    for line in expanded {
        split_command(line, safe_limit, 0, ctx, &mut out);
    }
    ctx.lines = out;
}

/// Removes `//` and `/* */` comments outside quotes and URLs.
///
/// `##` lines are dropped, `@@` lines are kept verbatim, and lines left
/// blank are removed. Only block-comment state carries over to the next
/// line.
pub fn strip_comments(lines: &[SourceLine]) -> Vec<SourceLine> {
    let mut out = Vec::with_capacity(lines.len());
    let mut in_block = false;
    for line in lines {
        if !in_block {
            if is_dropped_line(&line.text) {
                continue;
            }
            if is_raw_line(&line.text) {
                out.push(line.clone());
                continue;
            }
        }

        let chars: Vec<char> = line.text.chars().collect();
        let mut text = String::with_capacity(line.text.len());
        let mut state = if in_block {
            ScanState::InBlockComment
        } else {
            ScanState::Normal
        };
        let mut truncated = false;
        let mut i = 0;
        while i < chars.len() {
            let c = chars[i];
            match state {
                ScanState::InBlockComment => {
                    if starts_with_at(&chars, i, "*/") {
                        state = ScanState::Normal;
                        i += 2;
                    } else {
                        i += 1;
                    }
                }
                ScanState::InString(quote) => {
                    text.push(c);
                    if c == '\\' && i + 1 < chars.len() {
                        text.push(chars[i + 1]);
                        i += 2;
                        continue;
                    }
                    if c == quote {
                        state = ScanState::Normal;
                    }
                    i += 1;
                }
                ScanState::Normal => {
                    if c == '\\' {
                        text.push(c);
                        if let Some(&next) = chars.get(i + 1) {
                            text.push(next);
                        }
                        i += 2;
                        continue;
                    }
                    if c == '"' || c == '\'' {
                        state = ScanState::InString(c);
                        text.push(c);
                        i += 1;
                        continue;
                    }
                    let n = url_len(&chars, i);
                    if n > 0 {
                        text.extend(&chars[i..i + n]);
                        i += n;
                        continue;
                    }
                    if starts_with_at(&chars, i, "//") {
                        truncated = true;
                        break;
                    }
                    if opens_block_comment(&chars, i) {
                        state = ScanState::InBlockComment;
                        i += 2;
                        continue;
                    }
                    text.push(c);
                    i += 1;
                }
            }
        }
        in_block = state == ScanState::InBlockComment;

        if truncated {
            text.truncate(text.trim_end().len());
        }
        if text.trim().is_empty() {
            continue;
        }
        out.push(line.with_text(text));
    }
    out
}

/// Appends each indented line to the previous logical line.
///
/// `@@` lines always stand alone, and the line after one starts fresh.
pub fn join_lines(lines: Vec<SourceLine>) -> Vec<SourceLine> {
    let mut out: Vec<SourceLine> = Vec::with_capacity(lines.len());
    let mut after_raw = false;
    for line in lines {
        let raw = is_raw_line(&line.text);
        let indented = line.text.starts_with([' ', '\t']);
        if indented && !raw && !after_raw {
            if let Some(prev) = out.last_mut() {
                prev.text.push_str(line.text.trim_start());
                continue;
            }
        }
        after_raw = raw;
        if indented && !raw {
            let text = line.text.trim_start().to_string();
            out.push(SourceLine { text, ..line });
        } else {
            out.push(line);
        }
    }
    out
}

/// `[@wait <delay>=]&<ATTR> <OBJ>=`
#[derive(Debug, Clone, PartialEq, Eq)]
struct Assignment<'a> {
    /// `@wait` delay of the head, `0` when there is none.
    delay: &'a str,
    attr: &'a str,
    obj: &'a str,
    /// Byte offset of the value, just past the `=`.
    value_start: usize,
}

fn parse_assignment(text: &str) -> Option<Assignment<'_>> {
    let mut rest = text;
    let mut delay = "0";
    if let Some(after) = strip_prefix_ci(text, "@wait") {
        if !after.starts_with(char::is_whitespace) {
            return None;
        }
        let after = after.trim_start();
        let (delay_text, tail) = after.split_once('=')?;
        if delay_text.is_empty() || delay_text.contains(char::is_whitespace) {
            return None;
        }
        delay = delay_text;
        rest = tail;
    }
    let rest = rest.strip_prefix('&')?;
    let attr_len = rest
        .find(|c: char| c.is_whitespace() || c == '=')
        .unwrap_or(rest.len());
    let attr = &rest[..attr_len];
    let rest = &rest[attr_len..];
    if attr.is_empty() || !rest.starts_with(char::is_whitespace) {
        return None;
    }
    let rest = rest.trim_start();
    let obj_len = rest
        .find(|c: char| c.is_whitespace() || c == '=')
        .unwrap_or(rest.len());
    let obj = &rest[..obj_len];
    let rest = rest[obj_len..].trim_start().strip_prefix('=')?;
    if obj.is_empty() {
        return None;
    }
    Some(Assignment {
        delay,
        attr,
        obj,
        value_start: text.len() - rest.len(),
    })
}

/// Largest byte offset into `value`, at most `max_chars` characters in, where
/// `[]`, `()` and `{}` nesting is balanced. Escaped characters are skipped.
pub fn find_safe_split(value: &str, max_chars: usize) -> Option<usize> {
    let mut depth = 0i64;
    let mut count = 0usize;
    let mut best = None;
    let mut iter = value.char_indices().peekable();
    while let Some((_, c)) = iter.next() {
        count += 1;
        if c == '\\' && iter.peek().is_some() {
            iter.next();
            count += 1;
        } else {
            match c {
                '[' | '(' | '{' => depth += 1,
                ']' | ')' | '}' => depth -= 1,
                _ => {}
            }
        }
        if count > max_chars {
            break;
        }
        if depth == 0 {
            best = Some(iter.peek().map_or(value.len(), |&(idx, _)| idx));
        }
    }
    best
}

/// Splits an oversized assignment into a head and `@wait <delay>=`
/// continuations that append to the attribute. Continuations reuse the
/// head's delay so they queue behind it. `min_split` keeps a continuation from
/// re-splitting inside its own `[get(...)]` wrapper.
fn split_command(
    line: SourceLine,
    limit: usize,
    min_split: usize,
    ctx: &mut CompilationContext,
    out: &mut Vec<SourceLine>,
) {
    let total = line.text.chars().count();
    if total <= limit || is_raw_line(&line.text) {
        out.push(line);
        return;
    }
    let Some(asg) = parse_assignment(&line.text) else {
        ctx.warn(
            "MF-CMP-0001",
            Stage::Compress,
            format!("command is {total} characters, exceeds safe limit {limit}; not an attribute assignment, emitted unsplit"),
            line.location(),
        );
        out.push(line);
        return;
    };
    let (prefix, value) = line.text.split_at(asg.value_start);
    let available = limit.saturating_sub(prefix.chars().count());
    let split = if available < limits::MIN_SPLIT_BUDGET {
        None
    } else {
        find_safe_split(value, available).filter(|&at| value[..at].chars().count() > min_split)
    };
    let Some(at) = split else {
        ctx.warn(
            "MF-CMP-0001",
            Stage::Compress,
            format!("command is {total} characters, exceeds safe limit {limit}; no safe split point, emitted unsplit"),
            line.location(),
        );
        out.push(line);
        return;
    };

    let wrapper = format!("[get({}/{})]", asg.obj, asg.attr);
    let head = format!("{prefix}{}", &value[..at]);
    let continuation = format!(
        "@wait {}=&{} {}={wrapper}{}",
        asg.delay,
        asg.attr,
        asg.obj,
        &value[at..]
    );
    tracing::debug!(
        file = %line.file,
        line = line.line,
        head = head.chars().count(),
        "split oversized command"
    );
    let wrapper_chars = wrapper.chars().count();
    let head = line.with_text(head);
    let continuation = line.with_text(continuation);
    out.push(head);
    split_command(continuation, limit, wrapper_chars, ctx, out);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile::CompileOptions;
    use crate::source::{join_text, split_source};

    fn strip(src: &str) -> String {
        join_text(&strip_comments(&split_source(src, "main.mush")))
    }

    fn join(src: &str) -> String {
        join_text(&join_lines(split_source(src, "main.mush")))
    }

    #[test]
    fn line_comments_respect_quotes_and_urls() {
        assert_eq!(strip("say hi // comment"), "say hi");
        assert_eq!(strip("say \"a // b\" // c"), "say \"a // b\"");
        assert_eq!(strip("say http://example.com/x // c"), "say http://example.com/x");
        assert_eq!(strip("say \\// not a comment"), "say \\// not a comment");
        assert_eq!(strip("// whole line\nkeep"), "keep");
    }

    #[test]
    fn block_comments_span_lines() {
        assert_eq!(strip("a /* x\ny */ b\nc"), "a \n b\nc");
        assert_eq!(strip("/*\n## inside\n*/\nkeep"), "keep");
        assert_eq!(strip("think a*/*b"), "think a*/*b");
    }

    #[test]
    fn raw_and_dropped_markers() {
        assert_eq!(strip("@@ keep // this\n## gone\nx"), "@@ keep // this\nx");
    }

    #[test]
    fn strings_do_not_span_lines() {
        assert_eq!(strip("say \"open\nsay x // c"), "say \"open\nsay x");
    }

    #[test]
    fn indented_lines_continue_the_previous_line() {
        assert_eq!(join("This is a \n test!\nThis is a\n test!"), "This is a test!\nThis is atest!");
        assert_eq!(join("  first\nsecond"), "first\nsecond");
    }

    #[test]
    fn raw_lines_break_continuations() {
        assert_eq!(join("&A obj=1\n@@ note\n  2"), "&A obj=1\n@@ note\n2");
        assert_eq!(join("&A obj=1\n  @@ note"), "&A obj=1\n  @@ note");
    }

    #[test]
    fn parses_assignment_shapes() {
        let a = parse_assignment("&DESC obj=value").expect("assignment");
        assert_eq!((a.delay, a.attr, a.obj, a.value_start), ("0", "DESC", "obj", 10));
        let a = parse_assignment("@wait 5=&DESC #12 =value").expect("assignment");
        assert_eq!((a.delay, a.attr, a.obj), ("5", "DESC", "#12"));
        assert_eq!(&"@wait 5=&DESC #12 =value"[a.value_start..], "value");
        assert!(parse_assignment("@pemit %#=hi").is_none());
        assert!(parse_assignment("&DESC=x").is_none());
    }

    #[test]
    fn safe_split_respects_nesting_and_escapes() {
        assert_eq!(find_safe_split("ab[cd]ef", 4), Some(2));
        assert_eq!(find_safe_split("ab[cd]ef", 6), Some(6));
        assert_eq!(find_safe_split("a\\[b", 2), Some(1));
        assert_eq!(find_safe_split("a\\[b", 3), Some(3));
        assert_eq!(find_safe_split("[abcdef]", 5), None);
    }

    #[test]
    fn oversized_assignment_is_split_into_continuations() {
        let mut ctx = CompilationContext::new(&CompileOptions::default());
        ctx.lines = vec![SourceLine::new(
            format!("&DESC obj={}", "A".repeat(8100)),
            "main.mush",
            1,
        )];
        compress(&mut ctx, limits::SAFE_LIMIT);
        assert!(ctx.lines.len() >= 2);
        assert!(ctx.lines[0].text.chars().count() <= 8000);
        assert!(ctx.lines[1].text.starts_with("@wait 0=&DESC obj=[get(obj/DESC)]"));
        assert_eq!(ctx.lines[1].line, 1);

        let rejoined: String = ctx
            .lines
            .iter()
            .enumerate()
            .map(|(i, l)| {
                let marker = if i == 0 { "&DESC obj=" } else { "@wait 0=&DESC obj=[get(obj/DESC)]" };
                l.text.strip_prefix(marker).expect("prefix").to_string()
            })
            .collect();
        assert_eq!(rejoined, "A".repeat(8100));
        assert!(ctx.diagnostics().is_empty());
    }

    #[test]
    fn long_continuations_split_again() {
        let mut ctx = CompilationContext::new(&CompileOptions::default());
        ctx.lines = vec![SourceLine::new(format!("&X me={}", "b".repeat(450)), "main.mush", 1)];
        compress(&mut ctx, 200);
        assert!(ctx.lines.len() >= 3);
        assert!(ctx.lines.iter().all(|l| l.text.chars().count() <= 200));
    }

    #[test]
    fn unsplittable_lines_pass_through_with_warning() {
        let mut ctx = CompilationContext::new(&CompileOptions::default());
        let text = format!("&X me=[{}]", "c".repeat(300));
        ctx.lines = vec![SourceLine::new(text.clone(), "main.mush", 4)];
        compress(&mut ctx, 200);
        assert_eq!(ctx.lines.len(), 1);
        assert_eq!(ctx.lines[0].text, text);
        assert_eq!(ctx.diagnostics()[0].code, "MF-CMP-0001");
    }

    #[test]
    fn delayed_heads_keep_their_delay_on_continuations() {
        let mut ctx = CompilationContext::new(&CompileOptions::default());
        ctx.lines = vec![SourceLine::new(format!("@wait 5=&DESC obj={}", "A".repeat(450)), "main.mush", 1)];
        compress(&mut ctx, 200);
        assert!(ctx.lines.len() >= 3);
        assert!(ctx.lines[0].text.starts_with("@wait 5=&DESC obj=A"));
        for line in &ctx.lines[1..] {
            assert!(
                line.text.starts_with("@wait 5=&DESC obj=[get(obj/DESC)]"),
                "{}",
                line.text
            );
        }
        assert!(ctx.diagnostics().is_empty());
    }

    #[test]
    fn heads_too_long_for_the_split_budget_pass_through() {
        let mut ctx = CompilationContext::new(&CompileOptions::default());
        let text = format!("&X {}={}", "o".repeat(150), "v".repeat(200));
        assert!(200 - "&X =".len() - 150 < limits::MIN_SPLIT_BUDGET);
        ctx.lines = vec![SourceLine::new(text.clone(), "main.mush", 2)];
        compress(&mut ctx, 200);
        assert_eq!(ctx.lines.len(), 1);
        assert_eq!(ctx.lines[0].text, text);
        let codes: Vec<&str> = ctx.diagnostics().iter().map(|d| d.code.as_str()).collect();
        assert_eq!(codes, ["MF-CMP-0001"]);
    }
}
