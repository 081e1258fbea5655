use crate::context::CompilationContext;
use crate::diagnostics::Stage;
use crate::directive::{directive_arg, is_word_char, split_top_level_comma, strip_prefix_ci};
use crate::expr;
use crate::language::limits;
use crate::selftest;
use crate::source::SourceLine;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Opener<'a> {
    For { var: &'a str, bounds: &'a str },
    If { cond: &'a str },
    Debug,
    Malformed(&'static str),
}

/// Rewrites `@test` blocks, then expands `#for`, `#if` and `#debug` blocks.
/// Evaluation failures never abort the compilation; they exclude the block
/// and leave a warning behind.
pub fn expand_templates(lines: &[SourceLine], ctx: &mut CompilationContext) -> Vec<SourceLine> {
    let lines = selftest::expand_tests(lines, ctx);
    let lines = lines.as_slice();
    let mut out = Vec::with_capacity(lines.len());
    let mut expander = Expander {
        ctx,
        loops: 0,
        exhausted: false,
    };
    expander.process(lines, 0, &mut out);
    out
}

struct Expander<'c> {
    ctx: &'c mut CompilationContext,
    /// `#for` loops currently being unrolled.
    loops: usize,
    /// Set once a loop would push the output past `limits::MAX_EXPANDED_LINES`.
    /// Every enclosing loop then drops what it produced; cleared when the
    /// outermost one is done.
    exhausted: bool,
}

impl Expander<'_> {
    fn process(&mut self, lines: &[SourceLine], depth: usize, out: &mut Vec<SourceLine>) {
        let mut i = 0;
        while i < lines.len() && !self.exhausted {
            let line = &lines[i];
            let Some(opener) = parse_opener(&line.text) else {
                out.push(line.clone());
                i += 1;
                continue;
            };
            if let Opener::Malformed(directive) = opener {
                self.ctx.warn(
                    "MF-TPL-0005",
                    Stage::Template,
                    format!("malformed {directive} header; line kept as text"),
                    line.location(),
                );
                out.push(line.clone());
                i += 1;
                continue;
            }
            let Some(close) = find_closing(lines, i + 1) else {
                self.ctx.warn(
                    "MF-TPL-0002",
                    Stage::Template,
                    "block is never closed; opener kept as text",
                    line.location(),
                );
                out.push(line.clone());
                i += 1;
                continue;
            };
            let body = &lines[i + 1..close];
            i = close + 1;
            if depth >= limits::MAX_TEMPLATE_DEPTH {
                self.ctx.warn(
                    "MF-TPL-0006",
                    Stage::Template,
                    format!(
                        "block nested deeper than {} levels; block excluded",
                        limits::MAX_TEMPLATE_DEPTH
                    ),
                    line.location(),
                );
                continue;
            }
            match opener {
                Opener::For { var, bounds } => self.unroll(var, bounds, body, line, depth, out),
                Opener::If { cond } => match expr::eval_bool(cond) {
                    Ok(true) => self.process(body, depth + 1, out),
                    Ok(false) => {}
                    Err(err) => self.ctx.warn(
                        "MF-TPL-0001",
                        Stage::Template,
                        format!("condition `{cond}` failed to evaluate ({err}); block excluded"),
                        line.location(),
                    ),
                },
                Opener::Debug => {
                    if self.ctx.debug {
                        self.process(body, depth + 1, out);
                    }
                }
                Opener::Malformed(_) => {}
            }
        }
    }

    fn unroll(
        &mut self,
        var: &str,
        bounds: &str,
        body: &[SourceLine],
        at: &SourceLine,
        depth: usize,
        out: &mut Vec<SourceLine>,
    ) {
        let range = split_top_level_comma(bounds)
            .ok_or_else(|| "range() takes two bounds".to_string())
            .and_then(|(a, b)| {
                let start = expr::eval_int(a.trim()).map_err(|e| format!("start bound: {e}"))?;
                let end = expr::eval_int(b.trim()).map_err(|e| format!("end bound: {e}"))?;
                Ok((start, end))
            });
        let (start, end) = match range {
            Ok(r) => r,
            Err(msg) => {
                self.ctx.warn(
                    "MF-TPL-0003",
                    Stage::Template,
                    format!("range({bounds}) failed to evaluate ({msg}); block excluded"),
                    at.location(),
                );
                return;
            }
        };
        if start > end {
            return;
        }
        let count = i128::from(end) - i128::from(start) + 1;
        if count > i128::from(limits::MAX_LOOP_ITERATIONS) {
            self.ctx.warn(
                "MF-TPL-0004",
                Stage::Template,
                format!(
                    "range({start}, {end}) has {count} iterations (max {}); block excluded",
                    limits::MAX_LOOP_ITERATIONS
                ),
                at.location(),
            );
            return;
        }

        let mark = out.len();
        let placeholder = format!("{{{{{var}}}}}");
        self.loops += 1;
        for value in start..=end {
            if out.len() + body.len() > limits::MAX_EXPANDED_LINES {
                self.ctx.warn(
                    "MF-TPL-0007",
                    Stage::Template,
                    format!(
                        "expansion exceeds {} lines; block excluded",
                        limits::MAX_EXPANDED_LINES
                    ),
                    at.location(),
                );
                self.exhausted = true;
            }
            if self.exhausted {
                break;
            }
            let value = value.to_string();
            let replaced: Vec<SourceLine> = body
                .iter()
                .map(|l| l.with_text(l.text.replace(&placeholder, &value)))
                .collect();
            self.process(&replaced, depth + 1, out);
        }
        self.loops -= 1;
        if self.exhausted {
            out.truncate(mark);
            if self.loops == 0 {
                self.exhausted = false;
            }
        }
    }
}

fn parse_opener(text: &str) -> Option<Opener<'_>> {
    if let Some(arg) = directive_arg(text, '#', "for") {
        let header = arg.strip_suffix('{')?.trim();
        return Some(parse_for(header).unwrap_or(Opener::Malformed("#for")));
    }
    if let Some(arg) = directive_arg(text, '#', "if") {
        let cond = arg.strip_suffix('{')?.trim();
        if cond.is_empty() {
            return Some(Opener::Malformed("#if"));
        }
        return Some(Opener::If { cond });
    }
    if let Some(arg) = directive_arg(text, '#', "debug") {
        return (arg == "{").then_some(Opener::Debug);
    }
    None
}

/// `VAR in range(A, B)`
fn parse_for(header: &str) -> Option<Opener<'_>> {
    let (var, rest) = header.split_once(char::is_whitespace)?;
    if var.is_empty() || !var.chars().all(is_word_char) {
        return None;
    }
    let rest = strip_prefix_ci(rest.trim_start(), "in")?;
    if !rest.starts_with(char::is_whitespace) {
        return None;
    }
    let rest = strip_prefix_ci(rest.trim_start(), "range")?.trim_start();
    let bounds = rest.strip_prefix('(')?.strip_suffix(')')?;
    Some(Opener::For { var, bounds })
}

fn is_block_opener(text: &str) -> bool {
    let t = text.trim();
    t.ends_with('{')
        && ["for", "if", "debug"]
            .iter()
            .any(|name| directive_arg(t, '#', name).is_some())
}

/// Index of the `}` line that closes the block whose body starts at `from`.
fn find_closing(lines: &[SourceLine], from: usize) -> Option<usize> {
    let mut depth = 1usize;
    for (idx, line) in lines.iter().enumerate().skip(from) {
        if is_block_opener(&line.text) {
            depth += 1;
        } else if line.text.trim() == "}" {
            depth -= 1;
            if depth == 0 {
                return Some(idx);
            }
        }
    }
    None
}
