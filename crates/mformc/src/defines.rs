use regex::{Captures, Regex};

use crate::compress;
use crate::context::CompilationContext;
use crate::diagnostics::{Location, Stage};
use crate::directive::strip_prefix_ci;
use crate::scan::is_raw_line;
use crate::source::SourceLine;

/// A registered `@define` macro.
#[derive(Debug, Clone)]
pub struct MacroDefinition {
    pub trigger: String,
    pub pattern: Regex,
    pub body: String,
    /// Highest `$N` placeholder (N >= 1) used by `body`.
    pub max_param: usize,
    pub origin: Option<Location>,
}

impl MacroDefinition {
    /// Compiles `trigger` into a case-insensitive pattern.
    ///
    /// When the body uses positional placeholders and the trigger carries no
    /// parentheses of its own, an argument list `(a, b, ...)` is appended to
    /// the pattern; every argument after the first is optional.
    pub fn compile(
        trigger: &str,
        body: &str,
        origin: Option<Location>,
    ) -> Result<Self, regex::Error> {
        let trigger = trigger.trim();
        let max_param = max_placeholder(body);
        let pattern = if max_param > 0 && !trigger.contains('(') {
            let mut p = format!(r"(?i){trigger}\s*\(\s*([^,)]*)");
            for _ in 1..max_param {
                p.push_str(r"(?:\s*,\s*([^,)]*))?");
            }
            p.push_str(r"\s*\)");
            p
        } else {
            format!("(?i){trigger}")
        };
        Ok(Self {
            trigger: trigger.to_string(),
            pattern: Regex::new(&pattern)?,
            body: body.to_string(),
            max_param,
            origin,
        })
    }

    /// Replaces every match in `text` with the rendered body.
    pub fn expand(&self, text: &str) -> String {
        self.pattern
            .replace_all(text, |caps: &Captures<'_>| render_body(&self.body, caps))
            .into_owned()
    }
}

fn render_body(body: &str, caps: &Captures<'_>) -> String {
    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '$' {
            if let Some(d) = chars.peek().and_then(|n| n.to_digit(10)) {
                chars.next();
                if let Some(m) = caps.get(d as usize) {
                    out.push_str(m.as_str().trim());
                }
                continue;
            }
        }
        out.push(c);
    }
    out
}

fn max_placeholder(body: &str) -> usize {
    let mut max = 0;
    let mut chars = body.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '$' {
            if let Some(d) = chars.peek().and_then(|n| n.to_digit(10)) {
                max = max.max(d as usize);
            }
        }
    }
    max
}

struct OpenDefine {
    opener: SourceLine,
    trigger: String,
    body: Vec<SourceLine>,
}

enum Opener {
    Block { trigger: String, first: Option<String> },
    Inline { trigger: String, body: String },
}

/// `@define TRIGGER {`, optionally with the body on the same line.
fn parse_opener(text: &str) -> Option<Opener> {
    let rest = strip_prefix_ci(text, "@define")?;
    if !rest.starts_with(char::is_whitespace) {
        return None;
    }
    let (trigger, after) = rest.split_once('{')?;
    let trigger = trigger.trim().to_string();
    if trigger.is_empty() {
        return None;
    }
    let after = after.trim();
    if after.is_empty() {
        return Some(Opener::Block {
            trigger,
            first: None,
        });
    }
    match after.strip_suffix('}') {
        Some(body) => Some(Opener::Inline {
            trigger,
            body: body.trim().to_string(),
        }),
        None => Some(Opener::Block {
            trigger,
            first: Some(after.to_string()),
        }),
    }
}

/// Moves every `@define` block from the line stream into the macro table.
///
/// A block ends at the first following line that begins with `}`; nested
/// braces are not counted. Definitions that never close or whose trigger is
/// not a valid pattern are put back into the stream as plain text.
pub fn extract_defines(ctx: &mut CompilationContext) {
    let lines = ctx.take_lines();
    let mut out = Vec::with_capacity(lines.len());
    let mut open: Option<OpenDefine> = None;

    for line in lines {
        if open.is_some() {
            if line.text.starts_with('}') {
                if let Some(def) = open.take() {
                    close_define(ctx, def, Some(line), &mut out);
                }
            } else if let Some(def) = open.as_mut() {
                def.body.push(line);
            }
            continue;
        }
        match parse_opener(&line.text) {
            Some(Opener::Block { trigger, first }) => {
                let body = first.map(|t| vec![line.with_text(t)]).unwrap_or_default();
                open = Some(OpenDefine {
                    opener: line,
                    trigger,
                    body,
                });
            }
            Some(Opener::Inline { trigger, body }) => {
                let def = OpenDefine {
                    body: vec![line.with_text(body)],
                    opener: line,
                    trigger,
                };
                close_define(ctx, def, None, &mut out);
            }
            None => out.push(line),
        }
    }

    if let Some(def) = open {
        ctx.warn(
            "MF-DEF-0003",
            Stage::Define,
            format!("@define {} is never closed; kept as text", def.trigger),
            def.opener.location(),
        );
        out.push(def.opener);
        out.extend(def.body);
    }
    ctx.lines = out;
}

fn close_define(
    ctx: &mut CompilationContext,
    def: OpenDefine,
    closer: Option<SourceLine>,
    out: &mut Vec<SourceLine>,
) {
    let stripped = compress::join_lines(compress::strip_comments(&def.body));
    let body = stripped
        .iter()
        .map(|l| l.text.as_str())
        .collect::<Vec<_>>()
        .join("\n");
    if body.is_empty() {
        return;
    }
    match MacroDefinition::compile(&def.trigger, &body, Some(def.opener.location())) {
        Ok(macro_def) => {
            tracing::debug!(trigger = %macro_def.trigger, params = macro_def.max_param, "registered define");
            ctx.push_define(macro_def);
        }
        Err(err) => {
            ctx.warn(
                "MF-DEF-0002",
                Stage::Define,
                format!("@define trigger {:?} is not a valid pattern ({err}); kept as text", def.trigger),
                def.opener.location(),
            );
            out.push(def.opener);
            out.extend(def.body);
            out.extend(closer);
        }
    }
}

/// Applies every macro in registration order; multi-line expansions become
/// separate lines sharing the invoking line's provenance. `@@` lines are
/// left untouched.
pub fn apply_defines(lines: Vec<SourceLine>, defines: &[MacroDefinition]) -> Vec<SourceLine> {
    if defines.is_empty() {
        return lines;
    }
    let mut out = Vec::with_capacity(lines.len());
    for line in lines {
        if is_raw_line(&line.text) {
            out.push(line);
            continue;
        }
        let mut text = line.text.clone();
        for def in defines {
            if def.pattern.is_match(&text) {
                text = def.expand(&text);
            }
        }
        if text == line.text {
            out.push(line);
        } else {
            out.extend(text.split('\n').map(|t| line.with_text(t)));
        }
    }
    out
}
