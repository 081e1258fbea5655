use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::diagnostics::{Diagnostic, Location, Report, Severity, Stage};
use crate::scan::{
    is_dropped_line, is_raw_line, opens_block_comment, starts_with_at, url_len, ScanState,
};
use crate::source::SourceLine;

pub const RULE_UNBALANCED_BRACKETS: &str = "unbalanced-brackets";
pub const RULE_UNBALANCED_PARENS: &str = "unbalanced-parens";
pub const RULE_SWITCH_CALL: &str = "switch-call";
pub const RULE_ENTRANCES_CALL: &str = "entrances-call";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleLevel {
    Error,
    Warning,
    Off,
}

/// Per-rule level overrides, keyed by rule id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LintOptions {
    #[serde(default)]
    pub rules: BTreeMap<String, RuleLevel>,
}

impl LintOptions {
    pub fn level(&self, rule: &str) -> RuleLevel {
        if let Some(level) = self.rules.get(rule) {
            return *level;
        }
        match rule {
            RULE_SWITCH_CALL | RULE_ENTRANCES_CALL => RuleLevel::Warning,
            _ => RuleLevel::Error,
        }
    }
}

struct CostlyCall {
    rule: &'static str,
    code: &'static str,
    needle: &'static str,
    message: &'static str,
    note: &'static str,
}

const COSTLY_CALLS: &[CostlyCall] = &[
    CostlyCall {
        rule: RULE_SWITCH_CALL,
        code: "MF-LINT-0101",
        needle: "[switch(",
        message: "switch() is costly here",
        note: "consider [case()] instead",
    },
    CostlyCall {
        rule: RULE_ENTRANCES_CALL,
        code: "MF-LINT-0102",
        needle: "[entrances(",
        message: "entrances() can be CPU intensive on large databases",
        note: "cache the result or narrow the search",
    },
];

#[derive(Debug, Clone)]
struct Open {
    ch: char,
    loc: Location,
}

struct Linter<'a> {
    options: &'a LintOptions,
    stack: Vec<Open>,
    diagnostics: Vec<Diagnostic>,
}

impl Linter<'_> {
    /// `None` when the rule is switched off.
    fn severity(&self, rule: &str) -> Option<Severity> {
        match self.options.level(rule) {
            RuleLevel::Off => None,
            RuleLevel::Error => Some(Severity::Error),
            RuleLevel::Warning => Some(Severity::Warning),
        }
    }

    fn emit(&mut self, rule: &str, code: &str, message: String, loc: Location) {
        if let Some(severity) = self.severity(rule) {
            self.diagnostics
                .push(Diagnostic::new(code, severity, Stage::Lint, message, Some(loc)));
        }
    }

    fn bracket(&mut self, chars: &[char], i: usize, loc: Location) {
        let c = chars[i];
        match c {
            '[' | '(' => {
                if c == '[' {
                    self.costly_calls(chars, i, &loc);
                }
                self.stack.push(Open { ch: c, loc });
            }
            ']' | ')' => {
                let expected = if c == ']' { '[' } else { '(' };
                let popped = self.stack.pop();
                if popped.as_ref().map(|o| o.ch) != Some(expected) {
                    let message = match &popped {
                        Some(open) => format!(
                            "unexpected `{c}` (innermost open `{}` at {})",
                            open.ch, open.loc
                        ),
                        None => format!("unexpected `{c}` with nothing open"),
                    };
                    self.emit(rule_for(c), "MF-LINT-0001", message, loc);
                }
            }
            _ => {}
        }
    }

    fn costly_calls(&mut self, chars: &[char], i: usize, loc: &Location) {
        for call in COSTLY_CALLS {
            let n = call.needle.chars().count();
            let hit = chars.len() >= i + n
                && chars[i..i + n]
                    .iter()
                    .zip(call.needle.chars())
                    .all(|(a, b)| a.to_ascii_lowercase() == b);
            if let Some(severity) = self.severity(call.rule).filter(|_| hit) {
                self.diagnostics.push(
                    Diagnostic::new(call.code, severity, Stage::Lint, call.message, Some(loc.clone()))
                        .with_note(call.note),
                );
            }
        }
    }
}

fn column(line: &SourceLine, i: usize) -> Location {
    Location {
        file: line.file.clone(),
        line: line.line,
        col: Some(i as u32 + 1),
    }
}

fn rule_for(c: char) -> &'static str {
    match c {
        '[' | ']' => RULE_UNBALANCED_BRACKETS,
        _ => RULE_UNBALANCED_PARENS,
    }
}

/// Checks `[`/`(` balance across the whole stream and flags costly calls.
///
/// Brackets inside quotes count, since the target evaluates them there too.
/// `@@` and `##` lines are skipped; `//` ends a line outside quotes and URLs.
pub fn lint_lines(lines: &[SourceLine], options: &LintOptions) -> Report {
    let mut linter = Linter {
        options,
        stack: Vec::new(),
        diagnostics: Vec::new(),
    };
    let mut in_block = false;

    for line in lines {
        if is_raw_line(&line.text) || is_dropped_line(&line.text) {
            continue;
        }
        let chars: Vec<char> = line.text.chars().collect();
        let mut state = if in_block {
            ScanState::InBlockComment
        } else {
            ScanState::Normal
        };
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
                    continue;
                }
                ScanState::InString(quote) => {
                    if c == '\\' {
                        i += 2;
                        continue;
                    }
                    if c == quote {
                        state = ScanState::Normal;
                    } else {
                        linter.bracket(&chars, i, column(line, i));
                    }
                    i += 1;
                    continue;
                }
                ScanState::Normal => {}
            }

            if c == '\\' {
                i += 2;
                continue;
            }
            if c == '"' || c == '\'' {
                state = ScanState::InString(c);
                i += 1;
                continue;
            }
            let n = url_len(&chars, i);
            if n > 0 {
                i += n;
                continue;
            }
            if starts_with_at(&chars, i, "//") {
                break;
            }
            if opens_block_comment(&chars, i) {
                state = ScanState::InBlockComment;
                i += 2;
                continue;
            }
            linter.bracket(&chars, i, column(line, i));
            i += 1;
        }
        in_block = state == ScanState::InBlockComment;
    }

    let leftover = std::mem::take(&mut linter.stack);
    for open in leftover {
        let closer = if open.ch == '[' { ']' } else { ')' };
        linter.emit(
            rule_for(open.ch),
            "MF-LINT-0002",
            format!("missing closing `{closer}` for `{}`", open.ch),
            open.loc,
        );
    }

    Report::ok().with_diagnostics(linter.diagnostics)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::split_source;

    fn lint(src: &str) -> Report {
        lint_lines(&split_source(src, "main.mush"), &LintOptions::default())
    }

    fn codes(report: &Report) -> Vec<&str> {
        report.diagnostics.iter().map(|d| d.code.as_str()).collect()
    }

    #[test]
    fn balanced_input_has_no_errors() {
        let report = lint("&CMD me=$hi:@pemit %#=[add(1,[mul(2,3)])]\nsay (ok)");
        assert!(report.ok);
        assert!(report.diagnostics.is_empty());
    }

    #[test]
    fn one_unmatched_open_bracket_reports_one_missing_closer() {
        let report = lint("say ok\nsay [add(1,2)\nsay done");
        assert!(!report.ok);
        assert_eq!(codes(&report), ["MF-LINT-0002"]);
        let loc = report.diagnostics[0].loc.as_ref().expect("loc");
        assert_eq!((loc.line, loc.col), (2, Some(5)));
    }

    #[test]
    fn unexpected_closers_are_errors() {
        let report = lint("say ]\nsay [a)");
        assert_eq!(report.errors().count(), 2);
        assert!(codes(&report).contains(&"MF-LINT-0001"));
    }

    #[test]
    fn brackets_inside_quotes_count_but_urls_and_comments_do_not() {
        assert!(!lint("say \"[unclosed\"").ok);
        assert!(lint("say \\[ escaped").ok);
        assert!(lint("say http://example.com/a // [x").ok);
        assert!(lint("say a /* [ \n ( */ b").ok);
        assert!(lint("@@ [raw\n## (dropped").ok);
    }

    #[test]
    fn costly_calls_are_warnings() {
        let report = lint("think [switch(%0,1,a,b)] [ENTRANCES(here)]");
        assert!(report.ok);
        assert_eq!(codes(&report), ["MF-LINT-0101", "MF-LINT-0102"]);
        assert_eq!(report.warnings().count(), 2);
        assert_eq!(report.diagnostics[0].notes, ["consider [case()] instead"]);
    }

    #[test]
    fn rule_levels_can_be_overridden() {
        let mut options = LintOptions::default();
        options.rules.insert(RULE_SWITCH_CALL.to_string(), RuleLevel::Error);
        options.rules.insert(RULE_UNBALANCED_PARENS.to_string(), RuleLevel::Off);
        let report = lint_lines(&split_source("think [switch(1,1,a)] (", "m.mush"), &options);
        assert_eq!(codes(&report), ["MF-LINT-0101"]);
        assert!(!report.ok);
    }
}
