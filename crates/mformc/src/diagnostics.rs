use std::fmt;

use mform_contracts::MFORM_DIAG_SCHEMA_VERSION;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Info,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Resolve,
    Template,
    Define,
    Compress,
    Lint,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Location {
    pub file: String,
    pub line: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub col: Option<u32>,
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.col {
            Some(col) => write!(f, "{}:{}:{}", self.file, self.line, col),
            None => write!(f, "{}:{}", self.file, self.line),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub code: String,
    pub severity: Severity,
    pub stage: Stage,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub loc: Option<Location>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,
}

impl Diagnostic {
    pub fn new(
        code: &str,
        severity: Severity,
        stage: Stage,
        message: impl Into<String>,
        loc: Option<Location>,
    ) -> Self {
        Self {
            code: code.to_string(),
            severity,
            stage,
            message: message.into(),
            loc,
            notes: Vec::new(),
        }
    }

    pub fn warning(code: &str, stage: Stage, message: impl Into<String>, loc: Location) -> Self {
        Self::new(code, Severity::Warning, stage, message, Some(loc))
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sev = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Info => "info",
        };
        match &self.loc {
            Some(loc) => write!(f, "{loc}: {sev}[{}]: {}", self.code, self.message)?,
            None => write!(f, "{sev}[{}]: {}", self.code, self.message)?,
        }
        for note in &self.notes {
            write!(f, "\n  note: {note}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Report {
    pub schema_version: String,
    pub ok: bool,
    pub diagnostics: Vec<Diagnostic>,
}

impl Report {
    pub fn ok() -> Self {
        Self {
            schema_version: MFORM_DIAG_SCHEMA_VERSION.to_string(),
            ok: true,
            diagnostics: Vec::new(),
        }
    }

    pub fn with_diagnostics(mut self, mut diagnostics: Vec<Diagnostic>) -> Self {
        diagnostics.sort_by(|a, b| {
            a.loc
                .cmp(&b.loc)
                .then_with(|| a.code.cmp(&b.code))
                .then_with(|| a.message.cmp(&b.message))
        });
        self.ok = diagnostics.iter().all(|d| !d.is_error());
        self.diagnostics = diagnostics;
        self
    }

    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(|d| d.is_error())
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Warning)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loc(line: u32) -> Location {
        Location {
            file: "main.mush".to_string(),
            line,
            col: None,
        }
    }

    #[test]
    fn report_sorts_by_location_and_tracks_errors() {
        let report = Report::ok().with_diagnostics(vec![
            Diagnostic::warning("MF-LINT-0101", Stage::Lint, "costly", loc(7)),
            Diagnostic::new("MF-LINT-0002", Severity::Error, Stage::Lint, "missing", Some(loc(2))),
        ]);
        assert!(!report.ok);
        assert_eq!(report.diagnostics[0].code, "MF-LINT-0002");
        assert_eq!(report.errors().count(), 1);
        assert_eq!(report.warnings().count(), 1);
    }

    #[test]
    fn warnings_alone_keep_report_ok() {
        let report = Report::ok().with_diagnostics(vec![Diagnostic::warning(
            "MF-TPL-0001",
            Stage::Template,
            "condition failed",
            loc(1),
        )]);
        assert!(report.ok);
    }

    #[test]
    fn display_includes_location_and_code() {
        let d = Diagnostic::warning("MF-LINT-0101", Stage::Lint, "costly", loc(3))
            .with_note("use case()");
        assert_eq!(
            d.to_string(),
            "main.mush:3: warning[MF-LINT-0101]: costly\n  note: use case()"
        );
    }
}
