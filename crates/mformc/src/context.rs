use std::collections::BTreeSet;
use std::path::PathBuf;

use url::Url;

use crate::compile::CompileOptions;
use crate::defines::MacroDefinition;
use crate::diagnostics::{Diagnostic, Location, Severity, Stage};
use crate::source::{Header, SourceLine};

/// Where relative references are resolved from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Base {
    Dir(PathBuf),
    Url(Url),
}

/// State owned by a single top-level compilation.
///
/// Only `lines` flows from stage to stage. Headers, footers, macro definitions
/// and diagnostics are append-only.
#[derive(Debug)]
pub struct CompilationContext {
    pub lines: Vec<SourceLine>,
    pub base: Base,
    pub debug: bool,
    pub(crate) entry_file: Option<PathBuf>,
    pub(crate) visiting: Vec<String>,
    pub(crate) loaded: BTreeSet<String>,
    headers: Vec<Header>,
    footers: Vec<Header>,
    defines: Vec<MacroDefinition>,
    diagnostics: Vec<Diagnostic>,
}

impl CompilationContext {
    pub fn new(options: &CompileOptions) -> Self {
        let base_dir = options
            .base_dir
            .clone()
            .or_else(|| std::env::current_dir().ok())
            .unwrap_or_else(|| PathBuf::from("."));
        let mut ctx = Self {
            lines: Vec::new(),
            base: Base::Dir(base_dir),
            debug: options.debug,
            entry_file: None,
            visiting: Vec::new(),
            loaded: BTreeSet::new(),
            headers: Vec::new(),
            footers: Vec::new(),
            defines: Vec::new(),
            diagnostics: Vec::new(),
        };
        for (trigger, body) in &options.defines {
            match MacroDefinition::compile(trigger, body, None) {
                Ok(def) => ctx.push_define(def),
                Err(err) => ctx.push_diagnostic(Diagnostic::new(
                    "MF-DEF-0001",
                    Severity::Warning,
                    Stage::Define,
                    format!("configured define {trigger:?} ignored: {err}"),
                    None,
                )),
            }
        }
        ctx
    }

    /// The first local file resolved in this compilation.
    pub fn entry_file(&self) -> Option<&PathBuf> {
        self.entry_file.as_ref()
    }

    pub fn base_path(&self) -> Option<PathBuf> {
        self.entry_file
            .as_ref()
            .and_then(|p| p.parent().map(|p| p.to_path_buf()))
    }

    pub fn loaded(&self) -> &BTreeSet<String> {
        &self.loaded
    }

    pub fn push_header(&mut self, header: Header) {
        self.headers.push(header);
    }

    pub fn push_footer(&mut self, footer: Header) {
        self.footers.push(footer);
    }

    pub fn headers(&self) -> &[Header] {
        &self.headers
    }

    pub fn footers(&self) -> &[Header] {
        &self.footers
    }

    pub fn push_define(&mut self, def: MacroDefinition) {
        self.defines.push(def);
    }

    pub fn defines(&self) -> &[MacroDefinition] {
        &self.defines
    }

    pub fn push_diagnostic(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }

    pub fn warn(&mut self, code: &str, stage: Stage, message: impl Into<String>, loc: Location) {
        self.push_diagnostic(Diagnostic::warning(code, stage, message, loc));
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn take_lines(&mut self) -> Vec<SourceLine> {
        std::mem::take(&mut self.lines)
    }
}
