use std::fmt;
use std::path::PathBuf;

use crate::compress;
use crate::constants;
use crate::context::CompilationContext;
use crate::defines;
use crate::diagnostics::{Diagnostic, Location, Report, Severity, Stage};
use crate::fetch::{HttpFetcher, SourceFetcher};
use crate::language::{self, limits};
use crate::lint::{self, LintOptions};
use crate::resolve::Resolver;
use crate::source::{self, Header, SourceLine};
use crate::template;

#[derive(Debug, Clone)]
pub struct CompileOptions {
    /// Directory relative references in the entry resolve against; defaults to the cwd.
    pub base_dir: Option<PathBuf>,
    /// Overrides the bundled standard library for `std/...` references.
    pub std_root: Option<PathBuf>,
    pub debug: bool,
    /// Extra `(trigger, body)` macros registered before the first stage.
    pub defines: Vec<(String, String)>,
    pub safe_limit: usize,
    /// Extension of the default index file for VCS shorthand and `std/` names.
    pub source_ext: String,
    pub lint: LintOptions,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            base_dir: None,
            std_root: None,
            debug: false,
            defines: Vec::new(),
            safe_limit: limits::SAFE_LIMIT,
            source_ext: language::DEFAULT_SOURCE_EXT.to_string(),
            lint: LintOptions::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompileErrorKind {
    NotFound,
    Fetch,
    Circular,
    Syntax,
    Budget,
    Lint,
    Internal,
}

impl CompileErrorKind {
    /// Errors raised while loading and splicing sources.
    pub fn is_resolution(self) -> bool {
        matches!(
            self,
            CompileErrorKind::NotFound
                | CompileErrorKind::Fetch
                | CompileErrorKind::Circular
                | CompileErrorKind::Syntax
                | CompileErrorKind::Budget
        )
    }

    pub fn code(self) -> &'static str {
        match self {
            CompileErrorKind::NotFound => "MF-RES-0001",
            CompileErrorKind::Fetch => "MF-RES-0002",
            CompileErrorKind::Circular => "MF-RES-0003",
            CompileErrorKind::Syntax => "MF-RES-0004",
            CompileErrorKind::Budget => "MF-RES-0005",
            CompileErrorKind::Lint => "MF-LINT-0000",
            CompileErrorKind::Internal => "MF-INTERNAL-0001",
        }
    }
}

#[derive(Debug, Clone)]
pub struct CompilerError {
    pub kind: CompileErrorKind,
    pub message: String,
    pub loc: Option<Location>,
    pub diagnostics: Vec<Diagnostic>,
}

impl CompilerError {
    pub fn new(kind: CompileErrorKind, message: String) -> Self {
        Self {
            kind,
            message,
            loc: None,
            diagnostics: Vec::new(),
        }
    }

    pub fn at(mut self, loc: Option<Location>) -> Self {
        self.loc = loc;
        self
    }

    /// The error as report diagnostics; lint failures carry their own.
    pub fn to_diagnostics(&self) -> Vec<Diagnostic> {
        if !self.diagnostics.is_empty() {
            return self.diagnostics.clone();
        }
        let stage = if self.kind == CompileErrorKind::Lint {
            Stage::Lint
        } else {
            Stage::Resolve
        };
        vec![Diagnostic::new(
            self.kind.code(),
            Severity::Error,
            stage,
            self.message.clone(),
            self.loc.clone(),
        )]
    }
}

impl std::error::Error for CompilerError {}

impl fmt::Display for CompilerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.loc {
            Some(loc) => write!(f, "{loc}: {}", self.message)?,
            None => write!(f, "{}", self.message)?,
        }
        for d in self.diagnostics.iter().filter(|d| d.is_error()) {
            write!(f, "\n{d}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct CompileOutput {
    /// Final newline-joined command stream.
    pub output: String,
    /// Resolved source before any other stage ran.
    pub combined: String,
    pub lines: Vec<SourceLine>,
    pub headers: Vec<Header>,
    pub footers: Vec<Header>,
    pub report: Report,
    pub entry_file: Option<PathBuf>,
    pub base_path: Option<PathBuf>,
    /// Every distinct source spliced into the output, sorted.
    pub sources: Vec<String>,
}

pub fn compile(entry: &str, options: &CompileOptions) -> Result<CompileOutput, CompilerError> {
    compile_with_fetcher(entry, options, &HttpFetcher)
}

/// Runs the full pipeline and fails when the linter reports any error.
pub fn compile_with_fetcher(
    entry: &str,
    options: &CompileOptions,
    fetcher: &dyn SourceFetcher,
) -> Result<CompileOutput, CompilerError> {
    let out = run_pipeline(entry, options, fetcher)?;
    if !out.report.ok {
        let errors = out.report.errors().count();
        let loc = out.report.errors().next().and_then(|d| d.loc.clone());
        let mut err = CompilerError::new(
            CompileErrorKind::Lint,
            format!("lint failed with {errors} error(s)"),
        )
        .at(loc);
        err.diagnostics = out.report.diagnostics;
        return Err(err);
    }
    Ok(out)
}

pub fn lint_source(entry: &str, options: &CompileOptions) -> Result<CompileOutput, CompilerError> {
    lint_source_with_fetcher(entry, options, &HttpFetcher)
}

/// Runs the full pipeline but reports lint errors instead of failing on them.
pub fn lint_source_with_fetcher(
    entry: &str,
    options: &CompileOptions,
    fetcher: &dyn SourceFetcher,
) -> Result<CompileOutput, CompilerError> {
    run_pipeline(entry, options, fetcher)
}

fn run_pipeline(
    entry: &str,
    options: &CompileOptions,
    fetcher: &dyn SourceFetcher,
) -> Result<CompileOutput, CompilerError> {
    let mut ctx = CompilationContext::new(options);

    let resolved = Resolver::new(&mut ctx, options, fetcher).resolve_entry(entry)?;
    let combined = source::join_text(&resolved);
    tracing::debug!(stage = "resolve", lines = resolved.len(), "stage complete");

    let lines = constants::resolve_constants(resolved).map_err(|e| {
        CompilerError::new(
            CompileErrorKind::Internal,
            format!("constant table: {e}"),
        )
    })?;
    tracing::debug!(stage = "constants", lines = lines.len(), "stage complete");

    ctx.lines = template::expand_templates(&lines, &mut ctx);
    tracing::debug!(stage = "template", lines = ctx.lines.len(), "stage complete");

    defines::extract_defines(&mut ctx);
    tracing::debug!(
        stage = "define",
        lines = ctx.lines.len(),
        defines = ctx.defines().len(),
        "stage complete"
    );

    compress::compress(&mut ctx, options.safe_limit);
    tracing::debug!(stage = "compress", lines = ctx.lines.len(), "stage complete");

    let lint_report = lint::lint_lines(&ctx.lines, &options.lint);
    let mut diagnostics = ctx.diagnostics().to_vec();
    diagnostics.extend(lint_report.diagnostics);
    let report = Report::ok().with_diagnostics(diagnostics);
    tracing::debug!(
        stage = "lint",
        errors = report.errors().count(),
        warnings = report.warnings().count(),
        "stage complete"
    );

    Ok(CompileOutput {
        output: source::join_text(&ctx.lines),
        combined,
        headers: ctx.headers().to_vec(),
        footers: ctx.footers().to_vec(),
        entry_file: ctx.entry_file().cloned(),
        base_path: ctx.base_path(),
        sources: ctx.loaded().iter().cloned().collect(),
        lines: ctx.take_lines(),
        report,
    })
}
