use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;

use mform_contracts::MFORMC_REPORT_SCHEMA_VERSION;
use mformc::compile::{self, CompileErrorKind, CompileOptions, CompileOutput};
use mformc::diagnostics;
use mformc::language;
use mformc::project;
use mformc::render;

#[derive(Parser)]
#[command(name = "mformc")]
#[command(about = "MUSHcode preprocessor and compiler.", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    LangId,
    /// Resolve, expand, compress and lint a source into a command stream.
    Compile {
        /// Entry reference: path, URL, `git:user/repo[@branch][/path]`, `std/<name>` or raw text.
        #[arg(long)]
        input: Option<String>,
        /// Project manifest (defaults to the nearest `mform.json`).
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long)]
        out: Option<PathBuf>,
        #[arg(long, value_name = "PATH")]
        combined_out: Option<PathBuf>,
        #[arg(long)]
        debug: bool,
        #[arg(long, value_name = "CHARS")]
        safe_limit: Option<usize>,
        #[arg(long)]
        report_json: bool,
    },
    /// Run the pipeline and report lint diagnostics without emitting output.
    Lint {
        #[arg(long)]
        input: Option<String>,
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long)]
        report_json: bool,
    },
}

#[derive(Debug, Serialize)]
struct MformcToolReport {
    schema_version: &'static str,
    command: &'static str,
    ok: bool,
    r#in: String,
    diagnostics_count: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    diagnostics: Vec<diagnostics::Diagnostic>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    sources: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    output: Option<String>,
    exit_code: u8,
}

struct Inputs {
    entry: String,
    options: CompileOptions,
    out: Option<PathBuf>,
}

fn main() -> std::process::ExitCode {
    init_tracing();
    match try_main() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{err:#}");
            std::process::ExitCode::from(2)
        }
    }
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_env("MFORM_LOG")
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn try_main() -> Result<std::process::ExitCode> {
    let cli = Cli::parse();

    match cli.cmd {
        Cmd::LangId => {
            println!("{}", language::LANG_ID);
            Ok(std::process::ExitCode::SUCCESS)
        }
        Cmd::Compile {
            input,
            config,
            out,
            combined_out,
            debug,
            safe_limit,
            report_json,
        } => {
            let mut inputs = load_inputs(input, config)?;
            inputs.options.debug |= debug;
            if let Some(limit) = safe_limit {
                inputs.options.safe_limit = limit;
            }
            let out_path = out.or(inputs.out.take());

            let result = compile::compile(&inputs.entry, &inputs.options);
            let output = match result {
                Ok(output) => output,
                Err(err) => {
                    let code = if err.kind == CompileErrorKind::Lint { 1 } else { 2 };
                    if report_json {
                        let diags = err.to_diagnostics();
                        print_json(&MformcToolReport {
                            schema_version: MFORMC_REPORT_SCHEMA_VERSION,
                            command: "compile",
                            ok: false,
                            r#in: inputs.entry.clone(),
                            diagnostics_count: diags.len(),
                            diagnostics: diags,
                            sources: Vec::new(),
                            output: None,
                            exit_code: code,
                        })?;
                        return Ok(std::process::ExitCode::from(code));
                    }
                    if code == 1 {
                        eprintln!("{err}");
                        return Ok(std::process::ExitCode::from(1));
                    }
                    return Err(anyhow::anyhow!("{err}"));
                }
            };

            let rendered = render::render_output(&output.output, &output.headers, &output.footers);
            if let Some(path) = &combined_out {
                write_text_file(path, &output.combined)?;
            }
            let stdout_output = match &out_path {
                Some(path) => {
                    write_text_file(path, &rendered)?;
                    None
                }
                None => Some(rendered),
            };

            if report_json {
                print_json(&MformcToolReport {
                    schema_version: MFORMC_REPORT_SCHEMA_VERSION,
                    command: "compile",
                    ok: true,
                    r#in: inputs.entry.clone(),
                    diagnostics_count: output.report.diagnostics.len(),
                    diagnostics: output.report.diagnostics,
                    sources: output.sources,
                    output: stdout_output,
                    exit_code: 0,
                })?;
            } else {
                print_warnings(&output);
                if let Some(text) = stdout_output {
                    println!("{text}");
                }
            }
            Ok(std::process::ExitCode::SUCCESS)
        }
        Cmd::Lint {
            input,
            config,
            report_json,
        } => {
            let inputs = load_inputs(input, config)?;
            let output = match compile::lint_source(&inputs.entry, &inputs.options) {
                Ok(output) => output,
                Err(err) => {
                    if report_json {
                        let diags = err.to_diagnostics();
                        print_json(&MformcToolReport {
                            schema_version: MFORMC_REPORT_SCHEMA_VERSION,
                            command: "lint",
                            ok: false,
                            r#in: inputs.entry.clone(),
                            diagnostics_count: diags.len(),
                            diagnostics: diags,
                            sources: Vec::new(),
                            output: None,
                            exit_code: 2,
                        })?;
                        return Ok(std::process::ExitCode::from(2));
                    }
                    return Err(anyhow::anyhow!("{err}"));
                }
            };
            let exit_code: u8 = if output.report.ok { 0 } else { 1 };
            if report_json {
                print_json(&MformcToolReport {
                    schema_version: MFORMC_REPORT_SCHEMA_VERSION,
                    command: "lint",
                    ok: output.report.ok,
                    r#in: inputs.entry.clone(),
                    diagnostics_count: output.report.diagnostics.len(),
                    diagnostics: output.report.diagnostics,
                    sources: output.sources,
                    output: None,
                    exit_code,
                })?;
            } else {
                for d in &output.report.diagnostics {
                    eprintln!("{d}");
                }
            }
            Ok(std::process::ExitCode::from(exit_code))
        }
    }
}

/// Entry and options from `--input`, a manifest, or both (`--input` wins).
fn load_inputs(input: Option<String>, config: Option<PathBuf>) -> Result<Inputs> {
    let manifest_path = match config {
        Some(path) => Some(path),
        None => {
            let cwd = std::env::current_dir().context("get cwd")?;
            project::find_project_manifest(&cwd)
        }
    };
    let Some(manifest_path) = manifest_path else {
        let Some(entry) = input else {
            anyhow::bail!("missing --input (and no mform.json found from the current directory)");
        };
        return Ok(Inputs {
            entry,
            options: CompileOptions::default(),
            out: None,
        });
    };

    let manifest = project::load_project_manifest(&manifest_path)?;
    tracing::debug!(manifest = %manifest_path.display(), "loaded project manifest");
    let mut options = manifest.to_compile_options(&manifest_path);
    let entry = match input {
        // Command-line references are relative to the cwd, not the manifest.
        Some(entry) => {
            options.base_dir = None;
            entry
        }
        None => manifest.entry.clone(),
    };
    Ok(Inputs {
        entry,
        options,
        out: manifest.out_path(&manifest_path),
    })
}

fn print_warnings(output: &CompileOutput) {
    for d in output.report.warnings() {
        eprintln!("{d}");
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string(value)?);
    Ok(())
}

fn write_text_file(path: &Path, text: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create output dir: {}", parent.display()))?;
        }
    }
    std::fs::write(path, text.as_bytes()).with_context(|| format!("write: {}", path.display()))?;
    Ok(())
}
