//! Loads the entry source and splices `#include`, `#file` and `#import`
//! references into one provenance-tagged line stream.

use std::path::{Path, PathBuf};

use url::Url;

use crate::builtin_modules;
use crate::compile::{CompileErrorKind, CompileOptions, CompilerError};
use crate::context::{Base, CompilationContext};
use crate::directive::{directive_arg, strip_prefix_ci, unquote};
use crate::fetch::SourceFetcher;
use crate::language::{self, limits, RAW_MARKER};
use crate::namespace;
use crate::source::{split_source, Header, SourceLine};

const INLINE_ID: &str = "<input>";

const META_DIRECTIVES: &[&str] = &["author", "version", "desc", "description"];

/// A classified reference, before anything is read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceRef {
    Std(String),
    Url(Url),
    File(PathBuf),
    Inline(String),
}

#[derive(Debug)]
struct LoadedSource {
    id: String,
    text: String,
    base: Base,
}

pub struct Resolver<'a> {
    ctx: &'a mut CompilationContext,
    options: &'a CompileOptions,
    fetcher: &'a dyn SourceFetcher,
}

impl<'a> Resolver<'a> {
    pub fn new(
        ctx: &'a mut CompilationContext,
        options: &'a CompileOptions,
        fetcher: &'a dyn SourceFetcher,
    ) -> Self {
        Self {
            ctx,
            options,
            fetcher,
        }
    }

    /// Resolves the top-level reference. Unlike directive references, an
    /// entry that names nothing loadable is treated as literal source text.
    pub fn resolve_entry(&mut self, entry: &str) -> Result<Vec<SourceLine>, CompilerError> {
        let source_ref = match classify(entry, &self.ctx.base, &self.options.source_ext)? {
            SourceRef::File(path) if !path.is_file() => SourceRef::Inline(entry.to_string()),
            other => other,
        };
        let loaded = self.load(&source_ref)?;
        self.expand(loaded)
    }

    fn resolve_ref(
        &mut self,
        reference: &str,
        from: &SourceLine,
    ) -> Result<Vec<SourceLine>, CompilerError> {
        let reference = unquote(reference);
        if reference.is_empty() {
            return Err(CompilerError::new(
                CompileErrorKind::Syntax,
                "directive is missing a reference".to_string(),
            )
            .at(Some(from.location())));
        }
        let source_ref = classify(reference, &self.ctx.base, &self.options.source_ext)
            .map_err(|e| e.at(Some(from.location())))?;
        if let SourceRef::File(path) = &source_ref {
            if !path.is_file() {
                return Err(CompilerError::new(
                    CompileErrorKind::NotFound,
                    format!("file not found: {reference:?} (searched: {})", path.display()),
                )
                .at(Some(from.location())));
            }
        }
        let loaded = self
            .load(&source_ref)
            .map_err(|e| e.at(Some(from.location())))?;
        self.expand(loaded).map_err(|e| {
            if e.loc.is_none() {
                e.at(Some(from.location()))
            } else {
                e
            }
        })
    }

    fn load(&mut self, source_ref: &SourceRef) -> Result<LoadedSource, CompilerError> {
        let loaded = match source_ref {
            SourceRef::Inline(text) => LoadedSource {
                id: INLINE_ID.to_string(),
                text: text.clone(),
                base: self.ctx.base.clone(),
            },
            SourceRef::Std(name) => self.load_std(name)?,
            SourceRef::Url(url) => {
                let text = self.fetcher.fetch(url).map_err(|e| {
                    CompilerError::new(
                        CompileErrorKind::Fetch,
                        format!("fetch {}: {e:#}", url.as_str()),
                    )
                })?;
                LoadedSource {
                    id: url.as_str().to_string(),
                    text,
                    base: Base::Url(url.clone()),
                }
            }
            SourceRef::File(path) => {
                let path = path.canonicalize().map_err(|e| {
                    CompilerError::new(
                        CompileErrorKind::NotFound,
                        format!("canonicalize {}: {e}", path.display()),
                    )
                })?;
                let text = std::fs::read_to_string(&path).map_err(|e| {
                    CompilerError::new(
                        CompileErrorKind::NotFound,
                        format!("read {}: {e}", path.display()),
                    )
                })?;
                if self.ctx.entry_file.is_none() {
                    self.ctx.entry_file = Some(path.clone());
                }
                let dir = path
                    .parent()
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|| PathBuf::from("."));
                LoadedSource {
                    id: path.display().to_string(),
                    text,
                    base: Base::Dir(dir),
                }
            }
        };
        let max = limits::max_source_bytes();
        if loaded.text.len() > max {
            return Err(CompilerError::new(
                CompileErrorKind::Budget,
                format!(
                    "source too large: {} is {} bytes (max_source_bytes={max})",
                    loaded.id,
                    loaded.text.len()
                ),
            ));
        }
        tracing::debug!(id = %loaded.id, bytes = loaded.text.len(), "loaded source");
        Ok(loaded)
    }

    fn load_std(&self, name: &str) -> Result<LoadedSource, CompilerError> {
        let file_name = with_ext(name, &self.options.source_ext);
        let id = format!("std/{file_name}");
        if let Some(root) = &self.options.std_root {
            let path = root.join(&file_name);
            if path.is_file() {
                let text = std::fs::read_to_string(&path).map_err(|e| {
                    CompilerError::new(
                        CompileErrorKind::NotFound,
                        format!("read {}: {e}", path.display()),
                    )
                })?;
                return Ok(LoadedSource {
                    id,
                    text,
                    base: Base::Dir(root.clone()),
                });
            }
        }
        let module_id = file_name
            .strip_suffix(&format!(".{}", self.options.source_ext))
            .unwrap_or(&file_name);
        let text = builtin_modules::builtin_module_source(module_id).ok_or_else(|| {
            CompilerError::new(
                CompileErrorKind::NotFound,
                format!(
                    "unknown standard library module: {id:?} (available: {})",
                    builtin_modules::builtin_module_ids().join(", ")
                ),
            )
        })?;
        Ok(LoadedSource {
            id,
            text: text.to_string(),
            base: self.ctx.base.clone(),
        })
    }

    /// Scans a loaded source under its own base, guarding against cycles.
    fn expand(&mut self, loaded: LoadedSource) -> Result<Vec<SourceLine>, CompilerError> {
        if self.ctx.visiting.contains(&loaded.id) {
            let mut chain = self.ctx.visiting.clone();
            chain.push(loaded.id.clone());
            return Err(CompilerError::new(
                CompileErrorKind::Circular,
                format!("circular dependency detected: {}", chain.join(" -> ")),
            ));
        }
        self.ctx.visiting.push(loaded.id.clone());
        let saved_base = std::mem::replace(&mut self.ctx.base, loaded.base);

        let result = self.scan(split_source(&loaded.text, &loaded.id));

        self.ctx.base = saved_base;
        self.ctx.visiting.pop();
        self.ctx.loaded.insert(loaded.id);
        result
    }

    fn scan(&mut self, lines: Vec<SourceLine>) -> Result<Vec<SourceLine>, CompilerError> {
        let mut out = Vec::with_capacity(lines.len());
        for line in lines {
            let text = line.text.as_str();

            if let Some(arg) = directive_arg(text, '#', "include") {
                let nested = self.resolve_ref(arg, &line)?;
                out.extend(nested);
                continue;
            }

            if let Some(arg) = directive_arg(text, '#', "file") {
                let nested = self.resolve_ref(arg, &line)?;
                let label = unquote(arg);
                out.push(line.with_text(format!("{RAW_MARKER} ==== begin {label} ====")));
                out.extend(
                    nested
                        .into_iter()
                        .map(|n| {
                            let text = format!("{RAW_MARKER} {}", n.text);
                            SourceLine { text, ..n }
                        }),
                );
                out.push(line.with_text(format!("{RAW_MARKER} ==== end {label} ====")));
                continue;
            }

            if let Some(arg) = directive_arg(text, '#', "import") {
                let (reference, alias) = parse_import(arg).ok_or_else(|| {
                    CompilerError::new(
                        CompileErrorKind::Syntax,
                        format!("malformed #import (expected #import \"<ref>\" as <alias>): {text:?}"),
                    )
                    .at(Some(line.location()))
                })?;
                let nested = self.resolve_ref(reference, &line)?;
                let renamed = namespace::apply_namespace(&nested, alias).map_err(|e| {
                    CompilerError::new(
                        CompileErrorKind::Internal,
                        format!("namespace {alias:?}: {e}"),
                    )
                    .at(Some(line.location()))
                })?;
                out.extend(renamed);
                continue;
            }

            if let Some(header) = parse_meta(text) {
                self.ctx.push_header(header);
                continue;
            }
            if let Some(arg) = directive_arg(text, '#', "header") {
                self.ctx.push_header(parse_name_value(arg));
                continue;
            }
            if let Some(arg) = directive_arg(text, '#', "footer") {
                self.ctx.push_footer(parse_name_value(arg));
                continue;
            }
            if text.trim().eq_ignore_ascii_case("@debug") {
                self.ctx.debug = true;
                continue;
            }

            out.push(line);
        }
        Ok(out)
    }
}

/// Classifies a reference in priority order: std module, VCS shorthand,
/// absolute URL, then a path relative to `base`.
pub fn classify(reference: &str, base: &Base, source_ext: &str) -> Result<SourceRef, CompilerError> {
    let reference = reference.trim();
    if reference.contains('\n') {
        return Ok(SourceRef::Inline(reference.to_string()));
    }
    if let Some(name) = reference.strip_prefix("std/") {
        return Ok(SourceRef::Std(name.to_string()));
    }
    if let Some(rest) = strip_prefix_ci(reference, "github:").or_else(|| strip_prefix_ci(reference, "git:")) {
        return vcs_url(rest.trim(), source_ext).map(SourceRef::Url);
    }
    if strip_prefix_ci(reference, "http://").is_some() || strip_prefix_ci(reference, "https://").is_some() {
        let url = Url::parse(reference).map_err(|e| {
            CompilerError::new(CompileErrorKind::Syntax, format!("invalid url {reference:?}: {e}"))
        })?;
        return Ok(SourceRef::Url(url));
    }
    let path = Path::new(reference);
    if path.is_absolute() {
        return Ok(SourceRef::File(path.to_path_buf()));
    }
    match base {
        Base::Dir(dir) => Ok(SourceRef::File(dir.join(path))),
        Base::Url(url) => url.join(reference).map(SourceRef::Url).map_err(|e| {
            CompilerError::new(
                CompileErrorKind::Syntax,
                format!("invalid relative url {reference:?} against {}: {e}", url.as_str()),
            )
        }),
    }
}

/// `user/repo[@branch][/path]` to a raw-content URL.
pub fn vcs_url(shorthand: &str, source_ext: &str) -> Result<Url, CompilerError> {
    let malformed = || {
        CompilerError::new(
            CompileErrorKind::Syntax,
            format!("malformed VCS reference {shorthand:?} (expected git:<user>/<repo>[@<branch>][/<path>])"),
        )
    };
    let (user, rest) = shorthand.split_once('/').ok_or_else(malformed)?;
    let (repo_branch, path) = match rest.split_once('/') {
        Some((head, tail)) => (head, tail),
        None => (rest, ""),
    };
    let (repo, branch) = match repo_branch.split_once('@') {
        Some((repo, branch)) => (repo, branch),
        None => (repo_branch, language::DEFAULT_BRANCH),
    };
    if user.is_empty() || repo.is_empty() || branch.is_empty() {
        return Err(malformed());
    }

    let mut url = Url::parse(language::RAW_CONTENT_HOST)
        .map_err(|e| CompilerError::new(CompileErrorKind::Internal, format!("raw host url: {e}")))?;
    {
        let mut segs = url.path_segments_mut().map_err(|_| {
            CompilerError::new(CompileErrorKind::Internal, "raw host url cannot be a base".to_string())
        })?;
        segs.pop_if_empty().push(user).push(repo).push(branch);
        let mut pushed = false;
        for seg in path.split('/').filter(|s| !s.is_empty()) {
            segs.push(seg);
            pushed = true;
        }
        if !pushed {
            segs.push(&format!("index.{source_ext}"));
        }
    }
    Ok(url)
}

fn with_ext(name: &str, ext: &str) -> String {
    let suffix = format!(".{ext}");
    if name.ends_with(&suffix) {
        name.to_string()
    } else {
        format!("{name}{suffix}")
    }
}

fn parse_import(arg: &str) -> Option<(&str, &str)> {
    let rest = arg.strip_prefix('"')?;
    let (reference, tail) = rest.split_once('"')?;
    let alias = strip_prefix_ci(tail.trim_start(), "as")?;
    if !alias.starts_with(char::is_whitespace) {
        return None;
    }
    let alias = alias.trim();
    let valid = !alias.is_empty()
        && alias
            .chars()
            .all(|c| c.is_alphanumeric() || c == '_' || c == '-');
    if reference.trim().is_empty() || !valid {
        return None;
    }
    Some((reference.trim(), alias))
}

fn parse_meta(text: &str) -> Option<Header> {
    META_DIRECTIVES.iter().find_map(|name| {
        directive_arg(text, '#', name).map(|value| Header::new(*name, value))
    })
}

fn parse_name_value(arg: &str) -> Header {
    match arg.split_once('=') {
        Some((name, value)) => Header::new(name.trim(), value.trim()),
        None => Header::new(arg.trim(), ""),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_orders_std_vcs_url_then_path() {
        let base = Base::Dir(PathBuf::from("/work"));
        assert_eq!(
            classify("std/colors", &base, "mush").expect("std"),
            SourceRef::Std("colors".to_string())
        );
        match classify("git:alice/tools", &base, "mush").expect("vcs") {
            SourceRef::Url(url) => assert_eq!(
                url.as_str(),
                "https://raw.githubusercontent.com/alice/tools/main/index.mush"
            ),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(
            classify("lib/a.mush", &base, "mush").expect("path"),
            SourceRef::File(PathBuf::from("/work/lib/a.mush"))
        );
    }

    #[test]
    fn vcs_url_honors_branch_and_encodes_segments() {
        let url = vcs_url("alice/tools@dev/src/my file.mush", "mush").expect("vcs");
        assert_eq!(
            url.as_str(),
            "https://raw.githubusercontent.com/alice/tools/dev/src/my%20file.mush"
        );
        assert!(vcs_url("alice", "mush").is_err());
        assert!(vcs_url("alice/@dev", "mush").is_err());
    }

    #[test]
    fn relative_refs_join_against_url_base() {
        let base = Base::Url(Url::parse("https://example.com/lib/index.mush").expect("url"));
        assert_eq!(
            classify("util.mush", &base, "mush").expect("join"),
            SourceRef::Url(Url::parse("https://example.com/lib/util.mush").expect("url"))
        );
    }

    #[test]
    fn parse_import_requires_quoted_ref_and_alias() {
        assert_eq!(parse_import("\"lib.mush\" as LIB"), Some(("lib.mush", "LIB")));
        assert_eq!(parse_import("\"lib.mush\" AS my-lib"), Some(("lib.mush", "my-lib")));
        assert_eq!(parse_import("lib.mush as LIB"), None);
        assert_eq!(parse_import("\"lib.mush\" as"), None);
        assert_eq!(parse_import("\"lib.mush\" asLIB"), None);
    }

    #[test]
    fn meta_and_name_value_parsing() {
        assert_eq!(parse_meta("#author Jane"), Some(Header::new("author", "Jane")));
        assert_eq!(
            parse_meta("#description A tool"),
            Some(Header::new("description", "A tool"))
        );
        assert_eq!(parse_meta("#authors x"), None);
        assert_eq!(parse_name_value("Name = Widget"), Header::new("Name", "Widget"));
        assert_eq!(parse_name_value("Lonely"), Header::new("Lonely", ""));
    }
}
