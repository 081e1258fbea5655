use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result};
use mform_contracts::{PROJECT_MANIFEST_FILE_NAME, PROJECT_MANIFEST_SCHEMA_VERSIONS_SUPPORTED};
use serde::Deserialize;

use crate::compile::CompileOptions;
use crate::language::limits;
use crate::lint::LintOptions;

fn validate_rel_path(field: &str, raw: &str) -> Result<()> {
    let raw = raw.trim();
    if raw.is_empty() {
        anyhow::bail!("{field} must be non-empty");
    }
    let path = Path::new(raw);
    if path.is_absolute() {
        anyhow::bail!("{field} must be a relative path, got {:?}", raw);
    }
    if path.components().any(|c| c == Component::ParentDir) {
        anyhow::bail!("{field} must not contain '..' segments: {:?}", raw);
    }
    Ok(())
}

fn normalize_string_in_place(s: &mut String) {
    if s.trim() != s {
        *s = s.trim().to_string();
    }
}

fn normalize_opt_in_place(s: &mut Option<String>) {
    if let Some(v) = s.as_mut() {
        normalize_string_in_place(v);
    }
    if s.as_deref().is_some_and(str::is_empty) {
        *s = None;
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProjectManifest {
    pub schema_version: String,
    /// Entry reference: a path relative to the manifest, a URL, `git:` or `std/`.
    pub entry: String,
    #[serde(default)]
    pub out_file: Option<String>,
    #[serde(default)]
    pub debug: bool,
    #[serde(default)]
    pub defines: BTreeMap<String, String>,
    #[serde(default)]
    pub std_root: Option<String>,
    #[serde(default)]
    pub safe_limit: Option<usize>,
    #[serde(default)]
    pub linter: LintOptions,
}

pub fn load_project_manifest(path: &Path) -> Result<ProjectManifest> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("[MFPROJECT_READ] read project: {}", path.display()))?;
    parse_project_manifest_bytes(&bytes, path)
}

pub fn parse_project_manifest_bytes(bytes: &[u8], path: &Path) -> Result<ProjectManifest> {
    let mut m: ProjectManifest = serde_json::from_slice(bytes)
        .with_context(|| format!("[MFPROJECT_PARSE] parse project JSON: {}", path.display()))?;

    normalize_string_in_place(&mut m.schema_version);
    normalize_string_in_place(&mut m.entry);
    normalize_opt_in_place(&mut m.out_file);
    normalize_opt_in_place(&mut m.std_root);

    if !PROJECT_MANIFEST_SCHEMA_VERSIONS_SUPPORTED
        .iter()
        .any(|v| *v == m.schema_version)
    {
        anyhow::bail!(
            "project schema_version mismatch: expected one of {:?} got {:?}",
            PROJECT_MANIFEST_SCHEMA_VERSIONS_SUPPORTED,
            m.schema_version
        );
    }
    if m.entry.is_empty() {
        anyhow::bail!("project.entry must be non-empty");
    }
    if let Some(out) = &m.out_file {
        validate_rel_path("project.out_file", out)?;
    }
    if let Some(root) = &m.std_root {
        validate_rel_path("project.std_root", root)?;
    }
    if let Some(limit) = m.safe_limit {
        if limit < limits::MIN_SPLIT_BUDGET {
            anyhow::bail!(
                "project.safe_limit must be at least {}, got {limit}",
                limits::MIN_SPLIT_BUDGET
            );
        }
    }
    if m.defines.keys().any(|k| k.trim().is_empty()) {
        anyhow::bail!("project.defines keys must be non-empty");
    }
    Ok(m)
}

/// Walks up from `start` to the nearest directory holding `mform.json`.
pub fn find_project_manifest(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .map(|dir| dir.join(PROJECT_MANIFEST_FILE_NAME))
        .find(|p| p.is_file())
}

/// Directory relative manifest paths are resolved against.
pub fn project_root(manifest_path: &Path) -> PathBuf {
    manifest_path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."))
}

impl ProjectManifest {
    pub fn to_compile_options(&self, manifest_path: &Path) -> CompileOptions {
        let root = project_root(manifest_path);
        CompileOptions {
            base_dir: Some(root.clone()),
            std_root: self.std_root.as_ref().map(|r| root.join(r)),
            debug: self.debug,
            defines: self
                .defines
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            safe_limit: self.safe_limit.unwrap_or(limits::SAFE_LIMIT),
            lint: self.linter.clone(),
            ..CompileOptions::default()
        }
    }

    pub fn out_path(&self, manifest_path: &Path) -> Option<PathBuf> {
        self.out_file
            .as_ref()
            .map(|out| project_root(manifest_path).join(out))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lint::RuleLevel;
    use mform_contracts::PROJECT_MANIFEST_SCHEMA_VERSION;

    fn default_manifest_json(entry: &str) -> String {
        let v = serde_json::json!({
            "schema_version": PROJECT_MANIFEST_SCHEMA_VERSION,
            "entry": entry,
        });
        format!("{v:#}\n")
    }

    fn parse(json: &str) -> Result<ProjectManifest> {
        parse_project_manifest_bytes(json.as_bytes(), Path::new("mform.json"))
    }

    #[test]
    fn parses_full_manifest() {
        let m = parse(
            r#"{
              "schema_version": "mform.project@0.1.0",
              "entry": " src/index.mush ",
              "out_file": "build/out.txt",
              "debug": true,
              "defines": {"@hello": "@pemit %#=Hello"},
              "std_root": "vendor/std",
              "safe_limit": 4000,
              "linter": {"rules": {"switch-call": "error", "unbalanced-parens": "off"}}
            }"#,
        )
        .expect("parse");
        assert_eq!(m.entry, "src/index.mush");
        assert_eq!(m.linter.rules.get("switch-call"), Some(&RuleLevel::Error));

        let opts = m.to_compile_options(Path::new("/proj/mform.json"));
        assert_eq!(opts.base_dir, Some(PathBuf::from("/proj")));
        assert_eq!(opts.std_root, Some(PathBuf::from("/proj/vendor/std")));
        assert_eq!(opts.safe_limit, 4000);
        assert!(opts.debug);
        assert_eq!(opts.defines.len(), 1);
        assert_eq!(
            m.out_path(Path::new("/proj/mform.json")),
            Some(PathBuf::from("/proj/build/out.txt"))
        );
    }

    #[test]
    fn rejects_bad_schema_and_paths() {
        let err = parse(r#"{"schema_version":"mform.project@9","entry":"a"}"#).expect_err("schema");
        assert!(format!("{err:#}").contains("schema_version mismatch"));
        assert!(parse(
            r#"{"schema_version":"mform.project@0.1.0","entry":"a","out_file":"../x"}"#
        )
        .is_err());
        assert!(parse(
            r#"{"schema_version":"mform.project@0.1.0","entry":"a","safe_limit":10}"#
        )
        .is_err());
        assert!(parse(r#"{"schema_version":"mform.project@0.1.0","entry":"a","linter":{"rules":{"x":"loud"}}}"#).is_err());
    }

    #[test]
    fn finds_manifest_in_ancestors() {
        let dir = tempfile::tempdir().expect("tempdir");
        let nested = dir.path().join("src/deep");
        std::fs::create_dir_all(&nested).expect("mkdir");
        let manifest = dir.path().join(PROJECT_MANIFEST_FILE_NAME);
        std::fs::write(&manifest, default_manifest_json("src/index.mush")).expect("write");
        assert_eq!(find_project_manifest(&nested), Some(manifest.clone()));
        let m = load_project_manifest(&manifest).expect("load");
        assert_eq!(m.entry, "src/index.mush");
    }
}
