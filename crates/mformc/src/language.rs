pub const LANG_ID: &str = "mushcode-mform@0.1.0";

/// Marker that starts a line the target interpreter treats as a comment and
/// that every stage passes through verbatim.
pub const RAW_MARKER: &str = "@@";

/// Lines starting with this are dropped by the compressor.
pub const DROP_MARKER: &str = "##";

pub const DEFAULT_SOURCE_EXT: &str = "mush";

pub const RAW_CONTENT_HOST: &str = "https://raw.githubusercontent.com";

pub const DEFAULT_BRANCH: &str = "main";

pub mod limits {
    /// Longest command the target accepts before truncating it.
    pub const SAFE_LIMIT: usize = 8000;
    /// Below this many characters of value budget a command is not split.
    pub const MIN_SPLIT_BUDGET: usize = 100;
    pub const MAX_LOOP_ITERATIONS: i64 = 100_000;
    /// Deepest `#for`/`#if`/`#debug` nesting the template stage expands.
    pub const MAX_TEMPLATE_DEPTH: usize = 64;
    /// Most lines the template stage may produce for one compilation.
    pub const MAX_EXPANDED_LINES: usize = 1_000_000;
    pub const MAX_SOURCE_BYTES: usize = 8 * 1024 * 1024;

    pub fn max_source_bytes() -> usize {
        match std::env::var("MFORM_MAX_SOURCE_BYTES") {
            Ok(v) => v
                .parse::<usize>()
                .ok()
                .filter(|v| *v > 0)
                .unwrap_or(MAX_SOURCE_BYTES),
            Err(_) => MAX_SOURCE_BYTES,
        }
    }
}
