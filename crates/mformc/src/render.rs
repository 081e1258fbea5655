use crate::language::RAW_MARKER;
use crate::source::Header;

/// Wraps the command stream with `@@ name: value` banner lines.
///
/// Headers go first and footers last, each block separated from the body by
/// a blank line. With no headers or footers the output is returned as is.
pub fn render_output(output: &str, headers: &[Header], footers: &[Header]) -> String {
    let mut out = String::with_capacity(output.len() + 64 * (headers.len() + footers.len()));
    for h in headers {
        out.push_str(&banner_line(h));
        out.push('\n');
    }
    if !headers.is_empty() {
        out.push('\n');
    }
    out.push_str(output);
    if !footers.is_empty() {
        out.push_str("\n\n");
        let lines: Vec<String> = footers.iter().map(banner_line).collect();
        out.push_str(&lines.join("\n"));
    }
    out
}

fn banner_line(h: &Header) -> String {
    if h.value.is_empty() {
        format!("{RAW_MARKER} {}", h.name)
    } else {
        format!("{RAW_MARKER} {}: {}", h.name, h.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headers_and_footers_frame_the_output() {
        let out = render_output(
            "&A me=1",
            &[Header::new("author", "Jane"), Header::new("version", "1.2")],
            &[Header::new("Installed", "")],
        );
        assert_eq!(
            out,
            "@@ author: Jane\n@@ version: 1.2\n\n&A me=1\n\n@@ Installed"
        );
    }

    #[test]
    fn bare_output_is_unchanged() {
        assert_eq!(render_output("&A me=1", &[], &[]), "&A me=1");
    }
}
