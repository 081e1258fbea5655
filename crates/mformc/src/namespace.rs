use std::collections::BTreeSet;

use regex::Regex;

use crate::source::SourceLine;

/// Prefixes every attribute (`&NAME obj=...`) and function
/// (`@def/func NAME(...)`) defined in `lines` with `<alias>-`, along with
/// every word-boundary reference to those names.
///
/// Occurrences already written as `<alias>-NAME` are left alone.
pub fn apply_namespace(lines: &[SourceLine], alias: &str) -> Result<Vec<SourceLine>, regex::Error> {
    let attr_def = Regex::new(r"^&(\w+)\s")?;
    let func_def = Regex::new(r"^@def/func\s+(\w+)\(")?;

    let mut symbols = BTreeSet::new();
    for line in lines {
        for re in [&attr_def, &func_def] {
            if let Some(caps) = re.captures(&line.text) {
                symbols.insert(caps[1].to_string());
            }
        }
    }
    if symbols.is_empty() {
        return Ok(lines.to_vec());
    }

    let mut ordered: Vec<&String> = symbols.iter().collect();
    ordered.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
    let alternation = ordered
        .iter()
        .map(|s| regex::escape(s))
        .collect::<Vec<_>>()
        .join("|");
    let reference = Regex::new(&format!(r"\b(?:{alternation})\b"))?;
    let prefix = format!("{alias}-");

    Ok(lines
        .iter()
        .map(|line| {
            let text = &line.text;
            let mut out = String::with_capacity(text.len() + prefix.len());
            let mut last = 0;
            for m in reference.find_iter(text) {
                out.push_str(&text[last..m.start()]);
                if !text[..m.start()].ends_with(&prefix) {
                    out.push_str(&prefix);
                }
                out.push_str(m.as_str());
                last = m.end();
            }
            out.push_str(&text[last..]);
            line.with_text(out)
        })
        .collect())
}
