use std::collections::BTreeMap;

use regex::Regex;

use crate::directive::{directive_arg, is_word_char};
use crate::source::SourceLine;

/// Parses `#const KEY = VALUE`. Malformed declarations return `None` and are
/// left in the stream as ordinary text.
pub fn parse_const(text: &str) -> Option<(&str, &str)> {
    let arg = directive_arg(text, '#', "const")?;
    let (key, value) = arg.split_once('=')?;
    let key = key.trim();
    let value = value.trim();
    if key.is_empty() || !key.chars().all(is_word_char) || value.is_empty() {
        return None;
    }
    Some((key, value))
}

/// Removes every `#const` declaration and substitutes whole-word occurrences
/// of each key in the remaining lines.
///
/// The table is global to the stream: a key declared anywhere applies to
/// every line, and a later declaration of the same key wins. Substituted
/// values are not rescanned.
pub fn resolve_constants(lines: Vec<SourceLine>) -> Result<Vec<SourceLine>, regex::Error> {
    let mut table: BTreeMap<String, String> = BTreeMap::new();
    let mut out = Vec::with_capacity(lines.len());
    for line in lines {
        match parse_const(&line.text) {
            Some((key, value)) => {
                table.insert(key.to_string(), value.to_string());
            }
            None => out.push(line),
        }
    }
    if table.is_empty() {
        return Ok(out);
    }

    let mut keys: Vec<&String> = table.keys().collect();
    keys.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
    let alternation = keys
        .iter()
        .map(|k| regex::escape(k))
        .collect::<Vec<_>>()
        .join("|");
    let re = Regex::new(&format!(r"\b(?:{alternation})\b"))?;

    for line in &mut out {
        if !re.is_match(&line.text) {
            continue;
        }
        let replaced = re.replace_all(&line.text, |caps: &regex::Captures<'_>| {
            table.get(&caps[0]).cloned().unwrap_or_else(|| caps[0].to_string())
        });
        line.text = replaced.into_owned();
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{join_text, split_source};

    fn run(src: &str) -> String {
        join_text(&resolve_constants(split_source(src, "main.mush")).expect("constants"))
    }

    #[test]
    fn declarations_are_removed_and_keys_replaced() {
        assert_eq!(run("#const VALUE = 123\n&VAR obj = VALUE"), "&VAR obj = 123");
        assert_eq!(run("#const FOO = bar\n#const BAZ = qux\nsay FOO BAZ"), "say bar qux");
    }

    #[test]
    fn only_whole_words_are_replaced() {
        assert_eq!(run("#const BAT = 1\nsay WOMBAT BAT"), "say WOMBAT 1");
        assert_eq!(run("#const COLOR = %ch%cg\nsay COLORHello COLOR"), "say COLORHello %ch%cg");
        assert_eq!(run("#const MY_VAR = 100\nsay MY_VAR"), "say 100");
    }

    #[test]
    fn later_declarations_win_and_apply_everywhere() {
        assert_eq!(run("say A\n#const A = 1\n#const A = 2"), "say 2");
    }

    #[test]
    fn values_are_not_rescanned() {
        assert_eq!(run("#const A = B\n#const B = C\nsay A B"), "say B C");
    }

    #[test]
    fn malformed_declarations_pass_through() {
        assert_eq!(run("#const = 1\n#const K-X = 2\n#const K ="), "#const = 1\n#const K-X = 2\n#const K =");
    }
}
