pub fn builtin_module_source(module_id: &str) -> Option<&'static str> {
    match module_id {
        "colors" => Some(include_str!("../../../stdlib/std/colors.mush")),
        "lists" => Some(include_str!("../../../stdlib/std/lists.mush")),
        "strings" => Some(include_str!("../../../stdlib/std/strings.mush")),
        _ => None,
    }
}

pub fn builtin_module_ids() -> &'static [&'static str] {
    &["colors", "lists", "strings"]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_listed_module_has_source() {
        for id in builtin_module_ids() {
            let src = builtin_module_source(id).expect("builtin module");
            assert!(src.contains("&FN_"), "{id} defines no attributes");
        }
        assert!(builtin_module_source("missing").is_none());
    }
}
