#![no_main]

use libfuzzer_sys::fuzz_target;
use mformc::lint::{self, LintOptions};
use mformc::source;

fuzz_target!(|data: &[u8]| {
    let data = if data.len() > 64 * 1024 {
        &data[..64 * 1024]
    } else {
        data
    };
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };

    let report = lint::lint_lines(&source::split_source(text, "fuzz.mush"), &LintOptions::default());
    assert_eq!(report.ok, report.errors().next().is_none());
});
