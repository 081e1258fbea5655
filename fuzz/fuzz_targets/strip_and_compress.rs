#![no_main]

use libfuzzer_sys::fuzz_target;
use mformc::compile::CompileOptions;
use mformc::context::CompilationContext;
use mformc::{compress, source};

fuzz_target!(|data: &[u8]| {
    let data = if data.len() > 64 * 1024 {
        &data[..64 * 1024]
    } else {
        data
    };
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };

    let lines = source::split_source(text, "fuzz.mush");
    let stripped = compress::strip_comments(&lines);
    for line in &stripped {
        assert!(!line.text.trim().is_empty());
    }

    let mut ctx = CompilationContext::new(&CompileOptions::default());
    ctx.lines = lines;
    compress::compress(&mut ctx, 200);
});
