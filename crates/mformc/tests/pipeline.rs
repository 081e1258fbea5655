use mformc::compile::{self, CompileErrorKind, CompileOptions};
use mformc::source::Header;

fn compile_text(src: &str) -> compile::CompileOutput {
    compile::compile(src, &CompileOptions::default()).expect("compile")
}

#[test]
fn constants_resolve_before_templates() {
    let out = compile_text("#const MAX = 2\n#for i in range(1, MAX) {\nsay {{i}}\n}");
    assert_eq!(out.output, "say 1\nsay 2");
    assert!(!out.output.contains("#const"));
    assert!(!out.output.contains("#for"));
    assert!(out.report.ok);
}

#[test]
fn combined_output_is_the_resolved_source() {
    let out = compile_text("#author Jane\n// note\nsay hi");
    assert_eq!(out.combined, "// note\nsay hi");
    assert_eq!(out.output, "say hi");
    assert_eq!(out.headers, vec![Header::new("author", "Jane")]);
}

#[test]
fn oversized_assignment_splits_into_linked_commands() {
    let src = format!("&DESC obj={}", "A".repeat(8100));
    let out = compile_text(&src);
    let lines: Vec<&str> = out.output.lines().collect();
    assert!(lines.len() >= 2);
    assert!(lines[0].chars().count() <= 8000);
    assert!(lines[1].starts_with("@wait 0=&DESC obj=[get(obj/DESC)]"));
    assert_eq!(out.lines[1].line, 1);
}

#[test]
fn safe_limit_is_configurable() {
    let options = CompileOptions {
        safe_limit: 500,
        ..CompileOptions::default()
    };
    let src = format!("&LONG me={}", "x".repeat(1200));
    let out = compile::compile(&src, &options).expect("compile");
    assert!(out.lines.len() >= 3);
    assert!(out.lines.iter().all(|l| l.text.chars().count() <= 500));
}

#[test]
fn comments_are_stripped_and_continuations_joined() {
    let out = compile_text("&A me=1 // note\n/* block */\n&B me=[add(1,\n  2)]\n## dropped\n@@ kept // as is");
    assert_eq!(out.output, "&A me=1\n&B me=[add(1,2)]\n@@ kept // as is");
}

#[test]
fn defines_expand_with_arguments() {
    let out = compile_text("@define @greet {\n@pemit $1=Hello, $2!\n}\n@greet(%#, world)\n@greet(me)");
    assert_eq!(out.output, "@pemit %#=Hello, world!\n@pemit me=Hello, !");
}

#[test]
fn configured_defines_apply_without_source_definitions() {
    let options = CompileOptions {
        defines: vec![("@hello".to_string(), "@pemit %#=Hello!".to_string())],
        ..CompileOptions::default()
    };
    let out = compile::compile("&CMD me=$hi:@hello", &options).expect("compile");
    assert_eq!(out.output, "&CMD me=$hi:@pemit %#=Hello!");
}

#[test]
fn header_and_footer_directives_are_collected() {
    let out = compile_text("#version 1.2\n#header Name = Widget\n#footer Done = yes\n&A me=1");
    assert_eq!(out.output, "&A me=1");
    assert_eq!(
        out.headers,
        vec![Header::new("version", "1.2"), Header::new("Name", "Widget")]
    );
    assert_eq!(out.footers, vec![Header::new("Done", "yes")]);
}

#[test]
fn debug_directive_enables_debug_blocks() {
    let src = "#debug {\nsay dbg\n}\nsay always";
    assert_eq!(compile_text(src).output, "say always");
    assert_eq!(compile_text(&format!("@debug\n{src}")).output, "say dbg\nsay always");
}

#[test]
fn failed_conditions_degrade_to_warnings() {
    let out = compile_text("#if (NOPE) {\nsay x\n}\nsay y");
    assert_eq!(out.output, "say y");
    assert!(out.report.ok);
    assert_eq!(out.report.warnings().count(), 1);
}

#[test]
fn lint_errors_abort_compilation() {
    let err = compile::compile("say ok\nsay [oops", &CompileOptions::default()).expect_err("lint");
    assert_eq!(err.kind, CompileErrorKind::Lint);
    let codes: Vec<&str> = err.diagnostics.iter().map(|d| d.code.as_str()).collect();
    assert_eq!(codes, ["MF-LINT-0002"]);
    assert_eq!(err.loc.as_ref().map(|l| l.line), Some(2));

    let out = compile::lint_source("say ok\nsay [oops", &CompileOptions::default()).expect("lint");
    assert!(!out.report.ok);
    assert_eq!(out.report.errors().count(), 1);
}

#[test]
fn costly_calls_warn_without_failing() {
    let out = compile_text("&SW me=[switch(%0,1,one,two)]");
    assert!(out.report.ok);
    assert_eq!(out.report.diagnostics[0].code, "MF-LINT-0101");
}

#[test]
fn raw_lines_are_not_macro_expanded() {
    let out = compile_text("@define @two {\nsay 1\nsay 2\n}\n@@ usage: @two here\n@two");
    assert_eq!(out.output, "@@ usage: @two here\nsay 1\nsay 2");
}

#[test]
fn file_wrapped_text_keeps_trigger_words() {
    let dir = tempfile::tempdir().expect("tempdir");
    std::fs::write(dir.path().join("notes.txt"), "call @two to run").expect("write");
    let main = dir.path().join("main.mush");
    std::fs::write(&main, "@define @two {\nsay 1\nsay 2\n}\n#file notes.txt").expect("write");
    let out = compile::compile(&main.display().to_string(), &CompileOptions::default()).expect("compile");
    assert_eq!(
        out.output,
        "@@ ==== begin notes.txt ====\n@@ call @two to run\n@@ ==== end notes.txt ===="
    );
}

#[test]
fn delayed_assignments_split_with_the_same_delay() {
    let src = format!("@wait 5=&DESC obj={}", "A".repeat(8100));
    let out = compile_text(&src);
    assert!(out.lines.len() >= 2);
    assert!(out.lines[0].text.starts_with("@wait 5=&DESC obj=A"));
    assert!(out.lines[1].text.starts_with("@wait 5=&DESC obj=[get(obj/DESC)]A"));
}

#[test]
fn test_blocks_become_self_checks() {
    let out = compile_text("@test \"Math Test\" {\n  [add(1, 2)]\n} expect {\n  3\n}");
    assert_eq!(
        out.output,
        "think [setq(0, [add(1, 2)])][setq(1, 3)][ifelse(strmatch(%q0, %q1), ansi(gh, PASS: Math Test), ansi(rh, FAIL: Math Test: Expected '%q1' but got '%q0'))]"
    );
    assert_eq!(out.lines[0].line, 1);
    assert!(out.report.ok);
}
