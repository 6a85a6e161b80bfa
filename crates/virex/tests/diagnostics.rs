//! Diagnostic rendering and the IR dump surface.

use std::fs;

use virex::{cgen, compile_source_to_c, ErrorReporter, Project};

#[test]
fn errors_render_with_location_snippet_and_caret() {
    let dir = std::env::temp_dir().join(format!("virex_diag_{}", std::process::id()));
    let _ = fs::remove_dir_all(&dir);
    fs::create_dir_all(&dir).expect("scratch dir");
    let file = dir.join("main.vx");
    fs::write(&file, "func f() -> i32 { return x; }\n").expect("write source");

    let mut reporter = ErrorReporter::quiet();
    let result = virex::compile_file_to_c(&file.display().to_string(), false, &mut reporter);
    assert!(result.is_err());

    let rendered = reporter.rendered();
    assert!(rendered.contains("error[E0002]: undefined variable 'x'"), "{rendered}");
    assert!(rendered.contains("--> "), "{rendered}");
    assert!(rendered.contains(":1:"), "{rendered}");
    assert!(rendered.contains("func f() -> i32 { return x; }"), "snippet missing:\n{rendered}");
    assert!(rendered.contains("^~~~"), "caret missing:\n{rendered}");
    assert!(rendered.contains("help:"), "{rendered}");
}

#[test]
fn warnings_do_not_fail_the_build() {
    let mut reporter = ErrorReporter::quiet();
    let c = compile_source_to_c(
        "func f() { unsafe { var i32 x = 1; } }",
        "main.vx",
        false,
        &mut reporter,
    );
    assert!(c.is_some());
    assert_eq!(reporter.error_count(), 0);
    assert!(reporter.rendered().contains("warning"));
}

#[test]
fn lowered_ir_serializes_to_json() {
    let mut reporter = ErrorReporter::quiet();
    let mut project = Project::from_source(
        "func add(i32 a, i32 b) -> i32 { return a + b; }",
        "main.vx",
        &mut reporter,
    )
    .expect("parse");
    assert!(project.analyze(&mut reporter), "{}", reporter.rendered());

    let lowered = cgen::lower_project(&project);
    let json = serde_json::to_string_pretty(&lowered).expect("serialize IR");
    assert!(json.contains("main__add"), "{json}");
    assert!(json.contains("\"Return\""), "{json}");

    // And the dump round-trips.
    let parsed: Vec<(String, virex::ir::IrModule)> = serde_json::from_str(&json).expect("deserialize IR");
    assert_eq!(parsed.len(), 1);
    assert_eq!(parsed[0].1.functions[0].name, "main__add");
}

#[test]
fn ir_invariants_hold_after_optimization() {
    let mut reporter = ErrorReporter::quiet();
    let mut project = Project::from_source(
        "func f(bool b) -> i32 {\n\
             var i32 sum = 0;\n\
             for (var i32 i = 0; i < 10; i = i + 1) {\n\
                 if (b) { sum = sum + i; } else { sum = sum + 2 * 3; }\n\
             }\n\
             return sum;\n\
         }",
        "main.vx",
        &mut reporter,
    )
    .expect("parse");
    assert!(project.analyze(&mut reporter), "{}", reporter.rendered());

    for (_, ir) in cgen::lower_project(&project) {
        for func in &ir.functions {
            func.validate().unwrap_or_else(|err| panic!("invariant broken: {err}"));
        }
    }
}
