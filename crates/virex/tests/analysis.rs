//! Semantic analysis behavior, driven through the public string-in API.

use virex::{compile_source_to_c, ErrorReporter};

fn compile(source: &str) -> (Option<String>, ErrorReporter) {
    let mut reporter = ErrorReporter::quiet();
    let c = compile_source_to_c(source, "main.vx", false, &mut reporter);
    (c, reporter)
}

fn compile_strict(source: &str) -> (Option<String>, ErrorReporter) {
    let mut reporter = ErrorReporter::quiet();
    let c = compile_source_to_c(source, "main.vx", true, &mut reporter);
    (c, reporter)
}

fn assert_compiles(source: &str) -> String {
    let (c, reporter) = compile(source);
    match c {
        Some(c) => c,
        None => panic!("expected success, got:\n{}", reporter.rendered()),
    }
}

fn assert_error(source: &str, needle: &str) {
    let (c, reporter) = compile(source);
    assert!(c.is_none(), "expected a compile error containing {needle:?}");
    let rendered = reporter.rendered();
    assert!(
        rendered.contains(needle),
        "missing {needle:?} in diagnostics:\n{rendered}"
    );
}

#[test]
fn exhaustive_enum_match_compiles() {
    assert_compiles(
        "enum Color { Red, Green, Blue };\n\
         func f(Color c) -> i32 {\n\
             match c {\n\
                 Red => { return 1; }\n\
                 Green => { return 2; }\n\
                 Blue => { return 3; }\n\
             }\n\
         }",
    );
}

#[test]
fn missing_enum_arm_is_non_exhaustive() {
    assert_error(
        "enum Color { Red, Green, Blue };\n\
         func f(Color c) -> i32 {\n\
             match c {\n\
                 Red => { return 1; }\n\
                 Green => { return 2; }\n\
             }\n\
         }",
        "non-exhaustive patterns: enum variant 'Blue' not covered",
    );
}

#[test]
fn wildcard_covers_remaining_variants() {
    assert_compiles(
        "enum Color { Red, Green, Blue };\n\
         func f(Color c) -> i32 {\n\
             match c {\n\
                 Red => { return 1; }\n\
                 _ => { return 0; }\n\
             }\n\
         }",
    );
}

#[test]
fn unknown_enum_variant_in_pattern() {
    assert_error(
        "enum Color { Red, Green };\n\
         func f(Color c) {\n\
             match c {\n\
                 Purple => { }\n\
                 _ => { }\n\
             }\n\
         }",
        "invalid pattern variant 'Purple' for enum",
    );
}

#[test]
fn result_match_requires_both_arms() {
    assert_error(
        "func f() {\n\
             var result<i32, i32> r = result::ok(1);\n\
             match r {\n\
                 ok(v) => { }\n\
             }\n\
         }",
        "result match must handle 'ok' and 'err'",
    );
}

#[test]
fn match_requires_result_or_enum() {
    assert_error(
        "func f(i32 x) { match x { ok(v) => { } } }",
        "match expression must be a result or enum type",
    );
}

#[test]
fn generic_inference_succeeds_for_uniform_arguments() {
    let c = assert_compiles(
        "func max<T>(T a, T b) -> T {\n\
             if (a > b) { return a; }\n\
             return b;\n\
         }\n\
         func main() -> i32 {\n\
             var i32 m = max(1, 2);\n\
             return m;\n\
         }",
    );
    assert!(c.contains("main__max_i32"), "specialized copy missing:\n{c}");
}

#[test]
fn generic_inference_fails_on_conflicting_captures() {
    assert_error(
        "func max<T>(T a, T b) -> T {\n\
             if (a > b) { return a; }\n\
             return b;\n\
         }\n\
         func main() -> i32 {\n\
             var i32 m = max(1, true);\n\
             return m;\n\
         }",
        "cannot infer generic type arguments",
    );
}

#[test]
fn explicit_generic_argument_count_is_enforced() {
    assert_error(
        "func max<T>(T a, T b) -> T {\n\
             if (a > b) { return a; }\n\
             return b;\n\
         }\n\
         func main() -> i32 {\n\
             return max<i32, i64>(1, 2);\n\
         }",
        "expected 1 generic arguments, got 2",
    );
}

#[test]
fn nullable_deref_requires_unsafe() {
    assert_error(
        "func f() -> i32 {\n\
             var i32* p = null;\n\
             var i32 x = *p;\n\
             return x;\n\
         }",
        "dereferencing nullable pointer requires unsafe block",
    );
}

#[test]
fn unsafe_block_permits_nullable_deref() {
    let (c, reporter) = compile(
        "func f() -> i32 {\n\
             var i32* p = null;\n\
             var i32 x = 0;\n\
             unsafe { x = *p; }\n\
             return x;\n\
         }",
    );
    assert!(c.is_some(), "expected success, got:\n{}", reporter.rendered());
    // The block consumed an unsafe operation, so no warning either.
    assert!(!reporter.rendered().contains("unnecessary unsafe block"));
}

#[test]
fn unnecessary_unsafe_is_a_warning_by_default() {
    let (c, reporter) = compile("func f() { unsafe { var i32 x = 1; } }");
    assert!(c.is_some());
    assert_eq!(reporter.error_count(), 0);
    assert!(reporter.rendered().contains("unnecessary unsafe block"));
}

#[test]
fn unnecessary_unsafe_is_an_error_in_strict_mode() {
    let (c, reporter) = compile_strict("func f() { unsafe { var i32 x = 1; } }");
    assert!(c.is_none());
    assert!(reporter.rendered().contains("unnecessary unsafe block (strict mode)"));
}

#[test]
fn inner_unsafe_usage_satisfies_the_outer_block() {
    let (c, reporter) = compile_strict(
        "func f() -> i32 {\n\
             var i32* p = null;\n\
             var i32 x = 0;\n\
             unsafe { unsafe { x = *p; } }\n\
             return x;\n\
         }",
    );
    // The inner block consumed the operation; the outer one must not be
    // reported as unnecessary.
    assert!(c.is_some(), "expected success, got:\n{}", reporter.rendered());
}

#[test]
fn pointer_arithmetic_requires_unsafe() {
    assert_error(
        "func f(i32* p) -> i32* {\n\
             var i32* q = p + 1;\n\
             return q;\n\
         }",
        "pointer arithmetic requires unsafe block",
    );
}

#[test]
fn extern_variadic_call_requires_unsafe_outside_whitelist() {
    assert_error(
        "extern func my_ffi(i32 x) -> i32;\n\
         func f() -> i32 { return my_ffi(1); }",
        "call to extern/variadic function requires unsafe block",
    );
}

#[test]
fn undefined_variable_gets_a_suggestion() {
    let (c, reporter) = compile(
        "var i32 counter = 0;\n\
         func f() -> i32 { return countr; }",
    );
    assert!(c.is_none());
    let rendered = reporter.rendered();
    assert!(rendered.contains("error[E0002]: undefined variable 'countr'"), "{rendered}");
    assert!(rendered.contains("did you mean 'counter'?"), "{rendered}");
}

#[test]
fn missing_return_in_non_void_function() {
    let (c, reporter) = compile(
        "func f(bool b) -> i32 {\n\
             if (b) { return 1; }\n\
         }",
    );
    assert!(c.is_none());
    assert!(reporter.rendered().contains("error[E0003]: missing return statement"));
}

#[test]
fn if_with_both_returning_branches_satisfies_return_paths() {
    assert_compiles(
        "func f(bool b) -> i32 {\n\
             if (b) { return 1; } else { return 2; }\n\
         }",
    );
}

#[test]
fn unreachable_code_is_reported() {
    let (c, reporter) = compile(
        "func f() -> i32 {\n\
             return 1;\n\
             var i32 x = 2;\n\
         }",
    );
    assert!(c.is_none());
    assert!(reporter.rendered().contains("error[E0004]: unreachable code detected"));
}

#[test]
fn redefinition_in_same_scope_is_rejected() {
    let (c, reporter) = compile(
        "func f() {\n\
             var i32 x = 1;\n\
             var i32 x = 2;\n\
         }",
    );
    assert!(c.is_none());
    assert!(reporter.rendered().contains("error[E0006]: redefinition of 'x'"));
}

#[test]
fn shadowing_in_nested_scope_is_allowed() {
    assert_compiles(
        "func f() -> i32 {\n\
             var i32 x = 1;\n\
             { var i32 x = 2; }\n\
             return x;\n\
         }",
    );
}

#[test]
fn integer_literals_widen_to_i64() {
    assert_compiles("func f() -> i64 { var i64 x = 1; return x; }");
}

#[test]
fn integer_literal_does_not_flow_into_f32() {
    assert_error("func f() { var f32 x = 1; }", "initializer type mismatch");
}

#[test]
fn break_outside_loop_is_rejected() {
    assert_error("func f() { break; }", "break statement outside of loop");
}

#[test]
fn continue_outside_loop_is_rejected() {
    assert_error("func f() { continue; }", "continue statement outside of loop");
}

#[test]
fn non_null_pointer_flows_into_nullable_parameter() {
    assert_compiles(
        "func take(i32* p) { }\n\
         func f() {\n\
             var i32 x = 1;\n\
             take(&x);\n\
         }",
    );
}

#[test]
fn nullable_pointer_is_rejected_where_non_null_expected() {
    assert_error(
        "func take(i32*! p) { }\n\
         func f(i32* q) { take(q); }",
        "argument 1 type mismatch",
    );
}

#[test]
fn void_function_cannot_return_a_value() {
    assert_error("func f() { return 1; }", "void function cannot return a value");
}

#[test]
fn non_void_return_needs_a_value() {
    assert_error("func f() -> i32 { return; }", "non-void function must return a value");
}

#[test]
fn return_type_mismatch_names_both_types() {
    assert_error(
        "func f() -> bool { return \"nope\"; }",
        "return type mismatch: expected 'bool', got '[]u8'",
    );
}

#[test]
fn global_initializer_type_is_checked() {
    assert_error(
        "var i32 g = true;",
        "global variable initializer type mismatch",
    );
}

#[test]
fn argument_count_is_exact_for_non_variadic() {
    assert_error(
        "func add(i32 a, i32 b) -> i32 { return a + b; }\n\
         func f() -> i32 { return add(1); }",
        "expected 2 arguments, got 1",
    );
}

#[test]
fn duplicate_type_declarations_are_rejected() {
    assert_error(
        "struct Point { i32 x; };\nstruct Point { i32 y; };",
        "duplicate declaration of struct 'Point'",
    );
}

#[test]
fn condition_must_be_bool() {
    assert_error("func f() { if (1) { } }", "if condition must be bool");
    assert_error("func f() { while (1) { } }", "while condition must be bool");
}

#[test]
fn arrow_requires_pointer() {
    assert_error(
        "struct Point { i32 x; };\n\
         func f(Point p) -> i32 { return p->x; }",
        "arrow operator requires pointer type",
    );
}

#[test]
fn slice_members_are_len_and_data() {
    assert_compiles(
        "func f([]i32 xs) -> i64 { return xs.len; }",
    );
    assert_error(
        "func f([]i32 xs) -> i64 { return xs.size; }",
        "slice has no member 'size'",
    );
}

#[test]
fn constant_array_index_is_bounds_checked() {
    assert_error(
        "func f([4]i32 a) -> i32 { return a[4]; }",
        "array index 4 out of bounds (size 4)",
    );
}
