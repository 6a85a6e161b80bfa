//! Shape of the emitted C translation unit.

use virex::{compile_source_to_c, ErrorReporter};

fn emit(source: &str) -> String {
    let mut reporter = ErrorReporter::quiet();
    match compile_source_to_c(source, "main.vx", false, &mut reporter) {
        Some(c) => c,
        None => panic!("expected success, got:\n{}", reporter.rendered()),
    }
}

fn count_occurrences(haystack: &str, needle: &str) -> usize {
    haystack.matches(needle).count()
}

#[test]
fn counting_loop_is_rewritten_to_for() {
    let c = emit(
        "func f() -> i32 {\n\
             var i32 sum = 0;\n\
             for (var i32 i = 0; i < 100; i = i + 1) {\n\
                 sum = sum + i;\n\
             }\n\
             return sum;\n\
         }",
    );
    assert!(c.contains("#pragma GCC ivdep"), "missing vectorization hint:\n{c}");
    assert!(c.contains("__builtin_expect("), "missing branch hint:\n{c}");
    assert!(c.contains("+= 1)"), "missing increment clause:\n{c}");
    // The label/goto skeleton must be gone for the recognized loop.
    assert!(!c.contains("goto L0;"), "loop was not rewritten:\n{c}");
}

#[test]
fn mismatched_increment_variable_falls_back_to_goto() {
    let c = emit(
        "func f() -> i32 {\n\
             var i32 j = 0;\n\
             for (var i32 i = 0; i < 100; j = j + 1) {\n\
                 j = j + 2;\n\
             }\n\
             return j;\n\
         }",
    );
    assert!(!c.contains("#pragma GCC ivdep"), "loop should not be recognized:\n{c}");
    assert!(c.contains("goto"), "fallback skeleton missing:\n{c}");
}

#[test]
fn nested_counting_loops_both_become_for() {
    let c = emit(
        "func f() -> i32 {\n\
             var i32 sum = 0;\n\
             for (var i32 i = 0; i < 10; i = i + 1) {\n\
                 for (var i32 j = 0; j < 10; j = j + 1) {\n\
                     sum = sum + j;\n\
                 }\n\
             }\n\
             return sum;\n\
         }",
    );
    assert_eq!(count_occurrences(&c, "#pragma GCC ivdep"), 2, "{c}");
}

#[test]
fn generic_struct_monomorphizes_exactly_once() {
    let c = emit(
        "struct Pair<A, B> { A a; B b; };\n\
         func f() -> i32 {\n\
             var Pair<i32, i64> p;\n\
             var Pair<i32, i64> q;\n\
             p.a = 1;\n\
             return p.a;\n\
         }",
    );
    assert_eq!(count_occurrences(&c, "struct Pair_i32_i64 {"), 1, "{c}");
    assert!(c.contains("int32_t a;"), "{c}");
    assert!(c.contains("long long b;"), "{c}");
    // The generic template itself must not be emitted.
    assert!(!c.contains("struct main__Pair {"), "{c}");
}

#[test]
fn generic_function_emits_one_specialized_copy() {
    let c = emit(
        "func max<T>(T a, T b) -> T {\n\
             if (a > b) { return a; }\n\
             return b;\n\
         }\n\
         func main() -> i32 {\n\
             var i32 x = max(1, 2);\n\
             var i32 y = max(3, 4);\n\
             return x + y;\n\
         }",
    );
    // One definition plus one forward declaration.
    assert_eq!(count_occurrences(&c, "int32_t main__max_i32("), 2, "{c}");
    assert!(c.contains("main__max_i32(1, 2)"), "{c}");
}

#[test]
fn slice_structs_are_materialized_per_element_type() {
    let c = emit("func f([]i32 xs) -> i64 { return xs.len; }");
    assert!(c.contains("struct Slice_uint8_t {"), "[]u8 must always exist:\n{c}");
    assert!(c.contains("struct Slice_int32_t {"), "{c}");
    assert!(c.contains("struct Slice_int32_t xs_v0"), "{c}");
}

#[test]
fn string_literals_become_slice_compound_literals() {
    let c = emit("func f() -> []u8 { return \"hi\"; }");
    assert!(
        c.contains("(struct Slice_uint8_t){ .data = (uint8_t*)\"hi\", .len = 2 }"),
        "{c}"
    );
}

#[test]
fn packed_structs_carry_the_attribute() {
    let c = emit("packed struct Header { u8 tag; u32 len; };");
    assert!(c.contains("__attribute__((packed))"), "{c}");
}

#[test]
fn result_match_reads_the_tag_through_a_boxed_cast() {
    let c = emit(
        "func f() -> i32 {\n\
             var result<i32, void> r = result::ok(5);\n\
             match r {\n\
                 ok(v) => { return 1; }\n\
                 err(e) => { return 2; }\n\
             }\n\
         }",
    );
    assert!(c.contains("virex_result_ok"), "{c}");
    assert!(c.contains("((struct Result*)"), "{c}");
    assert!(c.contains("->is_ok"), "{c}");
    assert!(c.contains("->data.ok_val"), "{c}");
}

#[test]
fn enums_are_emitted_under_mangled_names() {
    let c = emit(
        "enum Color { Red, Green, Blue };\n\
         func f(Color c) -> i32 {\n\
             match c {\n\
                 Red => { return 1; }\n\
                 _ => { return 0; }\n\
             }\n\
         }",
    );
    assert!(c.contains("enum main__Color {"), "{c}");
    assert!(c.contains("Red,"), "{c}");
}

#[test]
fn header_functions_are_not_redeclared() {
    let c = emit(
        "extern func printf(cstring fmt, ...) -> c_int;\n\
         extern func my_ffi(i32 x) -> i32;\n\
         func f() -> i32 { unsafe { return my_ffi(1); } }",
    );
    assert!(!c.contains("int printf(const char*"), "{c}");
    assert!(c.contains("int32_t my_ffi(int32_t);"), "{c}");
}

#[test]
fn globals_are_mangled_and_initialized() {
    let c = emit("var i32 counter = 5;");
    assert!(c.contains("int32_t main__counter = 5;"), "{c}");
}

#[test]
fn pointer_parameters_get_restrict() {
    let c = emit("func f(i32* p) { }");
    assert!(c.contains("int32_t* restrict p_v0"), "{c}");
}

#[test]
fn for_in_loops_lower_through_slices() {
    let c = emit(
        "func f([]i32 xs) -> i64 {\n\
             var i64 sum = 0;\n\
             for (var i32 x in xs) {\n\
                 sum = sum + cast<i64>(x);\n\
             }\n\
             return sum;\n\
         }",
    );
    assert!(c.contains(".len"), "{c}");
    assert!(c.contains(".data"), "{c}");
    assert!(c.contains("(long long)"), "cast emission missing:\n{c}");
}

#[test]
fn i64_maps_to_long_long_and_bool_to_int() {
    let c = emit("func f(i64 a, bool b) -> i64 { return a; }");
    assert!(c.contains("long long f") || c.contains("long long main__f"), "{c}");
    assert!(c.contains("long long a_v0"), "{c}");
    assert!(c.contains("int b_v1"), "{c}");
}

#[test]
fn fixed_header_and_result_struct_come_first() {
    let c = emit("func f() { }");
    let stdio = c.find("#include <stdio.h>").unwrap();
    let stdint = c.find("#include <stdint.h>").unwrap();
    let result = c.find("struct Result {").unwrap();
    let slices = c.find("struct Slice_uint8_t {").unwrap();
    assert!(stdio < stdint && stdint < result && result < slices, "{c}");
}

#[test]
fn module_banner_precedes_function_bodies() {
    let c = emit("func f() { }");
    assert!(c.contains("/* Module: main */"), "{c}");
}

#[test]
fn division_by_zero_literal_is_preserved() {
    let c = emit("func f() -> i32 { return 10 / 0; }");
    // Folding must leave the division intact.
    assert!(c.contains("10 / 0"), "{c}");
}

#[test]
fn constant_expressions_fold() {
    let c = emit("func f() -> i32 { return 2 + 3; }");
    assert!(!c.contains("2 + 3"), "constant addition survived:\n{c}");
    assert!(c.contains("= 5;") || c.contains("return 5;"), "{c}");
}
