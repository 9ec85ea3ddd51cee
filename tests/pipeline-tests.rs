mod common;
use common::run_pipeline;

#[test]
fn minimal() {
    run_pipeline(include_str!("../demos/minimal.sae"));
}

#[test]
fn language_tour() {
    run_pipeline(include_str!("../demos/language-tour.sae"));
}

#[test]
fn factorial() {
    let code = run_pipeline(include_str!("../demos/factorial.sae"));

    // the if expression ends up as one evaluator invocation inside a return
    assert!(code.contains("return __SAEC_IF("));
    assert!(code.contains("int32_t factorial(const int32_t nr)"));
    assert!(code.contains("int main()"));
}

#[test]
fn defer_and_block_expressions() {
    let code = run_pipeline(include_str!("../demos/defer.sae"));

    assert!(code.contains("__SAEC_DEFER({ printf(\"this should run last\\n\"); });"));
    assert!(code.contains("__SAEC_BLOCK_EXPR({"));
    assert!(code.contains("__SAEC_TAKE 1;"));
}

#[test]
fn structs() {
    let code = run_pipeline(include_str!("../demos/structs.sae"));

    assert!(code.contains("struct Point : Entity {"));
    assert!(code.contains("const Point p = Point { .x = 1, .y = 2 };"));
}

#[test]
fn native_code() {
    let code = run_pipeline(include_str!("../demos/native.sae"));

    assert!(code.contains("int sum(int a, int b)"));
}

#[test]
fn prelude_comes_first_and_only_once() {
    let code = run_pipeline(include_str!("../demos/language-tour.sae"));

    assert!(code.starts_with("#ifndef __SAEC_PRELUDE"));
    assert_eq!(code.matches("struct __SAEC_DEFERRED").count(), 1);
}

#[test]
fn lowering_is_deterministic() {
    let source = include_str!("../demos/language-tour.sae");
    assert_eq!(run_pipeline(source), run_pipeline(source));
}
