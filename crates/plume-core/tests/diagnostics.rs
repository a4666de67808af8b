//! Golden tests for compile diagnostics and runtime traces

use std::sync::Arc;

use pretty_assertions::assert_eq;

use plume_core::lexer::Location;
use plume_core::{compile_module, compile_module_named, CompileErrorKind, Evaluator};

fn compile_error(source: &str) -> (Location, String) {
    let err = compile_module(source).unwrap_err();
    (err.location, err.message())
}

#[test]
fn test_single_line_rendering() {
    let err = compile_module("main { let x = 1 + ; }").unwrap_err();
    assert_eq!(
        err.to_string(),
        "1:20: expected expression, found ';'\n 1 | main { let x = 1 + ; }\n   |                    ^"
    );
}

#[test]
fn test_snippet_keeps_at_most_two_lines_of_context() {
    let err = compile_module("main {\n1;\n2;\n3;\n4 +;\n}").unwrap_err();
    assert_eq!(err.location, Location::new(5, 4));
    assert_eq!(
        err.to_string(),
        "5:4: expected expression, found ';'\n 3 | 2;\n 4 | 3;\n 5 | 4 +;\n   |    ^"
    );
}

#[test]
fn test_lexical_errors() {
    let (at, message) = compile_error("main { \"open }");
    assert_eq!(at, Location::new(1, 8));
    assert_eq!(message, "unterminated string literal");

    let (at, message) = compile_error("main {\n  1 ~ 2\n}");
    assert_eq!(at, Location::new(2, 5));
    assert_eq!(message, "unexpected character '~'");
}

#[test]
fn test_syntax_errors() {
    assert_eq!(
        compile_error("main { let = 1; }"),
        (Location::new(1, 12), "unexpected '=', expected identifier".to_string())
    );
    assert_eq!(
        compile_error("main { [1, 2 }"),
        (Location::new(1, 14), "unexpected '}', expected ']'".to_string())
    );
    assert_eq!(
        compile_error("main { 1 = 2; }"),
        (Location::new(1, 10), "invalid assignment target".to_string())
    );
    assert_eq!(
        compile_error("main {"),
        (Location::new(1, 7), "unexpected end of file, expected '}'".to_string())
    );
}

#[test]
fn test_semantic_errors() {
    assert_eq!(
        compile_error("main { str::shout(1) }"),
        (Location::new(1, 8), "unknown intrinsic 'str::shout'".to_string())
    );
    assert_eq!(
        compile_error("main { session::hits }"),
        (Location::new(1, 8), "undeclared session variable 'hits'".to_string())
    );
    assert_eq!(
        compile_error("main { global::limit = 1; }"),
        (Location::new(1, 8), "undeclared global variable 'limit'".to_string())
    );
    assert_eq!(
        compile_error("fn f() {}\nfn f() {}"),
        (Location::new(2, 4), "'f' is already defined".to_string())
    );
    assert_eq!(
        compile_error("config {}\nconfig {}"),
        (Location::new(2, 1), "duplicate config block".to_string())
    );
}

#[test]
fn test_context_errors() {
    let cases = [
        ("main { continue; }", CompileErrorKind::ContinueOutsideLoop),
        ("main { while true { fn f() { break; } } }", CompileErrorKind::BreakOutsideLoop),
        ("main { yield 1; }", CompileErrorKind::YieldOutsideIterator),
        ("iter g() { try { yield 1; } else 0; }", CompileErrorKind::YieldInsideTry),
        ("session { @flag x => 1; }", CompileErrorKind::ConfigOnly("attributes")),
    ];
    for (source, expected) in cases {
        let err = compile_module(source).unwrap_err();
        assert_eq!(err.kind, expected, "{source}");
    }
}

#[test]
fn test_errors_inside_interpolation_point_at_the_string_line() {
    let err = compile_module("main {\n  \"a {{ 1 + }} b\"\n}").unwrap_err();
    assert_eq!(err.location.line, 2);
    assert!(matches!(err.kind, CompileErrorKind::ExpectedExpression(_)));
}

#[test]
fn test_source_names_are_kept() {
    let module = compile_module_named("policy.pl", "main { 1 }").unwrap();
    assert_eq!(module.source_name, "policy.pl");
}

#[test]
fn test_runtime_errors_carry_a_stack_trace() {
    let source = "fn inner(x) {\n    x / 0\n}\nmain {\n    inner(1)\n}";
    let module = Arc::new(compile_module(source).unwrap());
    let err = Evaluator::new(module).eval("main").unwrap_err();
    assert_eq!(err.message(), "divide by zero");
    assert_eq!(
        err.to_string(),
        "divide by zero\n  at inner (line 2)\n  at main (line 5)"
    );
}

#[test]
fn test_uncaught_user_errors_render_like_builtin_ones() {
    let source = "main {\n    error(\"policy violated\")\n}";
    let module = Arc::new(compile_module(source).unwrap());
    let err = Evaluator::new(module).eval("main").unwrap_err();
    assert_eq!(err.to_string(), "policy violated\n  at main (line 2)");
}
