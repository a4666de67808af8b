//! Integration tests for expressions, statements and closures

use pretty_assertions::assert_eq;

use plume_core::testutil::{eval_error, eval_expr, eval_rule};
use plume_core::Val;

fn ints(values: &[i64]) -> Val {
    Val::list(values.iter().copied().map(Val::Int).collect())
}

#[test]
fn test_arithmetic_and_precedence() {
    assert_eq!(eval_expr("1 + 2 * 3").unwrap(), Val::Int(7));
    assert_eq!(eval_expr("(1 + 2) * 3").unwrap(), Val::Int(9));
    assert_eq!(eval_expr("7 / 2").unwrap(), Val::Int(3));
    assert_eq!(eval_expr("7 % 3").unwrap(), Val::Int(1));
    assert_eq!(eval_expr("7.0 / 2").unwrap(), Val::Real(3.5));
    assert_eq!(eval_expr("-2 * -3").unwrap(), Val::Int(6));
}

#[test]
fn test_power_is_right_associative() {
    assert_eq!(eval_expr("2 ** 3 ** 2").unwrap(), Val::Int(512));
    assert_eq!(eval_expr("2 ** -1").unwrap(), Val::Real(0.5));
}

#[test]
fn test_integer_overflow_wraps() {
    assert_eq!(
        eval_expr("9223372036854775807 + 1").unwrap(),
        Val::Int(i64::MIN)
    );
}

#[test]
fn test_int_real_equality_promotes() {
    assert_eq!(eval_expr("1 == 1.0").unwrap(), Val::Bool(true));
    assert_eq!(eval_expr(r#"1 == "1""#).unwrap(), Val::Bool(false));
    assert_eq!(eval_expr("[1, 2] == [1, 2]").unwrap(), Val::Bool(true));
}

#[test]
fn test_truthiness() {
    let source = r#"
        main {
            let falsy = [null, false, 0, 0.0, "", [], {}];
            let truthy = [true, 1, -1, 0.5, "0", [0], {a: null}];
            [falsy.any(fn (v) { v }), truthy.all(fn (v) { v })]
        }
    "#;
    assert_eq!(
        eval_rule(source, "main").unwrap(),
        Val::list(vec![Val::Bool(false), Val::Bool(true)])
    );
}

#[test]
fn test_logical_operators_short_circuit() {
    let source = r#"
        main {
            let hits = [];
            fn touch(v) { hits.push(v); v }
            let a = touch(0) && touch(1);
            let b = touch(2) || touch(3);
            [a, b, hits]
        }
    "#;
    assert_eq!(
        eval_rule(source, "main").unwrap(),
        Val::list(vec![Val::Int(0), Val::Int(2), ints(&[0, 2])])
    );
}

#[test]
fn test_string_concatenation_and_interpolation() {
    assert_eq!(eval_expr(r#""ab" + "cd""#).unwrap(), Val::string("abcd"));
    let source = r#"
        main {
            let user = {name: "ann", roles: ["admin"]};
            "{{ user.name }} has {{ user.roles.len() }} role(s), first {{ user.roles[0] }}"
        }
    "#;
    assert_eq!(
        eval_rule(source, "main").unwrap(),
        Val::string("ann has 1 role(s), first admin")
    );
}

#[test]
fn test_if_elif_else_is_an_expression() {
    let source = r#"
        fn grade(n) {
            if n >= 90 { "a" } elif n >= 80 { "b" } else { "c" }
        }
        main { [grade(95), grade(85), grade(10)] }
    "#;
    assert_eq!(
        eval_rule(source, "main").unwrap(),
        Val::list(vec![Val::string("a"), Val::string("b"), Val::string("c")])
    );
    assert_eq!(eval_expr("if false { 1 }").unwrap(), Val::Null);
}

#[test]
fn test_ternary_and_postfix_if() {
    assert_eq!(eval_expr("1 < 2 ? \"yes\" : \"no\"").unwrap(), Val::string("yes"));
    assert_eq!(eval_expr("\"big\" if 10 > 5 else \"small\"").unwrap(), Val::string("big"));
    assert_eq!(eval_expr("\"big\" if 1 > 5").unwrap(), Val::Null);
}

#[test]
fn test_let_and_compound_assignment() {
    let source = r"
        main {
            let x = 10;
            x += 5;
            x -= 3;
            x *= 2;
            x /= 4;
            x %= 4;
            x
        }
    ";
    assert_eq!(eval_rule(source, "main").unwrap(), Val::Int(2));
    assert_eq!(eval_expr("let y; y").unwrap(), Val::Null);
}

#[test]
fn test_field_and_index_assignment() {
    let source = r#"
        main {
            let m = {count: 1};
            m.count += 1;
            m["tag"] = "x";
            let l = [1, 2, 3];
            l[0] = 10;
            l[-1] *= 3;
            l[5] = 6;
            [m, l]
        }
    "#;
    let expected = Val::list(vec![
        Val::map([("count", Val::Int(2)), ("tag", Val::string("x"))]),
        Val::list(vec![
            Val::Int(10),
            Val::Int(2),
            Val::Int(9),
            Val::Null,
            Val::Null,
            Val::Int(6),
        ]),
    ]);
    assert_eq!(eval_rule(source, "main").unwrap(), expected);
}

#[test]
fn test_indexing_edges() {
    assert_eq!(eval_expr("[1, 2, 3][-1]").unwrap(), Val::Int(3));
    assert_eq!(eval_expr("[1, 2, 3][7]").unwrap(), Val::Null);
    assert_eq!(eval_expr(r#""héllo"[1]"#).unwrap(), Val::string("é"));
    assert_eq!(eval_expr(r#"{a: 1}["b"]"#).unwrap(), Val::Null);
    assert_eq!(eval_expr("(1, 2)[1]").unwrap(), Val::Int(2));
}

#[test]
fn test_containers_alias() {
    let source = r"
        main {
            let a = [1];
            let b = a;
            b.push(2);
            a
        }
    ";
    assert_eq!(eval_rule(source, "main").unwrap(), ints(&[1, 2]));
}

#[test]
fn test_pairs() {
    assert_eq!(eval_expr("(1, \"a\").first").unwrap(), Val::Int(1));
    assert_eq!(eval_expr("(1, \"a\").second").unwrap(), Val::string("a"));
    assert_eq!(
        eval_expr("(1, 2).swap()").unwrap(),
        Val::pair(Val::Int(2), Val::Int(1))
    );
}

#[test]
fn test_while_with_break_and_continue() {
    let source = r"
        main {
            let i = 0;
            let odd = [];
            while true {
                i += 1;
                if i > 9 { break; }
                if i % 2 == 0 { continue; }
                odd.push(i);
            }
            odd
        }
    ";
    assert_eq!(eval_rule(source, "main").unwrap(), ints(&[1, 3, 5, 7, 9]));
}

#[test]
fn test_for_over_lists_maps_and_strings() {
    let source = r#"
        main {
            let out = [];
            for v in [1, 2] { out.push(v); }
            for i, v in ["x", "y"] { out.push(i); }
            for k, v in {b: 2, a: 1} { out.push(k + "=" + to_str(v)); }
            for c in "hi" { out.push(c); }
            for k, v in (7, 8) { out.push(v); }
            out
        }
    "#;
    let expected = Val::list(vec![
        Val::Int(1),
        Val::Int(2),
        Val::Int(0),
        Val::Int(1),
        Val::string("a=1"),
        Val::string("b=2"),
        Val::string("h"),
        Val::string("i"),
        Val::Int(7),
        Val::Int(8),
    ]);
    assert_eq!(eval_rule(source, "main").unwrap(), expected);
}

#[test]
fn test_map_mutation_during_iteration_is_detected() {
    let source = r#"
        main {
            let m = {a: 1, b: 2};
            for k, v in m { m["c"] = 3; }
        }
    "#;
    let err = eval_rule(source, "main").unwrap_err();
    assert!(err.contains("map modified during iteration"), "{err}");
}

#[test]
fn test_closures_capture_by_reference() {
    let source = r"
        fn counter() {
            let n = 0;
            fn () { n += 1; n }
        }
        main {
            let a = counter();
            let b = counter();
            a();
            a();
            [a(), b()]
        }
    ";
    assert_eq!(eval_rule(source, "main").unwrap(), ints(&[3, 1]));
}

#[test]
fn test_nested_closures_outlive_their_frames() {
    let source = r"
        fn foo(x) {
            let a = 1;
            let b = 2;
            let c = 3;
            fn () { fn () { a + b + c + x } }
        }
        main { foo(10)()() }
    ";
    assert_eq!(eval_rule(source, "main").unwrap(), Val::Int(16));

    let source = r"
        fn foo(x) {
            let a = 1;
            let b = 2;
            let c = 3;
            fn () {
                a += 100;
                fn () { a + b + c + x }
            }
        }
        main {
            let outer = foo(10);
            let inner = outer();
            [inner(), outer()()]
        }
    ";
    assert_eq!(eval_rule(source, "main").unwrap(), ints(&[116, 216]));
}

#[test]
fn test_loop_closures_see_their_own_iteration() {
    let source = r"
        main {
            let fs = [];
            for i in [1, 2, 3] {
                let j = i * 10;
                fs.push(fn () { j });
            }
            fs.map(fn (f) { f() })
        }
    ";
    assert_eq!(eval_rule(source, "main").unwrap(), ints(&[10, 20, 30]));
}

#[test]
fn test_recursion() {
    let source = r"
        fn fib(n) { if n < 2 { n } else { fib(n - 1) + fib(n - 2) } }
        main { fib(15) }
    ";
    assert_eq!(eval_rule(source, "main").unwrap(), Val::Int(610));
}

#[test]
fn test_early_return() {
    let source = r"
        fn first_even(xs) {
            for x in xs {
                if x % 2 == 0 { return x; }
            }
            return;
        }
        main { [first_even([3, 5, 6, 8]), first_even([1])] }
    ";
    assert_eq!(
        eval_rule(source, "main").unwrap(),
        Val::list(vec![Val::Int(6), Val::Null])
    );
}

#[test]
fn test_try_else_binds_the_message() {
    assert_eq!(eval_expr("try 1 / 0 else -1").unwrap(), Val::Int(-1));
    assert_eq!(
        eval_expr(r#"try { error("boom"); } else let e { "caught " + e }"#).unwrap(),
        Val::string("caught boom")
    );
    assert_eq!(eval_expr("try 5 else 0").unwrap(), Val::Int(5));
}

#[test]
fn test_try_unwinds_nested_calls() {
    let source = r#"
        fn deep(n) { if n == 0 { error("bottom") } else { deep(n - 1) } }
        main {
            let r = try deep(5) else let e { e };
            [r, deep(0) if false else "after"]
        }
    "#;
    assert_eq!(
        eval_rule(source, "main").unwrap(),
        Val::list(vec![Val::string("bottom"), Val::string("after")])
    );
}

#[test]
fn test_regex_operators() {
    assert_eq!(eval_expr(r#""abc123" =~ r"\d+""#).unwrap(), Val::Bool(true));
    assert_eq!(eval_expr(r#""abc" !~ r"\d""#).unwrap(), Val::Bool(true));
    assert_eq!(eval_expr(r#""a.c" =~ "a\\.c""#).unwrap(), Val::Bool(true));
}

#[test]
fn test_method_closures() {
    let source = r#"
        main {
            let up = "abc".upper;
            up()
        }
    "#;
    assert_eq!(eval_rule(source, "main").unwrap(), Val::string("ABC"));
}

#[test]
fn test_map_methods_prefer_stored_closures() {
    let source = r"
        main {
            let obj = {len: fn () { 99 }, size: 1};
            [obj.len(), {a: 1, b: 2}.len()]
        }
    ";
    assert_eq!(eval_rule(source, "main").unwrap(), ints(&[99, 2]));
}

#[test]
fn test_intrinsic_references_are_values() {
    assert_eq!(
        eval_expr(r#"["a", "b"].map(str::upper)"#).unwrap(),
        Val::list(vec![Val::string("A"), Val::string("B")])
    );
}

#[test]
fn test_nested_blocks_yield_values() {
    assert_eq!(eval_expr("let a = { let b = 2; b * 3 }; a").unwrap(), Val::Int(6));
    assert_eq!(eval_expr("{}").unwrap(), Val::Null);
}

#[test]
fn test_runtime_error_messages() {
    assert_eq!(eval_error("1 / 0").unwrap(), "divide by zero");
    assert_eq!(
        eval_error(r#"1 + "a""#).unwrap(),
        "unsupported operand types for +: int and string"
    );
    assert_eq!(eval_error("null()").unwrap(), "null is not callable");
    assert_eq!(eval_error("for x in 3 { }").unwrap(), "int is not iterable");
    assert_eq!(eval_error("nope(1)").unwrap(), "undefined function 'nope'");
    assert_eq!(eval_error("missing").unwrap(), "undefined variable 'missing'");
}

#[test]
fn test_self_containing_list_prints() {
    assert_eq!(
        eval_expr("let l = [1]; l[0] = l; to_str(l)").unwrap(),
        Val::string("[[...]]")
    );
    assert_eq!(
        eval_expr("let m = {}; m.me = m; to_str(m)").unwrap(),
        Val::string(r#"{"me": {...}}"#)
    );
}

#[test]
fn test_oversized_index_write_is_catchable() {
    let source = r#"
        main {
            let l = [];
            let r = try { l[9223372036854775807] = 1; } else let e { e };
            [r, len(l)]
        }
    "#;
    assert_eq!(
        eval_rule(source, "main").unwrap(),
        Val::list(vec![
            Val::string("index 9223372036854775807 out of range for length 0"),
            Val::Int(0),
        ])
    );
}

#[test]
fn test_brackets_after_a_block_start_a_new_expression() {
    let source = r"
        main {
            let f = fn (x) { x + 1 };
            let called = (if true { f } else { f })(1);
            if called > 0 { null }
            [called, 3]
        }
    ";
    assert_eq!(eval_rule(source, "main").unwrap(), ints(&[2, 3]));
}
