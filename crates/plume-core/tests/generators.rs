//! Integration tests for iterator programs and lazy iteration

use pretty_assertions::assert_eq;

use plume_core::testutil::{compile, eval_rule};
use plume_core::{Evaluator, Val};

fn ints(values: &[i64]) -> Val {
    Val::list(values.iter().copied().map(Val::Int).collect())
}

#[test]
fn test_generator_yields_in_order() {
    let source = r"
        iter count(n) {
            let i = 0;
            while i < n {
                yield i;
                i += 1;
            }
        }
        main {
            let out = [];
            for v in count(4) { out.push(v); }
            out
        }
    ";
    assert_eq!(eval_rule(source, "main").unwrap(), ints(&[0, 1, 2, 3]));
}

#[test]
fn test_keyed_yield() {
    let source = r#"
        iter labelled(xs) {
            for x in xs {
                yield "k" + to_str(x), x * x;
            }
        }
        main {
            let out = {};
            for k, v in labelled([2, 3]) { out[k] = v; }
            out
        }
    "#;
    assert_eq!(
        eval_rule(source, "main").unwrap(),
        Val::map([("k2", Val::Int(4)), ("k3", Val::Int(9))])
    );
}

#[test]
fn test_unkeyed_yields_are_numbered() {
    let source = r#"
        iter letters() { yield "a"; yield "b"; }
        main {
            let keys = [];
            for k, v in letters() { keys.push(k); }
            keys
        }
    "#;
    assert_eq!(eval_rule(source, "main").unwrap(), ints(&[0, 1]));
}

#[test]
fn test_generators_are_lazy() {
    let source = r"
        iter naturals() {
            let n = 0;
            while true { yield n; n += 1; }
        }
        main {
            let out = [];
            for v in naturals() {
                if v > 4 { break; }
                out.push(v);
            }
            out
        }
    ";
    assert_eq!(eval_rule(source, "main").unwrap(), ints(&[0, 1, 2, 3, 4]));
}

#[test]
fn test_generator_resumes_where_it_left_off() {
    let source = r"
        iter count(n) {
            let i = 0;
            while i < n { yield i; i += 1; }
        }
        main {
            let it = count(5);
            let first = [];
            for v in it {
                first.push(v);
                if v == 1 { break; }
            }
            let rest = [];
            for v in it { rest.push(v); }
            [first, rest]
        }
    ";
    assert_eq!(
        eval_rule(source, "main").unwrap(),
        Val::list(vec![ints(&[0, 1]), ints(&[2, 3, 4])])
    );
}

#[test]
fn test_independent_generators_keep_separate_state() {
    let source = r"
        iter count(n) {
            let i = 0;
            while i < n { yield i; i += 1; }
        }
        main {
            let pairs = [];
            for a in count(2) {
                for b in count(2) { pairs.push(a * 10 + b); }
            }
            pairs
        }
    ";
    assert_eq!(eval_rule(source, "main").unwrap(), ints(&[0, 1, 10, 11]));
}

#[test]
fn test_anonymous_iterators_capture() {
    let source = r"
        main {
            let step = 3;
            let gen = iter () {
                let v = 0;
                while v < 10 { yield v; v += step; }
            };
            let out = [];
            for v in gen { out.push(v); }
            out
        }
    ";
    assert_eq!(eval_rule(source, "main").unwrap(), ints(&[0, 3, 6, 9]));
}

#[test]
fn test_nested_iterator_closures_see_updates() {
    let source = r"
        main {
            let seen = [];
            iter watch() {
                yield 1;
                seen.push(len(seen));
                yield 2;
            }
            for v in watch() { seen.push(v); }
            seen
        }
    ";
    assert_eq!(eval_rule(source, "main").unwrap(), ints(&[1, 1, 2]));
}

#[test]
fn test_generator_calls_functions_between_yields() {
    let source = r"
        fn square(x) { x * x }
        iter squares(xs) {
            for x in xs { yield square(x); }
        }
        main {
            let out = [];
            for v in squares([1, 2, 3]) { out.push(v); }
            out
        }
    ";
    assert_eq!(eval_rule(source, "main").unwrap(), ints(&[1, 4, 9]));
}

#[test]
fn test_generator_errors_propagate_to_the_loop() {
    let source = r#"
        iter failing() {
            yield 1;
            error("generator broke");
        }
        main {
            let got = [];
            let message = try {
                for v in failing() { got.push(v); }
                "finished"
            } else let e { e };
            [got, message]
        }
    "#;
    assert_eq!(
        eval_rule(source, "main").unwrap(),
        Val::list(vec![ints(&[1]), Val::string("generator broke")])
    );
}

#[test]
fn test_host_driven_iteration() {
    let module = compile(
        r"
        iter evens(limit) {
            let n = 0;
            while n <= limit { yield n; n += 2; }
        }
        ",
    )
    .unwrap();
    let mut eval = Evaluator::new(module);
    let Val::Iter(iter) = eval.call("evens", &[Val::Int(4)]).unwrap() else {
        panic!("expected an iterator");
    };
    let mut values = Vec::new();
    while eval.iter_has(&iter).unwrap() {
        let (_, value) = eval.iter_next(&iter).unwrap().unwrap();
        values.push(value);
    }
    assert_eq!(values, vec![Val::Int(0), Val::Int(2), Val::Int(4)]);
    assert_eq!(eval.iter_next(&iter).unwrap(), None);
}

#[test]
fn test_iterator_arity_is_checked() {
    let module = compile("iter pair_up(a, b) { yield a; yield b; }").unwrap();
    let mut eval = Evaluator::new(module);
    let err = eval.call("pair_up", &[Val::Int(1)]).unwrap_err();
    assert_eq!(err.message(), "pair_up: expected 2 arguments, got 1");
}

#[test]
fn test_generator_shares_captured_locals_across_yields() {
    let source = r"
        iter bumps() {
            let n = 0;
            let bump = fn() { n = n + 1; n };
            while n < 3 {
                yield bump();
            }
        }
        main {
            let out = [];
            for v in bumps() {
                out.push(v);
                if len(out) == 6 { break; }
            }
            out
        }
    ";
    assert_eq!(eval_rule(source, "main").unwrap(), ints(&[1, 2, 3]));
}

#[test]
fn test_escaped_closure_updates_a_suspended_generator() {
    let source = r"
        iter ticks() {
            let n = 0;
            yield fn() { n += 1; n };
            yield n;
        }
        main {
            let out = [];
            let tick = null;
            for k, v in ticks() {
                if k == 0 {
                    tick = v;
                    v();
                    v();
                } else {
                    out.push(v);
                }
            }
            out.push(tick());
            out
        }
    ";
    assert_eq!(eval_rule(source, "main").unwrap(), ints(&[2, 3]));
}
