//! Script-level tests for the intrinsic library

use pretty_assertions::assert_eq;

use plume_core::testutil::{eval_error, eval_expr, eval_rule};
use plume_core::Val;

fn s(v: &str) -> Val {
    Val::string(v)
}

fn ints(values: &[i64]) -> Val {
    Val::list(values.iter().copied().map(Val::Int).collect())
}

#[test]
fn test_string_methods_chain() {
    assert_eq!(
        eval_expr(r#""  Hello, World  ".trim().lower().replace("world", "plume")"#).unwrap(),
        s("hello, plume")
    );
    assert_eq!(
        eval_expr(r#""a,b,,c".split(",")"#).unwrap(),
        Val::list(vec![s("a"), s("b"), s(""), s("c")])
    );
    assert_eq!(eval_expr(r#""7".pad_start(3, "0")"#).unwrap(), s("007"));
    assert_eq!(eval_expr(r#"str::format("{} of {}", 2, "three")"#).unwrap(), s("2 of three"));
    assert_eq!(eval_expr(r#""héllo".sub(1, 3)"#).unwrap(), s("él"));
    assert_eq!(eval_expr(r#""policy".starts_with("pol")"#).unwrap(), Val::Bool(true));
}

#[test]
fn test_list_pipeline() {
    let source = r#"
        main {
            let xs = [5, 3, 8, 1];
            let evens = xs.map(fn (x) { x * 2 }).filter(fn (x) { x > 6 });
            let total = xs.reduce(fn (acc, x) { acc + x }, 0);
            xs.sort();
            [evens, total, xs, xs.slice(1, -1), xs.index_of(8), xs.join("-")]
        }
    "#;
    let expected = Val::list(vec![
        ints(&[10, 16]),
        Val::Int(17),
        ints(&[1, 3, 5, 8]),
        ints(&[3, 5]),
        Val::Int(3),
        s("1-3-5-8"),
    ]);
    assert_eq!(eval_rule(source, "main").unwrap(), expected);
}

#[test]
fn test_list_sort_with_comparator() {
    let source = r#"
        main {
            let users = [{name: "bo", age: 30}, {name: "al", age: 25}];
            users.sort(fn (a, b) { a.age - b.age });
            users.map(fn (u) { u.name })
        }
    "#;
    assert_eq!(eval_rule(source, "main").unwrap(), Val::list(vec![s("al"), s("bo")]));
}

#[test]
fn test_map_helpers() {
    let source = r#"
        main {
            let m = {b: 2, a: 1};
            let merged = map::merge(m, {c: 3, a: 10});
            [m.keys(), m.get("z", 0), merged, map::from_pairs([("x", 1), ["y", 2]]), has(m, "a")]
        }
    "#;
    let expected = Val::list(vec![
        Val::list(vec![s("a"), s("b")]),
        Val::Int(0),
        Val::map([("a", Val::Int(10)), ("b", Val::Int(2)), ("c", Val::Int(3))]),
        Val::map([("x", Val::Int(1)), ("y", Val::Int(2))]),
        Val::Bool(true),
    ]);
    assert_eq!(eval_rule(source, "main").unwrap(), expected);
}

#[test]
fn test_map_items_are_pairs() {
    let source = r#"
        main {
            let out = [];
            for item in {a: 1, b: 2}.items() { out.push(item.first + to_str(item.second)); }
            out
        }
    "#;
    assert_eq!(eval_rule(source, "main").unwrap(), Val::list(vec![s("a1"), s("b2")]));
}

#[test]
fn test_math() {
    assert_eq!(eval_expr("math::max(3, 9.5, -1)").unwrap(), Val::Real(9.5));
    assert_eq!(eval_expr("math::clamp(15, 0, 10)").unwrap(), Val::Int(10));
    assert_eq!(eval_expr("math::sqrt(16)").unwrap(), Val::Real(4.0));
    assert_eq!(eval_expr("math::floor(2.7)").unwrap(), Val::Int(2));
    assert_eq!(
        eval_error("math::sqrt(-1)").unwrap(),
        "math::sqrt: expected (non-negative real), got (int)"
    );
}

#[test]
fn test_range_is_iterable() {
    let source = r"
        main {
            let out = [];
            for i in range(3) { out.push(i); }
            for i in range(10, 0, -4) { out.push(i); }
            out
        }
    ";
    assert_eq!(eval_rule(source, "main").unwrap(), ints(&[0, 1, 2, 10, 6, 2]));
}

#[test]
fn test_conversions() {
    assert_eq!(eval_expr(r#"to_int("42") + to_real("0.5")"#).unwrap(), Val::Real(42.5));
    assert_eq!(eval_expr("type((1, 2))").unwrap(), s("pair"));
    assert_eq!(eval_expr("to_str([1, \"a\"])").unwrap(), s("[1, \"a\"]"));
    assert_eq!(eval_expr(r#"len("héllo")"#).unwrap(), Val::Int(5));
}

#[test]
fn test_codecs() {
    assert_eq!(eval_expr(r#"codec::base64_encode("hello")"#).unwrap(), s("aGVsbG8="));
    assert_eq!(eval_expr(r#"codec::base64_decode("aGVsbG8=")"#).unwrap(), s("hello"));
    assert_eq!(eval_expr(r#"codec::url_encode("a b&c")"#).unwrap(), s("a%20b%26c"));
    assert_eq!(eval_expr(r#"codec::hex_encode("hi")"#).unwrap(), s("6869"));
    assert_eq!(
        eval_expr(r#"codec::sha256("abc")"#).unwrap(),
        s("ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad")
    );
    assert_eq!(
        eval_expr(r#"codec::md5("abc")"#).unwrap(),
        s("900150983cd24fb0d6963f7d28e17f72")
    );
}

#[test]
fn test_json_round_trip_through_scripts() {
    let source = r#"
        main {
            let doc = codec::json_decode("{\"user\": {\"id\": 7, \"tags\": [\"a\"]}}");
            [doc.user.id, doc.user.tags[0], codec::json_encode({b: [1, null], a: true})]
        }
    "#;
    let expected = Val::list(vec![Val::Int(7), s("a"), s(r#"{"a":true,"b":[1,null]}"#)]);
    assert_eq!(eval_rule(source, "main").unwrap(), expected);
}

#[test]
fn test_time() {
    // 2024-02-29T12:30:05Z
    assert_eq!(
        eval_expr("time::format(1709209805)").unwrap(),
        s("2024-02-29T12:30:05+00:00")
    );
    assert_eq!(
        eval_expr(r#"time::parse("2024-02-29T12:30:05Z")"#).unwrap(),
        Val::Int(1_709_209_805)
    );
    assert_eq!(eval_expr("time::weekday(time::make(2024, 2, 29))").unwrap(), s("Thursday"));
    assert_eq!(eval_expr("time::date(0).year").unwrap(), Val::Int(1970));
}

#[test]
fn test_regexp_module() {
    let source = r#"
        main {
            let re = regexp::compile("(?P<key>\\w+)=(?P<value>\\d+)");
            [
                regexp::find_all("a=1 b=2", re),
                regexp::named("x=42", re).value,
                regexp::replace_all("a=1 b=2", re, "$key"),
                regexp_match("abc", "[a-c]+"),
                regexp_contain("xxabcxx", "abc"),
            ]
        }
    "#;
    let expected = Val::list(vec![
        Val::list(vec![s("a=1"), s("b=2")]),
        s("42"),
        s("a b"),
        Val::Bool(true),
        Val::Bool(true),
    ]);
    assert_eq!(eval_rule(source, "main").unwrap(), expected);
    assert!(eval_error(r#"regexp::compile("(")"#).unwrap().starts_with("invalid regex: "));
}

#[test]
fn test_random_stays_in_bounds() {
    let source = r"
        main {
            let ok = true;
            for i in range(50) {
                let n = random::int(1, 3);
                ok = ok && n >= 1 && n <= 3;
            }
            [ok, len(random::hex(4)), len(random::uuid()), [1, 2, 3].contains(random::choice([1, 2, 3]))]
        }
    ";
    let expected = Val::list(vec![Val::Bool(true), Val::Int(8), Val::Int(36), Val::Bool(true)]);
    assert_eq!(eval_rule(source, "main").unwrap(), expected);
}

#[test]
fn test_bind_with_placeholders() {
    let source = r"
        fn sub(a, b) { a - b }
        main {
            let from_ten = bind(sub, 10, _);
            let minus_one = bind(sub, _, 1);
            [from_ten(3), minus_one(3)]
        }
    ";
    assert_eq!(eval_rule(source, "main").unwrap(), ints(&[7, 2]));
}

#[test]
fn test_assertions() {
    assert_eq!(eval_expr("assert::eq(1 + 1, 2)").unwrap(), Val::Null);
    assert_eq!(
        eval_error(r#"assert::eq("a", "b")"#).unwrap(),
        r#"assertion failed: "a" != "b""#
    );
    assert_eq!(
        eval_error(r#"assert::truthy([], "list must not be empty")"#).unwrap(),
        "assertion failed: list must not be empty"
    );
    assert_eq!(
        eval_expr(r#"assert::throws(fn () { 1 / 0 }, "zero")"#).unwrap(),
        s("divide by zero")
    );
    assert_eq!(
        eval_error("assert::throws(fn () { 1 })").unwrap(),
        "assertion failed: expected an error, got 1"
    );
}

#[test]
fn test_plain_templates() {
    let source = r#"
        main {
            let user = {name: "ann", groups: ["ops", "dev"]};
            template "plain", user, "{{ name }} in {{ groups.1 }}"
        }
    "#;
    assert_eq!(eval_rule(source, "main").unwrap(), s("ann in dev"));

    let strict = r#"main { template "plain[strict]", {}, "{{ missing }}" }"#;
    let err = eval_rule(strict, "main").unwrap_err();
    assert!(err.contains("missing value for 'missing'"), "{err}");
}
