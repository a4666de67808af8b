//! Unqualified builtins: conversions, containers, `bind`, `dprint` and the
//! two regex predicates every module can call

use std::sync::Arc;

use super::Registry;
use crate::bytecode::{Closure, Iter, Val};
use crate::proto::Args;
use crate::vm::{ops, Evaluator, RuntimeError, RuntimeResult};

pub(super) fn register(registry: &mut Registry) {
    registry.add("len", "(%s%l%m%p)", len);
    registry.add("type", "%a", type_of);
    registry.add("to_str", "%a", to_str);
    registry.add("to_int", "%a", to_int);
    registry.add("to_real", "%a", to_real);
    registry.add("to_bool", "%a", to_bool);
    registry.add("error", "%a", error);
    registry.add("range", "{%d}{%d%d}{%d%d%d}", range);
    registry.add("keys", "%m", keys);
    registry.add("values", "%m", values);
    registry.add("has", "{%m%a}{%l%a}", has);
    registry.add("bind", "{%c}{%c%a*}", bind);
    registry.add("dprint", "{%0}{%a*}", dprint);
    registry.add("regexp_match", "%s(%s%r)", regexp_match);
    registry.add("regexp_contain", "%s(%s%r)", regexp_contain);
}

/// len(string | list | map | pair) -> int
///
/// Strings count characters, pairs always have two elements.
fn len(_: &mut Evaluator, args: Args<'_>) -> RuntimeResult<Val> {
    let n = match args.get(0) {
        Val::Str(s) => s.chars().count(),
        Val::List(l) => l.read().len(),
        Val::Map(m) => m.read().len(),
        Val::Pair(_) => 2,
        other => return Err(RuntimeError::type_error("len", "string, list, map or pair", other.type_name())),
    };
    Ok(Val::Int(n as i64))
}

fn type_of(_: &mut Evaluator, args: Args<'_>) -> RuntimeResult<Val> {
    Ok(Val::string(args.get(0).type_name()))
}

fn to_str(_: &mut Evaluator, args: Args<'_>) -> RuntimeResult<Val> {
    match args.get(0) {
        s @ Val::Str(_) => Ok(s.clone()),
        other => other.to_display_string().map(Val::string),
    }
}

fn to_int(_: &mut Evaluator, args: Args<'_>) -> RuntimeResult<Val> {
    args.get(0).to_int().map(Val::Int)
}

fn to_real(_: &mut Evaluator, args: Args<'_>) -> RuntimeResult<Val> {
    args.get(0).to_real().map(Val::Real)
}

fn to_bool(_: &mut Evaluator, args: Args<'_>) -> RuntimeResult<Val> {
    Ok(Val::Bool(args.get(0).is_truthy()))
}

/// error(message) never returns; `try` handlers see the message verbatim
fn error(_: &mut Evaluator, args: Args<'_>) -> RuntimeResult<Val> {
    Err(RuntimeError::user(args.get(0).to_display_string()?))
}

/// range(end) | range(start, end) | range(start, end, step) -> iter
fn range(_: &mut Evaluator, args: Args<'_>) -> RuntimeResult<Val> {
    let (start, end) = if args.len() == 1 {
        (0, args.int(0)?)
    } else {
        (args.int(0)?, args.int(1)?)
    };
    let step = args.int_or(2, 1)?;
    if step == 0 {
        return Err(RuntimeError::invalid("range: step must not be zero"));
    }
    Ok(Val::iter(Iter::range(start, end, step)))
}

fn keys(_: &mut Evaluator, args: Args<'_>) -> RuntimeResult<Val> {
    let keys = args.map(0)?.read().keys();
    Ok(Val::list(keys.into_iter().map(Val::string).collect()))
}

fn values(_: &mut Evaluator, args: Args<'_>) -> RuntimeResult<Val> {
    Ok(Val::list(args.map(0)?.read().values()))
}

/// has(map, key) | has(list, value) -> bool
fn has(_: &mut Evaluator, args: Args<'_>) -> RuntimeResult<Val> {
    let found = match args.get(0) {
        Val::Map(m) => {
            let key = args.get(1).to_key()?;
            m.read().contains_key(&key)
        }
        Val::List(l) => l.read().contains(args.get(1)),
        other => return Err(RuntimeError::type_error("has", "map or list", other.type_name())),
    };
    Ok(Val::Bool(found))
}

/// bind(f, args...) -> closure
///
/// Every `_` among the bound arguments takes the next argument supplied at
/// call time, left to right; leftover call arguments are appended.
fn bind(_: &mut Evaluator, args: Args<'_>) -> RuntimeResult<Val> {
    let callee = args.get(0).clone();
    let bound = args.rest(1).to_vec();
    let label = match &callee {
        Val::Closure(c) => format!("bind({})", c.name()),
        _ => "bind".to_string(),
    };
    let closure = Closure::native(label, move |eval, supplied| {
        let mut supplied = supplied.iter();
        let mut call_args = Vec::with_capacity(bound.len() + supplied.len());
        for arg in &bound {
            if arg.is_placeholder() {
                let Some(value) = supplied.next() else {
                    return Err(RuntimeError::invalid("bind: missing argument for placeholder"));
                };
                call_args.push(value.clone());
            } else {
                call_args.push(arg.clone());
            }
        }
        call_args.extend(supplied.cloned());
        eval.call_value(&callee, &call_args)
    });
    Ok(Val::Closure(Arc::new(closure)))
}

/// dprint(values...) writes a debug line to stderr
#[allow(clippy::print_stderr)]
fn dprint(_: &mut Evaluator, args: Args<'_>) -> RuntimeResult<Val> {
    let parts = args
        .values()
        .iter()
        .map(Val::to_display_string)
        .collect::<RuntimeResult<Vec<_>>>()?;
    eprintln!("{}", parts.join(" "));
    Ok(Val::Null)
}

/// regexp_match(subject, pattern) -> bool, the whole subject must match
fn regexp_match(_: &mut Evaluator, args: Args<'_>) -> RuntimeResult<Val> {
    let subject = args.str(0)?;
    let pattern = args.regex(1)?;
    let anchored = ops::compile_regex(&format!("^(?:{})$", pattern.as_str()))?;
    Ok(Val::Bool(anchored.is_match(subject)))
}

/// regexp_contain(subject, pattern) -> bool, a match anywhere suffices
fn regexp_contain(_: &mut Evaluator, args: Args<'_>) -> RuntimeResult<Val> {
    Ok(Val::Bool(args.regex(1)?.is_match(args.str(0)?)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::{Module, Placeholder};
    use crate::natives::lookup;

    fn call(name: &str, args: &[Val]) -> RuntimeResult<Val> {
        let mut eval = Evaluator::new(Arc::new(Module::new("t")));
        lookup(name).unwrap().invoke(&mut eval, args)
    }

    #[test]
    fn len_counts_characters() {
        assert_eq!(call("len", &[Val::string("héllo")]).unwrap(), Val::Int(5));
        assert_eq!(call("len", &[Val::pair(Val::Null, Val::Null)]).unwrap(), Val::Int(2));
        assert!(call("len", &[Val::Int(1)]).is_err());
    }

    #[test]
    fn conversions() {
        assert_eq!(call("to_int", &[Val::string(" 0x1f ")]).unwrap(), Val::Int(31));
        assert_eq!(call("to_real", &[Val::Int(2)]).unwrap(), Val::Real(2.0));
        assert_eq!(call("to_bool", &[Val::string("")]).unwrap(), Val::Bool(false));
        assert_eq!(call("to_str", &[Val::Real(1.0)]).unwrap(), Val::string("1.0"));
        assert_eq!(call("type", &[Val::empty_map()]).unwrap(), Val::string("map"));
    }

    #[test]
    fn error_carries_message() {
        let err = call("error", &[Val::string("boom")]).unwrap_err();
        assert_eq!(err.message(), "boom");
    }

    #[test]
    fn range_rejects_zero_step() {
        assert!(matches!(call("range", &[Val::Int(3)]).unwrap(), Val::Iter(_)));
        let err = call("range", &[Val::Int(0), Val::Int(3), Val::Int(0)]).unwrap_err();
        assert_eq!(err.message(), "range: step must not be zero");
    }

    #[test]
    fn has_on_maps_and_lists() {
        let map = Val::map([("1", Val::Null)]);
        assert_eq!(call("has", &[map, Val::Int(1)]).unwrap(), Val::Bool(true));
        let list = Val::list(vec![Val::Int(1), Val::Int(2)]);
        assert_eq!(call("has", &[list, Val::Real(2.0)]).unwrap(), Val::Bool(true));
    }

    #[test]
    fn bind_fills_placeholders_in_order() {
        let mut eval = Evaluator::new(Arc::new(Module::new("t")));
        let collect = Val::Closure(Arc::new(Closure::native("collect", |_, args| Ok(Val::list(args.to_vec())))));
        let placeholder = Val::usr(Placeholder);
        let bound = lookup("bind")
            .unwrap()
            .invoke(
                &mut eval,
                &[collect, placeholder.clone(), Val::Int(2), placeholder],
            )
            .unwrap();
        let result = eval.call_value(&bound, &[Val::Int(1), Val::Int(3), Val::Int(4)]).unwrap();
        assert_eq!(
            result,
            Val::list(vec![Val::Int(1), Val::Int(2), Val::Int(3), Val::Int(4)])
        );
        let err = eval.call_value(&bound, &[Val::Int(1)]).unwrap_err();
        assert_eq!(err.message(), "bind: missing argument for placeholder");
    }

    #[test]
    fn regexp_predicates() {
        let subject = Val::string("abc123");
        assert_eq!(call("regexp_contain", &[subject.clone(), Val::string(r"\d+")]).unwrap(), Val::Bool(true));
        assert_eq!(call("regexp_match", &[subject.clone(), Val::string(r"\d+")]).unwrap(), Val::Bool(false));
        assert_eq!(call("regexp_match", &[subject, Val::string(r"[a-c]+\d+")]).unwrap(), Val::Bool(true));
        assert!(call("regexp_contain", &[Val::string("x"), Val::string("(")]).is_err());
    }
}
