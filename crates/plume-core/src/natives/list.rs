//! `list::*`, also reachable as methods on list values
//!
//! Mutating entries (`push`, `pop`, `insert`, `remove`, `sort`, `clear`)
//! change the list in place; the rest build new lists. Callbacks run on a
//! snapshot, so a callback may modify the list it is iterating.

use std::cmp::Ordering;

use super::Registry;
use crate::bytecode::Val;
use crate::proto::Args;
use crate::vm::{Evaluator, RuntimeError, RuntimeErrorKind, RuntimeResult};

pub(super) fn register(registry: &mut Registry) {
    registry.add("list::len", "%l", len);
    registry.add("list::is_empty", "%l", is_empty);
    registry.add("list::push", "%l%a*", push);
    registry.add("list::pop", "%l", pop);
    registry.add("list::insert", "%l%d%a", insert);
    registry.add("list::remove", "%l%d", remove);
    registry.add("list::clear", "%l", clear);
    registry.add("list::first", "%l", first);
    registry.add("list::last", "%l", last);
    registry.add("list::contains", "%l%a", contains);
    registry.add("list::index_of", "%l%a", index_of);
    registry.add("list::slice", "{%l%d}{%l%d%d}", slice);
    registry.add("list::concat", "%l%l*", concat);
    registry.add("list::reverse", "%l", reverse);
    registry.add("list::join", "{%l}{%l%s}", join);
    registry.add("list::sort", "{%l}{%l%c}", sort);
    registry.add("list::map", "%l%c", map);
    registry.add("list::filter", "%l%c", filter);
    registry.add("list::reduce", "%l%c%a", reduce);
    registry.add("list::any", "%l%c", any);
    registry.add("list::all", "%l%c", all);
}

/// Resolve a possibly negative position, `None` when out of range
fn position(index: i64, length: usize) -> Option<usize> {
    let resolved = if index < 0 { length as i64 + index } else { index };
    usize::try_from(resolved).ok().filter(|i| *i < length)
}

fn out_of_range(index: i64, length: usize) -> RuntimeError {
    RuntimeErrorKind::IndexOutOfRange { index, length }.into()
}

// ============================================================================
// In-place operations
// ============================================================================

fn len(_: &mut Evaluator, args: Args<'_>) -> RuntimeResult<Val> {
    Ok(Val::Int(args.list(0)?.read().len() as i64))
}

fn is_empty(_: &mut Evaluator, args: Args<'_>) -> RuntimeResult<Val> {
    Ok(Val::Bool(args.list(0)?.read().is_empty()))
}

/// list::push(l, values...) -> List, the same list
fn push(_: &mut Evaluator, args: Args<'_>) -> RuntimeResult<Val> {
    args.list(0)?.write().extend_from_slice(args.rest(1));
    Ok(args.get(0).clone())
}

/// list::pop(l) -> Any, null on an empty list
fn pop(_: &mut Evaluator, args: Args<'_>) -> RuntimeResult<Val> {
    Ok(args.list(0)?.write().pop().unwrap_or(Val::Null))
}

/// list::insert(l, index, value) -> List
///
/// `index` may equal the length, which appends.
fn insert(_: &mut Evaluator, args: Args<'_>) -> RuntimeResult<Val> {
    let mut list = args.list(0)?.write();
    let index = args.int(1)?;
    let length = list.len();
    let at = if index == length as i64 {
        length
    } else {
        position(index, length).ok_or_else(|| out_of_range(index, length))?
    };
    list.insert(at, args.get(2).clone());
    drop(list);
    Ok(args.get(0).clone())
}

/// list::remove(l, index) -> Any, the removed element
fn remove(_: &mut Evaluator, args: Args<'_>) -> RuntimeResult<Val> {
    let mut list = args.list(0)?.write();
    let index = args.int(1)?;
    let at = position(index, list.len()).ok_or_else(|| out_of_range(index, list.len()))?;
    Ok(list.remove(at))
}

fn clear(_: &mut Evaluator, args: Args<'_>) -> RuntimeResult<Val> {
    args.list(0)?.write().clear();
    Ok(args.get(0).clone())
}

/// list::sort(l, [compare]) -> List, sorted in place
///
/// Without a comparator the elements must be mutually ordered (numbers,
/// strings or bools). A comparator returns a negative, zero or positive int.
fn sort(eval: &mut Evaluator, args: Args<'_>) -> RuntimeResult<Val> {
    let list = args.list(0)?;
    let mut items = list.read().clone();
    if args.len() > 1 {
        let compare = args.get(1);
        let mut failure = None;
        items.sort_by(|a, b| {
            if failure.is_some() {
                return Ordering::Equal;
            }
            match eval.call_value(compare, &[a.clone(), b.clone()]).and_then(|v| v.to_int()) {
                Ok(n) => n.cmp(&0),
                Err(e) => {
                    failure = Some(e);
                    Ordering::Equal
                }
            }
        });
        if let Some(e) = failure {
            return Err(e);
        }
    } else {
        for pair in items.windows(2) {
            if pair[0].compare(&pair[1]).is_none() {
                return Err(RuntimeErrorKind::InvalidOperands {
                    op: "list::sort",
                    left: pair[0].type_name(),
                    right: pair[1].type_name(),
                }
                .into());
            }
        }
        items.sort_by(|a, b| a.compare(b).unwrap_or(Ordering::Equal));
    }
    *list.write() = items;
    Ok(args.get(0).clone())
}

// ============================================================================
// Queries and copies
// ============================================================================

fn first(_: &mut Evaluator, args: Args<'_>) -> RuntimeResult<Val> {
    Ok(args.list(0)?.read().first().cloned().unwrap_or(Val::Null))
}

fn last(_: &mut Evaluator, args: Args<'_>) -> RuntimeResult<Val> {
    Ok(args.list(0)?.read().last().cloned().unwrap_or(Val::Null))
}

fn contains(_: &mut Evaluator, args: Args<'_>) -> RuntimeResult<Val> {
    Ok(Val::Bool(args.list(0)?.read().contains(args.get(1))))
}

/// list::index_of(l, value) -> Int, -1 when absent
fn index_of(_: &mut Evaluator, args: Args<'_>) -> RuntimeResult<Val> {
    let needle = args.get(1);
    let index = args
        .list(0)?
        .read()
        .iter()
        .position(|v| v == needle)
        .map_or(-1, |i| i as i64);
    Ok(Val::Int(index))
}

/// list::slice(l, start, [end]) -> List, clamped like `str::sub`
fn slice(_: &mut Evaluator, args: Args<'_>) -> RuntimeResult<Val> {
    let list = args.list(0)?.read();
    let length = list.len() as i64;
    let clamp = |i: i64| {
        let i = if i < 0 { length + i } else { i };
        i.clamp(0, length) as usize
    };
    let start = clamp(args.int(1)?);
    let end = clamp(args.int_or(2, length)?);
    let items = if start < end { list[start..end].to_vec() } else { Vec::new() };
    Ok(Val::list(items))
}

fn concat(_: &mut Evaluator, args: Args<'_>) -> RuntimeResult<Val> {
    let mut items = Vec::new();
    for i in 0..args.len() {
        items.extend(args.list(i)?.read().iter().cloned());
    }
    Ok(Val::list(items))
}

fn reverse(_: &mut Evaluator, args: Args<'_>) -> RuntimeResult<Val> {
    let items = args.list(0)?.read().iter().rev().cloned().collect();
    Ok(Val::list(items))
}

/// list::join(l, [sep]) -> String
fn join(_: &mut Evaluator, args: Args<'_>) -> RuntimeResult<Val> {
    let sep = if args.len() > 1 { args.str(1)? } else { "" };
    let parts = args
        .list(0)?
        .read()
        .iter()
        .map(Val::to_display_string)
        .collect::<RuntimeResult<Vec<_>>>()?;
    Ok(Val::string(parts.join(sep)))
}

// ============================================================================
// Higher-order
// ============================================================================

fn snapshot(args: Args<'_>) -> RuntimeResult<Vec<Val>> {
    Ok(args.list(0)?.read().clone())
}

/// list::map(l, f) -> List of `f(element)`
fn map(eval: &mut Evaluator, args: Args<'_>) -> RuntimeResult<Val> {
    let f = args.get(1);
    let mapped = snapshot(args)?
        .into_iter()
        .map(|v| eval.call_value(f, &[v]))
        .collect::<RuntimeResult<Vec<_>>>()?;
    Ok(Val::list(mapped))
}

/// list::filter(l, f) -> List of the elements where `f` is truthy
fn filter(eval: &mut Evaluator, args: Args<'_>) -> RuntimeResult<Val> {
    let f = args.get(1);
    let mut kept = Vec::new();
    for v in snapshot(args)? {
        if eval.call_value(f, std::slice::from_ref(&v))?.is_truthy() {
            kept.push(v);
        }
    }
    Ok(Val::list(kept))
}

/// list::reduce(l, f, init) -> Any, folding `f(acc, element)`
fn reduce(eval: &mut Evaluator, args: Args<'_>) -> RuntimeResult<Val> {
    let f = args.get(1);
    let mut acc = args.get(2).clone();
    for v in snapshot(args)? {
        acc = eval.call_value(f, &[acc, v])?;
    }
    Ok(acc)
}

fn any(eval: &mut Evaluator, args: Args<'_>) -> RuntimeResult<Val> {
    let f = args.get(1);
    for v in snapshot(args)? {
        if eval.call_value(f, &[v])?.is_truthy() {
            return Ok(Val::Bool(true));
        }
    }
    Ok(Val::Bool(false))
}

fn all(eval: &mut Evaluator, args: Args<'_>) -> RuntimeResult<Val> {
    let f = args.get(1);
    for v in snapshot(args)? {
        if !eval.call_value(f, &[v])?.is_truthy() {
            return Ok(Val::Bool(false));
        }
    }
    Ok(Val::Bool(true))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::bytecode::{Closure, Module};
    use crate::natives::lookup;

    fn eval() -> Evaluator {
        Evaluator::new(Arc::new(Module::new("t")))
    }

    fn call(eval: &mut Evaluator, name: &str, args: &[Val]) -> RuntimeResult<Val> {
        lookup(name).unwrap().invoke(eval, args)
    }

    fn ints(values: &[i64]) -> Val {
        Val::list(values.iter().copied().map(Val::Int).collect())
    }

    fn native(f: fn(&[Val]) -> Val) -> Val {
        Val::Closure(Arc::new(Closure::native("f", move |_, args| Ok(f(args)))))
    }

    #[test]
    fn push_and_pop_mutate_in_place() {
        let mut e = eval();
        let list = ints(&[1]);
        call(&mut e, "list::push", &[list.clone(), Val::Int(2), Val::Int(3)]).unwrap();
        assert_eq!(list, ints(&[1, 2, 3]));
        assert_eq!(call(&mut e, "list::pop", &[list.clone()]).unwrap(), Val::Int(3));
        assert_eq!(call(&mut e, "list::pop", &[ints(&[])]).unwrap(), Val::Null);
    }

    #[test]
    fn insert_and_remove_bounds() {
        let mut e = eval();
        let list = ints(&[1, 3]);
        call(&mut e, "list::insert", &[list.clone(), Val::Int(1), Val::Int(2)]).unwrap();
        call(&mut e, "list::insert", &[list.clone(), Val::Int(3), Val::Int(4)]).unwrap();
        assert_eq!(list, ints(&[1, 2, 3, 4]));
        assert_eq!(call(&mut e, "list::remove", &[list.clone(), Val::Int(-1)]).unwrap(), Val::Int(4));
        let err = call(&mut e, "list::remove", &[list, Val::Int(7)]).unwrap_err();
        assert_eq!(err.message(), "index 7 out of range for length 3");
    }

    #[test]
    fn sort_natural_and_custom() {
        let mut e = eval();
        let list = ints(&[3, 1, 2]);
        call(&mut e, "list::sort", &[list.clone()]).unwrap();
        assert_eq!(list, ints(&[1, 2, 3]));
        let descending = native(|args| Val::Int(args[1].as_int().unwrap() - args[0].as_int().unwrap()));
        call(&mut e, "list::sort", &[list.clone(), descending]).unwrap();
        assert_eq!(list, ints(&[3, 2, 1]));
        let mixed = Val::list(vec![Val::Int(1), Val::string("a")]);
        let err = call(&mut e, "list::sort", &[mixed]).unwrap_err();
        assert_eq!(err.message(), "unsupported operand types for list::sort: int and string");
    }

    #[test]
    fn slice_and_join() {
        let mut e = eval();
        let list = ints(&[1, 2, 3, 4]);
        assert_eq!(call(&mut e, "list::slice", &[list.clone(), Val::Int(1), Val::Int(-1)]).unwrap(), ints(&[2, 3]));
        assert_eq!(call(&mut e, "list::join", &[list, Val::string("-")]).unwrap(), Val::string("1-2-3-4"));
    }

    #[test]
    fn higher_order() {
        let mut e = eval();
        let list = ints(&[1, 2, 3, 4]);
        let double = native(|args| Val::Int(args[0].as_int().unwrap() * 2));
        let even = native(|args| Val::Bool(args[0].as_int().unwrap() % 2 == 0));
        let add = native(|args| Val::Int(args[0].as_int().unwrap() + args[1].as_int().unwrap()));
        assert_eq!(call(&mut e, "list::map", &[list.clone(), double]).unwrap(), ints(&[2, 4, 6, 8]));
        assert_eq!(call(&mut e, "list::filter", &[list.clone(), even.clone()]).unwrap(), ints(&[2, 4]));
        assert_eq!(call(&mut e, "list::reduce", &[list.clone(), add, Val::Int(0)]).unwrap(), Val::Int(10));
        assert_eq!(call(&mut e, "list::any", &[list.clone(), even.clone()]).unwrap(), Val::Bool(true));
        assert_eq!(call(&mut e, "list::all", &[list, even]).unwrap(), Val::Bool(false));
    }
}
