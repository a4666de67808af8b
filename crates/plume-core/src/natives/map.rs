//! `map::*` and `pair::*`

use super::Registry;
use crate::bytecode::Val;
use crate::proto::Args;
use crate::vm::{Evaluator, RuntimeError, RuntimeResult};

pub(super) fn register(registry: &mut Registry) {
    registry.add("map::len", "%m", len);
    registry.add("map::is_empty", "%m", is_empty);
    registry.add("map::keys", "%m", keys);
    registry.add("map::values", "%m", values);
    registry.add("map::items", "%m", items);
    registry.add("map::has", "%m%a", has);
    registry.add("map::get", "{%m%a}{%m%a%a}", get);
    registry.add("map::set", "%m%a%a", set);
    registry.add("map::remove", "%m%a", remove);
    registry.add("map::clear", "%m", clear);
    registry.add("map::merge", "%m%m*", merge);
    registry.add("map::from_pairs", "%l", from_pairs);

    registry.add("pair::first", "%p", first);
    registry.add("pair::second", "%p", second);
    registry.add("pair::swap", "%p", swap);
    registry.add("pair::to_list", "%p", to_list);
}

// ============================================================================
// Maps
// ============================================================================

fn len(_: &mut Evaluator, args: Args<'_>) -> RuntimeResult<Val> {
    Ok(Val::Int(args.map(0)?.read().len() as i64))
}

fn is_empty(_: &mut Evaluator, args: Args<'_>) -> RuntimeResult<Val> {
    Ok(Val::Bool(args.map(0)?.read().is_empty()))
}

/// map::keys(m) -> List, in iteration order
fn keys(_: &mut Evaluator, args: Args<'_>) -> RuntimeResult<Val> {
    let keys = args.map(0)?.read().keys();
    Ok(Val::list(keys.into_iter().map(Val::string).collect()))
}

fn values(_: &mut Evaluator, args: Args<'_>) -> RuntimeResult<Val> {
    Ok(Val::list(args.map(0)?.read().values()))
}

/// map::items(m) -> List of (key, value) pairs
fn items(_: &mut Evaluator, args: Args<'_>) -> RuntimeResult<Val> {
    let items = args
        .map(0)?
        .read()
        .iter()
        .map(|(k, v)| Val::pair(Val::string(k), v.clone()))
        .collect();
    Ok(Val::list(items))
}

fn has(_: &mut Evaluator, args: Args<'_>) -> RuntimeResult<Val> {
    let key = args.get(1).to_key()?;
    Ok(Val::Bool(args.map(0)?.read().contains_key(&key)))
}

/// map::get(m, key, [default]) -> Any
fn get(_: &mut Evaluator, args: Args<'_>) -> RuntimeResult<Val> {
    let key = args.get(1).to_key()?;
    let found = args.map(0)?.read().get(&key).cloned();
    Ok(found.unwrap_or_else(|| args.get(2).clone()))
}

/// map::set(m, key, value) -> Map, the same map
fn set(_: &mut Evaluator, args: Args<'_>) -> RuntimeResult<Val> {
    let key = args.get(1).to_key()?;
    args.map(0)?.write().insert(key, args.get(2).clone());
    Ok(args.get(0).clone())
}

/// map::remove(m, key) -> Any, the removed value or null
fn remove(_: &mut Evaluator, args: Args<'_>) -> RuntimeResult<Val> {
    let key = args.get(1).to_key()?;
    Ok(args.map(0)?.write().remove(&key).unwrap_or(Val::Null))
}

fn clear(_: &mut Evaluator, args: Args<'_>) -> RuntimeResult<Val> {
    args.map(0)?.write().clear();
    Ok(args.get(0).clone())
}

/// map::merge(a, b, ...) -> Map
///
/// A new map; later maps win on conflicting keys.
fn merge(_: &mut Evaluator, args: Args<'_>) -> RuntimeResult<Val> {
    let mut entries = Vec::new();
    for i in 0..args.len() {
        entries.extend(args.map(i)?.read().iter().map(|(k, v)| (k.clone(), v.clone())));
    }
    Ok(Val::map(entries))
}

/// map::from_pairs(list) -> Map, from a list of pairs or two-element lists
fn from_pairs(_: &mut Evaluator, args: Args<'_>) -> RuntimeResult<Val> {
    let mut entries = Vec::new();
    for item in args.list(0)?.read().iter() {
        let (key, value) = match item {
            Val::Pair(p) => (p.0.clone(), p.1.clone()),
            Val::List(l) if l.read().len() == 2 => {
                let l = l.read();
                (l[0].clone(), l[1].clone())
            }
            other => {
                return Err(RuntimeError::type_error("map::from_pairs", "pair", other.type_name()));
            }
        };
        entries.push((key.to_key()?, value));
    }
    Ok(Val::map(entries))
}

// ============================================================================
// Pairs
// ============================================================================

fn first(_: &mut Evaluator, args: Args<'_>) -> RuntimeResult<Val> {
    Ok(args.pair(0)?.0.clone())
}

fn second(_: &mut Evaluator, args: Args<'_>) -> RuntimeResult<Val> {
    Ok(args.pair(0)?.1.clone())
}

fn swap(_: &mut Evaluator, args: Args<'_>) -> RuntimeResult<Val> {
    let (a, b) = args.pair(0)?;
    Ok(Val::pair(b.clone(), a.clone()))
}

fn to_list(_: &mut Evaluator, args: Args<'_>) -> RuntimeResult<Val> {
    let (a, b) = args.pair(0)?;
    Ok(Val::list(vec![a.clone(), b.clone()]))
}
