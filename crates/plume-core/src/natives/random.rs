//! `random::*`, backed by the thread-local generator

use rand::seq::SliceRandom;
use rand::{Rng, RngCore};
use uuid::Uuid;

use super::Registry;
use crate::bytecode::Val;
use crate::proto::Args;
use crate::vm::{Evaluator, RuntimeError, RuntimeResult};

pub(super) fn register(registry: &mut Registry) {
    registry.add("random::int", "%d%d", int);
    registry.add("random::real", "%0", real);
    registry.add("random::bool", "%0", boolean);
    registry.add("random::choice", "%l", choice);
    registry.add("random::shuffle", "%l", shuffle);
    registry.add("random::hex", "%u", hex_bytes);
    registry.add("random::uuid", "%0", uuid);
}

/// random::int(min, max) -> Int, both bounds inclusive
fn int(_: &mut Evaluator, args: Args<'_>) -> RuntimeResult<Val> {
    let (min, max) = (args.int(0)?, args.int(1)?);
    if min > max {
        return Err(RuntimeError::invalid(format!("random::int: empty range {min}..={max}")));
    }
    Ok(Val::Int(rand::thread_rng().gen_range(min..=max)))
}

/// random::real() -> Real in [0, 1)
fn real(_: &mut Evaluator, _: Args<'_>) -> RuntimeResult<Val> {
    Ok(Val::Real(rand::thread_rng().gen::<f64>()))
}

fn boolean(_: &mut Evaluator, _: Args<'_>) -> RuntimeResult<Val> {
    Ok(Val::Bool(rand::thread_rng().gen()))
}

/// random::choice(list) -> Any, null for an empty list
fn choice(_: &mut Evaluator, args: Args<'_>) -> RuntimeResult<Val> {
    let list = args.list(0)?.read();
    Ok(list.choose(&mut rand::thread_rng()).cloned().unwrap_or(Val::Null))
}

/// random::shuffle(list) -> List, a shuffled copy
fn shuffle(_: &mut Evaluator, args: Args<'_>) -> RuntimeResult<Val> {
    let mut items = args.list(0)?.read().clone();
    items.shuffle(&mut rand::thread_rng());
    Ok(Val::list(items))
}

/// random::hex(n) -> String, `n` random bytes as lowercase hex
fn hex_bytes(_: &mut Evaluator, args: Args<'_>) -> RuntimeResult<Val> {
    let mut bytes = vec![0u8; args.int(0)? as usize];
    rand::thread_rng().fill_bytes(&mut bytes);
    Ok(Val::string(hex::encode(bytes)))
}

/// random::uuid() -> String, a v4 UUID
fn uuid(_: &mut Evaluator, _: Args<'_>) -> RuntimeResult<Val> {
    Ok(Val::string(Uuid::new_v4().to_string()))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::bytecode::Module;
    use crate::natives::lookup;

    fn call(name: &str, args: &[Val]) -> RuntimeResult<Val> {
        let mut eval = Evaluator::new(Arc::new(Module::new("t")));
        lookup(name).unwrap().invoke(&mut eval, args)
    }

    #[test]
    fn int_stays_in_bounds() {
        for _ in 0..100 {
            let Val::Int(n) = call("random::int", &[Val::Int(-2), Val::Int(2)]).unwrap() else {
                panic!("expected int");
            };
            assert!((-2..=2).contains(&n));
        }
        assert_eq!(call("random::int", &[Val::Int(5), Val::Int(5)]).unwrap(), Val::Int(5));
        assert!(call("random::int", &[Val::Int(3), Val::Int(1)]).is_err());
    }

    #[test]
    fn shuffle_keeps_elements() {
        let list = Val::list((0..10).map(Val::Int).collect());
        let Val::List(shuffled) = call("random::shuffle", &[list.clone()]).unwrap() else {
            panic!("expected list");
        };
        let mut sorted: Vec<i64> = shuffled.read().iter().filter_map(Val::as_int).collect();
        sorted.sort_unstable();
        assert_eq!(sorted, (0..10).collect::<Vec<_>>());
        assert_eq!(call("random::choice", &[Val::list(vec![])]).unwrap(), Val::Null);
    }

    #[test]
    fn identifiers() {
        let Val::Str(id) = call("random::uuid", &[]).unwrap() else {
            panic!("expected string");
        };
        assert!(Uuid::parse_str(&id).is_ok());
        let Val::Str(hex) = call("random::hex", &[Val::Int(8)]).unwrap() else {
            panic!("expected string");
        };
        assert_eq!(hex.len(), 16);
    }
}
