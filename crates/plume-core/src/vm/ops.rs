//! Operators and container access
//!
//! Pure functions over values; nothing here touches evaluator state, so the
//! dispatch loop and the intrinsic library share them.

use std::cmp::Ordering;
use std::sync::Arc;

use regex::Regex;

use super::{RuntimeError, RuntimeErrorKind, RuntimeResult};
use crate::bytecode::{Closure, OpCode, Val};

fn invalid_operands(op: &'static str, left: &Val, right: &Val) -> RuntimeError {
    RuntimeErrorKind::InvalidOperands {
        op,
        left: left.type_name(),
        right: right.type_name(),
    }
    .into()
}

// ===== Arithmetic =====

/// Apply a binary arithmetic, comparison or match instruction
pub fn binary(op: OpCode, left: &Val, right: &Val) -> RuntimeResult<Val> {
    match op {
        OpCode::Add => add(left, right),
        OpCode::Sub => numeric(left, right, "-", i64::wrapping_sub, |a, b| a - b),
        OpCode::Mul => numeric(left, right, "*", i64::wrapping_mul, |a, b| a * b),
        OpCode::Div => divide(left, right),
        OpCode::Mod => remainder(left, right),
        OpCode::Pow => power(left, right),
        OpCode::Eq => Ok(Val::Bool(left == right)),
        OpCode::Ne => Ok(Val::Bool(left != right)),
        OpCode::Lt => compare(left, right, "<", Ordering::is_lt),
        OpCode::Le => compare(left, right, "<=", Ordering::is_le),
        OpCode::Gt => compare(left, right, ">", Ordering::is_gt),
        OpCode::Ge => compare(left, right, ">=", Ordering::is_ge),
        OpCode::RegexMatch => regex_match(left, right).map(Val::Bool),
        OpCode::RegexNotMatch => regex_match(left, right).map(|m| Val::Bool(!m)),
        other => unreachable!("{other} is not a binary operator"),
    }
}

fn add(left: &Val, right: &Val) -> RuntimeResult<Val> {
    match (left, right) {
        (Val::Str(a), Val::Str(b)) => {
            let mut s = String::with_capacity(a.len() + b.len());
            s.push_str(a);
            s.push_str(b);
            Ok(Val::from(s))
        }
        (Val::List(a), Val::List(b)) => {
            let mut items = a.read().clone();
            items.extend(b.read().iter().cloned());
            Ok(Val::list(items))
        }
        _ => numeric(left, right, "+", i64::wrapping_add, |a, b| a + b),
    }
}

fn numeric(
    left: &Val,
    right: &Val,
    op: &'static str,
    int_op: impl Fn(i64, i64) -> i64,
    real_op: impl Fn(f64, f64) -> f64,
) -> RuntimeResult<Val> {
    match (left, right) {
        (Val::Int(a), Val::Int(b)) => Ok(Val::Int(int_op(*a, *b))),
        (Val::Int(_) | Val::Real(_), Val::Int(_) | Val::Real(_)) => {
            let (Some(a), Some(b)) = (left.as_real(), right.as_real()) else {
                unreachable!("numeric operands without a real projection");
            };
            Ok(Val::Real(real_op(a, b)))
        }
        _ => Err(invalid_operands(op, left, right)),
    }
}

fn divide(left: &Val, right: &Val) -> RuntimeResult<Val> {
    match (left, right) {
        (Val::Int(_), Val::Int(0)) => Err(RuntimeErrorKind::DivisionByZero.into()),
        (Val::Int(a), Val::Int(b)) => Ok(Val::Int(a.wrapping_div(*b))),
        _ => numeric(left, right, "/", i64::wrapping_div, |a, b| a / b),
    }
}

fn remainder(left: &Val, right: &Val) -> RuntimeResult<Val> {
    match (left, right) {
        (Val::Int(_), Val::Int(0)) => Err(RuntimeErrorKind::DivisionByZero.into()),
        (Val::Int(a), Val::Int(b)) => Ok(Val::Int(a.wrapping_rem(*b))),
        _ => numeric(left, right, "%", i64::wrapping_rem, |a, b| a % b),
    }
}

fn power(left: &Val, right: &Val) -> RuntimeResult<Val> {
    match (left, right) {
        (Val::Int(base), Val::Int(exp)) if *exp >= 0 => match u32::try_from(*exp) {
            Ok(exp) => Ok(Val::Int(base.wrapping_pow(exp))),
            Err(_) => Ok(Val::Real((*base as f64).powf(*exp as f64))),
        },
        _ => match (left.as_real(), right.as_real()) {
            (Some(a), Some(b)) => Ok(Val::Real(a.powf(b))),
            _ => Err(invalid_operands("**", left, right)),
        },
    }
}

/// Arithmetic negation
pub fn negate(value: &Val) -> RuntimeResult<Val> {
    match value {
        Val::Int(i) => Ok(Val::Int(i.wrapping_neg())),
        Val::Real(r) => Ok(Val::Real(-r)),
        other => Err(RuntimeError::type_error("-", "number", other.type_name())),
    }
}

/// Unary plus
pub fn positive(value: &Val) -> RuntimeResult<Val> {
    match value {
        Val::Int(_) | Val::Real(_) => Ok(value.clone()),
        other => Err(RuntimeError::type_error("+", "number", other.type_name())),
    }
}

// ===== Comparison =====

fn compare(left: &Val, right: &Val, op: &'static str, test: fn(Ordering) -> bool) -> RuntimeResult<Val> {
    left.compare(right)
        .map(|ordering| Val::Bool(test(ordering)))
        .ok_or_else(|| invalid_operands(op, left, right))
}

/// `subject =~ pattern`; string patterns are compiled on the spot
pub fn regex_match(subject: &Val, pattern: &Val) -> RuntimeResult<bool> {
    let Val::Str(text) = subject else {
        return Err(RuntimeError::type_error("=~", "string", subject.type_name()));
    };
    match pattern {
        Val::Regexp(re) => Ok(re.is_match(text)),
        Val::Str(source) => Ok(compile_regex(source)?.is_match(text)),
        other => Err(RuntimeError::type_error("=~", "regexp", other.type_name())),
    }
}

/// Compile a pattern, mapping failures to a runtime error
pub fn compile_regex(source: &str) -> RuntimeResult<Arc<Regex>> {
    Regex::new(source)
        .map(Arc::new)
        .map_err(|e| RuntimeErrorKind::Regex(e.to_string()).into())
}

// ===== Index access =====

/// Resolve a possibly negative index against a length
fn resolve_index(index: i64, length: usize) -> Option<usize> {
    if index >= 0 {
        Some(index as usize)
    } else {
        usize::try_from(length as i64 + index).ok()
    }
}

fn index_of(operation: &'static str, index: &Val) -> RuntimeResult<i64> {
    index
        .as_int()
        .ok_or_else(|| RuntimeError::type_error(operation, "int", index.type_name()))
}

/// `object[index]`
///
/// Reads past the end of a list or string yield null.
pub fn index_get(object: &Val, index: &Val) -> RuntimeResult<Val> {
    match object {
        Val::List(list) => {
            let list = list.read();
            let i = index_of("list index", index)?;
            Ok(resolve_index(i, list.len())
                .and_then(|i| list.get(i))
                .cloned()
                .unwrap_or(Val::Null))
        }
        Val::Map(map) => Ok(map.read().get(&index.to_key()?).cloned().unwrap_or(Val::Null)),
        Val::Str(s) => {
            let i = index_of("string index", index)?;
            let count = s.chars().count();
            Ok(resolve_index(i, count)
                .and_then(|i| s.chars().nth(i))
                .map_or(Val::Null, |c| Val::string(c.to_string())))
        }
        Val::Pair(pair) => match index_of("pair index", index)? {
            0 => Ok(pair.0.clone()),
            1 => Ok(pair.1.clone()),
            i => Err(RuntimeErrorKind::IndexOutOfRange { index: i, length: 2 }.into()),
        },
        Val::Usr(u) => u.index(index),
        other => Err(RuntimeError::type_error("index", "list, map, string or pair", other.type_name())),
    }
}

/// `object[index] = value`
///
/// Assigning past the end of a list pads it with nulls.
pub fn index_set(object: &Val, index: &Val, value: Val, max_len: usize) -> RuntimeResult<()> {
    match object {
        Val::List(list) => {
            let mut list = list.write();
            let i = index_of("list index", index)?;
            let Some(slot) = resolve_index(i, list.len()).filter(|&slot| slot < max_len.max(list.len())) else {
                return Err(RuntimeErrorKind::IndexOutOfRange {
                    index: i,
                    length: list.len(),
                }
                .into());
            };
            if slot >= list.len() {
                list.resize(slot, Val::Null);
                list.push(value);
            } else {
                list[slot] = value;
            }
            Ok(())
        }
        Val::Map(map) => {
            let key = index.to_key()?;
            map.write().insert(key, value);
            Ok(())
        }
        Val::Usr(u) => u.index_set(index, value),
        other => Err(RuntimeError::type_error("index assignment", "list or map", other.type_name())),
    }
}

// ===== Field access =====

/// `object.name`
///
/// Maps read the key, pairs expose `first`/`second`, host objects answer for
/// themselves; anything else yields a method closure for a later call.
pub fn dot_get(object: &Val, name: &str) -> RuntimeResult<Val> {
    match object {
        Val::Map(map) => Ok(map.read().get(name).cloned().unwrap_or(Val::Null)),
        Val::Pair(pair) if name == "first" => Ok(pair.0.clone()),
        Val::Pair(pair) if name == "second" => Ok(pair.1.clone()),
        Val::Usr(u) => u.dot(name),
        _ => Ok(Val::Closure(Arc::new(Closure::Method {
            receiver: object.clone(),
            method: name.to_string(),
        }))),
    }
}

/// `object.name = value`
pub fn dot_set(object: &Val, name: &str, value: Val) -> RuntimeResult<()> {
    match object {
        Val::Map(map) => {
            map.write().insert(name, value);
            Ok(())
        }
        Val::Usr(u) => u.dot_set(name, value),
        other => Err(RuntimeErrorKind::UndefinedField {
            type_name: other.type_name().to_string(),
            field: name.to_string(),
        }
        .into()),
    }
}

/// Intrinsic module that provides methods for a receiver kind
#[must_use]
pub fn method_module(receiver: &Val) -> Option<&'static str> {
    match receiver {
        Val::Str(_) => Some("str"),
        Val::List(_) => Some("list"),
        Val::Map(_) => Some("map"),
        Val::Pair(_) => Some("pair"),
        _ => None,
    }
}
