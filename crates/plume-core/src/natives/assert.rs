//! `assert::*`
//!
//! Failures raise `AssertionFailed`, which `try` can catch like any other
//! runtime error. An optional trailing string replaces the default message.

use super::Registry;
use crate::bytecode::Val;
use crate::proto::Args;
use crate::vm::{Evaluator, RuntimeErrorKind, RuntimeResult};

pub(super) fn register(registry: &mut Registry) {
    registry.add("assert::eq", "{%a%a}{%a%a%s}", eq);
    registry.add("assert::ne", "{%a%a}{%a%a%s}", ne);
    registry.add("assert::truthy", "{%a}{%a%s}", truthy);
    registry.add("assert::falsy", "{%a}{%a%s}", falsy);
    registry.add("assert::throws", "{%c}{%c%s}", throws);
}

/// Render a value for a failure message, strings quoted
fn show(value: &Val) -> String {
    match value {
        Val::Str(s) => format!("{:?}", &**s),
        other => other.to_string(),
    }
}

fn fail(args: &Args<'_>, message_at: usize, default: impl FnOnce() -> String) -> RuntimeResult<Val> {
    let message = match args.get(message_at) {
        Val::Str(s) => s.to_string(),
        _ => default(),
    };
    Err(RuntimeErrorKind::AssertionFailed(message).into())
}

/// assert::eq(actual, expected, [message])
fn eq(_: &mut Evaluator, args: Args<'_>) -> RuntimeResult<Val> {
    let (actual, expected) = (args.get(0), args.get(1));
    if actual == expected {
        return Ok(Val::Null);
    }
    fail(&args, 2, || format!("{} != {}", show(actual), show(expected)))
}

fn ne(_: &mut Evaluator, args: Args<'_>) -> RuntimeResult<Val> {
    let (actual, other) = (args.get(0), args.get(1));
    if actual != other {
        return Ok(Val::Null);
    }
    fail(&args, 2, || format!("{} == {}", show(actual), show(other)))
}

fn truthy(_: &mut Evaluator, args: Args<'_>) -> RuntimeResult<Val> {
    if args.get(0).is_truthy() {
        return Ok(Val::Null);
    }
    fail(&args, 1, || format!("{} is not truthy", show(args.get(0))))
}

fn falsy(_: &mut Evaluator, args: Args<'_>) -> RuntimeResult<Val> {
    if !args.get(0).is_truthy() {
        return Ok(Val::Null);
    }
    fail(&args, 1, || format!("{} is not falsy", show(args.get(0))))
}

/// assert::throws(f, [fragment]) -> String
///
/// Calls `f` with no arguments, which must fail; returns the error message.
/// With `fragment`, the message must also contain it.
fn throws(eval: &mut Evaluator, args: Args<'_>) -> RuntimeResult<Val> {
    let message = match eval.call_value(args.get(0), &[]) {
        Ok(value) => {
            return Err(RuntimeErrorKind::AssertionFailed(format!(
                "expected an error, got {}",
                show(&value)
            ))
            .into())
        }
        Err(error) => error.message(),
    };
    if args.len() > 1 {
        let fragment = args.str(1)?;
        if !message.contains(fragment) {
            return Err(RuntimeErrorKind::AssertionFailed(format!(
                "error {message:?} does not mention {fragment:?}"
            ))
            .into());
        }
    }
    Ok(Val::string(message))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::bytecode::{Closure, Module};
    use crate::natives::lookup;
    use crate::vm::RuntimeError;

    fn call(name: &str, args: &[Val]) -> RuntimeResult<Val> {
        let mut eval = Evaluator::new(Arc::new(Module::new("t")));
        lookup(name).unwrap().invoke(&mut eval, args)
    }

    #[test]
    fn eq_reports_both_sides() {
        assert_eq!(call("assert::eq", &[Val::Int(1), Val::Real(1.0)]).unwrap(), Val::Null);
        let err = call("assert::eq", &[Val::string("a"), Val::Int(2)]).unwrap_err();
        assert_eq!(err.message(), "assertion failed: \"a\" != 2");
        let err = call("assert::eq", &[Val::Int(1), Val::Int(2), Val::string("counts differ")]).unwrap_err();
        assert_eq!(err.message(), "assertion failed: counts differ");
    }

    #[test]
    fn truthiness() {
        assert!(call("assert::truthy", &[Val::Int(1)]).is_ok());
        let err = call("assert::falsy", &[Val::list(vec![Val::Null])]).unwrap_err();
        assert_eq!(err.message(), "assertion failed: [null] is not falsy");
    }

    #[test]
    fn throws_returns_message() {
        let failing = Val::Closure(Arc::new(Closure::native("f", |_, _| Err(RuntimeError::user("nope")))));
        assert_eq!(call("assert::throws", &[failing.clone()]).unwrap(), Val::string("nope"));
        assert!(call("assert::throws", &[failing, Val::string("other")]).is_err());
        let fine = Val::Closure(Arc::new(Closure::native("g", |_, _| Ok(Val::Int(1)))));
        let err = call("assert::throws", &[fine]).unwrap_err();
        assert_eq!(err.message(), "assertion failed: expected an error, got 1");
    }
}
