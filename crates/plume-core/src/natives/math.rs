//! `math::*`

use super::Registry;
use crate::bytecode::Val;
use crate::proto::Args;
use crate::vm::{Evaluator, RuntimeError, RuntimeResult};

pub(super) fn register(registry: &mut Registry) {
    registry.add("math::abs", "%f", abs);
    registry.add("math::min", "%f*", min);
    registry.add("math::max", "%f*", max);
    registry.add("math::clamp", "%f%f%f", clamp);
    registry.add("math::floor", "%f", floor);
    registry.add("math::ceil", "%f", ceil);
    registry.add("math::round", "%f", round);
    registry.add("math::trunc", "%f", trunc);
    registry.add("math::sqrt", "%F", sqrt);
    registry.add("math::pow", "%f%f", pow);
    registry.add("math::exp", "%f", exp);
    registry.add("math::log", "{%F}{%F%F}", log);
    registry.add("math::log10", "%F", log10);
    registry.add("math::sin", "%f", sin);
    registry.add("math::cos", "%f", cos);
    registry.add("math::tan", "%f", tan);
    registry.add("math::atan2", "%f%f", atan2);
    registry.add("math::pi", "%0", pi);
    registry.add("math::e", "%0", e);
    registry.add("math::is_nan", "%f", is_nan);
    registry.add("math::is_inf", "%f", is_inf);
}

/// Whether every argument is an int, so integer results stay ints
fn all_ints(args: &Args<'_>) -> bool {
    args.values().iter().all(|v| matches!(v, Val::Int(_)))
}

/// Map a real result to an int when it is integral and in range
fn integral(r: f64) -> RuntimeResult<Val> {
    if r.is_finite() && r >= i64::MIN as f64 && r <= i64::MAX as f64 {
        Ok(Val::Int(r as i64))
    } else {
        Err(RuntimeError::invalid(format!("{r} does not fit in an int")))
    }
}

// ============================================================================
// Integer-preserving
// ============================================================================

/// math::abs(x) -> Int | Real
fn abs(_: &mut Evaluator, args: Args<'_>) -> RuntimeResult<Val> {
    Ok(match args.get(0) {
        Val::Int(i) => Val::Int(i.wrapping_abs()),
        _ => Val::Real(args.real(0)?.abs()),
    })
}

/// math::min(x, ...) -> Int | Real
fn min(_: &mut Evaluator, args: Args<'_>) -> RuntimeResult<Val> {
    extreme(&args, |candidate, best| candidate < best)
}

/// math::max(x, ...) -> Int | Real
fn max(_: &mut Evaluator, args: Args<'_>) -> RuntimeResult<Val> {
    extreme(&args, |candidate, best| candidate > best)
}

fn extreme(args: &Args<'_>, better: fn(f64, f64) -> bool) -> RuntimeResult<Val> {
    let mut best = args.get(0);
    let mut best_real = args.real(0)?;
    for i in 1..args.len() {
        let candidate = args.real(i)?;
        if better(candidate, best_real) {
            best = args.get(i);
            best_real = candidate;
        }
    }
    Ok(best.clone())
}

/// math::clamp(x, lo, hi) -> Int | Real
fn clamp(_: &mut Evaluator, args: Args<'_>) -> RuntimeResult<Val> {
    let (x, lo, hi) = (args.real(0)?, args.real(1)?, args.real(2)?);
    if lo > hi {
        return Err(RuntimeError::invalid("math::clamp: lower bound above upper bound"));
    }
    if all_ints(&args) {
        return Ok(Val::Int(args.int(0)?.clamp(args.int(1)?, args.int(2)?)));
    }
    Ok(Val::Real(x.clamp(lo, hi)))
}

/// math::floor(x) -> Int
fn floor(_: &mut Evaluator, args: Args<'_>) -> RuntimeResult<Val> {
    integral(args.real(0)?.floor())
}

/// math::ceil(x) -> Int
fn ceil(_: &mut Evaluator, args: Args<'_>) -> RuntimeResult<Val> {
    integral(args.real(0)?.ceil())
}

/// math::round(x) -> Int, halves away from zero
fn round(_: &mut Evaluator, args: Args<'_>) -> RuntimeResult<Val> {
    integral(args.real(0)?.round())
}

fn trunc(_: &mut Evaluator, args: Args<'_>) -> RuntimeResult<Val> {
    integral(args.real(0)?.trunc())
}

/// math::pow(base, exp) -> Int | Real, following the `**` operator
fn pow(_: &mut Evaluator, args: Args<'_>) -> RuntimeResult<Val> {
    if let (Val::Int(base), Val::Int(exp)) = (args.get(0), args.get(1)) {
        if let Ok(exp) = u32::try_from(*exp) {
            return Ok(Val::Int(base.wrapping_pow(exp)));
        }
    }
    Ok(Val::Real(args.real(0)?.powf(args.real(1)?)))
}

// ============================================================================
// Real-valued
// ============================================================================

fn sqrt(_: &mut Evaluator, args: Args<'_>) -> RuntimeResult<Val> {
    Ok(Val::Real(args.real(0)?.sqrt()))
}

fn exp(_: &mut Evaluator, args: Args<'_>) -> RuntimeResult<Val> {
    Ok(Val::Real(args.real(0)?.exp()))
}

/// math::log(x, [base]) -> Real, natural logarithm by default
fn log(_: &mut Evaluator, args: Args<'_>) -> RuntimeResult<Val> {
    let x = args.real(0)?;
    Ok(Val::Real(if args.len() > 1 { x.log(args.real(1)?) } else { x.ln() }))
}

fn log10(_: &mut Evaluator, args: Args<'_>) -> RuntimeResult<Val> {
    Ok(Val::Real(args.real(0)?.log10()))
}

fn sin(_: &mut Evaluator, args: Args<'_>) -> RuntimeResult<Val> {
    Ok(Val::Real(args.real(0)?.sin()))
}

fn cos(_: &mut Evaluator, args: Args<'_>) -> RuntimeResult<Val> {
    Ok(Val::Real(args.real(0)?.cos()))
}

fn tan(_: &mut Evaluator, args: Args<'_>) -> RuntimeResult<Val> {
    Ok(Val::Real(args.real(0)?.tan()))
}

fn atan2(_: &mut Evaluator, args: Args<'_>) -> RuntimeResult<Val> {
    Ok(Val::Real(args.real(0)?.atan2(args.real(1)?)))
}

fn pi(_: &mut Evaluator, _: Args<'_>) -> RuntimeResult<Val> {
    Ok(Val::Real(std::f64::consts::PI))
}

fn e(_: &mut Evaluator, _: Args<'_>) -> RuntimeResult<Val> {
    Ok(Val::Real(std::f64::consts::E))
}

fn is_nan(_: &mut Evaluator, args: Args<'_>) -> RuntimeResult<Val> {
    Ok(Val::Bool(args.real(0)?.is_nan()))
}

fn is_inf(_: &mut Evaluator, args: Args<'_>) -> RuntimeResult<Val> {
    Ok(Val::Bool(args.real(0)?.is_infinite()))
}
