//! `str::*`, also reachable as methods on string values

use super::Registry;
use crate::bytecode::Val;
use crate::proto::Args;
use crate::vm::{Evaluator, RuntimeError, RuntimeErrorKind, RuntimeResult};

pub(super) fn register(registry: &mut Registry) {
    registry.add("str::len", "%s", len);
    registry.add("str::is_empty", "%s", is_empty);
    registry.add("str::upper", "%s", upper);
    registry.add("str::lower", "%s", lower);
    registry.add("str::trim", "%s", trim);
    registry.add("str::trim_start", "%s", trim_start);
    registry.add("str::trim_end", "%s", trim_end);
    registry.add("str::starts_with", "%s%s", starts_with);
    registry.add("str::ends_with", "%s%s", ends_with);
    registry.add("str::contains", "%s%s", contains);
    registry.add("str::find", "%s%s", find);
    registry.add("str::replace", "{%s%s%s}{%s%s%s%u}", replace);
    registry.add("str::split", "{%s}{%s%s}{%s%s%u}", split);
    registry.add("str::lines", "%s", lines);
    registry.add("str::chars", "%s", chars);
    registry.add("str::sub", "{%s%d}{%s%d%d}", sub);
    registry.add("str::repeat", "%s%u", repeat);
    registry.add("str::reverse", "%s", reverse);
    registry.add("str::pad_start", "{%s%u}{%s%u%S}", pad_start);
    registry.add("str::pad_end", "{%s%u}{%s%u%S}", pad_end);
    registry.add("str::format", "{%s}{%s%a*}", format);
}

// ============================================================================
// Inspection
// ============================================================================

/// str::len(s) -> Int, in characters
fn len(_: &mut Evaluator, args: Args<'_>) -> RuntimeResult<Val> {
    Ok(Val::Int(args.str(0)?.chars().count() as i64))
}

fn is_empty(_: &mut Evaluator, args: Args<'_>) -> RuntimeResult<Val> {
    Ok(Val::Bool(args.str(0)?.is_empty()))
}

fn starts_with(_: &mut Evaluator, args: Args<'_>) -> RuntimeResult<Val> {
    Ok(Val::Bool(args.str(0)?.starts_with(args.str(1)?)))
}

fn ends_with(_: &mut Evaluator, args: Args<'_>) -> RuntimeResult<Val> {
    Ok(Val::Bool(args.str(0)?.ends_with(args.str(1)?)))
}

fn contains(_: &mut Evaluator, args: Args<'_>) -> RuntimeResult<Val> {
    Ok(Val::Bool(args.str(0)?.contains(args.str(1)?)))
}

/// str::find(s, needle) -> Int
///
/// Character index of the first occurrence, -1 when absent.
fn find(_: &mut Evaluator, args: Args<'_>) -> RuntimeResult<Val> {
    let s = args.str(0)?;
    let index = s
        .find(args.str(1)?)
        .map_or(-1, |byte| s[..byte].chars().count() as i64);
    Ok(Val::Int(index))
}

// ============================================================================
// Transformation
// ============================================================================

fn upper(_: &mut Evaluator, args: Args<'_>) -> RuntimeResult<Val> {
    Ok(Val::string(args.str(0)?.to_uppercase()))
}

fn lower(_: &mut Evaluator, args: Args<'_>) -> RuntimeResult<Val> {
    Ok(Val::string(args.str(0)?.to_lowercase()))
}

fn trim(_: &mut Evaluator, args: Args<'_>) -> RuntimeResult<Val> {
    Ok(Val::string(args.str(0)?.trim()))
}

fn trim_start(_: &mut Evaluator, args: Args<'_>) -> RuntimeResult<Val> {
    Ok(Val::string(args.str(0)?.trim_start()))
}

fn trim_end(_: &mut Evaluator, args: Args<'_>) -> RuntimeResult<Val> {
    Ok(Val::string(args.str(0)?.trim_end()))
}

/// str::replace(s, from, to, [count]) -> String
fn replace(_: &mut Evaluator, args: Args<'_>) -> RuntimeResult<Val> {
    let (s, from, to) = (args.str(0)?, args.str(1)?, args.str(2)?);
    let replaced = if args.len() > 3 {
        s.replacen(from, to, args.int(3)? as usize)
    } else {
        s.replace(from, to)
    };
    Ok(Val::string(replaced))
}

/// str::split(s, [sep], [limit]) -> List
///
/// Without a separator the string is split on runs of whitespace.
fn split(_: &mut Evaluator, args: Args<'_>) -> RuntimeResult<Val> {
    let s = args.str(0)?;
    let parts: Vec<Val> = match args.len() {
        1 => s.split_whitespace().map(Val::string).collect(),
        _ => {
            let sep = args.str(1)?;
            if sep.is_empty() {
                return Err(RuntimeError::invalid("str::split: empty separator"));
            }
            if args.len() > 2 {
                s.splitn(args.int(2)? as usize, sep).map(Val::string).collect()
            } else {
                s.split(sep).map(Val::string).collect()
            }
        }
    };
    Ok(Val::list(parts))
}

fn lines(_: &mut Evaluator, args: Args<'_>) -> RuntimeResult<Val> {
    Ok(Val::list(args.str(0)?.lines().map(Val::string).collect()))
}

fn chars(_: &mut Evaluator, args: Args<'_>) -> RuntimeResult<Val> {
    let chars = args
        .str(0)?
        .chars()
        .map(|c| Val::string(c.encode_utf8(&mut [0; 4])))
        .collect();
    Ok(Val::list(chars))
}

/// str::sub(s, start, [end]) -> String
///
/// Character positions; negative values count from the end and the range is
/// clamped to the string.
fn sub(_: &mut Evaluator, args: Args<'_>) -> RuntimeResult<Val> {
    let chars: Vec<char> = args.str(0)?.chars().collect();
    let length = chars.len() as i64;
    let clamp = |i: i64| {
        let i = if i < 0 { length + i } else { i };
        i.clamp(0, length) as usize
    };
    let start = clamp(args.int(1)?);
    let end = clamp(args.int_or(2, length)?);
    if start >= end {
        return Ok(Val::string(""));
    }
    Ok(Val::string(chars[start..end].iter().collect::<String>()))
}

fn repeat(eval: &mut Evaluator, args: Args<'_>) -> RuntimeResult<Val> {
    let s = args.str(0)?;
    let count = args.int(1)? as usize;
    check_length("str::repeat", s.len().saturating_mul(count), eval)?;
    Ok(Val::string(s.repeat(count)))
}

/// Reject results longer than the evaluator's collection limit
fn check_length(name: &str, length: usize, eval: &Evaluator) -> RuntimeResult<()> {
    let max = eval.limits().max_collection_len;
    if length > max {
        return Err(RuntimeErrorKind::InvalidOperation(format!("{name}: result longer than {max}")).into());
    }
    Ok(())
}

fn reverse(_: &mut Evaluator, args: Args<'_>) -> RuntimeResult<Val> {
    Ok(Val::string(args.str(0)?.chars().rev().collect::<String>()))
}

fn padding(name: &str, eval: &Evaluator, args: Args<'_>) -> RuntimeResult<String> {
    let s = args.str(0)?;
    let width = args.int(1)? as usize;
    check_length(name, width, eval)?;
    let fill = if args.len() > 2 { args.str(2)? } else { " " };
    let missing = width.saturating_sub(s.chars().count());
    Ok(fill.chars().cycle().take(missing).collect())
}

/// str::pad_start(s, width, [fill]) -> String
fn pad_start(eval: &mut Evaluator, args: Args<'_>) -> RuntimeResult<Val> {
    let pad = padding("str::pad_start", eval, args)?;
    Ok(Val::string(format!("{pad}{}", args.str(0)?)))
}

/// str::pad_end(s, width, [fill]) -> String
fn pad_end(eval: &mut Evaluator, args: Args<'_>) -> RuntimeResult<Val> {
    let pad = padding("str::pad_end", eval, args)?;
    Ok(Val::string(format!("{}{pad}", args.str(0)?)))
}

/// str::format(fmt, args...) -> String
///
/// Each `{}` takes the next argument; `{{` and `}}` are literal braces.
fn format(_: &mut Evaluator, args: Args<'_>) -> RuntimeResult<Val> {
    let template = args.str(0)?;
    let mut values = args.rest(1).iter();
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();
    while let Some(c) = chars.next() {
        match (c, chars.peek()) {
            ('{', Some('{')) | ('}', Some('}')) => {
                chars.next();
                out.push(c);
            }
            ('{', Some('}')) => {
                chars.next();
                let Some(value) = values.next() else {
                    return Err(RuntimeError::invalid("str::format: not enough arguments"));
                };
                out.push_str(&value.to_display_string()?);
            }
            _ => out.push(c),
        }
    }
    Ok(Val::string(out))
}
