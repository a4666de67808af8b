//! `regexp::*`
//!
//! Every pattern argument accepts a compiled regexp or a pattern string.

use super::Registry;
use crate::bytecode::Val;
use crate::proto::Args;
use crate::vm::{Evaluator, RuntimeResult};

pub(super) fn register(registry: &mut Registry) {
    registry.add("regexp::compile", "%s", compile);
    registry.add("regexp::escape", "%s", escape);
    registry.add("regexp::is_match", "%s(%s%r)", is_match);
    registry.add("regexp::find", "%s(%s%r)", find);
    registry.add("regexp::find_all", "%s(%s%r)", find_all);
    registry.add("regexp::captures", "%s(%s%r)", captures);
    registry.add("regexp::named", "%s(%s%r)", named);
    registry.add("regexp::replace", "%s(%s%r)%s", replace);
    registry.add("regexp::replace_all", "%s(%s%r)%s", replace_all);
    registry.add("regexp::split", "%s(%s%r)", split);
}

/// regexp::compile(pattern) -> Regexp
fn compile(_: &mut Evaluator, args: Args<'_>) -> RuntimeResult<Val> {
    args.regex(0).map(Val::Regexp)
}

fn escape(_: &mut Evaluator, args: Args<'_>) -> RuntimeResult<Val> {
    Ok(Val::string(regex::escape(args.str(0)?)))
}

fn is_match(_: &mut Evaluator, args: Args<'_>) -> RuntimeResult<Val> {
    Ok(Val::Bool(args.regex(1)?.is_match(args.str(0)?)))
}

/// regexp::find(subject, re) -> String | Null, the leftmost match
fn find(_: &mut Evaluator, args: Args<'_>) -> RuntimeResult<Val> {
    let re = args.regex(1)?;
    Ok(re.find(args.str(0)?).map_or(Val::Null, |m| Val::string(m.as_str())))
}

fn find_all(_: &mut Evaluator, args: Args<'_>) -> RuntimeResult<Val> {
    let re = args.regex(1)?;
    let found = re.find_iter(args.str(0)?).map(|m| Val::string(m.as_str())).collect();
    Ok(Val::list(found))
}

/// regexp::captures(subject, re) -> List | Null
///
/// Whole match first, then each group; groups that did not take part are
/// null.
fn captures(_: &mut Evaluator, args: Args<'_>) -> RuntimeResult<Val> {
    let re = args.regex(1)?;
    let Some(caps) = re.captures(args.str(0)?) else {
        return Ok(Val::Null);
    };
    let groups = caps
        .iter()
        .map(|group| group.map_or(Val::Null, |m| Val::string(m.as_str())))
        .collect();
    Ok(Val::list(groups))
}

/// regexp::named(subject, re) -> Map | Null, named groups only
fn named(_: &mut Evaluator, args: Args<'_>) -> RuntimeResult<Val> {
    let re = args.regex(1)?;
    let Some(caps) = re.captures(args.str(0)?) else {
        return Ok(Val::Null);
    };
    let entries = re.capture_names().flatten().map(|name| {
        let value = caps.name(name).map_or(Val::Null, |m| Val::string(m.as_str()));
        (name.to_string(), value)
    });
    Ok(Val::map(entries))
}

/// regexp::replace(subject, re, replacement) -> String, first match only
///
/// `$1` and `${name}` in the replacement expand to groups.
fn replace(_: &mut Evaluator, args: Args<'_>) -> RuntimeResult<Val> {
    let re = args.regex(1)?;
    Ok(Val::string(re.replace(args.str(0)?, args.str(2)?)))
}

fn replace_all(_: &mut Evaluator, args: Args<'_>) -> RuntimeResult<Val> {
    let re = args.regex(1)?;
    Ok(Val::string(re.replace_all(args.str(0)?, args.str(2)?)))
}

fn split(_: &mut Evaluator, args: Args<'_>) -> RuntimeResult<Val> {
    let re = args.regex(1)?;
    Ok(Val::list(re.split(args.str(0)?).map(Val::string).collect()))
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

    fn s(v: &str) -> Val {
        Val::string(v)
    }

    #[test]
    fn find_and_find_all() {
        assert_eq!(call("regexp::find", &[s("a1b22"), s(r"\d+")]).unwrap(), s("1"));
        assert_eq!(call("regexp::find", &[s("abc"), s(r"\d+")]).unwrap(), Val::Null);
        assert_eq!(
            call("regexp::find_all", &[s("a1b22"), s(r"\d+")]).unwrap(),
            Val::list(vec![s("1"), s("22")])
        );
    }

    #[test]
    fn captures_keep_group_positions() {
        let caps = call("regexp::captures", &[s("k=v"), s(r"(\w)=(\d)?(\w)")]).unwrap();
        assert_eq!(caps, Val::list(vec![s("k=v"), s("k"), Val::Null, s("v")]));
        let named = call("regexp::named", &[s("2024-05"), s(r"(?P<y>\d{4})-(?P<m>\d\d)")]).unwrap();
        assert_eq!(named, Val::map([("m", s("05")), ("y", s("2024"))]));
    }

    #[test]
    fn compiled_patterns_are_accepted() {
        let re = call("regexp::compile", &[s("o+")]).unwrap();
        assert!(matches!(re, Val::Regexp(_)));
        assert_eq!(call("regexp::replace", &[s("foo boo"), re.clone(), s("0")]).unwrap(), s("f0 boo"));
        assert_eq!(call("regexp::replace_all", &[s("foo boo"), re.clone(), s("0")]).unwrap(), s("f0 b0"));
        assert_eq!(call("regexp::split", &[s("aoob"), re]).unwrap(), Val::list(vec![s("a"), s("b")]));
        let err = call("regexp::compile", &[s("(")]).unwrap_err();
        assert!(err.message().starts_with("invalid regex: "));
    }

    #[test]
    fn escape_quotes_metacharacters() {
        assert_eq!(call("regexp::escape", &[s("a.b*")]).unwrap(), s(r"a\.b\*"));
    }
}
