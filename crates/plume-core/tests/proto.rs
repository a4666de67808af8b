//! Integration tests for argument prototypes and host objects

use std::sync::Arc;

use parking_lot::Mutex;
use pretty_assertions::assert_eq;

use plume_core::bytecode::UsrIter;
use plume_core::proto::describe_args;
use plume_core::testutil::{compile, eval_error};
use plume_core::{
    Evaluator, FuncProto, Host, ProtoError, RuntimeError, RuntimeErrorKind, RuntimeResult, UsrObject, Val,
};

/// A host counter exposed to scripts as `usr[gauge]`
#[derive(Debug, Default)]
struct Gauge {
    samples: Mutex<Vec<i64>>,
}

impl UsrObject for Gauge {
    fn type_tag(&self) -> &str {
        "gauge"
    }

    fn info(&self) -> String {
        format!("gauge({})", self.samples.lock().len())
    }

    fn index(&self, key: &Val) -> RuntimeResult<Val> {
        let i = key.as_int().unwrap_or(-1);
        let samples = self.samples.lock();
        Ok(usize::try_from(i)
            .ok()
            .and_then(|i| samples.get(i).copied())
            .map_or(Val::Null, Val::Int))
    }

    fn dot(&self, name: &str) -> RuntimeResult<Val> {
        match name {
            "count" => Ok(Val::Int(self.samples.lock().len() as i64)),
            other => Err(RuntimeErrorKind::UndefinedField {
                type_name: "gauge".to_string(),
                field: other.to_string(),
            }
            .into()),
        }
    }

    fn method(&self, _: &mut Evaluator, name: &str, args: &[Val]) -> RuntimeResult<Val> {
        match name {
            "record" => {
                let proto = FuncProto::parse("%d*").map_err(|e| RuntimeError::host(e.to_string()))?;
                proto.check(args).map_err(|source| RuntimeErrorKind::Proto {
                    name: "gauge.record".to_string(),
                    source,
                })?;
                self.samples.lock().extend(args.iter().filter_map(Val::as_int));
                Ok(Val::Null)
            }
            "sum" => Ok(Val::Int(self.samples.lock().iter().sum())),
            other => Err(RuntimeError::host(format!("gauge has no method '{other}'"))),
        }
    }

    fn iter(&self) -> RuntimeResult<Box<dyn UsrIter>> {
        Ok(Box::new(GaugeIter {
            samples: self.samples.lock().clone(),
            next: 0,
        }))
    }

    fn is_truthy(&self) -> bool {
        !self.samples.lock().is_empty()
    }
}

struct GaugeIter {
    samples: Vec<i64>,
    next: usize,
}

impl UsrIter for GaugeIter {
    fn advance(&mut self) -> RuntimeResult<Option<(Val, Val)>> {
        let Some(value) = self.samples.get(self.next).copied() else {
            return Ok(None);
        };
        let key = Val::Int(self.next as i64);
        self.next += 1;
        Ok(Some((key, Val::Int(value))))
    }
}

/// Serves one gauge as the variable `gauge` and validates its own calls
struct GaugeHost {
    gauge: Val,
}

impl GaugeHost {
    fn new() -> Self {
        Self {
            gauge: Val::usr(Gauge::default()),
        }
    }
}

impl Host for GaugeHost {
    fn load_var(&self, _: &mut Evaluator, name: &str) -> RuntimeResult<Val> {
        match name {
            "gauge" => Ok(self.gauge.clone()),
            other => Err(RuntimeErrorKind::UndefinedVariable(other.to_string()).into()),
        }
    }

    fn call(&self, _: &mut Evaluator, name: &str, args: &[Val]) -> RuntimeResult<Val> {
        let proto = match name {
            "reset" => "%U[gauge]",
            "scale" => "{%U[gauge]%f}{%U[gauge]%f%b}",
            other => return Err(RuntimeErrorKind::UndefinedFunction(other.to_string()).into()),
        };
        let proto = FuncProto::parse(proto).map_err(|e| RuntimeError::host(e.to_string()))?;
        let case = proto.check(args).map_err(|source| RuntimeErrorKind::Proto {
            name: name.to_string(),
            source,
        })?;
        Ok(Val::Int(case as i64))
    }
}

fn run(source: &str) -> RuntimeResult<Option<Val>> {
    let module = compile(source).map_err(RuntimeError::host)?;
    Evaluator::new(module)
        .with_host(Arc::new(GaugeHost::new()))
        .eval("main")
}

#[test]
fn test_intrinsic_mismatches_name_the_expected_shapes() {
    assert_eq!(
        eval_error("str::upper(1)").unwrap(),
        "str::upper: expected (string), got (int)"
    );
    assert_eq!(
        eval_error("math::log(1, 2, 3)").unwrap(),
        "math::log: expected (non-negative real) or (non-negative real, non-negative real), got (int, int, int)"
    );
    assert_eq!(
        eval_error(r#"list::concat([1], "x")"#).unwrap(),
        "list::concat: expected (list, list...), got (list, string)"
    );
    assert_eq!(
        eval_error("random::hex(-1)").unwrap(),
        "random::hex: expected (uint), got (int)"
    );
}

#[test]
fn test_method_calls_are_checked_with_the_receiver() {
    assert_eq!(
        eval_error(r#""abc".repeat("x")"#).unwrap(),
        "str::repeat: expected (string, uint), got (string, string)"
    );
}

#[test]
fn test_mismatches_are_catchable() {
    let out = run(r#"main { try len(1) else let e { e } }"#).unwrap();
    assert_eq!(
        out,
        Some(Val::string(
            "len: expected (string|list|map|pair), got (int)"
        ))
    );
}

#[test]
fn test_host_objects_through_scripts() {
    let source = r"
        main {
            gauge.record(3, 4, 5);
            let seen = [];
            for i, v in gauge { seen.push(i * 100 + v); }
            [gauge.count, gauge[1], gauge[9], gauge.sum(), seen, to_str(gauge)]
        }
    ";
    let out = run(source).unwrap();
    assert_eq!(
        out,
        Some(Val::list(vec![
            Val::Int(3),
            Val::Int(4),
            Val::Null,
            Val::Int(12),
            Val::list(vec![Val::Int(3), Val::Int(104), Val::Int(205)]),
            Val::string("gauge(3)"),
        ]))
    );
}

#[test]
fn test_host_objects_report_their_own_errors() {
    let err = run(r#"main { gauge.record("x"); }"#).unwrap_err();
    assert_eq!(err.message(), "gauge.record: expected (int...), got (string)");
    let err = run("main { gauge.weight }").unwrap_err();
    assert_eq!(err.message(), "undefined field 'weight' on gauge");
    let err = run("main { gauge.weight = 1; }").unwrap_err();
    assert_eq!(err.message(), "gauge does not support setting field 'weight'");
}

#[test]
fn test_host_calls_validate_usr_tags() {
    assert_eq!(run("main { scale(gauge, 2) }").unwrap(), Some(Val::Int(0)));
    assert_eq!(run("main { scale(gauge, 2.5, true) }").unwrap(), Some(Val::Int(1)));
    let err = run("main { reset(_) }").unwrap_err();
    assert_eq!(err.message(), "reset: expected (usr[gauge]), got (usr[placeholder])");
    let err = run(r#"main { scale(gauge, "2") }"#).unwrap_err();
    assert_eq!(
        err.message(),
        "scale: expected (usr[gauge], real) or (usr[gauge], real, bool), got (usr[gauge], string)"
    );
}

#[test]
fn test_host_objects_are_not_global_safe_by_default() {
    let source = r"
        global { let g = null; }
        main { global::g = gauge; }
    ";
    let module = compile(source).unwrap();
    let mut eval = Evaluator::new(module).with_host(Arc::new(GaugeHost::new()));
    eval.eval_global().unwrap();
    let err = eval.eval("main").unwrap_err();
    assert!(matches!(err.kind, RuntimeErrorKind::ImmutableGlobal(ref name) if name == "g"));
}

#[test]
fn test_prototype_api() {
    let proto = FuncProto::parse("{%s}{%s(%d%f)%b}").unwrap();
    assert_eq!(proto.cases().len(), 2);
    assert_eq!(proto.check(&[Val::string("a")]), Ok(0));
    assert_eq!(
        proto.check(&[Val::string("a"), Val::Real(1.5), Val::Bool(false)]),
        Ok(1)
    );
    assert_eq!(proto.expected(), "(string) or (string, int|real, bool)");

    let err = proto.check(&[Val::Null]).unwrap_err();
    assert!(matches!(err, ProtoError::Mismatch { .. }));
    assert_eq!(describe_args(&[Val::Null, Val::list(vec![])]), "null, list");
}
