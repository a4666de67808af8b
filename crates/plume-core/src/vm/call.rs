//! Call resolution: values, names and methods

use std::sync::Arc;

use super::{ops, Evaluator, Outcome, Phase, RuntimeErrorKind, RuntimeResult};
use crate::bytecode::{Closure, Program, ProgramKind, UpvalueRef, Val};
use crate::natives;

/// Native closure forwarding its calls to the host under `name`
pub(super) fn extern_closure(name: Arc<str>) -> Val {
    let label = format!("extern::{name}");
    Val::Closure(Arc::new(Closure::native(label, move |eval, args| {
        let host = eval.host();
        host.call(eval, &name, args)
    })))
}

/// Closure value for a module function or iterator
fn program_closure(program: &Arc<Program>) -> Val {
    Val::Closure(Arc::new(Closure::Script {
        program: Arc::clone(program),
        upvalues: Vec::new(),
    }))
}

impl Evaluator {
    /// Call any callable value
    ///
    /// This is the re-entry point for natives and hosts: script functions run
    /// to completion on this evaluator before it returns.
    pub fn call_value(&mut self, callee: &Val, args: &[Val]) -> RuntimeResult<Val> {
        let Val::Closure(closure) = callee else {
            return Err(RuntimeErrorKind::NotCallable(callee.type_name()).into());
        };
        match &**closure {
            Closure::Script { program, upvalues } => {
                self.call_script(Arc::clone(program), upvalues.clone(), args.to_vec())
            }
            Closure::Native { func, .. } => func(self, args),
            Closure::Method { receiver, method } => self.call_method(receiver, method, args),
        }
    }

    /// Call a function by name through the same chain a script call uses
    pub fn call(&mut self, name: &str, args: &[Val]) -> RuntimeResult<Val> {
        let entry = self.frames.len();
        match self.call_name(name, args.to_vec())? {
            Some(value) => Ok(value),
            None => self.finish_call(entry),
        }
    }

    fn call_script(&mut self, program: Arc<Program>, upvalues: Vec<UpvalueRef>, args: Vec<Val>) -> RuntimeResult<Val> {
        if program.kind == ProgramKind::Iterator {
            return self.new_generator(program, upvalues, &args);
        }
        let entry = self.frames.len();
        self.push_frame(program, upvalues, args)?;
        self.finish_call(entry)
    }

    fn finish_call(&mut self, entry: usize) -> RuntimeResult<Val> {
        match self.run(entry)? {
            Outcome::Return(value) => Ok(value),
            other => unreachable!("function frame ended with {other:?}"),
        }
    }

    /// `callee(args)` from the dispatch loop
    ///
    /// Script functions get a frame on the current loop and `None` comes
    /// back; the result arrives through their `RETURN`.
    pub(super) fn call_dispatch(&mut self, callee: Val, args: Vec<Val>) -> RuntimeResult<Option<Val>> {
        if let Val::Closure(closure) = &callee {
            if let Closure::Script { program, upvalues } = &**closure {
                if program.kind == ProgramKind::Function {
                    self.push_frame(Arc::clone(program), upvalues.clone(), args)?;
                    return Ok(None);
                }
            }
        }
        self.call_value(&callee, &args).map(Some)
    }

    /// `name(args)` for a name the compiler could not bind
    ///
    /// Resolution order: builtins and intrinsics, module functions and
    /// iterators, then the host (`config_command` while configuring).
    pub(super) fn call_name(&mut self, name: &str, args: Vec<Val>) -> RuntimeResult<Option<Val>> {
        if let Some(intrinsic) = natives::lookup(name) {
            return intrinsic.invoke(self, &args).map(Some);
        }
        if let Some(program) = self.module.function(name).cloned() {
            self.push_frame(program, Vec::new(), args)?;
            return Ok(None);
        }
        if let Some(program) = self.module.iterator(name).cloned() {
            return self.new_generator(program, Vec::new(), &args).map(Some);
        }
        let host = self.host();
        if self.phase == Phase::Config {
            let attrs = self.take_attrs();
            return host.config_command(self, name, &args, attrs).map(Some);
        }
        host.call(self, name, &args).map(Some)
    }

    /// `receiver.name(args)`
    pub fn call_method(&mut self, receiver: &Val, name: &str, args: &[Val]) -> RuntimeResult<Val> {
        match receiver {
            Val::Usr(object) => {
                let object = Arc::clone(object);
                return object.method(self, name, args);
            }
            Val::Map(map) => {
                let stored = map.read().get(name).cloned();
                if let Some(callee @ Val::Closure(_)) = stored {
                    return self.call_value(&callee, args);
                }
            }
            _ => {}
        }
        let Some(module) = ops::method_module(receiver) else {
            return Err(RuntimeErrorKind::UndefinedField {
                type_name: receiver.type_name().to_string(),
                field: name.to_string(),
            }
            .into());
        };
        let qualified = format!("{module}::{name}");
        let Some(intrinsic) = natives::lookup(&qualified) else {
            return Err(RuntimeErrorKind::UndefinedFunction(qualified).into());
        };
        let mut call_args = Vec::with_capacity(args.len() + 1);
        call_args.push(receiver.clone());
        call_args.extend_from_slice(args);
        intrinsic.invoke(self, &call_args)
    }

    /// A bare name at run time: module function value, else the host
    pub(super) fn load_name(&mut self, name: &str) -> RuntimeResult<Val> {
        if let Some(program) = self.module.function(name).or_else(|| self.module.iterator(name)) {
            return Ok(program_closure(program));
        }
        let host = self.host();
        host.load_var(self, name)
    }
}
