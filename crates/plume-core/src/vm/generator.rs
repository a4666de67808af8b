//! Iterator protocol and generator resumption
//!
//! A generator owns a private copy of its locals and operand stack while it
//! is suspended. Resuming pushes a frame, moves that state back onto the
//! evaluator's stacks and runs until the next `yield` or `return`; yielding
//! moves it out again. Upvalues that point into the generator's slots are
//! parked while it is suspended and boxed once its frame finally returns.

use std::sync::Arc;

use super::{Evaluator, Frame, Outcome, RuntimeErrorKind, RuntimeResult};
use crate::bytecode::{
    Closure, Generator, Iter, IterRef, IterSource, IterState, Program, ProgramKind, UpvalueRef, Val,
};

impl Evaluator {
    /// Build an iterator over any iterable value
    ///
    /// Iterators are returned as is, so a half-consumed iterator continues
    /// where it left off.
    pub fn make_iter(&mut self, value: &Val) -> RuntimeResult<IterRef> {
        let source = match value {
            Val::Iter(iter) => return Ok(Arc::clone(iter)),
            Val::List(list) => IterSource::List {
                list: Arc::clone(list),
                index: 0,
            },
            Val::Map(map) => {
                let (keys, version) = {
                    let data = map.read();
                    (data.keys(), data.version())
                };
                IterSource::Map {
                    map: Arc::clone(map),
                    keys,
                    index: 0,
                    version,
                }
            }
            Val::Str(s) => IterSource::Str {
                chars: s.chars().collect(),
                index: 0,
            },
            Val::Pair(pair) => IterSource::Pair {
                pair: Arc::clone(pair),
                index: 0,
            },
            Val::Usr(object) => IterSource::Usr(object.iter()?),
            Val::Closure(closure) => match &**closure {
                Closure::Script { program, upvalues } if program.kind == ProgramKind::Iterator => {
                    return match self.new_generator(Arc::clone(program), upvalues.clone(), &[])? {
                        Val::Iter(iter) => Ok(iter),
                        _ => unreachable!("generator constructor returned a non-iterator"),
                    };
                }
                _ => return Err(RuntimeErrorKind::NotIterable("closure").into()),
            },
            other => return Err(RuntimeErrorKind::NotIterable(other.type_name()).into()),
        };
        Ok(Arc::new(parking_lot::Mutex::new(Iter::new(source))))
    }

    /// Whether the iterator has a current item, producing it if needed
    pub fn iter_has(&mut self, iter: &IterRef) -> RuntimeResult<bool> {
        self.produce(iter)?;
        let ready = matches!(iter.lock().state, IterState::Ready(..));
        Ok(ready)
    }

    /// Consume the current item
    pub fn iter_next(&mut self, iter: &IterRef) -> RuntimeResult<Option<(Val, Val)>> {
        self.produce(iter)?;
        Ok(iter.lock().take_ready())
    }

    /// The last produced `(key, value)` pair
    #[must_use]
    pub fn iter_deref(&self, iter: &IterRef) -> Option<(Val, Val)> {
        iter.lock().deref()
    }

    /// Wrap an iterator program in a fresh, not yet started generator
    pub(super) fn new_generator(
        &mut self,
        program: Arc<Program>,
        upvalues: Vec<UpvalueRef>,
        args: &[Val],
    ) -> RuntimeResult<Val> {
        if args.len() != program.arity {
            return Err(RuntimeErrorKind::Arity {
                name: program.name.clone(),
                expected: program.arity,
                got: args.len(),
            }
            .into());
        }
        let generator = Generator::new(program, upvalues, args);
        Ok(Val::iter(Iter::new(IterSource::Generator(Some(Box::new(generator))))))
    }

    /// Bring the iterator to a state where `has` can answer
    fn produce(&mut self, iter: &IterRef) -> RuntimeResult<()> {
        let mut guard = iter.lock();
        if !guard.needs_advance() {
            return Ok(());
        }
        if !guard.is_generator() {
            let item = guard.advance_plain()?;
            guard.settle(item);
            return Ok(());
        }
        let taken = match &mut guard.source {
            IterSource::Generator(slot) => slot.take(),
            _ => None,
        };
        let Some(mut generator) = taken else {
            return Err(RuntimeErrorKind::GeneratorRunning.into());
        };
        // The generator may touch this iterator again while it runs.
        drop(guard);
        let result = self.resume(&mut generator);
        let mut guard = iter.lock();
        match result {
            Ok(Some(item)) => {
                guard.source = IterSource::Generator(Some(generator));
                guard.settle(Some(item));
                Ok(())
            }
            Ok(None) => {
                guard.settle(None);
                Ok(())
            }
            Err(error) => {
                guard.settle(None);
                Err(error)
            }
        }
    }

    /// Run a generator to its next `yield` (`Some`) or its end (`None`)
    fn resume(&mut self, generator: &mut Generator) -> RuntimeResult<Option<(Val, Val)>> {
        if self.frames.len() >= self.limits.max_frames {
            return Err(RuntimeErrorKind::StackOverflow.into());
        }
        let base = self.locals.len();
        let size = generator.program.local_count.max(generator.locals.len());
        if base + size > self.limits.max_locals {
            return Err(RuntimeErrorKind::StackOverflow.into());
        }
        self.locals.append(&mut generator.locals);
        self.locals.resize(base + size, Val::Null);
        self.unpark_upvalues(base, std::mem::take(&mut generator.parked));
        let stack_base = self.stack.len();
        self.stack.append(&mut generator.stack);
        self.frames.push(Frame {
            program: Arc::clone(&generator.program),
            pc: generator.pc,
            base,
            stack_base,
            upvalues: generator.upvalues.clone(),
        });
        let entry = self.frames.len() - 1;
        match self.run(entry)? {
            Outcome::Yield {
                key,
                value,
                pc,
                locals,
                stack,
                parked,
            } => {
                generator.pc = pc;
                generator.locals = locals;
                generator.stack = stack;
                generator.parked = parked;
                let key = key.unwrap_or(Val::Int(generator.next_index));
                generator.next_index += 1;
                Ok(Some((key, value)))
            }
            Outcome::Return(_) => Ok(None),
            Outcome::NoMatch => unreachable!("generator '{}' ended with no match", generator.program.name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::{Module, OpCode};

    /// iter count(n) { let i = 0; while i < n { yield i * 10; i += 1; } }
    fn counter() -> Arc<Module> {
        let mut p = Program::new("count", ProgramKind::Iterator);
        p.arity = 1;
        p.local_count = 2;
        let zero = p.add_int(0);
        let ten = p.add_int(10);
        let one = p.add_int(1);
        p.emit(OpCode::Int(zero), 1);
        p.emit(OpCode::StoreLocal(1), 1);
        p.emit(OpCode::Pop, 1);
        let start = p.current_offset();
        p.emit(OpCode::LoadLocal(1), 1);
        p.emit(OpCode::LoadLocal(0), 1);
        p.emit(OpCode::Lt, 1);
        let exit = p.emit_jump(OpCode::JumpIfFalse(0), 1);
        p.emit(OpCode::LoadLocal(1), 2);
        p.emit(OpCode::Int(ten), 2);
        p.emit(OpCode::Mul, 2);
        p.emit(OpCode::Yield { keyed: false }, 2);
        p.emit(OpCode::LoadLocal(1), 3);
        p.emit(OpCode::Int(one), 3);
        p.emit(OpCode::Add, 3);
        p.emit(OpCode::StoreLocal(1), 3);
        p.emit(OpCode::Pop, 3);
        p.emit_loop(start, 3);
        p.patch_jump(exit);
        p.emit(OpCode::Null, 4);
        p.emit(OpCode::Return, 4);
        let mut module = Module::new("test");
        assert!(module.add_iterator(p));
        Arc::new(module)
    }

    #[test]
    fn generator_yields_exactly_n_items() {
        let mut eval = Evaluator::new(counter());
        let Val::Iter(iter) = eval.call("count", &[Val::Int(3)]).unwrap() else {
            panic!("expected an iterator");
        };
        let mut seen = Vec::new();
        while eval.iter_has(&iter).unwrap() {
            seen.push(eval.iter_next(&iter).unwrap().unwrap());
        }
        assert_eq!(
            seen,
            vec![
                (Val::Int(0), Val::Int(0)),
                (Val::Int(1), Val::Int(10)),
                (Val::Int(2), Val::Int(20)),
            ]
        );
        for _ in 0..3 {
            assert!(!eval.iter_has(&iter).unwrap());
            assert_eq!(eval.iter_next(&iter).unwrap(), None);
        }
        assert!(eval.locals.is_empty());
        assert!(eval.stack.is_empty());
    }

    #[test]
    fn has_does_not_consume() {
        let mut eval = Evaluator::new(counter());
        let Val::Iter(iter) = eval.call("count", &[Val::Int(2)]).unwrap() else {
            panic!("expected an iterator");
        };
        assert!(eval.iter_has(&iter).unwrap());
        assert!(eval.iter_has(&iter).unwrap());
        assert_eq!(eval.iter_deref(&iter), Some((Val::Int(0), Val::Int(0))));
        assert_eq!(eval.iter_next(&iter).unwrap(), Some((Val::Int(0), Val::Int(0))));
        assert_eq!(eval.iter_next(&iter).unwrap(), Some((Val::Int(1), Val::Int(10))));
    }

    #[test]
    fn plain_iterables() {
        let mut eval = Evaluator::new(Arc::new(Module::new("t")));
        let iter = eval.make_iter(&Val::string("ab")).unwrap();
        assert_eq!(eval.iter_next(&iter).unwrap(), Some((Val::Int(0), Val::string("a"))));
        let err = eval.make_iter(&Val::Int(3)).unwrap_err();
        assert_eq!(err.message(), "int is not iterable");
    }
}
