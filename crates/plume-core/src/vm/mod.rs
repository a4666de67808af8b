//! Evaluator for compiled Plume modules
//!
//! This module provides a stack-based bytecode interpreter. One
//! [`Evaluator`] serves one unit of work (a connection, a request) and is
//! never shared between threads; the [`Module`] it runs is shared, and its
//! global vector is the only state evaluators have in common.
//!
//! Locals live on their own stack, separate from the operand stack, so a
//! suspended generator can lift its slots out and put them back later.

mod call;
mod error;
mod generator;
mod host;
pub mod ops;

pub use error::{RuntimeError, RuntimeErrorKind, RuntimeResult, StackFrame};
pub use host::{Host, NullHost};

use std::sync::Arc;

use parking_lot::Mutex;

use crate::bytecode::{Closure, Module, OpCode, Placeholder, Program, Upvalue, UpvalueRef, Val};
use crate::config::Limits;
use crate::natives;

/// Lifecycle phase an evaluator is running
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    /// Not running anything
    #[default]
    Idle,
    /// The one-time `global { }` block
    Global,
    /// The per-unit-of-work `session { }` block
    Session,
    /// The `config { }` block
    Config,
    /// Event rule dispatch
    Rule,
}

/// A call frame on the call stack
#[derive(Debug)]
struct Frame {
    /// The program being executed
    program: Arc<Program>,

    /// Index of the next instruction
    pc: usize,

    /// Base of this frame's slots on the locals stack
    base: usize,

    /// Operand stack height when the frame was entered
    stack_base: usize,

    /// Captured variables of the running closure
    upvalues: Vec<UpvalueRef>,
}

/// An active `try` on the handler stack
#[derive(Debug, Clone, Copy)]
struct Handler {
    /// Frame index where the handler was registered
    frame_index: usize,

    /// Operand stack height when the handler was pushed
    stack_len: usize,

    /// Instruction to resume at with the error message pushed
    catch_pc: usize,
}

/// How a run of the dispatch loop ended
#[derive(Debug)]
enum Outcome {
    /// The entry frame returned
    Return(Val),

    /// The entry frame (a generator) suspended
    Yield {
        key: Option<Val>,
        value: Val,
        pc: usize,
        locals: Vec<Val>,
        stack: Vec<Val>,
        parked: Vec<UpvalueRef>,
    },

    /// The entry frame (a rule) rejected the event
    NoMatch,
}

fn constant<T>(value: Option<T>, pool: &str, index: u32) -> T {
    match value {
        Some(value) => value,
        None => unreachable!("{pool} constant {index} out of range"),
    }
}

/// The Plume evaluator
pub struct Evaluator {
    /// The module being evaluated
    module: Arc<Module>,

    /// Callbacks for everything the language core cannot resolve
    host: Arc<dyn Host>,

    limits: Limits,

    /// Operand stack
    stack: Vec<Val>,

    /// Local slots of every active frame
    locals: Vec<Val>,

    /// Call stack
    frames: Vec<Frame>,

    /// Upvalues still pointing into the locals stack
    open_upvalues: Vec<UpvalueRef>,

    /// Error handler stack
    handlers: Vec<Handler>,

    /// Session slots, sized from the module's declarations
    session: Vec<Val>,

    phase: Phase,

    /// Name of the event being dispatched
    event: String,

    /// The `$` value of the event being dispatched
    context: Val,

    /// `@attr` annotations waiting for the next config item
    attrs: Vec<(String, Val)>,
}

impl std::fmt::Debug for Evaluator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Evaluator")
            .field("module", &self.module.source_name)
            .field("phase", &self.phase)
            .field("frames", &self.frames.len())
            .field("stack", &self.stack.len())
            .finish()
    }
}

impl Evaluator {
    /// Create an evaluator for a module, with no host and default limits
    #[must_use]
    pub fn new(module: Arc<Module>) -> Self {
        let session = vec![Val::Null; module.session_names.len()];
        Self {
            module,
            host: Arc::new(NullHost),
            limits: Limits::default(),
            stack: Vec::with_capacity(256),
            locals: Vec::with_capacity(256),
            frames: Vec::with_capacity(16),
            open_upvalues: Vec::new(),
            handlers: Vec::new(),
            session,
            phase: Phase::Idle,
            event: String::new(),
            context: Val::Null,
            attrs: Vec::new(),
        }
    }

    /// Install the host callbacks
    #[must_use]
    pub fn with_host(mut self, host: Arc<dyn Host>) -> Self {
        self.host = host;
        self
    }

    /// Replace the resource limits
    #[must_use]
    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    /// The limits this evaluator enforces
    #[must_use]
    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    /// The module being evaluated
    #[must_use]
    pub fn module(&self) -> &Arc<Module> {
        &self.module
    }

    /// The installed host
    #[must_use]
    pub fn host(&self) -> Arc<dyn Host> {
        Arc::clone(&self.host)
    }

    /// Current lifecycle phase
    #[must_use]
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Name of the event being dispatched (empty outside rules)
    #[must_use]
    pub fn event(&self) -> &str {
        &self.event
    }

    /// The `$` value of the event being dispatched
    #[must_use]
    pub fn context(&self) -> &Val {
        &self.context
    }

    /// Current value of a session slot
    #[must_use]
    pub fn session_value(&self, name: &str) -> Option<Val> {
        let slot = self.module.session_slot(name)?;
        Some(self.session.get(slot).cloned().unwrap_or(Val::Null))
    }

    // ===== Lifecycle =====

    /// Run the `global { }` block
    ///
    /// Hosts call this once per module, before any other phase.
    pub fn eval_global(&mut self) -> RuntimeResult<Val> {
        self.module.prepare_globals();
        let Some(program) = self.module.global.clone() else {
            return Ok(Val::Null);
        };
        tracing::debug!(module = %self.module.source_name, "eval_global");
        self.run_phase(Phase::Global, program)
    }

    /// Reset the session slots and run the `session { }` block
    pub fn eval_session(&mut self) -> RuntimeResult<Val> {
        self.session.clear();
        self.session.resize(self.module.session_names.len(), Val::Null);
        let Some(program) = self.module.session.clone() else {
            return Ok(Val::Null);
        };
        tracing::debug!(module = %self.module.source_name, "eval_session");
        self.run_phase(Phase::Session, program)
    }

    /// Run the `config { }` block, reporting its contents to the host
    pub fn eval_config(&mut self) -> RuntimeResult<Val> {
        let Some(program) = self.module.config.clone() else {
            return Ok(Val::Null);
        };
        tracing::debug!(module = %self.module.source_name, "eval_config");
        self.attrs.clear();
        self.run_phase(Phase::Config, program)
    }

    /// Dispatch an event with a null context
    pub fn eval(&mut self, event: &str) -> RuntimeResult<Option<Val>> {
        self.eval_with_context(event, Val::Null)
    }

    /// Dispatch an event: rules are tried in source order and the first
    /// whose guard holds runs; returns its value, or `None` if no rule matched
    ///
    /// A runtime error inside a matching rule is returned as is; later rules
    /// are not tried.
    pub fn eval_with_context(&mut self, event: &str, context: Val) -> RuntimeResult<Option<Val>> {
        tracing::debug!(module = %self.module.source_name, event, "dispatching event");
        let previous_event = std::mem::replace(&mut self.event, event.to_string());
        let previous_context = std::mem::replace(&mut self.context, context);
        let previous_phase = std::mem::replace(&mut self.phase, Phase::Rule);
        let result = self.dispatch_rules();
        self.phase = previous_phase;
        self.context = previous_context;
        self.event = previous_event;
        result
    }

    fn dispatch_rules(&mut self) -> RuntimeResult<Option<Val>> {
        let module = Arc::clone(&self.module);
        for rule in module.rules() {
            match self.run_program(Arc::clone(rule))? {
                Outcome::Return(value) => {
                    tracing::debug!(rule = %rule.name, "rule matched");
                    return Ok(Some(value));
                }
                Outcome::NoMatch => tracing::trace!(rule = %rule.name, "rule did not match"),
                Outcome::Yield { .. } => unreachable!("rule '{}' yielded", rule.name),
            }
        }
        Ok(None)
    }

    fn run_phase(&mut self, phase: Phase, program: Arc<Program>) -> RuntimeResult<Val> {
        let previous = std::mem::replace(&mut self.phase, phase);
        let result = self.run_program(program);
        self.phase = previous;
        match result? {
            Outcome::Return(value) => Ok(value),
            Outcome::NoMatch => Ok(Val::Null),
            Outcome::Yield { .. } => unreachable!("phase block yielded"),
        }
    }

    fn run_program(&mut self, program: Arc<Program>) -> RuntimeResult<Outcome> {
        self.push_frame(program, Vec::new(), Vec::new())?;
        let entry = self.frames.len() - 1;
        self.run(entry)
    }

    // ===== Execution loop =====

    /// Execute until the frame at `entry` finishes
    ///
    /// Errors are offered to handlers registered at or above `entry`; an
    /// unhandled error unwinds everything from `entry` up.
    fn run(&mut self, entry: usize) -> RuntimeResult<Outcome> {
        loop {
            match self.step(entry) {
                Ok(None) => {}
                Ok(Some(outcome)) => return Ok(outcome),
                Err(error) => {
                    let error = error.with_trace(self.stack_trace());
                    if !self.handle_error(entry, &error) {
                        self.unwind_to(entry);
                        return Err(error);
                    }
                }
            }
        }
    }

    fn step(&mut self, entry: usize) -> RuntimeResult<Option<Outcome>> {
        let op = self.fetch();
        match op {
            // ===== Constants =====
            OpCode::Null => self.push(Val::Null)?,
            OpCode::True => self.push(Val::Bool(true))?,
            OpCode::False => self.push(Val::Bool(false))?,
            OpCode::Int(index) => {
                let value = constant(self.frame().program.int(index), "int", index);
                self.push(Val::Int(value))?;
            }
            OpCode::Real(index) => {
                let value = constant(self.frame().program.real(index), "real", index);
                self.push(Val::Real(value))?;
            }
            OpCode::Str(index) => {
                let value = self.string_constant(index);
                self.push(Val::Str(value))?;
            }
            OpCode::Regexp(index) => {
                let value = constant(self.frame().program.regex(index).cloned(), "regex", index);
                self.push(Val::Regexp(value))?;
            }
            OpCode::Placeholder => self.push(Val::usr(Placeholder))?,

            // ===== Stack =====
            OpCode::Pop => {
                self.pop();
            }
            OpCode::Dup => {
                let value = self.peek(0).clone();
                self.push(value)?;
            }
            OpCode::Dup2 => {
                let below = self.peek(1).clone();
                let top = self.peek(0).clone();
                self.push(below)?;
                self.push(top)?;
            }

            // ===== Variables =====
            OpCode::LoadLocal(slot) => {
                let value = self.locals[self.local_index(slot)].clone();
                self.push(value)?;
            }
            OpCode::StoreLocal(slot) => {
                let index = self.local_index(slot);
                let value = self.peek(0).clone();
                self.locals[index] = value;
            }
            OpCode::LoadUpvalue(index) => {
                let value = self.load_upvalue(index);
                self.push(value)?;
            }
            OpCode::StoreUpvalue(index) => {
                let value = self.peek(0).clone();
                self.store_upvalue(index, value);
            }
            OpCode::CloseUpvalues(slot) => {
                let from = self.frame().base + slot as usize;
                self.close_upvalues(from);
            }
            OpCode::LoadSession(slot) => {
                let value = self.session.get(slot as usize).cloned().unwrap_or(Val::Null);
                self.push(value)?;
            }
            OpCode::StoreSession(slot) => {
                let slot = slot as usize;
                if slot >= self.session.len() {
                    self.session.resize(slot + 1, Val::Null);
                }
                let value = self.peek(0).clone();
                self.session[slot] = value;
            }
            OpCode::LoadGlobal(slot) => {
                let value = self.module.load_global(slot as usize);
                self.push(value)?;
            }
            OpCode::StoreGlobal(slot) => {
                let value = self.peek(0).clone();
                let initializing = self.phase == Phase::Global;
                self.module.store_global(slot as usize, value, initializing)?;
            }
            OpCode::LoadName(index) => {
                let name = self.string_constant(index);
                let value = self.load_name(&name)?;
                self.push(value)?;
            }
            OpCode::LoadDynamic(index) => {
                let name = self.string_constant(index);
                let host = Arc::clone(&self.host);
                let value = host.load_var(self, &name)?;
                self.push(value)?;
            }
            OpCode::StoreDynamic(index) => {
                let name = self.string_constant(index);
                let value = self.peek(0).clone();
                let host = Arc::clone(&self.host);
                host.store_var(self, &name, value)?;
            }
            OpCode::LoadExtern(index) => {
                let name = self.string_constant(index);
                self.push(call::extern_closure(name))?;
            }
            OpCode::LoadIntrinsic(index) => {
                let name = self.string_constant(index);
                let value = natives::closure(&name)
                    .ok_or_else(|| RuntimeErrorKind::UndefinedFunction(name.to_string()))?;
                self.push(value)?;
            }
            OpCode::LoadContext => {
                let value = self.context.clone();
                self.push(value)?;
            }

            // ===== Arithmetic & comparison =====
            OpCode::Add
            | OpCode::Sub
            | OpCode::Mul
            | OpCode::Div
            | OpCode::Mod
            | OpCode::Pow
            | OpCode::Eq
            | OpCode::Ne
            | OpCode::Lt
            | OpCode::Le
            | OpCode::Gt
            | OpCode::Ge
            | OpCode::RegexMatch
            | OpCode::RegexNotMatch => {
                let right = self.pop();
                let left = self.pop();
                self.push(ops::binary(op, &left, &right)?)?;
            }
            OpCode::Neg => {
                let value = self.pop();
                self.push(ops::negate(&value)?)?;
            }
            OpCode::Positive => {
                let value = self.pop();
                self.push(ops::positive(&value)?)?;
            }
            OpCode::Not => {
                let value = self.pop();
                self.push(Val::Bool(!value.is_truthy()))?;
            }

            // ===== Control flow =====
            OpCode::Jump(offset) => self.jump(offset),
            OpCode::JumpIfFalse(offset) => {
                if !self.pop().is_truthy() {
                    self.jump(offset);
                }
            }
            OpCode::OrJump(offset) => {
                if self.peek(0).is_truthy() {
                    self.jump(offset);
                } else {
                    self.pop();
                }
            }
            OpCode::AndJump(offset) => {
                if self.peek(0).is_truthy() {
                    self.pop();
                } else {
                    self.jump(offset);
                }
            }
            OpCode::EventIs(index) => {
                let name = self.string_constant(index);
                let matches = *name == *self.event;
                self.push(Val::Bool(matches))?;
            }
            OpCode::Match => {
                if !self.pop().is_truthy() {
                    assert_eq!(self.frames.len() - 1, entry, "match outside a rule frame");
                    self.pop_frame();
                    return Ok(Some(Outcome::NoMatch));
                }
            }
            OpCode::PushHandler(offset) => {
                let frame = self.frame();
                let handler = Handler {
                    frame_index: self.frames.len() - 1,
                    stack_len: self.stack.len(),
                    catch_pc: (frame.pc as i64 + i64::from(offset)) as usize,
                };
                self.handlers.push(handler);
            }
            OpCode::PopHandler => {
                self.handlers.pop();
            }
            OpCode::Return => {
                let value = self.pop();
                let index = self.frames.len() - 1;
                self.pop_frame();
                if index == entry {
                    return Ok(Some(Outcome::Return(value)));
                }
                self.push(value)?;
            }

            // ===== Constructors =====
            OpCode::NewList(count) => {
                let items = self.pop_args(count);
                self.push(Val::list(items))?;
            }
            OpCode::NewMap(count) => {
                let items = self.pop_args(count * 2);
                let mut entries = Vec::with_capacity(count as usize);
                let mut items = items.into_iter();
                while let (Some(key), Some(value)) = (items.next(), items.next()) {
                    entries.push((key.to_key()?, value));
                }
                self.push(Val::map(entries))?;
            }
            OpCode::NewPair => {
                let second = self.pop();
                let first = self.pop();
                self.push(Val::pair(first, second))?;
            }
            OpCode::Concat(count) => {
                let parts = self.pop_args(count);
                let mut text = String::new();
                for part in &parts {
                    text.push_str(&part.to_display_string()?);
                }
                self.push(Val::from(text))?;
            }
            OpCode::Closure(index) => {
                let closure = self.make_closure(index);
                self.push(closure)?;
            }
            OpCode::Template(index) => {
                let context = self.pop();
                let template = constant(self.frame().program.template(index).cloned(), "template", index);
                let text = template
                    .execute(&context)
                    .map_err(|e| RuntimeErrorKind::Template(e.to_string()))?;
                self.push(Val::from(text))?;
            }

            // ===== Access =====
            OpCode::DotGet(index) => {
                let name = self.string_constant(index);
                let object = self.pop();
                self.push(ops::dot_get(&object, &name)?)?;
            }
            OpCode::DotSet(index) => {
                let name = self.string_constant(index);
                let value = self.pop();
                let object = self.pop();
                ops::dot_set(&object, &name, value.clone())?;
                self.push(value)?;
            }
            OpCode::IndexGet => {
                let index = self.pop();
                let object = self.pop();
                self.push(ops::index_get(&object, &index)?)?;
            }
            OpCode::IndexSet => {
                let value = self.pop();
                let index = self.pop();
                let object = self.pop();
                ops::index_set(&object, &index, value.clone(), self.limits.max_collection_len)?;
                self.push(value)?;
            }

            // ===== Calls =====
            OpCode::Call(argc) => {
                let args = self.pop_args(argc);
                let callee = self.pop();
                if let Some(value) = self.call_dispatch(callee, args)? {
                    self.push(value)?;
                }
            }
            OpCode::CallName { name, argc } => {
                let name = self.string_constant(name);
                let args = self.pop_args(argc);
                if let Some(value) = self.call_name(&name, args)? {
                    self.push(value)?;
                }
            }
            OpCode::CallMethod { name, argc } => {
                let name = self.string_constant(name);
                let args = self.pop_args(argc);
                let receiver = self.pop();
                let value = self.call_method(&receiver, &name, &args)?;
                self.push(value)?;
            }

            // ===== Host interaction =====
            OpCode::Action(index) => {
                let name = self.string_constant(index);
                let value = self.pop();
                let host = Arc::clone(&self.host);
                host.action(self, &name, value)?;
            }
            OpCode::PushConfig(index) => {
                let name = self.string_constant(index);
                let label = self.pop();
                let attrs = self.take_attrs();
                let host = Arc::clone(&self.host);
                host.push_config(self, &name, label, attrs)?;
            }
            OpCode::PopConfig => {
                let host = Arc::clone(&self.host);
                host.pop_config(self)?;
            }
            OpCode::ConfigProperty(index) => {
                let name = self.string_constant(index);
                let value = self.pop();
                let attrs = self.take_attrs();
                let host = Arc::clone(&self.host);
                host.config_property(self, &name, value, attrs)?;
            }
            OpCode::SetAttr(index) => {
                let name = self.string_constant(index);
                let value = self.pop();
                self.attrs.push((name.to_string(), value));
            }

            // ===== Iteration =====
            OpCode::IterInit => {
                let iterable = self.pop();
                let iter = self.make_iter(&iterable)?;
                self.push(Val::Iter(iter))?;
            }
            OpCode::IterNext { exit, pair } => {
                let Val::Iter(iter) = self.pop() else {
                    unreachable!("ITER_NEXT without an iterator");
                };
                match self.iter_next(&iter)? {
                    Some((key, value)) => {
                        if pair {
                            self.push(key)?;
                        }
                        self.push(value)?;
                    }
                    None => self.jump(exit),
                }
            }
            OpCode::Yield { keyed } => {
                let value = self.pop();
                let key = if keyed { Some(self.pop()) } else { None };
                assert_eq!(self.frames.len() - 1, entry, "yield outside a generator frame");
                let Some(frame) = self.frames.pop() else {
                    unreachable!("yield without a frame");
                };
                let parked = self.park_upvalues(frame.base);
                let locals = self.locals.split_off(frame.base);
                let stack = self.stack.split_off(frame.stack_base);
                return Ok(Some(Outcome::Yield {
                    key,
                    value,
                    pc: frame.pc,
                    locals,
                    stack,
                    parked,
                }));
            }
        }
        Ok(None)
    }

    // ===== Stack operations =====

    #[inline]
    fn push(&mut self, value: Val) -> RuntimeResult<()> {
        if self.stack.len() >= self.limits.max_stack {
            return Err(RuntimeErrorKind::StackOverflow.into());
        }
        self.stack.push(value);
        Ok(())
    }

    #[inline]
    fn pop(&mut self) -> Val {
        match self.stack.pop() {
            Some(value) => value,
            None => unreachable!("operand stack underflow"),
        }
    }

    #[inline]
    fn peek(&self, distance: usize) -> &Val {
        match self.stack.len().checked_sub(distance + 1).and_then(|i| self.stack.get(i)) {
            Some(value) => value,
            None => unreachable!("operand stack underflow"),
        }
    }

    /// Pop the top `count` values, oldest first
    fn pop_args(&mut self, count: u32) -> Vec<Val> {
        let count = count as usize;
        assert!(count <= self.stack.len(), "operand stack underflow");
        self.stack.split_off(self.stack.len() - count)
    }

    // ===== Frame operations =====

    #[inline]
    fn frame(&self) -> &Frame {
        match self.frames.last() {
            Some(frame) => frame,
            None => unreachable!("no active frame"),
        }
    }

    #[inline]
    fn frame_mut(&mut self) -> &mut Frame {
        match self.frames.last_mut() {
            Some(frame) => frame,
            None => unreachable!("no active frame"),
        }
    }

    #[inline]
    fn fetch(&mut self) -> OpCode {
        let frame = self.frame_mut();
        let Some(op) = frame.program.op(frame.pc) else {
            unreachable!("program '{}' ran past its last instruction", frame.program.name);
        };
        frame.pc += 1;
        op
    }

    #[inline]
    fn jump(&mut self, offset: i32) {
        let frame = self.frame_mut();
        frame.pc = (frame.pc as i64 + i64::from(offset)) as usize;
    }

    fn string_constant(&self, index: u32) -> Arc<str> {
        constant(self.frame().program.string(index).cloned(), "string", index)
    }

    /// Enter a program with its arguments in the first local slots
    fn push_frame(&mut self, program: Arc<Program>, upvalues: Vec<UpvalueRef>, args: Vec<Val>) -> RuntimeResult<()> {
        if args.len() != program.arity {
            return Err(RuntimeErrorKind::Arity {
                name: program.name.clone(),
                expected: program.arity,
                got: args.len(),
            }
            .into());
        }
        if self.frames.len() >= self.limits.max_frames {
            return Err(RuntimeErrorKind::StackOverflow.into());
        }
        let base = self.locals.len();
        let size = program.local_count.max(args.len());
        if base + size > self.limits.max_locals {
            return Err(RuntimeErrorKind::StackOverflow.into());
        }
        self.locals.extend(args);
        self.locals.resize(base + size, Val::Null);
        self.frames.push(Frame {
            program,
            pc: 0,
            base,
            stack_base: self.stack.len(),
            upvalues,
        });
        Ok(())
    }

    /// Leave the current frame, boxing its captured slots
    fn pop_frame(&mut self) -> Frame {
        let Some(frame) = self.frames.pop() else {
            unreachable!("frame stack underflow");
        };
        self.close_upvalues(frame.base);
        self.locals.truncate(frame.base);
        self.stack.truncate(frame.stack_base);
        let depth = self.frames.len();
        self.handlers.retain(|h| h.frame_index < depth);
        frame
    }

    fn unwind_to(&mut self, entry: usize) {
        while self.frames.len() > entry {
            self.pop_frame();
        }
    }

    // ===== Local variables =====

    #[inline]
    fn local_index(&self, slot: u32) -> usize {
        let index = self.frame().base + slot as usize;
        assert!(index < self.locals.len(), "local slot {slot} out of range");
        index
    }

    // ===== Upvalues =====

    fn capture_upvalue(&mut self, slot: usize) -> UpvalueRef {
        for upvalue in &self.open_upvalues {
            if matches!(*upvalue.lock(), Upvalue::OnStack(s) if s == slot) {
                return Arc::clone(upvalue);
            }
        }
        let upvalue = Arc::new(Mutex::new(Upvalue::OnStack(slot)));
        self.open_upvalues.push(Arc::clone(&upvalue));
        upvalue
    }

    fn upvalue(&self, index: u32) -> UpvalueRef {
        match self.frame().upvalues.get(index as usize) {
            Some(upvalue) => Arc::clone(upvalue),
            None => unreachable!("upvalue {index} out of range"),
        }
    }

    fn load_upvalue(&self, index: u32) -> Val {
        let upvalue = self.upvalue(index);
        let guard = upvalue.lock();
        match &*guard {
            Upvalue::OnStack(slot) => self.locals[*slot].clone(),
            Upvalue::Parked { value, .. } | Upvalue::Boxed(value) => value.clone(),
        }
    }

    fn store_upvalue(&mut self, index: u32, value: Val) {
        let upvalue = self.upvalue(index);
        let mut guard = upvalue.lock();
        match &mut *guard {
            Upvalue::OnStack(slot) => self.locals[*slot] = value,
            Upvalue::Parked { value: boxed, .. } | Upvalue::Boxed(boxed) => *boxed = value,
        }
    }

    /// Box every open upvalue at or above an absolute locals index
    fn close_upvalues(&mut self, from: usize) {
        let locals = &self.locals;
        self.open_upvalues.retain(|upvalue| {
            let mut guard = upvalue.lock();
            match *guard {
                Upvalue::OnStack(slot) if slot >= from => {
                    *guard = Upvalue::Boxed(locals.get(slot).cloned().unwrap_or(Val::Null));
                    false
                }
                _ => true,
            }
        });
    }

    /// Detach the open upvalues of a suspending generator frame
    ///
    /// Each one keeps the slot's current value until [`Self::unpark_upvalues`]
    /// moves it back onto the stack.
    fn park_upvalues(&mut self, base: usize) -> Vec<UpvalueRef> {
        let locals = &self.locals;
        let mut parked = Vec::new();
        self.open_upvalues.retain(|upvalue| {
            let mut guard = upvalue.lock();
            match *guard {
                Upvalue::OnStack(slot) if slot >= base => {
                    let value = locals.get(slot).cloned().unwrap_or(Val::Null);
                    *guard = Upvalue::Parked {
                        slot: slot - base,
                        value,
                    };
                    parked.push(Arc::clone(upvalue));
                    false
                }
                _ => true,
            }
        });
        parked
    }

    /// Reattach parked upvalues to a resumed generator frame at `base`
    fn unpark_upvalues(&mut self, base: usize, parked: Vec<UpvalueRef>) {
        for upvalue in parked {
            let mut guard = upvalue.lock();
            let Upvalue::Parked { slot, value } = &mut *guard else {
                continue;
            };
            let slot = base + *slot;
            self.locals[slot] = std::mem::replace(value, Val::Null);
            *guard = Upvalue::OnStack(slot);
            drop(guard);
            self.open_upvalues.push(upvalue);
        }
    }

    fn make_closure(&mut self, index: u32) -> Val {
        let program = constant(self.frame().program.function(index).cloned(), "function", index);
        let base = self.frame().base;
        let upvalues = program
            .upvalues
            .iter()
            .map(|desc| {
                if desc.is_local {
                    self.capture_upvalue(base + desc.index as usize)
                } else {
                    self.upvalue(desc.index)
                }
            })
            .collect();
        Val::Closure(Arc::new(Closure::Script { program, upvalues }))
    }

    // ===== Host interaction =====

    fn take_attrs(&mut self) -> Val {
        Val::map(std::mem::take(&mut self.attrs))
    }

    // ===== Error handling =====

    /// Hand an error to the innermost handler registered at or above `entry`
    fn handle_error(&mut self, entry: usize, error: &RuntimeError) -> bool {
        match self.handlers.last() {
            Some(handler) if handler.frame_index >= entry => {}
            _ => return false,
        }
        let Some(handler) = self.handlers.pop() else {
            return false;
        };
        while self.frames.len() > handler.frame_index + 1 {
            self.pop_frame();
        }
        self.stack.truncate(handler.stack_len);
        self.stack.push(Val::string(error.message()));
        self.frame_mut().pc = handler.catch_pc;
        tracing::trace!(error = %error.kind, "error caught by try");
        true
    }

    fn stack_trace(&self) -> Vec<StackFrame> {
        self.frames
            .iter()
            .rev()
            .map(|frame| StackFrame::new(frame.program.name.clone(), frame.program.line(frame.pc.saturating_sub(1))))
            .collect()
    }
}
