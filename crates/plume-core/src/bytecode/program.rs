//! Program - one compiled unit of bytecode with its constant pools

use std::fmt;
use std::sync::Arc;

use regex::Regex;

use super::opcode::OpCode;
use crate::template::Template;

/// What a program was compiled from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProgramKind {
    /// The `global { }` block
    Global,
    /// The `session { }` block
    Session,
    /// The `config { }` block
    Config,
    /// An event rule
    Rule,
    /// A function, named or anonymous
    Function,
    /// An iterator (generator) body
    Iterator,
}

impl fmt::Display for ProgramKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProgramKind::Global => "global",
            ProgramKind::Session => "session",
            ProgramKind::Config => "config",
            ProgramKind::Rule => "rule",
            ProgramKind::Function => "fn",
            ProgramKind::Iterator => "iter",
        };
        f.write_str(name)
    }
}

/// Where a closure's captured variable comes from when it is created
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpvalueDesc {
    /// True: a local slot of the enclosing frame; false: one of the
    /// enclosing closure's own upvalues
    pub is_local: bool,
    /// Slot or upvalue index
    pub index: u32,
}

/// A compiled program
///
/// Holds a flat instruction list, one source line per instruction, and
/// separate constant pools. Programs are built by the compiler and frozen
/// behind an `Arc` afterwards.
#[derive(Clone)]
pub struct Program {
    /// Rule, function or block name
    pub name: String,

    /// What this program was compiled from
    pub kind: ProgramKind,

    /// Number of declared parameters
    pub arity: usize,

    /// Number of local slots a frame of this program needs
    pub local_count: usize,

    /// Capture descriptors (function and iterator programs only)
    pub upvalues: Vec<UpvalueDesc>,

    code: Vec<OpCode>,
    lines: Vec<u32>,

    ints: Vec<i64>,
    reals: Vec<f64>,
    strings: Vec<Arc<str>>,
    regexes: Vec<Arc<Regex>>,
    templates: Vec<Arc<dyn Template>>,
    functions: Vec<Arc<Program>>,
}

impl Program {
    /// Create an empty program
    #[must_use]
    pub fn new(name: impl Into<String>, kind: ProgramKind) -> Self {
        Self {
            name: name.into(),
            kind,
            arity: 0,
            local_count: 0,
            upvalues: Vec::new(),
            code: Vec::new(),
            lines: Vec::new(),
            ints: Vec::new(),
            reals: Vec::new(),
            strings: Vec::new(),
            regexes: Vec::new(),
            templates: Vec::new(),
            functions: Vec::new(),
        }
    }

    /// Number of instructions
    #[must_use]
    pub fn len(&self) -> usize {
        self.code.len()
    }

    /// Returns true if no instructions were emitted
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }

    /// The instruction list
    #[must_use]
    pub fn code(&self) -> &[OpCode] {
        &self.code
    }

    /// Instruction at `pc`
    #[must_use]
    pub fn op(&self, pc: usize) -> Option<OpCode> {
        self.code.get(pc).copied()
    }

    /// Source line of the instruction at `pc`
    #[must_use]
    pub fn line(&self, pc: usize) -> u32 {
        self.lines
            .get(pc)
            .or_else(|| self.lines.last())
            .copied()
            .unwrap_or(0)
    }

    /// Append an instruction; returns its index
    pub fn emit(&mut self, op: OpCode, line: u32) -> usize {
        self.code.push(op);
        self.lines.push(line);
        self.code.len() - 1
    }

    /// The most recently emitted instruction
    #[must_use]
    pub fn last_op(&self) -> Option<OpCode> {
        self.code.last().copied()
    }

    /// Overwrite the most recently emitted instruction
    pub fn replace_last(&mut self, op: OpCode) {
        if let Some(last) = self.code.last_mut() {
            *last = op;
        }
    }

    /// Remove and return the most recently emitted instruction
    pub fn pop_op(&mut self) -> Option<OpCode> {
        self.lines.pop();
        self.code.pop()
    }

    /// Remove every instruction from `start` on, returning them with lines
    ///
    /// Because jumps are relative, the returned run can be re-emitted
    /// elsewhere with [`Program::splice`] unchanged.
    pub fn cut(&mut self, start: usize) -> Vec<(OpCode, u32)> {
        let ops = self.code.split_off(start);
        let lines = self.lines.split_off(start);
        ops.into_iter().zip(lines).collect()
    }

    /// Re-emit a run previously taken with [`Program::cut`]
    pub fn splice(&mut self, run: Vec<(OpCode, u32)>) {
        for (op, line) in run {
            self.emit(op, line);
        }
    }

    /// Emit a jump with a placeholder offset; returns the index to patch
    pub fn emit_jump(&mut self, op: OpCode, line: u32) -> usize {
        self.emit(op.with_jump_offset(0), line)
    }

    /// Point the jump at `at` to the next instruction to be emitted
    pub fn patch_jump(&mut self, at: usize) {
        let target = self.code.len();
        self.patch_jump_to(at, target);
    }

    /// Point the jump at `at` to `target`
    pub fn patch_jump_to(&mut self, at: usize, target: usize) {
        let offset = target as i64 - (at as i64 + 1);
        self.code[at] = self.code[at].with_jump_offset(offset as i32);
    }

    /// Emit a backwards jump to `loop_start`
    pub fn emit_loop(&mut self, loop_start: usize, line: u32) {
        let at = self.emit(OpCode::Jump(0), line);
        self.patch_jump_to(at, loop_start);
    }

    /// Current instruction index (for jump targets)
    #[must_use]
    pub fn current_offset(&self) -> usize {
        self.code.len()
    }

    /// Add an integer constant, deduplicated
    pub fn add_int(&mut self, value: i64) -> u32 {
        intern(&mut self.ints, value, |a, b| a == b)
    }

    /// Add a real constant, deduplicated by bit pattern
    pub fn add_real(&mut self, value: f64) -> u32 {
        intern(&mut self.reals, value, |a, b| a.to_bits() == b.to_bits())
    }

    /// Add a string constant, deduplicated
    pub fn add_string(&mut self, value: &str) -> u32 {
        if let Some(i) = self.strings.iter().position(|s| &**s == value) {
            return i as u32;
        }
        self.strings.push(Arc::from(value));
        (self.strings.len() - 1) as u32
    }

    /// Add a compiled regex, deduplicated by pattern
    pub fn add_regex(&mut self, regex: Regex) -> u32 {
        if let Some(i) = self.regexes.iter().position(|r| r.as_str() == regex.as_str()) {
            return i as u32;
        }
        self.regexes.push(Arc::new(regex));
        (self.regexes.len() - 1) as u32
    }

    /// Add a compiled template
    pub fn add_template(&mut self, template: Arc<dyn Template>) -> u32 {
        self.templates.push(template);
        (self.templates.len() - 1) as u32
    }

    /// Add a nested function or iterator program
    pub fn add_function(&mut self, program: Program) -> u32 {
        self.functions.push(Arc::new(program));
        (self.functions.len() - 1) as u32
    }

    /// Integer constant by index
    #[must_use]
    pub fn int(&self, index: u32) -> Option<i64> {
        self.ints.get(index as usize).copied()
    }

    /// Real constant by index
    #[must_use]
    pub fn real(&self, index: u32) -> Option<f64> {
        self.reals.get(index as usize).copied()
    }

    /// String constant by index
    #[must_use]
    pub fn string(&self, index: u32) -> Option<&Arc<str>> {
        self.strings.get(index as usize)
    }

    /// Regex constant by index
    #[must_use]
    pub fn regex(&self, index: u32) -> Option<&Arc<Regex>> {
        self.regexes.get(index as usize)
    }

    /// Template constant by index
    #[must_use]
    pub fn template(&self, index: u32) -> Option<&Arc<dyn Template>> {
        self.templates.get(index as usize)
    }

    /// Nested program by index
    #[must_use]
    pub fn function(&self, index: u32) -> Option<&Arc<Program>> {
        self.functions.get(index as usize)
    }

    /// All nested programs
    #[must_use]
    pub fn functions(&self) -> &[Arc<Program>] {
        &self.functions
    }
}

fn intern<T: Copy>(pool: &mut Vec<T>, value: T, same: impl Fn(&T, &T) -> bool) -> u32 {
    if let Some(i) = pool.iter().position(|existing| same(existing, &value)) {
        return i as u32;
    }
    pool.push(value);
    (pool.len() - 1) as u32
}

impl fmt::Debug for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Program")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("arity", &self.arity)
            .field("code_len", &self.code.len())
            .field("local_count", &self.local_count)
            .field("upvalues", &self.upvalues.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constants_are_deduplicated() {
        let mut program = Program::new("t", ProgramKind::Rule);
        assert_eq!(program.add_int(42), 0);
        assert_eq!(program.add_int(7), 1);
        assert_eq!(program.add_int(42), 0);
        assert_eq!(program.add_string("a"), 0);
        assert_eq!(program.add_string("a"), 0);
        assert_eq!(program.add_real(0.5), 0);
        assert_eq!(program.add_real(-0.0), 1);
        assert_eq!(program.add_real(0.0), 2);
    }

    #[test]
    fn jump_patching_is_relative() {
        let mut program = Program::new("t", ProgramKind::Rule);
        program.emit(OpCode::True, 1);
        let jump = program.emit_jump(OpCode::JumpIfFalse(0), 1);
        program.emit(OpCode::Null, 2);
        program.emit(OpCode::Pop, 2);
        program.patch_jump(jump);
        assert_eq!(program.op(jump), Some(OpCode::JumpIfFalse(2)));

        let start = program.current_offset();
        program.emit(OpCode::Null, 3);
        program.emit_loop(start, 3);
        assert_eq!(program.last_op(), Some(OpCode::Jump(-2)));
    }

    #[test]
    fn cut_and_splice_preserve_lines() {
        let mut program = Program::new("t", ProgramKind::Rule);
        program.emit(OpCode::Null, 1);
        program.emit(OpCode::True, 2);
        program.emit(OpCode::False, 3);
        let run = program.cut(1);
        assert_eq!(program.len(), 1);
        program.emit(OpCode::Pop, 4);
        program.splice(run);
        assert_eq!(program.code(), &[OpCode::Null, OpCode::Pop, OpCode::True, OpCode::False]);
        assert_eq!(program.line(2), 2);
        assert_eq!(program.line(3), 3);
    }

    #[test]
    fn replace_last_swaps_in_store() {
        let mut program = Program::new("t", ProgramKind::Rule);
        program.emit(OpCode::LoadLocal(0), 1);
        let store = program.last_op().and_then(|op| op.store_form()).unwrap();
        program.replace_last(store);
        assert_eq!(program.code(), &[OpCode::StoreLocal(0)]);
    }
}
