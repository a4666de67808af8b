//! Per-function compiler state: locals, captures, loops

use crate::bytecode::{OpCode, Program, ProgramKind, UpvalueDesc};

/// A local variable in scope
#[derive(Debug, Clone)]
pub(super) struct Local {
    /// Variable name
    pub name: String,
    /// Scope depth (0 = function body)
    pub depth: u32,
    /// Frame slot
    pub slot: u32,
    /// Whether a nested closure captures the variable
    pub captured: bool,
}

/// Loop information for break/continue
#[derive(Debug, Clone)]
pub(super) struct LoopInfo {
    /// Instruction index `continue` jumps back to
    pub continue_target: usize,
    /// First local slot declared inside the loop
    pub local_base: u32,
    /// `try` nesting depth when entering the loop
    pub try_depth: u32,
    /// Indices of break jumps to patch
    pub break_jumps: Vec<usize>,
}

/// Compiler state for one program
#[derive(Debug)]
pub(super) struct FuncState {
    /// The program being compiled
    pub program: Program,
    /// Local variables, innermost last
    pub locals: Vec<Local>,
    /// Capture descriptors
    pub upvalues: Vec<UpvalueDesc>,
    /// Current scope depth
    pub scope_depth: u32,
    /// Active loops
    pub loops: Vec<LoopInfo>,
    /// Number of enclosing `try` bodies
    pub try_depth: u32,
}

impl FuncState {
    pub fn new(name: impl Into<String>, kind: ProgramKind) -> Self {
        Self {
            program: Program::new(name, kind),
            locals: Vec::new(),
            upvalues: Vec::new(),
            scope_depth: 0,
            loops: Vec::new(),
            try_depth: 0,
        }
    }

    pub fn kind(&self) -> ProgramKind {
        self.program.kind
    }

    /// Declare a local in the current scope; returns its slot
    pub fn declare_local(&mut self, name: &str) -> u32 {
        let slot = self.locals.len() as u32;
        self.locals.push(Local {
            name: name.to_string(),
            depth: self.scope_depth,
            slot,
            captured: false,
        });
        self.program.local_count = self.program.local_count.max(self.locals.len());
        slot
    }

    /// Innermost local with this name
    pub fn resolve_local(&self, name: &str) -> Option<usize> {
        self.locals.iter().rposition(|local| local.name == name)
    }

    /// Reuse or add a capture descriptor; returns the upvalue index
    pub fn add_upvalue(&mut self, index: u32, is_local: bool) -> u32 {
        let desc = UpvalueDesc { is_local, index };
        if let Some(existing) = self.upvalues.iter().position(|u| *u == desc) {
            return existing as u32;
        }
        self.upvalues.push(desc);
        (self.upvalues.len() - 1) as u32
    }

    pub fn begin_scope(&mut self) {
        self.scope_depth += 1;
    }

    /// Drop the locals of the innermost scope, boxing any that were captured
    pub fn end_scope(&mut self, line: u32) {
        self.scope_depth -= 1;
        let keep = self
            .locals
            .iter()
            .rposition(|local| local.depth <= self.scope_depth)
            .map_or(0, |i| i + 1);
        let dropped = self.locals.split_off(keep);
        if let Some(first_captured) = dropped.iter().filter(|l| l.captured).map(|l| l.slot).min() {
            self.program.emit(OpCode::CloseUpvalues(first_captured), line);
        }
    }

    /// Slot the next declared local will get
    pub fn next_slot(&self) -> u32 {
        self.locals.len() as u32
    }

    /// Whether statements are at the top level of a phase block
    pub fn at_block_top(&self) -> bool {
        self.scope_depth == 0
    }

    /// Shift pending break jumps that were moved by a cut-and-splice
    pub fn relocate_jumps(&mut self, from: usize, to: usize, shift: isize) {
        for info in &mut self.loops {
            for jump in &mut info.break_jumps {
                if (from..to).contains(jump) {
                    *jump = (*jump as isize + shift) as usize;
                }
            }
        }
    }

    /// Freeze into a program
    pub fn finish(mut self) -> Program {
        self.program.upvalues = self.upvalues;
        self.program
    }
}
