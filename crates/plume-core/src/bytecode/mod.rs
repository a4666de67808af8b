//! Bytecode module for the Plume evaluator
//!
//! This module provides:
//! - `OpCode`: The instruction set
//! - `Program`: One compiled unit with its constant pools
//! - `Module`: Every program of a source document plus shared globals
//! - `Val`: Runtime value representation, closures, iterators and the
//!   host extension protocol
//! - Disassembler utilities for debugging

mod closure;
mod debug;
mod iter;
mod module;
mod opcode;
mod program;
mod usr;
mod value;

pub use closure::{Closure, NativeFn, Upvalue, UpvalueRef};
pub use debug::{disassemble_instruction, disassemble_module, disassemble_program};
pub use iter::{Generator, Iter, IterSource, IterState};
pub use module::Module;
pub use opcode::OpCode;
pub use program::{Program, ProgramKind, UpvalueDesc};
pub use usr::{Placeholder, UsrIter, UsrObject, PLACEHOLDER_TAG};
pub use value::{IterRef, ListRef, MapData, MapRef, Val};
