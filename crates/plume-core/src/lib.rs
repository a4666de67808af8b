//! Plume Core - language engine for the Plume policy language
//!
//! This crate provides the core functionality:
//! - Lexer: tokenization with a bounded diagnostic window
//! - Parser: single-pass compiler from source to bytecode
//! - Bytecode: programs, modules, values, closures and iterators
//! - Proto: argument-shape descriptors for native calls
//! - VM: the evaluator and its host callback surface
//! - Natives: the intrinsic library
//! - Template: the template engine registry
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use plume_core::{compile_module, Evaluator, Val};
//!
//! let module = compile_module(r#"greet { "hello " + $ }"#).unwrap();
//! let mut eval = Evaluator::new(Arc::new(module));
//! let out = eval.eval_with_context("greet", Val::string("world")).unwrap();
//! assert_eq!(out, Some(Val::string("hello world")));
//! ```

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Lexer module - tokenization of Plume source code
pub mod lexer;

/// Parser module - compiles tokens straight to bytecode
pub mod parser;

/// Bytecode module - instruction set, programs, modules and values
pub mod bytecode;

/// Function prototypes - argument checking for native calls
pub mod proto;

/// Virtual machine module - bytecode execution
pub mod vm;

/// Intrinsic library
pub mod natives;

/// Template engine registry
pub mod template;

/// Evaluator resource limits
pub mod config;

/// Test utilities - helpers for testing Plume code
pub mod testutil;

/// Convenience re-export of the compiler entry points
pub use parser::{compile_module, compile_module_named, CompileError, CompileErrorKind};

/// Convenience re-export of the core data model
pub use bytecode::{Closure, Module, Program, UsrObject, Val};

/// Convenience re-export of the evaluator
pub use vm::{Evaluator, Host, NullHost, Phase, RuntimeError, RuntimeErrorKind, RuntimeResult};

/// Convenience re-export of the prototype validator
pub use proto::{Args, FuncProto, ProtoError};

/// Convenience re-export of limits
pub use config::Limits;
