//! Host callback surface
//!
//! The language core does not know what variables, actions or configuration
//! mean to the program embedding it. Whatever it cannot resolve itself is
//! handed to a [`Host`].

use super::{Evaluator, RuntimeError, RuntimeErrorKind, RuntimeResult};
use crate::bytecode::Val;

/// Callbacks an embedding program implements
///
/// Every method has a default that reports the request as unsupported, so a
/// host only overrides what it needs. Callbacks take `&self` because scripts
/// may re-enter the evaluator (and therefore the host) from inside a
/// callback; hosts that record state use interior mutability.
pub trait Host: Send + Sync {
    /// Resolve a name the compiler could not bind (`x`, `dynamic::x`)
    fn load_var(&self, eval: &mut Evaluator, name: &str) -> RuntimeResult<Val> {
        let _ = eval;
        Err(RuntimeErrorKind::UndefinedVariable(name.to_string()).into())
    }

    /// Assignment to a name the compiler could not bind
    fn store_var(&self, eval: &mut Evaluator, name: &str, value: Val) -> RuntimeResult<()> {
        let _ = (eval, value);
        Err(RuntimeErrorKind::UndefinedVariable(name.to_string()).into())
    }

    /// `name => value` outside the global, session and config blocks
    fn action(&self, eval: &mut Evaluator, name: &str, value: Val) -> RuntimeResult<()> {
        let _ = (eval, value);
        Err(RuntimeError::host(format!("unsupported action '{name}'")))
    }

    /// Call to a function no builtin, intrinsic or module function provides
    fn call(&self, eval: &mut Evaluator, name: &str, args: &[Val]) -> RuntimeResult<Val> {
        let _ = (eval, args);
        Err(RuntimeErrorKind::UndefinedFunction(name.to_string()).into())
    }

    /// Start of a `name ["label"] { }` config section
    fn push_config(&self, eval: &mut Evaluator, name: &str, label: Val, attrs: Val) -> RuntimeResult<()> {
        let _ = (eval, label, attrs);
        Err(RuntimeError::host(format!("unsupported config section '{name}'")))
    }

    /// End of the innermost config section
    fn pop_config(&self, eval: &mut Evaluator) -> RuntimeResult<()> {
        let _ = eval;
        Err(RuntimeError::host("unsupported config section end"))
    }

    /// `key => value` inside `config`
    fn config_property(&self, eval: &mut Evaluator, key: &str, value: Val, attrs: Val) -> RuntimeResult<()> {
        let _ = (eval, value, attrs);
        Err(RuntimeError::host(format!("unsupported config property '{key}'")))
    }

    /// Unresolved call inside `config`
    fn config_command(&self, eval: &mut Evaluator, key: &str, args: &[Val], attrs: Val) -> RuntimeResult<Val> {
        let _ = (eval, args, attrs);
        Err(RuntimeError::host(format!("unsupported config command '{key}'")))
    }
}

/// A host that supports nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct NullHost;

impl Host for NullHost {}
