//! Test utilities for Plume
//!
//! Helpers for compiling and running snippets, plus a [`RecordingHost`]
//! that remembers every callback it receives.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::bytecode::{Module, Val};
use crate::parser::compile_module;
use crate::vm::{Evaluator, Host, RuntimeErrorKind, RuntimeResult};

/// Result type for test helpers
pub type TestResult<T> = Result<T, String>;

/// Compile a module, rendering compile errors as strings
///
/// # Errors
/// Returns the rendered compile error
pub fn compile(source: &str) -> TestResult<Arc<Module>> {
    compile_module(source)
        .map(Arc::new)
        .map_err(|e| format!("Compile error: {e}"))
}

/// Evaluate a single expression as the body of a rule
///
/// # Errors
/// Returns error if compilation or execution fails
pub fn eval_expr(source: &str) -> TestResult<Val> {
    eval_rule(&format!("main {{ {source} }}"), "main")
}

/// Compile `source`, run its global and session blocks, then dispatch
/// `event` and return the matching rule's value
///
/// # Errors
/// Returns error if compilation or any phase fails, or no rule matches
pub fn eval_rule(source: &str, event: &str) -> TestResult<Val> {
    let module = compile(source)?;
    let mut eval = Evaluator::new(module);
    eval.eval_global().map_err(|e| format!("Runtime error: {e}"))?;
    eval.eval_session().map_err(|e| format!("Runtime error: {e}"))?;
    eval.eval(event)
        .map_err(|e| format!("Runtime error: {e}"))?
        .ok_or_else(|| format!("No rule matched event '{event}'"))
}

/// Evaluate an expression and expect the error message a `try` would see
///
/// # Errors
/// Returns error if evaluation unexpectedly succeeds or fails to compile
pub fn eval_error(source: &str) -> TestResult<String> {
    let module = compile(&format!("main {{ {source} }}"))?;
    let mut eval = Evaluator::new(module);
    match eval.eval("main") {
        Ok(value) => Err(format!("Expected an error, got {value:?}")),
        Err(e) => Ok(e.message()),
    }
}

/// A configuration callback received by [`RecordingHost`]
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigEvent {
    Push { name: String, label: Val, attrs: Val },
    Pop,
    Property { key: String, value: Val, attrs: Val },
    Command { key: String, args: Vec<Val>, attrs: Val },
}

/// A host that records actions, host calls and configuration callbacks
///
/// Variables are served from an in-memory table; host calls are recorded and
/// return null.
#[derive(Debug, Default)]
pub struct RecordingHost {
    vars: Mutex<HashMap<String, Val>>,
    actions: Mutex<Vec<(String, Val)>>,
    calls: Mutex<Vec<(String, Vec<Val>)>>,
    config: Mutex<Vec<ConfigEvent>>,
}

impl RecordingHost {
    /// Create an empty host
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a host variable
    #[must_use]
    pub fn with_var(self, name: &str, value: Val) -> Self {
        self.vars.lock().insert(name.to_string(), value);
        self
    }

    /// Current value of a host variable
    #[must_use]
    pub fn var(&self, name: &str) -> Option<Val> {
        self.vars.lock().get(name).cloned()
    }

    /// Actions emitted so far
    #[must_use]
    pub fn actions(&self) -> Vec<(String, Val)> {
        self.actions.lock().clone()
    }

    /// Host calls received so far
    #[must_use]
    pub fn calls(&self) -> Vec<(String, Vec<Val>)> {
        self.calls.lock().clone()
    }

    /// Configuration callbacks received so far
    #[must_use]
    pub fn config_events(&self) -> Vec<ConfigEvent> {
        self.config.lock().clone()
    }
}

impl Host for RecordingHost {
    fn load_var(&self, _: &mut Evaluator, name: &str) -> RuntimeResult<Val> {
        self.var(name)
            .ok_or_else(|| RuntimeErrorKind::UndefinedVariable(name.to_string()).into())
    }

    fn store_var(&self, _: &mut Evaluator, name: &str, value: Val) -> RuntimeResult<()> {
        self.vars.lock().insert(name.to_string(), value);
        Ok(())
    }

    fn action(&self, _: &mut Evaluator, name: &str, value: Val) -> RuntimeResult<()> {
        self.actions.lock().push((name.to_string(), value));
        Ok(())
    }

    fn call(&self, _: &mut Evaluator, name: &str, args: &[Val]) -> RuntimeResult<Val> {
        self.calls.lock().push((name.to_string(), args.to_vec()));
        Ok(Val::Null)
    }

    fn push_config(&self, _: &mut Evaluator, name: &str, label: Val, attrs: Val) -> RuntimeResult<()> {
        self.config.lock().push(ConfigEvent::Push {
            name: name.to_string(),
            label,
            attrs,
        });
        Ok(())
    }

    fn pop_config(&self, _: &mut Evaluator) -> RuntimeResult<()> {
        self.config.lock().push(ConfigEvent::Pop);
        Ok(())
    }

    fn config_property(&self, _: &mut Evaluator, key: &str, value: Val, attrs: Val) -> RuntimeResult<()> {
        self.config.lock().push(ConfigEvent::Property {
            key: key.to_string(),
            value,
            attrs,
        });
        Ok(())
    }

    fn config_command(&self, _: &mut Evaluator, key: &str, args: &[Val], attrs: Val) -> RuntimeResult<Val> {
        self.config.lock().push(ConfigEvent::Command {
            key: key.to_string(),
            args: args.to_vec(),
            attrs,
        });
        Ok(Val::Null)
    }
}
