//! Module - the compiled output of one source document

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use super::program::Program;
use super::value::Val;
use crate::vm::{RuntimeErrorKind, RuntimeResult};

/// All programs compiled from one source plus the shared global state
///
/// A module is compiled once, initialized once with `eval_global`, and after
/// that may be shared (behind an `Arc`) by any number of evaluators running
/// on different threads. The global vector is the only shared mutable state.
#[derive(Debug, Default)]
pub struct Module {
    /// Source name used in diagnostics
    pub source_name: String,

    /// `global { }` block
    pub global: Option<Arc<Program>>,
    /// `session { }` block
    pub session: Option<Arc<Program>>,
    /// `config { }` block
    pub config: Option<Arc<Program>>,
    /// Rules in source order
    pub rules: Vec<Arc<Program>>,
    /// Named functions
    pub functions: Vec<Arc<Program>>,
    /// Named iterators
    pub iterators: Vec<Arc<Program>>,

    /// Declared global slot names, by slot index
    pub global_names: Vec<String>,
    /// Declared session slot names, by slot index
    pub session_names: Vec<String>,

    function_index: HashMap<String, usize>,
    iterator_index: HashMap<String, usize>,
    globals: RwLock<Vec<Val>>,
}

impl Module {
    /// Create an empty module
    #[must_use]
    pub fn new(source_name: impl Into<String>) -> Self {
        Self {
            source_name: source_name.into(),
            ..Self::default()
        }
    }

    /// Register a named function; returns false if the name was taken
    pub fn add_function(&mut self, program: Program) -> bool {
        if self.function_index.contains_key(&program.name) || self.iterator_index.contains_key(&program.name) {
            return false;
        }
        self.function_index.insert(program.name.clone(), self.functions.len());
        self.functions.push(Arc::new(program));
        true
    }

    /// Register a named iterator; returns false if the name was taken
    pub fn add_iterator(&mut self, program: Program) -> bool {
        if self.function_index.contains_key(&program.name) || self.iterator_index.contains_key(&program.name) {
            return false;
        }
        self.iterator_index.insert(program.name.clone(), self.iterators.len());
        self.iterators.push(Arc::new(program));
        true
    }

    /// Look up a named function
    #[must_use]
    pub fn function(&self, name: &str) -> Option<&Arc<Program>> {
        self.function_index.get(name).map(|&i| &self.functions[i])
    }

    /// Look up a named iterator
    #[must_use]
    pub fn iterator(&self, name: &str) -> Option<&Arc<Program>> {
        self.iterator_index.get(name).map(|&i| &self.iterators[i])
    }

    /// Look up a global slot by name
    #[must_use]
    pub fn global_slot(&self, name: &str) -> Option<usize> {
        self.global_names.iter().position(|n| n == name)
    }

    /// Look up a session slot by name
    #[must_use]
    pub fn session_slot(&self, name: &str) -> Option<usize> {
        self.session_names.iter().position(|n| n == name)
    }

    /// Every rule program in declaration order; each guard decides whether it
    /// handles the event being dispatched
    pub fn rules(&self) -> impl Iterator<Item = &Arc<Program>> {
        self.rules.iter()
    }

    /// Size the global vector for the one-time initialization pass
    ///
    /// Slots only ever grow; calling this again keeps existing values.
    pub fn prepare_globals(&self) {
        let mut globals = self.globals.write();
        if globals.len() < self.global_names.len() {
            globals.resize(self.global_names.len(), Val::Null);
        }
    }

    /// Read a global slot
    #[must_use]
    pub fn load_global(&self, slot: usize) -> Val {
        self.globals.read().get(slot).cloned().unwrap_or(Val::Null)
    }

    /// Write a global slot
    ///
    /// During initialization any value is accepted. Afterwards only values
    /// that are immutable by contract may be stored, since every evaluator
    /// sharing the module can observe them.
    pub fn store_global(&self, slot: usize, value: Val, initializing: bool) -> RuntimeResult<()> {
        if !initializing && !value.is_immutable() {
            let name = self.global_names.get(slot).cloned().unwrap_or_default();
            tracing::warn!(global = %name, kind = value.type_name(), "rejected mutable global write");
            return Err(RuntimeErrorKind::ImmutableGlobal(name).into());
        }
        let mut globals = self.globals.write();
        if slot >= globals.len() {
            if !initializing {
                let name = self.global_names.get(slot).cloned().unwrap_or_default();
                return Err(RuntimeErrorKind::UndefinedVariable(format!("global::{name}")).into());
            }
            globals.resize(slot + 1, Val::Null);
        }
        globals[slot] = value;
        Ok(())
    }

    /// Snapshot of every global as `(name, value)`
    #[must_use]
    pub fn globals(&self) -> Vec<(String, Val)> {
        let globals = self.globals.read();
        self.global_names
            .iter()
            .enumerate()
            .map(|(i, name)| (name.clone(), globals.get(i).cloned().unwrap_or(Val::Null)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::ProgramKind;

    #[test]
    fn global_writes_after_init_require_immutable() {
        let mut module = Module::new("test");
        module.global_names.push("counter".to_string());
        module.prepare_globals();
        module.store_global(0, Val::list(vec![]), true).unwrap();
        assert!(module.store_global(0, Val::Int(3), false).is_ok());
        let err = module.store_global(0, Val::empty_map(), false).unwrap_err();
        assert_eq!(
            err.message(),
            "global 'counter' can only hold immutable values after initialization"
        );
        assert_eq!(module.load_global(0), Val::Int(3));
    }

    #[test]
    fn names_are_unique_across_functions_and_iterators() {
        let mut module = Module::new("test");
        assert!(module.add_function(Program::new("f", ProgramKind::Function)));
        assert!(!module.add_iterator(Program::new("f", ProgramKind::Iterator)));
        assert!(module.add_iterator(Program::new("g", ProgramKind::Iterator)));
        assert!(module.function("f").is_some());
        assert!(module.iterator("g").is_some());
        assert!(module.function("g").is_none());
    }
}
