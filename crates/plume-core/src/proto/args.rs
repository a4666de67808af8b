//! Typed access to a validated argument list

use std::sync::Arc;

use regex::Regex;

use crate::bytecode::{ListRef, MapRef, Val};
use crate::vm::{RuntimeError, RuntimeResult};

/// Argument list of a native call, already checked against its prototype
///
/// Accessors still return `Result` so that a prototype that is looser than
/// the native's expectations surfaces as a type error instead of a panic.
#[derive(Clone, Copy)]
pub struct Args<'a> {
    name: &'static str,
    values: &'a [Val],
}

impl<'a> Args<'a> {
    /// Wrap the arguments of the native `name`
    #[must_use]
    pub fn new(name: &'static str, values: &'a [Val]) -> Self {
        Self { name, values }
    }

    /// Number of arguments
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if there are no arguments
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// The raw values
    #[must_use]
    pub fn values(&self) -> &'a [Val] {
        self.values
    }

    /// Argument `i`, or null when absent
    #[must_use]
    pub fn get(&self, i: usize) -> &'a Val {
        const NULL: &Val = &Val::Null;
        self.values.get(i).unwrap_or(NULL)
    }

    /// Arguments from `i` on
    #[must_use]
    pub fn rest(&self, i: usize) -> &'a [Val] {
        self.values.get(i..).unwrap_or(&[])
    }

    fn mismatch(&self, i: usize, expected: &'static str) -> RuntimeError {
        RuntimeError::type_error(self.name, expected, self.get(i).type_name())
    }

    /// Integer argument
    pub fn int(&self, i: usize) -> RuntimeResult<i64> {
        self.get(i).as_int().ok_or_else(|| self.mismatch(i, "int"))
    }

    /// Optional integer argument with a default
    pub fn int_or(&self, i: usize, default: i64) -> RuntimeResult<i64> {
        if self.get(i).is_null() {
            Ok(default)
        } else {
            self.int(i)
        }
    }

    /// Numeric argument promoted to real
    pub fn real(&self, i: usize) -> RuntimeResult<f64> {
        self.get(i).as_real().ok_or_else(|| self.mismatch(i, "real"))
    }

    /// String argument
    pub fn str(&self, i: usize) -> RuntimeResult<&'a str> {
        self.get(i).as_str().ok_or_else(|| self.mismatch(i, "string"))
    }

    /// Bool argument
    pub fn bool(&self, i: usize) -> RuntimeResult<bool> {
        match self.get(i) {
            Val::Bool(b) => Ok(*b),
            _ => Err(self.mismatch(i, "bool")),
        }
    }

    /// List argument
    pub fn list(&self, i: usize) -> RuntimeResult<&'a ListRef> {
        match self.get(i) {
            Val::List(l) => Ok(l),
            _ => Err(self.mismatch(i, "list")),
        }
    }

    /// Map argument
    pub fn map(&self, i: usize) -> RuntimeResult<&'a MapRef> {
        match self.get(i) {
            Val::Map(m) => Ok(m),
            _ => Err(self.mismatch(i, "map")),
        }
    }

    /// Pair argument
    pub fn pair(&self, i: usize) -> RuntimeResult<&'a (Val, Val)> {
        match self.get(i) {
            Val::Pair(p) => Ok(p),
            _ => Err(self.mismatch(i, "pair")),
        }
    }

    /// Regexp argument; strings are compiled on the fly
    pub fn regex(&self, i: usize) -> RuntimeResult<Arc<Regex>> {
        match self.get(i) {
            Val::Regexp(re) => Ok(Arc::clone(re)),
            Val::Str(s) => Regex::new(s)
                .map(Arc::new)
                .map_err(|e| crate::vm::RuntimeErrorKind::Regex(e.to_string()).into()),
            _ => Err(self.mismatch(i, "regexp")),
        }
    }
}
