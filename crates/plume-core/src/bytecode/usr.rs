//! Extension protocol for host-defined opaque values
//!
//! Hosts bring their own types into scripts by implementing [`UsrObject`].
//! The evaluator never inspects these values beyond this contract: every
//! index, field, method, conversion and iteration request goes through it.
//! Objects are shared between evaluators, so mutation needs interior
//! mutability on the implementor's side.

use std::fmt;

use super::value::Val;
use crate::vm::{Evaluator, RuntimeError, RuntimeErrorKind, RuntimeResult};

fn unsupported(tag: &str, what: &str) -> RuntimeError {
    RuntimeError::invalid(format!("{tag} does not support {what}"))
}

/// A host-defined opaque value
pub trait UsrObject: Send + Sync + fmt::Debug {
    /// Identity tag, matched by `%U[tag]` in function prototypes
    fn type_tag(&self) -> &str;

    /// Human-readable description, used when the value is printed
    fn info(&self) -> String {
        self.type_tag().to_string()
    }

    /// `obj[key]`
    fn index(&self, key: &Val) -> RuntimeResult<Val> {
        let _ = key;
        Err(unsupported(self.type_tag(), "indexing"))
    }

    /// `obj[key] = value`
    fn index_set(&self, key: &Val, value: Val) -> RuntimeResult<()> {
        let _ = (key, value);
        Err(unsupported(self.type_tag(), "index assignment"))
    }

    /// `obj.name`
    fn dot(&self, name: &str) -> RuntimeResult<Val> {
        Err(RuntimeErrorKind::UndefinedField {
            type_name: self.type_tag().to_string(),
            field: name.to_string(),
        }
        .into())
    }

    /// `obj.name = value`
    fn dot_set(&self, name: &str, value: Val) -> RuntimeResult<()> {
        let _ = value;
        Err(unsupported(self.type_tag(), &format!("setting field '{name}'")))
    }

    /// `obj.name(args...)`
    fn method(&self, eval: &mut Evaluator, name: &str, args: &[Val]) -> RuntimeResult<Val> {
        let _ = (eval, args);
        Err(unsupported(self.type_tag(), &format!("method '{name}'")))
    }

    /// String coercion for concatenation and `to_str`
    fn to_str(&self) -> RuntimeResult<String> {
        Ok(self.info())
    }

    /// JSON projection
    fn to_json(&self) -> RuntimeResult<serde_json::Value> {
        Err(unsupported(self.type_tag(), "json encoding"))
    }

    /// Projection into plain script values (maps, lists, scalars)
    fn to_native(&self) -> RuntimeResult<Val> {
        Err(unsupported(self.type_tag(), "native conversion"))
    }

    /// Iterator construction for `for` loops
    fn iter(&self) -> RuntimeResult<Box<dyn UsrIter>> {
        Err(RuntimeErrorKind::NotIterable("usr").into())
    }

    /// Whether the value may be stored into module globals after init
    fn is_immutable(&self) -> bool {
        false
    }

    /// Truthiness of the value
    fn is_truthy(&self) -> bool {
        true
    }
}

/// Iterator over a host object
///
/// `advance` produces the next `(key, value)` pair or `None` when exhausted.
pub trait UsrIter: Send {
    fn advance(&mut self) -> RuntimeResult<Option<(Val, Val)>>;
}

/// The `_` argument placeholder consumed by `bind`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placeholder;

/// Type tag of [`Placeholder`]
pub const PLACEHOLDER_TAG: &str = "placeholder";

impl UsrObject for Placeholder {
    fn type_tag(&self) -> &str {
        PLACEHOLDER_TAG
    }

    fn info(&self) -> String {
        "_".to_string()
    }

    fn is_immutable(&self) -> bool {
        true
    }
}

impl Val {
    /// Returns true for the `_` placeholder
    #[must_use]
    pub fn is_placeholder(&self) -> bool {
        matches!(self, Val::Usr(u) if u.type_tag() == PLACEHOLDER_TAG)
    }
}
