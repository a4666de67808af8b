//! Closures and captured variables

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use super::program::Program;
use super::value::Val;
use crate::vm::{Evaluator, RuntimeResult};

/// A captured variable
///
/// An upvalue starts out pointing at a live local slot of the evaluator and
/// is boxed exactly once, when that slot's frame (or block) goes away. A
/// slot of a suspended generator is parked instead and goes back on the
/// stack when the generator resumes.
#[derive(Debug, Clone)]
pub enum Upvalue {
    /// Still owned by a live frame; absolute index into the locals stack
    OnStack(usize),

    /// Owned by a suspended generator; slot relative to its frame base
    Parked { slot: usize, value: Val },

    /// Copied out of its frame
    Boxed(Val),
}

/// Shared handle to an upvalue; closures capturing the same slot share it
pub type UpvalueRef = Arc<Mutex<Upvalue>>;

/// Signature of a host or intrinsic callable
pub type NativeFn = Arc<dyn Fn(&mut Evaluator, &[Val]) -> RuntimeResult<Val> + Send + Sync>;

/// A callable value
pub enum Closure {
    /// A compiled function or iterator program plus its captures
    Script {
        program: Arc<Program>,
        upvalues: Vec<UpvalueRef>,
    },

    /// A host-provided callback
    Native { name: String, func: NativeFn },

    /// A receiver bound to a method name, dispatched on call
    Method { receiver: Val, method: String },
}

impl Closure {
    /// Wrap a native callback
    pub fn native(
        name: impl Into<String>,
        func: impl Fn(&mut Evaluator, &[Val]) -> RuntimeResult<Val> + Send + Sync + 'static,
    ) -> Self {
        Closure::Native {
            name: name.into(),
            func: Arc::new(func),
        }
    }

    /// Name used in diagnostics
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Closure::Script { program, .. } => &program.name,
            Closure::Native { name, .. } => name,
            Closure::Method { method, .. } => method,
        }
    }

    /// See [`Val::is_immutable`]
    #[must_use]
    pub fn is_immutable(&self) -> bool {
        match self {
            Closure::Script { upvalues, .. } => upvalues.is_empty(),
            Closure::Native { .. } => true,
            Closure::Method { receiver, .. } => receiver.is_immutable(),
        }
    }

    /// Variant name, matching the `%C/%R/%M` proto codes
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Closure::Script { .. } => "script closure",
            Closure::Native { .. } => "native closure",
            Closure::Method { .. } => "method closure",
        }
    }
}

impl fmt::Display for Closure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Closure::Script { program, .. } => write!(f, "<{} {}>", program.kind, program.name),
            Closure::Native { name, .. } => write!(f, "<native fn {name}>"),
            Closure::Method { receiver, method } => write!(f, "<method {}.{method}>", receiver.type_name()),
        }
    }
}

impl fmt::Debug for Closure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Closure::Script { program, upvalues } => f
                .debug_struct("Script")
                .field("program", &program.name)
                .field("upvalues", &upvalues.len())
                .finish(),
            Closure::Native { name, .. } => f.debug_struct("Native").field("name", name).finish(),
            Closure::Method { receiver, method } => f
                .debug_struct("Method")
                .field("receiver", receiver)
                .field("method", method)
                .finish(),
        }
    }
}
