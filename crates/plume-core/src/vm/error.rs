//! Runtime errors for the Plume evaluator

use std::fmt;

use thiserror::Error;

use crate::proto::ProtoError;

/// A runtime error that occurred during evaluation
#[derive(Debug, Clone)]
pub struct RuntimeError {
    /// The kind of error
    pub kind: RuntimeErrorKind,

    /// Program/line trail at the point of error, innermost first
    pub stack_trace: Vec<StackFrame>,
}

impl RuntimeError {
    /// Create a new runtime error
    #[must_use]
    pub fn new(kind: RuntimeErrorKind) -> Self {
        Self {
            kind,
            stack_trace: Vec::new(),
        }
    }

    /// Add stack trace frames
    #[must_use]
    pub fn with_trace(mut self, trace: Vec<StackFrame>) -> Self {
        if self.stack_trace.is_empty() {
            self.stack_trace = trace;
        }
        self
    }

    /// The error message without the stack trace
    ///
    /// This is the string a `try ... else let e` handler binds.
    #[must_use]
    pub fn message(&self) -> String {
        self.kind.to_string()
    }

    /// Shorthand for a type error
    #[must_use]
    pub fn type_error(operation: &'static str, expected: &'static str, got: &'static str) -> Self {
        Self::new(RuntimeErrorKind::TypeError {
            expected,
            got,
            operation,
        })
    }

    /// Shorthand for a host-reported failure
    #[must_use]
    pub fn host(message: impl Into<String>) -> Self {
        Self::new(RuntimeErrorKind::Host(message.into()))
    }

    /// Shorthand for an error raised by script code (`error("...")`)
    #[must_use]
    pub fn user(message: impl Into<String>) -> Self {
        Self::new(RuntimeErrorKind::User(message.into()))
    }

    /// Shorthand for an invalid operation
    #[must_use]
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::new(RuntimeErrorKind::InvalidOperation(message.into()))
    }
}

impl From<RuntimeErrorKind> for RuntimeError {
    fn from(kind: RuntimeErrorKind) -> Self {
        Self::new(kind)
    }
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        for frame in &self.stack_trace {
            write!(f, "\n  at {} (line {})", frame.program, frame.line)?;
        }
        Ok(())
    }
}

impl std::error::Error for RuntimeError {}

/// A frame in a runtime stack trace
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackFrame {
    /// The program (rule, function, iterator or phase block) name
    pub program: String,

    /// The source line number
    pub line: u32,
}

impl StackFrame {
    /// Create a new stack frame
    #[must_use]
    pub fn new(program: impl Into<String>, line: u32) -> Self {
        Self {
            program: program.into(),
            line,
        }
    }
}

/// The kind of runtime error
#[derive(Error, Debug, Clone)]
pub enum RuntimeErrorKind {
    #[error("type error: {operation} expected {expected}, got {got}")]
    TypeError {
        expected: &'static str,
        got: &'static str,
        operation: &'static str,
    },

    #[error("unsupported operand types for {op}: {left} and {right}")]
    InvalidOperands {
        op: &'static str,
        left: &'static str,
        right: &'static str,
    },

    #[error("divide by zero")]
    DivisionByZero,

    #[error("index {index} out of range for length {length}")]
    IndexOutOfRange { index: i64, length: usize },

    #[error("undefined variable '{0}'")]
    UndefinedVariable(String),

    #[error("undefined function '{0}'")]
    UndefinedFunction(String),

    #[error("undefined field '{field}' on {type_name}")]
    UndefinedField { type_name: String, field: String },

    #[error("{0} is not callable")]
    NotCallable(&'static str),

    #[error("{0} is not iterable")]
    NotIterable(&'static str),

    #[error("{name}: expected {expected} arguments, got {got}")]
    Arity {
        name: String,
        expected: usize,
        got: usize,
    },

    #[error("{name}: {source}")]
    Proto {
        name: String,
        #[source]
        source: ProtoError,
    },

    #[error("map modified during iteration")]
    IteratorInvalidated,

    #[error("generator is already running")]
    GeneratorRunning,

    #[error("global '{0}' can only hold immutable values after initialization")]
    ImmutableGlobal(String),

    #[error("stack overflow")]
    StackOverflow,

    #[error("{0}")]
    Host(String),

    #[error("{0}")]
    User(String),

    #[error("assertion failed: {0}")]
    AssertionFailed(String),

    #[error("invalid regex: {0}")]
    Regex(String),

    #[error("template error: {0}")]
    Template(String),

    #[error("{0}")]
    InvalidOperation(String),
}

/// Result type for evaluator operations
pub type RuntimeResult<T> = Result<T, RuntimeError>;
