//! Compile error types

use std::fmt;

use thiserror::Error;

use crate::lexer::Location;

/// A lexical, syntax or semantic error found while compiling
///
/// The rendered form is stable so it can be compared against golden text:
/// `"{line}:{column}: {message}"` followed by the source window and a caret.
#[derive(Debug, Clone, PartialEq)]
pub struct CompileError {
    /// The kind of error
    pub kind: CompileErrorKind,
    /// Where the error was detected
    pub location: Location,
    /// Full diagnostic, including the source snippet
    pub rendered: String,
}

impl CompileError {
    /// The message without location or snippet
    #[must_use]
    pub fn message(&self) -> String {
        self.kind.to_string()
    }
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.rendered)
    }
}

impl std::error::Error for CompileError {}

/// The kind of compile error
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CompileErrorKind {
    #[error("{0}")]
    Lexical(String),

    #[error("unexpected {found}, expected {expected}")]
    UnexpectedToken { found: String, expected: String },

    #[error("expected expression, found {0}")]
    ExpectedExpression(String),

    #[error("invalid assignment target")]
    InvalidAssignmentTarget,

    #[error("invalid number literal '{0}'")]
    InvalidNumber(String),

    #[error("invalid regex: {0}")]
    InvalidRegex(String),

    #[error("duplicate {0} block")]
    DuplicateBlock(&'static str),

    #[error("'{0}' is already defined")]
    DuplicateDefinition(String),

    #[error("undeclared {scope} variable '{name}'")]
    UndeclaredSlot { scope: &'static str, name: String },

    #[error("unknown intrinsic '{0}'")]
    UnknownIntrinsic(String),

    #[error("'break' can only be used inside a loop")]
    BreakOutsideLoop,

    #[error("'continue' can only be used inside a loop")]
    ContinueOutsideLoop,

    #[error("'yield' can only be used inside an iterator")]
    YieldOutsideIterator,

    #[error("'yield' cannot be used inside 'try'")]
    YieldInsideTry,

    #[error("{0} are only allowed in config blocks")]
    ConfigOnly(&'static str),

    #[error("template: {0}")]
    Template(String),
}

/// Result type for compilation
pub type CompileResult<T> = Result<T, CompileError>;
