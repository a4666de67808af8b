//! Function prototypes: argument-shape descriptors for native calls
//!
//! A prototype is a compact descriptor such as `"%s%d"`, `"%d*"` or
//! `"{%d}{%f%s}"`. Every intrinsic and host-bound function declares one, and
//! the evaluator checks argument lists against it before the native code
//! runs, so natives can unpack their arguments without re-validating.
//!
//! # Grammar
//!
//! ```text
//! proto   := case | ("{" case "}")+
//! case    := "%0" | "%-" | item* ["*"]
//! item    := code | "(" code+ ")"
//! code    := "%" letter ["[" tag "]"]
//! ```
//!
//! | code | accepts |
//! |------|---------|
//! | `d`, `i` | int |
//! | `u` | int ≥ 0 |
//! | `f` | real (ints are promoted) |
//! | `F` | real ≥ 0 (ints are promoted) |
//! | `s` / `S` | string / non-empty string |
//! | `b` | bool |
//! | `Y` / `N` | the literal `true` / `false` |
//! | `n` | null |
//! | `m` `l` `p` `r` | map, list, pair, regexp |
//! | `U[tag]` | host object with that tag (any host object without a tag) |
//! | `c` `C` `R` `M` | any closure, script, native, method closure |
//! | `a` | anything |
//! | `0` | no arguments |
//! | `-` | any argument list |
//!
//! A trailing `*` repeats the last item one or more times.

mod args;

pub use args::Args;

use std::fmt;

use thiserror::Error;

use crate::bytecode::{Closure, Val};

/// Errors from parsing a descriptor or checking arguments against it
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtoError {
    #[error("invalid prototype \"{proto}\" at offset {offset}: {message}")]
    Syntax {
        proto: String,
        offset: usize,
        message: String,
    },

    #[error("expected {expected}, got ({got})")]
    Mismatch { expected: String, got: String },
}

/// Type constraint for a single argument position
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgType {
    Int,
    Uint,
    Real,
    NonNegReal,
    Str,
    NonEmptyStr,
    Bool,
    True,
    False,
    Null,
    Map,
    List,
    Pair,
    Regexp,
    /// Host object, optionally restricted to one type tag
    Usr(Option<String>),
    Closure,
    ScriptClosure,
    NativeClosure,
    MethodClosure,
    Any,
}

impl ArgType {
    fn from_code(code: char) -> Option<Self> {
        Some(match code {
            'd' | 'i' => ArgType::Int,
            'u' => ArgType::Uint,
            'f' => ArgType::Real,
            'F' => ArgType::NonNegReal,
            's' => ArgType::Str,
            'S' => ArgType::NonEmptyStr,
            'b' => ArgType::Bool,
            'Y' => ArgType::True,
            'N' => ArgType::False,
            'n' => ArgType::Null,
            'm' => ArgType::Map,
            'l' => ArgType::List,
            'p' => ArgType::Pair,
            'r' => ArgType::Regexp,
            'U' => ArgType::Usr(None),
            'c' => ArgType::Closure,
            'C' => ArgType::ScriptClosure,
            'R' => ArgType::NativeClosure,
            'M' => ArgType::MethodClosure,
            'a' => ArgType::Any,
            _ => return None,
        })
    }

    /// Whether `value` satisfies this constraint
    #[must_use]
    pub fn accepts(&self, value: &Val) -> bool {
        match (self, value) {
            (ArgType::Any, _) => true,
            (ArgType::Int, Val::Int(_)) => true,
            (ArgType::Uint, Val::Int(i)) => *i >= 0,
            (ArgType::Real, Val::Int(_) | Val::Real(_)) => true,
            (ArgType::NonNegReal, Val::Int(i)) => *i >= 0,
            (ArgType::NonNegReal, Val::Real(r)) => *r >= 0.0,
            (ArgType::Str, Val::Str(_)) => true,
            (ArgType::NonEmptyStr, Val::Str(s)) => !s.is_empty(),
            (ArgType::Bool, Val::Bool(_)) => true,
            (ArgType::True, Val::Bool(b)) => *b,
            (ArgType::False, Val::Bool(b)) => !*b,
            (ArgType::Null, Val::Null) => true,
            (ArgType::Map, Val::Map(_)) => true,
            (ArgType::List, Val::List(_)) => true,
            (ArgType::Pair, Val::Pair(_)) => true,
            (ArgType::Regexp, Val::Regexp(_)) => true,
            (ArgType::Usr(None), Val::Usr(_)) => true,
            (ArgType::Usr(Some(tag)), Val::Usr(u)) => u.type_tag() == tag,
            (ArgType::Closure, Val::Closure(_)) => true,
            (ArgType::ScriptClosure, Val::Closure(c)) => matches!(**c, Closure::Script { .. }),
            (ArgType::NativeClosure, Val::Closure(c)) => matches!(**c, Closure::Native { .. }),
            (ArgType::MethodClosure, Val::Closure(c)) => matches!(**c, Closure::Method { .. }),
            _ => false,
        }
    }
}

impl fmt::Display for ArgType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgType::Int => f.write_str("int"),
            ArgType::Uint => f.write_str("uint"),
            ArgType::Real => f.write_str("real"),
            ArgType::NonNegReal => f.write_str("non-negative real"),
            ArgType::Str => f.write_str("string"),
            ArgType::NonEmptyStr => f.write_str("non-empty string"),
            ArgType::Bool => f.write_str("bool"),
            ArgType::True => f.write_str("true"),
            ArgType::False => f.write_str("false"),
            ArgType::Null => f.write_str("null"),
            ArgType::Map => f.write_str("map"),
            ArgType::List => f.write_str("list"),
            ArgType::Pair => f.write_str("pair"),
            ArgType::Regexp => f.write_str("regexp"),
            ArgType::Usr(None) => f.write_str("usr"),
            ArgType::Usr(Some(tag)) => write!(f, "usr[{tag}]"),
            ArgType::Closure => f.write_str("closure"),
            ArgType::ScriptClosure => f.write_str("script closure"),
            ArgType::NativeClosure => f.write_str("native closure"),
            ArgType::MethodClosure => f.write_str("method closure"),
            ArgType::Any => f.write_str("any"),
        }
    }
}

/// One argument position: any of the listed types is accepted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Slot {
    pub alternatives: Vec<ArgType>,
}

impl Slot {
    fn accepts(&self, value: &Val) -> bool {
        self.alternatives.iter().any(|t| t.accepts(value))
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, alt) in self.alternatives.iter().enumerate() {
            if i > 0 {
                f.write_str("|")?;
            }
            write!(f, "{alt}")?;
        }
        Ok(())
    }
}

/// One accepted argument-list shape
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Case {
    pub slots: Vec<Slot>,
    /// Last slot repeats one or more times
    pub variadic: bool,
    /// `%-`: accepts any argument list
    pub pass: bool,
}

impl Case {
    /// Whether `args` fits this shape
    #[must_use]
    pub fn matches(&self, args: &[Val]) -> bool {
        if self.pass {
            return true;
        }
        let arity_ok = if self.variadic {
            args.len() >= self.slots.len()
        } else {
            args.len() == self.slots.len()
        };
        if !arity_ok {
            return false;
        }
        args.iter().enumerate().all(|(i, arg)| {
            let slot = self.slots.get(i).or_else(|| self.slots.last());
            slot.is_some_and(|slot| slot.accepts(arg))
        })
    }
}

impl fmt::Display for Case {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.pass {
            return f.write_str("(...)");
        }
        f.write_str("(")?;
        for (i, slot) in self.slots.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{slot}")?;
        }
        if self.variadic {
            f.write_str("...")?;
        }
        f.write_str(")")
    }
}

/// A compiled argument descriptor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FuncProto {
    source: String,
    cases: Vec<Case>,
}

impl FuncProto {
    /// Compile a descriptor
    pub fn parse(source: &str) -> Result<Self, ProtoError> {
        Parser::new(source).parse()
    }

    /// The descriptor text this prototype was compiled from
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// The accepted shapes, in declaration order
    #[must_use]
    pub fn cases(&self) -> &[Case] {
        &self.cases
    }

    /// Check an argument list, returning the index of the first matching case
    pub fn check(&self, args: &[Val]) -> Result<usize, ProtoError> {
        if let Some(index) = self.cases.iter().position(|case| case.matches(args)) {
            return Ok(index);
        }
        Err(ProtoError::Mismatch {
            expected: self.expected(),
            got: describe_args(args),
        })
    }

    /// Human-readable list of the accepted shapes
    #[must_use]
    pub fn expected(&self) -> String {
        let shapes: Vec<String> = self.cases.iter().map(ToString::to_string).collect();
        shapes.join(" or ")
    }
}

impl fmt::Display for FuncProto {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

impl std::str::FromStr for FuncProto {
    type Err = ProtoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Comma-separated type names of an argument list
#[must_use]
pub fn describe_args(args: &[Val]) -> String {
    let names: Vec<String> = args
        .iter()
        .map(|arg| match arg {
            Val::Usr(u) => format!("usr[{}]", u.type_tag()),
            Val::Closure(c) => c.kind().to_string(),
            other => other.type_name().to_string(),
        })
        .collect();
    names.join(", ")
}

struct Parser<'a> {
    source: &'a str,
    chars: Vec<(usize, char)>,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            source,
            chars: source.char_indices().collect(),
            pos: 0,
        }
    }

    fn error(&self, message: impl Into<String>) -> ProtoError {
        let offset = self.chars.get(self.pos).map_or(self.source.len(), |(i, _)| *i);
        ProtoError::Syntax {
            proto: self.source.to_string(),
            offset,
            message: message.into(),
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).map(|(_, c)| *c)
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek();
        if c.is_some() {
            self.pos += 1;
        }
        c
    }

    fn skip_ws(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
    }

    fn parse(mut self) -> Result<FuncProto, ProtoError> {
        self.skip_ws();
        let mut cases = Vec::new();
        if self.peek() == Some('{') {
            while self.peek().is_some() {
                if self.bump() != Some('{') {
                    return Err(self.error("expected '{'"));
                }
                cases.push(self.parse_case(Some('}'))?);
                if self.bump() != Some('}') {
                    return Err(self.error("expected '}'"));
                }
                self.skip_ws();
            }
        } else {
            cases.push(self.parse_case(None)?);
        }
        Ok(FuncProto {
            source: self.source.to_string(),
            cases,
        })
    }

    fn at_case_end(&self, stop: Option<char>) -> bool {
        match self.peek() {
            None => true,
            Some(c) => Some(c) == stop,
        }
    }

    fn parse_case(&mut self, stop: Option<char>) -> Result<Case, ProtoError> {
        let mut case = Case::default();
        loop {
            self.skip_ws();
            if self.at_case_end(stop) {
                return Ok(case);
            }
            match self.peek() {
                Some('%') => {
                    let start = self.pos;
                    match self.chars.get(self.pos + 1).map(|(_, c)| *c) {
                        Some('0') | Some('-') => {
                            let special = self.chars[self.pos + 1].1;
                            self.pos += 2;
                            self.skip_ws();
                            if !case.slots.is_empty() || case.pass || !self.at_case_end(stop) {
                                self.pos = start;
                                return Err(self.error(format!("%{special} must stand alone in its case")));
                            }
                            case.pass = special == '-';
                            return Ok(case);
                        }
                        _ => {
                            let ty = self.parse_code()?;
                            case.slots.push(Slot { alternatives: vec![ty] });
                        }
                    }
                }
                Some('(') => {
                    self.pos += 1;
                    let mut alternatives = Vec::new();
                    loop {
                        self.skip_ws();
                        match self.peek() {
                            Some(')') => {
                                self.pos += 1;
                                break;
                            }
                            Some('%') => alternatives.push(self.parse_code()?),
                            Some(_) => return Err(self.error("expected type code or ')'")),
                            None => return Err(self.error("unclosed '('")),
                        }
                    }
                    if alternatives.is_empty() {
                        return Err(self.error("empty alternative group"));
                    }
                    case.slots.push(Slot { alternatives });
                }
                Some('*') => {
                    if case.slots.is_empty() {
                        return Err(self.error("'*' must follow a type"));
                    }
                    self.pos += 1;
                    self.skip_ws();
                    if !self.at_case_end(stop) {
                        return Err(self.error("'*' must end its case"));
                    }
                    case.variadic = true;
                    return Ok(case);
                }
                Some(c) => return Err(self.error(format!("unexpected '{c}'"))),
                None => return Ok(case),
            }
        }
    }

    fn parse_code(&mut self) -> Result<ArgType, ProtoError> {
        if self.bump() != Some('%') {
            return Err(self.error("expected '%'"));
        }
        let Some(code) = self.peek() else {
            return Err(self.error("missing type code after '%'"));
        };
        let Some(ty) = ArgType::from_code(code) else {
            return Err(self.error(format!("unknown type code '{code}'")));
        };
        self.pos += 1;
        if self.peek() != Some('[') {
            return Ok(ty);
        }
        if ty != ArgType::Usr(None) {
            return Err(self.error("a [tag] qualifier is only valid after %U"));
        }
        self.pos += 1;
        let mut tag = String::new();
        loop {
            match self.bump() {
                Some(']') => break,
                Some('\'' | '"') => {}
                Some(c) => tag.push(c),
                None => return Err(self.error("unclosed '['")),
            }
        }
        let tag = tag.trim().to_string();
        Ok(ArgType::Usr(if tag.is_empty() { None } else { Some(tag) }))
    }
}
