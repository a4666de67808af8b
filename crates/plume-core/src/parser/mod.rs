//! Single-pass compiler for the Plume policy language
//!
//! The parser reads tokens straight from the [`Lexer`] and emits bytecode into
//! the [`Program`] under construction; there is no intermediate syntax tree.
//! Expressions use precedence climbing, statements and items use recursive
//! descent.
//!
//! # Example
//!
//! ```
//! use plume_core::parser::compile_module;
//!
//! let module = compile_module("main { 1 + 2 }").unwrap();
//! assert_eq!(module.rules.len(), 1);
//! ```

mod error;
mod expr;
mod scope;
mod stmt;

pub use error::{CompileError, CompileErrorKind, CompileResult};

use std::mem;
use std::sync::Arc;

use crate::bytecode::{Module, OpCode, Program, ProgramKind};
use crate::lexer::{Lexer, Location, Span, Token, TokenKind};
use scope::FuncState;

/// Compile a source document into a module
pub fn compile_module(source: &str) -> CompileResult<Module> {
    compile_module_named("<input>", source)
}

/// Compile a source document, recording `name` as its source name
pub fn compile_module_named(name: &str, source: &str) -> CompileResult<Module> {
    let mut parser = Parser::new(name, source);
    parser.prime()?;
    parser.module()?;
    let module = parser.module;
    tracing::debug!(
        source = %module.source_name,
        rules = module.rules.len(),
        functions = module.functions.len(),
        iterators = module.iterators.len(),
        globals = module.global_names.len(),
        sessions = module.session_names.len(),
        "compiled module"
    );
    Ok(module)
}

/// The Plume compiler
pub struct Parser {
    lexer: Lexer,
    /// Most recently consumed token
    previous: Token,
    /// Token under the cursor
    current: Token,
    /// One token of lookahead
    next: Token,
    /// Module being built
    module: Module,
    /// Programs under construction, innermost last
    funcs: Vec<FuncState>,
    /// Added to token lines while compiling an interpolated span
    line_offset: u32,
}

fn placeholder_token() -> Token {
    Token {
        kind: TokenKind::Eof,
        span: Span::new(0, 0),
        location: Location::new(1, 1),
        text: String::new(),
    }
}

impl Parser {
    fn new(name: &str, source: &str) -> Self {
        Self {
            lexer: Lexer::new(source),
            previous: placeholder_token(),
            current: placeholder_token(),
            next: placeholder_token(),
            module: Module::new(name),
            funcs: Vec::new(),
            line_offset: 0,
        }
    }

    // ==================== Token Management ====================

    /// Load the first two tokens from the lexer
    fn prime(&mut self) -> CompileResult<()> {
        self.current = self.lexer.next_token();
        self.next = self.lexer.next_token();
        self.check_lexical()
    }

    fn check_lexical(&self) -> CompileResult<()> {
        if self.current.kind == TokenKind::Error {
            return Err(self.lexical_error(&self.current));
        }
        Ok(())
    }

    /// Consume the current token and return it
    fn advance(&mut self) -> CompileResult<Token> {
        let next = self.lexer.next_token();
        let current = mem::replace(&mut self.next, next);
        let consumed = mem::replace(&mut self.current, current);
        self.previous = consumed.clone();
        self.check_lexical()?;
        Ok(consumed)
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.current.kind == kind
    }

    /// Consume the current token if it has the given kind
    fn matches(&mut self, kind: TokenKind) -> CompileResult<bool> {
        if self.check(kind) {
            self.advance()?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// Consume a token of the given kind, or fail
    fn expect(&mut self, kind: TokenKind) -> CompileResult<Token> {
        if self.check(kind) {
            self.advance()
        } else {
            Err(self.unexpected(&expected_name(kind)))
        }
    }

    fn expect_ident(&mut self) -> CompileResult<Token> {
        self.expect(TokenKind::Ident)
    }

    /// Consume an identifier or keyword used as a member or key name
    fn expect_word(&mut self, what: &str) -> CompileResult<String> {
        if is_word(self.current.kind) {
            Ok(self.advance()?.text)
        } else {
            Err(self.unexpected(what))
        }
    }

    /// Source line of the most recently consumed token
    fn line(&self) -> u32 {
        self.previous.location.line + self.line_offset
    }

    // ==================== Errors ====================

    fn error_at(&self, token: &Token, kind: CompileErrorKind) -> CompileError {
        let rendered = self.lexer.render(token.span.start as usize, &kind.to_string());
        CompileError {
            kind,
            location: Location::new(token.location.line + self.line_offset, token.location.column),
            rendered,
        }
    }

    fn unexpected(&self, expected: &str) -> CompileError {
        self.error_at(
            &self.current,
            CompileErrorKind::UnexpectedToken {
                found: describe(&self.current),
                expected: expected.to_string(),
            },
        )
    }

    fn lexical_error(&self, token: &Token) -> CompileError {
        let message = token
            .text
            .lines()
            .next()
            .and_then(|line| line.split_once(": "))
            .map_or_else(|| token.text.clone(), |(_, message)| message.to_string());
        CompileError {
            kind: CompileErrorKind::Lexical(message),
            location: Location::new(token.location.line + self.line_offset, token.location.column),
            rendered: token.text.clone(),
        }
    }

    // ==================== Emission ====================

    fn state(&mut self) -> &mut FuncState {
        match self.funcs.last_mut() {
            Some(state) => state,
            None => unreachable!("no program is being compiled"),
        }
    }

    fn state_ref(&self) -> &FuncState {
        match self.funcs.last() {
            Some(state) => state,
            None => unreachable!("no program is being compiled"),
        }
    }

    fn program(&mut self) -> &mut Program {
        &mut self.state().program
    }

    fn emit(&mut self, op: OpCode) -> usize {
        let line = self.line();
        self.program().emit(op, line)
    }

    fn emit_jump(&mut self, op: OpCode) -> usize {
        let line = self.line();
        self.program().emit_jump(op, line)
    }

    fn emit_loop(&mut self, start: usize) {
        let line = self.line();
        self.program().emit_loop(start, line);
    }

    fn patch_jump(&mut self, at: usize) {
        self.program().patch_jump(at);
    }

    fn offset(&self) -> usize {
        self.state_ref().program.current_offset()
    }

    fn string_constant(&mut self, value: &str) -> u32 {
        self.program().add_string(value)
    }

    fn begin_scope(&mut self) {
        self.state().begin_scope();
    }

    fn end_scope(&mut self) {
        let line = self.line();
        self.state().end_scope(line);
    }

    fn push_func(&mut self, name: impl Into<String>, kind: ProgramKind) {
        self.funcs.push(FuncState::new(name, kind));
    }

    fn pop_func(&mut self) -> Program {
        match self.funcs.pop() {
            Some(state) => state.finish(),
            None => unreachable!("program stack underflow"),
        }
    }

    /// Kind of the outermost program being compiled
    fn top_kind(&self) -> Option<ProgramKind> {
        self.funcs.first().map(FuncState::kind)
    }

    /// Whether statements are compiled directly inside the `config` block
    /// program (not inside a nested function)
    fn in_config(&self) -> bool {
        self.funcs.len() == 1 && self.top_kind() == Some(ProgramKind::Config)
    }

    /// Global or session block whose top-level declarations create slots
    fn slot_phase(&self) -> Option<ProgramKind> {
        if self.funcs.len() != 1 || !self.state_ref().at_block_top() {
            return None;
        }
        self.top_kind()
            .filter(|kind| matches!(kind, ProgramKind::Global | ProgramKind::Session))
    }

    // ==================== Nested sources ====================

    /// Compile an interpolated span as if it were part of the current program
    fn with_source<T>(
        &mut self,
        source: &str,
        parse: impl FnOnce(&mut Self) -> CompileResult<T>,
    ) -> CompileResult<T> {
        let line_offset = self.line().saturating_sub(1);
        let lexer = mem::replace(&mut self.lexer, Lexer::new(source));
        let previous = mem::replace(&mut self.previous, placeholder_token());
        let current = mem::replace(&mut self.current, placeholder_token());
        let next = mem::replace(&mut self.next, placeholder_token());
        let saved_offset = mem::replace(&mut self.line_offset, line_offset);

        let result = self.prime().and_then(|()| {
            let value = parse(self)?;
            if !self.check(TokenKind::Eof) {
                return Err(self.unexpected("'}}'"));
            }
            Ok(value)
        });

        self.lexer = lexer;
        self.previous = previous;
        self.current = current;
        self.next = next;
        self.line_offset = saved_offset;
        result
    }

    // ==================== Items ====================

    fn module(&mut self) -> CompileResult<()> {
        while !self.check(TokenKind::Eof) {
            self.item()?;
        }
        Ok(())
    }

    fn item(&mut self) -> CompileResult<()> {
        match self.current.kind {
            TokenKind::Global => self.phase_block(ProgramKind::Global),
            TokenKind::Session => self.phase_block(ProgramKind::Session),
            TokenKind::Config => self.phase_block(ProgramKind::Config),
            TokenKind::Fn | TokenKind::Iter => self.named_function_item(),
            TokenKind::Ident | TokenKind::Str => self.rule(),
            TokenKind::Semicolon => self.advance().map(drop),
            _ => Err(self.unexpected("a rule, function or block")),
        }
    }

    /// `global { }`, `session { }` or `config { }`
    fn phase_block(&mut self, kind: ProgramKind) -> CompileResult<()> {
        let keyword = self.advance()?;
        let (label, existing) = match kind {
            ProgramKind::Global => ("global", &self.module.global),
            ProgramKind::Session => ("session", &self.module.session),
            _ => ("config", &self.module.config),
        };
        if existing.is_some() {
            return Err(self.error_at(&keyword, CompileErrorKind::DuplicateBlock(label)));
        }

        self.push_func(label, kind);
        self.expect(TokenKind::LBrace)?;
        self.block_body()?;
        self.emit(OpCode::Return);
        let program = Some(Arc::new(self.pop_func()));
        match kind {
            ProgramKind::Global => self.module.global = program,
            ProgramKind::Session => self.module.session = program,
            _ => self.module.config = program,
        }
        Ok(())
    }

    /// `fn name(..) { }` or `iter name(..) { }` at module level
    fn named_function_item(&mut self) -> CompileResult<()> {
        let keyword = self.advance()?;
        let name = self.expect_ident()?;
        let kind = if keyword.kind == TokenKind::Iter {
            ProgramKind::Iterator
        } else {
            ProgramKind::Function
        };
        let program = self.function(&name.text, kind)?;
        let added = match kind {
            ProgramKind::Iterator => self.module.add_iterator(program),
            _ => self.module.add_function(program),
        };
        if !added {
            return Err(self.error_at(&name, CompileErrorKind::DuplicateDefinition(name.text.clone())));
        }
        Ok(())
    }

    /// `name [when guard] [=>] { }`
    fn rule(&mut self) -> CompileResult<()> {
        let name = self.advance()?;
        self.push_func(name.text.as_str(), ProgramKind::Rule);

        if self.matches(TokenKind::When)? {
            self.expression()?;
        } else {
            let event = self.string_constant(&name.text);
            self.emit(OpCode::EventIs(event));
        }
        self.emit(OpCode::Match);
        self.matches(TokenKind::FatArrow)?;

        self.expect(TokenKind::LBrace)?;
        self.block_body()?;
        self.emit(OpCode::Return);
        let program = self.pop_func();
        self.module.rules.push(Arc::new(program));
        Ok(())
    }

    /// Parameter list and body of a function or iterator
    ///
    /// The caller has consumed everything up to the opening parenthesis.
    fn function(&mut self, name: &str, kind: ProgramKind) -> CompileResult<Program> {
        self.push_func(name, kind);
        self.expect(TokenKind::LParen)?;
        let mut arity = 0;
        while !self.check(TokenKind::RParen) {
            let param = self.expect_ident()?;
            self.state().declare_local(&param.text);
            arity += 1;
            if !self.matches(TokenKind::Comma)? {
                break;
            }
        }
        self.expect(TokenKind::RParen)?;
        self.state().program.arity = arity;

        self.expect(TokenKind::LBrace)?;
        self.block_body()?;
        if kind == ProgramKind::Iterator {
            self.emit(OpCode::Pop);
            self.emit(OpCode::Null);
        }
        self.emit(OpCode::Return);
        Ok(self.pop_func())
    }
}

/// Human-readable description of a token for diagnostics
fn describe(token: &Token) -> String {
    match token.kind {
        TokenKind::Eof => "end of file".to_string(),
        TokenKind::Str => "string literal".to_string(),
        TokenKind::Regex => "regex literal".to_string(),
        kind if kind.is_qualified_name() => format!("{kind} '{}'", token.text),
        _ => format!("'{}'", token.text),
    }
}

/// How an expected token kind is named in diagnostics
fn expected_name(kind: TokenKind) -> String {
    match kind {
        TokenKind::Ident | TokenKind::Str | TokenKind::Int | TokenKind::Real | TokenKind::Eof => {
            kind.to_string()
        }
        _ => format!("'{kind}'"),
    }
}

/// Identifiers and keywords, which may both name members and map keys
fn is_word(kind: TokenKind) -> bool {
    matches!(
        kind,
        TokenKind::Ident
            | TokenKind::Let
            | TokenKind::Fn
            | TokenKind::Iter
            | TokenKind::If
            | TokenKind::Elif
            | TokenKind::Else
            | TokenKind::For
            | TokenKind::In
            | TokenKind::While
            | TokenKind::Break
            | TokenKind::Continue
            | TokenKind::Return
            | TokenKind::Yield
            | TokenKind::Try
            | TokenKind::When
            | TokenKind::Global
            | TokenKind::Session
            | TokenKind::Config
            | TokenKind::Template
            | TokenKind::True
            | TokenKind::False
            | TokenKind::Null
    )
}
