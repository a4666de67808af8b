//! Expressions: precedence climbing, primaries and suffixes

use regex::Regex;

use super::{describe, CompileErrorKind, CompileResult, Parser};
use crate::bytecode::{OpCode, ProgramKind};
use crate::lexer::{Token, TokenKind};
use crate::natives;

/// Binding power of a binary operator (higher binds tighter)
fn binary_level(kind: TokenKind) -> Option<u8> {
    let level = match kind {
        TokenKind::Or => 0,
        TokenKind::And => 1,
        TokenKind::EqEq | TokenKind::NotEq | TokenKind::Match | TokenKind::NotMatch => 2,
        TokenKind::Lt | TokenKind::LtEq | TokenKind::Gt | TokenKind::GtEq => 3,
        TokenKind::Plus | TokenKind::Minus => 4,
        TokenKind::Star | TokenKind::Slash | TokenKind::Percent | TokenKind::StarStar => 5,
        _ => return None,
    };
    Some(level)
}

fn binary_op(kind: TokenKind) -> OpCode {
    match kind {
        TokenKind::EqEq => OpCode::Eq,
        TokenKind::NotEq => OpCode::Ne,
        TokenKind::Match => OpCode::RegexMatch,
        TokenKind::NotMatch => OpCode::RegexNotMatch,
        TokenKind::Lt => OpCode::Lt,
        TokenKind::LtEq => OpCode::Le,
        TokenKind::Gt => OpCode::Gt,
        TokenKind::GtEq => OpCode::Ge,
        TokenKind::Plus | TokenKind::PlusAssign => OpCode::Add,
        TokenKind::Minus | TokenKind::MinusAssign => OpCode::Sub,
        TokenKind::Star | TokenKind::StarAssign => OpCode::Mul,
        TokenKind::Slash | TokenKind::SlashAssign => OpCode::Div,
        TokenKind::Percent | TokenKind::PercentAssign => OpCode::Mod,
        TokenKind::StarStar => OpCode::Pow,
        other => unreachable!("{other} is not a binary operator"),
    }
}

/// A piece of an interpolated string literal
#[derive(Debug, PartialEq)]
enum Piece<'a> {
    Text(&'a str),
    Expr(&'a str),
}

/// Split `"a {{ x }} b"` into literal and expression pieces
///
/// An opening `{{` without a matching `}}` is kept as literal text.
fn split_interpolation(text: &str) -> Vec<Piece<'_>> {
    let mut pieces = Vec::new();
    let mut rest = text;
    while let Some(open) = rest.find("{{") {
        let Some(close) = rest[open + 2..].find("}}") else {
            break;
        };
        if open > 0 {
            pieces.push(Piece::Text(&rest[..open]));
        }
        pieces.push(Piece::Expr(rest[open + 2..open + 2 + close].trim()));
        rest = &rest[open + 2 + close + 2..];
    }
    if !rest.is_empty() {
        pieces.push(Piece::Text(rest));
    }
    pieces
}

impl Parser {
    // ==================== Entry points ====================

    /// Full expression, including ternary and postfix `if`
    pub(super) fn expression(&mut self) -> CompileResult<()> {
        let start = self.offset();
        self.ternary()?;
        if self.check(TokenKind::If) && self.previous.kind != TokenKind::RBrace {
            self.postfix_if(start)?;
        }
        if self.check(TokenKind::Assign) || self.current.kind.is_compound_assign() {
            return Err(self.error_at(&self.current, CompileErrorKind::InvalidAssignmentTarget));
        }
        Ok(())
    }

    /// `cond ? a : b`
    fn ternary(&mut self) -> CompileResult<()> {
        self.binary(0)?;
        if self.matches(TokenKind::Question)? {
            let else_jump = self.emit_jump(OpCode::JumpIfFalse(0));
            self.expression()?;
            self.expect(TokenKind::Colon)?;
            let end_jump = self.emit_jump(OpCode::Jump(0));
            self.patch_jump(else_jump);
            self.expression()?;
            self.patch_jump(end_jump);
        }
        Ok(())
    }

    /// `A if C else B`; the code for `A` (from `start`) is moved behind `C`
    fn postfix_if(&mut self, start: usize) -> CompileResult<()> {
        self.advance()?;
        let moved = self.program().cut(start);
        let moved_len = moved.len();

        self.ternary()?;
        let else_jump = self.emit_jump(OpCode::JumpIfFalse(0));
        let new_start = self.offset();
        self.program().splice(moved);
        self.state()
            .relocate_jumps(start, start + moved_len, new_start as isize - start as isize);
        let end_jump = self.emit_jump(OpCode::Jump(0));

        self.patch_jump(else_jump);
        if self.matches(TokenKind::Else)? {
            self.expression()?;
        } else {
            self.emit(OpCode::Null);
        }
        self.patch_jump(end_jump);
        Ok(())
    }

    /// Precedence climbing over the binary operator table
    fn binary(&mut self, min_level: u8) -> CompileResult<()> {
        self.unary(min_level == 0)?;
        while let Some(level) = binary_level(self.current.kind) {
            if level < min_level {
                break;
            }
            let operator = self.advance()?;
            match operator.kind {
                TokenKind::Or => {
                    let jump = self.emit_jump(OpCode::OrJump(0));
                    self.binary(level + 1)?;
                    self.patch_jump(jump);
                }
                TokenKind::And => {
                    let jump = self.emit_jump(OpCode::AndJump(0));
                    self.binary(level + 1)?;
                    self.patch_jump(jump);
                }
                TokenKind::StarStar => {
                    self.binary(level)?;
                    self.emit(OpCode::Pow);
                }
                kind => {
                    self.binary(level + 1)?;
                    self.emit(binary_op(kind));
                }
            }
        }
        Ok(())
    }

    fn unary(&mut self, can_assign: bool) -> CompileResult<()> {
        match self.current.kind {
            TokenKind::Minus => {
                self.advance()?;
                let start = self.offset();
                self.unary(false)?;
                self.negate(start);
            }
            TokenKind::Plus => {
                self.advance()?;
                self.unary(false)?;
                self.emit(OpCode::Positive);
            }
            TokenKind::Not => {
                self.advance()?;
                self.unary(false)?;
                self.emit(OpCode::Not);
            }
            _ => self.postfix(can_assign)?,
        }
        Ok(())
    }

    /// Negate the operand compiled from `start`, folding numeric literals
    fn negate(&mut self, start: usize) {
        let program = self.program();
        if program.len() == start + 1 {
            match program.last_op() {
                Some(OpCode::Int(index)) => {
                    let value = program.int(index).unwrap_or_default().wrapping_neg();
                    let folded = program.add_int(value);
                    program.replace_last(OpCode::Int(folded));
                    return;
                }
                Some(OpCode::Real(index)) => {
                    let value = -program.real(index).unwrap_or_default();
                    let folded = program.add_real(value);
                    program.replace_last(OpCode::Real(folded));
                    return;
                }
                _ => {}
            }
        }
        self.emit(OpCode::Neg);
    }

    // ==================== Suffixes & assignment ====================

    /// A primary followed by calls, member access and indexing
    fn postfix(&mut self, can_assign: bool) -> CompileResult<()> {
        let mut assignable = self.primary()?;
        loop {
            match self.current.kind {
                TokenKind::Dot => {
                    self.advance()?;
                    let name = self.expect_word("member name")?;
                    let index = self.string_constant(&name);
                    if self.matches(TokenKind::LParen)? {
                        let argc = self.arguments()?;
                        self.emit(OpCode::CallMethod { name: index, argc });
                        assignable = false;
                    } else {
                        self.emit(OpCode::DotGet(index));
                        assignable = true;
                    }
                }
                // After a block's `}`, `[` and `(` begin the next expression.
                TokenKind::LBracket if self.previous.kind != TokenKind::RBrace => {
                    self.advance()?;
                    self.expression()?;
                    self.expect(TokenKind::RBracket)?;
                    self.emit(OpCode::IndexGet);
                    assignable = true;
                }
                TokenKind::LParen if self.previous.kind != TokenKind::RBrace => {
                    self.advance()?;
                    let argc = self.arguments()?;
                    self.emit(OpCode::Call(argc));
                    assignable = false;
                }
                _ => break,
            }
        }

        if can_assign
            && assignable
            && (self.check(TokenKind::Assign) || self.current.kind.is_compound_assign())
        {
            self.assignment()?;
        }
        Ok(())
    }

    /// Call arguments after `(`, through the closing parenthesis
    fn arguments(&mut self) -> CompileResult<u32> {
        let mut argc = 0;
        while !self.check(TokenKind::RParen) {
            self.expression()?;
            argc += 1;
            if !self.matches(TokenKind::Comma)? {
                break;
            }
        }
        self.expect(TokenKind::RParen)?;
        Ok(argc)
    }

    /// Turn the read just compiled into a write
    ///
    /// The target was compiled as an ordinary load; its final instruction is
    /// swapped for the matching store once the right-hand side is compiled.
    fn assignment(&mut self) -> CompileResult<()> {
        let operator = self.advance()?;
        let last = self.state_ref().program.last_op();
        let Some((load, store)) = last.and_then(|op| op.store_form().map(|store| (op, store))) else {
            return Err(self.error_at(&operator, CompileErrorKind::InvalidAssignmentTarget));
        };

        if operator.kind == TokenKind::Assign {
            self.program().pop_op();
            self.expression()?;
            self.emit(store);
            return Ok(());
        }

        let arithmetic = binary_op(operator.kind);
        match load {
            OpCode::DotGet(_) => {
                self.program().pop_op();
                self.emit(OpCode::Dup);
                self.emit(load);
            }
            OpCode::IndexGet => {
                self.program().pop_op();
                self.emit(OpCode::Dup2);
                self.emit(load);
            }
            _ => {}
        }
        self.expression()?;
        self.emit(arithmetic);
        self.emit(store);
        Ok(())
    }

    // ==================== Primaries ====================

    /// Compile a primary expression; returns whether it is assignable
    fn primary(&mut self) -> CompileResult<bool> {
        let token = self.advance()?;
        match token.kind {
            TokenKind::Int => {
                let value: i64 = token.text.parse().map_err(|_| {
                    self.error_at(&token, CompileErrorKind::InvalidNumber(token.text.clone()))
                })?;
                let index = self.program().add_int(value);
                self.emit(OpCode::Int(index));
            }
            TokenKind::HexInt => {
                let value = u64::from_str_radix(&token.text[2..], 16).map_err(|_| {
                    self.error_at(&token, CompileErrorKind::InvalidNumber(token.text.clone()))
                })?;
                let index = self.program().add_int(value as i64);
                self.emit(OpCode::Int(index));
            }
            TokenKind::Real => {
                let value: f64 = token.text.parse().map_err(|_| {
                    self.error_at(&token, CompileErrorKind::InvalidNumber(token.text.clone()))
                })?;
                let index = self.program().add_real(value);
                self.emit(OpCode::Real(index));
            }
            TokenKind::Str => self.string_literal(&token.text)?,
            TokenKind::Regex => {
                let regex = Regex::new(&token.text).map_err(|err| {
                    self.error_at(&token, CompileErrorKind::InvalidRegex(err.to_string()))
                })?;
                let index = self.program().add_regex(regex);
                self.emit(OpCode::Regexp(index));
            }
            TokenKind::True => {
                self.emit(OpCode::True);
            }
            TokenKind::False => {
                self.emit(OpCode::False);
            }
            TokenKind::Null => {
                self.emit(OpCode::Null);
            }
            TokenKind::Dollar => {
                self.emit(OpCode::LoadContext);
            }
            TokenKind::LParen => {
                self.expression()?;
                if self.matches(TokenKind::Comma)? {
                    self.expression()?;
                    self.expect(TokenKind::RParen)?;
                    self.emit(OpCode::NewPair);
                } else {
                    self.expect(TokenKind::RParen)?;
                }
            }
            TokenKind::LBracket => self.list_literal()?,
            TokenKind::LBrace => self.map_literal()?,
            TokenKind::Ident => return self.identifier(&token),
            TokenKind::SessionName => {
                let Some(slot) = self.module.session_slot(&token.text) else {
                    return Err(self.undeclared(&token, "session"));
                };
                self.emit(OpCode::LoadSession(slot as u32));
                return Ok(true);
            }
            TokenKind::GlobalName => {
                let Some(slot) = self.module.global_slot(&token.text) else {
                    return Err(self.undeclared(&token, "global"));
                };
                self.emit(OpCode::LoadGlobal(slot as u32));
                return Ok(true);
            }
            TokenKind::DynamicName => {
                let index = self.string_constant(&token.text);
                self.emit(OpCode::LoadDynamic(index));
                return Ok(true);
            }
            TokenKind::ExternName => {
                let index = self.string_constant(&token.text);
                self.emit(OpCode::LoadExtern(index));
            }
            TokenKind::Fn | TokenKind::Iter => self.anonymous_function(&token)?,
            TokenKind::If => self.if_expression()?,
            TokenKind::Try => self.try_expression()?,
            TokenKind::Template => self.template_expression(&token)?,
            _ => {
                return Err(self.error_at(&token, CompileErrorKind::ExpectedExpression(describe(&token))));
            }
        }
        Ok(false)
    }

    fn undeclared(&self, token: &Token, scope: &'static str) -> super::CompileError {
        self.error_at(
            token,
            CompileErrorKind::UndeclaredSlot {
                scope,
                name: token.text.clone(),
            },
        )
    }

    /// Plain names: variables, calls by name and intrinsic references
    fn identifier(&mut self, token: &Token) -> CompileResult<bool> {
        let name = token.text.as_str();
        if name == "_" {
            self.emit(OpCode::Placeholder);
            return Ok(false);
        }

        if self.check(TokenKind::ColonColon) {
            self.advance()?;
            let member = self.expect_word("intrinsic name")?;
            let qualified = format!("{name}::{member}");
            if !natives::contains(&qualified) {
                return Err(self.error_at(token, CompileErrorKind::UnknownIntrinsic(qualified)));
            }
            let index = self.string_constant(&qualified);
            if self.matches(TokenKind::LParen)? {
                let argc = self.arguments()?;
                self.emit(OpCode::CallName { name: index, argc });
            } else {
                self.emit(OpCode::LoadIntrinsic(index));
            }
            return Ok(false);
        }

        if let Some(load) = self.resolve_variable(name) {
            self.emit(load);
            return Ok(true);
        }

        let index = self.string_constant(name);
        if self.matches(TokenKind::LParen)? {
            let argc = self.arguments()?;
            self.emit(OpCode::CallName { name: index, argc });
            return Ok(false);
        }
        self.emit(OpCode::LoadName(index));
        Ok(true)
    }

    /// Local, then captured, then session slot, then global slot
    fn resolve_variable(&mut self, name: &str) -> Option<OpCode> {
        let depth = self.funcs.len() - 1;
        if let Some(index) = self.funcs[depth].resolve_local(name) {
            return Some(OpCode::LoadLocal(self.funcs[depth].locals[index].slot));
        }
        if let Some(index) = self.resolve_upvalue(depth, name) {
            return Some(OpCode::LoadUpvalue(index));
        }
        if let Some(slot) = self.module.session_slot(name) {
            return Some(OpCode::LoadSession(slot as u32));
        }
        self.module
            .global_slot(name)
            .map(|slot| OpCode::LoadGlobal(slot as u32))
    }

    /// Capture `name` from the programs enclosing `funcs[depth]`
    ///
    /// Captures through several levels collapse into a chain of upvalue
    /// descriptors, one per intermediate function.
    fn resolve_upvalue(&mut self, depth: usize, name: &str) -> Option<u32> {
        if depth == 0 {
            return None;
        }
        let enclosing = depth - 1;
        if let Some(index) = self.funcs[enclosing].resolve_local(name) {
            let local = &mut self.funcs[enclosing].locals[index];
            local.captured = true;
            let slot = local.slot;
            return Some(self.funcs[depth].add_upvalue(slot, true));
        }
        let index = self.resolve_upvalue(enclosing, name)?;
        Some(self.funcs[depth].add_upvalue(index, false))
    }

    /// A string literal, with `{{ expr }}` spans compiled in place
    fn string_literal(&mut self, text: &str) -> CompileResult<()> {
        let pieces = split_interpolation(text);
        if let [] | [Piece::Text(_)] = pieces.as_slice() {
            let index = self.string_constant(text);
            self.emit(OpCode::Str(index));
            return Ok(());
        }
        let count = pieces.len() as u32;
        for piece in pieces {
            match piece {
                Piece::Text(literal) => {
                    let index = self.string_constant(literal);
                    self.emit(OpCode::Str(index));
                }
                Piece::Expr(source) => self.with_source(source, Self::expression)?,
            }
        }
        self.emit(OpCode::Concat(count));
        Ok(())
    }

    /// `[a, b, ...]`
    fn list_literal(&mut self) -> CompileResult<()> {
        let mut count = 0;
        while !self.check(TokenKind::RBracket) {
            self.expression()?;
            count += 1;
            if !self.matches(TokenKind::Comma)? {
                break;
            }
        }
        self.expect(TokenKind::RBracket)?;
        self.emit(OpCode::NewList(count));
        Ok(())
    }

    /// `{"key": value, key: value}`
    fn map_literal(&mut self) -> CompileResult<()> {
        let mut count = 0;
        while !self.check(TokenKind::RBrace) {
            let key = match self.current.kind {
                TokenKind::Str | TokenKind::Int => self.advance()?.text,
                _ => self.expect_word("map key")?,
            };
            let index = self.string_constant(&key);
            self.emit(OpCode::Str(index));
            self.expect(TokenKind::Colon)?;
            self.expression()?;
            count += 1;
            if !self.matches(TokenKind::Comma)? {
                break;
            }
        }
        self.expect(TokenKind::RBrace)?;
        self.emit(OpCode::NewMap(count));
        Ok(())
    }

    /// `fn (params) { }` or `iter (params) { }` as a value
    fn anonymous_function(&mut self, keyword: &Token) -> CompileResult<()> {
        let kind = if keyword.kind == TokenKind::Iter {
            ProgramKind::Iterator
        } else {
            ProgramKind::Function
        };
        let name = format!("{kind}@{}", keyword.location.line + self.line_offset);
        let program = self.function(&name, kind)?;
        let index = self.program().add_function(program);
        self.emit(OpCode::Closure(index));
        Ok(())
    }

    /// `if c { } elif c { } else { }`, valued by the branch taken
    fn if_expression(&mut self) -> CompileResult<()> {
        let mut end_jumps = Vec::new();
        loop {
            self.expression()?;
            let next_branch = self.emit_jump(OpCode::JumpIfFalse(0));
            self.block()?;
            end_jumps.push(self.emit_jump(OpCode::Jump(0)));
            self.patch_jump(next_branch);

            if self.matches(TokenKind::Elif)? {
                continue;
            }
            if self.matches(TokenKind::Else)? {
                if self.matches(TokenKind::If)? {
                    continue;
                }
                self.block()?;
            } else {
                self.emit(OpCode::Null);
            }
            break;
        }
        for jump in end_jumps {
            self.patch_jump(jump);
        }
        Ok(())
    }

    /// `try X else [let name] Y`
    fn try_expression(&mut self) -> CompileResult<()> {
        let handler = self.emit_jump(OpCode::PushHandler(0));
        self.state().try_depth += 1;
        self.block_or_expression()?;
        self.state().try_depth -= 1;
        self.emit(OpCode::PopHandler);
        let end = self.emit_jump(OpCode::Jump(0));

        self.patch_jump(handler);
        self.expect(TokenKind::Else)?;
        if self.matches(TokenKind::Let)? {
            let name = self.expect_ident()?;
            self.begin_scope();
            let slot = self.state().declare_local(&name.text);
            self.emit(OpCode::StoreLocal(slot));
            self.emit(OpCode::Pop);
            self.block_or_expression()?;
            self.end_scope();
        } else {
            self.emit(OpCode::Pop);
            self.block_or_expression()?;
        }
        self.patch_jump(end);
        Ok(())
    }

    fn block_or_expression(&mut self) -> CompileResult<()> {
        if self.check(TokenKind::LBrace) {
            self.block()
        } else {
            self.expression()
        }
    }

    /// `template "engine[opts]", context, "source"` or `..., file "path"`
    fn template_expression(&mut self, keyword: &Token) -> CompileResult<()> {
        let spec = self.expect(TokenKind::Str)?;
        self.expect(TokenKind::Comma)?;
        self.expression()?;
        self.expect(TokenKind::Comma)?;

        let (name, source) = if self.check(TokenKind::Ident) && self.current.text == "file" {
            self.advance()?;
            let path = self.expect(TokenKind::Str)?;
            let source = std::fs::read_to_string(&path.text).map_err(|err| {
                self.error_at(
                    &path,
                    CompileErrorKind::Template(format!("cannot read '{}': {err}", path.text)),
                )
            })?;
            (path.text, source)
        } else {
            let source = self.expect(TokenKind::Str)?;
            let name = format!(
                "{}:{}",
                self.state_ref().program.name,
                keyword.location.line + self.line_offset
            );
            (name, source.text)
        };

        let template = crate::template::compile(&spec.text, &name, &source)
            .map_err(|err| self.error_at(&spec, CompileErrorKind::Template(err.to_string())))?;
        let index = self.program().add_template(template);
        self.emit(OpCode::Template(index));
        Ok(())
    }
}
