//! Statements, blocks, loops and phase-specific lowering

use super::scope::LoopInfo;
use super::{CompileErrorKind, CompileResult, Parser};
use crate::bytecode::{OpCode, ProgramKind};
use crate::lexer::{Token, TokenKind};

impl Parser {
    // ==================== Blocks ====================

    /// Compile statements up to and including the closing brace, leaving the
    /// block value on the stack
    pub(super) fn block_body(&mut self) -> CompileResult<()> {
        let mut has_value = false;
        while !self.check(TokenKind::RBrace) && !self.check(TokenKind::Eof) {
            if has_value {
                self.emit(OpCode::Pop);
            }
            has_value = self.statement()?;
        }
        self.expect(TokenKind::RBrace)?;
        if !has_value {
            self.emit(OpCode::Null);
        }
        Ok(())
    }

    /// `{ ... }` in its own scope, leaving the block value on the stack
    pub(super) fn block(&mut self) -> CompileResult<()> {
        self.expect(TokenKind::LBrace)?;
        self.begin_scope();
        self.block_body()?;
        self.end_scope();
        Ok(())
    }

    /// Compile one statement; returns whether it left a value on the stack
    fn statement(&mut self) -> CompileResult<bool> {
        match self.current.kind {
            TokenKind::Semicolon => {
                self.advance()?;
                Ok(false)
            }
            TokenKind::Let => self.let_statement(),
            TokenKind::Return => self.return_statement(),
            TokenKind::Yield => self.yield_statement(),
            TokenKind::Break => self.break_statement(),
            TokenKind::Continue => self.continue_statement(),
            TokenKind::For => self.for_statement(),
            TokenKind::While => self.while_statement(),
            TokenKind::Fn | TokenKind::Iter if self.next.kind == TokenKind::Ident => {
                self.local_function()
            }
            TokenKind::LBrace => {
                self.block()?;
                self.finish_value_statement()
            }
            TokenKind::At => self.attribute(),
            TokenKind::Ident if self.next.kind == TokenKind::FatArrow => self.action_statement(),
            TokenKind::Ident
                if self.in_config() && matches!(self.next.kind, TokenKind::LBrace | TokenKind::Str) =>
            {
                self.config_section()
            }
            _ => {
                self.expression()?;
                self.finish_value_statement()
            }
        }
    }

    /// After an expression statement: `;` discards the value, a closing brace
    /// keeps it as the block value
    fn finish_value_statement(&mut self) -> CompileResult<bool> {
        if self.matches(TokenKind::Semicolon)? {
            self.emit(OpCode::Pop);
            return Ok(false);
        }
        if self.check(TokenKind::RBrace) || self.previous.kind == TokenKind::RBrace {
            return Ok(true);
        }
        Err(self.unexpected("';'"))
    }

    /// Statement terminator: `;`, or nothing before `}` or after a block
    fn end_statement(&mut self) -> CompileResult<()> {
        if self.matches(TokenKind::Semicolon)?
            || self.check(TokenKind::RBrace)
            || self.previous.kind == TokenKind::RBrace
        {
            return Ok(());
        }
        Err(self.unexpected("';'"))
    }

    // ==================== Declarations ====================

    /// `let x [= e];`
    fn let_statement(&mut self) -> CompileResult<bool> {
        self.advance()?;
        let name = self.expect_ident()?;

        if let Some(phase) = self.slot_phase() {
            self.check_slot_free(phase, &name)?;
            self.optional_initializer()?;
            self.store_slot(phase, name.text);
        } else {
            self.optional_initializer()?;
            let slot = self.state().declare_local(&name.text);
            self.emit(OpCode::StoreLocal(slot));
            self.emit(OpCode::Pop);
        }
        self.end_statement()?;
        Ok(false)
    }

    fn optional_initializer(&mut self) -> CompileResult<()> {
        if self.matches(TokenKind::Assign)? {
            self.expression()
        } else {
            self.emit(OpCode::Null);
            Ok(())
        }
    }

    fn check_slot_free(&self, phase: ProgramKind, name: &Token) -> CompileResult<()> {
        let taken = match phase {
            ProgramKind::Global => self.module.global_slot(&name.text).is_some(),
            _ => self.module.session_slot(&name.text).is_some(),
        };
        if taken {
            return Err(self.error_at(name, CompileErrorKind::DuplicateDefinition(name.text.clone())));
        }
        Ok(())
    }

    /// Declare a global or session slot and store the value on the stack in it
    fn store_slot(&mut self, phase: ProgramKind, name: String) {
        let store = match phase {
            ProgramKind::Global => {
                self.module.global_names.push(name);
                OpCode::StoreGlobal((self.module.global_names.len() - 1) as u32)
            }
            _ => {
                self.module.session_names.push(name);
                OpCode::StoreSession((self.module.session_names.len() - 1) as u32)
            }
        };
        self.emit(store);
        self.emit(OpCode::Pop);
    }

    /// Nested `fn name(..) {}` or `iter name(..) {}` bound to a local
    fn local_function(&mut self) -> CompileResult<bool> {
        let keyword = self.advance()?;
        let name = self.expect_ident()?;
        let kind = if keyword.kind == TokenKind::Iter {
            ProgramKind::Iterator
        } else {
            ProgramKind::Function
        };
        let slot = self.state().declare_local(&name.text);
        let program = self.function(&name.text, kind)?;
        let index = self.program().add_function(program);
        self.emit(OpCode::Closure(index));
        self.emit(OpCode::StoreLocal(slot));
        self.emit(OpCode::Pop);
        Ok(false)
    }

    // ==================== Actions & config ====================

    /// `name => e;`
    fn action_statement(&mut self) -> CompileResult<bool> {
        let name = self.advance()?;
        self.advance()?;

        if let Some(phase) = self.slot_phase() {
            self.check_slot_free(phase, &name)?;
            self.expression()?;
            self.store_slot(phase, name.text);
        } else {
            self.expression()?;
            let key = self.string_constant(&name.text);
            if self.in_config() {
                self.emit(OpCode::ConfigProperty(key));
            } else {
                self.emit(OpCode::Action(key));
            }
        }
        self.end_statement()?;
        Ok(false)
    }

    /// `name { }` or `name "label" { }` inside `config`
    fn config_section(&mut self) -> CompileResult<bool> {
        let name = self.advance()?;
        if self.check(TokenKind::Str) {
            let label = self.advance()?;
            let index = self.string_constant(&label.text);
            self.emit(OpCode::Str(index));
        } else {
            self.emit(OpCode::Null);
        }
        let key = self.string_constant(&name.text);
        self.emit(OpCode::PushConfig(key));
        self.block()?;
        self.emit(OpCode::Pop);
        self.emit(OpCode::PopConfig);
        Ok(false)
    }

    /// `@name` or `@name(expr)` before a config item
    fn attribute(&mut self) -> CompileResult<bool> {
        let at = self.advance()?;
        if !self.in_config() {
            return Err(self.error_at(&at, CompileErrorKind::ConfigOnly("attributes")));
        }
        let name = self.expect_word("attribute name")?;
        if self.matches(TokenKind::LParen)? {
            self.expression()?;
            self.expect(TokenKind::RParen)?;
        } else {
            self.emit(OpCode::True);
        }
        let key = self.string_constant(&name);
        self.emit(OpCode::SetAttr(key));
        Ok(false)
    }

    // ==================== Control flow ====================

    fn return_statement(&mut self) -> CompileResult<bool> {
        self.advance()?;
        if self.check(TokenKind::Semicolon) || self.check(TokenKind::RBrace) {
            self.emit(OpCode::Null);
        } else {
            self.expression()?;
        }
        self.emit(OpCode::Return);
        self.end_statement()?;
        Ok(false)
    }

    /// `yield v;` or `yield k, v;`
    fn yield_statement(&mut self) -> CompileResult<bool> {
        let keyword = self.advance()?;
        if self.state_ref().kind() != ProgramKind::Iterator {
            return Err(self.error_at(&keyword, CompileErrorKind::YieldOutsideIterator));
        }
        if self.state_ref().try_depth > 0 {
            return Err(self.error_at(&keyword, CompileErrorKind::YieldInsideTry));
        }
        self.expression()?;
        let keyed = self.matches(TokenKind::Comma)?;
        if keyed {
            self.expression()?;
        }
        self.emit(OpCode::Yield { keyed });
        self.end_statement()?;
        Ok(false)
    }

    fn break_statement(&mut self) -> CompileResult<bool> {
        let keyword = self.advance()?;
        let Some(info) = self.state_ref().loops.last().cloned() else {
            return Err(self.error_at(&keyword, CompileErrorKind::BreakOutsideLoop));
        };
        self.leave_loop_body(&info);
        let jump = self.emit_jump(OpCode::Jump(0));
        if let Some(info) = self.state().loops.last_mut() {
            info.break_jumps.push(jump);
        }
        self.end_statement()?;
        Ok(false)
    }

    fn continue_statement(&mut self) -> CompileResult<bool> {
        let keyword = self.advance()?;
        let Some(info) = self.state_ref().loops.last().cloned() else {
            return Err(self.error_at(&keyword, CompileErrorKind::ContinueOutsideLoop));
        };
        self.leave_loop_body(&info);
        self.emit_loop(info.continue_target);
        self.end_statement()?;
        Ok(false)
    }

    /// Unwind handlers and captured locals entered since the loop started
    fn leave_loop_body(&mut self, info: &LoopInfo) {
        for _ in info.try_depth..self.state_ref().try_depth {
            self.emit(OpCode::PopHandler);
        }
        let captured = self
            .state_ref()
            .locals
            .iter()
            .any(|local| local.slot >= info.local_base && local.captured);
        if captured {
            self.emit(OpCode::CloseUpvalues(info.local_base));
        }
    }

    fn push_loop(&mut self, continue_target: usize, local_base: u32) {
        let try_depth = self.state_ref().try_depth;
        self.state().loops.push(LoopInfo {
            continue_target,
            local_base,
            try_depth,
            break_jumps: Vec::new(),
        });
    }

    fn pop_loop(&mut self) {
        if let Some(info) = self.state().loops.pop() {
            for jump in info.break_jumps {
                self.patch_jump(jump);
            }
        }
    }

    /// `for v in e { }` or `for k, v in e { }`
    fn for_statement(&mut self) -> CompileResult<bool> {
        self.advance()?;
        let first = self.expect_ident()?;
        let second = if self.matches(TokenKind::Comma)? {
            Some(self.expect_ident()?)
        } else {
            None
        };
        self.expect(TokenKind::In)?;
        self.expression()?;
        self.emit(OpCode::IterInit);

        self.begin_scope();
        let iterator = self.state().declare_local(" iter");
        self.emit(OpCode::StoreLocal(iterator));
        self.emit(OpCode::Pop);

        let (key, value) = match second {
            Some(value) => (Some(first), value),
            None => (None, first),
        };
        let local_base = self.state_ref().next_slot();
        let key_slot = key.map(|key| self.state().declare_local(&key.text));
        let value_slot = self.state().declare_local(&value.text);

        let start = self.offset();
        self.emit(OpCode::LoadLocal(iterator));
        let exit = self.emit_jump(OpCode::IterNext {
            exit: 0,
            pair: key_slot.is_some(),
        });
        self.emit(OpCode::StoreLocal(value_slot));
        self.emit(OpCode::Pop);
        if let Some(slot) = key_slot {
            self.emit(OpCode::StoreLocal(slot));
            self.emit(OpCode::Pop);
        }

        self.push_loop(start, local_base);
        self.block()?;
        self.emit(OpCode::Pop);
        let captured = self
            .state_ref()
            .locals
            .iter()
            .any(|local| local.slot >= local_base && local.captured);
        if captured {
            self.emit(OpCode::CloseUpvalues(local_base));
        }
        self.emit_loop(start);
        self.patch_jump(exit);
        self.pop_loop();
        self.end_scope();
        Ok(false)
    }

    /// `while cond { }`
    fn while_statement(&mut self) -> CompileResult<bool> {
        self.advance()?;
        let start = self.offset();
        self.expression()?;
        let exit = self.emit_jump(OpCode::JumpIfFalse(0));

        let local_base = self.state_ref().next_slot();
        self.push_loop(start, local_base);
        self.block()?;
        self.emit(OpCode::Pop);
        self.emit_loop(start);
        self.patch_jump(exit);
        self.pop_loop();
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use crate::bytecode::OpCode;
    use crate::parser::{compile_module, CompileErrorKind};

    #[test]
    fn global_declarations_become_slots() {
        let module = compile_module("global { let a = 1; b => 2; if true { let c = 3; } }").unwrap();
        assert_eq!(module.global_names, vec!["a".to_string(), "b".to_string()]);
        let code = module.global.as_ref().unwrap().code();
        assert_eq!(&code[..3], &[OpCode::Int(0), OpCode::StoreGlobal(0), OpCode::Pop]);
        assert!(code.contains(&OpCode::StoreLocal(0)));
    }

    #[test]
    fn session_declarations_become_slots() {
        let module = compile_module("session { let hits = 0; }").unwrap();
        assert_eq!(module.session_names, vec!["hits".to_string()]);
        assert!(module.session.as_ref().unwrap().code().contains(&OpCode::StoreSession(0)));
    }

    #[test]
    fn duplicate_slots_are_rejected() {
        let err = compile_module("global { let a = 1; let a = 2; }").unwrap_err();
        assert_eq!(err.kind, CompileErrorKind::DuplicateDefinition("a".to_string()));
    }

    #[test]
    fn actions_outside_phases() {
        let module = compile_module("main { status => 200; }").unwrap();
        let code = module.rules[0].code();
        assert_eq!(&code[2..4], &[OpCode::Int(0), OpCode::Action(1)]);
    }

    #[test]
    fn config_sections_and_attributes() {
        let module = compile_module(
            "config { server \"main\" { @default listen => 80; } @weight(3) upstream { } }",
        )
        .unwrap();
        let code = module.config.as_ref().unwrap().code();
        assert_eq!(code[0], OpCode::Str(0));
        assert!(matches!(code[1], OpCode::PushConfig(_)));
        assert!(code.contains(&OpCode::SetAttr(2)));
        assert!(code.iter().any(|op| matches!(op, OpCode::ConfigProperty(_))));
        assert_eq!(code.iter().filter(|op| **op == OpCode::PopConfig).count(), 2);
    }

    #[test]
    fn attributes_need_config() {
        let err = compile_module("main { @x y => 1; }").unwrap_err();
        assert_eq!(err.kind, CompileErrorKind::ConfigOnly("attributes"));
    }

    #[test]
    fn break_and_continue_need_a_loop() {
        let err = compile_module("main { break; }").unwrap_err();
        assert_eq!(err.kind, CompileErrorKind::BreakOutsideLoop);
        let err = compile_module("main { continue; }").unwrap_err();
        assert_eq!(err.kind, CompileErrorKind::ContinueOutsideLoop);
    }

    #[test]
    fn yield_is_checked() {
        let err = compile_module("fn f() { yield 1; }").unwrap_err();
        assert_eq!(err.kind, CompileErrorKind::YieldOutsideIterator);
        let err = compile_module("iter g() { try { yield 1; } else null; }").unwrap_err();
        assert_eq!(err.kind, CompileErrorKind::YieldInsideTry);
    }

    #[test]
    fn for_loops_keep_the_iterator_in_a_hidden_local() {
        let module = compile_module("main { for k, v in [1] { } }").unwrap();
        let code = module.rules[0].code();
        assert!(code.contains(&OpCode::IterInit));
        assert!(code.contains(&OpCode::StoreLocal(0)));
        assert!(code
            .iter()
            .any(|op| matches!(op, OpCode::IterNext { pair: true, .. })));
        assert_eq!(module.rules[0].local_count, 3);
    }

    #[test]
    fn break_inside_try_pops_handlers() {
        let module = compile_module("main { while true { try { break; } else null; } }").unwrap();
        let code = module.rules[0].code();
        let handler = code.iter().position(|op| matches!(op, OpCode::PushHandler(_))).unwrap();
        assert_eq!(code[handler + 1], OpCode::PopHandler);
        assert!(matches!(code[handler + 2], OpCode::Jump(_)));
    }

    #[test]
    fn missing_semicolons_are_reported() {
        let err = compile_module("main { let a = 1 let b = 2 }").unwrap_err();
        assert_eq!(err.message(), "unexpected 'let', expected ';'");
    }

    #[test]
    fn nested_functions_bind_locals() {
        let module = compile_module("main { fn twice(x) { x * 2 } twice(4) }").unwrap();
        let code = module.rules[0].code();
        assert!(code.contains(&OpCode::Closure(0)));
        assert!(code.contains(&OpCode::Call(1)));
        assert_eq!(module.rules[0].functions()[0].arity, 1);
    }
}
