//! Bytecode disassembler for debugging

use std::fmt::Write;

use super::module::Module;
use super::opcode::OpCode;
use super::program::Program;

/// Disassemble a program (and its nested programs) to a string
pub fn disassemble_program(program: &Program) -> String {
    let mut output = String::new();
    write_program(program, &mut output);
    output
}

/// Disassemble every program of a module, in lifecycle order
pub fn disassemble_module(module: &Module) -> String {
    let mut output = String::new();
    let blocks = [&module.global, &module.session, &module.config];
    for program in blocks.into_iter().flatten() {
        write_program(program, &mut output);
    }
    for program in module
        .functions
        .iter()
        .chain(&module.iterators)
        .chain(&module.rules)
    {
        write_program(program, &mut output);
    }
    output
}

fn write_program(program: &Program, output: &mut String) {
    let _ = writeln!(
        output,
        "== {} {} (arity {}, locals {}, upvalues {}) ==",
        program.kind,
        program.name,
        program.arity,
        program.local_count,
        program.upvalues.len()
    );
    for pc in 0..program.len() {
        disassemble_instruction(program, pc, output);
    }
    for nested in program.functions() {
        write_program(nested, output);
    }
}

/// Disassemble a single instruction as `offset line OPCODE operand ; comment`
pub fn disassemble_instruction(program: &Program, pc: usize, output: &mut String) {
    let _ = write!(output, "{pc:04} ");

    let line = program.line(pc);
    if pc > 0 && line == program.line(pc - 1) {
        let _ = write!(output, "   | ");
    } else {
        let _ = write!(output, "{line:4} ");
    }

    let Some(op) = program.op(pc) else {
        let _ = writeln!(output, "<invalid offset>");
        return;
    };
    let name = op.name();

    let string = |index: u32| {
        program
            .string(index)
            .map_or_else(|| "<invalid>".to_string(), |s| format!("'{s}'"))
    };
    let target = |offset: i32| pc as i64 + 1 + i64::from(offset);

    let _ = match op {
        OpCode::Int(i) => writeln!(output, "{name:16} {i:4} ; {}", program.int(i).unwrap_or_default()),
        OpCode::Real(i) => writeln!(output, "{name:16} {i:4} ; {}", program.real(i).unwrap_or_default()),
        OpCode::Regexp(i) => writeln!(
            output,
            "{name:16} {i:4} ; r'{}'",
            program.regex(i).map_or("<invalid>", |r| r.as_str())
        ),
        OpCode::Str(i)
        | OpCode::LoadName(i)
        | OpCode::LoadDynamic(i)
        | OpCode::StoreDynamic(i)
        | OpCode::LoadExtern(i)
        | OpCode::LoadIntrinsic(i)
        | OpCode::DotGet(i)
        | OpCode::DotSet(i)
        | OpCode::Action(i)
        | OpCode::PushConfig(i)
        | OpCode::ConfigProperty(i)
        | OpCode::SetAttr(i)
        | OpCode::EventIs(i) => writeln!(output, "{name:16} {i:4} ; {}", string(i)),
        OpCode::LoadLocal(n)
        | OpCode::StoreLocal(n)
        | OpCode::LoadUpvalue(n)
        | OpCode::StoreUpvalue(n)
        | OpCode::CloseUpvalues(n)
        | OpCode::LoadSession(n)
        | OpCode::StoreSession(n)
        | OpCode::LoadGlobal(n)
        | OpCode::StoreGlobal(n)
        | OpCode::NewList(n)
        | OpCode::NewMap(n)
        | OpCode::Concat(n)
        | OpCode::Call(n)
        | OpCode::Template(n) => writeln!(output, "{name:16} {n:4}"),
        OpCode::Closure(i) => writeln!(
            output,
            "{name:16} {i:4} ; {}",
            program
                .function(i)
                .map_or_else(|| "<invalid>".to_string(), |f| format!("<{} {}>", f.kind, f.name))
        ),
        OpCode::Jump(offset)
        | OpCode::JumpIfFalse(offset)
        | OpCode::OrJump(offset)
        | OpCode::AndJump(offset)
        | OpCode::PushHandler(offset) => {
            writeln!(output, "{name:16} {offset:4} ; -> {}", target(offset))
        }
        OpCode::IterNext { exit, pair } => writeln!(
            output,
            "{name:16} {exit:4} ; -> {}{}",
            target(exit),
            if pair { " (key, value)" } else { "" }
        ),
        OpCode::CallName { name: index, argc } | OpCode::CallMethod { name: index, argc } => {
            writeln!(output, "{name:16} {index:4} ; {} ({argc})", string(index))
        }
        OpCode::Yield { keyed } => {
            writeln!(output, "{name:16}      ; {}", if keyed { "key, value" } else { "value" })
        }
        _ => writeln!(output, "{name}"),
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::ProgramKind;

    #[test]
    fn disassemble_simple() {
        let mut program = Program::new("main", ProgramKind::Rule);
        let i = program.add_int(42);
        program.emit(OpCode::Int(i), 1);
        program.emit(OpCode::Return, 1);

        let output = disassemble_program(&program);
        assert_eq!(
            output,
            "== rule main (arity 0, locals 0, upvalues 0) ==\n0000    1 INT                 0 ; 42\n0001    | RETURN\n"
        );
    }

    #[test]
    fn disassemble_jump_targets() {
        let mut program = Program::new("main", ProgramKind::Rule);
        let jump = program.emit_jump(OpCode::Jump(0), 1);
        program.emit(OpCode::Null, 2);
        program.patch_jump(jump);
        program.emit(OpCode::Return, 3);

        let output = disassemble_program(&program);
        assert!(output.contains("JUMP                1 ; -> 2"));
        assert!(output.contains("0001    2 NULL"));
    }

    #[test]
    fn disassemble_names() {
        let mut program = Program::new("main", ProgramKind::Rule);
        let name = program.add_string("upper");
        program.emit(OpCode::CallMethod { name, argc: 0 }, 1);
        let output = disassemble_program(&program);
        assert!(output.contains("CALL_METHOD         0 ; 'upper' (0)"));
    }
}
