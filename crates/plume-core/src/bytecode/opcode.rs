//! Instruction set for the Plume evaluator

use std::fmt;

/// Bytecode operation codes
///
/// This is a stack-based instruction set. Most operations pop operands from
/// the stack and push results back onto it. Jump offsets are relative to the
/// instruction *following* the jump, so a contiguous run of instructions can
/// be moved as a unit without re-patching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpCode {
    // ===== Constants =====
    /// Push null
    Null,
    /// Push true
    True,
    /// Push false
    False,
    /// Push an integer from the int pool
    Int(u32),
    /// Push a real from the real pool
    Real(u32),
    /// Push a string from the string pool
    Str(u32),
    /// Push a compiled regex from the regex pool
    Regexp(u32),
    /// Push the `_` placeholder used by `bind`
    Placeholder,

    // ===== Stack =====
    /// Pop and discard the top of stack
    Pop,
    /// Duplicate the top of stack
    Dup,
    /// Duplicate the top two values, preserving order
    Dup2,

    // ===== Variables =====
    /// Push a local slot
    LoadLocal(u32),
    /// Store top of stack into a local slot (does not pop)
    StoreLocal(u32),
    /// Push a captured variable
    LoadUpvalue(u32),
    /// Store top of stack into a captured variable (does not pop)
    StoreUpvalue(u32),
    /// Box every open upvalue at or above a local slot of the current frame
    CloseUpvalues(u32),
    /// Push a session slot
    LoadSession(u32),
    /// Store into a session slot (does not pop)
    StoreSession(u32),
    /// Push a module global slot
    LoadGlobal(u32),
    /// Store into a module global slot (does not pop)
    StoreGlobal(u32),
    /// Resolve a name at run time: module function, then host `load_var`
    /// Operand: string pool index
    LoadName(u32),
    /// Ask the host for a variable (`dynamic::x`)
    LoadDynamic(u32),
    /// Hand an assignment to the host `store_var` (does not pop)
    StoreDynamic(u32),
    /// Push a native closure forwarding to the host call callback (`extern::x`)
    LoadExtern(u32),
    /// Push an intrinsic as a native closure (`mod::fn`)
    LoadIntrinsic(u32),
    /// Push the event context `$`
    LoadContext,

    // ===== Arithmetic & comparison =====
    /// Pop two values, push their sum (or concatenation)
    Add,
    /// Pop (right, left), push left - right
    Sub,
    /// Pop two values, push their product
    Mul,
    /// Pop (right, left), push left / right
    Div,
    /// Pop (right, left), push left % right
    Mod,
    /// Pop (right, left), push left ** right
    Pow,
    /// Negate a number
    Neg,
    /// Unary plus; fails on non-numbers
    Positive,
    /// Logical not of truthiness
    Not,
    /// Equality
    Eq,
    /// Inequality
    Ne,
    /// Less than
    Lt,
    /// Less than or equal
    Le,
    /// Greater than
    Gt,
    /// Greater than or equal
    Ge,
    /// Pop (pattern, subject), push whether the pattern matches
    RegexMatch,
    /// Negated regex match
    RegexNotMatch,

    // ===== Control flow =====
    /// Unconditional relative jump
    Jump(i32),
    /// Pop the condition and jump if it is falsy
    JumpIfFalse(i32),
    /// If the top is truthy jump and keep it, otherwise pop it (`||`)
    OrJump(i32),
    /// If the top is falsy jump and keep it, otherwise pop it (`&&`)
    AndJump(i32),
    /// Push whether the current event name equals a string constant
    EventIs(u32),
    /// Pop the rule guard; stop the program with "no match" when falsy
    Match,
    /// Install an error handler whose recovery code starts at the offset
    PushHandler(i32),
    /// Remove the innermost error handler
    PopHandler,
    /// Return the top of stack from the current frame
    Return,

    // ===== Constructors =====
    /// Pop N values, push a list
    NewList(u32),
    /// Pop N key/value pairs, push a map
    NewMap(u32),
    /// Pop (second, first), push a pair
    NewPair,
    /// Pop N values, push their string concatenation
    Concat(u32),
    /// Create a closure from a nested program
    /// Operand: index into the program's function pool
    Closure(u32),
    /// Pop a context value, push the rendered template
    /// Operand: template pool index
    Template(u32),

    // ===== Access =====
    /// Pop an object, push `object.name`
    DotGet(u32),
    /// Pop (value, object), set `object.name`, push the value
    DotSet(u32),
    /// Pop (index, object), push `object[index]`
    IndexGet,
    /// Pop (value, index, object), set `object[index]`, push the value
    IndexSet,

    // ===== Calls =====
    /// Call the value below N arguments
    Call(u32),
    /// Call by name through the resolution chain
    CallName {
        /// String pool index of the name
        name: u32,
        /// Argument count
        argc: u32,
    },
    /// Call a method on the receiver below N arguments
    CallMethod {
        /// String pool index of the method name
        name: u32,
        /// Argument count
        argc: u32,
    },

    // ===== Host interaction =====
    /// Pop a value and report it through the host `action` callback
    Action(u32),
    /// Pop a label, begin a config section
    PushConfig(u32),
    /// End the innermost config section
    PopConfig,
    /// Pop a value, report a config property with the pending attributes
    ConfigProperty(u32),
    /// Pop a value, record it as a pending attribute for the next config item
    SetAttr(u32),

    // ===== Iteration =====
    /// Pop an iterable, push an iterator over it
    IterInit,
    /// Advance the iterator on top of stack, pushing its key (when `pair`)
    /// and value; jump when it is exhausted
    IterNext {
        /// Relative jump taken on exhaustion
        exit: i32,
        /// Whether the key is pushed too
        pair: bool,
    },
    /// Pop the value (and key when `keyed`) and suspend the generator
    Yield {
        /// Whether an explicit key was supplied
        keyed: bool,
    },
}

impl OpCode {
    /// Short mnemonic used by the disassembler
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Null => "NULL",
            Self::True => "TRUE",
            Self::False => "FALSE",
            Self::Int(_) => "INT",
            Self::Real(_) => "REAL",
            Self::Str(_) => "STR",
            Self::Regexp(_) => "REGEXP",
            Self::Placeholder => "PLACEHOLDER",
            Self::Pop => "POP",
            Self::Dup => "DUP",
            Self::Dup2 => "DUP2",
            Self::LoadLocal(_) => "LOAD_LOCAL",
            Self::StoreLocal(_) => "STORE_LOCAL",
            Self::LoadUpvalue(_) => "LOAD_UPVALUE",
            Self::StoreUpvalue(_) => "STORE_UPVALUE",
            Self::CloseUpvalues(_) => "CLOSE_UPVALUES",
            Self::LoadSession(_) => "LOAD_SESSION",
            Self::StoreSession(_) => "STORE_SESSION",
            Self::LoadGlobal(_) => "LOAD_GLOBAL",
            Self::StoreGlobal(_) => "STORE_GLOBAL",
            Self::LoadName(_) => "LOAD_NAME",
            Self::LoadDynamic(_) => "LOAD_DYNAMIC",
            Self::StoreDynamic(_) => "STORE_DYNAMIC",
            Self::LoadExtern(_) => "LOAD_EXTERN",
            Self::LoadIntrinsic(_) => "LOAD_INTRINSIC",
            Self::LoadContext => "LOAD_CONTEXT",
            Self::Add => "ADD",
            Self::Sub => "SUB",
            Self::Mul => "MUL",
            Self::Div => "DIV",
            Self::Mod => "MOD",
            Self::Pow => "POW",
            Self::Neg => "NEG",
            Self::Positive => "POSITIVE",
            Self::Not => "NOT",
            Self::Eq => "EQ",
            Self::Ne => "NE",
            Self::Lt => "LT",
            Self::Le => "LE",
            Self::Gt => "GT",
            Self::Ge => "GE",
            Self::RegexMatch => "REGEX_MATCH",
            Self::RegexNotMatch => "REGEX_NOT_MATCH",
            Self::Jump(_) => "JUMP",
            Self::JumpIfFalse(_) => "JUMP_IF_FALSE",
            Self::OrJump(_) => "OR_JUMP",
            Self::AndJump(_) => "AND_JUMP",
            Self::EventIs(_) => "EVENT_IS",
            Self::Match => "MATCH",
            Self::PushHandler(_) => "PUSH_HANDLER",
            Self::PopHandler => "POP_HANDLER",
            Self::Return => "RETURN",
            Self::NewList(_) => "NEW_LIST",
            Self::NewMap(_) => "NEW_MAP",
            Self::NewPair => "NEW_PAIR",
            Self::Concat(_) => "CONCAT",
            Self::Closure(_) => "CLOSURE",
            Self::Template(_) => "TEMPLATE",
            Self::DotGet(_) => "DOT_GET",
            Self::DotSet(_) => "DOT_SET",
            Self::IndexGet => "INDEX_GET",
            Self::IndexSet => "INDEX_SET",
            Self::Call(_) => "CALL",
            Self::CallName { .. } => "CALL_NAME",
            Self::CallMethod { .. } => "CALL_METHOD",
            Self::Action(_) => "ACTION",
            Self::PushConfig(_) => "PUSH_CONFIG",
            Self::PopConfig => "POP_CONFIG",
            Self::ConfigProperty(_) => "CONFIG_PROPERTY",
            Self::SetAttr(_) => "SET_ATTR",
            Self::IterInit => "ITER_INIT",
            Self::IterNext { .. } => "ITER_NEXT",
            Self::Yield { .. } => "YIELD",
        }
    }

    /// The store instruction that writes back to what this load read
    ///
    /// Assignment compiles its target as an ordinary read and then swaps the
    /// final read for its store form; `None` means the read is not assignable.
    #[must_use]
    pub const fn store_form(&self) -> Option<OpCode> {
        match *self {
            Self::LoadLocal(slot) => Some(Self::StoreLocal(slot)),
            Self::LoadUpvalue(index) => Some(Self::StoreUpvalue(index)),
            Self::LoadSession(slot) => Some(Self::StoreSession(slot)),
            Self::LoadGlobal(slot) => Some(Self::StoreGlobal(slot)),
            Self::LoadName(name) | Self::LoadDynamic(name) => Some(Self::StoreDynamic(name)),
            Self::DotGet(name) => Some(Self::DotSet(name)),
            Self::IndexGet => Some(Self::IndexSet),
            _ => None,
        }
    }

    /// Relative jump offset carried by this instruction, if any
    #[must_use]
    pub const fn jump_offset(&self) -> Option<i32> {
        match *self {
            Self::Jump(offset)
            | Self::JumpIfFalse(offset)
            | Self::OrJump(offset)
            | Self::AndJump(offset)
            | Self::PushHandler(offset)
            | Self::IterNext { exit: offset, .. } => Some(offset),
            _ => None,
        }
    }

    /// Copy of this instruction with its jump offset replaced
    #[must_use]
    pub const fn with_jump_offset(self, offset: i32) -> Self {
        match self {
            Self::Jump(_) => Self::Jump(offset),
            Self::JumpIfFalse(_) => Self::JumpIfFalse(offset),
            Self::OrJump(_) => Self::OrJump(offset),
            Self::AndJump(_) => Self::AndJump(offset),
            Self::PushHandler(_) => Self::PushHandler(offset),
            Self::IterNext { pair, .. } => Self::IterNext { exit: offset, pair },
            other => other,
        }
    }
}

impl fmt::Display for OpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_forms() {
        assert_eq!(OpCode::LoadLocal(3).store_form(), Some(OpCode::StoreLocal(3)));
        assert_eq!(OpCode::DotGet(1).store_form(), Some(OpCode::DotSet(1)));
        assert_eq!(OpCode::IndexGet.store_form(), Some(OpCode::IndexSet));
        assert_eq!(OpCode::LoadName(2).store_form(), Some(OpCode::StoreDynamic(2)));
        assert_eq!(OpCode::LoadContext.store_form(), None);
        assert_eq!(OpCode::Call(0).store_form(), None);
    }

    #[test]
    fn jump_offsets_patch() {
        let op = OpCode::IterNext { exit: 0, pair: true };
        assert_eq!(op.with_jump_offset(7), OpCode::IterNext { exit: 7, pair: true });
        assert_eq!(OpCode::Jump(-4).jump_offset(), Some(-4));
        assert_eq!(OpCode::Add.with_jump_offset(3), OpCode::Add);
    }
}
