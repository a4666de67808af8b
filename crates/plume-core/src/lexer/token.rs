//! Token types for the Plume lexer

use logos::Logos;

/// The kind of token produced by the lexer
///
/// Literal strings, regex literals and the qualified-name kinds are not
/// matched by logos; the lexer produces them from its own scanning routines.
#[derive(Logos, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[logos(skip r"[ \t\r\n\f]+")]
#[logos(skip r"//[^\n]*")]
#[logos(skip r"#[^\n]*")]
#[logos(skip r"/\*([^*]|\*+[^*/])*\*+/")]
pub enum TokenKind {
    // ========== Keywords ==========
    #[token("let")]
    Let,
    #[token("fn")]
    Fn,
    #[token("iter")]
    Iter,
    #[token("if")]
    If,
    #[token("elif")]
    Elif,
    #[token("else")]
    Else,
    #[token("for")]
    For,
    #[token("in")]
    In,
    #[token("while")]
    While,
    #[token("break")]
    Break,
    #[token("continue")]
    Continue,
    #[token("return")]
    Return,
    #[token("yield")]
    Yield,
    #[token("try")]
    Try,
    #[token("when")]
    When,
    #[token("global")]
    Global,
    #[token("session")]
    Session,
    #[token("config")]
    Config,
    #[token("template")]
    Template,
    #[token("true")]
    True,
    #[token("false")]
    False,
    #[token("null")]
    Null,

    // ========== Literals ==========
    /// Decimal integer literal
    #[regex(r"[0-9]+")]
    Int,

    /// Hexadecimal integer literal
    #[regex(r"0[xX][0-9a-fA-F]+")]
    HexInt,

    /// Real literal; an exponent must carry an explicit sign
    #[regex(r"[0-9]+\.[0-9]+([eE][+-][0-9]+)?")]
    #[regex(r"[0-9]+[eE][+-][0-9]+")]
    Real,

    /// String literal (quoted or back-tick); produced by the string scanner
    Str,

    /// Regex literal `r"..."`; produced by the string scanner
    Regex,

    // ========== Identifiers ==========
    #[regex(r"[a-zA-Z_][a-zA-Z0-9_]*")]
    Ident,

    /// `session::name`
    SessionName,
    /// `global::name`
    GlobalName,
    /// `dynamic::name`
    DynamicName,
    /// `extern::name`
    ExternName,

    // ========== Operators ==========
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("**")]
    StarStar,
    #[token("/")]
    Slash,
    #[token("%")]
    Percent,

    #[token("=")]
    Assign,
    #[token("+=")]
    PlusAssign,
    #[token("-=")]
    MinusAssign,
    #[token("*=")]
    StarAssign,
    #[token("/=")]
    SlashAssign,
    #[token("%=")]
    PercentAssign,

    #[token("==")]
    EqEq,
    #[token("!=")]
    NotEq,
    #[token("<")]
    Lt,
    #[token("<=")]
    LtEq,
    #[token(">")]
    Gt,
    #[token(">=")]
    GtEq,
    #[token("=~")]
    Match,
    #[token("!~")]
    NotMatch,

    #[token("&&")]
    And,
    #[token("||")]
    Or,
    #[token("!")]
    Not,

    #[token("?")]
    Question,
    #[token("=>")]
    FatArrow,
    #[token("$")]
    Dollar,
    #[token("@")]
    At,

    // ========== Delimiters ==========
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token(",")]
    Comma,
    #[token("::")]
    ColonColon,
    #[token(":")]
    Colon,
    #[token(";")]
    Semicolon,
    #[token(".")]
    Dot,

    /// An opened but never closed block comment
    #[regex(r"/\*([^*]|\*+[^*/])*\**", priority = 0)]
    UnterminatedComment,

    // ========== Special ==========
    /// End of input
    Eof,

    /// Malformed input; the token text carries the rendered diagnostic
    Error,
}

impl TokenKind {
    /// Returns true for the four qualified-name kinds
    #[must_use]
    pub const fn is_qualified_name(self) -> bool {
        matches!(
            self,
            Self::SessionName | Self::GlobalName | Self::DynamicName | Self::ExternName
        )
    }

    /// Returns true for compound assignment operators (`+=` and friends)
    #[must_use]
    pub const fn is_compound_assign(self) -> bool {
        matches!(
            self,
            Self::PlusAssign
                | Self::MinusAssign
                | Self::StarAssign
                | Self::SlashAssign
                | Self::PercentAssign
        )
    }
}

impl std::fmt::Display for TokenKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Self::Let => "let",
            Self::Fn => "fn",
            Self::Iter => "iter",
            Self::If => "if",
            Self::Elif => "elif",
            Self::Else => "else",
            Self::For => "for",
            Self::In => "in",
            Self::While => "while",
            Self::Break => "break",
            Self::Continue => "continue",
            Self::Return => "return",
            Self::Yield => "yield",
            Self::Try => "try",
            Self::When => "when",
            Self::Global => "global",
            Self::Session => "session",
            Self::Config => "config",
            Self::Template => "template",
            Self::True => "true",
            Self::False => "false",
            Self::Null => "null",
            Self::Int | Self::HexInt => "integer",
            Self::Real => "real",
            Self::Str => "string",
            Self::Regex => "regex",
            Self::Ident => "identifier",
            Self::SessionName => "session variable",
            Self::GlobalName => "global variable",
            Self::DynamicName => "dynamic variable",
            Self::ExternName => "extern name",
            Self::Plus => "+",
            Self::Minus => "-",
            Self::Star => "*",
            Self::StarStar => "**",
            Self::Slash => "/",
            Self::Percent => "%",
            Self::Assign => "=",
            Self::PlusAssign => "+=",
            Self::MinusAssign => "-=",
            Self::StarAssign => "*=",
            Self::SlashAssign => "/=",
            Self::PercentAssign => "%=",
            Self::EqEq => "==",
            Self::NotEq => "!=",
            Self::Lt => "<",
            Self::LtEq => "<=",
            Self::Gt => ">",
            Self::GtEq => ">=",
            Self::Match => "=~",
            Self::NotMatch => "!~",
            Self::And => "&&",
            Self::Or => "||",
            Self::Not => "!",
            Self::Question => "?",
            Self::FatArrow => "=>",
            Self::Dollar => "$",
            Self::At => "@",
            Self::LParen => "(",
            Self::RParen => ")",
            Self::LBrace => "{",
            Self::RBrace => "}",
            Self::LBracket => "[",
            Self::RBracket => "]",
            Self::Comma => ",",
            Self::ColonColon => "::",
            Self::Colon => ":",
            Self::Semicolon => ";",
            Self::Dot => ".",
            Self::UnterminatedComment => "/*",
            Self::Eof => "end of file",
            Self::Error => "error",
        };
        f.write_str(text)
    }
}
