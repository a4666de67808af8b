//! Lexer for the Plume policy language
//!
//! The lexer converts source code into a stream of tokens, handling:
//! - Keywords, identifiers and operators (via logos)
//! - Integer and real literals
//! - Quoted, back-tick and heredoc string literals, and `r"..."` regex literals
//! - Qualified names (`session::x`, `global::x`, `dynamic::x`, `extern::x`)
//! - Line/column tracking and bounded diagnostic windows
//!
//! Malformed input never panics: it produces a [`TokenKind::Error`] token
//! whose text is the rendered diagnostic.

mod span;
mod token;

pub use span::{render_snippet, LineIndex, Location, Span};
pub use token::TokenKind;

use std::collections::VecDeque;
use std::sync::Arc;

use logos::Logos;
use thiserror::Error;

/// Number of recent token starts kept for diagnostic windows
const DCURSOR_WINDOW: usize = 8;

/// A token with its kind, span, location and text
///
/// For string literals `text` holds the unescaped contents, for regex
/// literals the pattern, for qualified names the bare name, and for
/// [`TokenKind::Error`] the rendered diagnostic.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    /// The kind of token
    pub kind: TokenKind,
    /// The byte range in the source
    pub span: Span,
    /// Line and column of the first character
    pub location: Location,
    /// Token text (see type docs)
    pub text: String,
}

impl Token {
    fn new(kind: TokenKind, span: Span, location: Location, text: impl Into<String>) -> Self {
        Self {
            kind,
            span,
            location,
            text: text.into(),
        }
    }
}

/// Lexical error kinds, rendered into error tokens
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LexError {
    #[error("unexpected character '{0}'")]
    UnexpectedChar(char),
    #[error("unterminated string literal")]
    UnterminatedString,
    #[error("unterminated block comment")]
    UnterminatedComment,
    #[error("invalid escape sequence: \\{0}")]
    InvalidEscape(char),
    #[error("heredoc marker '{0}' is never closed")]
    UnterminatedHeredoc(String),
    #[error("heredoc marker must be an identifier")]
    InvalidHeredocMarker,
}

/// Saved cursor used to backtrack after a failed lookahead
#[derive(Clone, Copy)]
struct Cursor {
    position: usize,
    line: u32,
    column: u32,
}

/// The Plume lexer
#[derive(Debug, Clone)]
pub struct Lexer {
    source: Arc<str>,
    /// Current byte offset
    position: usize,
    /// Line of `position` (1-indexed)
    line: u32,
    /// Column of `position` (1-indexed, characters)
    column: u32,
    /// Ring of recent token-start offsets, used only for diagnostics
    dcursor: VecDeque<usize>,
}

impl Lexer {
    /// Create a new lexer for the given source code
    #[must_use]
    pub fn new(source: impl Into<Arc<str>>) -> Self {
        Self {
            source: source.into(),
            position: 0,
            line: 1,
            column: 1,
            dcursor: VecDeque::with_capacity(DCURSOR_WINDOW),
        }
    }

    /// The source being lexed
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Current line/column of the cursor
    #[must_use]
    pub fn location(&self) -> Location {
        Location::new(self.line, self.column)
    }

    /// Tokenize the entire source; the final token is always `Eof`
    #[must_use]
    pub fn tokenize(source: &str) -> Vec<Token> {
        let mut lexer = Lexer::new(source);
        let mut tokens = Vec::new();
        loop {
            let token = lexer.next_token();
            let done = token.kind == TokenKind::Eof;
            tokens.push(token);
            if done {
                break;
            }
        }
        tokens
    }

    /// Render a diagnostic for `offset`, using the recent-token window
    #[must_use]
    pub fn render(&self, offset: usize, message: &str) -> String {
        let index = LineIndex::new(&self.source);
        let at = index.location(&self.source, offset.min(self.source.len()) as u32);
        let window_start = self.dcursor.front().copied().unwrap_or(offset);
        format!(
            "{}: {}\n{}",
            at,
            message,
            render_snippet(&self.source, window_start, offset)
        )
    }

    /// Advance and return the next token; returns `Eof` forever at the end
    pub fn next_token(&mut self) -> Token {
        let token = self.scan();
        if self.dcursor.len() == DCURSOR_WINDOW {
            self.dcursor.pop_front();
        }
        self.dcursor.push_back(token.span.start as usize);
        token
    }

    fn save(&self) -> Cursor {
        Cursor {
            position: self.position,
            line: self.line,
            column: self.column,
        }
    }

    fn restore(&mut self, cursor: Cursor) {
        self.position = cursor.position;
        self.line = cursor.line;
        self.column = cursor.column;
    }

    /// Move the cursor forward to `target`, keeping line/column in sync
    fn advance_to(&mut self, target: usize) {
        let target = target.min(self.source.len());
        for c in self.source[self.position..target].chars() {
            if c == '\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
        }
        self.position = target;
    }

    fn error_token(&mut self, start: usize, end: usize, location: Location, error: &LexError) -> Token {
        let text = self.render(start, &error.to_string());
        self.advance_to(end);
        Token::new(TokenKind::Error, Span::new(start as u32, end as u32), location, text)
    }

    /// Run logos once from the cursor; returns the kind and absolute range
    fn lex_raw(&mut self) -> Option<(Result<TokenKind, ()>, usize, usize)> {
        let source = Arc::clone(&self.source);
        let remaining = &source[self.position..];
        let mut lexer = TokenKind::lexer(remaining);
        let kind = lexer.next()?;
        let range = lexer.span();
        Some((kind, self.position + range.start, self.position + range.end))
    }

    fn scan(&mut self) -> Token {
        let Some((kind, start, end)) = self.lex_raw() else {
            self.advance_to(self.source.len());
            let at = self.source.len() as u32;
            return Token::new(TokenKind::Eof, Span::new(at, at), self.location(), "");
        };
        self.advance_to(start);
        let location = self.location();

        match kind {
            Err(()) => {
                let c = self.source[start..].chars().next().unwrap_or('\0');
                match c {
                    '"' | '\'' => self.scan_quoted(start, location),
                    '`' => self.scan_backtick(start, location),
                    _ => self.error_token(start, start + c.len_utf8(), location, &LexError::UnexpectedChar(c)),
                }
            }
            Ok(TokenKind::UnterminatedComment) => {
                self.error_token(start, end, location, &LexError::UnterminatedComment)
            }
            Ok(TokenKind::Ident)
                if matches!(&self.source[start..end], "r" | "R")
                    && matches!(self.source[end..].chars().next(), Some('"' | '\'')) =>
            {
                self.scan_regex(start, end, location)
            }
            Ok(kind @ (TokenKind::Ident | TokenKind::Session | TokenKind::Global)) => {
                let lexeme = self.source[start..end].to_string();
                self.advance_to(end);
                let qualified = match lexeme.as_str() {
                    "session" => Some(TokenKind::SessionName),
                    "global" => Some(TokenKind::GlobalName),
                    "dynamic" => Some(TokenKind::DynamicName),
                    "extern" => Some(TokenKind::ExternName),
                    _ => None,
                };
                if let Some(qualified) = qualified {
                    if let Some(token) = self.qualified_name(qualified, start, location) {
                        return token;
                    }
                }
                Token::new(kind, Span::new(start as u32, end as u32), location, lexeme)
            }
            Ok(kind) => {
                let lexeme = self.source[start..end].to_string();
                self.advance_to(end);
                Token::new(kind, Span::new(start as u32, end as u32), location, lexeme)
            }
        }
    }

    /// Two-token lookahead for `prefix :: name`; backtracks on mismatch
    fn qualified_name(&mut self, kind: TokenKind, start: usize, location: Location) -> Option<Token> {
        let saved = self.save();
        let matched = match self.lex_raw() {
            Some((Ok(TokenKind::ColonColon), _, colon_end)) => {
                self.advance_to(colon_end);
                match self.lex_raw() {
                    Some((Ok(TokenKind::Ident), name_start, name_end)) => Some((name_start, name_end)),
                    _ => None,
                }
            }
            _ => None,
        };
        match matched {
            Some((name_start, name_end)) => {
                let name = self.source[name_start..name_end].to_string();
                self.advance_to(name_end);
                Some(Token::new(kind, Span::new(start as u32, name_end as u32), location, name))
            }
            None => {
                self.restore(saved);
                None
            }
        }
    }

    /// Scan a single- or double-quoted string starting at the quote
    fn scan_quoted(&mut self, start: usize, location: Location) -> Token {
        let source = Arc::clone(&self.source);
        let mut chars = source[start..].char_indices();
        let (_, quote) = chars.next().unwrap_or((0, '"'));
        let mut content = String::new();

        while let Some((offset, c)) = chars.next() {
            let at = start + offset;
            match c {
                c if c == quote => {
                    let end = at + 1;
                    self.advance_to(end);
                    return Token::new(TokenKind::Str, Span::new(start as u32, end as u32), location, content);
                }
                '\n' => break,
                '\\' => {
                    let Some((_, escaped)) = chars.next() else { break };
                    let cooked = match escaped {
                        '\\' => '\\',
                        '\'' => '\'',
                        '"' => '"',
                        't' => '\t',
                        'r' => '\r',
                        'n' => '\n',
                        'b' => '\u{8}',
                        'v' => '\u{b}',
                        other => {
                            return self.error_token(
                                at,
                                at + 1 + other.len_utf8(),
                                location,
                                &LexError::InvalidEscape(other),
                            );
                        }
                    };
                    content.push(cooked);
                }
                c => content.push(c),
            }
        }

        let end = source[start..].find('\n').map_or(source.len(), |n| start + n);
        self.error_token(start, end, location, &LexError::UnterminatedString)
    }

    /// Scan a back-tick string, optionally with a `<<MARK` heredoc marker
    fn scan_backtick(&mut self, start: usize, location: Location) -> Token {
        let source = Arc::clone(&self.source);
        let body_start = start + 1;
        let rest = &source[body_start..];

        if let Some(header) = rest.strip_prefix("<<") {
            let line_end = header.find('\n').unwrap_or(header.len());
            let marker = header[..line_end].trim();
            let valid = marker
                .chars()
                .next()
                .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
                && marker.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
            if !valid {
                return self.error_token(start, body_start + 2 + line_end, location, &LexError::InvalidHeredocMarker);
            }
            let text_start = body_start + 2 + line_end + 1;
            let terminator = format!("{marker}`");
            let Some(found) = source.get(text_start..).and_then(|s| s.find(&terminator)) else {
                return self.error_token(
                    start,
                    source.len(),
                    location,
                    &LexError::UnterminatedHeredoc(marker.to_string()),
                );
            };
            let mut body = &source[text_start..text_start + found];
            if let Some(trimmed) = body.strip_suffix('\n') {
                body = trimmed.strip_suffix('\r').unwrap_or(trimmed);
            }
            let end = text_start + found + terminator.len();
            let body = body.to_string();
            self.advance_to(end);
            return Token::new(TokenKind::Str, Span::new(start as u32, end as u32), location, body);
        }

        match rest.find('`') {
            Some(found) => {
                let end = body_start + found + 1;
                let body = rest[..found].to_string();
                self.advance_to(end);
                Token::new(TokenKind::Str, Span::new(start as u32, end as u32), location, body)
            }
            None => self.error_token(start, source.len(), location, &LexError::UnterminatedString),
        }
    }

    /// Scan `r"..."`; backslashes are kept except before the quote character
    fn scan_regex(&mut self, start: usize, quote_at: usize, location: Location) -> Token {
        let source = Arc::clone(&self.source);
        let mut chars = source[quote_at..].char_indices();
        let (_, quote) = chars.next().unwrap_or((0, '"'));
        let mut pattern = String::new();

        while let Some((offset, c)) = chars.next() {
            match c {
                c if c == quote => {
                    let end = quote_at + offset + 1;
                    self.advance_to(end);
                    return Token::new(TokenKind::Regex, Span::new(start as u32, end as u32), location, pattern);
                }
                '\n' => break,
                '\\' => match chars.next() {
                    Some((_, escaped)) if escaped == quote => pattern.push(quote),
                    Some((_, escaped)) => {
                        pattern.push('\\');
                        pattern.push(escaped);
                    }
                    None => break,
                },
                c => pattern.push(c),
            }
        }

        let end = source[start..].find('\n').map_or(source.len(), |n| start + n);
        self.error_token(start, end, location, &LexError::UnterminatedString)
    }
}

impl Iterator for Lexer {
    type Item = Token;

    fn next(&mut self) -> Option<Self::Item> {
        let token = self.next_token();
        if token.kind == TokenKind::Eof {
            None
        } else {
            Some(token)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex_kinds(source: &str) -> Vec<TokenKind> {
        Lexer::tokenize(source).into_iter().map(|t| t.kind).collect()
    }

    fn lex_texts(source: &str) -> Vec<String> {
        Lexer::tokenize(source).into_iter().map(|t| t.text).collect()
    }

    #[test]
    fn lex_keywords() {
        assert_eq!(
            lex_kinds("let fn iter if elif else try when"),
            vec![
                TokenKind::Let,
                TokenKind::Fn,
                TokenKind::Iter,
                TokenKind::If,
                TokenKind::Elif,
                TokenKind::Else,
                TokenKind::Try,
                TokenKind::When,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn lex_numbers() {
        assert_eq!(
            lex_kinds("42 0x1F 3.14 1.5e+3 2E-2"),
            vec![
                TokenKind::Int,
                TokenKind::HexInt,
                TokenKind::Real,
                TokenKind::Real,
                TokenKind::Real,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn exponent_requires_sign() {
        assert_eq!(
            lex_kinds("1e5"),
            vec![TokenKind::Int, TokenKind::Ident, TokenKind::Eof]
        );
    }

    #[test]
    fn lex_operators() {
        assert_eq!(
            lex_kinds("+ += ** == =~ !~ => :: $ @"),
            vec![
                TokenKind::Plus,
                TokenKind::PlusAssign,
                TokenKind::StarStar,
                TokenKind::EqEq,
                TokenKind::Match,
                TokenKind::NotMatch,
                TokenKind::FatArrow,
                TokenKind::ColonColon,
                TokenKind::Dollar,
                TokenKind::At,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn lex_comments() {
        assert_eq!(
            lex_kinds("a // line\n# hash\n/* block\n */ b"),
            vec![TokenKind::Ident, TokenKind::Ident, TokenKind::Eof]
        );
    }

    #[test]
    fn lex_string_escapes() {
        let tokens = Lexer::tokenize(r#""a\tb\n\"c\"" 'it\'s'"#);
        assert_eq!(tokens[0].kind, TokenKind::Str);
        assert_eq!(tokens[0].text, "a\tb\n\"c\"");
        assert_eq!(tokens[1].text, "it's");
    }

    #[test]
    fn invalid_escape_is_error_token() {
        let tokens = Lexer::tokenize(r#""a\qb""#);
        assert_eq!(tokens[0].kind, TokenKind::Error);
        assert!(tokens[0].text.contains("invalid escape sequence: \\q"));
    }

    #[test]
    fn unterminated_string_is_error_token() {
        let tokens = Lexer::tokenize("x = \"abc\ny");
        assert_eq!(tokens[2].kind, TokenKind::Error);
        assert!(tokens[2].text.starts_with("1:5: unterminated string literal"));
    }

    #[test]
    fn lex_backtick_and_heredoc() {
        let tokens = Lexer::tokenize("`a\nb` `<<END\nline `x`\nEND` z");
        assert_eq!(tokens[0].text, "a\nb");
        assert_eq!(tokens[1].kind, TokenKind::Str);
        assert_eq!(tokens[1].text, "line `x`");
        assert_eq!(tokens[2].text, "z");
    }

    #[test]
    fn lex_regex_literal() {
        let tokens = Lexer::tokenize(r#"r"\d+\"" R'a.b' r"#);
        assert_eq!(tokens[0].kind, TokenKind::Regex);
        assert_eq!(tokens[0].text, r#"\d+""#);
        assert_eq!(tokens[1].kind, TokenKind::Regex);
        assert_eq!(tokens[2].kind, TokenKind::Ident);
    }

    #[test]
    fn lex_qualified_names() {
        let tokens = Lexer::tokenize("session::a global :: b dynamic::c extern::d str::upper");
        assert_eq!(tokens[0].kind, TokenKind::SessionName);
        assert_eq!(tokens[0].text, "a");
        assert_eq!(tokens[1].kind, TokenKind::GlobalName);
        assert_eq!(tokens[1].text, "b");
        assert_eq!(tokens[2].kind, TokenKind::DynamicName);
        assert_eq!(tokens[3].kind, TokenKind::ExternName);
        assert_eq!(tokens[4].kind, TokenKind::Ident);
        assert_eq!(tokens[5].kind, TokenKind::ColonColon);
    }

    #[test]
    fn qualified_lookahead_backtracks() {
        assert_eq!(
            lex_kinds("session { } global 1"),
            vec![
                TokenKind::Session,
                TokenKind::LBrace,
                TokenKind::RBrace,
                TokenKind::Global,
                TokenKind::Int,
                TokenKind::Eof,
            ]
        );
        assert_eq!(lex_texts("dynamic :: 3")[0], "dynamic");
    }

    #[test]
    fn locations_track_lines() {
        let tokens = Lexer::tokenize("a\n  bb\n`x\ny` c");
        assert_eq!(tokens[0].location, Location::new(1, 1));
        assert_eq!(tokens[1].location, Location::new(2, 3));
        assert_eq!(tokens[2].location, Location::new(3, 1));
        assert_eq!(tokens[3].location, Location::new(4, 4));
    }

    #[test]
    fn unexpected_char_renders_snippet() {
        let tokens = Lexer::tokenize("let a = 1;\nlet b = ~;");
        let error = tokens.iter().find(|t| t.kind == TokenKind::Error).unwrap();
        assert_eq!(
            error.text,
            "2:9: unexpected character '~'\n 1 | let a = 1;\n 2 | let b = ~;\n   |         ^"
        );
    }

    #[test]
    fn unterminated_comment() {
        let tokens = Lexer::tokenize("a /* never");
        assert_eq!(tokens[1].kind, TokenKind::Error);
        assert!(tokens[1].text.contains("unterminated block comment"));
    }

    #[test]
    fn dcursor_window_is_bounded() {
        let mut lexer = Lexer::new("a b c d e f g h i j k l m");
        while lexer.next_token().kind != TokenKind::Eof {}
        assert_eq!(lexer.dcursor.len(), DCURSOR_WINDOW);
    }
}
