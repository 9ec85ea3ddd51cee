use super::ParsingError;
use crate::{Primitive, Span};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    Number,
    Str,
    Bool,
    Identifier,
    Primitive,

    Let,
    LetMut,
    If,
    Else,
    Do,
    Return,
    Take,
    Fn,
    Defer,
    Fire,
    Loop,
    LoopOver,
    As,
    Break,
    Continue,
    Pub,
    Impl,
    Struct,
    Interface,
    Exposing,
    /// A whole `$C++( ... )` blob; the token text is the embedded code
    NativeCode,

    Relational,
    Equality,
    LogicalAnd,
    LogicalOr,
    LogicalMisc,
    Additive,
    Multiplicative,
    SimpleAssign,
    ComplexAssign,

    BraceOpen,
    BraceClose,
    ParenOpen,
    ParenClose,
    BracketOpen,
    BracketClose,
    Dot,
    Comma,
    Semicolon,
    Arrow,
}

impl TokenKind {
    /// Human readable name for error messages
    pub fn describe(&self) -> &'static str {
        match self {
            Self::Number => "a number",
            Self::Str => "a string",
            Self::Bool => "a boolean",
            Self::Identifier => "an identifier",
            Self::Primitive => "a primitive type",
            Self::Let => "'let'",
            Self::LetMut => "'let mut'",
            Self::If => "'if'",
            Self::Else => "'else'",
            Self::Do => "'do'",
            Self::Return => "'return'",
            Self::Take => "'take'",
            Self::Fn => "'fn'",
            Self::Defer => "'defer'",
            Self::Fire => "'fire'",
            Self::Loop => "'loop'",
            Self::LoopOver => "'loop over'",
            Self::As => "'as'",
            Self::Break => "'break'",
            Self::Continue => "'continue'",
            Self::Pub => "'pub'",
            Self::Impl => "'impl'",
            Self::Struct => "'type struct'",
            Self::Interface => "'type interface'",
            Self::Exposing => "'exposing'",
            Self::NativeCode => "a '$C++(...)' block",
            Self::Relational => "a relational operator",
            Self::Equality => "an equality operator",
            Self::LogicalAnd => "'&&'",
            Self::LogicalOr => "'||'",
            Self::LogicalMisc => "a logical operator",
            Self::Additive => "'+' or '-'",
            Self::Multiplicative => "'*' or '/'",
            Self::SimpleAssign => "'='",
            Self::ComplexAssign => "a compound assignment operator",
            Self::BraceOpen => "'{'",
            Self::BraceClose => "'}'",
            Self::ParenOpen => "'('",
            Self::ParenClose => "')'",
            Self::BracketOpen => "'['",
            Self::BracketClose => "']'",
            Self::Dot => "'.'",
            Self::Comma => "','",
            Self::Semicolon => "';'",
            Self::Arrow => "'->'",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub span: Span,
}

/// Symbol spellings, longest first so that compound operators win
const SYMBOLS: &[(&str, TokenKind)] = &[
    ("!&&", TokenKind::LogicalMisc),
    ("!||", TokenKind::LogicalMisc),
    ("~&&", TokenKind::LogicalMisc),
    ("~||", TokenKind::LogicalMisc),
    ("<=", TokenKind::Relational),
    (">=", TokenKind::Relational),
    ("==", TokenKind::Equality),
    ("!=", TokenKind::Equality),
    ("&&", TokenKind::LogicalAnd),
    ("||", TokenKind::LogicalOr),
    ("->", TokenKind::Arrow),
    ("+=", TokenKind::ComplexAssign),
    ("-=", TokenKind::ComplexAssign),
    ("*=", TokenKind::ComplexAssign),
    ("/=", TokenKind::ComplexAssign),
    ("{", TokenKind::BraceOpen),
    ("}", TokenKind::BraceClose),
    ("(", TokenKind::ParenOpen),
    (")", TokenKind::ParenClose),
    ("[", TokenKind::BracketOpen),
    ("]", TokenKind::BracketClose),
    (".", TokenKind::Dot),
    (",", TokenKind::Comma),
    (";", TokenKind::Semicolon),
    ("=", TokenKind::SimpleAssign),
    ("<", TokenKind::Relational),
    (">", TokenKind::Relational),
    ("+", TokenKind::Additive),
    ("-", TokenKind::Additive),
    ("*", TokenKind::Multiplicative),
    ("/", TokenKind::Multiplicative),
];

/// An on-demand scanner over the source text.
///
/// Cloning a lexer yields an independent cursor; the parser relies on this
/// for fixed-distance lookahead without consuming input.
#[derive(Debug, Clone)]
pub struct Lexer<'src> {
    source: &'src str,
    cursor: usize,
}

impl<'src> Lexer<'src> {
    pub fn new(source: &'src str) -> Self {
        Self { source, cursor: 0 }
    }

    fn rest(&self) -> &'src str {
        &self.source[self.cursor..]
    }

    fn skip_trivia(&mut self) {
        loop {
            let rest = self.rest();
            let trimmed = rest.trim_start();
            if trimmed.len() != rest.len() {
                self.cursor += rest.len() - trimmed.len();
                continue;
            }
            if rest.starts_with("//") {
                match rest.find('\n') {
                    Some(end) => self.cursor += end + 1,
                    None => self.cursor = self.source.len(),
                }
                continue;
            }
            if rest.starts_with("/*") {
                match rest[2..].find("*/") {
                    Some(end) => self.cursor += end + 4,
                    None => self.cursor = self.source.len(),
                }
                continue;
            }
            break;
        }
    }

    /// Scan an identifier-shaped word; empty when the cursor is not at one
    fn scan_word(&mut self) -> &'src str {
        let start = self.cursor;
        let bytes = self.source.as_bytes();
        if self.cursor < bytes.len()
            && (bytes[self.cursor].is_ascii_alphabetic() || bytes[self.cursor] == b'_')
        {
            self.cursor += 1;
            while self.cursor < bytes.len()
                && (bytes[self.cursor].is_ascii_alphanumeric() || bytes[self.cursor] == b'_')
            {
                self.cursor += 1;
            }
        }
        &self.source[start..self.cursor]
    }

    fn peek_word(&self) -> Option<&'src str> {
        let mut probe = self.clone();
        probe.skip_trivia();
        let word = probe.scan_word();
        if word.is_empty() {
            None
        } else {
            Some(word)
        }
    }

    fn consume_word(&mut self) {
        self.skip_trivia();
        self.scan_word();
    }

    /// The next token, or `None` at the end of the input
    pub fn next_token(&mut self) -> Result<Option<Token>, ParsingError> {
        self.skip_trivia();
        let start = self.cursor;
        let rest = self.rest();
        let Some(first) = rest.chars().next() else {
            return Ok(None);
        };

        if first == '$' {
            return self.native_code(start).map(Some);
        }

        if first.is_ascii_alphabetic() || first == '_' {
            let word = self.scan_word();
            let kind = match word {
                "let" => {
                    if self.peek_word() == Some("mut") {
                        self.consume_word();
                        TokenKind::LetMut
                    } else {
                        TokenKind::Let
                    }
                }
                "loop" => {
                    if self.peek_word() == Some("over") {
                        self.consume_word();
                        TokenKind::LoopOver
                    } else {
                        TokenKind::Loop
                    }
                }
                "type" => match self.peek_word() {
                    Some("struct") => {
                        self.consume_word();
                        TokenKind::Struct
                    }
                    Some("interface") => {
                        self.consume_word();
                        TokenKind::Interface
                    }
                    _ => TokenKind::Identifier,
                },
                "if" => TokenKind::If,
                "else" => TokenKind::Else,
                "do" => TokenKind::Do,
                "return" => TokenKind::Return,
                "take" => TokenKind::Take,
                "fn" => TokenKind::Fn,
                "defer" => TokenKind::Defer,
                "fire" => TokenKind::Fire,
                "as" => TokenKind::As,
                "break" => TokenKind::Break,
                "continue" => TokenKind::Continue,
                "pub" => TokenKind::Pub,
                "impl" => TokenKind::Impl,
                "exposing" => TokenKind::Exposing,
                "true" | "false" => TokenKind::Bool,
                word if Primitive::from_name(word).is_some() => TokenKind::Primitive,
                _ => TokenKind::Identifier,
            };
            return Ok(Some(Token {
                kind,
                text: self.source[start..self.cursor].to_string(),
                span: Span::new(start, self.cursor),
            }));
        }

        if first.is_ascii_digit() {
            let bytes = self.source.as_bytes();
            while self.cursor < bytes.len() && bytes[self.cursor].is_ascii_digit() {
                self.cursor += 1;
            }
            if self.cursor + 1 < bytes.len()
                && bytes[self.cursor] == b'.'
                && bytes[self.cursor + 1].is_ascii_digit()
            {
                self.cursor += 1;
                while self.cursor < bytes.len() && bytes[self.cursor].is_ascii_digit() {
                    self.cursor += 1;
                }
            }
            return Ok(Some(Token {
                kind: TokenKind::Number,
                text: self.source[start..self.cursor].to_string(),
                span: Span::new(start, self.cursor),
            }));
        }

        if first == '"' || first == '\'' {
            return match rest[1..].find(first) {
                Some(end) => {
                    let content = rest[1..1 + end].to_string();
                    self.cursor += end + 2;
                    Ok(Some(Token {
                        kind: TokenKind::Str,
                        text: content,
                        span: Span::new(start, self.cursor),
                    }))
                }
                None => Err(ParsingError::Custom {
                    msg: String::from("Unterminated string literal"),
                    span: Span::single(start),
                }),
            };
        }

        for (symbol, kind) in SYMBOLS {
            if rest.starts_with(symbol) {
                self.cursor += symbol.len();
                return Ok(Some(Token {
                    kind: *kind,
                    text: (*symbol).to_string(),
                    span: Span::new(start, self.cursor),
                }));
            }
        }

        Err(ParsingError::UnrecognizedInput {
            snippet: rest.chars().take(5).collect(),
            span: Span::single(start),
        })
    }

    /// Scan a `$C++( ... )` blob. The embedded code becomes the token text
    /// and the cursor stops right before the `exposing` keyword, which the
    /// parser consumes as an ordinary token.
    fn native_code(&mut self, start: usize) -> Result<Token, ParsingError> {
        let rest = self.rest();
        let Some(after_marker) = rest.strip_prefix("$C++") else {
            return Err(ParsingError::UnrecognizedInput {
                snippet: rest.chars().take(5).collect(),
                span: Span::single(start),
            });
        };

        let leading = after_marker.len() - after_marker.trim_start().len();
        if !after_marker.trim_start().starts_with('(') {
            return Err(ParsingError::Custom {
                msg: String::from("Expected '(' after '$C++'"),
                span: Span::single(start),
            });
        }

        // find the matching close by tracking nesting depth
        let open = 4 + leading;
        let mut depth = 0usize;
        let mut close = None;
        for (offset, ch) in rest[open..].char_indices() {
            match ch {
                '(' => depth += 1,
                ')' => {
                    depth -= 1;
                    if depth == 0 {
                        close = Some(open + offset);
                        break;
                    }
                }
                _ => {}
            }
        }
        let Some(close) = close else {
            return Err(ParsingError::Custom {
                msg: String::from("Unterminated '$C++(' block"),
                span: Span::single(start),
            });
        };

        let code = rest[open + 1..close].to_string();
        let after_close = &rest[close + 1..];
        let gap = after_close.len() - after_close.trim_start().len();
        if !after_close.trim_start().starts_with("exposing") {
            return Err(ParsingError::Custom {
                msg: String::from("Expected 'exposing' after a '$C++(...)' block"),
                span: Span::single(start + close),
            });
        }

        self.cursor = start + close + 1 + gap;
        Ok(Token {
            kind: TokenKind::NativeCode,
            text: code,
            span: Span::new(start, start + close + 1),
        })
    }
}
