use std::{iter::Peekable, str::CharIndices};

use crate::diagnostics::SourceSpan;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyword {
    If,
    Else,
    While,
    For,
    Foreach,
    Do,
    In,
    Switch,
    Case,
    Default,
    Break,
    Continue,
    Return,
    Int,
    Long,
    Short,
    Byte,
    Double,
    Float,
    Decimal,
    String,
    Bool,
    Char,
    Object,
    Void,
    Var,
    Public,
    Private,
    Protected,
    Internal,
    Static,
    Const,
    Readonly,
    Using,
    Namespace,
    Class,
    Struct,
    New,
    True,
    False,
    Null,
}

impl Keyword {
    pub fn from_word(word: &str) -> Option<Self> {
        use self::Keyword as Kw;
        let keyword = match word {
            "if" => Kw::If,
            "else" => Kw::Else,
            "while" => Kw::While,
            "for" => Kw::For,
            "foreach" => Kw::Foreach,
            "do" => Kw::Do,
            "in" => Kw::In,
            "switch" => Kw::Switch,
            "case" => Kw::Case,
            "default" => Kw::Default,
            "break" => Kw::Break,
            "continue" => Kw::Continue,
            "return" => Kw::Return,
            "int" => Kw::Int,
            "long" => Kw::Long,
            "short" => Kw::Short,
            "byte" => Kw::Byte,
            "double" => Kw::Double,
            "float" => Kw::Float,
            "decimal" => Kw::Decimal,
            "string" => Kw::String,
            "bool" => Kw::Bool,
            "char" => Kw::Char,
            "object" => Kw::Object,
            "void" => Kw::Void,
            "var" => Kw::Var,
            "public" => Kw::Public,
            "private" => Kw::Private,
            "protected" => Kw::Protected,
            "internal" => Kw::Internal,
            "static" => Kw::Static,
            "const" => Kw::Const,
            "readonly" => Kw::Readonly,
            "using" => Kw::Using,
            "namespace" => Kw::Namespace,
            "class" => Kw::Class,
            "struct" => Kw::Struct,
            "new" => Kw::New,
            "true" => Kw::True,
            "false" => Kw::False,
            "null" => Kw::Null,
            _ => return None,
        };
        Some(keyword)
    }

    /// Built-in type names, including `var` and `void`.
    pub fn is_type(self) -> bool {
        use self::Keyword as Kw;
        matches!(
            self,
            Kw::Int
                | Kw::Long
                | Kw::Short
                | Kw::Byte
                | Kw::Double
                | Kw::Float
                | Kw::Decimal
                | Kw::String
                | Kw::Bool
                | Kw::Char
                | Kw::Object
                | Kw::Void
                | Kw::Var
        )
    }

    pub fn is_access_modifier(self) -> bool {
        matches!(
            self,
            Keyword::Public | Keyword::Private | Keyword::Protected | Keyword::Internal
        )
    }

    pub fn is_modifier(self) -> bool {
        self.is_access_modifier() || matches!(self, Keyword::Static | Keyword::Readonly)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Assign,
    Less,
    Greater,
    Bang,
    Ampersand,
    Pipe,
    Caret,
    Tilde,
    Question,
    Colon,
    Dot,
    EqualEqual,
    BangEqual,
    LessEqual,
    GreaterEqual,
    AndAnd,
    OrOr,
    PlusPlus,
    MinusMinus,
    PlusAssign,
    MinusAssign,
    StarAssign,
    SlashAssign,
    PercentAssign,
    FatArrow,
    Coalesce,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Punctuation {
    Semicolon,
    Comma,
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StringStyle {
    Regular,
    Verbatim,
    /// `$"..."`; the token lexeme keeps the raw body for the parser.
    Interpolated { verbatim: bool },
    Char,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Keyword(Keyword),
    Identifier,
    Operator(Operator),
    Punctuation(Punctuation),
    String(StringStyle),
    Number,
    Eof,
}

#[derive(Debug, Clone)]
pub struct Token {
    pub kind: TokenKind,
    pub lexeme: String,
    pub span: SourceSpan,
}

impl Token {
    pub fn is_keyword(&self, keyword: Keyword) -> bool {
        self.kind == TokenKind::Keyword(keyword)
    }

    pub fn is_punct(&self, punct: Punctuation) -> bool {
        self.kind == TokenKind::Punctuation(punct)
    }

    pub fn is_operator(&self, op: Operator) -> bool {
        self.kind == TokenKind::Operator(op)
    }
}

pub fn tokenize(source: &str) -> Vec<Token> {
    Lexer::new(source).tokenize()
}

pub struct Lexer<'a> {
    source: &'a str,
    chars: Peekable<CharIndices<'a>>,
    base: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            chars: source.char_indices().peekable(),
            base: 0,
        }
    }

    /// Shifts every produced span by `base`, for lexing a slice of a larger file.
    pub fn with_offset(mut self, base: usize) -> Self {
        self.base = base;
        self
    }

    fn bump(&mut self) -> Option<(usize, char)> {
        self.chars.next()
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().map(|&(_, ch)| ch)
    }

    fn peek_second(&self) -> Option<char> {
        let mut probe = self.chars.clone();
        probe.next();
        probe.next().map(|(_, ch)| ch)
    }

    fn position(&mut self) -> usize {
        self.chars
            .peek()
            .map(|&(idx, _)| idx)
            .unwrap_or(self.source.len())
    }

    fn match_next(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn skip_to(&mut self, end: usize) {
        while let Some(&(idx, _)) = self.chars.peek() {
            if idx >= end {
                break;
            }
            self.chars.next();
        }
    }

    fn span(&self, start: usize, end: usize) -> SourceSpan {
        SourceSpan::new(self.base + start, self.base + end)
    }

    fn skip_whitespace_and_comments(&mut self) {
        loop {
            match (self.peek(), self.peek_second()) {
                (Some(ch), _) if ch.is_whitespace() => {
                    self.bump();
                }
                (Some('/'), Some('/')) => {
                    while let Some(ch) = self.peek() {
                        if ch == '\n' {
                            break;
                        }
                        self.bump();
                    }
                }
                (Some('/'), Some('*')) => {
                    self.bump();
                    self.bump();
                    let mut prev = '\0';
                    while let Some((_, ch)) = self.bump() {
                        if prev == '*' && ch == '/' {
                            break;
                        }
                        prev = ch;
                    }
                }
                _ => break,
            }
        }
    }

    fn simple_token(&mut self, start: usize, kind: TokenKind) -> Token {
        let end = self.position();
        Token {
            kind,
            lexeme: self.source[start..end].to_string(),
            span: self.span(start, end),
        }
    }

    fn operator(&mut self, start: usize, op: Operator) -> Token {
        self.simple_token(start, TokenKind::Operator(op))
    }

    fn punct(&mut self, start: usize, punct: Punctuation) -> Token {
        self.simple_token(start, TokenKind::Punctuation(punct))
    }

    fn identifier_or_keyword(&mut self, start: usize) -> Token {
        while let Some(ch) = self.peek() {
            if ch.is_alphanumeric() || ch == '_' {
                self.bump();
            } else {
                break;
            }
        }
        let end = self.position();
        let lexeme = self.source[start..end].to_string();
        let kind = Keyword::from_word(&lexeme)
            .map(TokenKind::Keyword)
            .unwrap_or(TokenKind::Identifier);
        Token {
            kind,
            lexeme,
            span: self.span(start, end),
        }
    }

    fn eat_digits(&mut self) {
        while let Some(ch) = self.peek() {
            if ch.is_ascii_digit() || ch == '_' {
                self.bump();
            } else {
                break;
            }
        }
    }

    fn number_literal(&mut self, start: usize) -> Token {
        self.eat_digits();
        if self.peek() == Some('.') && self.peek_second().is_some_and(|ch| ch.is_ascii_digit()) {
            self.bump();
            self.eat_digits();
        }
        if matches!(self.peek(), Some('e' | 'E')) {
            let mut probe = self.chars.clone();
            probe.next();
            let exponent_follows = match probe.next() {
                Some((_, '+' | '-')) => probe.next().is_some_and(|(_, ch)| ch.is_ascii_digit()),
                Some((_, ch)) => ch.is_ascii_digit(),
                None => false,
            };
            if exponent_follows {
                self.bump();
                if matches!(self.peek(), Some('+' | '-')) {
                    self.bump();
                }
                self.eat_digits();
            }
        }
        if matches!(
            self.peek(),
            Some('f' | 'F' | 'd' | 'D' | 'm' | 'M' | 'l' | 'L' | 'u' | 'U')
        ) {
            self.bump();
        }
        let end = self.position();
        Token {
            kind: TokenKind::Number,
            lexeme: self.source[start..end].replace('_', ""),
            span: self.span(start, end),
        }
    }

    fn string_literal(&mut self, start: usize, style: StringStyle) -> Token {
        let (end, closed) = literal_end(self.source, start);
        self.skip_to(end);
        let prefix = match style {
            StringStyle::Regular | StringStyle::Char => 1,
            StringStyle::Verbatim | StringStyle::Interpolated { verbatim: false } => 2,
            StringStyle::Interpolated { verbatim: true } => 3,
        };
        let body_start = (start + prefix).min(end);
        let body_end = if closed { end - 1 } else { end };
        let body = &self.source[body_start..body_end.max(body_start)];
        if !closed {
            tracing::debug!(offset = self.base + start, "unterminated literal");
        }
        let lexeme = match style {
            StringStyle::Regular | StringStyle::Char => unescape(body),
            StringStyle::Verbatim => body.replace("\"\"", "\""),
            StringStyle::Interpolated { .. } => body.to_string(),
        };
        Token {
            kind: TokenKind::String(style),
            lexeme,
            span: self.span(start, end),
        }
    }

    pub fn tokenize(mut self) -> Vec<Token> {
        let mut tokens = Vec::new();
        loop {
            self.skip_whitespace_and_comments();
            let Some((start, ch)) = self.bump() else {
                let end = self.source.len();
                tokens.push(Token {
                    kind: TokenKind::Eof,
                    lexeme: String::new(),
                    span: self.span(end, end),
                });
                break;
            };

            let token = match ch {
                c if c.is_alphabetic() || c == '_' => self.identifier_or_keyword(start),
                '0'..='9' => self.number_literal(start),
                '"' => self.string_literal(start, StringStyle::Regular),
                '\'' => self.string_literal(start, StringStyle::Char),
                '@' if self.peek() == Some('"') => self.string_literal(start, StringStyle::Verbatim),
                '$' if self.peek() == Some('"') => {
                    self.string_literal(start, StringStyle::Interpolated { verbatim: false })
                }
                '$' | '@'
                    if matches!(self.peek(), Some('@' | '$')) && self.peek_second() == Some('"') =>
                {
                    self.string_literal(start, StringStyle::Interpolated { verbatim: true })
                }
                ';' => self.punct(start, Punctuation::Semicolon),
                ',' => self.punct(start, Punctuation::Comma),
                '(' => self.punct(start, Punctuation::LParen),
                ')' => self.punct(start, Punctuation::RParen),
                '{' => self.punct(start, Punctuation::LBrace),
                '}' => self.punct(start, Punctuation::RBrace),
                '[' => self.punct(start, Punctuation::LBracket),
                ']' => self.punct(start, Punctuation::RBracket),
                '+' => {
                    if self.match_next('+') {
                        self.operator(start, Operator::PlusPlus)
                    } else if self.match_next('=') {
                        self.operator(start, Operator::PlusAssign)
                    } else {
                        self.operator(start, Operator::Plus)
                    }
                }
                '-' => {
                    if self.match_next('-') {
                        self.operator(start, Operator::MinusMinus)
                    } else if self.match_next('=') {
                        self.operator(start, Operator::MinusAssign)
                    } else {
                        self.operator(start, Operator::Minus)
                    }
                }
                '*' => {
                    if self.match_next('=') {
                        self.operator(start, Operator::StarAssign)
                    } else {
                        self.operator(start, Operator::Star)
                    }
                }
                '/' => {
                    if self.match_next('=') {
                        self.operator(start, Operator::SlashAssign)
                    } else {
                        self.operator(start, Operator::Slash)
                    }
                }
                '%' => {
                    if self.match_next('=') {
                        self.operator(start, Operator::PercentAssign)
                    } else {
                        self.operator(start, Operator::Percent)
                    }
                }
                '=' => {
                    if self.match_next('=') {
                        self.operator(start, Operator::EqualEqual)
                    } else if self.match_next('>') {
                        self.operator(start, Operator::FatArrow)
                    } else {
                        self.operator(start, Operator::Assign)
                    }
                }
                '!' => {
                    if self.match_next('=') {
                        self.operator(start, Operator::BangEqual)
                    } else {
                        self.operator(start, Operator::Bang)
                    }
                }
                '<' => {
                    if self.match_next('=') {
                        self.operator(start, Operator::LessEqual)
                    } else {
                        self.operator(start, Operator::Less)
                    }
                }
                '>' => {
                    if self.match_next('=') {
                        self.operator(start, Operator::GreaterEqual)
                    } else {
                        self.operator(start, Operator::Greater)
                    }
                }
                '&' => {
                    if self.match_next('&') {
                        self.operator(start, Operator::AndAnd)
                    } else {
                        self.operator(start, Operator::Ampersand)
                    }
                }
                '|' => {
                    if self.match_next('|') {
                        self.operator(start, Operator::OrOr)
                    } else {
                        self.operator(start, Operator::Pipe)
                    }
                }
                '?' => {
                    if self.match_next('?') {
                        self.operator(start, Operator::Coalesce)
                    } else {
                        self.operator(start, Operator::Question)
                    }
                }
                '^' => self.operator(start, Operator::Caret),
                '~' => self.operator(start, Operator::Tilde),
                ':' => self.operator(start, Operator::Colon),
                '.' => self.operator(start, Operator::Dot),
                other => {
                    tracing::trace!(character = %other, offset = self.base + start, "skipping unknown character");
                    continue;
                }
            };
            tokens.push(token);
        }
        tokens
    }
}

/// Byte offset just past the string or char literal that starts at `start`
/// (its `$`, `@` or opening quote), and whether a closing quote was found.
///
/// Regular and char literals stop at a line break; placeholders of
/// interpolated strings may contain nested literals and braces.
pub(crate) fn literal_end(source: &str, start: usize) -> (usize, bool) {
    let bytes = source.as_bytes();
    let mut pos = start;
    let mut verbatim = false;
    let mut interpolated = false;
    while pos < bytes.len() && matches!(bytes[pos], b'$' | b'@') {
        verbatim |= bytes[pos] == b'@';
        interpolated |= bytes[pos] == b'$';
        pos += 1;
    }
    let Some(&quote) = bytes.get(pos) else {
        return (bytes.len(), false);
    };
    pos += 1;
    let mut depth = 0usize;
    while pos < bytes.len() {
        let byte = bytes[pos];
        if depth > 0 {
            match byte {
                b'"' | b'\'' => {
                    let (end, closed) = literal_end(source, pos);
                    if !closed {
                        return (end, false);
                    }
                    pos = end;
                    continue;
                }
                b'{' => depth += 1,
                b'}' => depth -= 1,
                _ => {}
            }
            pos += 1;
            continue;
        }
        match byte {
            b'\\' if !verbatim => pos += 1,
            b'\n' if !verbatim => return (pos, false),
            b if b == quote => {
                if verbatim && bytes.get(pos + 1) == Some(&quote) {
                    pos += 1;
                } else {
                    return (pos + 1, true);
                }
            }
            b'{' if interpolated => {
                if bytes.get(pos + 1) == Some(&b'{') {
                    pos += 1;
                } else {
                    depth = 1;
                }
            }
            b'}' if interpolated && bytes.get(pos + 1) == Some(&b'}') => pos += 1,
            _ => {}
        }
        pos += 1;
    }
    (bytes.len(), false)
}

/// Decodes backslash escapes of a regular string or char literal body.
pub fn unescape(body: &str) -> String {
    let mut value = String::with_capacity(body.len());
    let mut chars = body.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            value.push(ch);
            continue;
        }
        match chars.next() {
            Some('n') => value.push('\n'),
            Some('t') => value.push('\t'),
            Some('r') => value.push('\r'),
            Some('0') => value.push('\0'),
            Some('a') => value.push('\u{7}'),
            Some('b') => value.push('\u{8}'),
            Some('f') => value.push('\u{c}'),
            Some('v') => value.push('\u{b}'),
            Some('u') => {
                let hex: String = chars.by_ref().take(4).collect();
                match u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32) {
                    Some(decoded) => value.push(decoded),
                    None => {
                        value.push_str("\\u");
                        value.push_str(&hex);
                    }
                }
            }
            Some(other) => value.push(other),
            None => value.push('\\'),
        }
    }
    value
}
