//! Splits a compilation unit into user functions and the entry block.
//!
//! Namespaces and type declarations are transparent: their members are
//! collected as if written at file level. Constructors, properties and enums
//! are skipped, as are instance methods (an access modifier without
//! `static`). Whatever is left over between members becomes statements: the
//! entry block when there is no `Main`, initializers otherwise.

use std::rc::Rc;

use indexmap::IndexMap;

use crate::{
    ast::{Expr, Operand, Stmt, StmtKind, TypeName},
    diagnostics::{Diagnostic, DiagnosticKind, SourceSpan},
    lexer::{Keyword, Lexer, Operator, Punctuation, Token, TokenKind},
    parser, segmenter,
};

#[derive(Debug, Clone)]
pub struct Param {
    pub name: String,
    pub declared_type: TypeName,
    pub default: Option<Expr>,
}

#[derive(Debug)]
pub struct FunctionDef {
    pub name: String,
    pub return_type: TypeName,
    pub params: Vec<Param>,
    pub body: Vec<Stmt>,
    pub span: SourceSpan,
}

impl FunctionDef {
    pub fn returns_void(&self) -> bool {
        self.return_type.name == "void" && self.return_type.rank == 0
    }
}

#[derive(Debug)]
pub enum Entry {
    Main(Rc<FunctionDef>),
    /// Top-level statements of a program without `Main`.
    Statements(Vec<Stmt>),
}

#[derive(Debug, Default)]
pub struct Program {
    pub functions: IndexMap<String, Rc<FunctionDef>>,
    /// Statements outside any function that run before `Main`.
    pub initializers: Vec<Stmt>,
    pub entry: Option<Entry>,
    /// Owners named by `using static` directives, e.g. `Console`.
    pub static_imports: Vec<String>,
}

/// Extracts a whole program; fails when there is nothing to run.
pub fn extract(source: &str) -> Result<Program, Diagnostic> {
    let program = extract_fragment(source, SourceSpan::new(0, source.len()))?;
    if program.entry.is_none() {
        return Err(Diagnostic::new(
            DiagnosticKind::MissingEntryPoint,
            "no `Main` method or top-level statements found",
        )
        .with_note("declare `static void Main()` or write statements at file level"));
    }
    Ok(program)
}

/// Extracts the declarations found in `span` of `source`. The result may
/// have no entry, e.g. for a snippet that only defines functions.
pub fn extract_fragment(source: &str, span: SourceSpan) -> Result<Program, Diagnostic> {
    let text = source.get(span.start..span.end).unwrap_or_default();
    segmenter::check_balance_at(text, span.start)?;
    let mut extractor = Extractor {
        source,
        tokens: Lexer::new(text).with_offset(span.start).tokenize(),
        functions: IndexMap::new(),
        loose: Vec::new(),
        static_imports: Vec::new(),
    };
    let eof = extractor.tokens.len() - 1;
    extractor.scan(0, eof, span.start, None)?;

    let Extractor {
        functions,
        loose,
        static_imports,
        ..
    } = extractor;
    let (initializers, entry) = match functions.get("Main") {
        Some(main) => (loose, Some(Entry::Main(Rc::clone(main)))),
        None if loose.is_empty() => (Vec::new(), None),
        None => (Vec::new(), Some(Entry::Statements(loose))),
    };
    tracing::debug!(
        functions = ?functions.keys().collect::<Vec<_>>(),
        initializers = initializers.len(),
        has_main = matches!(entry, Some(Entry::Main(_))),
        "extracted declarations"
    );
    Ok(Program {
        functions,
        initializers,
        entry,
        static_imports,
    })
}

const SOFT_MODIFIERS: &[&str] = &[
    "virtual", "override", "abstract", "sealed", "async", "extern", "partial", "unsafe",
    "volatile",
];

const PARAM_PREFIXES: &[&str] = &["ref", "out", "params", "this"];

struct Extractor<'src> {
    source: &'src str,
    tokens: Vec<Token>,
    functions: IndexMap<String, Rc<FunctionDef>>,
    loose: Vec<Stmt>,
    static_imports: Vec<String>,
}

impl Extractor<'_> {
    /// Walks tokens `from..to`, where `region_start` is the byte offset the
    /// region's text begins at.
    fn scan(
        &mut self,
        from: usize,
        to: usize,
        region_start: usize,
        owner: Option<&str>,
    ) -> Result<(), Diagnostic> {
        let mut piece = region_start;
        let mut idx = from;
        let mut at_member = true;
        while idx < to {
            if at_member {
                if let Some(next) = self.member(idx, to, owner, &mut piece)? {
                    idx = next;
                    continue;
                }
            }
            let token = &self.tokens[idx];
            match token.kind {
                TokenKind::Punctuation(
                    Punctuation::LBrace | Punctuation::LParen | Punctuation::LBracket,
                ) => {
                    let close = self.matching(idx)?;
                    at_member = self.tokens[close].is_punct(Punctuation::RBrace);
                    idx = close + 1;
                    continue;
                }
                TokenKind::Punctuation(Punctuation::Semicolon) => at_member = true,
                _ => at_member = false,
            }
            idx += 1;
        }
        self.flush(piece, self.tokens[to].span.start);
        Ok(())
    }

    /// Consumes a member or directive starting at `idx`, returning the index
    /// to resume from.
    fn member(
        &mut self,
        idx: usize,
        to: usize,
        owner: Option<&str>,
        piece: &mut usize,
    ) -> Result<Option<usize>, Diagnostic> {
        let first = self.tokens[idx].clone();

        if first.is_keyword(Keyword::Using) && !self.token(idx + 1).is_punct(Punctuation::LParen) {
            let semi = self.find_semicolon(idx, to);
            if self.token(idx + 1).is_keyword(Keyword::Static) {
                let owner = self
                    .tokens
                    .get(idx + 2..semi)
                    .unwrap_or(&[])
                    .iter()
                    .rev()
                    .find(|token| token.kind == TokenKind::Identifier);
                if let Some(owner) = owner {
                    tracing::debug!(owner = %owner.lexeme, "static import");
                    self.static_imports.push(owner.lexeme.clone());
                }
            }
            self.flush(*piece, first.span.start);
            *piece = self.end_of(semi, to);
            return Ok(Some(semi + 1));
        }

        if first.is_punct(Punctuation::LBracket) {
            let close = self.matching(idx)?;
            self.flush(*piece, first.span.start);
            *piece = self.tokens[close].span.end;
            return Ok(Some(close + 1));
        }

        if first.is_keyword(Keyword::Namespace) {
            self.flush(*piece, first.span.start);
            let mut cursor = idx + 1;
            while cursor < to
                && !self.tokens[cursor].is_punct(Punctuation::LBrace)
                && !self.tokens[cursor].is_punct(Punctuation::Semicolon)
            {
                cursor += 1;
            }
            if cursor < to && self.tokens[cursor].is_punct(Punctuation::LBrace) {
                let close = self.matching(cursor)?;
                let inner_start = self.tokens[cursor].span.end;
                self.scan(cursor + 1, close, inner_start, owner)?;
                *piece = self.tokens[close].span.end;
                return Ok(Some(close + 1));
            }
            *piece = self.end_of(cursor, to);
            return Ok(Some(cursor + 1));
        }

        let mut cursor = idx;
        let mut modifiers = Vec::new();
        while is_modifier(self.token(cursor)) {
            modifiers.push(self.tokens[cursor].lexeme.clone());
            cursor += 1;
        }

        if let Some(next) = self.type_declaration(idx, cursor, to, piece)? {
            return Ok(Some(next));
        }

        let head = self.token(cursor).clone();
        if head.kind == TokenKind::Identifier && self.token(cursor + 1).is_punct(Punctuation::LParen) {
            let close = self.matching(cursor + 1)?;
            if self.token(close + 1).is_punct(Punctuation::LBrace)
                || self.token(close + 1).is_operator(Operator::Colon)
            {
                let mut body = close + 1;
                while body < to && !self.tokens[body].is_punct(Punctuation::LBrace) {
                    body += 1;
                }
                let body_close = if body < to { self.matching(body)? } else { to - 1 };
                tracing::warn!(name = %head.lexeme, owner = ?owner, "skipping constructor");
                self.flush(*piece, first.span.start);
                *piece = self.tokens[body_close].span.end;
                return Ok(Some(body_close + 1));
            }
        }

        if let Some((function, next, end)) = self.function(cursor, to)? {
            self.flush(*piece, first.span.start);
            *piece = end;
            let has_access = modifiers
                .iter()
                .any(|m| matches!(m.as_str(), "public" | "private" | "protected" | "internal"));
            let is_static = modifiers.iter().any(|m| m == "static");
            if function.name == "Main" || is_static || !has_access {
                tracing::debug!(name = %function.name, params = function.params.len(), "registered function");
                self.functions.insert(function.name.clone(), Rc::new(function));
            } else {
                tracing::warn!(name = %function.name, "skipping instance method");
            }
            return Ok(Some(next));
        }

        if let Some(type_end) = self.type_spec_end(cursor) {
            let name = self.token(type_end).clone();
            if name.kind == TokenKind::Identifier && self.token(type_end + 1).is_punct(Punctuation::LBrace) {
                let mut close = self.matching(type_end + 1)?;
                if self.token(close + 1).is_operator(Operator::Assign) {
                    close = self.find_semicolon(close + 1, to);
                }
                tracing::warn!(name = %name.lexeme, "skipping property");
                self.flush(*piece, first.span.start);
                *piece = self.end_of(close, to);
                return Ok(Some(close + 1));
            }
        }

        if !modifiers.is_empty() {
            self.flush(*piece, first.span.start);
            *piece = self.tokens[cursor].span.start;
            return Ok(Some(cursor));
        }
        Ok(None)
    }

    fn type_declaration(
        &mut self,
        idx: usize,
        cursor: usize,
        to: usize,
        piece: &mut usize,
    ) -> Result<Option<usize>, Diagnostic> {
        let keyword = self.token(cursor);
        let kind = match keyword.kind {
            TokenKind::Keyword(Keyword::Class) => "class",
            TokenKind::Keyword(Keyword::Struct) => "struct",
            TokenKind::Identifier => match keyword.lexeme.as_str() {
                "interface" => "interface",
                "record" => "record",
                "enum" => "enum",
                _ => return Ok(None),
            },
            _ => return Ok(None),
        };
        let name = self.token(cursor + 1).clone();
        if name.kind != TokenKind::Identifier {
            return Ok(None);
        }
        self.flush(*piece, self.tokens[idx].span.start);
        let mut open = cursor + 2;
        while open < to
            && !self.tokens[open].is_punct(Punctuation::LBrace)
            && !self.tokens[open].is_punct(Punctuation::Semicolon)
        {
            if self.tokens[open].is_punct(Punctuation::LParen) {
                open = self.matching(open)?;
            }
            open += 1;
        }
        if open >= to || self.tokens[open].is_punct(Punctuation::Semicolon) {
            tracing::warn!(kind, name = %name.lexeme, "skipping body-less type declaration");
            *piece = self.end_of(open, to);
            return Ok(Some(open + 1));
        }
        let close = self.matching(open)?;
        if kind == "enum" {
            tracing::warn!(name = %name.lexeme, "skipping enum declaration");
        } else {
            let inner_start = self.tokens[open].span.end;
            self.scan(open + 1, close, inner_start, Some(&name.lexeme))?;
        }
        *piece = self.tokens[close].span.end;
        Ok(Some(close + 1))
    }

    /// `type name(params) { body }` or `type name(params) => expr;` starting
    /// at `idx`. Returns the definition, the next token index and the byte
    /// offset just past the definition.
    fn function(
        &self,
        idx: usize,
        to: usize,
    ) -> Result<Option<(FunctionDef, usize, usize)>, Diagnostic> {
        let Some(type_end) = self.type_spec_end(idx) else {
            return Ok(None);
        };
        let name = self.token(type_end).clone();
        if name.kind != TokenKind::Identifier {
            return Ok(None);
        }
        let mut open = type_end + 1;
        if self.token(open).is_operator(Operator::Less) {
            let Some(after) = self.skip_generics(open) else {
                return Ok(None);
            };
            open = after;
        }
        if !self.token(open).is_punct(Punctuation::LParen) {
            return Ok(None);
        }
        let close = self.matching(open)?;
        let arrow = self.token(close + 1);
        let return_type = self.type_name(idx, type_end);

        let (body, next, end) = if arrow.is_punct(Punctuation::LBrace) {
            let body_close = self.matching(close + 1)?;
            let inner = SourceSpan::new(
                self.tokens[close + 1].span.end,
                self.tokens[body_close].span.start,
            );
            (
                parser::parse_block(self.source, inner),
                body_close + 1,
                self.tokens[body_close].span.end,
            )
        } else if arrow.is_operator(Operator::FatArrow) {
            let semi = self.find_semicolon(close + 1, to);
            let expr_span =
                SourceSpan::new(self.tokens[close + 1].span.end, self.tokens[semi].span.start);
            let stmt = parser::parse_unit(self.source, expr_span);
            let is_void = return_type.name == "void" && return_type.rank == 0;
            (vec![expression_body(stmt, is_void)], semi + 1, self.end_of(semi, to))
        } else {
            return Ok(None);
        };

        let params = self.params(&name.lexeme, open + 1, close);
        let function = FunctionDef {
            name: name.lexeme.clone(),
            return_type,
            params,
            body,
            span: SourceSpan::new(self.tokens[idx].span.start, end),
        };
        Ok(Some((function, next, end)))
    }

    fn params(&self, function: &str, from: usize, to: usize) -> Vec<Param> {
        let mut params = Vec::new();
        let mut start = from;
        let mut depth = 0i32;
        for idx in from..=to {
            let token = &self.tokens[idx];
            match token.kind {
                TokenKind::Punctuation(
                    Punctuation::LParen | Punctuation::LBracket | Punctuation::LBrace,
                )
                | TokenKind::Operator(Operator::Less) => depth += 1,
                TokenKind::Punctuation(Punctuation::RBracket | Punctuation::RBrace)
                | TokenKind::Operator(Operator::Greater) => depth -= 1,
                TokenKind::Punctuation(Punctuation::RParen) if idx != to => depth -= 1,
                _ => {}
            }
            let boundary = idx == to || (depth == 0 && token.is_punct(Punctuation::Comma));
            if !boundary {
                continue;
            }
            if start < idx {
                match self.param(start, idx) {
                    Some(param) => params.push(param),
                    None => {
                        let text = self
                            .source
                            .get(self.tokens[start].span.start..self.tokens[idx - 1].span.end)
                            .unwrap_or_default();
                        tracing::warn!(function, parameter = text, "dropping malformed parameter");
                    }
                }
            }
            start = idx + 1;
        }
        params
    }

    fn param(&self, from: usize, to: usize) -> Option<Param> {
        let mut idx = from;
        while idx < to
            && (self.tokens[idx].is_keyword(Keyword::In)
                || (self.tokens[idx].kind == TokenKind::Identifier
                    && PARAM_PREFIXES.contains(&self.tokens[idx].lexeme.as_str())))
        {
            idx += 1;
        }
        let type_end = self.type_spec_end(idx).filter(|end| *end < to)?;
        let name = &self.tokens[type_end];
        if name.kind != TokenKind::Identifier {
            return None;
        }
        let default = if type_end + 1 == to {
            None
        } else if self.tokens[type_end + 1].is_operator(Operator::Assign) && type_end + 2 < to {
            let span = SourceSpan::new(
                self.tokens[type_end + 2].span.start,
                self.tokens[to - 1].span.end,
            );
            Some(parser::parse_expression_at(self.source, span).ok()?)
        } else {
            return None;
        };
        Some(Param {
            name: name.lexeme.clone(),
            declared_type: self.type_name(idx, type_end),
            default,
        })
    }

    /// Index just past a type such as `int`, `string[]`, `int?`,
    /// `List<int>` or `System.String` starting at `idx`.
    fn type_spec_end(&self, idx: usize) -> Option<usize> {
        let head = self.token(idx);
        match head.kind {
            TokenKind::Keyword(keyword) if keyword.is_type() => {}
            TokenKind::Identifier => {}
            _ => return None,
        }
        let mut cursor = idx + 1;
        while self.token(cursor).is_operator(Operator::Dot)
            && self.token(cursor + 1).kind == TokenKind::Identifier
        {
            cursor += 2;
        }
        if self.token(cursor).is_operator(Operator::Less) {
            cursor = self.skip_generics(cursor)?;
        }
        while self.token(cursor).is_punct(Punctuation::LBracket) {
            let mut inner = cursor + 1;
            while self.token(inner).is_punct(Punctuation::Comma) {
                inner += 1;
            }
            if !self.token(inner).is_punct(Punctuation::RBracket) {
                return Some(cursor);
            }
            cursor = inner + 1;
        }
        if self.token(cursor).is_operator(Operator::Question) {
            cursor += 1;
        }
        Some(cursor)
    }

    fn skip_generics(&self, open: usize) -> Option<usize> {
        let mut depth = 0usize;
        let mut cursor = open;
        loop {
            let token = self.token(cursor);
            match token.kind {
                TokenKind::Operator(Operator::Less) => depth += 1,
                TokenKind::Operator(Operator::Greater) => {
                    depth -= 1;
                    if depth == 0 {
                        return Some(cursor + 1);
                    }
                }
                TokenKind::Identifier
                | TokenKind::Keyword(_)
                | TokenKind::Operator(Operator::Dot | Operator::Question)
                | TokenKind::Punctuation(
                    Punctuation::Comma | Punctuation::LBracket | Punctuation::RBracket,
                ) => {}
                _ => return None,
            }
            cursor += 1;
        }
    }

    fn type_name(&self, from: usize, to: usize) -> TypeName {
        let rank = self.tokens[from..to]
            .iter()
            .filter(|token| token.is_punct(Punctuation::RBracket))
            .count();
        TypeName {
            name: self.tokens[from].lexeme.clone(),
            rank,
        }
    }

    fn flush(&mut self, start: usize, end: usize) {
        if start >= end {
            return;
        }
        let text = self.source.get(start..end).unwrap_or_default();
        if text.trim().is_empty() {
            return;
        }
        self.loose
            .extend(parser::parse_block(self.source, SourceSpan::new(start, end)));
    }

    /// Next depth-0 `;` at or after `from`, or `to` when there is none.
    fn find_semicolon(&self, from: usize, to: usize) -> usize {
        let mut idx = from;
        while idx < to {
            let token = &self.tokens[idx];
            if token.is_punct(Punctuation::Semicolon) {
                return idx;
            }
            if matches!(
                token.kind,
                TokenKind::Punctuation(Punctuation::LParen | Punctuation::LBrace | Punctuation::LBracket)
            ) {
                match self.matching(idx) {
                    Ok(close) => idx = close,
                    Err(_) => return to,
                }
            }
            idx += 1;
        }
        to
    }

    /// Byte offset just past token `idx`, or the region end when `idx` is
    /// the region's closing token.
    fn end_of(&self, idx: usize, to: usize) -> usize {
        if idx >= to {
            self.tokens[to].span.start
        } else {
            self.tokens[idx].span.end
        }
    }

    fn matching(&self, open: usize) -> Result<usize, Diagnostic> {
        let opener = &self.tokens[open];
        let (open_kind, close_kind) = match opener.kind {
            TokenKind::Punctuation(Punctuation::LParen) => (Punctuation::LParen, Punctuation::RParen),
            TokenKind::Punctuation(Punctuation::LBracket) => {
                (Punctuation::LBracket, Punctuation::RBracket)
            }
            _ => (Punctuation::LBrace, Punctuation::RBrace),
        };
        let mut depth = 0usize;
        for (idx, token) in self.tokens.iter().enumerate().skip(open) {
            if token.is_punct(open_kind) {
                depth += 1;
            } else if token.is_punct(close_kind) {
                depth -= 1;
                if depth == 0 {
                    return Ok(idx);
                }
            }
        }
        Err(Diagnostic::new(
            DiagnosticKind::BracketMismatch,
            format!("unclosed `{}`", opener.lexeme),
        )
        .with_span(opener.span))
    }

    fn token(&self, idx: usize) -> &Token {
        let last = self.tokens.len() - 1;
        &self.tokens[idx.min(last)]
    }
}

fn is_modifier(token: &Token) -> bool {
    match token.kind {
        TokenKind::Keyword(keyword) => keyword.is_modifier(),
        TokenKind::Identifier => SOFT_MODIFIERS.contains(&token.lexeme.as_str()),
        _ => false,
    }
}

/// Body statement for `=> expr;`: the expression's value is returned unless
/// the function is `void`.
fn expression_body(stmt: Stmt, is_void: bool) -> Stmt {
    if is_void {
        return stmt;
    }
    let kind = match stmt.kind {
        StmtKind::Expr(expr) => StmtKind::Return(Some(Operand::Expr(expr))),
        StmtKind::Invoke(call) => StmtKind::Return(Some(Operand::Call(call))),
        other => other,
    };
    Stmt {
        kind,
        span: stmt.span,
    }
}
