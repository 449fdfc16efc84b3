use crate::{
    ast::{
        AssignOp, BinaryOp, ConsoleOp, Declarator, Expr, ExprKind, Invocation, Literal, LogicalOp,
        Operand, Segment, Stmt, StmtKind, SwitchSection, TypeName, UnaryOp,
    },
    diagnostics::{Diagnostic, DiagnosticKind, SourceSpan},
    lexer::{literal_end, unescape, Keyword, Lexer, Operator, Punctuation, StringStyle, Token, TokenKind},
    segmenter, stdlib,
};

/// Segments the block text at `span` and parses every unit. A unit that
/// fails to parse becomes [`StmtKind::Invalid`] so its siblings still run.
pub fn parse_block(source: &str, span: SourceSpan) -> Vec<Stmt> {
    let text = source.get(span.start..span.end).unwrap_or_default();
    segmenter::split_at(text, span.start)
        .into_iter()
        .map(|unit| parse_unit(source, unit.span))
        .collect()
}

/// Parses the single statement unit at `span` of `source`.
pub fn parse_unit(source: &str, span: SourceSpan) -> Stmt {
    let mut parser = Parser::new(source, span);
    match parser.statement_unit() {
        Ok(stmt) => stmt,
        Err(diag) => {
            tracing::trace!(error = %diag, "statement unit failed to parse");
            Stmt {
                kind: StmtKind::Invalid(diag.or_span(span)),
                span,
            }
        }
    }
}

/// Parses `source` as one complete expression.
pub fn parse_expression(source: &str) -> Result<Expr, Diagnostic> {
    parse_expression_at(source, SourceSpan::new(0, source.len()))
}

pub(crate) fn parse_expression_at(source: &str, span: SourceSpan) -> Result<Expr, Diagnostic> {
    let mut parser = Parser::new(source, span);
    let expr = parser.expression()?;
    parser.expect_end()?;
    Ok(expr)
}

fn is_blank(source: &str, span: SourceSpan) -> bool {
    source
        .get(span.start..span.end)
        .map_or(true, |text| text.trim().is_empty())
}

struct Parser<'src> {
    source: &'src str,
    tokens: Vec<Token>,
    current: usize,
}

impl<'src> Parser<'src> {
    fn new(source: &'src str, span: SourceSpan) -> Self {
        let text = source.get(span.start..span.end).unwrap_or_default();
        Self {
            source,
            tokens: Lexer::new(text).with_offset(span.start).tokenize(),
            current: 0,
        }
    }

    fn statement_unit(&mut self) -> Result<Stmt, Diagnostic> {
        let stmt = self.statement()?;
        self.matches_punct(Punctuation::Semicolon);
        self.expect_end()?;
        Ok(stmt)
    }

    // Classification order: declaration, console operation, control flow,
    // user-function call, assignment, bare expression.
    fn statement(&mut self) -> Result<Stmt, Diagnostic> {
        if self.looks_like_declaration() {
            return self.declaration();
        }
        if let Some(op) = self.console_op_ahead() {
            return self.console_statement(op);
        }
        match self.peek().kind {
            TokenKind::Keyword(Keyword::If) => return self.if_statement(),
            TokenKind::Keyword(Keyword::For) => return self.for_statement(),
            TokenKind::Keyword(Keyword::Foreach) => return self.foreach_statement(),
            TokenKind::Keyword(Keyword::While) => return self.while_statement(),
            TokenKind::Keyword(Keyword::Do) => return self.do_while_statement(),
            TokenKind::Keyword(Keyword::Switch) => return self.switch_statement(),
            TokenKind::Keyword(Keyword::Return) => return self.return_statement(),
            TokenKind::Keyword(Keyword::Break) => {
                let start = self.advance().span.start;
                self.end_statement()?;
                return Ok(self.stmt(StmtKind::Break, start));
            }
            TokenKind::Keyword(Keyword::Continue) => {
                let start = self.advance().span.start;
                self.end_statement()?;
                return Ok(self.stmt(StmtKind::Continue, start));
            }
            TokenKind::Punctuation(Punctuation::LBrace) => {
                let start = self.peek().span.start;
                let items = self.braced_block()?;
                return Ok(self.stmt(StmtKind::Block(items), start));
            }
            TokenKind::Punctuation(Punctuation::Semicolon) => {
                let start = self.advance().span.start;
                return Ok(self.stmt(StmtKind::Block(Vec::new()), start));
            }
            TokenKind::Keyword(Keyword::Case | Keyword::Default) => {
                return Err(self.error_here("`case` label outside of a `switch`"));
            }
            _ => {}
        }
        if self.call_ahead() {
            let start = self.peek().span.start;
            let call = self.invocation()?;
            self.end_statement()?;
            return Ok(self.stmt(StmtKind::Invoke(call), start));
        }
        if let Some(stmt) = self.try_assignment()? {
            return Ok(stmt);
        }
        let start = self.peek().span.start;
        let expr = self.expression()?;
        self.end_statement()?;
        Ok(self.stmt(StmtKind::Expr(expr), start))
    }

    fn stmt(&self, kind: StmtKind, start: usize) -> Stmt {
        Stmt {
            kind,
            span: self.span_from(start),
        }
    }

    fn end_statement(&mut self) -> Result<(), Diagnostic> {
        if self.matches_punct(Punctuation::Semicolon) || self.is_at_end() {
            Ok(())
        } else {
            Err(self.error_here("expected `;`"))
        }
    }

    fn looks_like_declaration(&self) -> bool {
        let mut idx = self.current;
        if self.token_at(idx).is_keyword(Keyword::Const) {
            idx += 1;
        }
        match self.token_at(idx).kind {
            TokenKind::Keyword(keyword) if keyword.is_type() => {}
            TokenKind::Identifier => {}
            _ => return false,
        }
        idx += 1;
        while self.token_at(idx).is_punct(Punctuation::LBracket) {
            idx += 1;
            while self.token_at(idx).is_punct(Punctuation::Comma) {
                idx += 1;
            }
            if !self.token_at(idx).is_punct(Punctuation::RBracket) {
                return false;
            }
            idx += 1;
        }
        if self.token_at(idx).is_operator(Operator::Question) {
            idx += 1;
        }
        self.token_at(idx).kind == TokenKind::Identifier
    }

    fn declaration(&mut self) -> Result<Stmt, Diagnostic> {
        let start = self.peek().span.start;
        let constant = self.matches_keyword(Keyword::Const);
        let ty = self.type_name()?;
        let mut declarators = Vec::new();
        loop {
            let name = self.consume_identifier("expected variable name")?;
            let initializer = if self.matches_op(Operator::Assign) {
                if self.check_punct(Punctuation::LBrace) {
                    Some(Operand::Expr(self.array_initializer()?))
                } else {
                    Some(self.operand()?)
                }
            } else {
                None
            };
            if initializer.is_none() && ty.is_var() {
                return Err(Diagnostic::syntax(format!(
                    "implicitly-typed variable `{}` must be initialized",
                    name.lexeme
                ))
                .with_span(name.span));
            }
            if initializer.is_none() && constant {
                return Err(Diagnostic::syntax(format!(
                    "constant `{}` requires a value",
                    name.lexeme
                ))
                .with_span(name.span));
            }
            declarators.push(Declarator {
                name: name.lexeme.clone(),
                initializer,
                span: self.span_from(name.span.start),
            });
            if !self.matches_punct(Punctuation::Comma) {
                break;
            }
        }
        self.end_statement()?;
        Ok(self.stmt(
            StmtKind::Declare {
                ty,
                constant,
                declarators,
            },
            start,
        ))
    }

    fn type_name(&mut self) -> Result<TypeName, Diagnostic> {
        let token = self.advance();
        let name = match token.kind {
            TokenKind::Keyword(keyword) if keyword.is_type() => token.lexeme.clone(),
            TokenKind::Identifier => token.lexeme.clone(),
            _ => return Err(self.error(&token, "expected a type name")),
        };
        let mut rank = 0;
        while self.check_punct(Punctuation::LBracket)
            && matches!(
                self.token_at(self.current + 1).kind,
                TokenKind::Punctuation(Punctuation::RBracket | Punctuation::Comma)
            )
        {
            self.advance();
            while self.matches_punct(Punctuation::Comma) {}
            self.consume_punct(Punctuation::RBracket, "expected `]`")?;
            rank += 1;
        }
        self.matches_op(Operator::Question);
        Ok(TypeName { name, rank })
    }

    fn console_op_ahead(&self) -> Option<ConsoleOp> {
        let receiver = self.token_at(self.current);
        if receiver.kind != TokenKind::Identifier || receiver.lexeme != "Console" {
            return None;
        }
        if !self.token_at(self.current + 1).is_operator(Operator::Dot) {
            return None;
        }
        let member = self.token_at(self.current + 2);
        let op = ConsoleOp::from_member(&member.lexeme)?;
        if !self.token_at(self.current + 3).is_punct(Punctuation::LParen) {
            return None;
        }
        let close = self.matching(self.current + 3).ok()?;
        self.ends_operand(close + 1).then_some(op)
    }

    fn console_statement(&mut self, op: ConsoleOp) -> Result<Stmt, Diagnostic> {
        let start = self.advance().span.start;
        self.advance();
        let member = self.advance();
        let args = self.arguments()?;
        let arity_ok = match op {
            ConsoleOp::WriteLine => true,
            ConsoleOp::Write => !args.is_empty(),
            ConsoleOp::ReadLine | ConsoleOp::Clear => args.is_empty(),
            ConsoleOp::ReadKey => args.len() <= 1,
        };
        if !arity_ok {
            return Err(Diagnostic::syntax(format!(
                "no overload of `Console.{}` takes {} arguments",
                member.lexeme,
                args.len()
            ))
            .with_span(self.span_from(start)));
        }
        self.end_statement()?;
        Ok(self.stmt(StmtKind::Console { op, args }, start))
    }

    fn if_statement(&mut self) -> Result<Stmt, Diagnostic> {
        let start = self.advance().span.start;
        let condition = self.parenthesized()?;
        let then_branch = self.body()?;
        let else_branch = if self.matches_keyword(Keyword::Else) {
            Some(self.body()?)
        } else {
            None
        };
        Ok(self.stmt(
            StmtKind::If {
                condition,
                then_branch,
                else_branch,
            },
            start,
        ))
    }

    fn for_statement(&mut self) -> Result<Stmt, Diagnostic> {
        let start = self.advance().span.start;
        if !self.check_punct(Punctuation::LParen) {
            return Err(self.error_here("expected `(` after `for`").into_fatal());
        }
        let open = self.current;
        let close = self.matching(open).map_err(Diagnostic::into_fatal)?;
        let header_span = SourceSpan::new(self.tokens[open].span.end, self.tokens[close].span.start);
        self.advance();
        let (init, condition, step) = match self.for_header(close) {
            Ok(header) => header,
            Err(primary) => {
                tracing::trace!(error = %primary, "recovering `for` clauses from header text");
                self.for_header_from_clauses(header_span)
                    .map_err(Diagnostic::into_fatal)?
            }
        };
        self.current = close + 1;
        let body = self.body()?;
        Ok(self.stmt(
            StmtKind::For {
                init,
                condition,
                step,
                body,
            },
            start,
        ))
    }

    #[allow(clippy::type_complexity)]
    fn for_header(
        &mut self,
        close: usize,
    ) -> Result<(Vec<Stmt>, Option<Expr>, Vec<Expr>), Diagnostic> {
        let init = self.for_init()?;
        let condition = if self.check_punct(Punctuation::Semicolon) {
            None
        } else {
            Some(self.expression()?)
        };
        self.consume_punct(Punctuation::Semicolon, "expected `;` after `for` condition")?;
        let step = if self.current == close {
            Vec::new()
        } else {
            self.expression_list()?
        };
        if self.current != close {
            return Err(self.error_here("unexpected token in `for` header"));
        }
        Ok((init, condition, step))
    }

    /// Initializer clause including its terminating `;` (or end of input).
    fn for_init(&mut self) -> Result<Vec<Stmt>, Diagnostic> {
        if self.matches_punct(Punctuation::Semicolon) {
            return Ok(Vec::new());
        }
        if self.looks_like_declaration() {
            return Ok(vec![self.declaration()?]);
        }
        let exprs = self.expression_list()?;
        self.end_statement()?;
        Ok(exprs
            .into_iter()
            .map(|expr| Stmt {
                span: expr.span,
                kind: StmtKind::Expr(expr),
            })
            .collect())
    }

    #[allow(clippy::type_complexity)]
    fn for_header_from_clauses(
        &self,
        header: SourceSpan,
    ) -> Result<(Vec<Stmt>, Option<Expr>, Vec<Expr>), Diagnostic> {
        let text = self.source.get(header.start..header.end).unwrap_or_default();
        let clauses: Vec<SourceSpan> = segmenter::split_top_level(text, b';')
            .into_iter()
            .map(|clause| SourceSpan::new(header.start + clause.start, header.start + clause.end))
            .collect();
        if clauses.len() != 3 {
            return Err(Diagnostic::syntax(format!(
                "`for` header needs three clauses separated by `;`, found {}",
                clauses.len()
            ))
            .with_span(header));
        }
        let init = if is_blank(self.source, clauses[0]) {
            Vec::new()
        } else {
            let mut parser = Parser::new(self.source, clauses[0]);
            let init = parser.for_init()?;
            parser.expect_end()?;
            init
        };
        let condition = if is_blank(self.source, clauses[1]) {
            None
        } else {
            Some(parse_expression_at(self.source, clauses[1])?)
        };
        let step = if is_blank(self.source, clauses[2]) {
            Vec::new()
        } else {
            let mut parser = Parser::new(self.source, clauses[2]);
            let step = parser.expression_list()?;
            parser.expect_end()?;
            step
        };
        Ok((init, condition, step))
    }

    fn foreach_statement(&mut self) -> Result<Stmt, Diagnostic> {
        let start = self.advance().span.start;
        self.consume_punct(Punctuation::LParen, "expected `(` after `foreach`")?;
        let ty = self.type_name()?;
        let binding = self.consume_identifier("expected loop variable name")?;
        if !self.matches_keyword(Keyword::In) {
            return Err(self.error_here("expected `in` in `foreach`"));
        }
        let collection = self.expression()?;
        self.consume_punct(Punctuation::RParen, "expected `)` after `foreach` collection")?;
        let body = self.body()?;
        Ok(self.stmt(
            StmtKind::Foreach {
                ty,
                binding: binding.lexeme.clone(),
                collection,
                body,
            },
            start,
        ))
    }

    fn while_statement(&mut self) -> Result<Stmt, Diagnostic> {
        let start = self.advance().span.start;
        let condition = self.parenthesized()?;
        let body = self.body()?;
        Ok(self.stmt(StmtKind::While { condition, body }, start))
    }

    fn do_while_statement(&mut self) -> Result<Stmt, Diagnostic> {
        let start = self.advance().span.start;
        let body = self.body()?;
        if !self.matches_keyword(Keyword::While) {
            return Err(Diagnostic::syntax("`do` block without a matching `while`")
                .with_span(self.span_from(start))
                .into_fatal());
        }
        let condition = self.parenthesized()?;
        self.end_statement()?;
        Ok(self.stmt(StmtKind::DoWhile { body, condition }, start))
    }

    fn switch_statement(&mut self) -> Result<Stmt, Diagnostic> {
        let start = self.advance().span.start;
        let subject = self.parenthesized()?;
        if !self.check_punct(Punctuation::LBrace) {
            return Err(self.error_here("expected `{` after `switch`"));
        }
        let open = self.current;
        let close = self.matching(open)?;
        let inner = SourceSpan::new(self.tokens[open].span.end, self.tokens[close].span.start);
        self.current = close + 1;

        let text = self.source.get(inner.start..inner.end).unwrap_or_default();
        let mut sections: Vec<SwitchSection> = Vec::new();
        for unit in segmenter::split_at(text, inner.start) {
            let mut parser = Parser::new(self.source, unit.span);
            let labels = parser.switch_labels()?;
            if !labels.is_empty() {
                match sections.last_mut() {
                    Some(section) if section.body.is_empty() => section.labels.extend(labels),
                    _ => sections.push(SwitchSection {
                        labels,
                        body: Vec::new(),
                    }),
                }
            }
            let Some(section) = sections.last_mut() else {
                return Err(Diagnostic::syntax("statement outside of a `case` label")
                    .with_span(unit.span));
            };
            if !parser.is_at_end() {
                let stmt_start = parser.peek().span.start;
                let stmt = parser.statement_unit().unwrap_or_else(|diag| Stmt {
                    span: SourceSpan::new(stmt_start, unit.span.end),
                    kind: StmtKind::Invalid(diag),
                });
                section.body.push(stmt);
            }
        }
        Ok(self.stmt(StmtKind::Switch { subject, sections }, start))
    }

    fn switch_labels(&mut self) -> Result<Vec<Option<Expr>>, Diagnostic> {
        let mut labels = Vec::new();
        loop {
            if self.matches_keyword(Keyword::Case) {
                let label = self.conditional()?;
                self.consume_op(Operator::Colon, "expected `:` after `case` label")?;
                labels.push(Some(label));
            } else if self.matches_keyword(Keyword::Default) {
                self.consume_op(Operator::Colon, "expected `:` after `default`")?;
                labels.push(None);
            } else {
                return Ok(labels);
            }
        }
    }

    fn return_statement(&mut self) -> Result<Stmt, Diagnostic> {
        let start = self.advance().span.start;
        let value = if self.check_punct(Punctuation::Semicolon) || self.is_at_end() {
            None
        } else {
            Some(self.operand()?)
        };
        self.end_statement()?;
        Ok(self.stmt(StmtKind::Return(value), start))
    }

    fn try_assignment(&mut self) -> Result<Option<Stmt>, Diagnostic> {
        let save = self.current;
        let start = self.peek().span.start;
        let Ok(target) = self.postfix() else {
            self.current = save;
            return Ok(None);
        };
        let Some(op) = self.assign_op() else {
            self.current = save;
            return Ok(None);
        };
        if !is_assignable(&target) {
            return Err(Diagnostic::unsupported("only variables and array elements can be assigned")
                .with_span(target.span));
        }
        self.advance();
        let value = self.operand()?;
        self.end_statement()?;
        Ok(Some(self.stmt(StmtKind::Assign { target, op, value }, start)))
    }

    fn assign_op(&self) -> Option<AssignOp> {
        match self.peek().kind {
            TokenKind::Operator(Operator::Assign) => Some(AssignOp::Assign),
            TokenKind::Operator(Operator::PlusAssign) => Some(AssignOp::Add),
            TokenKind::Operator(Operator::MinusAssign) => Some(AssignOp::Sub),
            TokenKind::Operator(Operator::StarAssign) => Some(AssignOp::Mul),
            TokenKind::Operator(Operator::SlashAssign) => Some(AssignOp::Div),
            TokenKind::Operator(Operator::PercentAssign) => Some(AssignOp::Mod),
            _ => None,
        }
    }

    /// A direct user-function call when it spans the whole operand, otherwise
    /// an ordinary expression.
    fn operand(&mut self) -> Result<Operand, Diagnostic> {
        if self.call_ahead() {
            Ok(Operand::Call(self.invocation()?))
        } else {
            Ok(Operand::Expr(self.expression()?))
        }
    }

    fn call_ahead(&self) -> bool {
        if self.peek().kind != TokenKind::Identifier
            || !self.token_at(self.current + 1).is_punct(Punctuation::LParen)
        {
            return false;
        }
        match self.matching(self.current + 1) {
            Ok(close) => self.ends_operand(close + 1),
            Err(_) => false,
        }
    }

    fn ends_operand(&self, idx: usize) -> bool {
        let token = self.token_at(idx);
        token.kind == TokenKind::Eof
            || token.is_punct(Punctuation::Semicolon)
            || token.is_punct(Punctuation::Comma)
    }

    fn invocation(&mut self) -> Result<Invocation, Diagnostic> {
        let name = self.consume_identifier("expected function name")?;
        let args = self.arguments()?;
        Ok(Invocation {
            name: name.lexeme.clone(),
            args,
            span: self.span_from(name.span.start),
        })
    }

    fn arguments(&mut self) -> Result<Vec<Expr>, Diagnostic> {
        self.consume_punct(Punctuation::LParen, "expected `(`")?;
        let mut args = Vec::new();
        if !self.check_punct(Punctuation::RParen) {
            loop {
                args.push(self.expression()?);
                if !self.matches_punct(Punctuation::Comma) {
                    break;
                }
            }
        }
        self.consume_punct(Punctuation::RParen, "expected `)` after arguments")?;
        Ok(args)
    }

    fn parenthesized(&mut self) -> Result<Expr, Diagnostic> {
        self.consume_punct(Punctuation::LParen, "expected `(`")?;
        let expr = self.expression()?;
        self.consume_punct(Punctuation::RParen, "expected `)`")?;
        Ok(expr)
    }

    fn body(&mut self) -> Result<Vec<Stmt>, Diagnostic> {
        if self.check_punct(Punctuation::LBrace) {
            self.braced_block()
        } else if self.is_at_end() {
            Err(self.error_here("expected a statement"))
        } else {
            Ok(vec![self.statement()?])
        }
    }

    fn braced_block(&mut self) -> Result<Vec<Stmt>, Diagnostic> {
        let open = self.current;
        let close = self.matching(open)?;
        let inner = SourceSpan::new(self.tokens[open].span.end, self.tokens[close].span.start);
        self.current = close + 1;
        Ok(parse_block(self.source, inner))
    }

    /// Index of the token closing the bracket at `open`.
    fn matching(&self, open: usize) -> Result<usize, Diagnostic> {
        let opener = self.token_at(open);
        let (open_kind, close_kind) = match opener.kind {
            TokenKind::Punctuation(Punctuation::LParen) => (Punctuation::LParen, Punctuation::RParen),
            TokenKind::Punctuation(Punctuation::LBrace) => (Punctuation::LBrace, Punctuation::RBrace),
            TokenKind::Punctuation(Punctuation::LBracket) => {
                (Punctuation::LBracket, Punctuation::RBracket)
            }
            _ => return Err(self.error(opener, "expected an opening bracket")),
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

    fn expression_list(&mut self) -> Result<Vec<Expr>, Diagnostic> {
        let mut exprs = vec![self.expression()?];
        while self.matches_punct(Punctuation::Comma) {
            exprs.push(self.expression()?);
        }
        Ok(exprs)
    }

    fn expression(&mut self) -> Result<Expr, Diagnostic> {
        self.assignment()
    }

    fn assignment(&mut self) -> Result<Expr, Diagnostic> {
        let target = self.conditional()?;
        let Some(op) = self.assign_op() else {
            return Ok(target);
        };
        if !is_assignable(&target) {
            return Err(Diagnostic::unsupported("only variables and array elements can be assigned")
                .with_span(target.span));
        }
        self.advance();
        let value = self.assignment()?;
        Ok(Expr {
            span: target.span.to(value.span),
            kind: ExprKind::Assign {
                target: Box::new(target),
                op,
                value: Box::new(value),
            },
        })
    }

    fn conditional(&mut self) -> Result<Expr, Diagnostic> {
        let condition = self.coalesce()?;
        if !self.matches_op(Operator::Question) {
            return Ok(condition);
        }
        let then_branch = self.expression()?;
        self.consume_op(Operator::Colon, "expected `:` in conditional expression")?;
        let else_branch = self.expression()?;
        Ok(Expr {
            span: condition.span.to(else_branch.span),
            kind: ExprKind::Conditional {
                condition: Box::new(condition),
                then_branch: Box::new(then_branch),
                else_branch: Box::new(else_branch),
            },
        })
    }

    fn coalesce(&mut self) -> Result<Expr, Diagnostic> {
        let value = self.logical_or()?;
        if !self.matches_op(Operator::Coalesce) {
            return Ok(value);
        }
        let fallback = self.coalesce()?;
        Ok(Expr {
            span: value.span.to(fallback.span),
            kind: ExprKind::Coalesce {
                value: Box::new(value),
                fallback: Box::new(fallback),
            },
        })
    }

    fn logical_or(&mut self) -> Result<Expr, Diagnostic> {
        let mut expr = self.logical_and()?;
        while self.matches_op(Operator::OrOr) {
            let right = self.logical_and()?;
            expr = logical(LogicalOp::Or, expr, right);
        }
        Ok(expr)
    }

    fn logical_and(&mut self) -> Result<Expr, Diagnostic> {
        let mut expr = self.equality()?;
        while self.matches_op(Operator::AndAnd) {
            let right = self.equality()?;
            expr = logical(LogicalOp::And, expr, right);
        }
        Ok(expr)
    }

    fn equality(&mut self) -> Result<Expr, Diagnostic> {
        let mut expr = self.comparison()?;
        loop {
            let op = if self.matches_op(Operator::EqualEqual) {
                BinaryOp::Equal
            } else if self.matches_op(Operator::BangEqual) {
                BinaryOp::NotEqual
            } else {
                break;
            };
            let right = self.comparison()?;
            expr = binary(op, expr, right);
        }
        Ok(expr)
    }

    fn comparison(&mut self) -> Result<Expr, Diagnostic> {
        let mut expr = self.term()?;
        loop {
            let op = if self.matches_op(Operator::LessEqual) {
                BinaryOp::LessEqual
            } else if self.matches_op(Operator::GreaterEqual) {
                BinaryOp::GreaterEqual
            } else if self.matches_op(Operator::Less) {
                BinaryOp::Less
            } else if self.matches_op(Operator::Greater) {
                BinaryOp::Greater
            } else {
                break;
            };
            let right = self.term()?;
            expr = binary(op, expr, right);
        }
        Ok(expr)
    }

    fn term(&mut self) -> Result<Expr, Diagnostic> {
        let mut expr = self.factor()?;
        loop {
            let op = if self.matches_op(Operator::Plus) {
                BinaryOp::Add
            } else if self.matches_op(Operator::Minus) {
                BinaryOp::Sub
            } else {
                break;
            };
            let right = self.factor()?;
            expr = binary(op, expr, right);
        }
        Ok(expr)
    }

    fn factor(&mut self) -> Result<Expr, Diagnostic> {
        let mut expr = self.unary()?;
        loop {
            let op = if self.matches_op(Operator::Star) {
                BinaryOp::Mul
            } else if self.matches_op(Operator::Slash) {
                BinaryOp::Div
            } else if self.matches_op(Operator::Percent) {
                BinaryOp::Mod
            } else {
                break;
            };
            let right = self.unary()?;
            expr = binary(op, expr, right);
        }
        Ok(expr)
    }

    fn unary(&mut self) -> Result<Expr, Diagnostic> {
        let start = self.peek().span.start;
        let op = if self.matches_op(Operator::Minus) {
            Some(UnaryOp::Negate)
        } else if self.matches_op(Operator::Plus) {
            Some(UnaryOp::Plus)
        } else if self.matches_op(Operator::Bang) {
            Some(UnaryOp::Not)
        } else {
            None
        };
        if let Some(op) = op {
            let expr = self.unary()?;
            return Ok(Expr {
                span: self.span_from(start),
                kind: ExprKind::Unary {
                    op,
                    expr: Box::new(expr),
                },
            });
        }
        let delta = if self.matches_op(Operator::PlusPlus) {
            Some(1)
        } else if self.matches_op(Operator::MinusMinus) {
            Some(-1)
        } else {
            None
        };
        if let Some(delta) = delta {
            let target = self.unary()?;
            if !is_assignable(&target) {
                return Err(Diagnostic::syntax("increment target must be a variable or array element")
                    .with_span(target.span));
            }
            return Ok(Expr {
                span: self.span_from(start),
                kind: ExprKind::Increment {
                    target: Box::new(target),
                    delta,
                    prefix: true,
                },
            });
        }
        if self.cast_ahead() {
            self.advance();
            let ty = self.type_name()?;
            self.consume_punct(Punctuation::RParen, "expected `)` after cast type")?;
            let expr = self.unary()?;
            return Ok(Expr {
                span: self.span_from(start),
                kind: ExprKind::Cast {
                    ty,
                    expr: Box::new(expr),
                },
            });
        }
        self.postfix()
    }

    fn cast_ahead(&self) -> bool {
        if !self.check_punct(Punctuation::LParen) {
            return false;
        }
        match self.token_at(self.current + 1).kind {
            TokenKind::Keyword(Keyword::Var | Keyword::Void) => false,
            TokenKind::Keyword(keyword) if keyword.is_type() => {
                self.token_at(self.current + 2).is_punct(Punctuation::RParen)
            }
            _ => false,
        }
    }

    fn postfix(&mut self) -> Result<Expr, Diagnostic> {
        let mut expr = self.primary()?;
        loop {
            if self.matches_op(Operator::Dot) {
                let member = self.consume_identifier("expected member name after `.`")?;
                let name = member.lexeme.clone();
                expr = if self.check_punct(Punctuation::LParen) {
                    let args = self.arguments()?;
                    Expr {
                        span: expr.span.to(self.previous().span),
                        kind: ExprKind::Method {
                            target: Box::new(expr),
                            name,
                            args,
                        },
                    }
                } else {
                    Expr {
                        span: expr.span.to(member.span),
                        kind: ExprKind::Property {
                            target: Box::new(expr),
                            name,
                        },
                    }
                };
            } else if self.matches_punct(Punctuation::LBracket) {
                let index = self.expression()?;
                let bracket = self.consume_punct(Punctuation::RBracket, "expected `]` after index")?;
                expr = Expr {
                    span: expr.span.to(bracket.span),
                    kind: ExprKind::Index {
                        target: Box::new(expr),
                        index: Box::new(index),
                    },
                };
            } else if self.check_op(Operator::PlusPlus) || self.check_op(Operator::MinusMinus) {
                if !is_assignable(&expr) {
                    break;
                }
                let delta = if self.advance().is_operator(Operator::PlusPlus) { 1 } else { -1 };
                expr = Expr {
                    span: expr.span.to(self.previous().span),
                    kind: ExprKind::Increment {
                        target: Box::new(expr),
                        delta,
                        prefix: false,
                    },
                };
            } else {
                break;
            }
        }
        Ok(expr)
    }

    fn primary(&mut self) -> Result<Expr, Diagnostic> {
        let token = self.peek().clone();
        match token.kind {
            TokenKind::Keyword(Keyword::True) => {
                self.advance();
                Ok(literal(Literal::Bool(true), token.span))
            }
            TokenKind::Keyword(Keyword::False) => {
                self.advance();
                Ok(literal(Literal::Bool(false), token.span))
            }
            TokenKind::Keyword(Keyword::Null) => {
                self.advance();
                Ok(literal(Literal::Null, token.span))
            }
            TokenKind::Number => {
                self.advance();
                Ok(literal(number_literal(&token)?, token.span))
            }
            TokenKind::String(StringStyle::Char) => {
                self.advance();
                let mut chars = token.lexeme.chars();
                match (chars.next(), chars.next()) {
                    (Some(ch), None) => Ok(literal(Literal::Char(ch), token.span)),
                    _ => Err(self.error(&token, "char literal must contain exactly one character")),
                }
            }
            TokenKind::String(StringStyle::Interpolated { verbatim }) => {
                self.advance();
                let body_start = token.span.start + if verbatim { 3 } else { 2 };
                let segments = self.interpolation(&token.lexeme, body_start, verbatim)?;
                Ok(Expr {
                    span: token.span,
                    kind: ExprKind::Interpolated(segments),
                })
            }
            TokenKind::String(_) => {
                self.advance();
                Ok(literal(Literal::String(token.lexeme.clone()), token.span))
            }
            TokenKind::Keyword(keyword) if keyword.is_type() => {
                self.advance();
                self.qualified_builtin(&token)?
                    .ok_or_else(|| self.error(&token, format!("unexpected type name `{}`", token.lexeme)))
            }
            TokenKind::Identifier => {
                self.advance();
                if let Some(builtin) = self.qualified_builtin(&token)? {
                    return Ok(builtin);
                }
                if self.check_punct(Punctuation::LParen) {
                    let args = self.arguments()?;
                    return Ok(Expr {
                        span: self.span_from(token.span.start),
                        kind: ExprKind::UserCall(Invocation {
                            name: token.lexeme.clone(),
                            args,
                            span: self.span_from(token.span.start),
                        }),
                    });
                }
                Ok(Expr {
                    span: token.span,
                    kind: ExprKind::Variable(token.lexeme.clone()),
                })
            }
            TokenKind::Punctuation(Punctuation::LParen) => {
                self.advance();
                let expr = self.expression()?;
                self.consume_punct(Punctuation::RParen, "expected `)` after expression")?;
                Ok(Expr {
                    span: self.span_from(token.span.start),
                    kind: expr.kind,
                })
            }
            TokenKind::Punctuation(Punctuation::LBrace) => self.array_initializer(),
            TokenKind::Keyword(Keyword::New) => self.new_expression(),
            TokenKind::Eof => Err(self.error(&token, "unexpected end of expression")),
            _ => Err(self.error(&token, format!("unexpected `{}` in expression", token.lexeme))),
        }
    }

    /// `Type.Member` or `Type.Member(args)` naming a builtin library entry.
    /// The owner token has already been consumed.
    fn qualified_builtin(&mut self, owner: &Token) -> Result<Option<Expr>, Diagnostic> {
        if !self.check_op(Operator::Dot) {
            return Ok(None);
        }
        let member = self.token_at(self.current + 1);
        if member.kind != TokenKind::Identifier {
            return Ok(None);
        }
        let name = stdlib::qualified_name(&owner.lexeme, &member.lexeme);
        if stdlib::lookup(&name).is_none() {
            return Ok(None);
        }
        self.advance();
        self.advance();
        let args = if self.check_punct(Punctuation::LParen) {
            self.arguments()?
        } else {
            Vec::new()
        };
        Ok(Some(Expr {
            span: self.span_from(owner.span.start),
            kind: ExprKind::Builtin { name, args },
        }))
    }

    fn array_initializer(&mut self) -> Result<Expr, Diagnostic> {
        let start = self
            .consume_punct(Punctuation::LBrace, "expected `{` to start array initializer")?
            .span
            .start;
        let mut elements = Vec::new();
        while !self.check_punct(Punctuation::RBrace) {
            elements.push(self.expression()?);
            if !self.matches_punct(Punctuation::Comma) {
                break;
            }
        }
        self.consume_punct(Punctuation::RBrace, "expected `}` after array initializer")?;
        Ok(Expr {
            span: self.span_from(start),
            kind: ExprKind::ArrayLiteral(elements),
        })
    }

    fn new_expression(&mut self) -> Result<Expr, Diagnostic> {
        let start = self.advance().span.start;
        let element = if self.check_punct(Punctuation::LBracket) {
            TypeName {
                name: "var".to_string(),
                rank: 0,
            }
        } else {
            let token = self.advance();
            match token.kind {
                TokenKind::Keyword(keyword) if keyword.is_type() => TypeName {
                    name: token.lexeme.clone(),
                    rank: 0,
                },
                TokenKind::Identifier => TypeName {
                    name: token.lexeme.clone(),
                    rank: 0,
                },
                _ => return Err(self.error(&token, "expected a type after `new`")),
            }
        };
        if !self.matches_punct(Punctuation::LBracket) {
            return Err(Diagnostic::unsupported(format!(
                "object creation `new {}(...)` is not supported",
                element.name
            ))
            .with_span(self.span_from(start)));
        }
        if self.matches_punct(Punctuation::RBracket) {
            let mut literal = self.array_initializer()?;
            literal.span = self.span_from(start);
            return Ok(literal);
        }
        let size = self.expression()?;
        self.consume_punct(Punctuation::RBracket, "expected `]` after array size")?;
        if self.check_punct(Punctuation::LBrace) {
            let mut literal = self.array_initializer()?;
            literal.span = self.span_from(start);
            return Ok(literal);
        }
        Ok(Expr {
            span: self.span_from(start),
            kind: ExprKind::NewArray {
                element,
                size: Box::new(size),
            },
        })
    }

    /// Splits the raw body of `$"..."` into text and placeholder segments.
    fn interpolation(
        &self,
        raw: &str,
        body_start: usize,
        verbatim: bool,
    ) -> Result<Vec<Segment>, Diagnostic> {
        let decode = |text: &str| {
            if verbatim {
                text.replace("\"\"", "\"")
            } else {
                unescape(text)
            }
        };
        let mut segments = Vec::new();
        let mut pending = String::new();
        let mut pos = 0;
        while pos < raw.len() {
            let rest = &raw[pos..];
            if rest.starts_with("{{") || rest.starts_with("}}") {
                pending.push_str(&rest[..1]);
                pos += 2;
                continue;
            }
            if rest.starts_with('{') {
                let close = hole_end(raw, pos).ok_or_else(|| {
                    Diagnostic::syntax("unterminated interpolation placeholder")
                        .with_span(SourceSpan::new(body_start + pos, body_start + raw.len()))
                })?;
                if !pending.is_empty() {
                    segments.push(Segment::Text(decode(&pending)));
                    pending.clear();
                }
                segments.push(self.hole(SourceSpan::new(body_start + pos + 1, body_start + close))?);
                pos = close + 1;
                continue;
            }
            let Some(ch) = rest.chars().next() else {
                break;
            };
            if ch == '\\' && !verbatim {
                let escaped: String = rest.chars().take(2).collect();
                pending.push_str(&escaped);
                pos += escaped.len();
                continue;
            }
            pending.push(ch);
            pos += ch.len_utf8();
        }
        if !pending.is_empty() {
            segments.push(Segment::Text(decode(&pending)));
        }
        Ok(segments)
    }

    /// `{expr[,alignment][:format]}` with `span` covering the text between the braces.
    fn hole(&self, span: SourceSpan) -> Result<Segment, Diagnostic> {
        let text = self.source.get(span.start..span.end).unwrap_or_default();
        let pieces = segmenter::split_top_level(text, b':');
        let head = pieces.first().copied().unwrap_or(SourceSpan::new(0, text.len()));
        let format = (pieces.len() > 1).then(|| text[head.end + 1..].to_string());
        let head_text = &text[head.start..head.end];
        let parts = segmenter::split_top_level(head_text, b',');
        let expr_end = parts.first().map_or(head_text.len(), |part| part.end);
        let alignment = match parts.get(1) {
            Some(part) => Some(
                head_text[part.start..part.end]
                    .trim()
                    .parse::<i64>()
                    .map_err(|_| Diagnostic::syntax("interpolation alignment must be an integer").with_span(span))?,
            ),
            None => None,
        };
        if is_blank(self.source, SourceSpan::new(span.start, span.start + expr_end)) {
            return Err(Diagnostic::syntax("empty interpolation placeholder").with_span(span));
        }
        let expr = parse_expression_at(self.source, SourceSpan::new(span.start, span.start + expr_end))?;
        Ok(Segment::Hole {
            expr,
            alignment,
            format,
        })
    }

    fn expect_end(&self) -> Result<(), Diagnostic> {
        if self.is_at_end() {
            Ok(())
        } else {
            let token = self.peek();
            Err(self.error(token, format!("unexpected `{}`", token.lexeme)))
        }
    }

    fn matches_punct(&mut self, punct: Punctuation) -> bool {
        if self.check_punct(punct) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn matches_op(&mut self, op: Operator) -> bool {
        if self.check_op(op) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn matches_keyword(&mut self, keyword: Keyword) -> bool {
        if self.peek().is_keyword(keyword) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn consume_punct(&mut self, punct: Punctuation, message: &str) -> Result<Token, Diagnostic> {
        if self.check_punct(punct) {
            Ok(self.advance())
        } else {
            Err(self.error_here(message))
        }
    }

    fn consume_op(&mut self, op: Operator, message: &str) -> Result<Token, Diagnostic> {
        if self.check_op(op) {
            Ok(self.advance())
        } else {
            Err(self.error_here(message))
        }
    }

    fn consume_identifier(&mut self, message: &str) -> Result<Token, Diagnostic> {
        if self.peek().kind == TokenKind::Identifier {
            Ok(self.advance())
        } else {
            Err(self.error_here(message))
        }
    }

    fn check_punct(&self, punct: Punctuation) -> bool {
        self.peek().is_punct(punct)
    }

    fn check_op(&self, op: Operator) -> bool {
        self.peek().is_operator(op)
    }

    fn advance(&mut self) -> Token {
        if !self.is_at_end() {
            self.current += 1;
        }
        self.previous().clone()
    }

    fn previous(&self) -> &Token {
        self.token_at(self.current.saturating_sub(1))
    }

    fn peek(&self) -> &Token {
        self.token_at(self.current)
    }

    /// Token at `idx`, or the trailing EOF token past the end.
    fn token_at(&self, idx: usize) -> &Token {
        let last = self.tokens.len().saturating_sub(1);
        &self.tokens[idx.min(last)]
    }

    fn is_at_end(&self) -> bool {
        self.peek().kind == TokenKind::Eof
    }

    fn span_from(&self, start: usize) -> SourceSpan {
        SourceSpan::new(start, self.previous().span.end.max(start))
    }

    fn error(&self, token: &Token, message: impl Into<String>) -> Diagnostic {
        Diagnostic::syntax(message).with_span(token.span)
    }

    fn error_here(&self, message: &str) -> Diagnostic {
        let token = self.peek();
        if token.kind == TokenKind::Eof {
            Diagnostic::syntax(format!("{message}, found end of statement")).with_span(token.span)
        } else {
            Diagnostic::syntax(format!("{message}, found `{}`", token.lexeme)).with_span(token.span)
        }
    }
}

fn is_assignable(expr: &Expr) -> bool {
    matches!(expr.kind, ExprKind::Variable(_) | ExprKind::Index { .. })
}

fn literal(value: Literal, span: SourceSpan) -> Expr {
    Expr {
        kind: ExprKind::Literal(value),
        span,
    }
}

fn binary(op: BinaryOp, left: Expr, right: Expr) -> Expr {
    Expr {
        span: left.span.to(right.span),
        kind: ExprKind::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        },
    }
}

fn logical(op: LogicalOp, left: Expr, right: Expr) -> Expr {
    Expr {
        span: left.span.to(right.span),
        kind: ExprKind::Logical {
            op,
            left: Box::new(left),
            right: Box::new(right),
        },
    }
}

fn number_literal(token: &Token) -> Result<Literal, Diagnostic> {
    let lexeme = token.lexeme.as_str();
    let (digits, suffix) = match lexeme.chars().last() {
        Some(ch) if ch.is_ascii_alphabetic() => (&lexeme[..lexeme.len() - 1], Some(ch)),
        _ => (lexeme, None),
    };
    let floating = digits.contains(['.', 'e', 'E'])
        || matches!(suffix, Some('f' | 'F' | 'd' | 'D' | 'm' | 'M'));
    let invalid = || Diagnostic::syntax(format!("invalid numeric literal `{lexeme}`")).with_span(token.span);
    if floating {
        digits.parse::<f64>().map(Literal::Double).map_err(|_| invalid())
    } else {
        digits.parse::<i64>().map(Literal::Int).map_err(|_| invalid())
    }
}

/// Offset of the `}` closing the placeholder that opens at `open`.
fn hole_end(raw: &str, open: usize) -> Option<usize> {
    let bytes = raw.as_bytes();
    let mut pos = open + 1;
    let mut depth = 1usize;
    while pos < bytes.len() {
        match bytes[pos] {
            b'"' | b'\'' => {
                pos = literal_end(raw, pos).0;
                continue;
            }
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(pos);
                }
            }
            _ => {}
        }
        pos += 1;
    }
    None
}
