use std::rc::Rc;
use std::sync::atomic::{AtomicUsize, Ordering};

use log::debug;

use crate::ast::*;
use crate::error::CompileError;
use crate::scanner::token::{Literal, Span, Token, TokenKind};

/// Parameter and argument lists are capped at this many entries.
pub const MAX_ARITY: usize = 255;

static NEXT_EXPR_ID: AtomicUsize = AtomicUsize::new(0);

fn next_id() -> ExprId {
    NEXT_EXPR_ID.fetch_add(1, Ordering::Relaxed)
}

pub struct Parser {
    tokens: Vec<Token>,
    current: usize,
    errors: Vec<CompileError>,
}

impl Parser {
    pub fn new(mut tokens: Vec<Token>) -> Self {
        if tokens.last().is_none_or(|t| t.kind != TokenKind::Eof) {
            let end = tokens
                .last()
                .map(|t| Span::new(t.span.offset + t.span.len, 0, t.span.line))
                .unwrap_or(Span::new(0, 0, 1));
            tokens.push(Token::new(TokenKind::Eof, "", end));
        }
        Self {
            tokens,
            current: 0,
            errors: Vec::new(),
        }
    }

    /// Parse the whole token stream. Any syntax error fails the parse; all
    /// errors found after recovery are returned together.
    pub fn parse(mut self) -> Result<Program, Vec<CompileError>> {
        let mut declarations = Vec::new();
        while !self.is_at_end() {
            if let Some(decl) = self.declaration() {
                declarations.push(decl);
            }
        }
        if self.errors.is_empty() {
            debug!("parsed {} top-level declarations", declarations.len());
            Ok(Program { declarations })
        } else {
            debug!("parse failed with {} error(s)", self.errors.len());
            Err(self.errors)
        }
    }

    /// Parse one declaration, entering panic mode on error: the error is
    /// recorded and tokens are skipped up to the next statement boundary.
    fn declaration(&mut self) -> Option<Decl> {
        match self.try_declaration() {
            Ok(decl) => Some(decl),
            Err(e) => {
                self.errors.push(e);
                self.synchronize();
                None
            }
        }
    }

    fn try_declaration(&mut self) -> Result<Decl, CompileError> {
        if self.check(TokenKind::Class) {
            self.class_declaration()
        } else if self.check(TokenKind::Fun) {
            self.fun_declaration()
        } else if self.check(TokenKind::Var) {
            self.var_declaration()
        } else {
            self.statement().map(Decl::Statement)
        }
    }

    fn class_declaration(&mut self) -> Result<Decl, CompileError> {
        let start = self.current_span();
        self.advance(); // consume 'class'
        let (name, name_span) = self.expect_identifier("class name")?;

        let superclass = if self.match_token(TokenKind::Less) {
            let (name, span) = self.expect_identifier("superclass name")?;
            Some(VariableExpr {
                id: next_id(),
                name,
                span,
            })
        } else {
            None
        };

        self.consume(TokenKind::LeftBrace, "'{' before class body")?;

        let mut methods = Vec::new();
        while !self.check(TokenKind::RightBrace) && !self.is_at_end() {
            methods.push(self.function("method")?);
        }

        self.consume(TokenKind::RightBrace, "'}' after class body")?;

        let span = self.span_from(start);
        Ok(Decl::Class(ClassDecl {
            name,
            name_span,
            superclass,
            methods,
            span,
        }))
    }

    fn fun_declaration(&mut self) -> Result<Decl, CompileError> {
        let start = self.current_span();
        self.advance(); // consume 'fun'
        let function = self.function("function")?;
        let span = self.span_from(start);
        Ok(Decl::Fun(FunDecl { function, span }))
    }

    fn function(&mut self, kind: &str) -> Result<Rc<Function>, CompileError> {
        let start = self.current_span();
        let (name, _) = self.expect_identifier(&format!("{kind} name"))?;

        self.consume(TokenKind::LeftParen, &format!("'(' after {kind} name"))?;
        let mut params = Vec::new();
        if !self.check(TokenKind::RightParen) {
            loop {
                if params.len() >= MAX_ARITY {
                    let error = CompileError::syntax(
                        format!("can't have more than {MAX_ARITY} parameters"),
                        self.peek(),
                    );
                    self.errors.push(error);
                }
                let (name, span) = self.expect_identifier("parameter name")?;
                params.push(Param { name, span });
                if !self.match_token(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.consume(TokenKind::RightParen, "')' after parameters")?;

        self.consume(TokenKind::LeftBrace, &format!("'{{' before {kind} body"))?;
        let body = self.block_declarations()?;
        let span = self.span_from(start);

        Ok(Rc::new(Function {
            name,
            params,
            body,
            span,
        }))
    }

    fn var_declaration(&mut self) -> Result<Decl, CompileError> {
        let start = self.current_span();
        self.advance(); // consume 'var'
        let (name, name_span) = self.expect_identifier("variable name")?;

        let initializer = if self.match_token(TokenKind::Equal) {
            Some(self.expression()?)
        } else {
            None
        };

        self.consume(TokenKind::Semicolon, "';' after variable declaration")?;
        let span = self.span_from(start);
        Ok(Decl::Var(VarDecl {
            name,
            name_span,
            initializer,
            span,
        }))
    }

    fn statement(&mut self) -> Result<Stmt, CompileError> {
        if self.check(TokenKind::Print) {
            self.print_statement()
        } else if self.check(TokenKind::Return) {
            self.return_statement()
        } else if self.check(TokenKind::LeftBrace) {
            self.block_statement()
        } else if self.check(TokenKind::If) {
            self.if_statement()
        } else if self.check(TokenKind::While) {
            self.while_statement()
        } else if self.check(TokenKind::For) {
            self.for_statement()
        } else {
            self.expression_statement()
        }
    }

    fn print_statement(&mut self) -> Result<Stmt, CompileError> {
        let start = self.current_span();
        self.advance(); // consume 'print'
        let expression = self.expression()?;
        self.consume(TokenKind::Semicolon, "';' after value")?;
        let span = self.span_from(start);
        Ok(Stmt::Print(PrintStmt { expression, span }))
    }

    fn return_statement(&mut self) -> Result<Stmt, CompileError> {
        let keyword = self.current_span();
        self.advance(); // consume 'return'
        let value = if !self.check(TokenKind::Semicolon) {
            Some(self.expression()?)
        } else {
            None
        };
        self.consume(TokenKind::Semicolon, "';' after return value")?;
        let span = self.span_from(keyword);
        Ok(Stmt::Return(ReturnStmt {
            keyword,
            value,
            span,
        }))
    }

    fn block_statement(&mut self) -> Result<Stmt, CompileError> {
        let start = self.current_span();
        self.advance(); // consume '{'
        let declarations = self.block_declarations()?;
        let span = self.span_from(start);
        Ok(Stmt::Block(BlockStmt { declarations, span }))
    }

    /// Declarations up to and including the closing `}`. Errors inside the
    /// block are recovered from declaration by declaration.
    fn block_declarations(&mut self) -> Result<Vec<Decl>, CompileError> {
        let mut declarations = Vec::new();
        while !self.check(TokenKind::RightBrace) && !self.is_at_end() {
            if let Some(decl) = self.declaration() {
                declarations.push(decl);
            }
        }
        self.consume(TokenKind::RightBrace, "'}' after block")?;
        Ok(declarations)
    }

    fn if_statement(&mut self) -> Result<Stmt, CompileError> {
        let start = self.current_span();
        self.advance(); // consume 'if'
        self.consume(TokenKind::LeftParen, "'(' after 'if'")?;
        let condition = self.expression()?;
        self.consume(TokenKind::RightParen, "')' after if condition")?;

        let then_branch = Box::new(self.statement()?);
        let else_branch = if self.match_token(TokenKind::Else) {
            Some(Box::new(self.statement()?))
        } else {
            None
        };

        let span = self.span_from(start);
        Ok(Stmt::If(IfStmt {
            condition,
            then_branch,
            else_branch,
            span,
        }))
    }

    fn while_statement(&mut self) -> Result<Stmt, CompileError> {
        let start = self.current_span();
        self.advance(); // consume 'while'
        self.consume(TokenKind::LeftParen, "'(' after 'while'")?;
        let condition = self.expression()?;
        self.consume(TokenKind::RightParen, "')' after while condition")?;
        let body = Box::new(self.statement()?);
        let span = self.span_from(start);
        Ok(Stmt::While(WhileStmt {
            condition,
            body,
            span,
        }))
    }

    /// Desugar `for (init; cond; inc) body` into
    /// `{ init; while (cond) { body; inc; } }`.
    fn for_statement(&mut self) -> Result<Stmt, CompileError> {
        let start = self.current_span();
        self.advance(); // consume 'for'
        self.consume(TokenKind::LeftParen, "'(' after 'for'")?;

        let initializer = if self.match_token(TokenKind::Semicolon) {
            None
        } else if self.check(TokenKind::Var) {
            Some(self.var_declaration()?)
        } else {
            Some(Decl::Statement(self.expression_statement()?))
        };

        let condition = if !self.check(TokenKind::Semicolon) {
            self.expression()?
        } else {
            Expr::Literal(LiteralExpr {
                id: next_id(),
                value: LiteralValue::Bool(true),
                span: self.current_span(),
            })
        };
        self.consume(TokenKind::Semicolon, "';' after loop condition")?;

        let increment = if !self.check(TokenKind::RightParen) {
            Some(self.expression()?)
        } else {
            None
        };
        self.consume(TokenKind::RightParen, "')' after for clauses")?;

        let body = self.statement()?;
        let span = self.span_from(start);

        let mut loop_body = vec![Decl::Statement(body)];
        if let Some(expression) = increment {
            let span = expression.span();
            loop_body.push(Decl::Statement(Stmt::Expression(ExprStmt {
                expression,
                span,
            })));
        }

        let while_loop = Stmt::While(WhileStmt {
            condition,
            body: Box::new(Stmt::Block(BlockStmt {
                declarations: loop_body,
                span,
            })),
            span,
        });

        let mut declarations: Vec<Decl> = initializer.into_iter().collect();
        declarations.push(Decl::Statement(while_loop));
        Ok(Stmt::Block(BlockStmt { declarations, span }))
    }

    fn expression_statement(&mut self) -> Result<Stmt, CompileError> {
        let expression = self.expression()?;
        self.consume(TokenKind::Semicolon, "';' after expression")?;
        let span = expression.span();
        Ok(Stmt::Expression(ExprStmt { expression, span }))
    }

    fn expression(&mut self) -> Result<Expr, CompileError> {
        self.ternary()
    }

    /// Ternary sits above assignment: `a = c ? x : y` is `(a = c) ? x : y`.
    fn ternary(&mut self) -> Result<Expr, CompileError> {
        let condition = self.assignment()?;
        if !self.check(TokenKind::Question) {
            return Ok(condition);
        }
        let question = self.advance().clone();
        let then_branch = self.assignment()?;
        if !self.match_token(TokenKind::Colon) {
            return Err(CompileError::syntax(
                "illegal ternary expression: expected ':' after true branch",
                &question,
            ));
        }
        let else_branch = self.assignment()?;
        let span = condition.span().to(else_branch.span());
        Ok(Expr::Ternary(TernaryExpr {
            id: next_id(),
            condition: Box::new(condition),
            then_branch: Box::new(then_branch),
            else_branch: Box::new(else_branch),
            question: question.span,
            span,
        }))
    }

    fn assignment(&mut self) -> Result<Expr, CompileError> {
        let expr = self.or()?;

        if self.check(TokenKind::Equal) {
            let equals = self.advance().clone();
            let value = self.assignment()?;
            let span = expr.span().to(value.span());

            return match expr {
                Expr::Variable(v) => Ok(Expr::Assign(AssignExpr {
                    id: next_id(),
                    name: v.name,
                    value: Box::new(value),
                    span,
                })),
                Expr::Get(g) => Ok(Expr::Set(SetExpr {
                    id: next_id(),
                    object: g.object,
                    name: g.name,
                    value: Box::new(value),
                    span,
                })),
                _ => Err(CompileError::syntax("invalid assignment target", &equals)),
            };
        }

        Ok(expr)
    }

    fn or(&mut self) -> Result<Expr, CompileError> {
        self.logical(TokenKind::Or, LogicalOp::Or, Self::and)
    }

    fn and(&mut self) -> Result<Expr, CompileError> {
        self.logical(TokenKind::And, LogicalOp::And, Self::equality)
    }

    fn logical(
        &mut self,
        kind: TokenKind,
        operator: LogicalOp,
        operand: fn(&mut Self) -> Result<Expr, CompileError>,
    ) -> Result<Expr, CompileError> {
        let mut expr = operand(self)?;
        while self.match_token(kind) {
            let right = operand(self)?;
            let span = expr.span().to(right.span());
            expr = Expr::Logical(LogicalExpr {
                id: next_id(),
                left: Box::new(expr),
                operator,
                right: Box::new(right),
                span,
            });
        }
        Ok(expr)
    }

    fn equality(&mut self) -> Result<Expr, CompileError> {
        self.binary(
            &[TokenKind::EqualEqual, TokenKind::BangEqual],
            Self::comparison,
        )
    }

    fn comparison(&mut self) -> Result<Expr, CompileError> {
        self.binary(
            &[
                TokenKind::Greater,
                TokenKind::GreaterEqual,
                TokenKind::Less,
                TokenKind::LessEqual,
            ],
            Self::term,
        )
    }

    fn term(&mut self) -> Result<Expr, CompileError> {
        self.binary(&[TokenKind::Plus, TokenKind::Minus], Self::factor)
    }

    fn factor(&mut self) -> Result<Expr, CompileError> {
        self.binary(&[TokenKind::Star, TokenKind::Slash], Self::unary)
    }

    /// One left-associative binary precedence level.
    fn binary(
        &mut self,
        kinds: &[TokenKind],
        operand: fn(&mut Self) -> Result<Expr, CompileError>,
    ) -> Result<Expr, CompileError> {
        let mut expr = operand(self)?;
        while let Some(op) = self.match_binary_op(kinds) {
            let operator_span = self.previous_span();
            let right = operand(self)?;
            let span = expr.span().to(right.span());
            expr = Expr::Binary(BinaryExpr {
                id: next_id(),
                left: Box::new(expr),
                operator: op,
                operator_span,
                right: Box::new(right),
                span,
            });
        }
        Ok(expr)
    }

    fn unary(&mut self) -> Result<Expr, CompileError> {
        if self.check(TokenKind::Bang) || self.check(TokenKind::Minus) {
            let start = self.current_span();
            let op = if self.match_token(TokenKind::Bang) {
                UnaryOp::Not
            } else {
                self.advance();
                UnaryOp::Negate
            };
            let operand = self.unary()?;
            let span = start.to(operand.span());
            return Ok(Expr::Unary(UnaryExpr {
                id: next_id(),
                operator: op,
                operand: Box::new(operand),
                span,
            }));
        }
        self.call()
    }

    fn call(&mut self) -> Result<Expr, CompileError> {
        let mut expr = self.primary()?;

        loop {
            if self.match_token(TokenKind::LeftParen) {
                expr = self.finish_call(expr)?;
            } else if self.match_token(TokenKind::Dot) {
                let (name, name_span) = self.expect_identifier("property name after '.'")?;
                let span = expr.span().to(name_span);
                expr = Expr::Get(GetExpr {
                    id: next_id(),
                    object: Box::new(expr),
                    name,
                    span,
                });
            } else {
                break;
            }
        }

        Ok(expr)
    }

    fn finish_call(&mut self, callee: Expr) -> Result<Expr, CompileError> {
        let mut arguments = Vec::new();
        if !self.check(TokenKind::RightParen) {
            loop {
                if arguments.len() >= MAX_ARITY {
                    let error = CompileError::syntax(
                        format!("can't have more than {MAX_ARITY} arguments"),
                        self.peek(),
                    );
                    self.errors.push(error);
                }
                arguments.push(self.expression()?);
                if !self.match_token(TokenKind::Comma) {
                    break;
                }
            }
        }
        let paren = self
            .consume(TokenKind::RightParen, "')' after arguments")?
            .span;
        let span = callee.span().to(paren);
        Ok(Expr::Call(CallExpr {
            id: next_id(),
            callee: Box::new(callee),
            paren,
            arguments,
            span,
        }))
    }

    fn primary(&mut self) -> Result<Expr, CompileError> {
        let token = self.peek().clone();
        let value = match token.kind {
            TokenKind::Number | TokenKind::String => match token.literal {
                Some(Literal::Number(n)) => LiteralValue::Number(n),
                Some(Literal::Str(ref s)) => LiteralValue::String(s.clone()),
                None => return Err(CompileError::syntax("malformed literal", &token)),
            },
            TokenKind::True => LiteralValue::Bool(true),
            TokenKind::False => LiteralValue::Bool(false),
            TokenKind::Nil => LiteralValue::Nil,
            TokenKind::This => {
                self.advance();
                return Ok(Expr::This(ThisExpr {
                    id: next_id(),
                    span: token.span,
                }));
            }
            TokenKind::Super => {
                self.advance();
                self.consume(TokenKind::Dot, "'.' after 'super'")?;
                let (method, method_span) = self.expect_identifier("superclass method name")?;
                return Ok(Expr::Super(SuperExpr {
                    id: next_id(),
                    method,
                    span: token.span.to(method_span),
                }));
            }
            TokenKind::Identifier => {
                self.advance();
                return Ok(Expr::Variable(VariableExpr {
                    id: next_id(),
                    name: token.lexeme,
                    span: token.span,
                }));
            }
            TokenKind::LeftParen => {
                self.advance();
                let expr = self.expression()?;
                self.consume(TokenKind::RightParen, "')' after expression")?;
                let span = token.span.to(self.previous_span());
                return Ok(Expr::Grouping(GroupingExpr {
                    id: next_id(),
                    expression: Box::new(expr),
                    span,
                }));
            }
            _ => return Err(CompileError::syntax("expected expression", &token)),
        };
        self.advance();
        Ok(Expr::Literal(LiteralExpr {
            id: next_id(),
            value,
            span: token.span,
        }))
    }

    // --- Helper methods ---

    fn peek(&self) -> &Token {
        &self.tokens[self.current]
    }

    fn is_at_end(&self) -> bool {
        self.peek().kind == TokenKind::Eof
    }

    fn advance(&mut self) -> &Token {
        if !self.is_at_end() {
            self.current += 1;
        }
        self.previous()
    }

    fn previous(&self) -> &Token {
        &self.tokens[self.current.saturating_sub(1)]
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.peek().kind == kind
    }

    fn match_token(&mut self, kind: TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn match_binary_op(&mut self, kinds: &[TokenKind]) -> Option<BinaryOp> {
        let kind = self.peek().kind;
        let op = kinds.contains(&kind).then(|| token_to_binary_op(kind)).flatten()?;
        self.advance();
        Some(op)
    }

    fn consume(&mut self, kind: TokenKind, message: &str) -> Result<&Token, CompileError> {
        if self.check(kind) {
            Ok(self.advance())
        } else {
            Err(CompileError::syntax(
                format!("expected {message}"),
                self.peek(),
            ))
        }
    }

    fn expect_identifier(&mut self, context: &str) -> Result<(String, Span), CompileError> {
        if self.check(TokenKind::Identifier) {
            let token = self.advance();
            Ok((token.lexeme.clone(), token.span))
        } else {
            Err(CompileError::syntax(
                format!("expected {context}"),
                self.peek(),
            ))
        }
    }

    fn current_span(&self) -> Span {
        self.peek().span
    }

    fn previous_span(&self) -> Span {
        self.previous().span
    }

    fn span_from(&self, start: Span) -> Span {
        start.to(self.previous_span())
    }

    /// Discard tokens until just after a `;` or just before a token that
    /// starts a statement.
    fn synchronize(&mut self) {
        self.advance();
        while !self.is_at_end() {
            if self.previous().kind == TokenKind::Semicolon {
                return;
            }
            if self.peek().kind.starts_statement() {
                return;
            }
            self.advance();
        }
    }
}

fn token_to_binary_op(kind: TokenKind) -> Option<BinaryOp> {
    match kind {
        TokenKind::Plus => Some(BinaryOp::Add),
        TokenKind::Minus => Some(BinaryOp::Subtract),
        TokenKind::Star => Some(BinaryOp::Multiply),
        TokenKind::Slash => Some(BinaryOp::Divide),
        TokenKind::EqualEqual => Some(BinaryOp::Equal),
        TokenKind::BangEqual => Some(BinaryOp::NotEqual),
        TokenKind::Less => Some(BinaryOp::Less),
        TokenKind::LessEqual => Some(BinaryOp::LessEqual),
        TokenKind::Greater => Some(BinaryOp::Greater),
        TokenKind::GreaterEqual => Some(BinaryOp::GreaterEqual),
        _ => None,
    }
}
