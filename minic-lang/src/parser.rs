//! Recursive descent over the token stream with one token of lookahead.
//!
//! A malformed primary expression does not stop the parse: the offending
//! token becomes an [`Expr::Error`] node. Any other syntax error is raised
//! from the statement that hit it, after the parser has skipped ahead to the
//! next statement boundary, so a caller can keep going from there.
use log::debug;

use crate::ast::*;
use crate::error::Error;
use crate::lexer::{Token, TokenKind};

const TYPE_KEYWORDS: [&str; 4] = ["int", "double", "string", "bool"];
const STATEMENT_KEYWORDS: [&str; 7] = [
    "int", "double", "string", "bool", "if", "while", "return",
];

pub struct Parser<'t> {
    tokens: &'t [Token],
    position: usize,
    ids: NodeIds,
}

impl<'t> Parser<'t> {
    pub fn new(tokens: &'t [Token]) -> Self {
        Self {
            tokens,
            position: 0,
            ids: NodeIds::default(),
        }
    }

    pub fn is_at_end(&self) -> bool {
        self.position >= self.tokens.len()
    }

    fn current(&self) -> Option<&'t Token> {
        self.tokens.get(self.position)
    }

    fn previous(&self) -> Option<&'t Token> {
        self.position
            .checked_sub(1)
            .and_then(|i| self.tokens.get(i))
    }

    fn advance(&mut self) -> Option<&'t Token> {
        if !self.is_at_end() {
            self.position += 1;
        }
        self.previous()
    }

    /// Keywords, operators and separators are matched by their text.
    fn check(&self, text: &str) -> bool {
        match self.current() {
            Some(t) => {
                matches!(
                    t.kind,
                    TokenKind::Keyword | TokenKind::Operator | TokenKind::Separator
                ) && t.text == text
            }
            None => false,
        }
    }

    fn check_kind(&self, kind: TokenKind) -> bool {
        self.current().map_or(false, |t| t.kind == kind)
    }

    fn check_any(&self, texts: &[&str]) -> bool {
        texts.iter().any(|t| self.check(t))
    }

    fn error_here(&self, message: &str) -> Error {
        match self.current().or_else(|| self.tokens.last()) {
            Some(t) => Error::parse(t.line, t.column, message),
            None => Error::parse(1, 0, message),
        }
    }

    fn consume(&mut self, text: &str, message: &str) -> Result<&'t Token, Error> {
        if self.check(text) {
            if let Some(t) = self.advance() {
                return Ok(t);
            }
        }
        Err(self.error_here(message))
    }

    fn consume_kind(&mut self, kind: TokenKind, message: &str) -> Result<&'t Token, Error> {
        if self.check_kind(kind) {
            if let Some(t) = self.advance() {
                return Ok(t);
            }
        }
        Err(self.error_here(message))
    }

    // Span from `start` to the end of the last consumed token.
    fn span_from(&self, start: SourceSpan) -> SourceSpan {
        match self.previous() {
            Some(t) => start.to(t.span),
            None => start,
        }
    }

    fn node<T: PartialEq>(&mut self, span: SourceSpan, node: T) -> Src<T> {
        Src {
            id: self.ids.next(),
            span,
            node,
        }
    }

    /// Skip tokens until just after a `;` or right before a statement keyword.
    pub fn synchronize(&mut self) {
        while !self.is_at_end() {
            if self.previous().map_or(false, |t| t.is(TokenKind::Separator, ";")) {
                return;
            }
            if self.check_any(&STATEMENT_KEYWORDS) {
                return;
            }
            self.advance();
        }
    }

    /// Parse one statement. On a syntax error the cursor is moved to the next
    /// statement boundary before the error is returned.
    pub fn parse_statement(&mut self) -> Result<Src<Stmt>, Error> {
        let result = self.statement();
        if let Err(ref e) = result {
            debug!("recovering from {}", e);
            self.synchronize();
        }
        result
    }

    fn statement(&mut self) -> Result<Src<Stmt>, Error> {
        if self.check_any(&TYPE_KEYWORDS) {
            self.var_declaration()
        } else if self.check("if") {
            self.if_statement()
        } else if self.check("while") {
            self.while_statement()
        } else if self.check("return") {
            self.return_statement()
        } else {
            self.expression_statement()
        }
    }

    fn optional_semicolon(&mut self) {
        if self.check(";") {
            self.advance();
        }
    }

    fn keyword_span(&mut self) -> SourceSpan {
        self.advance().map(|t| t.span).unwrap_or_default()
    }

    fn var_declaration(&mut self) -> Result<Src<Stmt>, Error> {
        let type_token = self.advance().ok_or_else(|| self.error_here("expected type"))?;
        let name = self.consume_kind(TokenKind::Identifier, "expected variable name")?;
        let initializer = if self.check("=") {
            self.advance();
            Some(self.expression())
        } else {
            None
        };
        // the semicolon is optional here
        self.optional_semicolon();
        let span = self.span_from(type_token.span);
        let stmt = Stmt::VariableDecl {
            var_type: type_token.text.clone(),
            name: name.text.clone(),
            initializer,
        };
        Ok(self.node(span, stmt))
    }

    fn if_statement(&mut self) -> Result<Src<Stmt>, Error> {
        let start = self.keyword_span();
        self.consume("(", "expected '(' after 'if'")?;
        let condition = self.expression();
        self.consume(")", "expected ')' after condition")?;
        let then_branch = Box::new(self.parse_statement()?);
        // binds to the nearest if, since the inner statement took its own else first
        let else_branch = if self.check("else") {
            self.advance();
            Some(Box::new(self.parse_statement()?))
        } else {
            None
        };
        let span = self.span_from(start);
        let stmt = Stmt::If {
            condition,
            then_branch,
            else_branch,
        };
        Ok(self.node(span, stmt))
    }

    fn while_statement(&mut self) -> Result<Src<Stmt>, Error> {
        let start = self.keyword_span();
        self.consume("(", "expected '(' after 'while'")?;
        let condition = self.expression();
        self.consume(")", "expected ')' after condition")?;
        let body = Box::new(self.parse_statement()?);
        let span = self.span_from(start);
        Ok(self.node(span, Stmt::While { condition, body }))
    }

    fn return_statement(&mut self) -> Result<Src<Stmt>, Error> {
        let start = self.keyword_span();
        let value = if self.check(";") {
            None
        } else {
            Some(self.expression())
        };
        self.consume(";", "expected ';' after return")?;
        let span = self.span_from(start);
        Ok(self.node(span, Stmt::Return { value }))
    }

    fn expression_statement(&mut self) -> Result<Src<Stmt>, Error> {
        let expr = self.expression();
        self.optional_semicolon();
        let span = self.span_from(expr.span);
        Ok(self.node(span, Stmt::Expression(expr)))
    }

    pub fn expression(&mut self) -> Src<Expr> {
        self.comparison()
    }

    fn binary(&mut self, op: BinaryOp, lhs: Src<Expr>, rhs: Src<Expr>) -> Src<Expr> {
        let span = lhs.span.to(rhs.span);
        self.node(span, Expr::Binary(op, Box::new(lhs), Box::new(rhs)))
    }

    fn peek_operator(&self, operators: &[&str]) -> Option<BinaryOp> {
        if self.check_any(operators) {
            self.current().and_then(|t| BinaryOp::from_symbol(&t.text))
        } else {
            None
        }
    }

    // Shared loop for the left associative levels.
    fn binary_level(
        &mut self,
        operators: &[&str],
        operand: fn(&mut Self) -> Src<Expr>,
    ) -> Src<Expr> {
        let mut exp = operand(self);
        while let Some(op) = self.peek_operator(operators) {
            self.advance();
            let rhs = operand(self);
            exp = self.binary(op, exp, rhs);
        }
        exp
    }

    fn comparison(&mut self) -> Src<Expr> {
        self.binary_level(&["<", ">", "==", "!=", "<=", ">="], Self::additive)
    }

    fn additive(&mut self) -> Src<Expr> {
        self.binary_level(&["+", "-"], Self::multiplicative)
    }

    fn multiplicative(&mut self) -> Src<Expr> {
        self.binary_level(&["*", "/"], Self::unary)
    }

    fn unary(&mut self) -> Src<Expr> {
        if self.check_any(&["-", "!"]) {
            if let Some(op_token) = self.advance() {
                let op = if op_token.text == "-" {
                    UnaryOp::Neg
                } else {
                    UnaryOp::Not
                };
                let arg = self.unary();
                let span = op_token.span.to(arg.span);
                return self.node(span, Expr::Unary(op, Box::new(arg)));
            }
        }
        self.primary()
    }

    fn primary(&mut self) -> Src<Expr> {
        let token = match self.current() {
            Some(t) => t,
            None => {
                let span = self
                    .tokens
                    .last()
                    .map(|t| SourceSpan::new(t.span.end, t.span.end))
                    .unwrap_or_default();
                let message = "unexpected end of input".to_string();
                return self.node(span, Expr::Error { message });
            }
        };

        if token.kind == TokenKind::Literal {
            self.advance();
            let literal = match token.text.strip_prefix('"').and_then(|s| s.strip_suffix('"')) {
                Some(content) => Literal::Str(content.to_string()),
                None => Literal::Number(token.text.clone()),
            };
            return self.node(token.span, Expr::Literal(literal));
        }

        if token.kind == TokenKind::Identifier {
            self.advance();
            return self.node(token.span, Expr::Identifier(token.text.clone()));
        }

        if self.check("(") {
            self.advance();
            let expr = self.expression();
            // a missing ')' is tolerated
            if self.check(")") {
                self.advance();
            }
            return expr;
        }

        // Not an expression: swallow the token and leave an error node in its place.
        self.advance();
        let message = format!("cannot parse '{}'", token.text);
        self.node(token.span, Expr::Error { message })
    }
}

fn program_span(tokens: &[Token]) -> SourceSpan {
    SourceSpan::new(0, tokens.last().map_or(0, |t| t.span.end))
}

/// Parse a whole program, stopping at the first syntax error.
pub fn parse(tokens: &[Token]) -> Result<Src<Program>, Error> {
    let mut parser = Parser::new(tokens);
    let mut stmts = vec![];
    while !parser.is_at_end() {
        stmts.push(parser.parse_statement()?);
    }
    Ok(parser.node(program_span(tokens), stmts))
}

/// Parse a whole program, collecting every syntax error instead of stopping.
/// Statements that failed are left out of the returned program.
pub fn parse_recovering(tokens: &[Token]) -> (Src<Program>, Vec<Error>) {
    let mut parser = Parser::new(tokens);
    let mut stmts = vec![];
    let mut errors = vec![];
    while !parser.is_at_end() {
        match parser.parse_statement() {
            Ok(stmt) => stmts.push(stmt),
            Err(e) => errors.push(e),
        }
    }
    let program = parser.node(program_span(tokens), stmts);
    (program, errors)
}
