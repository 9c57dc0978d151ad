//! SQL parser using recursive descent.
//!
//! The [`Parser`] converts a stream of tokens into [`Statement`] values.
//! Multi-statement input (semicolon-separated, as arrives over the simple
//! query protocol) is handled by [`parse_statements`]; the extended protocol's
//! Parse message uses [`parse_statement`], which requires exactly one.

use super::ast::{Expr, Literal, SelectStmt, Statement};
use super::error::SyntaxError;
use super::lexer::Lexer;
use super::token::{Keyword, Token, TokenKind};

/// Parses a possibly multi-statement SQL string.
///
/// Empty statements (stray semicolons, whitespace-only input) are skipped,
/// so the result may be empty.
pub fn parse_statements(sql: &str) -> Result<Vec<Statement>, SyntaxError> {
    Parser::new(sql)?.parse_statements()
}

/// Parses exactly one SQL statement, as required for a prepared statement.
pub fn parse_statement(sql: &str) -> Result<Statement, SyntaxError> {
    let mut parser = Parser::new(sql)?;
    let mut stmts = parser.parse_statements()?;
    let Some(stmt) = stmts.pop() else {
        return Err(SyntaxError::new("empty query", parser.current_span()));
    };
    if !stmts.is_empty() {
        return Err(SyntaxError::new(
            "cannot insert multiple commands into a prepared statement",
            parser.current_span(),
        ));
    }
    Ok(stmt)
}

/// SQL parser that converts tokens into statement trees.
pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    /// Creates a new parser for the given SQL input.
    pub fn new(input: &str) -> Result<Self, SyntaxError> {
        let tokens = Lexer::new(input).tokenize()?;
        Ok(Self { tokens, pos: 0 })
    }

    /// Parses all statements in the input.
    pub fn parse_statements(&mut self) -> Result<Vec<Statement>, SyntaxError> {
        let mut statements = Vec::new();
        loop {
            while self.consume(&TokenKind::Semicolon) {}
            if self.is_eof() {
                break;
            }
            statements.push(self.parse_statement()?);
            if !self.is_eof() && !self.check(&TokenKind::Semicolon) {
                return Err(SyntaxError::unexpected_token(
                    "; or end of input",
                    &self.current().text(),
                    self.current_span(),
                ));
            }
        }
        Ok(statements)
    }

    fn parse_statement(&mut self) -> Result<Statement, SyntaxError> {
        if self.consume_keyword(Keyword::Select) {
            return Ok(Statement::Select(self.parse_select()?));
        }

        // Not a SELECT: record the leading word and scan to the statement
        // boundary without interpreting the rest.
        let leading = self.current().text().to_uppercase();
        while !self.is_eof() && !self.check(&TokenKind::Semicolon) {
            self.advance();
        }
        Ok(Statement::Other(leading))
    }

    fn parse_select(&mut self) -> Result<SelectStmt, SyntaxError> {
        let mut items = vec![self.parse_expr()?];
        while self.consume(&TokenKind::Comma) {
            items.push(self.parse_expr()?);
        }
        Ok(SelectStmt { items })
    }

    /// Parses a single expression: a literal, a parameter, or a negated
    /// integer literal.
    pub fn parse_expr(&mut self) -> Result<Expr, SyntaxError> {
        let span = self.current_span();
        let token = self.current().clone();
        match token.kind {
            TokenKind::Number(text) => {
                self.advance();
                let value: i64 = text
                    .parse()
                    .map_err(|_| SyntaxError::new("integer literal out of range", span))?;
                Ok(Expr::Literal(Literal::Integer(value)))
            }
            TokenKind::Minus => {
                self.advance();
                let span = self.current_span();
                let TokenKind::Number(text) = self.current().kind.clone() else {
                    return Err(SyntaxError::unexpected_token(
                        "number",
                        &self.current().text(),
                        span,
                    ));
                };
                self.advance();
                let value: i64 = text
                    .parse::<i64>()
                    .map(|v| -v)
                    .map_err(|_| SyntaxError::new("integer literal out of range", span))?;
                Ok(Expr::Literal(Literal::Integer(value)))
            }
            TokenKind::String(value) => {
                self.advance();
                Ok(Expr::Literal(Literal::String(value)))
            }
            TokenKind::Keyword(Keyword::Null) => {
                self.advance();
                Ok(Expr::Literal(Literal::Null))
            }
            TokenKind::Keyword(Keyword::True) => {
                self.advance();
                Ok(Expr::Literal(Literal::Boolean(true)))
            }
            TokenKind::Keyword(Keyword::False) => {
                self.advance();
                Ok(Expr::Literal(Literal::Boolean(false)))
            }
            TokenKind::Parameter(index) => {
                self.advance();
                Ok(Expr::Parameter(index))
            }
            _ => Err(SyntaxError::unexpected_token(
                "expression",
                &token.text(),
                span,
            )),
        }
    }

    fn current(&self) -> &Token {
        &self.tokens[self.pos]
    }

    fn current_span(&self) -> super::error::Span {
        self.current().span
    }

    fn is_eof(&self) -> bool {
        self.current().is_eof()
    }

    fn advance(&mut self) {
        if !self.is_eof() {
            self.pos += 1;
        }
    }

    fn check(&self, kind: &TokenKind) -> bool {
        &self.current().kind == kind
    }

    fn consume(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn consume_keyword(&mut self, keyword: Keyword) -> bool {
        if matches!(self.current().kind, TokenKind::Keyword(k) if k == keyword) {
            self.advance();
            true
        } else {
            false
        }
    }
}
