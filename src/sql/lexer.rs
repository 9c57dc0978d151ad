//! SQL lexer/tokenizer.
//!
//! The [`Lexer`] converts a SQL string into a stream of [`Token`]s. It handles
//! keywords, identifiers, literals, positional parameters and comments.

use super::error::{Span, SyntaxError};
use super::token::{Keyword, Token, TokenKind};

/// SQL lexer that tokenizes input strings.
///
/// The lexer handles:
/// - Keywords (case-insensitive) and unquoted identifiers
/// - Integer literals
/// - String literals (single-quoted with '' escape)
/// - Positional parameters ($1, $2, etc.)
/// - Comments (-- line comments and /* */ block comments)
/// - Punctuation; unrecognized operator characters lex as generic symbols
///   so that unsupported statements can still be scanned and classified
pub struct Lexer<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Lexer<'a> {
    /// Creates a new lexer for the given input string.
    pub fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    /// Tokenizes the entire input.
    ///
    /// The returned vector always ends with an EOF token.
    pub fn tokenize(mut self) -> Result<Vec<Token>, SyntaxError> {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token()?;
            let is_eof = token.is_eof();
            tokens.push(token);
            if is_eof {
                break;
            }
        }
        Ok(tokens)
    }

    fn next_token(&mut self) -> Result<Token, SyntaxError> {
        self.skip_whitespace_and_comments()?;

        let start = self.pos;

        let Some(ch) = self.current_char() else {
            return Ok(Token::new(TokenKind::Eof, Span::at(start)));
        };

        if ch == '\'' {
            return self.scan_string_literal();
        }

        if ch == '$' {
            return self.scan_parameter();
        }

        if ch.is_ascii_digit() {
            return self.scan_number();
        }

        if ch.is_alphabetic() || ch == '_' {
            return Ok(self.scan_word());
        }

        self.advance();
        let span = Span::new(start, self.pos);
        let kind = match ch {
            ',' => TokenKind::Comma,
            ';' => TokenKind::Semicolon,
            '-' => TokenKind::Minus,
            other => TokenKind::Symbol(other),
        };
        Ok(Token::new(kind, span))
    }

    fn scan_string_literal(&mut self) -> Result<Token, SyntaxError> {
        let start = self.pos;
        self.advance(); // opening quote

        let mut value = String::new();
        loop {
            match self.current_char() {
                None => {
                    return Err(SyntaxError::new(
                        "unterminated string literal",
                        Span::new(start, self.pos),
                    ));
                }
                Some('\'') => {
                    self.advance();
                    // '' inside a string is an escaped quote
                    if self.current_char() == Some('\'') {
                        value.push('\'');
                        self.advance();
                    } else {
                        break;
                    }
                }
                Some(c) => {
                    value.push(c);
                    self.advance();
                }
            }
        }

        Ok(Token::new(
            TokenKind::String(value),
            Span::new(start, self.pos),
        ))
    }

    fn scan_parameter(&mut self) -> Result<Token, SyntaxError> {
        let start = self.pos;
        self.advance(); // '$'

        let digits_start = self.pos;
        while self.current_char().is_some_and(|c| c.is_ascii_digit()) {
            self.advance();
        }
        let digits = &self.input[digits_start..self.pos];
        let span = Span::new(start, self.pos);

        if digits.is_empty() {
            return Err(SyntaxError::new("expected parameter number after $", span));
        }
        let index: u16 = digits
            .parse()
            .map_err(|_| SyntaxError::new("parameter number out of range", span))?;
        if index == 0 {
            return Err(SyntaxError::new("invalid parameter number $0", span));
        }

        Ok(Token::new(TokenKind::Parameter(index), span))
    }

    fn scan_number(&mut self) -> Result<Token, SyntaxError> {
        let start = self.pos;
        while self.current_char().is_some_and(|c| c.is_ascii_digit()) {
            self.advance();
        }
        let text = self.input[start..self.pos].to_string();
        Ok(Token::new(
            TokenKind::Number(text),
            Span::new(start, self.pos),
        ))
    }

    fn scan_word(&mut self) -> Token {
        let start = self.pos;
        while self
            .current_char()
            .is_some_and(|c| c.is_alphanumeric() || c == '_')
        {
            self.advance();
        }
        let word = &self.input[start..self.pos];
        let span = Span::new(start, self.pos);

        match Keyword::from_ident(word) {
            Some(keyword) => Token::new(TokenKind::Keyword(keyword), span),
            None => Token::new(TokenKind::Ident(word.to_string()), span),
        }
    }

    fn skip_whitespace_and_comments(&mut self) -> Result<(), SyntaxError> {
        loop {
            while self.current_char().is_some_and(|c| c.is_whitespace()) {
                self.advance();
            }

            if self.input[self.pos..].starts_with("--") {
                while self.current_char().is_some_and(|c| c != '\n') {
                    self.advance();
                }
                continue;
            }

            if self.input[self.pos..].starts_with("/*") {
                let start = self.pos;
                self.pos += 2;
                loop {
                    if self.pos >= self.input.len() {
                        return Err(SyntaxError::new(
                            "unterminated block comment",
                            Span::new(start, self.pos),
                        ));
                    }
                    if self.input[self.pos..].starts_with("*/") {
                        self.pos += 2;
                        break;
                    }
                    self.advance();
                }
                continue;
            }

            return Ok(());
        }
    }

    fn current_char(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn advance(&mut self) {
        if let Some(c) = self.current_char() {
            self.pos += c.len_utf8();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(sql: &str) -> Vec<TokenKind> {
        Lexer::new(sql)
            .tokenize()
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn test_tokenize_select_literals() {
        assert_eq!(
            kinds("SELECT 1, 'two'"),
            vec![
                TokenKind::Keyword(Keyword::Select),
                TokenKind::Number("1".to_string()),
                TokenKind::Comma,
                TokenKind::String("two".to_string()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_tokenize_parameter() {
        assert_eq!(
            kinds("select $2"),
            vec![
                TokenKind::Keyword(Keyword::Select),
                TokenKind::Parameter(2),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_string_escape() {
        assert_eq!(
            kinds("SELECT 'it''s'"),
            vec![
                TokenKind::Keyword(Keyword::Select),
                TokenKind::String("it's".to_string()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_comments_are_skipped() {
        assert_eq!(
            kinds("SELECT /* inline */ 1 -- trailing"),
            vec![
                TokenKind::Keyword(Keyword::Select),
                TokenKind::Number("1".to_string()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_operators_lex_as_symbols() {
        assert_eq!(kinds("update t set x = 1")[4], TokenKind::Symbol('='));
    }

    #[test]
    fn test_unterminated_string_fails() {
        assert!(Lexer::new("SELECT 'oops").tokenize().is_err());
    }

    #[test]
    fn test_parameter_zero_rejected() {
        assert!(Lexer::new("SELECT $0").tokenize().is_err());
    }
}
