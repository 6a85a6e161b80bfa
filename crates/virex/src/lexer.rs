//! Hand-written scanner for `.vx` source.
//!
//! Produces one [`Token`] at a time with 1-indexed line/column positions.
//! Comments (`//` to end of line, `/* */` non-nesting) and whitespace are
//! skipped between tokens. String literals decode the escape set
//! `\n \t \r \\ \"`; unknown escapes are kept verbatim with their
//! backslash.

use crate::token::{Token, TokenKind, TokenValue};

pub struct Lexer<'src> {
    source: &'src [u8],
    pub filename: String,
    pos: usize,
    line: usize,
    column: usize,
}

impl<'src> Lexer<'src> {
    pub fn new(source: &'src str, filename: impl Into<String>) -> Self {
        Self {
            source: source.as_bytes(),
            filename: filename.into(),
            pos: 0,
            line: 1,
            column: 1,
        }
    }

    fn current(&self) -> u8 {
        self.source.get(self.pos).copied().unwrap_or(0)
    }

    fn peek_next(&self) -> u8 {
        self.source.get(self.pos + 1).copied().unwrap_or(0)
    }

    fn advance(&mut self) {
        if self.current() == b'\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        self.pos += 1;
    }

    /// Consumes `expected` if it is the current byte.
    fn matches(&mut self, expected: u8) -> bool {
        if self.current() == expected {
            self.advance();
            true
        } else {
            false
        }
    }

    fn skip_whitespace(&mut self) {
        while self.current().is_ascii_whitespace() {
            self.advance();
        }
    }

    /// Skips one comment if the cursor sits on one. Returns true if anything
    /// was consumed so the caller can re-check for whitespace.
    fn skip_comment(&mut self) -> bool {
        if self.current() == b'/' && self.peek_next() == b'/' {
            while self.current() != b'\n' && self.current() != 0 {
                self.advance();
            }
            return true;
        }
        if self.current() == b'/' && self.peek_next() == b'*' {
            self.advance();
            self.advance();
            while self.current() != 0 {
                if self.current() == b'*' && self.peek_next() == b'/' {
                    self.advance();
                    self.advance();
                    break;
                }
                self.advance();
            }
            return true;
        }
        false
    }

    fn lex_identifier(&mut self) -> Token {
        let start_line = self.line;
        let start_column = self.column;
        let start = self.pos;

        while self.current().is_ascii_alphanumeric() || self.current() == b'_' {
            self.advance();
        }

        let lexeme = std::str::from_utf8(&self.source[start..self.pos]).unwrap_or("").to_owned();

        if let Some(kind) = TokenKind::keyword(&lexeme) {
            let mut token = Token::new(kind, lexeme, start_line, start_column);
            if kind == TokenKind::True {
                token.value = TokenValue::Bool(true);
            } else if kind == TokenKind::False {
                token.value = TokenValue::Bool(false);
            }
            return token;
        }

        Token::new(TokenKind::Identifier, lexeme, start_line, start_column)
    }

    fn lex_number(&mut self) -> Token {
        let start_line = self.line;
        let start_column = self.column;
        let start = self.pos;
        let mut is_float = false;

        while self.current().is_ascii_digit() {
            self.advance();
        }

        // Decimal point, but not the `..` range operator
        if self.current() == b'.' && self.peek_next().is_ascii_digit() {
            is_float = true;
            self.advance();
            while self.current().is_ascii_digit() {
                self.advance();
            }
        }

        // Scientific notation (1.5e10, 2e-3)
        if self.current() == b'e' || self.current() == b'E' {
            is_float = true;
            self.advance();
            if self.current() == b'+' || self.current() == b'-' {
                self.advance();
            }
            while self.current().is_ascii_digit() {
                self.advance();
            }
        }

        let lexeme = std::str::from_utf8(&self.source[start..self.pos]).unwrap_or("0").to_owned();
        if is_float {
            let mut t = Token::new(TokenKind::Float, lexeme, start_line, start_column);
            t.value = TokenValue::Float(t.lexeme.parse().unwrap_or(0.0));
            t
        } else {
            let mut t = Token::new(TokenKind::Integer, lexeme, start_line, start_column);
            t.value = TokenValue::Int(t.lexeme.parse().unwrap_or(0));
            t
        }
    }

    fn lex_string(&mut self) -> Token {
        let start_line = self.line;
        let start_column = self.column;

        self.advance(); // opening quote

        let mut value = String::new();
        while self.current() != b'"' && self.current() != 0 {
            let c = self.current();
            if c == b'\\' {
                self.advance();
                if self.current() == 0 {
                    return self.error_token("unterminated string", start_line, start_column);
                }
                match self.current() {
                    b'n' => value.push('\n'),
                    b't' => value.push('\t'),
                    b'r' => value.push('\r'),
                    b'\\' => value.push('\\'),
                    b'"' => value.push('"'),
                    other => {
                        value.push('\\');
                        value.push(other as char);
                    }
                }
                self.advance();
            } else {
                value.push(c as char);
                self.advance();
            }
        }

        if self.current() != b'"' {
            return self.error_token("unterminated string", start_line, start_column);
        }
        self.advance(); // closing quote

        let mut token = Token::new(TokenKind::Str, value.clone(), start_line, start_column);
        token.value = TokenValue::Str(value);
        token
    }

    fn error_token(&self, message: &str, line: usize, column: usize) -> Token {
        Token::new(TokenKind::Error, message, line, column)
    }

    fn simple(&self, kind: TokenKind, lexeme: &str, line: usize, column: usize) -> Token {
        Token::new(kind, lexeme, line, column)
    }

    pub fn next_token(&mut self) -> Token {
        loop {
            self.skip_whitespace();
            if !self.skip_comment() {
                break;
            }
        }

        let start_line = self.line;
        let start_column = self.column;

        if self.current() == 0 {
            return self.simple(TokenKind::Eof, "", start_line, start_column);
        }

        if self.current().is_ascii_alphabetic() || self.current() == b'_' {
            return self.lex_identifier();
        }

        if self.current().is_ascii_digit() {
            return self.lex_number();
        }

        if self.current() == b'"' {
            return self.lex_string();
        }

        let c = self.current();
        self.advance();

        match c {
            b'(' => self.simple(TokenKind::LParen, "(", start_line, start_column),
            b')' => self.simple(TokenKind::RParen, ")", start_line, start_column),
            b'{' => self.simple(TokenKind::LBrace, "{", start_line, start_column),
            b'}' => self.simple(TokenKind::RBrace, "}", start_line, start_column),
            b'[' => self.simple(TokenKind::LBracket, "[", start_line, start_column),
            b']' => self.simple(TokenKind::RBracket, "]", start_line, start_column),
            b';' => self.simple(TokenKind::Semicolon, ";", start_line, start_column),
            b',' => self.simple(TokenKind::Comma, ",", start_line, start_column),
            b'+' => self.simple(TokenKind::Plus, "+", start_line, start_column),
            b'%' => self.simple(TokenKind::Percent, "%", start_line, start_column),
            b'/' => self.simple(TokenKind::Slash, "/", start_line, start_column),
            b'*' => self.simple(TokenKind::Star, "*", start_line, start_column),
            b'-' => {
                if self.matches(b'>') {
                    self.simple(TokenKind::Arrow, "->", start_line, start_column)
                } else {
                    self.simple(TokenKind::Minus, "-", start_line, start_column)
                }
            }
            b'=' => {
                if self.matches(b'=') {
                    self.simple(TokenKind::EqEq, "==", start_line, start_column)
                } else if self.matches(b'>') {
                    self.simple(TokenKind::FatArrow, "=>", start_line, start_column)
                } else {
                    self.simple(TokenKind::Eq, "=", start_line, start_column)
                }
            }
            b'!' => {
                if self.matches(b'=') {
                    self.simple(TokenKind::BangEq, "!=", start_line, start_column)
                } else {
                    self.simple(TokenKind::Bang, "!", start_line, start_column)
                }
            }
            b'<' => {
                if self.matches(b'=') {
                    self.simple(TokenKind::LtEq, "<=", start_line, start_column)
                } else {
                    self.simple(TokenKind::Lt, "<", start_line, start_column)
                }
            }
            b'>' => {
                if self.matches(b'=') {
                    self.simple(TokenKind::GtEq, ">=", start_line, start_column)
                } else {
                    self.simple(TokenKind::Gt, ">", start_line, start_column)
                }
            }
            b'&' => {
                if self.matches(b'&') {
                    self.simple(TokenKind::AmpAmp, "&&", start_line, start_column)
                } else {
                    self.simple(TokenKind::Amp, "&", start_line, start_column)
                }
            }
            b'|' => {
                if self.matches(b'|') {
                    self.simple(TokenKind::PipePipe, "||", start_line, start_column)
                } else {
                    self.simple(TokenKind::Pipe, "|", start_line, start_column)
                }
            }
            b':' => {
                if self.matches(b':') {
                    self.simple(TokenKind::ColonColon, "::", start_line, start_column)
                } else {
                    self.simple(TokenKind::Colon, ":", start_line, start_column)
                }
            }
            b'.' => {
                if self.matches(b'.') {
                    if self.matches(b'.') {
                        self.simple(TokenKind::Ellipsis, "...", start_line, start_column)
                    } else {
                        self.simple(TokenKind::DotDot, "..", start_line, start_column)
                    }
                } else {
                    self.simple(TokenKind::Dot, ".", start_line, start_column)
                }
            }
            other => self.simple(
                TokenKind::Error,
                &format!("unexpected character '{}'", other as char),
                start_line,
                start_column,
            ),
        }
    }

    /// Drains the whole input into a token vector ending with `Eof`.
    pub fn tokenize(mut self) -> Vec<Token> {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token();
            let done = token.kind == TokenKind::Eof;
            tokens.push(token);
            if done {
                break;
            }
        }
        tokens
    }
}
