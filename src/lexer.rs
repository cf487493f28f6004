use thiserror::Error;

use crate::ast::{Token, TokenKind};

/// Lexing failure, pointing at the character offset where it was detected.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message} at position {position}")]
pub struct TokenizeError {
    pub message: String,
    pub position: usize,
}

pub struct Lexer {
    input: Vec<char>,
    position: usize,
}

impl Lexer {
    pub fn new(input: &str) -> Self {
        Lexer {
            input: input.chars().collect(),
            position: 0,
        }
    }

    fn current_char(&self) -> Option<char> {
        self.input.get(self.position).copied()
    }

    fn peek_char(&self, offset: usize) -> Option<char> {
        self.input.get(self.position + offset).copied()
    }

    fn advance(&mut self) {
        self.position += 1;
    }

    fn error(&self, message: impl Into<String>, position: usize) -> TokenizeError {
        TokenizeError {
            message: message.into(),
            position,
        }
    }

    fn skip_whitespace(&mut self) {
        while let Some(ch) = self.current_char() {
            if ch.is_whitespace() {
                self.advance();
            } else {
                break;
            }
        }
    }

    fn read_identifier(&mut self) -> String {
        let mut result = String::new();
        while let Some(ch) = self.current_char() {
            if ch.is_alphanumeric() || ch == '_' {
                result.push(ch);
                self.advance();
            } else {
                break;
            }
        }
        result
    }

    /// Reads up to the closing delimiter. No escape processing.
    fn read_delimited(&mut self, delimiter: char, what: &str) -> Result<String, TokenizeError> {
        let start = self.position;
        let mut result = String::new();
        self.advance(); // Consume opening delimiter

        while let Some(ch) = self.current_char() {
            self.advance();
            if ch == delimiter {
                return Ok(result);
            }
            result.push(ch);
        }

        Err(self.error(format!("Unterminated {}", what), start))
    }

    fn read_number(&mut self) -> String {
        let mut number = String::new();
        let mut seen_dot = false;

        while let Some(ch) = self.current_char() {
            if ch.is_ascii_digit() {
                number.push(ch);
                self.advance();
            } else if ch == '.'
                && !seen_dot
                && self.peek_char(1).is_some_and(|c| c.is_ascii_digit())
            {
                seen_dot = true;
                number.push(ch);
                self.advance();
            } else {
                break;
            }
        }
        number
    }

    /// Emits a one- or two-character operator depending on whether `second` follows.
    fn one_or_two(&mut self, second: char, single: TokenKind, double: TokenKind) -> Token {
        let start = self.position;
        let first = self.current_char().unwrap_or_default();
        if self.peek_char(1) == Some(second) {
            self.advance();
            self.advance();
            Token::new(double, format!("{}{}", first, second), start)
        } else {
            self.advance();
            Token::new(single, first.to_string(), start)
        }
    }

    /// Emits a two-character operator whose first character is not a token on its own.
    fn exactly_two(
        &mut self,
        second: char,
        kind: TokenKind,
        hint: &str,
    ) -> Result<Token, TokenizeError> {
        let start = self.position;
        let first = self.current_char().unwrap_or_default();
        if self.peek_char(1) == Some(second) {
            self.advance();
            self.advance();
            Ok(Token::new(kind, format!("{}{}", first, second), start))
        } else {
            Err(self.error(
                format!("Unexpected '{}' (did you mean '{}'?)", first, hint),
                start,
            ))
        }
    }

    fn single(&mut self, kind: TokenKind, ch: char) -> Token {
        let token = Token::new(kind, ch.to_string(), self.position);
        self.advance();
        token
    }

    pub fn next_token(&mut self) -> Result<Token, TokenizeError> {
        self.skip_whitespace();

        let start = self.position;
        let token = match self.current_char() {
            None => Token::new(TokenKind::Eof, "", start),
            Some('+') => self.single(TokenKind::Plus, '+'),
            Some('-') => self.single(TokenKind::Minus, '-'),
            Some('*') => self.single(TokenKind::Star, '*'),
            Some('/') => self.single(TokenKind::Slash, '/'),
            Some('%') => self.single(TokenKind::Percent, '%'),
            Some('^') => self.single(TokenKind::Caret, '^'),
            Some('(') => self.single(TokenKind::LParen, '('),
            Some(')') => self.single(TokenKind::RParen, ')'),
            Some('[') => self.single(TokenKind::LBracket, '['),
            Some(']') => self.single(TokenKind::RBracket, ']'),
            Some(',') => self.single(TokenKind::Comma, ','),
            Some('>') => self.one_or_two('=', TokenKind::Gt, TokenKind::GtEq),
            Some('<') => self.one_or_two('=', TokenKind::Lt, TokenKind::LtEq),
            Some('!') => self.one_or_two('=', TokenKind::Bang, TokenKind::NotEq),
            Some('=') => self.exactly_two('=', TokenKind::EqEq, "==")?,
            Some('&') => self.exactly_two('&', TokenKind::AndAnd, "&&")?,
            Some('|') => self.exactly_two('|', TokenKind::OrOr, "||")?,
            Some('"') => {
                let text = self.read_delimited('"', "string")?;
                Token::new(TokenKind::String, text, start)
            }
            Some('`') => {
                let text = self.read_delimited('`', "quoted identifier")?;
                Token::new(TokenKind::QuotedIdentifier, text, start)
            }
            Some(ch) if ch.is_alphabetic() || ch == '_' => {
                let ident = self.read_identifier();
                Token::new(TokenKind::Identifier, ident, start)
            }
            Some(ch) if ch.is_ascii_digit() => {
                let number = self.read_number();
                Token::new(TokenKind::Number, number, start)
            }
            Some(ch) => {
                return Err(self.error(format!("Unexpected character '{}'", ch), start));
            }
        };
        Ok(token)
    }
}

/// Lexes an expression into tokens, always terminated by an `Eof` token.
pub fn tokenize(input: &str) -> Result<Vec<Token>, TokenizeError> {
    let mut lexer = Lexer::new(input);
    let mut tokens = Vec::new();
    loop {
        let token = lexer.next_token()?;
        let done = token.kind == TokenKind::Eof;
        tokens.push(token);
        if done {
            return Ok(tokens);
        }
    }
}

#[test]
fn test_operators_and_positions() {
    let tokens = tokenize("a >= 10 && !b").unwrap();
    let kinds: Vec<TokenKind> = tokens.iter().map(|t| t.kind).collect();
    assert_eq!(
        kinds,
        vec![
            TokenKind::Identifier,
            TokenKind::GtEq,
            TokenKind::Number,
            TokenKind::AndAnd,
            TokenKind::Bang,
            TokenKind::Identifier,
            TokenKind::Eof,
        ]
    );
    let positions: Vec<usize> = tokens.iter().map(|t| t.position).collect();
    assert_eq!(positions, vec![0, 2, 5, 8, 11, 12, 13]);
}

#[test]
fn test_lone_equals_hints() {
    let err = tokenize("a = 1").unwrap_err();
    assert_eq!(err.position, 2);
    assert!(err.message.contains("=="));
}
