use std::fmt;

use crate::{
    ast::{BinOp, Expr, Token, TokenKind, UnaryOp},
    lexer::{TokenizeError, tokenize},
};

/// Syntax error with the offending position and the source it came from.
///
/// Displays as the message followed by the source line and a caret under the
/// offending character:
///
/// ```text
/// Unexpected ')' at position 4
///   a + )
///       ^
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub message: String,
    pub position: usize,
    pub source_text: String,
}

impl ParseError {
    fn new(message: impl Into<String>, position: usize, source_text: &str) -> Self {
        ParseError {
            message: message.into(),
            position,
            source_text: source_text.to_string(),
        }
    }

    fn from_tokenize(err: TokenizeError, source_text: &str) -> Self {
        ParseError::new(err.message, err.position, source_text)
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let line: String = self
            .source_text
            .chars()
            .map(|c| if c == '\n' || c == '\r' { ' ' } else { c })
            .collect();
        write!(
            f,
            "{} at position {}\n  {}\n  {}^",
            self.message,
            self.position,
            line,
            " ".repeat(self.position)
        )
    }
}

impl std::error::Error for ParseError {}

pub struct Parser<'a> {
    source: &'a str,
    tokens: Vec<Token>,
    index: usize,
}

impl<'a> Parser<'a> {
    pub fn new(source: &'a str) -> Result<Self, ParseError> {
        let tokens = tokenize(source).map_err(|e| ParseError::from_tokenize(e, source))?;
        Ok(Parser {
            source,
            tokens,
            index: 0,
        })
    }

    fn current(&self) -> &Token {
        // tokenize always ends with Eof and we never advance past it
        &self.tokens[self.index.min(self.tokens.len() - 1)]
    }

    fn peek_kind(&self, offset: usize) -> TokenKind {
        self.tokens
            .get(self.index + offset)
            .map(|t| t.kind)
            .unwrap_or(TokenKind::Eof)
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.current().kind == kind
    }

    fn advance(&mut self) -> Token {
        let token = self.current().clone();
        if token.kind != TokenKind::Eof {
            self.index += 1;
        }
        token
    }

    fn error_at_current(&self, message: impl Into<String>) -> ParseError {
        ParseError::new(message, self.current().position, self.source)
    }

    fn expect(&mut self, expected: TokenKind, spelling: &str) -> Result<Token, ParseError> {
        if !self.check(expected) {
            return Err(self.error_at_current(format!(
                "Expected '{}', got {}",
                spelling,
                self.current().describe()
            )));
        }
        Ok(self.advance())
    }

    /// Parses a complete expression; trailing input is an error.
    pub fn parse(&mut self) -> Result<Expr, ParseError> {
        let expr = self.parse_expression()?;
        if !self.check(TokenKind::Eof) {
            return Err(self.error_at_current(format!(
                "Unexpected {} after end of expression",
                self.current().describe()
            )));
        }
        Ok(expr)
    }

    pub fn parse_expression(&mut self) -> Result<Expr, ParseError> {
        self.parse_logic()
    }

    fn parse_logic(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_comparison()?;

        loop {
            let op = match self.current().kind {
                TokenKind::AndAnd => BinOp::And,
                TokenKind::OrOr => BinOp::Or,
                _ => break,
            };

            self.advance();
            let right = self.parse_comparison()?;
            left = Expr::binary(op, left, right);
        }
        Ok(left)
    }

    fn parse_comparison(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_additive()?;

        loop {
            let op = match self.current().kind {
                TokenKind::EqEq => BinOp::Equal,
                TokenKind::NotEq => BinOp::NotEqual,
                TokenKind::Lt => BinOp::LessThan,
                TokenKind::Gt => BinOp::GreaterThan,
                TokenKind::LtEq => BinOp::LessEqual,
                TokenKind::GtEq => BinOp::GreaterEqual,
                _ => break,
            };

            self.advance();
            let right = self.parse_additive()?;
            left = Expr::binary(op, left, right);
        }
        Ok(left)
    }

    fn parse_additive(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_multiplicative()?;

        loop {
            let op = match self.current().kind {
                TokenKind::Plus => BinOp::Add,
                TokenKind::Minus => BinOp::Subtract,
                _ => break,
            };

            self.advance();
            let right = self.parse_multiplicative()?;
            left = Expr::binary(op, left, right);
        }
        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_power()?;

        loop {
            let op = match self.current().kind {
                TokenKind::Star => BinOp::Multiply,
                TokenKind::Slash => BinOp::Divide,
                TokenKind::Percent => BinOp::Modulo,
                _ => break,
            };

            self.advance();
            let right = self.parse_power()?;
            left = Expr::binary(op, left, right);
        }
        Ok(left)
    }

    fn parse_power(&mut self) -> Result<Expr, ParseError> {
        let base = self.parse_unary()?;

        if self.check(TokenKind::Caret) {
            self.advance();
            // Right-associative: 2 ^ 3 ^ 2 == 2 ^ (3 ^ 2)
            let exponent = self.parse_power()?;
            return Ok(Expr::binary(BinOp::Power, base, exponent));
        }
        Ok(base)
    }

    fn parse_unary(&mut self) -> Result<Expr, ParseError> {
        let op = match self.current().kind {
            TokenKind::Minus => UnaryOp::Negate,
            TokenKind::Bang => UnaryOp::Not,
            _ => return self.parse_call(),
        };

        self.advance();
        let operand = self.parse_unary()?;
        Ok(Expr::unary(op, operand))
    }

    fn parse_call(&mut self) -> Result<Expr, ParseError> {
        if self.check(TokenKind::Identifier) && self.peek_kind(1) == TokenKind::LParen {
            let name = self.advance().text;
            self.advance(); // Consume '('
            let args = self.parse_list(TokenKind::RParen, ")")?;
            return Ok(Expr::Call { name, args });
        }
        self.parse_primary()
    }

    /// Comma-separated expressions up to and including `close`.
    fn parse_list(&mut self, close: TokenKind, spelling: &str) -> Result<Vec<Expr>, ParseError> {
        let mut items = vec![];

        if self.check(close) {
            self.advance();
            return Ok(items);
        }

        loop {
            items.push(self.parse_expression()?);

            if self.check(TokenKind::Comma) {
                self.advance();
                continue;
            }
            self.expect(close, spelling)?;
            return Ok(items);
        }
    }

    /// Parse primary expressions (atoms): literals, column references, '(' expr ')', '[' ... ']'
    fn parse_primary(&mut self) -> Result<Expr, ParseError> {
        let token = self.current().clone();

        match token.kind {
            TokenKind::Number => {
                self.advance();
                let value = token.text.parse::<f64>().map_err(|_| {
                    ParseError::new(
                        format!("Invalid number '{}'", token.text),
                        token.position,
                        self.source,
                    )
                })?;
                Ok(Expr::Number(value))
            }
            TokenKind::String => {
                self.advance();
                Ok(Expr::String(token.text))
            }
            TokenKind::Identifier => {
                self.advance();
                Ok(match token.text.as_str() {
                    "true" => Expr::Boolean(true),
                    "false" => Expr::Boolean(false),
                    _ => Expr::Column(token.text),
                })
            }
            TokenKind::QuotedIdentifier => {
                self.advance();
                Ok(Expr::Column(token.text))
            }
            TokenKind::LParen => {
                self.advance();
                let expr = self.parse_expression()?;
                self.expect(TokenKind::RParen, ")")?;
                Ok(expr)
            }
            TokenKind::LBracket => {
                self.advance();
                let elements = self.parse_list(TokenKind::RBracket, "]")?;
                Ok(Expr::Array(elements))
            }
            TokenKind::Eof => Err(self.error_at_current("Unexpected end of input")),
            _ => Err(self.error_at_current(format!("Unexpected {}", token.describe()))),
        }
    }
}

/// Parses an expression string into an AST. Pure: never touches data.
pub fn parse(input: &str) -> Result<Expr, ParseError> {
    Parser::new(input)?.parse()
}
