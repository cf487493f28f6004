/// The kind of a lexical token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    // Literals
    /// Decimal number
    ///
    /// # Examples
    /// ```text
    /// 42
    /// 3.14
    /// ```
    Number,

    /// String literal enclosed in double quotes
    ///
    /// No escape processing: the text runs up to the next `"`.
    ///
    /// # Examples
    /// ```text
    /// "hello"
    /// "item #1"
    /// ```
    String,

    // Identifiers
    /// Bare identifier: a column name, a function name, or `true`/`false`
    ///
    /// Must start with a letter or underscore, followed by letters, digits, or underscores.
    ///
    /// # Examples
    /// ```text
    /// revenue
    /// unit_price
    /// zscore
    /// ```
    Identifier,

    /// Backtick-quoted column name, passed through verbatim
    ///
    /// # Examples
    /// ```text
    /// `Unit Price`
    /// `margin-%`
    /// ```
    QuotedIdentifier,

    // Arithmetic
    /// Addition or string concatenation
    Plus,
    /// Subtraction or negation
    Minus,
    /// Multiplication
    Star,
    /// Division
    Slash,
    /// Modulo
    Percent,
    /// Exponentiation
    Caret,

    // Comparison
    /// Equality operator
    EqEq,
    /// Inequality operator
    NotEq,
    /// Greater than
    Gt,
    /// Greater than or equal
    GtEq,
    /// Less than
    Lt,
    /// Less than or equal
    LtEq,

    // Logical
    /// Logical AND (`&&`)
    AndAnd,
    /// Logical OR (`||`)
    OrOr,
    /// Logical NOT (`!`)
    Bang,

    // Delimiters
    /// Left parenthesis for grouping or function calls
    LParen,
    /// Right parenthesis
    RParen,
    /// Left bracket for array literals
    LBracket,
    /// Right bracket
    RBracket,
    /// Comma for separating arguments or array elements
    Comma,

    /// End of input
    Eof,
}

/// A token produced by the lexer.
///
/// `text` is the token's payload: the digits of a number, the contents of a
/// string (without quotes), the name of an identifier (without backticks), or
/// the operator spelling. `position` is the character offset of the token's
/// first character in the source expression.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub position: usize,
}

impl Token {
    pub fn new(kind: TokenKind, text: impl Into<String>, position: usize) -> Self {
        Token {
            kind,
            text: text.into(),
            position,
        }
    }

    /// How the token reads in an error message.
    pub fn describe(&self) -> String {
        match self.kind {
            TokenKind::Eof => "end of input".to_string(),
            TokenKind::String => format!("string \"{}\"", self.text),
            TokenKind::QuotedIdentifier => format!("`{}`", self.text),
            _ => format!("'{}'", self.text),
        }
    }
}
