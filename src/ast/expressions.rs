use crate::ast::{BinOp, UnaryOp};

/// Abstract Syntax Tree node representing a parsed expression.
///
/// The AST is a tree: every child is owned by exactly one parent through a
/// `Box` or `Vec`, and nodes are never mutated after parsing.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    // Literals
    /// Literal number (all numbers are 64-bit floats)
    ///
    /// # Example
    /// ```text
    /// 42
    /// 0.5
    /// ```
    Number(f64),

    /// String literal
    ///
    /// # Example
    /// ```text
    /// "north"
    /// ```
    String(String),

    /// Boolean literal (`true` / `false`)
    Boolean(bool),

    // References
    /// Column reference, bare or backtick-quoted
    ///
    /// # Examples
    /// ```text
    /// revenue
    /// `Unit Price`
    /// ```
    Column(String),

    // Operations
    /// Binary operation
    ///
    /// # Examples
    /// ```text
    /// price * quantity
    /// region == "north" && revenue > 100
    /// ```
    BinaryOp {
        op: BinOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },

    /// Prefix operation
    ///
    /// # Examples
    /// ```text
    /// -delta
    /// !is_null(score)
    /// ```
    UnaryOp { op: UnaryOp, operand: Box<Expr> },

    /// Function call resolved against the function registry at evaluation time
    ///
    /// # Examples
    /// ```text
    /// round(price * 1.2, 2)
    /// zscore(revenue)
    /// ```
    Call { name: String, args: Vec<Expr> },

    /// Array literal, only meaningful as a direct function argument
    ///
    /// # Example
    /// ```text
    /// in(region, ["north", "east"])
    /// ```
    Array(Vec<Expr>),
}

impl Expr {
    pub fn binary(op: BinOp, left: Expr, right: Expr) -> Self {
        Expr::BinaryOp {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn unary(op: UnaryOp, operand: Expr) -> Self {
        Expr::UnaryOp {
            op,
            operand: Box::new(operand),
        }
    }

    pub fn column(name: impl Into<String>) -> Self {
        Expr::Column(name.into())
    }
}
