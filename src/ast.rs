//! # Dolex Formula Language - Abstract Syntax Tree
//!
//! This module defines the Abstract Syntax Tree (AST) for the formula language
//! used to define computed columns over a table. A formula is evaluated once per
//! row and produces one value per row.
//!
//! ## Architecture Overview
//!
//! - **[tokens]** - Lexical tokens produced by the lexer
//! - **[expressions]** - Expression nodes (literals, column references, operations, calls)
//! - **[operators]** - Binary and prefix operators
//!
//! ## Quick Start
//!
//! ```text
//! if_else(region == "north", revenue * 1.1, revenue)
//! ```
//!
//! ## Core Concepts
//!
//! ### Column References
//!
//! A bare identifier names a column of the current row. Column names containing
//! spaces or operator characters are written in backticks:
//!
//! ```text
//! `Unit Price` * quantity
//! ```
//!
//! A reference to a column the row does not have evaluates to null.
//!
//! ### Precedence
//!
//! From loosest to tightest:
//!
//! | Level    | Operators               | Associativity |
//! |----------|-------------------------|---------------|
//! | logic    | `&&` `\|\|`             | left          |
//! | compare  | `>` `>=` `<` `<=` `==` `!=` | left      |
//! | add      | `+` `-`                 | left          |
//! | multiply | `*` `/` `%`             | left          |
//! | power    | `^`                     | right         |
//! | unary    | `-` `!`                 | prefix        |
//!
//! ### Partition Functions
//!
//! Functions such as `zscore`, `rank` and `mean` look at every row of the
//! current partition rather than only the current row:
//!
//! ```text
//! zscore(revenue)          // relative to the whole table
//! ```
//!
//! With a `partitionBy` column the same formula is computed per group.
pub mod expressions;
pub mod operators;
pub mod tokens;

pub use expressions::Expr;
pub use operators::{BinOp, UnaryOp};
pub use tokens::{Token, TokenKind};
