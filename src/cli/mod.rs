//! CLI support for dolex
//!
//! Each command is a plain function returning JSON, so the binary only
//! handles argument parsing and printing.

mod check;
mod convert;
mod dataset;

pub use check::{CheckOptions, CheckResult, execute_check};
pub use convert::{rows_from_json, rows_to_json};
pub use dataset::{
    DeriveOptions, DropOptions, derive_column, drop_column, list_columns, replay_dataset,
};

use std::io;

use thiserror::Error;

/// Errors that can occur during CLI operations
#[derive(Debug, Error)]
pub enum CliError {
    #[error("Parse error: {0}")]
    Parse(#[from] crate::ParseError),

    #[error("Evaluation error: {0}")]
    Eval(#[from] crate::EvalError),

    #[error("{0}")]
    Transform(#[from] crate::TransformError),

    #[error("{0}")]
    Storage(#[from] crate::StorageError),

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Input JSON is neither a row object nor an array of them
    #[error("Input must be a JSON object or an array of objects")]
    InvalidInput,

    #[error("No input provided. Use --input or pipe JSON to stdin.")]
    NoInput,
}
