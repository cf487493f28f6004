//! Error taxonomy for mutation requests.
//!
//! Each stage has its own error type; [`TransformError`] is what the engine
//! returns and converts from all of them.

use thiserror::Error;

use crate::{
    dependency::DependencyError, evaluator::EvalError, lexer::TokenizeError,
    manifest::ManifestError, metadata::Layer, parser::ParseError, storage::StorageError,
    value::ColumnType,
};

/// A request that is malformed or conflicts with the current column state.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("Invalid column name '{0}': use letters, digits and underscores, no leading digit")]
    InvalidColumnName(String),

    #[error("Request must use either single-column fields or 'transforms', not both")]
    ConflictingModes,

    #[error("Request has no transform: provide 'create' and 'expr', or 'transforms'")]
    EmptyRequest,

    #[error("Column '{0}' is a source column and cannot be overwritten or dropped")]
    SourceColumn(String),

    #[error("No {layer} column '{column}' in table '{table}'")]
    NotFound {
        table: String,
        column: String,
        layer: Layer,
    },

    #[error("Column '{column}' declared as {declared} but its values are not {declared}")]
    TypeMismatch { column: String, declared: ColumnType },

    #[error("Cannot {action} columns in the {layer} layer")]
    InvalidLayer { action: &'static str, layer: Layer },

    #[error("Column '{0}' appears more than once in the same request")]
    DuplicateColumn(String),

    #[error("Table '{0}' does not exist")]
    UnknownTable(String),
}

/// Any failure of a transform-layer operation.
#[derive(Debug, Error)]
pub enum TransformError {
    #[error(transparent)]
    Tokenize(#[from] TokenizeError),

    #[error("{0}")]
    Parse(#[from] ParseError),

    #[error("Evaluation error in '{column}': {source}")]
    Eval {
        column: String,
        #[source]
        source: EvalError,
    },

    #[error(transparent)]
    Dependency(#[from] DependencyError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Manifest(#[from] ManifestError),
}

impl TransformError {
    pub fn eval(column: impl Into<String>, source: EvalError) -> Self {
        TransformError::Eval {
            column: column.into(),
            source,
        }
    }
}

pub type Result<T, E = TransformError> = std::result::Result<T, E>;
