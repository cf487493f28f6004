pub mod ast;
pub mod dependency;
pub mod engine;
pub mod error;
pub mod evaluator;
pub mod filter;
pub mod functions;
pub mod lexer;
pub mod manifest;
pub mod metadata;
pub mod parser;
pub mod profile;
pub mod storage;
pub mod value;

#[cfg(feature = "cli")]
pub mod cli;

pub use ast::{BinOp, Expr, Token, TokenKind, UnaryOp};
pub use dependency::{DependencyError, extract_column_refs, find_dependents, topological_sort};
pub use engine::{
    ColumnSelector, EngineConfig, TransformEngine, TransformRequest, TransformSpec,
};
pub use error::{TransformError, ValidationError};
pub use evaluator::{ColumnOptions, ColumnOutput, EvalContext, EvalError, Evaluator};
pub use filter::{FilterOp, RowFilter};
pub use functions::{Arg, FunctionRegistry, NullPolicy, RowFunction};
pub use lexer::{Lexer, TokenizeError, tokenize};
pub use manifest::{ManifestData, ManifestEntry, ReplayReport};
pub use metadata::{Layer, TransformMetadataStore, TransformRecord};
pub use parser::{ParseError, Parser, parse};
pub use profile::ColumnStats;
pub use storage::{DatasetConfig, MemoryStore, StorageError, TableStore};
pub use value::{ColumnType, Row, Value};
