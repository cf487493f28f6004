//! Check and evaluate expressions against JSON rows

use serde_json::json;

use super::{CliError, rows_from_json};
use crate::{
    ColumnOptions, Evaluator, FunctionRegistry, extract_column_refs, parse,
    value::to_json,
};

/// Options for the check and eval commands
#[derive(Debug, Clone, Default)]
pub struct CheckOptions {
    /// The expression to check
    pub expr: String,
    /// JSON input: one row object or an array of them
    pub input: Option<String>,
    /// Partition column for partition functions
    pub partition_by: Option<String>,
    /// Only validate syntax, don't evaluate
    pub syntax_only: bool,
}

/// Result of a check operation
#[derive(Debug)]
pub enum CheckResult {
    /// Syntax validation passed; the referenced columns, sorted
    SyntaxValid(Vec<String>),
    /// Expression evaluated successfully with JSON output
    Success(serde_json::Value),
}

/// Execute a check or eval operation
///
/// A single row object evaluates to one value; an array of rows evaluates as
/// a column and reports its values together with summary statistics.
pub fn execute_check(options: &CheckOptions) -> Result<CheckResult, CliError> {
    let expr = parse(&options.expr)?;

    if options.syntax_only {
        return Ok(CheckResult::SyntaxValid(
            extract_column_refs(&expr).into_iter().collect(),
        ));
    }

    let json_str = options.input.as_ref().ok_or(CliError::NoInput)?;
    let json_value: serde_json::Value = serde_json::from_str(json_str)?;
    let single = json_value.is_object();
    let rows = rows_from_json(json_value)?;

    let registry = FunctionRegistry::builtin();
    let evaluator = Evaluator::new(&registry);

    if single && options.partition_by.is_none() {
        let row = rows.first().ok_or(CliError::InvalidInput)?;
        let value = evaluator.evaluate(&expr, row)?;
        return Ok(CheckResult::Success(to_json(&value)));
    }

    let column_options = ColumnOptions {
        partition_by: options.partition_by.as_deref(),
        ..Default::default()
    };
    let output = evaluator.evaluate_column(&expr, &rows, column_options)?;
    Ok(CheckResult::Success(json!({
        "values": output.values.iter().map(to_json).collect::<Vec<_>>(),
        "stats": serde_json::to_value(&output.stats)?,
    })))
}
