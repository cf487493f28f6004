use std::{
    cell::RefCell,
    collections::HashMap,
    rc::Rc,
};

use thiserror::Error;

use crate::{
    ast::{BinOp, Expr, UnaryOp},
    filter::{RowFilter, matches_all},
    functions::{Arg, FunctionKind, FunctionRegistry, NullPolicy, PartitionFn, RowFunction},
    profile::ColumnStats,
    value::{Row, Value},
};

/// Errors that can occur during expression evaluation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalError {
    /// Operator applied to values it has no rule for
    #[error("Type mismatch: {0}")]
    TypeMismatch(String),

    /// Call to a name the registry does not know
    #[error("Unknown function '{0}'")]
    UnknownFunction(String),

    /// Wrong number of arguments
    #[error("Function '{name}' expects {expected} argument(s), got {got}")]
    Arity {
        name: String,
        expected: String,
        got: usize,
    },

    /// Argument of the wrong type or out of the function's domain
    #[error("Invalid argument to '{function}': {message}")]
    InvalidArgument { function: String, message: String },

    /// Array literal anywhere other than directly as a function argument
    #[error("Array literals are only allowed as function arguments")]
    UnexpectedList,

    /// Partition evaluation asked for a row the partition does not have
    #[error("Row {index} is outside a partition of {len} rows")]
    RowOutOfRange { index: usize, len: usize },
}

/// The rows visible to partition functions, plus per-call results already computed.
pub struct PartitionFrame<'a> {
    rows: Vec<&'a Row>,
    /// Keyed by call node address; the AST outlives the frame and is never mutated.
    cache: RefCell<HashMap<*const Expr, Rc<Vec<Value>>>>,
}

impl<'a> PartitionFrame<'a> {
    pub fn new(rows: Vec<&'a Row>) -> Self {
        PartitionFrame {
            rows,
            cache: RefCell::new(HashMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Evaluation context: the current row and the partition it belongs to.
#[derive(Clone, Copy)]
pub struct EvalContext<'a> {
    pub row: &'a Row,
    pub frame: &'a PartitionFrame<'a>,
    /// Position of `row` within `frame`
    pub index: usize,
}

/// Options for evaluating an expression across a whole table.
#[derive(Debug, Clone, Copy, Default)]
pub struct ColumnOptions<'a> {
    /// Partition-aware functions only see rows sharing this column's value.
    pub partition_by: Option<&'a str>,
    /// Rows failing any predicate get null and are left out of partitions.
    pub filter: &'a [RowFilter],
}

/// Values of a computed column aligned to table row order, with its profile.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnOutput {
    pub values: Vec<Value>,
    pub stats: ColumnStats,
}

/// The expression evaluator.
///
/// Walks the AST row by row. Holds only a reference to an immutable function
/// registry, so one evaluator can be shared by any number of evaluations.
#[derive(Clone, Copy)]
pub struct Evaluator<'r> {
    registry: &'r FunctionRegistry,
}

impl<'r> Evaluator<'r> {
    pub fn new(registry: &'r FunctionRegistry) -> Self {
        Evaluator { registry }
    }

    pub fn registry(&self) -> &'r FunctionRegistry {
        self.registry
    }

    /// Evaluates an expression against a single row.
    ///
    /// Partition functions see a partition made of this row alone.
    ///
    /// # Examples
    ///
    /// ```
    /// use dolex_transform::{Evaluator, FunctionRegistry, Row, Value, parse};
    ///
    /// let registry = FunctionRegistry::builtin();
    /// let evaluator = Evaluator::new(&registry);
    ///
    /// let mut row = Row::new();
    /// row.insert("price".to_string(), Value::Number(10.0));
    ///
    /// let expr = parse("price * 2").unwrap();
    /// assert_eq!(evaluator.evaluate(&expr, &row).unwrap(), Value::Number(20.0));
    /// ```
    pub fn evaluate(&self, expr: &Expr, row: &Row) -> Result<Value, EvalError> {
        let frame = PartitionFrame::new(vec![row]);
        let ctx = EvalContext {
            row,
            frame: &frame,
            index: 0,
        };
        self.eval_expr(expr, &ctx)
    }

    /// Evaluates an expression for `rows[index]`, with `rows` as its partition.
    pub fn evaluate_in_partition(
        &self,
        expr: &Expr,
        rows: &[&Row],
        index: usize,
    ) -> Result<Value, EvalError> {
        let row = *rows.get(index).ok_or(EvalError::RowOutOfRange {
            index,
            len: rows.len(),
        })?;
        let frame = PartitionFrame::new(rows.to_vec());
        let ctx = EvalContext {
            row,
            frame: &frame,
            index,
        };
        self.eval_expr(expr, &ctx)
    }

    /// Evaluates an expression for every row of a table.
    ///
    /// Returns one value per row in table order together with the column's
    /// summary statistics. Rows excluded by `options.filter` get null.
    pub fn evaluate_column(
        &self,
        expr: &Expr,
        rows: &[Row],
        options: ColumnOptions<'_>,
    ) -> Result<ColumnOutput, EvalError> {
        let mut values = vec![Value::Null; rows.len()];

        for group in partition_rows(rows, options) {
            let frame = PartitionFrame::new(group.iter().map(|&i| &rows[i]).collect());
            for (position, &row_index) in group.iter().enumerate() {
                let ctx = EvalContext {
                    row: &rows[row_index],
                    frame: &frame,
                    index: position,
                };
                values[row_index] = self.eval_expr(expr, &ctx)?;
            }
        }

        let stats = ColumnStats::from_values(&values);
        Ok(ColumnOutput { values, stats })
    }

    pub fn eval_expr(&self, expr: &Expr, ctx: &EvalContext<'_>) -> Result<Value, EvalError> {
        match expr {
            Expr::Number(n) => Ok(Value::Number(*n)),
            Expr::String(s) => Ok(Value::String(s.clone())),
            Expr::Boolean(b) => Ok(Value::Boolean(*b)),
            Expr::Column(name) => Ok(ctx.row.get(name).cloned().unwrap_or(Value::Null)),
            Expr::UnaryOp { op, operand } => {
                let value = self.eval_expr(operand, ctx)?;
                apply_unary(*op, &value)
            }
            Expr::BinaryOp { op, left, right } => {
                let left_val = self.eval_expr(left, ctx)?;
                let right_val = self.eval_expr(right, ctx)?;
                apply_binop(*op, &left_val, &right_val)
            }
            Expr::Call { name, args } => {
                let function = self
                    .registry
                    .get(name)
                    .ok_or_else(|| EvalError::UnknownFunction(name.clone()))?;
                function.check_arity(args.len())?;

                match function.kind {
                    FunctionKind::Scalar(f) => {
                        let evaluated = self.eval_args(args, ctx)?;
                        if function.null_policy == NullPolicy::Propagate
                            && evaluated.iter().any(Arg::is_null)
                        {
                            return Ok(Value::Null);
                        }
                        f(&evaluated)
                    }
                    FunctionKind::Partition(f) => {
                        let results = self.partition_results(expr, function, f, args, ctx)?;
                        Ok(results.get(ctx.index).cloned().unwrap_or(Value::Null))
                    }
                }
            }
            Expr::Array(_) => Err(EvalError::UnexpectedList),
        }
    }

    fn eval_args(&self, args: &[Expr], ctx: &EvalContext<'_>) -> Result<Vec<Arg>, EvalError> {
        args.iter()
            .map(|arg| match arg {
                Expr::Array(elements) => elements
                    .iter()
                    .map(|e| self.eval_expr(e, ctx))
                    .collect::<Result<Vec<_>, _>>()
                    .map(Arg::List),
                other => self.eval_expr(other, ctx).map(Arg::Scalar),
            })
            .collect()
    }

    /// Results of a partition call for every row of the frame, computed once per frame.
    fn partition_results(
        &self,
        call: &Expr,
        function: &RowFunction,
        f: PartitionFn,
        args: &[Expr],
        ctx: &EvalContext<'_>,
    ) -> Result<Rc<Vec<Value>>, EvalError> {
        let frame = ctx.frame;
        let key = call as *const Expr;

        // The borrow must end before evaluating arguments, which may fill the cache
        let cached = frame.cache.borrow().get(&key).cloned();
        if let Some(results) = cached {
            return Ok(results);
        }

        let mut columns = Vec::with_capacity(args.len());
        for arg in args {
            let mut column = Vec::with_capacity(frame.len());
            for (index, row) in frame.rows.iter().enumerate() {
                let row_ctx = EvalContext {
                    row: *row,
                    frame,
                    index,
                };
                column.push(self.eval_expr(arg, &row_ctx)?);
            }
            columns.push(column);
        }

        let results = f(&columns)?;
        if results.len() != frame.len() {
            return Err(EvalError::InvalidArgument {
                function: function.name.to_string(),
                message: format!(
                    "returned {} values for a partition of {} rows",
                    results.len(),
                    frame.len()
                ),
            });
        }

        let results = Rc::new(results);
        frame.cache.borrow_mut().insert(key, Rc::clone(&results));
        Ok(results)
    }
}

/// Row indices of every partition, in order of first appearance.
fn partition_rows(rows: &[Row], options: ColumnOptions<'_>) -> Vec<Vec<usize>> {
    let mut groups: Vec<Vec<usize>> = Vec::new();
    let mut by_key: HashMap<(&'static str, String), usize> = HashMap::new();

    for (i, row) in rows.iter().enumerate() {
        if !matches_all(options.filter, row) {
            continue;
        }
        let key = match options.partition_by {
            Some(column) => {
                let value = row.get(column).unwrap_or(&Value::Null);
                (value.type_name(), value.to_string())
            }
            None => ("", String::new()),
        };
        let slot = *by_key.entry(key).or_insert_with(|| {
            groups.push(Vec::new());
            groups.len() - 1
        });
        groups[slot].push(i);
    }
    groups
}

fn type_mismatch(op: impl std::fmt::Display, left: &Value, right: &Value) -> EvalError {
    EvalError::TypeMismatch(format!(
        "Cannot apply '{}' to {} and {}",
        op,
        left.type_name(),
        right.type_name()
    ))
}

fn apply_unary(op: UnaryOp, value: &Value) -> Result<Value, EvalError> {
    match (op, value) {
        (_, Value::Null) => Ok(Value::Null),
        (UnaryOp::Negate, Value::Number(n)) => Ok(Value::Number(-n)),
        (UnaryOp::Not, Value::Boolean(b)) => Ok(Value::Boolean(!b)),
        (op, v) => Err(EvalError::TypeMismatch(format!(
            "Cannot apply '{}' to {}",
            op,
            v.type_name()
        ))),
    }
}

/// Applies a binary operator to two evaluated operands.
///
/// Null propagates through every operator except `==`, where two nulls are
/// equal and null is unequal to any other value.
pub fn apply_binop(op: BinOp, left: &Value, right: &Value) -> Result<Value, EvalError> {
    if op == BinOp::Equal {
        return Ok(Value::Boolean(left == right));
    }
    if left.is_null() || right.is_null() {
        return Ok(Value::Null);
    }

    match op {
        BinOp::Add => match (left, right) {
            (Value::Number(a), Value::Number(b)) => Ok(Value::finite(a + b)),
            (Value::String(a), Value::String(b)) => Ok(Value::String(format!("{}{}", a, b))),
            (a, b) => Err(type_mismatch(op, a, b)),
        },
        BinOp::Subtract | BinOp::Multiply | BinOp::Divide | BinOp::Modulo | BinOp::Power => {
            let (Value::Number(a), Value::Number(b)) = (left, right) else {
                return Err(type_mismatch(op, left, right));
            };
            let result = match op {
                BinOp::Subtract => a - b,
                BinOp::Multiply => a * b,
                BinOp::Divide if *b == 0.0 => return Ok(Value::Null),
                BinOp::Divide => a / b,
                BinOp::Modulo if *b == 0.0 => return Ok(Value::Null),
                BinOp::Modulo => a % b,
                _ => a.powf(*b),
            };
            Ok(Value::finite(result))
        }
        BinOp::NotEqual => Ok(Value::Boolean(left != right)),
        BinOp::LessThan | BinOp::GreaterThan | BinOp::LessEqual | BinOp::GreaterEqual => {
            let ordering = match (left, right) {
                (Value::Number(_), Value::Number(_)) | (Value::String(_), Value::String(_)) => {
                    left.partial_cmp_same_type(right)
                }
                _ => return Err(type_mismatch(op, left, right)),
            };
            let Some(ordering) = ordering else {
                return Ok(Value::Null);
            };
            Ok(Value::Boolean(match op {
                BinOp::LessThan => ordering.is_lt(),
                BinOp::GreaterThan => ordering.is_gt(),
                BinOp::LessEqual => ordering.is_le(),
                _ => ordering.is_ge(),
            }))
        }
        BinOp::And | BinOp::Or => match (left, right) {
            (Value::Boolean(a), Value::Boolean(b)) => Ok(Value::Boolean(if op == BinOp::And {
                *a && *b
            } else {
                *a || *b
            })),
            (a, b) => Err(type_mismatch(op, a, b)),
        },
        BinOp::Equal => unreachable!("equality handled before null propagation"),
    }
}
