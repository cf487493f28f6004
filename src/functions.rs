//! Built-in row and partition functions.
//!
//! A [`FunctionRegistry`] is an immutable value: build it once with
//! [`FunctionRegistry::builtin`] and hand the evaluator a reference. There is
//! no process-wide function table.
//!
//! Every function declares its [`NullPolicy`]. For `Propagate` functions the
//! evaluator returns null as soon as any scalar argument is null, so their
//! implementations never see a null. `Custom` functions receive nulls and the
//! doc line of each one says what it does with them.

use std::collections::HashMap;

use chrono::{Datelike, NaiveDate};
use regex::Regex;
use rust_decimal::{
    Decimal, RoundingStrategy,
    prelude::{FromPrimitive, ToPrimitive},
};

use crate::{
    evaluator::EvalError,
    value::{Value, parse_date},
};

/// An evaluated function argument.
///
/// Lists only come from an array literal written directly in the argument position.
#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    Scalar(Value),
    List(Vec<Value>),
}

impl Arg {
    pub fn is_null(&self) -> bool {
        matches!(self, Arg::Scalar(Value::Null))
    }
}

/// Computes one row's result from its evaluated arguments.
pub type ScalarFn = fn(&[Arg]) -> Result<Value, EvalError>;

/// Computes every row of a partition at once.
///
/// `args[i][r]` is argument `i` evaluated on row `r` of the partition; the
/// result must have one value per row.
pub type PartitionFn = fn(&[Vec<Value>]) -> Result<Vec<Value>, EvalError>;

#[derive(Debug, Clone, Copy)]
pub enum FunctionKind {
    Scalar(ScalarFn),
    Partition(PartitionFn),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NullPolicy {
    /// Any null scalar argument makes the result null.
    Propagate,
    /// The function inspects nulls itself.
    Custom,
}

#[derive(Debug, Clone)]
pub struct RowFunction {
    pub name: &'static str,
    pub min_args: usize,
    /// `None` for variadic functions
    pub max_args: Option<usize>,
    pub null_policy: NullPolicy,
    pub kind: FunctionKind,
    pub summary: &'static str,
}

impl RowFunction {
    pub fn scalar(
        name: &'static str,
        min_args: usize,
        max_args: Option<usize>,
        null_policy: NullPolicy,
        function: ScalarFn,
    ) -> Self {
        RowFunction {
            name,
            min_args,
            max_args,
            null_policy,
            kind: FunctionKind::Scalar(function),
            summary: "",
        }
    }

    /// A one-argument function over the whole partition; sees nulls.
    pub fn partition(name: &'static str, function: PartitionFn) -> Self {
        RowFunction {
            name,
            min_args: 1,
            max_args: Some(1),
            null_policy: NullPolicy::Custom,
            kind: FunctionKind::Partition(function),
            summary: "",
        }
    }

    pub fn summary(mut self, summary: &'static str) -> Self {
        self.summary = summary;
        self
    }

    pub fn is_partition(&self) -> bool {
        matches!(self.kind, FunctionKind::Partition(_))
    }

    pub fn check_arity(&self, got: usize) -> Result<(), EvalError> {
        let too_few = got < self.min_args;
        let too_many = self.max_args.is_some_and(|max| got > max);
        if !too_few && !too_many {
            return Ok(());
        }
        let expected = match self.max_args {
            Some(max) if max == self.min_args => max.to_string(),
            Some(max) => format!("{} to {}", self.min_args, max),
            None => format!("at least {}", self.min_args),
        };
        Err(EvalError::Arity {
            name: self.name.to_string(),
            expected,
            got,
        })
    }
}

/// Named registry of row functions, looked up case-insensitively.
#[derive(Debug, Clone, Default)]
pub struct FunctionRegistry {
    functions: HashMap<String, RowFunction>,
}

impl FunctionRegistry {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Adds or replaces a function. Intended for building a registry before it is shared.
    pub fn with(mut self, function: RowFunction) -> Self {
        self.functions
            .insert(function.name.to_ascii_lowercase(), function);
        self
    }

    pub fn get(&self, name: &str) -> Option<&RowFunction> {
        self.functions.get(&name.to_ascii_lowercase())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// All functions, sorted by name.
    pub fn functions(&self) -> Vec<&RowFunction> {
        let mut all: Vec<&RowFunction> = self.functions.values().collect();
        all.sort_by_key(|f| f.name);
        all
    }

    pub fn builtin() -> Self {
        use NullPolicy::{Custom, Propagate};

        let functions = vec![
            RowFunction::scalar("if_else", 3, Some(3), Custom, if_else)
                .summary("if_else(cond, a, b): a when cond is true, b when false or null"),
            RowFunction::scalar("coalesce", 1, None, Custom, coalesce)
                .summary("coalesce(a, ...): first non-null argument, null if all are null"),
            RowFunction::scalar("is_null", 1, Some(1), Custom, is_null)
                .summary("is_null(x): true when x is null, never null itself"),
            RowFunction::scalar("in", 2, Some(2), Custom, in_list)
                .summary("in(x, [..]): whether x equals a list element; null when x is null"),
            RowFunction::scalar("abs", 1, Some(1), Propagate, abs).summary("abs(x)"),
            RowFunction::scalar("floor", 1, Some(1), Propagate, floor).summary("floor(x)"),
            RowFunction::scalar("ceil", 1, Some(1), Propagate, ceil).summary("ceil(x)"),
            RowFunction::scalar("round", 1, Some(2), Propagate, round)
                .summary("round(x[, digits]): half away from zero, decimal exact"),
            RowFunction::scalar("sqrt", 1, Some(1), Propagate, sqrt)
                .summary("sqrt(x): null for negative x"),
            RowFunction::scalar("ln", 1, Some(1), Propagate, ln).summary("ln(x): null for x <= 0"),
            RowFunction::scalar("log10", 1, Some(1), Propagate, log10)
                .summary("log10(x): null for x <= 0"),
            RowFunction::scalar("exp", 1, Some(1), Propagate, exp).summary("exp(x)"),
            RowFunction::scalar("least", 1, None, Propagate, least)
                .summary("least(a, ...): smallest number in the row"),
            RowFunction::scalar("greatest", 1, None, Propagate, greatest)
                .summary("greatest(a, ...): largest number in the row"),
            RowFunction::scalar("clamp", 3, Some(3), Propagate, clamp).summary("clamp(x, lo, hi)"),
            RowFunction::scalar("bin", 2, Some(2), Propagate, bin)
                .summary("bin(x, width): lower edge of x's bucket; null for zero width"),
            RowFunction::scalar("lower", 1, Some(1), Propagate, lower).summary("lower(s)"),
            RowFunction::scalar("upper", 1, Some(1), Propagate, upper).summary("upper(s)"),
            RowFunction::scalar("trim", 1, Some(1), Propagate, trim).summary("trim(s)"),
            RowFunction::scalar("len", 1, Some(1), Propagate, len)
                .summary("len(s): number of characters"),
            RowFunction::scalar("concat", 1, None, Propagate, concat)
                .summary("concat(a, ...): text of every argument joined"),
            RowFunction::scalar("contains", 2, Some(2), Propagate, contains)
                .summary("contains(s, part)"),
            RowFunction::scalar("starts_with", 2, Some(2), Propagate, starts_with)
                .summary("starts_with(s, prefix)"),
            RowFunction::scalar("ends_with", 2, Some(2), Propagate, ends_with)
                .summary("ends_with(s, suffix)"),
            RowFunction::scalar("matches", 2, Some(2), Propagate, matches)
                .summary("matches(s, regex)"),
            RowFunction::scalar("to_number", 1, Some(1), Propagate, to_number)
                .summary("to_number(x): null when the text is not a number"),
            RowFunction::scalar("to_string", 1, Some(1), Propagate, to_string)
                .summary("to_string(x)"),
            RowFunction::scalar("year", 1, Some(1), Propagate, year)
                .summary("year(date): null when not an ISO date"),
            RowFunction::scalar("month", 1, Some(1), Propagate, month).summary("month(date): 1-12"),
            RowFunction::scalar("day", 1, Some(1), Propagate, day)
                .summary("day(date): day of month"),
            RowFunction::partition("zscore", zscore)
                .summary("zscore(x): standard score within the partition"),
            RowFunction::partition("rank", rank)
                .summary("rank(x): 1-based ascending rank, ties share the lowest rank"),
            RowFunction::partition("percentile_rank", percentile_rank)
                .summary("percentile_rank(x): share of other values below x, 0 to 1"),
            RowFunction::partition("pct_of_total", pct_of_total)
                .summary("pct_of_total(x): x as a percentage of the partition sum"),
            RowFunction::partition("cumsum", cumsum).summary("cumsum(x): running sum in row order"),
            RowFunction::partition("mean", mean).summary("mean(x): partition mean on every row"),
            RowFunction::partition("sum", sum).summary("sum(x): partition sum on every row"),
            RowFunction::partition("count", count)
                .summary("count(x): non-null values in the partition"),
            RowFunction::partition("median", median)
                .summary("median(x): partition median on every row"),
            RowFunction::partition("min", min).summary("min(x): partition minimum on every row"),
            RowFunction::partition("max", max).summary("max(x): partition maximum on every row"),
        ];

        functions
            .into_iter()
            .fold(FunctionRegistry::empty(), FunctionRegistry::with)
    }
}

// ============================================================================
// Argument helpers
// ============================================================================

static NULL: Value = Value::Null;

fn scalar(args: &[Arg], i: usize) -> Result<&Value, EvalError> {
    match args.get(i) {
        Some(Arg::Scalar(v)) => Ok(v),
        Some(Arg::List(_)) => Err(EvalError::UnexpectedList),
        None => Ok(&NULL),
    }
}

fn number(args: &[Arg], i: usize, function: &str) -> Result<f64, EvalError> {
    match scalar(args, i)? {
        Value::Number(n) => Ok(*n),
        other => Err(EvalError::InvalidArgument {
            function: function.to_string(),
            message: format!("argument {} must be a number, got {}", i + 1, other.type_name()),
        }),
    }
}

fn text<'a>(args: &'a [Arg], i: usize, function: &str) -> Result<&'a str, EvalError> {
    match scalar(args, i)? {
        Value::String(s) => Ok(s),
        other => Err(EvalError::InvalidArgument {
            function: function.to_string(),
            message: format!("argument {} must be a string, got {}", i + 1, other.type_name()),
        }),
    }
}

fn numbers(args: &[Arg], function: &str) -> Result<Vec<f64>, EvalError> {
    (0..args.len()).map(|i| number(args, i, function)).collect()
}

// ============================================================================
// Conditional and null handling
// ============================================================================

fn if_else(args: &[Arg]) -> Result<Value, EvalError> {
    let branch = match scalar(args, 0)? {
        Value::Boolean(true) => 1,
        Value::Boolean(false) | Value::Null => 2,
        other => {
            return Err(EvalError::InvalidArgument {
                function: "if_else".to_string(),
                message: format!("condition must be a boolean, got {}", other.type_name()),
            });
        }
    };
    scalar(args, branch).cloned()
}

fn coalesce(args: &[Arg]) -> Result<Value, EvalError> {
    for i in 0..args.len() {
        let value = scalar(args, i)?;
        if !value.is_null() {
            return Ok(value.clone());
        }
    }
    Ok(Value::Null)
}

fn is_null(args: &[Arg]) -> Result<Value, EvalError> {
    Ok(Value::Boolean(scalar(args, 0)?.is_null()))
}

fn in_list(args: &[Arg]) -> Result<Value, EvalError> {
    let needle = scalar(args, 0)?;
    let Some(Arg::List(items)) = args.get(1) else {
        return Err(EvalError::InvalidArgument {
            function: "in".to_string(),
            message: "second argument must be an array literal like [\"a\", \"b\"]".to_string(),
        });
    };
    if needle.is_null() {
        return Ok(Value::Null);
    }
    Ok(Value::Boolean(items.contains(needle)))
}

// ============================================================================
// Numeric
// ============================================================================

fn abs(args: &[Arg]) -> Result<Value, EvalError> {
    Ok(Value::finite(number(args, 0, "abs")?.abs()))
}

fn floor(args: &[Arg]) -> Result<Value, EvalError> {
    Ok(Value::finite(number(args, 0, "floor")?.floor()))
}

fn ceil(args: &[Arg]) -> Result<Value, EvalError> {
    Ok(Value::finite(number(args, 0, "ceil")?.ceil()))
}

fn round(args: &[Arg]) -> Result<Value, EvalError> {
    let x = number(args, 0, "round")?;
    let digits = if args.len() > 1 {
        number(args, 1, "round")?
    } else {
        0.0
    };
    if digits < 0.0 || digits.fract() != 0.0 || digits > 28.0 {
        return Err(EvalError::InvalidArgument {
            function: "round".to_string(),
            message: format!("digits must be a whole number from 0 to 28, got {}", digits),
        });
    }

    // Decimal avoids 2.675 rounding to 2.67 through binary representation error
    if let Some(d) = Decimal::from_f64(x)
        && let Some(r) = d
            .round_dp_with_strategy(digits as u32, RoundingStrategy::MidpointAwayFromZero)
            .to_f64()
    {
        return Ok(Value::finite(r));
    }
    let scale = 10f64.powi(digits as i32);
    Ok(Value::finite((x * scale).round() / scale))
}

fn sqrt(args: &[Arg]) -> Result<Value, EvalError> {
    let x = number(args, 0, "sqrt")?;
    if x < 0.0 {
        return Ok(Value::Null);
    }
    Ok(Value::finite(x.sqrt()))
}

fn ln(args: &[Arg]) -> Result<Value, EvalError> {
    let x = number(args, 0, "ln")?;
    if x <= 0.0 {
        return Ok(Value::Null);
    }
    Ok(Value::finite(x.ln()))
}

fn log10(args: &[Arg]) -> Result<Value, EvalError> {
    let x = number(args, 0, "log10")?;
    if x <= 0.0 {
        return Ok(Value::Null);
    }
    Ok(Value::finite(x.log10()))
}

fn exp(args: &[Arg]) -> Result<Value, EvalError> {
    Ok(Value::finite(number(args, 0, "exp")?.exp()))
}

fn least(args: &[Arg]) -> Result<Value, EvalError> {
    let values = numbers(args, "least")?;
    Ok(values
        .into_iter()
        .reduce(f64::min)
        .map(Value::finite)
        .unwrap_or(Value::Null))
}

fn greatest(args: &[Arg]) -> Result<Value, EvalError> {
    let values = numbers(args, "greatest")?;
    Ok(values
        .into_iter()
        .reduce(f64::max)
        .map(Value::finite)
        .unwrap_or(Value::Null))
}

fn clamp(args: &[Arg]) -> Result<Value, EvalError> {
    let x = number(args, 0, "clamp")?;
    let lo = number(args, 1, "clamp")?;
    let hi = number(args, 2, "clamp")?;
    if lo > hi {
        return Err(EvalError::InvalidArgument {
            function: "clamp".to_string(),
            message: format!("lower bound {} is above upper bound {}", lo, hi),
        });
    }
    Ok(Value::finite(x.clamp(lo, hi)))
}

fn bin(args: &[Arg]) -> Result<Value, EvalError> {
    let x = number(args, 0, "bin")?;
    let width = number(args, 1, "bin")?;
    if width == 0.0 {
        return Ok(Value::Null);
    }
    Ok(Value::finite((x / width).floor() * width))
}

// ============================================================================
// Text
// ============================================================================

fn lower(args: &[Arg]) -> Result<Value, EvalError> {
    Ok(Value::String(text(args, 0, "lower")?.to_lowercase()))
}

fn upper(args: &[Arg]) -> Result<Value, EvalError> {
    Ok(Value::String(text(args, 0, "upper")?.to_uppercase()))
}

fn trim(args: &[Arg]) -> Result<Value, EvalError> {
    Ok(Value::String(text(args, 0, "trim")?.trim().to_string()))
}

fn len(args: &[Arg]) -> Result<Value, EvalError> {
    Ok(Value::Number(text(args, 0, "len")?.chars().count() as f64))
}

fn concat(args: &[Arg]) -> Result<Value, EvalError> {
    let mut out = String::new();
    for i in 0..args.len() {
        out.push_str(&scalar(args, i)?.to_string());
    }
    Ok(Value::String(out))
}

fn contains(args: &[Arg]) -> Result<Value, EvalError> {
    let haystack = text(args, 0, "contains")?;
    let needle = text(args, 1, "contains")?;
    Ok(Value::Boolean(haystack.contains(needle)))
}

fn starts_with(args: &[Arg]) -> Result<Value, EvalError> {
    let s = text(args, 0, "starts_with")?;
    let prefix = text(args, 1, "starts_with")?;
    Ok(Value::Boolean(s.starts_with(prefix)))
}

fn ends_with(args: &[Arg]) -> Result<Value, EvalError> {
    let s = text(args, 0, "ends_with")?;
    let suffix = text(args, 1, "ends_with")?;
    Ok(Value::Boolean(s.ends_with(suffix)))
}

fn matches(args: &[Arg]) -> Result<Value, EvalError> {
    let s = text(args, 0, "matches")?;
    let pattern = text(args, 1, "matches")?;
    let re = Regex::new(pattern).map_err(|e| EvalError::InvalidArgument {
        function: "matches".to_string(),
        message: format!("invalid regex '{}': {}", pattern, e),
    })?;
    Ok(Value::Boolean(re.is_match(s)))
}

// ============================================================================
// Conversion and dates
// ============================================================================

fn to_number(args: &[Arg]) -> Result<Value, EvalError> {
    Ok(match scalar(args, 0)? {
        Value::Number(n) => Value::Number(*n),
        Value::Boolean(b) => Value::Number(if *b { 1.0 } else { 0.0 }),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map(Value::finite)
            .unwrap_or(Value::Null),
        Value::Null => Value::Null,
    })
}

fn to_string(args: &[Arg]) -> Result<Value, EvalError> {
    Ok(Value::String(scalar(args, 0)?.to_string()))
}

fn date_part(
    args: &[Arg],
    function: &str,
    part: fn(&NaiveDate) -> f64,
) -> Result<Value, EvalError> {
    let s = text(args, 0, function)?;
    Ok(parse_date(s)
        .map(|d| Value::Number(part(&d)))
        .unwrap_or(Value::Null))
}

fn year(args: &[Arg]) -> Result<Value, EvalError> {
    date_part(args, "year", |d| d.year() as f64)
}

fn month(args: &[Arg]) -> Result<Value, EvalError> {
    date_part(args, "month", |d| d.month() as f64)
}

fn day(args: &[Arg]) -> Result<Value, EvalError> {
    date_part(args, "day", |d| d.day() as f64)
}

// ============================================================================
// Partition functions
// ============================================================================

fn numeric_column(function: &str, args: &[Vec<Value>]) -> Result<Vec<Option<f64>>, EvalError> {
    let Some(values) = args.first() else {
        return Ok(Vec::new());
    };
    values
        .iter()
        .map(|v| match v {
            Value::Null => Ok(None),
            Value::Number(n) => Ok(Some(*n)),
            other => Err(EvalError::InvalidArgument {
                function: function.to_string(),
                message: format!("expects numeric values, got {}", other.type_name()),
            }),
        })
        .collect()
}

fn present(values: &[Option<f64>]) -> Vec<f64> {
    values.iter().flatten().copied().collect()
}

fn sorted_present(values: &[Option<f64>]) -> Vec<f64> {
    let mut sorted = present(values);
    sorted.sort_by(|a, b| a.total_cmp(b));
    sorted
}

fn broadcast(len: usize, value: Value) -> Vec<Value> {
    vec![value; len]
}

fn zscore(args: &[Vec<Value>]) -> Result<Vec<Value>, EvalError> {
    let values = numeric_column("zscore", args)?;
    let xs = present(&values);
    let n = xs.len() as f64;
    if xs.is_empty() {
        return Ok(broadcast(values.len(), Value::Null));
    }
    let mean = xs.iter().sum::<f64>() / n;
    let variance = xs.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n;
    let sd = variance.sqrt();

    Ok(values
        .iter()
        .map(|v| match v {
            Some(x) if sd > 0.0 => Value::finite((x - mean) / sd),
            _ => Value::Null,
        })
        .collect())
}

fn rank(args: &[Vec<Value>]) -> Result<Vec<Value>, EvalError> {
    let values = numeric_column("rank", args)?;
    let sorted = sorted_present(&values);
    Ok(values
        .iter()
        .map(|v| match v {
            Some(x) => Value::Number((sorted.partition_point(|s| s < x) + 1) as f64),
            None => Value::Null,
        })
        .collect())
}

fn percentile_rank(args: &[Vec<Value>]) -> Result<Vec<Value>, EvalError> {
    let values = numeric_column("percentile_rank", args)?;
    let sorted = sorted_present(&values);
    let others = sorted.len().saturating_sub(1);
    Ok(values
        .iter()
        .map(|v| match v {
            Some(_) if others == 0 => Value::Number(0.0),
            Some(x) => Value::Number(sorted.partition_point(|s| s < x) as f64 / others as f64),
            None => Value::Null,
        })
        .collect())
}

fn pct_of_total(args: &[Vec<Value>]) -> Result<Vec<Value>, EvalError> {
    let values = numeric_column("pct_of_total", args)?;
    let total: f64 = present(&values).iter().sum();
    Ok(values
        .iter()
        .map(|v| match v {
            Some(x) if total != 0.0 => Value::finite(x / total * 100.0),
            _ => Value::Null,
        })
        .collect())
}

fn cumsum(args: &[Vec<Value>]) -> Result<Vec<Value>, EvalError> {
    let values = numeric_column("cumsum", args)?;
    let mut running = 0.0;
    Ok(values
        .iter()
        .map(|v| match v {
            Some(x) => {
                running += x;
                Value::finite(running)
            }
            None => Value::Null,
        })
        .collect())
}

fn mean(args: &[Vec<Value>]) -> Result<Vec<Value>, EvalError> {
    let values = numeric_column("mean", args)?;
    let xs = present(&values);
    let result = if xs.is_empty() {
        Value::Null
    } else {
        Value::finite(xs.iter().sum::<f64>() / xs.len() as f64)
    };
    Ok(broadcast(values.len(), result))
}

fn sum(args: &[Vec<Value>]) -> Result<Vec<Value>, EvalError> {
    let values = numeric_column("sum", args)?;
    let xs = present(&values);
    let result = if xs.is_empty() {
        Value::Null
    } else {
        Value::finite(xs.iter().sum())
    };
    Ok(broadcast(values.len(), result))
}

fn count(args: &[Vec<Value>]) -> Result<Vec<Value>, EvalError> {
    let values = args.first().map(Vec::as_slice).unwrap_or_default();
    let non_null = values.iter().filter(|v| !v.is_null()).count();
    Ok(broadcast(values.len(), Value::Number(non_null as f64)))
}

fn median(args: &[Vec<Value>]) -> Result<Vec<Value>, EvalError> {
    let values = numeric_column("median", args)?;
    let sorted = sorted_present(&values);
    let mid = sorted.len() / 2;
    let result = match sorted.len() {
        0 => Value::Null,
        n if n % 2 == 1 => Value::Number(sorted[mid]),
        _ => Value::finite((sorted[mid - 1] + sorted[mid]) / 2.0),
    };
    Ok(broadcast(values.len(), result))
}

fn min(args: &[Vec<Value>]) -> Result<Vec<Value>, EvalError> {
    let values = numeric_column("min", args)?;
    let result = sorted_present(&values)
        .first()
        .map(|x| Value::Number(*x))
        .unwrap_or(Value::Null);
    Ok(broadcast(values.len(), result))
}

fn max(args: &[Vec<Value>]) -> Result<Vec<Value>, EvalError> {
    let values = numeric_column("max", args)?;
    let result = sorted_present(&values)
        .last()
        .map(|x| Value::Number(*x))
        .unwrap_or(Value::Null);
    Ok(broadcast(values.len(), result))
}
