use std::{cmp::Ordering, collections::HashMap, fmt, str::FromStr};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// A single cell value.
///
/// The set of variants is closed: every operator and function states how it
/// treats each one, and nothing is coerced implicitly.
///
/// # Examples
///
/// ```
/// use dolex_transform::Value;
///
/// let missing = Value::Null;
/// let price = Value::Number(9.5);
/// let region = Value::String("north".to_string());
/// let active = Value::Boolean(true);
/// assert!(missing.is_null());
/// assert_eq!(price.as_number(), Some(9.5));
/// ```
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// Missing value
    #[default]
    Null,

    /// 64-bit floating point number
    Number(f64),

    /// UTF-8 string
    String(String),

    /// Boolean (true/false)
    Boolean(bool),
}

/// One table row: column name to cell value.
pub type Row = HashMap<String, Value>;

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Human-readable type name for error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Boolean(_) => "boolean",
        }
    }

    /// Wraps a float, mapping NaN and infinities to null.
    pub fn finite(n: f64) -> Value {
        if n.is_finite() {
            Value::Number(n)
        } else {
            Value::Null
        }
    }

    /// Ordering between two values of the same type; `None` across types or with null.
    pub fn partial_cmp_same_type(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) => a.partial_cmp(b),
            (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
            (Value::Boolean(a), Value::Boolean(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    write!(f, "{}", *n as i64)
                } else {
                    write!(f, "{}", n)
                }
            }
            Value::String(s) => write!(f, "{}", s),
            Value::Boolean(b) => write!(f, "{}", b),
        }
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

/// Declared type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Numeric,
    Categorical,
    Date,
    Boolean,
}

impl ColumnType {
    /// Infers the narrowest type that describes every non-null value.
    ///
    /// All-null columns are numeric.
    pub fn infer(values: &[Value]) -> ColumnType {
        let mut non_null = values.iter().filter(|v| !v.is_null()).peekable();
        if non_null.peek().is_none() {
            return ColumnType::Numeric;
        }

        let (mut numbers, mut booleans, mut dates, mut total) = (0, 0, 0, 0);
        for value in non_null {
            total += 1;
            match value {
                Value::Number(_) => numbers += 1,
                Value::Boolean(_) => booleans += 1,
                Value::String(s) if parse_date(s).is_some() => dates += 1,
                _ => {}
            }
        }

        if numbers == total {
            ColumnType::Numeric
        } else if booleans == total {
            ColumnType::Boolean
        } else if dates == total {
            ColumnType::Date
        } else {
            ColumnType::Categorical
        }
    }

    /// Whether every non-null value can live in a column of this type.
    pub fn accepts(&self, values: &[Value]) -> bool {
        values.iter().all(|v| match (self, v) {
            (_, Value::Null) => true,
            (ColumnType::Numeric, Value::Number(_)) => true,
            (ColumnType::Boolean, Value::Boolean(_)) => true,
            (ColumnType::Date, Value::String(s)) => parse_date(s).is_some(),
            (ColumnType::Categorical, _) => true,
            _ => false,
        })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnType::Numeric => "numeric",
            ColumnType::Categorical => "categorical",
            ColumnType::Date => "date",
            ColumnType::Boolean => "boolean",
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ColumnType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "numeric" => Ok(ColumnType::Numeric),
            "categorical" => Ok(ColumnType::Categorical),
            "date" => Ok(ColumnType::Date),
            "boolean" => Ok(ColumnType::Boolean),
            other => Err(format!(
                "unknown column type '{}' (expected numeric, categorical, date or boolean)",
                other
            )),
        }
    }
}

/// Parses the date portion of an ISO-8601 date or date-time string.
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    let date_part = s.get(..10)?;
    if s.len() > 10 && !matches!(s.as_bytes()[10], b'T' | b' ') {
        return None;
    }
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d").ok()
}

/// Convert serde_json::Value to a cell value.
///
/// Arrays and objects have no cell representation and are kept as their JSON text.
pub fn from_json(v: serde_json::Value) -> Value {
    match v {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Boolean(b),
        serde_json::Value::Number(n) => n.as_f64().map(Value::Number).unwrap_or(Value::Null),
        serde_json::Value::String(s) => Value::String(s),
        other @ (serde_json::Value::Array(_) | serde_json::Value::Object(_)) => {
            Value::String(other.to_string())
        }
    }
}

/// Convert a cell value to serde_json::Value
pub fn to_json(v: &Value) -> serde_json::Value {
    match v {
        Value::Null => serde_json::Value::Null,
        Value::Boolean(b) => serde_json::Value::Bool(*b),
        Value::Number(n) => serde_json::Number::from_f64(*n)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        Value::String(s) => serde_json::Value::String(s.clone()),
    }
}
