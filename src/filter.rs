//! Row predicates that restrict which rows a computed column is evaluated on.

use serde::{Deserialize, Serialize};

use crate::value::{Row, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOp {
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
    In,
    NotIn,
    IsNull,
    NotNull,
}

/// Right-hand side of a predicate: one value, or a list for `in` / `not_in`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    List(Vec<Value>),
    Single(Value),
}

impl Default for FilterValue {
    fn default() -> Self {
        FilterValue::Single(Value::Null)
    }
}

/// One predicate over a row, e.g. `{"field": "region", "op": "eq", "value": "north"}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowFilter {
    pub field: String,
    pub op: FilterOp,
    #[serde(default)]
    pub value: FilterValue,
}

impl RowFilter {
    pub fn new(field: impl Into<String>, op: FilterOp, value: impl Into<Value>) -> Self {
        RowFilter {
            field: field.into(),
            op,
            value: FilterValue::Single(value.into()),
        }
    }

    pub fn one_of(field: impl Into<String>, values: Vec<Value>) -> Self {
        RowFilter {
            field: field.into(),
            op: FilterOp::In,
            value: FilterValue::List(values),
        }
    }

    /// Whether the row satisfies this predicate. A missing field reads as null.
    ///
    /// Ordering predicates are false across types and against null.
    pub fn matches(&self, row: &Row) -> bool {
        let cell = row.get(&self.field).unwrap_or(&Value::Null);

        match self.op {
            FilterOp::IsNull => cell.is_null(),
            FilterOp::NotNull => !cell.is_null(),
            FilterOp::Eq => self.contains(cell),
            FilterOp::Neq => !self.contains(cell),
            FilterOp::In => self.contains(cell),
            FilterOp::NotIn => !self.contains(cell),
            FilterOp::Gt | FilterOp::Gte | FilterOp::Lt | FilterOp::Lte => {
                let FilterValue::Single(bound) = &self.value else {
                    return false;
                };
                let Some(ordering) = cell.partial_cmp_same_type(bound) else {
                    return false;
                };
                match self.op {
                    FilterOp::Gt => ordering.is_gt(),
                    FilterOp::Gte => ordering.is_ge(),
                    FilterOp::Lt => ordering.is_lt(),
                    _ => ordering.is_le(),
                }
            }
        }
    }

    fn contains(&self, cell: &Value) -> bool {
        match &self.value {
            FilterValue::Single(v) => v == cell,
            FilterValue::List(items) => items.contains(cell),
        }
    }

    pub fn field(&self) -> &str {
        &self.field
    }
}

/// Conjunction of all predicates; an empty list matches every row.
pub fn matches_all(filters: &[RowFilter], row: &Row) -> bool {
    filters.iter().all(|f| f.matches(row))
}
