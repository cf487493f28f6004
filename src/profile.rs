use std::collections::HashMap;

use serde::Serialize;

use crate::value::Value;

const TOP_VALUES: usize = 5;

/// A distinct value and how many rows hold it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopValue {
    pub value: Value,
    pub count: usize,
}

/// Summary of a column's values.
///
/// `min`/`max` compare numbers numerically and strings lexicographically
/// (which orders ISO dates correctly). `mean` only covers numbers.
/// `top_values` is filled for columns holding any non-numeric value.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnStats {
    pub row_count: usize,
    pub null_count: usize,
    pub min: Option<Value>,
    pub max: Option<Value>,
    pub mean: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_values: Option<Vec<TopValue>>,
}

impl ColumnStats {
    pub fn from_values(values: &[Value]) -> Self {
        let mut stats = ColumnStats {
            row_count: values.len(),
            ..Default::default()
        };

        let mut sum = 0.0;
        let mut numeric = 0usize;
        let mut counts: HashMap<String, (Value, usize)> = HashMap::new();
        let mut all_numeric = true;

        for value in values {
            match value {
                Value::Null => {
                    stats.null_count += 1;
                    continue;
                }
                Value::Number(n) => {
                    sum += n;
                    numeric += 1;
                }
                other => {
                    all_numeric = false;
                    let key = format!("{}:{}", other.type_name(), other);
                    counts.entry(key).or_insert_with(|| (other.clone(), 0)).1 += 1;
                }
            }

            stats.min = pick(stats.min.take(), value, |o| o.is_lt());
            stats.max = pick(stats.max.take(), value, |o| o.is_gt());
        }

        if numeric > 0 {
            stats.mean = Some(sum / numeric as f64);
        }

        if !all_numeric {
            let mut top: Vec<TopValue> = counts
                .into_values()
                .map(|(value, count)| TopValue { value, count })
                .collect();
            top.sort_by(|a, b| {
                b.count
                    .cmp(&a.count)
                    .then_with(|| a.value.to_string().cmp(&b.value.to_string()))
            });
            top.truncate(TOP_VALUES);
            stats.top_values = Some(top);
        }

        stats
    }
}

/// Keeps `current` unless `candidate` compares `wanted` against it.
///
/// Values of a different type than the current extreme are not comparable and ignored.
fn pick(
    current: Option<Value>,
    candidate: &Value,
    wanted: fn(std::cmp::Ordering) -> bool,
) -> Option<Value> {
    match current {
        None => Some(candidate.clone()),
        Some(existing) => match candidate.partial_cmp_same_type(&existing) {
            Some(ordering) if wanted(ordering) => Some(candidate.clone()),
            _ => Some(existing),
        },
    }
}

#[test]
fn test_numeric_profile() {
    let stats = ColumnStats::from_values(&[
        Value::Number(3.0),
        Value::Null,
        Value::Number(1.0),
        Value::Number(5.0),
    ]);
    assert_eq!(stats.row_count, 4);
    assert_eq!(stats.null_count, 1);
    assert_eq!(stats.min, Some(Value::Number(1.0)));
    assert_eq!(stats.max, Some(Value::Number(5.0)));
    assert_eq!(stats.mean, Some(3.0));
    assert!(stats.top_values.is_none());
}

#[test]
fn test_categorical_top_values() {
    let values: Vec<Value> = ["b", "a", "b", "c", "b", "a"]
        .iter()
        .map(|s| Value::from(*s))
        .collect();
    let stats = ColumnStats::from_values(&values);
    let top = stats.top_values.unwrap();
    assert_eq!(top[0], TopValue { value: Value::from("b"), count: 3 });
    assert_eq!(top[1], TopValue { value: Value::from("a"), count: 2 });
    assert_eq!(stats.min, Some(Value::from("a")));
    assert_eq!(stats.max, Some(Value::from("c")));
    assert_eq!(stats.mean, None);
}
