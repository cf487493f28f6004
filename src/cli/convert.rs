//! JSON <-> row conversion utilities

use crate::value::{Row, Value, from_json, to_json};

use super::CliError;

/// Convert a JSON object, or an array of objects, to rows
pub fn rows_from_json(json: serde_json::Value) -> Result<Vec<Row>, CliError> {
    match json {
        serde_json::Value::Object(_) => Ok(vec![row_from_json(json)?]),
        serde_json::Value::Array(items) => items.into_iter().map(row_from_json).collect(),
        _ => Err(CliError::InvalidInput),
    }
}

fn row_from_json(json: serde_json::Value) -> Result<Row, CliError> {
    let serde_json::Value::Object(fields) = json else {
        return Err(CliError::InvalidInput);
    };
    Ok(fields.into_iter().map(|(k, v)| (k, from_json(v))).collect())
}

/// Convert rows to a JSON array of objects with keys in `columns` order
pub fn rows_to_json(rows: &[Row], columns: &[String]) -> serde_json::Value {
    serde_json::Value::Array(
        rows.iter()
            .map(|row| {
                serde_json::Value::Object(
                    columns
                        .iter()
                        .map(|c| (c.clone(), to_json(row.get(c).unwrap_or(&Value::Null))))
                        .collect(),
                )
            })
            .collect(),
    )
}
