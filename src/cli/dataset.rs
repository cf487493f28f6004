//! Commands that operate on a JSON dataset and its manifest

use log::info;
use serde_json::json;

use super::{CliError, rows_to_json};
use crate::{
    ColumnSelector, ColumnType, DatasetConfig, EngineConfig, Layer, MemoryStore, TableStore,
    TransformEngine, TransformRequest, TransformSpec,
};

/// Loads the dataset and replays its manifest so derived columns are present.
fn open(
    dataset: &DatasetConfig,
) -> Result<(TransformEngine<MemoryStore>, serde_json::Value), CliError> {
    let store = dataset.load()?;
    let mut engine = TransformEngine::new(store, EngineConfig::for_dataset(dataset));
    let report = engine.replay_all();
    if !report.replayed.is_empty() || !report.skipped.is_empty() {
        info!(
            "Restored {} derived column(s), skipped {}",
            report.replayed.len(),
            report.skipped.len()
        );
    }
    Ok((engine, serde_json::to_value(&report)?))
}

/// Columns of one table, or of every table, with their layers.
///
/// `preview` adds the first rows of each table.
pub fn list_columns(
    dataset: &DatasetConfig,
    table: Option<&str>,
    preview: Option<usize>,
) -> Result<serde_json::Value, CliError> {
    let (engine, _) = open(dataset)?;
    let tables = match table {
        Some(t) => vec![t.to_string()],
        None => engine.store().table_names(),
    };

    let mut output = serde_json::Map::new();
    for name in tables {
        let columns = engine.list_columns(&name)?;
        let mut entry = json!({ "columns": serde_json::to_value(&columns)? });
        if let Some(n) = preview {
            let mut rows = engine.store().all_rows(&name)?;
            rows.truncate(n);
            let names: Vec<String> = columns.iter().map(|c| c.name.clone()).collect();
            entry["rows"] = rows_to_json(&rows, &names);
        }
        output.insert(name, entry);
    }
    Ok(serde_json::Value::Object(output))
}

/// Options for the derive command
#[derive(Debug, Clone)]
pub struct DeriveOptions {
    pub table: String,
    pub column: String,
    pub expr: String,
    pub column_type: Option<ColumnType>,
    pub partition_by: Option<String>,
}

/// Computes a column and promotes it to derived, persisting the manifest.
pub fn derive_column(
    dataset: &DatasetConfig,
    options: DeriveOptions,
) -> Result<serde_json::Value, CliError> {
    let (mut engine, _) = open(dataset)?;

    let mut spec = TransformSpec::new(options.column.clone(), options.expr);
    if let Some(column_type) = options.column_type {
        spec = spec.with_type(column_type);
    }
    if let Some(partition) = options.partition_by {
        spec = spec.with_partition_by(partition);
    }

    let created = engine.transform(&options.table, TransformRequest::single(spec))?;
    let promoted = engine.promote(&options.table, &ColumnSelector::one(options.column))?;
    Ok(json!({
        "transform": serde_json::to_value(&created)?,
        "promote": serde_json::to_value(&promoted)?,
    }))
}

/// Options for the drop command
#[derive(Debug, Clone)]
pub struct DropOptions {
    pub table: String,
    /// Column name or `*`
    pub column: String,
    pub layer: Layer,
}

pub fn drop_column(
    dataset: &DatasetConfig,
    options: DropOptions,
) -> Result<serde_json::Value, CliError> {
    let (mut engine, _) = open(dataset)?;
    let selector = ColumnSelector::from(options.column.as_str());
    let outcome = engine.drop(&options.table, &selector, options.layer)?;
    Ok(serde_json::to_value(&outcome)?)
}

/// Replays the manifest and reports what was restored and skipped.
pub fn replay_dataset(dataset: &DatasetConfig) -> Result<serde_json::Value, CliError> {
    let (_, report) = open(dataset)?;
    Ok(report)
}
