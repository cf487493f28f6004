//! Sidecar manifest of derived columns, and replay of it onto freshly loaded tables.
//!
//! A dataset at `dir/sales.json` keeps its manifest at `dir/sales.dolex.json`;
//! a directory dataset keeps it at `dir/.dolex.json`:
//!
//! ```json
//! { "version": 1,
//!   "tables": { "sales": [ { "column": "margin", "expr": "revenue - cost", "type": "numeric" } ] } }
//! ```

use std::{
    collections::BTreeMap,
    fs, io,
    path::{Path, PathBuf},
};

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    dependency::{DependencyError, extract_column_refs, missing_columns, topological_sort},
    evaluator::{ColumnOptions, Evaluator},
    functions::FunctionRegistry,
    metadata::{Layer, TransformMetadataStore, TransformRecord},
    parser::parse,
    storage::{DatasetConfig, MANIFEST_SUFFIX, TableStore, table_name},
    value::ColumnType,
};

pub const MANIFEST_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("Cannot write manifest '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Cannot serialize manifest: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Cannot order derived columns of table '{table}': {source}")]
    Order {
        table: String,
        #[source]
        source: DependencyError,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestData {
    pub version: u32,
    #[serde(default)]
    pub tables: BTreeMap<String, Vec<ManifestEntry>>,
}

impl Default for ManifestData {
    fn default() -> Self {
        ManifestData {
            version: MANIFEST_VERSION,
            tables: BTreeMap::new(),
        }
    }
}

/// The persisted part of a derived [`TransformRecord`]. Filters are not kept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub column: String,
    pub expr: String,
    #[serde(rename = "type")]
    pub column_type: ColumnType,
    #[serde(
        rename = "partitionBy",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub partition_by: Option<String>,
}

impl From<&TransformRecord> for ManifestEntry {
    fn from(record: &TransformRecord) -> Self {
        ManifestEntry {
            column: record.column.clone(),
            expr: record.expr.clone(),
            column_type: record.column_type,
            partition_by: record.partition_by.clone(),
        }
    }
}

impl ManifestEntry {
    pub fn to_record(&self) -> TransformRecord {
        let record = TransformRecord::new(
            self.column.clone(),
            self.expr.clone(),
            self.column_type,
            Layer::Derived,
        );
        match &self.partition_by {
            Some(partition) => record.with_partition_by(partition.clone()),
            None => record,
        }
    }
}

/// Location of the manifest that belongs to a dataset.
pub fn resolve_manifest_path(dataset: &DatasetConfig) -> PathBuf {
    if dataset.is_directory() {
        return dataset.path.join(MANIFEST_SUFFIX);
    }
    let stem = table_name(&dataset.path).unwrap_or_default();
    dataset.path.with_file_name(format!("{}{}", stem, MANIFEST_SUFFIX))
}

/// Builds the manifest content for `tables` from the derived records in `metadata`.
///
/// Tables without derived records are left out; each table's entries are in
/// dependency order.
pub fn build_manifest(
    metadata: &TransformMetadataStore,
    tables: &[String],
) -> Result<ManifestData, ManifestError> {
    let mut manifest = ManifestData::default();
    for table in tables {
        let derived = metadata.list(table, Some(Layer::Derived));
        if derived.is_empty() {
            continue;
        }
        let sorted = topological_sort(&derived).map_err(|source| ManifestError::Order {
            table: table.clone(),
            source,
        })?;
        manifest
            .tables
            .insert(table.clone(), sorted.iter().map(ManifestEntry::from).collect());
    }
    Ok(manifest)
}

/// Writes the derived columns of `tables` to `path`.
///
/// The file is always written, even with no tables, so a manifest whose last
/// derived column was dropped is emptied rather than left stale. Content goes
/// to a sibling `.tmp` file first and is renamed over the target.
pub fn write_manifest(
    metadata: &TransformMetadataStore,
    tables: &[String],
    path: &Path,
) -> Result<(), ManifestError> {
    let manifest = build_manifest(metadata, tables)?;
    let json = serde_json::to_string_pretty(&manifest)?;

    let io_err = |source| ManifestError::Io {
        path: path.to_path_buf(),
        source,
    };
    let mut temp_name = path.file_name().unwrap_or_default().to_os_string();
    temp_name.push(".tmp");
    let temp_path = path.with_file_name(temp_name);

    fs::write(&temp_path, json).map_err(io_err)?;
    if let Err(e) = fs::rename(&temp_path, path) {
        let _ = fs::remove_file(&temp_path);
        return Err(io_err(e));
    }

    let columns: usize = manifest.tables.values().map(Vec::len).sum();
    debug!(
        "Wrote manifest {} ({} derived column(s))",
        path.display(),
        columns
    );
    Ok(())
}

/// Reads a manifest, treating anything unusable as no manifest at all.
pub fn read_manifest(path: &Path) -> Option<ManifestData> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!("No manifest at {}", path.display());
            return None;
        }
        Err(e) => {
            warn!("Ignoring unreadable manifest {}: {}", path.display(), e);
            return None;
        }
    };

    let json: serde_json::Value = match serde_json::from_str(&text) {
        Ok(json) => json,
        Err(e) => {
            warn!("Ignoring manifest {} with invalid JSON: {}", path.display(), e);
            return None;
        }
    };

    let version = json.get("version").and_then(serde_json::Value::as_u64);
    if version != Some(u64::from(MANIFEST_VERSION)) {
        warn!(
            "Ignoring manifest {}: unsupported version {:?}",
            path.display(),
            version
        );
        return None;
    }

    match serde_json::from_value(json) {
        Ok(manifest) => Some(manifest),
        Err(e) => {
            warn!("Ignoring malformed manifest {}: {}", path.display(), e);
            None
        }
    }
}

/// An entry that could not be replayed, and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedEntry {
    pub column: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct ReplayReport {
    pub replayed: Vec<String>,
    pub skipped: Vec<SkippedEntry>,
}

impl ReplayReport {
    fn skip(&mut self, column: &str, reason: String) {
        warn!("Skipping derived column '{}': {}", column, reason);
        self.skipped.push(SkippedEntry {
            column: column.to_string(),
            reason,
        });
    }

    pub fn extend(&mut self, other: ReplayReport) {
        self.replayed.extend(other.replayed);
        self.skipped.extend(other.skipped);
    }
}

/// Recomputes manifest entries of one table in stored order and records them as derived.
///
/// Each entry sees the columns replayed before it. A failing entry is
/// reported and the rest still run. An entry whose column exists in storage
/// without a transform record is a source column and is never overwritten.
pub fn replay_manifest<S: TableStore>(
    store: &mut S,
    metadata: &mut TransformMetadataStore,
    registry: &FunctionRegistry,
    table: &str,
    entries: &[ManifestEntry],
) -> ReplayReport {
    let evaluator = Evaluator::new(registry);
    let mut report = ReplayReport::default();

    for entry in entries {
        let expr = match parse(&entry.expr) {
            Ok(expr) => expr,
            Err(e) => {
                report.skip(&entry.column, format!("Parse error: {}", e.message));
                continue;
            }
        };

        let columns = match store.column_names(table) {
            Ok(columns) => columns,
            Err(e) => {
                report.skip(&entry.column, format!("Storage error: {}", e));
                continue;
            }
        };
        // Only columns this layer already tracks may be overwritten
        if columns.contains(&entry.column) && !metadata.exists(table, &entry.column, None) {
            report.skip(
                &entry.column,
                format!("Column exists in source: {}", entry.column),
            );
            continue;
        }

        let mut refs = extract_column_refs(&expr);
        refs.extend(entry.partition_by.iter().cloned());
        let missing = missing_columns(&refs, columns.iter().map(String::as_str));
        if !missing.is_empty() {
            report.skip(
                &entry.column,
                format!("Missing columns: {}", missing.join(", ")),
            );
            continue;
        }

        let rows = match store.all_rows(table) {
            Ok(rows) => rows,
            Err(e) => {
                report.skip(&entry.column, format!("Storage error: {}", e));
                continue;
            }
        };
        let options = ColumnOptions {
            partition_by: entry.partition_by.as_deref(),
            ..Default::default()
        };
        let output = match evaluator.evaluate_column(&expr, &rows, options) {
            Ok(output) => output,
            Err(e) => {
                report.skip(&entry.column, format!("Evaluation error: {}", e));
                continue;
            }
        };

        let stored = if columns.contains(&entry.column) {
            store.overwrite_column(table, &entry.column, output.values, entry.column_type)
        } else {
            store.add_column(table, &entry.column, output.values, entry.column_type)
        };
        if let Err(e) = stored {
            report.skip(&entry.column, format!("Storage error: {}", e));
            continue;
        }

        metadata.add(table, entry.to_record());
        report.replayed.push(entry.column.clone());
    }

    info!(
        "Replayed {} derived column(s) on '{}', skipped {}",
        report.replayed.len(),
        table,
        report.skipped.len()
    );
    report
}
