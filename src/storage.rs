//! Tabular storage behind the transform layer.
//!
//! The engine only talks to [`TableStore`]. [`MemoryStore`] is a columnar
//! in-memory implementation that loads JSON datasets.

use std::{
    collections::BTreeMap,
    fs, io,
    path::{Path, PathBuf},
};

use log::debug;
use thiserror::Error;

use crate::{
    profile::ColumnStats,
    value::{ColumnType, Row, Value, from_json},
};

/// File name suffix of manifests; such files are never loaded as tables.
pub const MANIFEST_SUFFIX: &str = ".dolex.json";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Table '{0}' does not exist")]
    UnknownTable(String),

    #[error("Column '{column}' does not exist in table '{table}'")]
    UnknownColumn { table: String, column: String },

    #[error("Column '{column}' already exists in table '{table}'")]
    ColumnExists { table: String, column: String },

    #[error("Column '{column}' has {got} values but table has {expected} rows")]
    LengthMismatch {
        column: String,
        expected: usize,
        got: usize,
    },

    #[error("Cannot read '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Invalid dataset '{}': {message}", .path.display())]
    InvalidDataset { path: PathBuf, message: String },
}

/// Storage backend the transform layer reads rows from and writes computed columns to.
pub trait TableStore {
    fn table_names(&self) -> Vec<String>;

    /// Column names in storage order.
    fn column_names(&self, table: &str) -> Result<Vec<String>, StorageError>;

    fn column_type(&self, table: &str, column: &str) -> Result<ColumnType, StorageError>;

    fn all_rows(&self, table: &str) -> Result<Vec<Row>, StorageError>;

    fn row_count(&self, table: &str) -> Result<usize, StorageError>;

    fn column_values(&self, table: &str, column: &str) -> Result<Vec<Value>, StorageError>;

    /// Appends a column. Fails if the column exists.
    fn add_column(
        &mut self,
        table: &str,
        column: &str,
        values: Vec<Value>,
        column_type: ColumnType,
    ) -> Result<(), StorageError>;

    /// Replaces the values and type of an existing column.
    fn overwrite_column(
        &mut self,
        table: &str,
        column: &str,
        values: Vec<Value>,
        column_type: ColumnType,
    ) -> Result<(), StorageError>;

    fn drop_column(&mut self, table: &str, column: &str) -> Result<(), StorageError>;

    fn has_table(&self, table: &str) -> bool {
        self.table_names().iter().any(|t| t == table)
    }

    fn has_column(&self, table: &str, column: &str) -> bool {
        self.column_names(table)
            .is_ok_and(|columns| columns.iter().any(|c| c == column))
    }

    fn profile_column(&self, table: &str, column: &str) -> Result<ColumnStats, StorageError> {
        Ok(ColumnStats::from_values(&self.column_values(table, column)?))
    }
}

#[derive(Debug, Clone, PartialEq)]
struct ColumnData {
    name: String,
    column_type: ColumnType,
    values: Vec<Value>,
}

/// One table stored column by column.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MemTable {
    columns: Vec<ColumnData>,
    row_count: usize,
}

impl MemTable {
    /// Builds a table from row objects; column order is first appearance across rows.
    pub fn from_rows(rows: Vec<Row>, column_order: &[String]) -> Self {
        let mut names: Vec<String> = column_order.to_vec();
        for row in &rows {
            for key in row.keys() {
                if !names.contains(key) {
                    names.push(key.clone());
                }
            }
        }

        let columns = names
            .into_iter()
            .map(|name| {
                let values: Vec<Value> = rows
                    .iter()
                    .map(|row| row.get(&name).cloned().unwrap_or_default())
                    .collect();
                ColumnData {
                    column_type: ColumnType::infer(&values),
                    name,
                    values,
                }
            })
            .collect();

        MemTable {
            columns,
            row_count: rows.len(),
        }
    }

    fn column(&self, name: &str) -> Option<&ColumnData> {
        self.columns.iter().find(|c| c.name == name)
    }

    fn rows(&self) -> Vec<Row> {
        (0..self.row_count)
            .map(|i| {
                self.columns
                    .iter()
                    .map(|c| (c.name.clone(), c.values[i].clone()))
                    .collect()
            })
            .collect()
    }
}

/// Columnar in-memory [`TableStore`].
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    tables: BTreeMap<String, MemTable>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_table(&mut self, name: impl Into<String>, table: MemTable) {
        self.tables.insert(name.into(), table);
    }

    /// Adds a table built from rows, with columns in first-appearance order.
    pub fn insert_rows(&mut self, name: impl Into<String>, rows: Vec<Row>) {
        self.insert_table(name, MemTable::from_rows(rows, &[]));
    }

    fn table(&self, name: &str) -> Result<&MemTable, StorageError> {
        self.tables
            .get(name)
            .ok_or_else(|| StorageError::UnknownTable(name.to_string()))
    }

    fn table_mut(&mut self, name: &str) -> Result<&mut MemTable, StorageError> {
        self.tables
            .get_mut(name)
            .ok_or_else(|| StorageError::UnknownTable(name.to_string()))
    }

    fn column_mut<'a>(
        table: &'a mut MemTable,
        table_name: &str,
        column: &str,
    ) -> Result<&'a mut ColumnData, StorageError> {
        table
            .columns
            .iter_mut()
            .find(|c| c.name == column)
            .ok_or_else(|| StorageError::UnknownColumn {
                table: table_name.to_string(),
                column: column.to_string(),
            })
    }
}

fn check_length(column: &str, expected: usize, values: &[Value]) -> Result<(), StorageError> {
    if values.len() != expected {
        return Err(StorageError::LengthMismatch {
            column: column.to_string(),
            expected,
            got: values.len(),
        });
    }
    Ok(())
}

impl TableStore for MemoryStore {
    fn table_names(&self) -> Vec<String> {
        self.tables.keys().cloned().collect()
    }

    fn column_names(&self, table: &str) -> Result<Vec<String>, StorageError> {
        Ok(self.table(table)?.columns.iter().map(|c| c.name.clone()).collect())
    }

    fn column_type(&self, table: &str, column: &str) -> Result<ColumnType, StorageError> {
        self.table(table)?
            .column(column)
            .map(|c| c.column_type)
            .ok_or_else(|| StorageError::UnknownColumn {
                table: table.to_string(),
                column: column.to_string(),
            })
    }

    fn all_rows(&self, table: &str) -> Result<Vec<Row>, StorageError> {
        Ok(self.table(table)?.rows())
    }

    fn row_count(&self, table: &str) -> Result<usize, StorageError> {
        Ok(self.table(table)?.row_count)
    }

    fn column_values(&self, table: &str, column: &str) -> Result<Vec<Value>, StorageError> {
        self.table(table)?
            .column(column)
            .map(|c| c.values.clone())
            .ok_or_else(|| StorageError::UnknownColumn {
                table: table.to_string(),
                column: column.to_string(),
            })
    }

    fn add_column(
        &mut self,
        table: &str,
        column: &str,
        values: Vec<Value>,
        column_type: ColumnType,
    ) -> Result<(), StorageError> {
        let data = self.table_mut(table)?;
        if data.column(column).is_some() {
            return Err(StorageError::ColumnExists {
                table: table.to_string(),
                column: column.to_string(),
            });
        }
        check_length(column, data.row_count, &values)?;
        data.columns.push(ColumnData {
            name: column.to_string(),
            column_type,
            values,
        });
        Ok(())
    }

    fn overwrite_column(
        &mut self,
        table: &str,
        column: &str,
        values: Vec<Value>,
        column_type: ColumnType,
    ) -> Result<(), StorageError> {
        let data = self.table_mut(table)?;
        check_length(column, data.row_count, &values)?;
        let target = Self::column_mut(data, table, column)?;
        target.values = values;
        target.column_type = column_type;
        Ok(())
    }

    fn drop_column(&mut self, table: &str, column: &str) -> Result<(), StorageError> {
        let data = self.table_mut(table)?;
        let index = data
            .columns
            .iter()
            .position(|c| c.name == column)
            .ok_or_else(|| StorageError::UnknownColumn {
                table: table.to_string(),
                column: column.to_string(),
            })?;
        data.columns.remove(index);
        Ok(())
    }
}

/// Where a dataset lives: a `.json` file holding an array of row objects, or
/// a directory of such files with one table per file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetConfig {
    pub path: PathBuf,
}

impl DatasetConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        DatasetConfig { path: path.into() }
    }

    pub fn is_directory(&self) -> bool {
        self.path.is_dir()
    }

    /// Loads every table of the dataset into a fresh [`MemoryStore`].
    pub fn load(&self) -> Result<MemoryStore, StorageError> {
        let mut store = MemoryStore::new();
        if self.is_directory() {
            for path in dataset_files(&self.path)? {
                load_table_file(&path, &mut store)?;
            }
        } else {
            load_table_file(&self.path, &mut store)?;
        }
        debug!(
            "Loaded {} table(s) from {}",
            store.tables.len(),
            self.path.display()
        );
        Ok(store)
    }
}

fn dataset_files(dir: &Path) -> Result<Vec<PathBuf>, StorageError> {
    let io_err = |source| StorageError::Io {
        path: dir.to_path_buf(),
        source,
    };
    let mut files = Vec::new();
    for entry in fs::read_dir(dir).map_err(io_err)? {
        let path = entry.map_err(io_err)?.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if name.starts_with('.') || name.ends_with(MANIFEST_SUFFIX) || !name.ends_with(".json") {
            continue;
        }
        if path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Table name for a dataset file: the file name without its extension.
pub fn table_name(path: &Path) -> Option<String> {
    path.file_stem()
        .and_then(|s| s.to_str())
        .map(|s| s.to_string())
}

fn load_table_file(path: &Path, store: &mut MemoryStore) -> Result<(), StorageError> {
    let invalid = |message: String| StorageError::InvalidDataset {
        path: path.to_path_buf(),
        message,
    };

    let text = fs::read_to_string(path).map_err(|source| StorageError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let json: serde_json::Value =
        serde_json::from_str(&text).map_err(|e| invalid(e.to_string()))?;
    let serde_json::Value::Array(items) = json else {
        return Err(invalid("expected an array of row objects".to_string()));
    };

    let mut order: Vec<String> = Vec::new();
    let mut rows = Vec::with_capacity(items.len());
    for (i, item) in items.into_iter().enumerate() {
        let serde_json::Value::Object(fields) = item else {
            return Err(invalid(format!("row {} is not an object", i)));
        };
        let mut row = Row::new();
        for (key, value) in fields {
            if !order.contains(&key) {
                order.push(key.clone());
            }
            row.insert(key, from_json(value));
        }
        rows.push(row);
    }

    let name = table_name(path).ok_or_else(|| invalid("file has no usable name".to_string()))?;
    store.insert_table(name, MemTable::from_rows(rows, &order));
    Ok(())
}
