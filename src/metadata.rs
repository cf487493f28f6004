//! Authoritative record of every working and derived column, per table.

use std::{collections::BTreeMap, fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{error::ValidationError, filter::RowFilter, value::ColumnType};

/// Which tier a column belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Layer {
    /// Loaded from the dataset itself
    Source,
    /// Computed in this session only
    Working,
    /// Computed and persisted to the manifest
    Derived,
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Layer::Source => "source",
            Layer::Working => "working",
            Layer::Derived => "derived",
        })
    }
}

impl FromStr for Layer {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "source" => Ok(Layer::Source),
            "working" => Ok(Layer::Working),
            "derived" => Ok(Layer::Derived),
            other => Err(format!("unknown layer '{}'", other)),
        }
    }
}

/// Definition of one computed column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransformRecord {
    pub column: String,
    /// Source text; re-parsed whenever the AST is needed
    pub expr: String,
    #[serde(rename = "type")]
    pub column_type: ColumnType,
    pub layer: Layer,
    /// Declaration sequence, assigned by the store
    pub order: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partition_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<Vec<RowFilter>>,
}

impl TransformRecord {
    pub fn new(
        column: impl Into<String>,
        expr: impl Into<String>,
        column_type: ColumnType,
        layer: Layer,
    ) -> Self {
        TransformRecord {
            column: column.into(),
            expr: expr.into(),
            column_type,
            layer,
            order: 0,
            partition_by: None,
            filter: None,
        }
    }

    pub fn with_partition_by(mut self, column: impl Into<String>) -> Self {
        self.partition_by = Some(column.into());
        self
    }

    pub fn with_filter(mut self, filter: Vec<RowFilter>) -> Self {
        self.filter = if filter.is_empty() { None } else { Some(filter) };
        self
    }

    pub fn filters(&self) -> &[RowFilter] {
        self.filter.as_deref().unwrap_or_default()
    }
}

/// Outcome of moving a record between layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayerChange {
    /// A record already in the target layer was replaced
    pub overwrote_existing: bool,
}

/// In-memory store of transform records keyed by `(table, column, layer)`.
#[derive(Debug, Clone, Default)]
pub struct TransformMetadataStore {
    tables: BTreeMap<String, Vec<TransformRecord>>,
    next_order: u64,
}

impl TransformMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a record, replacing any record with the same column and layer.
    ///
    /// A replacement keeps the replaced record's order; a new record gets the
    /// next order. Returns the stored record.
    pub fn add(&mut self, table: &str, mut record: TransformRecord) -> &TransformRecord {
        let records = self.tables.entry(table.to_string()).or_default();

        let index = match records
            .iter()
            .position(|r| r.column == record.column && r.layer == record.layer)
        {
            Some(i) => {
                record.order = records[i].order;
                records[i] = record;
                i
            }
            None => {
                record.order = self.next_order;
                self.next_order += 1;
                records.push(record);
                records.len() - 1
            }
        };
        &records[index]
    }

    pub fn remove(&mut self, table: &str, column: &str, layer: Layer) -> Option<TransformRecord> {
        let records = self.tables.get_mut(table)?;
        let index = records
            .iter()
            .position(|r| r.column == column && r.layer == layer)?;
        let removed = records.remove(index);
        if records.is_empty() {
            self.tables.remove(table);
        }
        Some(removed)
    }

    pub fn get(&self, table: &str, column: &str, layer: Layer) -> Option<&TransformRecord> {
        self.tables
            .get(table)?
            .iter()
            .find(|r| r.column == column && r.layer == layer)
    }

    /// Whether the column is tracked in `layer`, or in any layer when `layer` is `None`.
    pub fn exists(&self, table: &str, column: &str, layer: Option<Layer>) -> bool {
        self.tables.get(table).is_some_and(|records| {
            records
                .iter()
                .any(|r| r.column == column && layer.is_none_or(|l| r.layer == l))
        })
    }

    /// Records of a table in declaration order, optionally restricted to one layer.
    pub fn list(&self, table: &str, layer: Option<Layer>) -> Vec<TransformRecord> {
        let mut records: Vec<TransformRecord> = self
            .tables
            .get(table)
            .map(|records| {
                records
                    .iter()
                    .filter(|r| layer.is_none_or(|l| r.layer == l))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        records.sort_by_key(|r| r.order);
        records
    }

    /// Tables with at least one record.
    pub fn tables(&self) -> Vec<String> {
        self.tables.keys().cloned().collect()
    }

    /// Moves a record from one layer to another, keeping its order.
    ///
    /// A record already present in `to` is replaced and reported through
    /// [`LayerChange::overwrote_existing`].
    pub fn update_layer(
        &mut self,
        table: &str,
        column: &str,
        from: Layer,
        to: Layer,
    ) -> Result<LayerChange, ValidationError> {
        let not_found = || ValidationError::NotFound {
            table: table.to_string(),
            column: column.to_string(),
            layer: from,
        };
        if from == to {
            return if self.exists(table, column, Some(from)) {
                Ok(LayerChange {
                    overwrote_existing: false,
                })
            } else {
                Err(not_found())
            };
        }

        let records = self.tables.get_mut(table).ok_or_else(not_found)?;
        let source = records
            .iter()
            .position(|r| r.column == column && r.layer == from)
            .ok_or_else(not_found)?;

        let existing = records
            .iter()
            .position(|r| r.column == column && r.layer == to);

        records[source].layer = to;
        if let Some(existing) = existing {
            records.remove(existing);
        }

        Ok(LayerChange {
            overwrote_existing: existing.is_some(),
        })
    }
}
