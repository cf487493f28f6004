//! Mutation operations over a table store: create, promote, drop, list and replay.

use std::{
    collections::BTreeSet,
    path::PathBuf,
    sync::OnceLock,
};

use log::{debug, info, warn};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::{
    dependency::{
        DependencyError, extract_column_refs, find_dependents, missing_columns,
        record_dependencies, topological_sort,
    },
    error::{Result, TransformError, ValidationError},
    evaluator::{ColumnOptions, Evaluator},
    filter::RowFilter,
    functions::FunctionRegistry,
    manifest::{
        ManifestData, ReplayReport, SkippedEntry, read_manifest, replay_manifest,
        resolve_manifest_path, write_manifest,
    },
    metadata::{Layer, TransformMetadataStore, TransformRecord},
    parser::parse,
    profile::ColumnStats,
    storage::{DatasetConfig, StorageError, TableStore},
    value::{ColumnType, Row, Value},
};

const COLUMN_NAME_PATTERN: &str = "^[A-Za-z_][A-Za-z0-9_]*$";

/// Whether `name` can be used for a computed column.
pub fn is_valid_column_name(name: &str) -> bool {
    static COLUMN_NAME: OnceLock<Option<Regex>> = OnceLock::new();
    COLUMN_NAME
        .get_or_init(|| Regex::new(COLUMN_NAME_PATTERN).ok())
        .as_ref()
        .is_some_and(|re| re.is_match(name))
}

/// Where derived columns are persisted.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EngineConfig {
    pub manifest_path: Option<PathBuf>,
    /// Rewrite the manifest after mutations that change derived columns
    pub persist: bool,
}

impl EngineConfig {
    /// Persists to the manifest that belongs to `dataset`.
    pub fn for_dataset(dataset: &DatasetConfig) -> Self {
        EngineConfig {
            manifest_path: Some(resolve_manifest_path(dataset)),
            persist: true,
        }
    }

    /// No manifest; derived columns live as long as the engine.
    pub fn in_memory() -> Self {
        Self::default()
    }
}

/// One column to compute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransformSpec {
    pub create: String,
    pub expr: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub column_type: Option<ColumnType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partition_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<Vec<RowFilter>>,
}

impl TransformSpec {
    pub fn new(create: impl Into<String>, expr: impl Into<String>) -> Self {
        TransformSpec {
            create: create.into(),
            expr: expr.into(),
            column_type: None,
            partition_by: None,
            filter: None,
        }
    }

    pub fn with_type(mut self, column_type: ColumnType) -> Self {
        self.column_type = Some(column_type);
        self
    }

    pub fn with_partition_by(mut self, column: impl Into<String>) -> Self {
        self.partition_by = Some(column.into());
        self
    }

    pub fn with_filter(mut self, filter: Vec<RowFilter>) -> Self {
        self.filter = Some(filter);
        self
    }
}

/// A create/overwrite request: either the single-column fields or `transforms`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransformRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expr: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub column_type: Option<ColumnType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partition_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<Vec<RowFilter>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transforms: Option<Vec<TransformSpec>>,
}

impl TransformRequest {
    pub fn single(spec: TransformSpec) -> Self {
        TransformRequest {
            create: Some(spec.create),
            expr: Some(spec.expr),
            column_type: spec.column_type,
            partition_by: spec.partition_by,
            filter: spec.filter,
            transforms: None,
        }
    }

    pub fn batch(specs: Vec<TransformSpec>) -> Self {
        TransformRequest {
            transforms: Some(specs),
            ..Default::default()
        }
    }

    fn has_single_fields(&self) -> bool {
        self.create.is_some()
            || self.expr.is_some()
            || self.column_type.is_some()
            || self.partition_by.is_some()
            || self.filter.is_some()
    }

    /// The columns this request asks for, in order.
    pub fn into_specs(self) -> Result<Vec<TransformSpec>, ValidationError> {
        if self.transforms.is_some() && self.has_single_fields() {
            return Err(ValidationError::ConflictingModes);
        }
        if let Some(specs) = self.transforms {
            if specs.is_empty() {
                return Err(ValidationError::EmptyRequest);
            }
            return Ok(specs);
        }
        match (self.create, self.expr) {
            (Some(create), Some(expr)) => Ok(vec![TransformSpec {
                create,
                expr,
                column_type: self.column_type,
                partition_by: self.partition_by,
                filter: self.filter,
            }]),
            _ => Err(ValidationError::EmptyRequest),
        }
    }
}

/// `"*"` for every column of a layer, or explicit names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnSelector {
    All,
    Columns(Vec<String>),
}

impl ColumnSelector {
    pub fn one(name: impl Into<String>) -> Self {
        ColumnSelector::Columns(vec![name.into()])
    }
}

impl From<&str> for ColumnSelector {
    fn from(s: &str) -> Self {
        if s == "*" {
            ColumnSelector::All
        } else {
            ColumnSelector::one(s)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnResult {
    pub column: String,
    pub layer: Layer,
    #[serde(rename = "type")]
    pub column_type: ColumnType,
    pub stats: ColumnStats,
    /// A column of this name existed before
    pub overwrote: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransformOutcome {
    pub table: String,
    pub columns: Vec<ColumnResult>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PromotedColumn {
    pub column: String,
    pub overwrote_existing: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct PromoteOutcome {
    pub promoted: Vec<PromotedColumn>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DropOutcome {
    pub dropped: Vec<String>,
    /// Working columns whose derived definition was recomputed in their place
    pub restored: Vec<String>,
    /// Derived definitions that could not be recomputed and were discarded
    pub restore_failures: Vec<SkippedEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnInfo {
    pub name: String,
    pub layer: Layer,
    #[serde(rename = "type")]
    pub column_type: ColumnType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expr: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub partition_by: Option<String>,
    /// A working column that hides a derived definition of the same name
    pub shadows_derived: bool,
}

/// A computed column held back until the whole batch has succeeded.
struct StagedColumn {
    spec: TransformSpec,
    values: Vec<Value>,
    column_type: ColumnType,
    stats: ColumnStats,
}

/// What a commit did to storage, so it can be undone.
enum Committed {
    Added(String),
    Overwrote {
        column: String,
        values: Vec<Value>,
        column_type: ColumnType,
    },
}

/// Owns a table store and keeps the computed columns in it consistent with
/// their definitions and with the manifest.
pub struct TransformEngine<S: TableStore> {
    store: S,
    metadata: TransformMetadataStore,
    registry: FunctionRegistry,
    config: EngineConfig,
}

impl<S: TableStore> TransformEngine<S> {
    pub fn new(store: S, config: EngineConfig) -> Self {
        Self::with_registry(store, FunctionRegistry::builtin(), config)
    }

    pub fn with_registry(store: S, registry: FunctionRegistry, config: EngineConfig) -> Self {
        TransformEngine {
            store,
            metadata: TransformMetadataStore::new(),
            registry,
            config,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn metadata(&self) -> &TransformMetadataStore {
        &self.metadata
    }

    pub fn registry(&self) -> &FunctionRegistry {
        &self.registry
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn into_store(self) -> S {
        self.store
    }

    fn require_table(&self, table: &str) -> Result<()> {
        if self.store.has_table(table) {
            Ok(())
        } else {
            Err(ValidationError::UnknownTable(table.to_string()).into())
        }
    }

    /// A column present in storage that no transform record tracks.
    fn is_source_column(&self, table: &str, column: &str) -> bool {
        self.store.has_column(table, column) && !self.metadata.exists(table, column, None)
    }

    /// Creates or overwrites one or more columns.
    ///
    /// Columns are computed in request order against staged rows, so later
    /// columns can reference earlier ones. Nothing reaches storage until
    /// every column has been computed; a storage failure during commit
    /// reverts the columns already written.
    pub fn transform(
        &mut self,
        table: &str,
        request: TransformRequest,
    ) -> Result<TransformOutcome> {
        let specs = request.into_specs()?;
        self.require_table(table)?;

        let mut seen = BTreeSet::new();
        for spec in &specs {
            if !is_valid_column_name(&spec.create) {
                return Err(ValidationError::InvalidColumnName(spec.create.clone()).into());
            }
            if !seen.insert(spec.create.as_str()) {
                return Err(ValidationError::DuplicateColumn(spec.create.clone()).into());
            }
            if self.is_source_column(table, &spec.create) {
                return Err(ValidationError::SourceColumn(spec.create.clone()).into());
            }
        }

        let staged = self.stage(table, specs)?;
        let committed = self.commit(table, &staged)?;

        let mut columns = Vec::with_capacity(staged.len());
        for (column, existed) in staged.into_iter().zip(committed) {
            let spec = column.spec;
            let mut record = TransformRecord::new(
                spec.create.clone(),
                spec.expr,
                column.column_type,
                Layer::Working,
            );
            if let Some(partition) = spec.partition_by {
                record = record.with_partition_by(partition);
            }
            if let Some(filter) = spec.filter {
                record = record.with_filter(filter);
            }
            if self.metadata.exists(table, &spec.create, Some(Layer::Derived)) {
                debug!("Working column '{}' now shadows its derived definition", spec.create);
            }
            self.metadata.add(table, record);

            columns.push(ColumnResult {
                column: spec.create,
                layer: Layer::Working,
                column_type: column.column_type,
                stats: column.stats,
                overwrote: existed,
            });
        }

        info!(
            "Committed {} working column(s) to '{}': {}",
            columns.len(),
            table,
            columns.iter().map(|c| c.column.as_str()).collect::<Vec<_>>().join(", ")
        );
        Ok(TransformOutcome {
            table: table.to_string(),
            columns,
        })
    }

    fn stage(&self, table: &str, specs: Vec<TransformSpec>) -> Result<Vec<StagedColumn>> {
        let evaluator = Evaluator::new(&self.registry);
        let mut rows: Vec<Row> = self.store.all_rows(table)?;
        let mut available: BTreeSet<String> = self.store.column_names(table)?.into_iter().collect();
        let mut staged = Vec::with_capacity(specs.len());

        for spec in specs {
            debug!("Evaluating '{}' = {}", spec.create, spec.expr);
            let expr = parse(&spec.expr)?;

            let mut refs = extract_column_refs(&expr);
            refs.extend(spec.partition_by.iter().cloned());
            let missing = missing_columns(&refs, available.iter().map(String::as_str));
            if !missing.is_empty() {
                return Err(DependencyError::MissingColumns { columns: missing }.into());
            }

            let options = ColumnOptions {
                partition_by: spec.partition_by.as_deref(),
                filter: spec.filter.as_deref().unwrap_or_default(),
            };
            let output = evaluator
                .evaluate_column(&expr, &rows, options)
                .map_err(|e| TransformError::eval(&spec.create, e))?;

            let column_type = match spec.column_type {
                Some(declared) if !declared.accepts(&output.values) => {
                    return Err(ValidationError::TypeMismatch {
                        column: spec.create.clone(),
                        declared,
                    }
                    .into());
                }
                Some(declared) => declared,
                None => ColumnType::infer(&output.values),
            };

            for (row, value) in rows.iter_mut().zip(&output.values) {
                row.insert(spec.create.clone(), value.clone());
            }
            available.insert(spec.create.clone());
            staged.push(StagedColumn {
                spec,
                values: output.values,
                column_type,
                stats: output.stats,
            });
        }
        Ok(staged)
    }

    /// Writes staged columns; returns whether each one already existed.
    fn commit(&mut self, table: &str, staged: &[StagedColumn]) -> Result<Vec<bool>> {
        let mut done: Vec<Committed> = Vec::with_capacity(staged.len());

        for column in staged {
            match self.commit_column(table, column) {
                Ok(step) => done.push(step),
                Err(e) => {
                    warn!(
                        "Storage failed while committing '{}' to '{}': {}",
                        column.spec.create, table, e
                    );
                    self.rollback(table, done);
                    return Err(e.into());
                }
            }
        }
        Ok(done
            .iter()
            .map(|step| matches!(step, Committed::Overwrote { .. }))
            .collect())
    }

    fn commit_column(
        &mut self,
        table: &str,
        column: &StagedColumn,
    ) -> Result<Committed, StorageError> {
        let name = column.spec.create.as_str();
        if self.store.has_column(table, name) {
            let values = self.store.column_values(table, name)?;
            let column_type = self.store.column_type(table, name)?;
            self.store
                .overwrite_column(table, name, column.values.clone(), column.column_type)?;
            Ok(Committed::Overwrote {
                column: name.to_string(),
                values,
                column_type,
            })
        } else {
            self.store
                .add_column(table, name, column.values.clone(), column.column_type)?;
            Ok(Committed::Added(name.to_string()))
        }
    }

    fn rollback(&mut self, table: &str, done: Vec<Committed>) {
        for step in done.into_iter().rev() {
            let result = match step {
                Committed::Added(column) => self.store.drop_column(table, &column),
                Committed::Overwrote {
                    column,
                    values,
                    column_type,
                } => self.store.overwrite_column(table, &column, values, column_type),
            };
            if let Err(e) = result {
                warn!("Rollback on '{}' incomplete: {}", table, e);
            }
        }
    }

    fn select(&self, table: &str, selector: &ColumnSelector, layer: Layer) -> Result<Vec<String>> {
        match selector {
            ColumnSelector::All => Ok(self
                .metadata
                .list(table, Some(layer))
                .into_iter()
                .map(|r| r.column)
                .collect()),
            ColumnSelector::Columns(names) => {
                let mut selected = Vec::with_capacity(names.len());
                for name in names {
                    if !self.metadata.exists(table, name, Some(layer)) {
                        if self.is_source_column(table, name) {
                            return Err(ValidationError::SourceColumn(name.clone()).into());
                        }
                        return Err(ValidationError::NotFound {
                            table: table.to_string(),
                            column: name.clone(),
                            layer,
                        }
                        .into());
                    }
                    if !selected.contains(name) {
                        selected.push(name.clone());
                    }
                }
                Ok(selected)
            }
        }
    }

    /// Moves working columns to the derived layer and persists them.
    ///
    /// Fails without changing anything when the promoted columns would form
    /// a cycle with the derived set, or would depend on working columns that
    /// stay behind.
    pub fn promote(&mut self, table: &str, selector: &ColumnSelector) -> Result<PromoteOutcome> {
        self.require_table(table)?;
        let names = self.select(table, selector, Layer::Working)?;
        let promoted: Vec<TransformRecord> = names
            .iter()
            .filter_map(|name| self.metadata.get(table, name, Layer::Working).cloned())
            .collect();

        for record in &promoted {
            // Includes working shadows of derived columns
            let unpromoted: Vec<String> = record_dependencies(record)?
                .into_iter()
                .filter(|dep| dep != &record.column && !names.contains(dep))
                .filter(|dep| self.metadata.exists(table, dep, Some(Layer::Working)))
                .collect();
            if !unpromoted.is_empty() {
                return Err(DependencyError::UnpromotedDependencies {
                    column: record.column.clone(),
                    dependencies: unpromoted,
                }
                .into());
            }
        }

        let mut resulting: Vec<TransformRecord> = self
            .metadata
            .list(table, Some(Layer::Derived))
            .into_iter()
            .filter(|r| !names.contains(&r.column))
            .collect();
        resulting.extend(promoted.iter().cloned());
        topological_sort(&resulting)?;

        let mut outcome = PromoteOutcome::default();
        for record in &promoted {
            let change =
                self.metadata
                    .update_layer(table, &record.column, Layer::Working, Layer::Derived)?;
            if record.filter.is_some() {
                let warning = format!(
                    "Filter on '{}' is not persisted; replay will compute every row",
                    record.column
                );
                warn!("{}", warning);
                outcome.warnings.push(warning);
            }
            outcome.promoted.push(PromotedColumn {
                column: record.column.clone(),
                overwrote_existing: change.overwrote_existing,
            });
        }

        if !outcome.promoted.is_empty() {
            info!("Promoted {} column(s) on '{}' to derived", outcome.promoted.len(), table);
            self.persist()?;
        }
        Ok(outcome)
    }

    /// Removes working or derived columns.
    ///
    /// Derived columns other derived columns depend on are refused. Dropping
    /// a working column that shadows a derived one recomputes the derived
    /// definition in its place.
    pub fn drop(
        &mut self,
        table: &str,
        selector: &ColumnSelector,
        layer: Layer,
    ) -> Result<DropOutcome> {
        self.require_table(table)?;
        match layer {
            Layer::Derived => self.drop_derived(table, selector),
            Layer::Working => self.drop_working(table, selector),
            Layer::Source => Err(ValidationError::InvalidLayer {
                action: "drop",
                layer,
            }
            .into()),
        }
    }

    fn drop_derived(&mut self, table: &str, selector: &ColumnSelector) -> Result<DropOutcome> {
        let names = self.select(table, selector, Layer::Derived)?;
        let derived = self.metadata.list(table, Some(Layer::Derived));

        for name in &names {
            let blocking: Vec<String> = find_dependents(name, &derived)
                .into_iter()
                .filter(|d| !names.contains(d))
                .collect();
            if !blocking.is_empty() {
                return Err(DependencyError::HasDependents {
                    column: name.clone(),
                    dependents: blocking,
                }
                .into());
            }
        }

        let mut outcome = DropOutcome::default();
        for name in names.iter().rev() {
            self.metadata.remove(table, name, Layer::Derived);
            // A shadowing working record keeps the physical column
            if !self.metadata.exists(table, name, Some(Layer::Working))
                && self.store.has_column(table, name)
            {
                self.store.drop_column(table, name)?;
            }
        }
        outcome.dropped = names;

        if !outcome.dropped.is_empty() {
            info!("Dropped derived column(s) on '{}': {}", table, outcome.dropped.join(", "));
            self.persist()?;
        }
        Ok(outcome)
    }

    fn drop_working(&mut self, table: &str, selector: &ColumnSelector) -> Result<DropOutcome> {
        let names = self.select(table, selector, Layer::Working)?;
        let mut outcome = DropOutcome::default();

        for name in &names {
            self.metadata.remove(table, name, Layer::Working);

            let Some(derived) = self.metadata.get(table, name, Layer::Derived).cloned() else {
                if self.store.has_column(table, name) {
                    self.store.drop_column(table, name)?;
                }
                outcome.dropped.push(name.clone());
                continue;
            };

            match self.recompute(table, &derived) {
                Ok(()) => {
                    debug!("Restored derived definition of '{}'", name);
                    outcome.restored.push(name.clone());
                }
                Err(reason) => {
                    warn!(
                        "Could not restore derived column '{}' on '{}', discarding it: {}",
                        name, table, reason
                    );
                    let derived = self.metadata.list(table, Some(Layer::Derived));
                    let dependents = find_dependents(name, &derived);
                    self.discard_derived(table, name, reason, &mut outcome)?;
                    for dependent in dependents {
                        let reason = format!("Depends on discarded column: {}", name);
                        self.discard_derived(table, &dependent, reason, &mut outcome)?;
                    }
                }
            }
        }

        info!(
            "Dropped {} working column(s) on '{}', restored {}",
            names.len(),
            table,
            outcome.restored.len()
        );
        if !outcome.restore_failures.is_empty() {
            self.persist()?;
        }
        Ok(outcome)
    }

    /// Removes a derived record that can no longer be computed.
    ///
    /// The physical column stays when a working record still owns it.
    fn discard_derived(
        &mut self,
        table: &str,
        column: &str,
        reason: String,
        outcome: &mut DropOutcome,
    ) -> Result<()> {
        if self.metadata.remove(table, column, Layer::Derived).is_none() {
            return Ok(());
        }
        if !self.metadata.exists(table, column, Some(Layer::Working)) {
            if self.store.has_column(table, column) {
                self.store.drop_column(table, column)?;
            }
            outcome.restored.retain(|c| c != column);
            if !outcome.dropped.iter().any(|c| c == column) {
                outcome.dropped.push(column.to_string());
            }
        }
        outcome.restore_failures.push(SkippedEntry {
            column: column.to_string(),
            reason,
        });
        Ok(())
    }

    /// Re-evaluates a derived definition over the current rows and stores it.
    fn recompute(&mut self, table: &str, record: &TransformRecord) -> Result<(), String> {
        let expr = parse(&record.expr).map_err(|e| format!("Parse error: {}", e.message))?;
        let mut refs = extract_column_refs(&expr);
        refs.extend(record.partition_by.iter().cloned());

        let columns = self.store.column_names(table).map_err(|e| e.to_string())?;
        let missing = missing_columns(&refs, columns.iter().map(String::as_str));
        if !missing.is_empty() {
            return Err(format!("Missing columns: {}", missing.join(", ")));
        }

        let rows = self.store.all_rows(table).map_err(|e| e.to_string())?;
        let options = ColumnOptions {
            partition_by: record.partition_by.as_deref(),
            ..Default::default()
        };
        let output = Evaluator::new(&self.registry)
            .evaluate_column(&expr, &rows, options)
            .map_err(|e| format!("Evaluation error: {}", e))?;

        let stored = if columns.contains(&record.column) {
            self.store
                .overwrite_column(table, &record.column, output.values, record.column_type)
        } else {
            self.store
                .add_column(table, &record.column, output.values, record.column_type)
        };
        stored.map_err(|e| e.to_string())
    }

    /// Source columns in storage order, then computed columns in declaration order.
    pub fn list_columns(&self, table: &str) -> Result<Vec<ColumnInfo>> {
        self.require_table(table)?;
        let mut columns = Vec::new();

        for name in self.store.column_names(table)? {
            if self.metadata.exists(table, &name, None) {
                continue;
            }
            columns.push(ColumnInfo {
                column_type: self.store.column_type(table, &name)?,
                name,
                layer: Layer::Source,
                expr: None,
                partition_by: None,
                shadows_derived: false,
            });
        }

        let mut listed = BTreeSet::new();
        for record in self.metadata.list(table, None) {
            if !listed.insert(record.column.clone()) {
                continue;
            }
            let shadowed = self.metadata.exists(table, &record.column, Some(Layer::Derived));
            let visible = self
                .metadata
                .get(table, &record.column, Layer::Working)
                .unwrap_or(&record);
            columns.push(ColumnInfo {
                name: visible.column.clone(),
                layer: visible.layer,
                column_type: visible.column_type,
                expr: Some(visible.expr.clone()),
                partition_by: visible.partition_by.clone(),
                shadows_derived: visible.layer == Layer::Working && shadowed,
            });
        }
        Ok(columns)
    }

    /// Replays the manifest entries of one table.
    pub fn replay(&mut self, table: &str) -> Result<ReplayReport> {
        self.require_table(table)?;
        let Some(mut manifest) = self.load_manifest() else {
            return Ok(ReplayReport::default());
        };
        let entries = manifest.tables.remove(table).unwrap_or_default();
        Ok(replay_manifest(
            &mut self.store,
            &mut self.metadata,
            &self.registry,
            table,
            &entries,
        ))
    }

    /// Replays every table in the manifest.
    ///
    /// Entries of tables the store does not have are reported as skipped.
    pub fn replay_all(&mut self) -> ReplayReport {
        let mut report = ReplayReport::default();
        let Some(manifest) = self.load_manifest() else {
            return report;
        };

        for (table, entries) in manifest.tables {
            if !self.store.has_table(&table) {
                warn!("Manifest lists unknown table '{}'", table);
                report.skipped.extend(entries.into_iter().map(|e| SkippedEntry {
                    column: e.column,
                    reason: format!("Unknown table: {}", table),
                }));
                continue;
            }
            report.extend(replay_manifest(
                &mut self.store,
                &mut self.metadata,
                &self.registry,
                &table,
                &entries,
            ));
        }
        report
    }

    fn load_manifest(&self) -> Option<ManifestData> {
        let path = self.config.manifest_path.as_deref()?;
        read_manifest(path)
    }

    /// Rewrites the manifest from the current derived records.
    fn persist(&self) -> Result<()> {
        if !self.config.persist {
            return Ok(());
        }
        if let Some(path) = &self.config.manifest_path {
            write_manifest(&self.metadata, &self.store.table_names(), path)?;
        }
        Ok(())
    }
}
