// tests/engine_tests.rs

use std::path::Path;

use dolex_transform::engine::{ColumnInfo, DropOutcome};
use dolex_transform::storage::MemTable;
use dolex_transform::{
    ColumnSelector, ColumnStats, ColumnType, DependencyError, EngineConfig, FilterOp, Layer,
    MemoryStore, Row, RowFilter, StorageError, TableStore, TransformEngine, TransformError,
    TransformRequest, TransformSpec, ValidationError, Value,
    manifest::read_manifest,
};
use tempfile::TempDir;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn sales_store() -> MemoryStore {
    let mut store = MemoryStore::new();
    let rows: Vec<Row> = [(100.0, 60.0, "north"), (80.0, 20.0, "south"), (50.0, 45.0, "north")]
        .iter()
        .map(|(revenue, cost, region)| {
            Row::from([
                ("revenue".to_string(), Value::Number(*revenue)),
                ("cost".to_string(), Value::Number(*cost)),
                ("region".to_string(), Value::from(*region)),
            ])
        })
        .collect();
    let order: Vec<String> = ["revenue", "cost", "region"].map(String::from).to_vec();
    store.insert_table("sales", MemTable::from_rows(rows, &order));
    store
}

fn engine() -> TransformEngine<MemoryStore> {
    init_logging();
    TransformEngine::new(sales_store(), EngineConfig::in_memory())
}

fn persisted_engine(dir: &Path) -> TransformEngine<MemoryStore> {
    init_logging();
    let config = EngineConfig {
        manifest_path: Some(dir.join(".dolex.json")),
        persist: true,
    };
    TransformEngine::new(sales_store(), config)
}

fn create(engine: &mut TransformEngine<MemoryStore>, column: &str, expr: &str) {
    engine
        .transform("sales", TransformRequest::single(TransformSpec::new(column, expr)))
        .unwrap();
}

fn values(engine: &TransformEngine<MemoryStore>, column: &str) -> Vec<Value> {
    engine.store().column_values("sales", column).unwrap()
}

fn nums(values: &[f64]) -> Vec<Value> {
    values.iter().map(|n| Value::Number(*n)).collect()
}

// ============================================================================
// Create and overwrite
// ============================================================================

#[test]
fn test_create_working_column() {
    let mut engine = engine();
    let outcome = engine
        .transform(
            "sales",
            TransformRequest::single(TransformSpec::new("margin", "revenue - cost")),
        )
        .unwrap();

    let result = &outcome.columns[0];
    assert_eq!(result.layer, Layer::Working);
    assert_eq!(result.column_type, ColumnType::Numeric);
    assert!(!result.overwrote);
    assert_eq!(result.stats.min, Some(Value::Number(5.0)));
    assert_eq!(values(&engine, "margin"), nums(&[40.0, 60.0, 5.0]));
    assert!(engine.metadata().exists("sales", "margin", Some(Layer::Working)));
}

#[test]
fn test_overwrite_working_column() {
    let mut engine = engine();
    create(&mut engine, "margin", "revenue - cost");
    let outcome = engine
        .transform(
            "sales",
            TransformRequest::single(TransformSpec::new("margin", "margin * 2")),
        )
        .unwrap();
    assert!(outcome.columns[0].overwrote);
    assert_eq!(values(&engine, "margin"), nums(&[80.0, 120.0, 10.0]));
    assert_eq!(engine.metadata().list("sales", None).len(), 1);
}

#[test]
fn test_invalid_column_name() {
    let mut engine = engine();
    let err = engine
        .transform(
            "sales",
            TransformRequest::single(TransformSpec::new("net margin", "1")),
        )
        .unwrap_err();
    assert!(matches!(
        err,
        TransformError::Validation(ValidationError::InvalidColumnName(_))
    ));
}

#[test]
fn test_source_column_cannot_be_overwritten() {
    let mut engine = engine();
    let err = engine
        .transform(
            "sales",
            TransformRequest::single(TransformSpec::new("revenue", "revenue * 2")),
        )
        .unwrap_err();
    assert!(matches!(
        err,
        TransformError::Validation(ValidationError::SourceColumn(_))
    ));
    assert_eq!(values(&engine, "revenue"), nums(&[100.0, 80.0, 50.0]));
}

#[test]
fn test_missing_reference_is_rejected() {
    let mut engine = engine();
    let err = engine
        .transform(
            "sales",
            TransformRequest::single(TransformSpec::new("x", "revenue + tax")),
        )
        .unwrap_err();
    match err {
        TransformError::Dependency(DependencyError::MissingColumns { columns }) => {
            assert_eq!(columns, vec!["tax"]);
        }
        other => panic!("Expected missing columns, got {:?}", other),
    }
}

#[test]
fn test_parse_error_is_reported() {
    let mut engine = engine();
    let err = engine
        .transform(
            "sales",
            TransformRequest::single(TransformSpec::new("x", "revenue *")),
        )
        .unwrap_err();
    assert!(matches!(err, TransformError::Parse(_)));
}

#[test]
fn test_declared_type_must_match() {
    let mut engine = engine();
    let err = engine
        .transform(
            "sales",
            TransformRequest::single(
                TransformSpec::new("flag", "revenue * 2").with_type(ColumnType::Boolean),
            ),
        )
        .unwrap_err();
    assert!(matches!(
        err,
        TransformError::Validation(ValidationError::TypeMismatch { .. })
    ));

    let outcome = engine
        .transform(
            "sales",
            TransformRequest::single(
                TransformSpec::new("label", "region").with_type(ColumnType::Categorical),
            ),
        )
        .unwrap();
    assert_eq!(outcome.columns[0].column_type, ColumnType::Categorical);
}

#[test]
fn test_inferred_types() {
    let mut engine = engine();
    let outcome = engine
        .transform(
            "sales",
            TransformRequest::batch(vec![
                TransformSpec::new("big", "revenue > 70"),
                TransformSpec::new("label", r#"upper(region)"#),
                TransformSpec::new("day", r#"if_else(big, "2024-01-02", "2024-01-03")"#),
            ]),
        )
        .unwrap();
    let types: Vec<ColumnType> = outcome.columns.iter().map(|c| c.column_type).collect();
    assert_eq!(
        types,
        vec![ColumnType::Boolean, ColumnType::Categorical, ColumnType::Date]
    );
}

#[test]
fn test_filter_and_partition() {
    let mut engine = engine();
    let spec = TransformSpec::new("share", "pct_of_total(revenue)")
        .with_partition_by("region")
        .with_filter(vec![RowFilter::new("revenue", FilterOp::Gte, 60.0)]);
    engine
        .transform("sales", TransformRequest::single(spec))
        .unwrap();
    assert_eq!(
        values(&engine, "share"),
        vec![Value::Number(100.0), Value::Number(100.0), Value::Null]
    );
}

#[test]
fn test_unknown_table() {
    let mut engine = engine();
    let err = engine
        .transform("orders", TransformRequest::single(TransformSpec::new("x", "1")))
        .unwrap_err();
    assert!(matches!(
        err,
        TransformError::Validation(ValidationError::UnknownTable(_))
    ));
}

// ============================================================================
// Batches
// ============================================================================

#[test]
fn test_batch_sees_earlier_columns() {
    let mut engine = engine();
    let outcome = engine
        .transform(
            "sales",
            TransformRequest::batch(vec![
                TransformSpec::new("margin", "revenue - cost"),
                TransformSpec::new("margin_pct", "margin / revenue * 100"),
            ]),
        )
        .unwrap();
    assert_eq!(outcome.columns.len(), 2);
    assert_eq!(values(&engine, "margin_pct")[0], Value::Number(40.0));
}

#[test]
fn test_batch_is_all_or_nothing() {
    let mut engine = engine();
    let err = engine
        .transform(
            "sales",
            TransformRequest::batch(vec![
                TransformSpec::new("margin", "revenue - cost"),
                TransformSpec::new("broken", "missing_col_fn(score)"),
            ]),
        )
        .unwrap_err();
    assert!(matches!(
        err,
        TransformError::Dependency(DependencyError::MissingColumns { .. })
    ));
    assert!(!engine.store().has_column("sales", "margin"));
    assert!(engine.metadata().list("sales", None).is_empty());
}

#[test]
fn test_batch_evaluation_error_commits_nothing() {
    let mut engine = engine();
    let err = engine
        .transform(
            "sales",
            TransformRequest::batch(vec![
                TransformSpec::new("margin", "revenue - cost"),
                TransformSpec::new("bad", "region * 2"),
            ]),
        )
        .unwrap_err();
    match err {
        TransformError::Eval { column, .. } => assert_eq!(column, "bad"),
        other => panic!("Expected evaluation error, got {:?}", other),
    }
    assert!(!engine.store().has_column("sales", "margin"));
}

#[test]
fn test_batch_rejects_duplicate_names() {
    let mut engine = engine();
    let err = engine
        .transform(
            "sales",
            TransformRequest::batch(vec![
                TransformSpec::new("a", "1"),
                TransformSpec::new("a", "2"),
            ]),
        )
        .unwrap_err();
    assert!(matches!(
        err,
        TransformError::Validation(ValidationError::DuplicateColumn(_))
    ));
}

#[test]
fn test_request_from_json() {
    let mut engine = engine();
    let request: TransformRequest = serde_json::from_str(
        r#"{"transforms": [
            {"create": "margin", "expr": "revenue - cost", "type": "numeric"},
            {"create": "z", "expr": "zscore(margin)", "partitionBy": "region"}
        ]}"#,
    )
    .unwrap();
    engine.transform("sales", request).unwrap();

    let both: TransformRequest = serde_json::from_str(
        r#"{"create": "x", "expr": "1", "transforms": [{"create": "y", "expr": "2"}]}"#,
    )
    .unwrap();
    assert!(matches!(
        engine.transform("sales", both),
        Err(TransformError::Validation(ValidationError::ConflictingModes))
    ));
}

// ============================================================================
// Commit rollback
// ============================================================================

/// Delegates to a MemoryStore but refuses to add one column.
struct FailingStore {
    inner: MemoryStore,
    fail_on: &'static str,
}

impl TableStore for FailingStore {
    fn table_names(&self) -> Vec<String> {
        self.inner.table_names()
    }

    fn column_names(&self, table: &str) -> Result<Vec<String>, StorageError> {
        self.inner.column_names(table)
    }

    fn column_type(&self, table: &str, column: &str) -> Result<ColumnType, StorageError> {
        self.inner.column_type(table, column)
    }

    fn all_rows(&self, table: &str) -> Result<Vec<Row>, StorageError> {
        self.inner.all_rows(table)
    }

    fn row_count(&self, table: &str) -> Result<usize, StorageError> {
        self.inner.row_count(table)
    }

    fn column_values(&self, table: &str, column: &str) -> Result<Vec<Value>, StorageError> {
        self.inner.column_values(table, column)
    }

    fn add_column(
        &mut self,
        table: &str,
        column: &str,
        values: Vec<Value>,
        column_type: ColumnType,
    ) -> Result<(), StorageError> {
        if column == self.fail_on {
            return Err(StorageError::InvalidDataset {
                path: "memory".into(),
                message: "disk full".to_string(),
            });
        }
        self.inner.add_column(table, column, values, column_type)
    }

    fn overwrite_column(
        &mut self,
        table: &str,
        column: &str,
        values: Vec<Value>,
        column_type: ColumnType,
    ) -> Result<(), StorageError> {
        self.inner.overwrite_column(table, column, values, column_type)
    }

    fn drop_column(&mut self, table: &str, column: &str) -> Result<(), StorageError> {
        self.inner.drop_column(table, column)
    }
}

#[test]
fn test_storage_failure_rolls_back_committed_columns() {
    init_logging();
    let store = FailingStore {
        inner: sales_store(),
        fail_on: "second",
    };
    let mut engine = TransformEngine::new(store, EngineConfig::in_memory());
    create_on(&mut engine, "first", "revenue");

    let err = engine
        .transform(
            "sales",
            TransformRequest::batch(vec![
                TransformSpec::new("first", "revenue * 10"),
                TransformSpec::new("new_col", "1"),
                TransformSpec::new("second", "2"),
            ]),
        )
        .unwrap_err();
    assert!(matches!(err, TransformError::Storage(_)));

    let store = engine.store();
    assert!(!store.has_column("sales", "new_col"));
    assert_eq!(
        store.column_values("sales", "first").unwrap(),
        nums(&[100.0, 80.0, 50.0])
    );
    assert_eq!(
        engine.metadata().get("sales", "first", Layer::Working).unwrap().expr,
        "revenue"
    );
}

fn create_on<S: TableStore>(engine: &mut TransformEngine<S>, column: &str, expr: &str) {
    engine
        .transform("sales", TransformRequest::single(TransformSpec::new(column, expr)))
        .unwrap();
}

// ============================================================================
// Promote
// ============================================================================

#[test]
fn test_promote_writes_manifest() {
    let dir = TempDir::new().unwrap();
    let mut engine = persisted_engine(dir.path());
    create(&mut engine, "margin", "revenue - cost");

    let outcome = engine
        .promote("sales", &ColumnSelector::one("margin"))
        .unwrap();
    assert_eq!(outcome.promoted.len(), 1);
    assert!(!outcome.promoted[0].overwrote_existing);
    assert!(engine.metadata().exists("sales", "margin", Some(Layer::Derived)));
    assert!(!engine.metadata().exists("sales", "margin", Some(Layer::Working)));

    let manifest = read_manifest(&dir.path().join(".dolex.json")).unwrap();
    assert_eq!(manifest.tables["sales"][0].expr, "revenue - cost");
}

#[test]
fn test_promote_keeps_order() {
    let mut engine = engine();
    create(&mut engine, "a", "revenue");
    create(&mut engine, "b", "cost");
    let order = engine.metadata().get("sales", "b", Layer::Working).unwrap().order;
    engine.promote("sales", &ColumnSelector::one("b")).unwrap();
    assert_eq!(
        engine.metadata().get("sales", "b", Layer::Derived).unwrap().order,
        order
    );
}

#[test]
fn test_promote_over_existing_derived() {
    let mut engine = engine();
    create(&mut engine, "margin", "revenue - cost");
    engine.promote("sales", &ColumnSelector::All).unwrap();
    create(&mut engine, "margin", "revenue - cost - 1");

    let outcome = engine.promote("sales", &ColumnSelector::All).unwrap();
    assert!(outcome.promoted[0].overwrote_existing);
    assert_eq!(
        engine.metadata().get("sales", "margin", Layer::Derived).unwrap().expr,
        "revenue - cost - 1"
    );
    assert_eq!(engine.metadata().list("sales", None).len(), 1);
}

#[test]
fn test_promote_all() {
    let mut engine = engine();
    create(&mut engine, "a", "revenue");
    create(&mut engine, "b", "a + 1");
    let outcome = engine.promote("sales", &ColumnSelector::from("*")).unwrap();
    let promoted: Vec<&str> = outcome.promoted.iter().map(|p| p.column.as_str()).collect();
    assert_eq!(promoted, vec!["a", "b"]);
    assert!(engine.metadata().list("sales", Some(Layer::Working)).is_empty());
}

#[test]
fn test_promote_rejects_unpromoted_dependency() {
    let mut engine = engine();
    create(&mut engine, "a", "revenue");
    create(&mut engine, "b", "a + 1");
    let err = engine
        .promote("sales", &ColumnSelector::one("b"))
        .unwrap_err();
    match err {
        TransformError::Dependency(DependencyError::UnpromotedDependencies {
            column,
            dependencies,
        }) => {
            assert_eq!(column, "b");
            assert_eq!(dependencies, vec!["a"]);
        }
        other => panic!("Expected unpromoted dependencies, got {:?}", other),
    }
    assert!(engine.metadata().list("sales", Some(Layer::Derived)).is_empty());
}

#[test]
fn test_promote_rejects_cycle() {
    let mut engine = engine();
    create(&mut engine, "a", "revenue");
    create(&mut engine, "b", "a + 1");
    engine.promote("sales", &ColumnSelector::All).unwrap();
    // Redefine a in terms of b, then promote it over the derived a
    create(&mut engine, "a", "b * 2");
    let err = engine.promote("sales", &ColumnSelector::one("a")).unwrap_err();
    assert!(matches!(
        err,
        TransformError::Dependency(DependencyError::Cycle { .. })
    ));
    assert!(engine.metadata().exists("sales", "a", Some(Layer::Working)));
}

#[test]
fn test_promote_warns_about_filter() {
    let mut engine = engine();
    let spec = TransformSpec::new("north_rev", "revenue")
        .with_filter(vec![RowFilter::new("region", FilterOp::Eq, "north")]);
    engine
        .transform("sales", TransformRequest::single(spec))
        .unwrap();
    let outcome = engine.promote("sales", &ColumnSelector::All).unwrap();
    assert_eq!(outcome.warnings.len(), 1);
    assert!(outcome.warnings[0].contains("north_rev"));
}

#[test]
fn test_promote_unknown_column() {
    let mut engine = engine();
    let err = engine.promote("sales", &ColumnSelector::one("nope")).unwrap_err();
    assert!(matches!(
        err,
        TransformError::Validation(ValidationError::NotFound { .. })
    ));
}

#[test]
fn test_promote_rejects_self_reference() {
    let dir = TempDir::new().unwrap();
    let mut engine = persisted_engine(dir.path());
    create(&mut engine, "a", "revenue");
    create(&mut engine, "a", "a * 2");

    let err = engine.promote("sales", &ColumnSelector::one("a")).unwrap_err();
    match err {
        TransformError::Dependency(DependencyError::Cycle { column }) => assert_eq!(column, "a"),
        other => panic!("Expected a cycle, got {:?}", other),
    }
    assert!(engine.metadata().exists("sales", "a", Some(Layer::Working)));
    assert!(!dir.path().join(".dolex.json").exists());
}

#[test]
fn test_promote_rejects_dependency_on_working_shadow() {
    let dir = TempDir::new().unwrap();
    let mut engine = persisted_engine(dir.path());
    create(&mut engine, "margin", "revenue - cost");
    engine.promote("sales", &ColumnSelector::All).unwrap();
    create(&mut engine, "margin", "0");
    create(&mut engine, "b", "margin + 1");

    let err = engine.promote("sales", &ColumnSelector::one("b")).unwrap_err();
    match err {
        TransformError::Dependency(DependencyError::UnpromotedDependencies {
            column,
            dependencies,
        }) => {
            assert_eq!(column, "b");
            assert_eq!(dependencies, vec!["margin"]);
        }
        other => panic!("Expected unpromoted dependencies, got {:?}", other),
    }

    // Promoting the shadow along with b persists what the session computed
    engine.promote("sales", &ColumnSelector::All).unwrap();
    let mut reloaded = persisted_engine(dir.path());
    let report = reloaded.replay_all();
    assert!(report.skipped.is_empty());
    assert_eq!(values(&reloaded, "b"), nums(&[1.0, 1.0, 1.0]));
}

// ============================================================================
// Drop
// ============================================================================

#[test]
fn test_drop_derived_blocked_by_dependents() {
    let dir = TempDir::new().unwrap();
    let mut engine = persisted_engine(dir.path());
    create(&mut engine, "margin", "revenue - cost");
    create(&mut engine, "margin_pct", "margin / revenue");
    engine.promote("sales", &ColumnSelector::All).unwrap();

    let err = engine
        .drop("sales", &ColumnSelector::one("margin"), Layer::Derived)
        .unwrap_err();
    match err {
        TransformError::Dependency(DependencyError::HasDependents { column, dependents }) => {
            assert_eq!(column, "margin");
            assert_eq!(dependents, vec!["margin_pct"]);
        }
        other => panic!("Expected blocking dependents, got {:?}", other),
    }
    assert!(engine.store().has_column("sales", "margin"));

    // Leaves first
    engine
        .drop("sales", &ColumnSelector::one("margin_pct"), Layer::Derived)
        .unwrap();
    engine
        .drop("sales", &ColumnSelector::one("margin"), Layer::Derived)
        .unwrap();
    assert!(!engine.store().has_column("sales", "margin"));
    let manifest = read_manifest(&dir.path().join(".dolex.json")).unwrap();
    assert!(manifest.tables.is_empty());
}

#[test]
fn test_drop_all_derived_at_once() {
    let mut engine = engine();
    create(&mut engine, "margin", "revenue - cost");
    create(&mut engine, "margin_pct", "margin / revenue");
    engine.promote("sales", &ColumnSelector::All).unwrap();

    let outcome = engine
        .drop("sales", &ColumnSelector::All, Layer::Derived)
        .unwrap();
    assert_eq!(outcome.dropped, vec!["margin", "margin_pct"]);
    assert_eq!(
        engine.store().column_names("sales").unwrap(),
        vec!["revenue", "cost", "region"]
    );
}

#[test]
fn test_drop_source_column_is_refused() {
    let mut engine = engine();
    let err = engine
        .drop("sales", &ColumnSelector::one("revenue"), Layer::Derived)
        .unwrap_err();
    assert!(matches!(
        err,
        TransformError::Validation(ValidationError::SourceColumn(_))
    ));
    let err = engine
        .drop("sales", &ColumnSelector::All, Layer::Source)
        .unwrap_err();
    assert!(matches!(
        err,
        TransformError::Validation(ValidationError::InvalidLayer { .. })
    ));
}

#[test]
fn test_drop_working_column() {
    let mut engine = engine();
    create(&mut engine, "scratch", "cost * 2");
    let outcome = engine
        .drop("sales", &ColumnSelector::one("scratch"), Layer::Working)
        .unwrap();
    assert_eq!(
        outcome,
        DropOutcome {
            dropped: vec!["scratch".to_string()],
            ..Default::default()
        }
    );
    assert!(!engine.store().has_column("sales", "scratch"));
}

#[test]
fn test_drop_working_restores_derived_shadow() {
    let mut engine = engine();
    create(&mut engine, "margin", "revenue - cost");
    engine.promote("sales", &ColumnSelector::All).unwrap();
    create(&mut engine, "margin", "0");
    assert_eq!(values(&engine, "margin"), nums(&[0.0, 0.0, 0.0]));

    let outcome = engine
        .drop("sales", &ColumnSelector::one("margin"), Layer::Working)
        .unwrap();
    assert_eq!(outcome.restored, vec!["margin"]);
    assert!(outcome.restore_failures.is_empty());
    assert_eq!(values(&engine, "margin"), nums(&[40.0, 60.0, 5.0]));
    assert!(engine.metadata().exists("sales", "margin", Some(Layer::Derived)));
    assert!(!engine.metadata().exists("sales", "margin", Some(Layer::Working)));
}

#[test]
fn test_failed_restore_discards_derived_definition() {
    let dir = TempDir::new().unwrap();
    let mut engine = persisted_engine(dir.path());
    create(&mut engine, "x", "revenue * 2");
    create(&mut engine, "y", "x + 1");
    engine.promote("sales", &ColumnSelector::All).unwrap();

    // Shadow x with text so y's derived definition can no longer evaluate
    create(&mut engine, "x", "region");
    create(&mut engine, "y", "1");

    let outcome = engine
        .drop("sales", &ColumnSelector::one("y"), Layer::Working)
        .unwrap();
    assert!(outcome.restored.is_empty());
    assert_eq!(outcome.restore_failures.len(), 1);
    assert_eq!(outcome.restore_failures[0].column, "y");
    assert!(outcome.restore_failures[0].reason.starts_with("Evaluation error"));
    assert!(!engine.store().has_column("sales", "y"));
    assert!(!engine.metadata().exists("sales", "y", None));

    let manifest = read_manifest(&dir.path().join(".dolex.json")).unwrap();
    let columns: Vec<&str> = manifest.tables["sales"].iter().map(|e| e.column.as_str()).collect();
    assert_eq!(columns, vec!["x"]);
}

#[test]
fn test_failed_restore_discards_dependents() {
    let dir = TempDir::new().unwrap();
    let mut engine = persisted_engine(dir.path());
    create(&mut engine, "x", "revenue * 2");
    create(&mut engine, "y", "x + 1");
    create(&mut engine, "z", "y * 2");
    engine.promote("sales", &ColumnSelector::All).unwrap();

    create(&mut engine, "x", "region");
    create(&mut engine, "y", "1");

    let outcome = engine
        .drop("sales", &ColumnSelector::one("y"), Layer::Working)
        .unwrap();
    let failed: Vec<&str> = outcome
        .restore_failures
        .iter()
        .map(|f| f.column.as_str())
        .collect();
    assert_eq!(failed, vec!["y", "z"]);
    assert_eq!(outcome.restore_failures[1].reason, "Depends on discarded column: y");
    assert_eq!(outcome.dropped, vec!["y", "z"]);
    assert!(!engine.store().has_column("sales", "z"));
    assert!(!engine.metadata().exists("sales", "z", None));

    let mut reloaded = persisted_engine(dir.path());
    let report = reloaded.replay_all();
    assert_eq!(report.replayed, vec!["x"]);
    assert!(report.skipped.is_empty());
}

// ============================================================================
// Listing
// ============================================================================

#[test]
fn test_list_columns() {
    let mut engine = engine();
    create(&mut engine, "margin", "revenue - cost");
    engine.promote("sales", &ColumnSelector::All).unwrap();
    create(&mut engine, "scratch", "cost * 2");
    create(&mut engine, "margin", "revenue");

    let columns = engine.list_columns("sales").unwrap();
    let summary: Vec<(&str, Layer, bool)> = columns
        .iter()
        .map(|c| (c.name.as_str(), c.layer, c.shadows_derived))
        .collect();
    assert_eq!(
        summary,
        vec![
            ("revenue", Layer::Source, false),
            ("cost", Layer::Source, false),
            ("region", Layer::Source, false),
            ("margin", Layer::Working, true),
            ("scratch", Layer::Working, false),
        ]
    );
    assert_eq!(columns[3].expr.as_deref(), Some("revenue"));
    assert_eq!(columns[2].column_type, ColumnType::Categorical);
}

#[test]
fn test_column_info_serializes_camel_case() {
    let info = ColumnInfo {
        name: "z".to_string(),
        layer: Layer::Derived,
        column_type: ColumnType::Numeric,
        expr: Some("zscore(revenue)".to_string()),
        partition_by: Some("region".to_string()),
        shadows_derived: false,
    };
    let json = serde_json::to_value(&info).unwrap();
    assert_eq!(json["partitionBy"], "region");
    assert_eq!(json["type"], "numeric");
    assert_eq!(json["layer"], "derived");
    assert_eq!(json["shadowsDerived"], false);
}

// ============================================================================
// Replay
// ============================================================================

#[test]
fn test_replay_after_reload() {
    let dir = TempDir::new().unwrap();
    {
        let mut engine = persisted_engine(dir.path());
        engine
            .transform(
                "sales",
                TransformRequest::batch(vec![
                    TransformSpec::new("margin", "revenue - cost"),
                    TransformSpec::new("rank_in_region", "rank(margin)")
                        .with_partition_by("region"),
                ]),
            )
            .unwrap();
        engine.promote("sales", &ColumnSelector::All).unwrap();
    }

    // A fresh process: source data only
    let mut engine = persisted_engine(dir.path());
    assert!(!engine.store().has_column("sales", "margin"));

    let report = engine.replay_all();
    assert_eq!(report.replayed, vec!["margin", "rank_in_region"]);
    assert_eq!(values(&engine, "margin"), nums(&[40.0, 60.0, 5.0]));
    assert_eq!(values(&engine, "rank_in_region"), nums(&[2.0, 1.0, 1.0]));
    assert_eq!(
        engine.metadata().list("sales", Some(Layer::Derived)).len(),
        2
    );
}

#[test]
fn test_replay_leaves_source_column_alone() {
    let dir = TempDir::new().unwrap();
    {
        let mut engine = persisted_engine(dir.path());
        create(&mut engine, "bonus", "revenue * 2");
        engine.promote("sales", &ColumnSelector::All).unwrap();
    }

    // The dataset now ships its own bonus column
    let mut store = sales_store();
    store
        .add_column("sales", "bonus", nums(&[7.0, 7.0, 7.0]), ColumnType::Numeric)
        .unwrap();
    let config = EngineConfig {
        manifest_path: Some(dir.path().join(".dolex.json")),
        persist: true,
    };
    let mut engine = TransformEngine::new(store, config);

    let report = engine.replay_all();
    assert!(report.replayed.is_empty());
    assert_eq!(report.skipped[0].reason, "Column exists in source: bonus");
    assert_eq!(values(&engine, "bonus"), nums(&[7.0, 7.0, 7.0]));

    let err = engine
        .drop("sales", &ColumnSelector::one("bonus"), Layer::Derived)
        .unwrap_err();
    assert!(matches!(
        err,
        TransformError::Validation(ValidationError::SourceColumn(_))
    ));
    assert_eq!(values(&engine, "bonus"), nums(&[7.0, 7.0, 7.0]));
}

#[test]
fn test_replay_single_table() {
    let dir = TempDir::new().unwrap();
    {
        let mut engine = persisted_engine(dir.path());
        create(&mut engine, "margin", "revenue - cost");
        engine.promote("sales", &ColumnSelector::All).unwrap();
    }
    let mut engine = persisted_engine(dir.path());
    let report = engine.replay("sales").unwrap();
    assert_eq!(report.replayed, vec!["margin"]);
}

#[test]
fn test_replay_reports_unknown_tables() {
    let dir = TempDir::new().unwrap();
    std::fs::write(
        dir.path().join(".dolex.json"),
        r#"{"version": 1, "tables": {"returns": [{"column": "r", "expr": "1", "type": "numeric"}]}}"#,
    )
    .unwrap();
    let mut engine = persisted_engine(dir.path());
    let report = engine.replay_all();
    assert!(report.replayed.is_empty());
    assert_eq!(report.skipped[0].column, "r");
    assert!(report.skipped[0].reason.contains("returns"));
}

#[test]
fn test_replay_without_manifest() {
    let mut engine = engine();
    let report = engine.replay_all();
    assert!(report.replayed.is_empty());
    assert!(report.skipped.is_empty());
}

#[test]
fn test_in_memory_engine_never_writes() {
    let dir = TempDir::new().unwrap();
    let config = EngineConfig {
        manifest_path: Some(dir.path().join(".dolex.json")),
        persist: false,
    };
    let mut engine = TransformEngine::new(sales_store(), config);
    create(&mut engine, "margin", "revenue - cost");
    engine.promote("sales", &ColumnSelector::All).unwrap();
    assert!(!dir.path().join(".dolex.json").exists());
}

#[test]
fn test_stats_are_profiled_by_store() {
    let mut engine = engine();
    create(&mut engine, "margin", "revenue - cost");
    let stats: ColumnStats = engine.store().profile_column("sales", "margin").unwrap();
    assert_eq!(stats.max, Some(Value::Number(60.0)));
    assert_eq!(stats.mean, Some(35.0));
}
