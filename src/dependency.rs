//! Column dependency graph over transform records.
//!
//! Edges run from a record to every column its expression references. Only
//! edges between records in the same set matter for ordering; references to
//! source columns are leaves.

use std::collections::{BTreeMap, BTreeSet};

use thiserror::Error;

use crate::{ast::Expr, metadata::TransformRecord, parser::parse};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum DependencyError {
    /// Expression references columns the table does not have
    #[error("Missing columns: {}", .columns.join(", "))]
    MissingColumns { columns: Vec<String> },

    /// Derived definitions reference each other in a loop
    #[error("Circular dependency detected at column '{column}'")]
    Cycle { column: String },

    /// Dropping the column would orphan derived columns built on it
    #[error(
        "Cannot drop '{column}': derived columns depend on it: {}",
        .dependents.join(", ")
    )]
    HasDependents {
        column: String,
        dependents: Vec<String>,
    },

    /// Promotion would persist a column whose inputs are session-only
    #[error(
        "Cannot promote '{column}': it depends on working columns not promoted with it: {}",
        .dependencies.join(", ")
    )]
    UnpromotedDependencies {
        column: String,
        dependencies: Vec<String>,
    },

    /// A stored expression no longer parses
    #[error("Cannot parse expression of '{column}': {message}")]
    InvalidExpression { column: String, message: String },
}

/// Every column name referenced anywhere in the tree.
pub fn extract_column_refs(expr: &Expr) -> BTreeSet<String> {
    let mut refs = BTreeSet::new();
    collect_refs(expr, &mut refs);
    refs
}

fn collect_refs(expr: &Expr, refs: &mut BTreeSet<String>) {
    match expr {
        Expr::Column(name) => {
            refs.insert(name.clone());
        }
        Expr::BinaryOp { left, right, .. } => {
            collect_refs(left, refs);
            collect_refs(right, refs);
        }
        Expr::UnaryOp { operand, .. } => collect_refs(operand, refs),
        Expr::Call { args, .. } => args.iter().for_each(|arg| collect_refs(arg, refs)),
        Expr::Array(elements) => elements.iter().for_each(|e| collect_refs(e, refs)),
        Expr::Number(_) | Expr::String(_) | Expr::Boolean(_) => {}
    }
}

/// Columns a record needs before it can be computed: expression refs plus `partitionBy`.
///
/// Filter fields are not included; a replayed record has no filter.
pub fn record_dependencies(record: &TransformRecord) -> Result<BTreeSet<String>, DependencyError> {
    let expr = parse(&record.expr).map_err(|e| DependencyError::InvalidExpression {
        column: record.column.clone(),
        message: e.message,
    })?;
    let mut deps = extract_column_refs(&expr);
    if let Some(partition) = &record.partition_by {
        deps.insert(partition.clone());
    }
    Ok(deps)
}

/// Names in `refs` that `available` does not contain, sorted.
pub fn missing_columns<'a, I>(refs: &BTreeSet<String>, available: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let available: BTreeSet<&str> = available.into_iter().collect();
    refs.iter()
        .filter(|name| !available.contains(name.as_str()))
        .cloned()
        .collect()
}

/// Orders records so each appears after every record it references.
///
/// Depth-first from each record in declaration order, visiting a record's
/// dependencies (also in declaration order) before the record itself. A
/// record referencing its own column is a cycle: replay has no earlier value
/// of that column to read.
pub fn topological_sort(
    records: &[TransformRecord],
) -> Result<Vec<TransformRecord>, DependencyError> {
    let mut ordered_records: Vec<&TransformRecord> = records.iter().collect();
    ordered_records.sort_by_key(|r| r.order);

    let by_column: BTreeMap<&str, &TransformRecord> = ordered_records
        .iter()
        .map(|r| (r.column.as_str(), *r))
        .collect();

    let mut deps: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for record in &ordered_records {
        let refs = record_dependencies(record)?;
        let mut edges: Vec<&TransformRecord> = refs
            .iter()
            .filter_map(|name| by_column.get(name.as_str()).copied())
            .collect();
        edges.sort_by_key(|r| r.order);
        deps.insert(
            record.column.as_str(),
            edges.iter().map(|r| r.column.as_str()).collect(),
        );
    }

    let mut ordered: Vec<&str> = Vec::new();
    let mut visited: BTreeSet<&str> = BTreeSet::new();
    let mut visiting: BTreeSet<&str> = BTreeSet::new();

    for record in &ordered_records {
        dfs(
            record.column.as_str(),
            &deps,
            &mut ordered,
            &mut visited,
            &mut visiting,
        )?;
    }

    Ok(ordered
        .into_iter()
        .filter_map(|name| by_column.get(name).map(|r| (*r).clone()))
        .collect())
}

fn dfs<'a>(
    node: &'a str,
    deps: &BTreeMap<&'a str, Vec<&'a str>>,
    ordered: &mut Vec<&'a str>,
    visited: &mut BTreeSet<&'a str>,
    visiting: &mut BTreeSet<&'a str>,
) -> Result<(), DependencyError> {
    if visiting.contains(node) {
        return Err(DependencyError::Cycle {
            column: node.to_string(),
        });
    }
    if visited.contains(node) {
        return Ok(());
    }
    visiting.insert(node);
    for dep in deps.get(node).into_iter().flatten() {
        dfs(*dep, deps, ordered, visited, visiting)?;
    }
    visiting.remove(node);
    visited.insert(node);
    ordered.push(node);
    Ok(())
}

/// Records that reference `column` directly or through other records, in declaration order.
///
/// Records whose expression no longer parses cannot be proven independent and
/// count as dependents only if their source text mentions the column name.
pub fn find_dependents(column: &str, records: &[TransformRecord]) -> Vec<String> {
    let mut refs_by_column: BTreeMap<&str, BTreeSet<String>> = BTreeMap::new();
    for record in records {
        let refs = match record_dependencies(record) {
            Ok(refs) => refs,
            Err(_) if record.expr.contains(column) => BTreeSet::from([column.to_string()]),
            Err(_) => BTreeSet::new(),
        };
        refs_by_column.insert(record.column.as_str(), refs);
    }

    let mut found: BTreeSet<&str> = BTreeSet::new();
    let mut frontier: Vec<&str> = vec![column];
    while let Some(target) = frontier.pop() {
        for (&name, refs) in &refs_by_column {
            if name != column && !found.contains(name) && refs.contains(target) {
                found.insert(name);
                frontier.push(name);
            }
        }
    }

    let mut dependents: Vec<&TransformRecord> = records
        .iter()
        .filter(|r| found.contains(r.column.as_str()))
        .collect();
    dependents.sort_by_key(|r| r.order);
    dependents.into_iter().map(|r| r.column.clone()).collect()
}
