//! The transactional, identifier-safe batch writer.
//!
//! Invariants:
//!
//! - No attacker-controlled string ever reaches an identifier position: the
//!   table and every mapped target column must match the strict identifier
//!   grammar AND exist in the live schema (or the to-be-created column set)
//!   before any statement is issued.
//! - The whole import runs inside one transaction. Rows travel in fixed-size
//!   batches for throughput, but a failure anywhere rolls back everything:
//!   the observable outcome is all-or-nothing at the table level.
//! - Nulls in mapped columns are written as empty text, not SQL NULL. This
//!   mirrors the writer's data contract; callers that need true NULL
//!   semantics must pre-filter.

use std::collections::HashSet;
use std::time::{Duration, Instant};

use clap::ValueEnum;
use log::debug;
use rusqlite::Transaction;

use crate::{
    dataset::{Dataset, Value},
    error::ImportError,
    mapping::ColumnMapping,
    profile::{ColumnKind, ColumnProfile, profile},
    store::{Store, is_valid_identifier, quote_identifier},
};

/// Default number of rows per INSERT batch.
pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// Ceiling on bound parameters per statement, kept under SQLite's
/// SQLITE_MAX_VARIABLE_NUMBER default of 32766.
const MAX_BOUND_VARS: usize = 32000;

/// Policy when the target table already exists.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum IfExists {
    /// Insert after the existing rows.
    #[default]
    Append,
    /// Delete the existing rows inside the import transaction first.
    Replace,
    /// Abort the import.
    Fail,
}

#[derive(Debug, Clone)]
pub struct ImportOptions {
    pub if_exists: IfExists,
    pub batch_size: usize,
    /// Check mapped values against declared numeric column types before any
    /// write.
    pub validate_before_import: bool,
    /// Create the target table (schema derived from column profiles) when it
    /// does not exist yet.
    pub create_table: bool,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            if_exists: IfExists::default(),
            batch_size: DEFAULT_BATCH_SIZE,
            validate_before_import: false,
            create_table: false,
        }
    }
}

/// Outcome of a committed import.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportOutcome {
    pub rows_affected: usize,
    pub batches: usize,
    pub duration: Duration,
}

/// Imports a normalized dataset into `table` under the given mapping.
///
/// Validation happens strictly before the write transaction opens; every
/// error path after that rolls the transaction back, so a failed import
/// leaves the table untouched.
pub fn import(
    store: &Store,
    dataset: &Dataset,
    table: &str,
    mapping: &ColumnMapping,
    options: &ImportOptions,
) -> Result<ImportOutcome, ImportError> {
    let started = Instant::now();

    // Mapping entries whose source column is absent from the dataset are
    // ignored rather than fatal; callers may reuse a saved mapping across
    // similar files.
    let pairs: Vec<(&str, &str)> = mapping
        .mapped_pairs()
        .into_iter()
        .filter(|(source, _)| dataset.column_index(source).is_some())
        .collect();
    if pairs.is_empty() {
        return Err(ImportError::EmptyMappedData);
    }

    if !is_valid_identifier(table) {
        return Err(ImportError::InvalidIdentifier(table.to_string()));
    }
    let mut seen: HashSet<&str> = HashSet::new();
    for (_, target) in &pairs {
        if !is_valid_identifier(target) {
            return Err(ImportError::InvalidIdentifier((*target).to_string()));
        }
        if !seen.insert(target) {
            return Err(ImportError::Unexpected(format!(
                "duplicate target column '{target}' in mapping"
            )));
        }
    }

    let exists = store.table_exists(table)?;
    if exists && options.if_exists == IfExists::Fail {
        return Err(ImportError::InvalidTable(format!(
            "table '{table}' already exists and the if-exists policy is fail"
        )));
    }
    if !exists && !options.create_table {
        return Err(ImportError::InvalidTable(format!(
            "table '{table}' does not exist"
        )));
    }

    let projected = project_mapped(dataset, &pairs);
    let profiles = profile(&projected);

    // Whitelist-by-existence: against the live schema for an existing table,
    // against the to-be-created column set otherwise.
    let live_columns = if exists {
        let live = store.table_columns(table)?;
        for (_, target) in &pairs {
            if !live.iter().any(|c| &c.name == target) {
                return Err(ImportError::InvalidColumn((*target).to_string()));
            }
        }
        Some(live)
    } else {
        None
    };

    if options.validate_before_import {
        if let Some(live) = &live_columns {
            validate_against_declared_types(&projected, live)?;
        }
    }

    if projected.row_count() == 0 {
        return Err(ImportError::EmptyMappedData);
    }
    let transformed = blank_nulls(projected);

    let mut conn = store.write_conn()?;
    let tx = conn.transaction()?;

    if !exists {
        create_table(&tx, table, &profiles)?;
        debug!("created table '{table}' with {} column(s)", profiles.len());
    } else if options.if_exists == IfExists::Replace {
        let deleted = tx.execute(&format!("DELETE FROM {}", quote_identifier(table)), [])?;
        debug!("replace policy removed {deleted} existing row(s) from '{table}'");
    }

    let batch_size = effective_batch_size(options.batch_size, transformed.columns.len());
    let mut rows_affected = 0usize;
    let mut batches = 0usize;
    for chunk in transformed.rows.chunks(batch_size) {
        rows_affected += insert_batch(&tx, table, &transformed.columns, chunk)?;
        batches += 1;
    }
    tx.commit()?;

    Ok(ImportOutcome {
        rows_affected,
        batches,
        duration: started.elapsed(),
    })
}

/// Rows per INSERT statement: the requested batch size, shrunk when the
/// column count would push `rows * columns` past [`MAX_BOUND_VARS`].
fn effective_batch_size(requested: usize, columns: usize) -> usize {
    (MAX_BOUND_VARS / columns.max(1)).min(requested).max(1)
}

/// Projects the dataset into only the mapped columns, renamed to their
/// target names. Unmapped source columns are dropped. Produces a new
/// dataset; the input is never mutated.
pub fn project_mapped(dataset: &Dataset, pairs: &[(&str, &str)]) -> Dataset {
    let selection: Vec<(usize, String)> = pairs
        .iter()
        .filter_map(|(source, target)| {
            dataset
                .column_index(source)
                .map(|idx| (idx, target.to_string()))
        })
        .collect();
    dataset.project(&selection)
}

/// Substitutes nulls with empty text to satisfy the writer's data contract.
fn blank_nulls(mut dataset: Dataset) -> Dataset {
    for row in &mut dataset.rows {
        for value in row.iter_mut() {
            if value.is_null() {
                *value = Value::Text(String::new());
            }
        }
    }
    dataset
}

fn validate_against_declared_types(
    projected: &Dataset,
    live: &[crate::store::TargetColumn],
) -> Result<(), ImportError> {
    for (idx, name) in projected.columns.iter().enumerate() {
        let declared = live
            .iter()
            .find(|c| &c.name == name)
            .map(|c| c.sql_type.to_ascii_uppercase())
            .unwrap_or_default();
        if !declared_type_is_numeric(&declared) {
            continue;
        }
        for (row_idx, value) in projected.column_values(idx).enumerate() {
            let ok = match value {
                Value::Null | Value::Integer(_) | Value::Float(_) => true,
                Value::Text(s) => s.trim().is_empty() || s.trim().parse::<f64>().is_ok(),
            };
            if !ok {
                return Err(ImportError::Validation(format!(
                    "row {}, column '{name}': value '{value}' does not fit declared type {declared}",
                    row_idx + 1
                )));
            }
        }
    }
    Ok(())
}

fn declared_type_is_numeric(declared: &str) -> bool {
    ["INT", "REAL", "NUMERIC", "FLOAT", "DOUBLE", "DECIMAL"]
        .iter()
        .any(|t| declared.starts_with(t) || declared.contains(t))
}

/// Derived CREATE TABLE, issued inside the write transaction so a creation
/// failure leaves nothing behind.
fn create_table(
    tx: &Transaction<'_>,
    table: &str,
    profiles: &[ColumnProfile],
) -> Result<(), ImportError> {
    let specs: Vec<String> = profiles
        .iter()
        .map(|p| {
            let sql_type = match p.kind {
                ColumnKind::Integer => "INTEGER",
                ColumnKind::Float => "REAL",
                ColumnKind::Text => "TEXT",
            };
            format!("{} {sql_type}", quote_identifier(&p.name))
        })
        .collect();
    let sql = format!(
        "CREATE TABLE {} ({})",
        quote_identifier(table),
        specs.join(", ")
    );
    tx.execute(&sql, [])?;
    Ok(())
}

/// One multi-row INSERT with bound value parameters. Identifier positions
/// hold only validated, quoted names; every cell travels as a parameter.
fn insert_batch(
    tx: &Transaction<'_>,
    table: &str,
    columns: &[String],
    rows: &[Vec<Value>],
) -> Result<usize, ImportError> {
    let column_list = columns
        .iter()
        .map(|c| quote_identifier(c))
        .collect::<Vec<_>>()
        .join(", ");
    let row_placeholders = format!("({})", vec!["?"; columns.len()].join(", "));
    let sql = format!(
        "INSERT INTO {} ({column_list}) VALUES {}",
        quote_identifier(table),
        vec![row_placeholders; rows.len()].join(", ")
    );

    let mut stmt = tx.prepare_cached(&sql)?;
    let params = rusqlite::params_from_iter(rows.iter().flat_map(|row| row.iter().map(sql_value)));
    let affected = stmt.execute(params)?;
    Ok(affected)
}

fn sql_value(value: &Value) -> rusqlite::types::Value {
    match value {
        Value::Null => rusqlite::types::Value::Null,
        Value::Integer(i) => rusqlite::types::Value::Integer(*i),
        Value::Float(f) => rusqlite::types::Value::Real(*f),
        Value::Text(s) => rusqlite::types::Value::Text(s.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Dataset {
        Dataset::new(
            vec!["name".into(), "amount".into(), "notes".into()],
            vec![
                vec![
                    Value::Text("ada".into()),
                    Value::Integer(10),
                    Value::Text("x".into()),
                ],
                vec![Value::Text("bob".into()), Value::Null, Value::Null],
            ],
        )
    }

    #[test]
    fn projection_drops_unmapped_and_renames() {
        let ds = sample();
        let projected = project_mapped(&ds, &[("amount", "amount_paid"), ("name", "customer")]);
        assert_eq!(projected.columns, vec!["amount_paid", "customer"]);
        assert_eq!(projected.rows[1][0], Value::Null);
        assert_eq!(projected.rows[1][1], Value::Text("bob".into()));
    }

    #[test]
    fn blank_nulls_writes_empties_not_null() {
        let ds = blank_nulls(sample());
        assert_eq!(ds.rows[1][1], Value::Text(String::new()));
        assert_eq!(ds.rows[1][2], Value::Text(String::new()));
    }

    #[test]
    fn batch_size_shrinks_to_respect_the_bind_limit() {
        assert_eq!(effective_batch_size(1000, 3), 1000);
        assert_eq!(effective_batch_size(1000, 40), 800);
        assert_eq!(effective_batch_size(1000, 33), 969);
        assert_eq!(effective_batch_size(0, 5), 1);
        assert_eq!(effective_batch_size(10, 100_000), 1);
    }

    #[test]
    fn declared_type_matching_is_prefix_tolerant() {
        assert!(declared_type_is_numeric("INTEGER"));
        assert!(declared_type_is_numeric("DECIMAL(10,2)"));
        assert!(declared_type_is_numeric("DOUBLE PRECISION"));
        assert!(!declared_type_is_numeric("TEXT"));
        assert!(!declared_type_is_numeric("VARCHAR(40)"));
    }
}
