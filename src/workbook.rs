//! Workbook (xlsx/xls/ods/...) access and multi-sheet reconciliation.
//!
//! Sheets come out of `calamine` as headerless typed grids; the shared
//! normalization tail in [`crate::normalize`] handles header promotion and
//! cleanup. Merging is an outer-union of columns because sheets in the same
//! workbook commonly carry slightly different column sets.

use std::io::Cursor;

use calamine::{Data, Reader, open_workbook_auto_from_rs};

use crate::{
    dataset::{Dataset, Value},
    error::NormalizeError,
    normalize::dedupe_names,
};

/// Provenance column appended to merged multi-sheet datasets.
pub const SOURCE_SHEET_COLUMN: &str = "source_sheet";

/// Lists worksheet names in workbook order.
pub fn sheet_names(bytes: &[u8]) -> Result<Vec<String>, NormalizeError> {
    let workbook = open_workbook_auto_from_rs(Cursor::new(bytes))?;
    Ok(workbook.sheet_names().to_vec())
}

/// Loads every worksheet as a `(name, grid)` pair in workbook order.
pub fn load_sheets(bytes: &[u8]) -> Result<Vec<(String, Vec<Vec<Value>>)>, NormalizeError> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes))?;
    let names = workbook.sheet_names().to_vec();
    let mut sheets = Vec::with_capacity(names.len());
    for name in names {
        let range = workbook.worksheet_range(&name)?;
        let grid = range
            .rows()
            .map(|row| row.iter().map(cell_value).collect())
            .collect();
        sheets.push((name, grid));
    }
    Ok(sheets)
}

fn cell_value(cell: &Data) -> Value {
    match cell {
        Data::Empty => Value::Null,
        Data::Int(i) => Value::Integer(*i),
        Data::Float(f) => Value::Float(*f),
        Data::Bool(b) => Value::Text(b.to_string()),
        Data::String(s) => {
            if s.trim().is_empty() {
                Value::Null
            } else {
                Value::Text(s.clone())
            }
        }
        Data::DateTime(dt) => Value::Text(dt.to_string()),
        Data::DateTimeIso(s) | Data::DurationIso(s) => Value::Text(s.clone()),
        Data::Error(e) => Value::Text(format!("{e:?}")),
    }
}

/// Concatenates independently normalized sheets by outer-union of columns.
///
/// The merged column order is first-seen across sheets, with
/// [`SOURCE_SHEET_COLUMN`] appended last; rows from a sheet lacking a union
/// column are null-filled there. Every row is tagged with its sheet of
/// origin.
pub fn merge_sheets(sheets: Vec<(String, Dataset)>) -> Dataset {
    let mut union: Vec<String> = Vec::new();
    for (_, dataset) in &sheets {
        for column in &dataset.columns {
            if !union.contains(column) {
                union.push(column.clone());
            }
        }
    }
    union.push(SOURCE_SHEET_COLUMN.to_string());
    // A data column named like the provenance column keeps its name; the
    // provenance column picks up a suffix instead.
    let columns = dedupe_names(union);
    let data_width = columns.len() - 1;

    let mut rows = Vec::new();
    for (sheet, dataset) in sheets {
        let positions: Vec<Option<usize>> = columns[..data_width]
            .iter()
            .map(|column| dataset.column_index(column))
            .collect();
        for row in dataset.rows {
            let mut merged: Vec<Value> = positions
                .iter()
                .map(|pos| pos.map_or(Value::Null, |idx| row[idx].clone()))
                .collect();
            merged.push(Value::Text(sheet.clone()));
            rows.push(merged);
        }
    }
    Dataset::new(columns, rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sheet(columns: &[&str], rows: Vec<Vec<Value>>) -> Dataset {
        Dataset::new(columns.iter().map(|c| c.to_string()).collect(), rows)
    }

    #[test]
    fn merge_takes_the_outer_union_and_null_fills_gaps() {
        let a = sheet(
            &["x", "y"],
            vec![vec![Value::Integer(1), Value::Integer(2)]],
        );
        let b = sheet(
            &["y", "z"],
            vec![vec![Value::Integer(3), Value::Integer(4)]],
        );
        let merged = merge_sheets(vec![("A".into(), a), ("B".into(), b)]);

        assert_eq!(merged.columns, vec!["x", "y", "z", SOURCE_SHEET_COLUMN]);
        assert_eq!(
            merged.rows[0],
            vec![
                Value::Integer(1),
                Value::Integer(2),
                Value::Null,
                Value::Text("A".into())
            ]
        );
        assert_eq!(
            merged.rows[1],
            vec![
                Value::Null,
                Value::Integer(3),
                Value::Integer(4),
                Value::Text("B".into())
            ]
        );
    }

    #[test]
    fn merge_keeps_sheet_order_for_union_columns() {
        let a = sheet(&["b"], vec![vec![Value::Integer(1)]]);
        let b = sheet(&["a"], vec![vec![Value::Integer(2)]]);
        let merged = merge_sheets(vec![("first".into(), a), ("second".into(), b)]);
        assert_eq!(merged.columns, vec!["b", "a", SOURCE_SHEET_COLUMN]);
    }

    #[test]
    fn merge_suffixes_provenance_when_a_sheet_owns_the_name() {
        let a = sheet(&[SOURCE_SHEET_COLUMN], vec![vec![Value::Integer(9)]]);
        let merged = merge_sheets(vec![("only".into(), a)]);
        assert_eq!(
            merged.columns,
            vec![
                SOURCE_SHEET_COLUMN.to_string(),
                format!("{SOURCE_SHEET_COLUMN}_1")
            ]
        );
    }
}
