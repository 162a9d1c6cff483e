//! Per-column statistics over a canonical dataset.
//!
//! Profiles feed quality reporting, the writer's derived CREATE TABLE
//! schema, and pre-import validation. Pure and recomputed on demand; never
//! persisted.

use std::collections::HashSet;

use crate::dataset::{Dataset, Value};

/// Broad inferred kind of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Integer,
    Float,
    Text,
}

impl ColumnKind {
    pub fn is_numeric(self) -> bool {
        matches!(self, ColumnKind::Integer | ColumnKind::Float)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ColumnKind::Integer => "integer",
            ColumnKind::Float => "float",
            ColumnKind::Text => "text",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnProfile {
    pub name: String,
    pub kind: ColumnKind,
    pub null_count: usize,
    pub null_percent: f64,
    /// Distinct non-null values.
    pub distinct_count: usize,
}

/// Profiles every column in dataset order. An empty dataset yields an empty
/// profile set, not an error. Single pass per column.
pub fn profile(dataset: &Dataset) -> Vec<ColumnProfile> {
    let row_count = dataset.row_count();
    dataset
        .columns
        .iter()
        .enumerate()
        .map(|(idx, name)| {
            let mut null_count = 0usize;
            let mut all_integer = true;
            let mut all_numeric = true;
            let mut distinct: HashSet<String> = HashSet::new();
            for value in dataset.column_values(idx) {
                match value {
                    Value::Null => null_count += 1,
                    Value::Integer(_) => {
                        distinct.insert(value.as_display());
                    }
                    Value::Float(_) => {
                        all_integer = false;
                        distinct.insert(value.as_display());
                    }
                    Value::Text(_) => {
                        all_integer = false;
                        all_numeric = false;
                        distinct.insert(value.as_display());
                    }
                }
            }
            let non_null = row_count - null_count;
            let kind = if non_null == 0 || !all_numeric {
                ColumnKind::Text
            } else if all_integer {
                ColumnKind::Integer
            } else {
                ColumnKind::Float
            };
            let null_percent = if row_count == 0 {
                0.0
            } else {
                null_count as f64 * 100.0 / row_count as f64
            };
            ColumnProfile {
                name: name.clone(),
                kind,
                null_count,
                null_percent,
                distinct_count: distinct.len(),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profile_reports_kind_nulls_and_distincts() {
        let ds = Dataset::new(
            vec!["id".into(), "score".into(), "tag".into()],
            vec![
                vec![Value::Integer(1), Value::Float(0.5), Value::Text("a".into())],
                vec![Value::Integer(2), Value::Null, Value::Text("a".into())],
                vec![Value::Integer(2), Value::Integer(4), Value::Null],
                vec![Value::Integer(3), Value::Float(0.5), Value::Text("b".into())],
            ],
        );
        let profiles = profile(&ds);
        assert_eq!(profiles.len(), 3);

        assert_eq!(profiles[0].kind, ColumnKind::Integer);
        assert_eq!(profiles[0].null_count, 0);
        assert_eq!(profiles[0].distinct_count, 3);

        assert_eq!(profiles[1].kind, ColumnKind::Float);
        assert_eq!(profiles[1].null_count, 1);
        assert_eq!(profiles[1].null_percent, 25.0);
        assert_eq!(profiles[1].distinct_count, 2);

        assert_eq!(profiles[2].kind, ColumnKind::Text);
        assert_eq!(profiles[2].distinct_count, 2);
    }

    #[test]
    fn all_null_column_profiles_as_text() {
        let ds = Dataset::new(
            vec!["blank".into()],
            vec![vec![Value::Null], vec![Value::Null]],
        );
        let profiles = profile(&ds);
        assert_eq!(profiles[0].kind, ColumnKind::Text);
        assert_eq!(profiles[0].null_percent, 100.0);
        assert_eq!(profiles[0].distinct_count, 0);
    }

    #[test]
    fn empty_dataset_profiles_to_empty_set() {
        let ds = Dataset::new(vec![], vec![]);
        assert!(profile(&ds).is_empty());
    }
}
