//! Relational store access.
//!
//! Read-path metadata lookups (existence checks, column introspection, row
//! counts) each use a short-lived auto-committing connection with a bounded
//! busy timeout, so a read never participates in, or blocks behind, the
//! write transaction. The writer acquires its own exclusive connection
//! through [`Store::write_conn`].
//!
//! Identifier hygiene: nothing in this module interpolates a name into SQL
//! unless it has passed [`is_valid_identifier`] and is wrapped by
//! [`quote_identifier`]. Metadata queries bind names as parameters instead.

use std::{
    path::{Path, PathBuf},
    sync::OnceLock,
    time::Duration,
};

use regex::Regex;
use rusqlite::Connection;

use crate::error::ImportError;

/// Busy timeout applied to read-path connections only; the write transaction
/// itself is not time-bounded.
const READ_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// A column descriptor fetched from the live schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetColumn {
    pub name: String,
    pub sql_type: String,
    pub nullable: bool,
}

/// Handle to a SQLite database file. Cheap to clone; connections are opened
/// per logical operation rather than held long-lived.
#[derive(Debug, Clone)]
pub struct Store {
    path: PathBuf,
}

impl Store {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_conn(&self) -> Result<Connection, ImportError> {
        let conn = Connection::open(&self.path)
            .map_err(|e| ImportError::NoConnection(e.to_string()))?;
        conn.busy_timeout(READ_BUSY_TIMEOUT)?;
        Ok(conn)
    }

    /// Exclusive connection for the write transaction. Callers own the
    /// transaction scope; no busy timeout is applied.
    pub(crate) fn write_conn(&self) -> Result<Connection, ImportError> {
        Connection::open(&self.path).map_err(|e| ImportError::NoConnection(e.to_string()))
    }

    /// Lists user tables in name order.
    pub fn tables(&self) -> Result<Vec<String>, ImportError> {
        let conn = self.read_conn()?;
        let mut stmt = conn.prepare(
            "SELECT name FROM sqlite_master \
             WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(names)
    }

    pub fn table_exists(&self, name: &str) -> Result<bool, ImportError> {
        let conn = self.read_conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
            [name],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// SQLite has no stored procedure objects; the boundary member exists for
    /// stores that do, and always reports absence here.
    pub fn procedure_exists(&self, _name: &str) -> Result<bool, ImportError> {
        Ok(false)
    }

    /// Ordered column descriptors for a table, fetched fresh (never cached).
    pub fn table_columns(&self, table: &str) -> Result<Vec<TargetColumn>, ImportError> {
        let conn = self.read_conn()?;
        let mut stmt = conn.prepare(
            "SELECT name, type, \"notnull\" FROM pragma_table_info(?1) ORDER BY cid",
        )?;
        let columns = stmt
            .query_map([table], |row| {
                Ok(TargetColumn {
                    name: row.get(0)?,
                    sql_type: row.get(1)?,
                    nullable: row.get::<_, i64>(2)? == 0,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(columns)
    }

    /// Row count for a validated, existing table.
    pub fn table_row_count(&self, table: &str) -> Result<u64, ImportError> {
        if !is_valid_identifier(table) {
            return Err(ImportError::InvalidIdentifier(table.to_string()));
        }
        if !self.table_exists(table)? {
            return Err(ImportError::InvalidTable(format!(
                "table '{table}' does not exist"
            )));
        }
        let conn = self.read_conn()?;
        let count: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", quote_identifier(table)),
            [],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }
}

/// Strict identifier grammar: a letter or underscore followed by up to 63
/// letters, digits, or underscores. Lexical shape only; existence in the
/// live schema is checked separately.
pub fn is_valid_identifier(name: &str) -> bool {
    static IDENT: OnceLock<Regex> = OnceLock::new();
    IDENT
        .get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]{0,63}$").expect("identifier regex"))
        .is_match(name)
}

/// Double-quotes an identifier for SQL. Only ever called on names that
/// passed [`is_valid_identifier`], which excludes the quote character.
pub fn quote_identifier(name: &str) -> String {
    format!("\"{name}\"")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifier_grammar_accepts_sane_names() {
        assert!(is_valid_identifier("orders"));
        assert!(is_valid_identifier("_tmp_2024"));
        assert!(is_valid_identifier("R06"));
        assert!(is_valid_identifier(&format!("a{}", "b".repeat(63))));
    }

    #[test]
    fn identifier_grammar_rejects_injection_shapes() {
        assert!(!is_valid_identifier(""));
        assert!(!is_valid_identifier("1orders"));
        assert!(!is_valid_identifier("orders; DROP TABLE users"));
        assert!(!is_valid_identifier("or\"ders"));
        assert!(!is_valid_identifier("orders`"));
        assert!(!is_valid_identifier("café"));
        assert!(!is_valid_identifier(&format!("a{}", "b".repeat(64))));
    }

    #[test]
    fn metadata_reads_use_fresh_state() {
        let dir = tempfile::tempdir().expect("temp dir");
        let store = Store::open(dir.path().join("meta.db"));

        assert!(!store.table_exists("widgets").expect("exists check"));
        {
            let conn = Connection::open(store.path()).expect("conn");
            conn.execute(
                "CREATE TABLE widgets (id INTEGER NOT NULL, label TEXT)",
                [],
            )
            .expect("create");
        }
        assert!(store.table_exists("widgets").expect("exists check"));
        assert_eq!(store.tables().expect("tables"), vec!["widgets"]);

        let columns = store.table_columns("widgets").expect("columns");
        assert_eq!(columns.len(), 2);
        assert_eq!(columns[0].name, "id");
        assert_eq!(columns[0].sql_type, "INTEGER");
        assert!(!columns[0].nullable);
        assert!(columns[1].nullable);

        assert!(!store.procedure_exists("anything").expect("procedures"));
        assert_eq!(store.table_row_count("widgets").expect("count"), 0);
    }
}
