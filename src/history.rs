//! Bounded, append-only log of import activity.
//!
//! Process-local under the single-flow invariant (at most one import at a
//! time); the CLI persists it as JSON between invocations.

use std::{collections::VecDeque, fs::File, io::BufReader, path::Path, time::Duration};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Maximum retained records; appending past this evicts the oldest first.
pub const HISTORY_CAPACITY: usize = 100;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ImportRecord {
    pub timestamp: DateTime<Utc>,
    pub filename: String,
    pub table: String,
    pub rows_imported: usize,
    pub success: bool,
    pub duration_ms: u64,
}

impl ImportRecord {
    pub fn success(filename: &str, table: &str, rows_imported: usize, duration: Duration) -> Self {
        Self {
            timestamp: Utc::now(),
            filename: filename.to_string(),
            table: table.to_string(),
            rows_imported,
            success: true,
            duration_ms: duration.as_millis() as u64,
        }
    }

    pub fn failure(filename: &str, table: &str, duration: Duration) -> Self {
        Self {
            timestamp: Utc::now(),
            filename: filename.to_string(),
            table: table.to_string(),
            rows_imported: 0,
            success: false,
            duration_ms: duration.as_millis() as u64,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HistoryLog {
    records: VecDeque<ImportRecord>,
}

impl HistoryLog {
    /// Appends a record, evicting oldest-first down to capacity. Loaded
    /// files may hold more than the capacity; they are trimmed here too.
    pub fn append(&mut self, record: ImportRecord) {
        while self.records.len() >= HISTORY_CAPACITY {
            self.records.pop_front();
        }
        self.records.push_back(record);
    }

    /// Records in append order, oldest first.
    pub fn records(&self) -> impl Iterator<Item = &ImportRecord> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Loads the log, treating a missing file as an empty log.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let file = File::open(path).with_context(|| format!("Opening history file {path:?}"))?;
        serde_json::from_reader(BufReader::new(file)).context("Parsing history JSON")
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let file = File::create(path).with_context(|| format!("Creating history file {path:?}"))?;
        serde_json::to_writer_pretty(file, self).context("Writing history JSON")
    }
}
