//! File normalization: raw bytes in, canonical [`Dataset`] out.
//!
//! The normalizer resolves text encoding, locates the true header row,
//! reconciles multi-sheet workbooks, sanitizes and deduplicates column names,
//! prunes empty rows/columns, and applies majority-heuristic numeric
//! coercion. All heuristics live behind named functions with named constants
//! so they can be tested in isolation:
//!
//! - [`detect_header_row`] scans the first [`HEADER_SCAN_ROWS`] rows.
//! - [`coerce_numeric_columns`] recasts a column when at least
//!   [`NUMERIC_MAJORITY`] of its non-null values parse as numeric.

use std::{collections::HashMap, fs, io, path::Path};

use encoding_rs::{Encoding, UTF_8, WINDOWS_1252};
use log::debug;

use crate::{
    dataset::{Dataset, Value},
    error::NormalizeError,
    workbook,
};

/// Default upper bound on raw file size, checked before any parse attempt.
pub const MAX_FILE_SIZE_BYTES: u64 = 50 * 1024 * 1024;

/// How many leading rows are scanned when hunting for the true header row.
pub const HEADER_SCAN_ROWS: usize = 20;

/// Fraction of non-null values that must parse as numeric before a column is
/// recast. Minority cells that fail to parse become null by design.
pub const NUMERIC_MAJORITY: f64 = 0.8;

/// Cell literals treated as null on ingestion, in addition to empty cells.
const NULL_MARKERS: &[&str] = &["NULL", "null", "N/A", "n/a", "NA", "na"];

/// Decode ladder, tried in order. `encoding_rs` follows the WHATWG registry,
/// where the `latin1` label aliases windows-1252 and the UTF-8 decoder strips
/// a leading BOM, so the ladder collapses to two concrete decoders while
/// still covering utf-8, utf-8-sig, latin-1, and cp1252 inputs.
const ENCODING_LADDER: &[&Encoding] = &[UTF_8, WINDOWS_1252];

const DELIMITED_EXTENSIONS: &[&str] = &["csv", "tsv"];
const WORKBOOK_EXTENSIONS: &[&str] = &["xlsx", "xls", "xlsm", "xlsb", "ods"];

/// An uploaded file: byte content plus the caller-declared name and size.
#[derive(Debug, Clone)]
pub struct RawFile {
    pub name: String,
    pub size: u64,
    pub bytes: Vec<u8>,
}

impl RawFile {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        let size = bytes.len() as u64;
        Self {
            name: name.into(),
            size,
            bytes,
        }
    }

    pub fn from_path(path: &Path) -> io::Result<Self> {
        let bytes = fs::read(path)?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Ok(Self::new(name, bytes))
    }
}

/// Which worksheet(s) to normalize when the input is a workbook.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SheetSelection {
    /// Use the first sheet. For single-sheet workbooks this is the only
    /// sensible choice; for multi-sheet workbooks callers should select a
    /// sheet by name or merge.
    #[default]
    First,
    /// Use the named sheet.
    Name(String),
    /// Normalize every sheet independently and concatenate them by
    /// outer-union of columns, tagging each row with a `source_sheet` column.
    MergeAll,
}

#[derive(Debug, Clone)]
pub struct NormalizeOptions {
    pub max_size: u64,
    /// Delimiter override; resolved from the file extension when `None`.
    pub delimiter: Option<u8>,
    pub sheet: SheetSelection,
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        Self {
            max_size: MAX_FILE_SIZE_BYTES,
            delimiter: None,
            sheet: SheetSelection::default(),
        }
    }
}

/// Normalizes a raw file into a canonical dataset.
pub fn normalize(raw: &RawFile, options: &NormalizeOptions) -> Result<Dataset, NormalizeError> {
    if raw.size > options.max_size {
        return Err(NormalizeError::SizeLimit {
            size: raw.size,
            limit: options.max_size,
        });
    }

    let extension = file_extension(&raw.name);
    if DELIMITED_EXTENSIONS.contains(&extension.as_str()) {
        let delimiter = options
            .delimiter
            .unwrap_or(if extension == "tsv" { b'\t' } else { b',' });
        let text = decode_text(&raw.bytes)?;
        let grid = parse_delimited(&text, delimiter)?;
        dataset_from_grid(grid)
    } else if WORKBOOK_EXTENSIONS.contains(&extension.as_str()) {
        normalize_workbook(raw, &options.sheet)
    } else {
        Err(NormalizeError::Format(extension))
    }
}

/// Lists the worksheet names of a workbook file so a caller can pick one.
pub fn sheet_names(raw: &RawFile) -> Result<Vec<String>, NormalizeError> {
    let extension = file_extension(&raw.name);
    if !WORKBOOK_EXTENSIONS.contains(&extension.as_str()) {
        return Err(NormalizeError::Format(extension));
    }
    workbook::sheet_names(&raw.bytes)
}

fn normalize_workbook(
    raw: &RawFile,
    selection: &SheetSelection,
) -> Result<Dataset, NormalizeError> {
    let sheets = workbook::load_sheets(&raw.bytes)?;
    if sheets.is_empty() {
        return Err(NormalizeError::EmptyDataset);
    }

    match selection {
        SheetSelection::First => {
            let Some((name, grid)) = sheets.into_iter().next() else {
                return Err(NormalizeError::EmptyDataset);
            };
            debug!("normalizing first sheet '{name}'");
            dataset_from_grid(grid)
        }
        SheetSelection::Name(wanted) => {
            let (name, grid) = sheets
                .into_iter()
                .find(|(name, _)| name == wanted)
                .ok_or_else(|| NormalizeError::Format(format!("sheet '{wanted}' not found")))?;
            debug!("normalizing selected sheet '{name}'");
            dataset_from_grid(grid)
        }
        SheetSelection::MergeAll => {
            let mut normalized = Vec::with_capacity(sheets.len());
            for (name, grid) in sheets {
                // Sheets in the same workbook commonly differ slightly in
                // column sets, so each is normalized on its own before the
                // outer-union concatenation.
                match dataset_from_grid(grid) {
                    Ok(ds) => normalized.push((name, ds)),
                    Err(NormalizeError::EmptyDataset) => {
                        debug!("skipping empty sheet '{name}' during merge");
                    }
                    Err(err) => return Err(err),
                }
            }
            if normalized.is_empty() {
                return Err(NormalizeError::EmptyDataset);
            }
            Ok(workbook::merge_sheets(normalized))
        }
    }
}

fn file_extension(name: &str) -> String {
    Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or("")
        .to_ascii_lowercase()
}

/// Walks the encoding ladder and returns the first clean decode.
pub fn decode_text(bytes: &[u8]) -> Result<String, NormalizeError> {
    for encoding in ENCODING_LADDER {
        let (text, _, had_errors) = encoding.decode(bytes);
        if !had_errors {
            debug!("decoded input as {}", encoding.name());
            return Ok(text.into_owned());
        }
    }
    Err(NormalizeError::Encoding)
}

/// Parses delimited text into a headerless grid of typed cells.
///
/// The reader is flexible: ragged rows are padded with nulls later, when the
/// header row fixes the column count.
fn parse_delimited(text: &str, delimiter: u8) -> Result<Vec<Vec<Value>>, NormalizeError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .delimiter(delimiter)
        .double_quote(true)
        .flexible(true)
        .from_reader(text.as_bytes());

    let mut grid = Vec::new();
    for record in reader.records() {
        let record = record?;
        grid.push(record.iter().map(cell_from_text).collect());
    }
    Ok(grid)
}

fn cell_from_text(raw: &str) -> Value {
    let trimmed = raw.trim();
    if trimmed.is_empty() || NULL_MARKERS.contains(&trimmed) {
        Value::Null
    } else {
        Value::Text(raw.to_string())
    }
}

/// Finds the true header row: the first of the leading [`HEADER_SCAN_ROWS`]
/// rows that contains a usable (non-blank, non-placeholder) cell. Handles
/// files with banner rows or blank leading lines.
pub fn detect_header_row(grid: &[Vec<Value>]) -> Option<usize> {
    grid.iter()
        .take(HEADER_SCAN_ROWS)
        .position(|row| row.iter().any(header_cell_usable))
}

fn header_cell_usable(cell: &Value) -> bool {
    match cell {
        Value::Null => false,
        // Placeholder names that spreadsheet tooling generates for blank
        // header cells are no better than blanks.
        Value::Text(s) => {
            let trimmed = s.trim();
            !trimmed.is_empty() && !trimmed.starts_with("Unnamed")
        }
        _ => true,
    }
}

/// Shared tail of the pipeline: header promotion, name sanitization,
/// emptiness pruning, and numeric coercion over a headerless grid.
pub(crate) fn dataset_from_grid(grid: Vec<Vec<Value>>) -> Result<Dataset, NormalizeError> {
    let header_idx = detect_header_row(&grid).ok_or(NormalizeError::EmptyDataset)?;
    debug!("promoted row {header_idx} to header");

    let header = &grid[header_idx];
    let column_count = header.len();
    // Blank header cells get positional placeholder names; if their columns
    // hold no data they fall to the emptiness pruning below anyway.
    let raw_names: Vec<String> = header
        .iter()
        .enumerate()
        .map(|(idx, cell)| {
            let name = cell.as_display();
            if name.trim().is_empty() {
                format!("unnamed_{idx}")
            } else {
                name
            }
        })
        .collect();
    let columns = sanitize_columns(&raw_names)?;

    let mut rows: Vec<Vec<Value>> = Vec::with_capacity(grid.len() - header_idx - 1);
    for mut row in grid.into_iter().skip(header_idx + 1) {
        row.resize(column_count, Value::Null);
        row.truncate(column_count);
        rows.push(row);
    }

    let (columns, rows) = prune_empty(columns, rows);
    if columns.is_empty() || rows.is_empty() {
        return Err(NormalizeError::EmptyDataset);
    }

    let mut dataset = Dataset::new(columns, rows);
    coerce_numeric_columns(&mut dataset);
    Ok(dataset)
}

/// Sanitizes one raw header cell into a canonical column name.
///
/// Trims, strips characters outside the word/space class, collapses
/// whitespace runs to a single underscore, trims leading/trailing
/// underscores, and lowercases. May return an empty string; the caller
/// rejects those.
pub fn sanitize_column_name(raw: &str) -> String {
    let filtered: String = raw
        .trim()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || c.is_whitespace())
        .collect();

    let mut out = String::with_capacity(filtered.len());
    let mut in_whitespace = false;
    for c in filtered.chars() {
        if c.is_whitespace() {
            in_whitespace = true;
        } else {
            if in_whitespace && !out.is_empty() {
                out.push('_');
            }
            in_whitespace = false;
            out.push(c.to_ascii_lowercase());
        }
    }
    out.trim_matches('_').to_string()
}

fn sanitize_columns(raw_names: &[String]) -> Result<Vec<String>, NormalizeError> {
    let mut sanitized = Vec::with_capacity(raw_names.len());
    for raw in raw_names {
        let name = sanitize_column_name(raw);
        if name.is_empty() {
            return Err(NormalizeError::Naming(raw.clone()));
        }
        sanitized.push(name);
    }
    Ok(dedupe_names(sanitized))
}

/// Disambiguates duplicate names by appending `_1`, `_2`, ... in first-seen
/// order. Deterministic and stable; suffixed candidates that themselves
/// collide keep counting up.
pub fn dedupe_names(names: Vec<String>) -> Vec<String> {
    let mut taken: HashMap<String, usize> = HashMap::new();
    let mut out = Vec::with_capacity(names.len());
    for name in names {
        if !taken.contains_key(&name) {
            taken.insert(name.clone(), 0);
            out.push(name);
            continue;
        }
        let mut suffix = taken[&name] + 1;
        let mut candidate = format!("{name}_{suffix}");
        while taken.contains_key(&candidate) {
            suffix += 1;
            candidate = format!("{name}_{suffix}");
        }
        taken.insert(name, suffix);
        taken.insert(candidate.clone(), 0);
        out.push(candidate);
    }
    out
}

/// Drops fully-null rows and fully-null columns. Both masks are evaluated
/// against the incoming grid before either applies, so evaluation order
/// cannot change the result.
fn prune_empty(columns: Vec<String>, rows: Vec<Vec<Value>>) -> (Vec<String>, Vec<Vec<Value>>) {
    let keep_row: Vec<bool> = rows
        .iter()
        .map(|row| row.iter().any(|v| !v.is_null()))
        .collect();
    let keep_col: Vec<bool> = (0..columns.len())
        .map(|idx| rows.iter().any(|row| !row[idx].is_null()))
        .collect();

    let kept_columns = columns
        .into_iter()
        .zip(&keep_col)
        .filter_map(|(name, keep)| keep.then_some(name))
        .collect();
    let kept_rows = rows
        .into_iter()
        .zip(&keep_row)
        .filter_map(|(row, keep)| {
            keep.then(|| {
                row.into_iter()
                    .zip(&keep_col)
                    .filter_map(|(v, keep)| keep.then_some(v))
                    .collect()
            })
        })
        .collect();
    (kept_columns, kept_rows)
}

/// Majority-heuristic numeric coercion.
///
/// For every column that is not already fully numeric, attempts a numeric
/// parse of each non-null value after stripping thousands separators and
/// currency symbols. If the parsed fraction reaches [`NUMERIC_MAJORITY`],
/// the whole column is recast and unparsable cells become null.
pub fn coerce_numeric_columns(dataset: &mut Dataset) {
    for idx in 0..dataset.column_count() {
        let mut non_null = 0usize;
        let mut parsed = 0usize;
        let mut already_numeric = true;
        for value in dataset.column_values(idx) {
            match value {
                Value::Null => {}
                Value::Integer(_) | Value::Float(_) => {
                    non_null += 1;
                    parsed += 1;
                }
                Value::Text(s) => {
                    already_numeric = false;
                    non_null += 1;
                    if parse_numeric(s).is_some() {
                        parsed += 1;
                    }
                }
            }
        }
        if already_numeric || non_null == 0 {
            continue;
        }
        let ratio = parsed as f64 / non_null as f64;
        if ratio < NUMERIC_MAJORITY {
            continue;
        }
        debug!(
            "recasting column '{}' as numeric ({parsed}/{non_null} values parse)",
            dataset.columns[idx]
        );
        for row in &mut dataset.rows {
            if let Value::Text(s) = &row[idx] {
                row[idx] = parse_numeric(s).unwrap_or(Value::Null);
            }
        }
    }
}

/// Parses a cell as a number after stripping `,` separators, `$` currency
/// markers, and surrounding whitespace.
fn parse_numeric(raw: &str) -> Option<Value> {
    let cleaned: String = raw
        .trim()
        .chars()
        .filter(|c| *c != ',' && *c != '$')
        .collect();
    if cleaned.is_empty() {
        return None;
    }
    if let Ok(i) = cleaned.parse::<i64>() {
        return Some(Value::Integer(i));
    }
    cleaned.parse::<f64>().ok().map(Value::Float)
}
