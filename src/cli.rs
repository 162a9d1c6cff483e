use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::import::IfExists;
use crate::normalize::MAX_FILE_SIZE_BYTES;

#[derive(Debug, Parser)]
#[command(author, version, about = "Load messy tabular files into a relational store", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Normalize a file and print per-column profile statistics
    Inspect(InspectArgs),
    /// List the worksheet names of a workbook file
    Sheets(SheetsArgs),
    /// Propose a column mapping against a live table
    Map(MapArgs),
    /// Normalize, map, and import a file into a table
    Import(ImportArgs),
    /// Show the bounded import history log
    History(HistoryArgs),
}

#[derive(Debug, Args)]
pub struct InputArgs {
    /// Input CSV/TSV or workbook file (.csv, .tsv, .xlsx, .xls, .xlsm, .xlsb, .ods)
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
    /// Delimiter override for delimited inputs (supports ',', 'tab', ';', '|')
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,
    /// Worksheet to import when the workbook has several sheets
    #[arg(long)]
    pub sheet: Option<String>,
    /// Merge every worksheet by outer-union of columns, tagging rows with source_sheet
    #[arg(long, conflicts_with = "sheet")]
    pub merge_sheets: bool,
    /// Maximum accepted file size in bytes
    #[arg(long, default_value_t = MAX_FILE_SIZE_BYTES)]
    pub max_bytes: u64,
}

#[derive(Debug, Args)]
pub struct InspectArgs {
    #[command(flatten)]
    pub input: InputArgs,
}

#[derive(Debug, Args)]
pub struct SheetsArgs {
    /// Workbook file to list
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
}

#[derive(Debug, Args)]
pub struct MapArgs {
    #[command(flatten)]
    pub input: InputArgs,
    /// SQLite database file
    #[arg(short = 'd', long = "db")]
    pub db: PathBuf,
    /// Target table whose columns the mapping is proposed against
    #[arg(short = 't', long = "table")]
    pub table: String,
    /// Write the proposed mapping to a YAML file instead of only printing it
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct ImportArgs {
    #[command(flatten)]
    pub input: InputArgs,
    /// SQLite database file
    #[arg(short = 'd', long = "db")]
    pub db: PathBuf,
    /// Target table to import into
    #[arg(short = 't', long = "table")]
    pub table: String,
    /// YAML mapping file overriding the suggested column mapping
    #[arg(short = 'm', long = "mapping")]
    pub mapping: Option<PathBuf>,
    /// Policy when the target table already exists
    #[arg(long = "if-exists", value_enum, default_value_t = IfExists::Append)]
    pub if_exists: IfExists,
    /// Rows per INSERT batch
    #[arg(long, default_value_t = crate::import::DEFAULT_BATCH_SIZE)]
    pub batch_size: usize,
    /// Create the target table (schema derived from column profiles) when missing
    #[arg(long)]
    pub create_table: bool,
    /// Check mapped values against declared column types before any write
    #[arg(long)]
    pub validate: bool,
    /// JSON history file to append the import record to
    #[arg(long)]
    pub history: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct HistoryArgs {
    /// JSON history file written by `import --history`
    #[arg(long)]
    pub history: PathBuf,
}

pub fn parse_delimiter(value: &str) -> Result<u8, String> {
    match value {
        "tab" | "\t" => Ok(b'\t'),
        "comma" | "," => Ok(b','),
        "|" | "pipe" => Ok(b'|'),
        ";" | "semicolon" => Ok(b';'),
        other => {
            let mut chars = other.chars();
            let first = chars
                .next()
                .ok_or_else(|| "Delimiter cannot be empty".to_string())?;
            if chars.next().is_some() {
                return Err("Delimiter must be a single character".to_string());
            }
            if !first.is_ascii() {
                return Err("Delimiter must be ASCII".to_string());
            }
            Ok(first as u8)
        }
    }
}
