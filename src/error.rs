use thiserror::Error;

/// Errors raised while turning a raw file into a canonical [`crate::dataset::Dataset`].
///
/// A failed normalization never yields a dataset; every variant is recoverable
/// at the pipeline boundary.
#[derive(Debug, Error)]
pub enum NormalizeError {
    #[error("file size {size} bytes exceeds the configured limit of {limit} bytes")]
    SizeLimit { size: u64, limit: u64 },

    #[error("unsupported file format '{0}'")]
    Format(String),

    #[error("could not decode file content with any supported encoding")]
    Encoding,

    #[error("dataset is empty after normalization")]
    EmptyDataset,

    #[error("column '{0}' sanitizes to an empty name")]
    Naming(String),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("workbook error: {0}")]
    Workbook(#[from] calamine::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised by the transactional writer.
///
/// Every variant rolls back any open transaction before it is returned, so a
/// failed import leaves the target table untouched. None are retried
/// automatically; retry policy belongs to the caller.
#[derive(Debug, Error)]
pub enum ImportError {
    #[error("invalid identifier '{0}'")]
    InvalidIdentifier(String),

    #[error("no database connection: {0}")]
    NoConnection(String),

    #[error("invalid target table: {0}")]
    InvalidTable(String),

    #[error("column '{0}' does not exist in the target table")]
    InvalidColumn(String),

    #[error("no data to import after applying the column mapping")]
    EmptyMappedData,

    #[error("pre-import validation failed: {0}")]
    Validation(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl From<rusqlite::Error> for ImportError {
    fn from(err: rusqlite::Error) -> Self {
        ImportError::Database(err.to_string())
    }
}
