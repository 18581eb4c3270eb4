//! Centralized error handling for tablekeeper.
//!
//! One crate-wide error enum covers the whole taxonomy: fetch failures that
//! must skip a dataset without touching its files, the empty-fetch guard,
//! integrity signals (checksum mismatch, missing backup), and the ambient
//! I/O and serialization carriers. Callers match on variants to decide
//! whether a failure is isolated to one dataset or fatal.

use std::fmt;
use std::path::PathBuf;

/// Main error type for tablekeeper operations.
#[derive(Debug)]
pub enum TablekeeperError {
    /// I/O errors (file operations, directory creation, etc.)
    Io(std::io::Error),

    /// Network or timeout failure while fetching a page. Processing of the
    /// affected dataset stops; its existing backups stay untouched.
    Fetch(String),

    /// A fetch produced zero rows. Merging would silently erase existing
    /// data, so the reconciler refuses unless explicitly overridden.
    EmptyFetch,

    /// Verification failed and there is no CSV backup to restore from.
    /// Unrecoverable for that sheet; surfaced to the operator.
    BackupMissing { dataset: String, sheet: String },

    /// A sheet's content no longer hashes to the recorded checksum.
    /// Internal signal for the restoration path, logged as tampering.
    ChecksumMismatch { dataset: String, sheet: String },

    /// The spreadsheet file does not exist.
    WorkbookMissing(PathBuf),

    /// The spreadsheet file exists but contains no sheets.
    EmptyWorkbook(PathBuf),

    /// CSV serialization/parsing errors
    Csv(String),

    /// Spreadsheet (xlsx) read/write errors
    Spreadsheet(String),

    /// Configuration errors
    Config(String),

    /// File not found or invalid path
    InvalidPath(String),

    /// Generic error with context
    Other(String),
}

impl fmt::Display for TablekeeperError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::Fetch(msg) => write!(f, "Fetch error: {msg}"),
            Self::EmptyFetch => write!(f, "Fetch produced zero rows; refusing to merge"),
            Self::BackupMissing { dataset, sheet } => {
                write!(f, "No CSV backup for dataset '{dataset}' sheet '{sheet}'")
            }
            Self::ChecksumMismatch { dataset, sheet } => {
                write!(f, "Checksum mismatch for dataset '{dataset}' sheet '{sheet}'")
            }
            Self::WorkbookMissing(path) => {
                write!(f, "Spreadsheet file not found: {}", path.display())
            }
            Self::EmptyWorkbook(path) => {
                write!(f, "Spreadsheet file has no sheets: {}", path.display())
            }
            Self::Csv(msg) => write!(f, "CSV error: {msg}"),
            Self::Spreadsheet(msg) => write!(f, "Spreadsheet error: {msg}"),
            Self::Config(msg) => write!(f, "Configuration error: {msg}"),
            Self::InvalidPath(msg) => write!(f, "Invalid path: {msg}"),
            Self::Other(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for TablekeeperError {}

impl From<std::io::Error> for TablekeeperError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<csv::Error> for TablekeeperError {
    fn from(err: csv::Error) -> Self {
        Self::Csv(err.to_string())
    }
}

impl From<serde_json::Error> for TablekeeperError {
    fn from(err: serde_json::Error) -> Self {
        Self::Config(format!("JSON error: {err}"))
    }
}

impl From<calamine::Error> for TablekeeperError {
    fn from(err: calamine::Error) -> Self {
        Self::Spreadsheet(err.to_string())
    }
}

impl From<rust_xlsxwriter::XlsxError> for TablekeeperError {
    fn from(err: rust_xlsxwriter::XlsxError) -> Self {
        Self::Spreadsheet(err.to_string())
    }
}

impl From<reqwest::Error> for TablekeeperError {
    fn from(err: reqwest::Error) -> Self {
        Self::Fetch(err.to_string())
    }
}

impl From<anyhow::Error> for TablekeeperError {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}

/// Result type alias for tablekeeper operations.
pub type Result<T> = std::result::Result<T, TablekeeperError>;

/// Extension trait to add context to results.
///
/// Context wrapping folds the original variant into `Other`, so it is only
/// used where the caller no longer needs to match on the variant.
pub trait ResultExt<T> {
    /// Add context to an error.
    fn context(self, msg: impl Into<String>) -> Result<T>;

    /// Add context using a closure (lazy evaluation).
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T, E> ResultExt<T> for std::result::Result<T, E>
where
    E: Into<TablekeeperError>,
{
    fn context(self, msg: impl Into<String>) -> Result<T> {
        self.map_err(|e| {
            let err: TablekeeperError = e.into();
            TablekeeperError::Other(format!("{}: {}", msg.into(), err))
        })
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| {
            let err: TablekeeperError = e.into();
            TablekeeperError::Other(format!("{}: {}", f(), err))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TablekeeperError::BackupMissing {
            dataset: "gov_registry".to_owned(),
            sheet: "Data".to_owned(),
        };
        assert_eq!(
            err.to_string(),
            "No CSV backup for dataset 'gov_registry' sheet 'Data'"
        );
    }

    #[test]
    fn test_fetch_error_display() {
        let err = TablekeeperError::Fetch("connection timed out".to_owned());
        assert_eq!(err.to_string(), "Fetch error: connection timed out");
    }

    #[test]
    fn test_result_context() {
        let result: std::result::Result<(), std::io::Error> = Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "metadata.json",
        ));

        let result: Result<()> = result.context("Failed to read metadata");
        assert!(result.is_err());
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("Failed to read metadata")
        );
    }
}
