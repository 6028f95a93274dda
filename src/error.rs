use std::path::PathBuf;

use thiserror::Error;

use crate::schema::SourceKind;

/// Convenient alias for fallible results returned throughout the crate.
pub type Result<T> = std::result::Result<T, ToolError>;

/// Error type covering the different failure cases that can occur when the
/// tool ingests, reconciles, or emits data.
#[derive(Debug, Error)]
pub enum ToolError {
    /// Wrapper for IO failures such as reading or writing files.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Raised when the JSON summary cannot be serialized.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Errors bubbled up from the Excel writer implementation.
    #[error("Excel write error: {0}")]
    ExcelWrite(#[from] rust_xlsxwriter::XlsxError),

    /// Errors bubbled up from the Excel reader implementation.
    #[error("Excel read error: {0}")]
    ExcelRead(#[from] calamine::XlsxError),

    /// Raised when building an output archive fails.
    #[error("ZIP archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// Raised when the input is not a readable archive.
    #[error("input is not a readable archive: {0}")]
    ArchiveInvalid(String),

    /// Raised when no archive member matches a logical source.
    #[error("no file for source '{kind}' found in the archive")]
    SourceNotFound { kind: SourceKind },

    /// Raised when the member of a source lacks a required sheet.
    #[error("source '{kind}' has no sheet matching {sheet}")]
    SheetNotFound { kind: SourceKind, sheet: String },

    /// Raised when required columns are absent after normalization.
    #[error("source '{kind}' is missing required columns: {}", columns.join(", "))]
    MissingColumns {
        kind: SourceKind,
        columns: Vec<String>,
    },

    /// Raised by the error-on-duplicate dedup policy.
    #[error("source '{kind}' has duplicate rows for key '{key}'")]
    DuplicateKey { kind: SourceKind, key: String },

    /// Raised when a join would change the number of order rows.
    #[error("join with '{kind}' changed the row count from {before} to {after}")]
    JoinFanOut {
        kind: SourceKind,
        before: usize,
        after: usize,
    },

    /// Raised when a due date cannot be converted into a calendar date.
    #[error("row {row}: cannot parse due date '{value}'")]
    DateParse { row: usize, value: String },

    /// Raised when the user provides a path that does not exist.
    #[error("input file not found: {0}")]
    MissingInput(PathBuf),

    /// Raised when the tracing subscriber fails to initialise.
    #[error("failed to initialise logging: {0}")]
    Logging(String),
}
