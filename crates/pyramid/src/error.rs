use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Failures that abort a pyramid build or verification run.
///
/// Per-point and per-tile anomalies are not errors; they surface as omitted
/// points, skipped records or unreadable-tile counts instead.
#[derive(Debug, Error)]
pub enum PyramidError {
    #[error("{path}: input table has no data rows")]
    EmptyTable { path: PathBuf },

    #[error("{path}: missing required column (expected one of: {expected})")]
    MissingColumn { path: PathBuf, expected: String },

    #[error("{path}:{line}: {message}")]
    Table {
        path: PathBuf,
        line: usize,
        message: String,
    },

    #[error("{path}: archive contains no .csv entry")]
    NoCsvInArchive { path: PathBuf },

    #[error("archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("color map: label `{label}` has invalid color `{value}`")]
    InvalidColor { label: String, value: String },

    #[error("output directory is invalid: {0}")]
    InvalidOutputDir(PathBuf),

    #[error("invalid pyramid configuration: {0}")]
    InvalidConfig(String),

    #[error("{0}: no integer-named level directories")]
    NoLevels(PathBuf),

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Walk(#[from] walkdir::Error),
}

pub type Result<T> = std::result::Result<T, PyramidError>;
