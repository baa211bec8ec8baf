//! Error types for fetch and extract operations.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that abort an operation outright.
///
/// Per-item failures inside a pipeline run never surface here; they are
/// reported as [`ItemError`] events instead.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// I/O error during file operations.
    #[error(transparent)]
    IoError(#[from] io::Error),

    /// HTTP client construction or request error.
    #[error(transparent)]
    ReqwestError(#[from] reqwest::Error),

    /// Catalog file could not be read or parsed.
    #[error(transparent)]
    CsvError(#[from] csv::Error),

    /// Caller supplied input that cannot be used.
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// A failure (or warning) scoped to a single locator or archive.
///
/// Carries owned strings rather than source errors so it can travel inside
/// cloned events.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ItemError {
    /// Network or HTTP failure while fetching one locator.
    #[error("Failed to download {locator}: {reason}")]
    Transport { locator: String, reason: String },

    /// The body arrived but could not be persisted.
    #[error("Failed to save {locator} to {}: {reason}", .path.display())]
    Write {
        locator: String,
        path: PathBuf,
        reason: String,
    },

    /// The archive could not be opened or parsed.
    #[error("Archive '{}' is corrupt: {reason}", display_name(.archive))]
    CorruptArchive { archive: PathBuf, reason: String },

    /// The archive opened fine but held no payload files.
    #[error("No payload files found in '{}'", display_name(.archive))]
    NoPayload { archive: PathBuf },

    /// Anything else that went wrong while extracting or relocating.
    #[error("Unexpected error extracting '{}': {reason}", display_name(.archive))]
    Extraction { archive: PathBuf, reason: String },
}

impl ItemError {
    /// True for informational outcomes that are not failures.
    pub fn is_warning(&self) -> bool {
        matches!(self, ItemError::NoPayload { .. })
    }
}

/// Failure of a single HTTP transfer.
#[derive(Error, Debug)]
pub(crate) enum TransferError {
    #[error(transparent)]
    Http(#[from] reqwest::Error),

    /// The body could not be written to disk.
    #[error(transparent)]
    Write(io::Error),

    #[error("transfer aborted")]
    Cancelled,
}

/// Failure of a single archive extraction.
#[derive(Error, Debug)]
pub(crate) enum ArchiveError {
    #[error("{0}")]
    Corrupt(String),

    #[error(transparent)]
    Io(#[from] io::Error),
}

fn display_name(path: &std::path::Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .unwrap_or_else(|| path.display().to_string())
}
