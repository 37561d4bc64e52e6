//! Change detector error types.

use std::path::PathBuf;

/// Errors that can occur while reading the target file.
///
/// The `Display` text of these errors is shown to clients verbatim in
/// place of the next delta.
#[derive(thiserror::Error, Debug)]
pub enum TailError {
    /// The file could not be stat'ed or opened.
    #[error("{path}: file unavailable: {source}")]
    FileUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A read failed after the file was opened.
    #[error("{path}: read failed: {source}")]
    ReadFailure {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Seeking failed, even after retrying from the start of the file.
    #[error("{path}: cannot seek to offset {offset}: {source}")]
    SeekFailure {
        path: PathBuf,
        offset: u64,
        #[source]
        source: std::io::Error,
    },
}

impl TailError {
    /// Short machine-friendly label for log fields.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::FileUnavailable { .. } => "file_unavailable",
            Self::ReadFailure { .. } => "read_failure",
            Self::SeekFailure { .. } => "seek_failure",
        }
    }
}
