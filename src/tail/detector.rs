//! Stateless file-delta reader.
//!
//! Each poll stats the target file, and when it has changed since the
//! caller's cursor, reads exactly the bytes past the cursor's offset.

use std::borrow::Cow;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

use super::cursor::{mod_time_nanos, Cursor};
use super::error::TailError;

/// Bytes appended to the target file between two cursors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delta {
    /// The appended bytes. Empty when nothing new was read.
    pub bytes: Vec<u8>,
    /// Cursor reflecting this read.
    pub cursor: Cursor,
}

impl Delta {
    /// A delta carrying no bytes.
    #[must_use]
    pub fn empty(cursor: Cursor) -> Self {
        Self {
            bytes: Vec::new(),
            cursor,
        }
    }

    /// Whether no bytes were read.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// The bytes decoded as UTF-8, replacing invalid sequences.
    #[must_use]
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.bytes)
    }
}

/// What to do when the file has shrunk below a cursor's offset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TruncationPolicy {
    /// Keep the old offset and stay silent until the file grows past it.
    #[default]
    Hold,
    /// Rewind to the start of the file and deliver its current content.
    Restart,
}

/// A source of file deltas, polled once per poll cycle.
#[async_trait]
pub trait DeltaSource: Send + Sync {
    /// Return the bytes appended since `cursor`, plus the updated cursor.
    ///
    /// On error the caller keeps its cursor unchanged.
    async fn poll(&self, cursor: Cursor) -> Result<Delta, TailError>;
}

/// File-backed change detector.
///
/// Holds no per-client state: every call opens, reads, and closes the file
/// independently, so one detector is shared by all sessions.
#[derive(Debug, Clone)]
pub struct ChangeDetector {
    /// Path of the target file.
    path: PathBuf,
    /// Behaviour when the file shrinks below a cursor.
    truncation: TruncationPolicy,
}

impl ChangeDetector {
    /// Create a detector for the given file.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            truncation: TruncationPolicy::default(),
        }
    }

    /// Set the truncation policy (builder pattern).
    #[must_use]
    pub fn with_truncation(mut self, truncation: TruncationPolicy) -> Self {
        self.truncation = truncation;
        self
    }

    /// Get the path being tailed.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the whole file, as the bootstrap page does.
    ///
    /// # Errors
    ///
    /// Same as [`DeltaSource::poll`].
    pub async fn snapshot(&self) -> Result<Delta, TailError> {
        self.poll(Cursor::start()).await
    }

    fn unavailable(&self, source: std::io::Error) -> TailError {
        TailError::FileUnavailable {
            path: self.path.clone(),
            source,
        }
    }

    /// Seek to `offset`, retrying from the start of the file on failure.
    ///
    /// Returns the position actually reached.
    async fn seek(&self, file: &mut File, offset: u64) -> Result<u64, TailError> {
        match file.seek(SeekFrom::Start(offset)).await {
            Ok(position) => Ok(position),
            Err(e) => {
                tracing::debug!(
                    path = %self.path.display(),
                    offset,
                    error = %e,
                    "Seek failed, reading from start of file"
                );
                file.seek(SeekFrom::Start(0))
                    .await
                    .map_err(|source| TailError::SeekFailure {
                        path: self.path.clone(),
                        offset,
                        source,
                    })
            }
        }
    }
}

#[async_trait]
impl DeltaSource for ChangeDetector {
    async fn poll(&self, cursor: Cursor) -> Result<Delta, TailError> {
        let metadata = tokio::fs::metadata(&self.path)
            .await
            .map_err(|e| self.unavailable(e))?;
        let mod_time = metadata
            .modified()
            .map(mod_time_nanos)
            .map_err(|e| self.unavailable(e))?;

        if mod_time <= cursor.mod_time {
            return Ok(Delta::empty(cursor));
        }

        let mut file = File::open(&self.path)
            .await
            .map_err(|e| self.unavailable(e))?;
        let size = metadata.len();
        let mut position = self.seek(&mut file, cursor.offset).await?;

        if size <= position {
            if self.truncation == TruncationPolicy::Restart && size < cursor.offset {
                tracing::debug!(
                    path = %self.path.display(),
                    old_offset = cursor.offset,
                    new_len = size,
                    "File truncated, restarting from offset 0"
                );
                position = self.seek(&mut file, 0).await?;
            } else {
                return Ok(Delta::empty(cursor.with_mod_time(mod_time)));
            }
        }

        let available = size.saturating_sub(position);
        let mut bytes = Vec::with_capacity(usize::try_from(available).unwrap_or(0));
        file.take(available)
            .read_to_end(&mut bytes)
            .await
            .map_err(|source| TailError::ReadFailure {
                path: self.path.clone(),
                source,
            })?;

        let offset = position + bytes.len() as u64;
        Ok(Delta {
            bytes,
            cursor: Cursor::new(mod_time, offset),
        })
    }
}
