//! Read position within the target file.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// How much of the target file a client has already consumed.
///
/// `mod_time` is the file's modification time (nanoseconds since the Unix
/// epoch) observed by the read that produced this cursor, and `offset` is the
/// number of bytes already delivered as of that time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cursor {
    /// Modification time in nanoseconds since the Unix epoch.
    pub mod_time: u64,
    /// Bytes already delivered.
    pub offset: u64,
}

impl Cursor {
    /// Create a cursor from its two components.
    #[must_use]
    pub fn new(mod_time: u64, offset: u64) -> Self {
        Self { mod_time, offset }
    }

    /// The "start of file" cursor: epoch modification time, offset zero.
    #[must_use]
    pub fn start() -> Self {
        Self::default()
    }

    /// Build a cursor from raw request parameters.
    ///
    /// Each component that is missing or not a non-negative integer falls
    /// back to zero independently.
    #[must_use]
    pub fn from_params(mod_time: Option<&str>, offset: Option<&str>) -> Self {
        Self {
            mod_time: parse_component(mod_time),
            offset: parse_component(offset),
        }
    }

    /// Same position, newer modification time.
    #[must_use]
    pub fn with_mod_time(self, mod_time: u64) -> Self {
        Self { mod_time, ..self }
    }

    /// The modification time as a `SystemTime`.
    #[must_use]
    pub fn mod_time_as_system_time(&self) -> SystemTime {
        UNIX_EPOCH + std::time::Duration::from_nanos(self.mod_time)
    }
}

fn parse_component(raw: Option<&str>) -> u64 {
    raw.and_then(|s| s.trim().parse::<u64>().ok()).unwrap_or(0)
}

/// Convert a file modification time to nanoseconds since the Unix epoch.
///
/// Times before the epoch clamp to 0, times past `u64::MAX` nanoseconds
/// saturate.
#[must_use]
pub fn mod_time_nanos(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_nanos()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}
