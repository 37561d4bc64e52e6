//! Incremental reading of the target file.
//!
//! A [`Cursor`] records how far a client has read; [`ChangeDetector`] turns
//! a cursor into the bytes appended since.

mod cursor;
mod detector;
mod error;

pub use cursor::{mod_time_nanos, Cursor};
pub use detector::{ChangeDetector, Delta, DeltaSource, TruncationPolicy};
pub use error::TailError;
