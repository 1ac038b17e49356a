//! Error types for log index operations.

use std::io;
use thiserror::Error;

/// Errors surfaced by the index.
///
/// Rotation and width overflow are deliberately absent: a rotated or
/// truncated source triggers a silent rebuild, and an oversized display
/// width saturates to `u16::MAX`.
#[derive(Error, Debug)]
pub enum Error {
    /// Underlying file read/write/mmap failure. Fatal to the in-flight
    /// operation; on-disk state is left at the last line boundary.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Metadata magic/geometry mismatch or an internal invariant violation.
    /// The next open rebuilds the index from the source.
    #[error("index corruption: {0}")]
    Corruption(String),

    /// A line or display-row query outside the indexed range.
    #[error("index {index} out of range (len {len})")]
    OutOfRange { index: u64, len: u64 },
}

/// Result type for index operations.
pub type Result<T> = std::result::Result<T, Error>;
