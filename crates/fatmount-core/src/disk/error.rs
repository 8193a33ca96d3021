//! Disk-level error types.

use std::io;
use thiserror::Error;

/// Result of a disk-level request, as seen by the FAT engine.
#[derive(Debug, Error)]
pub enum DiskError {
    /// The drive has no entry, or its backing store could not be opened.
    #[error("drive not initialized")]
    NotInitialized,

    /// The drive exists but its backing store is not open yet.
    #[error("drive not ready")]
    NotReady,

    /// Write attempted on a read-only drive.
    #[error("drive is write-protected")]
    WriteProtected,

    /// Bad drive number, buffer size or control command.
    #[error("invalid parameter: {0}")]
    ParameterError(String),

    /// Positioned I/O failed or fell outside the backing store.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl DiskError {
    /// Create a ParameterError.
    pub fn parameter(msg: impl Into<String>) -> Self {
        Self::ParameterError(msg.into())
    }

    /// Create an Io error for a transfer that runs past the end of the store.
    pub fn out_of_bounds(offset: u64, len: u64, store_len: u64) -> Self {
        Self::Io(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!("span {offset}+{len} exceeds backing store of {store_len} bytes"),
        ))
    }
}

/// Disk result type.
pub type DiskResult<T> = Result<T, DiskError>;
