//! FAT engine result codes.

use std::io;
use strum::IntoStaticStr;
use thiserror::Error;

use crate::disk::DiskError;

/// Failure codes reported by the FAT engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error, IntoStaticStr)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum FatError {
    /// A hard error occurred in the low-level disk layer.
    #[error("disk error")]
    DiskErr,
    /// Internal assertion failed.
    #[error("internal error")]
    IntErr,
    /// The drive cannot work.
    #[error("drive not ready")]
    NotReady,
    /// Could not find the file.
    #[error("no such file")]
    NoFile,
    /// Could not find the path.
    #[error("no such path")]
    NoPath,
    /// The path name format is invalid.
    #[error("invalid name")]
    InvalidName,
    /// Access denied, or directory full.
    #[error("access denied")]
    Denied,
    /// The object already exists.
    #[error("already exists")]
    Exist,
    /// The file or directory object is invalid.
    #[error("invalid object")]
    InvalidObject,
    /// The drive is write-protected.
    #[error("write protected")]
    WriteProtected,
    /// The drive number is invalid.
    #[error("invalid drive")]
    InvalidDrive,
    /// The volume has no work area (not mounted).
    #[error("volume not mounted")]
    NotEnabled,
    /// No valid FAT volume.
    #[error("no filesystem")]
    NoFilesystem,
    /// Working buffer could not be allocated.
    #[error("not enough memory")]
    NotEnoughCore,
    /// Given parameter is invalid.
    #[error("invalid parameter")]
    InvalidParameter,
}

impl FatError {
    /// The engine's name for this code, for logs.
    pub fn code(&self) -> &'static str {
        self.into()
    }
}

impl From<&DiskError> for FatError {
    fn from(err: &DiskError) -> Self {
        match err {
            DiskError::WriteProtected => FatError::WriteProtected,
            DiskError::NotInitialized | DiskError::NotReady => FatError::NotReady,
            DiskError::ParameterError(_) | DiskError::Io(_) => FatError::DiskErr,
        }
    }
}

impl From<io::Error> for FatError {
    /// Classify an I/O error surfaced by the engine. Disk-layer failures
    /// travel through the engine wrapped in `io::Error` and keep their
    /// meaning.
    fn from(err: io::Error) -> Self {
        if let Some(disk) = err.get_ref().and_then(|inner| inner.downcast_ref::<DiskError>()) {
            return FatError::from(disk);
        }
        match err.kind() {
            io::ErrorKind::NotFound => FatError::NoFile,
            io::ErrorKind::AlreadyExists => FatError::Exist,
            io::ErrorKind::InvalidInput => FatError::InvalidParameter,
            io::ErrorKind::PermissionDenied => FatError::Denied,
            io::ErrorKind::OutOfMemory => FatError::NotEnoughCore,
            io::ErrorKind::InvalidData => FatError::IntErr,
            _ => FatError::DiskErr,
        }
    }
}

/// Engine result type.
pub type FatResult<T> = Result<T, FatError>;
