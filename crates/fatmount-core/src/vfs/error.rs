//! VFS error types.

use std::io;

use rustix::io::Errno;
use thiserror::Error;

use crate::disk::RegistryError;
use crate::engine::FatError;

/// VFS error type.
#[derive(Debug, Error)]
pub enum VfsError {
    /// File or directory not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Malformed name or parameter.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Permission denied.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Filesystem is read-only.
    #[error("filesystem is read-only")]
    ReadOnly,

    /// Path already exists.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// The engine ran out of working memory.
    #[error("out of memory")]
    OutOfMemory,

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A volume could not be brought up.
    #[error("volume not initialized: {0}")]
    NotInitialized(String),

    /// No free volume slot.
    #[error("too many volumes (limit {0})")]
    CapacityExceeded(usize),
}

impl VfsError {
    /// Create a NotFound error.
    pub fn not_found(path: impl Into<String>) -> Self {
        Self::NotFound(path.into())
    }

    /// Create an InvalidArgument error.
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Create a PermissionDenied error.
    pub fn permission_denied(path: impl Into<String>) -> Self {
        Self::PermissionDenied(path.into())
    }

    /// Create an AlreadyExists error.
    pub fn already_exists(path: impl Into<String>) -> Self {
        Self::AlreadyExists(path.into())
    }

    /// Create a NotInitialized error.
    pub fn not_initialized(msg: impl Into<String>) -> Self {
        Self::NotInitialized(msg.into())
    }

    /// Map an engine result code, naming the object it concerns.
    pub fn from_fat(err: FatError, path: &str) -> Self {
        match err {
            FatError::NoFile | FatError::NoPath => Self::not_found(path),
            FatError::InvalidName | FatError::InvalidParameter => Self::invalid_argument(path),
            FatError::Denied => Self::permission_denied(path),
            FatError::WriteProtected => Self::ReadOnly,
            FatError::Exist => Self::already_exists(path),
            FatError::NotEnoughCore => Self::OutOfMemory,
            other => Self::Io(io::Error::other(other)),
        }
    }

    /// The errno a host reports for this error.
    pub fn errno(&self) -> i32 {
        let errno = match self {
            Self::NotFound(_) => Errno::NOENT,
            Self::InvalidArgument(_) => Errno::INVAL,
            Self::PermissionDenied(_) => Errno::ACCESS,
            Self::ReadOnly => Errno::ROFS,
            Self::AlreadyExists(_) => Errno::EXIST,
            Self::OutOfMemory => Errno::NOMEM,
            Self::Io(e) => return e.raw_os_error().unwrap_or(Errno::IO.raw_os_error()),
            Self::NotInitialized(_) => Errno::IO,
            Self::CapacityExceeded(_) => Errno::NOSPC,
        };
        errno.raw_os_error()
    }
}

impl From<RegistryError> for VfsError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::CapacityExceeded(limit) => Self::CapacityExceeded(limit),
        }
    }
}

/// Convert VfsError to std::io::Error for compatibility.
impl From<VfsError> for io::Error {
    fn from(e: VfsError) -> Self {
        match e {
            VfsError::NotFound(msg) => io::Error::new(io::ErrorKind::NotFound, msg),
            VfsError::InvalidArgument(msg) => io::Error::new(io::ErrorKind::InvalidInput, msg),
            VfsError::PermissionDenied(msg) => io::Error::new(io::ErrorKind::PermissionDenied, msg),
            VfsError::ReadOnly => io::Error::from_raw_os_error(Errno::ROFS.raw_os_error()),
            VfsError::AlreadyExists(msg) => io::Error::new(io::ErrorKind::AlreadyExists, msg),
            VfsError::OutOfMemory => io::Error::from(io::ErrorKind::OutOfMemory),
            VfsError::Io(e) => e,
            e @ (VfsError::NotInitialized(_) | VfsError::CapacityExceeded(_)) => io::Error::other(e),
        }
    }
}

/// VFS result type.
pub type VfsResult<T> = Result<T, VfsError>;
