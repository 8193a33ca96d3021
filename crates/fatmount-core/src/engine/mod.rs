//! The FAT engine contract.
//!
//! The engine owns all FAT knowledge: boot sector, allocation tables,
//! directory entries. The bridge only sees the operation set below, which
//! addresses objects by namespaced path (`"N:/dir/file"` for drive `N`,
//! bare paths for drive 0) and reaches storage exclusively through the
//! [`DiskIo`] handed over at mount time.
//!
//! Engines keep mutable per-volume state and do no locking of their own.
//! Callers must serialize every call; [`FatVfs`](crate::FatVfs) does so
//! with its global lock. File and directory handles borrow the engine, so
//! a handle can never outlive the locked call that opened it.

mod backend;
mod cursor;
mod error;
mod types;

use std::sync::Arc;

pub use backend::{FatfsDir, FatfsEngine, FatfsFile};
pub use cursor::DriveCursor;
pub use error::{FatError, FatResult};
pub use types::{AccessMode, FatAttributes, FatKind, FileInfo, VolumeGeometry, VolumeStats};

use crate::disk::{DiskIo, VolumeId};
use crate::timestamp::FatTimestamp;

/// Operations the bridge invokes on the FAT engine.
pub trait FatEngine: Send {
    /// An open file.
    type File<'a>
    where
        Self: 'a;

    /// An open directory.
    type Dir<'a>
    where
        Self: 'a;

    // ========================================================================
    // Volumes
    // ========================================================================

    /// Initialize `drive` through `disk` and mount the filesystem on it.
    fn mount(&mut self, drive: VolumeId, disk: Arc<dyn DiskIo>) -> FatResult<VolumeGeometry>;

    /// Flush and release `drive`.
    fn unmount(&mut self, drive: VolumeId) -> FatResult<()>;

    /// Free-space report for `drive`.
    fn getfree(&self, drive: VolumeId) -> FatResult<VolumeStats>;

    // ========================================================================
    // Files
    // ========================================================================

    /// Metadata of a file or directory. The root directory has none.
    fn stat(&self, path: &str) -> FatResult<FileInfo>;

    fn open<'a>(&'a self, path: &str, mode: AccessMode) -> FatResult<Self::File<'a>>;

    /// Move the file pointer. In write mode, seeking past the end extends
    /// the file.
    fn seek(&self, file: &mut Self::File<'_>, offset: u64) -> FatResult<()>;

    /// Read up to `buf.len()` bytes; fewer only at end of file.
    fn read(&self, file: &mut Self::File<'_>, buf: &mut [u8]) -> FatResult<usize>;

    /// Write `data`; fewer bytes only when the volume is full.
    fn write(&self, file: &mut Self::File<'_>, data: &[u8]) -> FatResult<usize>;

    /// Flush cached data and the directory entry.
    fn sync(&self, file: &mut Self::File<'_>) -> FatResult<()>;

    /// Cut the file at the current file pointer.
    fn truncate(&self, file: &mut Self::File<'_>) -> FatResult<()>;

    fn close(&self, file: Self::File<'_>) -> FatResult<()>;

    // ========================================================================
    // Directories
    // ========================================================================

    fn opendir<'a>(&'a self, path: &str) -> FatResult<Self::Dir<'a>>;

    /// Next entry, or `None` once the directory is exhausted. `.` and `..`
    /// are never returned.
    fn readdir(&self, dir: &mut Self::Dir<'_>) -> FatResult<Option<FileInfo>>;

    fn closedir(&self, dir: Self::Dir<'_>) -> FatResult<()>;

    // ========================================================================
    // Namespace
    // ========================================================================

    fn mkdir(&self, path: &str) -> FatResult<()>;

    /// Remove a file or an empty directory.
    fn unlink(&self, path: &str) -> FatResult<()>;

    /// Rename or move `from` to `to`. `to` always lives on `from`'s drive;
    /// a drive prefix on it is ignored.
    fn rename(&self, from: &str, to: &str) -> FatResult<()>;

    /// Set the modification stamp.
    fn utime(&self, path: &str, modified: FatTimestamp) -> FatResult<()>;
}
