//! VFS operations trait.
//!
//! Path-based, stateless between calls: every operation opens what it needs
//! and closes it again before returning. Hosts keep no engine handles.

use std::path::Path;
use std::time::SystemTime;

use super::types::{DirEntry, FileAttr, OpenFlags, StatFs};
use super::VfsResult;

/// Host-facing filesystem operations of one mounted volume.
///
/// Paths are absolute within the volume (`/` is its root).
pub trait VfsOps: Send + Sync {
    // ========================================================================
    // Reading
    // ========================================================================

    /// Get file attributes.
    fn getattr(&self, path: &Path) -> VfsResult<FileAttr>;

    /// Check that `path` can be opened with `flags`. Nothing stays open.
    fn open(&self, path: &Path, flags: OpenFlags) -> VfsResult<()>;

    /// Check that `path` is a directory that can be listed.
    fn opendir(&self, path: &Path) -> VfsResult<()>;

    /// Read directory entries, starting with `.` and `..`.
    fn readdir(&self, path: &Path) -> VfsResult<Vec<DirEntry>>;

    /// Read up to `size` bytes starting at `offset`.
    ///
    /// Returns fewer bytes if EOF is reached.
    fn read(&self, path: &Path, flags: OpenFlags, offset: u64, size: u32) -> VfsResult<Vec<u8>>;

    // ========================================================================
    // Writing
    // ========================================================================

    /// Create a file (or open an existing one, unless `flags` is exclusive).
    fn create(&self, path: &Path, flags: OpenFlags) -> VfsResult<()>;

    /// Write `data` at `offset`, durably. Returns the number of bytes
    /// written.
    fn write(&self, path: &Path, flags: OpenFlags, offset: u64, data: &[u8]) -> VfsResult<u32>;

    /// Create a new directory.
    fn mkdir(&self, path: &Path) -> VfsResult<()>;

    /// Remove a file.
    fn unlink(&self, path: &Path) -> VfsResult<()>;

    /// Remove an empty directory.
    fn rmdir(&self, path: &Path) -> VfsResult<()>;

    /// Rename a file or directory within the volume.
    fn rename(&self, from: &Path, to: &Path) -> VfsResult<()>;

    /// Truncate or zero-extend a file to `size`.
    fn truncate(&self, path: &Path, size: u64) -> VfsResult<()>;

    /// Set the modification time.
    fn utimens(&self, path: &Path, mtime: SystemTime) -> VfsResult<()>;

    // ========================================================================
    // Metadata
    // ========================================================================

    /// Returns true if this volume refuses mutations.
    fn read_only(&self) -> bool;

    /// Get filesystem statistics.
    fn statfs(&self) -> VfsResult<StatFs>;

    // ========================================================================
    // Convenience methods (default implementations)
    // ========================================================================

    /// Check if a path exists.
    fn exists(&self, path: &Path) -> bool {
        self.getattr(path).is_ok()
    }

    /// Read entire file contents.
    fn read_all(&self, path: &Path) -> VfsResult<Vec<u8>> {
        let attr = self.getattr(path)?;
        let size = u32::try_from(attr.size).unwrap_or(u32::MAX);
        self.read(path, OpenFlags::read(), 0, size)
    }

    /// Replace the whole contents of a file, creating it if needed.
    fn write_all(&self, path: &Path, data: &[u8]) -> VfsResult<()> {
        if self.exists(path) {
            self.truncate(path, 0)?;
        } else {
            self.create(path, OpenFlags::write())?;
        }
        self.write(path, OpenFlags::write(), 0, data)?;
        Ok(())
    }
}
