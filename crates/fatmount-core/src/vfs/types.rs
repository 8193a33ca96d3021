//! Core VFS types.
//!
//! Path-based and host-agnostic: a FUSE host maps these onto its own
//! inode-based replies.

use std::path::PathBuf;
use std::time::SystemTime;

use rustix::fs::OFlags;
use serde::Serialize;

use crate::disk::{VolumeFlags, VolumeId};
use crate::engine::{AccessMode, FileInfo, VolumeGeometry, VolumeStats};

/// File type enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FileType {
    /// Regular file.
    File,
    /// Directory.
    Directory,
}

impl FileType {
    /// Returns true if this is a regular file.
    pub fn is_file(&self) -> bool {
        matches!(self, FileType::File)
    }

    /// Returns true if this is a directory.
    pub fn is_dir(&self) -> bool {
        matches!(self, FileType::Directory)
    }
}

/// Permission bits of every object before the read-only attribute applies.
const DEFAULT_PERM: u32 = 0o755;

/// Write bits cleared by the read-only attribute.
const WRITE_BITS: u32 = 0o222;

/// File attributes (metadata).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileAttr {
    /// Size in bytes.
    pub size: u64,
    /// File type.
    pub kind: FileType,
    /// Unix permissions (e.g., 0o755).
    pub perm: u32,
    /// Last modification time.
    pub mtime: SystemTime,
    /// Status change time. FAT keeps none; mirrors `mtime`.
    pub ctime: SystemTime,
    /// Number of hard links.
    pub nlink: u32,
}

impl FileAttr {
    /// Attributes of a volume's root directory, which has no entry of its
    /// own.
    pub fn root() -> Self {
        Self {
            size: 0,
            kind: FileType::Directory,
            perm: DEFAULT_PERM,
            mtime: SystemTime::UNIX_EPOCH,
            ctime: SystemTime::UNIX_EPOCH,
            nlink: 2, // . and ..
        }
    }

    /// Attributes of a directory entry reported by the engine.
    pub fn from_info(info: &FileInfo) -> Self {
        let mtime = info.modified.to_system_time();
        let (kind, nlink) = if info.is_dir() {
            (FileType::Directory, 2)
        } else {
            (FileType::File, 1)
        };
        let mut perm = DEFAULT_PERM;
        if info.is_read_only() {
            perm &= !WRITE_BITS;
        }
        Self {
            size: info.size,
            kind,
            perm,
            mtime,
            ctime: mtime,
            nlink,
        }
    }

    /// Returns true if this is a regular file.
    pub fn is_file(&self) -> bool {
        self.kind.is_file()
    }

    /// Returns true if this is a directory.
    pub fn is_dir(&self) -> bool {
        self.kind.is_dir()
    }
}

/// Directory entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DirEntry {
    /// Entry name (not full path).
    pub name: String,
    /// Entry type.
    pub kind: FileType,
}

impl DirEntry {
    /// Create a new directory entry.
    pub fn new(name: impl Into<String>, kind: FileType) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }

    /// Create a file entry.
    pub fn file(name: impl Into<String>) -> Self {
        Self::new(name, FileType::File)
    }

    /// Create a directory entry.
    pub fn directory(name: impl Into<String>) -> Self {
        Self::new(name, FileType::Directory)
    }
}

impl From<FileInfo> for DirEntry {
    fn from(info: FileInfo) -> Self {
        let kind = if info.is_dir() {
            FileType::Directory
        } else {
            FileType::File
        };
        Self::new(info.name, kind)
    }
}

/// Filesystem statistics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatFs {
    /// Total blocks.
    pub blocks: u64,
    /// Free blocks.
    pub bfree: u64,
    /// Available blocks (to non-root).
    pub bavail: u64,
    /// Total inodes. FAT has none; always 0.
    pub files: u64,
    /// Free inodes.
    pub ffree: u64,
    /// Block size.
    pub bsize: u32,
    /// Maximum name length.
    pub namelen: u32,
    /// Fragment size.
    pub frsize: u32,
}

impl From<VolumeStats> for StatFs {
    /// One block per cluster.
    fn from(stats: VolumeStats) -> Self {
        Self {
            blocks: u64::from(stats.total_clusters),
            bfree: u64::from(stats.free_clusters),
            bavail: u64::from(stats.free_clusters),
            files: 0,
            ffree: 0,
            bsize: stats.cluster_size,
            namelen: 255,
            frsize: stats.cluster_size,
        }
    }
}

/// Open file flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenFlags {
    /// Read access requested.
    pub read: bool,
    /// Write access requested.
    pub write: bool,
    /// Append mode.
    pub append: bool,
    /// Create if not exists.
    pub create: bool,
    /// Truncate on open.
    pub truncate: bool,
    /// Exclusive create (fail if exists).
    pub exclusive: bool,
}

impl Default for OpenFlags {
    fn default() -> Self {
        Self {
            read: true,
            write: false,
            append: false,
            create: false,
            truncate: false,
            exclusive: false,
        }
    }
}

impl OpenFlags {
    /// Read-only access.
    pub fn read() -> Self {
        Self::default()
    }

    /// Write-only access.
    pub fn write() -> Self {
        Self {
            read: false,
            write: true,
            ..Default::default()
        }
    }

    /// Read and write access.
    pub fn read_write() -> Self {
        Self {
            read: true,
            write: true,
            ..Default::default()
        }
    }

    /// Decode the `flags` word of a POSIX `open(2)` request.
    pub fn from_posix(flags: i32) -> Self {
        let flags = OFlags::from_bits_retain(flags as u32);
        let (read, write) = if flags.contains(OFlags::RDWR) {
            (true, true)
        } else if flags.contains(OFlags::WRONLY) {
            (false, true)
        } else {
            (true, false)
        };
        Self {
            read,
            write,
            append: flags.contains(OFlags::APPEND),
            create: flags.contains(OFlags::CREATE),
            truncate: flags.contains(OFlags::TRUNC),
            exclusive: flags.contains(OFlags::EXCL),
        }
    }

    /// The same flags, forced to create the file.
    pub fn creating(self) -> Self {
        Self {
            create: true,
            ..self
        }
    }

    /// True if the request only reads.
    pub fn is_read_only(&self) -> bool {
        !self.write
    }

    /// Engine access mode for these flags.
    ///
    /// Exclusive creation wins over truncation, which wins over plain
    /// creation. Truncation and exclusivity mean nothing without `create`.
    /// Append implies open-or-create.
    pub fn access_mode(&self) -> AccessMode {
        let mut mode = AccessMode::empty();
        if self.read {
            mode |= AccessMode::READ;
        }
        if self.write {
            mode |= AccessMode::WRITE;
        }
        if self.create {
            mode |= if self.exclusive {
                AccessMode::CREATE_NEW
            } else if self.truncate {
                AccessMode::CREATE_ALWAYS
            } else {
                AccessMode::OPEN_ALWAYS
            };
        }
        if self.append {
            mode |= AccessMode::OPEN_APPEND;
        }
        mode
    }
}

/// A registered volume, for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MountInfo {
    pub id: VolumeId,
    pub source: PathBuf,
    pub read_only: bool,
    /// `None` while the mount is still in progress.
    pub geometry: Option<VolumeGeometry>,
}

impl MountInfo {
    pub(crate) fn new(id: VolumeId, source: PathBuf, flags: VolumeFlags, geometry: Option<VolumeGeometry>) -> Self {
        Self {
            id,
            source,
            read_only: flags.contains(VolumeFlags::READ_ONLY),
            geometry,
        }
    }
}
