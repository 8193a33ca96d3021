//! Values exchanged with the FAT engine.

use bitflags::bitflags;
use serde::Serialize;
use strum::Display;

use crate::timestamp::FatTimestamp;

bitflags! {
    /// How a file is opened. Values match the engine's `FA_*` mode bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct AccessMode: u8 {
        const READ = 0x01;
        const WRITE = 0x02;
        /// Create; fail if the file exists.
        const CREATE_NEW = 0x04;
        /// Create, truncating an existing file.
        const CREATE_ALWAYS = 0x08;
        /// Open, creating the file if it is missing.
        const OPEN_ALWAYS = 0x10;
        /// Like `OPEN_ALWAYS`, positioned at the end of the file.
        const OPEN_APPEND = 0x30;
    }
}

impl AccessMode {
    /// Mode bits that may create the file.
    pub const CREATING: Self = Self::CREATE_NEW
        .union(Self::CREATE_ALWAYS)
        .union(Self::OPEN_ALWAYS);

    /// True if the file may be created by this open.
    pub fn creates(&self) -> bool {
        self.intersects(Self::CREATING)
    }

    /// True if this open can modify the file or its directory entry.
    pub fn modifies(&self) -> bool {
        self.intersects(Self::WRITE | Self::CREATE_ALWAYS)
    }

    /// The same mode without any creation or truncation disposition.
    pub fn without_disposition(self) -> Self {
        self & (Self::READ | Self::WRITE)
    }
}

bitflags! {
    /// Directory entry attribute bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct FatAttributes: u8 {
        const READ_ONLY = 0x01;
        const HIDDEN = 0x02;
        const SYSTEM = 0x04;
        const DIRECTORY = 0x10;
        const ARCHIVE = 0x20;
    }
}

/// Metadata of one directory entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    /// Long name if present, else the short name.
    pub name: String,
    /// Size in bytes (0 for directories).
    pub size: u64,
    pub attributes: FatAttributes,
    /// Last modification.
    pub modified: FatTimestamp,
}

impl FileInfo {
    pub fn is_dir(&self) -> bool {
        self.attributes.contains(FatAttributes::DIRECTORY)
    }

    pub fn is_read_only(&self) -> bool {
        self.attributes.contains(FatAttributes::READ_ONLY)
    }
}

/// FAT variant of a mounted volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize)]
pub enum FatKind {
    #[strum(serialize = "FAT12")]
    Fat12,
    #[strum(serialize = "FAT16")]
    Fat16,
    #[strum(serialize = "FAT32")]
    Fat32,
}

/// Geometry negotiated when a volume is mounted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VolumeGeometry {
    /// Bytes per sector, from the boot sector.
    pub sector_size: u16,
    /// Bytes per cluster.
    pub cluster_size: u32,
    /// Data clusters on the volume.
    pub total_clusters: u32,
    pub fat_kind: FatKind,
    /// Volume label with trailing padding removed.
    pub label: String,
    pub volume_id: u32,
}

/// Free-space report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct VolumeStats {
    pub cluster_size: u32,
    pub total_clusters: u32,
    pub free_clusters: u32,
}
