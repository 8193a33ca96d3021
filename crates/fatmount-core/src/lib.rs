//! # fatmount-core
//!
//! Serves a FAT-formatted image file or block device through a path-based,
//! POSIX-like filesystem interface.
//!
//! The crate is the bridge between two worlds that do not fit together on
//! their own: hosts that issue path-based calls concurrently, and a FAT
//! engine that is single-threaded, addresses storage by drive number and
//! logical block, and reports its own result codes.
//!
//! ```text
//! host ──> Volume (VfsOps) ──lock──> FatEngine ──> DriveCursor ──> RegistryDisk ──> SectorStore
//!                                                                    (DiskIo)
//! ```
//!
//! - [`disk`] - backing stores, the volume registry and the sector shim
//! - [`engine`] - the engine contract and its `fatfs` implementation
//! - [`vfs`] - the translator hosts talk to
//! - [`options`] - `-o` mount option parsing
//! - [`timestamp`] - packed FAT date/time

pub mod disk;
pub mod engine;
pub mod options;
pub mod timestamp;
pub mod vfs;

pub use disk::{MAX_VOLUMES, VolumeFlags, VolumeId};
pub use engine::{FatEngine, FatError, FatfsEngine, VolumeGeometry, VolumeStats};
pub use options::{MountOption, MountOptions};
pub use timestamp::FatTimestamp;
pub use vfs::{
    DirEntry, FatVfs, FileAttr, FileType, MountInfo, OpenFlags, StatFs, VfsError, VfsOps,
    VfsResult, Volume,
};
