//! # fatmount-fuse
//!
//! FUSE front end for `fatmount-core`: maps kernel inodes onto volume paths
//! and translates `-o` options into `fuser` mount options.

mod host;
mod inode;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use fatmount_core::{
    DirEntry, FatVfs, MountOptions, StatFs, VfsOps, VfsResult, VolumeFlags, VolumeGeometry,
};
use fuser::MountOption as FuseOption;
use serde::Serialize;

pub use host::FatFuse;
pub use inode::{InodeTable, ROOT_INO};

/// Filesystem type reported to the kernel.
pub const FS_NAME: &str = "fatmount";

/// Summary printed by `fatmount --inspect`.
#[derive(Debug, Clone, Serialize)]
pub struct Inspection {
    pub source: PathBuf,
    pub geometry: Option<VolumeGeometry>,
    pub statfs: StatFs,
    /// Root directory listing, without `.` and `..`.
    pub root: Vec<DirEntry>,
}

/// Mount `image` read-only, collect its geometry, statistics and root
/// listing, then unmount it again.
pub fn inspect(vfs: &Arc<FatVfs>, image: &Path) -> VfsResult<Inspection> {
    let volume = vfs.mount(image, VolumeFlags::READ_ONLY)?;
    let collected = volume.statfs().and_then(|statfs| {
        let root = volume
            .readdir(Path::new("/"))?
            .into_iter()
            .filter(|e| e.name != "." && e.name != "..")
            .collect();
        Ok((statfs, root))
    });
    let geometry = volume.geometry();
    volume.unmount();

    let (statfs, root) = collected?;
    Ok(Inspection {
        source: image.to_path_buf(),
        geometry,
        statfs,
        root,
    })
}

/// `fuser` options for a mount of `source` with `opts`.
///
/// Access mode comes from the parsed options; anything unrecognized is
/// passed to the kernel unchanged.
pub fn fuse_options(source: &Path, opts: &MountOptions) -> Vec<FuseOption> {
    let mut out = vec![
        FuseOption::FSName(source.display().to_string()),
        FuseOption::Subtype(FS_NAME.to_string()),
        if opts.read_only() { FuseOption::RO } else { FuseOption::RW },
    ];
    out.extend(opts.passthrough.iter().map(|name| passthrough_option(name)));
    out
}

fn passthrough_option(name: &str) -> FuseOption {
    match name {
        "allow_other" => FuseOption::AllowOther,
        "allow_root" => FuseOption::AllowRoot,
        "auto_unmount" => FuseOption::AutoUnmount,
        "default_permissions" => FuseOption::DefaultPermissions,
        "dev" => FuseOption::Dev,
        "nodev" => FuseOption::NoDev,
        "suid" => FuseOption::Suid,
        "nosuid" => FuseOption::NoSuid,
        "exec" => FuseOption::Exec,
        "noexec" => FuseOption::NoExec,
        "atime" => FuseOption::Atime,
        "noatime" => FuseOption::NoAtime,
        "sync" => FuseOption::Sync,
        "async" => FuseOption::Async,
        "dirsync" => FuseOption::DirSync,
        other => FuseOption::CUSTOM(other.to_string()),
    }
}
