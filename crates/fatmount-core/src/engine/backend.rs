//! [`FatEngine`] over the `fatfs` crate.
//!
//! Each mounted drive owns a `fatfs::FileSystem` whose storage is a
//! [`DriveCursor`], so every byte the filesystem touches goes through the
//! disk shim. Paths are resolved component by component with FAT's
//! case-insensitive matching on both long and short names.

use std::io::{Read, Seek, SeekFrom, Write};
use std::sync::Arc;

use fatfs::{FileSystem, FsOptions};
use tracing::{debug, info, warn};

use super::cursor::DriveCursor;
use super::error::{FatError, FatResult};
use super::types::{AccessMode, FatAttributes, FatKind, FileInfo, VolumeGeometry, VolumeStats};
use super::FatEngine;
use crate::disk::{DiskError, DiskIo, MAX_VOLUMES, SECTOR_SIZE, VolumeId};
use crate::timestamp::FatTimestamp;

type FatFs = FileSystem<DriveCursor>;
type FatDir<'a> = fatfs::Dir<'a, DriveCursor>;
type FatEntry<'a> = fatfs::DirEntry<'a, DriveCursor>;

/// Offset of the bytes-per-sector field in the boot sector.
const BPB_BYTES_PER_SECTOR: usize = 11;

const ZERO_FILL_CHUNK: usize = 4096;

/// One mounted `fatfs` filesystem.
struct MountedFs(FatFs);

// SAFETY: `FileSystem` is `!Send` only because its options hold
// `&'static dyn TimeProvider` and `&'static dyn OemCpConverter`, which carry
// no `Sync` bound. `mount` always builds them with `FsOptions::new()`, i.e.
// fatfs' default unit-struct provider and converter, which have no state to
// share. Every other field (`RefCell`, `Cell`, the `DriveCursor`) is `Send`.
// `MountedFs` is not `Sync`; shared access across threads goes through the
// translator's mutex.
unsafe impl Send for MountedFs {}

/// The `fatfs`-backed engine.
///
/// `Send` but not `Sync`: calls take `&self`, and the filesystems inside use
/// unsynchronized interior mutability, so an engine must be owned by one
/// thread at a time. [`FatVfs`](crate::FatVfs) keeps it behind its global
/// mutex.
pub struct FatfsEngine {
    drives: [Option<MountedFs>; MAX_VOLUMES],
}

impl std::fmt::Debug for FatfsEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mounted: Vec<usize> = self
            .drives
            .iter()
            .enumerate()
            .filter_map(|(i, d)| d.as_ref().map(|_| i))
            .collect();
        f.debug_struct("FatfsEngine").field("mounted", &mounted).finish()
    }
}

impl Default for FatfsEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl FatfsEngine {
    pub fn new() -> Self {
        Self {
            drives: std::array::from_fn(|_| None),
        }
    }

    fn fs(&self, drive: VolumeId) -> FatResult<&FatFs> {
        self.drives
            .get(usize::from(drive))
            .ok_or(FatError::InvalidDrive)?
            .as_ref()
            .map(|mounted| &mounted.0)
            .ok_or(FatError::NotEnabled)
    }

    /// Resolve a namespaced path to its filesystem and drive-relative path.
    fn resolve<'s, 'p>(&'s self, path: &'p str) -> FatResult<(&'s FatFs, &'p str)> {
        let (drive, rest) = split_drive(path)?;
        Ok((self.fs(drive)?, rest))
    }
}

/// Split an optional `"N:"` drive prefix off `path`.
fn split_drive(path: &str) -> FatResult<(VolumeId, &str)> {
    let Some((prefix, rest)) = path.split_once(':') else {
        return Ok((0, path));
    };
    let drive = match prefix.as_bytes() {
        [digit @ b'0'..=b'9'] => digit - b'0',
        _ => return Err(FatError::InvalidDrive),
    };
    if usize::from(drive) >= MAX_VOLUMES {
        return Err(FatError::InvalidDrive);
    }
    Ok((drive, rest))
}

/// Split a drive-relative path into its parent directory and final name.
fn split_parent(path: &str) -> (&str, &str) {
    let trimmed = path.trim_matches('/');
    trimmed.rsplit_once('/').unwrap_or(("", trimmed))
}

/// Case-insensitive name comparison, folding the same way fatfs does when
/// it looks names up itself.
fn eq_ignore_case(a: &str, b: &str) -> bool {
    a.chars()
        .flat_map(char::to_uppercase)
        .eq(b.chars().flat_map(char::to_uppercase))
}

fn name_matches(entry: &FatEntry<'_>, name: &str) -> bool {
    eq_ignore_case(&entry.file_name(), name) || eq_ignore_case(&entry.short_file_name(), name)
}

fn is_dot(entry: &FatEntry<'_>) -> bool {
    matches!(entry.short_file_name().as_str(), "." | "..")
}

fn find_in<'a>(dir: &FatDir<'a>, name: &str) -> FatResult<Option<FatEntry<'a>>> {
    for entry in dir.iter() {
        let entry = entry?;
        if !is_dot(&entry) && name_matches(&entry, name) {
            return Ok(Some(entry));
        }
    }
    Ok(None)
}

/// Walk `path` from the root. Missing components and files along the way
/// are `NoPath`.
fn open_dir_path<'a>(fs: &'a FatFs, path: &str) -> FatResult<FatDir<'a>> {
    let mut dir = fs.root_dir();
    for component in path.split('/').filter(|c| !c.is_empty()) {
        dir = find_in(&dir, component)?
            .filter(|entry| entry.is_dir())
            .ok_or(FatError::NoPath)?
            .to_dir();
    }
    Ok(dir)
}

/// Parent directory and final name of `path`. The root has no name.
fn parent_of<'a, 'p>(fs: &'a FatFs, path: &'p str) -> FatResult<(FatDir<'a>, &'p str)> {
    let (parent, name) = split_parent(path);
    if name.is_empty() {
        return Err(FatError::InvalidName);
    }
    Ok((open_dir_path(fs, parent)?, name))
}

fn has_entries(dir: &FatDir<'_>) -> FatResult<bool> {
    for entry in dir.iter() {
        if !is_dot(&entry?) {
            return Ok(true);
        }
    }
    Ok(false)
}

fn attributes_of(entry: &FatEntry<'_>) -> FatAttributes {
    FatAttributes::from_bits_truncate(entry.attributes().bits())
}

fn stamp_of(dt: fatfs::DateTime) -> FatTimestamp {
    FatTimestamp::from_fields(
        i32::from(dt.date.year),
        u32::from(dt.date.month),
        u32::from(dt.date.day),
        u32::from(dt.time.hour),
        u32::from(dt.time.min),
        u32::from(dt.time.sec),
    )
    .unwrap_or(FatTimestamp::NONE)
}

/// `stamp` as a fatfs date-time, keeping `base`'s sub-second part.
fn date_time_of(stamp: FatTimestamp, base: fatfs::DateTime) -> fatfs::DateTime {
    fatfs::DateTime {
        date: fatfs::Date {
            year: stamp.year() as u16,
            month: stamp.month() as u16,
            day: stamp.day() as u16,
        },
        time: fatfs::Time {
            hour: stamp.hour() as u16,
            min: stamp.minute() as u16,
            sec: stamp.second() as u16,
            ..base.time
        },
    }
}

/// Overwrite the modification time stored in `file`'s directory entry.
///
/// fatfs deprecates the per-file setter in favour of a filesystem-wide time
/// provider, which can only stamp "now". An explicit time still needs it.
#[allow(deprecated)]
fn set_modified(file: &mut fatfs::File<'_, DriveCursor>, date_time: fatfs::DateTime) {
    file.set_modified(date_time);
}

fn info_of(entry: &FatEntry<'_>) -> FileInfo {
    let attributes = attributes_of(entry);
    FileInfo {
        name: entry.file_name(),
        size: if entry.is_dir() { 0 } else { entry.len() },
        attributes,
        modified: stamp_of(entry.modified()),
    }
}

/// Bytes per sector recorded in the boot sector of `drive`.
fn boot_sector_size(disk: &dyn DiskIo, drive: VolumeId) -> FatResult<u16> {
    let mut boot = vec![0u8; usize::from(SECTOR_SIZE)];
    disk.read_sectors(drive, &mut boot, 0, 1)
        .map_err(|e| FatError::from(&e))?;
    let size = u16::from_le_bytes([boot[BPB_BYTES_PER_SECTOR], boot[BPB_BYTES_PER_SECTOR + 1]]);
    if !size.is_power_of_two() || !(512..=4096).contains(&size) {
        return Err(FatError::NoFilesystem);
    }
    Ok(size)
}

/// A mount failure that did not come from the disk is a format problem.
fn mount_error(err: std::io::Error) -> FatError {
    match err.get_ref().and_then(|inner| inner.downcast_ref::<DiskError>()) {
        Some(disk) => FatError::from(disk),
        None => FatError::NoFilesystem,
    }
}

/// An open `fatfs` file and the mode it was opened with.
pub struct FatfsFile<'a> {
    inner: fatfs::File<'a, DriveCursor>,
    mode: AccessMode,
}

impl std::fmt::Debug for FatfsFile<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FatfsFile").field("mode", &self.mode).finish()
    }
}

/// An open `fatfs` directory.
pub struct FatfsDir<'a> {
    entries: fatfs::DirIter<'a, DriveCursor>,
}

impl std::fmt::Debug for FatfsDir<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FatfsDir").finish_non_exhaustive()
    }
}

impl FatEngine for FatfsEngine {
    type File<'a> = FatfsFile<'a>;
    type Dir<'a> = FatfsDir<'a>;

    fn mount(&mut self, drive: VolumeId, disk: Arc<dyn DiskIo>) -> FatResult<VolumeGeometry> {
        let slot = self
            .drives
            .get_mut(usize::from(drive))
            .ok_or(FatError::InvalidDrive)?;
        if let Some(previous) = slot.take() {
            warn!(drive, "drive already mounted, replacing");
            if let Err(e) = previous.0.unmount() {
                warn!(drive, error = %e, "unmount of replaced drive failed");
            }
        }

        if let Err(e) = disk.initialize(drive) {
            warn!(drive, error = %e, "drive initialization failed");
            return Err(FatError::NotReady);
        }
        let sector_size = boot_sector_size(disk.as_ref(), drive)?;

        let fs = FileSystem::new(DriveCursor::new(drive, disk), FsOptions::new()).map_err(mount_error)?;
        let stats = fs.stats()?;
        let fat_kind = match fs.fat_type() {
            fatfs::FatType::Fat12 => FatKind::Fat12,
            fatfs::FatType::Fat16 => FatKind::Fat16,
            fatfs::FatType::Fat32 => FatKind::Fat32,
        };
        let geometry = VolumeGeometry {
            sector_size,
            cluster_size: stats.cluster_size(),
            total_clusters: stats.total_clusters(),
            fat_kind,
            label: fs.volume_label().trim_end().to_string(),
            volume_id: fs.volume_id(),
        };
        info!(
            drive,
            fat = %geometry.fat_kind,
            sector_size,
            cluster_size = geometry.cluster_size,
            "filesystem mounted"
        );
        *slot = Some(MountedFs(fs));
        Ok(geometry)
    }

    fn unmount(&mut self, drive: VolumeId) -> FatResult<()> {
        let mounted = self
            .drives
            .get_mut(usize::from(drive))
            .ok_or(FatError::InvalidDrive)?
            .take()
            .ok_or(FatError::NotEnabled)?;
        mounted.0.unmount()?;
        debug!(drive, "filesystem unmounted");
        Ok(())
    }

    fn getfree(&self, drive: VolumeId) -> FatResult<VolumeStats> {
        let stats = self.fs(drive)?.stats()?;
        Ok(VolumeStats {
            cluster_size: stats.cluster_size(),
            total_clusters: stats.total_clusters(),
            free_clusters: stats.free_clusters(),
        })
    }

    fn stat(&self, path: &str) -> FatResult<FileInfo> {
        let (fs, path) = self.resolve(path)?;
        let (dir, name) = parent_of(fs, path)?;
        let entry = find_in(&dir, name)?.ok_or(FatError::NoFile)?;
        Ok(info_of(&entry))
    }

    fn open<'a>(&'a self, path: &str, mode: AccessMode) -> FatResult<FatfsFile<'a>> {
        let (fs, path) = self.resolve(path)?;
        let (dir, name) = parent_of(fs, path)?;

        let mut file = match find_in(&dir, name)? {
            Some(entry) => {
                let read_only = attributes_of(&entry).contains(FatAttributes::READ_ONLY);
                if mode.creates() {
                    // Attributes are checked before the exclusive flag.
                    if entry.is_dir() || read_only {
                        return Err(FatError::Denied);
                    }
                    if mode.contains(AccessMode::CREATE_NEW) {
                        return Err(FatError::Exist);
                    }
                } else if entry.is_dir() {
                    return Err(FatError::NoFile);
                } else if read_only && mode.contains(AccessMode::WRITE) {
                    return Err(FatError::Denied);
                }
                let mut file = entry.to_file();
                if mode.contains(AccessMode::CREATE_ALWAYS) {
                    file.truncate()?;
                }
                file
            }
            None if mode.creates() => dir.create_file(name)?,
            None => return Err(FatError::NoFile),
        };

        if mode.contains(AccessMode::OPEN_APPEND) {
            file.seek(SeekFrom::End(0))?;
        }
        Ok(FatfsFile { inner: file, mode })
    }

    fn seek(&self, file: &mut FatfsFile<'_>, offset: u64) -> FatResult<()> {
        // fatfs stops at end of file.
        let reached = file.inner.seek(SeekFrom::Start(offset))?;
        if reached < offset && file.mode.contains(AccessMode::WRITE) {
            let zeros = [0u8; ZERO_FILL_CHUNK];
            let mut remaining = offset - reached;
            while remaining > 0 {
                let n = remaining.min(ZERO_FILL_CHUNK as u64) as usize;
                file.inner.write_all(&zeros[..n])?;
                remaining -= n as u64;
            }
        }
        Ok(())
    }

    fn read(&self, file: &mut FatfsFile<'_>, buf: &mut [u8]) -> FatResult<usize> {
        if !file.mode.contains(AccessMode::READ) {
            return Err(FatError::Denied);
        }
        let mut total = 0;
        while total < buf.len() {
            match file.inner.read(&mut buf[total..])? {
                0 => break,
                n => total += n,
            }
        }
        Ok(total)
    }

    fn write(&self, file: &mut FatfsFile<'_>, data: &[u8]) -> FatResult<usize> {
        if !file.mode.contains(AccessMode::WRITE) {
            return Err(FatError::Denied);
        }
        let mut total = 0;
        while total < data.len() {
            match file.inner.write(&data[total..]) {
                Ok(0) => break,
                Ok(n) => total += n,
                // Out of clusters part way through: report what landed.
                Err(e) if total > 0 => {
                    debug!(written = total, error = %e, "short write");
                    break;
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(total)
    }

    fn sync(&self, file: &mut FatfsFile<'_>) -> FatResult<()> {
        file.inner.flush()?;
        Ok(())
    }

    fn truncate(&self, file: &mut FatfsFile<'_>) -> FatResult<()> {
        if !file.mode.contains(AccessMode::WRITE) {
            return Err(FatError::Denied);
        }
        file.inner.truncate()?;
        Ok(())
    }

    fn close(&self, mut file: FatfsFile<'_>) -> FatResult<()> {
        file.inner.flush()?;
        Ok(())
    }

    fn opendir<'a>(&'a self, path: &str) -> FatResult<FatfsDir<'a>> {
        let (fs, path) = self.resolve(path)?;
        let dir = open_dir_path(fs, path)?;
        Ok(FatfsDir { entries: dir.iter() })
    }

    fn readdir(&self, dir: &mut FatfsDir<'_>) -> FatResult<Option<FileInfo>> {
        for entry in dir.entries.by_ref() {
            let entry = entry?;
            if !is_dot(&entry) {
                return Ok(Some(info_of(&entry)));
            }
        }
        Ok(None)
    }

    fn closedir(&self, _dir: FatfsDir<'_>) -> FatResult<()> {
        Ok(())
    }

    fn mkdir(&self, path: &str) -> FatResult<()> {
        let (fs, path) = self.resolve(path)?;
        let (dir, name) = parent_of(fs, path)?;
        if find_in(&dir, name)?.is_some() {
            return Err(FatError::Exist);
        }
        dir.create_dir(name)?;
        Ok(())
    }

    fn unlink(&self, path: &str) -> FatResult<()> {
        let (fs, path) = self.resolve(path)?;
        let (dir, name) = parent_of(fs, path)?;
        let entry = find_in(&dir, name)?.ok_or(FatError::NoFile)?;
        if attributes_of(&entry).contains(FatAttributes::READ_ONLY) {
            return Err(FatError::Denied);
        }
        if entry.is_dir() && has_entries(&entry.to_dir())? {
            return Err(FatError::Denied);
        }
        dir.remove(&entry.file_name())?;
        Ok(())
    }

    fn rename(&self, from: &str, to: &str) -> FatResult<()> {
        let (fs, from) = self.resolve(from)?;
        let (_, to) = split_drive(to)?;

        let (src_dir, src_name) = parent_of(fs, from)?;
        let entry = find_in(&src_dir, src_name)?.ok_or(FatError::NoFile)?;
        let (dst_dir, dst_name) = parent_of(fs, to)?;
        if find_in(&dst_dir, dst_name)?.is_some() {
            return Err(FatError::Exist);
        }
        src_dir.rename(&entry.file_name(), &dst_dir, dst_name)?;
        Ok(())
    }

    fn utime(&self, path: &str, modified: FatTimestamp) -> FatResult<()> {
        let (fs, path) = self.resolve(path)?;
        let (dir, name) = parent_of(fs, path)?;
        let entry = find_in(&dir, name)?.ok_or(FatError::NoFile)?;
        // Directory timestamps cannot be set: fatfs only writes entry times
        // back through a file handle.
        if entry.is_dir() {
            return Err(FatError::Denied);
        }
        let base = entry.modified();
        let mut file = entry.to_file();
        set_modified(&mut file, date_time_of(modified, base));
        file.flush()?;
        Ok(())
    }
}
