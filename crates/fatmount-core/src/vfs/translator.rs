//! VFS operation translator.
//!
//! Every host call takes the global lock, resolves its volume, rewrites the
//! path into the engine's namespace, applies the read-only policy and maps
//! the engine's result code into [`VfsError`]. The lock is held for the
//! whole call, across all volumes: the engine is not reentrant.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use parking_lot::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

use super::path::{is_root, namespaced, path_str};
use super::types::{DirEntry, FileAttr, MountInfo, OpenFlags, StatFs};
use super::{VfsError, VfsOps, VfsResult};
use crate::disk::{DiskIo, RegistryDisk, SharedRegistry, VolumeEntry, VolumeFlags, VolumeId, shared_registry};
use crate::engine::{AccessMode, FatEngine, FatError, FatResult, FatfsEngine, VolumeGeometry};
use crate::timestamp::FatTimestamp;

/// The bridge between host calls and one FAT engine.
///
/// Owns the engine behind the global lock and the registry of volumes it
/// has mounted. Volumes still mounted when the bridge is dropped are
/// unmounted then.
pub struct FatVfs<E: FatEngine = FatfsEngine> {
    engine: Mutex<E>,
    registry: SharedRegistry,
    disk: Arc<dyn DiskIo>,
}

impl<E: FatEngine> std::fmt::Debug for FatVfs<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FatVfs")
            .field("volumes", &self.registry.read().len())
            .finish_non_exhaustive()
    }
}

impl Default for FatVfs<FatfsEngine> {
    fn default() -> Self {
        Self::new()
    }
}

impl FatVfs<FatfsEngine> {
    /// A bridge over the `fatfs` engine.
    pub fn new() -> Self {
        Self::with_engine(FatfsEngine::new())
    }
}

impl<E: FatEngine> FatVfs<E> {
    pub fn with_engine(engine: E) -> Self {
        let registry = shared_registry();
        Self {
            engine: Mutex::new(engine),
            disk: Arc::new(RegistryDisk::new(Arc::clone(&registry))),
            registry,
        }
    }

    /// Register `source` and mount the FAT filesystem on it.
    ///
    /// On failure the registry slot is released again.
    pub fn mount(self: &Arc<Self>, source: impl Into<PathBuf>, flags: VolumeFlags) -> VfsResult<Volume<E>> {
        let source = source.into();
        let mut engine = self.engine.lock();
        let (id, generation) = {
            let mut registry = self.registry.write();
            let id = registry.create(source.clone(), flags)?;
            let generation = registry.lookup(id).map_or(0, VolumeEntry::generation);
            (id, generation)
        };

        match engine.mount(id, Arc::clone(&self.disk)) {
            Ok(geometry) => {
                info!(
                    volume = id,
                    source = %source.display(),
                    read_only = flags.contains(VolumeFlags::READ_ONLY),
                    fat = %geometry.fat_kind,
                    label = %geometry.label,
                    "volume mounted"
                );
                if let Some(entry) = self.registry.write().lookup_mut(id) {
                    entry.set_geometry(geometry);
                }
                Ok(Volume {
                    vfs: Arc::clone(self),
                    id,
                    generation,
                })
            }
            Err(e) => {
                warn!(volume = id, source = %source.display(), code = e.code(), "mount failed");
                self.registry.write().delete(id);
                Err(VfsError::not_initialized(format!("{}: {e}", source.display())))
            }
        }
    }

    /// Snapshot of the registered volumes.
    pub fn volumes(&self) -> Vec<MountInfo> {
        let _engine = self.lock();
        self.registry
            .read()
            .iter()
            .map(|entry| {
                MountInfo::new(
                    entry.index(),
                    entry.source_path().to_path_buf(),
                    entry.flags(),
                    entry.geometry().cloned(),
                )
            })
            .collect()
    }

    /// Unmount `id` if it is still the occupant registered as `generation`.
    fn unmount(&self, id: VolumeId, generation: u64) {
        let mut engine = self.lock();
        if self.registry.read().lookup_current(id, generation).is_none() {
            debug!(volume = id, generation, "volume already unmounted");
            return;
        }
        release(&mut *engine, &self.registry, id);
    }

    fn lock(&self) -> MutexGuard<'_, E> {
        self.engine.lock()
    }
}

impl<E: FatEngine> Drop for FatVfs<E> {
    fn drop(&mut self) {
        let ids: Vec<VolumeId> = self.registry.read().iter().map(VolumeEntry::index).collect();
        let engine = self.engine.get_mut();
        for id in ids {
            release(engine, &self.registry, id);
        }
    }
}

/// Unmount `id` from the engine and free its slot. An engine failure is
/// logged; the slot is freed regardless.
fn release<E: FatEngine>(engine: &mut E, registry: &SharedRegistry, id: VolumeId) {
    if let Err(e) = engine.unmount(id) {
        warn!(volume = id, code = e.code(), "unmount failed");
    }
    registry.write().delete(id);
    info!(volume = id, "volume unmounted");
}

/// Close `file`, then report `result`. A failing close only wins over a
/// successful result.
fn finish<E: FatEngine, T>(engine: &E, file: E::File<'_>, result: FatResult<T>) -> FatResult<T> {
    let closed = engine.close(file);
    let value = result?;
    closed.map(|()| value)
}

/// Per-volume request context.
///
/// Cheap to clone. Unmount with [`Volume::unmount`]; a volume that is
/// simply dropped stays mounted until its [`FatVfs`] goes away. Once
/// unmounted, every clone fails with [`VfsError::NotInitialized`], even
/// after its slot has been given to another volume.
pub struct Volume<E: FatEngine = FatfsEngine> {
    vfs: Arc<FatVfs<E>>,
    id: VolumeId,
    generation: u64,
}

impl<E: FatEngine> Clone for Volume<E> {
    fn clone(&self) -> Self {
        Self {
            vfs: Arc::clone(&self.vfs),
            id: self.id,
            generation: self.generation,
        }
    }
}

impl<E: FatEngine> std::fmt::Debug for Volume<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Volume").field("id", &self.id).finish()
    }
}

impl<E: FatEngine> Volume<E> {
    pub fn id(&self) -> VolumeId {
        self.id
    }

    /// Geometry negotiated at mount.
    pub fn geometry(&self) -> Option<VolumeGeometry> {
        self.vfs
            .registry
            .read()
            .lookup_current(self.id, self.generation)
            .and_then(VolumeEntry::geometry)
            .cloned()
    }

    /// Unmount the volume and release its registry slot. A no-op if a clone
    /// already did.
    pub fn unmount(self) {
        self.vfs.unmount(self.id, self.generation);
    }

    fn not_mounted(&self) -> VfsError {
        VfsError::not_initialized(format!("volume {} is not mounted", self.id))
    }

    /// Run one engine request under the global lock.
    ///
    /// `mutates` requests on a read-only volume fail with
    /// [`VfsError::ReadOnly`] before the engine sees them.
    fn call<T>(
        &self,
        op: &'static str,
        path: &Path,
        mutates: bool,
        f: impl FnOnce(&E, &str) -> FatResult<T>,
    ) -> VfsResult<T> {
        let engine = self.vfs.lock();
        let read_only = self
            .vfs
            .registry
            .read()
            .lookup_current(self.id, self.generation)
            .ok_or_else(|| self.not_mounted())?
            .is_read_only();
        let host = path_str(path)?;
        let fat_path = namespaced(self.id, host);
        debug!(volume = self.id, op, path = %fat_path);

        if mutates && read_only {
            return Err(VfsError::ReadOnly);
        }
        f(&*engine, &fat_path).map_err(|e| {
            debug!(volume = self.id, op, path = %fat_path, code = e.code(), "engine error");
            VfsError::from_fat(e, host)
        })
    }
}

impl<E: FatEngine> VfsOps for Volume<E> {
    fn getattr(&self, path: &Path) -> VfsResult<FileAttr> {
        let root = path_str(path).is_ok_and(is_root);
        self.call("getattr", path, false, |engine, p| {
            // The engine keeps no entry for the root directory.
            if root {
                return Ok(FileAttr::root());
            }
            engine.stat(p).map(|info| FileAttr::from_info(&info))
        })
    }

    fn open(&self, path: &Path, flags: OpenFlags) -> VfsResult<()> {
        self.call("open", path, !flags.is_read_only(), |engine, p| {
            let file = engine.open(p, flags.access_mode())?;
            engine.close(file)
        })
    }

    fn opendir(&self, path: &Path) -> VfsResult<()> {
        self.call("opendir", path, false, |engine, p| {
            let dir = engine.opendir(p)?;
            engine.closedir(dir)
        })
    }

    fn readdir(&self, path: &Path) -> VfsResult<Vec<DirEntry>> {
        self.call("readdir", path, false, |engine, p| {
            let mut dir = engine.opendir(p)?;
            let mut entries = vec![DirEntry::directory("."), DirEntry::directory("..")];
            let listed = loop {
                match engine.readdir(&mut dir) {
                    Ok(Some(info)) => entries.push(info.into()),
                    Ok(None) => break Ok(()),
                    Err(e) => break Err(e),
                }
            };
            if let Err(e) = engine.closedir(dir) {
                warn!(path = %p, code = e.code(), "closedir failed");
            }
            listed.map(|()| entries)
        })
    }

    fn read(&self, path: &Path, flags: OpenFlags, offset: u64, size: u32) -> VfsResult<Vec<u8>> {
        self.call("read", path, false, |engine, p| {
            let mut file = engine.open(p, flags.access_mode().without_disposition())?;
            let mut buf = vec![0u8; size as usize];
            let read = engine
                .seek(&mut file, offset)
                .and_then(|()| engine.read(&mut file, &mut buf));
            let n = finish(engine, file, read)?;
            buf.truncate(n);
            Ok(buf)
        })
    }

    fn create(&self, path: &Path, flags: OpenFlags) -> VfsResult<()> {
        self.call("create", path, true, |engine, p| {
            let file = engine.open(p, flags.creating().access_mode())?;
            engine.close(file)
        })
    }

    fn write(&self, path: &Path, flags: OpenFlags, offset: u64, data: &[u8]) -> VfsResult<u32> {
        self.call("write", path, true, |engine, p| {
            let mut file = engine.open(p, flags.access_mode().without_disposition())?;
            let written = engine
                .seek(&mut file, offset)
                .and_then(|()| engine.write(&mut file, data))
                .and_then(|n| engine.sync(&mut file).map(|()| n));
            let n = finish(engine, file, written)?;
            Ok(u32::try_from(n).unwrap_or(u32::MAX))
        })
    }

    fn mkdir(&self, path: &Path) -> VfsResult<()> {
        self.call("mkdir", path, true, |engine, p| engine.mkdir(p))
    }

    fn unlink(&self, path: &Path) -> VfsResult<()> {
        self.call("unlink", path, true, |engine, p| engine.unlink(p))
    }

    fn rmdir(&self, path: &Path) -> VfsResult<()> {
        self.call("rmdir", path, true, |engine, p| engine.unlink(p))
    }

    fn rename(&self, from: &Path, to: &Path) -> VfsResult<()> {
        // The destination stays volume-relative; the engine resolves it on
        // the source's drive.
        let to = path_str(to)?;
        self.call("rename", from, true, |engine, p| engine.rename(p, to))
    }

    fn truncate(&self, path: &Path, size: u64) -> VfsResult<()> {
        self.call("truncate", path, true, |engine, p| {
            let mut file = engine.open(p, AccessMode::WRITE)?;
            let cut = engine
                .seek(&mut file, size)
                .and_then(|()| engine.truncate(&mut file));
            finish(engine, file, cut)
        })
    }

    fn utimens(&self, path: &Path, mtime: SystemTime) -> VfsResult<()> {
        self.call("utimens", path, true, |engine, p| {
            let stamp = FatTimestamp::from_system_time(mtime).ok_or(FatError::InvalidParameter)?;
            engine.utime(p, stamp)
        })
    }

    fn read_only(&self) -> bool {
        self.vfs
            .registry
            .read()
            .lookup_current(self.id, self.generation)
            .is_some_and(VolumeEntry::is_read_only)
    }

    fn statfs(&self) -> VfsResult<StatFs> {
        let engine = self.vfs.lock();
        debug!(volume = self.id, op = "statfs");
        if self.vfs.registry.read().lookup_current(self.id, self.generation).is_none() {
            return Err(self.not_mounted());
        }
        engine
            .getfree(self.id)
            .map(StatFs::from)
            .map_err(|e| VfsError::from_fat(e, "/"))
    }
}
