//! Volume registry: a fixed-capacity table of mounted volumes.
//!
//! Each slot owns the volume's backing store, its mount flags and the
//! geometry recorded by a successful mount. The registry has no lock of its
//! own; it is shared as a [`SharedRegistry`] so the disk shim can reach
//! entries from inside engine calls, and every mutation happens while the
//! translator's global lock is held.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use bitflags::bitflags;
use parking_lot::RwLock;
use thiserror::Error;

use super::store::SectorStore;
use crate::engine::VolumeGeometry;

/// Volume index. Also the engine's drive number.
pub type VolumeId = u8;

/// Number of registry slots, one per single-digit drive prefix.
pub const MAX_VOLUMES: usize = 10;

bitflags! {
    /// Per-volume mount flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct VolumeFlags: u32 {
        /// Open the backing store read-only and refuse every mutation.
        const READ_ONLY = 1 << 0;
    }
}

/// Registry errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// Every slot is taken.
    #[error("volume registry is full ({0} volumes)")]
    CapacityExceeded(usize),
}

/// One registered volume.
#[derive(Debug)]
pub struct VolumeEntry {
    index: VolumeId,
    /// Distinguishes successive occupants of the same slot.
    generation: u64,
    store: Option<SectorStore>,
    flags: VolumeFlags,
    mounted: Option<VolumeGeometry>,
    source_path: PathBuf,
}

impl VolumeEntry {
    pub fn index(&self) -> VolumeId {
        self.index
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn flags(&self) -> VolumeFlags {
        self.flags
    }

    pub fn is_read_only(&self) -> bool {
        self.flags.contains(VolumeFlags::READ_ONLY)
    }

    pub fn source_path(&self) -> &Path {
        &self.source_path
    }

    /// The open backing store, once the engine has initialized the drive.
    pub fn store(&self) -> Option<&SectorStore> {
        self.store.as_ref()
    }

    /// Geometry of the mounted filesystem, `None` until the mount succeeds.
    pub fn geometry(&self) -> Option<&VolumeGeometry> {
        self.mounted.as_ref()
    }

    pub(crate) fn set_store(&mut self, store: SectorStore) {
        self.store = Some(store);
    }

    pub(crate) fn set_geometry(&mut self, geometry: VolumeGeometry) {
        self.mounted = Some(geometry);
    }
}

/// Fixed-capacity volume table.
#[derive(Debug)]
pub struct VolumeRegistry {
    slots: [Option<VolumeEntry>; MAX_VOLUMES],
    next_generation: u64,
}

impl Default for VolumeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl VolumeRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            slots: std::array::from_fn(|_| None),
            next_generation: 1,
        }
    }

    /// Register a volume in the first free slot.
    ///
    /// The backing store stays closed and the mounted state empty; both are
    /// filled in by the mount that follows.
    pub fn create(&mut self, path: impl Into<PathBuf>, flags: VolumeFlags) -> Result<VolumeId, RegistryError> {
        let slot = self
            .slots
            .iter()
            .position(Option::is_none)
            .ok_or(RegistryError::CapacityExceeded(MAX_VOLUMES))?;
        let index = slot as VolumeId;
        let generation = self.next_generation;
        self.next_generation += 1;
        self.slots[slot] = Some(VolumeEntry {
            index,
            generation,
            store: None,
            flags,
            mounted: None,
            source_path: path.into(),
        });
        Ok(index)
    }

    /// Look up a live entry.
    pub fn lookup(&self, index: VolumeId) -> Option<&VolumeEntry> {
        self.slots.get(usize::from(index)).and_then(Option::as_ref)
    }

    /// Look up a live entry, only if it is still the occupant registered
    /// as `generation`.
    pub fn lookup_current(&self, index: VolumeId, generation: u64) -> Option<&VolumeEntry> {
        self.lookup(index).filter(|entry| entry.generation == generation)
    }

    /// Look up a live entry for mutation.
    pub fn lookup_mut(&mut self, index: VolumeId) -> Option<&mut VolumeEntry> {
        self.slots.get_mut(usize::from(index)).and_then(Option::as_mut)
    }

    /// Free a slot, closing its backing store. No-op for free or
    /// out-of-range indices.
    pub fn delete(&mut self, index: VolumeId) {
        if let Some(slot) = self.slots.get_mut(usize::from(index)) {
            slot.take();
        }
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Live entries in index order.
    pub fn iter(&self) -> impl Iterator<Item = &VolumeEntry> {
        self.slots.iter().filter_map(Option::as_ref)
    }

    pub fn capacity(&self) -> usize {
        MAX_VOLUMES
    }
}

/// Registry handle shared by the translator and the disk shim.
pub type SharedRegistry = Arc<RwLock<VolumeRegistry>>;

/// Create an empty shared registry.
pub fn shared_registry() -> SharedRegistry {
    Arc::new(RwLock::new(VolumeRegistry::new()))
}
