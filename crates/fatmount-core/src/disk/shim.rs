//! Disk-I/O shim: the host environment the FAT engine runs against.
//!
//! The engine addresses storage by drive number and logical block. The
//! shim resolves the drive to its registry entry and forwards the request
//! to that entry's [`SectorStore`](super::SectorStore). It is only ever
//! invoked by the engine, from inside a translator call.

use bitflags::bitflags;
use tracing::debug;

use super::error::{DiskError, DiskResult};
use super::registry::{SharedRegistry, VolumeEntry, VolumeId};
use super::store::{SECTOR_SIZE, SectorAddress, SectorStore};

bitflags! {
    /// Drive status bits reported by [`DiskIo::status`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct DiskStatus: u8 {
        /// Drive not initialized.
        const NO_INIT = 0x01;
        /// No medium in the drive.
        const NO_DISK = 0x02;
        /// Medium is write-protected.
        const PROTECT = 0x04;
    }
}

/// Control requests the engine may issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCommand {
    /// Complete pending writes.
    Sync,
    /// Sector size in bytes.
    GetSectorSize,
    /// Number of sectors on the drive.
    GetSectorCount,
    /// Erase block size in sectors.
    GetBlockSize,
    /// Inform the device that a sector range is no longer in use.
    Trim { start: u64, end: u64 },
}

/// Successful control replies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlReply {
    Done,
    SectorSize(u16),
    SectorCount(u64),
}

/// The operations the FAT engine requires of its host.
pub trait DiskIo: Send + Sync {
    /// Current drive status. Empty means ready.
    fn status(&self, drive: VolumeId) -> DiskStatus;

    /// Prepare the drive for I/O.
    fn initialize(&self, drive: VolumeId) -> DiskResult<()>;

    /// Read `count` sectors starting at `sector` into `buf`.
    fn read_sectors(&self, drive: VolumeId, buf: &mut [u8], sector: u64, count: u32) -> DiskResult<()>;

    /// Write `count` sectors starting at `sector` from `buf`.
    fn write_sectors(&self, drive: VolumeId, buf: &[u8], sector: u64, count: u32) -> DiskResult<()>;

    /// Miscellaneous drive control.
    fn control(&self, drive: VolumeId, command: ControlCommand) -> DiskResult<ControlReply>;
}

/// [`DiskIo`] backed by the volume registry.
#[derive(Debug, Clone)]
pub struct RegistryDisk {
    registry: SharedRegistry,
}

impl RegistryDisk {
    pub fn new(registry: SharedRegistry) -> Self {
        Self { registry }
    }

    /// Sector size used to address `entry`'s backing store.
    fn sector_size(entry: &VolumeEntry) -> u16 {
        #[cfg(feature = "variable-sector-size")]
        {
            entry
                .geometry()
                .map(|geometry| geometry.sector_size)
                .unwrap_or(SECTOR_SIZE)
        }
        #[cfg(not(feature = "variable-sector-size"))]
        {
            let _ = entry;
            SECTOR_SIZE
        }
    }

    fn open_store(entry: &VolumeEntry) -> DiskResult<&SectorStore> {
        entry.store().ok_or(DiskError::NotReady)
    }
}

impl DiskIo for RegistryDisk {
    fn status(&self, _drive: VolumeId) -> DiskStatus {
        DiskStatus::empty()
    }

    fn initialize(&self, drive: VolumeId) -> DiskResult<()> {
        let mut registry = self.registry.write();
        let entry = registry.lookup_mut(drive).ok_or(DiskError::NotInitialized)?;
        if entry.store().is_some() {
            return Ok(());
        }
        let store = SectorStore::open(entry.source_path(), entry.is_read_only())?;
        debug!(
            drive,
            path = %entry.source_path().display(),
            bytes = store.len(),
            read_only = entry.is_read_only(),
            "backing store opened"
        );
        entry.set_store(store);
        Ok(())
    }

    fn read_sectors(&self, drive: VolumeId, buf: &mut [u8], sector: u64, count: u32) -> DiskResult<()> {
        let registry = self.registry.read();
        let entry = registry
            .lookup(drive)
            .ok_or_else(|| DiskError::parameter(format!("no drive {drive}")))?;
        let store = Self::open_store(entry)?;
        store.read(SectorAddress::new(sector, count), Self::sector_size(entry), buf)
    }

    fn write_sectors(&self, drive: VolumeId, buf: &[u8], sector: u64, count: u32) -> DiskResult<()> {
        let registry = self.registry.read();
        let entry = registry
            .lookup(drive)
            .ok_or_else(|| DiskError::parameter(format!("no drive {drive}")))?;
        if entry.is_read_only() {
            return Err(DiskError::WriteProtected);
        }
        let store = Self::open_store(entry)?;
        store.write(SectorAddress::new(sector, count), Self::sector_size(entry), buf)
    }

    fn control(&self, drive: VolumeId, command: ControlCommand) -> DiskResult<ControlReply> {
        let registry = self.registry.read();
        let entry = registry
            .lookup(drive)
            .ok_or_else(|| DiskError::parameter(format!("no drive {drive}")))?;
        match command {
            ControlCommand::Sync => {
                Self::open_store(entry)?.flush()?;
                Ok(ControlReply::Done)
            }
            ControlCommand::GetSectorSize => Ok(ControlReply::SectorSize(Self::sector_size(entry))),
            ControlCommand::GetSectorCount => {
                let store = Self::open_store(entry)?;
                Ok(ControlReply::SectorCount(store.sector_count(Self::sector_size(entry))))
            }
            other => Err(DiskError::parameter(format!("unsupported control command {other:?}"))),
        }
    }
}
