//! Storage side of the bridge.
//!
//! - [`SectorStore`] - positioned sector I/O on an image file or block device
//! - [`VolumeRegistry`] - fixed-capacity table of volumes and their stores
//! - [`DiskIo`] / [`RegistryDisk`] - the drive interface the FAT engine calls

mod error;
mod registry;
mod shim;
mod store;

pub use error::{DiskError, DiskResult};
pub use registry::{
    MAX_VOLUMES, RegistryError, SharedRegistry, VolumeEntry, VolumeFlags, VolumeId,
    VolumeRegistry, shared_registry,
};
pub use shim::{ControlCommand, ControlReply, DiskIo, DiskStatus, RegistryDisk};
pub use store::{SECTOR_SIZE, SectorAddress, SectorStore};
