//! Byte-stream view of one drive, built on the sector shim.
//!
//! The engine reads and writes its storage as a seekable byte stream. This
//! cursor turns those requests into whole-sector transfers: aligned runs go
//! straight through, partial sectors are read, patched and written back.
//!
//! ```text
//! sectors:  |--------|--------|--------|--------|
//! request:       |-----------------------|
//!           head  ^ aligned run          ^ tail
//! ```

use std::io::{self, Read, Seek, SeekFrom, Write};
use std::sync::Arc;

use tracing::trace;

use crate::disk::{ControlCommand, ControlReply, DiskError, DiskIo, VolumeId};

fn disk_err(err: DiskError) -> io::Error {
    io::Error::other(err)
}

/// Seekable cursor over one drive.
#[derive(Clone)]
pub struct DriveCursor {
    drive: VolumeId,
    disk: Arc<dyn DiskIo>,
    position: u64,
}

impl std::fmt::Debug for DriveCursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DriveCursor")
            .field("drive", &self.drive)
            .field("position", &self.position)
            .finish()
    }
}

impl DriveCursor {
    pub fn new(drive: VolumeId, disk: Arc<dyn DiskIo>) -> Self {
        Self {
            drive,
            disk,
            position: 0,
        }
    }

    pub fn position(&self) -> u64 {
        self.position
    }

    /// Sector size currently in effect for the drive.
    ///
    /// Asked on every transfer so the cursor and the shim always agree, also
    /// across the moment a mount records its negotiated geometry.
    fn sector_size(&self) -> io::Result<u64> {
        match self
            .disk
            .control(self.drive, ControlCommand::GetSectorSize)
            .map_err(disk_err)?
        {
            ControlReply::SectorSize(size) if size > 0 => Ok(u64::from(size)),
            reply => Err(io::Error::other(format!("unexpected sector size reply {reply:?}"))),
        }
    }

    /// Size of the drive in bytes.
    fn len(&self) -> io::Result<u64> {
        let sector_size = self.sector_size()?;
        match self
            .disk
            .control(self.drive, ControlCommand::GetSectorCount)
            .map_err(disk_err)?
        {
            ControlReply::SectorCount(count) => Ok(count * sector_size),
            reply => Err(io::Error::other(format!("unexpected sector count reply {reply:?}"))),
        }
    }

    /// Number of whole sectors in `len` bytes, capped to one request.
    fn run_length(len: usize, sector_size: u64) -> u32 {
        (len as u64 / sector_size).min(u64::from(u32::MAX)) as u32
    }
}

impl Read for DriveCursor {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let sector_size = self.sector_size()?;
        let lba = self.position / sector_size;
        let offset = (self.position % sector_size) as usize;

        if offset == 0 && buf.len() as u64 >= sector_size {
            let count = Self::run_length(buf.len(), sector_size);
            let len = (u64::from(count) * sector_size) as usize;
            self.disk
                .read_sectors(self.drive, &mut buf[..len], lba, count)
                .map_err(disk_err)?;
            self.position += len as u64;
            return Ok(len);
        }

        let mut sector = vec![0u8; sector_size as usize];
        self.disk
            .read_sectors(self.drive, &mut sector, lba, 1)
            .map_err(disk_err)?;
        let len = (sector.len() - offset).min(buf.len());
        buf[..len].copy_from_slice(&sector[offset..offset + len]);
        self.position += len as u64;
        Ok(len)
    }
}

impl Write for DriveCursor {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let sector_size = self.sector_size()?;
        let lba = self.position / sector_size;
        let offset = (self.position % sector_size) as usize;

        if offset == 0 && buf.len() as u64 >= sector_size {
            let count = Self::run_length(buf.len(), sector_size);
            let len = (u64::from(count) * sector_size) as usize;
            self.disk
                .write_sectors(self.drive, &buf[..len], lba, count)
                .map_err(disk_err)?;
            self.position += len as u64;
            return Ok(len);
        }

        trace!(drive = self.drive, lba, offset, "partial sector write");
        let mut sector = vec![0u8; sector_size as usize];
        self.disk
            .read_sectors(self.drive, &mut sector, lba, 1)
            .map_err(disk_err)?;
        let len = (sector.len() - offset).min(buf.len());
        sector[offset..offset + len].copy_from_slice(&buf[..len]);
        self.disk
            .write_sectors(self.drive, &sector, lba, 1)
            .map_err(disk_err)?;
        self.position += len as u64;
        Ok(len)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.disk
            .control(self.drive, ControlCommand::Sync)
            .map_err(disk_err)?;
        Ok(())
    }
}

impl Seek for DriveCursor {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(offset) => Some(offset),
            SeekFrom::Current(delta) => self.position.checked_add_signed(delta),
            SeekFrom::End(delta) => self.len()?.checked_add_signed(delta),
        };
        match target {
            Some(position) => {
                self.position = position;
                Ok(position)
            }
            None => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek to a negative or overflowing offset",
            )),
        }
    }
}
