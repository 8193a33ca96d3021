//! Sector store: positioned, sector-granular I/O on a backing file or
//! block device.

use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom};
use std::os::unix::fs::{FileExt, FileTypeExt, OpenOptionsExt};
use std::path::{Path, PathBuf};

use rustix::fs::OFlags;
use tracing::{trace, warn};

use super::error::{DiskError, DiskResult};

/// Sector size used when no negotiated geometry is available.
pub const SECTOR_SIZE: u16 = 512;

/// A run of `count` sectors starting at logical block `lba`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectorAddress {
    /// First logical block.
    pub lba: u64,
    /// Number of sectors.
    pub count: u32,
}

impl SectorAddress {
    pub fn new(lba: u64, count: u32) -> Self {
        Self { lba, count }
    }

    /// Byte offset of the first sector.
    pub fn byte_offset(&self, sector_size: u16) -> Option<u64> {
        self.lba.checked_mul(u64::from(sector_size))
    }

    /// Length of the run in bytes.
    pub fn byte_len(&self, sector_size: u16) -> u64 {
        u64::from(self.count) * u64::from(sector_size)
    }
}

/// An open backing store.
///
/// Read-write stores are opened with `O_SYNC`, so every write is durable
/// before it returns. The store never grows: transfers that cross the end
/// fail instead of extending the image.
#[derive(Debug)]
pub struct SectorStore {
    file: File,
    path: PathBuf,
    read_only: bool,
    len: u64,
}

impl SectorStore {
    /// Open `path` read-only, or read-write with synchronous writes.
    pub fn open(path: impl AsRef<Path>, read_only: bool) -> DiskResult<Self> {
        let path = path.as_ref();
        let mut options = OpenOptions::new();
        options.read(true);
        if !read_only {
            options
                .write(true)
                .custom_flags(OFlags::SYNC.bits() as i32);
        }

        let mut file = options.open(path).map_err(|e| {
            warn!("cannot open backing store {}: {}", path.display(), e);
            DiskError::NotInitialized
        })?;

        // Seeking works for block devices, whose metadata length is 0.
        let len = file.seek(SeekFrom::End(0)).map_err(|e| {
            warn!("cannot size backing store {}: {}", path.display(), e);
            DiskError::NotInitialized
        })?;

        Ok(Self {
            file,
            path: path.to_path_buf(),
            read_only,
            len,
        })
    }

    /// Check that `path` is something a volume can be backed by: a regular
    /// file (an image) or a block device.
    pub fn check_source(path: impl AsRef<Path>) -> std::io::Result<()> {
        let path = path.as_ref();
        let file_type = std::fs::metadata(path)?.file_type();
        if file_type.is_file() || file_type.is_block_device() {
            Ok(())
        } else {
            Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!(
                    "{}: source must be a block device or a regular file (image)",
                    path.display()
                ),
            ))
        }
    }

    /// Validate a transfer and return its byte offset and length.
    fn span(&self, address: SectorAddress, sector_size: u16, buf_len: usize) -> DiskResult<(u64, usize)> {
        let len = address.byte_len(sector_size);
        if (buf_len as u64) < len {
            return Err(DiskError::parameter(format!(
                "buffer of {buf_len} bytes cannot hold {} sectors",
                address.count
            )));
        }
        let offset = address
            .byte_offset(sector_size)
            .ok_or_else(|| DiskError::out_of_bounds(u64::MAX, len, self.len))?;
        match offset.checked_add(len) {
            Some(end) if end <= self.len => Ok((offset, len as usize)),
            _ => Err(DiskError::out_of_bounds(offset, len, self.len)),
        }
    }

    /// Read `address.count` sectors into the front of `buf`.
    pub fn read(&self, address: SectorAddress, sector_size: u16, buf: &mut [u8]) -> DiskResult<()> {
        let (offset, len) = self.span(address, sector_size, buf.len())?;
        trace!(lba = address.lba, count = address.count, "sector read");
        self.file.read_exact_at(&mut buf[..len], offset)?;
        Ok(())
    }

    /// Write `address.count` sectors from the front of `buf`.
    pub fn write(&self, address: SectorAddress, sector_size: u16, buf: &[u8]) -> DiskResult<()> {
        if self.read_only {
            return Err(DiskError::WriteProtected);
        }
        let (offset, len) = self.span(address, sector_size, buf.len())?;
        trace!(lba = address.lba, count = address.count, "sector write");
        self.file.write_all_at(&buf[..len], offset)?;
        Ok(())
    }

    /// Force written data to stable storage.
    pub fn flush(&self) -> DiskResult<()> {
        if self.read_only {
            return Ok(());
        }
        self.file.sync_all()?;
        Ok(())
    }

    /// Size of the backing store in bytes.
    pub fn len(&self) -> u64 {
        self.len
    }

    /// Returns true if the backing store is empty.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of whole sectors in the backing store.
    pub fn sector_count(&self, sector_size: u16) -> u64 {
        self.len / u64::from(sector_size)
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
