//! Shared helpers: formatted images and an engine wrapper that records how
//! it is called.

#![allow(dead_code)]

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use fatmount_core::disk::{DiskIo, VolumeId};
use fatmount_core::engine::{AccessMode, FatEngine, FatResult, FileInfo, VolumeGeometry, VolumeStats};
use fatmount_core::FatTimestamp;

/// Default image size: large enough for FAT16.
pub const IMAGE_BYTES: u64 = 8 * 1024 * 1024;

/// Create a FAT-formatted image of `bytes` bytes at `dir/name`.
pub fn fat_image(dir: &Path, name: &str, bytes: u64) -> PathBuf {
    let path = dir.join(name);
    let mut file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(true)
        .open(&path)
        .unwrap();
    file.set_len(bytes).unwrap();
    fatfs::format_volume(&mut file, fatfs::FormatVolumeOptions::new()).unwrap();
    path
}

/// An all-zero image with no filesystem on it.
pub fn blank_image(dir: &Path, name: &str, bytes: u64) -> PathBuf {
    let path = dir.join(name);
    let file = std::fs::File::create(&path).unwrap();
    file.set_len(bytes).unwrap();
    path
}

/// Route library logs to the test harness. `RUST_LOG` selects the level.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Counters shared between a test and its [`Instrumented`] engine.
#[derive(Debug, Default)]
pub struct CallStats {
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl CallStats {
    /// Engine calls so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Most engine calls ever observed running at the same time.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn enter(&self, delay: Duration) -> InFlight<'_> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if !delay.is_zero() {
            thread::sleep(delay);
        }
        InFlight(self)
    }
}

struct InFlight<'a>(&'a CallStats);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Engine wrapper counting calls and, optionally, stretching each one.
pub struct Instrumented<E> {
    inner: E,
    stats: Arc<CallStats>,
    delay: Duration,
}

impl<E: FatEngine> Instrumented<E> {
    pub fn new(inner: E) -> (Self, Arc<CallStats>) {
        Self::with_delay(inner, Duration::ZERO)
    }

    pub fn with_delay(inner: E, delay: Duration) -> (Self, Arc<CallStats>) {
        let stats = Arc::new(CallStats::default());
        let engine = Self {
            inner,
            stats: Arc::clone(&stats),
            delay,
        };
        (engine, stats)
    }
}

impl<E: FatEngine> FatEngine for Instrumented<E> {
    type File<'a>
        = E::File<'a>
    where
        Self: 'a;
    type Dir<'a>
        = E::Dir<'a>
    where
        Self: 'a;

    fn mount(&mut self, drive: VolumeId, disk: Arc<dyn DiskIo>) -> FatResult<VolumeGeometry> {
        let _call = self.stats.enter(Duration::ZERO);
        self.inner.mount(drive, disk)
    }

    fn unmount(&mut self, drive: VolumeId) -> FatResult<()> {
        let _call = self.stats.enter(Duration::ZERO);
        self.inner.unmount(drive)
    }

    fn getfree(&self, drive: VolumeId) -> FatResult<VolumeStats> {
        let _call = self.stats.enter(self.delay);
        self.inner.getfree(drive)
    }

    fn stat(&self, path: &str) -> FatResult<FileInfo> {
        let _call = self.stats.enter(self.delay);
        self.inner.stat(path)
    }

    fn open<'a>(&'a self, path: &str, mode: AccessMode) -> FatResult<Self::File<'a>> {
        let _call = self.stats.enter(self.delay);
        self.inner.open(path, mode)
    }

    fn seek(&self, file: &mut Self::File<'_>, offset: u64) -> FatResult<()> {
        let _call = self.stats.enter(self.delay);
        self.inner.seek(file, offset)
    }

    fn read(&self, file: &mut Self::File<'_>, buf: &mut [u8]) -> FatResult<usize> {
        let _call = self.stats.enter(self.delay);
        self.inner.read(file, buf)
    }

    fn write(&self, file: &mut Self::File<'_>, data: &[u8]) -> FatResult<usize> {
        let _call = self.stats.enter(self.delay);
        self.inner.write(file, data)
    }

    fn sync(&self, file: &mut Self::File<'_>) -> FatResult<()> {
        let _call = self.stats.enter(self.delay);
        self.inner.sync(file)
    }

    fn truncate(&self, file: &mut Self::File<'_>) -> FatResult<()> {
        let _call = self.stats.enter(self.delay);
        self.inner.truncate(file)
    }

    fn close(&self, file: Self::File<'_>) -> FatResult<()> {
        let _call = self.stats.enter(self.delay);
        self.inner.close(file)
    }

    fn opendir<'a>(&'a self, path: &str) -> FatResult<Self::Dir<'a>> {
        let _call = self.stats.enter(self.delay);
        self.inner.opendir(path)
    }

    fn readdir(&self, dir: &mut Self::Dir<'_>) -> FatResult<Option<FileInfo>> {
        let _call = self.stats.enter(self.delay);
        self.inner.readdir(dir)
    }

    fn closedir(&self, dir: Self::Dir<'_>) -> FatResult<()> {
        let _call = self.stats.enter(self.delay);
        self.inner.closedir(dir)
    }

    fn mkdir(&self, path: &str) -> FatResult<()> {
        let _call = self.stats.enter(self.delay);
        self.inner.mkdir(path)
    }

    fn unlink(&self, path: &str) -> FatResult<()> {
        let _call = self.stats.enter(self.delay);
        self.inner.unlink(path)
    }

    fn rename(&self, from: &str, to: &str) -> FatResult<()> {
        let _call = self.stats.enter(self.delay);
        self.inner.rename(from, to)
    }

    fn utime(&self, path: &str, modified: FatTimestamp) -> FatResult<()> {
        let _call = self.stats.enter(self.delay);
        self.inner.utime(path, modified)
    }
}
