//! FUSE host: `fuser::Filesystem` over one mounted volume.
//!
//! Each kernel request is resolved to a path through the inode table and
//! forwarded to [`VfsOps`]. No engine state survives between requests, so
//! file handles are always 0.

use std::ffi::OsStr;
use std::path::Path;
use std::time::{Duration, SystemTime};

use fatmount_core::{FileAttr, FileType, OpenFlags, VfsError, VfsOps};
use fuser::{
    Filesystem, KernelConfig, ReplyAttr, ReplyCreate, ReplyData, ReplyDirectory, ReplyEmpty,
    ReplyEntry, ReplyOpen, ReplyStatfs, ReplyWrite, Request, TimeOrNow,
};
use rustix::io::Errno;
use tracing::{debug, info};

use crate::inode::InodeTable;

/// How long the kernel may cache attributes and entries.
const TTL: Duration = Duration::from_secs(1);

/// Block size reported in attributes.
const BLOCK_SIZE: u32 = 512;

fn fuse_kind(kind: FileType) -> fuser::FileType {
    match kind {
        FileType::File => fuser::FileType::RegularFile,
        FileType::Directory => fuser::FileType::Directory,
    }
}

/// FUSE front end for a volume.
pub struct FatFuse<V> {
    volume: V,
    inodes: InodeTable,
    uid: u32,
    gid: u32,
}

impl<V: VfsOps> FatFuse<V> {
    pub fn new(volume: V) -> Self {
        Self {
            volume,
            inodes: InodeTable::new(),
            uid: 0,
            gid: 0,
        }
    }

    fn fuse_attr(&self, ino: u64, attr: &FileAttr) -> fuser::FileAttr {
        fuser::FileAttr {
            ino,
            size: attr.size,
            blocks: attr.size.div_ceil(u64::from(BLOCK_SIZE)),
            atime: attr.mtime,
            mtime: attr.mtime,
            ctime: attr.ctime,
            crtime: attr.ctime,
            kind: fuse_kind(attr.kind),
            perm: attr.perm as u16,
            nlink: attr.nlink,
            uid: self.uid,
            gid: self.gid,
            rdev: 0,
            blksize: BLOCK_SIZE,
            flags: 0,
        }
    }

    fn path(&self, ino: u64) -> Result<&Path, i32> {
        self.inodes.path(ino).ok_or(Errno::NOENT.raw_os_error())
    }

    /// Attributes of a freshly created or looked-up child, registering its
    /// inode.
    fn entry(&mut self, path: &Path) -> Result<fuser::FileAttr, VfsError> {
        let attr = self.volume.getattr(path)?;
        let ino = self.inodes.insert(path);
        Ok(self.fuse_attr(ino, &attr))
    }
}

macro_rules! path_or_reply {
    ($self:ident, $ino:expr, $reply:ident) => {
        match $self.path($ino) {
            Ok(path) => path.to_path_buf(),
            Err(errno) => return $reply.error(errno),
        }
    };
}

macro_rules! child_or_reply {
    ($self:ident, $parent:expr, $name:expr, $reply:ident) => {
        match $self.inodes.child($parent, $name) {
            Some(path) => path,
            None => return $reply.error(Errno::NOENT.raw_os_error()),
        }
    };
}

impl<V: VfsOps> Filesystem for FatFuse<V> {
    fn init(&mut self, req: &Request<'_>, _config: &mut KernelConfig) -> Result<(), i32> {
        self.uid = req.uid();
        self.gid = req.gid();
        info!(read_only = self.volume.read_only(), "fuse session started");
        Ok(())
    }

    fn destroy(&mut self) {
        debug!(inodes = self.inodes.len(), "fuse session ended");
    }

    fn lookup(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEntry) {
        let path = child_or_reply!(self, parent, name, reply);
        match self.entry(&path) {
            Ok(attr) => reply.entry(&TTL, &attr, 0),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn getattr(&mut self, _req: &Request<'_>, ino: u64, _fh: Option<u64>, reply: ReplyAttr) {
        let path = path_or_reply!(self, ino, reply);
        match self.volume.getattr(&path) {
            Ok(attr) => reply.attr(&TTL, &self.fuse_attr(ino, &attr)),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn setattr(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _mode: Option<u32>,
        _uid: Option<u32>,
        _gid: Option<u32>,
        size: Option<u64>,
        _atime: Option<TimeOrNow>,
        mtime: Option<TimeOrNow>,
        _ctime: Option<SystemTime>,
        _fh: Option<u64>,
        _crtime: Option<SystemTime>,
        _chgtime: Option<SystemTime>,
        _bkuptime: Option<SystemTime>,
        _flags: Option<u32>,
        reply: ReplyAttr,
    ) {
        let path = path_or_reply!(self, ino, reply);
        // FAT has no owners or mode bits; only size and mtime stick.
        let result = size
            .map_or(Ok(()), |size| self.volume.truncate(&path, size))
            .and_then(|()| match mtime {
                Some(TimeOrNow::SpecificTime(t)) => self.volume.utimens(&path, t),
                Some(TimeOrNow::Now) => self.volume.utimens(&path, SystemTime::now()),
                None => Ok(()),
            })
            .and_then(|()| self.volume.getattr(&path));
        match result {
            Ok(attr) => reply.attr(&TTL, &self.fuse_attr(ino, &attr)),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn mkdir(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, _mode: u32, _umask: u32, reply: ReplyEntry) {
        let path = child_or_reply!(self, parent, name, reply);
        match self.volume.mkdir(&path).and_then(|()| self.entry(&path)) {
            Ok(attr) => reply.entry(&TTL, &attr, 0),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn unlink(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        let path = child_or_reply!(self, parent, name, reply);
        match self.volume.unlink(&path) {
            Ok(()) => {
                self.inodes.remove(&path);
                reply.ok()
            }
            Err(e) => reply.error(e.errno()),
        }
    }

    fn rmdir(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        let path = child_or_reply!(self, parent, name, reply);
        match self.volume.rmdir(&path) {
            Ok(()) => {
                self.inodes.remove(&path);
                reply.ok()
            }
            Err(e) => reply.error(e.errno()),
        }
    }

    fn rename(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        newparent: u64,
        newname: &OsStr,
        _flags: u32,
        reply: ReplyEmpty,
    ) {
        let from = child_or_reply!(self, parent, name, reply);
        let to = child_or_reply!(self, newparent, newname, reply);
        match self.volume.rename(&from, &to) {
            Ok(()) => {
                self.inodes.rename(&from, &to);
                reply.ok()
            }
            Err(e) => reply.error(e.errno()),
        }
    }

    fn open(&mut self, _req: &Request<'_>, ino: u64, flags: i32, reply: ReplyOpen) {
        let path = path_or_reply!(self, ino, reply);
        match self.volume.open(&path, OpenFlags::from_posix(flags)) {
            Ok(()) => reply.opened(0, 0),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn read(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        size: u32,
        flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        let path = path_or_reply!(self, ino, reply);
        let Ok(offset) = u64::try_from(offset) else {
            return reply.error(Errno::INVAL.raw_os_error());
        };
        match self.volume.read(&path, OpenFlags::from_posix(flags), offset, size) {
            Ok(data) => reply.data(&data),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn write(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        data: &[u8],
        _write_flags: u32,
        flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyWrite,
    ) {
        let path = path_or_reply!(self, ino, reply);
        let Ok(offset) = u64::try_from(offset) else {
            return reply.error(Errno::INVAL.raw_os_error());
        };
        match self.volume.write(&path, OpenFlags::from_posix(flags), offset, data) {
            Ok(written) => reply.written(written),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn flush(&mut self, _req: &Request<'_>, _ino: u64, _fh: u64, _lock_owner: u64, reply: ReplyEmpty) {
        // Every write is synced before it returns.
        reply.ok();
    }

    fn release(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        _fh: u64,
        _flags: i32,
        _lock_owner: Option<u64>,
        _flush: bool,
        reply: ReplyEmpty,
    ) {
        reply.ok();
    }

    fn opendir(&mut self, _req: &Request<'_>, ino: u64, _flags: i32, reply: ReplyOpen) {
        let path = path_or_reply!(self, ino, reply);
        match self.volume.opendir(&path) {
            Ok(()) => reply.opened(0, 0),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn readdir(&mut self, _req: &Request<'_>, ino: u64, _fh: u64, offset: i64, mut reply: ReplyDirectory) {
        let path = path_or_reply!(self, ino, reply);
        let entries = match self.volume.readdir(&path) {
            Ok(entries) => entries,
            Err(e) => return reply.error(e.errno()),
        };
        let parent = path.parent().unwrap_or(Path::new("/")).to_path_buf();
        let skip = usize::try_from(offset).unwrap_or(0);
        for (i, entry) in entries.iter().enumerate().skip(skip) {
            let entry_ino = match entry.name.as_str() {
                "." => ino,
                ".." => self.inodes.insert(&parent),
                name => self.inodes.insert(&path.join(name)),
            };
            if reply.add(entry_ino, (i + 1) as i64, fuse_kind(entry.kind), &entry.name) {
                break;
            }
        }
        reply.ok();
    }

    fn releasedir(&mut self, _req: &Request<'_>, _ino: u64, _fh: u64, _flags: i32, reply: ReplyEmpty) {
        reply.ok();
    }

    fn statfs(&mut self, _req: &Request<'_>, _ino: u64, reply: ReplyStatfs) {
        match self.volume.statfs() {
            Ok(s) => reply.statfs(s.blocks, s.bfree, s.bavail, s.files, s.ffree, s.bsize, s.namelen, s.frsize),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn create(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        _mode: u32,
        _umask: u32,
        flags: i32,
        reply: ReplyCreate,
    ) {
        let path = child_or_reply!(self, parent, name, reply);
        match self
            .volume
            .create(&path, OpenFlags::from_posix(flags))
            .and_then(|()| self.entry(&path))
        {
            Ok(attr) => reply.created(&TTL, &attr, 0, 0, 0),
            Err(e) => reply.error(e.errno()),
        }
    }
}
