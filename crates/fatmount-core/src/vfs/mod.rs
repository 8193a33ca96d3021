//! Host-facing filesystem layer.
//!
//! - [`VfsOps`] - path-based operations a host (FUSE or a test) calls
//! - [`FatVfs`] - the engine behind the global lock, plus its volumes
//! - [`Volume`] - one mounted volume; implements [`VfsOps`]
//!
//! ## Design Decisions
//!
//! - **Path-based, no inodes**: hosts map inodes to paths themselves.
//! - **No open handles between calls**: read and write open, seek and close
//!   within one locked call, so engine handles never escape.
//! - **One lock for everything**: volumes do not run in parallel.

mod error;
mod ops;
mod path;
mod translator;
mod types;

pub use error::{VfsError, VfsResult};
pub use ops::VfsOps;
pub use path::namespaced;
pub use translator::{FatVfs, Volume};
pub use types::{DirEntry, FileAttr, FileType, MountInfo, OpenFlags, StatFs};
