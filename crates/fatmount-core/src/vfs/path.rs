//! Volume namespacing of engine paths.
//!
//! The engine selects a drive with an `"N:"` prefix and treats unprefixed
//! paths as drive 0. Every host path is rewritten here exactly once, before
//! it reaches the engine.

use std::path::Path;

use super::{VfsError, VfsResult};
use crate::disk::VolumeId;

/// Host path as UTF-8. FAT long names are Unicode, so anything else cannot
/// name an object on the volume.
pub fn path_str(path: &Path) -> VfsResult<&str> {
    path.to_str()
        .ok_or_else(|| VfsError::invalid_argument(path.to_string_lossy()))
}

/// Engine path of `path` on volume `id`.
pub fn namespaced(id: VolumeId, path: &str) -> String {
    if id == 0 {
        path.to_string()
    } else {
        format!("{id}:{path}")
    }
}

/// True if `path` names the volume root.
pub fn is_root(path: &str) -> bool {
    path.trim_start_matches('/').is_empty()
}
