//! Mount option parsing.
//!
//! Volumes are read-only unless asked otherwise. Read-write needs either
//! `rw` together with `force`, or `rw+`. `ro` wins over both. Options not
//! listed here are not ours and are handed to the host's mount unchanged.

use std::convert::Infallible;
use std::str::FromStr;

use strum::EnumString;

use crate::disk::VolumeFlags;

/// An option understood by the bridge.
#[derive(Clone, Copy, Debug, PartialEq, Eq, EnumString)]
pub enum MountOption {
    #[strum(serialize = "ro")]
    ReadOnly,
    #[strum(serialize = "rw")]
    ReadWrite,
    /// Read-write without `force`.
    #[strum(serialize = "rw+")]
    ReadWritePlus,
    #[strum(serialize = "force")]
    Force,
}

impl MountOption {
    pub fn as_str(&self) -> &'static str {
        match self {
            MountOption::ReadOnly => "ro",
            MountOption::ReadWrite => "rw",
            MountOption::ReadWritePlus => "rw+",
            MountOption::Force => "force",
        }
    }
}

impl std::fmt::Display for MountOption {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Parsed `-o` options.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MountOptions {
    pub ro: bool,
    pub rw: bool,
    pub rw_plus: bool,
    pub force: bool,
    /// Unrecognized options, in order.
    pub passthrough: Vec<String>,
}

impl MountOptions {
    /// Parse option lists, each comma-separated as in `-o a,b,c`.
    pub fn parse<I, S>(lists: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut opts = Self::default();
        for list in lists {
            for item in list.as_ref().split(',').map(str::trim).filter(|s| !s.is_empty()) {
                opts.push(item);
            }
        }
        opts
    }

    fn push(&mut self, item: &str) {
        match MountOption::from_str(item) {
            Ok(MountOption::ReadOnly) => self.ro = true,
            Ok(MountOption::ReadWrite) => self.rw = true,
            Ok(MountOption::ReadWritePlus) => self.rw_plus = true,
            Ok(MountOption::Force) => self.force = true,
            Err(_) => self.passthrough.push(item.to_string()),
        }
    }

    /// Effective access mode.
    pub fn read_only(&self) -> bool {
        self.ro || !(self.rw_plus || (self.rw && self.force))
    }

    /// `rw` was asked for but ignored for lack of `force`.
    pub fn rw_without_force(&self) -> bool {
        self.rw && !self.force && !self.rw_plus && !self.ro
    }

    /// Registry flags for a volume mounted with these options.
    pub fn volume_flags(&self) -> VolumeFlags {
        if self.read_only() {
            VolumeFlags::READ_ONLY
        } else {
            VolumeFlags::empty()
        }
    }
}

impl FromStr for MountOptions {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::parse([s]))
    }
}
