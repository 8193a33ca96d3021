//! Packed FAT date/time stamps.
//!
//! ```text
//! date: | year - 1980 (15..9) | month (8..5) | day (4..0) |
//! time: | hour (15..11) | minute (10..5) | seconds / 2 (4..0) |
//! ```
//!
//! A zero date with a zero time means "no timestamp" and converts to the
//! Unix epoch. Calendar conversions use local time.

use std::time::SystemTime;

use chrono::{Datelike, Local, NaiveDate, NaiveDateTime, TimeZone, Timelike};
use serde::Serialize;

/// First year representable in a packed date.
pub const FAT_EPOCH_YEAR: i32 = 1980;

/// Last year representable in a packed date.
pub const FAT_MAX_YEAR: i32 = FAT_EPOCH_YEAR + 127;

/// A packed date/time pair as stored in a directory entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct FatTimestamp {
    pub date: u16,
    pub time: u16,
}

impl FatTimestamp {
    /// The "no timestamp" sentinel.
    pub const NONE: Self = Self { date: 0, time: 0 };

    pub fn new(date: u16, time: u16) -> Self {
        Self { date, time }
    }

    /// Pack calendar fields. Seconds are truncated to 2-second resolution.
    ///
    /// Returns `None` when a field is outside what the encoding can hold.
    pub fn from_fields(year: i32, month: u32, day: u32, hour: u32, minute: u32, second: u32) -> Option<Self> {
        if !(FAT_EPOCH_YEAR..=FAT_MAX_YEAR).contains(&year)
            || !(1..=12).contains(&month)
            || !(1..=31).contains(&day)
            || hour > 23
            || minute > 59
            || second > 59
        {
            return None;
        }
        let date = (((year - FAT_EPOCH_YEAR) as u16) << 9) | ((month as u16) << 5) | day as u16;
        let time = ((hour as u16) << 11) | ((minute as u16) << 5) | (second as u16 / 2);
        Some(Self { date, time })
    }

    /// Pack a naive calendar date-time.
    pub fn from_naive(dt: &NaiveDateTime) -> Option<Self> {
        Self::from_fields(dt.year(), dt.month(), dt.day(), dt.hour(), dt.minute(), dt.second())
    }

    /// Pack a point in time, interpreted in the local time zone.
    pub fn from_system_time(t: SystemTime) -> Option<Self> {
        let local: chrono::DateTime<Local> = chrono::DateTime::from(t);
        Self::from_naive(&local.naive_local())
    }

    pub fn is_none(&self) -> bool {
        *self == Self::NONE
    }

    pub fn year(&self) -> i32 {
        i32::from((self.date >> 9) & 0x7f) + FAT_EPOCH_YEAR
    }

    pub fn month(&self) -> u32 {
        u32::from((self.date >> 5) & 0x0f)
    }

    pub fn day(&self) -> u32 {
        u32::from(self.date & 0x1f)
    }

    pub fn hour(&self) -> u32 {
        u32::from((self.time >> 11) & 0x1f)
    }

    pub fn minute(&self) -> u32 {
        u32::from((self.time >> 5) & 0x3f)
    }

    pub fn second(&self) -> u32 {
        u32::from(self.time & 0x1f) * 2
    }

    /// Unpack into a naive calendar date-time.
    ///
    /// `None` for the sentinel and for stamps whose fields do not name a
    /// real calendar moment (month 0, February 30th, hour 31...).
    pub fn to_naive(&self) -> Option<NaiveDateTime> {
        if self.is_none() {
            return None;
        }
        NaiveDate::from_ymd_opt(self.year(), self.month(), self.day())?
            .and_hms_opt(self.hour(), self.minute(), self.second())
    }

    /// Unpack into a point in time, interpreting the fields as local time.
    ///
    /// The sentinel and undecodable stamps map to the Unix epoch.
    pub fn to_system_time(&self) -> SystemTime {
        self.to_naive()
            .and_then(|naive| Local.from_local_datetime(&naive).earliest())
            .map(SystemTime::from)
            .unwrap_or(SystemTime::UNIX_EPOCH)
    }
}
