//! Entry timestamps.
//!
//! Archive engines report creation, access, and modification times as Windows
//! FILETIME values: 100-nanosecond intervals since January 1, 1601 (UTC).
//! [`Timestamp`] keeps that raw value so nothing is lost between the engine
//! and the destination filesystem, and converts to [`SystemTime`] and
//! [`filetime::FileTime`] when the attribute-restoration pass writes it back.
//!
//! # Example
//!
//! ```rust
//! use arcx::Timestamp;
//!
//! let ts = Timestamp::from_unix_secs(1_700_000_000).unwrap();
//! assert_eq!(ts.as_unix_secs(), 1_700_000_000);
//! ```

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Difference between the FILETIME epoch (1601) and the Unix epoch (1970)
/// in 100-nanosecond intervals.
const FILETIME_UNIX_DIFF: u64 = 116444736000000000;

/// Number of 100-nanosecond intervals per second.
const INTERVALS_PER_SECOND: u64 = 10_000_000;

/// A FILETIME-precision timestamp attached to an archive entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp {
    /// Raw FILETIME value (100-nanosecond intervals since 1601-01-01)
    filetime: u64,
}

impl Timestamp {
    /// Creates a timestamp from a raw Windows FILETIME value.
    #[inline]
    pub const fn from_filetime(filetime: u64) -> Self {
        Self { filetime }
    }

    /// Creates a timestamp from Unix seconds.
    ///
    /// Returns `None` if the value does not fit the FILETIME range.
    pub fn from_unix_secs(secs: i64) -> Option<Self> {
        Self::from_unix_secs_nanos(secs, 0)
    }

    /// Creates a timestamp from Unix seconds and nanoseconds.
    ///
    /// Nanoseconds are truncated to 100ns precision.
    pub fn from_unix_secs_nanos(secs: i64, nanos: u32) -> Option<Self> {
        let nano_intervals = u64::from(nanos) / 100;
        if secs < 0 {
            let neg_intervals = secs.unsigned_abs().checked_mul(INTERVALS_PER_SECOND)?;
            FILETIME_UNIX_DIFF
                .checked_sub(neg_intervals)?
                .checked_add(nano_intervals)
                .map(Self::from_filetime)
        } else {
            let intervals = (secs as u64).checked_mul(INTERVALS_PER_SECOND)?;
            FILETIME_UNIX_DIFF
                .checked_add(intervals)?
                .checked_add(nano_intervals)
                .map(Self::from_filetime)
        }
    }

    /// Creates a timestamp from a calendar date and time of day in UTC.
    ///
    /// Used for formats that store broken-down times (DOS date/time in zip).
    /// Returns `None` for out-of-range fields.
    pub fn from_civil(year: i32, month: u32, day: u32, hour: u32, minute: u32, second: u32) -> Option<Self> {
        if !(1..=12).contains(&month) || !(1..=31).contains(&day) || hour > 23 || minute > 59 || second > 60 {
            return None;
        }
        let days = days_from_civil(year, month, day);
        let secs = days * 86_400 + i64::from(hour) * 3600 + i64::from(minute) * 60 + i64::from(second);
        Self::from_unix_secs(secs)
    }

    /// Creates a timestamp from a `SystemTime`.
    pub fn from_system_time(time: SystemTime) -> Option<Self> {
        match time.duration_since(UNIX_EPOCH) {
            Ok(duration) => {
                Self::from_unix_secs_nanos(duration.as_secs() as i64, duration.subsec_nanos())
            }
            Err(e) => {
                let duration = e.duration();
                let intervals = duration.as_secs().checked_mul(INTERVALS_PER_SECOND)?
                    + u64::from(duration.subsec_nanos()) / 100;
                FILETIME_UNIX_DIFF
                    .checked_sub(intervals)
                    .map(Self::from_filetime)
            }
        }
    }

    /// Returns the timestamp as Unix seconds, rounding towards negative
    /// infinity for pre-epoch values.
    pub fn as_unix_secs(&self) -> i64 {
        if self.filetime >= FILETIME_UNIX_DIFF {
            ((self.filetime - FILETIME_UNIX_DIFF) / INTERVALS_PER_SECOND) as i64
        } else {
            let intervals = FILETIME_UNIX_DIFF - self.filetime;
            -(intervals.div_ceil(INTERVALS_PER_SECOND) as i64)
        }
    }

    /// Returns the sub-second portion as nanoseconds (always a multiple of 100).
    #[inline]
    pub fn sub_second_nanos(&self) -> u32 {
        let rem = if self.filetime >= FILETIME_UNIX_DIFF {
            (self.filetime - FILETIME_UNIX_DIFF) % INTERVALS_PER_SECOND
        } else {
            let back = (FILETIME_UNIX_DIFF - self.filetime) % INTERVALS_PER_SECOND;
            if back == 0 { 0 } else { INTERVALS_PER_SECOND - back }
        };
        (rem * 100) as u32
    }

    /// Converts to a `SystemTime`, preserving 100ns precision.
    pub fn as_system_time(&self) -> SystemTime {
        if self.filetime >= FILETIME_UNIX_DIFF {
            let intervals = self.filetime - FILETIME_UNIX_DIFF;
            let nanos = ((intervals % INTERVALS_PER_SECOND) * 100) as u32;
            UNIX_EPOCH + Duration::new(intervals / INTERVALS_PER_SECOND, nanos)
        } else {
            let intervals = FILETIME_UNIX_DIFF - self.filetime;
            let nanos = ((intervals % INTERVALS_PER_SECOND) * 100) as u32;
            UNIX_EPOCH - Duration::new(intervals / INTERVALS_PER_SECOND, nanos)
        }
    }

    /// Converts to the representation used by the `filetime` crate.
    pub fn to_file_time(&self) -> filetime::FileTime {
        filetime::FileTime::from_unix_time(self.as_unix_secs(), self.sub_second_nanos())
    }
}

impl Default for Timestamp {
    /// Returns the Unix epoch (January 1, 1970).
    fn default() -> Self {
        Self::from_filetime(FILETIME_UNIX_DIFF)
    }
}

impl From<Timestamp> for SystemTime {
    fn from(ts: Timestamp) -> SystemTime {
        ts.as_system_time()
    }
}

impl std::fmt::Display for Timestamp {
    /// Formats as `YYYY-MM-DD HH:MM:SS` (UTC).
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let secs = self.as_unix_secs();
        let days = secs.div_euclid(86_400);
        let time = secs.rem_euclid(86_400);
        let (year, month, day) = civil_from_days(days);
        write!(
            f,
            "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
            year,
            month,
            day,
            time / 3600,
            (time % 3600) / 60,
            time % 60
        )
    }
}

// Howard Hinnant's days-from-civil algorithm (proleptic Gregorian).
fn days_from_civil(year: i32, month: u32, day: u32) -> i64 {
    let y = i64::from(year) - i64::from(month <= 2);
    let era = y.div_euclid(400);
    let yoe = y - era * 400;
    let m = i64::from(month);
    let doy = (153 * (if m > 2 { m - 3 } else { m + 9 }) + 2) / 5 + i64::from(day) - 1;
    let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
    era * 146_097 + doe - 719_468
}

fn civil_from_days(days: i64) -> (i64, u32, u32) {
    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z - era * 146_097;
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let month = if mp < 10 { mp + 3 } else { mp - 9 } as u32;
    let year = yoe + era * 400 + i64::from(month <= 2);
    (year, month, day)
}
