//! Storage date formatting.
//!
//! # Responsibility
//! - Render date-like values in the `YYYY-MM-DD HH:mm:ss` column format.
//!
//! # Invariants
//! - Formatting never fails; unparseable text renders as [`INVALID_DATE`].
//! - Values that denote an absolute instant are rendered in local time.

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, TimeZone};
use std::time::SystemTime;

/// chrono pattern for `YYYY-MM-DD HH:mm:ss`.
pub const STORAGE_DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Rendered in place of a timestamp when the input cannot be interpreted.
pub const INVALID_DATE: &str = "Invalid date";

const TEXT_DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];

/// Date-like values accepted by [`format_for_storage`].
pub trait StorageDate {
    fn to_storage_datetime(&self) -> NaiveDateTime;
}

impl StorageDate for NaiveDateTime {
    fn to_storage_datetime(&self) -> NaiveDateTime {
        *self
    }
}

impl StorageDate for NaiveDate {
    fn to_storage_datetime(&self) -> NaiveDateTime {
        self.and_time(chrono::NaiveTime::MIN)
    }
}

impl<Tz: TimeZone> StorageDate for DateTime<Tz> {
    fn to_storage_datetime(&self) -> NaiveDateTime {
        self.with_timezone(&Local).naive_local()
    }
}

impl StorageDate for SystemTime {
    fn to_storage_datetime(&self) -> NaiveDateTime {
        DateTime::<Local>::from(*self).naive_local()
    }
}

/// Formats `date` as `YYYY-MM-DD HH:mm:ss`.
pub fn format_for_storage<D: StorageDate + ?Sized>(date: &D) -> String {
    date.to_storage_datetime()
        .format(STORAGE_DATETIME_FORMAT)
        .to_string()
}

/// Formats textual date input.
///
/// Accepts RFC 3339 timestamps, `YYYY-MM-DD[ T]HH:MM:SS[.fff]` and plain
/// `YYYY-MM-DD`. Anything else yields [`INVALID_DATE`].
pub fn format_str_for_storage(input: &str) -> String {
    let trimmed = input.trim();

    if let Ok(instant) = DateTime::parse_from_rfc3339(trimmed) {
        return format_for_storage(&instant);
    }
    for pattern in TEXT_DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, pattern) {
            return format_for_storage(&naive);
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        return format_for_storage(&date);
    }

    INVALID_DATE.to_string()
}

/// Formats a Unix epoch timestamp in milliseconds.
pub fn format_epoch_ms_for_storage(epoch_ms: i64) -> String {
    DateTime::from_timestamp_millis(epoch_ms)
        .map_or_else(|| INVALID_DATE.to_string(), |instant| format_for_storage(&instant))
}
