use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, NaiveDateTime, Utc};
use std::time::SystemTime;

// Define the Windows epoch as a const.
// NaiveDate/Time construction can panic if given invalid values, but 1601-01-01 00:00:00 is valid.
const WINDOWS_EPOCH_NAIVE: NaiveDateTime = match NaiveDate::from_ymd_opt(1601, 1, 1) {
    Some(date) => match date.and_hms_opt(0, 0, 0) {
        Some(datetime) => datetime,
        // These panics should ideally not be hit for hardcoded valid dates/times.
        None => panic!("Invalid time component for Windows epoch constant"),
    },
    None => panic!("Invalid date component for Windows epoch constant"),
};
const WINDOWS_EPOCH_UTC: DateTime<Utc> =
    DateTime::<Utc>::from_naive_utc_and_offset(WINDOWS_EPOCH_NAIVE, Utc);

/// Converts a Windows FILETIME (100-nanosecond intervals since 1601-01-01 UTC)
/// to a `std::time::SystemTime`.
///
/// Returns `None` for values outside the representable range (negative ticks, or
/// instants past the calendar range), so a corrupt timestamp degrades to
/// "unavailable" instead of failing the record it came from.
pub(crate) fn filetime_to_systemtime(filetime: i64) -> Option<SystemTime> {
    if filetime < 0 {
        return None;
    }
    let ticks = filetime as u64;

    // Convert 100-nanosecond intervals to seconds and remaining nanoseconds.
    let secs_since_windows_epoch = (ticks / 10_000_000) as i64;
    let nanos_remainder = ((ticks % 10_000_000) * 100) as i64;

    let duration_since_windows_epoch = ChronoDuration::seconds(secs_since_windows_epoch)
        + ChronoDuration::nanoseconds(nanos_remainder);

    let system_time_utc = WINDOWS_EPOCH_UTC.checked_add_signed(duration_since_windows_epoch)?;

    Some(system_time_utc.into())
}
