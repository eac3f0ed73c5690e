use chrono::{DateTime, SecondsFormat, TimeDelta};

use crate::core::{Result, UploadError};

/// `start_time + duration` seconds, formatted back as RFC 3339 at whole-second
/// precision. Durations that leave chrono's range are an error.
pub fn calculate_end_time(start_time: &str, duration: i64) -> Result<String> {
    let start = DateTime::parse_from_rfc3339(start_time)?;
    let end = TimeDelta::try_seconds(duration)
        .and_then(|delta| start.checked_add_signed(delta))
        .ok_or_else(|| {
            UploadError::protocol(format!("end time out of range for duration {duration}"))
        })?;
    Ok(end.to_rfc3339_opts(SecondsFormat::Secs, true))
}
