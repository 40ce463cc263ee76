//! CF-convention time decoding ("<unit> since <epoch>").

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, TimeZone, Utc};

/// Convert a numeric CF time value into a UTC timestamp.
///
/// Supports `seconds`, `minutes`, `hours` and `days` since an epoch written
/// as a date, a date-time with a space or `T` separator, optionally suffixed
/// with `Z` or `UTC`.
pub fn parse_cf_time(value: f64, units: &str) -> Option<DateTime<Utc>> {
    if !value.is_finite() {
        return None;
    }

    let (unit, epoch) = units.split_once(" since ")?;
    let seconds_per_unit = match unit.trim().to_lowercase().as_str() {
        "seconds" | "second" | "secs" | "s" => 1.0,
        "minutes" | "minute" | "mins" => 60.0,
        "hours" | "hour" | "hrs" | "h" => 3600.0,
        "days" | "day" | "d" => 86400.0,
        _ => return None,
    };

    let epoch = parse_epoch(epoch.trim())?;
    let millis = (value * seconds_per_unit * 1000.0).round() as i64;
    epoch.checked_add_signed(Duration::milliseconds(millis))
}

fn parse_epoch(text: &str) -> Option<DateTime<Utc>> {
    let text = text
        .trim_end_matches("UTC")
        .trim_end_matches('Z')
        .trim();

    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }

    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
}
