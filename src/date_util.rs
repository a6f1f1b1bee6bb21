use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, Utc};

/// Parse a tracker timestamp into UTC.
///
/// Accepts RFC 3339 (`2024-01-10T09:00:00Z`, `2024-01-10T09:00:00.000+01:00`),
/// Jira's offset form without a colon (`2024-01-10T09:00:00.000+0000`),
/// naive date-times and bare dates (`2024-01-10`, taken as midnight UTC).
/// Anything else yields `None`.
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f%z", "%Y-%m-%dT%H:%M:%S%z"] {
        if let Ok(dt) = DateTime::<FixedOffset>::parse_from_str(s, fmt) {
            return Some(dt.with_timezone(&Utc));
        }
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Parse an optional timestamp, treating malformed input as absent.
pub fn parse_opt_timestamp(s: Option<&str>) -> Option<DateTime<Utc>> {
    s.and_then(parse_timestamp)
}

/// Format a timestamp as a `YYYY-MM-DD` date key for display.
pub fn date_key(dt: &DateTime<Utc>) -> String {
    dt.format("%Y-%m-%d").to_string()
}
