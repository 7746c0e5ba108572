use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

/// Output layout for item publication dates, e.g. `Tue, Jan 02, 2024, 03:04:05 PM GMT`.
/// Always rendered in UTC so output does not depend on the host time zone.
pub const PUB_DATE_FORMAT: &str = "%a, %b %d, %Y, %I:%M:%S %p GMT";

/// Zone-less layouts, interpreted as UTC.
const NAIVE_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// Parses a feed timestamp.
///
/// Accepts RFC 3339 (the Atom format), RFC 2822 (the RSS format), ISO-like
/// timestamps without an offset, and bare `YYYY-MM-DD` dates.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }

    if let Ok(dt) = DateTime::parse_from_rfc2822(raw) {
        return Some(dt.with_timezone(&Utc));
    }

    for format in NAIVE_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(dt.and_utc());
        }
    }

    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

/// Formats an entry's `published` value for the RSS `pubDate` field.
///
/// Absent or unparseable input yields an empty string.
pub fn format_pub_date(raw: Option<&str>) -> String {
    let Some(raw) = raw else {
        return String::new();
    };
    match parse_timestamp(raw) {
        Some(dt) => dt.format(PUB_DATE_FORMAT).to_string(),
        None => {
            tracing::debug!(value = %raw, "Unparseable publication date, leaving pubDate empty");
            String::new()
        }
    }
}
