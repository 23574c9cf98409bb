//! HTTP-date formatting and parsing.
//!
//! Produces IMF-fixdate (`Sun, 06 Nov 1994 08:49:37 GMT`) and accepts the two
//! obsolete forms recipients must still understand: RFC 850
//! (`Sunday, 06-Nov-94 08:49:37 GMT`) and asctime (`Sun Nov  6 08:49:37 1994`).

use chrono::{DateTime, NaiveDateTime, TimeZone, Timelike, Utc};

const IMF_FIXDATE: &str = "%a, %d %b %Y %H:%M:%S GMT";
const RFC_850: &str = "%A, %d-%b-%y %H:%M:%S GMT";
const ASCTIME: &str = "%a %b %e %H:%M:%S %Y";

/// Formats a timestamp as an IMF-fixdate.
pub fn format_http_date(value: DateTime<Utc>) -> String {
    value.format(IMF_FIXDATE).to_string()
}

/// Parses any of the three HTTP-date forms.
///
/// Returns `None` for anything else; callers treat unparseable dates as absent.
pub fn parse_http_date(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc2822(value) {
        return Some(parsed.with_timezone(&Utc));
    }
    [IMF_FIXDATE, RFC_850, ASCTIME]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .map(|naive| Utc.from_utc_datetime(&naive))
}

/// Drops sub-second precision, which HTTP-dates cannot carry.
pub fn truncate_to_seconds(value: DateTime<Utc>) -> DateTime<Utc> {
    value.with_nanosecond(0).unwrap_or(value)
}
