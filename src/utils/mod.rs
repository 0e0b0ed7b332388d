pub mod url_validation;

use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

/// Current wall-clock time as an RFC 3339 string.
///
/// Session records store timestamps as strings so the on-disk JSON stays
/// readable by the dashboard and report components.
pub fn rfc3339_now() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| String::from("1970-01-01T00:00:00Z"))
}

/// Current wall-clock time as fractional unix seconds.
///
/// Transcript entries carry this form; capture order is what matters, not
/// timezone-aware display.
pub fn unix_now() -> f64 {
    let now = OffsetDateTime::now_utc();
    now.unix_timestamp() as f64 + f64::from(now.nanosecond()) / 1e9
}
