use chrono::{DateTime, NaiveDateTime, Utc};

/// Renders a stored UTC timestamp as RFC 3339.
pub fn to_iso(dt: NaiveDateTime) -> String {
    DateTime::<Utc>::from_naive_utc_and_offset(dt, Utc).to_rfc3339()
}

pub fn opt_iso(dt: Option<NaiveDateTime>) -> Option<String> {
    dt.map(to_iso)
}
