// Copyright Kyler Chin <kyler@catenarymaps.org>
// Catenary Transit Initiatives
// Attribution cannot be removed

use chrono::{DateTime, NaiveDateTime, TimeZone};
use chrono_tz::Tz;

/// Reads the `dct:valid` / `dc:date` style ISO-8601 timestamp of a live record
/// as unix seconds. Timestamps without an offset are read in the service
/// timezone. Returns `None` for anything unparseable.
pub fn observation_timestamp_from_iso(iso: &str, service_tz: &Tz) -> Option<u64> {
    let trimmed = iso.trim();

    if trimmed.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return u64::try_from(dt.timestamp()).ok();
    }

    let naive = NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S"))
        .ok()?;

    let local = service_tz.from_local_datetime(&naive).earliest()?;

    u64::try_from(local.timestamp()).ok()
}

/// Timestamp of the record, or `fallback` when the upstream field is absent or malformed.
pub fn observation_timestamp_or(iso: Option<&str>, service_tz: &Tz, fallback: u64) -> u64 {
    iso.and_then(|iso| observation_timestamp_from_iso(iso, service_tz))
        .unwrap_or(fallback)
}
