// Copyright Kyler Chin <kyler@catenarymaps.org>
// Catenary Transit Initiatives
// Attribution cannot be removed

use lazy_static::lazy_static;
use regex::Regex;

pub const TRAIN_NAMESPACE: &str = "odpt.Train:";
pub const RAILWAY_NAMESPACE: &str = "odpt.Railway:";

lazy_static! {
    static ref SERVICE_DATE_SUFFIX_REGEX: Regex = Regex::new(r"\.[0-9]{8}$").unwrap();
    static ref CLOCK_TIME_REGEX: Regex =
        Regex::new(r"^\s*([0-9]+):([0-9]{1,2})(?::([0-9]{1,2}))?\s*$").unwrap();
}

/// Strips the `odpt.Train:` namespace and a trailing `.YYYYMMDD` service date.
///
/// `odpt.Train:JR-East.Yamanote.401G.20240401` becomes `JR-East.Yamanote.401G`.
pub fn normalize_trip_id(raw: &str) -> String {
    let without_namespace = raw.strip_prefix(TRAIN_NAMESPACE).unwrap_or(raw);

    SERVICE_DATE_SUFFIX_REGEX
        .replace(without_namespace, "")
        .to_string()
}

pub fn normalize_railway_id(raw: &str) -> String {
    raw.strip_prefix(RAILWAY_NAMESPACE).unwrap_or(raw).to_string()
}

/// Train number token of a live trip id, the part after the last separator.
/// `JR-East.Yamanote.401G` gives `401G`.
pub fn train_number_token(trip_id: &str) -> Option<&str> {
    let token = match trip_id.rfind(['.', ':']) {
        Some(idx) => &trip_id[idx + 1..],
        None => trip_id,
    };

    match token.is_empty() {
        true => None,
        false => Some(token),
    }
}

/// Parses `HH:MM[:SS]` into seconds since midnight. Hours are unbounded so
/// `25:10:00` is valid. Empty or malformed strings are absent, not zero.
pub fn clock_time_to_seconds(time_str: &str) -> Option<u32> {
    let captures = CLOCK_TIME_REGEX.captures(time_str)?;

    let hours = captures.get(1)?.as_str().parse::<u32>().ok()?;
    let minutes = captures.get(2)?.as_str().parse::<u32>().ok()?;
    let seconds = match captures.get(3) {
        Some(s) => s.as_str().parse::<u32>().ok()?,
        None => 0,
    };

    if minutes >= 60 || seconds >= 60 {
        return None;
    }

    hours
        .checked_mul(3600)?
        .checked_add(minutes * 60 + seconds)
}

pub fn seconds_to_clock_time(seconds: u32) -> String {
    format!(
        "{:02}:{:02}:{:02}",
        seconds / 3600,
        (seconds % 3600) / 60,
        seconds % 60
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_namespace_and_service_date() {
        assert_eq!(
            normalize_trip_id("odpt.Train:JR-East.Yamanote.401G.20240401"),
            "JR-East.Yamanote.401G"
        );
        assert_eq!(
            normalize_trip_id("JR-East.ChuoRapid.1201T"),
            "JR-East.ChuoRapid.1201T"
        );
    }

    #[test]
    fn keeps_short_numeric_suffixes() {
        // a 4 digit train number is not a service date
        assert_eq!(
            normalize_trip_id("odpt.Train:Tokyu.Toyoko.1234"),
            "Tokyu.Toyoko.1234"
        );
    }

    #[test]
    fn railway_namespace() {
        assert_eq!(
            normalize_railway_id("odpt.Railway:JR-East.Yamanote"),
            "JR-East.Yamanote"
        );
        assert_eq!(normalize_railway_id("Yamanote"), "Yamanote");
    }

    #[test]
    fn train_number() {
        assert_eq!(train_number_token("JR-East.Yamanote.401G"), Some("401G"));
        assert_eq!(train_number_token("401G"), Some("401G"));
        assert_eq!(train_number_token("JR-East.Yamanote."), None);
    }

    #[test]
    fn clock_times() {
        assert_eq!(clock_time_to_seconds("08:05:00"), Some(29100));
        assert_eq!(clock_time_to_seconds("08:05"), Some(29100));
        assert_eq!(clock_time_to_seconds("25:10:30"), Some(90630));
        assert_eq!(clock_time_to_seconds(""), None);
        assert_eq!(clock_time_to_seconds("8h05"), None);
        assert_eq!(clock_time_to_seconds("08:75:00"), None);
        assert_eq!(seconds_to_clock_time(90630), "25:10:30");
    }
}
