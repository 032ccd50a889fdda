//! Timezone id validation and UTC conversion for restored date-times.

use std::collections::HashMap;
use std::str::FromStr;

use chrono::{DateTime, LocalResult, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;

/// Error during timezone conversion.
#[derive(Debug, thiserror::Error)]
pub enum ConversionError {
    /// Unknown or invalid timezone identifier.
    #[error("Unknown timezone: {0}")]
    UnknownTimezone(String),

    /// Non-existent time during DST gap.
    #[error("Non-existent time (DST gap): {0}")]
    NonExistentTime(String),

    /// Invalid datetime format.
    #[error("Invalid datetime: {0}")]
    InvalidDateTime(String),
}

/// Registry of system timezones consulted for every dumped tzid.
pub trait TimezoneRegistry {
    /// ## Summary
    /// Maps a dumped tzid to the id of a system timezone. The result differs
    /// from the input when the dump used an alias or a vendor-prefixed id.
    ///
    /// ## Errors
    /// Returns `UnknownTimezone` if no system timezone matches.
    fn resolve(&mut self, tzid: &str) -> Result<String, ConversionError>;

    /// ## Summary
    /// Converts a local time in `tzid` to UTC. A time that occurs twice takes
    /// the first occurrence.
    ///
    /// ## Errors
    /// Returns an error for an unknown tzid or a time inside a DST gap.
    fn to_utc(
        &mut self,
        local_time: NaiveDateTime,
        tzid: &str,
    ) -> Result<DateTime<Utc>, ConversionError>;
}

/// [`TimezoneRegistry`] backed by the IANA database compiled into `chrono-tz`.
#[derive(Debug, Default)]
pub struct ChronoTzRegistry {
    /// Cache of resolved timezones by dumped tzid.
    cache: HashMap<String, Tz>,
}

impl ChronoTzRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lookup(&mut self, tzid: &str) -> Result<Tz, ConversionError> {
        if let Some(tz) = self.cache.get(tzid) {
            return Ok(*tz);
        }

        let tz = normalize_tzid(tzid)
            .ok_or_else(|| ConversionError::UnknownTimezone(tzid.to_owned()))?;

        self.cache.insert(tzid.to_owned(), tz);

        Ok(tz)
    }
}

impl TimezoneRegistry for ChronoTzRegistry {
    fn resolve(&mut self, tzid: &str) -> Result<String, ConversionError> {
        Ok(self.lookup(tzid)?.name().to_owned())
    }

    fn to_utc(
        &mut self,
        local_time: NaiveDateTime,
        tzid: &str,
    ) -> Result<DateTime<Utc>, ConversionError> {
        let tz = self.lookup(tzid)?;

        match tz.from_local_datetime(&local_time) {
            LocalResult::None => Err(ConversionError::NonExistentTime(format!(
                "{local_time} in timezone {tzid}"
            ))),
            LocalResult::Single(dt) => Ok(dt.with_timezone(&Utc)),
            LocalResult::Ambiguous(dt1, _dt2) => Ok(dt1.with_timezone(&Utc)),
        }
    }
}

/// Finds the IANA zone for a tzid as written by older clients.
///
/// Vendor prefixes such as `/mozilla.org/20050126_1/` are stripped one path
/// segment at a time until a zone name remains. Case differences are
/// tolerated last.
fn normalize_tzid(tzid: &str) -> Option<Tz> {
    if let Ok(tz) = Tz::from_str(tzid) {
        return Some(tz);
    }

    let mut rest = tzid.trim().trim_start_matches('/');
    loop {
        if let Ok(tz) = Tz::from_str(rest) {
            return Some(tz);
        }
        if let Ok(tz) = Tz::from_str_insensitive(rest) {
            return Some(tz);
        }
        rest = rest.split_once('/')?.1;
    }
}

const LOCAL_FORMAT: &str = "%Y%m%dT%H%M%S";
const UTC_FORMAT: &str = "%Y%m%dT%H%M%SZ";

/// ## Summary
/// Computes the UTC form of a dumped date-time value.
///
/// Dates and values already in UTC are returned unchanged, as are floating
/// values with no tzid.
///
/// ## Errors
/// Returns an error if the value is malformed or the conversion fails.
pub fn utc_of(
    registry: &mut dyn TimezoneRegistry,
    date_only: bool,
    dtval: &str,
    tzid: Option<&str>,
) -> Result<String, ConversionError> {
    if date_only || dtval.ends_with('Z') {
        return Ok(dtval.to_owned());
    }

    let Some(tzid) = tzid else {
        return Ok(dtval.to_owned());
    };

    let local = NaiveDateTime::parse_from_str(dtval, LOCAL_FORMAT)
        .map_err(|e| ConversionError::InvalidDateTime(format!("{dtval}: {e}")))?;

    Ok(registry.to_utc(local, tzid)?.format(UTC_FORMAT).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_standard_timezone() {
        let mut registry = ChronoTzRegistry::new();

        assert_eq!(registry.resolve("America/New_York").unwrap(), "America/New_York");
        assert!(registry.cache.contains_key("America/New_York"));
    }

    #[test]
    fn vendor_prefix_is_stripped() {
        let mut registry = ChronoTzRegistry::new();

        assert_eq!(
            registry.resolve("/mozilla.org/20050126_1/America/New_York").unwrap(),
            "America/New_York"
        );
        assert_eq!(
            registry.resolve("/softwarestudio.org/Olson_20011030_5/Europe/London").unwrap(),
            "Europe/London"
        );
        assert_eq!(registry.resolve("europe/paris").unwrap(), "Europe/Paris");
    }

    #[test]
    fn unknown_timezone_is_rejected() {
        let mut registry = ChronoTzRegistry::new();

        assert!(matches!(
            registry.resolve("Bogus/Nowhere"),
            Err(ConversionError::UnknownTimezone(_))
        ));
    }

    #[test]
    fn utc_of_local_time() {
        let mut registry = ChronoTzRegistry::new();

        // January: EST is UTC-5
        assert_eq!(
            utc_of(&mut registry, false, "20260115T100000", Some("America/New_York")).unwrap(),
            "20260115T150000Z"
        );
        // July: EDT is UTC-4
        assert_eq!(
            utc_of(&mut registry, false, "20260715T100000", Some("America/New_York")).unwrap(),
            "20260715T140000Z"
        );
    }

    #[test]
    fn utc_of_passes_dates_and_utc_through() {
        let mut registry = ChronoTzRegistry::new();

        assert_eq!(utc_of(&mut registry, true, "20260115", None).unwrap(), "20260115");
        assert_eq!(
            utc_of(&mut registry, false, "20260115T100000Z", Some("Europe/Paris")).unwrap(),
            "20260115T100000Z"
        );
        assert_eq!(
            utc_of(&mut registry, false, "20260115T100000", None).unwrap(),
            "20260115T100000"
        );
    }

    #[test]
    fn dst_gap_is_an_error() {
        let mut registry = ChronoTzRegistry::new();

        assert!(matches!(
            utc_of(&mut registry, false, "20260308T023000", Some("America/New_York")),
            Err(ConversionError::NonExistentTime(_))
        ));
    }
}
