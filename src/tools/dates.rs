use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};

const DATETIME_FORMATS: [&str; 3] = ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M"];
const DATE_FORMATS: [&str; 5] = ["%Y-%m-%d", "%Y/%m/%d", "%b %d, %Y", "%B %d, %Y", "%d %B %Y"];

/// Best-effort parse of the publication dates search backends and page
/// metadata report. Naive values are taken as UTC.
pub fn parse_published(raw: &str) -> Option<DateTime<Utc>> {
    let value = raw.trim();
    if value.is_empty() {
        return None;
    }

    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Some(parsed.with_timezone(&Utc));
    }
    if let Ok(parsed) = DateTime::parse_from_rfc2822(value) {
        return Some(parsed.with_timezone(&Utc));
    }

    let without_fraction = value.split('.').next().unwrap_or(value);
    for format in DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(without_fraction, format) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(value, format) {
            return date
                .and_hms_opt(0, 0, 0)
                .map(|naive| Utc.from_utc_datetime(&naive));
        }
    }
    None
}

/// Unix timestamp in seconds, as reported by Reddit's `created_utc`.
pub fn from_unix_seconds(seconds: f64) -> Option<DateTime<Utc>> {
    if !seconds.is_finite() || seconds < 0.0 {
        return None;
    }
    DateTime::from_timestamp(seconds.trunc() as i64, 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Datelike;

    #[test]
    fn parses_common_shapes() {
        let expected = Utc.with_ymd_and_hms(2021, 3, 4, 0, 0, 0).single();
        assert_eq!(parse_published("2021-03-04"), expected);
        assert_eq!(parse_published("Mar 4, 2021"), expected);
        assert_eq!(parse_published("2021-03-04T00:00:00Z"), expected);
        assert_eq!(parse_published("2021-03-04T00:00:00.000"), expected);
    }

    #[test]
    fn garbage_is_none() {
        assert_eq!(parse_published("last tuesday"), None);
        assert_eq!(parse_published(""), None);
    }

    #[test]
    fn unix_seconds_round_down() {
        let parsed = from_unix_seconds(1_600_000_000.7).expect("valid");
        assert_eq!(parsed.year(), 2020);
        assert!(from_unix_seconds(f64::NAN).is_none());
    }
}
