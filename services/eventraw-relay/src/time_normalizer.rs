//! Normalization of stored event timestamps.
//!
//! Event rows store their timestamps either as UNIX epoch seconds (integer or
//! real) or as `YYYY-MM-DD HH:MM:SS` text. Every form is turned into a pair of
//! formatted strings: the wall-clock time in the device's local zone and the
//! wall-clock time in UTC.
//!
//! Text timestamps are taken to already be local wall-clock time. Their "UTC"
//! string reuses the same digits; no zone conversion is applied. Downstream
//! consumers depend on this, so it is kept as-is.

use crate::store::ColumnValue;
use chrono::{DateTime, FixedOffset, Local, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Timelike, Utc};
use thiserror::Error;

/// Output format for both local and UTC strings
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TimestampError {
    #[error("Unparsable timestamp: {0}")]
    Unparsable(String),
}

/// Formatted local and UTC representation of one timestamp
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedTime {
    pub local: String,
    pub utc: String,
}

/// Zone used for the "local" half of a [`NormalizedTime`]
#[derive(Debug, Clone, Copy, Default)]
pub enum LocalZone {
    /// The system's configured time zone
    #[default]
    System,
    /// A fixed offset from UTC
    Fixed(FixedOffset),
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TimeNormalizer {
    zone: LocalZone,
}

impl TimeNormalizer {
    pub fn new(zone: LocalZone) -> Self {
        Self { zone }
    }

    /// Build a normalizer from an optional fixed offset in seconds
    pub fn from_offset_seconds(offset: Option<i32>) -> Self {
        let zone = offset
            .and_then(FixedOffset::east_opt)
            .map(LocalZone::Fixed)
            .unwrap_or_default();
        Self::new(zone)
    }

    /// Normalize a stored timestamp.
    ///
    /// Numbers are epoch seconds. Text is first tried as a local wall-clock
    /// time, then as epoch seconds written out as a number.
    pub fn normalize(&self, value: &ColumnValue) -> Result<NormalizedTime, TimestampError> {
        match value {
            ColumnValue::Integer(secs) => self.normalize_epoch(*secs as f64, value),
            ColumnValue::Real(secs) => self.normalize_epoch(*secs, value),
            ColumnValue::Text(text) => {
                if let Some(naive) = parse_wall_clock(text) {
                    let formatted = naive.format(TIMESTAMP_FORMAT).to_string();
                    return Ok(NormalizedTime {
                        local: formatted.clone(),
                        utc: formatted,
                    });
                }

                let secs: f64 = text
                    .trim()
                    .parse()
                    .map_err(|_| TimestampError::Unparsable(text.clone()))?;
                self.normalize_epoch(secs, value)
            }
            ColumnValue::Null | ColumnValue::Blob(_) => {
                Err(TimestampError::Unparsable(value.to_string()))
            }
        }
    }

    fn normalize_epoch(
        &self,
        secs: f64,
        value: &ColumnValue,
    ) -> Result<NormalizedTime, TimestampError> {
        let utc =
            epoch_to_utc(secs).ok_or_else(|| TimestampError::Unparsable(value.to_string()))?;
        Ok(NormalizedTime {
            local: self.local_string(&utc),
            utc: utc.format(TIMESTAMP_FORMAT).to_string(),
        })
    }

    fn local_string(&self, utc: &DateTime<Utc>) -> String {
        match self.zone {
            LocalZone::System => format_in(utc, &Local),
            LocalZone::Fixed(offset) => format_in(utc, &offset),
        }
    }
}

/// Parse `YYYY-MM-DD HH:MM:SS`, requiring whitespace between the date and
/// the time and rejecting a `:60` seconds field.
fn parse_wall_clock(text: &str) -> Option<NaiveDateTime> {
    let (date, time) = text.split_once(char::is_whitespace)?;
    let date = NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()?;
    let time = NaiveTime::parse_from_str(time.trim_start(), "%H:%M:%S").ok()?;
    // chrono stores a 60th second as a leap nanosecond
    if time.nanosecond() >= 1_000_000_000 {
        return None;
    }
    Some(date.and_time(time))
}

fn format_in<Tz: TimeZone>(utc: &DateTime<Utc>, zone: &Tz) -> String {
    utc.with_timezone(zone)
        .naive_local()
        .format(TIMESTAMP_FORMAT)
        .to_string()
}

/// Sub-second precision is truncated toward the earlier second.
fn epoch_to_utc(secs: f64) -> Option<DateTime<Utc>> {
    if !secs.is_finite() {
        return None;
    }
    let whole = secs.floor();
    if whole < i64::MIN as f64 || whole > i64::MAX as f64 {
        return None;
    }
    let nanos = (((secs - whole) * 1e9) as u32).min(999_999_999);
    DateTime::<Utc>::from_timestamp(whole as i64, nanos)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixed(hours: i32) -> TimeNormalizer {
        TimeNormalizer::new(LocalZone::Fixed(FixedOffset::east_opt(hours * 3600).unwrap()))
    }

    #[test]
    fn test_integer_epoch() {
        let normalized = fixed(9).normalize(&ColumnValue::Integer(1_761_868_860)).unwrap();
        assert_eq!(normalized.utc, "2025-10-31 00:01:00");
        assert_eq!(normalized.local, "2025-10-31 09:01:00");
    }

    #[test]
    fn test_real_epoch_truncates_fraction() {
        let normalized = fixed(0).normalize(&ColumnValue::Real(1_761_868_860.75)).unwrap();
        assert_eq!(normalized.utc, "2025-10-31 00:01:00");
        assert_eq!(normalized.local, normalized.utc);

        let before_epoch = fixed(0).normalize(&ColumnValue::Real(-1.5)).unwrap();
        assert_eq!(before_epoch.utc, "1969-12-31 23:59:58");
    }

    #[test]
    fn test_utc_string_round_trips_to_epoch() {
        let normalizer = fixed(-5);
        for t in [0_i64, 86_399, 1_700_000_000, 1_761_868_860, 2_000_000_001] {
            let normalized = normalizer.normalize(&ColumnValue::Integer(t)).unwrap();
            let parsed = NaiveDateTime::parse_from_str(&normalized.utc, TIMESTAMP_FORMAT)
                .unwrap()
                .and_utc();
            assert_eq!(parsed.timestamp(), t);

            let local = NaiveDateTime::parse_from_str(&normalized.local, TIMESTAMP_FORMAT).unwrap();
            assert_eq!((parsed.naive_utc() - local).num_seconds(), 5 * 3600);
        }
    }

    #[test]
    fn test_wall_clock_text_keeps_digits() {
        let normalized = fixed(9)
            .normalize(&ColumnValue::from("2024-01-01 10:00:00"))
            .unwrap();
        assert_eq!(normalized.local, "2024-01-01 10:00:00");
        assert_eq!(normalized.utc, "2024-01-01 10:00:00");
    }

    #[test]
    fn test_numeric_text_falls_back_to_epoch() {
        let normalized = fixed(0).normalize(&ColumnValue::from("1761868860")).unwrap();
        assert_eq!(normalized.utc, "2025-10-31 00:01:00");

        let normalized = fixed(0).normalize(&ColumnValue::from(" 1761868860.5 ")).unwrap();
        assert_eq!(normalized.utc, "2025-10-31 00:01:00");
    }

    #[test]
    fn test_unparsable_inputs() {
        let normalizer = fixed(0);
        for value in [
            ColumnValue::from("yesterday"),
            ColumnValue::from("2024-01-01T10:00:00"),
            ColumnValue::from("nan"),
            ColumnValue::Real(f64::INFINITY),
            ColumnValue::Null,
            ColumnValue::Blob(vec![1, 2]),
        ] {
            assert!(
                matches!(normalizer.normalize(&value), Err(TimestampError::Unparsable(_))),
                "{:?} should not parse",
                value
            );
        }
    }

    #[test]
    fn test_malformed_wall_clock_text_is_rejected() {
        let normalizer = fixed(0);
        for input in ["2024-01-01 10:00:60", "2024-01-0110:00:00", "2024-01-01 10:00:00 "] {
            assert_eq!(
                normalizer.normalize(&ColumnValue::from(input)),
                Err(TimestampError::Unparsable(input.to_string())),
                "{input:?}"
            );
        }

        let normalized = normalizer
            .normalize(&ColumnValue::from("2024-01-01  23:59:59"))
            .unwrap();
        assert_eq!(normalized.local, "2024-01-01 23:59:59");
    }

    #[test]
    fn test_from_offset_seconds() {
        let normalizer = TimeNormalizer::from_offset_seconds(Some(3600));
        let normalized = normalizer.normalize(&ColumnValue::Integer(0)).unwrap();
        assert_eq!(normalized.local, "1970-01-01 01:00:00");
    }
}
