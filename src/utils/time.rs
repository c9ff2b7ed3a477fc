//! Time and timestamp utilities

use chrono::{DateTime, Utc};

/// Get the current UTC instant
pub fn now_utc() -> DateTime<Utc> {
    Utc::now()
}

/// Convert an instant to microseconds since the Unix epoch (storage encoding)
pub fn to_micros(ts: &DateTime<Utc>) -> i64 {
    ts.timestamp_micros()
}

/// Convert microseconds since the Unix epoch back to an instant
///
/// Out-of-range values clamp to the epoch.
pub fn from_micros(micros: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_micros(micros).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_micros_roundtrip_keeps_sub_second_precision() {
        let ts = Utc.with_ymd_and_hms(2024, 2, 29, 23, 59, 59).unwrap()
            + chrono::Duration::microseconds(123_456);
        assert_eq!(from_micros(to_micros(&ts)), ts);
    }

    #[test]
    fn test_from_micros_out_of_range() {
        assert_eq!(from_micros(i64::MAX), DateTime::<Utc>::default());
    }
}
