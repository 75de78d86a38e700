//! Timestamp helpers for the persisted catalog.
//!
//! Dates are stored as floating point Unix epoch seconds. In memory they are
//! kept at millisecond precision so a value survives the `f64` round trip.

use chrono::{DateTime, TimeZone, Utc};

/// Current time truncated to millisecond precision.
#[inline]
pub fn now() -> DateTime<Utc> {
    ms_to_datetime(Utc::now().timestamp_millis())
}

/// Convert a `DateTime<Utc>` to Unix epoch seconds.
#[inline]
pub fn datetime_to_epoch_secs(dt: DateTime<Utc>) -> f64 {
    dt.timestamp_millis() as f64 / 1000.0
}

/// Convert Unix epoch seconds to `DateTime<Utc>`, rounding to the nearest millisecond.
///
/// Non-finite input maps to the current time.
pub fn epoch_secs_to_datetime(secs: f64) -> DateTime<Utc> {
    if !secs.is_finite() {
        return now();
    }
    let ms = (secs * 1000.0).round();
    // `as` saturates at the i64 bounds.
    ms_to_datetime(ms as i64)
}

/// Convert Unix epoch milliseconds to `DateTime<Utc>`.
///
/// Values outside chrono's supported range clamp to the current time.
pub fn ms_to_datetime(ms: i64) -> DateTime<Utc> {
    match Utc.timestamp_millis_opt(ms) {
        chrono::LocalResult::Single(dt) => dt,
        chrono::LocalResult::Ambiguous(dt, _) => dt,
        chrono::LocalResult::None => Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_epoch_round_trip_is_exact() {
        let dt = now();
        let secs = datetime_to_epoch_secs(dt);
        assert_eq!(epoch_secs_to_datetime(secs), dt);
    }

    #[test]
    fn test_fractional_seconds() {
        let dt = epoch_secs_to_datetime(1_653_004_800.25);
        assert_eq!(dt.timestamp_millis(), 1_653_004_800_250);
    }

    #[test]
    fn test_non_finite_falls_back_to_now() {
        let before = Utc::now().timestamp();
        let dt = epoch_secs_to_datetime(f64::NAN);
        assert!(dt.timestamp() >= before);
    }
}
