//! Conversions between NTP fixed-point types and ordinary time values
//!
//! The NTP Short format carries 16 integer and 16 fractional bits, the NTP
//! Timestamp format 32 integer seconds since the 1900 epoch and 32 fractional
//! bits. Absolute times are represented as `chrono::DateTime<Utc>`.

use chrono::{DateTime, Utc};

use crate::core::{Error, Result};

/// Offset in seconds from the NTP epoch (1900-01-01) to the Unix epoch
pub const UNIX_EPOCH_OFFSET: u64 = 2_208_988_800;

/// Converts an NTP Short into a floating-point number of seconds
pub fn short_to_f64(short: u32) -> f64 {
    let seconds = short >> 16;
    let fraction = (short & 0xffff) as f64 / 65_536.0;

    seconds as f64 + fraction
}

/// Converts a non-negative floating-point number of seconds into an NTP Short
pub fn f64_to_short(value: f64) -> u32 {
    let seconds = value.trunc();
    let fraction = ((value - seconds) * 65_536.0).round() as u32;

    ((seconds as u32) << 16) + fraction
}

/// Converts an NTP Timestamp into an absolute time
///
/// Fails only when the timestamp is outside the range `chrono` can represent,
/// which cannot happen for a timestamp read off the wire.
pub fn timestamp_to_datetime(timestamp: u64) -> Result<DateTime<Utc>> {
    let seconds = (timestamp >> 32) as i64 - UNIX_EPOCH_OFFSET as i64;
    let fraction = (timestamp & 0xffff_ffff) as f64 / 4_294_967_296.0;
    let nanos = ((fraction * 1e9).round() as u32).min(999_999_999);

    DateTime::from_timestamp(seconds, nanos)
        .ok_or_else(|| Error::format(format!("timestamp {timestamp} is out of range")))
}

/// Converts an absolute time into an NTP Timestamp
///
/// An absent time maps to 0, matching the all-zero wire representation of an
/// unset timestamp field.
pub fn datetime_to_timestamp(time: Option<DateTime<Utc>>) -> u64 {
    let Some(time) = time else {
        return 0;
    };

    let seconds = ((time.timestamp() + UNIX_EPOCH_OFFSET as i64) as u64) << 32;
    let fraction = (time.timestamp_subsec_nanos() as f64 / 1e9 * 4_294_967_296.0).round() as u64;

    seconds + fraction
}

/// Converts a timestamp String into an absolute time
///
/// Only hex-format NTP timestamps of the form `0x<seconds>.<fraction>` are
/// supported, as returned in the `rec` and `reftime` READVAR variables.
pub fn hex_timestamp_to_datetime(text: &str) -> Result<DateTime<Utc>> {
    let rest = text
        .strip_prefix("0x")
        .ok_or_else(|| Error::format(format!("unsupported timestamp {text:?}")))?;

    let (seconds, fraction) = rest
        .split_once('.')
        .ok_or_else(|| Error::format(format!("unsupported timestamp {text:?}")))?;

    let seconds = u64::from_str_radix(seconds, 16)
        .map_err(|_| Error::format(format!("bad seconds field in timestamp {text:?}")))?;
    let fraction = u64::from_str_radix(fraction, 16)
        .map_err(|_| Error::format(format!("bad fraction field in timestamp {text:?}")))?;

    timestamp_to_datetime((seconds << 32) + fraction)
}

/// Seconds since the Unix epoch as a float, used for offset arithmetic
pub fn unix_seconds(time: DateTime<Utc>) -> f64 {
    time.timestamp() as f64 + time.timestamp_subsec_nanos() as f64 / 1e9
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn time_at(seconds: i64, nanos: u32) -> DateTime<Utc> {
        Utc.timestamp_opt(seconds, nanos).unwrap()
    }

    #[test]
    fn test_f64_to_short() {
        assert_eq!(1223, f64_to_short(0.018662));
    }

    #[test]
    fn test_short_to_f64() {
        let float = short_to_f64(1223);
        assert!((float - 0.01866).abs() < 1.0 / 65_536.0);
    }

    #[test]
    fn test_short_round_trip() {
        for &f in &[0.0, 0.018662, 1.5, 255.333, 65_535.25] {
            let round_tripped = short_to_f64(f64_to_short(f));
            assert!(
                (round_tripped - f).abs() <= 1.0 / 65_536.0,
                "{f} round-tripped to {round_tripped}"
            );
        }
    }

    #[test]
    fn test_timestamp_to_datetime() {
        let time = timestamp_to_datetime(16_309_648_884_269_799_420).unwrap();

        assert_eq!(1_588_397_247, time.timestamp());
        let nanos = time.timestamp_subsec_nanos() as f64;
        assert!((nanos - 493_153_989.0).abs() < 2.0);
    }

    #[test]
    fn test_datetime_to_timestamp() {
        let time = time_at(1_588_397_247, 493_153_989);

        let timestamp = datetime_to_timestamp(Some(time));

        // The reference value was produced by truncating the fractional part
        // rather than rounding, so allow one unit of slack.
        let expected = 16_309_648_884_269_799_420u64;
        assert!(timestamp.abs_diff(expected) <= 1);
    }

    #[test]
    fn test_datetime_to_timestamp_none() {
        assert_eq!(0, datetime_to_timestamp(None));
    }

    #[test]
    fn test_timestamp_round_trip() {
        let time = time_at(1_588_397_247, 513_723_900);

        let round_tripped = timestamp_to_datetime(datetime_to_timestamp(Some(time))).unwrap();

        let delta = (unix_seconds(round_tripped) - unix_seconds(time)).abs();
        assert!(delta < 1e-6, "round trip drifted by {delta}s");
    }

    #[test]
    fn test_hex_timestamp_to_datetime() {
        let time = hex_timestamp_to_datetime("0xe26c1358.3f31f4a9").unwrap();

        assert_eq!(1_589_744_856, time.timestamp());
        let seconds = unix_seconds(time);
        assert!((seconds - 1_589_744_856.246856).abs() < 1e-6);
    }

    #[test]
    fn test_hex_timestamp_requires_prefix() {
        let err = hex_timestamp_to_datetime("e26c1358.3f31f4a9").unwrap_err();
        assert!(matches!(err, Error::Format(_)));
    }

    #[test]
    fn test_hex_timestamp_requires_fraction() {
        let err = hex_timestamp_to_datetime("0xe26c1358").unwrap_err();
        assert!(matches!(err, Error::Format(_)));
    }
}
