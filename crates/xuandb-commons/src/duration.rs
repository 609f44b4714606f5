//! Extended duration parsing and formatting.
//!
//! The standard `humantime`-style notations lack the `d` (day) and `w`
//! (week) units that retention policies are written in, so XuanDB carries
//! its own representation. Only non-negative integer quantities are
//! accepted, and the total must fit in `i64::MAX` nanoseconds.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

const NANOS_PER_US: u64 = 1_000;
const NANOS_PER_MS: u64 = 1_000_000;
const NANOS_PER_SEC: u64 = 1_000_000_000;
const NANOS_PER_MIN: u64 = 60 * NANOS_PER_SEC;
const NANOS_PER_HOUR: u64 = 60 * NANOS_PER_MIN;
const NANOS_PER_DAY: u64 = 24 * NANOS_PER_HOUR;
const NANOS_PER_WEEK: u64 = 7 * NANOS_PER_DAY;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DurationError {
    #[error("invalid duration")]
    Invalid,
    #[error("duration overflow")]
    Overflow,
}

/// A non-negative duration measured in nanoseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Duration(u64);

impl Duration {
    pub const ZERO: Duration = Duration(0);

    pub const fn from_nanos(nanos: u64) -> Duration {
        Duration(nanos)
    }

    pub const fn from_secs(secs: u64) -> Duration {
        Duration(secs * NANOS_PER_SEC)
    }

    pub const fn from_hours(hours: u64) -> Duration {
        Duration(hours * NANOS_PER_HOUR)
    }

    pub const fn as_nanos(self) -> u64 {
        self.0
    }

    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub const fn to_std(self) -> std::time::Duration {
        std::time::Duration::from_nanos(self.0)
    }
}

impl FromStr for Duration {
    type Err = DurationError;

    fn from_str(s: &str) -> Result<Duration, DurationError> {
        let b = s.as_bytes();
        let mut total: u64 = 0;
        let mut i = 0;

        while i < b.len() {
            // digits
            let start = i;
            let mut v: u64 = 0;
            while i < b.len() && b[i].is_ascii_digit() {
                v = v
                    .checked_mul(10)
                    .and_then(|x| x.checked_add(u64::from(b[i] - b'0')))
                    .filter(|&x| x <= i64::MAX as u64)
                    .ok_or(DurationError::Overflow)?;
                i += 1;
            }
            if i == start {
                return Err(DurationError::Invalid);
            }

            // unit; digits are ASCII, so the slice boundaries below are
            // always char boundaries
            let unit_start = i;
            while i < b.len() && !b[i].is_ascii_digit() {
                i += 1;
            }
            let unit = match &s[unit_start..i] {
                "ns" => 1,
                "us" | "µs" | "μs" => NANOS_PER_US,
                "ms" => NANOS_PER_MS,
                "s" => NANOS_PER_SEC,
                "m" => NANOS_PER_MIN,
                "h" => NANOS_PER_HOUR,
                "d" => NANOS_PER_DAY,
                "w" => NANOS_PER_WEEK,
                _ => return Err(DurationError::Invalid),
            };

            let part = v.checked_mul(unit).ok_or(DurationError::Overflow)?;
            total = total
                .checked_add(part)
                .filter(|&x| x <= i64::MAX as u64)
                .ok_or(DurationError::Overflow)?;
        }

        Ok(Duration(total))
    }
}

impl fmt::Display for Duration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 == 0 {
            return f.write_str("0s");
        }

        let mut rest = self.0;
        for (unit, name) in [
            (NANOS_PER_WEEK, "w"),
            (NANOS_PER_DAY, "d"),
            (NANOS_PER_HOUR, "h"),
            (NANOS_PER_MIN, "m"),
            (NANOS_PER_SEC, "s"),
            (NANOS_PER_MS, "ms"),
            (NANOS_PER_US, "us"),
            (1, "ns"),
        ] {
            let v = rest / unit;
            if v > 0 {
                write!(f, "{v}{name}")?;
                rest -= v * unit;
            }
        }
        Ok(())
    }
}

impl Serialize for Duration {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Duration {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        struct DurationVisitor;

        impl serde::de::Visitor<'_> for DurationVisitor {
            type Value = Duration;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a duration string or a nanosecond count")
            }

            fn visit_str<E: serde::de::Error>(self, s: &str) -> Result<Duration, E> {
                s.parse().map_err(E::custom)
            }

            fn visit_u64<E: serde::de::Error>(self, v: u64) -> Result<Duration, E> {
                if v > i64::MAX as u64 {
                    return Err(E::custom(DurationError::Overflow));
                }
                Ok(Duration(v))
            }

            fn visit_i64<E: serde::de::Error>(self, v: i64) -> Result<Duration, E> {
                u64::try_from(v)
                    .map(Duration)
                    .map_err(|_| E::custom(DurationError::Invalid))
            }
        }

        deserializer.deserialize_any(DurationVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(s: &str) -> Result<Duration, DurationError> {
        s.parse()
    }

    #[test]
    fn test_parse_basic_units() {
        assert_eq!(parse("1ns").unwrap().as_nanos(), 1);
        assert_eq!(parse("1us").unwrap().as_nanos(), NANOS_PER_US);
        assert_eq!(parse("1µs").unwrap().as_nanos(), NANOS_PER_US);
        assert_eq!(parse("1ms").unwrap().as_nanos(), NANOS_PER_MS);
        assert_eq!(parse("1s").unwrap().as_nanos(), NANOS_PER_SEC);
        assert_eq!(parse("1m").unwrap().as_nanos(), NANOS_PER_MIN);
        assert_eq!(parse("1h").unwrap().as_nanos(), NANOS_PER_HOUR);
        assert_eq!(parse("1d").unwrap().as_nanos(), NANOS_PER_DAY);
        assert_eq!(parse("1w").unwrap().as_nanos(), NANOS_PER_WEEK);
    }

    #[test]
    fn test_parse_compound() {
        assert_eq!(
            parse("1w2d3h4m5s").unwrap().as_nanos(),
            NANOS_PER_WEEK + 2 * NANOS_PER_DAY + 3 * NANOS_PER_HOUR + 4 * NANOS_PER_MIN
                + 5 * NANOS_PER_SEC
        );
        assert_eq!(parse("7d").unwrap(), Duration::from_hours(7 * 24));
    }

    #[test]
    fn test_parse_invalid() {
        assert_eq!(parse("d"), Err(DurationError::Invalid));
        assert_eq!(parse("1x"), Err(DurationError::Invalid));
        assert_eq!(parse("1.5h"), Err(DurationError::Invalid));
        assert_eq!(parse("-1h"), Err(DurationError::Invalid));
        assert_eq!(parse("1h2"), Err(DurationError::Invalid));
    }

    #[test]
    fn test_parse_overflow() {
        assert_eq!(parse("9223372036854775808ns"), Err(DurationError::Overflow));
        assert_eq!(parse("1000000w"), Err(DurationError::Overflow));
        assert_eq!(
            parse("9223372036854775807ns1s"),
            Err(DurationError::Overflow)
        );
    }

    #[test]
    fn test_format() {
        assert_eq!(Duration::ZERO.to_string(), "0s");
        assert_eq!(Duration::from_secs(90).to_string(), "1m30s");
        assert_eq!(Duration::from_hours(7 * 24).to_string(), "1w");
        assert_eq!(Duration::from_hours(25).to_string(), "1d1h");
        assert_eq!(Duration::from_nanos(1_500_000).to_string(), "1ms500us");
    }

    #[test]
    fn test_format_parse_round_trip() {
        for s in ["0s", "1w2d3h4m5s", "10ms", "1us1ns", "3w"] {
            let d = parse(s).unwrap();
            assert_eq!(parse(&d.to_string()).unwrap(), d);
        }
    }
}
