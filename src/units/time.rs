//! Time limits in Slurm syntax

use crate::error::{AbiQueueError, Result};
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::time::Duration;

/// Parse a time string in Slurm syntax into seconds.
///
/// Accepted forms: `minutes`, `minutes:seconds`, `hours:minutes:seconds`,
/// `days-hours`, `days-hours:minutes` and `days-hours:minutes:seconds`.
/// `None` when the total does not fit in a u64
fn total_seconds(days: u64, hours: u64, minutes: u64, seconds: u64) -> Option<u64> {
    days.checked_mul(24)?
        .checked_add(hours)?
        .checked_mul(60)?
        .checked_add(minutes)?
        .checked_mul(60)?
        .checked_add(seconds)
}

pub fn parse_timestr(s: &str) -> Result<u64> {
    let invalid = || AbiQueueError::InvalidUnit {
        kind: "time",
        value: s.to_string(),
    };

    let num = |part: &str| part.trim().parse::<u64>().map_err(|_| invalid());

    let s = s.trim();
    if s.is_empty() {
        return Err(invalid());
    }

    if let Some((days, rest)) = s.split_once('-') {
        let days = num(days)?;
        let parts: Vec<&str> = rest.split(':').collect();
        let (hours, minutes, seconds) = match parts.as_slice() {
            [h] => (num(h)?, 0, 0),
            [h, m] => (num(h)?, num(m)?, 0),
            [h, m, sec] => (num(h)?, num(m)?, num(sec)?),
            _ => return Err(invalid()),
        };
        return total_seconds(days, hours, minutes, seconds).ok_or_else(invalid);
    }

    let parts: Vec<&str> = s.split(':').collect();
    let (hours, minutes, seconds) = match parts.as_slice() {
        [m] => (0, num(m)?, 0),
        [m, sec] => (0, num(m)?, num(sec)?),
        [h, m, sec] => (num(h)?, num(m)?, num(sec)?),
        _ => return Err(invalid()),
    };
    total_seconds(0, hours, minutes, seconds).ok_or_else(invalid)
}

/// Format seconds as `D-HH:MM:SS` for `#SBATCH --time`
pub fn format_slurm_time(seconds: u64) -> String {
    let days = seconds / 86400;
    let hours = (seconds % 86400) / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;

    format!("{}-{:02}:{:02}:{:02}", days, hours, minutes, secs)
}

/// Format seconds as `HH:MM:SS` for PBS walltime (hours may exceed 24)
pub fn format_pbs_time(seconds: u64) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;
    format!("{:02}:{:02}:{:02}", hours, minutes, secs)
}

/// Wall-clock limit in seconds.
///
/// Deserializes from an integer (seconds) or a Slurm time string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct TimeLimit(u64);

impl TimeLimit {
    /// Create from seconds
    pub fn from_secs(secs: u64) -> Self {
        Self(secs)
    }

    /// Parse a Slurm time string
    pub fn parse(s: &str) -> Result<Self> {
        parse_timestr(s).map(Self)
    }

    /// Number of seconds
    pub fn as_secs(&self) -> u64 {
        self.0
    }

    /// As a standard duration
    pub fn as_duration(&self) -> Duration {
        Duration::from_secs(self.0)
    }

    /// Slurm representation
    pub fn to_slurm(&self) -> String {
        format_slurm_time(self.0)
    }

    /// PBS representation
    pub fn to_pbs(&self) -> String {
        format_pbs_time(self.0)
    }
}

impl fmt::Display for TimeLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", humantime::format_duration(self.as_duration()))
    }
}

impl Serialize for TimeLimit {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_slurm())
    }
}

impl<'de> Deserialize<'de> for TimeLimit {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct TimeVisitor;

        impl<'de> Visitor<'de> for TimeVisitor {
            type Value = TimeLimit;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("seconds or a slurm time string such as \"1-12:00:00\"")
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> std::result::Result<TimeLimit, E> {
                Ok(TimeLimit(v))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> std::result::Result<TimeLimit, E> {
                u64::try_from(v)
                    .map(TimeLimit)
                    .map_err(|_| E::custom(format!("negative time {}", v)))
            }

            fn visit_str<E: de::Error>(self, v: &str) -> std::result::Result<TimeLimit, E> {
                TimeLimit::parse(v).map_err(E::custom)
            }
        }

        deserializer.deserialize_any(TimeVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_parse_slurm_forms() {
        assert_eq!(parse_timestr("30").unwrap(), 1800);
        assert_eq!(parse_timestr("30:15").unwrap(), 1815);
        assert_eq!(parse_timestr("1:00:00").unwrap(), 3600);
        assert_eq!(parse_timestr("2-0").unwrap(), 2 * 86400);
        assert_eq!(parse_timestr("1-12:30").unwrap(), 86400 + 12 * 3600 + 30 * 60);
        assert_eq!(parse_timestr("0-0:59:59").unwrap(), 3599);
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(parse_timestr("").is_err());
        assert!(parse_timestr("1:2:3:4").is_err());
        assert!(parse_timestr("one hour").is_err());
        assert!(parse_timestr("1-2:3:4:5").is_err());
        assert!(parse_timestr("18446744073709551615").is_err());
        assert!(parse_timestr("213503982334602-0").is_err());
    }

    #[test]
    fn test_format_times() {
        assert_eq!(format_slurm_time(3600), "0-01:00:00");
        assert_eq!(format_slurm_time(90061), "1-01:01:01");
        assert_eq!(format_pbs_time(90061), "25:01:01");
    }

    #[test]
    fn test_timelimit_from_yaml() {
        let t: TimeLimit = serde_yaml::from_str("\"0-12:00:00\"").unwrap();
        assert_eq!(t.as_secs(), 12 * 3600);
        let t: TimeLimit = serde_yaml::from_str("7200").unwrap();
        assert_eq!(t.as_secs(), 7200);
        assert_eq!(t.to_string(), "2h");
    }

    proptest! {
        #[test]
        fn slurm_format_is_parsed_back(secs in 0u64..10_000_000) {
            prop_assert_eq!(parse_timestr(&format_slurm_time(secs)).unwrap(), secs);
        }
    }
}
