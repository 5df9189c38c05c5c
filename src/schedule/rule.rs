// src/schedule/rule.rs

//! The `ScheduleRule` variant type and its wire format.
//!
//! Rules are stored in `project.toml` as a single string:
//!
//! - `off`
//! - `daily|HH:MM`
//! - `interval|<N><unit>` with unit `s`, `m`, or `h` (bare number = minutes)
//! - `weekdays|HH:MM|mon,tue,...`
//!
//! Parsing is the only place strings are interpreted; evaluation matches
//! exhaustively on the enum.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{NaiveTime, Weekday};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ScheduleParseError {
    #[error("unknown schedule kind: {0}")]
    UnknownKind(String),

    #[error("invalid time of day: {0} (expected HH:MM)")]
    InvalidTime(String),

    #[error("invalid interval: {0}")]
    InvalidInterval(String),

    #[error("interval must be greater than zero")]
    ZeroInterval,

    #[error("invalid weekday: {0}")]
    InvalidWeekday(String),

    #[error("weekday schedule needs at least one day")]
    EmptyWeekdays,

    #[error("schedule is missing a parameter: {0}")]
    MissingParam(&'static str),
}

/// A recurring execution rule for one project.
///
/// Replaced wholesale on edit; there is no partial mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScheduleRule {
    Off,
    Daily { time: NaiveTime },
    Interval { every: Duration },
    Weekdays { time: NaiveTime, days: Vec<Weekday> },
}

impl ScheduleRule {
    pub fn is_off(&self) -> bool {
        matches!(self, ScheduleRule::Off)
    }
}

impl Default for ScheduleRule {
    fn default() -> Self {
        ScheduleRule::Off
    }
}

impl FromStr for ScheduleRule {
    type Err = ScheduleParseError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let raw = raw.trim();
        if raw.is_empty() || raw.eq_ignore_ascii_case("off") {
            return Ok(ScheduleRule::Off);
        }

        let mut parts = raw.split('|');
        let kind = parts.next().unwrap_or_default().trim().to_lowercase();

        match kind.as_str() {
            "daily" => {
                let time = parts
                    .next()
                    .ok_or(ScheduleParseError::MissingParam("time"))?;
                Ok(ScheduleRule::Daily {
                    time: parse_time(time)?,
                })
            }
            "interval" => {
                let every = parts
                    .next()
                    .ok_or(ScheduleParseError::MissingParam("interval"))?;
                Ok(ScheduleRule::Interval {
                    every: parse_interval(every)?,
                })
            }
            "weekdays" => {
                let time = parts
                    .next()
                    .ok_or(ScheduleParseError::MissingParam("time"))?;
                let days = parts
                    .next()
                    .ok_or(ScheduleParseError::MissingParam("days"))?;
                Ok(ScheduleRule::Weekdays {
                    time: parse_time(time)?,
                    days: parse_weekdays(days)?,
                })
            }
            other => Err(ScheduleParseError::UnknownKind(other.to_string())),
        }
    }
}

impl fmt::Display for ScheduleRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScheduleRule::Off => write!(f, "off"),
            ScheduleRule::Daily { time } => {
                write!(f, "daily|{}", time.format("%H:%M"))
            }
            ScheduleRule::Interval { every } => {
                write!(f, "interval|{}", format_interval(*every))
            }
            ScheduleRule::Weekdays { time, days } => {
                let days: Vec<&str> = days.iter().map(|d| day_name(*d)).collect();
                write!(f, "weekdays|{}|{}", time.format("%H:%M"), days.join(","))
            }
        }
    }
}

fn parse_time(s: &str) -> Result<NaiveTime, ScheduleParseError> {
    let s = s.trim();
    let (h, m) = s
        .split_once(':')
        .ok_or_else(|| ScheduleParseError::InvalidTime(s.to_string()))?;
    let hour: u32 = h
        .trim()
        .parse()
        .map_err(|_| ScheduleParseError::InvalidTime(s.to_string()))?;
    let minute: u32 = m
        .trim()
        .parse()
        .map_err(|_| ScheduleParseError::InvalidTime(s.to_string()))?;
    NaiveTime::from_hms_opt(hour, minute, 0)
        .ok_or_else(|| ScheduleParseError::InvalidTime(s.to_string()))
}

/// Parse an interval like `"30m"`, `"2h"`, `"45s"`.
///
/// A bare number is taken as minutes, matching the human-readable forms the
/// descriptor files have always used.
fn parse_interval(s: &str) -> Result<Duration, ScheduleParseError> {
    let s = s.trim().to_lowercase();
    if s.is_empty() {
        return Err(ScheduleParseError::InvalidInterval(s));
    }

    let idx = s
        .chars()
        .position(|c| !c.is_ascii_digit())
        .unwrap_or(s.len());
    let (num_part, unit_part) = s.split_at(idx);
    let value: u64 = num_part
        .parse()
        .map_err(|_| ScheduleParseError::InvalidInterval(s.clone()))?;

    let secs = match unit_part.trim() {
        "s" => value,
        "m" | "" => value * 60,
        "h" => value * 60 * 60,
        _ => return Err(ScheduleParseError::InvalidInterval(s.clone())),
    };

    if secs == 0 {
        return Err(ScheduleParseError::ZeroInterval);
    }
    Ok(Duration::from_secs(secs))
}

fn format_interval(d: Duration) -> String {
    let secs = d.as_secs();
    if secs % 3600 == 0 {
        format!("{}h", secs / 3600)
    } else if secs % 60 == 0 {
        format!("{}m", secs / 60)
    } else {
        format!("{secs}s")
    }
}

/// Parse `"mon,wed,fri"` into a sorted, deduplicated weekday list.
fn parse_weekdays(s: &str) -> Result<Vec<Weekday>, ScheduleParseError> {
    let mut days: Vec<Weekday> = Vec::new();
    for part in s.split(',') {
        let part = part.trim().to_lowercase();
        if part.is_empty() {
            continue;
        }
        let day = match part.as_str() {
            "mon" => Weekday::Mon,
            "tue" => Weekday::Tue,
            "wed" => Weekday::Wed,
            "thu" => Weekday::Thu,
            "fri" => Weekday::Fri,
            "sat" => Weekday::Sat,
            "sun" => Weekday::Sun,
            other => return Err(ScheduleParseError::InvalidWeekday(other.to_string())),
        };
        if !days.contains(&day) {
            days.push(day);
        }
    }
    if days.is_empty() {
        return Err(ScheduleParseError::EmptyWeekdays);
    }
    days.sort_by_key(|d| d.num_days_from_monday());
    Ok(days)
}

fn day_name(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "mon",
        Weekday::Tue => "tue",
        Weekday::Wed => "wed",
        Weekday::Thu => "thu",
        Weekday::Fri => "fri",
        Weekday::Sat => "sat",
        Weekday::Sun => "sun",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_off_and_empty() {
        assert_eq!("off".parse::<ScheduleRule>().unwrap(), ScheduleRule::Off);
        assert_eq!("OFF".parse::<ScheduleRule>().unwrap(), ScheduleRule::Off);
        assert_eq!("".parse::<ScheduleRule>().unwrap(), ScheduleRule::Off);
    }

    #[test]
    fn parses_daily() {
        let rule = "daily|09:30".parse::<ScheduleRule>().unwrap();
        assert_eq!(
            rule,
            ScheduleRule::Daily {
                time: NaiveTime::from_hms_opt(9, 30, 0).unwrap()
            }
        );
        assert_eq!(rule.to_string(), "daily|09:30");
    }

    #[test]
    fn parses_interval_units() {
        assert_eq!(
            "interval|30m".parse::<ScheduleRule>().unwrap(),
            ScheduleRule::Interval {
                every: Duration::from_secs(30 * 60)
            }
        );
        assert_eq!(
            "interval|2h".parse::<ScheduleRule>().unwrap(),
            ScheduleRule::Interval {
                every: Duration::from_secs(2 * 3600)
            }
        );
        // Bare number defaults to minutes.
        assert_eq!(
            "interval|15".parse::<ScheduleRule>().unwrap(),
            ScheduleRule::Interval {
                every: Duration::from_secs(15 * 60)
            }
        );
    }

    #[test]
    fn rejects_zero_interval() {
        assert_eq!(
            "interval|0m".parse::<ScheduleRule>().unwrap_err(),
            ScheduleParseError::ZeroInterval
        );
    }

    #[test]
    fn parses_weekdays() {
        let rule = "weekdays|08:15|mon,wed,fri".parse::<ScheduleRule>().unwrap();
        match &rule {
            ScheduleRule::Weekdays { time, days } => {
                assert_eq!(*time, NaiveTime::from_hms_opt(8, 15, 0).unwrap());
                assert_eq!(days.len(), 3);
                assert!(days.contains(&Weekday::Wed));
            }
            other => panic!("unexpected rule: {other:?}"),
        }
        assert_eq!(rule.to_string(), "weekdays|08:15|mon,wed,fri");
    }

    #[test]
    fn rejects_empty_weekday_set() {
        assert_eq!(
            "weekdays|08:15|".parse::<ScheduleRule>().unwrap_err(),
            ScheduleParseError::EmptyWeekdays
        );
    }

    #[test]
    fn rejects_unknown_kind() {
        assert!(matches!(
            "hourly|1".parse::<ScheduleRule>(),
            Err(ScheduleParseError::UnknownKind(_))
        ));
    }

    #[test]
    fn display_round_trips() {
        for raw in ["off", "daily|23:05", "interval|45s", "weekdays|06:00|sat,sun"] {
            let rule: ScheduleRule = raw.parse().unwrap();
            assert_eq!(rule.to_string(), raw);
        }
    }
}
