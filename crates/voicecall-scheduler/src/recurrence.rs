use std::str::FromStr;

use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;

use crate::error::{Result, SchedulerError};

/// A parsed `reminders.recurrence` expression (§4.2). The only grammar this
/// system speaks: `"daily HH:MM"` and `"weekly <mon..sun> HH:MM"`, both
/// evaluated in the tenant's local timezone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recurrence {
    Daily { hour: u32, minute: u32 },
    Weekly { weekday: chrono::Weekday, hour: u32, minute: u32 },
}

impl FromStr for Recurrence {
    type Err = SchedulerError;

    fn from_str(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.split_whitespace().collect();
        match parts.as_slice() {
            ["daily", time] => {
                let (hour, minute) = parse_hhmm(time, s)?;
                Ok(Recurrence::Daily { hour, minute })
            }
            ["weekly", day, time] => {
                let weekday = parse_weekday(day, s)?;
                let (hour, minute) = parse_hhmm(time, s)?;
                Ok(Recurrence::Weekly { weekday, hour, minute })
            }
            _ => Err(SchedulerError::InvalidRecurrence(s.to_string())),
        }
    }
}

fn parse_hhmm(s: &str, whole: &str) -> Result<(u32, u32)> {
    let (h, m) = s
        .split_once(':')
        .ok_or_else(|| SchedulerError::InvalidRecurrence(whole.to_string()))?;
    let hour: u32 = h.parse().map_err(|_| SchedulerError::InvalidRecurrence(whole.to_string()))?;
    let minute: u32 = m.parse().map_err(|_| SchedulerError::InvalidRecurrence(whole.to_string()))?;
    if hour > 23 || minute > 59 {
        return Err(SchedulerError::InvalidRecurrence(whole.to_string()));
    }
    Ok((hour, minute))
}

fn parse_weekday(s: &str, whole: &str) -> Result<chrono::Weekday> {
    match s.to_ascii_lowercase().as_str() {
        "mon" | "monday" => Ok(chrono::Weekday::Mon),
        "tue" | "tuesday" => Ok(chrono::Weekday::Tue),
        "wed" | "wednesday" => Ok(chrono::Weekday::Wed),
        "thu" | "thursday" => Ok(chrono::Weekday::Thu),
        "fri" | "friday" => Ok(chrono::Weekday::Fri),
        "sat" | "saturday" => Ok(chrono::Weekday::Sat),
        "sun" | "sunday" => Ok(chrono::Weekday::Sun),
        _ => Err(SchedulerError::InvalidRecurrence(whole.to_string())),
    }
}

/// Whether `recurrence` has a local fire time in `(prev_tick, now]`, evaluated
/// in `tz_name` (§4.12 query 2). Candidate occurrences on both the local date
/// of `now` and of `prev_tick` are checked, so a fire time is never missed
/// when a tick's window straddles local midnight.
pub fn fires_in_window(
    recurrence: &str,
    tz_name: &str,
    prev_tick: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<bool> {
    Ok(occurrence_in_window(recurrence, tz_name, prev_tick, now)?.is_some())
}

/// Like [`fires_in_window`] but returns the exact occurrence instant, used as
/// the delivery's `scheduled_for` so retries and dedup key off the real fire
/// time rather than the tick boundary.
pub fn occurrence_in_window(
    recurrence: &str,
    tz_name: &str,
    prev_tick: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<Option<DateTime<Utc>>> {
    let tz: Tz = tz_name.parse().map_err(|_| SchedulerError::UnknownTimezone(tz_name.to_string()))?;
    let rule: Recurrence = recurrence.parse()?;

    let prev_local_date = prev_tick.with_timezone(&tz).date_naive();
    let now_local_date = now.with_timezone(&tz).date_naive();

    for date in [prev_local_date, now_local_date] {
        if let Some(candidate) = candidate_at(&rule, &tz, date) {
            if candidate > prev_tick && candidate <= now {
                return Ok(Some(candidate));
            }
        }
    }
    Ok(None)
}

fn candidate_at(rule: &Recurrence, tz: &Tz, date: NaiveDate) -> Option<DateTime<Utc>> {
    let (hour, minute, matches_date) = match *rule {
        Recurrence::Daily { hour, minute } => (hour, minute, true),
        Recurrence::Weekly { weekday, hour, minute } => (hour, minute, date.weekday() == weekday),
    };
    if !matches_date {
        return None;
    }
    let naive_time = NaiveTime::from_hms_opt(hour, minute, 0)?;
    let naive_dt = date.and_time(naive_time);
    tz.from_local_datetime(&naive_dt).single().map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn daily_fires_when_window_crosses_the_target_minute() {
        let prev = Utc.with_ymd_and_hms(2026, 7, 28, 12, 59, 30).unwrap();
        let now = Utc.with_ymd_and_hms(2026, 7, 28, 13, 0, 30).unwrap();
        assert!(fires_in_window("daily 13:00", "UTC", prev, now).unwrap());
    }

    #[test]
    fn daily_does_not_fire_outside_the_window() {
        let prev = Utc.with_ymd_and_hms(2026, 7, 28, 10, 0, 0).unwrap();
        let now = Utc.with_ymd_and_hms(2026, 7, 28, 10, 1, 0).unwrap();
        assert!(!fires_in_window("daily 13:00", "UTC", prev, now).unwrap());
    }

    #[test]
    fn weekly_only_fires_on_the_named_weekday() {
        // 2026-07-28 is a Tuesday.
        let prev = Utc.with_ymd_and_hms(2026, 7, 28, 8, 59, 0).unwrap();
        let now = Utc.with_ymd_and_hms(2026, 7, 28, 9, 0, 0).unwrap();
        assert!(fires_in_window("weekly tue 09:00", "UTC", prev, now).unwrap());
        assert!(!fires_in_window("weekly wed 09:00", "UTC", prev, now).unwrap());
    }

    #[test]
    fn unknown_timezone_is_rejected() {
        assert!(fires_in_window("daily 09:00", "Not/AZone", Utc::now(), Utc::now()).is_err());
    }

    #[test]
    fn malformed_recurrence_is_rejected() {
        assert!(fires_in_window("hourly", "UTC", Utc::now(), Utc::now()).is_err());
    }
}
