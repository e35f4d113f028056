use std::str::FromStr;

use chrono::Timelike;
use chrono_tz::Tz;

const DAILY_PREFETCH_HOUR: u32 = 5;

/// Whether `tenant_id`'s daily pre-cache should run now: true once local
/// time has passed 05:00 on a day it hasn't already run for (§4.11). Called
/// on the scheduler's hourly tick.
pub fn should_prefetch_now(
    tz_name: &str,
    now_utc: chrono::DateTime<chrono::Utc>,
    last_prefetched_utc: Option<chrono::DateTime<chrono::Utc>>,
) -> Result<bool, String> {
    let tz = Tz::from_str(tz_name).map_err(|_| format!("unknown timezone '{tz_name}'"))?;
    let local_now = now_utc.with_timezone(&tz);

    if local_now.hour() < DAILY_PREFETCH_HOUR {
        return Ok(false);
    }

    let already_ran_today = last_prefetched_utc
        .map(|t| t.with_timezone(&tz).date_naive() == local_now.date_naive())
        .unwrap_or(false);

    Ok(!already_ran_today)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn does_not_prefetch_before_five_am_local() {
        let now = chrono_tz::America::New_York
            .with_ymd_and_hms(2026, 7, 28, 4, 0, 0)
            .unwrap()
            .with_timezone(&chrono::Utc);
        assert!(!should_prefetch_now("America/New_York", now, None).unwrap());
    }

    #[test]
    fn prefetches_once_past_five_am_if_not_yet_run_today() {
        let now = chrono_tz::America::New_York
            .with_ymd_and_hms(2026, 7, 28, 6, 0, 0)
            .unwrap()
            .with_timezone(&chrono::Utc);
        assert!(should_prefetch_now("America/New_York", now, None).unwrap());
    }

    #[test]
    fn does_not_reprefetch_same_local_day() {
        let last = chrono_tz::America::New_York
            .with_ymd_and_hms(2026, 7, 28, 5, 5, 0)
            .unwrap()
            .with_timezone(&chrono::Utc);
        let now = chrono_tz::America::New_York
            .with_ymd_and_hms(2026, 7, 28, 10, 0, 0)
            .unwrap()
            .with_timezone(&chrono::Utc);
        assert!(!should_prefetch_now("America/New_York", now, Some(last)).unwrap());
    }

    #[test]
    fn unknown_timezone_errors() {
        assert!(should_prefetch_now("Not/AZone", chrono::Utc::now(), None).is_err());
    }
}
