//! Calendar windows in a wallet's timezone.

use chrono::{DateTime, Datelike, Duration, LocalResult, NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;
use serde::Serialize;

use crate::error::{WalletError, WalletResult};

/// Day and month windows containing one instant, as UTC half-open ranges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SpendWindows {
    /// Local midnight today.
    pub day_start: DateTime<Utc>,
    /// Local midnight tomorrow.
    pub day_end: DateTime<Utc>,
    /// Local midnight on the first of this month.
    pub month_start: DateTime<Utc>,
    /// Local midnight on the first of next month.
    pub month_end: DateTime<Utc>,
}

/// Parses an IANA timezone name.
pub fn parse_timezone(name: &str) -> WalletResult<Tz> {
    name.parse::<Tz>()
        .map_err(|_| WalletError::InvalidRequest(format!("unknown timezone: {name}")))
}

/// First instant of `date` in `tz`. Midnight may fall in a DST gap, in which
/// case the day starts an hour later.
fn local_start(tz: Tz, date: NaiveDate) -> WalletResult<DateTime<Utc>> {
    let midnight = date.and_hms_opt(0, 0, 0).ok_or_else(|| {
        WalletError::InvariantViolation(format!("no midnight on {date}"))
    })?;
    let local = match tz.from_local_datetime(&midnight) {
        LocalResult::Single(t) | LocalResult::Ambiguous(t, _) => t,
        LocalResult::None => tz
            .from_local_datetime(&(midnight + Duration::hours(1)))
            .earliest()
            .ok_or_else(|| {
                WalletError::InvariantViolation(format!("no local start of {date} in {}", tz.name()))
            })?,
    };
    Ok(local.with_timezone(&Utc))
}

fn first_of_next_month(date: NaiveDate) -> Option<NaiveDate> {
    if date.month() == 12 {
        NaiveDate::from_ymd_opt(date.year() + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(date.year(), date.month() + 1, 1)
    }
}

impl SpendWindows {
    /// Computes the windows containing `now` in `tz`.
    pub fn at(now: DateTime<Utc>, tz: Tz) -> WalletResult<Self> {
        let today = now.with_timezone(&tz).date_naive();
        let out_of_range =
            || WalletError::InvariantViolation(format!("date out of range near {today}"));

        let tomorrow = today.succ_opt().ok_or_else(out_of_range)?;
        let month_first = today.with_day(1).ok_or_else(out_of_range)?;
        let next_month_first = first_of_next_month(today).ok_or_else(out_of_range)?;

        Ok(Self {
            day_start: local_start(tz, today)?,
            day_end: local_start(tz, tomorrow)?,
            month_start: local_start(tz, month_first)?,
            month_end: local_start(tz, next_month_first)?,
        })
    }

    /// True if `t` falls in today's window.
    #[must_use]
    pub fn in_day(&self, t: DateTime<Utc>) -> bool {
        self.day_start <= t && t < self.day_end
    }

    /// True if `t` falls in this month's window.
    #[must_use]
    pub fn in_month(&self, t: DateTime<Utc>) -> bool {
        self.month_start <= t && t < self.month_end
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utc(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn test_lagos_windows() {
        // Lagos is UTC+1 all year
        let tz = parse_timezone("Africa/Lagos").unwrap();
        let w = SpendWindows::at(utc("2026-10-19T12:00:00Z"), tz).unwrap();
        assert_eq!(w.day_start, utc("2026-10-18T23:00:00Z"));
        assert_eq!(w.day_end, utc("2026-10-19T23:00:00Z"));
        assert_eq!(w.month_start, utc("2026-09-30T23:00:00Z"));
        assert_eq!(w.month_end, utc("2026-10-31T23:00:00Z"));
    }

    #[test]
    fn test_local_day_differs_from_utc_day() {
        // 23:30 UTC is already the next day in Lagos
        let tz = parse_timezone("Africa/Lagos").unwrap();
        let w = SpendWindows::at(utc("2026-12-31T23:30:00Z"), tz).unwrap();
        assert_eq!(w.day_start, utc("2026-12-31T23:00:00Z"));
        assert_eq!(w.month_start, utc("2026-12-31T23:00:00Z"));
        assert_eq!(w.month_end, utc("2027-01-31T23:00:00Z"));
    }

    #[test]
    fn test_boundaries_are_half_open() {
        let tz = parse_timezone("UTC").unwrap();
        let w = SpendWindows::at(utc("2026-10-19T12:00:00Z"), tz).unwrap();
        assert!(w.in_day(utc("2026-10-19T00:00:00Z")));
        assert!(!w.in_day(utc("2026-10-20T00:00:00Z")));
        assert!(!w.in_day(utc("2026-10-18T23:59:59Z")));
        assert!(w.in_month(utc("2026-10-31T23:59:59Z")));
        assert!(!w.in_month(utc("2026-11-01T00:00:00Z")));
    }

    #[test]
    fn test_dst_day_is_23_hours() {
        // US spring-forward on 2026-03-08
        let tz = parse_timezone("America/New_York").unwrap();
        let w = SpendWindows::at(utc("2026-03-08T15:00:00Z"), tz).unwrap();
        assert_eq!(w.day_end - w.day_start, Duration::hours(23));
    }

    #[test]
    fn test_unknown_timezone() {
        assert!(matches!(
            parse_timezone("Mars/Olympus"),
            Err(WalletError::InvalidRequest(_))
        ));
    }
}
