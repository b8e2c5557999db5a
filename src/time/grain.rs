//! Calendar-aware time grains.
//!
//! Flooring happens in the wall-clock of an IANA timezone (UTC unless told
//! otherwise). Minute/hour/day/week offsets are fixed millisecond multiples;
//! month and year offsets step the calendar.

use std::fmt;
use std::str::FromStr;

use chrono::{
    DateTime, Datelike, LocalResult, Months, NaiveDateTime, NaiveTime, SecondsFormat, TimeDelta,
    TimeZone, Timelike, Utc,
};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::dashboard::errors::{DashboardError, DashboardResult};

pub const MINUTE_MS: i64 = 60 * 1000;
pub const HOUR_MS: i64 = 60 * MINUTE_MS;
pub const DAY_MS: i64 = 24 * HOUR_MS;
pub const WEEK_MS: i64 = 7 * DAY_MS;

/// Bucket size used to floor and advance timestamps.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeGrain {
    Minute,
    Hour,
    Day,
    Week,
    Month,
    Year,
}

impl TimeGrain {
    /// Every grain, finest first.
    pub const ALL: [TimeGrain; 6] = [
        TimeGrain::Minute,
        TimeGrain::Hour,
        TimeGrain::Day,
        TimeGrain::Week,
        TimeGrain::Month,
        TimeGrain::Year,
    ];

    /// Nominal length in milliseconds. Only good for eligibility heuristics;
    /// a month is 30 days and a year 365 here.
    pub fn nominal_duration_ms(self) -> i64 {
        match self {
            Self::Minute => MINUTE_MS,
            Self::Hour => HOUR_MS,
            Self::Day => DAY_MS,
            Self::Week => WEEK_MS,
            Self::Month => 30 * DAY_MS,
            Self::Year => 365 * DAY_MS,
        }
    }

    /// Interval name as understood by the query engine (`minute`, `hour`, ...).
    pub fn interval_name(self) -> &'static str {
        match self {
            Self::Minute => "minute",
            Self::Hour => "hour",
            Self::Day => "day",
            Self::Week => "week",
            Self::Month => "month",
            Self::Year => "year",
        }
    }

    /// Runtime API enum name (`TIME_GRAIN_MINUTE`, ...).
    pub fn wire_name(self) -> &'static str {
        match self {
            Self::Minute => "TIME_GRAIN_MINUTE",
            Self::Hour => "TIME_GRAIN_HOUR",
            Self::Day => "TIME_GRAIN_DAY",
            Self::Week => "TIME_GRAIN_WEEK",
            Self::Month => "TIME_GRAIN_MONTH",
            Self::Year => "TIME_GRAIN_YEAR",
        }
    }

    /// Parse a runtime API enum name.
    pub fn from_wire(value: &str) -> DashboardResult<Self> {
        Self::ALL
            .into_iter()
            .find(|grain| grain.wire_name() == value)
            .ok_or_else(|| DashboardError::UnknownTimeGrain(value.to_string()))
    }
}

impl fmt::Display for TimeGrain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.interval_name())
    }
}

impl FromStr for TimeGrain {
    type Err = DashboardError;

    /// Accepts interval names and wire names. Anything else is a lookup
    /// failure, never a silent default.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|grain| grain.interval_name() == s)
            .map_or_else(|| Self::from_wire(s), Ok)
    }
}

/// Floor `instant` to the start of its containing `grain` bucket in `tz`.
///
/// Weeks start on Monday; months on day 1; years on January 1.
pub fn floor(instant: DateTime<Utc>, grain: TimeGrain, tz: Tz) -> DateTime<Utc> {
    let local = instant.with_timezone(&tz).naive_local();
    let date = local.date();
    let floored = match grain {
        TimeGrain::Minute => NaiveTime::from_hms_opt(local.hour(), local.minute(), 0)
            .map(|t| date.and_time(t))
            .unwrap_or(local),
        TimeGrain::Hour => NaiveTime::from_hms_opt(local.hour(), 0, 0)
            .map(|t| date.and_time(t))
            .unwrap_or(local),
        TimeGrain::Day => date.and_time(NaiveTime::MIN),
        TimeGrain::Week => {
            let since_monday = i64::from(date.weekday().num_days_from_monday());
            date.checked_sub_signed(TimeDelta::days(since_monday))
                .unwrap_or(date)
                .and_time(NaiveTime::MIN)
        }
        TimeGrain::Month => date.with_day(1).unwrap_or(date).and_time(NaiveTime::MIN),
        TimeGrain::Year => date.with_ordinal(1).unwrap_or(date).and_time(NaiveTime::MIN),
    };
    resolve_local(&tz, floored)
}

/// [`floor`] in UTC.
pub fn floor_utc(instant: DateTime<Utc>, grain: TimeGrain) -> DateTime<Utc> {
    floor(instant, grain, Tz::UTC)
}

/// Advance `instant` by `units` whole grains (negative moves backwards).
///
/// Month and year steps keep the wall-clock time and clamp the day of month
/// (January 31 plus one month is the last day of February).
pub fn add_grains(instant: DateTime<Utc>, units: i64, grain: TimeGrain, tz: Tz) -> DateTime<Utc> {
    match grain {
        TimeGrain::Minute | TimeGrain::Hour | TimeGrain::Day | TimeGrain::Week => {
            TimeDelta::try_milliseconds(units.saturating_mul(grain.nominal_duration_ms()))
                .and_then(|delta| instant.checked_add_signed(delta))
                .unwrap_or_else(|| {
                    tracing::warn!(
                        %instant,
                        units,
                        grain = grain.interval_name(),
                        "grain offset out of range; leaving instant unchanged"
                    );
                    instant
                })
        }
        TimeGrain::Month => shift_months(instant, units, tz),
        TimeGrain::Year => shift_months(instant, units.saturating_mul(12), tz),
    }
}

/// [`add_grains`] in UTC.
pub fn add_grains_utc(instant: DateTime<Utc>, units: i64, grain: TimeGrain) -> DateTime<Utc> {
    add_grains(instant, units, grain, Tz::UTC)
}

fn shift_months(instant: DateTime<Utc>, months: i64, tz: Tz) -> DateTime<Utc> {
    checked_shift_months(instant, months, tz).unwrap_or_else(|| {
        tracing::warn!(%instant, months, "month offset out of range; leaving instant unchanged");
        instant
    })
}

/// Calendar month step in `tz`; `None` when out of range.
pub(crate) fn checked_shift_months(
    instant: DateTime<Utc>,
    months: i64,
    tz: Tz,
) -> Option<DateTime<Utc>> {
    let local = instant.with_timezone(&tz).naive_local();
    let step = Months::new(u32::try_from(months.unsigned_abs()).ok()?);
    let shifted = if months >= 0 {
        local.checked_add_months(step)
    } else {
        local.checked_sub_months(step)
    }?;
    Some(resolve_local(&tz, shifted))
}

/// Map a wall-clock time in `tz` back to an instant. Ambiguous times (DST
/// fall-back) take the earlier reading; skipped times (DST spring-forward)
/// move to the first valid instant after the gap.
pub(crate) fn resolve_local(tz: &Tz, naive: NaiveDateTime) -> DateTime<Utc> {
    let resolved = match tz.from_local_datetime(&naive) {
        LocalResult::Single(dt) => dt,
        LocalResult::Ambiguous(earliest, _) => earliest,
        LocalResult::None => tz
            .from_local_datetime(&naive.checked_add_signed(TimeDelta::hours(1)).unwrap_or(naive))
            .earliest()
            .unwrap_or_else(|| tz.from_utc_datetime(&naive)),
    };
    resolved.with_timezone(&Utc)
}

/// Parse an RFC 3339 / ISO-8601 timestamp into UTC.
pub fn parse_instant(value: &str) -> DashboardResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| DashboardError::InvalidTimestamp(value.to_string()))
}

/// Render an instant the way the runtime API expects
/// (`2024-03-10T06:00:00.000Z`).
pub fn to_iso(instant: DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Look up an IANA timezone name.
pub fn parse_timezone(name: &str) -> DashboardResult<Tz> {
    name.parse::<Tz>()
        .map_err(|_| DashboardError::UnknownTimezone(name.to_string()))
}
