//! Reference-time transformations.
//!
//! A relative point in time is a reference instant plus an ordered list of
//! transformations (ISO-8601 offsets and period truncations). The list form
//! is what range presets store in configuration.

use chrono::{DateTime, Datelike, TimeDelta, Utc};
use chrono_tz::Tz;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::grain::{self, DAY_MS, HOUR_MS, MINUTE_MS, TimeGrain};
use crate::dashboard::errors::{DashboardError, DashboardResult};

static ISO_DURATION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^P(?:(\d+)Y)?(?:(\d+)M)?(?:(\d+)W)?(?:(\d+)D)?(?:T(?:(\d+)H)?(?:(\d+)M)?(?:(\d+(?:\.\d+)?)S)?)?$",
    )
    .expect("iso duration regex")
});

/// Calendar period used for truncation.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Period {
    Minute,
    Hour,
    Day,
    Week,
    Month,
    Quarter,
    Year,
}

impl Period {
    fn as_grain(self) -> Option<TimeGrain> {
        match self {
            Self::Minute => Some(TimeGrain::Minute),
            Self::Hour => Some(TimeGrain::Hour),
            Self::Day => Some(TimeGrain::Day),
            Self::Week => Some(TimeGrain::Week),
            Self::Month => Some(TimeGrain::Month),
            Self::Year => Some(TimeGrain::Year),
            Self::Quarter => None,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OffsetDirection {
    Add,
    Subtract,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Truncation {
    StartOfPeriod,
    EndOfPeriod,
}

/// One step applied to a reference time.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Transformation {
    Offset {
        duration: String,
        direction: OffsetDirection,
    },
    Truncate {
        period: Period,
        truncation: Truncation,
    },
}

/// Which instant a relative point is measured from.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferencePoint {
    #[default]
    LatestData,
    Now,
    MinOfLatestDataAndNow,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelativePointInTime {
    #[serde(default)]
    pub reference: ReferencePoint,
    #[serde(default)]
    pub transformation: Vec<Transformation>,
}

/// Parsed ISO-8601 duration. Calendar parts stay separate from clock parts so
/// that month steps respect month lengths.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct IsoDuration {
    pub months: i64,
    pub days: i64,
    pub millis: i64,
}

impl IsoDuration {
    pub fn parse(value: &str) -> DashboardResult<Self> {
        let invalid = || DashboardError::InvalidDuration(value.to_string());
        if value == "P" || value.ends_with('T') {
            return Err(invalid());
        }
        let caps = ISO_DURATION_RE.captures(value).ok_or_else(invalid)?;
        let int = |idx: usize| -> DashboardResult<i64> {
            caps.get(idx)
                .map_or(Ok(0), |m| m.as_str().parse::<i64>().map_err(|_| invalid()))
        };
        let seconds: f64 = caps
            .get(7)
            .map_or(Ok(0.0), |m| m.as_str().parse::<f64>().map_err(|_| invalid()))?;

        let scaled = |idx: usize, unit: i64| -> DashboardResult<i64> {
            int(idx)?.checked_mul(unit).ok_or_else(invalid)
        };
        let second_ms = (seconds * 1000.0).round();
        if !second_ms.is_finite() || second_ms >= i64::MAX as f64 {
            return Err(invalid());
        }

        let months = scaled(1, 12)?.checked_add(int(2)?).ok_or_else(invalid)?;
        let days = scaled(3, 7)?.checked_add(int(4)?).ok_or_else(invalid)?;
        let millis = scaled(5, HOUR_MS)?
            .checked_add(scaled(6, MINUTE_MS)?)
            .and_then(|ms| ms.checked_add(second_ms as i64))
            .ok_or_else(invalid)?;
        Ok(Self {
            months,
            days,
            millis,
        })
    }

    /// Casual length with 30-day months. Only for scaling, never for stepping
    /// a calendar.
    pub fn approx_millis(&self) -> i64 {
        self.months * 30 * DAY_MS + self.days * DAY_MS + self.millis
    }

    fn negated(self) -> Self {
        Self {
            months: -self.months,
            days: -self.days,
            millis: -self.millis,
        }
    }
}

/// Start of the period containing `instant`, in `tz`.
pub fn start_of_period(instant: DateTime<Utc>, period: Period, tz: Tz) -> DateTime<Utc> {
    match period.as_grain() {
        Some(grain) => grain::floor(instant, grain, tz),
        None => {
            let month_start = grain::floor(instant, TimeGrain::Month, tz);
            let month = i64::from(month_start.with_timezone(&tz).month());
            grain::add_grains(month_start, -((month - 1) % 3), TimeGrain::Month, tz)
        }
    }
}

/// Last millisecond of the period containing `instant`, in `tz`.
pub fn end_of_period(instant: DateTime<Utc>, period: Period, tz: Tz) -> DateTime<Utc> {
    let start = start_of_period(instant, period, tz);
    let next = match period.as_grain() {
        Some(grain) => grain::add_grains(start, 1, grain, tz),
        None => grain::add_grains(start, 3, TimeGrain::Month, tz),
    };
    next.checked_sub_signed(TimeDelta::milliseconds(1))
        .unwrap_or(next)
}

/// Move `instant` by an ISO-8601 duration, stepping calendar units in `tz`.
pub fn offset(
    instant: DateTime<Utc>,
    duration: &str,
    direction: OffsetDirection,
    tz: Tz,
) -> DashboardResult<DateTime<Utc>> {
    let parsed = IsoDuration::parse(duration)?;
    let step = match direction {
        OffsetDirection::Add => parsed,
        OffsetDirection::Subtract => parsed.negated(),
    };
    apply_duration(instant, step, tz)
        .ok_or_else(|| DashboardError::InvalidDuration(duration.to_string()))
}

/// `None` when the result falls outside the representable range.
pub(crate) fn apply_duration(
    instant: DateTime<Utc>,
    step: IsoDuration,
    tz: Tz,
) -> Option<DateTime<Utc>> {
    let mut moved = instant;
    if step.months != 0 {
        moved = grain::checked_shift_months(moved, step.months, tz)?;
    }
    if step.days != 0 {
        let local = moved
            .with_timezone(&tz)
            .naive_local()
            .checked_add_signed(TimeDelta::try_days(step.days)?)?;
        moved = grain::resolve_local(&tz, local);
    }
    moved.checked_add_signed(TimeDelta::try_milliseconds(step.millis)?)
}

/// Apply `transformations` to `reference` in order.
pub fn transform_date(
    reference: DateTime<Utc>,
    transformations: &[Transformation],
    tz: Tz,
) -> DashboardResult<DateTime<Utc>> {
    transformations
        .iter()
        .try_fold(reference, |current, step| match step {
            Transformation::Offset {
                duration,
                direction,
            } => offset(current, duration, *direction, tz),
            Transformation::Truncate {
                period,
                truncation: Truncation::StartOfPeriod,
            } => Ok(start_of_period(current, *period, tz)),
            Transformation::Truncate {
                period,
                truncation: Truncation::EndOfPeriod,
            } => Ok(end_of_period(current, *period, tz)),
        })
}

/// Resolve a relative point against the latest data timestamp and `now`.
pub fn resolve_relative_point(
    point: &RelativePointInTime,
    latest_data: DateTime<Utc>,
    now: DateTime<Utc>,
    tz: Tz,
) -> DashboardResult<DateTime<Utc>> {
    let reference = match point.reference {
        ReferencePoint::LatestData => latest_data,
        ReferencePoint::Now => now,
        ReferencePoint::MinOfLatestDataAndNow => latest_data.min(now),
    };
    transform_date(reference, &point.transformation, tz)
}

/// `duration` scaled by `multiple`, expressed in days, hours, minutes, and
/// seconds (zero components omitted).
pub fn duration_multiple(duration: &str, multiple: f64) -> DashboardResult<String> {
    let total = (IsoDuration::parse(duration)?.approx_millis() as f64 * multiple).round() as i64;
    Ok(format_day_time_duration(total))
}

fn format_day_time_duration(total_ms: i64) -> String {
    let sign = if total_ms < 0 { "-" } else { "" };
    let mut rest = total_ms.abs();
    let days = rest / DAY_MS;
    rest %= DAY_MS;
    let hours = rest / HOUR_MS;
    rest %= HOUR_MS;
    let minutes = rest / MINUTE_MS;
    rest %= MINUTE_MS;

    let mut out = format!("{sign}P");
    if days != 0 {
        out.push_str(&format!("{days}D"));
    }
    let mut clock = String::new();
    if hours != 0 {
        clock.push_str(&format!("{hours}H"));
    }
    if minutes != 0 {
        clock.push_str(&format!("{minutes}M"));
    }
    if rest != 0 {
        let seconds = format!("{:.3}", rest as f64 / 1000.0);
        let seconds = seconds.trim_end_matches('0').trim_end_matches('.');
        clock.push_str(&format!("{seconds}S"));
    }
    if !clock.is_empty() {
        out.push('T');
        out.push_str(&clock);
    }
    if days == 0 && clock.is_empty() {
        out.push_str("T0S");
    }
    out
}
