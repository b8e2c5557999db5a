//! Named time ranges and the grains that make sense for them.
//!
//! A range's `end` is exclusive and always sits on a grain boundary: a range
//! covering "today" ends at the start of tomorrow.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, TimeDelta, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use super::grain::{self, DAY_MS, HOUR_MS, TimeGrain};
use crate::dashboard::errors::{DashboardError, DashboardResult};

/// Fewest buckets a grain may put on a line chart.
pub const MIN_POINTS_ON_CHART: i64 = 2;
/// Most buckets a grain may put on a line chart.
pub const MAX_POINTS_ON_CHART: i64 = 2500;

/// Relative window names, plus the dataset's full span and a custom range.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TimeRangeName {
    LastHour,
    #[serde(rename = "LAST_6_HOURS")]
    Last6Hours,
    LastDay,
    #[serde(rename = "LAST_2_DAYS")]
    Last2Days,
    #[serde(rename = "LAST_5_DAYS")]
    Last5Days,
    LastWeek,
    #[serde(rename = "LAST_2_WEEKS")]
    Last2Weeks,
    #[serde(rename = "LAST_30_DAYS")]
    Last30Days,
    #[serde(rename = "LAST_60_DAYS")]
    Last60Days,
    AllTime,
    Custom,
}

impl TimeRangeName {
    /// Names offered in the range picker, in declaration order.
    pub const PRESETS: [TimeRangeName; 10] = [
        TimeRangeName::LastHour,
        TimeRangeName::Last6Hours,
        TimeRangeName::LastDay,
        TimeRangeName::Last2Days,
        TimeRangeName::Last5Days,
        TimeRangeName::LastWeek,
        TimeRangeName::Last2Weeks,
        TimeRangeName::Last30Days,
        TimeRangeName::Last60Days,
        TimeRangeName::AllTime,
    ];

    /// Fixed width of a "last X" window, `None` for AllTime and Custom.
    pub fn last_x_duration_ms(self) -> Option<i64> {
        match self {
            Self::LastHour => Some(HOUR_MS),
            Self::Last6Hours => Some(6 * HOUR_MS),
            Self::LastDay => Some(DAY_MS),
            Self::Last2Days => Some(2 * DAY_MS),
            Self::Last5Days => Some(5 * DAY_MS),
            Self::LastWeek => Some(7 * DAY_MS),
            Self::Last2Weeks => Some(14 * DAY_MS),
            Self::Last30Days => Some(30 * DAY_MS),
            Self::Last60Days => Some(60 * DAY_MS),
            Self::AllTime | Self::Custom => None,
        }
    }

    pub fn is_last_x(self) -> bool {
        self.last_x_duration_ms().is_some()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::LastHour => "LAST_HOUR",
            Self::Last6Hours => "LAST_6_HOURS",
            Self::LastDay => "LAST_DAY",
            Self::Last2Days => "LAST_2_DAYS",
            Self::Last5Days => "LAST_5_DAYS",
            Self::LastWeek => "LAST_WEEK",
            Self::Last2Weeks => "LAST_2_WEEKS",
            Self::Last30Days => "LAST_30_DAYS",
            Self::Last60Days => "LAST_60_DAYS",
            Self::AllTime => "ALL_TIME",
            Self::Custom => "CUSTOM",
        }
    }

    /// Label shown in the picker.
    pub fn label(self) -> &'static str {
        match self {
            Self::LastHour => "Last hour",
            Self::Last6Hours => "Last 6 hours",
            Self::LastDay => "Last day",
            Self::Last2Days => "Last 2 days",
            Self::Last5Days => "Last 5 days",
            Self::LastWeek => "Last week",
            Self::Last2Weeks => "Last 2 weeks",
            Self::Last30Days => "Last 30 days",
            Self::Last60Days => "Last 60 days",
            Self::AllTime => "All time",
            Self::Custom => "Custom range",
        }
    }
}

impl fmt::Display for TimeRangeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TimeRangeName {
    type Err = DashboardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::PRESETS
            .into_iter()
            .chain([Self::Custom])
            .find(|name| name.as_str() == s)
            .ok_or_else(|| DashboardError::UnknownTimeRange(s.to_string()))
    }
}

/// The `[start, end)` span actually present in a dataset.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservedRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl ObservedRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> DashboardResult<Self> {
        if end < start {
            return Err(DashboardError::InvalidObservedRange);
        }
        Ok(Self { start, end })
    }

    /// Build from the ISO strings handed over by the range provider.
    pub fn parse(start: &str, end: &str) -> DashboardResult<Self> {
        Self::new(grain::parse_instant(start)?, grain::parse_instant(end)?)
    }

    pub fn duration_ms(&self) -> i64 {
        (self.end - self.start).num_milliseconds()
    }
}

/// A concrete range with the grain used to bucket it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub name: TimeRangeName,
    pub start: DateTime<Utc>,
    /// Exclusive.
    pub end: DateTime<Utc>,
    pub interval: TimeGrain,
}

/// A grain and whether it yields a reasonable number of chart points.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct TimeGrainOption {
    pub grain: TimeGrain,
    pub enabled: bool,
}

/// Width of `name` against `observed`. Custom ranges have no fixed width.
pub fn time_range_duration_ms(
    name: TimeRangeName,
    observed: &ObservedRange,
) -> DashboardResult<i64> {
    match name {
        TimeRangeName::AllTime => Ok(observed.duration_ms()),
        TimeRangeName::Custom => Err(DashboardError::UnknownTimeRange(name.to_string())),
        last_x => last_x
            .last_x_duration_ms()
            .ok_or_else(|| DashboardError::UnknownTimeRange(last_x.to_string())),
    }
}

/// Preset names that fit inside the observed span. AllTime always fits.
pub fn selectable_time_range_names(observed: Option<&ObservedRange>) -> Vec<TimeRangeName> {
    let Some(observed) = observed else {
        return Vec::new();
    };
    let ceiling = observed.duration_ms();
    TimeRangeName::PRESETS
        .into_iter()
        .filter(|name| name.last_x_duration_ms().is_none_or(|width| width <= ceiling))
        .collect()
}

/// Range name used before the user picks one.
pub fn default_time_range_name() -> TimeRangeName {
    TimeRangeName::AllTime
}

/// Every grain, flagged enabled when `name` would chart between
/// [`MIN_POINTS_ON_CHART`] and [`MAX_POINTS_ON_CHART`] buckets.
pub fn selectable_time_grains(
    name: TimeRangeName,
    observed: &ObservedRange,
) -> DashboardResult<Vec<TimeGrainOption>> {
    selectable_time_grains_within(name, observed, MIN_POINTS_ON_CHART, MAX_POINTS_ON_CHART)
}

/// [`selectable_time_grains`] with explicit point bounds.
pub fn selectable_time_grains_within(
    name: TimeRangeName,
    observed: &ObservedRange,
    min_points: i64,
    max_points: i64,
) -> DashboardResult<Vec<TimeGrainOption>> {
    let width = time_range_duration_ms(name, observed)? as f64;
    let grains: Vec<TimeGrainOption> = TimeGrain::ALL
        .into_iter()
        .map(|grain| {
            let points = width / grain.nominal_duration_ms() as f64;
            TimeGrainOption {
                grain,
                enabled: points >= min_points as f64 && points <= max_points as f64,
            }
        })
        .collect();
    if grains.is_empty() {
        return Err(DashboardError::NoTimeGrains(name.to_string()));
    }
    Ok(grains)
}

/// Grain a range opens with.
pub fn default_time_grain(
    name: TimeRangeName,
    observed: Option<&ObservedRange>,
) -> DashboardResult<TimeGrain> {
    let grain = match name {
        TimeRangeName::LastHour => TimeGrain::Minute,
        TimeRangeName::Last6Hours
        | TimeRangeName::LastDay
        | TimeRangeName::Last2Days
        | TimeRangeName::Last5Days
        | TimeRangeName::LastWeek => TimeGrain::Hour,
        TimeRangeName::Last2Weeks | TimeRangeName::Last30Days | TimeRangeName::Last60Days => {
            TimeGrain::Day
        }
        TimeRangeName::AllTime => match observed {
            None => TimeGrain::Day,
            Some(observed) => coarsest_reasonable_grain(observed.duration_ms()),
        },
        TimeRangeName::Custom => return Err(DashboardError::UnknownTimeRange(name.to_string())),
    };
    Ok(grain)
}

fn coarsest_reasonable_grain(width_ms: i64) -> TimeGrain {
    match width_ms {
        w if w <= 2 * HOUR_MS => TimeGrain::Minute,
        w if w <= 14 * DAY_MS => TimeGrain::Hour,
        w if w <= 60 * DAY_MS => TimeGrain::Day,
        w if w <= 365 * DAY_MS => TimeGrain::Week,
        w if w <= 20 * 365 * DAY_MS => TimeGrain::Month,
        _ => TimeGrain::Year,
    }
}

/// Concrete bounds for `name` bucketed by `interval`, in UTC.
pub fn make_time_range(
    name: TimeRangeName,
    interval: TimeGrain,
    observed: &ObservedRange,
) -> DashboardResult<TimeRange> {
    make_time_range_in(name, interval, observed, Tz::UTC)
}

/// Concrete bounds for `name`, flooring in `tz`.
///
/// AllTime starts exactly at the dataset start. "Last X" windows start X
/// before the dataset end, floored to `interval`. The end is the dataset end
/// pushed one grain forward and floored, so the final partial bucket is
/// included and the exclusive end lands on a boundary.
pub fn make_time_range_in(
    name: TimeRangeName,
    interval: TimeGrain,
    observed: &ObservedRange,
    tz: Tz,
) -> DashboardResult<TimeRange> {
    let start = match name {
        TimeRangeName::AllTime => observed.start,
        TimeRangeName::Custom => return Err(DashboardError::UnknownTimeRange(name.to_string())),
        last_x => {
            let width = time_range_duration_ms(last_x, observed)?;
            grain::floor(observed.end - TimeDelta::milliseconds(width), interval, tz)
        }
    };
    let end = grain::floor(grain::add_grains(observed.end, 1, interval, tz), interval, tz);
    Ok(TimeRange {
        name,
        start,
        end,
        interval,
    })
}

/// One concrete range per name, each at its default grain.
pub fn make_time_ranges(
    names: &[TimeRangeName],
    observed: &ObservedRange,
) -> DashboardResult<Vec<TimeRange>> {
    names
        .iter()
        .map(|&name| {
            let interval = default_time_grain(name, Some(observed))?;
            make_time_range(name, interval, observed)
        })
        .collect()
}

/// Every selectable preset, materialised.
pub fn selectable_time_ranges(observed: Option<&ObservedRange>) -> DashboardResult<Vec<TimeRange>> {
    match observed {
        None => Ok(Vec::new()),
        Some(observed) => make_time_ranges(&selectable_time_range_names(Some(observed)), observed),
    }
}
