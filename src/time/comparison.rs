//! Comparison ranges: the earlier window a selected range is measured against.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use super::range::{ObservedRange, TimeRangeName};
use super::transforms::{self, OffsetDirection};
use crate::dashboard::errors::{DashboardError, DashboardResult};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TimeComparisonOption {
    /// The window of equal width ending where the selection starts.
    #[serde(rename = "CONTIGUOUS")]
    Contiguous,
    #[serde(rename = "P1D")]
    PreviousDay,
    #[serde(rename = "P1W")]
    PreviousWeek,
    #[serde(rename = "P1M")]
    PreviousMonth,
    #[serde(rename = "P3M")]
    PreviousQuarter,
    #[serde(rename = "P1Y")]
    PreviousYear,
    /// Bounds supplied by the user.
    #[serde(rename = "CUSTOM_COMPARISON_RANGE")]
    Custom,
}

impl TimeComparisonOption {
    pub const ALL: [TimeComparisonOption; 7] = [
        TimeComparisonOption::Contiguous,
        TimeComparisonOption::PreviousDay,
        TimeComparisonOption::PreviousWeek,
        TimeComparisonOption::PreviousMonth,
        TimeComparisonOption::PreviousQuarter,
        TimeComparisonOption::PreviousYear,
        TimeComparisonOption::Custom,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Contiguous => "CONTIGUOUS",
            Self::PreviousDay => "P1D",
            Self::PreviousWeek => "P1W",
            Self::PreviousMonth => "P1M",
            Self::PreviousQuarter => "P3M",
            Self::PreviousYear => "P1Y",
            Self::Custom => "CUSTOM_COMPARISON_RANGE",
        }
    }

    /// ISO-8601 shift applied to both bounds, for the fixed-period options.
    pub fn iso_offset(self) -> Option<&'static str> {
        match self {
            Self::PreviousDay => Some("P1D"),
            Self::PreviousWeek => Some("P1W"),
            Self::PreviousMonth => Some("P1M"),
            Self::PreviousQuarter => Some("P3M"),
            Self::PreviousYear => Some("P1Y"),
            Self::Contiguous | Self::Custom => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Contiguous => "Previous period",
            Self::PreviousDay => "Previous day",
            Self::PreviousWeek => "Previous week",
            Self::PreviousMonth => "Previous month",
            Self::PreviousQuarter => "Previous quarter",
            Self::PreviousYear => "Previous year",
            Self::Custom => "Custom",
        }
    }
}

impl fmt::Display for TimeComparisonOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TimeComparisonOption {
    type Err = DashboardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|option| option.as_str() == s)
            .ok_or_else(|| DashboardError::UnknownTimeRange(s.to_string()))
    }
}

/// Comparison a range opens with. AllTime has nothing earlier to compare to.
pub fn default_comparison_option(name: TimeRangeName) -> Option<TimeComparisonOption> {
    match name {
        TimeRangeName::LastHour | TimeRangeName::Last6Hours => {
            Some(TimeComparisonOption::Contiguous)
        }
        TimeRangeName::LastDay => Some(TimeComparisonOption::PreviousDay),
        TimeRangeName::Last2Days | TimeRangeName::Last5Days => {
            Some(TimeComparisonOption::Contiguous)
        }
        TimeRangeName::LastWeek | TimeRangeName::Last2Weeks => {
            Some(TimeComparisonOption::PreviousWeek)
        }
        TimeRangeName::Last30Days | TimeRangeName::Last60Days => {
            Some(TimeComparisonOption::Contiguous)
        }
        TimeRangeName::Custom => Some(TimeComparisonOption::Contiguous),
        TimeRangeName::AllTime => None,
    }
}

/// A derived comparison window and whether the dataset covers it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct ComparisonRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub is_available: bool,
}

/// Shift `[start, end)` back according to `option` and check it lies inside
/// `observed`. Custom comparisons cannot be derived and come back unavailable.
pub fn comparison_range(
    option: TimeComparisonOption,
    observed: &ObservedRange,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    tz: Tz,
) -> DashboardResult<ComparisonRange> {
    let (comparison_start, comparison_end) = match option {
        TimeComparisonOption::Contiguous => {
            let width = end - start;
            (start - width, start)
        }
        TimeComparisonOption::Custom => {
            return Ok(ComparisonRange {
                start,
                end,
                is_available: false,
            });
        }
        shifted => {
            let duration = shifted.iso_offset().unwrap_or("P1D");
            (
                transforms::offset(start, duration, OffsetDirection::Subtract, tz)?,
                transforms::offset(end, duration, OffsetDirection::Subtract, tz)?,
            )
        }
    };

    Ok(ComparisonRange {
        start: comparison_start,
        end: comparison_end,
        is_available: comparison_start >= observed.start && comparison_end <= observed.end,
    })
}
