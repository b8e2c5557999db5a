//! Human-readable labels for ranges, grains, and bucket timestamps.

use chrono::{DateTime, Datelike, TimeDelta, Utc};
use chrono_tz::Tz;

use super::grain::{TimeGrain, to_iso};
use super::range::TimeRange;
use crate::dashboard::errors::{DashboardError, DashboardResult};

/// Label a `[start, end)` span. `end` is exclusive, so the label shows the
/// millisecond before it.
///
/// Branches on whether the inclusive bounds share a day, a month, a year, or
/// nothing. Half-open inputs render the known bound as an ISO string.
pub fn pretty_format_time_range(
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
    tz: Tz,
) -> String {
    let (start, end) = match (start, end) {
        (None, None) => return String::new(),
        (None, Some(end)) => return format!("- {}", to_iso(end)),
        (Some(start), None) => return format!("{} -", to_iso(start)),
        (Some(start), Some(end)) => (start, end),
    };

    let start = start.with_timezone(&tz);
    let end = (end - TimeDelta::milliseconds(1)).with_timezone(&tz);

    let same_year = start.year() == end.year();
    let same_month = same_year && start.month() == end.month();
    let same_day = same_month && start.day() == end.day();

    if same_day {
        return format!(
            "{} {}, {} ({}-{})",
            start.format("%B"),
            start.day(),
            start.year(),
            start.format("%-I:%M%p"),
            end.format("%-I:%M%p"),
        );
    }
    if same_month {
        return format!(
            "{} {}-{}, {} ({}-{})",
            start.format("%B"),
            start.day(),
            end.day(),
            start.year(),
            start.format("%-I:%M%p"),
            end.format("%-I:%M%p"),
        );
    }
    if same_year {
        return format!(
            "{} - {}, {}",
            start.format("%B %-d"),
            end.format("%B %-d"),
            start.year()
        );
    }
    format!("{} - {}", start.format("%B %-d, %Y"), end.format("%B %-d, %Y"))
}

/// [`pretty_format_time_range`] for a concrete range.
pub fn pretty_format_range(range: &TimeRange, tz: Tz) -> String {
    pretty_format_time_range(Some(range.start), Some(range.end), tz)
}

/// Adjective used next to a grain in the UI.
pub fn pretty_time_grain(grain: TimeGrain) -> &'static str {
    match grain {
        TimeGrain::Minute => "minute",
        TimeGrain::Hour => "hourly",
        TimeGrain::Day => "daily",
        TimeGrain::Week => "weekly",
        TimeGrain::Month => "monthly",
        TimeGrain::Year => "yearly",
    }
}

/// Label a bucket timestamp at the precision of its query-engine interval.
pub fn format_date_by_interval(
    interval: &str,
    instant: DateTime<Utc>,
    tz: Tz,
) -> DashboardResult<String> {
    let grain = TimeGrain::ALL
        .into_iter()
        .find(|grain| grain.interval_name() == interval)
        .ok_or_else(|| DashboardError::UnknownInterval(interval.to_string()))?;
    let local = instant.with_timezone(&tz);
    let pattern = match grain {
        TimeGrain::Minute => "%b %-d, %Y, %-I:%M %p",
        TimeGrain::Hour => "%b %-d, %Y, %-I %p",
        TimeGrain::Day | TimeGrain::Week => "%b %-d, %Y",
        TimeGrain::Month => "%b %Y",
        TimeGrain::Year => "%Y",
    };
    Ok(local.format(pattern).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::grain::parse_instant;

    fn label(start: &str, end: &str) -> String {
        pretty_format_time_range(
            Some(parse_instant(start).unwrap()),
            Some(parse_instant(end).unwrap()),
            Tz::UTC,
        )
    }

    #[test]
    fn same_day_branch() {
        insta::assert_snapshot!(
            label("2024-03-09T05:00:00Z", "2024-03-09T06:00:00Z"),
            @"March 9, 2024 (5:00AM-5:59AM)"
        );
    }

    #[test]
    fn exclusive_midnight_end_stays_on_the_same_day() {
        insta::assert_snapshot!(
            label("2024-03-09T00:00:00Z", "2024-03-10T00:00:00Z"),
            @"March 9, 2024 (12:00AM-11:59PM)"
        );
    }

    #[test]
    fn same_month_branch() {
        insta::assert_snapshot!(
            label("2024-03-09T05:00:00Z", "2024-03-12T18:00:00Z"),
            @"March 9-12, 2024 (5:00AM-5:59PM)"
        );
    }

    #[test]
    fn same_year_branch() {
        insta::assert_snapshot!(
            label("2024-01-05T00:00:00Z", "2024-03-11T00:00:00Z"),
            @"January 5 - March 10, 2024"
        );
    }

    #[test]
    fn cross_year_branch() {
        insta::assert_snapshot!(
            label("2023-12-30T00:00:00Z", "2024-01-03T00:00:00Z"),
            @"December 30, 2023 - January 2, 2024"
        );
    }

    #[test]
    fn half_open_ranges() {
        let t = parse_instant("2024-03-10T06:00:00Z").unwrap();
        assert_eq!(
            pretty_format_time_range(None, Some(t), Tz::UTC),
            "- 2024-03-10T06:00:00.000Z"
        );
        assert_eq!(
            pretty_format_time_range(Some(t), None, Tz::UTC),
            "2024-03-10T06:00:00.000Z -"
        );
        assert_eq!(pretty_format_time_range(None, None, Tz::UTC), "");
    }

    #[test]
    fn labels_follow_the_timezone() {
        let tz: Tz = "Asia/Tokyo".parse().unwrap();
        let start = parse_instant("2024-03-09T20:00:00Z").unwrap();
        let end = parse_instant("2024-03-09T21:00:00Z").unwrap();
        assert_eq!(
            pretty_format_time_range(Some(start), Some(end), tz),
            "March 10, 2024 (5:00AM-5:59AM)"
        );
    }

    #[test]
    fn interval_labels() {
        let t = parse_instant("2024-03-09T05:30:00Z").unwrap();
        let fmt = |interval| format_date_by_interval(interval, t, Tz::UTC).unwrap();
        assert_eq!(fmt("minute"), "Mar 9, 2024, 5:30 AM");
        assert_eq!(fmt("hour"), "Mar 9, 2024, 5 AM");
        assert_eq!(fmt("day"), "Mar 9, 2024");
        assert_eq!(fmt("week"), "Mar 9, 2024");
        assert_eq!(fmt("month"), "Mar 2024");
        assert_eq!(fmt("year"), "2024");
        assert_eq!(
            format_date_by_interval("fortnight", t, Tz::UTC),
            Err(DashboardError::UnknownInterval("fortnight".into()))
        );
    }

    #[test]
    fn grain_adjectives() {
        assert_eq!(pretty_time_grain(TimeGrain::Hour), "hourly");
        assert_eq!(pretty_time_grain(TimeGrain::Minute), "minute");
    }
}
