//! Query parameters derived from dashboard state.
//!
//! These are plain request descriptions. Running them is the query
//! service's job.

use serde::Serialize;

use super::selectors::DashboardSelectors;
use super::types::{DashboardState, Filters, MetricsViewSchema, SortType};
use crate::time::to_iso;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct QuerySort {
    pub name: String,
    pub ascending: bool,
}

/// Top values of one dimension, ranked by the active measure.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ToplistQuery {
    pub metrics_view: String,
    pub dimension_name: String,
    pub measure_names: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_start: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_end: Option<String>,
    pub filter: Filters,
    pub sort: Vec<QuerySort>,
    pub limit: usize,
}

/// Bucketed totals for the visible measures.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TimeSeriesQuery {
    pub metrics_view: String,
    pub measure_names: Vec<String>,
    pub time_start: String,
    pub time_end: String,
    pub time_granularity: &'static str,
    pub time_zone: String,
    pub filter: Filters,
}

/// Column a sort type orders by. Delta columns are computed by the
/// comparison query and carry a suffix on the measure name.
pub fn sort_field(sort_type: SortType, measure: &str, dimension: &str) -> String {
    match sort_type {
        SortType::Value | SortType::Percent => measure.to_string(),
        SortType::Dimension => dimension.to_string(),
        SortType::DeltaAbsolute => format!("{measure}__delta_abs"),
        SortType::DeltaPercent => format!("{measure}__delta_rel"),
    }
}

/// Every filter except the one on `dimension`, so a leaderboard still lists
/// the values its own filter would hide.
pub fn filters_for_other_dimensions(filters: &Filters, dimension: &str) -> Filters {
    Filters {
        include: filters
            .include
            .iter()
            .filter(|entry| entry.name != dimension)
            .cloned()
            .collect(),
        exclude: filters
            .exclude
            .iter()
            .filter(|entry| entry.name != dimension)
            .cloned()
            .collect(),
    }
}

/// Leaderboard query for `dimension`. `None` while no measure is active.
pub fn toplist_query(
    metrics_view: &str,
    state: &DashboardState,
    schema: &MetricsViewSchema,
    dimension: &str,
    limit: usize,
) -> Option<ToplistQuery> {
    let selectors = DashboardSelectors::new(state, schema);
    let measure = selectors.active_measure_name()?;
    let controls = selectors.time_controls();

    Some(ToplistQuery {
        metrics_view: metrics_view.to_string(),
        dimension_name: dimension.to_string(),
        measure_names: vec![measure.to_string()],
        time_start: controls.map(|c| to_iso(c.start)),
        time_end: controls.map(|c| to_iso(c.end)),
        filter: filters_for_other_dimensions(&state.filters, dimension),
        sort: vec![QuerySort {
            name: sort_field(state.dashboard_sort_type, measure, dimension),
            ascending: selectors.sorted_ascending(),
        }],
        limit,
    })
}

/// Time series over the selected range. `None` until a range is selected.
pub fn time_series_query(
    metrics_view: &str,
    state: &DashboardState,
    schema: &MetricsViewSchema,
) -> Option<TimeSeriesQuery> {
    let range = state.selected_time_range.as_ref()?;
    Some(TimeSeriesQuery {
        metrics_view: metrics_view.to_string(),
        measure_names: visible_measure_names(state, schema),
        time_start: to_iso(range.start),
        time_end: to_iso(range.end),
        time_granularity: range.interval.wire_name(),
        time_zone: state.selected_timezone.clone(),
        filter: state.filters.clone(),
    })
}

/// Same series over the comparison window, when time comparison is shown.
pub fn comparison_time_series_query(
    metrics_view: &str,
    state: &DashboardState,
    schema: &MetricsViewSchema,
) -> Option<TimeSeriesQuery> {
    if !state.show_time_comparison {
        return None;
    }
    let range = state.selected_time_range.as_ref()?;
    let comparison = state.selected_comparison_time_range.as_ref()?;
    Some(TimeSeriesQuery {
        metrics_view: metrics_view.to_string(),
        measure_names: visible_measure_names(state, schema),
        time_start: to_iso(comparison.start),
        time_end: to_iso(comparison.end),
        time_granularity: range.interval.wire_name(),
        time_zone: state.selected_timezone.clone(),
        filter: state.filters.clone(),
    })
}

fn visible_measure_names(state: &DashboardState, schema: &MetricsViewSchema) -> Vec<String> {
    DashboardSelectors::new(state, schema)
        .visible_measures()
        .into_iter()
        .map(|m| m.name.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dashboard::types::{ComparisonTimeRange, DimensionValues, SortDirection};
    use crate::time::{ObservedRange, parse_instant};

    fn schema() -> MetricsViewSchema {
        MetricsViewSchema::from_names(["revenue", "orders"], ["country", "device"])
    }

    fn state() -> DashboardState {
        let observed =
            ObservedRange::parse("2024-01-01T00:00:00Z", "2024-01-15T00:00:00Z").unwrap();
        let mut state =
            DashboardState::from_schema("sales", &schema(), Some(&observed), "UTC").unwrap();
        state.filters.include.push(DimensionValues {
            name: "country".into(),
            values: vec!["US".into()],
        });
        state.filters.exclude.push(DimensionValues {
            name: "device".into(),
            values: vec!["bot".into()],
        });
        state
    }

    #[test]
    fn toplist_drops_own_filter() {
        let query = toplist_query("sales", &state(), &schema(), "country", 250).unwrap();
        assert!(query.filter.include.is_empty());
        assert_eq!(query.filter.exclude.len(), 1);
        assert_eq!(query.measure_names, vec!["revenue"]);
        assert_eq!(query.time_start.as_deref(), Some("2024-01-01T00:00:00.000Z"));
        assert_eq!(
            query.sort,
            vec![QuerySort {
                name: "revenue".into(),
                ascending: false,
            }]
        );
    }

    #[test]
    fn delta_sort_uses_suffixed_column() {
        let mut state = state();
        state.dashboard_sort_type = SortType::DeltaPercent;
        state.sort_direction = SortDirection::Ascending;
        let query = toplist_query("sales", &state, &schema(), "device", 10).unwrap();
        assert_eq!(query.sort[0].name, "revenue__delta_rel");
        assert!(query.sort[0].ascending);
        assert_eq!(sort_field(SortType::Dimension, "revenue", "device"), "device");
    }

    #[test]
    fn time_series_carries_grain_and_zone() {
        let query = time_series_query("sales", &state(), &schema()).unwrap();
        assert_eq!(query.time_granularity, "TIME_GRAIN_HOUR");
        assert_eq!(query.time_zone, "UTC");
        assert_eq!(query.measure_names, vec!["revenue", "orders"]);
        assert_eq!(query.filter.include.len(), 1);
    }

    #[test]
    fn comparison_series_needs_shown_comparison() {
        let mut state = state();
        state.selected_comparison_time_range = Some(ComparisonTimeRange {
            name: None,
            start: parse_instant("2023-12-18T00:00:00Z").unwrap(),
            end: parse_instant("2024-01-01T00:00:00Z").unwrap(),
        });
        assert!(comparison_time_series_query("sales", &state, &schema()).is_none());

        state.show_time_comparison = true;
        let query = comparison_time_series_query("sales", &state, &schema()).unwrap();
        assert_eq!(query.time_start, "2023-12-18T00:00:00.000Z");
    }
}
