//! Read-only views derived from a dashboard snapshot and its schema.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::types::{
    DashboardState, DimensionSpec, FilterMode, LeaderboardContextColumn, MeasureSpec,
    MetricsViewSchema, SortDirection, SortType,
};
use crate::time::TimeGrain;

/// The bounds a query should use right now.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct TimeControls {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub interval: TimeGrain,
    /// Bounds come from a settled scrub rather than the selected range.
    pub from_scrub: bool,
}

/// Selector bundle over one snapshot.
#[derive(Clone, Copy)]
pub struct DashboardSelectors<'a> {
    state: &'a DashboardState,
    schema: &'a MetricsViewSchema,
}

impl<'a> DashboardSelectors<'a> {
    pub fn new(state: &'a DashboardState, schema: &'a MetricsViewSchema) -> Self {
        Self { state, schema }
    }

    pub fn state(&self) -> &'a DashboardState {
        self.state
    }

    // -- measures -----------------------------------------------------------

    pub fn active_measure(&self) -> Option<&'a MeasureSpec> {
        let name = self.state.leaderboard_measure_name.as_deref()?;
        self.schema.measures.iter().find(|m| m.name == name)
    }

    pub fn active_measure_name(&self) -> Option<&'a str> {
        self.active_measure().map(|m| m.name.as_str())
    }

    /// Visible measures in schema order.
    pub fn visible_measures(&self) -> Vec<&'a MeasureSpec> {
        self.schema
            .measures
            .iter()
            .filter(|m| self.state.visible_measure_keys.contains(&m.name))
            .collect()
    }

    // -- dimensions ---------------------------------------------------------

    /// Visible dimensions in schema order.
    pub fn visible_dimensions(&self) -> Vec<&'a DimensionSpec> {
        self.schema
            .dimensions
            .iter()
            .filter(|d| self.state.visible_dimension_keys.contains(&d.name))
            .collect()
    }

    pub fn selected_dimension(&self) -> Option<&'a DimensionSpec> {
        let name = self.state.selected_dimension_name.as_deref()?;
        self.schema.dimensions.iter().find(|d| d.name == name)
    }

    /// Label to show for a dimension, falling back to its name.
    pub fn dimension_label(&self, dimension: &'a str) -> &'a str {
        self.schema
            .dimensions
            .iter()
            .find(|d| d.name == dimension)
            .and_then(|d| d.label.as_deref())
            .unwrap_or(dimension)
    }

    // -- dimension filters --------------------------------------------------

    pub fn is_excluded(&self, dimension: &str) -> bool {
        self.state.filter_mode(dimension) == FilterMode::Exclude
    }

    /// Values selected for `dimension` in whichever list holds it.
    pub fn selected_values(&self, dimension: &str) -> &'a [String] {
        self.state
            .filters
            .find(dimension)
            .map(|(_, entry)| entry.values.as_slice())
            .unwrap_or(&[])
    }

    pub fn has_filters(&self) -> bool {
        !self.state.filters.is_empty()
    }

    pub fn is_filtered(&self, dimension: &str) -> bool {
        self.state.filters.find(dimension).is_some()
    }

    // -- comparisons --------------------------------------------------------

    pub fn is_being_compared(&self, dimension: &str) -> bool {
        self.state.selected_comparison_dimension.as_deref() == Some(dimension)
    }

    /// Time comparison is shown and has a window to read from.
    pub fn is_time_comparison_active(&self) -> bool {
        self.state.show_time_comparison && self.state.selected_comparison_time_range.is_some()
    }

    // -- context column -----------------------------------------------------

    pub fn context_column(&self) -> LeaderboardContextColumn {
        self.state.leaderboard_context_column
    }

    pub fn is_delta_column(&self) -> bool {
        self.context_column().is_delta()
    }

    pub fn is_percent_column(&self) -> bool {
        self.context_column() == LeaderboardContextColumn::Percent
    }

    pub fn is_context_column_hidden(&self) -> bool {
        self.context_column() == LeaderboardContextColumn::Hidden
    }

    // -- sorting ------------------------------------------------------------

    pub fn sort_type(&self) -> SortType {
        self.state.dashboard_sort_type
    }

    pub fn sorted_ascending(&self) -> bool {
        self.state.sort_direction == SortDirection::Ascending
    }

    pub fn sorted_by_dimension_value(&self) -> bool {
        self.sort_type() == SortType::Dimension
    }

    /// The active measure column drives the order.
    pub fn sorted_by_value(&self) -> bool {
        self.sort_type() == SortType::Value
    }

    // -- time ---------------------------------------------------------------

    /// Selected range, overridden by a settled scrub. Scrub bounds are
    /// ordered so a right-to-left drag still yields `start <= end`.
    pub fn time_controls(&self) -> Option<TimeControls> {
        let range = self.state.selected_time_range.as_ref()?;
        if let Some(scrub) = self.state.selected_scrub_range.as_ref()
            && scrub.is_settled()
            && let (Some(a), Some(b)) = (scrub.start, scrub.end)
        {
            return Some(TimeControls {
                start: a.min(b),
                end: a.max(b),
                interval: range.interval,
                from_scrub: true,
            });
        }
        Some(TimeControls {
            start: range.start,
            end: range.end,
            interval: range.interval,
            from_scrub: false,
        })
    }
}
