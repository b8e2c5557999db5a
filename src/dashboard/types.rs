//! Dashboard state and the schema it is reconciled against.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::{DashboardError, DashboardResult};
use crate::time::{ObservedRange, TimeComparisonOption, TimeRange, TimeRangeName};

// ---------------------------------------------------------------------------
// Schema (supplied by the metrics-view provider)
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeasureSpec {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expression: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DimensionSpec {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<String>,
}

/// Measures and dimensions of one metrics view.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsViewSchema {
    #[serde(default)]
    pub measures: Vec<MeasureSpec>,
    #[serde(default)]
    pub dimensions: Vec<DimensionSpec>,
}

impl MetricsViewSchema {
    /// Build a schema from bare names (handy in tests and the CLI).
    pub fn from_names<M, D>(measures: M, dimensions: D) -> Self
    where
        M: IntoIterator,
        M::Item: Into<String>,
        D: IntoIterator,
        D::Item: Into<String>,
    {
        Self {
            measures: measures
                .into_iter()
                .map(|name| MeasureSpec {
                    name: name.into(),
                    ..Default::default()
                })
                .collect(),
            dimensions: dimensions
                .into_iter()
                .map(|name| DimensionSpec {
                    name: name.into(),
                    ..Default::default()
                })
                .collect(),
        }
    }

    pub fn measure_names(&self) -> impl Iterator<Item = &str> {
        self.measures.iter().map(|m| m.name.as_str())
    }

    pub fn dimension_names(&self) -> impl Iterator<Item = &str> {
        self.dimensions.iter().map(|d| d.name.as_str())
    }

    pub fn has_measure(&self, name: &str) -> bool {
        self.measure_names().any(|m| m == name)
    }

    pub fn has_dimension(&self, name: &str) -> bool {
        self.dimension_names().any(|d| d == name)
    }
}

// ---------------------------------------------------------------------------
// Filters
// ---------------------------------------------------------------------------

/// Allowed (or excluded) values for one dimension.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DimensionValues {
    pub name: String,
    #[serde(rename = "in")]
    pub values: Vec<String>,
}

/// Which of the two filter lists a dimension uses.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterMode {
    #[default]
    Include,
    Exclude,
}

impl FilterMode {
    pub fn flipped(self) -> Self {
        match self {
            Self::Include => Self::Exclude,
            Self::Exclude => Self::Include,
        }
    }
}

/// Include and exclude lists. A dimension appears in at most one of them.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filters {
    #[serde(default)]
    pub include: Vec<DimensionValues>,
    #[serde(default)]
    pub exclude: Vec<DimensionValues>,
}

impl Filters {
    pub fn list(&self, mode: FilterMode) -> &Vec<DimensionValues> {
        match mode {
            FilterMode::Include => &self.include,
            FilterMode::Exclude => &self.exclude,
        }
    }

    pub fn list_mut(&mut self, mode: FilterMode) -> &mut Vec<DimensionValues> {
        match mode {
            FilterMode::Include => &mut self.include,
            FilterMode::Exclude => &mut self.exclude,
        }
    }

    /// The entry for `dimension` and the list it lives in.
    pub fn find(&self, dimension: &str) -> Option<(FilterMode, &DimensionValues)> {
        [FilterMode::Include, FilterMode::Exclude]
            .into_iter()
            .find_map(|mode| {
                self.list(mode)
                    .iter()
                    .find(|entry| entry.name == dimension)
                    .map(|entry| (mode, entry))
            })
    }

    pub fn is_empty(&self) -> bool {
        self.include.is_empty() && self.exclude.is_empty()
    }

    /// Drop entries whose dimension fails `keep`.
    pub fn retain_dimensions(&mut self, mut keep: impl FnMut(&str) -> bool) {
        self.include.retain(|entry| keep(&entry.name));
        self.exclude.retain(|entry| keep(&entry.name));
    }

    /// Exclude-mode map implied by the lists.
    pub fn exclude_mode_map(&self) -> BTreeMap<String, bool> {
        self.exclude
            .iter()
            .map(|entry| (entry.name.clone(), true))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Sorting and the leaderboard context column
// ---------------------------------------------------------------------------

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Ascending,
    #[default]
    Descending,
}

impl SortDirection {
    pub fn toggled(self) -> Self {
        match self {
            Self::Ascending => Self::Descending,
            Self::Descending => Self::Ascending,
        }
    }
}

/// What the leaderboard is ordered by.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortType {
    #[default]
    Value,
    Dimension,
    Percent,
    DeltaAbsolute,
    DeltaPercent,
}

impl fmt::Display for SortType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value => write!(f, "value"),
            Self::Dimension => write!(f, "dimension"),
            Self::Percent => write!(f, "percent"),
            Self::DeltaAbsolute => write!(f, "delta_absolute"),
            Self::DeltaPercent => write!(f, "delta_percent"),
        }
    }
}

/// Extra column shown beside each leaderboard value.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeaderboardContextColumn {
    #[default]
    Hidden,
    Percent,
    DeltaAbsolute,
    DeltaPercent,
}

impl LeaderboardContextColumn {
    pub const ALL: [LeaderboardContextColumn; 4] = [
        LeaderboardContextColumn::Hidden,
        LeaderboardContextColumn::Percent,
        LeaderboardContextColumn::DeltaAbsolute,
        LeaderboardContextColumn::DeltaPercent,
    ];

    /// Sort type that orders by this column.
    pub fn sort_type(self) -> SortType {
        match self {
            Self::Hidden => SortType::Value,
            Self::Percent => SortType::Percent,
            Self::DeltaAbsolute => SortType::DeltaAbsolute,
            Self::DeltaPercent => SortType::DeltaPercent,
        }
    }

    /// Delta columns need an active time comparison.
    pub fn is_delta(self) -> bool {
        matches!(self, Self::DeltaAbsolute | Self::DeltaPercent)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Hidden => "hidden",
            Self::Percent => "percent",
            Self::DeltaAbsolute => "delta_absolute",
            Self::DeltaPercent => "delta_percent",
        }
    }
}

impl fmt::Display for LeaderboardContextColumn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LeaderboardContextColumn {
    type Err = DashboardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|column| column.as_str() == s)
            .ok_or_else(|| DashboardError::UnknownContextColumn(s.to_string()))
    }
}

/// Sort type for a context column that arrived as text (URL, config).
/// Values outside the mapping are a contract violation.
pub fn sort_type_for_context_column_type(raw: &str) -> DashboardResult<SortType> {
    raw.parse::<LeaderboardContextColumn>()
        .map(LeaderboardContextColumn::sort_type)
}

// ---------------------------------------------------------------------------
// Time selections
// ---------------------------------------------------------------------------

/// The earlier window the selection is compared to.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComparisonTimeRange {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<TimeComparisonOption>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// A drag selection on the time axis. Either bound may be missing mid-drag.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrubRange {
    #[serde(default)]
    pub start: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_scrubbing: bool,
}

impl ScrubRange {
    /// Both bounds known and the drag finished.
    pub fn is_settled(&self) -> bool {
        !self.is_scrubbing && self.start.is_some() && self.end.is_some()
    }
}

// ---------------------------------------------------------------------------
// DashboardState
// ---------------------------------------------------------------------------

/// Per-view dashboard state. Only the store's reducers mutate it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DashboardState {
    pub name: String,

    pub filters: Filters,
    /// `true` when the dimension's entry belongs in `filters.exclude`.
    pub dimension_filter_exclude_mode: BTreeMap<String, bool>,

    pub selected_measure_names: Vec<String>,
    pub visible_measure_keys: BTreeSet<String>,
    pub all_measures_visible: bool,
    pub leaderboard_measure_name: Option<String>,
    pub expanded_measure_name: Option<String>,

    pub visible_dimension_keys: BTreeSet<String>,
    pub all_dimensions_visible: bool,
    pub selected_dimension_name: Option<String>,

    pub selected_time_range: Option<TimeRange>,
    pub selected_comparison_time_range: Option<ComparisonTimeRange>,
    pub show_time_comparison: bool,
    pub selected_comparison_dimension: Option<String>,

    pub selected_scrub_range: Option<ScrubRange>,
    pub last_defined_scrub_range: Option<ScrubRange>,

    pub sort_direction: SortDirection,
    pub dashboard_sort_type: SortType,
    pub leaderboard_context_column: LeaderboardContextColumn,

    pub dimension_search_text: String,
    pub selected_timezone: String,

    /// Serialized snapshot, refreshed after every mutation.
    pub proto: String,
}

impl DashboardState {
    /// Defaults for a freshly opened view: every measure and dimension
    /// visible, the first measure driving the leaderboard, and the AllTime
    /// range when the dataset span is known.
    pub fn from_schema(
        name: impl Into<String>,
        schema: &MetricsViewSchema,
        observed: Option<&ObservedRange>,
        timezone: &str,
    ) -> DashboardResult<Self> {
        let measure_names: Vec<String> = schema.measure_names().map(str::to_string).collect();
        let selected_time_range = match observed {
            Some(observed) => {
                let name = crate::time::default_time_range_name();
                let interval = crate::time::default_time_grain(name, Some(observed))?;
                Some(crate::time::make_time_range_in(
                    name,
                    interval,
                    observed,
                    crate::time::parse_timezone(timezone)?,
                )?)
            }
            None => None,
        };

        Ok(Self {
            name: name.into(),
            filters: Filters::default(),
            dimension_filter_exclude_mode: BTreeMap::new(),
            leaderboard_measure_name: measure_names.first().cloned(),
            visible_measure_keys: measure_names.iter().cloned().collect(),
            selected_measure_names: measure_names,
            all_measures_visible: true,
            expanded_measure_name: None,
            visible_dimension_keys: schema.dimension_names().map(str::to_string).collect(),
            all_dimensions_visible: true,
            selected_dimension_name: None,
            selected_time_range,
            selected_comparison_time_range: None,
            show_time_comparison: false,
            selected_comparison_dimension: None,
            selected_scrub_range: None,
            last_defined_scrub_range: None,
            sort_direction: SortDirection::default(),
            dashboard_sort_type: SortType::default(),
            leaderboard_context_column: LeaderboardContextColumn::default(),
            dimension_search_text: String::new(),
            selected_timezone: timezone.to_string(),
            proto: String::new(),
        })
    }

    /// Mode a dimension's filter entry currently uses.
    pub fn filter_mode(&self, dimension: &str) -> FilterMode {
        if self
            .dimension_filter_exclude_mode
            .get(dimension)
            .copied()
            .unwrap_or(false)
        {
            FilterMode::Exclude
        } else {
            FilterMode::Include
        }
    }

    /// Replace the scrub selection. Clearing it forgets the last settled
    /// scrub too; a settled one is remembered.
    pub(crate) fn set_scrub_range(&mut self, scrub: Option<ScrubRange>) {
        match &scrub {
            None => self.last_defined_scrub_range = None,
            Some(range) if range.is_settled() => {
                self.last_defined_scrub_range = Some(range.clone());
            }
            Some(_) => {}
        }
        self.selected_scrub_range = scrub;
    }

    /// Name of the selected time range, if any.
    pub fn time_range_name(&self) -> Option<TimeRangeName> {
        self.selected_time_range.as_ref().map(|range| range.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_column_mapping_is_total() {
        for column in LeaderboardContextColumn::ALL {
            let parsed = sort_type_for_context_column_type(column.as_str()).unwrap();
            assert_eq!(parsed, column.sort_type());
        }
        assert_eq!(
            sort_type_for_context_column_type("sparkline"),
            Err(DashboardError::UnknownContextColumn("sparkline".into()))
        );
    }

    #[test]
    fn default_state_from_schema() {
        let schema = MetricsViewSchema::from_names(["revenue", "orders"], ["country", "device"]);
        let observed =
            ObservedRange::parse("2024-01-01T00:00:00Z", "2024-01-15T00:00:00Z").unwrap();
        let state = DashboardState::from_schema("sales", &schema, Some(&observed), "UTC").unwrap();

        assert_eq!(state.leaderboard_measure_name.as_deref(), Some("revenue"));
        assert_eq!(state.selected_measure_names, vec!["revenue", "orders"]);
        assert!(state.all_measures_visible && state.all_dimensions_visible);
        assert_eq!(state.visible_dimension_keys.len(), 2);
        let range = state.selected_time_range.as_ref().unwrap();
        assert_eq!(range.name, TimeRangeName::AllTime);
        assert_eq!(range.interval, crate::time::TimeGrain::Hour);
        assert_eq!(state.leaderboard_context_column, LeaderboardContextColumn::Hidden);
    }

    #[test]
    fn default_state_rejects_unknown_timezone() {
        let schema = MetricsViewSchema::from_names(["revenue"], ["country"]);
        let observed =
            ObservedRange::parse("2024-01-01T00:00:00Z", "2024-01-15T00:00:00Z").unwrap();
        assert!(DashboardState::from_schema("sales", &schema, Some(&observed), "Nowhere").is_err());
    }

    #[test]
    fn filter_lookup_reports_mode() {
        let filters = Filters {
            include: vec![DimensionValues {
                name: "country".into(),
                values: vec!["US".into()],
            }],
            exclude: vec![DimensionValues {
                name: "device".into(),
                values: vec!["bot".into()],
            }],
        };
        assert_eq!(filters.find("device").map(|(mode, _)| mode), Some(FilterMode::Exclude));
        assert!(filters.find("browser").is_none());
        assert_eq!(filters.exclude_mode_map().get("device"), Some(&true));
    }
}
