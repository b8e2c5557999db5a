//! The dashboard store: one [`DashboardState`] per metrics view, mutated only
//! through named reducers.
//!
//! Every reducer runs under the write lock, refreshes the serialized token,
//! and hands the new snapshot to subscribers once the lock is released.
//! Publication is serialized by a separate re-entrant lock taken before the
//! write lock, so listeners see snapshots in the order they were produced and
//! may call back into the store from the notifying thread.
//! Reducers addressed to a view that does not exist change nothing.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{ReentrantMutex, RwLock};
use tracing::{debug, info, warn};

use super::errors::{DashboardResult, ProtoError};
use super::proto;
use super::sync::sync_state;
use super::types::{
    ComparisonTimeRange, DashboardState, DimensionValues, FilterMode, LeaderboardContextColumn,
    MetricsViewSchema, ScrubRange, SortDirection, SortType,
};
use crate::time::{
    ObservedRange, TimeGrain, TimeRange, comparison_range, default_comparison_option,
    parse_timezone,
};

/// Handle returned by [`DashboardStore::subscribe`].
pub type ListenerId = u64;

/// Called with the view name and its new snapshot (`None` once removed).
pub type Listener = Arc<dyn Fn(&str, Option<&DashboardState>) + Send + Sync>;

pub struct DashboardStore {
    entities: RwLock<HashMap<String, DashboardState>>,
    listeners: RwLock<Vec<(ListenerId, Listener)>>,
    /// Held from mutation through notification.
    publish: ReentrantMutex<()>,
    next_listener: AtomicU64,
    default_timezone: String,
}

impl Default for DashboardStore {
    fn default() -> Self {
        Self::new("UTC")
    }
}

impl DashboardStore {
    /// Empty store. New views start in `default_timezone`.
    pub fn new(default_timezone: impl Into<String>) -> Self {
        Self {
            entities: RwLock::new(HashMap::new()),
            listeners: RwLock::new(Vec::new()),
            publish: ReentrantMutex::new(()),
            next_listener: AtomicU64::new(1),
            default_timezone: default_timezone.into(),
        }
    }

    // -----------------------------------------------------------------------
    // Reads and subscriptions
    // -----------------------------------------------------------------------

    /// Snapshot of one view.
    pub fn get(&self, name: &str) -> Option<DashboardState> {
        self.entities.read().get(name).cloned()
    }

    /// Names of every live view, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entities.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Register a listener for every published snapshot.
    pub fn subscribe(
        &self,
        listener: impl Fn(&str, Option<&DashboardState>) + Send + Sync + 'static,
    ) -> ListenerId {
        let id = self.next_listener.fetch_add(1, Ordering::Relaxed);
        self.listeners.write().push((id, Arc::new(listener)));
        id
    }

    /// Returns `false` if `id` was not registered.
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }

    fn notify(&self, name: &str, snapshot: Option<&DashboardState>) {
        let listeners: Vec<Listener> = self
            .listeners
            .read()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        for listener in listeners {
            listener(name, snapshot);
        }
    }

    /// Apply `mutate` to the named view, refresh its token and publish it.
    fn update_by_name(
        &self,
        name: &str,
        mutate: impl FnOnce(&mut DashboardState),
    ) -> Option<DashboardState> {
        let _publish = self.publish.lock();
        let snapshot = {
            let mut entities = self.entities.write();
            let Some(state) = entities.get_mut(name) else {
                debug!(view = name, "update for unknown dashboard ignored");
                return None;
            };
            mutate(state);
            refresh_proto(state);
            state.clone()
        };
        self.notify(name, Some(&snapshot));
        Some(snapshot)
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Create the default state for `name`. An existing view is returned
    /// untouched.
    pub fn init(
        &self,
        name: &str,
        schema: &MetricsViewSchema,
        observed: Option<&ObservedRange>,
    ) -> DashboardResult<DashboardState> {
        let _publish = self.publish.lock();
        let snapshot = {
            let mut entities = self.entities.write();
            if let Some(existing) = entities.get(name) {
                debug!(view = name, "dashboard already initialised");
                return Ok(existing.clone());
            }
            let mut state =
                DashboardState::from_schema(name, schema, observed, &self.default_timezone)?;
            refresh_proto(&mut state);
            entities.insert(name.to_string(), state.clone());
            state
        };
        debug!(
            view = name,
            measures = schema.measures.len(),
            dimensions = schema.dimensions.len(),
            "dashboard initialised"
        );
        self.notify(name, Some(&snapshot));
        Ok(snapshot)
    }

    /// Repair references after the schema changed. A schema without measures
    /// is ignored.
    pub fn sync(&self, name: &str, schema: &MetricsViewSchema) -> Option<DashboardState> {
        if schema.measures.is_empty() {
            debug!(view = name, "schema without measures; sync skipped");
            return None;
        }
        self.update_by_name(name, |state| {
            sync_state(state, schema);
        })
    }

    /// Hydrate a view from a URL token. Names the schema no longer knows
    /// are dropped before anything is applied.
    pub fn sync_from_url(
        &self,
        name: &str,
        token: &str,
        schema: &MetricsViewSchema,
    ) -> Result<Option<DashboardState>, ProtoError> {
        if token.is_empty() {
            return Ok(None);
        }
        let partial = proto::decode(token, schema)?;
        info!(view = name, "restoring dashboard from url state");
        Ok(self.update_by_name(name, |state| {
            partial.apply_to(state);
            if state.show_time_comparison {
                state.selected_comparison_dimension = None;
            } else {
                hide_delta_column(state);
            }
            sync_state(state, schema);
        }))
    }

    /// Forget a view. Later reducers for it are no-ops.
    pub fn remove(&self, name: &str) -> bool {
        let _publish = self.publish.lock();
        let removed = self.entities.write().remove(name).is_some();
        if removed {
            debug!(view = name, "dashboard removed");
            self.notify(name, None);
        }
        removed
    }

    // -----------------------------------------------------------------------
    // Measures and dimensions
    // -----------------------------------------------------------------------

    /// Point the leaderboard at another selected measure.
    pub fn set_leaderboard_measure_name(
        &self,
        name: &str,
        measure: &str,
    ) -> Option<DashboardState> {
        self.update_by_name(name, |state| {
            if state.selected_measure_names.iter().any(|m| m == measure) {
                state.leaderboard_measure_name = Some(measure.to_string());
            } else {
                debug!(view = name, measure, "leaderboard measure not selected; ignored");
            }
        })
    }

    pub fn set_expanded_measure_name(
        &self,
        name: &str,
        measure: Option<&str>,
    ) -> Option<DashboardState> {
        self.update_by_name(name, |state| {
            state.expanded_measure_name = measure.map(str::to_string);
        })
    }

    pub fn set_metric_dimension_name(
        &self,
        name: &str,
        dimension: Option<&str>,
    ) -> Option<DashboardState> {
        self.update_by_name(name, |state| {
            state.selected_dimension_name = dimension.map(str::to_string);
        })
    }

    pub fn set_search_text(&self, name: &str, text: &str) -> Option<DashboardState> {
        self.update_by_name(name, |state| {
            state.dimension_search_text = text.to_string();
        })
    }

    // -----------------------------------------------------------------------
    // Sorting
    // -----------------------------------------------------------------------

    pub fn set_sort_descending(&self, name: &str) -> Option<DashboardState> {
        self.set_sort_direction(name, SortDirection::Descending)
    }

    pub fn set_sort_ascending(&self, name: &str) -> Option<DashboardState> {
        self.set_sort_direction(name, SortDirection::Ascending)
    }

    pub fn set_sort_direction(
        &self,
        name: &str,
        direction: SortDirection,
    ) -> Option<DashboardState> {
        self.update_by_name(name, |state| state.sort_direction = direction)
    }

    /// Flip the direction when `sort_type` is absent or already active;
    /// otherwise switch to `sort_type`, descending.
    pub fn toggle_sort(&self, name: &str, sort_type: Option<SortType>) -> Option<DashboardState> {
        self.update_by_name(name, |state| match sort_type {
            Some(sort_type) if sort_type != state.dashboard_sort_type => {
                state.dashboard_sort_type = sort_type;
                state.sort_direction = SortDirection::Descending;
            }
            _ => state.sort_direction = state.sort_direction.toggled(),
        })
    }

    // -----------------------------------------------------------------------
    // Filters
    // -----------------------------------------------------------------------

    /// Add `value` to the dimension's active list, or remove it if present.
    /// An entry left without values is dropped.
    pub fn toggle_filter(&self, name: &str, dimension: &str, value: &str) -> Option<DashboardState> {
        self.update_by_name(name, |state| {
            let mode = state.filter_mode(dimension);
            let list = state.filters.list_mut(mode);
            match list.iter().position(|entry| entry.name == dimension) {
                Some(index) => {
                    let values = &mut list[index].values;
                    if let Some(existing) = values.iter().position(|v| v == value) {
                        values.remove(existing);
                        if values.is_empty() {
                            list.remove(index);
                        }
                    } else {
                        values.push(value.to_string());
                    }
                }
                None => list.push(DimensionValues {
                    name: dimension.to_string(),
                    values: vec![value.to_string()],
                }),
            }
        })
    }

    /// Flip include/exclude for `dimension`, moving its entry across.
    pub fn toggle_filter_mode(&self, name: &str, dimension: &str) -> Option<DashboardState> {
        self.update_by_name(name, |state| {
            let from = state.filter_mode(dimension);
            let to = from.flipped();
            state
                .dimension_filter_exclude_mode
                .insert(dimension.to_string(), to == FilterMode::Exclude);

            let source = state.filters.list_mut(from);
            if let Some(index) = source.iter().position(|entry| entry.name == dimension) {
                let entry = source.remove(index);
                state.filters.list_mut(to).push(entry);
            }
        })
    }

    pub fn clear_filters(&self, name: &str) -> Option<DashboardState> {
        self.update_by_name(name, |state| {
            state.filters.include.clear();
            state.filters.exclude.clear();
            state.dimension_filter_exclude_mode.clear();
        })
    }

    /// Drop the dimension's entry from one list.
    pub fn clear_filter_for_dimension(
        &self,
        name: &str,
        dimension: &str,
        mode: FilterMode,
    ) -> Option<DashboardState> {
        self.update_by_name(name, |state| {
            state
                .filters
                .list_mut(mode)
                .retain(|entry| entry.name != dimension);
        })
    }

    // -----------------------------------------------------------------------
    // Time
    // -----------------------------------------------------------------------

    /// Select a range at `grain`. Without an explicit comparison the range's
    /// default comparison is used, and only if the dataset covers it.
    pub fn select_time_range(
        &self,
        name: &str,
        range: TimeRange,
        grain: TimeGrain,
        comparison: Option<ComparisonTimeRange>,
        observed: &ObservedRange,
    ) -> Option<DashboardState> {
        self.update_by_name(name, |state| {
            state.set_scrub_range(None);
            let range = TimeRange {
                interval: grain,
                ..range
            };

            state.selected_comparison_time_range = match comparison {
                Some(comparison) => Some(comparison),
                None => default_comparison_for(state, &range, observed),
            };
            state.selected_time_range = Some(range);

            let show = state.selected_comparison_time_range.is_some()
                && state.selected_comparison_dimension.is_none();
            set_display_comparison(state, show);
        })
    }

    /// Replace the selected range as-is. Clears the scrub.
    pub fn set_selected_time_range(&self, name: &str, range: TimeRange) -> Option<DashboardState> {
        self.update_by_name(name, |state| {
            state.set_scrub_range(None);
            state.selected_time_range = Some(range);
        })
    }

    pub fn set_selected_scrub_range(
        &self,
        name: &str,
        scrub: Option<ScrubRange>,
    ) -> Option<DashboardState> {
        self.update_by_name(name, |state| state.set_scrub_range(scrub))
    }

    /// Switch the view's timezone. Unknown IANA names are rejected.
    pub fn set_time_zone(&self, name: &str, timezone: &str) -> DashboardResult<Option<DashboardState>> {
        parse_timezone(timezone)?;
        Ok(self.update_by_name(name, |state| {
            state.set_scrub_range(None);
            state.selected_timezone = timezone.to_string();
        }))
    }

    // -----------------------------------------------------------------------
    // Comparisons and the context column
    // -----------------------------------------------------------------------

    /// Change the leaderboard context column. Delta columns need a visible
    /// time comparison; without one the call changes nothing.
    pub fn set_context_column(
        &self,
        name: &str,
        column: LeaderboardContextColumn,
    ) -> Option<DashboardState> {
        self.update_by_name(name, |state| {
            if column.is_delta() && !state.show_time_comparison {
                warn!(view = name, %column, "delta column needs a time comparison; ignored");
                return;
            }
            let initial_sort = state.leaderboard_context_column.sort_type();
            state.leaderboard_context_column = column;
            if state.dashboard_sort_type == initial_sort {
                state.dashboard_sort_type = column.sort_type();
            }
        })
    }

    /// Compare by a dimension (turning time comparison off), or pass `None`
    /// to go back to time comparison.
    pub fn set_comparison_dimension(
        &self,
        name: &str,
        dimension: Option<&str>,
    ) -> Option<DashboardState> {
        self.update_by_name(name, |state| {
            set_display_comparison(state, dimension.is_none());
            state.selected_comparison_dimension = dimension.map(str::to_string);
        })
    }

    pub fn disable_all_comparisons(&self, name: &str) -> Option<DashboardState> {
        self.update_by_name(name, |state| {
            state.selected_comparison_dimension = None;
            set_display_comparison(state, false);
        })
    }

    pub fn display_time_comparison(&self, name: &str, show: bool) -> Option<DashboardState> {
        self.update_by_name(name, |state| set_display_comparison(state, show))
    }

    /// Set the comparison window and show it.
    pub fn set_selected_comparison_range(
        &self,
        name: &str,
        comparison: ComparisonTimeRange,
    ) -> Option<DashboardState> {
        self.update_by_name(name, |state| {
            set_display_comparison(state, true);
            state.selected_comparison_time_range = Some(comparison);
        })
    }
}

// ---------------------------------------------------------------------------
// Shared state transitions
// ---------------------------------------------------------------------------

fn refresh_proto(state: &mut DashboardState) {
    match proto::encode(state) {
        Ok(token) => state.proto = token,
        Err(err) => warn!(view = %state.name, error = %err, "failed to encode dashboard state"),
    }
}

/// Show or hide the time comparison. Showing it clears any dimension
/// comparison and brings up the delta-percent column if none is shown;
/// hiding it takes delta columns down.
fn set_display_comparison(state: &mut DashboardState, show: bool) {
    state.show_time_comparison = show;
    if show {
        state.selected_comparison_dimension = None;
        if state.leaderboard_context_column == LeaderboardContextColumn::Hidden {
            state.leaderboard_context_column = LeaderboardContextColumn::DeltaPercent;
        }
    } else {
        hide_delta_column(state);
    }
}

/// A delta column cannot outlive the comparison it reads from. The sort
/// follows the column down if it was ordered by it.
fn hide_delta_column(state: &mut DashboardState) {
    let column = state.leaderboard_context_column;
    if !column.is_delta() {
        return;
    }
    state.leaderboard_context_column = LeaderboardContextColumn::Hidden;
    if state.dashboard_sort_type == column.sort_type() {
        state.dashboard_sort_type = SortType::Value;
    }
}

fn default_comparison_for(
    state: &DashboardState,
    range: &TimeRange,
    observed: &ObservedRange,
) -> Option<ComparisonTimeRange> {
    let option = default_comparison_option(range.name)?;
    let tz = match parse_timezone(&state.selected_timezone) {
        Ok(tz) => tz,
        Err(err) => {
            warn!(view = %state.name, error = %err, "cannot derive comparison range");
            return None;
        }
    };
    match comparison_range(option, observed, range.start, range.end, tz) {
        Ok(derived) if derived.is_available => Some(ComparisonTimeRange {
            name: Some(option),
            start: derived.start,
            end: derived.end,
        }),
        Ok(_) => {
            debug!(view = %state.name, %option, "default comparison outside data; cleared");
            None
        }
        Err(err) => {
            warn!(view = %state.name, error = %err, "cannot derive comparison range");
            None
        }
    }
}
