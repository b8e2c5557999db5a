//! Reconcile dashboard state with a metrics-view schema that changed
//! underneath it.
//!
//! Dangling references are repaired silently. Applying the same schema twice
//! changes nothing the second time.

use std::collections::HashSet;

use super::types::{DashboardState, MetricsViewSchema};

/// Repair every reference in `state` against `schema`. Returns `false`
/// without touching anything when the schema has no measures.
pub fn sync_state(state: &mut DashboardState, schema: &MetricsViewSchema) -> bool {
    if schema.measures.is_empty() {
        return false;
    }
    sync_measures(state, schema);
    sync_dimensions(state, schema);
    true
}

fn sync_measures(state: &mut DashboardState, schema: &MetricsViewSchema) {
    let measures: HashSet<&str> = schema.measure_names().collect();
    let first_measure = schema.measures.first().map(|m| m.name.clone());

    let leaderboard_exists = state
        .leaderboard_measure_name
        .as_deref()
        .is_some_and(|name| measures.contains(name));
    if !leaderboard_exists {
        state.leaderboard_measure_name = first_measure.clone();
    }

    state.selected_measure_names = schema.measure_names().map(str::to_string).collect();

    if state
        .expanded_measure_name
        .as_deref()
        .is_some_and(|name| !measures.contains(name))
    {
        state.expanded_measure_name = None;
    }

    if state.all_measures_visible {
        state.visible_measure_keys = schema.measure_names().map(str::to_string).collect();
        return;
    }

    state
        .visible_measure_keys
        .retain(|key| measures.contains(key.as_str()));
    if state.visible_measure_keys.is_empty() {
        if let Some(first) = first_measure {
            state.visible_measure_keys.insert(first);
        }
    }

    let leaderboard_visible = state
        .leaderboard_measure_name
        .as_ref()
        .is_some_and(|name| state.visible_measure_keys.contains(name));
    if !leaderboard_visible {
        state.leaderboard_measure_name = schema
            .measure_names()
            .find(|name| state.visible_measure_keys.contains(*name))
            .map(str::to_string);
    }
}

fn sync_dimensions(state: &mut DashboardState, schema: &MetricsViewSchema) {
    let dimensions: HashSet<&str> = schema.dimension_names().collect();

    state
        .filters
        .retain_dimensions(|name| dimensions.contains(name));
    state
        .dimension_filter_exclude_mode
        .retain(|name, _| dimensions.contains(name.as_str()));

    if state
        .selected_dimension_name
        .as_deref()
        .is_some_and(|name| !dimensions.contains(name))
    {
        state.selected_dimension_name = None;
    }
    if state
        .selected_comparison_dimension
        .as_deref()
        .is_some_and(|name| !dimensions.contains(name))
    {
        state.selected_comparison_dimension = None;
    }

    if state.all_dimensions_visible {
        state.visible_dimension_keys = schema.dimension_names().map(str::to_string).collect();
    } else {
        state
            .visible_dimension_keys
            .retain(|key| dimensions.contains(key.as_str()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dashboard::types::DimensionValues;

    fn state_for(schema: &MetricsViewSchema) -> DashboardState {
        DashboardState::from_schema("sales", schema, None, "UTC").unwrap()
    }

    #[test]
    fn empty_schema_is_ignored() {
        let schema = MetricsViewSchema::from_names(["revenue"], ["country"]);
        let mut state = state_for(&schema);
        let before = state.clone();
        assert!(!sync_state(&mut state, &MetricsViewSchema::default()));
        assert_eq!(state, before);
    }

    #[test]
    fn removed_dimension_drops_filters_and_selection() {
        let schema = MetricsViewSchema::from_names(["revenue"], ["country", "device"]);
        let mut state = state_for(&schema);
        state.filters.exclude.push(DimensionValues {
            name: "device".into(),
            values: vec!["bot".into()],
        });
        state.dimension_filter_exclude_mode.insert("device".into(), true);
        state.selected_dimension_name = Some("device".into());

        let shrunk = MetricsViewSchema::from_names(["revenue"], ["country"]);
        assert!(sync_state(&mut state, &shrunk));

        assert!(state.filters.is_empty());
        assert!(state.dimension_filter_exclude_mode.is_empty());
        assert_eq!(state.selected_dimension_name, None);
        assert_eq!(state.visible_dimension_keys.len(), 1);
    }

    #[test]
    fn invisible_leaderboard_measure_is_repaired() {
        let schema = MetricsViewSchema::from_names(["revenue", "orders", "users"], ["country"]);
        let mut state = state_for(&schema);
        state.all_measures_visible = false;
        state.visible_measure_keys = ["orders".to_string(), "users".to_string()].into();
        state.leaderboard_measure_name = Some("revenue".into());

        sync_state(&mut state, &schema);
        assert_eq!(state.leaderboard_measure_name.as_deref(), Some("orders"));
    }

    #[test]
    fn vanished_visible_measures_fall_back_to_first() {
        let schema = MetricsViewSchema::from_names(["revenue", "orders"], ["country"]);
        let mut state = state_for(&schema);
        state.all_measures_visible = false;
        state.visible_measure_keys = ["orders".to_string()].into();
        state.leaderboard_measure_name = Some("orders".into());

        let renamed = MetricsViewSchema::from_names(["revenue", "sessions"], ["country"]);
        sync_state(&mut state, &renamed);
        assert_eq!(
            state.visible_measure_keys.iter().collect::<Vec<_>>(),
            vec!["revenue"]
        );
        assert_eq!(state.leaderboard_measure_name.as_deref(), Some("revenue"));
        assert_eq!(state.selected_measure_names, vec!["revenue", "sessions"]);
    }

    #[test]
    fn sync_is_idempotent() {
        let schema = MetricsViewSchema::from_names(["revenue", "orders"], ["country", "device"]);
        let mut state = state_for(&schema);
        state.all_dimensions_visible = false;
        state.visible_dimension_keys = ["device".to_string(), "browser".to_string()].into();

        let next = MetricsViewSchema::from_names(["orders"], ["device"]);
        sync_state(&mut state, &next);
        let once = state.clone();
        sync_state(&mut state, &next);
        assert_eq!(state, once);
    }
}
