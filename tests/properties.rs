//! Property tests for grain arithmetic and reducer algebra.

mod util;

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use dashboard_state::dashboard::{Filters, MetricsViewSchema, sync_state};
use dashboard_state::time::{
    ObservedRange, TimeGrain, TimeRangeName, add_grains_utc, floor_utc, selectable_time_grains,
};
use proptest::prelude::*;
use util::{sales_schema, sales_store};

const MINUTE_MS: i64 = 60_000;
const TWENTY_YEARS_MS: i64 = 20 * 365 * 24 * 60 * MINUTE_MS;

fn instant_strategy() -> impl Strategy<Value = DateTime<Utc>> {
    // 1990-01-01 .. 2040-01-01
    (631_152_000_000i64..2_208_988_800_000i64)
        .prop_map(|ms| Utc.timestamp_millis_opt(ms).single().unwrap())
}

fn fixed_grain_strategy() -> impl Strategy<Value = TimeGrain> {
    prop_oneof![
        Just(TimeGrain::Minute),
        Just(TimeGrain::Hour),
        Just(TimeGrain::Day),
    ]
}

/// Filters as sets, ignoring entry and value order.
fn canonical(filters: &Filters) -> BTreeMap<(bool, String), BTreeSet<String>> {
    let include = filters.include.iter().map(|entry| (false, entry));
    let exclude = filters.exclude.iter().map(|entry| (true, entry));
    include
        .chain(exclude)
        .map(|(excluded, entry)| {
            (
                (excluded, entry.name.clone()),
                entry.values.iter().cloned().collect(),
            )
        })
        .collect()
}

fn value_strategy() -> impl Strategy<Value = (usize, String)> {
    (0usize..3, "[a-z]{1,3}")
}

proptest! {
    #[test]
    fn floor_of_next_bucket_is_stable(instant in instant_strategy(), grain in fixed_grain_strategy()) {
        let next = add_grains_utc(floor_utc(instant, grain), 1, grain);
        prop_assert_eq!(floor_utc(next, grain), next);
    }

    #[test]
    fn floor_never_moves_forward(instant in instant_strategy(), grain in prop::sample::select(TimeGrain::ALL.to_vec())) {
        let floored = floor_utc(instant, grain);
        prop_assert!(floored <= instant);
        prop_assert_eq!(floor_utc(floored, grain), floored);
    }

    #[test]
    fn some_grain_is_always_enabled(width in (2 * MINUTE_MS)..=TWENTY_YEARS_MS) {
        let start = Utc.with_ymd_and_hms(2000, 1, 1, 0, 0, 0).unwrap();
        let observed = ObservedRange::new(start, start + TimeDelta::milliseconds(width)).unwrap();
        let grains = selectable_time_grains(TimeRangeName::AllTime, &observed).unwrap();
        prop_assert!(grains.iter().any(|option| option.enabled));
    }

    #[test]
    fn toggle_filter_is_its_own_inverse(
        seed in prop::collection::vec(value_strategy(), 0..6),
        probe in value_strategy(),
        exclude in any::<bool>(),
    ) {
        let dimensions = ["country", "device", "channel"];
        let store = sales_store();
        if exclude {
            store.toggle_filter_mode("sales", dimensions[probe.0]);
        }
        for (dim, value) in &seed {
            store.toggle_filter("sales", dimensions[*dim], value);
        }
        let before = store.get("sales").unwrap();

        store.toggle_filter("sales", dimensions[probe.0], &probe.1);
        let after = store.toggle_filter("sales", dimensions[probe.0], &probe.1).unwrap();
        prop_assert_eq!(canonical(&after.filters), canonical(&before.filters));
    }

    #[test]
    fn toggle_filter_mode_preserves_values(
        seed in prop::collection::vec(value_strategy(), 1..8),
        target in 0usize..3,
    ) {
        let dimensions = ["country", "device", "channel"];
        let store = sales_store();
        for (dim, value) in &seed {
            store.toggle_filter("sales", dimensions[*dim], value);
        }
        let dimension = dimensions[target];
        let before = store.get("sales").unwrap();
        let after = store.toggle_filter_mode("sales", dimension).unwrap();

        let values = |filters: &Filters| {
            filters.find(dimension).map(|(_, entry)| entry.values.clone())
        };
        prop_assert_eq!(values(&after.filters), values(&before.filters));
        let total = |filters: &Filters| {
            filters.include.len() + filters.exclude.len()
        };
        prop_assert_eq!(total(&after.filters), total(&before.filters));
    }

    #[test]
    fn sync_is_idempotent(
        measures in prop::sample::subsequence(vec!["revenue", "orders", "avg_basket", "sessions"], 0..=4),
        dimensions in prop::sample::subsequence(vec!["country", "device", "channel", "browser"], 0..=4),
        seed in prop::collection::vec(value_strategy(), 0..6),
        all_measures_visible in any::<bool>(),
    ) {
        let store = sales_store();
        for (dim, value) in &seed {
            store.toggle_filter("sales", ["country", "device", "channel"][*dim], value);
        }
        let mut state = store.get("sales").unwrap();
        state.all_measures_visible = all_measures_visible;
        if !all_measures_visible {
            state.visible_measure_keys = ["orders".to_string()].into();
            state.leaderboard_measure_name = Some("orders".into());
        }

        let schema = MetricsViewSchema::from_names(measures, dimensions);
        sync_state(&mut state, &schema);
        let once = state.clone();
        sync_state(&mut state, &schema);
        prop_assert_eq!(state, once);
    }

    #[test]
    fn comparison_modes_stay_exclusive(ops in prop::collection::vec(0u8..4, 1..12)) {
        let store = sales_store();
        for op in ops {
            let state = match op {
                0 => store.set_comparison_dimension("sales", Some("device")),
                1 => store.display_time_comparison("sales", true),
                2 => store.disable_all_comparisons("sales"),
                _ => store.set_comparison_dimension("sales", None),
            }
            .unwrap();
            prop_assert!(!(state.show_time_comparison && state.selected_comparison_dimension.is_some()));
            if !state.show_time_comparison {
                prop_assert!(!state.leaderboard_context_column.is_delta());
            }
        }
    }
}

#[test]
fn unchanged_schema_sync_keeps_state() {
    let store = sales_store();
    store.toggle_filter("sales", "country", "US");
    let before = store.get("sales").unwrap();
    let mut state = before.clone();
    sync_state(&mut state, &sales_schema());
    assert_eq!(state, before);
}
