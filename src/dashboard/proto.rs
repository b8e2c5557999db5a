//! URL state token: a compact, URL-safe snapshot of a dashboard.
//!
//! The token is base64url (no padding) over a MessagePack map. Decoding
//! rejects unknown keys, then validates every name against the live schema
//! and returns a [`PartialDashboardState`] holding only what may be applied.

use std::collections::BTreeSet;

use base64::prelude::*;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::errors::ProtoError;
use super::types::{
    ComparisonTimeRange, DashboardState, DimensionValues, Filters, LeaderboardContextColumn,
    MetricsViewSchema, ScrubRange, SortDirection, SortType,
};
use crate::time::{TimeRange, parse_timezone};

const PROTO_VERSION: u8 = 1;

/// Wire shape. Every field the token may carry is listed here.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
struct ProtoState {
    v: u8,
    filters: Filters,
    all_measures_visible: bool,
    visible_measures: Vec<String>,
    all_dimensions_visible: bool,
    visible_dimensions: Vec<String>,
    leaderboard_measure: Option<String>,
    expanded_measure: Option<String>,
    selected_dimension: Option<String>,
    time_range: Option<TimeRange>,
    comparison_time_range: Option<ComparisonTimeRange>,
    show_time_comparison: bool,
    comparison_dimension: Option<String>,
    scrub_range: Option<ScrubRange>,
    sort_direction: SortDirection,
    sort_type: SortType,
    context_column: LeaderboardContextColumn,
    timezone: Option<String>,
}

/// Fields a decoded token may set. `None` leaves the current value alone;
/// for optional state fields `Some(None)` clears it.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PartialDashboardState {
    pub filters: Option<Filters>,
    pub all_measures_visible: Option<bool>,
    pub visible_measure_keys: Option<BTreeSet<String>>,
    pub all_dimensions_visible: Option<bool>,
    pub visible_dimension_keys: Option<BTreeSet<String>>,
    pub leaderboard_measure_name: Option<String>,
    pub expanded_measure_name: Option<Option<String>>,
    pub selected_dimension_name: Option<Option<String>>,
    pub selected_time_range: Option<TimeRange>,
    pub selected_comparison_time_range: Option<Option<ComparisonTimeRange>>,
    pub show_time_comparison: Option<bool>,
    pub selected_comparison_dimension: Option<Option<String>>,
    pub selected_scrub_range: Option<Option<ScrubRange>>,
    pub sort_direction: Option<SortDirection>,
    pub dashboard_sort_type: Option<SortType>,
    pub leaderboard_context_column: Option<LeaderboardContextColumn>,
    pub selected_timezone: Option<String>,
}

impl PartialDashboardState {
    /// Copy every present field onto `state` through its typed slot, then
    /// rebuild the exclude-mode map from the filters.
    pub fn apply_to(self, state: &mut DashboardState) {
        if let Some(filters) = self.filters {
            state.dimension_filter_exclude_mode = filters.exclude_mode_map();
            state.filters = filters;
        }
        if let Some(all) = self.all_measures_visible {
            state.all_measures_visible = all;
        }
        if let Some(keys) = self.visible_measure_keys {
            state.visible_measure_keys = keys;
        }
        if let Some(all) = self.all_dimensions_visible {
            state.all_dimensions_visible = all;
        }
        if let Some(keys) = self.visible_dimension_keys {
            state.visible_dimension_keys = keys;
        }
        if let Some(measure) = self.leaderboard_measure_name {
            state.leaderboard_measure_name = Some(measure);
        }
        if let Some(expanded) = self.expanded_measure_name {
            state.expanded_measure_name = expanded;
        }
        if let Some(dimension) = self.selected_dimension_name {
            state.selected_dimension_name = dimension;
        }
        if let Some(range) = self.selected_time_range {
            state.selected_time_range = Some(range);
        }
        if let Some(comparison) = self.selected_comparison_time_range {
            state.selected_comparison_time_range = comparison;
        }
        if let Some(show) = self.show_time_comparison {
            state.show_time_comparison = show;
        }
        if let Some(dimension) = self.selected_comparison_dimension {
            state.selected_comparison_dimension = dimension;
        }
        if let Some(scrub) = self.selected_scrub_range {
            state.set_scrub_range(scrub);
        }
        if let Some(direction) = self.sort_direction {
            state.sort_direction = direction;
        }
        if let Some(sort_type) = self.dashboard_sort_type {
            state.dashboard_sort_type = sort_type;
        }
        if let Some(column) = self.leaderboard_context_column {
            state.leaderboard_context_column = column;
        }
        if let Some(timezone) = self.selected_timezone {
            state.selected_timezone = timezone;
        }
    }
}

/// Serialize `state` into a URL-safe token.
pub fn encode(state: &DashboardState) -> Result<String, ProtoError> {
    let proto = ProtoState {
        v: PROTO_VERSION,
        filters: state.filters.clone(),
        all_measures_visible: state.all_measures_visible,
        visible_measures: state.visible_measure_keys.iter().cloned().collect(),
        all_dimensions_visible: state.all_dimensions_visible,
        visible_dimensions: state.visible_dimension_keys.iter().cloned().collect(),
        leaderboard_measure: state.leaderboard_measure_name.clone(),
        expanded_measure: state.expanded_measure_name.clone(),
        selected_dimension: state.selected_dimension_name.clone(),
        time_range: state.selected_time_range.clone(),
        comparison_time_range: state.selected_comparison_time_range.clone(),
        show_time_comparison: state.show_time_comparison,
        comparison_dimension: state.selected_comparison_dimension.clone(),
        scrub_range: state.selected_scrub_range.clone(),
        sort_direction: state.sort_direction,
        sort_type: state.dashboard_sort_type,
        context_column: state.leaderboard_context_column,
        timezone: Some(state.selected_timezone.clone()),
    };
    let bytes = rmp_serde::to_vec_named(&proto)?;
    Ok(BASE64_URL_SAFE_NO_PAD.encode(bytes))
}

/// Decode a token and keep only what is valid against `schema`.
pub fn decode(token: &str, schema: &MetricsViewSchema) -> Result<PartialDashboardState, ProtoError> {
    let bytes = BASE64_URL_SAFE_NO_PAD.decode(token.trim())?;
    let proto: ProtoState = rmp_serde::from_slice(&bytes)?;
    if proto.v != PROTO_VERSION {
        return Err(ProtoError::UnsupportedVersion(proto.v));
    }

    let known_dimension = |name: &String| schema.has_dimension(name);
    let known_measure = |name: &String| schema.has_measure(name);

    let filters = normalize_filters(proto.filters, schema);

    let visible_measure_keys: BTreeSet<String> = if proto.all_measures_visible {
        schema.measure_names().map(str::to_string).collect()
    } else {
        proto.visible_measures.into_iter().filter(known_measure).collect()
    };
    let visible_dimension_keys: BTreeSet<String> = if proto.all_dimensions_visible {
        schema.dimension_names().map(str::to_string).collect()
    } else {
        proto
            .visible_dimensions
            .into_iter()
            .filter(known_dimension)
            .collect()
    };

    Ok(PartialDashboardState {
        filters: Some(filters),
        all_measures_visible: Some(proto.all_measures_visible),
        visible_measure_keys: Some(visible_measure_keys),
        all_dimensions_visible: Some(proto.all_dimensions_visible),
        visible_dimension_keys: Some(visible_dimension_keys),
        leaderboard_measure_name: proto.leaderboard_measure.filter(known_measure),
        expanded_measure_name: checked_optional(proto.expanded_measure, known_measure),
        selected_dimension_name: checked_optional(proto.selected_dimension, known_dimension),
        selected_time_range: proto.time_range.filter(|range| range.start <= range.end),
        selected_comparison_time_range: match proto.comparison_time_range {
            Some(comparison) if comparison.start > comparison.end => None,
            comparison => Some(comparison),
        },
        show_time_comparison: Some(proto.show_time_comparison),
        selected_comparison_dimension: checked_optional(
            proto.comparison_dimension,
            known_dimension,
        ),
        selected_scrub_range: Some(proto.scrub_range),
        sort_direction: Some(proto.sort_direction),
        dashboard_sort_type: Some(proto.sort_type),
        leaderboard_context_column: Some(proto.context_column),
        selected_timezone: proto
            .timezone
            .filter(|tz| parse_timezone(tz).is_ok()),
    })
}

/// Pull the state token out of a URL query string (`a=1&state=...`).
pub fn token_from_query(query: &str, param: &str) -> Option<String> {
    query
        .trim_start_matches('?')
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(key, _)| *key == param)
        .and_then(|(_, value)| urlencoding::decode(value).ok())
        .map(|value| value.into_owned())
        .filter(|value| !value.is_empty())
}

/// `None` in the token clears; a known name sets; an unknown name is skipped.
fn checked_optional(
    value: Option<String>,
    known: impl Fn(&String) -> bool,
) -> Option<Option<String>> {
    match value {
        None => Some(None),
        Some(name) if known(&name) => Some(Some(name)),
        Some(_) => None,
    }
}

/// Known dimensions only, one entry per dimension, no repeated values. A
/// dimension listed in both modes keeps its exclude entry.
fn normalize_filters(filters: Filters, schema: &MetricsViewSchema) -> Filters {
    let exclude = merged_entries(filters.exclude, schema);
    let include = merged_entries(filters.include, schema)
        .into_iter()
        .filter(|entry| {
            let clash = exclude.iter().any(|excluded| excluded.name == entry.name);
            if clash {
                debug!(dimension = %entry.name, "dimension filtered in both modes; keeping exclude");
            }
            !clash
        })
        .collect();
    Filters { include, exclude }
}

fn merged_entries(entries: Vec<DimensionValues>, schema: &MetricsViewSchema) -> Vec<DimensionValues> {
    let mut merged: Vec<DimensionValues> = Vec::new();
    for entry in entries {
        if !schema.has_dimension(&entry.name) {
            continue;
        }
        match merged.iter_mut().find(|existing| existing.name == entry.name) {
            Some(existing) => existing.values.extend(entry.values),
            None => merged.push(entry),
        }
    }
    for entry in &mut merged {
        entry.values = std::mem::take(&mut entry.values).into_iter().unique().collect();
    }
    merged.retain(|entry| !entry.values.is_empty());
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> MetricsViewSchema {
        MetricsViewSchema::from_names(["revenue", "orders"], ["country", "device"])
    }

    fn state() -> DashboardState {
        DashboardState::from_schema("sales", &schema(), None, "UTC").unwrap()
    }

    #[test]
    fn token_is_url_safe() {
        let mut state = state();
        state.filters.include.push(DimensionValues {
            name: "country".into(),
            values: vec!["US".into(), "Côte d'Ivoire".into()],
        });
        let token = encode(&state).unwrap();
        assert!(
            token
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        );
    }

    #[test]
    fn decode_drops_names_missing_from_schema() {
        let mut state = state();
        state.filters.exclude.push(DimensionValues {
            name: "browser".into(),
            values: vec!["ie6".into()],
        });
        state.selected_dimension_name = Some("browser".into());
        state.leaderboard_measure_name = Some("profit".into());
        let token = encode(&state).unwrap();

        let partial = decode(&token, &schema()).unwrap();
        assert_eq!(partial.filters, Some(Filters::default()));
        assert_eq!(partial.selected_dimension_name, None);
        assert_eq!(partial.leaderboard_measure_name, None);
    }

    #[test]
    fn applying_decoded_state_restores_exclude_mode() {
        let mut source = state();
        source.filters.exclude.push(DimensionValues {
            name: "device".into(),
            values: vec!["bot".into()],
        });
        source.dimension_filter_exclude_mode.insert("device".into(), true);
        let token = encode(&source).unwrap();

        let mut target = state();
        decode(&token, &schema()).unwrap().apply_to(&mut target);
        assert_eq!(target.filters, source.filters);
        assert_eq!(target.dimension_filter_exclude_mode, source.dimension_filter_exclude_mode);
    }

    #[test]
    fn decoded_filters_are_normalized() {
        let entry = |name: &str, values: &[&str]| DimensionValues {
            name: name.into(),
            values: values.iter().map(|v| v.to_string()).collect(),
        };
        let mut forged = state();
        forged.filters = Filters {
            include: vec![
                entry("country", &["US"]),
                entry("device", &["bot", "bot"]),
                entry("device", &["tablet", "bot"]),
            ],
            exclude: vec![entry("country", &["FR"]), entry("planet", &["mars"])],
        };

        let filters = decode(&encode(&forged).unwrap(), &schema())
            .unwrap()
            .filters
            .unwrap();
        assert_eq!(filters.include, vec![entry("device", &["bot", "tablet"])]);
        assert_eq!(filters.exclude, vec![entry("country", &["FR"])]);
    }

    #[test]
    fn inverted_ranges_are_dropped() {
        let mut forged = state();
        let start = crate::time::parse_instant("2024-02-01T00:00:00Z").unwrap();
        let end = crate::time::parse_instant("2024-01-01T00:00:00Z").unwrap();
        forged.selected_time_range = Some(TimeRange {
            name: crate::time::TimeRangeName::Custom,
            start,
            end,
            interval: crate::time::TimeGrain::Day,
        });
        forged.selected_comparison_time_range = Some(ComparisonTimeRange {
            name: None,
            start,
            end,
        });

        let partial = decode(&encode(&forged).unwrap(), &schema()).unwrap();
        assert_eq!(partial.selected_time_range, None);
        assert_eq!(partial.selected_comparison_time_range, None);
    }

    #[test]
    fn garbage_tokens_are_errors() {
        assert!(matches!(decode("***", &schema()), Err(ProtoError::Base64(_))));
        let not_msgpack = BASE64_URL_SAFE_NO_PAD.encode([0xc1u8, 0x00]);
        assert!(matches!(decode(&not_msgpack, &schema()), Err(ProtoError::Decode(_))));
    }

    #[test]
    fn unknown_fields_are_rejected() {
        #[derive(Serialize)]
        struct Smuggled {
            v: u8,
            admin: bool,
        }
        let bytes = rmp_serde::to_vec_named(&Smuggled { v: 1, admin: true }).unwrap();
        let token = BASE64_URL_SAFE_NO_PAD.encode(bytes);
        assert!(matches!(decode(&token, &schema()), Err(ProtoError::Decode(_))));
    }

    #[test]
    fn future_versions_are_rejected() {
        let bytes = rmp_serde::to_vec_named(&ProtoState {
            v: 9,
            ..Default::default()
        })
        .unwrap();
        let token = BASE64_URL_SAFE_NO_PAD.encode(bytes);
        assert!(matches!(
            decode(&token, &schema()),
            Err(ProtoError::UnsupportedVersion(9))
        ));
    }

    #[test]
    fn query_string_lookup() {
        assert_eq!(
            token_from_query("?view=sales&state=abc%2Ddef", "state").as_deref(),
            Some("abc-def")
        );
        assert_eq!(token_from_query("state=", "state"), None);
        assert_eq!(token_from_query("view=sales", "state"), None);
    }
}
