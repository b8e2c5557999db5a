//! Fuzz target for URL state decoding and hydration.
//!
//! Decoding must reject or sanitize anything: unknown fields, names missing
//! from the schema, truncated MessagePack, garbage base64. Whatever is
//! accepted must leave the store in a state that re-encodes cleanly.

#![no_main]

use arbitrary::Arbitrary;
use base64::prelude::*;
use libfuzzer_sys::fuzz_target;

use dashboard_state::dashboard::proto::{decode, encode};
use dashboard_state::dashboard::{DashboardStore, MetricsViewSchema};

#[derive(Arbitrary, Debug)]
struct UrlStateInput {
    /// Raw bytes wrapped as a token (exercises the MessagePack decoder).
    body: Vec<u8>,
    /// Token text used as-is (exercises the base64 layer).
    raw_token: String,
    /// Dimension names for the schema the token is checked against.
    dimensions: Vec<String>,
}

fuzz_target!(|input: UrlStateInput| {
    let schema = MetricsViewSchema::from_names(
        ["revenue", "orders"],
        input.dimensions.iter().take(8).cloned(),
    );
    let store = DashboardStore::default();
    if store.init("fuzz", &schema, None).is_err() {
        return;
    }

    let wrapped = BASE64_URL_SAFE_NO_PAD.encode(&input.body);
    for token in [wrapped.as_str(), input.raw_token.as_str()] {
        let _ = decode(token, &schema);
        if let Ok(Some(state)) = store.sync_from_url("fuzz", token, &schema) {
            assert!(!(state.show_time_comparison && state.selected_comparison_dimension.is_some()));
            assert!(state.filters.include.iter().all(|e| schema.has_dimension(&e.name)));
            for inc in &state.filters.include {
                assert!(state.filters.exclude.iter().all(|exc| exc.name != inc.name));
            }
            for entry in state.filters.include.iter().chain(&state.filters.exclude) {
                let mut values = entry.values.clone();
                values.sort();
                values.dedup();
                assert_eq!(values.len(), entry.values.len());
            }
            assert_eq!(state.dimension_filter_exclude_mode, state.filters.exclude_mode_map());
            if let Some(range) = &state.selected_time_range {
                assert!(range.start <= range.end);
            }
            assert!(encode(&state).is_ok());
        }
    }
});
