use criterion::{BatchSize, Criterion, criterion_group, criterion_main};
use dashboard_state::dashboard::proto::{decode, encode};
use dashboard_state::dashboard::{
    DashboardState, DashboardStore, DimensionValues, MetricsViewSchema, sync_state,
};
use dashboard_state::time::{ObservedRange, selectable_time_ranges};
use std::hint::black_box;

fn wide_schema(measures: usize, dimensions: usize) -> MetricsViewSchema {
    MetricsViewSchema::from_names(
        (0..measures).map(|i| format!("measure_{i}")),
        (0..dimensions).map(|i| format!("dimension_{i}")),
    )
}

fn observed() -> ObservedRange {
    ObservedRange::parse("2022-01-01T00:00:00Z", "2024-01-01T00:00:00Z").expect("observed")
}

fn filtered_state(schema: &MetricsViewSchema) -> DashboardState {
    let mut state =
        DashboardState::from_schema("bench", schema, Some(&observed()), "UTC").expect("state");
    for (i, dimension) in schema.dimension_names().enumerate() {
        let entry = DimensionValues {
            name: dimension.to_string(),
            values: (0..25).map(|v| format!("value-{i}-{v}")).collect(),
        };
        if i % 3 == 0 {
            state.filters.exclude.push(entry);
        } else {
            state.filters.include.push(entry);
        }
    }
    state
}

fn bench_proto(c: &mut Criterion) {
    let schema = wide_schema(40, 60);
    let state = filtered_state(&schema);
    let token = encode(&state).expect("encode");

    c.bench_function("proto_encode_60_filters", |b| {
        b.iter(|| encode(black_box(&state)).expect("encode"))
    });
    c.bench_function("proto_decode_60_filters", |b| {
        b.iter(|| decode(black_box(&token), black_box(&schema)).expect("decode"))
    });
}

fn bench_sync(c: &mut Criterion) {
    let schema = wide_schema(40, 60);
    let shrunk = wide_schema(30, 45);
    let state = filtered_state(&schema);

    c.bench_function("sync_after_schema_shrink", |b| {
        b.iter_batched(
            || state.clone(),
            |mut state| {
                sync_state(&mut state, black_box(&shrunk));
                state
            },
            BatchSize::SmallInput,
        )
    });
}

fn bench_reducers(c: &mut Criterion) {
    let schema = wide_schema(10, 20);
    let store = DashboardStore::default();
    store.init("bench", &schema, Some(&observed())).expect("init");

    c.bench_function("toggle_filter_round_trip", |b| {
        b.iter(|| {
            store.toggle_filter("bench", "dimension_3", black_box("value"));
            store.toggle_filter("bench", "dimension_3", black_box("value"))
        })
    });
    c.bench_function("selectable_time_ranges_two_years", |b| {
        let observed = observed();
        b.iter(|| selectable_time_ranges(Some(black_box(&observed))).expect("ranges"))
    });
}

criterion_group!(state_perf, bench_proto, bench_sync, bench_reducers);
criterion_main!(state_perf);
