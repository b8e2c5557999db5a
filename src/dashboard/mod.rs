//! Dashboard state: data model, reducer store, schema sync and URL state.
//!
//! # Module structure
//!
//! - [`types`]: state, filters, sort and context-column types, schema
//! - [`store`]: [`DashboardStore`] and its reducers
//! - [`sync`]: repairs state after a schema change
//! - [`proto`]: URL state token encode/decode
//! - [`selectors`]: derived read-only views
//! - [`query`]: toplist and time-series query parameters
//! - [`errors`]: error taxonomy

pub mod errors;
pub mod proto;
pub mod query;
pub mod selectors;
pub mod store;
pub mod sync;
pub mod types;

pub use errors::{DashboardError, DashboardResult, ProtoError};
pub use proto::PartialDashboardState;
pub use selectors::{DashboardSelectors, TimeControls};
pub use store::{DashboardStore, ListenerId};
pub use sync::sync_state;
pub use types::{
    ComparisonTimeRange, DashboardState, DimensionSpec, DimensionValues, FilterMode, Filters,
    LeaderboardContextColumn, MeasureSpec, MetricsViewSchema, ScrubRange, SortDirection,
    SortType, sort_type_for_context_column_type,
};
