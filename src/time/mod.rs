//! Time-grain arithmetic and time-range derivation.
//!
//! # Module structure
//!
//! - [`grain`]: grain flooring and offsetting in an IANA timezone
//! - [`range`]: named ranges, selectable ranges/grains, concrete bounds
//! - [`comparison`]: comparison windows and their defaults
//! - [`transforms`]: period truncation and ISO-8601 offsets
//! - [`format`]: human-readable labels

pub mod comparison;
pub mod format;
pub mod grain;
pub mod range;
pub mod transforms;

pub use comparison::{ComparisonRange, TimeComparisonOption, comparison_range, default_comparison_option};
pub use format::{format_date_by_interval, pretty_format_range, pretty_format_time_range, pretty_time_grain};
pub use grain::{TimeGrain, add_grains, add_grains_utc, floor, floor_utc, parse_instant, parse_timezone, to_iso};
pub use range::{
    ObservedRange, TimeGrainOption, TimeRange, TimeRangeName, default_time_grain,
    default_time_range_name, make_time_range, make_time_range_in, make_time_ranges,
    selectable_time_grains, selectable_time_range_names, selectable_time_ranges,
};
