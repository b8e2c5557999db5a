//! Fuzz target for config.toml loading.
//!
//! Malformed TOML, wrong types, and out-of-range values must come back as
//! errors, never panics.

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use std::fs;
use tempfile::TempDir;

use dashboard_state::config::DashboardConfig;

#[derive(Arbitrary, Debug)]
struct ConfigInput {
    /// Raw TOML content
    toml_content: String,
}

fuzz_target!(|input: ConfigInput| {
    let temp_dir = match TempDir::new() {
        Ok(dir) => dir,
        Err(_) => return,
    };

    let config_path = temp_dir.path().join("config.toml");
    if fs::write(&config_path, &input.toml_content).is_err() {
        return;
    }

    if let Ok(config) = DashboardConfig::load_from(&config_path) {
        assert!(config.validate().is_ok());
        assert!(config.min_chart_points <= config.max_chart_points);
    }
});
