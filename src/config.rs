//! Configuration for `dashstate`.
//!
//! Stored as TOML at `$DASHSTATE_CONFIG`, or `dashstate/config.toml` under
//! the platform config directory. A missing file means defaults.
//!
//! # Example Configuration
//!
//! ```toml
//! default_timezone = "America/New_York"
//! url_param = "state"
//! leaderboard_limit = 100
//! max_chart_points = 2500
//! min_chart_points = 2
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::time::parse_timezone;
use crate::time::range::{MAX_POINTS_ON_CHART, MIN_POINTS_ON_CHART};

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV: &str = "DASHSTATE_CONFIG";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Read(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Could not determine config directory")]
    NoConfigDir,

    #[error("Validation error: {0}")]
    Validation(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DashboardConfig {
    /// IANA zone new dashboards start in.
    pub default_timezone: String,

    /// Query parameter carrying the state token.
    pub url_param: String,

    /// Rows requested per leaderboard.
    pub leaderboard_limit: usize,

    /// Chart density bounds used to enable grains.
    pub max_chart_points: i64,
    pub min_chart_points: i64,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            default_timezone: "UTC".to_string(),
            url_param: "state".to_string(),
            leaderboard_limit: 250,
            max_chart_points: MAX_POINTS_ON_CHART,
            min_chart_points: MIN_POINTS_ON_CHART,
        }
    }
}

impl DashboardConfig {
    /// Load from `$DASHSTATE_CONFIG` or the default location.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load from `path`; a missing file yields defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no config file; using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;

        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        self.validate()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        Ok(())
    }

    /// `$DASHSTATE_CONFIG` if set, else the platform config directory.
    pub fn config_path() -> Result<PathBuf, ConfigError> {
        if let Ok(explicit) = dotenvy::var(CONFIG_ENV)
            && !explicit.is_empty()
        {
            return Ok(PathBuf::from(explicit));
        }

        directories::ProjectDirs::from("com", "dashstate", "dashstate")
            .map(|dirs| dirs.config_dir().join("config.toml"))
            .ok_or(ConfigError::NoConfigDir)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if parse_timezone(&self.default_timezone).is_err() {
            return Err(ConfigError::Validation(format!(
                "Unknown timezone: {}",
                self.default_timezone
            )));
        }

        if self.url_param.trim().is_empty() {
            return Err(ConfigError::Validation(
                "url_param cannot be empty".into(),
            ));
        }

        if self.leaderboard_limit == 0 {
            return Err(ConfigError::Validation(
                "leaderboard_limit must be positive".into(),
            ));
        }

        if self.min_chart_points < 1 {
            return Err(ConfigError::Validation(
                "min_chart_points must be positive".into(),
            ));
        }

        if self.min_chart_points > self.max_chart_points {
            return Err(ConfigError::Validation(format!(
                "min_chart_points ({}) exceeds max_chart_points ({})",
                self.min_chart_points, self.max_chart_points
            )));
        }

        Ok(())
    }
}
