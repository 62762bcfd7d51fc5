//! Run configuration, read from a TOML file.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_DB, DEFAULT_FETCH_TIMEOUT_SECS, DEFAULT_FUZZY_MIN_RATIO, DEFAULT_MAX_PARALLEL_FETCHES,
    DEFAULT_MIN_REPORTS, DEFAULT_RATING_DAILY_LIMIT,
};
use crate::errors::ConfigError;

/// Thresholds shared by the archive and the notification matcher.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    /// Minimum similarity (0..=100) for two names to count as the same.
    pub fuzzy_min_ratio: u8,
    /// Reports or verifications needed to flip a serving's state.
    pub min_reports: u32,
    pub rating_daily_limit: u32,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            fuzzy_min_ratio: DEFAULT_FUZZY_MIN_RATIO,
            min_reports: DEFAULT_MIN_REPORTS,
            rating_daily_limit: DEFAULT_RATING_DAILY_LIMIT,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum SourceConfig {
    /// Old speiseplan pages, url contains `{year}` and `{day}`.
    Legacy { url: String },
    Studierendenwerk { url: String, location: u32 },
    Desy {
        url: String,
        #[serde(default)]
        english: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanteenConfig {
    pub name: String,
    #[serde(flatten)]
    pub source: SourceConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database: PathBuf,
    #[serde(flatten)]
    pub thresholds: Thresholds,
    pub fetch_timeout_secs: u64,
    pub max_parallel_fetches: usize,
    pub canteens: Vec<CanteenConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: PathBuf::from(DEFAULT_DB),
            thresholds: Thresholds::default(),
            fetch_timeout_secs: DEFAULT_FETCH_TIMEOUT_SECS,
            max_parallel_fetches: DEFAULT_MAX_PARALLEL_FETCHES,
            canteens: Vec::new(),
        }
    }
}

impl Config {
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        let config = Self::from_toml(&text)?;
        log::info!(
            "Loaded {} canteens from {}",
            config.canteens.len(),
            path.display()
        );
        Ok(config)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.thresholds.fuzzy_min_ratio > 100 {
            return Err(ConfigError::Invalid(format!(
                "fuzzy_min_ratio must be within 0..=100, got {}",
                self.thresholds.fuzzy_min_ratio
            )));
        }
        if self.max_parallel_fetches == 0 {
            return Err(ConfigError::Invalid(
                "max_parallel_fetches must be at least 1".to_string(),
            ));
        }

        let mut names = BTreeSet::new();
        for canteen in &self.canteens {
            if !names.insert(canteen.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "canteen '{}' configured twice",
                    canteen.name
                )));
            }
        }

        Ok(())
    }
}
