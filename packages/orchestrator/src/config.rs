//! The `site_forecast.toml` configuration document.
//!
//! Every option has a default, so an empty document is valid. The
//! configuration is validated once, when an orchestrator is built.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use site_forecast_analytics::{AnalyticsConfig, AnalyticsError};
use site_forecast_expansion::{ExpansionConfig, InvalidExpansionConfig};
use thiserror::Error;

use crate::retry::RetryPolicy;

/// Environment variable naming the configuration file.
pub const CONFIG_ENV_VAR: &str = "SITE_FORECAST_CONFIG";

/// Errors loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("Failed to read {path}: {source}")]
    Io {
        /// Path that was read.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The document is not valid TOML of the expected shape.
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// The configuration could not be rendered as TOML.
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// `[analytics]` failed validation.
    #[error(transparent)]
    Analytics(#[from] AnalyticsError),

    /// `[expansion]` failed validation.
    #[error(transparent)]
    Expansion(#[from] InvalidExpansionConfig),

    /// `[run]` failed validation.
    #[error("Invalid run configuration: {message}")]
    Invalid {
        /// Description of what went wrong.
        message: String,
    },
}

/// Root configuration document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// `[analytics]`
    pub analytics: AnalyticsConfig,
    /// `[expansion]`
    pub expansion: ExpansionConfig,
    /// `[run]`
    pub run: RunConfig,
}

/// Run-level timeouts, fallback size and retry policy (`[run]`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Bound on each reasoning attempt, in seconds.
    pub reasoning_timeout_secs: f64,
    /// Bound on the collection call, in seconds.
    pub collection_timeout_secs: f64,
    /// Most predictions produced by the rule-based fallback, and most
    /// requested from the reasoning stage.
    pub fallback_limit: usize,
    /// `[run.retry]`
    pub retry: RetryPolicy,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            reasoning_timeout_secs: 60.0,
            collection_timeout_secs: 120.0,
            fallback_limit: 10,
            retry: RetryPolicy::default(),
        }
    }
}

fn seconds(name: &str, value: f64) -> Result<Duration, ConfigError> {
    if value <= 0.0 {
        return Err(ConfigError::Invalid {
            message: format!("run.{name} must be positive, got {value}"),
        });
    }
    Duration::try_from_secs_f64(value).map_err(|e| ConfigError::Invalid {
        message: format!("run.{name} is not a usable duration: {e}"),
    })
}

impl RunConfig {
    /// Bound on each reasoning attempt. Falls back to the default when
    /// the configured value is unusable; [`Config::validate`] rejects
    /// such values up front.
    #[must_use]
    pub fn reasoning_timeout(&self) -> Duration {
        seconds("reasoning_timeout_secs", self.reasoning_timeout_secs)
            .unwrap_or(Duration::from_secs(60))
    }

    /// Bound on the collection call.
    #[must_use]
    pub fn collection_timeout(&self) -> Duration {
        seconds("collection_timeout_secs", self.collection_timeout_secs)
            .unwrap_or(Duration::from_secs(120))
    }

    fn validate(&self) -> Result<(), ConfigError> {
        seconds("reasoning_timeout_secs", self.reasoning_timeout_secs)?;
        seconds("collection_timeout_secs", self.collection_timeout_secs)?;
        if self.fallback_limit == 0 {
            return Err(ConfigError::Invalid {
                message: "run.fallback_limit must be at least 1".to_string(),
            });
        }
        self.retry.validate().map_err(|message| ConfigError::Invalid { message })
    }
}

impl Config {
    /// Parses a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] if the document is malformed.
    pub fn from_toml_str(toml_str: &str) -> Result<Self, ConfigError> {
        Ok(toml::de::from_str(toml_str)?)
    }

    /// Reads and parses a configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        log::info!("Loaded configuration from {}", path.display());
        Self::from_toml_str(&text)
    }

    /// Loads `path` if given, else the file named by
    /// `SITE_FORECAST_CONFIG`, else the defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a named file cannot be read or parsed.
    pub fn resolve(path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = path {
            return Self::load(path);
        }
        match std::env::var_os(CONFIG_ENV_VAR) {
            Some(path) => Self::load(Path::new(&path)),
            None => {
                log::debug!("No configuration file; using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Checks every section.
    ///
    /// # Errors
    ///
    /// Returns the first validation failure found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.analytics.validate()?;
        self.expansion.validate()?;
        self.run.validate()
    }

    /// Renders the configuration as a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Serialize`] if rendering fails.
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_is_the_default() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config, Config::default());
        config.validate().unwrap();
        assert_eq!(config.run.reasoning_timeout(), Duration::from_secs(60));
    }

    #[test]
    fn nested_sections_override_defaults() {
        let config = Config::from_toml_str(
            r#"
            [analytics.saturation]
            own_density_weight = 0.7
            competitor_weight = 0.3

            [analytics.cost]
            land_cost_per_acre = 250000.0

            [analytics.synergy]
            anchor_brands = ["Target", "Trader Joe's"]

            [expansion]
            mature_store_count = 150

            [run]
            reasoning_timeout_secs = 0.5

            [run.retry]
            max_retries = 4
            "#,
        )
        .unwrap();

        config.validate().unwrap();
        assert!((config.analytics.saturation.own_density_weight - 0.7).abs() < f64::EPSILON);
        assert!((config.analytics.cost.land_cost_per_acre - 250_000.0).abs() < f64::EPSILON);
        assert!((config.analytics.cost.construction_cost_per_sqft - 200.0).abs() < f64::EPSILON);
        assert_eq!(config.analytics.synergy.anchor_brands.len(), 2);
        assert_eq!(config.expansion.mature_store_count, 150);
        assert_eq!(config.run.reasoning_timeout(), Duration::from_millis(500));
        assert_eq!(config.run.retry.max_retries, 4);
        assert_eq!(config.run.fallback_limit, 10);
    }

    #[test]
    fn validation_reports_the_failing_section() {
        let mut config = Config::default();
        config.analytics.parcels.min_acreage = 40.0;
        assert!(matches!(config.validate(), Err(ConfigError::Analytics(_))));

        let mut config = Config::default();
        config.expansion.saturated_density_per_100k = 1.0;
        assert!(matches!(config.validate(), Err(ConfigError::Expansion(_))));

        let mut config = Config::default();
        config.run.reasoning_timeout_secs = 0.0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid { .. })));

        let mut config = Config::default();
        config.run.collection_timeout_secs = f64::INFINITY;
        assert!(config.validate().is_err());
    }

    #[test]
    fn unknown_types_fail_to_parse() {
        assert!(matches!(
            Config::from_toml_str("[run]\nfallback_limit = \"ten\""),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn default_document_round_trips() {
        let rendered = Config::default().to_toml_string().unwrap();
        assert!(rendered.contains("[analytics.saturation]"));
        assert!(rendered.contains("[run.retry]"));
        assert_eq!(Config::from_toml_str(&rendered).unwrap(), Config::default());
    }

    #[test]
    fn load_reads_files_and_reports_missing_ones() {
        let tmp = std::env::temp_dir().join("site_forecast_config_test.toml");
        std::fs::write(&tmp, "[run]\nfallback_limit = 3\n").unwrap();
        assert_eq!(Config::resolve(Some(&tmp)).unwrap().run.fallback_limit, 3);
        std::fs::remove_file(&tmp).unwrap();

        assert!(matches!(
            Config::load(&tmp),
            Err(ConfigError::Io { .. })
        ));
    }
}
