//! TOML job configuration.
//!
//! ```toml
//! [forecast]
//! keyword = "umbrella"
//! model = "xgboost"
//! horizon_weeks = 52
//! promotion_dates = ["2024-11-29"]
//! timeout_secs = 120
//!
//! [data]
//! cache_dir = "data"
//! synthetic = true
//! ```

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use demandiq_core::{
    ForecastConfig, ForecastError, ModelKind, PromotionSet, TrimPolicy, DEFAULT_HORIZON_WEEKS,
};

/// Model used when a job does not name one.
pub const DEFAULT_MODEL: &str = "prophet";

/// Per-forecast time budget when a job does not set one.
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Default timeframe and region passed to a series provider.
pub const DEFAULT_TIMEFRAME: &str = "today 5-y";
pub const DEFAULT_REGION: &str = "";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),

    #[error("invalid config: {0}")]
    Model(#[from] ForecastError),
}

/// A complete forecast job: what to forecast and where the series comes from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobConfig {
    pub forecast: ForecastSection,
    #[serde(default)]
    pub data: DataSection,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ForecastSection {
    pub keyword: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_horizon")]
    pub horizon_weeks: u32,
    #[serde(default)]
    pub promotion_dates: Vec<NaiveDate>,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub seed: u64,
    #[serde(default)]
    pub trim_policy: TrimPolicy,
    #[serde(default = "default_timeframe")]
    pub timeframe: String,
    #[serde(default)]
    pub region: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DataSection {
    /// Series to import for this job; replaces any cached series for the keyword.
    #[serde(default)]
    pub series_csv: Option<PathBuf>,
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,
    /// Directory of `{keyword}.csv` files consulted on a cache miss.
    #[serde(default)]
    pub provider_dir: Option<PathBuf>,
    /// Fall back to a generated series when no data is available.
    #[serde(default)]
    pub synthetic: bool,
    /// Skip the cache and go straight to the provider.
    #[serde(default)]
    pub force_refresh: bool,
}

impl Default for DataSection {
    fn default() -> Self {
        Self {
            series_csv: None,
            cache_dir: default_cache_dir(),
            provider_dir: None,
            synthetic: false,
            force_refresh: false,
        }
    }
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_horizon() -> u32 {
    DEFAULT_HORIZON_WEEKS
}

fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_timeframe() -> String {
    DEFAULT_TIMEFRAME.to_string()
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from("data")
}

impl JobConfig {
    /// A job for `keyword` with every other setting at its default.
    pub fn new(keyword: impl Into<String>) -> Self {
        Self {
            forecast: ForecastSection {
                keyword: keyword.into(),
                model: default_model(),
                horizon_weeks: DEFAULT_HORIZON_WEEKS,
                promotion_dates: Vec::new(),
                timeout_secs: DEFAULT_TIMEOUT_SECS,
                seed: 0,
                trim_policy: TrimPolicy::default(),
                timeframe: default_timeframe(),
                region: DEFAULT_REGION.to_string(),
            },
            data: DataSection::default(),
        }
    }

    /// Load and validate a job from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Parse and validate a job from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.forecast.keyword.trim().is_empty() {
            return Err(ConfigError::Invalid("keyword must not be empty".into()));
        }
        if self.forecast.horizon_weeks == 0 {
            return Err(ConfigError::Invalid("horizon_weeks must be at least 1".into()));
        }
        if self.forecast.timeout_secs == 0 {
            return Err(ConfigError::Invalid("timeout_secs must be at least 1".into()));
        }
        self.model_kind()?;
        Ok(())
    }

    pub fn model_kind(&self) -> Result<ModelKind, ConfigError> {
        self.forecast
            .model
            .parse()
            .map_err(ConfigError::Model)
    }

    pub fn forecast_config(&self) -> ForecastConfig {
        let promotions: PromotionSet = self.forecast.promotion_dates.iter().copied().collect();
        ForecastConfig::new(self.forecast.horizon_weeks, promotions)
            .with_trim_policy(self.forecast.trim_policy)
            .with_seed(self.forecast.seed)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.forecast.timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_job_uses_defaults() {
        let config = JobConfig::from_toml("[forecast]\nkeyword = \"umbrella\"\n").unwrap();
        assert_eq!(config.forecast.model, "prophet");
        assert_eq!(config.forecast.horizon_weeks, 52);
        assert_eq!(config.forecast.timeout_secs, 120);
        assert_eq!(config.forecast.timeframe, "today 5-y");
        assert_eq!(config.data.cache_dir, PathBuf::from("data"));
        assert!(!config.data.synthetic);
        assert_eq!(config, JobConfig::new("umbrella"));
    }

    #[test]
    fn full_job_parses() {
        let toml = r#"
            [forecast]
            keyword = "Umbrella"
            model = "XGBoost"
            horizon_weeks = 8
            promotion_dates = ["2024-11-29", "2024-12-20"]
            timeout_secs = 30
            seed = 9
            trim_policy = "trailing_horizon"

            [data]
            series_csv = "umbrella.csv"
            cache_dir = "cache"
            synthetic = true
        "#;
        let config = JobConfig::from_toml(toml).unwrap();
        assert_eq!(config.model_kind().unwrap(), ModelKind::TreeEnsemble);
        assert_eq!(config.timeout(), Duration::from_secs(30));

        let forecast = config.forecast_config();
        assert_eq!(forecast.horizon_weeks(), 8);
        assert_eq!(forecast.seed(), 9);
        assert_eq!(forecast.trim_policy(), TrimPolicy::TrailingHorizon);
        assert!(forecast
            .promotion_dates()
            .contains(NaiveDate::from_ymd_opt(2024, 12, 20).unwrap()));
        assert_eq!(config.data.series_csv, Some(PathBuf::from("umbrella.csv")));
    }

    #[test]
    fn invalid_values_are_rejected() {
        let cases = [
            "[forecast]\nkeyword = \"\"\n",
            "[forecast]\nkeyword = \"a\"\nhorizon_weeks = 0\n",
            "[forecast]\nkeyword = \"a\"\ntimeout_secs = 0\n",
        ];
        for case in cases {
            assert!(
                matches!(JobConfig::from_toml(case), Err(ConfigError::Invalid(_))),
                "accepted: {case}"
            );
        }
    }

    #[test]
    fn unknown_model_keeps_the_typed_error() {
        let err = JobConfig::from_toml("[forecast]\nkeyword = \"a\"\nmodel = \"arima\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Model(ForecastError::InvalidModel(ref m)) if m == "arima"));
    }

    #[test]
    fn malformed_toml_is_a_parse_error() {
        assert!(matches!(
            JobConfig::from_toml("[forecast\nkeyword"),
            Err(ConfigError::Parse(_))
        ));
    }
}
