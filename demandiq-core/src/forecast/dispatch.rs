//! Model-token dispatch over the two forecasting strategies.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::str::FromStr;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::domain::{ForecastConfig, HistoricalPoint, WeeklyForecastPoint};
use crate::model::{SeasonalForecaster, TreeEnsembleForecaster};

use super::deadline::Deadline;
use super::error::ForecastError;

/// Recognized forecasting strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ModelKind {
    SeasonalDecomposition,
    TreeEnsemble,
}

impl ModelKind {
    pub const ALL: [ModelKind; 2] = [ModelKind::SeasonalDecomposition, ModelKind::TreeEnsemble];

    /// Canonical lower-case token.
    pub fn token(&self) -> &'static str {
        match self {
            ModelKind::SeasonalDecomposition => "prophet",
            ModelKind::TreeEnsemble => "xgboost",
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

impl FromStr for ModelKind {
    type Err = ForecastError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "prophet" => Ok(ModelKind::SeasonalDecomposition),
            "xgboost" => Ok(ModelKind::TreeEnsemble),
            _ => Err(ForecastError::InvalidModel(s.to_string())),
        }
    }
}

impl TryFrom<String> for ModelKind {
    type Error = ForecastError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ModelKind> for String {
    fn from(kind: ModelKind) -> Self {
        kind.token().to_string()
    }
}

/// A constructed strategy, owning its copy of the history.
#[derive(Debug, Clone)]
pub enum Forecaster {
    SeasonalDecomposition(SeasonalForecaster),
    TreeEnsemble(TreeEnsembleForecaster),
}

impl Forecaster {
    pub fn new(kind: ModelKind, history: &[HistoricalPoint], config: ForecastConfig) -> Self {
        match kind {
            ModelKind::SeasonalDecomposition => {
                Forecaster::SeasonalDecomposition(SeasonalForecaster::new(history, config))
            }
            ModelKind::TreeEnsemble => {
                Forecaster::TreeEnsemble(TreeEnsembleForecaster::new(history, config))
            }
        }
    }

    pub fn kind(&self) -> ModelKind {
        match self {
            Forecaster::SeasonalDecomposition(_) => ModelKind::SeasonalDecomposition,
            Forecaster::TreeEnsemble(_) => ModelKind::TreeEnsemble,
        }
    }

    pub fn train_and_forecast(
        &self,
        deadline: &Deadline,
    ) -> Result<Vec<WeeklyForecastPoint>, ForecastError> {
        match self {
            Forecaster::SeasonalDecomposition(f) => f.train_and_forecast(deadline),
            Forecaster::TreeEnsemble(f) => f.train_and_forecast(deadline),
        }
    }
}

/// Forecast with no time limit. See [`forecast_with_deadline`].
pub fn forecast(
    model: &str,
    history: &[HistoricalPoint],
    config: &ForecastConfig,
) -> Result<Vec<WeeklyForecastPoint>, ForecastError> {
    forecast_with_deadline(model, history, config, &Deadline::unbounded())
}

/// Resolve `model`, build the strategy and run it under `deadline`.
///
/// An unknown token fails before any computation. Typed strategy errors pass
/// through; panics and non-finite output become `ForecastingFailure`.
pub fn forecast_with_deadline(
    model: &str,
    history: &[HistoricalPoint],
    config: &ForecastConfig,
    deadline: &Deadline,
) -> Result<Vec<WeeklyForecastPoint>, ForecastError> {
    let kind: ModelKind = model.parse()?;
    let forecaster = Forecaster::new(kind, history, config.clone());
    let started = Instant::now();

    let result = panic::catch_unwind(AssertUnwindSafe(|| forecaster.train_and_forecast(deadline)))
        .unwrap_or_else(|payload| Err(ForecastError::ForecastingFailure(panic_message(&payload))));

    let weekly = match result {
        Ok(weekly) => weekly,
        Err(err) => {
            warn!(model = %kind, kind = err.kind(), error = %err, "forecast failed");
            return Err(err);
        }
    };

    if let Some(bad) = weekly.iter().find(|p| !p.predicted_value.is_finite()) {
        return Err(ForecastError::ForecastingFailure(format!(
            "non-finite weekly value for {}",
            bad.week_ending_date
        )));
    }

    info!(
        model = %kind,
        history = history.len(),
        horizon_weeks = config.horizon_weeks(),
        weeks = weekly.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "forecast complete"
    );
    Ok(weekly)
}

fn panic_message(payload: &Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic during model fit".to_string()
    }
}
