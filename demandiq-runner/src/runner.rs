//! Forecast runner — wires together series loading, the core dispatcher and timeouts.
//!
//! Three entry points:
//! - `run_forecast()`: forecasts a pre-loaded series on a worker thread with a hard timeout.
//! - `run_job()`: resolves the series for a [`JobConfig`], then runs. Used by the CLI.
//! - `run_batch()`: runs many jobs in parallel, preserving input order.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::{Duration, Instant};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use demandiq_core::{
    forecast_with_deadline, Deadline, ForecastConfig, ForecastError, HistoricalPoint, ModelKind,
    WeeklyForecastPoint,
};

use crate::cache::SeriesCache;
use crate::config::{ConfigError, JobConfig};
use crate::data_loader::{
    import_series_csv, load_series, series_hash, CsvSeriesProvider, DataError, LoadError,
    LoadOptions, SeriesProvider,
};

/// Errors from the runner.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("data error: {0}")]
    Load(#[from] LoadError),
    #[error("data error: {0}")]
    Data(#[from] DataError),
    #[error(transparent)]
    Forecast(#[from] ForecastError),
    #[error("forecast worker failed: {0}")]
    Worker(String),
}

impl RunError {
    /// The core error, when the failure came from the forecast itself.
    pub fn forecast_error(&self) -> Option<&ForecastError> {
        match self {
            RunError::Forecast(e) | RunError::Config(ConfigError::Model(e)) => Some(e),
            _ => None,
        }
    }
}

/// Current schema version for persisted outcomes.
pub const SCHEMA_VERSION: u32 = 1;

/// What to forecast.
#[derive(Debug, Clone)]
pub struct ForecastRequest {
    pub keyword: String,
    pub model: ModelKind,
    pub config: ForecastConfig,
}

/// Complete result of one forecast.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ForecastOutcome {
    /// Schema version for forward-compatible deserialization.
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub keyword: String,
    pub model: ModelKind,
    pub horizon_weeks: u32,
    pub points: Vec<WeeklyForecastPoint>,
    pub history_len: usize,
    pub series_hash: String,
    pub elapsed_ms: u64,
    pub synthetic: bool,
}

fn default_schema_version() -> u32 {
    SCHEMA_VERSION
}

/// Forecast `history` on a dedicated worker thread, waiting at most `timeout`.
///
/// The worker also observes the budget cooperatively; when the wait expires
/// its cancellation flag is raised and `TimeoutExceeded` is returned without
/// waiting for it to wind down.
pub fn run_forecast(
    request: &ForecastRequest,
    history: &[HistoricalPoint],
    timeout: Duration,
) -> Result<ForecastOutcome, RunError> {
    let started = Instant::now();
    let cancel = Arc::new(AtomicBool::new(false));
    let deadline = Deadline::after(timeout).with_cancel_flag(Arc::clone(&cancel));

    let (tx, rx) = mpsc::channel();
    let owned_history = history.to_vec();
    let config = request.config.clone();
    let model = request.model;
    thread::Builder::new()
        // Keywords may hold bytes a thread name cannot (NUL), so the name is fixed.
        .name("forecast-worker".into())
        .spawn(move || {
            let result = forecast_with_deadline(model.token(), &owned_history, &config, &deadline);
            // The receiver is gone once the runner has timed out.
            let _ = tx.send(result);
        })
        .map_err(|e| RunError::Worker(format!("failed to spawn worker: {e}")))?;

    let points = match rx.recv_timeout(timeout) {
        Ok(result) => result?,
        Err(mpsc::RecvTimeoutError::Timeout) => {
            cancel.store(true, Ordering::Relaxed);
            warn!(keyword = %request.keyword, model = %model, timeout_ms = timeout.as_millis() as u64, "forecast timed out");
            return Err(ForecastError::TimeoutExceeded {
                limit_ms: timeout.as_millis() as u64,
                stage: "forecast worker".into(),
            }
            .into());
        }
        Err(mpsc::RecvTimeoutError::Disconnected) => {
            return Err(RunError::Worker("worker exited without a result".into()));
        }
    };

    let elapsed_ms = started.elapsed().as_millis() as u64;
    info!(keyword = %request.keyword, model = %model, weeks = points.len(), elapsed_ms, "forecast finished");

    Ok(ForecastOutcome {
        schema_version: SCHEMA_VERSION,
        keyword: request.keyword.clone(),
        model,
        horizon_weeks: request.config.horizon_weeks(),
        points,
        history_len: history.len(),
        series_hash: series_hash(history),
        elapsed_ms,
        synthetic: false,
    })
}

/// Resolve the series for `config` and forecast it.
///
/// A configured `series_csv` is imported first (replacing the cached series);
/// otherwise the cache → provider → synthetic policy applies, with a
/// [`CsvSeriesProvider`] over `provider_dir` when one is configured.
pub fn run_job(config: &JobConfig) -> Result<ForecastOutcome, RunError> {
    let provider = config.data.provider_dir.as_deref().map(CsvSeriesProvider::new);
    run_job_with_provider(
        config,
        provider.as_ref().map(|p| p as &dyn SeriesProvider),
    )
}

/// [`run_job`] with an explicit provider.
pub fn run_job_with_provider(
    config: &JobConfig,
    provider: Option<&dyn SeriesProvider>,
) -> Result<ForecastOutcome, RunError> {
    config.validate()?;
    let keyword = &config.forecast.keyword;
    let cache = SeriesCache::new(&config.data.cache_dir);

    let series = match &config.data.series_csv {
        Some(path) => import_series_csv(keyword, path, &cache)?,
        None => {
            let opts = LoadOptions {
                timeframe: config.forecast.timeframe.clone(),
                region: config.forecast.region.clone(),
                synthetic: config.data.synthetic,
                force_refresh: config.data.force_refresh,
                ..LoadOptions::default()
            };
            load_series(keyword, &cache, provider, &opts)?
        }
    };

    let request = ForecastRequest {
        keyword: series.keyword.clone(),
        model: config.model_kind()?,
        config: config.forecast_config(),
    };
    let mut outcome = run_forecast(&request, &series.points, config.timeout())?;
    outcome.synthetic = series.is_synthetic();
    Ok(outcome)
}

/// Run every job in parallel. Results come back in input order.
pub fn run_batch(jobs: &[JobConfig]) -> Vec<Result<ForecastOutcome, RunError>> {
    jobs.par_iter().map(run_job).collect()
}

/// Load jobs from TOML files, one job per file.
pub fn load_jobs<P: AsRef<Path>>(paths: &[P]) -> Result<Vec<JobConfig>, ConfigError> {
    paths.iter().map(|p| JobConfig::from_file(p.as_ref())).collect()
}
