//! DemandIQ Runner — forecast orchestration around `demandiq-core`.
//!
//! This crate provides:
//! - TOML job configuration
//! - Series loading with cache/provider/synthetic fallback
//! - A file-backed series cache keyed by search term
//! - Synthetic weekly series for development
//! - Dashboard KPIs over cached series
//! - Timeout-guarded single and batch forecast execution
//! - JSON/CSV export of forecast outcomes

pub mod cache;
pub mod config;
pub mod data_loader;
pub mod export;
pub mod kpis;
pub mod runner;
pub mod synthetic;

pub use cache::{CacheMeta, CacheStatus, SeriesCache};
pub use config::{ConfigError, JobConfig};
pub use data_loader::{
    import_series_csv, load_series, read_series_csv, write_series_csv, CsvSeriesProvider,
    DataError, DataSource, LoadError, LoadOptions, LoadedSeries, SeriesProvider,
};
pub use export::{export_csv, export_json, import_json, save_artifacts};
pub use kpis::{compute_kpis, DashboardKpis};
pub use runner::{
    load_jobs, run_batch, run_forecast, run_job, run_job_with_provider, ForecastOutcome,
    ForecastRequest, RunError,
};
pub use synthetic::generate_series;
