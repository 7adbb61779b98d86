//! Series loading and data resolution for the runner.
//!
//! Given a keyword, returns its historical series. Implements the fallback policy:
//! 1. If cached data exists (and no refresh is forced) → use it
//! 2. If a provider is available → fetch, then replace the cached series
//! 3. If no data and synthetic data is enabled → generate a series (tagged)
//! 4. Otherwise → fail with a clear error
//!
//! Synthetic series are a developer-only mode; outcomes built on them carry
//! the `synthetic` flag.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

use demandiq_core::HistoricalPoint;

use crate::cache::SeriesCache;
use crate::config::{DEFAULT_REGION, DEFAULT_TIMEFRAME};
use crate::synthetic::generate_series;

/// Structured errors for series acquisition and storage.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("no data found for the keyword '{keyword}'")]
    NoData { keyword: String },

    #[error("I/O error on {path}: {message}")]
    Io { path: PathBuf, message: String },

    #[error("malformed series file {path}: {message}")]
    Malformed { path: PathBuf, message: String },

    #[error("cache error: {0}")]
    Cache(String),
}

/// Errors from the loading policy.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("no cached or provided data for '{keyword}' (enable synthetic data to generate a mock series)")]
    NoData { keyword: String },

    #[error("no cached data for '{keyword}' and the provider failed: {reason}")]
    ProviderFailed { keyword: String, reason: String },

    #[error("data error: {0}")]
    Data(#[from] DataError),
}

/// Where a series came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataSource {
    Cache,
    Provider,
    CsvImport,
    Synthetic,
}

/// Supplies historical series for a keyword/timeframe/region.
///
/// Must return [`DataError::NoData`] when the upstream has nothing for the
/// keyword, distinctly from transport or format failures.
pub trait SeriesProvider: Send + Sync {
    fn name(&self) -> &str;

    fn fetch(
        &self,
        keyword: &str,
        timeframe: &str,
        region: &str,
    ) -> Result<Vec<HistoricalPoint>, DataError>;
}

/// Provider backed by a directory of `{keyword}.csv` files.
///
/// Timeframe and region are not part of the file layout and are ignored.
#[derive(Debug, Clone)]
pub struct CsvSeriesProvider {
    dir: PathBuf,
}

impl CsvSeriesProvider {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, keyword: &str) -> PathBuf {
        self.dir.join(format!("{}.csv", keyword.trim().to_lowercase()))
    }
}

impl SeriesProvider for CsvSeriesProvider {
    fn name(&self) -> &str {
        "csv"
    }

    fn fetch(
        &self,
        keyword: &str,
        _timeframe: &str,
        _region: &str,
    ) -> Result<Vec<HistoricalPoint>, DataError> {
        let path = self.path_for(keyword);
        if !path.exists() {
            return Err(DataError::NoData {
                keyword: keyword.to_string(),
            });
        }
        let points = read_series_csv(&path)?;
        if points.is_empty() {
            return Err(DataError::NoData {
                keyword: keyword.to_string(),
            });
        }
        Ok(points)
    }
}

/// Read a `date,value` CSV (header required; any header names).
pub fn read_series_csv(path: &Path) -> Result<Vec<HistoricalPoint>, DataError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| DataError::Io {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

    let malformed = |message: String| DataError::Malformed {
        path: path.to_path_buf(),
        message,
    };

    let mut points = Vec::new();
    for (i, record) in reader.records().enumerate() {
        let line = i + 2;
        let record = record.map_err(|e| malformed(format!("line {line}: {e}")))?;
        let (Some(date), Some(value)) = (record.get(0), record.get(1)) else {
            return Err(malformed(format!("line {line}: expected date and value columns")));
        };
        let date = NaiveDate::parse_from_str(date, "%Y-%m-%d")
            .map_err(|e| malformed(format!("line {line}: bad date '{date}': {e}")))?;
        let value: f64 = value
            .parse()
            .map_err(|e| malformed(format!("line {line}: bad value '{value}': {e}")))?;
        points.push(HistoricalPoint::new(date, value));
    }
    Ok(points)
}

/// Write points as a `date,value` CSV.
pub fn write_series_csv(path: &Path, points: &[HistoricalPoint]) -> Result<(), DataError> {
    let io_err = |e: csv::Error| DataError::Io {
        path: path.to_path_buf(),
        message: e.to_string(),
    };
    let mut writer = csv::Writer::from_path(path).map_err(io_err)?;
    writer.write_record(["date", "value"]).map_err(io_err)?;
    for p in points {
        writer
            .write_record([p.date.to_string(), p.value.to_string()])
            .map_err(io_err)?;
    }
    writer.flush().map_err(|e| DataError::Io {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

/// Options controlling how a series is resolved.
#[derive(Debug, Clone)]
pub struct LoadOptions {
    pub timeframe: String,
    pub region: String,
    /// Generate a series when no real data is available.
    pub synthetic: bool,
    /// Skip the cache lookup.
    pub force_refresh: bool,
    /// Date range of a generated series.
    pub synthetic_start: NaiveDate,
    pub synthetic_end: NaiveDate,
}

impl Default for LoadOptions {
    fn default() -> Self {
        let (synthetic_start, synthetic_end) = crate::synthetic::default_range();
        Self {
            timeframe: DEFAULT_TIMEFRAME.to_string(),
            region: DEFAULT_REGION.to_string(),
            synthetic: false,
            force_refresh: false,
            synthetic_start,
            synthetic_end,
        }
    }
}

/// A resolved series and its provenance.
#[derive(Debug, Clone)]
pub struct LoadedSeries {
    pub keyword: String,
    pub points: Vec<HistoricalPoint>,
    pub source: DataSource,
    /// BLAKE3 over the series, for fingerprinting outcomes.
    pub series_hash: String,
}

impl LoadedSeries {
    pub fn new(keyword: &str, points: Vec<HistoricalPoint>, source: DataSource) -> Self {
        let series_hash = series_hash(&points);
        Self {
            keyword: SeriesCache::normalize_keyword(keyword),
            points,
            source,
            series_hash,
        }
    }

    pub fn is_synthetic(&self) -> bool {
        self.source == DataSource::Synthetic
    }
}

/// Resolve the series for `keyword` following the cache → provider → synthetic policy.
pub fn load_series(
    keyword: &str,
    cache: &SeriesCache,
    provider: Option<&dyn SeriesProvider>,
    opts: &LoadOptions,
) -> Result<LoadedSeries, LoadError> {
    // Step 1: cache
    if !opts.force_refresh {
        match cache.load(keyword) {
            Ok(Some(points)) if !points.is_empty() => {
                debug!(keyword, points = points.len(), "series served from cache");
                return Ok(LoadedSeries::new(keyword, points, DataSource::Cache));
            }
            Ok(_) => {}
            Err(e) => warn!(keyword, error = %e, "cache lookup failed"),
        }
    }

    // Step 2: provider
    let mut provider_failure = None;
    if let Some(provider) = provider {
        match provider.fetch(keyword, &opts.timeframe, &opts.region) {
            Ok(points) if !points.is_empty() => {
                cache.store(keyword, &points, provider.name())?;
                info!(keyword, provider = provider.name(), points = points.len(), "series fetched");
                return Ok(LoadedSeries::new(keyword, points, DataSource::Provider));
            }
            Ok(_) | Err(DataError::NoData { .. }) => {
                debug!(keyword, provider = provider.name(), "provider has no data");
            }
            Err(e) => {
                warn!(keyword, provider = provider.name(), error = %e, "provider fetch failed");
                provider_failure = Some(e.to_string());
            }
        }
    }

    // Step 3: synthetic fallback
    if opts.synthetic {
        warn!(keyword, "generating synthetic series; results will be tagged as synthetic");
        let points = generate_series(keyword, opts.synthetic_start, opts.synthetic_end);
        return Ok(LoadedSeries::new(keyword, points, DataSource::Synthetic));
    }

    // Step 4: fail
    match provider_failure {
        Some(reason) => Err(LoadError::ProviderFailed {
            keyword: keyword.to_string(),
            reason,
        }),
        None => Err(LoadError::NoData {
            keyword: keyword.to_string(),
        }),
    }
}

/// Import a CSV series for `keyword`, replacing whatever the cache held.
pub fn import_series_csv(
    keyword: &str,
    path: &Path,
    cache: &SeriesCache,
) -> Result<LoadedSeries, DataError> {
    let points = read_series_csv(path)?;
    if points.is_empty() {
        return Err(DataError::NoData {
            keyword: keyword.to_string(),
        });
    }
    cache.store(keyword, &points, "csv")?;
    Ok(LoadedSeries::new(keyword, points, DataSource::CsvImport))
}

/// Deterministic BLAKE3 hash over dates and values.
pub fn series_hash(points: &[HistoricalPoint]) -> String {
    let mut hasher = blake3::Hasher::new();
    for p in points {
        hasher.update(p.date.to_string().as_bytes());
        hasher.update(&p.value.to_le_bytes());
    }
    hasher.finalize().to_hex().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn points() -> Vec<HistoricalPoint> {
        vec![
            HistoricalPoint::new(d(2024, 1, 7), 40),
            HistoricalPoint::new(d(2024, 1, 14), 55),
        ]
    }

    /// Provider returning a fixed result and counting calls.
    struct FixedProvider {
        result: fn() -> Result<Vec<HistoricalPoint>, DataError>,
        calls: AtomicUsize,
    }

    impl FixedProvider {
        fn new(result: fn() -> Result<Vec<HistoricalPoint>, DataError>) -> Self {
            Self {
                result,
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl SeriesProvider for FixedProvider {
        fn name(&self) -> &str {
            "fixed"
        }

        fn fetch(&self, _: &str, _: &str, _: &str) -> Result<Vec<HistoricalPoint>, DataError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            (self.result)()
        }
    }

    #[test]
    fn csv_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("series.csv");
        write_series_csv(&path, &points()).unwrap();
        assert_eq!(read_series_csv(&path).unwrap(), points());
    }

    #[test]
    fn malformed_csv_names_the_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.csv");
        std::fs::write(&path, "date,value\n2024-01-07,40\n2024-13-01,5\n").unwrap();
        let err = read_series_csv(&path).unwrap_err();
        assert!(err.to_string().contains("line 3"), "{err}");
    }

    #[test]
    fn csv_provider_reports_missing_keyword_as_no_data() {
        let dir = tempfile::tempdir().unwrap();
        let provider = CsvSeriesProvider::new(dir.path());
        let err = provider.fetch("umbrella", DEFAULT_TIMEFRAME, "").unwrap_err();
        assert!(matches!(err, DataError::NoData { .. }));
    }

    #[test]
    fn cache_hit_skips_provider() {
        let dir = tempfile::tempdir().unwrap();
        let cache = SeriesCache::new(dir.path());
        cache.store("umbrella", &points(), "test").unwrap();
        let provider = FixedProvider::new(|| Ok(vec![]));

        let loaded = load_series("Umbrella", &cache, Some(&provider), &LoadOptions::default()).unwrap();
        assert_eq!(loaded.source, DataSource::Cache);
        assert_eq!(loaded.points, points());
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn provider_result_is_cached() {
        let dir = tempfile::tempdir().unwrap();
        let cache = SeriesCache::new(dir.path());
        let provider = FixedProvider::new(|| Ok(points()));

        let loaded = load_series("umbrella", &cache, Some(&provider), &LoadOptions::default()).unwrap();
        assert_eq!(loaded.source, DataSource::Provider);
        assert_eq!(cache.load("umbrella").unwrap(), Some(points()));
    }

    #[test]
    fn force_refresh_bypasses_cache() {
        let dir = tempfile::tempdir().unwrap();
        let cache = SeriesCache::new(dir.path());
        cache.store("umbrella", &points()[..1], "old").unwrap();
        let provider = FixedProvider::new(|| Ok(points()));
        let opts = LoadOptions {
            force_refresh: true,
            ..LoadOptions::default()
        };

        let loaded = load_series("umbrella", &cache, Some(&provider), &opts).unwrap();
        assert_eq!(loaded.points.len(), 2);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn synthetic_fallback_is_tagged() {
        let dir = tempfile::tempdir().unwrap();
        let cache = SeriesCache::new(dir.path());
        let opts = LoadOptions {
            synthetic: true,
            ..LoadOptions::default()
        };

        let loaded = load_series("umbrella", &cache, None, &opts).unwrap();
        assert!(loaded.is_synthetic());
        assert!(!loaded.points.is_empty());
        // Synthetic series are never written to the cache.
        assert_eq!(cache.load("umbrella").unwrap(), None);
    }

    #[test]
    fn missing_data_is_distinct_from_provider_failure() {
        let dir = tempfile::tempdir().unwrap();
        let cache = SeriesCache::new(dir.path());

        let none = FixedProvider::new(|| Err(DataError::NoData { keyword: "x".into() }));
        let err = load_series("x", &cache, Some(&none), &LoadOptions::default()).unwrap_err();
        assert!(matches!(err, LoadError::NoData { .. }));

        let broken = FixedProvider::new(|| Err(DataError::Cache("unreachable".into())));
        let err = load_series("x", &cache, Some(&broken), &LoadOptions::default()).unwrap_err();
        assert!(matches!(err, LoadError::ProviderFailed { .. }));
    }

    #[test]
    fn series_hash_tracks_content() {
        let a = series_hash(&points());
        assert_eq!(a, series_hash(&points()));
        assert_ne!(a, series_hash(&points()[..1]));
    }
}
