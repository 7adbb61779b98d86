//! File-backed series cache keyed by search term.
//!
//! Layout: `{cache_dir}/term={keyword}/series.json` plus `meta.json`
//!
//! Features:
//! - Keywords are trimmed and lower-cased, so "Umbrella" and "umbrella" share an entry
//! - Replace-on-write: storing a series discards the previous one for that term
//! - Atomic writes (write to a unique .tmp, rename into place)
//! - `series.json` carries the BLAKE3 hash of its own points, so a load never
//!   pairs a series with another write's hash; `meta.json` is for listing only
//! - Quarantine for corrupt files (`{filename}.quarantined`)

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::warn;

use demandiq_core::HistoricalPoint;

use crate::data_loader::DataError;

const SERIES_FILE: &str = "series.json";
const META_FILE: &str = "meta.json";

static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// On-disk form of `series.json`. `points` is kept as the exact bytes that
/// were hashed.
#[derive(Serialize, Deserialize)]
struct StoredSeries {
    data_hash: String,
    points: Box<RawValue>,
}

/// Metadata sidecar for a cached term.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CacheMeta {
    pub keyword: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub point_count: usize,
    pub data_hash: String,
    pub source: String,
    pub cached_at: chrono::NaiveDateTime,
}

/// Summary row for `cache status`.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CacheStatus {
    pub keyword: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub point_count: usize,
    pub source: String,
}

#[derive(Debug, Clone)]
pub struct SeriesCache {
    cache_dir: PathBuf,
}

impl SeriesCache {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
        }
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Canonical form of a search term.
    pub fn normalize_keyword(keyword: &str) -> String {
        keyword.trim().to_lowercase()
    }

    /// Directory for a term. Characters outside `[a-z0-9_-]` are percent-encoded
    /// so every keyword maps to a single, distinct path component.
    fn term_dir(&self, keyword: &str) -> PathBuf {
        let mut name = String::from("term=");
        for byte in Self::normalize_keyword(keyword).bytes() {
            match byte {
                b'a'..=b'z' | b'0'..=b'9' | b'_' | b'-' => name.push(byte as char),
                other => name.push_str(&format!("%{other:02X}")),
            }
        }
        self.cache_dir.join(name)
    }

    /// Store `points` for `keyword`, replacing any previous series.
    pub fn store(
        &self,
        keyword: &str,
        points: &[HistoricalPoint],
        source: &str,
    ) -> Result<CacheMeta, DataError> {
        let dates = || points.iter().map(|p| p.date);
        let (Some(start_date), Some(end_date)) = (dates().min(), dates().max()) else {
            return Err(DataError::Cache("no points to cache".into()));
        };

        let dir = self.term_dir(keyword);
        fs::create_dir_all(&dir)
            .map_err(|e| DataError::Cache(format!("failed to create dir: {e}")))?;

        let points_json = serde_json::to_string(points)
            .map_err(|e| DataError::Cache(format!("series serialization: {e}")))?;
        let data_hash = blake3::hash(points_json.as_bytes()).to_hex().to_string();
        let stored = StoredSeries {
            data_hash: data_hash.clone(),
            points: RawValue::from_string(points_json)
                .map_err(|e| DataError::Cache(format!("series serialization: {e}")))?,
        };
        let series_json = serde_json::to_vec(&stored)
            .map_err(|e| DataError::Cache(format!("series serialization: {e}")))?;
        write_atomic(&dir.join(SERIES_FILE), &series_json)?;

        let meta = CacheMeta {
            keyword: Self::normalize_keyword(keyword),
            start_date,
            end_date,
            point_count: points.len(),
            data_hash,
            source: source.to_string(),
            cached_at: chrono::Local::now().naive_local(),
        };
        let meta_json = serde_json::to_vec_pretty(&meta)
            .map_err(|e| DataError::Cache(format!("meta serialization: {e}")))?;
        write_atomic(&dir.join(META_FILE), &meta_json)?;

        Ok(meta)
    }

    /// Cached series for `keyword`, or `None` when absent or quarantined.
    pub fn load(&self, keyword: &str) -> Result<Option<Vec<HistoricalPoint>>, DataError> {
        let path = self.term_dir(keyword).join(SERIES_FILE);
        if !path.exists() {
            return Ok(None);
        }

        let bytes = fs::read(&path).map_err(|e| DataError::Io {
            path: path.clone(),
            message: e.to_string(),
        })?;

        let stored: StoredSeries = match serde_json::from_slice(&bytes) {
            Ok(stored) => stored,
            Err(e) => {
                quarantine(&path, &format!("unreadable series: {e}"));
                return Ok(None);
            }
        };
        if stored.data_hash != blake3::hash(stored.points.get().as_bytes()).to_hex().as_str() {
            quarantine(&path, "content hash does not match stored points");
            return Ok(None);
        }
        let points: Vec<HistoricalPoint> = match serde_json::from_str(stored.points.get()) {
            Ok(points) => points,
            Err(e) => {
                quarantine(&path, &format!("unreadable points: {e}"));
                return Ok(None);
            }
        };

        Ok(Some(points))
    }

    pub fn meta(&self, keyword: &str) -> Option<CacheMeta> {
        let content = fs::read_to_string(self.term_dir(keyword).join(META_FILE)).ok()?;
        serde_json::from_str(&content).ok()
    }

    pub fn contains(&self, keyword: &str) -> bool {
        self.term_dir(keyword).join(SERIES_FILE).exists()
    }

    /// Drop the cached series for `keyword`, if any.
    pub fn remove(&self, keyword: &str) -> Result<(), DataError> {
        let dir = self.term_dir(keyword);
        if dir.exists() {
            fs::remove_dir_all(&dir)
                .map_err(|e| DataError::Cache(format!("failed to remove {}: {e}", dir.display())))?;
        }
        Ok(())
    }

    /// Metadata of every cached term, sorted by keyword.
    pub fn status(&self) -> Result<Vec<CacheStatus>, DataError> {
        if !self.cache_dir.exists() {
            return Ok(Vec::new());
        }
        let entries = fs::read_dir(&self.cache_dir)
            .map_err(|e| DataError::Cache(format!("read dir: {e}")))?;

        let mut rows = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| DataError::Cache(format!("dir entry: {e}")))?;
            let path = entry.path();
            let is_term = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with("term="));
            if !is_term || !path.join(SERIES_FILE).exists() {
                continue;
            }
            let Some(meta) = fs::read_to_string(path.join(META_FILE))
                .ok()
                .and_then(|c| serde_json::from_str::<CacheMeta>(&c).ok())
            else {
                warn!(dir = %path.display(), "cached term has no readable metadata");
                continue;
            };
            rows.push(CacheStatus {
                keyword: meta.keyword,
                start_date: meta.start_date,
                end_date: meta.end_date,
                point_count: meta.point_count,
                source: meta.source,
            });
        }
        rows.sort_by(|a, b| a.keyword.cmp(&b.keyword));
        Ok(rows)
    }

    /// Every cached keyword, sorted.
    pub fn keywords(&self) -> Result<Vec<String>, DataError> {
        Ok(self.status()?.into_iter().map(|s| s.keyword).collect())
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), DataError> {
    // Unique per write; concurrent stores of one term must not share a tmp file.
    let tmp_path = path.with_extension(format!(
        "json.{}.{}.tmp",
        std::process::id(),
        TMP_COUNTER.fetch_add(1, Ordering::Relaxed)
    ));
    fs::write(&tmp_path, bytes)
        .map_err(|e| DataError::Cache(format!("write {}: {e}", tmp_path.display())))?;
    fs::rename(&tmp_path, path).map_err(|e| {
        let _ = fs::remove_file(&tmp_path);
        DataError::Cache(format!("atomic rename failed: {e}"))
    })
}

fn quarantine(path: &Path, reason: &str) {
    let target = path.with_extension("json.quarantined");
    warn!(file = %path.display(), reason, "quarantining corrupt cache file");
    if let Err(e) = fs::rename(path, &target) {
        warn!(file = %path.display(), error = %e, "quarantine rename failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn series(values: &[f64]) -> Vec<HistoricalPoint> {
        values
            .iter()
            .enumerate()
            .map(|(i, v)| HistoricalPoint::new(d(2024, 1, 5) + chrono::Duration::weeks(i as i64), *v))
            .collect()
    }

    #[test]
    fn store_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let cache = SeriesCache::new(dir.path());
        let meta = cache.store("Umbrella", &series(&[1.0, 2.0, 3.0]), "csv").unwrap();

        assert_eq!(meta.keyword, "umbrella");
        assert_eq!(meta.point_count, 3);
        assert_eq!(meta.start_date, d(2024, 1, 5));
        assert_eq!(meta.end_date, d(2024, 1, 19));
        assert!(cache.contains("UMBRELLA"));
        assert_eq!(cache.load(" umbrella ").unwrap(), Some(series(&[1.0, 2.0, 3.0])));
    }

    #[test]
    fn store_replaces_previous_series() {
        let dir = tempfile::tempdir().unwrap();
        let cache = SeriesCache::new(dir.path());
        cache.store("umbrella", &series(&[1.0, 2.0, 3.0]), "csv").unwrap();
        cache.store("umbrella", &series(&[9.0]), "csv").unwrap();

        assert_eq!(cache.load("umbrella").unwrap(), Some(series(&[9.0])));
        assert_eq!(cache.meta("umbrella").unwrap().point_count, 1);
    }

    #[test]
    fn empty_series_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let cache = SeriesCache::new(dir.path());
        assert!(cache.store("umbrella", &[], "csv").is_err());
        assert!(!cache.contains("umbrella"));
    }

    #[test]
    fn corrupt_series_is_quarantined() {
        let dir = tempfile::tempdir().unwrap();
        let cache = SeriesCache::new(dir.path());
        cache.store("umbrella", &series(&[1.0]), "csv").unwrap();

        let path = cache.term_dir("umbrella").join(SERIES_FILE);
        fs::write(&path, b"{not json").unwrap();

        assert_eq!(cache.load("umbrella").unwrap(), None);
        assert!(!path.exists());
        assert!(path.with_extension("json.quarantined").exists());
    }

    #[test]
    fn tampered_series_fails_hash_check() {
        let dir = tempfile::tempdir().unwrap();
        let cache = SeriesCache::new(dir.path());
        cache.store("umbrella", &series(&[1.0, 2.0]), "csv").unwrap();

        let path = cache.term_dir("umbrella").join(SERIES_FILE);
        let mut doc: serde_json::Value = serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
        doc["points"] = serde_json::to_value(series(&[5.0, 6.0])).unwrap();
        fs::write(&path, serde_json::to_vec(&doc).unwrap()).unwrap();

        assert_eq!(cache.load("umbrella").unwrap(), None);
        assert!(path.with_extension("json.quarantined").exists());
    }

    #[test]
    fn stale_meta_does_not_reject_a_fresh_series() {
        let dir = tempfile::tempdir().unwrap();
        let cache = SeriesCache::new(dir.path());
        cache.store("umbrella", &series(&[1.0, 2.0]), "csv").unwrap();
        let old_meta = fs::read(cache.term_dir("umbrella").join(META_FILE)).unwrap();

        cache.store("umbrella", &series(&[7.0]), "csv").unwrap();
        fs::write(cache.term_dir("umbrella").join(META_FILE), old_meta).unwrap();

        assert_eq!(cache.load("umbrella").unwrap(), Some(series(&[7.0])));
    }

    #[test]
    fn concurrent_store_and_load_never_lose_the_series() {
        let dir = tempfile::tempdir().unwrap();
        let cache = SeriesCache::new(dir.path());
        let short = series(&[1.0, 2.0]);
        let long = series(&[3.0, 4.0, 5.0, 6.0]);
        cache.store("umbrella", &short, "csv").unwrap();

        std::thread::scope(|scope| {
            let writer = scope.spawn(|| {
                for i in 0..500 {
                    let next = if i % 2 == 0 { &long } else { &short };
                    cache.store("umbrella", next, "csv").unwrap();
                }
            });
            let reader = scope.spawn(|| {
                for _ in 0..500 {
                    let loaded = cache.load("umbrella").unwrap();
                    assert!(
                        loaded.as_ref() == Some(&short) || loaded.as_ref() == Some(&long),
                        "load returned {loaded:?}"
                    );
                }
            });
            writer.join().unwrap();
            reader.join().unwrap();
        });

        let path = cache.term_dir("umbrella").join(SERIES_FILE);
        assert!(!path.with_extension("json.quarantined").exists());
    }

    #[test]
    fn keywords_with_punctuation_get_distinct_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let cache = SeriesCache::new(dir.path());
        assert_ne!(cache.term_dir("a/b"), cache.term_dir("a_b"));
        assert_ne!(cache.term_dir("rain coat"), cache.term_dir("raincoat"));

        cache.store("rain coat", &series(&[1.0]), "csv").unwrap();
        assert_eq!(cache.keywords().unwrap(), vec!["rain coat".to_string()]);
    }

    #[test]
    fn status_lists_terms_sorted() {
        let dir = tempfile::tempdir().unwrap();
        let cache = SeriesCache::new(dir.path());
        cache.store("zebra", &series(&[1.0]), "csv").unwrap();
        cache.store("apple", &series(&[1.0, 2.0]), "provider").unwrap();

        let status = cache.status().unwrap();
        assert_eq!(status.len(), 2);
        assert_eq!(status[0].keyword, "apple");
        assert_eq!(status[0].point_count, 2);
        assert_eq!(status[1].source, "csv");

        cache.remove("apple").unwrap();
        assert_eq!(cache.keywords().unwrap(), vec!["zebra".to_string()]);
    }

    #[test]
    fn missing_cache_dir_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let cache = SeriesCache::new(dir.path().join("absent"));
        assert!(cache.status().unwrap().is_empty());
        assert_eq!(cache.load("anything").unwrap(), None);
    }
}
