//! Export — JSON and CSV artifact generation for forecast outcomes.
//!
//! - **JSON**: full round-trip serialization with schema versioning
//! - **CSV**: `ds,yhat` rows for spreadsheets and charting tools
//!
//! All persisted artifacts include a `schema_version` field. Unknown versions
//! are rejected on load.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use demandiq_core::WeeklyForecastPoint;

use crate::runner::{ForecastOutcome, SCHEMA_VERSION};

// ─── JSON export ────────────────────────────────────────────────────

/// Serialize a `ForecastOutcome` to pretty JSON.
pub fn export_json(outcome: &ForecastOutcome) -> Result<String> {
    serde_json::to_string_pretty(outcome).context("failed to serialize ForecastOutcome to JSON")
}

/// Deserialize a `ForecastOutcome` from JSON, rejecting unknown schema versions.
pub fn import_json(json: &str) -> Result<ForecastOutcome> {
    let outcome: ForecastOutcome =
        serde_json::from_str(json).context("failed to deserialize ForecastOutcome from JSON")?;
    if outcome.schema_version > SCHEMA_VERSION {
        bail!(
            "unsupported schema version {} (max supported: {})",
            outcome.schema_version,
            SCHEMA_VERSION
        );
    }
    Ok(outcome)
}

// ─── CSV export ─────────────────────────────────────────────────────

/// Export weekly points as CSV with `ds` and `yhat` columns.
pub fn export_csv(points: &[WeeklyForecastPoint]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(["ds", "yhat"])?;
    for p in points {
        wtr.write_record([p.week_ending_date.to_string(), format!("{:.4}", p.predicted_value)])?;
    }
    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

// ─── Artifact bundle ────────────────────────────────────────────────

/// Save the artifact set for one forecast.
///
/// Creates `{keyword}_{model}_{timestamp}/` under `output_dir` containing
/// `forecast.json` (the full outcome) and `forecast.csv` (the weekly points).
/// Returns the path to the created directory.
pub fn save_artifacts(outcome: &ForecastOutcome, output_dir: &Path) -> Result<PathBuf> {
    let keyword: String = outcome
        .keyword
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .collect();
    let dirname = format!(
        "{}_{}_{}",
        keyword,
        outcome.model,
        chrono::Local::now().format("%Y%m%d_%H%M%S")
    );
    let run_dir = output_dir.join(dirname);
    std::fs::create_dir_all(&run_dir)
        .with_context(|| format!("failed to create artifact dir: {}", run_dir.display()))?;

    std::fs::write(run_dir.join("forecast.json"), export_json(outcome)?)
        .context("failed to write forecast.json")?;
    std::fs::write(run_dir.join("forecast.csv"), export_csv(&outcome.points)?)
        .context("failed to write forecast.csv")?;

    Ok(run_dir)
}
