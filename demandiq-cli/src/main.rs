//! DemandIQ CLI — forecast, synthetic data and cache management commands.
//!
//! Commands:
//! - `forecast` — forecast weekly demand from flags, a TOML job, or several jobs in parallel
//! - `generate` — write a synthetic weekly series to CSV
//! - `cache status` — list cached keywords with date ranges
//! - `cache import` — load a CSV series into the cache, replacing the old one
//! - `cache remove` — drop a keyword's cached series
//! - `kpis` — dashboard KPIs over every cached keyword

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use demandiq_runner::synthetic::{default_range, generate_series};
use demandiq_runner::{
    compute_kpis, export_csv, export_json, import_series_csv, load_jobs, run_batch, run_job,
    save_artifacts, write_series_csv, ForecastOutcome, JobConfig, SeriesCache,
};

#[derive(Parser)]
#[command(name = "demandiq", about = "DemandIQ CLI — weekly demand forecasting")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Json,
    Csv,
}

#[derive(Subcommand)]
enum Commands {
    /// Forecast weekly demand for one keyword, or for several TOML jobs in parallel.
    Forecast {
        /// TOML job file. Repeat to run a batch. Flags below override file values.
        #[arg(long)]
        config: Vec<PathBuf>,

        /// Search term / product keyword (required without --config).
        #[arg(long)]
        keyword: Option<String>,

        /// CSV series (`date,value`) to import before forecasting.
        #[arg(long)]
        input: Option<PathBuf>,

        /// Model: prophet or xgboost (case-insensitive).
        #[arg(long)]
        model: Option<String>,

        /// Forecast horizon in weeks.
        #[arg(long)]
        horizon: Option<u32>,

        /// Promotion date (YYYY-MM-DD). Repeatable; replaces the file's list.
        #[arg(long = "promo", value_parser = parse_date)]
        promotions: Vec<NaiveDate>,

        /// Time limit for the forecast.
        #[arg(long)]
        timeout_secs: Option<u64>,

        /// Cache directory.
        #[arg(long)]
        cache_dir: Option<PathBuf>,

        /// Fall back to synthetic data when nothing is cached.
        #[arg(long, default_value_t = false)]
        synthetic: bool,

        /// Save forecast.json and forecast.csv under this directory.
        #[arg(long)]
        output: Option<PathBuf>,

        /// Format printed to stdout.
        #[arg(long, value_enum, default_value = "json")]
        format: OutputFormat,
    },
    /// Write a synthetic weekly series to CSV.
    Generate {
        #[arg(long)]
        keyword: String,

        /// Start date (YYYY-MM-DD). Defaults to 2020-01-01.
        #[arg(long, value_parser = parse_date)]
        start: Option<NaiveDate>,

        /// End date (YYYY-MM-DD). Defaults to 2024-12-31.
        #[arg(long, value_parser = parse_date)]
        end: Option<NaiveDate>,

        #[arg(long)]
        out: PathBuf,
    },
    /// Cache management commands.
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
    /// Dashboard KPIs over the cached series.
    Kpis {
        #[arg(long, default_value = "data")]
        cache_dir: PathBuf,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    /// List cached keywords with their date ranges.
    Status {
        #[arg(long, default_value = "data")]
        cache_dir: PathBuf,
    },
    /// Import a CSV series, replacing any cached data for the keyword.
    Import {
        #[arg(long)]
        keyword: String,

        #[arg(long)]
        input: PathBuf,

        #[arg(long, default_value = "data")]
        cache_dir: PathBuf,
    },
    /// Drop the cached series for a keyword.
    Remove {
        #[arg(long)]
        keyword: String,

        #[arg(long, default_value = "data")]
        cache_dir: PathBuf,
    },
}

fn parse_date(s: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|e| format!("invalid date '{s}': {e}"))
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();
}

fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Forecast {
            config,
            keyword,
            input,
            model,
            horizon,
            promotions,
            timeout_secs,
            cache_dir,
            synthetic,
            output,
            format,
        } => build_jobs(
            &config,
            JobOverrides {
                keyword,
                input,
                model,
                horizon,
                promotions,
                timeout_secs,
                cache_dir,
                synthetic,
            },
        )
        .and_then(|jobs| run_forecast_cmd(&jobs, output.as_deref(), format)),
        Commands::Generate {
            keyword,
            start,
            end,
            out,
        } => run_generate(&keyword, start, end, &out),
        Commands::Cache { action } => match action {
            CacheAction::Status { cache_dir } => run_cache_status(&cache_dir),
            CacheAction::Import {
                keyword,
                input,
                cache_dir,
            } => run_cache_import(&keyword, &input, &cache_dir),
            CacheAction::Remove { keyword, cache_dir } => run_cache_remove(&keyword, &cache_dir),
        },
        Commands::Kpis { cache_dir } => run_kpis(&cache_dir),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:?}");
            ExitCode::FAILURE
        }
    }
}

struct JobOverrides {
    keyword: Option<String>,
    input: Option<PathBuf>,
    model: Option<String>,
    horizon: Option<u32>,
    promotions: Vec<NaiveDate>,
    timeout_secs: Option<u64>,
    cache_dir: Option<PathBuf>,
    synthetic: bool,
}

fn build_jobs(config_paths: &[PathBuf], overrides: JobOverrides) -> Result<Vec<JobConfig>> {
    let mut jobs = match (config_paths, &overrides.keyword) {
        ([], Some(keyword)) => vec![JobConfig::new(keyword.clone())],
        ([], None) => bail!("one of --config or --keyword is required"),
        ([_, _, ..], _) if overrides.keyword.is_some() || overrides.input.is_some() => {
            bail!("--keyword and --input apply to a single job, not a batch of --config files")
        }
        (paths, _) => load_jobs(paths).context("failed to load job files")?,
    };

    for job in &mut jobs {
        apply_overrides(job, &overrides);
        job.validate()
            .with_context(|| format!("invalid forecast job for '{}'", job.forecast.keyword))?;
    }
    Ok(jobs)
}

fn apply_overrides(job: &mut JobConfig, overrides: &JobOverrides) {
    if let Some(keyword) = &overrides.keyword {
        job.forecast.keyword = keyword.clone();
    }
    if let Some(input) = &overrides.input {
        job.data.series_csv = Some(input.clone());
    }
    if let Some(model) = &overrides.model {
        job.forecast.model = model.clone();
    }
    if let Some(horizon) = overrides.horizon {
        job.forecast.horizon_weeks = horizon;
    }
    if !overrides.promotions.is_empty() {
        job.forecast.promotion_dates = overrides.promotions.clone();
    }
    if let Some(secs) = overrides.timeout_secs {
        job.forecast.timeout_secs = secs;
    }
    if let Some(dir) = &overrides.cache_dir {
        job.data.cache_dir = dir.clone();
    }
    job.data.synthetic |= overrides.synthetic;
}

fn run_forecast_cmd(jobs: &[JobConfig], output: Option<&Path>, format: OutputFormat) -> Result<()> {
    if let [job] = jobs {
        let outcome = run_job(job)
            .with_context(|| format!("forecast failed for '{}'", job.forecast.keyword))?;
        return emit_outcome(&outcome, output, format);
    }

    let mut failed = 0;
    for (job, result) in jobs.iter().zip(run_batch(jobs)) {
        match result {
            Ok(outcome) => emit_outcome(&outcome, output, format)?,
            Err(e) => {
                failed += 1;
                eprintln!("error: forecast failed for '{}': {e}", job.forecast.keyword);
            }
        }
    }
    if failed > 0 {
        bail!("{failed} of {} forecast jobs failed", jobs.len());
    }
    Ok(())
}

fn emit_outcome(outcome: &ForecastOutcome, output: Option<&Path>, format: OutputFormat) -> Result<()> {
    print_summary(outcome);

    match format {
        OutputFormat::Json => println!("{}", export_json(outcome)?),
        OutputFormat::Csv => print!("{}", export_csv(&outcome.points)?),
    }

    if let Some(dir) = output {
        let run_dir = save_artifacts(outcome, dir)?;
        eprintln!("Artifacts saved to: {}", run_dir.display());
    }
    Ok(())
}

fn print_summary(outcome: &ForecastOutcome) {
    eprintln!();
    eprintln!("=== Forecast ===");
    eprintln!("Keyword:   {}", outcome.keyword);
    eprintln!("Model:     {}", outcome.model);
    eprintln!("History:   {} points", outcome.history_len);
    eprintln!("Horizon:   {} weeks ({} returned)", outcome.horizon_weeks, outcome.points.len());
    if let (Some(first), Some(last)) = (outcome.points.first(), outcome.points.last()) {
        eprintln!("Weeks:     {} to {}", first.week_ending_date, last.week_ending_date);
    }
    eprintln!("Elapsed:   {} ms", outcome.elapsed_ms);
    if outcome.synthetic {
        eprintln!();
        eprintln!("WARNING: Forecast based on SYNTHETIC data");
    }
    eprintln!();
}

fn run_generate(
    keyword: &str,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
    out: &Path,
) -> Result<()> {
    let (default_start, default_end) = default_range();
    let start = start.unwrap_or(default_start);
    let end = end.unwrap_or(default_end);
    if start > end {
        bail!("--start {start} is after --end {end}");
    }

    let points = generate_series(keyword, start, end);
    write_series_csv(out, &points)
        .with_context(|| format!("failed to write {}", out.display()))?;
    println!("Wrote {} weekly points for '{keyword}' to {}", points.len(), out.display());
    Ok(())
}

fn run_cache_status(cache_dir: &Path) -> Result<()> {
    if !cache_dir.exists() {
        println!("Cache directory does not exist: {}", cache_dir.display());
        return Ok(());
    }

    let rows = SeriesCache::new(cache_dir).status()?;
    if rows.is_empty() {
        println!("Cache is empty: {}", cache_dir.display());
        return Ok(());
    }

    println!("Cache: {}", cache_dir.display());
    println!("Keywords: {}", rows.len());
    println!();
    println!("{:<24} {:<25} {:>8} {:<10}", "Keyword", "Date Range", "Points", "Source");
    println!("{}", "-".repeat(70));
    for row in &rows {
        println!(
            "{:<24} {:<25} {:>8} {:<10}",
            row.keyword,
            format!("{} to {}", row.start_date, row.end_date),
            row.point_count,
            row.source
        );
    }
    Ok(())
}

fn run_cache_import(keyword: &str, input: &Path, cache_dir: &Path) -> Result<()> {
    let cache = SeriesCache::new(cache_dir);
    let series = import_series_csv(keyword, input, &cache)
        .with_context(|| format!("failed to import {}", input.display()))?;
    println!(
        "Imported {} points for '{}' into {}",
        series.points.len(),
        series.keyword,
        cache_dir.display()
    );
    Ok(())
}

fn run_cache_remove(keyword: &str, cache_dir: &Path) -> Result<()> {
    let cache = SeriesCache::new(cache_dir);
    if !cache.contains(keyword) {
        println!("'{keyword}' is not cached in {}", cache_dir.display());
        return Ok(());
    }
    cache.remove(keyword)?;
    println!("Removed '{}' from {}", SeriesCache::normalize_keyword(keyword), cache_dir.display());
    Ok(())
}

fn run_kpis(cache_dir: &Path) -> Result<()> {
    let kpis = compute_kpis(&SeriesCache::new(cache_dir))?;
    println!("{}", serde_json::to_string_pretty(&kpis)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_overrides() -> JobOverrides {
        JobOverrides {
            keyword: None,
            input: None,
            model: None,
            horizon: None,
            promotions: Vec::new(),
            timeout_secs: None,
            cache_dir: None,
            synthetic: false,
        }
    }

    #[test]
    fn keyword_or_config_is_required() {
        assert!(build_jobs(&[], no_overrides()).is_err());
    }

    fn write_job(dir: &Path, keyword: &str) -> PathBuf {
        let path = dir.join(format!("{keyword}.toml"));
        std::fs::write(&path, format!("[forecast]\nkeyword = \"{keyword}\"\n")).unwrap();
        path
    }

    #[test]
    fn several_configs_build_a_batch() {
        let dir = tempfile::tempdir().unwrap();
        let paths = [write_job(dir.path(), "umbrella"), write_job(dir.path(), "raincoat")];
        let overrides = JobOverrides {
            horizon: Some(3),
            ..no_overrides()
        };
        let jobs = build_jobs(&paths, overrides).unwrap();
        let keywords: Vec<&str> = jobs.iter().map(|j| j.forecast.keyword.as_str()).collect();
        assert_eq!(keywords, ["umbrella", "raincoat"]);
        assert!(jobs.iter().all(|j| j.forecast.horizon_weeks == 3));
    }

    #[test]
    fn keyword_override_is_rejected_for_a_batch() {
        let dir = tempfile::tempdir().unwrap();
        let paths = [write_job(dir.path(), "umbrella"), write_job(dir.path(), "raincoat")];
        let overrides = JobOverrides {
            keyword: Some("sunscreen".into()),
            ..no_overrides()
        };
        assert!(build_jobs(&paths, overrides).is_err());
    }

    #[test]
    fn cache_remove_drops_the_term() {
        let dir = tempfile::tempdir().unwrap();
        let cache = SeriesCache::new(dir.path());
        let point = demandiq_core::HistoricalPoint::new(NaiveDate::from_ymd_opt(2024, 1, 5).unwrap(), 3);
        cache.store("Umbrella", &[point], "csv").unwrap();

        run_cache_remove("umbrella", dir.path()).unwrap();
        assert!(!cache.contains("umbrella"));
        // Removing an absent term is not an error.
        run_cache_remove("umbrella", dir.path()).unwrap();
    }

    #[test]
    fn flags_override_defaults() {
        let overrides = JobOverrides {
            keyword: Some("umbrella".into()),
            model: Some("XGBoost".into()),
            horizon: Some(8),
            promotions: vec![NaiveDate::from_ymd_opt(2024, 11, 29).unwrap()],
            synthetic: true,
            ..no_overrides()
        };
        let jobs = build_jobs(&[], overrides).unwrap();
        let job = &jobs[0];
        assert_eq!(job.forecast.keyword, "umbrella");
        assert_eq!(job.forecast.horizon_weeks, 8);
        assert_eq!(job.forecast.promotion_dates.len(), 1);
        assert!(job.data.synthetic);
    }

    #[test]
    fn invalid_model_flag_is_rejected() {
        let overrides = JobOverrides {
            keyword: Some("umbrella".into()),
            model: Some("arima".into()),
            ..no_overrides()
        };
        let err = build_jobs(&[], overrides).unwrap_err();
        assert!(format!("{err:?}").contains("arima"));
    }

    #[test]
    fn dates_parse_iso() {
        assert_eq!(parse_date("2024-11-29"), Ok(NaiveDate::from_ymd_opt(2024, 11, 29).unwrap()));
        assert!(parse_date("29/11/2024").is_err());
    }

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
