//! Synthetic weekly series for development and demos.
//!
//! Weekly points dated on Fridays, shaped like retail sales:
//!
//! ```text
//! value = base × (1 + 0.5·sin(2π·doy/365.25)) × (1 + days/2920) × N(1, 0.1)
//! ```
//!
//! with a further 1.4× uplift from 16 November through 31 December. The base
//! level and the noise are seeded from the keyword, so a keyword always
//! produces the same series.

use chrono::{Datelike, Duration, NaiveDate};
use rand::Rng;
use rand_distr::{Distribution, Normal};
use std::f64::consts::PI;

use demandiq_core::resample::week_ending_friday;
use demandiq_core::rng::RngHierarchy;
use demandiq_core::HistoricalPoint;

use crate::cache::SeriesCache;

/// Holiday-season multiplier.
pub const HOLIDAY_UPLIFT: f64 = 1.4;

/// Default generated range: 2020 through 2024.
pub fn default_range() -> (NaiveDate, NaiveDate) {
    (
        NaiveDate::from_ymd_opt(2020, 1, 1).unwrap_or(NaiveDate::MIN),
        NaiveDate::from_ymd_opt(2024, 12, 31).unwrap_or(NaiveDate::MAX),
    )
}

fn is_holiday_season(date: NaiveDate) -> bool {
    matches!(date.month(), 11 | 12) && date.day() > 15
}

/// Generate the synthetic series for `keyword` over `[start, end]`.
pub fn generate_series(keyword: &str, start: NaiveDate, end: NaiveDate) -> Vec<HistoricalPoint> {
    let rngs = RngHierarchy::from_label(&SeriesCache::normalize_keyword(keyword));
    let mut rng = rngs.rng_for("synthetic", 0);

    let store: u32 = rng.gen_range(1..=10);
    let dept: u32 = rng.gen_range(1..=5);
    let base = f64::from(10_000 + store * 1_000 + dept * 500);

    let noise = match Normal::new(1.0, 0.1) {
        Ok(n) => n,
        Err(_) => return Vec::new(),
    };

    let first = week_ending_friday(start);
    let mut points = Vec::new();
    let mut date = first;
    while date <= end {
        let seasonal = 1.0 + 0.5 * (2.0 * PI * f64::from(date.ordinal()) / 365.25).sin();
        let trend = 1.0 + (date - first).num_days() as f64 / (365.0 * 4.0 * 2.0);
        let mut value = base * seasonal * trend * noise.sample(&mut rng);
        if is_holiday_season(date) {
            value *= HOLIDAY_UPLIFT;
        }
        points.push(HistoricalPoint::new(date, (value * 100.0).round() / 100.0));
        date += Duration::weeks(1);
    }
    points
}
