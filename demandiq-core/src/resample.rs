//! Weekly resampling of daily predictions.
//!
//! Buckets are labelled by the Friday that closes them: every date belongs to
//! the bucket of its following-or-equal Friday. A bucket's value is the mean of
//! the days actually present; missing days are never interpolated.

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use std::collections::BTreeMap;

use crate::domain::{DailyPrediction, WeeklyForecastPoint};

/// Friday on or after `date`.
pub fn week_ending_friday(date: NaiveDate) -> NaiveDate {
    let today = date.weekday().num_days_from_monday() as i64;
    let friday = Weekday::Fri.num_days_from_monday() as i64;
    date + Duration::days((friday - today).rem_euclid(7))
}

/// Collapse `(date, value)` pairs into Friday-anchored weekly means, ascending.
pub fn resample_weekly<I>(values: I) -> Vec<WeeklyForecastPoint>
where
    I: IntoIterator<Item = (NaiveDate, f64)>,
{
    let mut buckets: BTreeMap<NaiveDate, (f64, usize)> = BTreeMap::new();
    for (date, value) in values {
        let entry = buckets.entry(week_ending_friday(date)).or_insert((0.0, 0));
        entry.0 += value;
        entry.1 += 1;
    }

    buckets
        .into_iter()
        .map(|(week_ending_date, (sum, count))| WeeklyForecastPoint {
            week_ending_date,
            predicted_value: sum / count as f64,
        })
        .collect()
}

/// Resample model output, using each day's adjusted value.
pub fn resample_daily(predictions: &[DailyPrediction]) -> Vec<WeeklyForecastPoint> {
    resample_weekly(predictions.iter().map(|p| (p.date, p.value)))
}
