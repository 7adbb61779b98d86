//! Forecasting models.
//!
//! - [`seasonal`]: additive trend + Fourier seasonality + promotion events.
//! - [`boosted`]: gradient-boosted regression trees on calendar features.
//!
//! Both produce daily predictions for the days after the last observation and
//! collapse them into Friday-anchored weeks.

pub mod boosted;
pub mod seasonal;
pub mod solve;
pub mod tree;

pub use boosted::{BoosterParams, GradientBoostedTrees, TreeEnsembleForecaster, PROMOTION_BOOST};
pub use seasonal::{SeasonalComponents, SeasonalForecaster, SeasonalModel, SeasonalParams};
pub use tree::{FeatureMatrix, RegressionTree};

use crate::domain::{TrimPolicy, WeeklyForecastPoint};

/// Slice a resampled weekly sequence according to `policy`.
///
/// `PerModel` resolves to `model_default`. `TrailingHorizon` keeps the last
/// `horizon_weeks` buckets; `FullRange` keeps them all.
pub fn trim_weekly(
    mut weekly: Vec<WeeklyForecastPoint>,
    horizon_weeks: u32,
    policy: TrimPolicy,
    model_default: TrimPolicy,
) -> Vec<WeeklyForecastPoint> {
    let effective = match policy {
        TrimPolicy::PerModel => model_default,
        other => other,
    };
    let keep = horizon_weeks as usize;
    if effective == TrimPolicy::TrailingHorizon && weekly.len() > keep {
        weekly.drain(..weekly.len() - keep);
    }
    weekly
}
