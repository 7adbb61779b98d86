//! ForecastConfig — the immutable settings for one forecast call.

use serde::{Deserialize, Serialize};

use super::promotion::PromotionSet;

/// Seed for the tree ensemble's row/column subsampling.
pub const DEFAULT_SEED: u64 = 0;

/// Horizon used when a caller does not ask for one.
pub const DEFAULT_HORIZON_WEEKS: u32 = 52;

/// How the resampled weekly sequence is sliced before it is returned.
///
/// `PerModel` keeps the historical asymmetry: the seasonal model returns the
/// trailing `horizon_weeks` buckets while the tree ensemble returns every
/// bucket its daily range touches (possibly one partial week more).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrimPolicy {
    #[default]
    PerModel,
    TrailingHorizon,
    FullRange,
}

/// Horizon, promotion days, trim policy and seed for one forecast call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastConfig {
    horizon_weeks: u32,
    promotion_dates: PromotionSet,
    #[serde(default)]
    trim_policy: TrimPolicy,
    #[serde(default)]
    seed: u64,
}

impl ForecastConfig {
    pub fn new(horizon_weeks: u32, promotion_dates: PromotionSet) -> Self {
        Self {
            horizon_weeks,
            promotion_dates,
            trim_policy: TrimPolicy::PerModel,
            seed: DEFAULT_SEED,
        }
    }

    pub fn with_trim_policy(mut self, trim_policy: TrimPolicy) -> Self {
        self.trim_policy = trim_policy;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn horizon_weeks(&self) -> u32 {
        self.horizon_weeks
    }

    /// Number of future calendar days covered by the horizon.
    pub fn horizon_days(&self) -> i64 {
        i64::from(self.horizon_weeks) * 7
    }

    pub fn promotion_dates(&self) -> &PromotionSet {
        &self.promotion_dates
    }

    pub fn trim_policy(&self) -> TrimPolicy {
        self.trim_policy
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self::new(DEFAULT_HORIZON_WEEKS, PromotionSet::new())
    }
}
