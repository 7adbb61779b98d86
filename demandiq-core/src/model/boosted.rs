//! Gradient-boosted tree ensemble over calendar features.
//!
//! Squared-error boosting from a mean base score, with per-round row and
//! column subsampling drawn from the [`RngHierarchy`]. Early stopping watches
//! the training RMSE and keeps the trees up to the best round.
//!
//! Forecasts apply a fixed [`PROMOTION_BOOST`] to every promotion day after
//! prediction. The promotion flag itself is not a regressor.

use rand::seq::index;
use tracing::debug;

use crate::domain::{
    last_date, prepare_history, DailyPrediction, ForecastConfig, HistoricalPoint, TrimPolicy,
    WeeklyForecastPoint,
};
use crate::features::{extract_features, future_dates, FeatureRow, FEATURE_NAMES};
use crate::forecast::{Deadline, ForecastError};
use crate::resample::resample_daily;
use crate::rng::RngHierarchy;

use super::tree::{FeatureMatrix, RegressionTree, TreeParams};
use super::trim_weekly;

pub const N_ESTIMATORS: usize = 500;
pub const LEARNING_RATE: f64 = 0.01;
pub const MAX_DEPTH: usize = 4;
pub const SUBSAMPLE: f64 = 0.8;
pub const COLSAMPLE_BYTREE: f64 = 0.8;
pub const EARLY_STOPPING_ROUNDS: usize = 50;
pub const L2_REGULARIZATION: f64 = 1.0;
pub const MIN_CHILD_WEIGHT: f64 = 1.0;
pub const MIN_SPLIT_GAIN: f64 = 1e-6;

/// Multiplier applied to predictions on promotion days.
pub const PROMOTION_BOOST: f64 = 1.25;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoosterParams {
    pub n_estimators: usize,
    pub learning_rate: f64,
    pub max_depth: usize,
    pub subsample: f64,
    pub colsample_bytree: f64,
    pub early_stopping_rounds: usize,
    pub l2_regularization: f64,
    pub min_child_weight: f64,
    pub min_split_gain: f64,
}

impl Default for BoosterParams {
    fn default() -> Self {
        Self {
            n_estimators: N_ESTIMATORS,
            learning_rate: LEARNING_RATE,
            max_depth: MAX_DEPTH,
            subsample: SUBSAMPLE,
            colsample_bytree: COLSAMPLE_BYTREE,
            early_stopping_rounds: EARLY_STOPPING_ROUNDS,
            l2_regularization: L2_REGULARIZATION,
            min_child_weight: MIN_CHILD_WEIGHT,
            min_split_gain: MIN_SPLIT_GAIN,
        }
    }
}

impl BoosterParams {
    fn tree_params(&self) -> TreeParams {
        TreeParams {
            max_depth: self.max_depth,
            l2_regularization: self.l2_regularization,
            min_child_weight: self.min_child_weight,
            min_split_gain: self.min_split_gain,
            learning_rate: self.learning_rate,
        }
    }

    fn rows_per_tree(&self, n_rows: usize) -> usize {
        ((n_rows as f64 * self.subsample).round() as usize).clamp(1, n_rows)
    }

    fn cols_per_tree(&self, n_cols: usize) -> usize {
        ((n_cols as f64 * self.colsample_bytree).floor() as usize).clamp(1, n_cols)
    }
}

/// Fitted additive ensemble: `base_score + Σ tree(x)`.
#[derive(Debug, Clone, PartialEq)]
pub struct GradientBoostedTrees {
    base_score: f64,
    trees: Vec<RegressionTree>,
    n_features: usize,
    best_iteration: usize,
    best_rmse: f64,
}

impl GradientBoostedTrees {
    pub fn fit(
        x: &FeatureMatrix,
        y: &[f64],
        params: &BoosterParams,
        seed: u64,
        deadline: &Deadline,
    ) -> Result<Self, ForecastError> {
        let n = x.n_rows();
        if n != y.len() {
            return Err(ForecastError::FeatureMismatch(format!(
                "{n} feature rows for {} targets",
                y.len()
            )));
        }
        if n == 0 || x.n_cols() == 0 {
            return Err(ForecastError::ModelFit("no training rows".into()));
        }

        let base_score = y.iter().sum::<f64>() / n as f64;
        let mut predictions = vec![base_score; n];
        let mut gradients = vec![0.0; n];
        let hessians = vec![1.0; n];

        let rngs = RngHierarchy::new(seed);
        let tree_params = params.tree_params();
        let n_rows = params.rows_per_tree(n);
        let n_cols = params.cols_per_tree(x.n_cols());

        let mut trees = Vec::with_capacity(params.n_estimators);
        let mut best_rmse = f64::INFINITY;
        let mut best_iteration = 0;

        for round in 0..params.n_estimators {
            deadline.check("boosting")?;

            for ((g, p), t) in gradients.iter_mut().zip(&predictions).zip(y) {
                *g = p - t;
            }
            let mut rng = rngs.rng_for("tree", round as u64);
            let mut rows = index::sample(&mut rng, n, n_rows).into_vec();
            rows.sort_unstable();
            let mut cols = index::sample(&mut rng, x.n_cols(), n_cols).into_vec();
            cols.sort_unstable();

            let tree = RegressionTree::grow(x, &gradients, &hessians, &rows, &cols, &tree_params);
            for (i, p) in predictions.iter_mut().enumerate() {
                *p += tree.predict_row(x.row(i));
            }
            trees.push(tree);

            let score = rmse(&predictions, y);
            if score < best_rmse {
                best_rmse = score;
                best_iteration = round;
            } else if round - best_iteration >= params.early_stopping_rounds {
                debug!(round, best_iteration, best_rmse, "early stopping");
                break;
            }
        }

        trees.truncate(best_iteration + 1);
        debug!(
            trees = trees.len(),
            base_score,
            best_rmse,
            rows_per_tree = n_rows,
            cols_per_tree = n_cols,
            "tree ensemble fitted"
        );

        Ok(Self {
            base_score,
            trees,
            n_features: x.n_cols(),
            best_iteration,
            best_rmse,
        })
    }

    pub fn predict_row(&self, row: &[f64]) -> Result<f64, ForecastError> {
        if row.len() != self.n_features {
            return Err(ForecastError::FeatureMismatch(format!(
                "model trained on {} features, got {}",
                self.n_features,
                row.len()
            )));
        }
        Ok(self.base_score + self.trees.iter().map(|t| t.predict_row(row)).sum::<f64>())
    }

    pub fn base_score(&self) -> f64 {
        self.base_score
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn best_iteration(&self) -> usize {
        self.best_iteration
    }

    /// Training RMSE at the best iteration.
    pub fn best_rmse(&self) -> f64 {
        self.best_rmse
    }
}

fn rmse(predictions: &[f64], y: &[f64]) -> f64 {
    let sse: f64 = predictions.iter().zip(y).map(|(p, t)| (p - t).powi(2)).sum();
    (sse / y.len() as f64).sqrt()
}

fn feature_matrix(rows: &[FeatureRow]) -> Result<FeatureMatrix, ForecastError> {
    let regressors: Vec<[f64; FEATURE_NAMES.len()]> =
        rows.iter().map(FeatureRow::regressors).collect();
    FeatureMatrix::from_rows(&regressors)
}

/// Tree-ensemble strategy over one copied history.
#[derive(Debug, Clone)]
pub struct TreeEnsembleForecaster {
    history: Vec<HistoricalPoint>,
    config: ForecastConfig,
    params: BoosterParams,
}

impl TreeEnsembleForecaster {
    pub fn new(history: &[HistoricalPoint], config: ForecastConfig) -> Self {
        Self {
            history: prepare_history(history),
            config,
            params: BoosterParams::default(),
        }
    }

    pub fn with_params(mut self, params: BoosterParams) -> Self {
        self.params = params;
        self
    }

    pub fn history(&self) -> &[HistoricalPoint] {
        &self.history
    }

    pub fn config(&self) -> &ForecastConfig {
        &self.config
    }

    /// Fit the ensemble on the calendar features of every observed day.
    pub fn fit(&self, deadline: &Deadline) -> Result<GradientBoostedTrees, ForecastError> {
        if self.history.is_empty() {
            return Err(ForecastError::ModelFit(
                "history has no usable points".into(),
            ));
        }
        let dates: Vec<_> = self.history.iter().map(|p| p.date).collect();
        let targets: Vec<f64> = self.history.iter().map(|p| p.value).collect();
        let rows = extract_features(&dates, self.config.promotion_dates());
        let x = feature_matrix(&rows)?;
        GradientBoostedTrees::fit(&x, &targets, &self.params, self.config.seed(), deadline)
    }

    /// Daily predictions strictly after the last observation, promotion boost applied.
    pub fn forecast_daily(&self, deadline: &Deadline) -> Result<Vec<DailyPrediction>, ForecastError> {
        if self.config.horizon_weeks() == 0 {
            return Err(ForecastError::FeatureMismatch(
                "horizon_weeks must be positive; the future date range is empty".into(),
            ));
        }

        let model = self.fit(deadline)?;
        let last = last_date(&self.history)
            .ok_or_else(|| ForecastError::ModelFit("history has no usable points".into()))?;
        let dates = future_dates(last, self.config.horizon_days());
        let rows = extract_features(&dates, self.config.promotion_dates());

        rows.iter()
            .map(|row| {
                let raw_value = model.predict_row(&row.regressors())?;
                let value = if row.is_promotion() {
                    raw_value * PROMOTION_BOOST
                } else {
                    raw_value
                };
                if !value.is_finite() {
                    return Err(ForecastError::ForecastingFailure(format!(
                        "non-finite prediction for {}",
                        row.date
                    )));
                }
                Ok(DailyPrediction {
                    date: row.date,
                    raw_value,
                    value,
                    is_promotion: row.is_promotion(),
                })
            })
            .collect()
    }

    /// Weekly forecast over every Friday bucket the future range touches.
    pub fn train_and_forecast(
        &self,
        deadline: &Deadline,
    ) -> Result<Vec<WeeklyForecastPoint>, ForecastError> {
        let daily = self.forecast_daily(deadline)?;
        let weekly = resample_daily(&daily);
        Ok(trim_weekly(
            weekly,
            self.config.horizon_weeks(),
            self.config.trim_policy(),
            TrimPolicy::FullRange,
        ))
    }
}
