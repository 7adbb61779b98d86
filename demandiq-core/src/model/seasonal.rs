//! Seasonal-decomposition forecaster.
//!
//! Fits an additive model directly on `(date, value)` pairs:
//!
//! ```text
//! value(d) = trend(d) + yearly(d) + weekly(d) + event(d)
//! ```
//!
//! - `trend`: piecewise linear in scaled time, with hinge columns at up to
//!   `N_CHANGEPOINTS` dates spread over the first `CHANGEPOINT_RANGE` of history.
//! - `yearly`, `weekly`: Fourier series over days since the Unix epoch.
//!   Daily seasonality is not modelled; inputs are at most daily.
//! - `event`: one indicator column per offset of the promotion window
//!   (the promotion day itself and the day after).
//!
//! The coefficients are the MAP estimate under independent Gaussian priors on
//! a max-abs scaled target, i.e. a ridge regression whose per-column penalty is
//! `noise_variance / prior_scale²`. Intercept and slope are unpenalized so the
//! level is never pushed into seasonal terms that the history cannot identify
//! (a weekly-sampled series observes a single weekday phase).

use chrono::{Datelike, Duration, NaiveDate};
use nalgebra::{DMatrix, DVector};
use std::f64::consts::PI;
use std::ops::Range;
use tracing::debug;

use crate::domain::{
    last_date, prepare_history, DailyPrediction, ForecastConfig, HistoricalPoint, PromotionSet,
    TrimPolicy, WeeklyForecastPoint,
};
use crate::features::future_dates;
use crate::forecast::{Deadline, ForecastError};
use crate::resample::resample_daily;

use super::solve::{solve_least_squares, solve_ridge};
use super::trim_weekly;

pub const YEARLY_PERIOD_DAYS: f64 = 365.25;
pub const YEARLY_FOURIER_ORDER: usize = 10;
pub const WEEKLY_PERIOD_DAYS: f64 = 7.0;
pub const WEEKLY_FOURIER_ORDER: usize = 3;
pub const N_CHANGEPOINTS: usize = 25;
pub const CHANGEPOINT_RANGE: f64 = 0.8;
pub const CHANGEPOINT_PRIOR_SCALE: f64 = 0.05;
pub const SEASONALITY_PRIOR_SCALE: f64 = 10.0;
pub const EVENT_PRIOR_SCALE: f64 = 10.0;
/// Days before a promotion covered by its effect window.
pub const EVENT_LOWER_WINDOW: i64 = 0;
/// Days after a promotion covered by its effect window.
pub const EVENT_UPPER_WINDOW: i64 = 1;

/// Floor on the scaled noise variance used to set the ridge penalties.
const MIN_NOISE_VARIANCE: f64 = 1e-4;

/// 1970-01-01 expressed as days from 0001-01-01 (CE).
const UNIX_EPOCH_DAYS_FROM_CE: i32 = 719_163;

/// Modelling configuration of the additive model.
#[derive(Debug, Clone, PartialEq)]
pub struct SeasonalParams {
    pub yearly_order: usize,
    pub weekly_order: usize,
    pub n_changepoints: usize,
    pub changepoint_range: f64,
    pub changepoint_prior_scale: f64,
    pub seasonality_prior_scale: f64,
    pub event_prior_scale: f64,
    pub event_lower_window: i64,
    pub event_upper_window: i64,
}

impl Default for SeasonalParams {
    fn default() -> Self {
        Self {
            yearly_order: YEARLY_FOURIER_ORDER,
            weekly_order: WEEKLY_FOURIER_ORDER,
            n_changepoints: N_CHANGEPOINTS,
            changepoint_range: CHANGEPOINT_RANGE,
            changepoint_prior_scale: CHANGEPOINT_PRIOR_SCALE,
            seasonality_prior_scale: SEASONALITY_PRIOR_SCALE,
            event_prior_scale: EVENT_PRIOR_SCALE,
            event_lower_window: EVENT_LOWER_WINDOW,
            event_upper_window: EVENT_UPPER_WINDOW,
        }
    }
}

impl SeasonalParams {
    /// Offsets (in days after the promotion) that get their own regressor column.
    pub fn event_offsets(&self) -> Vec<i64> {
        (-self.event_lower_window..=self.event_upper_window).collect()
    }
}

/// Column layout of the design matrix.
#[derive(Debug, Clone)]
struct DesignLayout {
    origin: NaiveDate,
    span_days: f64,
    changepoints: Vec<f64>,
    yearly_order: usize,
    weekly_order: usize,
    event_offsets: Vec<i64>,
}

impl DesignLayout {
    fn trend_cols(&self) -> Range<usize> {
        0..2 + self.changepoints.len()
    }

    fn yearly_cols(&self) -> Range<usize> {
        let start = self.trend_cols().end;
        start..start + 2 * self.yearly_order
    }

    fn weekly_cols(&self) -> Range<usize> {
        let start = self.yearly_cols().end;
        start..start + 2 * self.weekly_order
    }

    fn event_cols(&self) -> Range<usize> {
        let start = self.weekly_cols().end;
        start..start + self.event_offsets.len()
    }

    fn width(&self) -> usize {
        self.event_cols().end
    }

    fn scaled_time(&self, date: NaiveDate) -> f64 {
        (date - self.origin).num_days() as f64 / self.span_days
    }

    fn fill_row(&self, date: NaiveDate, promotions: &PromotionSet, row: &mut [f64]) {
        let t = self.scaled_time(date);
        row[0] = 1.0;
        row[1] = t;
        for (j, &cp) in self.changepoints.iter().enumerate() {
            row[2 + j] = (t - cp).max(0.0);
        }

        let epoch_days = f64::from(date.num_days_from_ce() - UNIX_EPOCH_DAYS_FROM_CE);
        fill_fourier(
            &mut row[self.yearly_cols()],
            epoch_days,
            YEARLY_PERIOD_DAYS,
            self.yearly_order,
        );
        fill_fourier(
            &mut row[self.weekly_cols()],
            epoch_days,
            WEEKLY_PERIOD_DAYS,
            self.weekly_order,
        );

        let events = self.event_cols();
        for (j, &offset) in self.event_offsets.iter().enumerate() {
            let active = promotions.contains(date - Duration::days(offset));
            row[events.start + j] = if active { 1.0 } else { 0.0 };
        }
    }

    fn penalties(&self, params: &SeasonalParams, noise_variance: f64) -> DVector<f64> {
        let mut penalties = DVector::zeros(self.width());
        let cp_penalty = noise_variance / params.changepoint_prior_scale.powi(2);
        let season_penalty = noise_variance / params.seasonality_prior_scale.powi(2);
        let event_penalty = noise_variance / params.event_prior_scale.powi(2);

        for j in 2..self.trend_cols().end {
            penalties[j] = cp_penalty;
        }
        for j in self.yearly_cols().chain(self.weekly_cols()) {
            penalties[j] = season_penalty;
        }
        for j in self.event_cols() {
            penalties[j] = event_penalty;
        }
        penalties
    }
}

/// Write `[sin(2π·1·t/P), cos(2π·1·t/P), …, sin(2π·n·t/P), cos(2π·n·t/P)]`.
fn fill_fourier(out: &mut [f64], t_days: f64, period: f64, order: usize) {
    for i in 0..order {
        let arg = 2.0 * PI * (i + 1) as f64 * t_days / period;
        out[2 * i] = arg.sin();
        out[2 * i + 1] = arg.cos();
    }
}

/// Changepoint locations (in scaled time) spread uniformly over the first
/// `range` share of the observed points.
fn select_changepoints(t: &[f64], n_changepoints: usize, range: f64) -> Vec<f64> {
    let hist_size = (t.len() as f64 * range).floor() as usize;
    let n = n_changepoints.min(hist_size.saturating_sub(1));
    if n == 0 {
        return Vec::new();
    }

    let mut changepoints: Vec<f64> = (1..=n)
        .map(|k| {
            let idx = (k as f64 * (hist_size - 1) as f64 / n as f64).round() as usize;
            t[idx]
        })
        .collect();
    changepoints.dedup();
    changepoints
}

/// Residual variance of an intercept + slope fit; sets the noise scale for the priors.
fn trend_residual_variance(x: &DMatrix<f64>, y: &DVector<f64>) -> f64 {
    let n = y.len() as f64;
    let trend = x.columns(0, 2).into_owned();
    match solve_least_squares(&trend, y) {
        Some(beta) => (y - &trend * beta).norm_squared() / n,
        None => {
            let mean = y.mean();
            y.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n
        }
    }
}

/// Additive contributions at one date, in the units of the input series.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeasonalComponents {
    pub trend: f64,
    pub yearly: f64,
    pub weekly: f64,
    pub event: f64,
}

impl SeasonalComponents {
    pub fn total(&self) -> f64 {
        self.trend + self.yearly + self.weekly + self.event
    }
}

/// Fitted additive model. Lives for one `train_and_forecast` call.
#[derive(Debug, Clone)]
pub struct SeasonalModel {
    layout: DesignLayout,
    beta: DVector<f64>,
    y_scale: f64,
    promotions: PromotionSet,
    in_sample_rmse: f64,
}

impl SeasonalModel {
    pub fn components(&self, date: NaiveDate) -> SeasonalComponents {
        let mut row = vec![0.0; self.layout.width()];
        self.layout.fill_row(date, &self.promotions, &mut row);
        let block = |cols: Range<usize>| -> f64 {
            cols.map(|j| row[j] * self.beta[j]).sum::<f64>() * self.y_scale
        };
        SeasonalComponents {
            trend: block(self.layout.trend_cols()),
            yearly: block(self.layout.yearly_cols()),
            weekly: block(self.layout.weekly_cols()),
            event: block(self.layout.event_cols()),
        }
    }

    pub fn predict(&self, date: NaiveDate) -> f64 {
        self.components(date).total()
    }

    pub fn n_changepoints(&self) -> usize {
        self.layout.changepoints.len()
    }

    pub fn in_sample_rmse(&self) -> f64 {
        self.in_sample_rmse
    }
}

/// Seasonal-decomposition strategy over one copied history.
#[derive(Debug, Clone)]
pub struct SeasonalForecaster {
    history: Vec<HistoricalPoint>,
    config: ForecastConfig,
    params: SeasonalParams,
}

impl SeasonalForecaster {
    pub fn new(history: &[HistoricalPoint], config: ForecastConfig) -> Self {
        Self {
            history: prepare_history(history),
            config,
            params: SeasonalParams::default(),
        }
    }

    pub fn with_params(mut self, params: SeasonalParams) -> Self {
        self.params = params;
        self
    }

    pub fn history(&self) -> &[HistoricalPoint] {
        &self.history
    }

    pub fn config(&self) -> &ForecastConfig {
        &self.config
    }

    /// Fit the additive model on the full history.
    pub fn fit(&self, deadline: &Deadline) -> Result<SeasonalModel, ForecastError> {
        let n = self.history.len();
        if n < 2 {
            return Err(ForecastError::ModelFit(format!(
                "need at least two usable points, got {n}"
            )));
        }

        let values: Vec<f64> = self.history.iter().map(|p| p.value).collect();
        // Compared directly: a mean-based variance overflows for huge equal values.
        if values.windows(2).all(|w| w[0] == w[1]) {
            return Err(ForecastError::ModelFit("series has zero variance".into()));
        }
        let y_scale = values.iter().fold(0.0_f64, |acc, v| acc.max(v.abs()));

        let origin = self.history[0].date;
        let span_days = (self.history[n - 1].date - origin).num_days() as f64;
        let t: Vec<f64> = self
            .history
            .iter()
            .map(|p| (p.date - origin).num_days() as f64 / span_days)
            .collect();

        let layout = DesignLayout {
            origin,
            span_days,
            changepoints: select_changepoints(
                &t,
                self.params.n_changepoints,
                self.params.changepoint_range,
            ),
            yearly_order: self.params.yearly_order,
            weekly_order: self.params.weekly_order,
            event_offsets: self.params.event_offsets(),
        };

        let promotions = self.config.promotion_dates();
        let width = layout.width();
        let mut x = DMatrix::zeros(n, width);
        let mut row = vec![0.0; width];
        for (i, point) in self.history.iter().enumerate() {
            layout.fill_row(point.date, promotions, &mut row);
            for (j, value) in row.iter().enumerate() {
                x[(i, j)] = *value;
            }
        }
        let y = DVector::from_iterator(n, values.iter().map(|v| v / y_scale));

        let noise_variance = trend_residual_variance(&x, &y).max(MIN_NOISE_VARIANCE);
        let penalties = layout.penalties(&self.params, noise_variance);

        deadline.check("seasonal fit")?;
        let beta = solve_ridge(&x, &y, &penalties).ok_or_else(|| {
            ForecastError::ForecastingFailure(
                "additive model normal equations could not be solved".into(),
            )
        })?;
        deadline.check("seasonal fit")?;

        let in_sample_rmse = ((&x * &beta - &y).norm_squared() / n as f64).sqrt() * y_scale;
        debug!(
            points = n,
            columns = width,
            changepoints = layout.changepoints.len(),
            noise_variance,
            in_sample_rmse,
            "seasonal model fitted"
        );

        Ok(SeasonalModel {
            layout,
            beta,
            y_scale,
            promotions: promotions.clone(),
            in_sample_rmse,
        })
    }

    /// Daily predictions for every day strictly after the last observation.
    pub fn forecast_daily(&self, deadline: &Deadline) -> Result<Vec<DailyPrediction>, ForecastError> {
        if self.config.horizon_weeks() == 0 {
            return Err(ForecastError::FeatureMismatch(
                "horizon_weeks must be positive; the future date range is empty".into(),
            ));
        }

        let model = self.fit(deadline)?;
        let last = last_date(&self.history)
            .ok_or_else(|| ForecastError::ModelFit("history is empty".into()))?;
        let promotions = self.config.promotion_dates();

        future_dates(last, self.config.horizon_days())
            .into_iter()
            .map(|date| {
                let value = model.predict(date);
                if !value.is_finite() {
                    return Err(ForecastError::ForecastingFailure(format!(
                        "non-finite prediction for {date}"
                    )));
                }
                Ok(DailyPrediction {
                    date,
                    raw_value: value,
                    value,
                    is_promotion: promotions.contains(date),
                })
            })
            .collect()
    }

    /// Weekly forecast: the trailing `horizon_weeks` Friday-anchored buckets.
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
            TrimPolicy::TrailingHorizon,
        ))
    }
}
