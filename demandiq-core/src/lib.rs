//! DemandIQ Core — weekly demand forecasting over calendar time.
//!
//! - Domain types (historical points, promotion sets, forecast config, predictions)
//! - Calendar feature extraction
//! - Two forecasting strategies: an additive seasonal-decomposition model and a
//!   gradient-boosted tree ensemble with a fixed promotion boost
//! - Friday-anchored weekly resampling
//! - Model-token dispatch with a typed error taxonomy and cooperative deadlines

pub mod domain;
pub mod features;
pub mod forecast;
pub mod model;
pub mod resample;
pub mod rng;

pub use domain::{
    ForecastConfig, HistoricalPoint, PromotionSet, TrimPolicy, WeeklyForecastPoint,
    DEFAULT_HORIZON_WEEKS, DEFAULT_SEED,
};
pub use forecast::{forecast, forecast_with_deadline, Deadline, ForecastError, Forecaster, ModelKind};
