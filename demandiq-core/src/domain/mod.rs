//! Domain types for DemandIQ forecasting.

pub mod config;
pub mod point;
pub mod prediction;
pub mod promotion;

pub use config::{ForecastConfig, TrimPolicy, DEFAULT_HORIZON_WEEKS, DEFAULT_SEED};
pub use point::{last_date, prepare_history, HistoricalPoint};
pub use prediction::{DailyPrediction, WeeklyForecastPoint};
pub use promotion::PromotionSet;
