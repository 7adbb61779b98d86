//! Forecast dispatch, error taxonomy and time budgets.

pub mod deadline;
pub mod dispatch;
pub mod error;

pub use deadline::Deadline;
pub use dispatch::{forecast, forecast_with_deadline, Forecaster, ModelKind};
pub use error::ForecastError;
