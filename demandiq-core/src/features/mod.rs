//! Feature engineering over calendar time.

pub mod calendar;

pub use calendar::{extract_features, future_dates, FeatureRow, FEATURE_NAMES};
