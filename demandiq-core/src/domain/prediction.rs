//! Prediction outputs: per-day model output and the weekly points handed back to callers.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Model output for one future day.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DailyPrediction {
    pub date: NaiveDate,
    /// Value produced by the fitted model.
    pub raw_value: f64,
    /// Value after any promotion adjustment (equal to `raw_value` otherwise).
    pub value: f64,
    pub is_promotion: bool,
}

/// One week of forecast, labelled by the Friday that closes the week.
///
/// Serialized with the `ds` / `yhat` field names used by downstream consumers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeeklyForecastPoint {
    #[serde(rename = "ds")]
    pub week_ending_date: NaiveDate,
    #[serde(rename = "yhat")]
    pub predicted_value: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weekly_point_uses_wire_names() {
        let point = WeeklyForecastPoint {
            week_ending_date: NaiveDate::from_ymd_opt(2024, 1, 5).unwrap(),
            predicted_value: 12.5,
        };
        let json = serde_json::to_string(&point).unwrap();
        assert_eq!(json, r#"{"ds":"2024-01-05","yhat":12.5}"#);
    }
}
