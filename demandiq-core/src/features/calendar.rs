//! Calendar feature extraction.
//!
//! Every date maps to its position in the calendar (weekday, quarter, month,
//! year, ordinal day, ISO week) plus a promotion flag. Pure; no state.

use chrono::{Datelike, Duration, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::domain::PromotionSet;

/// Names of the regressor columns, in the order produced by [`FeatureRow::regressors`].
///
/// `is_promotion` is carried on the row but not fed to the tree ensemble; the
/// ensemble applies a fixed boost on promotion days instead.
pub const FEATURE_NAMES: [&str; 6] = [
    "day_of_week",
    "quarter",
    "month",
    "year",
    "day_of_year",
    "iso_week",
];

/// Calendar-position features of a single date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureRow {
    pub date: NaiveDate,
    /// Monday = 0 … Sunday = 6.
    pub day_of_week: u32,
    pub quarter: u32,
    pub month: u32,
    pub year: i32,
    pub day_of_year: u32,
    pub iso_week: u32,
    pub is_promotion: u8,
}

impl FeatureRow {
    pub fn from_date(date: NaiveDate, promotions: &PromotionSet) -> Self {
        let month = date.month();
        Self {
            date,
            day_of_week: date.weekday().num_days_from_monday(),
            quarter: (month - 1) / 3 + 1,
            month,
            year: date.year(),
            day_of_year: date.ordinal(),
            iso_week: date.iso_week().week(),
            is_promotion: u8::from(promotions.contains(date)),
        }
    }

    pub fn is_promotion(&self) -> bool {
        self.is_promotion == 1
    }

    /// Numeric regressor vector in [`FEATURE_NAMES`] order.
    pub fn regressors(&self) -> [f64; FEATURE_NAMES.len()] {
        [
            f64::from(self.day_of_week),
            f64::from(self.quarter),
            f64::from(self.month),
            f64::from(self.year),
            f64::from(self.day_of_year),
            f64::from(self.iso_week),
        ]
    }
}

/// One [`FeatureRow`] per input date, in input order.
pub fn extract_features(dates: &[NaiveDate], promotions: &PromotionSet) -> Vec<FeatureRow> {
    dates
        .iter()
        .map(|&date| FeatureRow::from_date(date, promotions))
        .collect()
}

/// `days` consecutive calendar days starting the day after `last`.
pub fn future_dates(last: NaiveDate, days: i64) -> Vec<NaiveDate> {
    (1..=days.max(0)).map(|i| last + Duration::days(i)).collect()
}
