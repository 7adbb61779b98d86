//! HistoricalPoint — one observed value of the tracked signal.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Observed value of the signal on a single day.
///
/// Upstream sources deliver integers (search interest 0–100) or reals (sales);
/// both are widened to `f64`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HistoricalPoint {
    pub date: NaiveDate,
    pub value: f64,
}

impl HistoricalPoint {
    pub fn new(date: NaiveDate, value: impl Into<f64>) -> Self {
        Self {
            date,
            value: value.into(),
        }
    }

    /// A point is usable for fitting when its value is finite.
    pub fn is_usable(&self) -> bool {
        self.value.is_finite()
    }
}

/// Copy a caller's series into the canonical form the models fit on.
///
/// Drops non-finite values, sorts by date, and collapses duplicate dates
/// (last occurrence wins). The input slice is never mutated.
pub fn prepare_history(points: &[HistoricalPoint]) -> Vec<HistoricalPoint> {
    let mut history: Vec<HistoricalPoint> =
        points.iter().copied().filter(|p| p.is_usable()).collect();
    let dropped = points.len() - history.len();
    if dropped > 0 {
        warn!(dropped, "dropping non-finite historical values");
    }

    // Stable sort keeps input order among equal dates, so `last wins` is well defined.
    history.sort_by_key(|p| p.date);

    let before = history.len();
    let mut deduped: Vec<HistoricalPoint> = Vec::with_capacity(before);
    for point in history {
        match deduped.last_mut() {
            Some(last) if last.date == point.date => *last = point,
            _ => deduped.push(point),
        }
    }
    if deduped.len() < before {
        warn!(
            duplicates = before - deduped.len(),
            "collapsing duplicate historical dates"
        );
    }

    deduped
}

/// Last observed date of a prepared (sorted) history.
pub fn last_date(history: &[HistoricalPoint]) -> Option<NaiveDate> {
    history.last().map(|p| p.date)
}
