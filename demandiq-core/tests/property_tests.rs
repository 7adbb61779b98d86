//! Property tests for the forecasting core.
//!
//! Uses proptest to verify:
//! 1. Resampler — Friday anchors, bucket means, order invariance
//! 2. Calendar features — field ranges and the promotion flag
//! 3. Dispatch — case-insensitive tokens, everything else rejected
//! 4. Idempotence — identical inputs give identical forecasts

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use proptest::prelude::*;
use std::collections::BTreeMap;

use demandiq_core::features::{extract_features, future_dates};
use demandiq_core::resample::{resample_weekly, week_ending_friday};
use demandiq_core::{forecast, ForecastConfig, ForecastError, HistoricalPoint, ModelKind, PromotionSet};

// ── Strategies (proptest) ────────────────────────────────────────────

fn arb_date() -> impl Strategy<Value = NaiveDate> {
    (0i64..3650).prop_map(|offset| NaiveDate::from_ymd_opt(2018, 1, 1).unwrap() + Duration::days(offset))
}

fn arb_daily_values() -> impl Strategy<Value = Vec<(NaiveDate, f64)>> {
    prop::collection::vec((arb_date(), -1000.0..1000.0_f64), 1..60)
}

fn arb_mixed_case(word: &'static str) -> impl Strategy<Value = String> {
    prop::collection::vec(any::<bool>(), word.len()).prop_map(move |upper| {
        word.chars()
            .zip(upper)
            .map(|(c, u)| if u { c.to_ascii_uppercase() } else { c })
            .collect()
    })
}

// ── 1. Resampler ─────────────────────────────────────────────────────

proptest! {
    /// Every bucket is labelled by a Friday no earlier than any of its days
    /// and less than a week after them.
    #[test]
    fn anchors_are_following_fridays(date in arb_date()) {
        let anchor = week_ending_friday(date);
        prop_assert_eq!(anchor.weekday(), Weekday::Fri);
        prop_assert!(anchor >= date);
        prop_assert!((anchor - date).num_days() < 7);
    }

    /// Bucket values are the mean of exactly the days mapped to them.
    #[test]
    fn bucket_values_are_means(values in arb_daily_values()) {
        let mut expected: BTreeMap<NaiveDate, Vec<f64>> = BTreeMap::new();
        for (date, value) in &values {
            expected.entry(week_ending_friday(*date)).or_default().push(*value);
        }

        let weekly = resample_weekly(values.iter().copied());
        prop_assert_eq!(weekly.len(), expected.len());
        for (point, (anchor, members)) in weekly.iter().zip(&expected) {
            prop_assert_eq!(point.week_ending_date, *anchor);
            let mean = members.iter().sum::<f64>() / members.len() as f64;
            prop_assert!((point.predicted_value - mean).abs() < 1e-9);
        }
    }

    /// Output is ascending and does not depend on input order.
    #[test]
    fn resampling_ignores_input_order(values in arb_daily_values()) {
        let forward = resample_weekly(values.iter().copied());
        let backward = resample_weekly(values.iter().rev().copied());
        prop_assert!(forward.windows(2).all(|w| w[0].week_ending_date < w[1].week_ending_date));
        prop_assert_eq!(forward.len(), backward.len());
        for (a, b) in forward.iter().zip(&backward) {
            prop_assert_eq!(a.week_ending_date, b.week_ending_date);
            prop_assert!((a.predicted_value - b.predicted_value).abs() < 1e-9);
        }
    }
}

// ── 2. Calendar features ─────────────────────────────────────────────

proptest! {
    #[test]
    fn feature_fields_stay_in_range(
        dates in prop::collection::vec(arb_date(), 1..40),
        promo_mask in prop::collection::vec(any::<bool>(), 40),
    ) {
        let promotions: PromotionSet = dates
            .iter()
            .zip(&promo_mask)
            .filter(|(_, &on)| on)
            .map(|(d, _)| *d)
            .collect();
        let rows = extract_features(&dates, &promotions);

        prop_assert_eq!(rows.len(), dates.len());
        for (row, date) in rows.iter().zip(&dates) {
            prop_assert_eq!(row.date, *date);
            prop_assert!(row.day_of_week < 7);
            prop_assert_eq!(row.quarter, (row.month - 1) / 3 + 1);
            prop_assert!((1..=53).contains(&row.iso_week));
            prop_assert!((1..=366).contains(&row.day_of_year));
            prop_assert_eq!(row.is_promotion(), promotions.contains(*date));
        }
    }

    #[test]
    fn future_dates_are_consecutive(last in arb_date(), days in 0i64..400) {
        let dates = future_dates(last, days);
        prop_assert_eq!(dates.len() as i64, days);
        if let Some(first) = dates.first() {
            prop_assert_eq!(*first, last + Duration::days(1));
        }
        prop_assert!(dates.windows(2).all(|w| w[1] - w[0] == Duration::days(1)));
    }
}

// ── 3. Dispatch ──────────────────────────────────────────────────────

proptest! {
    #[test]
    fn mixed_case_tokens_resolve(
        prophet in arb_mixed_case("prophet"),
        xgboost in arb_mixed_case("xgboost"),
    ) {
        prop_assert_eq!(prophet.parse::<ModelKind>().unwrap(), ModelKind::SeasonalDecomposition);
        prop_assert_eq!(xgboost.parse::<ModelKind>().unwrap(), ModelKind::TreeEnsemble);
    }

    #[test]
    fn other_tokens_are_rejected(token in "[a-z]{1,12}") {
        prop_assume!(token != "prophet" && token != "xgboost");
        let err = forecast(&token, &[], &ForecastConfig::default()).unwrap_err();
        prop_assert_eq!(err, ForecastError::InvalidModel(token));
    }
}

// ── 4. Idempotence ───────────────────────────────────────────────────

proptest! {
    #![proptest_config(ProptestConfig::with_cases(6))]

    #[test]
    fn forecasts_are_idempotent(
        levels in prop::collection::vec(10.0..200.0_f64, 30..50),
        model in prop::sample::select(vec!["prophet", "xgboost"]),
        horizon in 1u32..6,
    ) {
        let start = NaiveDate::from_ymd_opt(2021, 1, 3).unwrap();
        let history: Vec<HistoricalPoint> = levels
            .iter()
            .enumerate()
            .map(|(i, v)| HistoricalPoint::new(start + Duration::weeks(i as i64), *v))
            .collect();
        let config = ForecastConfig::new(horizon, PromotionSet::new());

        let first = forecast(model, &history, &config).unwrap();
        let second = forecast(model, &history, &config).unwrap();
        prop_assert_eq!(first, second);
    }
}
