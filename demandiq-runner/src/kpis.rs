//! Dashboard KPIs over the cached series.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use demandiq_core::HistoricalPoint;

use crate::cache::SeriesCache;
use crate::data_loader::DataError;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DashboardKpis {
    pub total_keywords_tracked: usize,
    pub highest_interest_keyword: Option<String>,
    pub highest_interest_value: Option<f64>,
    pub most_recent_peak_date: Option<NaiveDate>,
}

/// KPIs from `(keyword, series)` pairs.
///
/// The peak is the single highest value across every series. Ties go to the
/// later date, then to the alphabetically first keyword.
pub fn kpis_from_series<'a, I>(series: I) -> DashboardKpis
where
    I: IntoIterator<Item = (&'a str, &'a [HistoricalPoint])>,
{
    let mut kpis = DashboardKpis::default();
    let mut peak: Option<(&str, HistoricalPoint)> = None;

    for (keyword, points) in series {
        kpis.total_keywords_tracked += 1;
        for point in points.iter().filter(|p| p.is_usable()) {
            let better = match &peak {
                None => true,
                Some((best_kw, best)) => {
                    point.value > best.value
                        || (point.value == best.value
                            && (point.date > best.date
                                || (point.date == best.date && keyword < *best_kw)))
                }
            };
            if better {
                peak = Some((keyword, *point));
            }
        }
    }

    if let Some((keyword, point)) = peak {
        kpis.highest_interest_keyword = Some(keyword.to_string());
        kpis.highest_interest_value = Some(point.value);
        kpis.most_recent_peak_date = Some(point.date);
    }
    kpis
}

/// KPIs over every term in `cache`. Terms whose series cannot be read count
/// as tracked but contribute no peak.
pub fn compute_kpis(cache: &SeriesCache) -> Result<DashboardKpis, DataError> {
    let keywords = cache.keywords()?;
    let mut loaded = Vec::with_capacity(keywords.len());
    for keyword in keywords {
        let points = cache.load(&keyword)?.unwrap_or_default();
        loaded.push((keyword, points));
    }
    Ok(kpis_from_series(
        loaded.iter().map(|(k, p)| (k.as_str(), p.as_slice())),
    ))
}
