//! Headline figures for a series: latest value, period-over-period and
//! year-over-year change.

use crate::series::{NormalizedSeries, Observation};
use chrono::Months;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesSummary {
    pub latest: Observation,
    pub previous: Option<Observation>,
    /// Percent change vs the previous observation.
    pub change_pct: Option<f64>,
    /// Last observation on or before one year before `latest`.
    pub year_ago: Option<Observation>,
    /// Percent change vs `year_ago`.
    pub yoy_pct: Option<f64>,
    pub count: usize,
}

/// Summarize `series`; `None` when it is empty.
pub fn summarize(series: &NormalizedSeries) -> Option<SeriesSummary> {
    let observations = series.observations();
    let (&latest, rest) = observations.split_last()?;
    let previous = rest.last().copied();

    let year_ago = latest
        .date
        .checked_sub_months(Months::new(12))
        .and_then(|cutoff| rest.iter().rev().find(|o| o.date <= cutoff).copied());

    Some(SeriesSummary {
        latest,
        previous,
        change_pct: previous.and_then(|p| pct_change(p.value, latest.value)),
        year_ago,
        yoy_pct: year_ago.and_then(|y| pct_change(y.value, latest.value)),
        count: observations.len(),
    })
}

/// `None` when the base is zero.
pub fn pct_change(from: f64, to: f64) -> Option<f64> {
    if from == 0.0 {
        return None;
    }
    let pct = (to - from) / from.abs() * 100.0;
    pct.is_finite().then_some(pct)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn obs(y: i32, m: u32, d: u32, v: f64) -> Observation {
        Observation::new(NaiveDate::from_ymd_opt(y, m, d).unwrap(), v)
    }

    #[test]
    fn empty_series_has_no_summary() {
        assert!(summarize(&NormalizedSeries::empty()).is_none());
    }

    #[test]
    fn single_observation() {
        let s = summarize(&NormalizedSeries::new(vec![obs(2024, 1, 1, 40.0)])).unwrap();
        assert_eq!(s.latest.value, 40.0);
        assert!(s.previous.is_none());
        assert!(s.change_pct.is_none());
        assert!(s.yoy_pct.is_none());
    }

    #[test]
    fn monthly_changes() {
        let mut rows: Vec<Observation> = (1..=12).map(|m| obs(2023, m, 1, 100.0 + m as f64)).collect();
        rows.push(obs(2024, 1, 1, 110.0));
        let s = summarize(&NormalizedSeries::new(rows)).unwrap();

        assert_eq!(s.previous.unwrap().value, 112.0);
        assert!((s.change_pct.unwrap() - (110.0 - 112.0) / 112.0 * 100.0).abs() < 1e-9);
        assert_eq!(s.year_ago.unwrap().date, NaiveDate::from_ymd_opt(2023, 1, 1).unwrap());
        assert!((s.yoy_pct.unwrap() - 9.0 / 101.0 * 100.0).abs() < 1e-9);
        assert_eq!(s.count, 13);
    }

    #[test]
    fn year_ago_uses_last_observation_on_or_before_cutoff() {
        // Daily series with a gap around the anniversary.
        let s = summarize(&NormalizedSeries::new(vec![
            obs(2023, 1, 2, 70.0),
            obs(2023, 1, 5, 75.0),
            obs(2024, 1, 3, 100.0),
        ]))
        .unwrap();
        assert_eq!(s.year_ago.unwrap().value, 70.0);
    }

    #[test]
    fn zero_base_has_no_change() {
        assert_eq!(pct_change(0.0, 5.0), None);
        assert_eq!(pct_change(-10.0, -5.0), Some(50.0));
    }
}
