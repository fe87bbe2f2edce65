//! Canonical series types shared by the normalizer, the snapshot cache and the
//! acquisition orchestrator.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A single (date, value) observation. Both fields are always present and the
/// value is always finite.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub date: NaiveDate,
    pub value: f64,
}

impl Observation {
    pub fn new(date: NaiveDate, value: f64) -> Self {
        Self { date, value }
    }
}

/// Date-ordered sequence of observations.
///
/// Ordering is ascending by date and stable: observations sharing a date keep
/// their relative input order. Duplicate dates are not collapsed.
/// Serialized as a plain array; deserializing goes through [`NormalizedSeries::new`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<Observation>", into = "Vec<Observation>")]
pub struct NormalizedSeries {
    observations: Vec<Observation>,
}

impl NormalizedSeries {
    /// Build a series, sorting the observations ascending by date.
    pub fn new(mut observations: Vec<Observation>) -> Self {
        observations.sort_by_key(|o| o.date);
        Self { observations }
    }

    /// The empty series returned alongside `Provenance::Unavailable`.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    pub fn observations(&self) -> &[Observation] {
        &self.observations
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Observation> {
        self.observations.iter()
    }

    pub fn first(&self) -> Option<&Observation> {
        self.observations.first()
    }

    pub fn last(&self) -> Option<&Observation> {
        self.observations.last()
    }

    /// The last `n` observations (all of them if the series is shorter).
    pub fn tail(&self, n: usize) -> &[Observation] {
        let start = self.observations.len().saturating_sub(n);
        &self.observations[start..]
    }

    /// True if dates never decrease from one observation to the next.
    pub fn is_date_ordered(&self) -> bool {
        self.observations.windows(2).all(|w| w[0].date <= w[1].date)
    }

    /// Pairs view used for equality checks against external data.
    pub fn pairs(&self) -> Vec<(NaiveDate, f64)> {
        self.observations.iter().map(|o| (o.date, o.value)).collect()
    }

    pub fn into_observations(self) -> Vec<Observation> {
        self.observations
    }
}

impl From<Vec<Observation>> for NormalizedSeries {
    fn from(observations: Vec<Observation>) -> Self {
        Self::new(observations)
    }
}

impl From<NormalizedSeries> for Vec<Observation> {
    fn from(series: NormalizedSeries) -> Self {
        series.into_observations()
    }
}

impl<'a> IntoIterator for &'a NormalizedSeries {
    type Item = &'a Observation;
    type IntoIter = std::slice::Iter<'a, Observation>;

    fn into_iter(self) -> Self::IntoIter {
        self.observations.iter()
    }
}

/// Where the data in an acquisition result came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Provenance {
    /// Fetched and normalized during this call.
    Live,
    /// Every endpoint failed; served from the last snapshot.
    Cached,
    /// Every endpoint failed and there was no usable snapshot.
    Unavailable,
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Provenance::Live => "LIVE",
            Provenance::Cached => "CACHED",
            Provenance::Unavailable => "UNAVAILABLE",
        };
        f.write_str(s)
    }
}
