//! Acquisition orchestrator: live fetch → normalize → snapshot, with fallback.
//!
//! Per descriptor the endpoints are tried in order (primary, then alternate).
//! The first endpoint whose payload normalizes wins: its series is written to
//! the snapshot cache and returned as `LIVE`. When every endpoint fails the
//! last snapshot is served as `CACHED`, or an empty series as `UNAVAILABLE`.
//!
//! Network and data failures never surface as errors; they are recorded in
//! [`AcquisitionResult::failures`]. The only error is an invalid descriptor.

use super::normalize::{normalize, NormalizationError};
use super::provider::FetchError;
use super::snapshot::SnapshotCache;
use super::sources::{FetcherFactory, HttpSources};
use crate::config::{Config, ConfigError};
use crate::descriptor::{Endpoint, SeriesDescriptor};
use crate::series::{NormalizedSeries, Provenance};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Why one endpoint did not produce a series.
#[derive(Debug, Clone, Error)]
pub enum AcquireFailure {
    #[error("{endpoint}: fetch failed: {error}")]
    Fetch { endpoint: String, error: FetchError },

    #[error("{endpoint}: normalization failed: {error}")]
    Normalize {
        endpoint: String,
        error: NormalizationError,
    },
}

impl AcquireFailure {
    pub fn endpoint(&self) -> &str {
        match self {
            AcquireFailure::Fetch { endpoint, .. } | AcquireFailure::Normalize { endpoint, .. } => {
                endpoint
            }
        }
    }
}

/// Outcome of acquiring one series.
#[derive(Debug, Clone)]
pub struct AcquisitionResult {
    pub name: String,
    /// Empty iff `provenance` is `Unavailable`.
    pub series: NormalizedSeries,
    pub provenance: Provenance,
    /// Endpoint that served a `Live` result.
    pub source: Option<String>,
    /// Failed endpoints, in attempt order.
    pub failures: Vec<AcquireFailure>,
}

impl AcquisitionResult {
    pub fn is_live(&self) -> bool {
        self.provenance == Provenance::Live
    }
}

/// One endpoint's result from [`Acquirer::probe`].
#[derive(Debug)]
pub struct ProbeOutcome {
    pub endpoint: String,
    pub outcome: Result<NormalizedSeries, AcquireFailure>,
    pub elapsed: Duration,
}

/// Progress callback for multi-series acquisition.
pub trait AcquireProgress: Send {
    fn on_start(&self, name: &str, index: usize, total: usize);

    fn on_complete(
        &self,
        name: &str,
        index: usize,
        total: usize,
        result: &Result<AcquisitionResult, ConfigError>,
    );

    fn on_batch_complete(&self, summary: &AcquireSummary);
}

/// Prints progress to stderr, leaving stdout to the caller's output.
pub struct StderrProgress;

impl AcquireProgress for StderrProgress {
    fn on_start(&self, name: &str, index: usize, total: usize) {
        eprintln!("[{}/{}] Fetching {name}...", index + 1, total);
    }

    fn on_complete(
        &self,
        name: &str,
        _index: usize,
        _total: usize,
        result: &Result<AcquisitionResult, ConfigError>,
    ) {
        match result {
            Ok(r) => eprintln!("  {}: {name} ({} rows)", r.provenance, r.series.len()),
            Err(e) => eprintln!("  INVALID: {name}: {e}"),
        }
    }

    fn on_batch_complete(&self, summary: &AcquireSummary) {
        eprintln!(
            "\nDone: {} live, {} cached, {} unavailable, {} invalid",
            summary.count(Provenance::Live),
            summary.count(Provenance::Cached),
            summary.count(Provenance::Unavailable),
            summary.rejected.len()
        );
    }
}

/// Silent progress.
pub struct NoProgress;

impl AcquireProgress for NoProgress {
    fn on_start(&self, _name: &str, _index: usize, _total: usize) {}
    fn on_complete(
        &self,
        _name: &str,
        _index: usize,
        _total: usize,
        _result: &Result<AcquisitionResult, ConfigError>,
    ) {
    }
    fn on_batch_complete(&self, _summary: &AcquireSummary) {}
}

/// Summary of a batch acquisition.
#[derive(Debug, Default)]
pub struct AcquireSummary {
    pub results: Vec<AcquisitionResult>,
    /// Descriptors that failed validation.
    pub rejected: Vec<(String, ConfigError)>,
}

impl AcquireSummary {
    pub fn total(&self) -> usize {
        self.results.len() + self.rejected.len()
    }

    pub fn count(&self, provenance: Provenance) -> usize {
        self.results
            .iter()
            .filter(|r| r.provenance == provenance)
            .count()
    }

    pub fn all_live(&self) -> bool {
        self.rejected.is_empty() && self.results.iter().all(AcquisitionResult::is_live)
    }
}

pub struct Acquirer {
    cache: SnapshotCache,
    sources: Box<dyn FetcherFactory>,
}

impl Acquirer {
    pub fn new(cache: SnapshotCache, sources: impl FetcherFactory + 'static) -> Self {
        Self {
            cache,
            sources: Box::new(sources),
        }
    }

    /// Production wiring: reqwest transports and the configured cache dir.
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            SnapshotCache::new(&config.cache.dir),
            HttpSources::new(config.retry.clone()),
        )
    }

    pub fn cache(&self) -> &SnapshotCache {
        &self.cache
    }

    /// Acquire one series.
    ///
    /// Each configured endpoint is attempted exactly once (transport retries
    /// included). Errors only when the descriptor itself is invalid.
    pub fn acquire(&self, descriptor: &SeriesDescriptor) -> Result<AcquisitionResult, ConfigError> {
        descriptor.validate()?;
        let name = &descriptor.name;
        let mut failures = Vec::new();

        for endpoint in descriptor.endpoints() {
            match self.try_live(descriptor, endpoint) {
                Ok(series) => {
                    let source = endpoint.label();
                    self.cache.write_from(name, &series, &source);
                    info!(series = %name, %source, rows = series.len(), "LIVE");
                    return Ok(AcquisitionResult {
                        name: name.clone(),
                        series,
                        provenance: Provenance::Live,
                        source: Some(source),
                        failures,
                    });
                }
                Err(failure) => {
                    warn!(series = %name, error = %failure, "endpoint failed");
                    failures.push(failure);
                }
            }
        }

        let (series, provenance) = match self.cache.read(name) {
            Some(series) => (series, Provenance::Cached),
            None => (NormalizedSeries::empty(), Provenance::Unavailable),
        };
        warn!(series = %name, rows = series.len(), "{provenance}");

        Ok(AcquisitionResult {
            name: name.clone(),
            series,
            provenance,
            source: None,
            failures,
        })
    }

    /// Acquire several series in order, reporting progress as it goes.
    pub fn acquire_all(
        &self,
        descriptors: &[&SeriesDescriptor],
        progress: &dyn AcquireProgress,
    ) -> AcquireSummary {
        let total = descriptors.len();
        let mut summary = AcquireSummary::default();

        for (i, descriptor) in descriptors.iter().enumerate() {
            progress.on_start(&descriptor.name, i, total);
            let result = self.acquire(descriptor);
            progress.on_complete(&descriptor.name, i, total, &result);

            match result {
                Ok(r) => summary.results.push(r),
                Err(e) => summary.rejected.push((descriptor.name.clone(), e)),
            }
        }

        progress.on_batch_complete(&summary);
        summary
    }

    /// Fetch and normalize every endpoint of `descriptor` without reading or
    /// writing the snapshot cache.
    pub fn probe(&self, descriptor: &SeriesDescriptor) -> Result<Vec<ProbeOutcome>, ConfigError> {
        descriptor.validate()?;
        Ok(descriptor
            .endpoints()
            .map(|endpoint| {
                let started = Instant::now();
                let outcome = self.try_live(descriptor, endpoint);
                ProbeOutcome {
                    endpoint: endpoint.label(),
                    outcome,
                    elapsed: started.elapsed(),
                }
            })
            .collect())
    }

    /// FETCHING → NORMALIZING for one endpoint.
    fn try_live(
        &self,
        descriptor: &SeriesDescriptor,
        endpoint: &Endpoint,
    ) -> Result<NormalizedSeries, AcquireFailure> {
        let label = endpoint.label();
        let fetch_failed = |error| AcquireFailure::Fetch {
            endpoint: label.clone(),
            error,
        };

        debug!(series = %descriptor.name, endpoint = %label, "fetching");
        let fetcher = self.sources.fetcher_for(endpoint).map_err(fetch_failed)?;
        let payload = fetcher.fetch().map_err(fetch_failed)?;

        let (date_field, value_field) = descriptor.fields_for(endpoint);
        debug!(series = %descriptor.name, date_field, value_field, "normalizing");
        normalize(&payload, date_field, value_field).map_err(|error| AcquireFailure::Normalize {
            endpoint: label.clone(),
            error,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::provider::{FetchErrorKind, RawFetcher, RawPayload};
    use crate::descriptor::{Frequency, SourceKind};
    use crate::series::Observation;
    use chrono::NaiveDate;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    /// Fetcher factory keyed by endpoint locator.
    #[derive(Default, Clone)]
    struct FakeSources {
        responses: HashMap<String, Result<RawPayload, FetchError>>,
        calls: Arc<Mutex<Vec<String>>>,
    }

    impl FakeSources {
        fn respond(mut self, locator: &str, response: Result<RawPayload, FetchError>) -> Self {
            self.responses.insert(locator.to_string(), response);
            self
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    struct FakeFetcher(Result<RawPayload, FetchError>);

    impl RawFetcher for FakeFetcher {
        fn name(&self) -> &str {
            "fake"
        }
        fn fetch(&self) -> Result<RawPayload, FetchError> {
            self.0.clone()
        }
    }

    impl FetcherFactory for FakeSources {
        fn fetcher_for(&self, endpoint: &Endpoint) -> Result<Box<dyn RawFetcher>, FetchError> {
            self.calls.lock().unwrap().push(endpoint.locator.clone());
            let response = self.responses.get(&endpoint.locator).cloned().unwrap_or_else(|| {
                Err(FetchError::new(FetchErrorKind::ConnectionFailed, "unreachable"))
            });
            Ok(Box::new(FakeFetcher(response)))
        }
    }

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn descriptor(alternate: Option<Endpoint>) -> SeriesDescriptor {
        SeriesDescriptor {
            name: "BADLAR".into(),
            label: String::new(),
            date_field: "fecha".into(),
            value_field: "valor".into(),
            unit: "% TNA".into(),
            frequency: Frequency::Daily,
            primary: Endpoint::new(SourceKind::BcraMonetary, "145"),
            alternate,
        }
    }

    fn bcra_body() -> RawPayload {
        RawPayload::Json(json!({"results": [
            {"fecha": "2024-01-02", "valor": 39.0},
            {"fecha": "2024-01-01", "valor": 38.5}
        ]}))
    }

    #[test]
    fn live_result_is_written_to_cache() {
        let dir = tempfile::tempdir().unwrap();
        let sources = FakeSources::default().respond("145", Ok(bcra_body()));
        let acquirer = Acquirer::new(SnapshotCache::new(dir.path()), sources);

        let result = acquirer.acquire(&descriptor(None)).unwrap();
        assert_eq!(result.provenance, Provenance::Live);
        assert_eq!(result.source.as_deref(), Some("bcra_monetary:145"));
        assert_eq!(result.series.pairs(), vec![(d(2024, 1, 1), 38.5), (d(2024, 1, 2), 39.0)]);
        assert!(result.failures.is_empty());

        let cached = acquirer.cache().read("BADLAR").unwrap();
        assert_eq!(cached, result.series);
    }

    #[test]
    fn failed_cache_write_still_returns_live() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "x").unwrap();
        let sources = FakeSources::default().respond("145", Ok(bcra_body()));
        let acquirer = Acquirer::new(SnapshotCache::new(&blocker), sources);

        let result = acquirer.acquire(&descriptor(None)).unwrap();
        assert_eq!(result.provenance, Provenance::Live);
        assert_eq!(result.series.pairs(), vec![(d(2024, 1, 1), 38.5), (d(2024, 1, 2), 39.0)]);
        assert!(result.failures.is_empty());
        assert!(acquirer.cache().read("BADLAR").is_none());
    }

    #[test]
    fn fetch_failure_serves_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let cache = SnapshotCache::new(dir.path());
        let snapshot = NormalizedSeries::new(vec![
            Observation::new(d(2024, 1, 1), 38.5),
            Observation::new(d(2024, 1, 2), 39.0),
        ]);
        cache.write("BADLAR", &snapshot);

        let acquirer = Acquirer::new(cache, FakeSources::default());
        let result = acquirer.acquire(&descriptor(None)).unwrap();
        assert_eq!(result.provenance, Provenance::Cached);
        assert_eq!(result.series, snapshot);
        assert_eq!(result.failures.len(), 1);
        assert_eq!(result.failures[0].endpoint(), "bcra_monetary:145");
    }

    #[test]
    fn normalization_failure_falls_back_without_overwriting() {
        let dir = tempfile::tempdir().unwrap();
        let cache = SnapshotCache::new(dir.path());
        let snapshot = NormalizedSeries::new(vec![Observation::new(d(2023, 12, 29), 100.0)]);
        cache.write("BADLAR", &snapshot);

        let garbage = RawPayload::Json(json!({"results": [{"fecha": "??", "valor": "x"}]}));
        let sources = FakeSources::default().respond("145", Ok(garbage));
        let acquirer = Acquirer::new(cache, sources);

        let result = acquirer.acquire(&descriptor(None)).unwrap();
        assert_eq!(result.provenance, Provenance::Cached);
        assert!(matches!(result.failures[0], AcquireFailure::Normalize { .. }));
        assert_eq!(acquirer.cache().read("BADLAR").unwrap(), snapshot);
    }

    #[test]
    fn nothing_anywhere_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let acquirer = Acquirer::new(SnapshotCache::new(dir.path()), FakeSources::default());
        let result = acquirer.acquire(&descriptor(None)).unwrap();
        assert_eq!(result.provenance, Provenance::Unavailable);
        assert!(result.series.is_empty());
    }

    #[test]
    fn alternate_endpoint_is_tried_once_after_primary() {
        let dir = tempfile::tempdir().unwrap();
        let alternate = Endpoint::new(SourceKind::CsvDistribution, "https://cdn.example/badlar.csv")
            .with_fields("date", "value");
        let sources = FakeSources::default().respond(
            "https://cdn.example/badlar.csv",
            Ok(RawPayload::Csv("date,value\n2024-01-01,38.5\n".into())),
        );
        let acquirer = Acquirer::new(SnapshotCache::new(dir.path()), sources.clone());

        let result = acquirer.acquire(&descriptor(Some(alternate))).unwrap();
        assert_eq!(result.provenance, Provenance::Live);
        assert_eq!(result.source.as_deref(), Some("csv_distribution:cdn.example/badlar.csv"));
        assert_eq!(result.failures.len(), 1);
        assert_eq!(sources.calls(), vec!["145", "https://cdn.example/badlar.csv"]);
    }

    #[test]
    fn invalid_descriptor_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let acquirer = Acquirer::new(SnapshotCache::new(dir.path()), FakeSources::default());
        let mut bad = descriptor(None);
        bad.primary.locator = "abc".into();
        assert!(matches!(
            acquirer.acquire(&bad),
            Err(ConfigError::InvalidDescriptor { .. })
        ));
    }

    #[test]
    fn probe_skips_the_cache() {
        let dir = tempfile::tempdir().unwrap();
        let sources = FakeSources::default().respond("145", Ok(bcra_body()));
        let acquirer = Acquirer::new(SnapshotCache::new(dir.path()), sources);

        let outcomes = acquirer.probe(&descriptor(None)).unwrap();
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].outcome.as_ref().unwrap().len(), 2);
        assert!(acquirer.cache().read("BADLAR").is_none());
    }

    #[test]
    fn acquire_all_collects_results_and_rejections() {
        let dir = tempfile::tempdir().unwrap();
        let sources = FakeSources::default().respond("145", Ok(bcra_body()));
        let acquirer = Acquirer::new(SnapshotCache::new(dir.path()), sources);

        let good = descriptor(None);
        let mut offline = descriptor(None);
        offline.name = "TPM".into();
        offline.primary.locator = "160".into();
        let mut bad = descriptor(None);
        bad.name = "../BAD".into();

        let summary = acquirer.acquire_all(&[&good, &offline, &bad], &NoProgress);
        assert_eq!(summary.total(), 3);
        assert_eq!(summary.count(Provenance::Live), 1);
        assert_eq!(summary.count(Provenance::Unavailable), 1);
        assert_eq!(summary.rejected.len(), 1);
        assert!(!summary.all_live());
    }
}
