//! Flat-file snapshot cache: the last good normalized series per key.
//!
//! Layout:
//! - `{cache_dir}/{key}.csv`       header `date,value`, one row per observation
//! - `{cache_dir}/{key}.meta.json` date range, row count, BLAKE3 of the CSV bytes
//!
//! Writes are atomic (write `.tmp`, rename into place) and best-effort: a
//! failed write is logged and the caller carries on. Reads never error; any
//! problem with the file reads as "no snapshot".

use crate::series::{NormalizedSeries, Observation};
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

/// A key is usable as a file stem: 1-64 chars of `[A-Za-z0-9_.-]`, not
/// starting with `.`.
pub fn is_safe_key(key: &str) -> bool {
    !key.is_empty()
        && key.len() <= 64
        && !key.starts_with('.')
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
}

/// Metadata sidecar for a cached series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotMeta {
    pub key: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub row_count: usize,
    pub data_hash: String,
    /// Endpoint the series was fetched from.
    pub source: String,
    pub cached_at: NaiveDateTime,
}

/// Snapshot status for one key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotStatus {
    pub key: String,
    pub cached: bool,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub row_count: Option<usize>,
    pub cached_at: Option<NaiveDateTime>,
}

#[derive(Debug, Error)]
enum SnapshotError {
    #[error("unsafe cache key '{0}'")]
    UnsafeKey(String),

    #[error("refusing to snapshot an empty series")]
    Empty,

    #[error("{action} {}: {source}", path.display())]
    Io {
        action: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("encode csv: {0}")]
    Csv(#[from] csv::Error),

    #[error("encode meta: {0}")]
    Meta(#[from] serde_json::Error),
}

fn io_err<'a>(action: &'static str, path: &'a Path) -> impl FnOnce(std::io::Error) -> SnapshotError + 'a {
    move |source| SnapshotError::Io {
        action,
        path: path.to_path_buf(),
        source,
    }
}

#[derive(Debug, Clone)]
pub struct SnapshotCache {
    cache_dir: PathBuf,
}

impl SnapshotCache {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
        }
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// `{cache_dir}/{key}.csv`
    pub fn data_path(&self, key: &str) -> PathBuf {
        self.cache_dir.join(format!("{key}.csv"))
    }

    fn meta_path(&self, key: &str) -> PathBuf {
        self.cache_dir.join(format!("{key}.meta.json"))
    }

    /// Persist `series` under `key`, replacing any previous snapshot.
    pub fn write(&self, key: &str, series: &NormalizedSeries) {
        self.write_from(key, series, "unknown");
    }

    /// Like [`write`](Self::write), recording which endpoint produced the data.
    pub fn write_from(&self, key: &str, series: &NormalizedSeries, source: &str) {
        match self.try_write(key, series, source) {
            Ok(()) => debug!(key, rows = series.len(), "snapshot written"),
            Err(e) => warn!(key, error = %e, "snapshot write failed"),
        }
    }

    fn try_write(&self, key: &str, series: &NormalizedSeries, source: &str) -> Result<(), SnapshotError> {
        if !is_safe_key(key) {
            return Err(SnapshotError::UnsafeKey(key.to_string()));
        }
        let (Some(first), Some(last)) = (series.first(), series.last()) else {
            return Err(SnapshotError::Empty);
        };

        fs::create_dir_all(&self.cache_dir).map_err(io_err("create dir", &self.cache_dir))?;

        let mut writer = csv::Writer::from_writer(Vec::new());
        for obs in series {
            writer.serialize(obs)?;
        }
        let bytes = writer
            .into_inner()
            .map_err(|e| SnapshotError::Csv(e.into_error().into()))?;

        let meta = SnapshotMeta {
            key: key.to_string(),
            start_date: first.date,
            end_date: last.date,
            row_count: series.len(),
            data_hash: blake3::hash(&bytes).to_hex().to_string(),
            source: source.to_string(),
            cached_at: chrono::Local::now().naive_local(),
        };

        write_atomic(&self.data_path(key), &bytes)?;
        write_atomic(&self.meta_path(key), &serde_json::to_vec_pretty(&meta)?)?;
        Ok(())
    }

    /// Load the snapshot for `key`.
    ///
    /// `None` when the file is absent, unreadable, empty, has any row that
    /// does not parse, or is not sorted by date.
    pub fn read(&self, key: &str) -> Option<NormalizedSeries> {
        if !is_safe_key(key) {
            return None;
        }
        let path = self.data_path(key);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(key, error = %e, "snapshot unreadable");
                return None;
            }
        };

        match decode(&bytes) {
            Ok(observations) => {
                let series = NormalizedSeries::new(observations);
                debug!(key, rows = series.len(), "snapshot loaded");
                Some(series)
            }
            Err(reason) => {
                warn!(key, path = %path.display(), reason = %reason, "ignoring unusable snapshot");
                None
            }
        }
    }

    /// Metadata for `key`, if a readable sidecar exists.
    pub fn meta(&self, key: &str) -> Option<SnapshotMeta> {
        if !is_safe_key(key) {
            return None;
        }
        let content = fs::read(self.meta_path(key)).ok()?;
        serde_json::from_slice(&content).ok()
    }

    /// A key counts as cached when its CSV exists, whatever the state of the
    /// sidecar. Meta fields are `None` when the sidecar is missing or corrupt.
    pub fn status(&self, keys: &[&str]) -> Vec<SnapshotStatus> {
        keys.iter()
            .map(|key| {
                let meta = self.meta(key);
                SnapshotStatus {
                    key: key.to_string(),
                    cached: is_safe_key(key) && self.data_path(key).is_file(),
                    start_date: meta.as_ref().map(|m| m.start_date),
                    end_date: meta.as_ref().map(|m| m.end_date),
                    row_count: meta.as_ref().map(|m| m.row_count),
                    cached_at: meta.as_ref().map(|m| m.cached_at),
                }
            })
            .collect()
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), SnapshotError> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    fs::write(&tmp, bytes).map_err(io_err("write", &tmp))?;
    fs::rename(&tmp, path).map_err(|source| {
        let _ = fs::remove_file(&tmp);
        SnapshotError::Io {
            action: "rename",
            path: path.to_path_buf(),
            source,
        }
    })
}

/// Strict decode: every row must parse and dates must be non-decreasing.
fn decode(bytes: &[u8]) -> Result<Vec<Observation>, String> {
    let mut reader = csv::Reader::from_reader(bytes);
    let headers = reader.headers().map_err(|e| format!("bad header: {e}"))?;
    if headers.iter().collect::<Vec<_>>() != ["date", "value"] {
        return Err(format!("unexpected header {headers:?}"));
    }

    let mut observations: Vec<Observation> = Vec::new();
    for (i, row) in reader.deserialize::<Observation>().enumerate() {
        let obs = row.map_err(|e| format!("row {}: {e}", i + 1))?;
        if !obs.value.is_finite() {
            return Err(format!("row {}: non-finite value", i + 1));
        }
        if observations.last().is_some_and(|prev| prev.date > obs.date) {
            return Err(format!("row {}: out of order", i + 1));
        }
        observations.push(obs);
    }

    if observations.is_empty() {
        return Err("no rows".into());
    }
    Ok(observations)
}
