//! Series descriptors: static configuration telling the pipeline where a series
//! lives and how to read it.
//!
//! A descriptor names one series, a primary [`Endpoint`] and an optional
//! alternate endpoint tried when the primary fails. Descriptors come from the
//! TOML config (see [`crate::config`]); the pipeline never invents them.

use crate::config::ConfigError;
use crate::data::snapshot::is_safe_key;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

pub const BCRA_MONETARY_BASE: &str = "https://api.bcra.gob.ar/estadisticas/v3.0/Monetarias";
pub const DATOS_GOB_SERIES_BASE: &str = "https://apis.datos.gob.ar/series/api/series";

const DEFAULT_TIMEOUT_SECS: u64 = 15;

/// The closed set of upstream source kinds the fetchers understand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// BCRA statistics API v3.0, monetary variables. Locator is the variable id.
    BcraMonetary,
    /// datos.gob.ar time-series API. Locator is the series id.
    DatosGobSeries,
    /// Plain CSV download. Locator is the full URL.
    CsvDistribution,
    /// Any JSON document. Locator is the full URL.
    Json,
}

impl SourceKind {
    /// Fixed base URL for kinds that build their URL from a base plus locator.
    pub fn default_base_url(&self) -> Option<&'static str> {
        match self {
            SourceKind::BcraMonetary => Some(BCRA_MONETARY_BASE),
            SourceKind::DatosGobSeries => Some(DATOS_GOB_SERIES_BASE),
            SourceKind::CsvDistribution | SourceKind::Json => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::BcraMonetary => "bcra_monetary",
            SourceKind::DatosGobSeries => "datos_gob_series",
            SourceKind::CsvDistribution => "csv_distribution",
            SourceKind::Json => "json",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Observation frequency of a series. Informational; the pipeline does not
/// resample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Frequency {
    Daily,
    Weekly,
    Monthly,
    Quarterly,
    Annual,
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Frequency::Daily => "daily",
            Frequency::Weekly => "weekly",
            Frequency::Monthly => "monthly",
            Frequency::Quarterly => "quarterly",
            Frequency::Annual => "annual",
        };
        f.write_str(s)
    }
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_verify_tls() -> bool {
    true
}

/// One remote location for a series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Endpoint {
    pub source: SourceKind,
    pub locator: String,
    /// Overrides the source kind's fixed base URL (mirrors, tests).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Whether this endpoint trusts the upstream certificate chain.
    #[serde(default = "default_verify_tls")]
    pub verify_tls: bool,
    /// Overrides the descriptor's date field for this endpoint only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_field: Option<String>,
    /// Overrides the descriptor's value field for this endpoint only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_field: Option<String>,
    /// Extra query parameters (row limits, offsets, date bounds).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub params: BTreeMap<String, String>,
}

impl Endpoint {
    pub fn new(source: SourceKind, locator: impl Into<String>) -> Self {
        Self {
            source,
            locator: locator.into(),
            base_url: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            verify_tls: true,
            date_field: None,
            value_field: None,
            params: BTreeMap::new(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    pub fn with_verify_tls(mut self, verify: bool) -> Self {
        self.verify_tls = verify;
        self
    }

    pub fn with_fields(mut self, date_field: impl Into<String>, value_field: impl Into<String>) -> Self {
        self.date_field = Some(date_field.into());
        self.value_field = Some(value_field.into());
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Short human-readable identifier, e.g. `bcra_monetary:145` or
    /// `csv_distribution:host/path/file.csv` for URL locators.
    pub fn label(&self) -> String {
        match self.source {
            SourceKind::BcraMonetary | SourceKind::DatosGobSeries => {
                format!("{}:{}", self.source, self.locator)
            }
            SourceKind::CsvDistribution | SourceKind::Json => match Url::parse(&self.locator) {
                Ok(url) => format!("{}:{}{}", self.source, url.host_str().unwrap_or(""), url.path()),
                Err(_) => format!("{}:{}", self.source, self.locator),
            },
        }
    }

    /// Build the fully-qualified request URL.
    pub fn url(&self) -> Result<Url, String> {
        let base = self
            .base_url
            .as_deref()
            .or_else(|| self.source.default_base_url());

        let mut url = match (self.source, base) {
            (SourceKind::BcraMonetary, Some(base)) => {
                let raw = format!("{}/{}", base.trim_end_matches('/'), self.locator);
                Url::parse(&raw).map_err(|e| format!("bad url '{raw}': {e}"))?
            }
            (SourceKind::DatosGobSeries, Some(base)) => {
                let mut url = Url::parse(base).map_err(|e| format!("bad base url '{base}': {e}"))?;
                url.query_pairs_mut().append_pair("ids", &self.locator);
                url
            }
            _ => Url::parse(&self.locator)
                .map_err(|e| format!("bad url '{}': {e}", self.locator))?,
        };

        if !matches!(url.scheme(), "http" | "https") {
            return Err(format!("unsupported scheme '{}'", url.scheme()));
        }

        if !self.params.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in &self.params {
                pairs.append_pair(key, value);
            }
        }

        Ok(url)
    }

    fn validate(&self, series: &str) -> Result<(), ConfigError> {
        let invalid = |reason: String| ConfigError::InvalidDescriptor {
            name: series.to_string(),
            reason,
        };

        if self.locator.trim().is_empty() {
            return Err(invalid(format!("{} endpoint has an empty locator", self.source)));
        }
        if self.timeout_secs == 0 {
            return Err(invalid(format!("{} timeout must be positive", self.label())));
        }
        if self.source == SourceKind::BcraMonetary
            && !self.locator.chars().all(|c| c.is_ascii_digit())
        {
            return Err(invalid(format!(
                "BCRA variable id must be numeric, got '{}'",
                self.locator
            )));
        }
        for (what, field) in [("date_field", &self.date_field), ("value_field", &self.value_field)] {
            if matches!(field, Some(f) if f.trim().is_empty()) {
                return Err(invalid(format!("{} override for {} is empty", what, self.label())));
            }
        }
        self.url().map_err(invalid)?;
        Ok(())
    }
}

/// Static description of one series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesDescriptor {
    /// Canonical name; also the snapshot cache key.
    pub name: String,
    #[serde(default)]
    pub label: String,
    pub date_field: String,
    pub value_field: String,
    #[serde(default)]
    pub unit: String,
    pub frequency: Frequency,
    pub primary: Endpoint,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alternate: Option<Endpoint>,
}

impl SeriesDescriptor {
    /// Endpoints in the order they are attempted.
    pub fn endpoints(&self) -> impl Iterator<Item = &Endpoint> {
        std::iter::once(&self.primary).chain(self.alternate.iter())
    }

    /// Date and value field names to use for `endpoint`.
    pub fn fields_for<'a>(&'a self, endpoint: &'a Endpoint) -> (&'a str, &'a str) {
        (
            endpoint.date_field.as_deref().unwrap_or(&self.date_field),
            endpoint.value_field.as_deref().unwrap_or(&self.value_field),
        )
    }

    pub fn display_name(&self) -> &str {
        if self.label.is_empty() {
            &self.name
        } else {
            &self.label
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !is_safe_key(&self.name) {
            return Err(ConfigError::InvalidDescriptor {
                name: self.name.clone(),
                reason: "name must be 1-64 characters of [A-Za-z0-9_.-] and not start with '.'"
                    .into(),
            });
        }
        if self.date_field.trim().is_empty() || self.value_field.trim().is_empty() {
            return Err(ConfigError::InvalidDescriptor {
                name: self.name.clone(),
                reason: "date_field and value_field must be non-empty".into(),
            });
        }
        for endpoint in self.endpoints() {
            endpoint.validate(&self.name)?;
        }
        Ok(())
    }
}
