//! Pipeline configuration: cache location, retry policy and the descriptor table.
//!
//! Stored as TOML:
//!
//! ```toml
//! [cache]
//! dir = "cache"
//!
//! [retry]
//! max_retries = 3
//! base_delay_ms = 1000
//!
//! [[series]]
//! name = "BADLAR"
//! date_field = "fecha"
//! value_field = "valor"
//! frequency = "daily"
//!
//! [series.primary]
//! source = "bcra_monetary"
//! locator = "145"
//! ```
//!
//! Variable ids differ between revisions of the upstream APIs, so the table is
//! treated as external configuration and validated on load rather than trusted.

use crate::data::transport::RetryConfig;
use crate::descriptor::{Endpoint, Frequency, SeriesDescriptor, SourceKind};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const EMAE_CSV_URL: &str = "https://infra.datos.gob.ar/catalog/sspm/dataset/143/distribution/143.3/download/emae-valores-anuales-indice-base-2004-mensual.csv";

/// Errors raised for invalid configuration. These are programming or
/// deployment mistakes, not runtime data failures.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("invalid descriptor '{name}': {reason}")]
    InvalidDescriptor { name: String, reason: String },

    #[error("duplicate series name '{0}'")]
    DuplicateSeries(String),

    #[error("unknown series '{0}'")]
    UnknownSeries(String),
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from("cache")
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_cache_dir")]
    pub dir: PathBuf,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: default_cache_dir(),
        }
    }
}

/// The complete pipeline configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub series: Vec<SeriesDescriptor>,
}

impl Config {
    /// Load and validate a config from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Parse and validate a config from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Check every descriptor and reject duplicate names.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for descriptor in &self.series {
            descriptor.validate()?;
            if !seen.insert(descriptor.name.as_str()) {
                return Err(ConfigError::DuplicateSeries(descriptor.name.clone()));
            }
        }
        Ok(())
    }

    pub fn descriptor(&self, name: &str) -> Result<&SeriesDescriptor, ConfigError> {
        self.series
            .iter()
            .find(|d| d.name == name)
            .ok_or_else(|| ConfigError::UnknownSeries(name.to_string()))
    }

    /// Resolve a list of names; an empty list selects every series.
    pub fn select(&self, names: &[String]) -> Result<Vec<&SeriesDescriptor>, ConfigError> {
        if names.is_empty() {
            return Ok(self.series.iter().collect());
        }
        names.iter().map(|n| self.descriptor(n)).collect()
    }

    pub fn series_names(&self) -> Vec<&str> {
        self.series.iter().map(|d| d.name.as_str()).collect()
    }

    /// Argentine macro indicators: BCRA policy rate, BADLAR, USD time deposits
    /// and the seasonally adjusted EMAE activity index.
    pub fn default_argentina() -> Self {
        let bcra = |name: &str, label: &str, id: &str| SeriesDescriptor {
            name: name.into(),
            label: label.into(),
            date_field: "fecha".into(),
            value_field: "valor".into(),
            unit: "% TNA".into(),
            frequency: Frequency::Daily,
            // The BCRA chain is not trusted by every platform's root store.
            primary: Endpoint::new(SourceKind::BcraMonetary, id)
                .with_timeout_secs(15)
                .with_verify_tls(false),
            alternate: None,
        };

        let emae = SeriesDescriptor {
            name: "EMAE".into(),
            label: "EMAE desestacionalizado".into(),
            date_field: "0".into(),
            value_field: "1".into(),
            unit: "index 2004=100".into(),
            frequency: Frequency::Monthly,
            primary: Endpoint::new(SourceKind::DatosGobSeries, "emae_desestacionalizada")
                .with_timeout_secs(20),
            alternate: Some(
                Endpoint::new(SourceKind::CsvDistribution, EMAE_CSV_URL)
                    .with_timeout_secs(20)
                    .with_fields("indice_tiempo", "desestacionalizada"),
            ),
        };

        Self {
            cache: CacheConfig::default(),
            retry: RetryConfig::default(),
            series: vec![
                bcra("TPM", "Tasa de Politica Monetaria", "160"),
                bcra("BADLAR", "BADLAR Privados", "145"),
                bcra("PF_USD", "Plazo Fijo USD", "132"),
                emae,
            ],
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::default_argentina()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = Config::default_argentina();
        config.validate().unwrap();
        assert_eq!(config.series_names(), vec!["TPM", "BADLAR", "PF_USD", "EMAE"]);
    }

    #[test]
    fn toml_roundtrip() {
        let config = Config::default_argentina();
        let text = config.to_toml().unwrap();
        let parsed = Config::from_toml(&text).unwrap();
        assert_eq!(config, parsed);
    }

    #[test]
    fn minimal_toml_fills_defaults() {
        let text = r#"
            [[series]]
            name = "BADLAR"
            date_field = "fecha"
            value_field = "valor"
            frequency = "daily"

            [series.primary]
            source = "bcra_monetary"
            locator = "145"
        "#;
        let config = Config::from_toml(text).unwrap();
        assert_eq!(config.cache.dir, PathBuf::from("cache"));
        assert_eq!(config.retry.max_retries, 3);
        let d = config.descriptor("BADLAR").unwrap();
        assert!(d.primary.verify_tls);
        assert_eq!(d.primary.timeout_secs, 15);
        assert!(d.alternate.is_none());
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let mut config = Config::default_argentina();
        let dup = config.series[0].clone();
        config.series.push(dup);
        assert!(matches!(config.validate(), Err(ConfigError::DuplicateSeries(n)) if n == "TPM"));
    }

    #[test]
    fn invalid_descriptor_fails_parse() {
        let text = r#"
            [[series]]
            name = "BADLAR"
            date_field = "fecha"
            value_field = "valor"
            frequency = "daily"

            [series.primary]
            source = "bcra_monetary"
            locator = "not-a-number"
        "#;
        assert!(matches!(
            Config::from_toml(text),
            Err(ConfigError::InvalidDescriptor { .. })
        ));
    }

    #[test]
    fn select_resolves_names() {
        let config = Config::default_argentina();
        assert_eq!(config.select(&[]).unwrap().len(), 4);
        let picked = config.select(&["EMAE".to_string()]).unwrap();
        assert_eq!(picked[0].name, "EMAE");
        assert!(matches!(
            config.select(&["NOPE".to_string()]),
            Err(ConfigError::UnknownSeries(_))
        ));
    }

    #[test]
    fn missing_file_reports_path() {
        let err = Config::from_file(Path::new("/nonexistent/macrofeed.toml")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/macrofeed.toml"));
    }
}
