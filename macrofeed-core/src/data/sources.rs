//! Builds the right fetcher for an endpoint.

use super::bcra::BcraFetcher;
use super::datos_gob::{CsvFetcher, DatosGobSeriesFetcher};
use super::json::JsonFetcher;
use super::provider::{FetchError, FetchErrorKind, RawFetcher};
use super::transport::{ClientOptions, HttpClient, RetryConfig, Transport};
use crate::descriptor::{Endpoint, SourceKind};
use std::sync::Arc;

/// Turns endpoint configuration into a live fetcher.
///
/// The orchestrator asks for a fresh fetcher per attempt; tests swap in
/// factories that return scripted fetchers.
pub trait FetcherFactory: Send + Sync {
    fn fetcher_for(&self, endpoint: &Endpoint) -> Result<Box<dyn RawFetcher>, FetchError>;
}

/// Production factory: one reqwest client per endpoint, configured from the
/// endpoint's timeout and certificate trust.
pub struct HttpSources {
    retry: RetryConfig,
    shared_client: Option<Arc<dyn HttpClient>>,
}

impl HttpSources {
    pub fn new(retry: RetryConfig) -> Self {
        Self {
            retry,
            shared_client: None,
        }
    }

    /// Route every endpoint through `client`. Endpoint timeout and TLS
    /// settings are then whatever `client` was built with.
    pub fn with_client(client: Arc<dyn HttpClient>, retry: RetryConfig) -> Self {
        Self {
            retry,
            shared_client: Some(client),
        }
    }

    fn transport_for(&self, endpoint: &Endpoint) -> Result<Transport, FetchError> {
        match &self.shared_client {
            Some(client) => Ok(Transport::new(client.clone(), self.retry.clone())),
            None => {
                let options = ClientOptions {
                    timeout: endpoint.timeout(),
                    verify_tls: endpoint.verify_tls,
                };
                Ok(Transport::reqwest(options, self.retry.clone())?)
            }
        }
    }
}

impl FetcherFactory for HttpSources {
    fn fetcher_for(&self, endpoint: &Endpoint) -> Result<Box<dyn RawFetcher>, FetchError> {
        let url = endpoint.url().map_err(|e| {
            FetchError::new(
                FetchErrorKind::ConnectionFailed,
                format!("cannot build request url: {e}"),
            )
        })?;
        let transport = self.transport_for(endpoint)?;
        let name = endpoint.label();

        let fetcher: Box<dyn RawFetcher> = match endpoint.source {
            SourceKind::BcraMonetary => Box::new(BcraFetcher::new(name, url, transport)),
            SourceKind::DatosGobSeries => Box::new(DatosGobSeriesFetcher::new(name, url, transport)),
            SourceKind::CsvDistribution => Box::new(CsvFetcher::new(name, url, transport)),
            SourceKind::Json => Box::new(JsonFetcher::new(name, url, transport)),
        };
        Ok(fetcher)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::provider::RawPayload;
    use crate::data::transport::testing::ScriptedClient;

    #[test]
    fn builds_fetcher_matching_source() {
        let client = Arc::new(ScriptedClient::always(200, "fecha,valor\n2024-01-01,1\n"));
        let sources = HttpSources::with_client(client.clone(), RetryConfig::immediate(0));
        let endpoint = Endpoint::new(SourceKind::CsvDistribution, "https://cdn.example/x.csv");

        let fetcher = sources.fetcher_for(&endpoint).unwrap();
        assert_eq!(fetcher.name(), "csv_distribution:cdn.example/x.csv");
        assert!(matches!(fetcher.fetch().unwrap(), RawPayload::Csv(_)));
        assert_eq!(client.urls(), vec!["https://cdn.example/x.csv"]);
    }

    #[test]
    fn builds_real_clients_per_endpoint() {
        let sources = HttpSources::new(RetryConfig::default());
        let strict = Endpoint::new(SourceKind::BcraMonetary, "145");
        let lax = Endpoint::new(SourceKind::BcraMonetary, "160").with_verify_tls(false);
        assert_eq!(sources.fetcher_for(&strict).unwrap().name(), "bcra_monetary:145");
        assert_eq!(sources.fetcher_for(&lax).unwrap().name(), "bcra_monetary:160");
    }

    #[test]
    fn bad_locator_is_a_fetch_error() {
        let sources = HttpSources::new(RetryConfig::default());
        let endpoint = Endpoint::new(SourceKind::Json, "not a url");
        let err = sources.fetcher_for(&endpoint).err().unwrap();
        assert_eq!(err.kind, FetchErrorKind::ConnectionFailed);
    }
}
