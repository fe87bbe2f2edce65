//! datos.gob.ar sources: the time-series API and plain CSV distributions.
//!
//! The series API returns `{"data": [["2004-01-01", 100.2], ...], "meta": [...]}`
//! where each row is positional: column 0 is the date, column 1 the first
//! requested series. CSV distributions are published alongside as the
//! fallback path.

use super::provider::{parse_json, require_key, FetchError, RawFetcher, RawPayload};
use super::transport::Transport;
use reqwest::Url;

/// Fetcher for `apis.datos.gob.ar/series/api/series?ids=...`.
pub struct DatosGobSeriesFetcher {
    name: String,
    url: Url,
    transport: Transport,
}

impl DatosGobSeriesFetcher {
    pub fn new(name: impl Into<String>, url: Url, transport: Transport) -> Self {
        Self {
            name: name.into(),
            url,
            transport,
        }
    }
}

impl RawFetcher for DatosGobSeriesFetcher {
    fn name(&self) -> &str {
        &self.name
    }

    fn fetch(&self) -> Result<RawPayload, FetchError> {
        let resp = self.transport.send(self.url.as_str())?;
        let value = parse_json(&resp.body)?;
        require_key(&value, "data")?;
        Ok(RawPayload::Json(value))
    }
}

/// Fetcher for a CSV file at a fixed URL.
pub struct CsvFetcher {
    name: String,
    url: Url,
    transport: Transport,
}

impl CsvFetcher {
    pub fn new(name: impl Into<String>, url: Url, transport: Transport) -> Self {
        Self {
            name: name.into(),
            url,
            transport,
        }
    }
}

impl RawFetcher for CsvFetcher {
    fn name(&self) -> &str {
        &self.name
    }

    fn fetch(&self) -> Result<RawPayload, FetchError> {
        let resp = self.transport.send(self.url.as_str())?;
        let body = check_csv(&resp.body)?;
        Ok(RawPayload::Csv(body.to_string()))
    }
}

/// Strip a UTF-8 BOM and reject bodies that cannot be a CSV table.
fn check_csv(body: &str) -> Result<&str, FetchError> {
    let body = body.trim_start_matches('\u{feff}');
    let head = body.trim_start();

    if head.is_empty() {
        return Err(FetchError::unexpected_schema("empty CSV body"));
    }
    // Error pages from the CDN come back as 200 + HTML.
    if head.starts_with('<') {
        return Err(FetchError::unexpected_schema("body looks like HTML, not CSV"));
    }

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(head.as_bytes());
    let headers = reader
        .headers()
        .map_err(|e| FetchError::unexpected_schema(format!("unreadable CSV header: {e}")))?;
    if headers.len() < 2 {
        return Err(FetchError::unexpected_schema(format!(
            "CSV header has {} column(s), need at least 2",
            headers.len()
        )));
    }

    Ok(head)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::provider::FetchErrorKind;
    use crate::data::transport::testing::ScriptedClient;
    use crate::data::transport::RetryConfig;
    use std::sync::Arc;

    fn transport(client: &Arc<ScriptedClient>) -> Transport {
        Transport::new(client.clone(), RetryConfig::immediate(3))
    }

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn series_api_requires_data_key() {
        let ok = Arc::new(ScriptedClient::always(200, r#"{"data":[["2024-01-01",150.1]],"meta":[]}"#));
        let f = DatosGobSeriesFetcher::new("s", url("https://api.example/series?ids=x"), transport(&ok));
        assert!(matches!(f.fetch(), Ok(RawPayload::Json(_))));

        let bad = Arc::new(ScriptedClient::always(200, r#"{"errors":[{"error":"bad id"}]}"#));
        let f = DatosGobSeriesFetcher::new("s", url("https://api.example/series?ids=x"), transport(&bad));
        assert_eq!(f.fetch().unwrap_err().kind, FetchErrorKind::UnexpectedSchema);
    }

    #[test]
    fn csv_fetch_strips_bom() {
        let body = "\u{feff}indice_tiempo,emae_original,emae_desestacionalizada\n2024-01-01,140.2,141.0\n";
        let client = Arc::new(ScriptedClient::always(200, body));
        let f = CsvFetcher::new("csv", url("https://cdn.example/emae.csv"), transport(&client));
        match f.fetch().unwrap() {
            RawPayload::Csv(text) => assert!(text.starts_with("indice_tiempo")),
            other => panic!("expected CSV payload, got {other:?}"),
        }
    }

    #[test]
    fn csv_rejects_html_and_empty() {
        for body in ["<!DOCTYPE html><html></html>", "", "   \n"] {
            let client = Arc::new(ScriptedClient::always(200, body));
            let f = CsvFetcher::new("csv", url("https://cdn.example/emae.csv"), transport(&client));
            assert_eq!(f.fetch().unwrap_err().kind, FetchErrorKind::UnexpectedSchema);
        }
    }

    #[test]
    fn csv_rejects_single_column() {
        let client = Arc::new(ScriptedClient::always(200, "only_one\n1\n2\n"));
        let f = CsvFetcher::new("csv", url("https://cdn.example/x.csv"), transport(&client));
        assert_eq!(f.fetch().unwrap_err().kind, FetchErrorKind::UnexpectedSchema);
    }
}
