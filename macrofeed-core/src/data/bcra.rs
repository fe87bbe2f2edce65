//! BCRA statistics API v3.0: monetary variables.
//!
//! `GET {base}/{idVariable}` answers with
//! `{"status": 200, "metadata": {...}, "results": [{"idVariable": 145, "fecha": "2024-01-02", "valor": 38.5}, ...]}`.
//! Anything without a top-level `results` key is treated as a schema change.

use super::provider::{parse_json, require_key, FetchError, RawFetcher, RawPayload};
use super::transport::Transport;
use reqwest::Url;

pub struct BcraFetcher {
    name: String,
    url: Url,
    transport: Transport,
}

impl BcraFetcher {
    pub fn new(name: impl Into<String>, url: Url, transport: Transport) -> Self {
        Self {
            name: name.into(),
            url,
            transport,
        }
    }
}

impl RawFetcher for BcraFetcher {
    fn name(&self) -> &str {
        &self.name
    }

    fn fetch(&self) -> Result<RawPayload, FetchError> {
        let resp = self.transport.send(self.url.as_str())?;
        let value = parse_json(&resp.body)?;
        require_key(&value, "results")?;
        Ok(RawPayload::Json(value))
    }
}
