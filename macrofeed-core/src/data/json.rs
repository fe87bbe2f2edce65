//! Generic JSON endpoint: any document whose top level is an array or object.

use super::provider::{json_type_name, parse_json, FetchError, RawFetcher, RawPayload};
use super::transport::Transport;
use reqwest::Url;
use serde_json::Value;

pub struct JsonFetcher {
    name: String,
    url: Url,
    transport: Transport,
}

impl JsonFetcher {
    pub fn new(name: impl Into<String>, url: Url, transport: Transport) -> Self {
        Self {
            name: name.into(),
            url,
            transport,
        }
    }
}

impl RawFetcher for JsonFetcher {
    fn name(&self) -> &str {
        &self.name
    }

    fn fetch(&self) -> Result<RawPayload, FetchError> {
        let resp = self.transport.send(self.url.as_str())?;
        match parse_json(&resp.body)? {
            value @ (Value::Array(_) | Value::Object(_)) => Ok(RawPayload::Json(value)),
            other => Err(FetchError::unexpected_schema(format!(
                "expected a JSON array or object, got {}",
                json_type_name(&other)
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::provider::FetchErrorKind;
    use crate::data::transport::testing::ScriptedClient;
    use crate::data::transport::RetryConfig;
    use std::sync::Arc;

    fn fetch(body: &str) -> Result<RawPayload, FetchError> {
        let client = Arc::new(ScriptedClient::always(200, body));
        JsonFetcher::new(
            "json",
            Url::parse("https://api.example/rates.json").unwrap(),
            Transport::new(client, RetryConfig::immediate(0)),
        )
        .fetch()
    }

    #[test]
    fn accepts_arrays_and_objects() {
        assert!(fetch(r#"[{"d":"2024-01-01","v":1}]"#).is_ok());
        assert!(fetch(r#"{"d":"2024-01-01","v":1}"#).is_ok());
    }

    #[test]
    fn rejects_scalars() {
        assert_eq!(fetch("42").unwrap_err().kind, FetchErrorKind::UnexpectedSchema);
        assert_eq!(fetch("null").unwrap_err().kind, FetchErrorKind::UnexpectedSchema);
    }
}
