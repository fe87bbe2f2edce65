//! Raw fetcher trait and structured fetch errors.
//!
//! A fetcher calls exactly one remote endpoint and hands back the body as an
//! unvalidated [`RawPayload`]. Fetchers only check that the body has the
//! top-level shape their source promises; record-level parsing belongs to the
//! normalizer.

use super::transport::TransportError;
use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// Body of a successful remote call, before normalization.
#[derive(Debug, Clone, PartialEq)]
pub enum RawPayload {
    Json(Value),
    Csv(String),
}

/// Category of a fetch failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchErrorKind {
    Timeout,
    ConnectionFailed,
    /// HTTP success, but the body is not what the source promises.
    UnexpectedSchema,
    HttpStatus(u16),
}

impl fmt::Display for FetchErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchErrorKind::Timeout => f.write_str("timeout"),
            FetchErrorKind::ConnectionFailed => f.write_str("connection failed"),
            FetchErrorKind::UnexpectedSchema => f.write_str("unexpected schema"),
            FetchErrorKind::HttpStatus(code) => write!(f, "HTTP {code}"),
        }
    }
}

/// A failed fetch. Always recoverable by falling back to the snapshot cache.
#[derive(Debug, Clone, Error)]
#[error("{kind}: {detail}")]
pub struct FetchError {
    pub kind: FetchErrorKind,
    pub detail: String,
}

impl FetchError {
    pub fn new(kind: FetchErrorKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }

    pub fn unexpected_schema(detail: impl Into<String>) -> Self {
        Self::new(FetchErrorKind::UnexpectedSchema, detail)
    }
}

impl From<TransportError> for FetchError {
    fn from(e: TransportError) -> Self {
        let kind = match &e {
            TransportError::Timeout(_) => FetchErrorKind::Timeout,
            TransportError::Status { status, .. } => FetchErrorKind::HttpStatus(*status),
            TransportError::Connect(_) | TransportError::Request(_) | TransportError::Client(_) => {
                FetchErrorKind::ConnectionFailed
            }
        };
        Self::new(kind, e.to_string())
    }
}

/// Fetches one endpoint.
///
/// Implementations own their transport (timeout, certificate trust, retry
/// policy); the orchestrator only sees payloads and errors.
pub trait RawFetcher: Send + Sync {
    /// Identifier for logs and failure reports.
    fn name(&self) -> &str;

    fn fetch(&self) -> Result<RawPayload, FetchError>;
}

/// Parse a JSON body, mapping syntax errors to `UnexpectedSchema`.
pub(crate) fn parse_json(body: &str) -> Result<Value, FetchError> {
    serde_json::from_str(body)
        .map_err(|e| FetchError::unexpected_schema(format!("body is not valid JSON: {e}")))
}

/// Require a JSON object carrying `key` at the top level.
pub(crate) fn require_key(value: &Value, key: &str) -> Result<(), FetchError> {
    match value {
        Value::Object(map) if map.contains_key(key) => Ok(()),
        Value::Object(_) => Err(FetchError::unexpected_schema(format!(
            "missing top-level key '{key}'"
        ))),
        other => Err(FetchError::unexpected_schema(format!(
            "expected a JSON object, got {}",
            json_type_name(other)
        ))),
    }
}

pub(crate) fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn transport_errors_map_to_kinds() {
        let status: FetchError = TransportError::Status {
            status: 404,
            attempts: 1,
        }
        .into();
        assert_eq!(status.kind, FetchErrorKind::HttpStatus(404));

        let timeout: FetchError = TransportError::Timeout("slow".into()).into();
        assert_eq!(timeout.kind, FetchErrorKind::Timeout);

        let connect: FetchError = TransportError::Connect("refused".into()).into();
        assert_eq!(connect.kind, FetchErrorKind::ConnectionFailed);
    }

    #[test]
    fn require_key_checks_shape() {
        assert!(require_key(&json!({"results": []}), "results").is_ok());
        let missing = require_key(&json!({"status": 200}), "results").unwrap_err();
        assert_eq!(missing.kind, FetchErrorKind::UnexpectedSchema);
        assert!(missing.detail.contains("results"));
        let wrong = require_key(&json!([1, 2]), "results").unwrap_err();
        assert!(wrong.detail.contains("array"));
    }

    #[test]
    fn invalid_json_is_unexpected_schema() {
        let err = parse_json("<html>maintenance</html>").unwrap_err();
        assert_eq!(err.kind, FetchErrorKind::UnexpectedSchema);
    }
}
