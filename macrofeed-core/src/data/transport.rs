//! HTTP transport with bounded retries.
//!
//! Retries only on a fixed set of transient statuses (429 and 5xx gateway
//! errors by default) with exponential backoff. Timeouts, connection failures
//! and every other status surface immediately. The transport never looks at
//! the body.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

const USER_AGENT: &str = concat!("macrofeed/", env!("CARGO_PKG_VERSION"));

/// Transport-level failures.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("HTTP {status} after {attempts} attempt(s)")]
    Status { status: u16, attempts: u32 },

    #[error("request failed: {0}")]
    Request(String),

    #[error("failed to build HTTP client: {0}")]
    Client(String),
}

/// A completed HTTP exchange, any status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// One blocking GET. Implementations return `Ok` for any status the server
/// answered with; only failures to get an answer are errors.
pub trait HttpClient: Send + Sync {
    fn get(&self, url: &str) -> Result<HttpResponse, TransportError>;
}

/// Per-client options. Each fetcher builds its own client, so certificate
/// trust never leaks between sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientOptions {
    pub timeout: Duration,
    pub verify_tls: bool,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(15),
            verify_tls: true,
        }
    }
}

/// `reqwest::blocking` implementation of [`HttpClient`].
pub struct ReqwestClient {
    client: reqwest::blocking::Client,
}

impl ReqwestClient {
    pub fn new(options: ClientOptions) -> Result<Self, TransportError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(options.timeout)
            .user_agent(USER_AGENT)
            .danger_accept_invalid_certs(!options.verify_tls)
            .build()
            .map_err(|e| TransportError::Client(e.to_string()))?;
        Ok(Self { client })
    }
}

fn classify(e: reqwest::Error) -> TransportError {
    if e.is_timeout() {
        TransportError::Timeout(e.to_string())
    } else if e.is_connect() {
        TransportError::Connect(e.to_string())
    } else {
        TransportError::Request(e.to_string())
    }
}

impl HttpClient for ReqwestClient {
    fn get(&self, url: &str) -> Result<HttpResponse, TransportError> {
        let resp = self.client.get(url).send().map_err(classify)?;
        let status = resp.status().as_u16();
        let body = resp.text().map_err(classify)?;
        Ok(HttpResponse { status, body })
    }
}

fn default_max_retries() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    1_000
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_retryable_statuses() -> Vec<u16> {
    vec![429, 500, 502, 503, 504]
}

/// Retry policy for the transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Retries after the initial request.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Delay before the first retry; doubles on each subsequent retry.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Randomize each delay by ±25%.
    #[serde(default)]
    pub jitter: bool,
    #[serde(default = "default_retryable_statuses")]
    pub retryable_statuses: Vec<u16>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            jitter: false,
            retryable_statuses: default_retryable_statuses(),
        }
    }
}

impl RetryConfig {
    /// Same policy with no waiting between attempts.
    pub fn immediate(max_retries: u32) -> Self {
        Self {
            max_retries,
            base_delay_ms: 0,
            max_delay_ms: 0,
            ..Self::default()
        }
    }

    pub fn is_retryable(&self, status: u16) -> bool {
        self.retryable_statuses.contains(&status)
    }

    /// Delay before retry number `retry` (0-indexed).
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        let factor = 2u64.saturating_pow(retry);
        let capped = self.base_delay_ms.saturating_mul(factor).min(self.max_delay_ms);

        let ms = if self.jitter && capped > 0 {
            let spread = capped as f64 * 0.25;
            let offset = (rand::random::<f64>() - 0.5) * 2.0 * spread;
            (capped as f64 + offset).max(0.0) as u64
        } else {
            capped
        };

        Duration::from_millis(ms)
    }

    /// Upper bound on requests per `send`.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}

/// An [`HttpClient`] wrapped in a retry policy.
#[derive(Clone)]
pub struct Transport {
    client: Arc<dyn HttpClient>,
    retry: RetryConfig,
}

impl Transport {
    pub fn new(client: Arc<dyn HttpClient>, retry: RetryConfig) -> Self {
        Self { client, retry }
    }

    /// Transport backed by a fresh reqwest client.
    pub fn reqwest(options: ClientOptions, retry: RetryConfig) -> Result<Self, TransportError> {
        Ok(Self::new(Arc::new(ReqwestClient::new(options)?), retry))
    }

    pub fn retry_config(&self) -> &RetryConfig {
        &self.retry
    }

    /// GET `url`, retrying transient statuses. Returns the first 2xx response.
    pub fn send(&self, url: &str) -> Result<HttpResponse, TransportError> {
        let max_attempts = self.retry.max_attempts();
        let mut attempt = 0;

        loop {
            attempt += 1;
            debug!(url, attempt, "sending request");
            let resp = self.client.get(url)?;

            if resp.is_success() {
                return Ok(resp);
            }

            if !self.retry.is_retryable(resp.status) || attempt >= max_attempts {
                return Err(TransportError::Status {
                    status: resp.status,
                    attempts: attempt,
                });
            }

            let delay = self.retry.delay_for_retry(attempt - 1);
            warn!(
                url,
                status = resp.status,
                attempt,
                delay_ms = delay.as_millis() as u64,
                "transient status, retrying"
            );
            if !delay.is_zero() {
                std::thread::sleep(delay);
            }
        }
    }
}
