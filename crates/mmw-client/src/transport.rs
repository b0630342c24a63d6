//! HTTP transport: one request in, one raw response out.
//!
//! [`ReqwestTransport`] owns the connection pool and applies blind,
//! connection-level retries (connection errors, timeouts, 413/429/5xx) with exponential
//! backoff. It never looks at response bodies; application-level decisions are
//! made by the executor.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::cookie::{CookieStore, Jar};
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Method, Url};
use serde_json::Value;
use tracing::debug;

use mmw_config::TransportConfig;

use crate::error::ClientError;

/// Cap on a single transport backoff sleep.
const MAX_TRANSPORT_BACKOFF: Duration = Duration::from_secs(120);

/// Fully resolved request produced by the normalizer.
#[derive(Debug, Clone)]
pub struct PreparedRequest {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub body: Option<RequestBody>,
    /// Per-request timeout; the transport default applies when None.
    pub timeout: Option<Duration>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Json(Value),
    Form(String),
}

impl RequestBody {
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Self::Json(value) => value.to_string().into_bytes(),
            Self::Form(form) => form.clone().into_bytes(),
        }
    }
}

impl PreparedRequest {
    /// Append a query parameter to the URL.
    pub fn with_query(mut self, key: &str, value: &str) -> Result<Self, ClientError> {
        let mut url = Url::parse(&self.url)
            .map_err(|err| ClientError::InvalidRequest(format!("bad url {}: {err}", self.url)))?;
        url.query_pairs_mut().append_pair(key, value);
        self.url = url.to_string();
        Ok(self)
    }
}

/// Response as received, before any interpretation.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    pub url: String,
    pub headers: HeaderMap,
    pub body: String,
}

#[derive(thiserror::Error, Debug)]
pub enum TransportError {
    #[error("Request to {url} timed out")]
    Timeout { url: String },

    #[error("Gave up on {url} after {retries} transport retries: {reason}")]
    RetriesExhausted {
        url: String,
        retries: u32,
        reason: String,
    },

    #[error("Request to {url} failed: {message}")]
    Other { url: String, message: String },
}

/// Sends prepared requests. Implementations must not mutate caller state.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &PreparedRequest) -> Result<RawResponse, TransportError>;

    /// Value of a session cookie the transport holds for `url`, if it keeps any.
    fn cookie(&self, _url: &str, _name: &str) -> Option<String> {
        None
    }
}

/// reqwest-backed transport with a shared connection pool and cookie jar.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
    jar: Arc<Jar>,
    config: TransportConfig,
}

impl ReqwestTransport {
    pub fn new(config: TransportConfig) -> Result<Self, ClientError> {
        let jar = Arc::new(Jar::default());
        let client = reqwest::Client::builder()
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .cookie_provider(Arc::clone(&jar))
            .build()
            .map_err(|err| ClientError::HttpClient(err.to_string()))?;
        Ok(Self {
            client,
            jar,
            config,
        })
    }

    fn should_retry_status(&self, method: &Method, status: u16) -> bool {
        is_idempotent(method) && self.config.retry_statuses.contains(&status)
    }

    async fn backoff(&self, url: &str, retry: u32, reason: &str, delay: Duration) {
        debug!(
            "transport retry {}/{} for {} ({}) in {:?}",
            retry, self.config.retries, url, reason, delay
        );
        tokio::time::sleep(delay).await;
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: &PreparedRequest) -> Result<RawResponse, TransportError> {
        let url = request.url.clone();
        let mut retries_used: u32 = 0;

        loop {
            let mut builder = self
                .client
                .request(request.method.clone(), &request.url)
                .headers(request.headers.clone())
                .timeout(request.timeout.unwrap_or_else(|| self.config.timeout()));
            if let Some(body) = &request.body {
                builder = builder.body(body.to_bytes());
            }

            match builder.send().await {
                Ok(response) => {
                    let status = response.status().as_u16();
                    if self.should_retry_status(&request.method, status) {
                        if retries_used >= self.config.retries {
                            return Err(TransportError::RetriesExhausted {
                                url,
                                retries: retries_used,
                                reason: format!("status {status}"),
                            });
                        }
                        retries_used += 1;
                        let delay = retry_after_for(status, response.headers()).unwrap_or_else(
                            || backoff_delay(self.config.backoff_factor, retries_used),
                        );
                        self.backoff(&url, retries_used, &format!("status {status}"), delay)
                            .await;
                        continue;
                    }

                    let final_url = response.url().to_string();
                    let headers = response.headers().clone();
                    let body = response.text().await.map_err(|err| classify(&url, err))?;
                    return Ok(RawResponse {
                        status,
                        url: final_url,
                        headers,
                        body,
                    });
                }
                Err(err) if err.is_timeout() => {
                    // A request that timed out after connecting may have reached the server.
                    let resendable = err.is_connect() || is_idempotent(&request.method);
                    if !resendable || retries_used >= self.config.retries {
                        return Err(TransportError::Timeout { url });
                    }
                    retries_used += 1;
                    let delay = backoff_delay(self.config.backoff_factor, retries_used);
                    self.backoff(&url, retries_used, "timeout", delay).await;
                }
                Err(err) if err.is_connect() => {
                    if retries_used >= self.config.retries {
                        return Err(TransportError::RetriesExhausted {
                            url,
                            retries: retries_used,
                            reason: err.to_string(),
                        });
                    }
                    retries_used += 1;
                    let delay = backoff_delay(self.config.backoff_factor, retries_used);
                    self.backoff(&url, retries_used, "connection error", delay)
                        .await;
                }
                Err(err) => return Err(classify(&url, err)),
            }
        }
    }

    fn cookie(&self, url: &str, name: &str) -> Option<String> {
        let url = Url::parse(url).ok()?;
        let header = self.jar.cookies(&url)?;
        cookie_value(header.to_str().ok()?, name)
    }
}

fn classify(url: &str, err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout {
            url: url.to_string(),
        }
    } else {
        TransportError::Other {
            url: url.to_string(),
            message: err.to_string(),
        }
    }
}

/// Methods safe to resend after the server already saw them.
pub fn is_idempotent(method: &Method) -> bool {
    matches!(
        *method,
        Method::GET | Method::HEAD | Method::PUT | Method::DELETE | Method::OPTIONS | Method::TRACE
    )
}

/// `factor * 2^(retry-1)` seconds, capped.
pub fn backoff_delay(factor: f64, retry: u32) -> Duration {
    if retry == 0 || !factor.is_finite() || factor <= 0.0 {
        return Duration::ZERO;
    }
    let exponent = (retry - 1).min(16) as i32;
    let secs = factor * 2f64.powi(exponent);
    Duration::try_from_secs_f64(secs)
        .unwrap_or(MAX_TRANSPORT_BACKOFF)
        .min(MAX_TRANSPORT_BACKOFF)
}

/// Server-directed delay, honored only for statuses that carry one.
fn retry_after_for(status: u16, headers: &HeaderMap) -> Option<Duration> {
    if !matches!(status, 413 | 429 | 503) {
        return None;
    }
    parse_retry_after(headers).map(|delay| delay.min(MAX_TRANSPORT_BACKOFF))
}

pub(crate) fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    let raw = headers.get(RETRY_AFTER)?.to_str().ok()?.trim();

    if let Ok(seconds) = raw.parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }

    let retry_at = DateTime::parse_from_rfc2822(raw).ok()?.with_timezone(&Utc);
    let seconds = (retry_at - Utc::now()).num_seconds().max(0) as u64;
    Some(Duration::from_secs(seconds))
}

/// Find `name` in a `Cookie`/`Set-Cookie` style header value.
pub(crate) fn cookie_value(header: &str, name: &str) -> Option<String> {
    header
        .split(';')
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.trim().to_string())
}
