//! Application-level retry loop for one logical request.
//!
//! The transport already retried connection failures and transient statuses
//! blindly. Here every response body is inspected: success needs an accepted
//! status plus the caller's required fields, and failed responses may carry a
//! throttle directive that replaces the default backoff.

use std::sync::Arc;
use std::time::Duration;

use reqwest::Method;
use serde_json::{Value, json};
use tracing::{debug, error, warn};

use mmw_config::RetryConfig;
use mmw_core::JobFailure;

use crate::interrupt::Interrupt;
use crate::throttle::{DetailThrottle, FailedResponse, ThrottleInterpreter};
use crate::transport::{PreparedRequest, RawResponse, Transport, TransportError};

const TRACE_BODY_LIMIT: usize = 1000;
const TRACE_BODY_PREVIEW: usize = 250;

/// Limits for the retry loop.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub default_backoff: Duration,
    /// Waits above this abort the request instead of sleeping.
    pub max_backoff: Duration,
    pub non_retryable: Vec<u16>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            default_backoff: Duration::try_from_secs_f64(config.default_backoff_secs)
                .unwrap_or(Duration::ZERO),
            max_backoff: Duration::try_from_secs_f64(config.max_backoff_secs)
                .unwrap_or(Duration::MAX),
            non_retryable: config.non_retryable_statuses.clone(),
        }
    }
}

/// Result of [`Executor::execute`].
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Succeeded {
        /// Parsed body; None for DELETE, whose body is never read.
        json: Option<Value>,
        attempts: u32,
    },
    Failed {
        /// Last error payload as received (JSON, or status plus text).
        error: Option<Value>,
        failure: JobFailure,
        attempts: u32,
    },
}

impl Outcome {
    pub fn succeeded(&self) -> bool {
        matches!(self, Self::Succeeded { .. })
    }

    pub fn attempts(&self) -> u32 {
        match self {
            Self::Succeeded { attempts, .. } | Self::Failed { attempts, .. } => *attempts,
        }
    }
}

#[derive(Clone)]
pub struct Executor {
    transport: Arc<dyn Transport>,
    throttle: Arc<dyn ThrottleInterpreter>,
    policy: RetryPolicy,
}

impl std::fmt::Debug for Executor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Executor")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

/// Why the most recent attempt did not succeed.
enum LastCause {
    Timeout(String),
    Decode(u16),
    Rejected,
}

impl Executor {
    pub fn new(transport: Arc<dyn Transport>, policy: RetryPolicy) -> Self {
        Self {
            transport,
            throttle: Arc::new(DetailThrottle),
            policy,
        }
    }

    pub fn with_throttle(mut self, throttle: Arc<dyn ThrottleInterpreter>) -> Self {
        self.throttle = throttle;
        self
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Send `request` until it succeeds, hits a terminal condition, or runs out
    /// of attempts. Expected failures are reported in the [`Outcome`], never
    /// raised.
    pub async fn execute(
        &self,
        request: &PreparedRequest,
        required_fields: &[&str],
        interrupt: &Interrupt,
    ) -> Outcome {
        let is_delete = request.method == Method::DELETE;
        let mut backoff = self.policy.default_backoff;
        let mut attempts: u32 = 0;
        let mut last_error: Option<Value> = None;
        let mut last_status: Option<u16> = None;
        let mut last_cause = LastCause::Rejected;

        while attempts < self.policy.max_attempts {
            attempts += 1;
            trace_request(request, attempts);

            let sent = match interrupt.run(self.transport.send(request)).await {
                Ok(sent) => sent,
                Err(failure) => {
                    return Outcome::Failed {
                        error: last_error,
                        failure,
                        attempts,
                    };
                }
            };
            let response = match sent {
                Ok(response) => response,
                Err(TransportError::Timeout { url }) => {
                    warn!("Request to {} timed out (attempt {})", url, attempts);
                    last_cause = LastCause::Timeout(format!("Request to {url} timed out"));
                    continue;
                }
                Err(err) => {
                    error!("{} {} failed: {}", request.method, request.url, err);
                    return Outcome::Failed {
                        error: last_error,
                        failure: JobFailure::Transport {
                            message: err.to_string(),
                        },
                        attempts,
                    };
                }
            };
            trace_response(&response);

            let status = response.status;
            last_status = Some(status);
            let json = if is_delete {
                None
            } else {
                match serde_json::from_str::<Value>(&response.body) {
                    Ok(value) => Some(value),
                    Err(err) => {
                        warn!(
                            "Proper JSON not returned by {} (status {}): {}",
                            request.url, status, err
                        );
                        None
                    }
                }
            };

            if is_success(status, is_delete, json.as_ref(), required_fields) {
                return Outcome::Succeeded { json, attempts };
            }

            warn!(
                "{} {} failed on attempt {}/{} with status {}",
                request.method, request.url, attempts, self.policy.max_attempts, status
            );
            last_cause = if json.is_none() && !is_delete {
                LastCause::Decode(status)
            } else {
                LastCause::Rejected
            };
            let wait = self.throttle.wait_for(&FailedResponse {
                status,
                json: json.as_ref(),
                body: &response.body,
            });
            last_error = Some(json.unwrap_or_else(|| text_error(&response)));

            if self.policy.non_retryable.contains(&status) {
                error!(
                    "{} {} rejected with status {}, not retrying",
                    request.method, request.url, status
                );
                return Outcome::Failed {
                    error: last_error,
                    failure: JobFailure::Protocol { status },
                    attempts,
                };
            }

            if let Some(wait) = wait {
                warn!("Request throttled, waiting {:?} before retrying", wait);
                backoff = wait;
            }
            if backoff > self.policy.max_backoff {
                error!(
                    "Requested wait of {:?} exceeds the {:?} ceiling, giving up",
                    backoff, self.policy.max_backoff
                );
                return Outcome::Failed {
                    error: last_error,
                    failure: JobFailure::ThrottleTooLong {
                        wait_secs: backoff.as_secs_f64(),
                        limit_secs: self.policy.max_backoff.as_secs_f64(),
                    },
                    attempts,
                };
            }

            if attempts < self.policy.max_attempts {
                debug!("Retrying {} in {:?}", request.url, backoff);
                if let Err(failure) = interrupt.sleep(backoff).await {
                    return Outcome::Failed {
                        error: last_error,
                        failure,
                        attempts,
                    };
                }
            }
        }

        let failure = match last_cause {
            LastCause::Timeout(message) => JobFailure::Transport { message },
            LastCause::Decode(status) => JobFailure::Decode { status },
            LastCause::Rejected => JobFailure::Exhausted {
                attempts,
                last_status,
            },
        };
        error!(
            "Maximum retries exceeded for {} {} ({})",
            request.method, request.url, failure
        );
        Outcome::Failed {
            error: last_error,
            failure,
            attempts,
        }
    }
}

/// Accepted status, then (for non-DELETE) at least one required field present
/// and non-null. An empty `required` list accepts any parsed JSON.
pub(crate) fn is_success(
    status: u16,
    is_delete: bool,
    json: Option<&Value>,
    required: &[&str],
) -> bool {
    if is_delete {
        return matches!(status, 200 | 201 | 204 | 404);
    }
    if !matches!(status, 200 | 201) {
        return false;
    }
    let Some(json) = json else {
        return false;
    };
    if required.is_empty() {
        return true;
    }
    json.as_object().is_some_and(|object| {
        required
            .iter()
            .any(|field| object.get(*field).is_some_and(|value| !value.is_null()))
    })
}

fn text_error(response: &RawResponse) -> Value {
    json!({
        "status": response.status,
        "body": response.body,
    })
}

/// Bodies over the trace limit are cut to a short preview.
pub(crate) fn truncate_body(body: &str) -> String {
    if body.chars().count() > TRACE_BODY_LIMIT {
        let preview: String = body.chars().take(TRACE_BODY_PREVIEW).collect();
        format!("{preview} ...")
    } else {
        body.to_string()
    }
}

fn trace_request(request: &PreparedRequest, attempt: u32) {
    let body = request
        .body
        .as_ref()
        .map(|body| truncate_body(&String::from_utf8_lossy(&body.to_bytes())))
        .unwrap_or_default();
    debug!(
        "-> {} {} (attempt {})\n{}",
        request.method, request.url, attempt, body
    );
}

fn trace_response(response: &RawResponse) {
    debug!(
        "<- {} {}\n{}",
        response.status,
        response.url,
        truncate_body(&response.body)
    );
}

#[cfg(test)]
#[path = "executor_tests.rs"]
mod tests;
