//! Reading server throttle directives out of failed responses.

use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use serde_json::Value;

/// A response the executor did not accept, as seen by a throttle interpreter.
#[derive(Debug, Clone, Copy)]
pub struct FailedResponse<'a> {
    pub status: u16,
    pub json: Option<&'a Value>,
    pub body: &'a str,
}

/// Maps a failed response to the wait the service asked for, if any.
pub trait ThrottleInterpreter: Send + Sync {
    fn wait_for(&self, response: &FailedResponse<'_>) -> Option<Duration>;
}

static DETAIL_WAIT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Expected available in (?P<secs>\d+(?:\.\d+)?) seconds")
        .expect("throttle detail regex is valid")
});

/// Django REST framework style throttling:
/// `{"detail": "Request was throttled. Expected available in 12.5 seconds."}`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DetailThrottle;

impl ThrottleInterpreter for DetailThrottle {
    fn wait_for(&self, response: &FailedResponse<'_>) -> Option<Duration> {
        let detail = response.json?.get("detail")?.as_str()?;
        if !detail.contains("throttled") {
            return None;
        }
        parse_wait(detail)
    }
}

fn parse_wait(detail: &str) -> Option<Duration> {
    let caps = DETAIL_WAIT.captures(detail)?;
    let secs: f64 = caps.name("secs")?.as_str().parse().ok()?;
    // Waits too long to represent still exceed any ceiling.
    Some(Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX))
}
