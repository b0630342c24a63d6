//! Client configuration (`~/.config/modelmw-client/config.toml`).
//!
//! Every section is optional; a missing file yields the defaults, which match the
//! limits the service is known to tolerate (20 submissions per minute, throttle
//! directives under 30 minutes).

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use mmw_core::endpoints::{PRODUCTION_HOST, STAGING_HOST};

use crate::paths;

pub const ENV_API_KEY: &str = "MMW_API_KEY";
pub const ENV_HOST: &str = "MMW_HOST";
pub const ENV_CACHE_DIR: &str = "MMW_CACHE_DIR";

const DEFAULT_TRANSPORT_RETRIES: u32 = 5;
const DEFAULT_BACKOFF_FACTOR: f64 = 1.0;
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_POOL_MAX_IDLE: usize = 10;
const DEFAULT_MAX_ATTEMPTS: u32 = 5;
const DEFAULT_BACKOFF_SECS: f64 = 30.0;
const DEFAULT_MAX_BACKOFF_SECS: f64 = 30.0 * 60.0;
const DEFAULT_POLL_INTERVAL_MS: u64 = 500;
const DEFAULT_SUBMIT_DELAY_MS: u64 = 3500;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub transport: TransportConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub polling: PollingConfig,
    #[serde(default)]
    pub cache: CacheConfig,
}

/// Which ModelMW deployment to talk to and how to authenticate.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Use the staging deployment instead of production.
    #[serde(default)]
    pub use_staging: bool,
    /// Explicit host; wins over `use_staging`.
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
}

impl ServiceConfig {
    pub fn host(&self) -> &str {
        match self.host.as_deref() {
            Some(host) => host.trim_end_matches('/'),
            None if self.use_staging => STAGING_HOST,
            None => PRODUCTION_HOST,
        }
    }
}

/// Connection-level behavior. Retries here are blind: no body inspection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransportConfig {
    #[serde(default = "default_transport_retries")]
    pub retries: u32,
    /// Sleep before transport retry `n` is `backoff_factor * 2^(n-1)` seconds.
    #[serde(default = "default_backoff_factor")]
    pub backoff_factor: f64,
    /// Applied when a request carries no timeout of its own.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_pool_max_idle")]
    pub pool_max_idle_per_host: usize,
    #[serde(default = "default_retry_statuses")]
    pub retry_statuses: Vec<u16>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            retries: DEFAULT_TRANSPORT_RETRIES,
            backoff_factor: DEFAULT_BACKOFF_FACTOR,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            pool_max_idle_per_host: DEFAULT_POOL_MAX_IDLE,
            retry_statuses: default_retry_statuses(),
        }
    }
}

impl TransportConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Application-level retry policy for one logical request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Wait between attempts when the service gives no throttle directive.
    #[serde(default = "default_backoff_secs")]
    pub default_backoff_secs: f64,
    /// Longer throttle directives abort the request instead of waiting.
    #[serde(default = "default_max_backoff_secs")]
    pub max_backoff_secs: f64,
    #[serde(default = "default_non_retryable_statuses")]
    pub non_retryable_statuses: Vec<u16>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            default_backoff_secs: DEFAULT_BACKOFF_SECS,
            max_backoff_secs: DEFAULT_MAX_BACKOFF_SECS,
            non_retryable_statuses: default_non_retryable_statuses(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollingConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub interval_ms: u64,
    /// Pause after a successful submission before the first poll.
    #[serde(default = "default_submit_delay_ms")]
    pub submit_delay_ms: u64,
    /// Upper bound on one job, submission through terminal poll. None = unbounded.
    #[serde(default)]
    pub deadline_secs: Option<u64>,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_ms: DEFAULT_POLL_INTERVAL_MS,
            submit_delay_ms: DEFAULT_SUBMIT_DELAY_MS,
            deadline_secs: None,
        }
    }
}

impl PollingConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn submit_delay(&self) -> Duration {
        Duration::from_millis(self.submit_delay_ms)
    }

    pub fn deadline(&self) -> Option<Duration> {
        self.deadline_secs.map(Duration::from_secs)
    }
}

/// Where terminal job records are dumped and replayed from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: None,
        }
    }
}

impl CacheConfig {
    /// Effective cache directory, or None when caching is off.
    pub fn resolved_dir(&self) -> Option<PathBuf> {
        if !self.enabled {
            return None;
        }
        self.dir.clone().or_else(paths::default_cache_dir)
    }
}

fn default_transport_retries() -> u32 {
    DEFAULT_TRANSPORT_RETRIES
}

fn default_backoff_factor() -> f64 {
    DEFAULT_BACKOFF_FACTOR
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_pool_max_idle() -> usize {
    DEFAULT_POOL_MAX_IDLE
}

fn default_retry_statuses() -> Vec<u16> {
    vec![413, 429, 500, 502, 503, 504]
}

fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

fn default_backoff_secs() -> f64 {
    DEFAULT_BACKOFF_SECS
}

fn default_max_backoff_secs() -> f64 {
    DEFAULT_MAX_BACKOFF_SECS
}

fn default_non_retryable_statuses() -> Vec<u16> {
    vec![400, 404]
}

fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}

fn default_submit_delay_ms() -> u64 {
    DEFAULT_SUBMIT_DELAY_MS
}

fn default_true() -> bool {
    true
}

impl ClientConfig {
    /// Load from the default location, apply environment overrides and validate.
    ///
    /// Returns defaults (plus environment) when the file does not exist or the
    /// config directory cannot be determined.
    pub fn load() -> Result<Self> {
        let mut config = match paths::config_path() {
            Some(path) if path.exists() => Self::load_from(&path)?,
            _ => Self::default(),
        };
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Parse a specific file without environment overrides.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config: {}", path.display()))?;
        Ok(config)
    }

    pub fn apply_env(&mut self) {
        self.apply_env_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides from `lookup` (normally the process environment).
    pub fn apply_env_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        if let Some(api_key) = non_empty(ENV_API_KEY) {
            self.service.api_key = Some(api_key);
        }
        if let Some(host) = non_empty(ENV_HOST) {
            self.service.host = Some(host);
        }
        if let Some(dir) = non_empty(ENV_CACHE_DIR) {
            self.cache.dir = Some(PathBuf::from(dir));
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.retry.max_attempts == 0 {
            bail!("retry.max_attempts must be at least 1");
        }
        let backoff = self.retry.default_backoff_secs;
        if !backoff.is_finite() || backoff < 0.0 {
            bail!("retry.default_backoff_secs must be a non-negative number, got {backoff}");
        }
        let ceiling = self.retry.max_backoff_secs;
        if !ceiling.is_finite() || ceiling < backoff {
            bail!(
                "retry.max_backoff_secs ({ceiling}) must be at least retry.default_backoff_secs ({backoff})"
            );
        }
        let factor = self.transport.backoff_factor;
        if !factor.is_finite() || factor < 0.0 {
            bail!("transport.backoff_factor must be a non-negative number, got {factor}");
        }
        if self.transport.timeout_secs == 0 {
            bail!("transport.timeout_secs must be at least 1");
        }
        let host = self.service.host();
        if !(host.starts_with("https://") || host.starts_with("http://")) {
            bail!("service host must start with http:// or https://, got '{host}'");
        }
        Ok(())
    }

    /// Write a commented template to `path`, refusing to overwrite.
    pub fn write_template(path: &Path) -> Result<()> {
        if path.exists() {
            bail!("Config already exists: {}", path.display());
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        std::fs::write(path, Self::default_template())
            .with_context(|| format!("Failed to write config: {}", path.display()))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
                .with_context(|| format!("Failed to restrict permissions: {}", path.display()))?;
        }
        Ok(())
    }

    /// Generate default config TOML with comments as a template.
    pub fn default_template() -> String {
        r#"# ModelMW client configuration
# Location: ~/.config/modelmw-client/config.toml
# Environment overrides: MMW_API_KEY, MMW_HOST, MMW_CACHE_DIR

[service]
use_staging = false
# host = "https://modelmywatershed.org"
# api_key = "..."

[transport]
retries = 5            # blind retries for connection errors, 413/429/5xx
backoff_factor = 1.0   # seconds; doubles per retry
timeout_secs = 30
pool_max_idle_per_host = 10

[retry]
max_attempts = 5
default_backoff_secs = 30.0
max_backoff_secs = 1800.0   # longer throttle directives abort the request

[polling]
interval_ms = 500
submit_delay_ms = 3500      # the submission endpoint allows ~20 requests/minute
# deadline_secs = 3600

[cache]
enabled = true
# dir = "/path/to/json_results"
"#
        .to_string()
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
