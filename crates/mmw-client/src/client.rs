use std::path::PathBuf;
use std::sync::Arc;

use reqwest::header::SET_COOKIE;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use mmw_config::{ClientConfig, PollingConfig};

use crate::cache::ResultCache;
use crate::error::ClientError;
use crate::executor::{Executor, RetryPolicy};
use crate::interrupt::Interrupt;
use crate::normalize::Normalizer;
use crate::throttle::ThrottleInterpreter;
use crate::transport::{ReqwestTransport, Transport, cookie_value};

const CSRF_COOKIE: &str = "csrftoken";

/// Handle to one ModelMW deployment.
///
/// Cheap to clone; clones share the connection pool, session headers and cache
/// directory, and get a child cancellation token so cancelling the original
/// stops every clone.
#[derive(Debug)]
pub struct ModelMwClient {
    pub(crate) normalizer: Arc<Normalizer>,
    pub(crate) executor: Executor,
    pub(crate) polling: PollingConfig,
    pub(crate) cache: Option<ResultCache>,
    cancel: CancellationToken,
}

impl Clone for ModelMwClient {
    fn clone(&self) -> Self {
        Self {
            normalizer: Arc::clone(&self.normalizer),
            executor: self.executor.clone(),
            polling: self.polling.clone(),
            cache: self.cache.clone(),
            cancel: self.cancel.child_token(),
        }
    }
}

impl ModelMwClient {
    /// Client backed by a reqwest connection pool.
    pub fn from_config(config: &ClientConfig) -> Result<Self, ClientError> {
        let transport = ReqwestTransport::new(config.transport.clone())?;
        Ok(Self::with_transport(config, Arc::new(transport)))
    }

    pub fn with_transport(config: &ClientConfig, transport: Arc<dyn Transport>) -> Self {
        let normalizer = Normalizer::new(config.service.host(), config.service.api_key.clone());
        Self {
            normalizer: Arc::new(normalizer),
            executor: Executor::new(transport, RetryPolicy::from(&config.retry)),
            polling: config.polling.clone(),
            cache: config.cache.resolved_dir().map(ResultCache::new),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_throttle_interpreter(mut self, throttle: Arc<dyn ThrottleInterpreter>) -> Self {
        self.executor = self.executor.with_throttle(throttle);
        self
    }

    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache = Some(ResultCache::new(dir));
        self
    }

    pub fn without_cache(mut self) -> Self {
        self.cache = None;
        self
    }

    pub fn host(&self) -> &str {
        self.normalizer.host()
    }

    pub fn cache(&self) -> Option<&ResultCache> {
        self.cache.as_ref()
    }

    /// Token that stops this client's jobs (and those of its clones) when cancelled.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Fresh cancellation/deadline guard for one job.
    pub(crate) fn interrupt(&self) -> Interrupt {
        Interrupt::new(self.cancel.clone(), self.polling.deadline())
    }

    /// Log in with a user account and keep its CSRF token for later requests.
    ///
    /// Only needed for endpoints that require a browser session; the API key
    /// covers everything else. Returns false when no token came back.
    pub async fn login(&self, user: &str, password: &str) -> Result<bool, ClientError> {
        let request = self.normalizer.login_request(user, password)?;
        let transport = self.executor.transport();

        let response = match transport.send(&request).await {
            Ok(response) => response,
            Err(err) => {
                warn!("Failed to log in: {}", err);
                return Ok(false);
            }
        };

        let token = response
            .headers
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .find_map(|value| cookie_value(value, CSRF_COOKIE))
            .or_else(|| transport.cookie(&request.url, CSRF_COOKIE));

        match token {
            Some(token) => {
                self.normalizer.set_csrf_token(token);
                info!("Logged in to {}", self.host());
                Ok(true)
            }
            None => {
                warn!(
                    "Failed to log in: no {} cookie in response (status {})",
                    CSRF_COOKIE, response.status
                );
                Ok(false)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedTransport;
    use serde_json::json;

    fn config() -> ClientConfig {
        let mut config = ClientConfig::default();
        config.service.host = Some("https://mmw.test".into());
        config.service.api_key = Some("k".into());
        config.cache.enabled = false;
        config
    }

    #[tokio::test]
    async fn test_login_takes_csrf_token_from_cookie_jar() {
        let transport = Arc::new(
            ScriptedTransport::new()
                .text(200, "<html>welcome</html>")
                .cookie("csrftoken", "tok-1")
                .json(200, json!({"status": "pending"})),
        );
        let client = ModelMwClient::with_transport(&config(), transport.clone());

        assert!(client.login("me", "pw").await.unwrap());
        assert_eq!(client.normalizer.csrf_token().as_deref(), Some("tok-1"));

        let poll = client.normalizer.poll_request("api/analyze/soil/", "1").unwrap();
        assert_eq!(
            poll.headers.get("x-csrftoken").and_then(|v| v.to_str().ok()),
            Some("tok-1")
        );
        assert_eq!(transport.requests()[0].url, "https://mmw.test/user/login");
    }

    #[tokio::test]
    async fn test_login_without_token_fails_softly() {
        let transport = Arc::new(ScriptedTransport::new().text(403, "Forbidden"));
        let client = ModelMwClient::with_transport(&config(), transport);
        assert!(!client.login("me", "wrong").await.unwrap());
        assert!(client.normalizer.csrf_token().is_none());
    }

    #[tokio::test]
    async fn test_login_transport_error_fails_softly() {
        let transport = Arc::new(ScriptedTransport::new());
        let client = ModelMwClient::with_transport(&config(), transport);
        assert!(!client.login("me", "pw").await.unwrap());
    }

    #[test]
    fn test_clones_share_session_and_inherit_cancellation() {
        let client = ModelMwClient::with_transport(&config(), Arc::new(ScriptedTransport::new()));
        let clone = client.clone();
        clone.normalizer.set_csrf_token("shared");
        assert_eq!(client.normalizer.csrf_token().as_deref(), Some("shared"));

        client.cancellation_token().cancel();
        assert!(clone.cancellation_token().is_cancelled());
        assert!(clone.interrupt().check().is_err());
    }

    #[test]
    fn test_cache_configuration() {
        let client = ModelMwClient::with_transport(&config(), Arc::new(ScriptedTransport::new()));
        assert!(client.cache().is_none());
        let client = client.with_cache_dir("/tmp/mmw-test-cache");
        assert_eq!(
            client.cache().map(|c| c.dir().to_path_buf()),
            Some(PathBuf::from("/tmp/mmw-test-cache"))
        );
        assert!(client.without_cache().cache().is_none());
    }
}
