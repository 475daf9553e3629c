//! Client configuration.

use std::time::Duration;

use stripemeter_core::KeyStrategy;

use crate::error::ClientError;

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
/// Default number of attempts per request (first try included).
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
/// Default number of buffered events that triggers a flush.
pub const DEFAULT_BATCH_SIZE: usize = 100;
/// Default quiet period after the last buffered event before a flush.
pub const DEFAULT_FLUSH_DELAY: Duration = Duration::from_secs(5);
/// Default ceiling on the total time spent retrying one request.
pub const DEFAULT_MAX_RETRY_ELAPSED: Duration = Duration::from_secs(30);
/// Default delay before the first retry.
pub const DEFAULT_RETRY_INITIAL_DELAY: Duration = Duration::from_secs(1);
/// Default cap on a single retry delay.
pub const DEFAULT_RETRY_MAX_DELAY: Duration = Duration::from_secs(10);

/// Stripemeter client configuration.
///
/// Owned by the client once it is built; the client never mutates it.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the metering service, without trailing slash.
    pub base_url: String,

    /// Tenant every event is reported under.
    pub tenant_id: String,

    /// Bearer token sent as `Authorization`, if any.
    pub api_key: Option<String>,

    /// Timeout for a single HTTP exchange.
    pub request_timeout: Duration,

    /// Attempts per request, first try included.
    pub max_retry_attempts: u32,

    /// Ceiling on the total time spent on one request including retries.
    pub max_retry_elapsed: Duration,

    /// Delay before the first retry; doubles on each subsequent one.
    pub retry_initial_delay: Duration,

    /// Cap on a single retry delay.
    pub retry_max_delay: Duration,

    /// Buffered events that trigger an immediate flush.
    pub batch_size: usize,

    /// Quiet period after the most recent buffered event before the buffer
    /// flushes on its own.
    pub flush_delay: Duration,

    /// How idempotency keys are derived.
    pub key_strategy: KeyStrategy,
}

impl ClientConfig {
    /// Configuration with defaults for everything but the endpoint and tenant.
    #[must_use]
    pub fn new(base_url: impl Into<String>, tenant_id: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            tenant_id: tenant_id.into(),
            api_key: None,
            request_timeout: DEFAULT_TIMEOUT,
            max_retry_attempts: DEFAULT_RETRY_ATTEMPTS,
            max_retry_elapsed: DEFAULT_MAX_RETRY_ELAPSED,
            retry_initial_delay: DEFAULT_RETRY_INITIAL_DELAY,
            retry_max_delay: DEFAULT_RETRY_MAX_DELAY,
            batch_size: DEFAULT_BATCH_SIZE,
            flush_delay: DEFAULT_FLUSH_DELAY,
            key_strategy: KeyStrategy::default(),
        }
    }

    /// Load configuration from `STRIPEMETER_*` environment variables.
    ///
    /// `STRIPEMETER_API_URL` and `STRIPEMETER_TENANT_ID` are required.
    /// Optional: `STRIPEMETER_API_KEY`, `STRIPEMETER_TIMEOUT_SECONDS`,
    /// `STRIPEMETER_RETRY_ATTEMPTS`, `STRIPEMETER_BATCH_SIZE`,
    /// `STRIPEMETER_FLUSH_DELAY_MS`. Unparseable values fall back to defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Configuration`] if a required variable is
    /// missing or the result fails [`ClientConfig::validate`].
    pub fn from_env() -> Result<Self, ClientError> {
        let base_url = std::env::var("STRIPEMETER_API_URL")
            .map_err(|_| ClientError::Configuration("STRIPEMETER_API_URL is not set".into()))?;
        let tenant_id = std::env::var("STRIPEMETER_TENANT_ID")
            .map_err(|_| ClientError::Configuration("STRIPEMETER_TENANT_ID is not set".into()))?;

        let mut config = Self::new(base_url, tenant_id);
        config.api_key = std::env::var("STRIPEMETER_API_KEY")
            .ok()
            .filter(|k| !k.is_empty());
        config.request_timeout = env_parse("STRIPEMETER_TIMEOUT_SECONDS")
            .map_or(DEFAULT_TIMEOUT, Duration::from_secs);
        config.max_retry_attempts =
            env_parse("STRIPEMETER_RETRY_ATTEMPTS").unwrap_or(DEFAULT_RETRY_ATTEMPTS);
        config.batch_size = env_parse("STRIPEMETER_BATCH_SIZE").unwrap_or(DEFAULT_BATCH_SIZE);
        config.flush_delay = env_parse("STRIPEMETER_FLUSH_DELAY_MS")
            .map_or(DEFAULT_FLUSH_DELAY, Duration::from_millis);

        config.validate()?;
        Ok(config)
    }

    /// Set the API key.
    #[must_use]
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Set the per-request timeout.
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set the number of attempts per request.
    #[must_use]
    pub fn with_max_retry_attempts(mut self, attempts: u32) -> Self {
        self.max_retry_attempts = attempts;
        self
    }

    /// Set the total retry time ceiling.
    #[must_use]
    pub fn with_max_retry_elapsed(mut self, elapsed: Duration) -> Self {
        self.max_retry_elapsed = elapsed;
        self
    }

    /// Set the backoff delays.
    #[must_use]
    pub fn with_retry_delays(mut self, initial: Duration, max: Duration) -> Self {
        self.retry_initial_delay = initial;
        self.retry_max_delay = max;
        self
    }

    /// Set the flush threshold.
    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Set the deferred flush delay.
    #[must_use]
    pub fn with_flush_delay(mut self, delay: Duration) -> Self {
        self.flush_delay = delay;
        self
    }

    /// Set the idempotency key strategy.
    #[must_use]
    pub fn with_key_strategy(mut self, strategy: KeyStrategy) -> Self {
        self.key_strategy = strategy;
        self
    }

    /// Check the configuration for values the client cannot work with.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Configuration`] describing the first problem.
    pub fn validate(&self) -> Result<(), ClientError> {
        if self.base_url.is_empty() {
            return Err(ClientError::Configuration("base_url must not be empty".into()));
        }
        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(ClientError::Configuration(format!(
                "base_url must be an http(s) URL, got {}",
                self.base_url
            )));
        }
        if self.tenant_id.is_empty() {
            return Err(ClientError::Configuration("tenant_id must not be empty".into()));
        }
        if self.batch_size == 0 {
            return Err(ClientError::Configuration("batch_size must be at least 1".into()));
        }
        if self.max_retry_attempts == 0 {
            return Err(ClientError::Configuration(
                "max_retry_attempts must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|s| s.trim().parse().ok())
}
