//! Producer configuration.
//!
//! Every field is optional; accessors supply the defaults. The configuration is
//! read once when a producer is constructed and never consulted again.

use crate::common::{EventHubError, EventHubResult};
use crate::retry::{RetryMode, RetryPolicy};
use crate::utils::EnvUtils;
use serde::Deserialize;
use std::time::Duration;

/// Default upper bound for a batch when the link does not advertise one.
pub const DEFAULT_MAX_BATCH_SIZE_BYTES: u64 = 1024 * 1024;

/// Configuration for producer links, timeouts and retries.
///
/// # Examples
///
/// ```no_run
/// use producer::config::ProducerConfig;
///
/// let config: ProducerConfig = serde_json::from_str(r#"{
///     "send_timeout_secs": 30,
///     "max_retries": 5,
///     "retry_mode": "fixed"
/// }"#)?;
///
/// assert_eq!(config.max_retries(), 5);
/// assert_eq!(config.keep_alive(), None);
/// # Ok::<(), serde_json::Error>(())
/// ```
#[derive(Debug, Deserialize, Default, Clone)]
pub struct ProducerConfig {
    /// Per-message link timeout in seconds, 0 disables it (default: 60)
    send_timeout_secs: Option<u64>,
    /// Interval between keep-alive pings in seconds (default: none)
    keep_alive_secs: Option<u64>,
    /// Idle time before the link is torn down, in seconds (default: none)
    idle_timeout_secs: Option<u64>,
    /// Whether connection failures are retried (default: true)
    auto_reconnect: Option<bool>,
    /// Maximum number of retries after the first attempt (default: 3)
    max_retries: Option<u32>,
    /// Backoff base in milliseconds (default: 800)
    backoff_factor_ms: Option<u64>,
    /// Backoff cap in seconds (default: 120)
    backoff_max_secs: Option<u64>,
    /// Backoff shape (default: exponential)
    retry_mode: Option<RetryMode>,
    /// Batch size bound when the link does not advertise one (default: 1 MiB)
    max_batch_size_bytes: Option<u64>,
    /// Extra user agent appended to the client identification (default: none)
    user_agent: Option<String>,
}

impl ProducerConfig {
    /// Loads the defaults overlaid with `EVENTHUB_*` environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`EventHubError::Configuration`] if a variable is set to a value
    /// that cannot be parsed.
    pub fn from_env() -> EventHubResult<Self> {
        Self::default().with_env_overrides()
    }

    /// Applies `EVENTHUB_*` environment overrides on top of this configuration.
    pub fn with_env_overrides(mut self) -> EventHubResult<Self> {
        if let Some(v) = EnvUtils::get_parsed_var("EVENTHUB_SEND_TIMEOUT_SECS")? {
            self.send_timeout_secs = Some(v);
        }
        if let Some(v) = EnvUtils::get_parsed_var("EVENTHUB_KEEP_ALIVE_SECS")? {
            self.keep_alive_secs = Some(v);
        }
        if let Some(v) = EnvUtils::get_parsed_var("EVENTHUB_IDLE_TIMEOUT_SECS")? {
            self.idle_timeout_secs = Some(v);
        }
        if let Some(v) = EnvUtils::get_parsed_var("EVENTHUB_AUTO_RECONNECT")? {
            self.auto_reconnect = Some(v);
        }
        if let Some(v) = EnvUtils::get_parsed_var("EVENTHUB_MAX_RETRIES")? {
            self.max_retries = Some(v);
        }
        if let Some(v) = EnvUtils::get_parsed_var("EVENTHUB_BACKOFF_FACTOR_MS")? {
            self.backoff_factor_ms = Some(v);
        }
        if let Some(v) = EnvUtils::get_parsed_var("EVENTHUB_BACKOFF_MAX_SECS")? {
            self.backoff_max_secs = Some(v);
        }
        if let Some(v) = EnvUtils::get_optional_var("EVENTHUB_RETRY_MODE") {
            self.retry_mode = Some(v.parse()?);
        }
        if let Some(v) = EnvUtils::get_parsed_var("EVENTHUB_MAX_BATCH_SIZE_BYTES")? {
            self.max_batch_size_bytes = Some(v);
        }
        if let Some(v) = EnvUtils::get_optional_var("EVENTHUB_USER_AGENT") {
            self.user_agent = Some(v);
        }
        self.validate()?;
        Ok(self)
    }

    /// Rejects values the producer cannot operate with.
    pub fn validate(&self) -> EventHubResult<()> {
        if self.max_batch_size_bytes == Some(0) {
            return Err(EventHubError::Configuration(
                "max_batch_size_bytes must be greater than 0".to_string(),
            ));
        }
        if self.backoff_max_secs == Some(0) {
            return Err(EventHubError::Configuration(
                "backoff_max_secs must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Sub-second remainders round up, so only `Duration::ZERO` disables the timeout.
    pub fn with_send_timeout(mut self, timeout: Duration) -> Self {
        let secs = timeout.as_secs() + u64::from(timeout.subsec_nanos() > 0);
        self.send_timeout_secs = Some(secs);
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    pub fn with_backoff(mut self, factor: Duration, max: Duration) -> Self {
        self.backoff_factor_ms = Some(u64::try_from(factor.as_millis()).unwrap_or(u64::MAX));
        self.backoff_max_secs = Some(max.as_secs().max(1));
        self
    }

    pub fn with_auto_reconnect(mut self, auto_reconnect: bool) -> Self {
        self.auto_reconnect = Some(auto_reconnect);
        self
    }

    pub fn with_max_batch_size_bytes(mut self, max: u64) -> Self {
        self.max_batch_size_bytes = Some(max);
        self
    }

    /// Per-message link timeout; `None` when disabled with 0.
    pub fn send_timeout(&self) -> Option<Duration> {
        match self.send_timeout_secs.unwrap_or(60) {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    pub fn keep_alive(&self) -> Option<Duration> {
        self.keep_alive_secs.map(Duration::from_secs)
    }

    pub fn idle_timeout(&self) -> Option<Duration> {
        self.idle_timeout_secs.map(Duration::from_secs)
    }

    pub fn auto_reconnect(&self) -> bool {
        self.auto_reconnect.unwrap_or(true)
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries.unwrap_or(3)
    }

    pub fn backoff_factor(&self) -> Duration {
        Duration::from_millis(self.backoff_factor_ms.unwrap_or(800))
    }

    pub fn backoff_max(&self) -> Duration {
        Duration::from_secs(self.backoff_max_secs.unwrap_or(120))
    }

    pub fn retry_mode(&self) -> RetryMode {
        self.retry_mode.unwrap_or_default()
    }

    pub fn max_batch_size_bytes(&self) -> u64 {
        self.max_batch_size_bytes
            .unwrap_or(DEFAULT_MAX_BATCH_SIZE_BYTES)
    }

    pub fn user_agent(&self) -> Option<&str> {
        self.user_agent.as_deref()
    }

    /// Builds the immutable retry policy handed to the retry executor.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries(),
            backoff_factor: self.backoff_factor(),
            backoff_max: self.backoff_max(),
            mode: self.retry_mode(),
        }
    }
}
