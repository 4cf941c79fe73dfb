//! Bounded, deadline-aware retries.
//!
//! ```text
//! execute(timeout)
//!   deadline = now + timeout
//!   ├─→ attempt 0 ── ok ──────────────→ return
//!   │        └── err ─→ classify ── fatal ─→ return err
//!   │                      └── retryable ─→ backoff(0) fits before deadline?
//!   │                                          ├─ no  ─→ timeout(last err)
//!   │                                          └─ yes ─→ sleep
//!   ├─→ attempt 1 ...
//!   └─→ attempt max_retries ── err ─→ return last err
//! ```

use crate::common::{EventHubError, EventHubResult, conditions};
use futures::future::BoxFuture;
use serde::Deserialize;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, sleep};

/// Smallest pause between attempts; keeps remaining time strictly decreasing.
const MIN_BACKOFF: Duration = Duration::from_millis(1);

/// Shape of the delay between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetryMode {
    /// `factor * 2^retry`
    #[default]
    Exponential,
    /// `factor` every time
    Fixed,
}

impl FromStr for RetryMode {
    type Err = EventHubError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "exponential" => Ok(RetryMode::Exponential),
            "fixed" => Ok(RetryMode::Fixed),
            other => Err(EventHubError::Configuration(format!(
                "unknown retry mode '{other}', expected 'exponential' or 'fixed'"
            ))),
        }
    }
}

/// Immutable retry configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Attempts after the first one
    pub max_retries: u32,
    /// Base delay
    pub backoff_factor: Duration,
    /// Upper bound for a single delay
    pub backoff_max: Duration,
    pub mode: RetryMode,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_factor: Duration::from_millis(800),
            backoff_max: Duration::from_secs(120),
            mode: RetryMode::Exponential,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `retry` (0-based).
    pub fn backoff(&self, retry: u32) -> Duration {
        let delay = match self.mode {
            RetryMode::Fixed => self.backoff_factor,
            RetryMode::Exponential => self
                .backoff_factor
                .saturating_mul(2u32.saturating_pow(retry.min(31))),
        };
        delay.min(self.backoff_max).max(MIN_BACKOFF)
    }
}

/// Retry verdict for a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorDisposition {
    /// Propagate immediately, ignoring the remaining budget.
    Fatal,
    /// Try again; the hint raises the next delay to at least this long.
    Retryable { backoff_hint: Option<Duration> },
}

/// Decides whether a failure is worth another attempt.
pub trait ErrorClassifier: Send + Sync {
    fn classify(&self, error: &EventHubError) -> ErrorDisposition;
}

/// Classification of the producer's error taxonomy and service conditions.
#[derive(Debug, Clone, Copy)]
pub struct DefaultErrorClassifier {
    auto_reconnect: bool,
}

impl DefaultErrorClassifier {
    /// With `auto_reconnect` off, connection failures become fatal.
    pub fn new(auto_reconnect: bool) -> Self {
        Self { auto_reconnect }
    }
}

impl Default for DefaultErrorClassifier {
    fn default() -> Self {
        Self::new(true)
    }
}

impl ErrorClassifier for DefaultErrorClassifier {
    fn classify(&self, error: &EventHubError) -> ErrorDisposition {
        match error {
            EventHubError::Validation(_)
            | EventHubError::Closed
            | EventHubError::Configuration(_) => ErrorDisposition::Fatal,
            EventHubError::Timeout { .. } => ErrorDisposition::Retryable {
                backoff_hint: None,
            },
            EventHubError::Connection { condition, .. } => {
                if !self.auto_reconnect {
                    return ErrorDisposition::Fatal;
                }
                ErrorDisposition::Retryable {
                    backoff_hint: condition.as_ref().and_then(|c| backoff_hint(&c.name)),
                }
            }
            EventHubError::Send { condition } => {
                if condition.is_retryable() {
                    ErrorDisposition::Retryable {
                        backoff_hint: backoff_hint(&condition.name),
                    }
                } else {
                    ErrorDisposition::Fatal
                }
            }
        }
    }
}

fn backoff_hint(condition: &str) -> Option<Duration> {
    match condition {
        conditions::SERVER_BUSY | conditions::CONTAINER_CLOSE => Some(Duration::from_secs(4)),
        conditions::TIMEOUT => Some(Duration::from_secs(2)),
        _ => None,
    }
}

/// What an attempt is told about its position in the retry sequence.
#[derive(Debug, Clone)]
pub struct AttemptContext {
    /// 0 for the first attempt
    pub attempt: u32,
    /// Absolute deadline of the whole operation
    pub deadline: Option<Instant>,
    /// Failure of the previous attempt
    pub last_error: Option<EventHubError>,
}

impl AttemptContext {
    /// Time left before the deadline; `None` when there is no deadline.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }
}

/// Runs an operation up to `max_retries + 1` times under one deadline.
///
/// # Examples
///
/// ```no_run
/// use producer::retry::{DefaultErrorClassifier, RetryExecutor, RetryPolicy};
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// # async fn example() -> producer::common::EventHubResult<()> {
/// let executor = RetryExecutor::new(
///     "example",
///     RetryPolicy::default(),
///     Arc::new(DefaultErrorClassifier::default()),
/// );
///
/// let mut attempts = 0u32;
/// executor
///     .execute(&mut attempts, Some(Duration::from_secs(5)), |attempts, _ctx| {
///         Box::pin(async move {
///             *attempts += 1;
///             Ok(())
///         })
///     })
///     .await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct RetryExecutor {
    name: String,
    policy: RetryPolicy,
    classifier: Arc<dyn ErrorClassifier>,
}

impl std::fmt::Debug for RetryExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryExecutor")
            .field("name", &self.name)
            .field("policy", &self.policy)
            .finish()
    }
}

impl RetryExecutor {
    pub fn new(
        name: impl Into<String>,
        policy: RetryPolicy,
        classifier: Arc<dyn ErrorClassifier>,
    ) -> Self {
        Self {
            name: name.into(),
            policy,
            classifier,
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Drives `operation` against `state` until it succeeds, fails fatally,
    /// exhausts the retry budget or runs out of time.
    ///
    /// # Errors
    ///
    /// - the fatal error, unchanged
    /// - the last retryable error once the budget is spent
    /// - [`EventHubError::Timeout`] wrapping the last error once the deadline is reached
    pub async fn execute<S, T, F>(
        &self,
        state: &mut S,
        timeout: Option<Duration>,
        mut operation: F,
    ) -> EventHubResult<T>
    where
        S: Send,
        T: Send,
        F: for<'a> FnMut(&'a mut S, AttemptContext) -> BoxFuture<'a, EventHubResult<T>> + Send,
    {
        let deadline = timeout.map(|timeout| Instant::now() + timeout);
        let mut last_error: Option<EventHubError> = None;
        let mut retry = 0u32;

        loop {
            if deadline.is_some_and(|deadline| deadline <= Instant::now()) {
                let error = EventHubError::timeout_after(last_error);
                log::info!("{} operation timed out. ({error})", self.name);
                return Err(error);
            }

            let context = AttemptContext {
                attempt: retry,
                deadline,
                last_error: last_error.clone(),
            };
            log::debug!(
                "{} attempt {} (remaining: {:?})",
                self.name,
                retry,
                context.remaining()
            );

            let error = match operation(&mut *state, context).await {
                Ok(value) => return Ok(value),
                Err(error) => error,
            };

            let backoff_hint = match self.classifier.classify(&error) {
                ErrorDisposition::Fatal => {
                    log::info!("{} operation failed with a fatal error: {error}", self.name);
                    return Err(error);
                }
                ErrorDisposition::Retryable { backoff_hint } => backoff_hint,
            };

            if retry >= self.policy.max_retries {
                log::info!(
                    "{} operation has exhausted retry. Last error: {error}",
                    self.name
                );
                return Err(error);
            }

            let backoff = self
                .policy
                .backoff(retry)
                .max(backoff_hint.unwrap_or_default());
            if let Some(deadline) = deadline {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if backoff >= remaining {
                    let error = EventHubError::timeout_after(Some(error));
                    log::info!(
                        "{} operation timed out before retry {}. ({error})",
                        self.name,
                        retry + 1
                    );
                    return Err(error);
                }
            }

            log::warn!(
                "{} attempt {} failed, retrying in {backoff:?}: {error}",
                self.name,
                retry
            );
            last_error = Some(error);
            sleep(backoff).await;
            retry += 1;
        }
    }
}
