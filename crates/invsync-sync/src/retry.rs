//! Exponential backoff around fallible async calls

use invsync_types::{Error, ProviderErrorKind, RetryConfig};
use std::fmt;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, error, warn};

/// Gate consulted before every retry with the error and the 1-based attempt number
pub type ShouldRetry<E> = Box<dyn Fn(&E, u32) -> bool + Send + Sync>;

/// Hook fired before every retry sleep with the error, attempt number and delay
pub type OnRetry<E> = Box<dyn Fn(&E, u32, Duration) + Send + Sync>;

/// Error predicate usable as a retry gate
pub type Predicate = fn(&Error) -> bool;

/// Backoff parameters plus optional gate and hook
pub struct RetryOptions<E = Error> {
    /// Attempt count and delays
    pub config: RetryConfig,
    /// Retry only while this returns `true`; retry everything when unset
    pub should_retry: Option<ShouldRetry<E>>,
    /// Called before each sleep
    pub on_retry: Option<OnRetry<E>>,
}

impl<E> RetryOptions<E> {
    /// Options with the given backoff and no gate or hook
    pub fn new(config: RetryConfig) -> Self {
        Self {
            config,
            should_retry: None,
            on_retry: None,
        }
    }

    /// Set the retry gate
    pub fn with_should_retry<F>(mut self, should_retry: F) -> Self
    where
        F: Fn(&E, u32) -> bool + Send + Sync + 'static,
    {
        self.should_retry = Some(Box::new(should_retry));
        self
    }

    /// Set the retry hook
    pub fn with_on_retry<F>(mut self, on_retry: F) -> Self
    where
        F: Fn(&E, u32, Duration) + Send + Sync + 'static,
    {
        self.on_retry = Some(Box::new(on_retry));
        self
    }
}

impl RetryOptions<Error> {
    /// Gate on an attempt-independent predicate
    pub fn retry_if(self, predicate: Predicate) -> Self {
        self.with_should_retry(move |error, _| predicate(error))
    }
}

impl<E> Default for RetryOptions<E> {
    fn default() -> Self {
        Self::new(RetryConfig::default())
    }
}

impl<E> fmt::Debug for RetryOptions<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryOptions")
            .field("config", &self.config)
            .field("should_retry", &self.should_retry.is_some())
            .field("on_retry", &self.on_retry.is_some())
            .finish()
    }
}

/// Run `operation` up to `max_retries + 1` times.
///
/// Before retry `k` the gate is consulted, the hook fires and the task sleeps
/// `min(initial_delay * multiplier^(k-1), max_delay)`. The last error is
/// returned as is.
pub async fn with_retry<T, E, F, Fut>(mut operation: F, options: &RetryOptions<E>) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: fmt::Display,
{
    let max_attempts = options.config.max_attempts();
    let mut attempt: u32 = 1;

    loop {
        let err = match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(attempt, "Operation succeeded after retry");
                }
                return Ok(value);
            }
            Err(err) => err,
        };

        if attempt >= max_attempts {
            error!(attempts = attempt, error = %err, "All retry attempts exhausted");
            return Err(err);
        }

        if let Some(should_retry) = &options.should_retry {
            if !should_retry(&err, attempt) {
                warn!(attempt, error = %err, "Error is not retryable, giving up");
                return Err(err);
            }
        }

        let delay = options.config.delay_for_retry(attempt);
        warn!(
            attempt,
            max_retries = options.config.max_retries,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "Operation failed, retrying"
        );
        if let Some(on_retry) = &options.on_retry {
            on_retry(&err, attempt, delay);
        }

        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}

fn message_contains_any(error: &Error, needles: &[&str], ignore_case: bool) -> bool {
    let message = error.to_string();
    if ignore_case {
        let lower = message.to_lowercase();
        needles.iter().any(|n| lower.contains(&n.to_lowercase()))
    } else {
        needles.iter().any(|n| message.contains(n))
    }
}

/// Connection level failures: refused, unresolvable host, timeouts
pub fn is_network_error(error: &Error) -> bool {
    matches!(
        error.provider_kind(),
        Some(ProviderErrorKind::ConnectionRefused)
    ) || message_contains_any(
        error,
        &["ECONNREFUSED", "ETIMEDOUT", "ENOTFOUND", "network", "timeout"],
        false,
    )
}

/// Failures of the fetch provider worth another attempt.
///
/// Tagged provider errors match on their kind; anything else falls back to
/// a case-insensitive scan for well known transient messages.
pub fn is_transient_provider_error(error: &Error) -> bool {
    if let Some(kind) = error.provider_kind() {
        if kind != ProviderErrorKind::Unknown {
            return kind.is_transient();
        }
    }
    message_contains_any(
        error,
        &[
            "timeout",
            "ETIMEDOUT",
            "ECONNREFUSED",
            "ENOTFOUND",
            "socket hang up",
            "rate limit",
            "throttled",
            "too many requests",
            "429",
            "503",
            "504",
        ],
        true,
    )
}

/// Messages naming a retryable HTTP status (429, 500, 502, 503, 504)
pub fn is_retryable_http_error(error: &Error) -> bool {
    message_contains_any(error, &["429", "500", "502", "503", "504"], false)
}

/// Matches when any predicate matches
pub fn any(predicates: Vec<Predicate>) -> impl Fn(&Error) -> bool + Send + Sync {
    move |error| predicates.iter().any(|p| p(error))
}

/// Matches when every predicate matches
pub fn all(predicates: Vec<Predicate>) -> impl Fn(&Error) -> bool + Send + Sync {
    move |error| predicates.iter().all(|p| p(error))
}
