//! Failure classification and backoff policy for retried requests.
//!
//! A finished [`Exchange`] is classified into a [`FailureType`] (or none, for
//! a 2xx success); a [`RetryPolicy`] then turns the classification and the
//! attempt count into a [`RetryDecision`] with an exponential-backoff delay
//! plus jitter. When the server sent a `Retry-After` header,
//! [`retry_after`] extracts it so callers can prefer the server's hint over
//! the computed backoff.
//!
//! # Example
//!
//! ```no_run
//! use courier::{classify, Fetcher, Request, RetryDecision, RetryPolicy, Transport};
//!
//! # async fn example() -> Result<(), courier::FetchError> {
//! let fetcher = Fetcher::new(Transport::new()?);
//! let policy = RetryPolicy::default();
//!
//! let exchange = fetcher.fetch(Request::get("https://example.com/flaky")).await;
//! if let Some(failure) = classify(&exchange) {
//!     match policy.should_retry(failure, exchange.attempt) {
//!         RetryDecision::Retry { delay, attempt } => {
//!             println!("retrying in {delay:?} (attempt {attempt})");
//!         }
//!         RetryDecision::DoNotRetry { reason } => println!("giving up: {reason}"),
//!     }
//! }
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use rand::Rng;
use reqwest::header::RETRY_AFTER;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::FetchError;
use crate::response::Exchange;

/// Default maximum retry attempts.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default base delay for exponential backoff (1 second).
const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);

/// Default maximum delay cap (32 seconds).
const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(32);

/// Default backoff multiplier (doubles each attempt).
const DEFAULT_BACKOFF_MULTIPLIER: f32 = 2.0;

/// Maximum jitter added to delays (500ms).
const MAX_JITTER: Duration = Duration::from_millis(500);

/// Maximum honored Retry-After value (1 hour).
const MAX_RETRY_AFTER: Duration = Duration::from_secs(3600);

/// Classification of a failed exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureType {
    /// Temporary failure that may succeed on retry.
    ///
    /// Examples: network timeout, 5xx server errors, connection refused.
    Transient,

    /// Failure that won't succeed regardless of retries.
    ///
    /// Examples: 404 Not Found, invalid URL, unencodable payload.
    Permanent,

    /// Server rate limiting (HTTP 429). Retryable with backoff; prefer the
    /// server's `Retry-After` hint when present.
    RateLimited,
}

/// Decision on whether to retry a failed exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry after the specified delay.
    Retry {
        /// How long to wait before retrying.
        delay: Duration,
        /// Which attempt number this will be (1-indexed, so the first retry
        /// is attempt 2).
        attempt: u32,
    },

    /// Do not retry.
    DoNotRetry {
        /// Human-readable reason why retry is not attempted.
        reason: String,
    },
}

impl RetryDecision {
    /// Convenience for callers tracking outstanding requests.
    #[must_use]
    pub fn is_retry(&self) -> bool {
        matches!(self, Self::Retry { .. })
    }
}

/// Configuration for retry behavior with exponential backoff.
///
/// # Default Values
///
/// - `max_attempts`: 3
/// - `base_delay`: 1 second
/// - `max_delay`: 32 seconds
/// - `backoff_multiplier`: 2.0
///
/// # Delay Calculation
///
/// ```text
/// delay = min(base_delay * multiplier^attempt, max_delay) + jitter
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including the initial attempt).
    max_attempts: u32,

    /// Base delay for the first retry.
    base_delay: Duration,

    /// Maximum delay cap.
    max_delay: Duration,

    /// Multiplier applied each attempt (typically 2.0 for doubling).
    backoff_multiplier: f32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_RETRIES,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            backoff_multiplier: DEFAULT_BACKOFF_MULTIPLIER,
        }
    }
}

impl RetryPolicy {
    /// Creates a new retry policy with custom settings.
    ///
    /// `max_attempts` is clamped to at least 1.
    #[must_use]
    pub fn new(
        max_attempts: u32,
        base_delay: Duration,
        max_delay: Duration,
        backoff_multiplier: f32,
    ) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay,
            backoff_multiplier,
        }
    }

    /// Creates a policy with a custom `max_attempts`, using defaults for
    /// the other settings.
    #[must_use]
    pub fn with_max_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..Self::default()
        }
    }

    /// Returns the maximum number of attempts configured.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Determines whether a failed exchange should be retried.
    ///
    /// `attempt` is the attempt number that just failed (1-indexed).
    pub fn should_retry(&self, failure_type: FailureType, attempt: u32) -> RetryDecision {
        if failure_type == FailureType::Permanent {
            return RetryDecision::DoNotRetry {
                reason: "permanent failure - retry would not help".to_string(),
            };
        }

        if attempt >= self.max_attempts {
            debug!(attempt, max = self.max_attempts, "max attempts reached");
            return RetryDecision::DoNotRetry {
                reason: format!("max attempts ({}) exhausted", self.max_attempts),
            };
        }

        let delay = self.calculate_delay(attempt);

        debug!(
            attempt,
            next_attempt = attempt + 1,
            delay_ms = delay.as_millis(),
            "will retry"
        );

        RetryDecision::Retry {
            delay,
            attempt: attempt + 1,
        }
    }

    /// Calculates the delay for a retry attempt with exponential backoff
    /// and jitter.
    fn calculate_delay(&self, attempt: u32) -> Duration {
        let base_ms = self.base_delay.as_millis() as f64;
        let multiplier = f64::from(self.backoff_multiplier);

        // attempt is 0-indexed for the exponent (attempt 1 = 2^0 = 1x base)
        let exponent = f64::from(attempt.saturating_sub(1));
        let delay_ms = base_ms * multiplier.powf(exponent);

        let capped_ms = delay_ms.min(self.max_delay.as_millis() as f64);

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let capped = Duration::from_millis(capped_ms as u64);
        capped + calculate_jitter()
    }
}

/// Generates random jitter between 0 and `MAX_JITTER`.
///
/// Jitter prevents thundering herd when many requests fail simultaneously
/// and retry at the same time.
fn calculate_jitter() -> Duration {
    let mut rng = rand::thread_rng();
    #[allow(clippy::cast_possible_truncation)]
    let jitter_ms = rng.gen_range(0..=MAX_JITTER.as_millis() as u64);
    Duration::from_millis(jitter_ms)
}

/// Classifies a finished exchange for retry decisions.
///
/// Returns `None` for a 2xx success (nothing to retry). A completed response
/// with a non-2xx status is classified by status code; a transport failure
/// is classified by error variant.
///
/// # Status Code Classification
///
/// | Status | Type |
/// |--------|------|
/// | 408 | Transient |
/// | 429 | RateLimited |
/// | other 4xx | Permanent |
/// | 5xx | Transient |
/// | anything else | Permanent |
#[must_use]
pub fn classify(exchange: &Exchange) -> Option<FailureType> {
    match &exchange.result {
        Ok(response) if response.is_success() => None,
        Ok(response) => Some(classify_status(response.status.as_u16())),
        Err(error) => Some(classify_error(error)),
    }
}

/// Classifies an HTTP status code into a failure type.
fn classify_status(status: u16) -> FailureType {
    match status {
        408 => FailureType::Transient,
        429 => FailureType::RateLimited,
        status if (400..500).contains(&status) => FailureType::Permanent,
        status if (500..600).contains(&status) => FailureType::Transient,
        _ => FailureType::Permanent,
    }
}

/// Classifies a transport error into a failure type.
fn classify_error(error: &FetchError) -> FailureType {
    match error {
        FetchError::Timeout { .. } => FailureType::Transient,

        FetchError::Network { source, .. } => {
            // TLS/certificate failures are configuration problems, not blips.
            if is_tls_error(source) {
                FailureType::Permanent
            } else {
                FailureType::Transient
            }
        }

        FetchError::HttpStatus { status, .. } => classify_status(*status),

        // Local configuration and file system problems won't heal on retry.
        FetchError::InvalidUrl { .. }
        | FetchError::InvalidHeader { .. }
        | FetchError::BodyEncode { .. }
        | FetchError::Build { .. }
        | FetchError::Proxy { .. }
        | FetchError::Io { .. }
        | FetchError::Integrity { .. } => FailureType::Permanent,
    }
}

/// Checks if a reqwest error is a TLS/certificate error.
fn is_tls_error(error: &reqwest::Error) -> bool {
    let error_string = error.to_string().to_lowercase();
    error_string.contains("certificate")
        || error_string.contains("tls")
        || error_string.contains("ssl")
        || error_string.contains("handshake")
}

/// Extracts the server's `Retry-After` hint from a completed response.
///
/// Accepts integer seconds or an HTTP-date; the result is capped at one
/// hour. Returns `None` when there is no response, no header, or the header
/// cannot be parsed.
#[must_use]
pub fn retry_after(exchange: &Exchange) -> Option<Duration> {
    let response = exchange.result.as_ref().ok()?;
    let header = response.headers.get(RETRY_AFTER)?.to_str().ok()?;
    parse_retry_after(header)
}

/// Parses a `Retry-After` header value into a duration.
fn parse_retry_after(header_value: &str) -> Option<Duration> {
    let header_value = header_value.trim();

    // Integer seconds is the common form.
    if let Ok(seconds) = header_value.parse::<i64>() {
        if seconds < 0 {
            debug!(seconds, "negative Retry-After value, ignoring");
            return None;
        }

        #[allow(clippy::cast_sign_loss)]
        let duration = Duration::from_secs(seconds as u64);
        if duration > MAX_RETRY_AFTER {
            warn!(
                seconds,
                max_seconds = MAX_RETRY_AFTER.as_secs(),
                "Retry-After exceeds maximum, capping at 1 hour"
            );
            return Some(MAX_RETRY_AFTER);
        }
        return Some(duration);
    }

    // HTTP-date form.
    if let Ok(datetime) = httpdate::parse_http_date(header_value) {
        let now = std::time::SystemTime::now();
        if let Ok(duration) = datetime.duration_since(now) {
            if duration > MAX_RETRY_AFTER {
                warn!(
                    delay_secs = duration.as_secs(),
                    max_secs = MAX_RETRY_AFTER.as_secs(),
                    "Retry-After date exceeds maximum, capping at 1 hour"
                );
                return Some(MAX_RETRY_AFTER);
            }
            return Some(duration);
        }
        // A date in the past means no wait.
        return Some(Duration::ZERO);
    }

    debug!(header_value, "unparseable Retry-After value");
    None
}
