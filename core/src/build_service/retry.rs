/// Retry decisions for build submissions
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::StatusCode;
use std::time::{Duration, SystemTime};

/// Server-provided delays longer than this are clamped.
pub const MAX_SERVER_HINT_WINDOW: Duration = Duration::from_secs(120);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Delay before the first retry
    pub base_delay: Duration,
    /// Upper bound for any delay, hinted or computed
    pub max_delay: Duration,
    pub max_retries: u32,
}

impl RetryPolicy {
    pub const fn new(base_delay: Duration, max_delay: Duration, max_retries: u32) -> Self {
        Self {
            base_delay,
            max_delay,
            max_retries,
        }
    }
}

/// Failure classes as far as retrying is concerned.
#[derive(Debug, Clone, Copy)]
pub enum RetryError {
    Http {
        status: StatusCode,
        retry_after: Option<Duration>,
    },
    /// Connection, DNS or per-attempt timeout failures
    Network,
    Fatal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryDecision {
    pub should_retry: bool,
    pub delay: Duration,
    pub used_hint: bool,
}

impl RetryDecision {
    const fn give_up() -> Self {
        Self {
            should_retry: false,
            delay: Duration::ZERO,
            used_hint: false,
        }
    }

    fn after(delay: Duration, used_hint: bool, max_delay: Duration) -> Self {
        Self {
            should_retry: true,
            delay: delay.min(max_delay),
            used_hint,
        }
    }
}

/// `previous_attempts` is the number of retries already made.
pub fn evaluate_retry(
    error: RetryError,
    policy: RetryPolicy,
    previous_attempts: u32,
) -> RetryDecision {
    if previous_attempts >= policy.max_retries {
        return RetryDecision::give_up();
    }

    match error {
        RetryError::Fatal => RetryDecision::give_up(),
        RetryError::Http { status, .. } if !is_retryable_status(status) => RetryDecision::give_up(),
        RetryError::Http {
            retry_after: Some(hint),
            ..
        } => RetryDecision::after(hint.min(MAX_SERVER_HINT_WINDOW), true, policy.max_delay),
        RetryError::Http { .. } | RetryError::Network => {
            let delay = exponential_backoff(policy.base_delay, policy.max_delay, previous_attempts);
            RetryDecision::after(delay, false, policy.max_delay)
        }
    }
}

/// 429, 408 and every 5xx.
pub fn is_retryable_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
        || status.is_server_error()
}

fn exponential_backoff(base: Duration, max_delay: Duration, previous_attempts: u32) -> Duration {
    if base.is_zero() {
        return Duration::ZERO;
    }
    let multiplier = 1u128.checked_shl(previous_attempts).unwrap_or(u128::MAX);
    let delay_ms = base.as_millis().saturating_mul(multiplier);
    let capped_ms = delay_ms.min(max_delay.as_millis());
    Duration::from_millis(u64::try_from(capped_ms).unwrap_or(u64::MAX))
}

/// `Retry-After` as delta seconds or an HTTP date. Dates in the past mean
/// "retry now".
pub fn parse_retry_after(value: &str, now: SystemTime) -> Option<Duration> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(seconds) = trimmed.parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }

    let instant = httpdate::parse_http_date(trimmed).ok()?;
    Some(instant.duration_since(now).unwrap_or(Duration::ZERO))
}

pub fn retry_after_from_headers(headers: &HeaderMap) -> Option<Duration> {
    let value = headers.get(RETRY_AFTER)?.to_str().ok()?;
    parse_retry_after(value, SystemTime::now())
}
