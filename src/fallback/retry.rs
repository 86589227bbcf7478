//! Backoff utilities for transient provider failures.
//!
//! Providers that fail transiently are not retried inside a resolve call;
//! their credential is put in cooldown for a backoff delay instead, so a
//! later call can use it again.

use std::time::Duration;

/// Consecutive transient failures before a credential is blacklisted.
pub const DEFAULT_MAX_TRANSIENT_STRIKES: u32 = 3;

/// Base delay for exponential backoff (1 second).
pub const DEFAULT_BACKOFF_BASE: Duration = Duration::from_secs(1);

/// Maximum delay cap for exponential backoff (60 seconds).
pub const DEFAULT_BACKOFF_MAX: Duration = Duration::from_secs(60);

/// Determine if a reqwest error is a transient network error.
///
/// Returns true for connection errors, timeouts, and other temporary failures.
/// Returns false for errors that are unlikely to resolve on retry.
pub fn is_transient_network_error(error: &reqwest::Error) -> bool {
    if error.is_connect() || error.is_timeout() {
        return true;
    }

    // Request failed during body transfer
    if error.is_body() {
        return true;
    }

    if let Some(status) = error.status() {
        // 502 Bad Gateway, 503 Service Unavailable, 504 Gateway Timeout
        if matches!(status.as_u16(), 502 | 503 | 504) {
            return true;
        }
    }

    false
}

/// Parse the Retry-After header value to get retry delay in seconds.
///
/// Only the integer seconds format is understood; HTTP dates yield None.
pub fn parse_retry_after(response: &reqwest::Response) -> Option<u64> {
    response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<u64>().ok())
}

/// Calculate exponential backoff delay with jitter.
///
/// Uses the formula: min(base * 2^attempt + jitter, max_delay)
/// where jitter is half the base, capped at 500ms.
pub fn calculate_backoff(attempt: u32, base: Duration, max: Duration) -> Duration {
    let exponential = base.saturating_mul(2u32.saturating_pow(attempt));
    let jitter_ms = (base.as_millis() as u64).min(1000);
    let jitter = Duration::from_millis(jitter_ms / 2);
    exponential.saturating_add(jitter).min(max)
}

/// Cooldown for a credential after its `strike`-th consecutive transient
/// failure (1-based). A Retry-After hint wins over the computed backoff but
/// is still capped at `max`.
pub fn cooldown_for(
    strike: u32,
    retry_after_secs: Option<u64>,
    base: Duration,
    max: Duration,
) -> Duration {
    match retry_after_secs {
        Some(secs) => Duration::from_secs(secs).min(max),
        None => calculate_backoff(strike.saturating_sub(1), base, max),
    }
}
