use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

pub(crate) const BASE_BACKOFF_MS: u64 = 200;
const MAX_BACKOFF_SHIFT: usize = 6;

static REQUEST_COUNTER: AtomicU64 = AtomicU64::new(1);
static JITTER_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Bounded retry settings for one provider client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RetryPolicy {
    pub(crate) max_retries: usize,
    pub(crate) budget_ms: u64,
    pub(crate) jitter: bool,
}

impl RetryPolicy {
    /// Returns the sleep before the next attempt, or `None` when retrying is not allowed.
    pub(crate) fn next_delay(
        &self,
        attempt: usize,
        elapsed: Duration,
        retry_after_ms: Option<u64>,
    ) -> Option<Duration> {
        if attempt >= self.max_retries {
            return None;
        }
        let delay_ms = provider_retry_delay_ms(attempt, self.jitter, retry_after_ms);
        let elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
        if !retry_budget_allows_delay(elapsed_ms, delay_ms, self.budget_ms) {
            return None;
        }
        Some(Duration::from_millis(delay_ms))
    }
}

pub(crate) fn should_retry_status(status: u16) -> bool {
    matches!(status, 408 | 409 | 425 | 429) || status >= 500
}

pub(crate) fn next_backoff_ms(attempt: usize) -> u64 {
    BASE_BACKOFF_MS.saturating_mul(1_u64 << attempt.min(MAX_BACKOFF_SHIFT))
}

pub(crate) fn next_backoff_ms_with_jitter(attempt: usize, jitter_enabled: bool) -> u64 {
    let base = next_backoff_ms(attempt);
    if !jitter_enabled || base <= 1 {
        return base;
    }

    // Jitter stays within [50%, 100%] of the deterministic backoff.
    let low = base / 2;
    let width = base - low;
    let seed = JITTER_COUNTER.fetch_add(1, Ordering::Relaxed);
    let mixed = seed.wrapping_mul(0x9E37_79B9_7F4A_7C15).rotate_left(17);
    low.saturating_add(mixed % width.saturating_add(1))
}

pub(crate) fn parse_retry_after_ms(headers: &reqwest::header::HeaderMap) -> Option<u64> {
    let raw = headers
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(seconds) = raw.parse::<u64>() {
        return Some(seconds.saturating_mul(1000));
    }

    let retry_at = DateTime::parse_from_rfc2822(raw).ok()?.with_timezone(&Utc);
    let delay_ms = retry_at
        .signed_duration_since(Utc::now())
        .num_milliseconds();
    Some(u64::try_from(delay_ms).unwrap_or(0))
}

pub(crate) fn provider_retry_delay_ms(
    attempt: usize,
    jitter_enabled: bool,
    retry_after_ms: Option<u64>,
) -> u64 {
    let backoff_ms = next_backoff_ms_with_jitter(attempt, jitter_enabled);
    retry_after_ms.map_or(backoff_ms, |floor| backoff_ms.max(floor))
}

pub(crate) fn retry_budget_allows_delay(
    elapsed_ms: u64,
    delay_ms: u64,
    retry_budget_ms: u64,
) -> bool {
    retry_budget_ms == 0 || elapsed_ms.saturating_add(delay_ms) <= retry_budget_ms
}

pub(crate) fn is_retryable_http_error(error: &reqwest::Error) -> bool {
    error.is_timeout() || error.is_connect() || error.is_request() || error.is_body()
}

pub(crate) fn new_request_id() -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis();
    let count = REQUEST_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("threadline-{millis}-{count}")
}
