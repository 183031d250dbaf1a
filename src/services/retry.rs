use rand::Rng;
use std::time::Duration;

/// Exponential backoff with 0-25% jitter: `min(base * 2^(attempt-1) + jitter, max)`.
///
/// Attempt `0` means "no wait".
#[must_use]
pub fn calculate_backoff(attempt: u32, base_ms: u64, max: Duration) -> Duration {
    if attempt == 0 {
        return Duration::ZERO;
    }

    let exp_factor = 2u64.saturating_pow(attempt - 1);
    let delay_ms = base_ms.saturating_mul(exp_factor);

    let jitter = if delay_ms > 0 {
        rand::rng().random_range(0..=delay_ms / 4)
    } else {
        0
    };

    let max_ms = u64::try_from(max.as_millis()).unwrap_or(u64::MAX);
    Duration::from_millis(delay_ms.saturating_add(jitter).min(max_ms))
}
